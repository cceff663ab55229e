use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Verbosity of the `--logs` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

// Solarized Dark accents
const SOLARIZED_BASE01: Color = Color::Rgb(88, 110, 117);
const SOLARIZED_BASE02: Color = Color::Rgb(7, 54, 66);
const SOLARIZED_BASE0: Color = Color::Rgb(131, 148, 150);
const SOLARIZED_BASE1: Color = Color::Rgb(147, 161, 161);
const SOLARIZED_YELLOW: Color = Color::Rgb(181, 137, 0);
const SOLARIZED_RED: Color = Color::Rgb(220, 50, 47);
const SOLARIZED_MAGENTA: Color = Color::Rgb(211, 54, 130);
const SOLARIZED_GREEN: Color = Color::Rgb(133, 153, 0);

/// Which terminal stream an [`Output`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    /// Used while serving MCP over stdio, where stdout is the protocol channel.
    Stderr,
}

/// Handles all human-facing output for the application.
///
/// Text goes to one stream, styled with the Solarized Dark palette when color
/// is enabled. The struct is `Clone` and thread-safe so the tracing layer and
/// the commands can share it.
#[derive(Clone)]
pub struct Output {
    stream: Arc<Mutex<StandardStream>>,
    width: usize,
}

impl Output {
    pub fn new(color: bool, width: usize) -> Self {
        Self::with_stream(Stream::Stdout, color, width)
    }

    pub fn with_stream(stream: Stream, color: bool, width: usize) -> Self {
        let choice = if color {
            ColorChoice::Always
        } else {
            ColorChoice::Never
        };
        let stream = match stream {
            Stream::Stdout => StandardStream::stdout(choice),
            Stream::Stderr => StandardStream::stderr(choice),
        };
        Self {
            stream: Arc::new(Mutex::new(stream)),
            width,
        }
    }

    /// Install a tracing subscriber that renders events through this output.
    ///
    /// `RUST_LOG` directives win over `level` when set.
    pub fn with_logging(self, level: Option<LogLevel>) -> Self {
        let Some(level) = level else {
            return self;
        };
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::from(level).into())
            .from_env_lossy();

        // A second init (tests, embedding) keeps the first subscriber.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(OutputLayer::new(self.clone()))
            .try_init();
        self
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, StandardStream>> {
        self.stream
            .lock()
            .map_err(|_| io::Error::other("output stream lock poisoned"))
    }

    pub fn text(&self, message: impl Into<String>) -> io::Result<()> {
        let message = message.into();
        let mut stream = self.lock()?;
        writeln!(stream, "{message}")
    }

    pub fn heading(&self, message: impl Into<String>) -> io::Result<()> {
        let message = message.into();
        let mut stream = self.lock()?;

        let message_with_spaces = format!(" {message} ");
        let padding = self.width.saturating_sub(message_with_spaces.len());
        let left_pad = padding / 2;
        let right_pad = padding - left_pad;

        let header = format!(
            "{}{}{}",
            " ".repeat(left_pad),
            message_with_spaces,
            " ".repeat(right_pad)
        );

        stream.set_color(
            ColorSpec::new()
                .set_fg(Some(SOLARIZED_BASE1))
                .set_bg(Some(SOLARIZED_BASE02))
                .set_bold(true),
        )?;
        write!(stream, "{header}")?;
        stream.reset()?;
        writeln!(stream)?;
        stream.flush()
    }

    pub fn warn(&self, message: impl Into<String>) -> io::Result<()> {
        let line = format!("[WARNING] {}", message.into());
        self.styled_line(ColorSpec::new().set_fg(Some(SOLARIZED_YELLOW)), &line)
    }

    pub fn error(&self, message: impl Into<String>) -> io::Result<()> {
        let line = format!("[ERROR] {}", message.into());
        self.styled_line(
            ColorSpec::new().set_fg(Some(SOLARIZED_RED)).set_bold(true),
            &line,
        )
    }

    pub fn success(&self, message: impl Into<String>) -> io::Result<()> {
        let line = format!("[OK] {}", message.into());
        self.styled_line(ColorSpec::new().set_fg(Some(SOLARIZED_GREEN)), &line)
    }

    fn styled_line(&self, spec: &ColorSpec, line: &str) -> io::Result<()> {
        let mut stream = self.lock()?;
        stream.set_color(spec)?;
        writeln!(stream, "{line}")?;
        stream.reset()?;
        stream.flush()
    }

    /// Pretty-printed JSON, uncolored so it can be piped.
    pub fn json(&self, value: &serde_json::Value) -> crate::Result<()> {
        let rendered = serde_json::to_string_pretty(value)?;
        self.text(rendered)?;
        Ok(())
    }

    /// One log event, colored by severity.
    pub fn trace(&self, message: impl Into<String>, level: Level) -> io::Result<()> {
        let line = format!("{}: {}", level.as_str().to_lowercase(), message.into());
        self.styled_line(&level_style(level), &line)
    }
}

fn level_style(level: Level) -> ColorSpec {
    let mut spec = ColorSpec::new();
    let color = match level {
        Level::ERROR => {
            spec.set_bold(true);
            SOLARIZED_RED
        }
        Level::WARN => SOLARIZED_YELLOW,
        Level::INFO => SOLARIZED_BASE0,
        Level::DEBUG => SOLARIZED_MAGENTA,
        _ => SOLARIZED_BASE01,
    };
    spec.set_fg(Some(color));
    spec
}

impl Default for Output {
    fn default() -> Self {
        Self::new(false, 80)
    }
}

/// A tracing subscriber layer that forwards log messages to an Output instance.
pub struct OutputLayer {
    output: Output,
}

impl OutputLayer {
    pub fn new(output: Output) -> Self {
        Self { output }
    }
}

impl<S> Layer<S> for OutputLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = event.metadata().level();
        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        let _ = self.output.trace(visitor.message, *level);
    }
}

/// Extracts the `message` field from tracing events.
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}
