use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use libstravamcp::{
    LogLevel, auth, check,
    config::StravaConfig,
    ctx::{self, Ctx},
    output::{Output, Stream},
    server,
    storage::CredentialStore,
};
use terminal_size::{Width, terminal_size};

#[derive(Subcommand)]
enum AuthCommands {
    /// Open the Strava consent page and store the resulting tokens
    Login,

    /// Exchange the stored refresh token for a new access token
    Renew,

    /// Show what the credential file holds and whether the token is usable
    Status,
}

#[derive(Parser)]
#[command(
    name = "stravamcp",
    about = "An MCP server for the Strava API, with a local OAuth2 login flow",
    version = ctx::VERSION,
)]
struct Cli {
    /// Credential file (defaults to <config dir>/stravamcp/.env)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Logging level
    #[arg(long, global = true, value_enum, default_value = "info")]
    logs: LogLevel,

    /// Force color output
    #[arg(long, global = true, conflicts_with = "no_color")]
    color: bool,

    /// Disable color output
    #[arg(long, global = true, conflicts_with = "color")]
    no_color: bool,

    /// Seconds to wait for the browser to return from the consent page
    #[arg(long, global = true, default_value = "300")]
    callback_timeout: u64,

    /// Print the consent URL instead of opening a browser
    #[arg(long, global = true)]
    no_browser: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the stravamcp version & MCP protocol revision
    Version,

    /// Serve the Strava tools to an MCP host over stdio
    Serve,

    /// Manage the Strava OAuth tokens
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Fetch the athlete profile to verify the credentials work
    Check {
        /// Print the full profile JSON
        #[arg(long)]
        profile: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_file = match cli.env_file {
        Some(path) => path,
        None => CredentialStore::default_path()?,
    };

    // stdout belongs to the MCP protocol while serving
    let stream = match cli.command {
        Commands::Serve => Stream::Stderr,
        _ => Stream::Stdout,
    };

    let color = if cli.no_color {
        false
    } else if cli.color {
        true
    } else {
        match stream {
            Stream::Stdout => atty::is(atty::Stream::Stdout),
            Stream::Stderr => atty::is(atty::Stream::Stderr),
        }
    };

    // Detect terminal width, default to 80
    let width = if let Some((Width(w), _)) = terminal_size() {
        w as usize
    } else {
        80
    };

    let output = Output::with_stream(stream, color, width).with_logging(Some(cli.logs));
    let config = StravaConfig::strava()?
        .with_callback_timeout(Duration::from_secs(cli.callback_timeout))
        .with_open_browser(!cli.no_browser);
    let ctx = Ctx::new(env_file, config, output);

    match cli.command {
        Commands::Version => {
            println!("stravamcp version {}", ctx::VERSION);
            println!(
                "MCP protocol version: {}",
                tenx_mcp::schema::LATEST_PROTOCOL_VERSION
            );
        }

        Commands::Serve => {
            let client = ctx.client()?;
            server::run_server(client).await?;
        }

        Commands::Auth { command } => match command {
            AuthCommands::Login => auth::login_command(&ctx).await?,
            AuthCommands::Renew => auth::renew_command(&ctx).await?,
            AuthCommands::Status => auth::status_command(&ctx).await?,
        },

        Commands::Check { profile } => {
            check::check_command(&ctx, profile).await?;
        }
    }

    Ok(())
}
