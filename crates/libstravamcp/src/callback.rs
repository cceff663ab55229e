use std::net::SocketAddr;

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::Result;

/// Upper bound on request line plus headers; anything larger is not a redirect.
const MAX_REQUEST_BYTES: u64 = 16 * 1024;

/// How long one connection may take to deliver its request. Browsers open
/// speculative connections that never send anything.
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// What a single request to the callback listener told us.
///
/// | request                 | outcome   | listener      |
/// |-------------------------|-----------|---------------|
/// | `?code=...` (state ok)  | `Code`    | stops         |
/// | `?error=...`            | `Denied`  | stops         |
/// | anything else           | `NoCode`  | keeps waiting |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    Denied(String),
    NoCode,
}

impl CallbackOutcome {
    /// Classify the query string of a callback request.
    ///
    /// When `expected_state` is set, a code only counts if the request
    /// carries the same `state`.
    pub fn from_query(query: &str, expected_state: Option<&str>) -> Self {
        let mut code = None;
        let mut state = None;
        let mut error = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" if code.is_none() => code = Some(value.into_owned()),
                "state" if state.is_none() => state = Some(value.into_owned()),
                "error" if error.is_none() => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(code) = code {
            match expected_state {
                Some(expected) if state.as_deref() != Some(expected) => {
                    warn!("Ignoring authorization callback with a mismatched state parameter");
                    CallbackOutcome::NoCode
                }
                _ => CallbackOutcome::Code(code),
            }
        } else if let Some(error) = error {
            CallbackOutcome::Denied(error)
        } else {
            CallbackOutcome::NoCode
        }
    }

    /// Whether the listener is done after this request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallbackOutcome::NoCode)
    }

    fn page(&self) -> String {
        match self {
            CallbackOutcome::Code(_) => {
                "Authorization successful! You can close this window and check your terminal."
                    .to_string()
            }
            CallbackOutcome::Denied(error) => {
                format!("Authorization failed: {}", html_escape(error))
            }
            CallbackOutcome::NoCode => "No code received.".to_string(),
        }
    }
}

/// A local HTTP listener that waits for the provider's redirect.
///
/// Each call to [`CallbackListener::next_outcome`] serves exactly one request
/// with a 200 page and reports what it carried. Dropping the listener closes
/// the port.
pub struct CallbackListener {
    listener: TcpListener,
    expected_state: Option<String>,
    read_timeout: Duration,
}

impl CallbackListener {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            expected_state: None,
            read_timeout: REQUEST_READ_TIMEOUT,
        })
    }

    pub fn with_expected_state(mut self, state: impl Into<String>) -> Self {
        self.expected_state = Some(state.into());
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve the next request and classify it.
    ///
    /// A connection that cannot be read as an HTTP request, or that sends
    /// nothing within the read timeout, counts as `NoCode`; only accept
    /// failures are errors.
    pub async fn next_outcome(&self) -> Result<CallbackOutcome> {
        let (stream, peer) = self.listener.accept().await?;
        debug!("Callback connection from {peer}");

        match timeout(self.read_timeout, self.serve(stream)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                warn!("Failed to handle callback request from {peer}: {e}");
                Ok(CallbackOutcome::NoCode)
            }
            Err(_) => {
                debug!("Dropping idle callback connection from {peer}");
                Ok(CallbackOutcome::NoCode)
            }
        }
    }

    async fn serve(&self, mut stream: TcpStream) -> std::io::Result<CallbackOutcome> {
        let (read_half, mut write_half) = stream.split();
        let mut reader = BufReader::new(read_half.take(MAX_REQUEST_BYTES));

        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;

        // Drain headers so the browser sees a clean response.
        loop {
            let mut header = String::new();
            let n = reader.read_line(&mut header).await?;
            if n == 0 || header == "\r\n" || header == "\n" {
                break;
            }
        }

        let target = request_line.split_whitespace().nth(1).unwrap_or("/");
        let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
        let outcome = CallbackOutcome::from_query(query, self.expected_state.as_deref());

        let body = format!(
            "<!DOCTYPE html><html><head><title>stravamcp</title></head><body><p>{}</p></body></html>",
            outcome.page()
        );
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );

        write_half.write_all(response.as_bytes()).await?;
        write_half.flush().await?;
        let _ = write_half.shutdown().await;

        Ok(outcome)
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_terminal() {
        let outcome = CallbackOutcome::from_query("code=XYZ&scope=read", None);
        assert_eq!(outcome, CallbackOutcome::Code("XYZ".to_string()));
        assert!(outcome.is_terminal());
    }

    #[test]
    fn test_error_is_terminal() {
        let outcome = CallbackOutcome::from_query("error=access_denied", None);
        assert_eq!(outcome, CallbackOutcome::Denied("access_denied".to_string()));
        assert!(outcome.is_terminal());
    }

    #[test]
    fn test_neither_keeps_waiting() {
        for query in ["", "foo=bar", "scope=read&state=abc"] {
            let outcome = CallbackOutcome::from_query(query, None);
            assert_eq!(outcome, CallbackOutcome::NoCode);
            assert!(!outcome.is_terminal());
        }
    }

    #[test]
    fn test_state_must_match_when_expected() {
        assert_eq!(
            CallbackOutcome::from_query("code=XYZ&state=good", Some("good")),
            CallbackOutcome::Code("XYZ".to_string())
        );
        assert_eq!(
            CallbackOutcome::from_query("code=XYZ&state=evil", Some("good")),
            CallbackOutcome::NoCode
        );
        assert_eq!(
            CallbackOutcome::from_query("code=XYZ", Some("good")),
            CallbackOutcome::NoCode
        );
        // errors are reported regardless of state
        assert_eq!(
            CallbackOutcome::from_query("error=access_denied&state=evil", Some("good")),
            CallbackOutcome::Denied("access_denied".to_string())
        );
    }

    #[test]
    fn test_query_is_percent_decoded() {
        assert_eq!(
            CallbackOutcome::from_query("code=a%2Fb%20c", None),
            CallbackOutcome::Code("a/b c".to_string())
        );
    }

    #[test]
    fn test_denied_page_is_escaped() {
        let page = CallbackOutcome::Denied("<script>".to_string()).page();
        assert_eq!(page, "Authorization failed: &lt;script&gt;");
    }

    #[tokio::test]
    async fn test_listener_serves_one_request_per_call() {
        let listener = CallbackListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let request = tokio::spawn(async move {
            let body = reqwest::get(format!("http://{addr}/favicon.ico"))
                .await
                .unwrap()
                .text()
                .await
                .unwrap();
            assert!(body.contains("No code received."));

            let response = reqwest::get(format!("http://{addr}/?code=abc&scope=read"))
                .await
                .unwrap();
            assert_eq!(response.status(), 200);
            assert!(response.text().await.unwrap().contains("Authorization successful!"));
        });

        assert_eq!(listener.next_outcome().await.unwrap(), CallbackOutcome::NoCode);
        assert_eq!(
            listener.next_outcome().await.unwrap(),
            CallbackOutcome::Code("abc".to_string())
        );
        request.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_redirect() {
        let listener = CallbackListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .with_read_timeout(Duration::from_millis(200));
        let addr = listener.local_addr().unwrap();

        let idle = TcpStream::connect(addr).await.unwrap();
        let redirect = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            reqwest::get(format!("http://{addr}/?code=XYZ"))
                .await
                .unwrap()
                .status()
        });

        let outcomes = timeout(Duration::from_secs(3), async {
            let first = listener.next_outcome().await.unwrap();
            let second = listener.next_outcome().await.unwrap();
            (first, second)
        })
        .await
        .unwrap();
        assert_eq!(outcomes.0, CallbackOutcome::NoCode);
        assert_eq!(outcomes.1, CallbackOutcome::Code("XYZ".to_string()));
        assert!(redirect.await.unwrap().is_success());
        drop(idle);
    }

    #[tokio::test]
    async fn test_oversized_request_line_is_cut_off() {
        let listener = CallbackListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let flood = vec![b'a'; MAX_REQUEST_BYTES as usize + 4096];
        let writer = tokio::spawn(async move {
            // The listener may close before everything is sent.
            let _ = client.write_all(&flood).await;
            client
        });

        // Well inside the read timeout: the byte cap ends the read, not the clock.
        let outcome = timeout(Duration::from_secs(2), listener.next_outcome())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::NoCode);
        drop(writer.await.unwrap());
    }
}
