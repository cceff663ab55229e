use std::time::Duration;

use thiserror::Error;

/// Type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for stravamcp operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Client id or secret missing, or an endpoint that cannot be parsed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No usable access token, even after running the authorization flow.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The token endpoint rejected an authorization code.
    #[error("Token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    /// The token endpoint rejected a refresh token.
    #[error("Token refresh failed with status {status}: {body}")]
    TokenRefresh { status: u16, body: String },

    /// A data endpoint answered with something other than 200.
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Nobody hit the local callback listener in time.
    #[error("Timed out after {}s waiting for the authorization callback", .0.as_secs())]
    CallbackTimeout(Duration),

    /// I/O errors from file operations, network operations, etc.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level HTTP failures (DNS, TLS, connection reset, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Credential file errors.
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// MCP server errors.
    #[error("MCP error: {0}")]
    Mcp(#[from] tenx_mcp::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_carry_status_and_body() {
        let err = Error::HttpStatus {
            status: 403,
            body: r#"{"message":"Forbidden"}"#.to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("Forbidden"));

        let err = Error::TokenRefresh {
            status: 400,
            body: "invalid refresh_token".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Token refresh failed with status 400: invalid refresh_token"
        );
    }

    #[test]
    fn test_callback_timeout_message() {
        let err = Error::CallbackTimeout(Duration::from_secs(300));
        assert_eq!(
            err.to_string(),
            "Timed out after 300s waiting for the authorization callback"
        );
    }
}
