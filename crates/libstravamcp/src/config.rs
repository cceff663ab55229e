use std::time::Duration;

use oauth2::{AuthUrl, RedirectUrl, TokenUrl};
use url::Url;

use crate::{Error, Result};

pub const STRAVA_OAUTH_BASE: &str = "https://www.strava.com/oauth";
pub const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3/";

/// Must match the callback domain registered for the Strava application.
pub const REDIRECT_URI: &str = "http://localhost:8080/";
pub const CALLBACK_ADDR: &str = "127.0.0.1:8080";

pub const SCOPES: &str = "read,activity:read_all,profile:read_all";

pub const DEFAULT_PER_PAGE: u32 = 30;

/// Tokens are refreshed this many seconds before they actually expire.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider endpoints and the knobs around the login flow.
#[derive(Debug, Clone)]
pub struct StravaConfig {
    pub auth_url: AuthUrl,
    pub token_url: TokenUrl,
    /// Base for the data endpoints; always ends with a slash.
    pub api_base: Url,
    pub redirect_url: RedirectUrl,
    /// Address the one-shot callback listener binds to.
    pub callback_addr: String,
    pub scopes: String,
    pub callback_timeout: Duration,
    pub request_timeout: Duration,
    /// Try to open the consent page in the default browser.
    pub open_browser: bool,
}

impl StravaConfig {
    /// Point the client at a different provider host, e.g. a mock server.
    pub fn with_base_urls(api_base: &str, oauth_base: &str) -> Result<Self> {
        let oauth_base = oauth_base.trim_end_matches('/');
        let api_base = if api_base.ends_with('/') {
            api_base.to_string()
        } else {
            format!("{api_base}/")
        };

        Ok(Self {
            auth_url: AuthUrl::new(format!("{oauth_base}/authorize"))
                .map_err(|e| Error::Configuration(format!("Invalid auth URL: {e}")))?,
            token_url: TokenUrl::new(format!("{oauth_base}/token"))
                .map_err(|e| Error::Configuration(format!("Invalid token URL: {e}")))?,
            api_base: Url::parse(&api_base)
                .map_err(|e| Error::Configuration(format!("Invalid API base URL: {e}")))?,
            redirect_url: RedirectUrl::new(REDIRECT_URI.to_string())
                .map_err(|e| Error::Configuration(format!("Invalid redirect URL: {e}")))?,
            callback_addr: CALLBACK_ADDR.to_string(),
            scopes: SCOPES.to_string(),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            open_browser: true,
        })
    }

    pub fn strava() -> Result<Self> {
        Self::with_base_urls(STRAVA_API_BASE, STRAVA_OAUTH_BASE)
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn with_callback_addr(mut self, addr: impl Into<String>) -> Self {
        self.callback_addr = addr.into();
        self
    }

    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// HTTP client shared by the token and data calls.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("stravamcp/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }
}
