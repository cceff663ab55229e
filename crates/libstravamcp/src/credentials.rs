use std::fmt;

use oauth2::{ClientId, ClientSecret};

use crate::{Error, Result, config::EXPIRY_MARGIN_SECS, oauth::TokenSet};

/// The OAuth state kept in the credential file.
///
/// Every field is optional: a fresh install only has the client pair, and a
/// half-written file may have anything. `expires_at` is kept as the exact
/// text from the file so that a load/save cycle never rewrites it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<String>,
}

/// Where a call stands before it can talk to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No access token at all; the authorization flow has to run.
    NoToken,
    /// An access token exists but is inside the expiry margin.
    Expired,
    Valid,
}

impl Credentials {
    /// `expires_at` as epoch seconds, if present and numeric.
    pub fn expires_at_epoch(&self) -> Option<i64> {
        self.expires_at
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
    }

    /// True when the token expires within the next minute, or when we cannot
    /// tell.
    pub fn is_token_expired(&self, now: i64) -> bool {
        match self.expires_at_epoch() {
            Some(expires_at) => now + EXPIRY_MARGIN_SECS >= expires_at,
            None => true,
        }
    }

    pub fn token_state(&self, now: i64) -> TokenState {
        if self.access_token.is_none() {
            TokenState::NoToken
        } else if self.is_token_expired(now) {
            TokenState::Expired
        } else {
            TokenState::Valid
        }
    }

    /// The client pair needed for any call to the token endpoint.
    pub fn client_credentials(&self) -> Result<(ClientId, ClientSecret)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Ok((
                ClientId::new(id.clone()),
                ClientSecret::new(secret.clone()),
            )),
            _ => Err(Error::Configuration(
                "STRAVA_CLIENT_ID or STRAVA_CLIENT_SECRET is missing from the credential file. \
                 Please add your API application credentials."
                    .to_string(),
            )),
        }
    }

    pub fn apply_tokens(&mut self, tokens: &TokenSet) {
        self.access_token = Some(tokens.access_token.clone());
        self.refresh_token = Some(tokens.refresh_token.clone());
        self.expires_at = Some(tokens.expires_at.to_string());
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redacted(value: &Option<String>) -> &'static str {
            if value.is_some() { "<redacted>" } else { "<none>" }
        }

        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("access_token", &redacted(&self.access_token))
            .field("refresh_token", &redacted(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Current time as epoch seconds.
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_expiry(expires_at: Option<&str>) -> Credentials {
        Credentials {
            access_token: Some("token".to_string()),
            expires_at: expires_at.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_expiry_margin_is_inclusive() {
        let now = 1_700_000_000;
        // exactly at the margin counts as expired
        assert!(with_expiry(Some("1700000060")).is_token_expired(now));
        assert!(with_expiry(Some("1700000000")).is_token_expired(now));
        assert!(with_expiry(Some("1699999000")).is_token_expired(now));
        assert!(!with_expiry(Some("1700000061")).is_token_expired(now));
    }

    #[test]
    fn test_missing_or_garbled_expiry_is_expired() {
        assert!(with_expiry(None).is_token_expired(0));
        assert!(with_expiry(Some("soon")).is_token_expired(0));
    }

    #[test]
    fn test_token_state() {
        let now = 1_000;
        assert_eq!(Credentials::default().token_state(now), TokenState::NoToken);
        assert_eq!(
            with_expiry(Some("1030")).token_state(now),
            TokenState::Expired
        );
        assert_eq!(with_expiry(Some("5000")).token_state(now), TokenState::Valid);
    }

    #[test]
    fn test_client_credentials_required() {
        let creds = Credentials {
            client_id: Some("123".to_string()),
            ..Default::default()
        };
        let err = creds.client_credentials().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let creds = Credentials {
            client_id: Some("123".to_string()),
            client_secret: Some("shh".to_string()),
            ..Default::default()
        };
        let (id, secret) = creds.client_credentials().unwrap();
        assert_eq!(id.as_str(), "123");
        assert_eq!(secret.secret(), "shh");
    }

    #[test]
    fn test_apply_tokens() {
        let mut creds = Credentials::default();
        creds.apply_tokens(&TokenSet {
            access_token: "A".to_string(),
            refresh_token: "B".to_string(),
            expires_at: 1_700_000_000,
            athlete: None,
        });
        assert_eq!(creds.access_token.as_deref(), Some("A"));
        assert_eq!(creds.refresh_token.as_deref(), Some("B"));
        assert_eq!(creds.expires_at.as_deref(), Some("1700000000"));
        assert!(creds.is_token_expired(1_700_000_000 - 60));
        assert!(!creds.is_token_expired(1_700_000_000 - 61));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials {
            client_id: Some("123".to_string()),
            client_secret: Some("topsecret".to_string()),
            access_token: Some("abc".to_string()),
            refresh_token: None,
            expires_at: Some("1".to_string()),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("abc"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("<none>"));
    }
}
