use oauth2::{AuthorizationCode, ClientId, ClientSecret, CsrfToken, RefreshToken, TokenUrl};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{Error, Result, config::StravaConfig, utils::timed};

/// The part of the token endpoint's answer we keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch seconds.
    pub expires_at: i64,
    /// Only sent on the initial code exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub athlete: Option<AthleteSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteSummary {
    pub id: Option<u64>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

impl AthleteSummary {
    pub fn display_name(&self) -> String {
        let name = [self.firstname.as_deref(), self.lastname.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            "unknown athlete".to_string()
        } else {
            name
        }
    }
}

/// The two grants the token endpoint accepts from us.
pub enum Grant<'a> {
    AuthorizationCode(&'a AuthorizationCode),
    RefreshToken(&'a RefreshToken),
}

impl Grant<'_> {
    fn form(&self) -> [(&'static str, &str); 2] {
        match self {
            Grant::AuthorizationCode(code) => {
                [("code", code.secret().as_str()), ("grant_type", "authorization_code")]
            }
            Grant::RefreshToken(token) => [
                ("refresh_token", token.secret().as_str()),
                ("grant_type", "refresh_token"),
            ],
        }
    }

    fn failure(&self, status: u16, body: String) -> Error {
        match self {
            Grant::AuthorizationCode(_) => Error::TokenExchange { status, body },
            Grant::RefreshToken(_) => Error::TokenRefresh { status, body },
        }
    }
}

/// Talks to the provider's token endpoint.
pub struct TokenClient {
    http: reqwest::Client,
    token_url: TokenUrl,
    client_id: ClientId,
    client_secret: ClientSecret,
}

impl TokenClient {
    pub fn new(
        http: reqwest::Client,
        token_url: TokenUrl,
        client_id: ClientId,
        client_secret: ClientSecret,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id,
            client_secret,
        }
    }

    /// Trade a one-time authorization code for the first token set.
    pub async fn exchange_code(&self, code: &AuthorizationCode) -> Result<TokenSet> {
        let tokens = self.request(Grant::AuthorizationCode(code)).await?;
        info!("Successfully obtained tokens");
        if let Some(athlete) = &tokens.athlete {
            info!(
                "Authorized athlete: {} (id {})",
                athlete.display_name(),
                athlete
                    .id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            );
        }
        Ok(tokens)
    }

    pub async fn refresh(&self, refresh_token: &RefreshToken) -> Result<TokenSet> {
        info!("Refreshing Strava access token");
        let tokens = self.request(Grant::RefreshToken(refresh_token)).await?;
        info!("Token refreshed successfully");
        Ok(tokens)
    }

    async fn request(&self, grant: Grant<'_>) -> Result<TokenSet> {
        let [(grant_key, grant_value), (_, grant_type)] = grant.form();
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.secret().as_str()),
            (grant_key, grant_value),
            ("grant_type", grant_type),
        ];

        debug!("POST {}", self.token_url.as_str());
        let response = timed(
            "token request",
            self.http.post(self.token_url.as_str()).form(&form).send(),
        )
        .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(grant.failure(status.as_u16(), body));
        }

        Ok(response.json::<TokenSet>().await?)
    }
}

/// The consent page the user is sent to.
pub fn authorization_url(config: &StravaConfig, client_id: &ClientId, state: &CsrfToken) -> Url {
    let mut url = config.auth_url.url().clone();
    url.query_pairs_mut()
        .append_pair("client_id", client_id.as_str())
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", config.redirect_url.as_str())
        .append_pair("approval_prompt", "force")
        .append_pair("scope", &config.scopes)
        .append_pair("state", state.secret());
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url() {
        let config = StravaConfig::strava().unwrap();
        let url = authorization_url(
            &config,
            &ClientId::new("12345".to_string()),
            &CsrfToken::new("xyz".to_string()),
        );

        assert_eq!(url.host_str(), Some("www.strava.com"));
        assert_eq!(url.path(), "/oauth/authorize");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("client_id"), Some("12345"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("redirect_uri"), Some("http://localhost:8080/"));
        assert_eq!(get("approval_prompt"), Some("force"));
        assert_eq!(get("scope"), Some("read,activity:read_all,profile:read_all"));
        assert_eq!(get("state"), Some("xyz"));
    }

    #[test]
    fn test_token_set_parses_provider_response() {
        let body = serde_json::json!({
            "token_type": "Bearer",
            "expires_at": 1700000000,
            "expires_in": 21600,
            "refresh_token": "B",
            "access_token": "A",
            "athlete": {"id": 42, "firstname": "Ada", "lastname": "Lovelace", "city": "London"}
        });
        let tokens: TokenSet = serde_json::from_value(body).unwrap();
        assert_eq!(tokens.access_token, "A");
        assert_eq!(tokens.refresh_token, "B");
        assert_eq!(tokens.expires_at, 1_700_000_000);
        let athlete = tokens.athlete.unwrap();
        assert_eq!(athlete.id, Some(42));
        assert_eq!(athlete.display_name(), "Ada Lovelace");
    }

    #[test]
    fn test_refresh_response_has_no_athlete() {
        let body = serde_json::json!({
            "access_token": "A",
            "refresh_token": "B",
            "expires_at": 1
        });
        let tokens: TokenSet = serde_json::from_value(body).unwrap();
        assert!(tokens.athlete.is_none());
    }

    #[test]
    fn test_grant_form_fields() {
        let code = AuthorizationCode::new("XYZ".to_string());
        assert_eq!(
            Grant::AuthorizationCode(&code).form(),
            [("code", "XYZ"), ("grant_type", "authorization_code")]
        );

        let refresh = RefreshToken::new("R".to_string());
        assert_eq!(
            Grant::RefreshToken(&refresh).form(),
            [("refresh_token", "R"), ("grant_type", "refresh_token")]
        );
    }

    #[test]
    fn test_anonymous_display_name() {
        let athlete = AthleteSummary {
            id: None,
            firstname: None,
            lastname: None,
        };
        assert_eq!(athlete.display_name(), "unknown athlete");
    }
}
