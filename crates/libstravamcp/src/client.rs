use std::sync::Arc;

use oauth2::RefreshToken;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    Error, Result,
    authflow::{AuthorizationFlow, Authorizer},
    config::{DEFAULT_PER_PAGE, StravaConfig},
    credentials::{Credentials, TokenState, now_epoch},
    oauth::{TokenClient, TokenSet},
    storage::CredentialStore,
    utils::timed,
};

/// Filters and paging for the activity list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityQuery {
    /// Only activities before this epoch second.
    pub before: Option<i64>,
    /// Only activities after this epoch second.
    pub after: Option<i64>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self {
            before: None,
            after: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl ActivityQuery {
    /// Query parameters in the order the API documents them. A zero
    /// timestamp is treated as no filter.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
        ];
        if let Some(before) = self.before.filter(|t| *t != 0) {
            params.push(("before", before.to_string()));
        }
        if let Some(after) = self.after.filter(|t| *t != 0) {
            params.push(("after", after.to_string()));
        }
        params
    }
}

/// Read-only Strava API client that keeps its own token fresh.
///
/// Every call first makes sure there is a usable access token: with none at
/// all it runs the authorizer and re-reads the store, and with one inside the
/// expiry margin it refreshes it. Each request is then attempted exactly once.
pub struct StravaClient {
    http: reqwest::Client,
    config: Arc<StravaConfig>,
    store: CredentialStore,
    credentials: Credentials,
    authorizer: Box<dyn Authorizer>,
}

impl StravaClient {
    /// A client that falls back to the browser flow when no token exists.
    pub fn new(config: Arc<StravaConfig>, store: CredentialStore) -> Result<Self> {
        let http = config.http_client()?;
        let authorizer = AuthorizationFlow::new(config.clone(), http.clone());
        Self::with_authorizer(config, store, http, Box::new(authorizer))
    }

    pub fn with_authorizer(
        config: Arc<StravaConfig>,
        store: CredentialStore,
        http: reqwest::Client,
        authorizer: Box<dyn Authorizer>,
    ) -> Result<Self> {
        let credentials = store.load()?;
        Ok(Self {
            http,
            config,
            store,
            credentials,
            authorizer,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return an access token that is good for at least another minute.
    pub async fn ensure_token(&mut self) -> Result<String> {
        if self.credentials.token_state(now_epoch()) == TokenState::NoToken {
            warn!("No access token found. Triggering authentication flow...");
            self.authorizer.authorize(&self.store).await?;
            self.credentials = self.store.load()?;
        }

        match self.credentials.token_state(now_epoch()) {
            TokenState::NoToken => {
                return Err(Error::Authentication(
                    "Authentication flow failed to retrieve an access token.".to_string(),
                ));
            }
            TokenState::Expired => {
                self.refresh().await?;
            }
            TokenState::Valid => {}
        }

        self.credentials.access_token.clone().ok_or_else(|| {
            Error::Authentication("Access token disappeared after refresh".to_string())
        })
    }

    /// Trade the stored refresh token for a new token set and persist it.
    pub async fn refresh(&mut self) -> Result<TokenSet> {
        let refresh_token = self.credentials.refresh_token.clone().ok_or_else(|| {
            Error::Authentication(
                "No refresh token available. Please run `stravamcp auth login` first.".to_string(),
            )
        })?;
        let (client_id, client_secret) = self.credentials.client_credentials()?;

        let token_client = TokenClient::new(
            self.http.clone(),
            self.config.token_url.clone(),
            client_id,
            client_secret,
        );
        let tokens = token_client
            .refresh(&RefreshToken::new(refresh_token))
            .await?;

        self.store.save_tokens(&tokens)?;
        self.credentials.apply_tokens(&tokens);
        Ok(tokens)
    }

    /// The authenticated athlete's profile.
    pub async fn athlete_profile(&mut self) -> Result<Value> {
        self.get_json("athlete", &[]).await
    }

    /// Totals for an athlete; only activities visible to everyone count.
    pub async fn athlete_stats(&mut self, athlete_id: u64) -> Result<Value> {
        self.get_json(&format!("athletes/{athlete_id}/stats"), &[])
            .await
    }

    /// Heart rate and power zones of the authenticated athlete.
    pub async fn athlete_zones(&mut self) -> Result<Value> {
        self.get_json("athlete/zones", &[]).await
    }

    pub async fn list_activities(&mut self, query: ActivityQuery) -> Result<Value> {
        self.get_json("athlete/activities", &query.params()).await
    }

    pub async fn activity(&mut self, activity_id: u64, include_all_efforts: bool) -> Result<Value> {
        self.get_json(
            &format!("activities/{activity_id}"),
            &[("include_all_efforts", include_all_efforts.to_string())],
        )
        .await
    }

    async fn get_json(&mut self, path: &str, query: &[(&'static str, String)]) -> Result<Value> {
        let token = self.ensure_token().await?;
        let url = self.config.api_base.join(path)?;

        debug!("GET {url}");
        let mut request = self.http.get(url.as_str()).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = timed(format!("GET {path}"), request.send()).await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            info!("GET {path} failed with status {status}");
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_query_defaults() {
        let query = ActivityQuery::default();
        assert_eq!(
            query.params(),
            vec![("page", "1".to_string()), ("per_page", "30".to_string())]
        );
    }

    #[test]
    fn test_activity_query_filters() {
        let query = ActivityQuery {
            before: Some(2_000_000),
            after: Some(1_000_000),
            page: 2,
            ..Default::default()
        };
        assert_eq!(
            query.params(),
            vec![
                ("page", "2".to_string()),
                ("per_page", "30".to_string()),
                ("before", "2000000".to_string()),
                ("after", "1000000".to_string()),
            ]
        );
    }

    #[test]
    fn test_zero_timestamps_are_dropped() {
        let query = ActivityQuery {
            before: Some(0),
            after: Some(0),
            ..Default::default()
        };
        assert_eq!(query.params().len(), 2);
    }
}
