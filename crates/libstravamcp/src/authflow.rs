use std::sync::Arc;

use async_trait::async_trait;
use oauth2::{AuthorizationCode, CsrfToken};
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};

use crate::{
    Error, Result,
    callback::{CallbackListener, CallbackOutcome},
    config::StravaConfig,
    oauth::{TokenClient, authorization_url},
    storage::CredentialStore,
};

/// Something that can put a fresh token set into the credential store.
///
/// Implementations do not report provider-side refusals as errors: the
/// caller re-reads the store afterwards and decides from what it finds.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, store: &CredentialStore) -> Result<()>;
}

/// The browser-based authorization code flow.
pub struct AuthorizationFlow {
    config: Arc<StravaConfig>,
    http: reqwest::Client,
}

impl AuthorizationFlow {
    pub fn new(config: Arc<StravaConfig>, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Run the whole flow: consent page, callback, code exchange.
    ///
    /// Fails only when the client pair is missing, the callback port cannot
    /// be bound, or nobody calls back within the configured timeout. A denied
    /// consent or a failed exchange is logged and leaves the store untouched.
    pub async fn run(&self, store: &CredentialStore) -> Result<()> {
        let credentials = store.load()?;
        let (client_id, client_secret) = credentials.client_credentials()?;

        let state = CsrfToken::new_random();
        let url = authorization_url(&self.config, &client_id, &state);

        // Bind first so an instant redirect cannot beat us to the port.
        let listener = CallbackListener::bind(&self.config.callback_addr)
            .await
            .map_err(|e| {
                Error::Configuration(format!(
                    "Could not listen for the authorization callback on {}: {e}",
                    self.config.callback_addr
                ))
            })?
            .with_expected_state(state.secret().clone());

        info!("Opening browser to authorize with Strava...");
        info!("If the browser doesn't open automatically, navigate to:\n{url}");
        if self.config.open_browser {
            if let Err(e) = open::that(url.as_str()) {
                warn!("Could not open browser automatically: {e}");
            }
        }

        info!(
            "Waiting for the authorization callback on {}",
            self.config.callback_addr
        );
        let token_client = TokenClient::new(
            self.http.clone(),
            self.config.token_url.clone(),
            client_id,
            client_secret,
        );
        self.await_callback(listener, &token_client, store).await
    }

    /// Drive `listener` until a terminal request arrives or time runs out.
    pub async fn await_callback(
        &self,
        listener: CallbackListener,
        token_client: &TokenClient,
        store: &CredentialStore,
    ) -> Result<()> {
        let deadline = Instant::now() + self.config.callback_timeout;

        loop {
            let outcome = timeout_at(deadline, listener.next_outcome())
                .await
                .map_err(|_| Error::CallbackTimeout(self.config.callback_timeout))??;

            match outcome {
                CallbackOutcome::Code(code) => {
                    info!("Received authorization code. Exchanging for tokens...");
                    match token_client
                        .exchange_code(&AuthorizationCode::new(code))
                        .await
                    {
                        Ok(tokens) => {
                            store.save_tokens(&tokens)?;
                            info!("Tokens saved to {}", store.path().display());
                        }
                        Err(e) => error!("Failed to exchange authorization code: {e}"),
                    }
                    break;
                }
                CallbackOutcome::Denied(reason) => {
                    error!("Authorization failed: {reason}");
                    break;
                }
                CallbackOutcome::NoCode => {
                    info!("Callback request without an authorization code, still waiting");
                }
            }
        }

        drop(listener);
        info!("Callback listener closed. Auth flow complete.");
        Ok(())
    }
}

#[async_trait]
impl Authorizer for AuthorizationFlow {
    async fn authorize(&self, store: &CredentialStore) -> Result<()> {
        self.run(store).await
    }
}
