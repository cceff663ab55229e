use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    Result, client::StravaClient, config::StravaConfig, output::Output, storage::CredentialStore,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Central context passed to all commands
pub struct Ctx {
    /// Path to the credential file
    pub env_file: PathBuf,
    /// Provider endpoints and flow settings
    pub config: Arc<StravaConfig>,
    /// Output instance for consistent formatting
    pub output: Output,
}

impl Ctx {
    pub fn new(env_file: PathBuf, config: StravaConfig, output: Output) -> Self {
        Self {
            env_file,
            config: Arc::new(config),
            output,
        }
    }

    pub fn storage(&self) -> CredentialStore {
        CredentialStore::new(self.env_file.clone())
    }

    /// A client backed by the configured store, using the browser flow when
    /// no token exists yet.
    pub fn client(&self) -> Result<StravaClient> {
        StravaClient::new(self.config.clone(), self.storage())
    }
}
