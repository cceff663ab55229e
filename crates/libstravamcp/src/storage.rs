use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{credentials::Credentials, oauth::TokenSet};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed credential file: {0}")]
    Parse(#[from] dotenvy::Error),
    #[error("Failed to get config directory")]
    ConfigDir,
}

/// The five keys the credential file knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    ClientId,
    ClientSecret,
    AccessToken,
    RefreshToken,
    ExpiresAt,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 5] = [
        CredentialKey::ClientId,
        CredentialKey::ClientSecret,
        CredentialKey::AccessToken,
        CredentialKey::RefreshToken,
        CredentialKey::ExpiresAt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::ClientId => "STRAVA_CLIENT_ID",
            CredentialKey::ClientSecret => "STRAVA_CLIENT_SECRET",
            CredentialKey::AccessToken => "STRAVA_ACCESS_TOKEN",
            CredentialKey::RefreshToken => "STRAVA_REFRESH_TOKEN",
            CredentialKey::ExpiresAt => "EXPIRES_AT",
        }
    }
}

/// A dotenv-style file holding the client pair and the current tokens.
///
/// Saving touches only the lines of the keys being written; comments,
/// unrelated variables and ordering survive. Writes go through a temp file
/// that is synced and renamed over the original, so a crash leaves either the
/// old or the new file behind.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/stravamcp/.env`
    pub fn default_path() -> Result<PathBuf, StorageError> {
        Ok(dirs::config_dir()
            .ok_or(StorageError::ConfigDir)?
            .join("stravamcp")
            .join(".env"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current credentials. A missing file is an empty one.
    pub fn load(&self) -> Result<Credentials, StorageError> {
        if !self.path.exists() {
            return Ok(Credentials::default());
        }

        let mut values = HashMap::new();
        for item in dotenvy::from_path_iter(&self.path)? {
            let (key, value) = item?;
            if !value.is_empty() {
                values.insert(key, value);
            }
        }

        let mut take = |key: CredentialKey| values.remove(key.as_str());
        Ok(Credentials {
            client_id: take(CredentialKey::ClientId),
            client_secret: take(CredentialKey::ClientSecret),
            access_token: take(CredentialKey::AccessToken),
            refresh_token: take(CredentialKey::RefreshToken),
            expires_at: take(CredentialKey::ExpiresAt),
        })
    }

    /// Write the given keys, leaving every other line of the file alone.
    pub fn save(&self, entries: &[(CredentialKey, &str)]) -> Result<(), StorageError> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut written: HashSet<CredentialKey> = HashSet::new();
        let mut lines: Vec<String> = Vec::new();

        for line in existing.lines() {
            let entry = line_key(line)
                .and_then(|key| entries.iter().find(|(k, _)| k.as_str() == key));
            match entry {
                // Later duplicates would shadow the new value on load.
                Some((key, _)) if written.contains(key) => {}
                Some((key, value)) => {
                    lines.push(format_entry(*key, value));
                    written.insert(*key);
                }
                None => lines.push(line.to_string()),
            }
        }

        for (key, value) in entries {
            if written.insert(*key) {
                lines.push(format_entry(*key, value));
            }
        }

        let mut contents = lines.join("\n");
        contents.push('\n');
        self.write_atomic(contents.as_bytes())
    }

    /// Persist the three token values returned by the token endpoint.
    pub fn save_tokens(&self, tokens: &TokenSet) -> Result<(), StorageError> {
        let expires_at = tokens.expires_at.to_string();
        self.save(&[
            (CredentialKey::AccessToken, tokens.access_token.as_str()),
            (CredentialKey::RefreshToken, tokens.refresh_token.as_str()),
            (CredentialKey::ExpiresAt, expires_at.as_str()),
        ])
    }

    fn write_atomic(&self, contents: &[u8]) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".env".to_string());
        let tmp_path = dir.join(format!("{file_name}.tmp"));

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)?;

        #[cfg(unix)]
        if let Ok(dir) = fs::File::open(&dir) {
            let _ = dir.sync_all();
        }

        Ok(())
    }
}

/// The variable name on a `KEY=value` line, if it is one.
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, _) = trimmed.split_once('=')?;
    Some(key.trim())
}

fn format_entry(key: CredentialKey, value: &str) -> String {
    if value.contains('\'') {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$");
        format!("{}=\"{escaped}\"", key.as_str())
    } else {
        format!("{}='{value}'", key.as_str())
    }
}
