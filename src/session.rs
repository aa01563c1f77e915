use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::ApiError;

/// Persisted bearer credential for one backend origin.
///
/// Holds the token's lifecycle only: no network calls, no validation. The
/// server rejecting a request is the only signal that a token has gone bad.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Open the store at the platform config location for `base_url`'s origin.
    pub fn open(base_url: &Url) -> Result<Self, ApiError> {
        let root = dirs::config_dir()
            .ok_or_else(|| ApiError::Internal("no config directory".into()))?
            .join("pool-console");
        Ok(Self::at(&root, base_url))
    }

    /// Open the store under an explicit root directory.
    pub fn at(root: &Path, base_url: &Url) -> Self {
        Self {
            path: root.join(format!("{}.token", origin_key(base_url))),
        }
    }

    /// Read the persisted token, if any.
    pub fn get(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }

    /// Persist a new token, replacing any existing one.
    pub fn set(&self, token: &str) -> Result<(), ApiError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, token)?;
        Ok(())
    }

    /// Remove the persisted token. Succeeds when none exists.
    pub fn clear(&self) -> Result<(), ApiError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Filesystem-safe key for a backend origin, e.g. `http-localhost-8080`.
///
/// Tokens for different backends must never collide.
fn origin_key(base_url: &Url) -> String {
    let mut key = format!(
        "{}-{}",
        base_url.scheme(),
        base_url.host_str().unwrap_or("localhost")
    );
    if let Some(port) = base_url.port_or_known_default() {
        key.push('-');
        key.push_str(&port.to_string());
    }
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
