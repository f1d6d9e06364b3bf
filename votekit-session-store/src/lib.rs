//! Durable storage for a single opaque voting-session token.
//!
//! A voting session survives a page reload but must not leak across tabs or
//! outlive logout, so the store holds exactly one token and supports exactly
//! three operations: load, save, clear. Hosts embed the trait behind an `Arc`
//! and pick the implementation that matches their platform; tests and
//! single-shot hosts use [`MemorySessionStore`], long-lived native hosts use
//! [`FileSessionStore`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

/// Errors produced by session-store implementations.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// Underlying filesystem failure.
    #[error("session store io error: {0}")]
    Io(#[from] std::io::Error),
    /// The in-memory store's lock was poisoned by a panicking writer.
    #[error("session store lock poisoned")]
    Poisoned,
    /// The persisted token is not valid UTF-8.
    #[error("persisted session token is not valid utf-8")]
    InvalidToken,
}

/// Convenience alias for store results.
pub type SessionStoreResult<T> = Result<T, SessionStoreError>;

/// Storage for the single opaque session token.
///
/// Written exactly once per authenticated login (when the session credential is
/// created), read on authenticator construction, and cleared on logout or after
/// a successful ballot submission. No other writer may touch it.
pub trait SessionStore: Send + Sync {
    /// Returns the persisted token, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn load(&self) -> SessionStoreResult<Option<String>>;

    /// Persists `token`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, token: &str) -> SessionStoreResult<()>;

    /// Removes the persisted token. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be modified.
    fn clear(&self) -> SessionStoreResult<()>;
}

/// Process-memory store. Survives nothing, which is exactly what tests and
/// hosts with their own persistence layer want.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<String>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> SessionStoreResult<Option<String>> {
        Ok(self
            .token
            .lock()
            .map_err(|_| SessionStoreError::Poisoned)?
            .clone())
    }

    fn save(&self, token: &str) -> SessionStoreResult<()> {
        *self
            .token
            .lock()
            .map_err(|_| SessionStoreError::Poisoned)? = Some(token.to_owned());
        Ok(())
    }

    fn clear(&self) -> SessionStoreResult<()> {
        *self
            .token
            .lock()
            .map_err(|_| SessionStoreError::Poisoned)? = None;
        Ok(())
    }
}

/// File-backed store holding one token per path.
///
/// Writes go to a sibling temp file first and are moved into place with a
/// rename, so a crash mid-write never leaves a truncated token behind.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Creates a store backed by `path`. The file is created on first `save`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| "session".into(), ToOwned::to_owned);
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> SessionStoreResult<Option<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let token = String::from_utf8(bytes)
                    .map_err(|_| SessionStoreError::InvalidToken)?;
                Ok(Some(token))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, token: &str) -> SessionStoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(token.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> SessionStoreResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
