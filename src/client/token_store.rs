use crate::client::clock::{Clock, SystemClock};
use crate::client::error::ClientError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Fallback lifetime when the server omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// The persisted auth record. Tokens are always replaced wholesale; there is
/// no partial update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedAuth {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry of the access token, epoch milliseconds, computed
    /// client-side at save time.
    pub expires_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

/// Expiry bookkeeping derived from the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenExpiry {
    pub expires_at_ms: i64,
    pub time_until_expiry_ms: i64,
    pub is_expired: bool,
    pub will_expire_soon: bool,
}

/// Durable key-value substrate for the auth record. Reads and writes are
/// synchronous; cross-context change notification is layered on top by
/// [`TokenStore`].
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    fn load(&self) -> Result<Option<PersistedAuth>, ClientError>;
    fn store(&self, auth: &PersistedAuth) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<PersistedAuth>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<PersistedAuth>>, ClientError> {
        self.slot.lock().map_err(|_| ClientError::Storage("memory backend poisoned".to_string()))
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> Result<Option<PersistedAuth>, ClientError> {
        Ok(self.lock()?.clone())
    }

    fn store(&self, auth: &PersistedAuth) -> Result<(), ClientError> {
        *self.lock()? = Some(auth.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.lock()? = None;
        Ok(())
    }
}

/// File-backed storage so a session survives process restarts.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> Result<Option<PersistedAuth>, ClientError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| ClientError::Storage(format!("corrupt auth file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Storage(e.to_string())),
        }
    }

    fn store(&self, auth: &PersistedAuth) -> Result<(), ClientError> {
        let raw = serde_json::to_vec_pretty(auth).map_err(|e| ClientError::Storage(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| ClientError::Storage(e.to_string()))
    }

    fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Storage(e.to_string())),
        }
    }
}

/// Holder for the current token pair and expiry. Every mutation bumps a
/// watch channel; the channel carries no value beyond a version counter, so
/// listeners must re-read the store (the signal is pure invalidation).
#[derive(Debug, Clone)]
pub struct TokenStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    changed: Arc<watch::Sender<u64>>,
}

impl TokenStore {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        let (changed, _) = watch::channel(0);
        Self { backend, clock, changed: Arc::new(changed) }
    }

    /// Volatile store with the system clock; the common default for tests
    /// and short-lived tools.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), Arc::new(SystemClock))
    }

    /// Subscribes to the "auth changed" signal. Receivers should re-read
    /// store state on every notification and tolerate redundant ones.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    /// Replaces all token fields atomically from the caller's perspective.
    /// `expires_in_secs` defaults to [`DEFAULT_EXPIRES_IN_SECS`].
    pub fn save_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in_secs: Option<i64>,
    ) -> Result<(), ClientError> {
        let expires_in = expires_in_secs.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let user = self.backend.load()?.and_then(|auth| auth.user);

        self.backend.store(&PersistedAuth {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at_ms: self.clock.now_ms() + expires_in * 1000,
            user,
        })?;

        self.notify();
        Ok(())
    }

    /// Caches the user profile alongside the tokens. A no-op when no token
    /// pair is held.
    pub fn save_user(&self, user: serde_json::Value) -> Result<(), ClientError> {
        if let Some(mut auth) = self.backend.load()? {
            auth.user = Some(user);
            self.backend.store(&auth)?;
            self.notify();
        }
        Ok(())
    }

    pub fn read(&self) -> Result<Option<PersistedAuth>, ClientError> {
        self.backend.load()
    }

    pub fn access_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.backend.load()?.map(|auth| auth.access_token))
    }

    pub fn refresh_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.backend.load()?.map(|auth| auth.refresh_token))
    }

    #[must_use]
    pub fn user(&self) -> Option<serde_json::Value> {
        self.backend.load().ok().flatten().and_then(|auth| auth.user)
    }

    /// Derived: a token pair is held and the access token has not expired.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.backend
            .load()
            .ok()
            .flatten()
            .is_some_and(|auth| auth.expires_at_ms > self.clock.now_ms())
    }

    /// Expiry bookkeeping against the given refresh threshold.
    pub fn expiry(&self, refresh_threshold_ms: i64) -> Result<Option<TokenExpiry>, ClientError> {
        let Some(auth) = self.backend.load()? else {
            return Ok(None);
        };

        let time_until_expiry_ms = auth.expires_at_ms - self.clock.now_ms();
        Ok(Some(TokenExpiry {
            expires_at_ms: auth.expires_at_ms,
            time_until_expiry_ms,
            is_expired: time_until_expiry_ms <= 0,
            will_expire_soon: time_until_expiry_ms <= refresh_threshold_ms,
        }))
    }

    /// Removes all fields. Safe to call when already empty.
    pub fn clear(&self) -> Result<(), ClientError> {
        self.backend.clear()?;
        self.notify();
        Ok(())
    }

    fn notify(&self) {
        self.changed.send_modify(|version| *version = version.wrapping_add(1));
    }
}
