//! Session store port
//!
//! Key/value storage for sessions with expiry and compare-and-set.
//! Read-modify-write cycles across process instances stay atomic through
//! the version counter: `put` with a stale version fails with
//! [`StoreError::Conflict`].

use async_trait::async_trait;
use proxy_domain::Session;
use thiserror::Error;

/// Errors from the session store collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Stored session is corrupt: {0}")]
    Corrupt(String),

    #[error("Version conflict for session '{0}'")]
    Conflict(String),
}

/// A session plus the store version it was read at.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub session: Session,
    pub version: u64,
}

/// Port for the external session store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session. Expired entries are treated as absent.
    async fn get(&self, session_id: &str) -> Result<Option<StoredSession>, StoreError>;

    /// Write a session with the configured expiry, compare-and-set on the
    /// version read at `get` time. Pass `version = 0` for a new session.
    async fn put(
        &self,
        session: &Session,
        version: u64,
        expiry_secs: u64,
    ) -> Result<u64, StoreError>;

    /// Remove a session (explicit client reset).
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;
}
