//! Session manager
//!
//! Loads or creates a session for a request, enforces per-session
//! exclusivity, merges inbound messages with server-side history, trims
//! to the context budget, and persists through the store port.

use std::collections::HashMap;
use std::sync::Arc;

use proxy_domain::{ContextBudget, Message, Role, Session, trim_history};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::ports::session_store::{SessionStore, StoreError};

#[derive(Error, Debug)]
pub enum SessionError {
    /// Another request holds this session.
    #[error("Session '{0}' is busy")]
    Busy(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Exclusive access to one session for the duration of a request.
///
/// Holds the per-session lock; dropping the guard releases it. The
/// version is the store version the session was read at, used for the
/// compare-and-set on commit.
#[derive(Debug)]
pub struct SessionGuard {
    pub session: Session,
    version: u64,
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        self.session.id()
    }
}

pub struct SessionManager<S: SessionStore> {
    store: Arc<S>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    budget: ContextBudget,
    expiry_secs: u64,
}

impl<S: SessionStore> SessionManager<S> {
    pub fn new(store: Arc<S>, budget: ContextBudget, expiry_secs: u64) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            budget,
            expiry_secs,
        }
    }

    /// Acquire the session for exclusive use, loading stored history and
    /// merging the inbound messages into it.
    ///
    /// A concurrent request on the same session fails immediately with
    /// [`SessionError::Busy`] rather than queueing.
    pub async fn acquire(
        &self,
        session_id: &str,
        incoming: Vec<Message>,
    ) -> Result<SessionGuard, SessionError> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // An entry only the map still references has no guard in
            // flight; sweep those so one-shot anonymous sessions do not
            // accumulate entries for the life of the process. Clones only
            // happen under this lock, so the count cannot race.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let permit = lock
            .try_lock_owned()
            .map_err(|_| SessionError::Busy(session_id.to_string()))?;

        let stored = self.store.get(session_id).await?;
        let (mut session, version) = match stored {
            Some(s) => {
                debug!(session_id, version = s.version, "Reusing stored session");
                (s.session, s.version)
            }
            None => (Session::new(session_id.to_string()), 0),
        };

        let messages = merge_history(session.messages().to_vec(), incoming);
        session.set_messages(messages);
        session.touch();

        Ok(SessionGuard {
            session,
            version,
            _permit: permit,
        })
    }

    /// Trim the guarded session's history to the context budget and
    /// return the messages to send to the model.
    pub fn export_for_model(&self, guard: &SessionGuard) -> Vec<Message> {
        trim_history(guard.session.messages().to_vec(), self.budget)
    }

    /// Persist the session with the configured expiry. A version conflict
    /// means a concurrent writer got there first; the session is left
    /// as the other writer stored it.
    pub async fn commit(&self, guard: &mut SessionGuard) -> Result<(), SessionError> {
        guard.session.touch();
        let version = self
            .store
            .put(&guard.session, guard.version, self.expiry_secs)
            .await?;
        guard.version = version;
        Ok(())
    }

    /// Best-effort persist for error paths. Failures are logged, not
    /// propagated, so the original error reaches the client.
    pub async fn commit_best_effort(&self, guard: &mut SessionGuard) {
        if let Err(e) = self.commit(guard).await {
            warn!(session_id = guard.id(), error = %e, "Failed to persist session");
        }
    }

    #[cfg(test)]
    pub(crate) async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Merge inbound messages with stored history.
///
/// When the leading system messages match (or the inbound list is
/// empty), the stored history wins: it carries tool results the client
/// never saw. Inbound user messages beyond those already stored are
/// appended so the newest turn is not lost. On a system-prompt change
/// the inbound list replaces the history outright.
fn merge_history(stored: Vec<Message>, incoming: Vec<Message>) -> Vec<Message> {
    if stored.is_empty() {
        return incoming;
    }
    if incoming.is_empty() {
        return stored;
    }
    let systems_match = match (&stored[0], &incoming[0]) {
        (s, i) if s.role == Role::System && i.role == Role::System => s.content == i.content,
        _ => false,
    };
    if !systems_match {
        return incoming;
    }

    let stored_users = stored.iter().filter(|m| m.role == Role::User).count();
    let mut merged = stored;
    merged.extend(
        incoming
            .into_iter()
            .filter(|m| m.role == Role::User)
            .skip(stored_users),
    );
    merged
}
