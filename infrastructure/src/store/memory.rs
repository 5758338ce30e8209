//! In-memory session store.
//!
//! The default store for a single-process deployment. Expiry is enforced
//! lazily on read; versioning follows the same compare-and-set contract
//! as the external backends.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use proxy_application::{SessionStore, StoreError, StoredSession};
use proxy_domain::Session;
use tokio::sync::Mutex;

struct Entry {
    session: Session,
    version: u64,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<HashMap<String, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<StoredSession>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.get(session_id) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Some(StoredSession {
                session: entry.session.clone(),
                version: entry.version,
            })),
            Some(_) => {
                inner.remove(session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        session: &Session,
        version: u64,
        expiry_secs: u64,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .get(session.id())
            .filter(|e| e.expires_at > Utc::now())
            .map(|e| e.version)
            .unwrap_or(0);
        if current != version {
            return Err(StoreError::Conflict(session.id().to_string()));
        }
        let next = version + 1;
        inner.insert(
            session.id().to_string(),
            Entry {
                session: session.clone(),
                version: next,
                expires_at: Utc::now() + Duration::seconds(expiry_secs as i64),
            },
        );
        Ok(next)
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.inner.lock().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_domain::Message;

    fn session(id: &str) -> Session {
        let mut s = Session::new(id);
        s.append(Message::user("hi"));
        s
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemorySessionStore::new();
        let v = store.put(&session("s1"), 0, 3600).await.unwrap();
        assert_eq!(v, 1);

        let stored = store.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.session.messages().len(), 1);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = InMemorySessionStore::new();
        store.put(&session("s1"), 0, 3600).await.unwrap();
        let err = store.put(&session("s1"), 0, 3600).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let store = InMemorySessionStore::new();
        store.put(&session("s1"), 0, 0).await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
        // A fresh write starts over at version 1.
        assert_eq!(store.put(&session("s1"), 0, 3600).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let store = InMemorySessionStore::new();
        store.put(&session("s1"), 0, 3600).await.unwrap();
        store.delete("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
    }
}
