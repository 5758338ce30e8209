//! File-backed session store.
//!
//! One JSON file per session under a spool directory. Used when no
//! external store is configured but sessions must survive a restart.
//! Writes go through a temp file and an atomic rename; a process-local
//! mutex serializes the read-modify-write so compare-and-set holds
//! within one process instance.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use proxy_application::{SessionStore, StoreError, StoredSession};
use proxy_domain::Session;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct SessionRecord {
    session: Session,
    version: u64,
    expires_at: DateTime<Utc>,
}

pub struct FileSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Session ids come from clients; only a safe character set may
    /// reach the filesystem.
    fn path_for(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    async fn read_record(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.path_for(session_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        let record: SessionRecord = serde_json::from_slice(&data)
            .map_err(|e| StoreError::Corrupt(format!("session '{session_id}': {e}")))?;
        if record.expires_at <= Utc::now() {
            debug!(session_id, "Session file expired, removing");
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(record))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<StoredSession>, StoreError> {
        Ok(self.read_record(session_id).await?.map(|r| StoredSession {
            session: r.session,
            version: r.version,
        }))
    }

    async fn put(
        &self,
        session: &Session,
        version: u64,
        expiry_secs: u64,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;

        let current = self
            .read_record(session.id())
            .await?
            .map(|r| r.version)
            .unwrap_or(0);
        if current != version {
            return Err(StoreError::Conflict(session.id().to_string()));
        }

        let next = version + 1;
        let record = SessionRecord {
            session: session.clone(),
            version: next,
            expires_at: Utc::now() + Duration::seconds(expiry_secs as i64),
        };
        let data = serde_json::to_vec(&record)
            .map_err(|e| StoreError::Io(format!("failed to encode session: {e}")))?;

        let path = self.path_for(session.id());
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(next)
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let path = self.path_for(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }
}
