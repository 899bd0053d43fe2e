//! Best-effort session snapshots.
//!
//! Snapshots are optional. Nothing in the store depends on them; the chat
//! service saves after a turn and loads on a cache miss, logging failures.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::types::Session;
use crate::error::{Error, Result};

/// Save/load contract for session snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a session, replacing any earlier snapshot of it.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Load a session snapshot, or `None` if there is none.
    async fn load(&self, id: &str) -> Result<Option<Session>>;
}

/// One pretty-printed JSON file per session under a directory.
///
/// Writes for one id are serialized, and a save older than the last one
/// written for that id is skipped.
#[derive(Debug)]
pub struct JsonFileSnapshots {
    dir: PathBuf,
    written: DashMap<String, Arc<Mutex<Option<DateTime<Utc>>>>>,
}

impl JsonFileSnapshots {
    /// Open (and create if needed) a snapshot directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            written: DashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let unsafe_id = id.is_empty()
            || id.contains("..")
            || id.contains('/')
            || id.contains('\\')
            || id.contains('\0');
        if unsafe_id {
            return Err(Error::invalid_input(format!(
                "session id not usable as a snapshot name: {:?}",
                id
            )));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshots {
    async fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.id)?;
        let slot = self.written.entry(session.id.clone()).or_default().clone();
        let mut last_written = slot.lock().await;
        if matches!(*last_written, Some(at) if at > session.last_active) {
            debug!(session_id = %session.id, "Skipped stale session snapshot");
            return Ok(());
        }

        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&path, json).await?;
        *last_written = Some(session.last_active);
        debug!(session_id = %session.id, path = %path.display(), "Saved session snapshot");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Session>> {
        let path = self.path_for(id)?;
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::session::types::Turn;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = JsonFileSnapshots::open(dir.path().join("conversations"))
            .await
            .unwrap();

        let mut session = Session::new("client_1_abc");
        session.push(Turn::new(Role::User, "hi"), 50);
        session.push(Turn::new(Role::Assistant, "hello"), 50);

        snapshots.save(&session).await.unwrap();
        assert!(snapshots.dir().join("client_1_abc.json").exists());

        let loaded = snapshots.load("client_1_abc").await.unwrap();
        assert_eq!(loaded, Some(session));
    }

    #[tokio::test]
    async fn test_older_save_does_not_overwrite_newer() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = JsonFileSnapshots::open(dir.path()).await.unwrap();

        let mut older = Session::new("s");
        older.push(Turn::new(Role::User, "one"), 50);
        let mut newer = older.clone();
        newer.push(Turn::new(Role::Assistant, "two"), 50);
        newer.last_active = older.last_active + chrono::Duration::seconds(1);

        snapshots.save(&newer).await.unwrap();
        snapshots.save(&older).await.unwrap();

        let loaded = snapshots.load("s").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded, newer);
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = JsonFileSnapshots::open(dir.path()).await.unwrap();
        assert!(snapshots.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = JsonFileSnapshots::open(dir.path()).await.unwrap();

        assert!(snapshots.load("../etc/passwd").await.is_err());
        assert!(snapshots.save(&Session::new("a/b")).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = JsonFileSnapshots::open(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("bad.json"), "{not json")
            .await
            .unwrap();

        let err = snapshots.load("bad").await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
