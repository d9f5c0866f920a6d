use crate::session::SessionRecord;
use async_trait::async_trait;
use parley_core::{ParleyError, ParleyResult, SessionId};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};

/// Per-session conversation state: the current state name and the
/// serialized form blob of the active flow.
///
/// Handlers are the only writers. A session that was never written reads
/// as idle (`""`) with no blob.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Set the current state name.
    async fn save_state(&self, session: SessionId, state: &str) -> ParleyResult<()>;
    /// Current state name, `""` when idle or unknown.
    async fn get_state(&self, session: SessionId) -> ParleyResult<String>;
    /// Replace the session blob.
    async fn save_blob(&self, session: SessionId, blob: &str) -> ParleyResult<()>;
    /// The session blob, if one exists.
    async fn get_blob(&self, session: SessionId) -> ParleyResult<Option<String>>;
    /// Drop the session blob. Removing an absent blob is not an error.
    async fn remove_blob(&self, session: SessionId) -> ParleyResult<()>;
}

// ---------------------------------------------------------------------------
// InMemoryConversationStore
// ---------------------------------------------------------------------------

/// Process-local store. State is lost on restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl InMemoryConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions that are not idle.
    pub async fn active_sessions(&self) -> usize {
        self.records.read().await.len()
    }

    async fn update<F>(&self, session: SessionId, f: F)
    where
        F: FnOnce(&mut SessionRecord) + Send,
    {
        let mut records = self.records.write().await;
        let record = records
            .entry(session)
            .or_insert_with(|| SessionRecord::new(session));
        f(record);
        record.touch();
        if record.is_idle() {
            records.remove(&session);
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn save_state(&self, session: SessionId, state: &str) -> ParleyResult<()> {
        self.update(session, |r| r.state = state.to_string()).await;
        Ok(())
    }

    async fn get_state(&self, session: SessionId) -> ParleyResult<String> {
        Ok(self
            .records
            .read()
            .await
            .get(&session)
            .map(|r| r.state.clone())
            .unwrap_or_default())
    }

    async fn save_blob(&self, session: SessionId, blob: &str) -> ParleyResult<()> {
        self.update(session, |r| r.blob = Some(blob.to_string())).await;
        Ok(())
    }

    async fn get_blob(&self, session: SessionId) -> ParleyResult<Option<String>> {
        Ok(self
            .records
            .read()
            .await
            .get(&session)
            .and_then(|r| r.blob.clone()))
    }

    async fn remove_blob(&self, session: SessionId) -> ParleyResult<()> {
        self.update(session, |r| r.blob = None).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileConversationStore
// ---------------------------------------------------------------------------

/// File-based store: one JSON document per non-idle session.
///
/// Writes are read-modify-write on a single file, so they are serialized
/// through one store-wide lock. Files are replaced atomically via rename.
pub struct FileConversationStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConversationStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn new(dir: PathBuf) -> ParleyResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn session_path(&self, id: SessionId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read(&self, id: SessionId) -> ParleyResult<Option<SessionRecord>> {
        let path = self.session_path(id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&data).map_err(|e| {
            ParleyError::Store(format!("Failed to parse session {id}: {e}"))
        })?;
        Ok(Some(record))
    }

    async fn write(&self, record: &SessionRecord) -> ParleyResult<()> {
        let path = self.session_path(record.id);
        if record.is_idle() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn update<F>(&self, session: SessionId, f: F) -> ParleyResult<()>
    where
        F: FnOnce(&mut SessionRecord) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .read(session)
            .await?
            .unwrap_or_else(|| SessionRecord::new(session));
        f(&mut record);
        record.touch();
        self.write(&record).await
    }

    /// Ids of all sessions with a stored record.
    pub async fn list(&self) -> ParleyResult<Vec<SessionId>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(id) = stem.parse::<i64>() {
                        ids.push(SessionId(id));
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn save_state(&self, session: SessionId, state: &str) -> ParleyResult<()> {
        self.update(session, |r| r.state = state.to_string()).await
    }

    async fn get_state(&self, session: SessionId) -> ParleyResult<String> {
        Ok(self.read(session).await?.map(|r| r.state).unwrap_or_default())
    }

    async fn save_blob(&self, session: SessionId, blob: &str) -> ParleyResult<()> {
        self.update(session, |r| r.blob = Some(blob.to_string())).await
    }

    async fn get_blob(&self, session: SessionId) -> ParleyResult<Option<String>> {
        Ok(self.read(session).await?.and_then(|r| r.blob))
    }

    async fn remove_blob(&self, session: SessionId) -> ParleyResult<()> {
        self.update(session, |r| r.blob = None).await
    }
}
