use chrono::{DateTime, Utc};
use parley_core::SessionId;
use serde::{Deserialize, Serialize};

/// Everything the engine keeps for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Conversation identifier.
    pub id: SessionId,
    /// Current state name; empty means idle.
    #[serde(default)]
    pub state: String,
    /// Serialized partial form of the active flow.
    #[serde(default)]
    pub blob: Option<String>,
    /// Last time the record was written.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A fresh idle record without a blob.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: String::new(),
            blob: None,
            updated_at: Utc::now(),
        }
    }

    /// Record a modification.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Idle with nothing in progress; such records need not be kept.
    pub fn is_idle(&self) -> bool {
        self.state.is_empty() && self.blob.is_none()
    }
}
