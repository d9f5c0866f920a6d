use crate::channel::{Channel, OutgoingMessage};
use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::{ParleyError, ParleyResult, SessionId};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::broadcast;

/// An outbound operation observed by [`MemoryChannel`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Outbound {
    /// A message was sent and got `message_id`.
    Sent {
        /// Id assigned to the message.
        message_id: i64,
        /// Target session.
        session_id: SessionId,
        /// Message text.
        text: String,
        /// Encoded callback tokens of every button, row by row.
        tokens: Vec<String>,
    },
    /// A keyboard was stripped.
    KeyboardCleared {
        /// Target session.
        session_id: SessionId,
        /// Message whose keyboard was removed.
        message_id: i64,
    },
    /// A callback query was acknowledged.
    CallbackAnswered {
        /// Acknowledged query.
        query_id: String,
        /// Optional notice shown to the user.
        notice: Option<String>,
    },
}

/// In-process channel that records outbound operations.
///
/// Operations are also published on a broadcast channel so a local
/// console or test can follow them live.
pub struct MemoryChannel {
    log: Mutex<Vec<Outbound>>,
    next_id: AtomicI64,
    tx: broadcast::Sender<Outbound>,
}

impl MemoryChannel {
    /// Create a channel whose broadcast buffer holds `capacity` operations.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            log: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            tx,
        }
    }

    /// Follow operations as they happen.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.tx.subscribe()
    }

    /// Everything recorded so far.
    pub fn outbound(&self) -> Vec<Outbound> {
        self.log.lock().clone()
    }

    /// Texts of all sent messages for `session_id`, oldest first.
    pub fn texts_for(&self, session_id: SessionId) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|op| match op {
                Outbound::Sent {
                    session_id: s, text, ..
                } if *s == session_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: Outbound) {
        self.log.lock().push(op.clone());
        // No subscribers is fine.
        let _ = self.tx.send(op);
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, message: OutgoingMessage) -> ParleyResult<i64> {
        if message.text.is_empty() {
            return Err(ParleyError::Channel("message text is empty".into()));
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let tokens = message
            .keyboard
            .iter()
            .flatten()
            .map(|b| b.token.clone())
            .collect();
        self.record(Outbound::Sent {
            message_id,
            session_id: message.session_id,
            text: message.text,
            tokens,
        });
        Ok(message_id)
    }

    async fn clear_keyboard(&self, session_id: SessionId, message_id: i64) -> ParleyResult<()> {
        self.record(Outbound::KeyboardCleared {
            session_id,
            message_id,
        });
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, notice: Option<&str>) -> ParleyResult<()> {
        self.record(Outbound::CallbackAnswered {
            query_id: query_id.to_string(),
            notice: notice.map(str::to_string),
        });
        Ok(())
    }
}
