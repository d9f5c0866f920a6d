//! Conversation state for the Parley bot engine.
//!
//! # Main types
//!
//! - [`ConversationStore`] — Per-session state name and form blob.
//! - [`InMemoryConversationStore`] / [`FileConversationStore`] — Store backends.
//! - [`SessionLocks`] — Per-(session, discriminator) lock registry.

/// Typed helpers for the session blob.
pub mod blob;
/// Lock registry serializing events of one session.
pub mod lock;
/// Stored per-session record.
pub mod session;
/// Conversation store trait and backends.
pub mod store;

pub use lock::{SessionLock, SessionLockGuard, SessionLocks};
pub use session::SessionRecord;
pub use store::{ConversationStore, FileConversationStore, InMemoryConversationStore};
