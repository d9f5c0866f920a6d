use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use parley_core::{ParleyResult, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user who completed registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
    /// Conversation the user registered from.
    pub session_id: SessionId,
    /// Display name as entered.
    pub name: String,
    /// Normalized group code.
    pub group: String,
    /// When the registration was confirmed.
    pub registered_at: DateTime<Utc>,
}

/// Where confirmed registrations are kept.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Insert or replace the user registered from `user.session_id`.
    async fn register(&self, user: RegisteredUser) -> ParleyResult<()>;

    /// Look up the user registered from `session`.
    async fn lookup(&self, session: SessionId) -> ParleyResult<Option<RegisteredUser>>;
}

/// Process-local directory.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<SessionId, RegisteredUser>>,
}

impl InMemoryUserDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Whether nobody registered yet.
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn register(&self, user: RegisteredUser) -> ParleyResult<()> {
        self.users.write().insert(user.session_id, user);
        Ok(())
    }

    async fn lookup(&self, session: SessionId) -> ParleyResult<Option<RegisteredUser>> {
        Ok(self.users.read().get(&session).cloned())
    }
}
