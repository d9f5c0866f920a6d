//! Typed access to the session blob.
//!
//! The blob is opaque to the engine; flows store their partial form as
//! JSON. Forward steps read it strictly, revert paths read it leniently so
//! a missing or malformed blob means "nothing to revert".

use crate::store::ConversationStore;
use parley_core::{ParleyResult, SessionId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Serialize `form` and store it as the session blob.
pub async fn save_form<T>(
    store: &dyn ConversationStore,
    session: SessionId,
    form: &T,
) -> ParleyResult<()>
where
    T: Serialize + Sync,
{
    let json = serde_json::to_string(form)?;
    store.save_blob(session, &json).await
}

/// Load and decode the session blob. A decode failure is an error.
pub async fn load_form<T>(store: &dyn ConversationStore, session: SessionId) -> ParleyResult<Option<T>>
where
    T: DeserializeOwned,
{
    match store.get_blob(session).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Load the session blob, treating empty or undecodable content as absent.
///
/// Store failures still propagate.
pub async fn load_form_lenient<T>(
    store: &dyn ConversationStore,
    session: SessionId,
) -> ParleyResult<Option<T>>
where
    T: DeserializeOwned,
{
    let Some(raw) = store.get_blob(session).await? else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(&raw) {
        Ok(form) => Ok(Some(form)),
        Err(e) => {
            warn!(session = %session, error = %e, "Ignoring malformed session blob");
            Ok(None)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryConversationStore;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Default)]
    struct Form {
        name: Option<String>,
        menu_message_id: Option<i64>,
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryConversationStore::new();
        let form = Form {
            name: Some("Ivan".into()),
            menu_message_id: Some(10),
        };
        save_form(&store, SessionId(1), &form).await.unwrap();
        let loaded: Option<Form> = load_form(&store, SessionId(1)).await.unwrap();
        assert_eq!(loaded, Some(form));
    }

    #[tokio::test]
    async fn test_strict_load_rejects_garbage() {
        let store = InMemoryConversationStore::new();
        store.save_blob(SessionId(1), "{oops").await.unwrap();
        let result: ParleyResult<Option<Form>> = load_form(&store, SessionId(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lenient_load_treats_garbage_as_absent() {
        let store = InMemoryConversationStore::new();
        let missing: Option<Form> = load_form_lenient(&store, SessionId(1)).await.unwrap();
        assert!(missing.is_none());

        store.save_blob(SessionId(1), "").await.unwrap();
        let empty: Option<Form> = load_form_lenient(&store, SessionId(1)).await.unwrap();
        assert!(empty.is_none());

        store.save_blob(SessionId(1), "{oops").await.unwrap();
        let garbage: Option<Form> = load_form_lenient(&store, SessionId(1)).await.unwrap();
        assert!(garbage.is_none());
    }
}
