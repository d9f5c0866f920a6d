#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use parley_channels::{Channel, MemoryChannel, OutgoingMessage, Outbound};
use parley_core::{CallbackEvent, MessageEvent, ParleyResult, SessionId};
use parley_flows::{InMemoryUserDirectory, RegistrationFlow, UserDirectory};
use parley_gateway::{DispatchOutcome, Dispatcher, Router};
use parley_session::{ConversationStore, InMemoryConversationStore, SessionLocks};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const ANN: SessionId = SessionId(501);

struct Harness {
    store: Arc<InMemoryConversationStore>,
    channel: Arc<MemoryChannel>,
    directory: Arc<InMemoryUserDirectory>,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryConversationStore::new());
        let channel = Arc::new(MemoryChannel::default());
        let directory = Arc::new(InMemoryUserDirectory::new());

        let flow = RegistrationFlow::new(store.clone(), channel.clone(), directory.clone());
        let mut builder = Router::builder();
        flow.install(&mut builder).unwrap();
        let router = builder.build(store.clone()).unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(router),
            SessionLocks::new(),
            Duration::from_secs(5),
        );

        Self {
            store,
            channel,
            directory,
            dispatcher,
        }
    }

    async fn say(&self, text: &str) {
        let outcome = self
            .dispatcher
            .dispatch(MessageEvent::new(ANN, text).into())
            .await;
        assert_eq!(outcome, DispatchOutcome::Completed, "message {text:?}");
    }

    async fn press(&self, token: &str, message_id: i64, query_id: &str) {
        let mut event = CallbackEvent::new(ANN, token);
        event.message_id = Some(message_id);
        event.query_id = Some(query_id.to_string());
        let outcome = self.dispatcher.dispatch(event.into()).await;
        assert_eq!(outcome, DispatchOutcome::Completed, "callback {token:?}");
    }

    async fn state(&self) -> String {
        self.store.get_state(ANN).await.unwrap()
    }

    fn last_text(&self) -> String {
        self.channel.texts_for(ANN).last().cloned().unwrap_or_default()
    }

    /// Id and tokens of the newest message carrying buttons.
    fn last_keyboard(&self) -> (i64, Vec<String>) {
        self.channel
            .outbound()
            .into_iter()
            .rev()
            .find_map(|op| match op {
                Outbound::Sent {
                    message_id, tokens, ..
                } if !tokens.is_empty() => Some((message_id, tokens)),
                _ => None,
            })
            .expect("a keyboard was sent")
    }

    async fn reach_confirmation(&self) -> i64 {
        self.say("/register").await;
        self.say("Ann Smith").await;
        self.say("cs-101").await;
        assert_eq!(self.state().await, "register_confirm");
        self.last_keyboard().0
    }
}

#[tokio::test]
async fn test_full_registration() {
    let h = Harness::new();

    h.say("/start").await;
    assert!(h.last_text().contains("/register"));
    assert_eq!(h.state().await, "");

    h.say("/register").await;
    assert_eq!(h.state().await, "register_name");
    assert_eq!(h.last_text(), "What is your name?");

    h.say("Ann Smith").await;
    assert_eq!(h.state().await, "register_group");

    h.say("cs-101").await;
    assert_eq!(h.state().await, "register_confirm");
    let (keyboard_id, tokens) = h.last_keyboard();
    assert_eq!(tokens, vec!["confirm|yes", "confirm|no"]);
    assert!(h.last_text().contains("CS-101"));

    h.press("confirm|yes", keyboard_id, "q-1").await;

    assert_eq!(h.state().await, "");
    assert!(h.store.get_blob(ANN).await.unwrap().is_none());
    let user = h.directory.lookup(ANN).await.unwrap().unwrap();
    assert_eq!(user.name, "Ann Smith");
    assert_eq!(user.group, "CS-101");

    let ops = h.channel.outbound();
    assert!(ops.contains(&Outbound::KeyboardCleared {
        session_id: ANN,
        message_id: keyboard_id,
    }));
    assert!(ops.contains(&Outbound::CallbackAnswered {
        query_id: "q-1".into(),
        notice: None,
    }));

    h.say("/register").await;
    assert!(h.last_text().contains("already registered"));
    assert_eq!(h.state().await, "");
}

#[tokio::test]
async fn test_invalid_input_reprompts() {
    let h = Harness::new();
    h.say("/register").await;

    h.say("   ").await;
    assert_eq!(h.state().await, "register_name");
    assert!(h.last_text().contains("1 to 64"));

    h.say(&"x".repeat(65)).await;
    assert_eq!(h.state().await, "register_name");

    h.say("Ann").await;
    h.say("no spaces allowed").await;
    assert_eq!(h.state().await, "register_group");
    assert!(h.last_text().contains("group code"));
}

#[tokio::test]
async fn test_cancel_from_confirmation_unwinds_inner_first() {
    let h = Harness::new();
    let keyboard_id = h.reach_confirmation().await;
    let before = h.channel.outbound().len();

    h.say("/cancel").await;

    let ops = h.channel.outbound().split_off(before);
    assert_eq!(
        ops[0],
        Outbound::KeyboardCleared {
            session_id: ANN,
            message_id: keyboard_id,
        }
    );
    assert!(matches!(&ops[1], Outbound::Sent { text, .. } if text == "Registration cancelled."));
    assert_eq!(h.state().await, "");
    assert!(h.store.get_blob(ANN).await.unwrap().is_none());
    assert!(h.directory.is_empty());
}

#[tokio::test]
async fn test_back_from_name_returns_to_idle() {
    let h = Harness::new();
    h.say("/register").await;
    h.say("/back").await;
    assert_eq!(h.state().await, "");
    assert_eq!(h.last_text(), "Registration cancelled.");
}

#[tokio::test]
async fn test_cancel_with_malformed_blob() {
    let h = Harness::new();
    h.store.save_state(ANN, "register_confirm").await.unwrap();
    h.store.save_blob(ANN, "{not json").await.unwrap();

    h.say("/cancel").await;
    assert_eq!(h.state().await, "");
    assert!(!h
        .channel
        .outbound()
        .iter()
        .any(|op| matches!(op, Outbound::KeyboardCleared { .. })));
}

#[tokio::test]
async fn test_discard_confirmation() {
    let h = Harness::new();
    let keyboard_id = h.reach_confirmation().await;

    h.press("confirm|no", keyboard_id, "q-2").await;
    assert_eq!(h.state().await, "");
    assert!(h.directory.is_empty());
    assert_eq!(h.last_text(), "Registration discarded.");
}

#[tokio::test]
async fn test_text_during_confirmation_resends_keyboard() {
    let h = Harness::new();
    let first = h.reach_confirmation().await;

    h.say("what now?").await;
    let (second, _) = h.last_keyboard();
    assert_ne!(first, second);
    assert!(h.channel.outbound().contains(&Outbound::KeyboardCleared {
        session_id: ANN,
        message_id: first,
    }));
    assert_eq!(h.state().await, "register_confirm");
}

#[tokio::test]
async fn test_stale_confirmation_is_acknowledged() {
    let h = Harness::new();
    h.press("confirm|yes", 99, "q-3").await;

    assert!(h.directory.is_empty());
    assert!(h.channel.outbound().contains(&Outbound::CallbackAnswered {
        query_id: "q-3".into(),
        notice: Some("This confirmation has expired.".into()),
    }));
}

/// Channel whose first send never completes; later sends are recorded.
struct StallOnce {
    inner: MemoryChannel,
    sends: AtomicUsize,
}

#[async_trait]
impl Channel for StallOnce {
    fn name(&self) -> &str {
        "stall-once"
    }

    async fn send(&self, message: OutgoingMessage) -> ParleyResult<i64> {
        if self.sends.fetch_add(1, Ordering::SeqCst) == 0 {
            return std::future::pending().await;
        }
        self.inner.send(message).await
    }

    async fn clear_keyboard(&self, session_id: SessionId, message_id: i64) -> ParleyResult<()> {
        self.inner.clear_keyboard(session_id, message_id).await
    }

    async fn answer_callback(&self, query_id: &str, notice: Option<&str>) -> ParleyResult<()> {
        self.inner.answer_callback(query_id, notice).await
    }
}

#[tokio::test]
async fn test_stalled_send_releases_session_at_deadline() {
    let store = Arc::new(InMemoryConversationStore::new());
    let channel = Arc::new(StallOnce {
        inner: MemoryChannel::default(),
        sends: AtomicUsize::new(0),
    });
    let flow = RegistrationFlow::new(
        store.clone(),
        channel.clone(),
        Arc::new(InMemoryUserDirectory::new()),
    );
    let mut builder = Router::builder();
    flow.install(&mut builder).unwrap();
    let dispatcher = Dispatcher::new(
        Arc::new(builder.build(store).unwrap()),
        SessionLocks::new(),
        Duration::from_millis(200),
    );

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(
            dispatcher
                .dispatch(MessageEvent::new(ANN, "/start").into())
                .await,
        );
    }

    assert!(
        matches!(
            outcomes[0],
            DispatchOutcome::TimedOut | DispatchOutcome::Failed(_)
        ),
        "first dispatch: {:?}",
        outcomes[0]
    );
    assert_eq!(outcomes[1], DispatchOutcome::Completed);
    assert_eq!(outcomes[2], DispatchOutcome::Completed);
    assert_eq!(channel.sends.load(Ordering::SeqCst), 3);
    assert_eq!(channel.inner.texts_for(ANN).len(), 2);
}
