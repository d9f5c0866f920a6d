#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use parley_core::{CallbackEvent, MessageEvent, ParleyError, ParleyResult, SessionId};
use parley_gateway::{CallbackHandler, DispatchContext, Handler, Router};
use parley_session::{ConversationStore, InMemoryConversationStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

/// Records every call and optionally moves the session to `next`.
struct Step {
    name: &'static str,
    next: Option<&'static str>,
    back: Option<&'static str>,
    fail: bool,
    log: Log,
    store: Arc<dyn ConversationStore>,
}

impl Step {
    fn new(name: &'static str, log: &Log, store: &Arc<dyn ConversationStore>) -> Self {
        Self {
            name,
            next: None,
            back: None,
            fail: false,
            log: Arc::clone(log),
            store: Arc::clone(store),
        }
    }

    fn next(mut self, state: &'static str) -> Self {
        self.next = Some(state);
        self
    }

    fn back(mut self, state: &'static str) -> Self {
        self.back = Some(state);
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Handler for Step {
    async fn handle(&self, _ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()> {
        self.log.lock().unwrap().push(format!("handle {}", self.name));
        if self.fail {
            return Err(ParleyError::Handler(format!("{} failed", self.name)));
        }
        if let Some(next) = self.next {
            self.store.save_state(event.session_id, next).await?;
        }
        Ok(())
    }

    async fn revert(&self, _ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()> {
        self.log.lock().unwrap().push(format!("revert {}", self.name));
        if self.fail {
            return Err(ParleyError::Handler(format!("{} failed", self.name)));
        }
        if let Some(back) = self.back {
            self.store.save_state(event.session_id, back).await?;
        }
        Ok(())
    }
}

struct RecordCallback {
    log: Log,
}

#[async_trait]
impl CallbackHandler for RecordCallback {
    async fn handle_callback(&self, _ctx: &DispatchContext, event: &CallbackEvent) -> ParleyResult<()> {
        self.log.lock().unwrap().push(format!("callback {}", event.token));
        Ok(())
    }
}

fn setup() -> (Log, Arc<dyn ConversationStore>) {
    (
        Arc::new(Mutex::new(Vec::new())),
        Arc::new(InMemoryConversationStore::new()),
    )
}

fn ctx() -> DispatchContext {
    DispatchContext::new(Duration::from_secs(5))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_message_advances_state() {
    let (log, store) = setup();
    let mut builder = Router::builder();
    builder
        .fallback(Arc::new(Step::new("fallback", &log, &store)))
        .register_route("step1", Arc::new(Step::new("step1", &log, &store).next("step2")))
        .register_route("step2", Arc::new(Step::new("step2", &log, &store)));
    let router = builder.build(Arc::clone(&store)).unwrap();

    let session = SessionId(1);
    store.save_state(session, "step1").await.unwrap();
    router.handle(&ctx(), &MessageEvent::new(session, "hello")).await.unwrap();

    assert_eq!(entries(&log), vec!["handle step1"]);
    assert_eq!(store.get_state(session).await.unwrap(), "step2");
}

#[tokio::test]
async fn test_unknown_state_uses_fallback_once() {
    let (log, store) = setup();
    let mut builder = Router::builder();
    builder
        .fallback(Arc::new(Step::new("fallback", &log, &store)))
        .register_route("admin", Arc::new(Step::new("admin", &log, &store)));
    let router = builder.build(Arc::clone(&store)).unwrap();

    // Idle session.
    router
        .handle(&ctx(), &MessageEvent::new(SessionId(1), "hi"))
        .await
        .unwrap();
    // A state whose prefix is registered but which is not itself registered.
    store.save_state(SessionId(2), "admin_unknown").await.unwrap();
    router
        .handle(&ctx(), &MessageEvent::new(SessionId(2), "hi"))
        .await
        .unwrap();

    assert_eq!(entries(&log), vec!["handle fallback", "handle fallback"]);
}

#[tokio::test]
async fn test_nested_states_handle_outer_first() {
    let (log, store) = setup();
    let mut builder = Router::builder();
    builder
        .fallback(Arc::new(Step::new("fallback", &log, &store)))
        .register_route("admin", Arc::new(Step::new("admin", &log, &store)))
        .register_route("admin_waiting", Arc::new(Step::new("admin_waiting", &log, &store)));
    let router = builder.build(Arc::clone(&store)).unwrap();

    store.save_state(SessionId(3), "admin_waiting").await.unwrap();
    router
        .handle(&ctx(), &MessageEvent::new(SessionId(3), "text"))
        .await
        .unwrap();

    assert_eq!(entries(&log), vec!["handle admin", "handle admin_waiting"]);
}

#[tokio::test]
async fn test_revert_unwinds_inner_first() {
    let (log, store) = setup();
    let mut builder = Router::builder();
    builder
        .fallback(Arc::new(Step::new("fallback", &log, &store)))
        .register_route("admin", Arc::new(Step::new("admin", &log, &store).back("")))
        .register_route(
            "admin_waiting",
            Arc::new(Step::new("admin_waiting", &log, &store).back("admin")),
        );
    let router = builder.build(Arc::clone(&store)).unwrap();

    let session = SessionId(4);
    store.save_state(session, "admin_waiting").await.unwrap();
    router
        .handle(&ctx(), &MessageEvent::new(session, "/cancel"))
        .await
        .unwrap();

    assert_eq!(entries(&log), vec!["revert admin_waiting", "revert admin"]);
    assert_eq!(store.get_state(session).await.unwrap(), "");
}

#[tokio::test]
async fn test_revert_in_idle_state_is_noop() {
    let (log, store) = setup();
    let mut builder = Router::builder();
    builder.fallback(Arc::new(Step::new("fallback", &log, &store)));
    let router = builder.build(Arc::clone(&store)).unwrap();

    router
        .handle(&ctx(), &MessageEvent::new(SessionId(5), "/back"))
        .await
        .unwrap();
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn test_revert_skips_unregistered_intermediate_levels() {
    let (log, store) = setup();
    let mut builder = Router::builder();
    builder
        .fallback(Arc::new(Step::new("fallback", &log, &store)))
        .register_route("reg", Arc::new(Step::new("reg", &log, &store)))
        .register_route("reg_a_b", Arc::new(Step::new("reg_a_b", &log, &store)));
    let router = builder.build(Arc::clone(&store)).unwrap();

    store.save_state(SessionId(6), "reg_a_b").await.unwrap();
    router
        .handle(&ctx(), &MessageEvent::new(SessionId(6), "/cancel"))
        .await
        .unwrap();
    assert_eq!(entries(&log), vec!["revert reg_a_b", "revert reg"]);
}

#[tokio::test]
async fn test_error_stops_chain() {
    let (log, store) = setup();
    let mut builder = Router::builder();
    builder
        .fallback(Arc::new(Step::new("fallback", &log, &store)))
        .register_route("outer", Arc::new(Step::new("outer", &log, &store).failing()))
        .register_route("outer_inner", Arc::new(Step::new("outer_inner", &log, &store)));
    let router = builder.build(Arc::clone(&store)).unwrap();

    store.save_state(SessionId(7), "outer_inner").await.unwrap();
    let err = router
        .handle(&ctx(), &MessageEvent::new(SessionId(7), "go"))
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Handler(_)));
    assert_eq!(entries(&log), vec!["handle outer"]);
}

#[tokio::test]
async fn test_callback_longest_prefix() {
    let (log, store) = setup();
    let mut builder = Router::builder();
    builder.fallback(Arc::new(Step::new("fallback", &log, &store)));
    builder
        .register_callback("confirm", Arc::new(RecordCallback { log: Arc::clone(&log) }))
        .unwrap();
    let router = builder.build(Arc::clone(&store)).unwrap();

    router
        .handle_callback(&ctx(), &CallbackEvent::new(SessionId(8), "confirm|42|yes"))
        .await
        .unwrap();
    assert_eq!(entries(&log), vec!["callback confirm|42|yes"]);
}

#[tokio::test]
async fn test_cancelled_context_stops_chain() {
    let (log, store) = setup();
    let mut builder = Router::builder();
    builder
        .fallback(Arc::new(Step::new("fallback", &log, &store)))
        .register_route("a", Arc::new(Step::new("a", &log, &store)));
    let router = builder.build(Arc::clone(&store)).unwrap();

    store.save_state(SessionId(9), "a").await.unwrap();
    let ctx = ctx();
    ctx.cancel();
    let err = router
        .handle(&ctx, &MessageEvent::new(SessionId(9), "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Cancelled(_)));
    assert!(entries(&log).is_empty());
}
