//! Boundary entry point for inbound events.
//!
//! One [`Dispatcher::dispatch`] call per event. Messages wait for their
//! session lock; callbacks try it once and are dropped when a duplicate is
//! already in flight. A dropped press is still acknowledged when the
//! dispatcher has a channel, so the client stops its loading indicator. The handler chain runs on its own task so a panic is
//! contained to that event, and the whole dispatch is bounded by a
//! deadline after which the result is discarded.

use crate::context::DispatchContext;
use crate::router::Router;
use parley_channels::Channel;
use parley_core::{CallbackEvent, Event};
use parley_session::SessionLocks;
use serde::Serialize;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default bound on one dispatch.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// How a dispatch ended. Never an error for the caller: every failure is
/// logged here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler chain returned successfully.
    Completed,
    /// A handler or the router returned an error.
    Failed(String),
    /// A callback with the same token was already being handled.
    Dropped,
    /// The deadline passed; any result of the handler is discarded.
    TimedOut,
    /// A handler panicked; carries the panic message.
    Panicked(String),
}

/// Running totals of dispatch outcomes.
#[derive(Debug, Default)]
pub struct DispatchStats {
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    timed_out: AtomicU64,
    panicked: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    /// Successful dispatches.
    pub completed: u64,
    /// Dispatches ending in a handler or routing error.
    pub failed: u64,
    /// Duplicate callbacks dropped.
    pub dropped: u64,
    /// Dispatches that hit the deadline.
    pub timed_out: u64,
    /// Dispatches whose handler panicked.
    pub panicked: u64,
}

impl DispatchStats {
    fn record(&self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Completed => &self.completed,
            DispatchOutcome::Failed(_) => &self.failed,
            DispatchOutcome::Dropped => &self.dropped,
            DispatchOutcome::TimedOut => &self.timed_out,
            DispatchOutcome::Panicked(_) => &self.panicked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Current totals.
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Serializes events per (session, discriminator) and runs the router.
pub struct Dispatcher {
    router: Arc<Router>,
    locks: SessionLocks,
    timeout: Duration,
    stats: DispatchStats,
    channel: Option<Arc<dyn Channel>>,
}

impl Dispatcher {
    /// Create a dispatcher bounding each dispatch by `timeout`.
    pub fn new(router: Arc<Router>, locks: SessionLocks, timeout: Duration) -> Self {
        Self {
            router,
            locks,
            timeout,
            stats: DispatchStats::default(),
            channel: None,
        }
    }

    /// Answer dropped duplicate callbacks through `channel`.
    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// The router events are sent to.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Outcome totals since start.
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Handle one inbound event to completion, timeout, drop or panic.
    pub async fn dispatch(&self, event: Event) -> DispatchOutcome {
        let outcome = self.dispatch_inner(event).await;
        self.stats.record(&outcome);
        outcome
    }

    async fn dispatch_inner(&self, event: Event) -> DispatchOutcome {
        let session = event.session_id();
        let kind = event.kind();
        let ctx = DispatchContext::new(self.timeout);
        let handle = self.locks.acquire(session, event.discriminator());

        let guard = match &event {
            Event::Message(_) => {
                match tokio::time::timeout_at(ctx.deadline(), handle.lock()).await {
                    Ok(guard) => guard,
                    Err(_) => {
                        warn!(session = %session, kind, "Timed out waiting for session lock");
                        return DispatchOutcome::TimedOut;
                    }
                }
            }
            Event::Callback(cb) => match handle.try_lock() {
                Some(guard) => guard,
                None => {
                    debug!(session = %session, token = %cb.token, "Duplicate callback dropped");
                    self.acknowledge_dropped(&ctx, cb).await;
                    return DispatchOutcome::Dropped;
                }
            },
        };

        let router = Arc::clone(&self.router);
        let task_ctx = ctx.clone();
        // The guard moves into the task: the lock is held until the handler
        // really finishes, even if this dispatch stops waiting for it.
        let task = tokio::spawn(async move {
            let _guard = guard;
            match &event {
                Event::Message(msg) => router.handle(&task_ctx, msg).await,
                Event::Callback(cb) => router.handle_callback(&task_ctx, cb).await,
            }
        });

        match tokio::time::timeout_at(ctx.deadline(), task).await {
            Ok(Ok(Ok(()))) => {
                debug!(session = %session, kind, "Dispatch completed");
                DispatchOutcome::Completed
            }
            Ok(Ok(Err(e))) => {
                warn!(session = %session, kind, error = %e, "Handler failed");
                DispatchOutcome::Failed(e.to_string())
            }
            Ok(Err(join_err)) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                error!(session = %session, kind, panic = %message, "Handler panicked");
                DispatchOutcome::Panicked(message)
            }
            Ok(Err(join_err)) => {
                error!(session = %session, kind, error = %join_err, "Handler task aborted");
                DispatchOutcome::Failed(join_err.to_string())
            }
            Err(_) => {
                ctx.cancel();
                warn!(
                    session = %session,
                    kind,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Dispatch deadline elapsed, handler result discarded"
                );
                DispatchOutcome::TimedOut
            }
        }
    }

    async fn acknowledge_dropped(&self, ctx: &DispatchContext, event: &CallbackEvent) {
        let (Some(channel), Some(query_id)) = (&self.channel, event.query_id.as_deref()) else {
            return;
        };
        if let Err(e) = ctx.run(channel.answer_callback(query_id, None)).await {
            warn!(session = %event.session_id, query_id, error = %e, "Failed to answer dropped callback");
        }
    }

    /// Dispatch every event received on `events`, one task per event,
    /// until the sender side closes or `shutdown` is cancelled. Waits for
    /// in-flight dispatches before returning.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<Event>, shutdown: CancellationToken) {
        let mut in_flight = JoinSet::new();
        info!("Dispatcher started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => {
                        let dispatcher = Arc::clone(&self);
                        in_flight.spawn(async move { dispatcher.dispatch(event).await });
                    }
                    None => break,
                },
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        while in_flight.join_next().await.is_some() {}
        info!(stats = ?self.stats(), "Dispatcher stopped");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
