//! State and callback routing.
//!
//! Routes are keyed by state name in one [`PrefixIndex`], callbacks by
//! token prefix in another. Both tables are filled through
//! [`RouterBuilder`] before serving starts and are immutable afterwards.
//!
//! State names may be layered: with `admin` and `admin_waiting` both
//! registered, a message in state `admin_waiting` runs the `admin` handler
//! and then the `admin_waiting` handler, and a revert unwinds
//! `admin_waiting` first and `admin` second.

use crate::context::DispatchContext;
use crate::handler::{CallbackHandler, Handler};
use parley_core::{
    CallbackEvent, MessageEvent, ParleyError, ParleyResult, PrefixIndex, PrefixNode,
};
use parley_session::ConversationStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Command tokens that revert instead of advancing, unless configured
/// otherwise.
pub const DEFAULT_REVERT_COMMANDS: [&str; 2] = ["cancel", "back"];

/// Collects routes and callbacks, then freezes them into a [`Router`].
pub struct RouterBuilder {
    routes: PrefixIndex<Arc<dyn Handler>>,
    callbacks: PrefixIndex<Arc<dyn CallbackHandler>>,
    fallback: Option<Arc<dyn Handler>>,
    revert_commands: Vec<String>,
}

impl RouterBuilder {
    /// Empty builder with the default revert commands.
    pub fn new() -> Self {
        Self {
            routes: PrefixIndex::new(),
            callbacks: PrefixIndex::new(),
            fallback: None,
            revert_commands: DEFAULT_REVERT_COMMANDS.into_iter().map(String::from).collect(),
        }
    }

    /// Register `handler` for `state`. Registering the same name again
    /// replaces the previous handler.
    pub fn register_route(&mut self, state: &str, handler: Arc<dyn Handler>) -> &mut Self {
        if self.routes.insert(state, handler).is_some() {
            debug!(state = %state, "Route replaced");
        }
        self
    }

    /// Register `handler` for callback tokens starting with `prefix`.
    ///
    /// Fails if `prefix` is a strict prefix of an already registered prefix
    /// or the other way round: longest-prefix lookup would otherwise send
    /// one callback family to the other's handler.
    pub fn register_callback(
        &mut self,
        prefix: &str,
        handler: Arc<dyn CallbackHandler>,
    ) -> ParleyResult<&mut Self> {
        if prefix.is_empty() {
            return Err(ParleyError::Routing("callback prefix must not be empty".into()));
        }
        if let Some(existing) = self.callbacks.prefix_conflict(prefix) {
            return Err(ParleyError::Routing(format!(
                "callback prefix '{prefix}' collides with registered prefix '{existing}'"
            )));
        }
        self.callbacks.insert(prefix, handler);
        Ok(self)
    }

    /// Handler for sessions whose state has no exact registration.
    pub fn fallback(&mut self, handler: Arc<dyn Handler>) -> &mut Self {
        self.fallback = Some(handler);
        self
    }

    /// Replace the set of command tokens that trigger a revert.
    pub fn revert_commands<I, S>(&mut self, commands: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.revert_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Freeze the tables. A fallback handler is required.
    pub fn build(self, store: Arc<dyn ConversationStore>) -> ParleyResult<Router> {
        let fallback = self
            .fallback
            .ok_or_else(|| ParleyError::Routing("no fallback handler registered".into()))?;
        info!(
            routes = self.routes.len(),
            callbacks = self.callbacks.len(),
            "Router built"
        );
        Ok(Router {
            store,
            routes: self.routes,
            callbacks: self.callbacks,
            fallback,
            revert_commands: self.revert_commands,
        })
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps inbound events to handlers.
pub struct Router {
    store: Arc<dyn ConversationStore>,
    routes: PrefixIndex<Arc<dyn Handler>>,
    callbacks: PrefixIndex<Arc<dyn CallbackHandler>>,
    fallback: Arc<dyn Handler>,
    revert_commands: Vec<String>,
}

impl Router {
    /// Start building a router.
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// The conversation store handlers are expected to share.
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Whether `event` asks to step back rather than forward.
    pub fn is_revert(&self, event: &MessageEvent) -> bool {
        event
            .command
            .as_deref()
            .is_some_and(|cmd| self.revert_commands.iter().any(|c| c == cmd))
    }

    /// Registered state names in lexicographic order.
    pub fn states(&self) -> Vec<String> {
        self.routes.keys()
    }

    /// Registered callback prefixes in lexicographic order.
    pub fn callback_prefixes(&self) -> Vec<String> {
        self.callbacks.keys()
    }

    /// Route a message.
    ///
    /// Other messages call `handle` on every handler registered along the
    /// current state's path, outermost first, when the exact state is
    /// registered, and the fallback handler otherwise.
    ///
    /// Revert commands walk the same path in reverse: `revert` runs on the
    /// innermost handler first and on the root last. A nested state undoes
    /// its own effects (a pending keyboard, say) while the flow data is
    /// still there, and only then does a parent reset the flow.
    ///
    /// The first error stops either chain and is returned.
    pub async fn handle(&self, ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()> {
        let session = event.session_id;
        let state = ctx.run(self.store.get_state(session)).await?;

        if self.is_revert(event) {
            let chain = self.chain(&state);
            if chain.is_empty() {
                debug!(session = %session, state = %state, "Nothing to revert");
                return Ok(());
            }
            debug!(session = %session, state = %state, depth = chain.len(), "Reverting");
            for handler in chain.iter().rev() {
                ensure_live(ctx)?;
                handler.revert(ctx, event).await?;
            }
            return Ok(());
        }

        if self.routes.search_exact(&state).is_none() {
            debug!(session = %session, state = %state, "No route for state, using fallback");
            return self.fallback.handle(ctx, event).await;
        }

        let chain = self.chain(&state);
        debug!(session = %session, state = %state, depth = chain.len(), "Handling");
        for handler in &chain {
            ensure_live(ctx)?;
            handler.handle(ctx, event).await?;
        }
        Ok(())
    }

    /// Route a button press by the longest registered prefix of its token.
    pub async fn handle_callback(
        &self,
        ctx: &DispatchContext,
        event: &CallbackEvent,
    ) -> ParleyResult<()> {
        let handler = self
            .callbacks
            .search(&event.token)
            .cloned()
            .ok_or_else(|| ParleyError::UnregisteredCallback(event.token.clone()))?;
        debug!(session = %event.session_id, token = %event.token, "Handling callback");
        handler.handle_callback(ctx, event).await
    }

    fn chain(&self, state: &str) -> Vec<Arc<dyn Handler>> {
        self.routes
            .iter_path(state)
            .filter_map(PrefixNode::value)
            .cloned()
            .collect()
    }
}

fn ensure_live(ctx: &DispatchContext) -> ParleyResult<()> {
    if ctx.is_cancelled() {
        return Err(ParleyError::Cancelled(
            "dispatch ended before the handler chain finished".into(),
        ));
    }
    Ok(())
}
