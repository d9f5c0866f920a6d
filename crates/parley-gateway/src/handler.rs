use crate::context::DispatchContext;
use async_trait::async_trait;
use parley_core::{CallbackEvent, MessageEvent, ParleyResult};

/// One step of a message-driven flow, registered under a state name.
///
/// `handle` performs the forward action: validate input, update the
/// session blob, write the next state name and produce side effects
/// through collaborators. Invalid input is answered with a re-prompt, not
/// an error.
///
/// `revert` undoes the visible effects of having entered the state and
/// writes an earlier state name. It may run without a prior `handle` and
/// must treat a missing or malformed blob as nothing to undo.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Advance the flow.
    async fn handle(&self, ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()>;

    /// Step the flow back.
    async fn revert(&self, ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()>;
}

/// Handler for button presses whose token starts with a registered prefix.
///
/// Callbacks fire from any state. The handler re-parses its own parameters
/// from the full token and may read or write the blob and state directly.
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    /// React to the button press.
    async fn handle_callback(&self, ctx: &DispatchContext, event: &CallbackEvent)
        -> ParleyResult<()>;
}
