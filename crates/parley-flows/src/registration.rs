//! Sign-up flow: name, group, confirmation.
//!
//! ```text
//! ""  --/register-->  register_name  --name-->  register_group
//!     <--/cancel--                              --group--> register_confirm
//!     <--confirm|yes / confirm|no-------------------------------'
//! ```
//!
//! `register` itself is never a session state. It is registered so that
//! every `register_*` state inherits it: on revert it runs last, after the
//! nested state undid its own effects, and drops the form.

use crate::directory::{RegisteredUser, UserDirectory};
use crate::form::{normalize_group, validate_name, RegistrationForm, MAX_NAME_CHARS};
use async_trait::async_trait;
use parley_channels::{Channel, InlineButton, OutgoingMessage};
use parley_core::{
    CallbackEvent, CallbackToken, MessageEvent, ParleyResult, SessionId, DEFAULT_DELIMITER,
};
use parley_gateway::{CallbackHandler, DispatchContext, Handler, RouterBuilder};
use parley_session::blob::{load_form, load_form_lenient, save_form};
use parley_session::ConversationStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Idle state name.
pub const STATE_IDLE: &str = "";
/// Common prefix of every registration state.
pub const STATE_REGISTER: &str = "register";
/// Waiting for the user's name.
pub const STATE_NAME: &str = "register_name";
/// Waiting for the group code.
pub const STATE_GROUP: &str = "register_group";
/// Waiting for a press on the confirmation keyboard.
pub const STATE_CONFIRM: &str = "register_confirm";
/// Callback prefix of the confirmation buttons.
pub const CONFIRM_PREFIX: &str = "confirm";

const ANSWER_YES: &str = "yes";
const ANSWER_NO: &str = "no";

/// Collaborators shared by every handler of the flow.
struct FlowDeps {
    store: Arc<dyn ConversationStore>,
    channel: Arc<dyn Channel>,
    directory: Arc<dyn UserDirectory>,
    delimiter: char,
}

/// Every collaborator call goes through `ctx.run` so a stalled store or
/// transport gives up at the dispatch deadline and releases the session.
impl FlowDeps {
    async fn say(
        &self,
        ctx: &DispatchContext,
        session: SessionId,
        text: impl Into<String>,
    ) -> ParleyResult<i64> {
        ctx.run(self.channel.send(OutgoingMessage::text(session, text)))
            .await
    }

    async fn form(&self, ctx: &DispatchContext, session: SessionId) -> ParleyResult<RegistrationForm> {
        Ok(ctx
            .run(load_form(self.store.as_ref(), session))
            .await?
            .unwrap_or_default())
    }

    async fn save(
        &self,
        ctx: &DispatchContext,
        session: SessionId,
        form: &RegistrationForm,
    ) -> ParleyResult<()> {
        ctx.run(save_form(self.store.as_ref(), session, form)).await
    }

    async fn set_state(&self, ctx: &DispatchContext, session: SessionId, state: &str) -> ParleyResult<()> {
        ctx.run(self.store.save_state(session, state)).await
    }

    async fn clear_keyboard(
        &self,
        ctx: &DispatchContext,
        session: SessionId,
        message_id: i64,
    ) -> ParleyResult<()> {
        ctx.run(self.channel.clear_keyboard(session, message_id)).await
    }

    async fn send_confirmation(
        &self,
        ctx: &DispatchContext,
        session: SessionId,
        form: &RegistrationForm,
    ) -> ParleyResult<i64> {
        let row = vec![
            InlineButton::with_token(
                "Confirm",
                &CallbackToken::new(CONFIRM_PREFIX).param(ANSWER_YES),
                self.delimiter,
            )?,
            InlineButton::with_token(
                "Discard",
                &CallbackToken::new(CONFIRM_PREFIX).param(ANSWER_NO),
                self.delimiter,
            )?,
        ];
        let summary = format!(
            "Please confirm your registration:\nName: {}\nGroup: {}",
            form.name.as_deref().unwrap_or("-"),
            form.group.as_deref().unwrap_or("-"),
        );
        ctx.run(
            self.channel
                .send(OutgoingMessage::text(session, summary).with_row(row)),
        )
        .await
    }

    async fn reset(&self, ctx: &DispatchContext, session: SessionId) -> ParleyResult<()> {
        ctx.run(self.store.remove_blob(session)).await?;
        self.set_state(ctx, session, STATE_IDLE).await
    }
}

/// Installs the registration flow into a router.
pub struct RegistrationFlow {
    deps: Arc<FlowDeps>,
}

impl RegistrationFlow {
    /// Flow writing to `store`, talking through `channel` and saving
    /// confirmed users to `directory`.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        channel: Arc<dyn Channel>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self::with_delimiter(store, channel, directory, DEFAULT_DELIMITER)
    }

    /// Same as [`RegistrationFlow::new`] with a custom callback delimiter.
    pub fn with_delimiter(
        store: Arc<dyn ConversationStore>,
        channel: Arc<dyn Channel>,
        directory: Arc<dyn UserDirectory>,
        delimiter: char,
    ) -> Self {
        Self {
            deps: Arc::new(FlowDeps {
                store,
                channel,
                directory,
                delimiter,
            }),
        }
    }

    /// Register the idle fallback, the `register*` states and the
    /// `confirm` callback.
    pub fn install(&self, builder: &mut RouterBuilder) -> ParleyResult<()> {
        let deps = &self.deps;
        builder
            .fallback(Arc::new(Idle(Arc::clone(deps))))
            .register_route(STATE_REGISTER, Arc::new(RegisterRoot(Arc::clone(deps))))
            .register_route(STATE_NAME, Arc::new(AskName(Arc::clone(deps))))
            .register_route(STATE_GROUP, Arc::new(AskGroup(Arc::clone(deps))))
            .register_route(STATE_CONFIRM, Arc::new(AwaitConfirm(Arc::clone(deps))));
        builder.register_callback(CONFIRM_PREFIX, Arc::new(Confirm(Arc::clone(deps))))?;
        Ok(())
    }
}

/// Sessions with no flow in progress.
struct Idle(Arc<FlowDeps>);

#[async_trait]
impl Handler for Idle {
    async fn handle(&self, ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()> {
        let deps = &self.0;
        let session = event.session_id;

        if event.is_command("register") {
            if let Some(user) = ctx.run(deps.directory.lookup(session)).await? {
                deps.say(
                    ctx,
                    session,
                    format!("You are already registered as {} ({}).", user.name, user.group),
                )
                .await?;
                return Ok(());
            }
            deps.save(ctx, session, &RegistrationForm::default()).await?;
            deps.set_state(ctx, session, STATE_NAME).await?;
            deps.say(ctx, session, "What is your name?").await?;
            debug!(session = %session, "Registration started");
            return Ok(());
        }

        let reply = if event.is_command("start") {
            "Hello! Send /register to sign up."
        } else {
            "Send /register to sign up, or /cancel to stop at any step."
        };
        deps.say(ctx, session, reply).await?;
        Ok(())
    }

    async fn revert(&self, _ctx: &DispatchContext, _event: &MessageEvent) -> ParleyResult<()> {
        Ok(())
    }
}

/// Shared parent of every `register_*` state.
struct RegisterRoot(Arc<FlowDeps>);

#[async_trait]
impl Handler for RegisterRoot {
    async fn handle(&self, _ctx: &DispatchContext, _event: &MessageEvent) -> ParleyResult<()> {
        Ok(())
    }

    async fn revert(&self, ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()> {
        let deps = &self.0;
        deps.reset(ctx, event.session_id).await?;
        deps.say(ctx, event.session_id, "Registration cancelled.").await?;
        info!(session = %event.session_id, "Registration cancelled");
        Ok(())
    }
}

struct AskName(Arc<FlowDeps>);

#[async_trait]
impl Handler for AskName {
    async fn handle(&self, ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()> {
        let deps = &self.0;
        let session = event.session_id;
        let Some(name) = validate_name(&event.text) else {
            deps.say(
                ctx,
                session,
                format!("Please send your name (1 to {MAX_NAME_CHARS} characters)."),
            )
            .await?;
            return Ok(());
        };

        let mut form = deps.form(ctx, session).await?;
        form.name = Some(name);
        deps.save(ctx, session, &form).await?;
        deps.set_state(ctx, session, STATE_GROUP).await?;
        deps.say(ctx, session, "Which group are you in?").await?;
        Ok(())
    }

    async fn revert(&self, _ctx: &DispatchContext, _event: &MessageEvent) -> ParleyResult<()> {
        Ok(())
    }
}

struct AskGroup(Arc<FlowDeps>);

#[async_trait]
impl Handler for AskGroup {
    async fn handle(&self, ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()> {
        let deps = &self.0;
        let session = event.session_id;
        let Some(group) = normalize_group(&event.text) else {
            deps.say(
                ctx,
                session,
                "A group code is 2 to 16 letters, digits or dashes, e.g. CS-101.",
            )
            .await?;
            return Ok(());
        };

        let mut form = deps.form(ctx, session).await?;
        form.group = Some(group);
        let message_id = deps.send_confirmation(ctx, session, &form).await?;
        form.confirm_message_id = Some(message_id);
        deps.save(ctx, session, &form).await?;
        deps.set_state(ctx, session, STATE_CONFIRM).await?;
        Ok(())
    }

    async fn revert(&self, _ctx: &DispatchContext, _event: &MessageEvent) -> ParleyResult<()> {
        Ok(())
    }
}

struct AwaitConfirm(Arc<FlowDeps>);

#[async_trait]
impl Handler for AwaitConfirm {
    async fn handle(&self, ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()> {
        let deps = &self.0;
        let session = event.session_id;
        let mut form = deps.form(ctx, session).await?;
        if let Some(old) = form.confirm_message_id.take() {
            deps.clear_keyboard(ctx, session, old).await?;
        }
        let message_id = deps.send_confirmation(ctx, session, &form).await?;
        form.confirm_message_id = Some(message_id);
        deps.save(ctx, session, &form).await
    }

    async fn revert(&self, ctx: &DispatchContext, event: &MessageEvent) -> ParleyResult<()> {
        let deps = &self.0;
        let form: Option<RegistrationForm> = ctx
            .run(load_form_lenient(deps.store.as_ref(), event.session_id))
            .await?;
        if let Some(message_id) = form.and_then(|f| f.confirm_message_id) {
            deps.clear_keyboard(ctx, event.session_id, message_id).await?;
        }
        Ok(())
    }
}

/// Handles `confirm|yes` and `confirm|no`.
struct Confirm(Arc<FlowDeps>);

#[async_trait]
impl CallbackHandler for Confirm {
    async fn handle_callback(&self, ctx: &DispatchContext, event: &CallbackEvent) -> ParleyResult<()> {
        let deps = &self.0;
        let session = event.session_id;
        let token = CallbackToken::parse(&event.token, deps.delimiter);

        let state = ctx.run(deps.store.get_state(session)).await?;
        let notice = if state != STATE_CONFIRM {
            debug!(session = %session, state = %state, "Stale confirmation pressed");
            Some("This confirmation has expired.")
        } else {
            match token.param_at(0) {
                Some(ANSWER_YES) => {
                    let form = deps.form(ctx, session).await?;
                    match (form.name, form.group) {
                        (Some(name), Some(group)) => {
                            ctx.run(deps.directory.register(RegisteredUser {
                                session_id: session,
                                name: name.clone(),
                                group: group.clone(),
                                registered_at: chrono::Utc::now(),
                            }))
                            .await?;
                            deps.reset(ctx, session).await?;
                            deps.say(ctx, session, format!("Registered {name} in {group}."))
                                .await?;
                            info!(session = %session, group = %group, "User registered");
                            None
                        }
                        _ => {
                            deps.reset(ctx, session).await?;
                            deps.say(ctx, session, "Your answers were lost, please /register again.")
                                .await?;
                            None
                        }
                    }
                }
                Some(ANSWER_NO) => {
                    deps.reset(ctx, session).await?;
                    deps.say(ctx, session, "Registration discarded.").await?;
                    None
                }
                _ => Some("Unknown choice."),
            }
        };

        if let Some(message_id) = event.message_id {
            deps.clear_keyboard(ctx, session, message_id).await?;
        }
        if let Some(query_id) = event.query_id.as_deref() {
            ctx.run(deps.channel.answer_callback(query_id, notice))
                .await?;
        }
        Ok(())
    }
}
