use async_trait::async_trait;
use parley_core::{CallbackToken, ParleyResult, SessionId};
use serde::{Deserialize, Serialize};

/// One inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    /// Label shown to the user.
    pub text: String,
    /// Callback token delivered back when the button is pressed.
    pub token: String,
}

impl InlineButton {
    /// Button carrying an already encoded token.
    pub fn new(text: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            token: token.into(),
        }
    }

    /// Button carrying `token` encoded with `delimiter`.
    pub fn with_token(
        text: impl Into<String>,
        token: &CallbackToken,
        delimiter: char,
    ) -> ParleyResult<Self> {
        Ok(Self::new(text, token.encode(delimiter)?))
    }
}

/// A message to deliver to the user of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target conversation.
    pub session_id: SessionId,
    /// Message text.
    pub text: String,
    /// Inline keyboard rows; empty for a plain message.
    #[serde(default)]
    pub keyboard: Vec<Vec<InlineButton>>,
}

impl OutgoingMessage {
    /// Plain text message.
    pub fn text(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    /// Add a row of inline buttons.
    pub fn with_row(mut self, row: Vec<InlineButton>) -> Self {
        self.keyboard.push(row);
        self
    }
}

/// Outbound side of a messaging transport.
///
/// Handlers produce their visible side effects through this trait; the
/// engine never talks to the transport API directly.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &str;

    /// Deliver a message; returns the transport id of the sent message.
    async fn send(&self, message: OutgoingMessage) -> ParleyResult<i64>;

    /// Remove the inline keyboard from a previously sent message.
    async fn clear_keyboard(&self, session_id: SessionId, message_id: i64) -> ParleyResult<()>;

    /// Acknowledge a button press, optionally with a short notice.
    async fn answer_callback(&self, query_id: &str, notice: Option<&str>) -> ParleyResult<()>;
}
