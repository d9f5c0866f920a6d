use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lock discriminator used for every plain message of a session.
pub const MESSAGE_DISCRIMINATOR: &str = "message";

/// Identifier of one conversation, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SessionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A free-text message (possibly a `/command`) sent by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    /// The session this message belongs to.
    pub session_id: SessionId,
    /// Full message text as typed by the user.
    pub text: String,
    /// Command token without the leading slash, e.g. `cancel` for `/cancel`.
    pub command: Option<String>,
    /// Transport id of the sender, when known.
    pub sender_id: Option<i64>,
    /// Display name of the sender, when known.
    pub sender_name: Option<String>,
    /// Transport id of the message itself.
    pub message_id: Option<i64>,
    /// UTC timestamp of when the event was received.
    pub received_at: DateTime<Utc>,
}

impl MessageEvent {
    /// Create a message event, extracting the command token from `text`.
    pub fn new(session_id: SessionId, text: impl Into<String>) -> Self {
        let text = text.into();
        let command = parse_command(&text);
        Self {
            session_id,
            text,
            command,
            sender_id: None,
            sender_name: None,
            message_id: None,
            received_at: Utc::now(),
        }
    }

    /// Whether this message carries the given command token.
    pub fn is_command(&self, name: &str) -> bool {
        self.command.as_deref() == Some(name)
    }

    /// Text following the command token, or the whole text for plain
    /// messages.
    pub fn args(&self) -> &str {
        if self.command.is_none() {
            return self.text.trim();
        }
        self.text
            .trim()
            .split_once(char::is_whitespace)
            .map_or("", |(_, rest)| rest.trim())
    }
}

/// A button press carrying a callback token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEvent {
    /// The session this callback belongs to.
    pub session_id: SessionId,
    /// Raw callback token: registered prefix plus positional parameters.
    pub token: String,
    /// Transport id of the user who pressed the button.
    pub sender_id: Option<i64>,
    /// Transport id of the message the keyboard was attached to.
    pub message_id: Option<i64>,
    /// Transport id of the callback query, used to acknowledge it.
    pub query_id: Option<String>,
    /// UTC timestamp of when the event was received.
    pub received_at: DateTime<Utc>,
}

impl CallbackEvent {
    /// Create a callback event for `token`.
    pub fn new(session_id: SessionId, token: impl Into<String>) -> Self {
        Self {
            session_id,
            token: token.into(),
            sender_id: None,
            message_id: None,
            query_id: None,
            received_at: Utc::now(),
        }
    }
}

/// An inbound event delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Free text or a command.
    Message(MessageEvent),
    /// Inline button press.
    Callback(CallbackEvent),
}

impl Event {
    /// The session the event belongs to.
    pub fn session_id(&self) -> SessionId {
        match self {
            Event::Message(m) => m.session_id,
            Event::Callback(c) => c.session_id,
        }
    }

    /// Secondary lock key: all messages of a session share one domain,
    /// each distinct callback token gets its own.
    pub fn discriminator(&self) -> &str {
        match self {
            Event::Message(_) => MESSAGE_DISCRIMINATOR,
            Event::Callback(c) => &c.token,
        }
    }

    /// Short event kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Message(_) => "message",
            Event::Callback(_) => "callback",
        }
    }
}

impl From<MessageEvent> for Event {
    fn from(event: MessageEvent) -> Self {
        Event::Message(event)
    }
}

impl From<CallbackEvent> for Event {
    fn from(event: CallbackEvent) -> Self {
        Event::Callback(event)
    }
}

/// `/start@my_bot now` → `start`.
fn parse_command(text: &str) -> Option<String> {
    let first = text.trim_start().split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
