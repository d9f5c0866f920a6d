//! Messaging transport adapters.
//!
//! Provides the outbound [`Channel`] trait used by flow handlers, the
//! Telegram Bot API adapter that also turns inbound updates into engine
//! events, and an in-memory channel for local runs and tests.
//!
//! # Main types
//!
//! - [`Channel`] — Trait for the visible side effects of a handler.
//! - [`TelegramChannel`] — Telegram Bot API client and update poller.
//! - [`MemoryChannel`] — Records outbound operations in memory.

/// Core channel trait and outgoing message types.
pub mod channel;
/// In-memory recording channel.
pub mod memory;
/// Telegram channel integration.
pub mod telegram;

pub use channel::{Channel, InlineButton, OutgoingMessage};
pub use memory::{MemoryChannel, Outbound};
pub use telegram::{TelegramChannel, Update};
