//! Core types and error definitions for the Parley bot engine.
//!
//! This crate provides the foundational types shared across all Parley
//! crates: the error enum, inbound event representations, the callback
//! token format and the prefix index used for routing.
//!
//! # Main types
//!
//! - [`ParleyError`] — Unified error enum for all Parley subsystems.
//! - [`ParleyResult`] — Convenience alias for `Result<T, ParleyError>`.
//! - [`SessionId`] — Opaque conversation identifier.
//! - [`Event`] — An inbound message or callback event.
//! - [`PrefixIndex`] — Character trie with exact and longest-prefix lookup.
//! - [`CallbackToken`] — Prefix plus positional parameters of a button press.

/// Error type shared by every crate.
pub mod error;
/// Inbound event types.
pub mod event;
/// Callback token encoding and parsing.
pub mod token;
/// Prefix index used by the router.
pub mod trie;

pub use error::{ParleyError, ParleyResult};
pub use event::{CallbackEvent, Event, MessageEvent, SessionId, MESSAGE_DISCRIMINATOR};
pub use token::{CallbackToken, DEFAULT_DELIMITER, MAX_TOKEN_BYTES};
pub use trie::{PathIter, PrefixIndex, PrefixNode};
