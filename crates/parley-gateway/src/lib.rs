//! Event routing and dispatch for Parley.
//!
//! The [`Router`] maps a session's state name to a chain of [`Handler`]s
//! and a callback token to a [`CallbackHandler`]. The [`Dispatcher`] is the
//! boundary entry point: it serializes events per session, bounds every
//! dispatch with a deadline and contains handler panics. [`GatewayServer`]
//! exposes the Telegram webhook and a health endpoint over HTTP.

pub mod context;
pub mod dispatch;
pub mod handler;
pub mod router;
pub mod server;
pub mod webhook;

pub use context::DispatchContext;
pub use dispatch::{
    DispatchOutcome, DispatchStatsSnapshot, Dispatcher, DEFAULT_DISPATCH_TIMEOUT,
};
pub use handler::{CallbackHandler, Handler};
pub use router::{Router, RouterBuilder, DEFAULT_REVERT_COMMANDS};
pub use server::GatewayServer;
