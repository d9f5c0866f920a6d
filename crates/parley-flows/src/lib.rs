//! Conversation flows for the Parley bot engine.
//!
//! Each flow installs its state handlers, callback handlers and, when it
//! owns the idle state, the fallback into a [`parley_gateway::RouterBuilder`].
//!
//! # Main types
//!
//! - [`RegistrationFlow`] — Name, group and confirmation sign-up.
//! - [`UserDirectory`] — Destination of confirmed registrations.

/// Registered user storage.
pub mod directory;
/// Registration form kept in the session blob.
pub mod form;
/// Registration state handlers.
pub mod registration;

pub use directory::{InMemoryUserDirectory, RegisteredUser, UserDirectory};
pub use form::RegistrationForm;
pub use registration::RegistrationFlow;
