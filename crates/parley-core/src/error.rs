use thiserror::Error;

/// A convenience `Result` alias using [`ParleyError`].
pub type ParleyResult<T> = Result<T, ParleyError>;

/// Top-level error type for the Parley engine.
///
/// Each variant corresponds to a subsystem that can produce errors. None of
/// them is fatal to a running process: the dispatcher logs them and keeps
/// serving other sessions.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// The conversation store failed to read or write state or blob data.
    #[error("Store error: {0}")]
    Store(String),

    /// An outbound transport call failed.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The route or callback table rejected a registration.
    #[error("Routing error: {0}")]
    Routing(String),

    /// No registered prefix matches the callback token.
    #[error("Unregistered callback: {0}")]
    UnregisteredCallback(String),

    /// A handler (or a business collaborator it called) failed.
    #[error("Handler error: {0}")]
    Handler(String),

    /// The dispatch context was cancelled before the operation finished.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the HTTP gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
