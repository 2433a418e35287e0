//! Error types for the event automation engine.
//!
//! Errors are layered by where they can surface: decode errors at the wire
//! boundary, configuration errors at load time (fatal, the process must not
//! start), handler errors at the runtime boundary (caught and classified,
//! never propagated to siblings or the router).

use thiserror::Error;

use crate::outcome::ErrorKind;
use crate::store::{ActionError, StoreError};

/// Errors decoding the host wire envelope.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed event envelope: {detail}")]
    Envelope { detail: String },

    #[error("Event data is missing required field '{field}'")]
    MissingField { field: String },

    #[error("Event data must be an object, got {actual}")]
    DataNotObject { actual: &'static str },
}

/// Load-time configuration errors.
///
/// All of these are fatal: the engine refuses to start with an ambiguous or
/// malformed blueprint rather than discovering the problem at dispatch time.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Duplicate handler registration name '{name}'")]
    DuplicateRegistration { name: String },

    #[error("Malformed filter for '{name}': {detail}")]
    MalformedFilter { name: String, detail: String },

    #[error("Registration '{name}' references unknown handler '{src}'")]
    UnknownHandler { name: String, src: String },

    #[error("Registration '{name}' has an empty trigger operation set")]
    EmptyTriggerSet { name: String },

    #[error("Registration '{name}' has a zero timeout")]
    ZeroTimeout { name: String },

    #[error("Malformed blueprint document: {detail}")]
    Parse { detail: String },
}

/// Errors a handler invocation can produce.
///
/// These never escape the handler runtime; they are converted into
/// `HandlerOutcome::Failed` with the matching [`ErrorKind`].
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Document store error: {message}")]
    Store { message: String },

    #[error("Write conflict: {message}")]
    Conflict { message: String },

    #[error("External action failed: {message}")]
    ExternalAction { message: String },

    #[error("Handler error: {message}")]
    Internal { message: String },
}

impl HandlerError {
    /// Creates an internal handler error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The outcome classification for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Store { .. } => ErrorKind::Store,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::ExternalAction { .. } => ErrorKind::ExternalAction,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => Self::Conflict {
                message: err.to_string(),
            },
            StoreError::ActionFailed { .. } => Self::ExternalAction {
                message: err.to_string(),
            },
            other => Self::Store {
                message: other.to_string(),
            },
        }
    }
}

impl From<ActionError> for HandlerError {
    fn from(err: ActionError) -> Self {
        Self::ExternalAction {
            message: err.to_string(),
        }
    }
}

/// Top-level error type for the engine surface.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Returns true if this error is fatal at startup.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
