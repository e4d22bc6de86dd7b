//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur while dispatching a delivery.
#[derive(Debug, Error)]
pub enum Error {
    /// Message construction or compliance failed.
    #[error(transparent)]
    Message(#[from] mailroom_mime::Error),

    /// Transport failed.
    #[error(transparent)]
    Transport(#[from] mailroom_transport::Error),

    /// No delivery configuration with that name.
    #[error("No delivery configuration named `{0}`")]
    UnknownDelivery(String),

    /// Message declares a type without a handler.
    #[error("Unhandled media type `{0}`")]
    UnhandledMediaType(String),

    /// Renderer could not produce a body.
    #[error("Could not render `{kind}` body: {reason}")]
    Render {
        /// Media type being rendered.
        kind: String,
        /// Failure description.
        reason: String,
    },

    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Creates a render error.
    #[must_use]
    pub fn render(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
