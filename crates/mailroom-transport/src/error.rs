//! Error types for transport operations.

use std::io;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Message could not be serialized.
    #[error(transparent)]
    Message(#[from] mailroom_mime::Error),

    /// Attachment content could not be loaded.
    #[error("Can not attach path `{path}`: {reason}")]
    AttachmentRead {
        /// Resolved attachment path or URL.
        path: String,
        /// Underlying failure.
        reason: String,
    },

    /// Formatter name has no template or function.
    #[error("Formatter for format `{0}` is neither a template nor a function")]
    BadFormatter(String),

    /// Invalid adapter configuration.
    #[error("Invalid transport configuration: {0}")]
    Config(String),

    /// Remote service rejected the message.
    #[error("Delivery failed with status {status}: {body}")]
    DeliveryFailed {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an attachment read error.
    #[must_use]
    pub fn attachment_read(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::AttachmentRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the remote service answered with a 4xx status.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::DeliveryFailed { status, .. } if *status >= 400 && *status < 500)
    }
}
