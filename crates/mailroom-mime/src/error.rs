//! Error types for message composition.

/// Result type alias for message operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message composition error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Date is not a timestamp in the 32-bit positive range.
    #[error("Invalid date timestamp `{0}` set for message")]
    InvalidDate(i64),

    /// No originator address.
    #[error("Message should have at least one `from` address")]
    MissingFrom,

    /// Originator was given as something other than a string or mapping.
    #[error("Message `from` field should be a string or a mapping, `{found}` given")]
    InvalidFromType {
        /// Name of the type that was supplied.
        found: String,
    },

    /// Sender resolves to more than one mailbox.
    #[error("Message should only have a single `sender` address")]
    MultipleSender,

    /// Neither a path nor data was supplied to `attach`.
    #[error("Neither path nor data provided, cannot attach")]
    NothingToAttach,

    /// Asset resolution reported failure.
    #[error("File at `{0}` is not a valid asset, cannot attach")]
    AssetNotFound(String),

    /// Attachment data was not a string.
    #[error("Data should be a string, `{found}` given, cannot attach")]
    InvalidAttachmentData {
        /// Name of the type that was supplied.
        found: String,
    },

    /// Short type name has no registered content type.
    #[error("Unknown media type `{0}`")]
    UnknownType(String),

    /// Invalid address value for a non-originator field.
    #[error("Invalid address value for `{field}`: `{found}` given")]
    InvalidAddress {
        /// Message field name.
        field: &'static str,
        /// Name of the type that was supplied.
        found: String,
    },

    /// Invalid regular expression assembled from grammar tokens.
    #[error("Invalid grammar: {0}")]
    Grammar(#[from] regex::Error),

    /// Malformed message options.
    #[error("Invalid message options: {0}")]
    Options(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error comes from a standard compliance check.
    #[must_use]
    pub const fn is_compliance(&self) -> bool {
        matches!(
            self,
            Self::InvalidDate(_) | Self::MissingFrom | Self::InvalidFromType { .. } | Self::MultipleSender
        )
    }
}

/// Returns the JSON type name of a value, as reported in type errors.
pub(crate) fn type_name(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_f64() => "double",
        serde_json::Value::Number(_) => "integer",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
    .to_string()
}
