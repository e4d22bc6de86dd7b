//! Attachment records and options.

use crate::error::{Error, Result, type_name};
use serde::Deserialize;

/// Where attachment content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Content is read from a resolved path or URL at delivery time.
    Path {
        /// Resolved absolute path or URL.
        path: String,
        /// Path as given to `attach`, used as the removal key.
        attach_path: String,
    },
    /// Inline content, also used as the removal key.
    Data(String),
}

/// A single attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Content source.
    pub source: Source,
    /// File name presented to the recipient.
    pub filename: Option<String>,
    /// Content type.
    pub content_type: String,
    /// Content disposition (`attachment` or `inline`).
    pub disposition: String,
    /// Content-ID, set for embedded content.
    pub id: Option<String>,
}

impl Attachment {
    /// Returns the resolved path, if the content comes from a path.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match &self.source {
            Source::Path { path, .. } => Some(path),
            Source::Data(_) => None,
        }
    }

    /// Returns the inline data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&str> {
        match &self.source {
            Source::Data(data) => Some(data),
            Source::Path { .. } => None,
        }
    }

    /// Returns true if `key` is this attachment's removal key.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        match &self.source {
            Source::Path { attach_path, .. } => attach_path == key,
            Source::Data(data) => data == key,
        }
    }
}

/// Options for [`Message::attach`](crate::Message::attach) and
/// [`Message::embed`](crate::Message::embed).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AttachOptions {
    /// Inline content; must be a string when used.
    pub data: Option<serde_json::Value>,
    /// File name override.
    pub filename: Option<String>,
    /// Content type override.
    #[serde(rename = "content-type", alias = "content_type")]
    pub content_type: Option<String>,
    /// Disposition override.
    pub disposition: Option<String>,
    /// Content-ID.
    pub id: Option<String>,
    /// Whether the asset must exist. Defaults to `true`.
    pub check: Option<bool>,
    /// Asset library to resolve relative paths against.
    pub library: Option<String>,
}

impl AttachOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets inline data.
    #[must_use]
    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(serde_json::Value::String(data.into()));
        self
    }

    /// Sets the file name.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the disposition.
    #[must_use]
    pub fn disposition(mut self, disposition: impl Into<String>) -> Self {
        self.disposition = Some(disposition.into());
        self
    }

    /// Sets the Content-ID.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets whether the asset must exist.
    #[must_use]
    pub const fn check(mut self, check: bool) -> Self {
        self.check = Some(check);
        self
    }

    /// Sets the asset library.
    #[must_use]
    pub fn library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    /// Returns the inline data, `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAttachmentData` if the data is not a string.
    pub(crate) fn string_data(&self) -> Result<Option<String>> {
        match &self.data {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(data)) => Ok(Some(data.clone())),
            Some(other) => Err(Error::InvalidAttachmentData {
                found: type_name(other),
            }),
        }
    }

    pub(crate) fn has_data(&self) -> bool {
        !matches!(self.data, None | Some(serde_json::Value::Null))
    }
}

/// Attachment given at message construction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AttachSpec {
    /// A bare path.
    Path(String),
    /// A path and/or options.
    Entry {
        /// Path to attach.
        #[serde(default)]
        path: Option<String>,
        /// Attach options.
        #[serde(flatten)]
        options: AttachOptions,
    },
}

impl AttachSpec {
    /// Splits the entry into the arguments for `attach`.
    #[must_use]
    pub fn into_parts(self) -> (Option<String>, AttachOptions) {
        match self {
            Self::Path(path) => (Some(path), AttachOptions::default()),
            Self::Entry { path, options } => (path, options),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_data() {
        assert_eq!(AttachOptions::new().string_data().unwrap(), None);
        assert_eq!(
            AttachOptions::new().data("abc").string_data().unwrap(),
            Some("abc".to_string())
        );

        let options = AttachOptions {
            data: Some(json!(42)),
            ..AttachOptions::default()
        };
        assert!(options.has_data());
        assert!(matches!(
            options.string_data(),
            Err(Error::InvalidAttachmentData { found }) if found == "integer"
        ));
    }

    #[test]
    fn test_matches() {
        let attachment = Attachment {
            source: Source::Path {
                path: "/srv/mails/_assets/a.txt".into(),
                attach_path: "a.txt".into(),
            },
            filename: Some("a.txt".into()),
            content_type: "text/plain".into(),
            disposition: "attachment".into(),
            id: None,
        };
        assert!(attachment.matches("a.txt"));
        assert!(!attachment.matches("/srv/mails/_assets/a.txt"));
        assert_eq!(attachment.path(), Some("/srv/mails/_assets/a.txt"));
        assert_eq!(attachment.data(), None);
    }

    #[test]
    fn test_attach_spec_deserialize() {
        let specs: Vec<AttachSpec> = serde_json::from_value(json!([
            "/tmp/a.pdf",
            {"path": "b.txt", "filename": "x.txt", "check": false},
            {"data": "raw", "content-type": "text/csv"}
        ]))
        .unwrap();

        assert_eq!(specs[0].clone().into_parts().0.as_deref(), Some("/tmp/a.pdf"));

        let (path, options) = specs[1].clone().into_parts();
        assert_eq!(path.as_deref(), Some("b.txt"));
        assert_eq!(options.filename.as_deref(), Some("x.txt"));
        assert_eq!(options.check, Some(false));

        let (path, options) = specs[2].clone().into_parts();
        assert_eq!(path, None);
        assert_eq!(options.data, Some(json!("raw")));
        assert_eq!(options.content_type.as_deref(), Some("text/csv"));
    }
}
