//! Rendering pipeline.
//!
//! Populates a message's body for every declared type and finalizes it.
//! Template engines plug in through the [`Renderer`] trait; the built-in
//! [`PassthroughRenderer`] uses the data as the body.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use mailroom_mime::Message;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What is being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Mailer name, used to look up mailer specific templates.
    pub mailer: Option<String>,
    /// Message (template) name.
    pub name: String,
}

impl Template {
    /// Creates a template reference.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            mailer: None,
            name: name.into(),
        }
    }

    /// Sets the mailer name.
    #[must_use]
    pub fn with_mailer(mut self, mailer: impl Into<String>) -> Self {
        self.mailer = Some(mailer.into());
        self
    }
}

/// Produces the body of one media type.
///
/// Renderers get mutable access to the message so templates can attach or
/// embed content while rendering.
pub trait Renderer: Send + Sync {
    /// Renders the body for `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be rendered for that type.
    fn render(
        &self,
        message: &mut Message,
        kind: &str,
        data: &Value,
        template: &Template,
    ) -> Result<String>;
}

/// Uses string data verbatim.
///
/// A string is the body of every type; an object supplies one string per
/// type, keyed by type name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughRenderer;

impl Renderer for PassthroughRenderer {
    fn render(
        &self,
        _message: &mut Message,
        kind: &str,
        data: &Value,
        _template: &Template,
    ) -> Result<String> {
        match data {
            Value::String(body) => Ok(body.clone()),
            Value::Object(per_type) => match per_type.get(kind) {
                Some(Value::String(body)) => Ok(body.clone()),
                Some(_) => Err(Error::render(kind, "body data is not a string")),
                None => Err(Error::render(kind, "no body data for this type")),
            },
            _ => Err(Error::render(
                kind,
                "could not interpret data without a template",
            )),
        }
    }
}

/// Maps media types to renderers.
#[derive(Clone)]
pub struct Media {
    default: Arc<dyn Renderer>,
    handlers: IndexMap<String, Arc<dyn Renderer>>,
}

impl fmt::Debug for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Media")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for Media {
    fn default() -> Self {
        Self::new(PassthroughRenderer)
    }
}

impl Media {
    /// Creates a pipeline with a default renderer for every type.
    #[must_use]
    pub fn new(default: impl Renderer + 'static) -> Self {
        Self {
            default: Arc::new(default),
            handlers: IndexMap::new(),
        }
    }

    /// Uses a specific renderer for one type.
    #[must_use]
    pub fn with_handler(mut self, kind: impl Into<String>, renderer: impl Renderer + 'static) -> Self {
        self.handlers.insert(kind.into(), Arc::new(renderer));
        self
    }

    /// Renders every declared type into the message, then finalizes it.
    ///
    /// Types must be registered in the message's media registry. Bodies are
    /// appended in declaration order, after which
    /// [`Message::ensure_standard_compliance`] runs.
    ///
    /// # Errors
    ///
    /// Returns `UnhandledMediaType` for unregistered types, the renderer's
    /// error, or the compliance failure.
    pub fn render(&self, message: &mut Message, data: &Value, template: &Template) -> Result<()> {
        for kind in message.types.clone() {
            if !message.registry().media.is_handled(&kind) {
                return Err(Error::UnhandledMediaType(kind));
            }
            let renderer = self.handlers.get(&kind).unwrap_or(&self.default);
            let body = renderer.render(message, &kind, data, template)?;
            message.push_body(&kind, body);
        }
        tracing::debug!(template = %template.name, types = ?message.types, "Rendered message");
        message.ensure_standard_compliance()?;
        Ok(())
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
    use mailroom_mime::{AttachOptions, Registry};
    use serde_json::json;

    fn message() -> Message {
        let mut message = Message::new(Arc::new(Registry::new()));
        message.from = Some("a@b".into());
        message
    }

    #[test]
    fn test_passthrough_string() {
        let mut message = message();
        Media::default()
            .render(&mut message, &json!("Hello"), &Template::new("welcome"))
            .unwrap();
        assert_eq!(message.body("html"), "Hello");
        assert_eq!(message.body("text"), "Hello");
        assert!(message.date.is_some());
    }

    #[test]
    fn test_passthrough_per_type() {
        let mut message = message();
        let data = json!({"html": "<p>Hello</p>", "text": "Hello"});
        Media::default()
            .render(&mut message, &data, &Template::new("welcome"))
            .unwrap();
        assert_eq!(message.body("html"), "<p>Hello</p>");
        assert_eq!(message.body("text"), "Hello");
    }

    #[test]
    fn test_passthrough_without_usable_data() {
        let mut message = message();
        let err = Media::default()
            .render(&mut message, &json!({"html": "x"}), &Template::new("welcome"))
            .unwrap_err();
        assert!(matches!(err, Error::Render { ref kind, .. } if kind == "text"));

        let err = Media::default()
            .render(&mut message, &json!(42), &Template::new("welcome"))
            .unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
    }

    #[test]
    fn test_unhandled_media_type() {
        let mut message = message();
        message.types = vec!["text".to_string(), "pdf".to_string()];
        let err = Media::default()
            .render(&mut message, &json!("x"), &Template::new("welcome"))
            .unwrap_err();
        assert!(matches!(err, Error::UnhandledMediaType(ref kind) if kind == "pdf"));
        assert_eq!(err.to_string(), "Unhandled media type `pdf`");
    }

    #[test]
    fn test_compliance_runs_after_rendering() {
        let mut message = Message::new(Arc::new(Registry::new()));
        let err = Media::default()
            .render(&mut message, &json!("x"), &Template::new("welcome"))
            .unwrap_err();
        assert!(matches!(err, Error::Message(mailroom_mime::Error::MissingFrom)));
        assert_eq!(message.body("text"), "x");
    }

    struct Embedding;

    impl Renderer for Embedding {
        fn render(
            &self,
            message: &mut Message,
            kind: &str,
            _data: &Value,
            template: &Template,
        ) -> Result<String> {
            let cid = message.embed(None, AttachOptions::new().data("logo").filename("logo.txt"))?;
            Ok(format!("{kind}:{}:{cid}", template.name))
        }
    }

    #[test]
    fn test_handler_per_type() {
        let mut message = message();
        let media = Media::default().with_handler("html", Embedding);
        media
            .render(&mut message, &json!("plain"), &Template::new("welcome"))
            .unwrap();

        assert!(message.body("html").starts_with("html:welcome:"));
        assert_eq!(message.body("text"), "plain");
        assert_eq!(message.attachments().len(), 1);
        assert_eq!(message.attachments()[0].disposition, "inline");
    }
}
