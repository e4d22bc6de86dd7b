//! Mailer dispatch.
//!
//! A [`Mailer`] turns a [`DeliverRequest`] into a delivered message:
//!
//! 1. merge option sets: delivery defaults < global set < message set < request
//! 2. construct the message
//! 3. run interceptors in order
//! 4. render bodies and finalize
//! 5. hand the message to the delivery's transport

use crate::delivery::{DEFAULT_DELIVERY, Deliveries};
use crate::error::Result;
use crate::render::{Media, Template};
use indexmap::IndexMap;
use mailroom_mime::{Message, MessageOptions, Registry};
use mailroom_transport::{Options, Receipt};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Options that stay message options in the short request form.
pub const SHORT_OPTIONS: &[&str] = &["from", "cc", "bcc", "subject", "delivery"];

/// A request to deliver a named message.
#[derive(Debug, Clone, Default)]
pub struct DeliverRequest {
    /// Message (template) name.
    pub message: String,
    /// Delivery name; falls back to the option sets, then `default`.
    pub delivery: Option<String>,
    /// Recipient, overriding any `to` option.
    pub to: Option<Value>,
    /// Message options.
    pub options: Map<String, Value>,
    /// Data for the renderer.
    pub data: Value,
    /// Per-call transport options.
    pub transport: Options,
}

impl DeliverRequest {
    /// Creates a request for a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Creates a request from the short form: a recipient plus loose
    /// fields.
    ///
    /// Fields named in [`SHORT_OPTIONS`] become message options (with
    /// `delivery` selecting the delivery), everything else becomes render
    /// data.
    #[must_use]
    pub fn short(message: impl Into<String>, to: impl Into<Value>, fields: Map<String, Value>) -> Self {
        let mut request = Self::new(message).to(to);
        let mut data = Map::new();
        for (key, value) in fields {
            if key == "delivery" {
                request.delivery = value.as_str().map(str::to_string);
            } else if SHORT_OPTIONS.contains(&key.as_str()) {
                request.options.insert(key, value);
            } else {
                data.insert(key, value);
            }
        }
        request.data = Value::Object(data);
        request
    }

    /// Sets the delivery name.
    #[must_use]
    pub fn delivery(mut self, delivery: impl Into<String>) -> Self {
        self.delivery = Some(delivery.into());
        self
    }

    /// Sets the recipient.
    #[must_use]
    pub fn to(mut self, to: impl Into<Value>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Sets a message option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Sets the render data.
    #[must_use]
    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    /// Sets the transport options.
    #[must_use]
    pub fn transport(mut self, options: Options) -> Self {
        self.transport = options;
        self
    }
}

/// State handed through interceptors.
#[derive(Debug)]
pub struct DeliveryContext {
    /// Delivery name.
    pub delivery: String,
    /// Constructed message.
    pub message: Message,
    /// Render data.
    pub data: Value,
    /// Template reference.
    pub template: Template,
    /// Transport options.
    pub transport: Options,
}

/// Function run on every delivery before rendering.
pub type Interceptor = Arc<dyn Fn(DeliveryContext) -> Result<DeliveryContext> + Send + Sync>;

/// Delivers named messages through configured deliveries.
#[derive(Clone)]
pub struct Mailer {
    name: Option<String>,
    deliveries: Arc<Deliveries>,
    registry: Arc<Registry>,
    media: Media,
    defaults: Map<String, Value>,
    messages: IndexMap<String, Map<String, Value>>,
    interceptors: Vec<Interceptor>,
}

impl fmt::Debug for Mailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailer")
            .field("name", &self.name)
            .field("deliveries", &self.deliveries)
            .field("media", &self.media)
            .field("defaults", &self.defaults)
            .field("messages", &self.messages)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

impl Mailer {
    /// Creates a mailer over a set of deliveries.
    #[must_use]
    pub fn new(deliveries: Arc<Deliveries>, registry: Arc<Registry>) -> Self {
        Self {
            name: None,
            deliveries,
            registry,
            media: Media::default(),
            defaults: Map::new(),
            messages: IndexMap::new(),
            interceptors: Vec::new(),
        }
    }

    /// Sets the mailer name passed to renderers.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the rendering pipeline.
    #[must_use]
    pub fn with_media(mut self, media: Media) -> Self {
        self.media = media;
        self
    }

    /// Sets options applied to every message.
    #[must_use]
    pub fn with_defaults(mut self, options: Map<String, Value>) -> Self {
        self.defaults = options;
        self
    }

    /// Sets options applied to one named message.
    #[must_use]
    pub fn with_message(mut self, name: impl Into<String>, options: Map<String, Value>) -> Self {
        self.messages.insert(name.into(), options);
        self
    }

    /// Appends an interceptor.
    #[must_use]
    pub fn with_interceptor(
        mut self,
        interceptor: impl Fn(DeliveryContext) -> Result<DeliveryContext> + Send + Sync + 'static,
    ) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Constructs a message from loose options.
    ///
    /// # Errors
    ///
    /// Returns an error if the options do not describe a valid message.
    pub fn message(&self, options: Map<String, Value>) -> Result<Message> {
        let options = MessageOptions::from_value(Value::Object(options))?;
        Ok(Message::from_options(options, Arc::clone(&self.registry))?)
    }

    /// Delivers a message.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDelivery` for an unknown delivery name, or the first
    /// error of message construction, interceptors, rendering or transport.
    pub async fn deliver(&self, request: DeliverRequest) -> Result<Receipt> {
        let DeliverRequest {
            message: name,
            delivery,
            to,
            options,
            data,
            transport: transport_options,
        } = request;

        let mut merged = self.defaults.clone();
        if let Some(message_options) = self.messages.get(&name) {
            merge(&mut merged, message_options.clone());
        }
        merge(&mut merged, options);
        if let Some(to) = to {
            merged.insert("to".to_string(), to);
        }

        let configured = merged.remove("delivery");
        let delivery = delivery
            .or_else(|| configured.as_ref().and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_DELIVERY.to_string());

        let transport = self.deliveries.adapter(&delivery)?;
        let mut message_options = self.deliveries.message_defaults(&delivery)?.clone();
        merge(&mut message_options, merged);

        let mut template = Template::new(name);
        template.mailer.clone_from(&self.name);

        let mut context = DeliveryContext {
            delivery,
            message: self.message(message_options)?,
            data,
            template,
            transport: transport_options,
        };
        for interceptor in &self.interceptors {
            context = interceptor(context)?;
        }

        tracing::info!(
            delivery = %context.delivery,
            template = %context.template.name,
            adapter = transport.name(),
            "Delivering message"
        );
        self.media
            .render(&mut context.message, &context.data, &context.template)?;
        let receipt = transport
            .deliver(&context.message, &context.transport)
            .await?;
        if !receipt.is_success() {
            tracing::warn!(delivery = %context.delivery, ?receipt, "Delivery not confirmed");
        }
        Ok(receipt)
    }
}

/// Merges `overlay` into `base`; objects merge key by key, anything else is
/// replaced.
fn merge(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
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
    use crate::error::Error;
    use async_trait::async_trait;
    use mailroom_transport::Transport;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        sent: Mutex<Vec<(Message, Options)>>,
    }

    #[derive(Debug, Clone, Default)]
    struct Recording(Arc<Recorder>);

    impl Recording {
        fn sent(&self) -> Vec<(Message, Options)> {
            self.0.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(
            &self,
            message: &Message,
            options: &Options,
        ) -> mailroom_transport::Result<Receipt> {
            self.0
                .sent
                .lock()
                .unwrap()
                .push((message.clone(), options.clone()));
            Ok(Receipt::Handed { accepted: true })
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn mailer() -> (Mailer, Recording, Recording) {
        let default = Recording::default();
        let other = Recording::default();
        let mut deliveries = Deliveries::new();
        deliveries.insert(
            "default",
            Arc::new(default.clone()),
            object(json!({"from": "app@example.com", "subject": "From config"})),
        );
        deliveries.insert("other", Arc::new(other.clone()), Map::new());
        let mailer = Mailer::new(Arc::new(deliveries), Arc::new(Registry::new()));
        (mailer, default, other)
    }

    #[test]
    fn test_merge() {
        let mut base = object(json!({"a": 1, "nested": {"x": 1, "y": 2}, "list": [1]}));
        merge(
            &mut base,
            object(json!({"a": 2, "nested": {"y": 3}, "list": [2], "b": true})),
        );
        assert_eq!(
            Value::Object(base),
            json!({"a": 2, "nested": {"x": 1, "y": 3}, "list": [2], "b": true})
        );
    }

    #[test]
    fn test_short_request() {
        let request = DeliverRequest::short(
            "welcome",
            "foo@bar",
            object(json!({"subject": "Hi", "delivery": "other", "name": "Foo"})),
        );
        assert_eq!(request.to, Some(json!("foo@bar")));
        assert_eq!(request.delivery.as_deref(), Some("other"));
        assert_eq!(request.options.get("subject"), Some(&json!("Hi")));
        assert!(!request.options.contains_key("name"));
        assert_eq!(request.data, json!({"name": "Foo"}));
    }

    #[tokio::test]
    async fn test_deliver_uses_default_delivery() {
        let (mailer, default, other) = mailer();
        let request = DeliverRequest::new("welcome")
            .to("foo@bar")
            .data("Hello")
            .transport(Options::new().format("short"));

        let receipt = mailer.deliver(request).await.unwrap();
        assert!(receipt.is_success());
        assert!(other.sent().is_empty());

        let sent = default.sent();
        let (message, options) = &sent[0];
        assert_eq!(message.to, Some("foo@bar".into()));
        assert_eq!(message.from, Some("app@example.com".into()));
        assert_eq!(message.subject.as_deref(), Some("From config"));
        assert_eq!(message.body("text"), "Hello");
        assert!(message.date.is_some());
        assert_eq!(options.format.as_deref(), Some("short"));
    }

    #[tokio::test]
    async fn test_option_precedence() {
        let (mailer, default, _) = mailer();
        let mailer = mailer
            .with_defaults(object(json!({"subject": "Global", "cc": "cc@example.com"})))
            .with_message("welcome", object(json!({"subject": "Welcome!"})));

        mailer
            .deliver(DeliverRequest::new("welcome").to("a@b").data("x"))
            .await
            .unwrap();
        mailer
            .deliver(DeliverRequest::new("other").to("a@b").data("x"))
            .await
            .unwrap();
        mailer
            .deliver(
                DeliverRequest::new("welcome")
                    .to("a@b")
                    .option("subject", "Explicit")
                    .data("x"),
            )
            .await
            .unwrap();

        let subjects: Vec<_> = default
            .sent()
            .iter()
            .map(|(message, _)| message.subject.clone().unwrap())
            .collect();
        assert_eq!(subjects, ["Welcome!", "Global", "Explicit"]);
        assert!(default
            .sent()
            .iter()
            .all(|(message, _)| message.cc == Some("cc@example.com".into())));
    }

    #[tokio::test]
    async fn test_delivery_selection() {
        let (mailer, default, other) = mailer();
        let mailer = mailer.with_message("digest", object(json!({"delivery": "other"})));

        mailer
            .deliver(
                DeliverRequest::new("digest")
                    .to("a@b")
                    .option("from", "digest@example.com")
                    .data("x"),
            )
            .await
            .unwrap();
        assert_eq!(other.sent().len(), 1);
        assert!(default.sent().is_empty());

        let err = mailer
            .deliver(DeliverRequest::new("welcome").delivery("missing").data("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDelivery(ref name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_missing_from_is_reported_before_transport() {
        let (mailer, _, other) = mailer();
        let err = mailer
            .deliver(DeliverRequest::new("welcome").delivery("other").to("a@b").data("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Message(mailroom_mime::Error::MissingFrom)));
        assert!(other.sent().is_empty());
    }

    #[tokio::test]
    async fn test_interceptors_run_in_order() {
        let (mailer, default, _) = mailer();
        let mailer = mailer
            .with_name("account")
            .with_interceptor(|mut context| {
                context.message.header("X-Trace", "first");
                Ok(context)
            })
            .with_interceptor(|mut context| {
                let previous = context.message.headers.get("X-Trace").unwrap_or_default().to_string();
                context.message.header("X-Trace", format!("{previous},second"));
                context.data = json!(format!("{}/{}", context.template.mailer.as_deref().unwrap(), context.template.name));
                Ok(context)
            });

        mailer
            .deliver(DeliverRequest::new("welcome").to("a@b").data("ignored"))
            .await
            .unwrap();
        let sent = default.sent();
        let message = &sent[0].0;
        assert_eq!(message.headers.get("X-Trace"), Some("first,second"));
        assert_eq!(message.body("html"), "account/welcome");
    }

    #[tokio::test]
    async fn test_interceptor_can_abort() {
        let (mailer, default, _) = mailer();
        let mailer = mailer.with_interceptor(|_| Err(Error::render("html", "aborted")));
        let err = mailer
            .deliver(DeliverRequest::new("welcome").to("a@b").data("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
        assert!(default.sent().is_empty());
    }

    #[test]
    fn test_message_factory() {
        let (mailer, _, _) = mailer();
        let err = mailer.message(object(json!({"from": 42}))).unwrap_err();
        assert!(matches!(
            err,
            Error::Message(mailroom_mime::Error::InvalidFromType { .. })
        ));
        let message = mailer
            .message(object(json!({"from": {"App": "app@example.com"}, "types": "text"})))
            .unwrap();
        assert_eq!(message.types, ["text"]);
    }
}
