//! Named delivery configurations.
//!
//! A delivery bundles an adapter choice, its settings and default message
//! fields. Configurations are flat JSON objects: the `adapter` key selects
//! the adapter, message fields (`from`, `subject`, ...) become defaults for
//! every message sent through it and the remaining keys configure the
//! adapter.
//!
//! ```json
//! {
//!     "default": {"adapter": "simple", "from": {"My App": "app@example.com"}},
//!     "mailgun": {"adapter": "mailgun", "domain": "example.com", "key": "key-123"}
//! }
//! ```

use crate::error::{Error, Result};
use indexmap::IndexMap;
use mailroom_transport::{
    Debug, DebugConfig, Mailgun, MailgunConfig, Simple, SimpleConfig, Transport,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Name used when a request names no delivery.
pub const DEFAULT_DELIVERY: &str = "default";

/// Keys of a configuration that are message defaults.
const MESSAGE_KEYS: &[&str] = &[
    "subject",
    "date",
    "charset",
    "baseURL",
    "baseUrl",
    "base_url",
    "returnPath",
    "return_path",
    "sender",
    "from",
    "replyTo",
    "reply_to",
    "to",
    "cc",
    "bcc",
    "types",
    "headers",
    "attach",
    "grammar",
    "mimeTypes",
    "mime_types",
];

/// Adapter selection and settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "adapter")]
pub enum AdapterConfig {
    /// Local mail command.
    #[serde(rename = "simple", alias = "Simple")]
    Simple(SimpleConfig),
    /// Log sink.
    #[serde(rename = "debug", alias = "Debug")]
    Debug(DebugConfig),
    /// Mailgun HTTP API.
    #[serde(rename = "mailgun", alias = "Mailgun")]
    Mailgun(MailgunConfig),
}

impl AdapterConfig {
    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot be constructed.
    pub fn build(&self) -> Result<Arc<dyn Transport>> {
        Ok(match self {
            Self::Simple(config) => Arc::new(Simple::from_config(config)?),
            Self::Debug(config) => Arc::new(Debug::from_config(config.clone())),
            Self::Mailgun(config) => Arc::new(Mailgun::new(config.clone())?),
        })
    }
}

/// A named delivery configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Adapter settings.
    pub adapter: AdapterConfig,
    /// Default message fields.
    pub message: Map<String, Value>,
}

impl DeliveryConfig {
    /// Creates a configuration without message defaults.
    #[must_use]
    pub fn new(adapter: AdapterConfig) -> Self {
        Self {
            adapter,
            message: Map::new(),
        }
    }

    /// Adds a default message field.
    #[must_use]
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.message.insert(key.into(), value.into());
        self
    }

    /// Splits a flat configuration object into adapter settings and message
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the value is not an object or the adapter
    /// settings do not parse.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut settings: Map<String, Value> = serde_json::from_value(value)?;
        let mut message = Map::new();
        for key in MESSAGE_KEYS {
            if let Some(field) = settings.remove(*key) {
                message.insert((*key).to_string(), field);
            }
        }
        let adapter = serde_json::from_value(Value::Object(settings))?;
        Ok(Self { adapter, message })
    }
}

/// A constructed delivery.
#[derive(Clone)]
struct Delivery {
    transport: Arc<dyn Transport>,
    message: Map<String, Value>,
}

/// Delivery configurations by name, with their transports.
#[derive(Clone, Default)]
pub struct Deliveries {
    entries: IndexMap<String, Delivery>,
}

impl fmt::Debug for Deliveries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, delivery) in &self.entries {
            map.entry(name, &delivery.transport.name());
        }
        map.finish()
    }
}

impl Deliveries {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object of name to configuration and builds every
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns `Config` for malformed JSON or settings, or the transport's
    /// construction error.
    pub fn from_json(json: &str) -> Result<Self> {
        let configs: IndexMap<String, Value> = serde_json::from_str(json)?;
        let mut deliveries = Self::new();
        for (name, value) in configs {
            deliveries.configure(name, DeliveryConfig::from_value(value)?)?;
        }
        Ok(deliveries)
    }

    /// Adds or replaces a delivery built from configuration.
    ///
    /// # Errors
    ///
    /// Returns the transport's construction error.
    pub fn configure(&mut self, name: impl Into<String>, config: DeliveryConfig) -> Result<()> {
        let name = name.into();
        let transport = config.adapter.build()?;
        tracing::debug!(delivery = %name, adapter = transport.name(), "Configured delivery");
        self.insert(name, transport, config.message);
        Ok(())
    }

    /// Adds or replaces a delivery with a ready transport.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        message: Map<String, Value>,
    ) {
        self.entries
            .insert(name.into(), Delivery { transport, message });
    }

    /// Returns the transport for a delivery.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDelivery` if there is no such delivery.
    pub fn adapter(&self, name: &str) -> Result<Arc<dyn Transport>> {
        self.get(name).map(|delivery| Arc::clone(&delivery.transport))
    }

    /// Returns the default message fields of a delivery.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDelivery` if there is no such delivery.
    pub fn message_defaults(&self, name: &str) -> Result<&Map<String, Value>> {
        self.get(name).map(|delivery| &delivery.message)
    }

    /// Returns true if a delivery with that name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterates over delivery names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn get(&self, name: &str) -> Result<&Delivery> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::UnknownDelivery(name.to_string()))
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
    fn test_from_value_splits_message_defaults() {
        let config = DeliveryConfig::from_value(json!({
            "adapter": "Mailgun",
            "from": "my@address",
            "domain": "my.domain",
            "key": "mysecretkey",
            "campaign": "launch"
        }))
        .unwrap();

        assert_eq!(config.message.get("from"), Some(&json!("my@address")));
        assert_eq!(config.message.len(), 1);
        let AdapterConfig::Mailgun(mailgun) = config.adapter else {
            panic!("expected mailgun adapter");
        };
        assert_eq!(mailgun.domain.as_deref(), Some("my.domain"));
        assert_eq!(mailgun.options.campaign.as_deref(), Some("launch"));
    }

    #[test]
    fn test_from_value_debug_adapter() {
        let config = DeliveryConfig::from_value(json!({
            "adapter": "debug",
            "format": "custom",
            "formats": {"custom": "Custom log for {:to}, {:subject}"},
            "subject": "Hello"
        }))
        .unwrap();
        assert_eq!(config.message.get("subject"), Some(&json!("Hello")));
        let AdapterConfig::Debug(debug) = config.adapter else {
            panic!("expected debug adapter");
        };
        assert_eq!(debug.format.as_deref(), Some("custom"));
        assert!(debug.formats.contains_key("custom"));
    }

    #[test]
    fn test_from_value_unknown_adapter() {
        let err = DeliveryConfig::from_value(json!({"adapter": "swift"})).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = DeliveryConfig::from_value(json!({"from": "a@b"})).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_json() {
        let deliveries = Deliveries::from_json(
            r#"{
                "default": {"adapter": "simple", "from": {"My App": "my@email.address"}},
                "test": {"adapter": "debug", "format": "short"}
            }"#,
        )
        .unwrap();

        assert_eq!(deliveries.names().collect::<Vec<_>>(), ["default", "test"]);
        assert_eq!(deliveries.adapter("default").unwrap().name(), "simple");
        assert_eq!(deliveries.adapter("test").unwrap().name(), "debug");
        assert_eq!(
            deliveries.message_defaults("default").unwrap().get("from"),
            Some(&json!({"My App": "my@email.address"}))
        );
        assert!(deliveries.message_defaults("test").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_delivery() {
        let deliveries = Deliveries::new();
        assert!(!deliveries.contains("default"));
        let err = deliveries.adapter("default").err().unwrap();
        assert!(matches!(err, Error::UnknownDelivery(ref name) if name == "default"));
        assert_eq!(err.to_string(), "No delivery configuration named `default`");
    }

    #[test]
    fn test_configure_replaces() {
        let mut deliveries = Deliveries::new();
        deliveries
            .configure("default", DeliveryConfig::new(AdapterConfig::Simple(SimpleConfig::default())))
            .unwrap();
        deliveries
            .configure(
                "default",
                DeliveryConfig::new(AdapterConfig::Debug(DebugConfig::new()))
                    .with_default("from", "a@b"),
            )
            .unwrap();
        assert_eq!(deliveries.adapter("default").unwrap().name(), "debug");
        assert_eq!(
            deliveries.message_defaults("default").unwrap().get("from"),
            Some(&json!("a@b"))
        );
    }
}
