//! Address field values.

use crate::error::type_name;
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Mailbox (optional display name + address).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox {
    /// Display name (optional).
    pub name: Option<String>,
    /// Email address.
    pub address: String,
}

impl Mailbox {
    /// Creates a new mailbox with just an address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Creates a new mailbox with a display name and address.
    #[must_use]
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Value of an address field (`from`, `to`, `cc`, ...).
///
/// Either a single bare address, or an ordered list of mailboxes where
/// entries without a display name render as the bare address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addresses {
    /// A single address string.
    Single(String),
    /// Ordered mailboxes.
    List(Vec<Mailbox>),
}

impl Addresses {
    /// Creates a list of bare addresses.
    #[must_use]
    pub fn list<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(addresses.into_iter().map(Mailbox::new).collect())
    }

    /// Creates a list of named mailboxes, keeping the given order.
    #[must_use]
    pub fn named<I, N, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, A)>,
        N: Into<String>,
        A: Into<String>,
    {
        Self::List(
            entries
                .into_iter()
                .map(|(name, address)| Mailbox::with_name(name, address))
                .collect(),
        )
    }

    /// Returns the entries as mailboxes.
    #[must_use]
    pub fn mailboxes(&self) -> Vec<Mailbox> {
        match self {
            Self::Single(address) => vec![Mailbox::new(address.clone())],
            Self::List(mailboxes) => mailboxes.clone(),
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::List(mailboxes) => mailboxes.len(),
        }
    }

    /// Returns true if there is no usable address.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(address) => address.is_empty(),
            Self::List(mailboxes) => mailboxes.is_empty(),
        }
    }

    /// Returns the first entry, keeping its display name.
    #[must_use]
    pub fn first(&self) -> Option<Self> {
        match self {
            Self::Single(address) => Some(Self::Single(address.clone())),
            Self::List(mailboxes) => mailboxes.first().map(|m| Self::List(vec![m.clone()])),
        }
    }

    /// Formats the entries as a comma-separated header value.
    ///
    /// Named entries render as `Name <address>`, unnamed ones as the bare
    /// address.
    #[must_use]
    pub fn format(&self) -> String {
        match self {
            Self::Single(address) => address.clone(),
            Self::List(mailboxes) => mailboxes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Converts a loosely typed value.
    ///
    /// `null` and `false` mean "unset". Strings become [`Addresses::Single`],
    /// arrays of strings become unnamed entries, objects become named
    /// entries in key order.
    ///
    /// # Errors
    ///
    /// Returns the JSON type name of the offending value when it is neither
    /// a string nor a mapping (or list) of strings.
    pub fn from_value(value: &serde_json::Value) -> std::result::Result<Option<Self>, String> {
        use serde_json::Value;

        match value {
            Value::Null | Value::Bool(false) => Ok(None),
            Value::String(address) => Ok(Some(Self::Single(address.clone()))),
            Value::Array(items) => {
                let mut mailboxes = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(address) => mailboxes.push(Mailbox::new(address.clone())),
                        Value::Object(entries) => mailboxes.extend(named_entries(entries)?),
                        other => return Err(type_name(other)),
                    }
                }
                Ok(Some(Self::List(mailboxes)))
            }
            Value::Object(entries) => Ok(Some(Self::List(named_entries(entries)?))),
            other => Err(type_name(other)),
        }
    }
}

fn named_entries(
    entries: &serde_json::Map<String, serde_json::Value>,
) -> std::result::Result<Vec<Mailbox>, String> {
    entries
        .iter()
        .map(|(name, address)| match address {
            serde_json::Value::String(address) => Ok(Mailbox::with_name(name, address.clone())),
            other => Err(type_name(other)),
        })
        .collect()
}

impl fmt::Display for Addresses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl From<&str> for Addresses {
    fn from(address: &str) -> Self {
        Self::Single(address.to_string())
    }
}

impl From<String> for Addresses {
    fn from(address: String) -> Self {
        Self::Single(address)
    }
}

impl From<Mailbox> for Addresses {
    fn from(mailbox: Mailbox) -> Self {
        Self::List(vec![mailbox])
    }
}

impl From<Vec<Mailbox>> for Addresses {
    fn from(mailboxes: Vec<Mailbox>) -> Self {
        Self::List(mailboxes)
    }
}

impl<'de> Deserialize<'de> for Addresses {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match Self::from_value(&value) {
            Ok(Some(addresses)) => Ok(addresses),
            Ok(None) => Ok(Self::List(Vec::new())),
            Err(found) => Err(serde::de::Error::custom(format!(
                "expected a string or a mapping of addresses, `{found}` given"
            ))),
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
    fn test_format_single() {
        assert_eq!(Addresses::from("foo@bar").format(), "foo@bar");
    }

    #[test]
    fn test_format_unnamed_list() {
        assert_eq!(Addresses::list(["foo@bar"]).format(), "foo@bar");
    }

    #[test]
    fn test_format_named() {
        assert_eq!(Addresses::named([("Foo", "foo@bar")]).format(), "Foo <foo@bar>");
        let both = Addresses::named([("Foo", "foo@bar"), ("Bar", "bar@foo")]);
        assert_eq!(both.format(), "Foo <foo@bar>, Bar <bar@foo>");
    }

    #[test]
    fn test_format_mixed() {
        let mixed = Addresses::List(vec![
            Mailbox::new("foo@bar"),
            Mailbox::with_name("Bar", "bar@foo"),
        ]);
        assert_eq!(mixed.format(), "foo@bar, Bar <bar@foo>");
    }

    #[test]
    fn test_first_keeps_name() {
        let from = Addresses::named([("foo", "foo@bar"), ("bar", "bar@foo")]);
        assert_eq!(from.first(), Some(Addresses::named([("foo", "foo@bar")])));
        assert_eq!(Addresses::List(Vec::new()).first(), None);
    }

    #[test]
    fn test_from_value() {
        assert_eq!(Addresses::from_value(&json!(null)), Ok(None));
        assert_eq!(Addresses::from_value(&json!(false)), Ok(None));
        assert_eq!(
            Addresses::from_value(&json!("a@b")),
            Ok(Some(Addresses::Single("a@b".into())))
        );
        assert_eq!(
            Addresses::from_value(&json!(["a@b", {"Name": "c@d"}])),
            Ok(Some(Addresses::List(vec![
                Mailbox::new("a@b"),
                Mailbox::with_name("Name", "c@d"),
            ])))
        );
        assert_eq!(Addresses::from_value(&json!(42)), Err("integer".to_string()));
        assert_eq!(Addresses::from_value(&json!([1])), Err("integer".to_string()));
    }

    #[test]
    fn test_deserialize_keeps_order() {
        let addresses: Addresses = serde_json::from_str(r#"{"Zed": "z@x", "Amy": "a@x"}"#).unwrap();
        assert_eq!(addresses.format(), "Zed <z@x>, Amy <a@x>");
    }
}
