//! Message construction options.

use crate::address::Addresses;
use crate::attachment::AttachSpec;
use crate::error::{Error, Result};
use crate::grammar::TokenOverride;
use crate::header::Headers;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

/// Loose option keys that hold addresses, with the field they populate.
const ADDRESS_KEYS: &[(&str, &str)] = &[
    ("returnPath", "return_path"),
    ("return_path", "return_path"),
    ("sender", "sender"),
    ("from", "from"),
    ("replyTo", "reply_to"),
    ("reply_to", "reply_to"),
    ("to", "to"),
    ("cc", "cc"),
    ("bcc", "bcc"),
];

/// Initial field values for a [`Message`](crate::Message).
///
/// Unset fields keep the message defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageOptions {
    /// Subject line.
    pub subject: Option<String>,
    /// Unix timestamp.
    pub date: Option<i64>,
    /// Body charset.
    pub charset: Option<String>,
    /// Base URL used for Content-ID generation.
    #[serde(alias = "baseURL", alias = "base_url")]
    pub base_url: Option<String>,
    /// `Return-Path` addresses.
    #[serde(alias = "return_path")]
    pub return_path: Option<Addresses>,
    /// `Sender` address.
    pub sender: Option<Addresses>,
    /// `From` addresses.
    pub from: Option<Addresses>,
    /// `Reply-To` addresses.
    #[serde(alias = "reply_to")]
    pub reply_to: Option<Addresses>,
    /// `To` addresses.
    pub to: Option<Addresses>,
    /// `Cc` addresses.
    pub cc: Option<Addresses>,
    /// `Bcc` addresses.
    pub bcc: Option<Addresses>,
    /// Short type names to render, a single name or a list.
    #[serde(deserialize_with = "one_or_many")]
    pub types: Option<Vec<String>>,
    /// Extra headers.
    pub headers: Option<Headers>,
    /// Attachments added at construction, in order.
    pub attach: Vec<AttachSpec>,
    /// Grammar token overrides for this message.
    pub grammar: IndexMap<String, TokenOverride>,
    /// Extension to content type overrides for this message.
    #[serde(alias = "mime_types")]
    pub mime_types: IndexMap<String, String>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => None,
        Some(OneOrMany::One(name)) => Some(vec![name]),
        Some(OneOrMany::Many(names)) => Some(names),
    })
}

impl MessageOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a loosely typed JSON object.
    ///
    /// Address fields are checked before the rest so a bad originator
    /// surfaces as [`Error::InvalidFromType`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidFromType` or `InvalidAddress` for address fields that
    /// are neither strings nor mappings, and `Options` for anything else
    /// that does not fit.
    pub fn from_value(mut value: serde_json::Value) -> Result<Self> {
        let mut addresses = Vec::new();
        if let Some(object) = value.as_object_mut() {
            for (key, field) in ADDRESS_KEYS {
                let Some(raw) = object.remove(*key) else {
                    continue;
                };
                let parsed = Addresses::from_value(&raw).map_err(|found| {
                    if *field == "from" {
                        Error::InvalidFromType { found }
                    } else {
                        Error::InvalidAddress {
                            field: *field,
                            found,
                        }
                    }
                })?;
                addresses.push((*field, parsed));
            }
        }

        let mut options: Self = serde_json::from_value(value)?;
        for (field, parsed) in addresses {
            *options.address_mut(field) = parsed;
        }
        Ok(options)
    }

    fn address_mut(&mut self, field: &str) -> &mut Option<Addresses> {
        match field {
            "return_path" => &mut self.return_path,
            "sender" => &mut self.sender,
            "reply_to" => &mut self.reply_to,
            "to" => &mut self.to,
            "cc" => &mut self.cc,
            "bcc" => &mut self.bcc,
            _ => &mut self.from,
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the date.
    #[must_use]
    pub const fn date(mut self, date: i64) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the charset.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the `From` addresses.
    #[must_use]
    pub fn from(mut self, from: impl Into<Addresses>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Sets the `Sender` address.
    #[must_use]
    pub fn sender(mut self, sender: impl Into<Addresses>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Sets the `To` addresses.
    #[must_use]
    pub fn to(mut self, to: impl Into<Addresses>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Sets the `Cc` addresses.
    #[must_use]
    pub fn cc(mut self, cc: impl Into<Addresses>) -> Self {
        self.cc = Some(cc.into());
        self
    }

    /// Sets the `Bcc` addresses.
    #[must_use]
    pub fn bcc(mut self, bcc: impl Into<Addresses>) -> Self {
        self.bcc = Some(bcc.into());
        self
    }

    /// Sets the `Reply-To` addresses.
    #[must_use]
    pub fn reply_to(mut self, reply_to: impl Into<Addresses>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Sets the `Return-Path` addresses.
    #[must_use]
    pub fn return_path(mut self, return_path: impl Into<Addresses>) -> Self {
        self.return_path = Some(return_path.into());
        self
    }

    /// Sets the types to render.
    #[must_use]
    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Headers::new).set(name, value);
        self
    }

    /// Adds a construction-time attachment.
    #[must_use]
    pub fn attach(mut self, spec: AttachSpec) -> Self {
        self.attach.push(spec);
        self
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
    fn test_from_value() {
        let options = MessageOptions::from_value(json!({
            "subject": "test subject",
            "from": {"Foo": "foo@bar"},
            "replyTo": "reply@bar",
            "types": "text",
            "baseURL": "foo.local",
            "headers": {"X-Mailer": "mailroom"}
        }))
        .unwrap();

        assert_eq!(options.subject.as_deref(), Some("test subject"));
        assert_eq!(options.from, Some(Addresses::named([("Foo", "foo@bar")])));
        assert_eq!(options.reply_to, Some(Addresses::from("reply@bar")));
        assert_eq!(options.types, Some(vec!["text".to_string()]));
        assert_eq!(options.base_url.as_deref(), Some("foo.local"));
        assert_eq!(options.headers.unwrap().get("X-Mailer"), Some("mailroom"));
    }

    #[test]
    fn test_from_value_false_means_unset() {
        let options = MessageOptions::from_value(json!({"from": false, "cc": null})).unwrap();
        assert_eq!(options.from, None);
        assert_eq!(options.cc, None);
    }

    #[test]
    fn test_from_value_invalid_from() {
        let err = MessageOptions::from_value(json!({"from": 42})).unwrap_err();
        assert!(matches!(err, Error::InvalidFromType { ref found } if found == "integer"));
        assert!(err.to_string().contains("`integer` given"));
    }

    #[test]
    fn test_from_value_invalid_other_address() {
        let err = MessageOptions::from_value(json!({"bcc": true})).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { field: "bcc", .. }));
    }

    #[test]
    fn test_from_value_bad_shape() {
        let err = MessageOptions::from_value(json!({"date": "invalid"})).unwrap_err();
        assert!(matches!(err, Error::Options(_)));
    }

    #[test]
    fn test_builder() {
        let options = MessageOptions::new()
            .from("foo@bar")
            .to("bar@foo")
            .subject("hello")
            .types(["text"])
            .header("X-Foo", "bar");
        assert_eq!(options.from, Some(Addresses::from("foo@bar")));
        assert_eq!(options.types, Some(vec!["text".to_string()]));
        assert_eq!(options.headers.unwrap().get("X-Foo"), Some("bar"));
    }
}
