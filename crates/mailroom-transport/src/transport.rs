//! Transport abstraction.

use crate::adapter::debug::LogTarget;
use crate::adapter::mailgun::MailgunOptions;
use crate::error::Result;
use async_trait::async_trait;
use mailroom_mime::{Addresses, Message};
use serde::Deserialize;

/// Delivers finalized messages.
///
/// Callers must run [`Message::ensure_standard_compliance`] before calling
/// [`Transport::deliver`]; adapters serialize the message as given.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short adapter name, used in logs.
    fn name(&self) -> &'static str;

    /// Delivers a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be serialized or the
    /// underlying mechanism fails.
    async fn deliver(&self, message: &Message, options: &Options) -> Result<Receipt>;
}

/// Outcome of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receipt {
    /// Message was handed to the local mail command.
    Handed {
        /// Whether the command accepted the message.
        accepted: bool,
    },
    /// Message was written to a log.
    Logged {
        /// Whether the full entry was written.
        complete: bool,
    },
    /// Message was posted to an HTTP API.
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
}

impl Receipt {
    /// Returns true if the delivery mechanism reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        match self {
            Self::Handed { accepted } => *accepted,
            Self::Logged { complete } => *complete,
            Self::Api { status, .. } => *status >= 200 && *status < 300,
        }
    }
}

/// Per-call delivery options.
///
/// Values set here take precedence over the adapter's configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Log target for the debug adapter.
    pub log: Option<LogTarget>,
    /// Format name for the debug adapter.
    pub format: Option<String>,
    /// Mailgun API options.
    #[serde(flatten)]
    pub mailgun: MailgunOptions,
}

impl Options {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log target.
    #[must_use]
    pub fn log(mut self, log: LogTarget) -> Self {
        self.log = Some(log);
        self
    }

    /// Sets the format name.
    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Sets the Mailgun options.
    #[must_use]
    pub fn mailgun(mut self, mailgun: MailgunOptions) -> Self {
        self.mailgun = mailgun;
        self
    }
}

/// Formats an address field for headers and API parameters.
///
/// Unset fields format as an empty string.
#[must_use]
pub fn format_address(addresses: Option<&Addresses>) -> String {
    addresses.map(Addresses::format).unwrap_or_default()
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
    use mailroom_mime::Mailbox;

    #[test]
    fn test_format_address() {
        assert_eq!(format_address(None), "");
        assert_eq!(format_address(Some(&"foo@bar".into())), "foo@bar");
        assert_eq!(
            format_address(Some(&Addresses::list(["foo@bar", "bar@foo"]))),
            "foo@bar, bar@foo"
        );
        let mixed = Addresses::List(vec![
            Mailbox::with_name("Foo", "foo@bar"),
            Mailbox::new("bar@foo"),
        ]);
        assert_eq!(format_address(Some(&mixed)), "Foo <foo@bar>, bar@foo");
    }

    #[test]
    fn test_receipt_success() {
        assert!(Receipt::Handed { accepted: true }.is_success());
        assert!(!Receipt::Logged { complete: false }.is_success());
        assert!(Receipt::Api { status: 200, body: String::new() }.is_success());
        assert!(!Receipt::Api { status: 302, body: String::new() }.is_success());
    }

    #[test]
    fn test_options_deserialize() {
        let options: Options = serde_json::from_value(serde_json::json!({
            "format": "short",
            "log": "/tmp/mail.log",
            "campaign": "spring",
            "tag": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(options.format.as_deref(), Some("short"));
        assert!(matches!(options.log, Some(LogTarget::Path(ref p)) if p.ends_with("mail.log")));
        assert_eq!(options.mailgun.campaign.as_deref(), Some("spring"));
        assert_eq!(options.mailgun.tag, Some(vec!["a".to_string(), "b".to_string()]));
    }
}
