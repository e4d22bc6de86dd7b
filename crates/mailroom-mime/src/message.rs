//! Message structure and handling.

use crate::address::Addresses;
use crate::assets::AssetOptions;
use crate::attachment::{AttachOptions, Attachment, Source};
use crate::encoding;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::media::{DEFAULT_CONTENT_TYPE, basename};
use crate::options::MessageOptions;
use crate::registry::Registry;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Largest accepted `date` (32-bit signed timestamp).
pub const MAX_TIMESTAMP: i64 = 2_147_483_647;

/// Domain used for generated Content-IDs when the base URL has no usable
/// host.
pub const FALLBACK_ID_DOMAIN: &str = "mailroom.generated";

/// An outgoing email message.
///
/// Fields are set at construction from [`MessageOptions`] and may be changed
/// freely afterwards. [`Message::ensure_standard_compliance`] must succeed
/// before the message is handed to a transport.
#[derive(Clone)]
pub struct Message {
    /// Subject line.
    pub subject: Option<String>,
    /// Unix timestamp of the message.
    pub date: Option<i64>,
    /// Charset of the body parts.
    pub charset: String,
    /// `Return-Path` addresses.
    pub return_path: Option<Addresses>,
    /// `Sender` address.
    pub sender: Option<Addresses>,
    /// `From` addresses.
    pub from: Option<Addresses>,
    /// `Reply-To` addresses.
    pub reply_to: Option<Addresses>,
    /// `To` addresses.
    pub to: Option<Addresses>,
    /// `Cc` addresses.
    pub cc: Option<Addresses>,
    /// `Bcc` addresses.
    pub bcc: Option<Addresses>,
    /// Short type names the message is rendered in, in part order.
    pub types: Vec<String>,
    /// Custom headers.
    pub headers: Headers,
    base_url: Option<String>,
    body: IndexMap<String, Vec<String>>,
    attachments: Vec<Attachment>,
    registry: Arc<Registry>,
}

impl Message {
    /// Creates an empty message.
    ///
    /// The base URL is discovered from the registry's request context, if
    /// there is one.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        let mut message = Self {
            subject: None,
            date: None,
            charset: "UTF-8".to_string(),
            return_path: None,
            sender: None,
            from: None,
            reply_to: None,
            to: None,
            cc: None,
            bcc: None,
            types: vec!["html".to_string(), "text".to_string()],
            headers: Headers::new(),
            base_url: None,
            body: IndexMap::new(),
            attachments: Vec::new(),
            registry,
        };
        message.init_base_url(None);
        message
    }

    /// Creates a message from options.
    ///
    /// Per-message grammar and extension overrides are applied to a copy of
    /// the registry. Construction-time attachments are added in order.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the construction-time attachments cannot
    /// be attached.
    pub fn from_options(options: MessageOptions, registry: Arc<Registry>) -> Result<Self> {
        let MessageOptions {
            subject,
            date,
            charset,
            base_url,
            return_path,
            sender,
            from,
            reply_to,
            to,
            cc,
            bcc,
            types,
            headers,
            attach,
            grammar,
            mime_types,
        } = options;

        let registry = if grammar.is_empty() && mime_types.is_empty() {
            registry
        } else {
            let mut custom = (*registry).clone();
            custom.grammar.apply(grammar);
            for (extension, content_type) in mime_types {
                custom.mime_types.insert(extension, content_type);
            }
            Arc::new(custom)
        };

        let mut message = Self::new(registry);
        message.subject = subject;
        message.date = date;
        if let Some(charset) = charset {
            message.charset = charset;
        }
        message.return_path = return_path;
        message.sender = sender;
        message.from = from;
        message.reply_to = reply_to;
        message.to = to;
        message.cc = cc;
        message.bcc = bcc;
        if let Some(types) = types {
            message.types = types;
        }
        if let Some(headers) = headers {
            message.headers = headers;
        }
        if base_url.is_some() {
            message.init_base_url(base_url);
        }

        for spec in attach {
            let (path, options) = spec.into_parts();
            message.attach(path.as_deref(), options)?;
        }
        Ok(message)
    }

    fn init_base_url(&mut self, explicit: Option<String>) {
        let url = explicit.filter(|u| !u.is_empty()).or_else(|| {
            self.registry
                .request
                .as_ref()
                .and_then(|request| request.base_url())
        });
        self.base_url = url.map(|url| normalize_base_url(&url));
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Sets the base URL, adding `http://` when there is no scheme and
    /// stripping trailing slashes.
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.init_base_url(Some(base_url.into()));
    }

    /// Returns the registry this message was created with.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Sets a custom header.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Removes a custom header.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    /// Appends a body fragment for a type and returns the joined body.
    pub fn push_body(&mut self, kind: &str, fragment: impl Into<String>) -> String {
        self.extend_body(kind, [fragment])
    }

    /// Appends several body fragments for a type and returns the joined body.
    pub fn extend_body<I, S>(&mut self, kind: &str, fragments: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body
            .entry(kind.to_string())
            .or_default()
            .extend(fragments.into_iter().map(Into::into));
        self.body(kind)
    }

    /// Returns the body for a type, fragments joined with newlines.
    ///
    /// An unset type has an empty body.
    #[must_use]
    pub fn body(&self, kind: &str) -> String {
        self.body
            .get(kind)
            .map(|fragments| fragments.join("\n"))
            .unwrap_or_default()
    }

    /// Returns the body for a type split into chunks of `size` characters.
    #[must_use]
    pub fn body_chunks(&self, kind: &str, size: usize) -> Vec<String> {
        encoding::chunks(&self.body(kind), size)
    }

    /// Returns all body fragments by type.
    #[must_use]
    pub const fn bodies(&self) -> &IndexMap<String, Vec<String>> {
        &self.body
    }

    /// Maps each declared type to its content type, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if a type is not registered.
    pub fn types(&self) -> Result<IndexMap<String, String>> {
        self.types
            .iter()
            .map(|kind| {
                self.registry
                    .media
                    .content_type(kind)
                    .map(|content_type| (kind.clone(), content_type.to_string()))
                    .ok_or_else(|| Error::UnknownType(kind.clone()))
            })
            .collect()
    }

    /// Runs the date, originator and sender checks in that order.
    ///
    /// # Errors
    ///
    /// Returns the first failing check's error.
    pub fn ensure_standard_compliance(&mut self) -> Result<()> {
        self.ensure_valid_date()?;
        self.ensure_valid_from()?;
        self.ensure_valid_sender()
    }

    /// Sets the date to now if unset and checks its range.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDate` if the date is outside `0..=2147483647`.
    pub fn ensure_valid_date(&mut self) -> Result<()> {
        let date = *self
            .date
            .get_or_insert_with(|| chrono::Utc::now().timestamp());
        if !(0..=MAX_TIMESTAMP).contains(&date) {
            return Err(Error::InvalidDate(date));
        }
        Ok(())
    }

    /// Checks that there is at least one originator.
    ///
    /// # Errors
    ///
    /// Returns `MissingFrom` if `from` is unset or empty.
    pub fn ensure_valid_from(&self) -> Result<()> {
        match &self.from {
            Some(from) if !from.is_empty() => Ok(()),
            _ => Err(Error::MissingFrom),
        }
    }

    /// Normalizes the sender.
    ///
    /// With several originators and no sender, the first originator becomes
    /// the sender. A sender identical to the only originator is dropped.
    ///
    /// # Errors
    ///
    /// Returns `MultipleSender` if the sender has more than one address.
    pub fn ensure_valid_sender(&mut self) -> Result<()> {
        let from = self
            .from
            .as_ref()
            .map(Addresses::mailboxes)
            .unwrap_or_default();
        let sender = self
            .sender
            .as_ref()
            .map(Addresses::mailboxes)
            .unwrap_or_default();

        if sender.is_empty() && from.len() > 1 {
            self.sender = self.from.as_ref().and_then(Addresses::first);
            tracing::debug!(sender = ?self.sender, "Derived sender from first originator");
        } else if !sender.is_empty() && from.len() == 1 && sender == from {
            tracing::debug!("Dropping sender identical to originator");
            self.sender = None;
        } else if sender.is_empty() {
            self.sender = None;
        }

        if self.sender.as_ref().is_some_and(|s| s.len() > 1) {
            return Err(Error::MultipleSender);
        }
        Ok(())
    }

    /// Adds an attachment from a path or from inline data.
    ///
    /// Paths go through the registry's asset resolver (with `check` on by
    /// default). The file name defaults to the resolved path's basename and
    /// the content type is inferred from the extension.
    ///
    /// # Errors
    ///
    /// Returns `NothingToAttach` without path and data, `AssetNotFound` when
    /// the path does not resolve, and `InvalidAttachmentData` when data is
    /// not a string.
    pub fn attach(&mut self, path: Option<&str>, options: AttachOptions) -> Result<&mut Self> {
        let attachment = self.build_attachment(path, options)?;
        self.attachments.push(attachment);
        Ok(self)
    }

    fn build_attachment(&self, path: Option<&str>, options: AttachOptions) -> Result<Attachment> {
        let mime_types = &self.registry.mime_types;

        let Some(attach_path) = path else {
            if !options.has_data() {
                return Err(Error::NothingToAttach);
            }
            let data = options.string_data()?.ok_or(Error::NothingToAttach)?;
            let content_type = options
                .content_type
                .or_else(|| {
                    options
                        .filename
                        .as_deref()
                        .and_then(|name| mime_types.for_filename(name))
                        .map(str::to_string)
                })
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
            return Ok(Attachment {
                source: Source::Data(data),
                filename: options.filename,
                content_type,
                disposition: options.disposition.unwrap_or_else(|| "attachment".to_string()),
                id: options.id,
            });
        };

        let asset_options = AssetOptions {
            check: options.check.unwrap_or(true),
            library: options.library.clone(),
        };
        let Some(resolved) = self.registry.assets.resolve(attach_path, &asset_options) else {
            tracing::warn!(path = attach_path, "Attachment path did not resolve");
            return Err(Error::AssetNotFound(attach_path.to_string()));
        };

        let content_type = options
            .content_type
            .or_else(|| mime_types.for_filename(&resolved).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let filename = options
            .filename
            .unwrap_or_else(|| basename(&resolved).to_string());

        Ok(Attachment {
            source: Source::Path {
                path: resolved,
                attach_path: attach_path.to_string(),
            },
            filename: Some(filename),
            content_type,
            disposition: options.disposition.unwrap_or_else(|| "attachment".to_string()),
            id: options.id,
        })
    }

    /// Removes every attachment whose given path or data equals `key`.
    pub fn detach(&mut self, key: &str) -> &mut Self {
        self.attachments.retain(|attachment| !attachment.matches(key));
        self
    }

    /// Returns the attachments in the order they were added.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Attaches content for inline use and returns its Content-ID.
    ///
    /// The disposition defaults to `inline` and an id is generated unless
    /// one is given.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Message::attach`].
    pub fn embed(&mut self, path: Option<&str>, mut options: AttachOptions) -> Result<String> {
        let id = match options.id.take() {
            Some(id) => id,
            None => self.generate_id(),
        };
        options.id = Some(id.clone());
        options.disposition.get_or_insert_with(|| "inline".to_string());
        self.attach(path, options)?;
        Ok(id)
    }

    /// Generates a Content-ID of the form `{timestamp}.{unique}@{host}`.
    ///
    /// The host comes from the base URL. If the result does not satisfy the
    /// grammar, the fallback domain is used instead.
    #[must_use]
    pub fn generate_id(&self) -> String {
        let left = format!(
            "{}.{}",
            chrono::Utc::now().timestamp(),
            uuid::Uuid::new_v4().simple()
        );
        let host = self.id_host();
        let right = host.as_deref().unwrap_or(FALLBACK_ID_DOMAIN);
        let id = format!("{left}@{right}");
        if self.registry.grammar.is_valid_id(&id) {
            id
        } else {
            tracing::debug!(host = right, "Base URL host not usable in Content-ID");
            format!("{left}@{FALLBACK_ID_DOMAIN}")
        }
    }

    fn id_host(&self) -> Option<String> {
        let url = Url::parse(self.base_url.as_deref()?).ok()?;
        url.host_str().map(str::to_string)
    }
}

fn normalize_base_url(url: &str) -> String {
    let url = if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    };
    url.trim_end_matches('/').to_string()
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("subject", &self.subject)
            .field("date", &self.date)
            .field("charset", &self.charset)
            .field("base_url", &self.base_url)
            .field("return_path", &self.return_path)
            .field("sender", &self.sender)
            .field("from", &self.from)
            .field("reply_to", &self.reply_to)
            .field("to", &self.to)
            .field("cc", &self.cc)
            .field("bcc", &self.bcc)
            .field("types", &self.types)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("attachments", &self.attachments)
            .finish_non_exhaustive()
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
    use crate::address::Mailbox;
    use crate::assets::{FsAssets, StaticRequest};

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::new().with_assets(FsAssets::new("/srv/app")))
    }

    fn message() -> Message {
        Message::new(registry())
    }

    fn with(options: MessageOptions) -> Message {
        Message::from_options(options, registry()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let message = message();
        assert_eq!(message.charset, "UTF-8");
        assert_eq!(message.types, ["html", "text"]);
        assert!(message.headers.is_empty());
        assert!(message.bodies().is_empty());
        assert!(message.attachments().is_empty());
        assert_eq!(message.base_url(), None);
    }

    #[test]
    fn test_from_options() {
        let message = with(
            MessageOptions::new()
                .subject("test subject")
                .date(42)
                .charset("ISO-8859-1")
                .from("foo@bar")
                .to("bar@foo")
                .types(["text"])
                .header("X-Foo", "bar"),
        );
        assert_eq!(message.subject.as_deref(), Some("test subject"));
        assert_eq!(message.date, Some(42));
        assert_eq!(message.charset, "ISO-8859-1");
        assert_eq!(message.from, Some(Addresses::from("foo@bar")));
        assert_eq!(message.to, Some(Addresses::from("bar@foo")));
        assert_eq!(message.types, ["text"]);
        assert_eq!(message.headers.get("X-Foo"), Some("bar"));
    }

    #[test]
    fn test_headers() {
        let mut message = message();
        message.header("Foo", "bar");
        assert_eq!(message.headers.get("Foo"), Some("bar"));
        message.remove_header("Foo");
        assert!(message.headers.is_empty());
    }

    #[test]
    fn test_body() {
        let mut message = message();
        assert_eq!(message.push_body("foo", "bar"), "bar");
        assert_eq!(message.body("foo"), "bar");
        assert_eq!(message.body("bar"), "");

        message.push_body("text", "a");
        assert_eq!(message.push_body("text", "b"), "a\nb");
        assert_eq!(message.extend_body("text", ["c", "d"]), "a\nb\nc\nd");
        assert_eq!(message.bodies()["text"], ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_body_chunks() {
        let mut message = message();
        message.push_body("text", "abcde");
        assert_eq!(message.body_chunks("text", 2), ["ab", "cd", "e"]);
        assert_eq!(message.body("text"), "abcde");
    }

    #[test]
    fn test_types() {
        let message = message();
        let types = message.types().unwrap();
        let pairs: Vec<_> = types.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(pairs, [("html", "text/html"), ("text", "text/plain")]);

        let message = with(MessageOptions::new().types(["text", "html"]));
        let keys: Vec<_> = message.types().unwrap().into_keys().collect();
        assert_eq!(keys, ["text", "html"]);

        let message = with(MessageOptions::new().types(["foo"]));
        assert!(matches!(message.types(), Err(Error::UnknownType(t)) if t == "foo"));
    }

    #[test]
    fn test_ensure_valid_date() {
        let mut message = message();
        assert_eq!(message.date, None);
        message.ensure_valid_date().unwrap();
        assert!(message.date.is_some());

        for date in [-1, 2_147_483_648] {
            let mut message = with(MessageOptions::new().date(date));
            assert!(matches!(message.ensure_valid_date(), Err(Error::InvalidDate(d)) if d == date));
            assert_eq!(message.date, Some(date));
        }
        for date in [0, 2_147_483_647] {
            let mut message = with(MessageOptions::new().date(date));
            message.ensure_valid_date().unwrap();
            assert_eq!(message.date, Some(date));
        }
    }

    #[test]
    fn test_ensure_valid_from() {
        assert!(matches!(message().ensure_valid_from(), Err(Error::MissingFrom)));
        let empty = with(MessageOptions::new().from(""));
        assert!(matches!(empty.ensure_valid_from(), Err(Error::MissingFrom)));
        let empty = with(MessageOptions::new().from(Addresses::List(Vec::new())));
        assert!(matches!(empty.ensure_valid_from(), Err(Error::MissingFrom)));

        with(MessageOptions::new().from("valid@address"))
            .ensure_valid_from()
            .unwrap();
    }

    #[test]
    fn test_ensure_valid_sender() {
        let mut message = with(MessageOptions::new().from("foo@bar"));
        message.ensure_valid_sender().unwrap();
        assert_eq!(message.sender, None);

        let mut message = with(MessageOptions::new().from(Addresses::list(["foo@bar", "bar@foo"])));
        message.ensure_valid_sender().unwrap();
        assert_eq!(message.sender, Some(Addresses::list(["foo@bar"])));

        let mut message = with(
            MessageOptions::new().from(Addresses::named([("foo", "foo@bar"), ("bar", "bar@foo")])),
        );
        message.ensure_valid_sender().unwrap();
        assert_eq!(message.sender, Some(Addresses::named([("foo", "foo@bar")])));

        let mut message = with(MessageOptions::new().from("foo@bar").sender("foo@bar"));
        message.ensure_valid_sender().unwrap();
        assert_eq!(message.sender, None);

        let mut message = with(
            MessageOptions::new()
                .from("foo@bar")
                .sender(Addresses::list(["foo@bar"])),
        );
        message.ensure_valid_sender().unwrap();
        assert_eq!(message.sender, None);

        let mut message = with(MessageOptions::new().from("foo@bar").sender("bar@foo"));
        message.ensure_valid_sender().unwrap();
        assert_eq!(message.sender, Some(Addresses::from("bar@foo")));

        let mut message = with(MessageOptions::new().sender(Addresses::list(["foo@bar", "bar@foo"])));
        assert!(matches!(message.ensure_valid_sender(), Err(Error::MultipleSender)));
    }

    #[test]
    fn test_ensure_standard_compliance() {
        let from = Addresses::list(["foo@bar", "bar@foo"]);
        let mut message = with(MessageOptions::new().from(from.clone()));
        message.ensure_standard_compliance().unwrap();
        assert!(message.date.is_some());
        assert_eq!(message.from, Some(from));
        assert_eq!(message.sender, Some(Addresses::list(["foo@bar"])));

        let before = format!("{message:?}");
        message.ensure_standard_compliance().unwrap();
        assert_eq!(format!("{message:?}"), before);
    }

    #[test]
    fn test_compliance_failure_keeps_state() {
        let mut message = with(MessageOptions::new().subject("kept").to("bar@foo"));
        assert!(matches!(message.ensure_standard_compliance(), Err(Error::MissingFrom)));
        assert_eq!(message.subject.as_deref(), Some("kept"));

        message.from = Some("foo@bar".into());
        message.ensure_standard_compliance().unwrap();
    }

    #[test]
    fn test_base_url() {
        let message = with(MessageOptions::new().base_url("foo.local"));
        assert_eq!(message.base_url(), Some("http://foo.local"));
        let message = with(MessageOptions::new().base_url("http://foo.bar"));
        assert_eq!(message.base_url(), Some("http://foo.bar"));
        let message = with(MessageOptions::new().base_url("http://foo.bar/"));
        assert_eq!(message.base_url(), Some("http://foo.bar"));

        let registry = Registry::new().with_request(StaticRequest::new("foo.bar").secure().with_base("/foo/bar"));
        let message = Message::new(Arc::new(registry));
        assert_eq!(message.base_url(), Some("https://foo.bar/foo/bar"));

        let mut message = message;
        message.set_base_url("other.local//");
        assert_eq!(message.base_url(), Some("http://other.local"));
    }

    #[test]
    fn test_generate_id() {
        let message = with(MessageOptions::new().base_url("foo.local/app"));
        let id = message.generate_id();
        assert!(id.ends_with("@foo.local"), "{id}");
        assert_eq!(id.matches('@').count(), 1);

        let id = self::message().generate_id();
        assert!(id.ends_with("@mailroom.generated"), "{id}");

        let message = with(MessageOptions::new().base_url("user@host:8080/x"));
        let id = message.generate_id();
        assert!(id.ends_with("@host"), "{id}");

        let message = with(MessageOptions::new().base_url("foo bar"));
        let id = message.generate_id();
        assert!(id.ends_with("@mailroom.generated"), "{id}");

        let message = with(MessageOptions::new().base_url("custom://a..b"));
        let id = message.generate_id();
        assert!(id.ends_with("@mailroom.generated"), "{id}");
        assert!(message.registry().grammar.is_valid_id(&id));
    }

    #[test]
    fn test_attach_and_detach_data() {
        let mut message = message();
        message.attach(None, AttachOptions::new().data("my data")).unwrap();
        assert_eq!(message.attachments().len(), 1);
        assert_eq!(message.attachments()[0].data(), Some("my data"));
        assert_eq!(message.attachments()[0].content_type, "application/octet-stream");
        assert_eq!(message.attachments()[0].disposition, "attachment");
        message.detach("my data");
        assert!(message.attachments().is_empty());
    }

    #[test]
    fn test_attach_errors() {
        let mut message = message();
        assert!(matches!(
            message.attach(None, AttachOptions::new()),
            Err(Error::NothingToAttach)
        ));

        let err = message.attach(Some("foo/bar"), AttachOptions::new()).unwrap_err();
        assert_eq!(err.to_string(), "File at `foo/bar` is not a valid asset, cannot attach");

        let options = AttachOptions {
            data: Some(serde_json::json!(42)),
            ..AttachOptions::default()
        };
        let err = message.attach(None, options).unwrap_err();
        assert_eq!(err.to_string(), "Data should be a string, `integer` given, cannot attach");
        assert!(message.attachments().is_empty());
    }

    #[test]
    fn test_attach_relative_path() {
        let mut message = message();
        message
            .attach(Some("foo/bar.png"), AttachOptions::new().check(false))
            .unwrap();
        let attachment = &message.attachments()[0];
        assert_eq!(attachment.path(), Some("/srv/app/mails/_assets/foo/bar.png"));
        assert_eq!(attachment.content_type, "image/png");
        assert_eq!(attachment.filename.as_deref(), Some("bar.png"));
        message.detach("foo/bar.png");
        assert!(message.attachments().is_empty());
    }

    #[test]
    fn test_attach_absolute_path() {
        let mut message = message();
        message
            .attach(Some("/foo/bar.png"), AttachOptions::new().check(false))
            .unwrap();
        let attachment = &message.attachments()[0];
        assert_eq!(attachment.path(), Some("/foo/bar.png"));
        assert_eq!(attachment.content_type, "image/png");
        assert_eq!(attachment.filename.as_deref(), Some("bar.png"));
        message.detach("/foo/bar.png");
        assert!(message.attachments().is_empty());
    }

    #[test]
    fn test_attach_overrides() {
        let mut message = message();
        message
            .attach(
                Some("/foo/bar.png"),
                AttachOptions::new()
                    .check(false)
                    .filename("logo.png")
                    .content_type("image/x-custom")
                    .disposition("inline"),
            )
            .unwrap();
        let attachment = &message.attachments()[0];
        assert_eq!(attachment.filename.as_deref(), Some("logo.png"));
        assert_eq!(attachment.content_type, "image/x-custom");
        assert_eq!(attachment.disposition, "inline");
    }

    #[test]
    fn test_attach_data_with_filename() {
        let mut message = message();
        message
            .attach(None, AttachOptions::new().data("test content").filename("test.txt"))
            .unwrap();
        let attachment = &message.attachments()[0];
        assert_eq!(attachment.data(), Some("test content"));
        assert_eq!(attachment.content_type, "text/plain");
        message.detach("test content");
        assert!(message.attachments().is_empty());
    }

    #[test]
    fn test_attach_then_detach_restores_order() {
        let mut message = message();
        message.attach(None, AttachOptions::new().data("one")).unwrap();
        message.attach(None, AttachOptions::new().data("two")).unwrap();
        let before = message.attachments().to_vec();

        message
            .attach(Some("/tmp/x.pdf"), AttachOptions::new().check(false))
            .unwrap();
        message.detach("/tmp/x.pdf").detach("/tmp/x.pdf");
        assert_eq!(message.attachments(), before.as_slice());
    }

    #[test]
    fn test_attach_from_options() {
        use crate::attachment::AttachSpec;

        let file = tempfile::NamedTempFile::new().unwrap();
        let file_path = file.path().to_string_lossy().into_owned();

        let options = MessageOptions::new()
            .attach(AttachSpec::Entry {
                path: None,
                options: AttachOptions::new().data("test content"),
            })
            .attach(AttachSpec::Entry {
                path: Some("foo/bar".into()),
                options: AttachOptions::new().check(false),
            })
            .attach(AttachSpec::Path(file_path.clone()));
        let mut message = with(options);
        assert_eq!(message.attachments().len(), 3);
        assert_eq!(message.attachments()[0].data(), Some("test content"));
        assert!(message.attachments()[1].matches("foo/bar"));
        assert!(message.attachments()[2].matches(&file_path));

        message.detach(&file_path);
        assert_eq!(message.attachments().len(), 2);
        message.detach(&file_path);
        assert_eq!(message.attachments().len(), 2);
        message.detach("test content");
        assert_eq!(message.attachments().len(), 1);
        message.detach("foo/bar");
        assert!(message.attachments().is_empty());
    }

    #[test]
    fn test_attach_from_options_error() {
        let options = MessageOptions::new().attach(crate::attachment::AttachSpec::Path(
            "/definitely/not/here.txt".into(),
        ));
        assert!(matches!(
            Message::from_options(options, registry()),
            Err(Error::AssetNotFound(_))
        ));
    }

    #[test]
    fn test_mime_type_overrides() {
        let mut options = MessageOptions::new();
        options.mime_types.insert("png".into(), "image/x-png".into());
        let mut message = with(options);
        message
            .attach(Some("/a.png"), AttachOptions::new().check(false))
            .unwrap();
        assert_eq!(message.attachments()[0].content_type, "image/x-png");
        assert_eq!(registry().mime_types.get("png"), Some("image/png"));
    }

    #[test]
    fn test_embed() {
        let mut message = message();
        let id = message
            .embed(Some("foo/bar"), AttachOptions::new().check(false))
            .unwrap();
        assert!(id.ends_with("@mailroom.generated"));
        let attachment = &message.attachments()[0];
        assert!(attachment.matches("foo/bar"));
        assert_eq!(attachment.disposition, "inline");
        assert_eq!(attachment.id.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_embed_given_id() {
        let mut message = message();
        let id = message
            .embed(None, AttachOptions::new().data("png").id("logo@host").disposition("attachment"))
            .unwrap();
        assert_eq!(id, "logo@host");
        assert_eq!(message.attachments()[0].disposition, "attachment");
    }

    #[test]
    fn test_debug_lists_fields() {
        let mut message = with(MessageOptions::new().from(Mailbox::with_name("Foo", "foo@bar")));
        message.push_body("text", "hello");
        let dump = format!("{message:#?}");
        assert!(dump.contains("foo@bar"));
        assert!(dump.contains("hello"));
        assert!(!dump.contains("Registry"));
    }
}
