//! Simple adapter: local mail command.
//!
//! Serializes a message into an RFC 2822 header block and a (multipart)
//! body, then hands both to a [`MailCommand`].

use crate::error::{Error, Result};
use crate::sendmail::{DEFAULT_TIMEOUT, Envelope, MailCommand, Sendmail};
use crate::transport::{Options, Receipt, Transport, format_address};
use async_trait::async_trait;
use indexmap::IndexMap;
use mailroom_mime::assets::is_url;
use mailroom_mime::encoding::{WRAP_WIDTH, encode_base64_lines, rfc2822_date, wordwrap};
use mailroom_mime::{Attachment, Headers, Message, Source};
use regex::Regex;
use serde::Deserialize;
use std::fmt::Write as _;
use reqwest::Client;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Prefix of generated multipart boundaries.
pub const BOUNDARY_PREFIX: &str = "MAILROOM_SIMPLE_";

const PREAMBLE: &str = "This is a multi-part message in MIME format.\n\n";

static NAME_PARAM: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r";\s+name=").ok());
static FILENAME_PARAM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r";\s+filename=").ok());

fn has_param(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

/// Configuration for the simple adapter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimpleConfig {
    /// Mail command timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for SimpleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

/// Sends messages through a local mail command.
#[derive(Debug, Clone)]
pub struct Simple {
    command: Arc<dyn MailCommand>,
    generator: Generator,
}

impl Default for Simple {
    fn default() -> Self {
        Self::new()
    }
}

impl Simple {
    /// Creates an adapter piping into `sendmail`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_command(Sendmail::new())
    }

    /// Creates an adapter from configuration.
    ///
    /// The timeout applies to the mail command and to fetching remote
    /// attachments.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &SimpleConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_command(Sendmail::new().with_timeout(timeout)).with_http(http))
    }

    /// Creates an adapter using the given mail command.
    #[must_use]
    pub fn with_command(command: impl MailCommand + 'static) -> Self {
        Self {
            command: Arc::new(command),
            generator: Generator::default(),
        }
    }

    /// Fetches remote attachments with the given HTTP client.
    #[must_use]
    pub fn with_http(mut self, http: Client) -> Self {
        self.generator = Generator::new(http);
        self
    }

    /// Serializes a message, see [`Generator::generate`].
    ///
    /// # Errors
    ///
    /// Returns the serialization error.
    pub async fn generate(&self, message: &Message) -> Result<Envelope> {
        self.generator.generate(message).await
    }
}

/// Serializes messages into an [`Envelope`].
///
/// Attachments given by URL are fetched with the generator's HTTP client.
#[derive(Debug, Clone, Default)]
pub struct Generator {
    http: Client,
}

impl Generator {
    /// Creates a generator fetching remote attachments with `http`.
    #[must_use]
    pub const fn new(http: Client) -> Self {
        Self { http }
    }

    /// Serializes a message.
    ///
    /// Headers start from the message's custom headers, followed by the
    /// address headers, `Date`, `MIME-Version` and `Content-Type`. A message
    /// with one type and no attachments gets a single part body, anything
    /// else a `multipart/alternative` body.
    ///
    /// # Errors
    ///
    /// Returns an error if a type is unknown, the date is out of range, or an
    /// attachment cannot be loaded.
    pub async fn generate(&self, message: &Message) -> Result<Envelope> {
        let mut headers = message.headers.clone();
        let addresses = [
            ("Return-Path", &message.return_path),
            ("Sender", &message.sender),
            ("From", &message.from),
            ("Reply-To", &message.reply_to),
            ("To", &message.to),
            ("Cc", &message.cc),
            ("Bcc", &message.bcc),
        ];
        for (name, value) in addresses {
            let formatted = format_address(value.as_ref());
            if !formatted.is_empty() {
                headers.set(name, formatted);
            }
        }
        if let Some(date) = message.date {
            let formatted = rfc2822_date(date).ok_or(mailroom_mime::Error::InvalidDate(date))?;
            headers.set("Date", formatted);
        }
        headers.set("MIME-Version", "1.0");

        let types = message.types()?;
        let body = match types.first() {
            Some((kind, content_type)) if types.len() == 1 && message.attachments().is_empty() => {
                headers.set(
                    "Content-Type",
                    format!("{content_type};charset=\"{}\"", message.charset),
                );
                wordwrap(&message.body(kind), WRAP_WIDTH)
            }
            _ => self.multipart(message, &types, &mut headers).await?,
        };

        Ok(Envelope {
            to: format_address(message.to.as_ref()),
            subject: message.subject.clone().unwrap_or_default(),
            headers,
            body,
        })
    }

    async fn multipart(
        &self,
        message: &Message,
        types: &IndexMap<String, String>,
        headers: &mut Headers,
    ) -> Result<String> {
        let boundary = format!("{BOUNDARY_PREFIX}{}", uuid::Uuid::new_v4().simple());
        tracing::debug!(%boundary, parts = types.len(), attachments = message.attachments().len(), "Building multipart body");
        headers.set(
            "Content-Type",
            format!("multipart/alternative;boundary=\"{boundary}\""),
        );

        let mut body = String::from(PREAMBLE);
        for (kind, content_type) in types {
            let _ = write!(
                body,
                "--{boundary}\nContent-Type: {content_type};charset=\"{}\"\n\n{}\n",
                message.charset,
                wordwrap(&message.body(kind), WRAP_WIDTH)
            );
        }
        for attachment in message.attachments() {
            let content = self.load(attachment).await?;
            let _ = writeln!(body, "--{boundary}");
            write_attachment(&mut body, attachment, content);
        }
        let _ = write!(body, "--{boundary}--");
        Ok(body)
    }

    async fn load(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        match &attachment.source {
            Source::Data(data) => Ok(data.clone().into_bytes()),
            Source::Path { path, .. } if is_url(path) => {
                let response = self
                    .http
                    .get(path.as_str())
                    .send()
                    .await
                    .map_err(|e| Error::attachment_read(path.as_str(), e))?;
                if !response.status().is_success() {
                    return Err(Error::attachment_read(
                        path.as_str(),
                        format!("HTTP status {}", response.status()),
                    ));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Error::attachment_read(path.as_str(), e))?;
                Ok(bytes.to_vec())
            }
            Source::Path { path, .. } => tokio::fs::read(path).await.map_err(|e| {
                tracing::warn!(path = %path, error = %e, "Attachment not readable");
                Error::attachment_read(path.as_str(), e)
            }),
        }
    }
}

fn write_attachment(body: &mut String, attachment: &Attachment, content: Vec<u8>) {
    let filename = attachment.filename.as_deref().filter(|f| !f.is_empty());

    let mut content_type = attachment.content_type.clone();
    if let Some(filename) = filename {
        if !has_param(&NAME_PARAM, &content_type) {
            let _ = write!(content_type, "; name=\"{filename}\"");
        }
    }
    let _ = writeln!(body, "Content-Type: {content_type}");

    let mut disposition = attachment.disposition.clone();
    if let Some(filename) = filename {
        if !has_param(&FILENAME_PARAM, &disposition) {
            let _ = write!(disposition, "; filename=\"{filename}\"");
        }
    }
    let _ = writeln!(body, "Content-Disposition: {disposition}");

    if let Some(id) = &attachment.id {
        let _ = writeln!(body, "Content-ID: <{id}>");
    }

    match String::from_utf8(content) {
        Ok(text) => {
            let _ = write!(body, "\n{}\n", wordwrap(&text, WRAP_WIDTH));
        }
        Err(binary) => {
            let _ = write!(
                body,
                "Content-Transfer-Encoding: base64\n\n{}\n",
                encode_base64_lines(binary.as_bytes())
            );
        }
    }
}

#[async_trait]
impl Transport for Simple {
    fn name(&self) -> &'static str {
        "simple"
    }

    async fn deliver(&self, message: &Message, _options: &Options) -> Result<Receipt> {
        let envelope = self.generate(message).await?;
        tracing::debug!(to = %envelope.to, subject = %envelope.subject, "Handing message to mail command");
        let accepted = self.command.send(&envelope).await?;
        if !accepted {
            tracing::warn!(to = %envelope.to, "Mail command did not accept message");
        }
        Ok(Receipt::Handed { accepted })
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
    use mailroom_mime::{AttachOptions, AttachSpec, MessageOptions, Registry};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Debug, Default)]
    struct Captured {
        sent: Mutex<Vec<Envelope>>,
    }

    #[async_trait]
    impl MailCommand for Arc<Captured> {
        async fn send(&self, envelope: &Envelope) -> Result<bool> {
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(true)
        }
    }

    fn message(options: MessageOptions) -> Message {
        let mut message = Message::from_options(options, Arc::new(Registry::new())).unwrap();
        message.ensure_standard_compliance().unwrap();
        message
    }

    fn plain_options() -> MessageOptions {
        MessageOptions::new()
            .to("foo@bar")
            .from("valid@address")
            .subject("test subject")
    }

    fn header_lines(envelope: &Envelope) -> Vec<String> {
        envelope
            .headers
            .to_block()
            .split("\r\n")
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_plain_message() {
        let captured = Arc::new(Captured::default());
        let simple = Simple::with_command(captured.clone());
        let mut message = message(plain_options().types(["text"]).header("Custom", "foo"));
        message.push_body("text", "test body");

        let receipt = simple.deliver(&message, &Options::new()).await.unwrap();
        assert_eq!(receipt, Receipt::Handed { accepted: true });

        let sent = captured.sent.lock().unwrap();
        let envelope = &sent[0];
        assert_eq!(envelope.to, "foo@bar");
        assert_eq!(envelope.subject, "test subject");
        assert_eq!(envelope.body, "test body");

        let lines = header_lines(envelope);
        assert!(lines.contains(&"From: valid@address".to_string()));
        assert!(lines.contains(&"MIME-Version: 1.0".to_string()));
        assert!(lines.contains(&"Content-Type: text/plain;charset=\"UTF-8\"".to_string()));
        assert!(lines.contains(&"Custom: foo".to_string()));
        assert_eq!(lines.iter().filter(|l| l.starts_with("Content-Type:")).count(), 1);
        assert_eq!(lines[0], "Custom: foo");
        assert!(lines.iter().any(|l| l.starts_with("Date: ")));
        assert!(!lines.iter().any(|l| l.starts_with("Cc:")));
    }

    #[tokio::test]
    async fn test_html_message() {
        let simple = Simple::with_command(Arc::new(Captured::default()));
        let mut message = message(plain_options().types(["html"]));
        message.push_body("html", "<b>test body</b>");

        let envelope = simple.generate(&message).await.unwrap();
        assert_eq!(envelope.body, "<b>test body</b>");
        assert_eq!(
            envelope.headers.get("Content-Type"),
            Some("text/html;charset=\"UTF-8\"")
        );
    }

    #[tokio::test]
    async fn test_single_part_is_wrapped() {
        let simple = Simple::with_command(Arc::new(Captured::default()));
        let mut message = message(plain_options().types(["text"]));
        let text = "word ".repeat(40);
        message.push_body("text", text.trim_end());

        let envelope = simple.generate(&message).await.unwrap();
        assert_eq!(envelope.body, wordwrap(text.trim_end(), 70));
        assert!(envelope.body.lines().all(|l| l.len() <= 70));
    }

    #[tokio::test]
    async fn test_multipart_message() {
        let simple = Simple::with_command(Arc::new(Captured::default()));
        let mut message = message(plain_options());
        message.push_body("text", "test text body");
        message.push_body("html", "<b>test html body</b>");

        let envelope = simple.generate(&message).await.unwrap();
        let content_type = envelope.headers.get("Content-Type").unwrap();
        let boundary = content_type
            .strip_prefix("multipart/alternative;boundary=\"")
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap();
        assert!(boundary.starts_with(BOUNDARY_PREFIX));

        let body = &envelope.body;
        assert!(body.starts_with("This is a multi-part message in MIME format.\n\n"));
        assert!(body.contains("\nContent-Type: text/plain;charset=\"UTF-8\"\n\ntest text body\n"));
        assert!(body.contains("\nContent-Type: text/html;charset=\"UTF-8\"\n\n<b>test html body</b>\n"));
        assert_eq!(body.matches(&format!("--{boundary}\n")).count(), 2);
        assert_eq!(body.matches(&format!("--{boundary}--")).count(), 1);
        assert!(body.ends_with(&format!("--{boundary}--")));

        let html = body.find("text/html").unwrap();
        let text = body.find("text/plain").unwrap();
        assert!(html < text);
    }

    #[tokio::test]
    async fn test_boundaries_are_unique() {
        let simple = Simple::with_command(Arc::new(Captured::default()));
        let message = message(plain_options());
        let first = simple.generate(&message).await.unwrap();
        let second = simple.generate(&message).await.unwrap();
        assert_ne!(first.headers.get("Content-Type"), second.headers.get("Content-Type"));
    }

    #[tokio::test]
    async fn test_attachments() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "file data").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let options = MessageOptions::new()
            .from("valid@address")
            .attach(AttachSpec::Entry {
                path: None,
                options: AttachOptions::new().data("my data").filename("cool.txt"),
            })
            .attach(AttachSpec::Entry {
                path: Some(path),
                options: AttachOptions::new()
                    .filename("file.txt")
                    .id("foo@bar")
                    .content_type("text/plain"),
            });
        let mut message = message(options);
        message.push_body("text", "text body");
        message.push_body("html", "html body");

        let simple = Simple::with_command(Arc::new(Captured::default()));
        let body = simple.generate(&message).await.unwrap().body;

        assert!(body.contains(concat!(
            "\nContent-Type: text/plain; name=\"cool.txt\"\n",
            "Content-Disposition: attachment; filename=\"cool.txt\"\n",
            "\nmy data\n"
        )));
        assert!(body.contains(concat!(
            "\nContent-Type: text/plain; name=\"file.txt\"\n",
            "Content-Disposition: attachment; filename=\"file.txt\"\n",
            "Content-ID: <foo@bar>\n",
            "\nfile data\n"
        )));
    }

    #[tokio::test]
    async fn test_attachment_without_filename() {
        let options = MessageOptions::new().from("valid@address").attach(AttachSpec::Entry {
            path: None,
            options: AttachOptions::new().data("my data").content_type("text/plain"),
        });
        let mut message = message(options);
        message.push_body("text", "text body");

        let simple = Simple::with_command(Arc::new(Captured::default()));
        let envelope = simple.generate(&message).await.unwrap();
        assert!(envelope.body.contains(concat!(
            "\nContent-Type: text/plain\n",
            "Content-Disposition: attachment\n",
            "\nmy data\n"
        )));
        assert!(envelope.headers.get("Content-Type").unwrap().starts_with("multipart/alternative"));
    }

    #[tokio::test]
    async fn test_existing_params_are_kept() {
        let options = MessageOptions::new().from("valid@address").attach(AttachSpec::Entry {
            path: None,
            options: AttachOptions::new()
                .data("x")
                .filename("a.txt")
                .content_type("text/plain;  name=\"b.txt\"")
                .disposition("inline; filename=\"c.txt\""),
        });
        let message = message(options);
        let simple = Simple::with_command(Arc::new(Captured::default()));
        let body = simple.generate(&message).await.unwrap().body;
        assert!(body.contains("Content-Type: text/plain;  name=\"b.txt\"\n"));
        assert!(body.contains("Content-Disposition: inline; filename=\"c.txt\"\n"));
    }

    #[tokio::test]
    async fn test_binary_attachment_is_base64() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), [0xff, 0xfe, 0x00, 0x01]).unwrap();
        let mut message = message(MessageOptions::new().from("valid@address"));
        message
            .attach(Some(&file.path().to_string_lossy()), AttachOptions::new())
            .unwrap();

        let simple = Simple::with_command(Arc::new(Captured::default()));
        let body = simple.generate(&message).await.unwrap().body;
        assert!(body.contains("Content-Transfer-Encoding: base64\n\n//4AAQ==\n"));
    }

    #[tokio::test]
    async fn test_attachment_read_error() {
        let mut message = message(MessageOptions::new().from("valid@address"));
        message
            .attach(Some("/foo/bar"), AttachOptions::new().filename("file.txt").check(false))
            .unwrap();

        let captured = Arc::new(Captured::default());
        let simple = Simple::with_command(captured.clone());
        let err = simple.deliver(&message, &Options::new()).await.unwrap_err();
        assert!(matches!(err, Error::AttachmentRead { ref path, .. } if path == "/foo/bar"));
        assert!(err.to_string().starts_with("Can not attach path `/foo/bar`"));
        assert!(captured.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_address_headers() {
        let options = plain_options()
            .types(["text"])
            .cc(mailroom_mime::Addresses::named([("Cc", "cc@bar")]))
            .bcc("bcc@bar")
            .reply_to("reply@bar")
            .return_path("bounce@bar");
        let message = message(options);
        let simple = Simple::with_command(Arc::new(Captured::default()));
        let envelope = simple.generate(&message).await.unwrap();

        let names: Vec<_> = envelope.headers.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            ["Return-Path", "From", "Reply-To", "To", "Cc", "Bcc", "Date", "MIME-Version", "Content-Type"]
        );
        assert_eq!(envelope.headers.get("Cc"), Some("Cc <cc@bar>"));
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let message = message(plain_options().types(["pdf"]));
        let simple = Simple::with_command(Arc::new(Captured::default()));
        let err = simple.generate(&message).await.unwrap_err();
        assert!(matches!(err, Error::Message(mailroom_mime::Error::UnknownType(_))));
    }

    /// Serves one HTTP response and returns the URL of `path` on that server.
    async fn serve_once(status: &'static str, body: &'static str, path: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}{path}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        url
    }

    fn local_simple() -> Simple {
        Simple::with_command(Arc::new(Captured::default()))
            .with_http(Client::builder().no_proxy().build().unwrap())
    }

    #[tokio::test]
    async fn test_remote_attachment() {
        let url = serve_once("200 OK", "remote data", "/files/notes.txt").await;
        let mut message = message(MessageOptions::new().from("valid@address"));
        message.attach(Some(&url), AttachOptions::new()).unwrap();
        assert_eq!(message.attachments()[0].filename.as_deref(), Some("notes.txt"));

        let body = local_simple().generate(&message).await.unwrap().body;
        assert!(body.contains(concat!(
            "\nContent-Type: text/plain; name=\"notes.txt\"\n",
            "Content-Disposition: attachment; filename=\"notes.txt\"\n",
            "\nremote data\n"
        )));
    }

    #[tokio::test]
    async fn test_remote_attachment_not_found() {
        let url = serve_once("404 Not Found", "missing", "/files/gone.txt").await;
        let mut message = message(MessageOptions::new().from("valid@address"));
        message.attach(Some(&url), AttachOptions::new()).unwrap();

        let captured = Arc::new(Captured::default());
        let simple = Simple::with_command(captured.clone())
            .with_http(Client::builder().no_proxy().build().unwrap());
        let err = simple.deliver(&message, &Options::new()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::AttachmentRead { ref path, ref reason } if *path == url && reason.contains("404")
        ));
        assert!(captured.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_from_config() {
        let simple = Simple::from_config(&SimpleConfig { timeout_secs: 5 }).unwrap();
        assert_eq!(simple.name(), "simple");
    }
}
