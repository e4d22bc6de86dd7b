//! Debug adapter: log instead of send.
//!
//! Every delivery becomes one log entry, `[{ISO 8601 time}] {formatted}\n`,
//! written to a caller-supplied stream, appended to a file, or stored as a
//! new file in a directory.
//!
//! Entries are produced by named formatters. A formatter is either a
//! template with `{:name}` placeholders, filled from [`message_data`], or a
//! function of the message. Built-in formats are `short`, `normal`, `full`
//! and `verbose`.

use crate::error::{Error, Result};
use crate::transport::{Options, Receipt, Transport, format_address};
use async_trait::async_trait;
use indexmap::IndexMap;
use mailroom_mime::Message;
use mailroom_mime::encoding::local_date;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use tokio::io::AsyncWriteExt;

/// Format used when neither the call nor the configuration names one.
pub const DEFAULT_FORMAT: &str = "normal";

/// Pattern of the `{:date}` placeholder.
pub const DATE_PATTERN: &str = "%Y-%m-%d %H:%M:%S";

const SHORT: &str = "Sent to {:to} with subject `{:subject}`.";
const NORMAL: &str = "Mail sent to {:to} from {:from} (sender: {:sender}, cc: {:cc}, bcc: {:bcc})\n\
with date {:date} and subject `{:subject}` in formats {:types}, text message body:\n\
{:body_text}\n";
const FULL_EXTRA: &str = "html message body:\n{:body_html}\n";

static PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{:(\w+)\}").ok());

/// Where log entries go.
#[derive(Clone)]
pub enum LogTarget {
    /// An open stream, left open after writing.
    Stream(Arc<Mutex<dyn Write + Send>>),
    /// A file to append to, or a directory receiving one file per message.
    Path(PathBuf),
}

impl LogTarget {
    /// Wraps a writer.
    #[must_use]
    pub fn stream(writer: impl Write + Send + 'static) -> Self {
        Self::Stream(Arc::new(Mutex::new(writer)))
    }

    /// Default log file in the system temporary directory.
    #[must_use]
    pub fn default_path() -> Self {
        Self::Path(std::env::temp_dir().join("mailroom-mail.log"))
    }
}

impl fmt::Debug for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

impl<'de> Deserialize<'de> for LogTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        PathBuf::deserialize(deserializer).map(Self::Path)
    }
}

/// Formatting function.
pub type FormatFn = Arc<dyn Fn(&Message) -> String + Send + Sync>;

/// Turns a message into a log entry.
#[derive(Clone)]
pub enum Formatter {
    /// Template with `{:name}` placeholders.
    Template(String),
    /// Custom function.
    Custom(FormatFn),
}

impl Formatter {
    /// Creates a formatter from a function.
    #[must_use]
    pub fn custom(f: impl Fn(&Message) -> String + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }
}

impl fmt::Debug for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for Formatter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::Template)
    }
}

/// Configuration for the debug adapter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Default log target.
    pub log: Option<LogTarget>,
    /// Default format name.
    pub format: Option<String>,
    /// Extra formatters, taking precedence over the built-in ones.
    pub formats: IndexMap<String, Formatter>,
}

impl DebugConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default log target.
    #[must_use]
    pub fn log(mut self, log: LogTarget) -> Self {
        self.log = Some(log);
        self
    }

    /// Sets the default format.
    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Adds a named formatter.
    #[must_use]
    pub fn formatter(mut self, name: impl Into<String>, formatter: Formatter) -> Self {
        self.formats.insert(name.into(), formatter);
        self
    }
}

/// Logs messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct Debug {
    config: DebugConfig,
}

impl Debug {
    /// Creates an adapter with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter from configuration.
    #[must_use]
    pub const fn from_config(config: DebugConfig) -> Self {
        Self { config }
    }

    /// Looks up a formatter, configured ones first.
    fn formatter(&self, name: &str) -> Option<Formatter> {
        if let Some(formatter) = self.config.formats.get(name) {
            return Some(formatter.clone());
        }
        match name {
            "short" => Some(Formatter::Template(SHORT.to_string())),
            "normal" => Some(Formatter::Template(NORMAL.to_string())),
            "full" => Some(Formatter::Template(format!("{NORMAL}{FULL_EXTRA}"))),
            "verbose" => Some(Formatter::custom(|message| {
                format!("Mail sent with properties:\n{message:#?}")
            })),
            _ => None,
        }
    }

    /// Formats a message with the named formatter.
    ///
    /// # Errors
    ///
    /// Returns `BadFormatter` if no formatter has that name.
    pub fn format(&self, message: &Message, name: &str) -> Result<String> {
        match self.formatter(name) {
            Some(Formatter::Template(template)) => Ok(insert(&template, &message_data(message))),
            Some(Formatter::Custom(f)) => Ok(f(message)),
            None => Err(Error::BadFormatter(name.to_string())),
        }
    }
}

/// Builds the placeholder data for templates.
///
/// Address fields are formatted like headers, the date uses
/// [`DATE_PATTERN`] in local time, types are joined with `", "`, headers
/// and bodies with newlines. Each declared type also gets a `body_{type}`
/// entry. Unset values are empty strings.
#[must_use]
pub fn message_data(message: &Message) -> IndexMap<String, String> {
    let mut data = IndexMap::new();
    data.insert("subject".to_string(), message.subject.clone().unwrap_or_default());
    data.insert("charset".to_string(), message.charset.clone());
    let addresses = [
        ("return_path", &message.return_path),
        ("sender", &message.sender),
        ("from", &message.from),
        ("reply_to", &message.reply_to),
        ("to", &message.to),
        ("cc", &message.cc),
        ("bcc", &message.bcc),
    ];
    for (key, value) in addresses {
        data.insert(key.to_string(), format_address(value.as_ref()));
    }
    data.insert(
        "date".to_string(),
        message
            .date
            .and_then(|date| local_date(date, DATE_PATTERN))
            .unwrap_or_default(),
    );
    data.insert("types".to_string(), message.types.join(", "));
    data.insert(
        "headers".to_string(),
        message
            .headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    data.insert(
        "body".to_string(),
        message
            .bodies()
            .keys()
            .map(|kind| message.body(kind))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    for kind in &message.types {
        data.insert(format!("body_{kind}"), message.body(kind));
    }
    data
}

/// Replaces `{:name}` placeholders; unknown names are left in place.
fn insert(template: &str, data: &IndexMap<String, String>) -> String {
    let Some(pattern) = PLACEHOLDER.as_ref() else {
        return template.to_string();
    };
    pattern
        .replace_all(template, |caps: &regex::Captures<'_>| {
            data.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn entry(formatted: &str) -> String {
    let now = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
    format!("[{now}] {formatted}\n")
}

async fn append(path: &Path, entry: &str) -> Result<bool> {
    let path = if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        path.join(format!(
            "{}{}.mail",
            chrono::Utc::now().timestamp(),
            uuid::Uuid::new_v4().simple()
        ))
    } else {
        path.to_path_buf()
    };
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    let written = file.write(entry.as_bytes()).await?;
    file.flush().await?;
    tracing::debug!(path = %path.display(), bytes = written, "Logged message");
    Ok(written == entry.len())
}

fn write_stream(stream: &Mutex<dyn Write + Send>, entry: &str) -> Result<bool> {
    let mut stream = stream
        .lock()
        .map_err(|_| std::io::Error::other("log stream lock poisoned"))?;
    let written = stream.write(entry.as_bytes())?;
    stream.flush()?;
    Ok(written == entry.len())
}

#[async_trait]
impl Transport for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn deliver(&self, message: &Message, options: &Options) -> Result<Receipt> {
        let format = options
            .format
            .as_deref()
            .or(self.config.format.as_deref())
            .unwrap_or(DEFAULT_FORMAT);
        let entry = entry(&self.format(message, format)?);

        let target = options
            .log
            .clone()
            .or_else(|| self.config.log.clone())
            .unwrap_or_else(LogTarget::default_path);
        let complete = match &target {
            LogTarget::Stream(stream) => write_stream(stream, &entry)?,
            LogTarget::Path(path) => append(path, &entry).await?,
        };
        if !complete {
            tracing::warn!(?target, "Log entry was only partially written");
        }
        Ok(Receipt::Logged { complete })
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
    use mailroom_mime::Registry;

    fn message() -> Message {
        let mut message = Message::new(Arc::new(Registry::new()));
        message.to = Some("foo@bar".into());
        message.subject = Some("test subject".to_string());
        message
    }

    fn envelope_message(date: i64) -> Message {
        let mut message = Message::new(Arc::new(Registry::new()));
        message.to = Some("to".into());
        message.from = Some("from".into());
        message.sender = Some("sender".into());
        message.cc = Some("cc".into());
        message.bcc = Some("bcc".into());
        message.date = Some(date);
        message.subject = Some("subject".to_string());
        message
    }

    fn short_entry() -> Regex {
        Regex::new(r"^\[[\d:+\-T]+\] Sent to foo@bar with subject `test subject`\.\n$").unwrap()
    }

    #[tokio::test]
    async fn test_deliver_to_stream() {
        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let options = Options::new()
            .log(LogTarget::Stream(buffer.clone()))
            .format("short");

        let receipt = Debug::new().deliver(&message(), &options).await.unwrap();
        assert_eq!(receipt, Receipt::Logged { complete: true });

        let written = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(short_entry().is_match(&written), "{written}");
    }

    #[tokio::test]
    async fn test_deliver_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("mail.log");
        std::fs::write(&log, "initial content\n").unwrap();

        let options = Options::new().log(LogTarget::Path(log.clone())).format("short");
        let receipt = Debug::new().deliver(&message(), &options).await.unwrap();
        assert!(receipt.is_success());

        let written = std::fs::read_to_string(&log).unwrap();
        let rest = written.strip_prefix("initial content\n").unwrap();
        assert!(short_entry().is_match(rest), "{written}");
    }

    #[tokio::test]
    async fn test_deliver_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("new.log");

        let debug = Debug::from_config(DebugConfig::new().log(LogTarget::Path(log.clone())));
        let options = Options::new().format("short");
        debug.deliver(&message(), &options).await.unwrap();
        debug.deliver(&message(), &options).await.unwrap();

        let written = std::fs::read_to_string(&log).unwrap();
        assert_eq!(written.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_deliver_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let options = Options::new()
            .log(LogTarget::Path(dir.path().to_path_buf()))
            .format("short");

        Debug::new().deliver(&message(), &options).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().unwrap(), "mail");
        let written = std::fs::read_to_string(&files[0]).unwrap();
        assert!(short_entry().is_match(&written), "{written}");
    }

    #[tokio::test]
    async fn test_deliver_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let options = Options::new()
            .log(LogTarget::Path(dir.path().join("missing").join("mail.log")))
            .format("short");
        let err = Debug::new().deliver(&message(), &options).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_call_format_overrides_config() {
        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let debug = Debug::from_config(
            DebugConfig::new()
                .format("verbose")
                .log(LogTarget::Stream(buffer.clone())),
        );
        debug
            .deliver(&message(), &Options::new().format("short"))
            .await
            .unwrap();
        let written = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(short_entry().is_match(&written), "{written}");
    }

    #[test]
    fn test_format_short() {
        let result = Debug::new().format(&message(), "short").unwrap();
        assert_eq!(result, "Sent to foo@bar with subject `test subject`.");
    }

    #[test]
    fn test_format_normal() {
        let time = chrono::Utc::now().timestamp();
        let date = local_date(time, DATE_PATTERN).unwrap();
        let mut message = envelope_message(time);
        message.push_body("text", "text body");

        let result = Debug::new().format(&message, "normal").unwrap();
        let expected = format!(
            "Mail sent to to from from (sender: sender, cc: cc, bcc: bcc)\n\
             with date {date} and subject `subject` in formats html, text, text message body:\n\
             text body\n"
        );
        assert_eq!(result, expected);
    }

    #[test]
    fn test_format_full() {
        let time = chrono::Utc::now().timestamp();
        let date = local_date(time, DATE_PATTERN).unwrap();
        let mut message = envelope_message(time);
        message.push_body("text", "text body");
        message.push_body("html", "html body");

        let result = Debug::new().format(&message, "full").unwrap();
        let expected = format!(
            "Mail sent to to from from (sender: sender, cc: cc, bcc: bcc)\n\
             with date {date} and subject `subject` in formats html, text, text message body:\n\
             text body\nhtml message body:\nhtml body\n"
        );
        assert_eq!(result, expected);
    }

    #[test]
    fn test_format_verbose() {
        let message = message();
        let result = Debug::new().format(&message, "verbose").unwrap();
        assert_eq!(result, format!("Mail sent with properties:\n{message:#?}"));
    }

    #[test]
    fn test_format_no_data() {
        let message = Message::new(Arc::new(Registry::new()));
        let result = Debug::new().format(&message, "short").unwrap();
        assert_eq!(result, "Sent to  with subject ``.");
    }

    #[test]
    fn test_format_extra_formatter() {
        let debug = Debug::from_config(
            DebugConfig::new().formatter("foo", Formatter::custom(|_| "foo".to_string())),
        );
        let message = Message::new(Arc::new(Registry::new()));
        assert_eq!(debug.format(&message, "foo").unwrap(), "foo");
    }

    #[test]
    fn test_configured_template_overrides_builtin() {
        let config: DebugConfig = serde_json::from_value(serde_json::json!({
            "format": "short",
            "formats": {"short": "To {:to} ({:charset}) {:unknown}"}
        }))
        .unwrap();
        let debug = Debug::from_config(config);
        assert_eq!(
            debug.format(&message(), "short").unwrap(),
            "To foo@bar (UTF-8) {:unknown}"
        );
    }

    #[test]
    fn test_format_bad_formatter() {
        let message = Message::new(Arc::new(Registry::new()));
        let err = Debug::new().format(&message, "foo").unwrap_err();
        assert!(matches!(err, Error::BadFormatter(ref name) if name == "foo"));
        assert_eq!(
            err.to_string(),
            "Formatter for format `foo` is neither a template nor a function"
        );
    }

    #[test]
    fn test_message_data() {
        let mut message = envelope_message(0);
        message.header("X-Mailer", "mailroom");
        message.push_body("html", "<b>hi</b>");
        let data = message_data(&message);
        assert_eq!(data["headers"], "X-Mailer: mailroom");
        assert_eq!(data["body_html"], "<b>hi</b>");
        assert_eq!(data["body_text"], "");
        assert_eq!(data["return_path"], "");
        assert_eq!(data["types"], "html, text");
    }
}
