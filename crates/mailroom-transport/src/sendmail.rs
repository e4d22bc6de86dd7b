//! Local mail command.
//!
//! The simple adapter hands every serialized message to a [`MailCommand`].
//! [`Sendmail`] pipes it into the host's `sendmail` binary.

use crate::error::{Error, Result};
use async_trait::async_trait;
use mailroom_mime::Headers;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default timeout for the mail command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A serialized message ready for the mail command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Formatted recipient list.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Header block, without `To` and `Subject` unless set explicitly.
    pub headers: Headers,
    /// Message body.
    pub body: String,
}

impl Envelope {
    /// Builds the complete RFC 2822 document.
    ///
    /// `To` and `Subject` are added in front of the headers unless the
    /// headers already carry them. Headers and body are separated by an
    /// empty line.
    #[must_use]
    pub fn to_mime(&self) -> String {
        let mut lines = Vec::with_capacity(self.headers.len() + 2);
        if !self.headers.contains("To") && !self.to.is_empty() {
            lines.push(format!("To: {}", self.to));
        }
        if !self.headers.contains("Subject") {
            lines.push(format!("Subject: {}", self.subject));
        }
        if !self.headers.is_empty() {
            lines.push(self.headers.to_block());
        }
        format!("{}\r\n\r\n{}", lines.join("\r\n"), self.body)
    }
}

/// Sends a serialized message.
#[async_trait]
pub trait MailCommand: Send + Sync + fmt::Debug {
    /// Sends the envelope, returning whether it was accepted for delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be run.
    async fn send(&self, envelope: &Envelope) -> Result<bool>;
}

/// Pipes messages into `sendmail -t -i`.
#[derive(Debug, Clone)]
pub struct Sendmail {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for Sendmail {
    fn default() -> Self {
        Self {
            program: PathBuf::from("sendmail"),
            args: vec!["-t".to_string(), "-i".to_string()],
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Sendmail {
    /// Creates a command using `sendmail` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different program with the given arguments.
    #[must_use]
    pub fn with_program<I, S>(mut self, program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, document: &[u8]) -> Result<bool> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(document).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, io::Error>(())
        };
        // stderr is drained while stdin is written
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;
        if let Err(e) = written {
            if e.kind() != io::ErrorKind::BrokenPipe || output.status.success() {
                return Err(e.into());
            }
        }

        if !output.status.success() {
            tracing::warn!(
                program = %self.program.display(),
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Mail command rejected message"
            );
        }
        Ok(output.status.success())
    }
}

#[async_trait]
impl MailCommand for Sendmail {
    async fn send(&self, envelope: &Envelope) -> Result<bool> {
        let document = envelope.to_mime();
        tracing::debug!(
            program = %self.program.display(),
            to = %envelope.to,
            bytes = document.len(),
            "Piping message to mail command"
        );
        match tokio::time::timeout(self.timeout, self.run(document.as_bytes())).await {
            Ok(result) => result,
            Err(_) => Err(Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("mail command timed out after {:?}", self.timeout),
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

    fn envelope() -> Envelope {
        Envelope {
            to: "foo@bar".to_string(),
            subject: "test subject".to_string(),
            headers: [("From", "valid@address"), ("MIME-Version", "1.0")]
                .into_iter()
                .collect(),
            body: "test body".to_string(),
        }
    }

    #[test]
    fn test_to_mime() {
        assert_eq!(
            envelope().to_mime(),
            "To: foo@bar\r\nSubject: test subject\r\nFrom: valid@address\r\nMIME-Version: 1.0\r\n\r\ntest body"
        );
    }

    #[test]
    fn test_to_mime_keeps_explicit_to() {
        let mut envelope = envelope();
        envelope.headers.set("To", "Foo <foo@bar>");
        let document = envelope.to_mime();
        assert_eq!(document.matches("To: ").count(), 1);
        assert!(document.contains("To: Foo <foo@bar>"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sendmail_pipes_document() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.eml");
        let script = format!("cat > '{}'", out.display());
        let command = Sendmail::new().with_program("sh", ["-c".to_string(), script]);

        assert!(command.send(&envelope()).await.unwrap());
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, envelope().to_mime());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sendmail_reports_failure() {
        let command = Sendmail::new().with_program("sh", ["-c", "cat > /dev/null; exit 75"]);
        assert!(!command.send(&envelope()).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sendmail_timeout() {
        let command = Sendmail::new()
            .with_program("sh", ["-c", "sleep 5"])
            .with_timeout(Duration::from_millis(100));
        let err = command.send(&envelope()).await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::TimedOut));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sendmail_drains_stderr_while_writing() {
        let mut envelope = envelope();
        envelope.body = "x".repeat(300_000);
        let command = Sendmail::new()
            .with_program("sh", ["-c", "head -c 200000 /dev/zero >&2; cat > /dev/null"])
            .with_timeout(Duration::from_secs(10));
        assert!(command.send(&envelope).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sendmail_exits_without_reading() {
        let mut envelope = envelope();
        envelope.body = "x".repeat(300_000);
        let command = Sendmail::new().with_program("sh", ["-c", "exit 75"]);
        assert!(!command.send(&envelope).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let command = Sendmail::new().with_program("/nonexistent/sendmail", Vec::<String>::new());
        assert!(matches!(command.send(&envelope()).await, Err(Error::Io(_))));
    }
}
