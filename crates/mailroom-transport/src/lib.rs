//! # mailroom-transport
//!
//! Delivery of composed [`mailroom_mime::Message`]s.
//!
//! ## Features
//!
//! - **Simple**: RFC 2822 serialization with multipart bodies, piped into `sendmail`
//! - **Debug**: templated log entries written to a stream, file or directory
//! - **Mailgun**: MIME upload to the Mailgun HTTP API
//! - **Async**: every adapter implements the [`Transport`] trait on tokio
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailroom_transport::{Debug, DebugConfig, LogTarget, Options, Transport};
//!
//! let debug = Debug::from_config(
//!     DebugConfig::new().log(LogTarget::Path("/var/log/mail.log".into())),
//! );
//!
//! message.ensure_standard_compliance()?;
//! let receipt = debug.deliver(&message, &Options::new().format("short")).await?;
//! assert!(receipt.is_success());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod adapter;
mod error;
mod sendmail;
mod transport;

pub use adapter::{
    Debug, DebugConfig, Flag, Formatter, Generator, LogTarget, Mailgun, MailgunConfig,
    MailgunOptions, MailgunRequest, Simple, SimpleConfig,
};
pub use error::{Error, Result};
pub use sendmail::{DEFAULT_TIMEOUT, Envelope, MailCommand, Sendmail};
pub use transport::{Options, Receipt, Transport, format_address};
