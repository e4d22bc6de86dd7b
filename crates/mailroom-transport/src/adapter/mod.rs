//! Transport adapters.

pub mod debug;
pub mod mailgun;
pub mod simple;

pub use debug::{Debug, DebugConfig, Formatter, LogTarget};
pub use mailgun::{Flag, Mailgun, MailgunConfig, MailgunOptions, MailgunRequest};
pub use simple::{Generator, Simple, SimpleConfig};
