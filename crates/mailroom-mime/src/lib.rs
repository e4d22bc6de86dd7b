//! # mailroom-mime
//!
//! Message model for outgoing email.
//!
//! ## Features
//!
//! - **Message**: addresses, custom headers, per-type body parts
//! - **Compliance checks**: date range, originator and sender rules of RFC 2822
//! - **Attachments**: path or inline data, embedding with generated Content-IDs
//! - **Grammar**: RFC 2822 productions for validating Content-IDs
//! - **Registries**: media types, extension table, asset resolution
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailroom_mime::{AttachOptions, Message, MessageOptions, Registry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(Registry::new());
//! let mut message = Message::from_options(
//!     MessageOptions::new()
//!         .from("sender@example.com")
//!         .to("recipient@example.com")
//!         .subject("Hello"),
//!     registry,
//! )?;
//!
//! message.push_body("text", "Hello, World!");
//! message.push_body("html", "<p>Hello, World!</p>");
//!
//! let cid = message.embed(Some("logo.png"), AttachOptions::new())?;
//! message.push_body("html", format!("<img src=\"cid:{cid}\">"));
//!
//! message.ensure_standard_compliance()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod attachment;
mod error;
mod header;
mod message;
mod options;
mod registry;

pub mod assets;
pub mod encoding;
pub mod grammar;
pub mod media;

pub use address::{Addresses, Mailbox};
pub use assets::{AssetOptions, AssetResolver, FsAssets, RequestContext, StaticRequest};
pub use attachment::{AttachOptions, AttachSpec, Attachment, Source};
pub use error::{Error, Result};
pub use grammar::{Grammar, TokenOverride};
pub use header::Headers;
pub use media::{MediaTypes, MimeTypes};
pub use message::{FALLBACK_ID_DOMAIN, MAX_TIMESTAMP, Message};
pub use options::MessageOptions;
pub use registry::Registry;
