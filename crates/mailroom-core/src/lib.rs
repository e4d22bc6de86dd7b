//! # mailroom-core
//!
//! Delivery dispatch for mailroom.
//!
//! This crate provides:
//! - Named delivery configurations (adapter choice, settings, message defaults)
//! - A rendering pipeline populating message bodies per media type
//! - A [`Mailer`] tying option sets, interceptors, rendering and transports together
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailroom_core::{Deliveries, DeliverRequest, Mailer};
//! use mailroom_mime::Registry;
//! use std::sync::Arc;
//!
//! let deliveries = Deliveries::from_json(r#"{
//!     "default": {"adapter": "debug", "from": "app@example.com", "format": "short"}
//! }"#)?;
//! let mailer = Mailer::new(Arc::new(deliveries), Arc::new(Registry::new()));
//!
//! let receipt = mailer
//!     .deliver(DeliverRequest::new("welcome").to("user@example.com").data("Hello!"))
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod delivery;
mod error;
pub mod mailer;
pub mod render;

pub use delivery::{AdapterConfig, DEFAULT_DELIVERY, Deliveries, DeliveryConfig};
pub use error::{Error, Result};
pub use mailer::{DeliverRequest, DeliveryContext, Interceptor, Mailer, SHORT_OPTIONS};
pub use render::{Media, PassthroughRenderer, Renderer, Template};
