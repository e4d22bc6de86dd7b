#![allow(clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: deliver a message through the debug adapter
//!
//! Composes a welcome message with an inline attachment and logs it with
//! the `full` format instead of sending it.
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=debug cargo run --package mailroom-core --example debug_delivery
//! ```
//!
//! The log entry is written to `$TMPDIR/mailroom-demo.log`.

use anyhow::Context;
use mailroom_core::{DeliverRequest, Deliveries, Mailer};
use mailroom_mime::{Registry, StaticRequest};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let log = std::env::temp_dir().join("mailroom-demo.log");
    let config = json!({
        "default": {
            "adapter": "debug",
            "from": {"Mailroom Demo": "demo@example.com"},
            "log": log,
            "format": "full"
        }
    });
    let deliveries =
        Deliveries::from_json(&config.to_string()).context("invalid delivery configuration")?;

    let registry = Registry::new().with_request(StaticRequest::new("demo.example.com").secure());
    let mailer = Mailer::new(Arc::new(deliveries), Arc::new(registry)).with_name("demo");

    let request = DeliverRequest::new("welcome")
        .to(json!({"New User": "user@example.org"}))
        .option("subject", "Welcome aboard")
        .option(
            "attach",
            json!([{"data": "name,plan\nNew User,free\n", "filename": "account.csv"}]),
        )
        .data(json!({
            "html": "<h1>Welcome!</h1><p>Your account is ready.</p>",
            "text": "Welcome!\n\nYour account is ready."
        }));

    let receipt = mailer.deliver(request).await.context("delivery failed")?;
    println!("Receipt: {:?}", receipt);
    println!("Log written to {}", log.display());
    Ok(())
}
