//! End-to-end tests from JSON configuration to a logged message.

use std::fs;
use std::sync::Arc;

use mailroom_core::{DeliverRequest, Deliveries, Error, Mailer};
use mailroom_mime::Registry;
use mailroom_transport::Receipt;
use serde_json::{Map, Value, json};

fn deliveries(log: &std::path::Path) -> Deliveries {
    let config = json!({
        "default": {
            "adapter": "Debug",
            "from": {"Shop": "shop@example.com"},
            "log": log,
            "format": "short"
        },
        "verbose": {
            "adapter": "debug",
            "from": "shop@example.com",
            "log": log,
            "format": "normal",
            "types": "text"
        }
    });
    Deliveries::from_json(&config.to_string()).unwrap()
}

#[tokio::test]
async fn test_deliver_to_debug_log() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("mail.log");
    let mailer = Mailer::new(Arc::new(deliveries(&log)), Arc::new(Registry::new()));

    let receipt = mailer
        .deliver(
            DeliverRequest::new("order")
                .to("customer@example.org")
                .option("subject", "Order shipped")
                .data("Your order is on its way."),
        )
        .await
        .unwrap();
    assert_eq!(receipt, Receipt::Logged { complete: true });

    let logged = fs::read_to_string(&log).unwrap();
    assert!(logged.ends_with("] Sent to customer@example.org with subject `Order shipped`.\n"));
}

#[tokio::test]
async fn test_short_form_with_named_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("mail.log");
    let mailer = Mailer::new(Arc::new(deliveries(&log)), Arc::new(Registry::new()));

    let Value::Object(fields) = json!({
        "delivery": "verbose",
        "subject": "Reminder",
        "text": "Don't forget!"
    }) else {
        unreachable!()
    };
    mailer
        .deliver(DeliverRequest::short("reminder", "user@example.org", fields))
        .await
        .unwrap();

    let logged = fs::read_to_string(&log).unwrap();
    assert!(logged.contains("] Mail sent to user@example.org from shop@example.com"));
    assert!(logged.contains("subject `Reminder` in formats text, text message body:\nDon't forget!\n"));
}

#[tokio::test]
async fn test_configuration_errors() {
    let err = Deliveries::from_json(r#"{"default": {"adapter": "carrier-pigeon"}}"#).unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    let mailer = Mailer::new(Arc::new(Deliveries::new()), Arc::new(Registry::new()));
    let err = mailer
        .deliver(DeliverRequest::new("order").data("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownDelivery(ref name) if name == "default"));

    assert!(mailer.message(Map::new()).is_ok());
    let mut options = Map::new();
    options.insert("cc".to_string(), json!(1));
    let err = mailer.message(options).unwrap_err();
    assert!(matches!(
        err,
        Error::Message(mailroom_mime::Error::InvalidAddress { field: "cc", .. })
    ));
}
