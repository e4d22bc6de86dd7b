//! Integration tests for message composition.
//!
//! These tests build messages the way a delivery pipeline does: from loose
//! JSON options and a shared registry, then finalize them.

use std::fs;
use std::sync::Arc;

use serde_json::json;

use mailroom_mime::{
    Addresses, AttachOptions, Error, FsAssets, Message, MessageOptions, Registry, StaticRequest,
};

fn registry_with_assets() -> (tempfile::TempDir, Arc<Registry>) {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("mails").join("_assets");
    fs::create_dir_all(&assets).unwrap();
    fs::write(assets.join("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
    fs::write(assets.join("terms.pdf"), b"%PDF-1.4").unwrap();

    let registry = Registry::new()
        .with_assets(FsAssets::new(dir.path()))
        .with_request(StaticRequest::new("shop.example.com").secure());
    (dir, Arc::new(registry))
}

#[test]
fn test_compose_from_json() {
    let (_dir, registry) = registry_with_assets();
    let options = MessageOptions::from_value(json!({
        "subject": "Your order",
        "from": {"Shop": "shop@example.com", "Billing": "billing@example.com"},
        "to": "customer@example.org",
        "attach": ["terms.pdf", {"data": "id,total\n1,10", "filename": "order.csv"}]
    }))
    .unwrap();
    let mut message = Message::from_options(options, registry).unwrap();

    assert_eq!(message.base_url(), Some("https://shop.example.com"));
    assert_eq!(message.attachments().len(), 2);
    assert_eq!(message.attachments()[0].content_type, "application/pdf");
    assert_eq!(message.attachments()[0].filename.as_deref(), Some("terms.pdf"));
    assert_eq!(message.attachments()[1].content_type, "text/csv");

    let cid = message.embed(Some("logo.png"), AttachOptions::new()).unwrap();
    assert!(cid.ends_with("@shop.example.com"), "{cid}");
    message.push_body("html", format!("<img src=\"cid:{cid}\">"));
    message.push_body("text", "Thanks for your order.");

    message.ensure_standard_compliance().unwrap();
    assert!(message.date.is_some());
    assert_eq!(
        message.sender,
        Some(Addresses::named([("Shop", "shop@example.com")]))
    );

    let types = message.types().unwrap();
    assert_eq!(types.get("html").map(String::as_str), Some("text/html"));
    assert_eq!(message.attachments()[2].disposition, "inline");
}

#[test]
fn test_missing_asset_is_reported() {
    let (_dir, registry) = registry_with_assets();
    let mut message = Message::new(registry);
    let err = message
        .attach(Some("missing.png"), AttachOptions::new())
        .unwrap_err();
    assert!(matches!(err, Error::AssetNotFound(ref path) if path == "missing.png"));
    assert!(message.attachments().is_empty());
}

#[test]
fn test_invalid_from_type_from_json() {
    let err = MessageOptions::from_value(json!({"from": 42})).unwrap_err();
    assert!(err.is_compliance());
    assert_eq!(
        err.to_string(),
        "Message `from` field should be a string or a mapping, `integer` given"
    );
}

#[test]
fn test_missing_from_then_fixed() {
    let mut message = Message::new(Arc::new(Registry::new()));
    message.to = Some("someone@example.org".into());
    assert!(matches!(
        message.ensure_standard_compliance(),
        Err(Error::MissingFrom)
    ));

    message.from = Some("a@b".into());
    message.ensure_standard_compliance().unwrap();
    assert!(message.date.is_some());
}
