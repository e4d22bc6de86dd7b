//! Integration tests delivering composed messages through the adapters.

use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mailroom_mime::{AttachOptions, FsAssets, Message, MessageOptions, Registry, StaticRequest};
use mailroom_transport::{
    Debug, DebugConfig, Envelope, LogTarget, MailCommand, Options, Receipt, Result, Simple,
    Transport,
};

#[derive(Debug, Clone, Default)]
struct Outbox {
    documents: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MailCommand for Outbox {
    async fn send(&self, envelope: &Envelope) -> Result<bool> {
        self.documents.lock().unwrap().push(envelope.to_mime());
        Ok(true)
    }
}

fn newsletter(dir: &std::path::Path) -> Message {
    let assets = dir.join("mails").join("_assets");
    fs::create_dir_all(&assets).unwrap();
    fs::write(assets.join("logo.png"), [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]).unwrap();

    let registry = Registry::new()
        .with_assets(FsAssets::new(dir))
        .with_request(StaticRequest::new("news.example.com"));
    let options = MessageOptions::new()
        .from("news@example.com")
        .to("reader@example.org")
        .subject("October issue");
    let mut message = Message::from_options(options, Arc::new(registry)).unwrap();

    let cid = message.embed(Some("logo.png"), AttachOptions::new()).unwrap();
    message.push_body("html", format!("<img src=\"cid:{cid}\"><p>News</p>"));
    message.push_body("text", "News");
    message.ensure_standard_compliance().unwrap();
    message
}

#[tokio::test]
async fn test_simple_delivers_embedded_image() {
    let dir = tempfile::tempdir().unwrap();
    let message = newsletter(dir.path());
    let cid = message.attachments()[0].id.clone().unwrap();
    assert!(cid.ends_with("@news.example.com"));

    let outbox = Outbox::default();
    let simple = Simple::with_command(outbox.clone());
    let receipt = simple.deliver(&message, &Options::new()).await.unwrap();
    assert!(receipt.is_success());

    let documents = outbox.documents.lock().unwrap();
    let document = &documents[0];
    let (head, body) = document.split_once("\r\n\r\n").unwrap();
    assert!(head.starts_with(
        "Subject: October issue\r\nFrom: news@example.com\r\nTo: reader@example.org\r\n"
    ));
    assert_eq!(head.matches("To: ").count(), 1);
    assert!(head.contains("\r\nContent-Type: multipart/alternative;boundary=\"MAILROOM_SIMPLE_"));
    assert!(body.contains("<img\nsrc=\"cid:"));
    assert!(body.contains(&format!("cid:{cid}")));
    assert!(body.contains(concat!(
        "Content-Type: image/png; name=\"logo.png\"\n",
        "Content-Disposition: inline; filename=\"logo.png\"\n"
    )));
    assert!(body.contains(&format!("Content-ID: <{cid}>\nContent-Transfer-Encoding: base64\n\n")));
}

#[tokio::test]
async fn test_debug_logs_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let message = newsletter(dir.path());
    let logs = dir.path().join("logs");
    fs::create_dir(&logs).unwrap();

    let debug = Debug::from_config(DebugConfig::new().log(LogTarget::Path(logs.clone())));
    let receipt = debug
        .deliver(&message, &Options::new().format("full"))
        .await
        .unwrap();
    assert_eq!(receipt, Receipt::Logged { complete: true });

    let entries: Vec<_> = fs::read_dir(&logs).unwrap().collect();
    assert_eq!(entries.len(), 1);
    let logged = fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
    assert!(logged.contains("] Mail sent to reader@example.org from news@example.com"));
    assert!(logged.contains("html message body:\n<img src=\"cid:"));
    assert!(logged.ends_with("<p>News</p>\n\n"));
}

#[tokio::test]
async fn test_adapters_behind_trait_objects() {
    let dir = tempfile::tempdir().unwrap();
    let message = newsletter(dir.path());
    let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));

    let transports: Vec<Box<dyn Transport>> = vec![
        Box::new(Simple::with_command(Outbox::default())),
        Box::new(Debug::from_config(
            DebugConfig::new().log(LogTarget::Stream(buffer.clone())),
        )),
    ];
    for transport in &transports {
        let receipt = transport
            .deliver(&message, &Options::new().format("short"))
            .await
            .unwrap();
        assert!(receipt.is_success(), "{} failed", transport.name());
    }
    let logged = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
    assert!(logged.ends_with("Sent to reader@example.org with subject `October issue`.\n"));
}
