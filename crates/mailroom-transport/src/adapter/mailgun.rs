//! Mailgun adapter: HTTP API delivery.
//!
//! Messages are serialized the same way the simple adapter does it and
//! posted as a complete MIME document to the `messages.mime` endpoint, so
//! embedded Content-IDs survive unchanged.

use crate::adapter::simple::Generator;
use crate::error::{Error, Result};
use crate::transport::{Options, Receipt, Transport, format_address};
use async_trait::async_trait;
use indexmap::IndexMap;
use mailroom_mime::Message;
use reqwest::Client;
use reqwest::multipart::Form;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Default API endpoint.
pub const DEFAULT_API: &str = "https://api.mailgun.net/v2";

/// User name sent when the key carries no `user:` part.
pub const DEFAULT_USER: &str = "api";

/// A yes/no API switch.
///
/// Booleans render as `yes`/`no`, strings (such as `htmlonly`) verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    /// On or off.
    Bool(bool),
    /// Any other value the API accepts.
    Text(String),
}

impl Flag {
    /// Renders the flag as a form value.
    #[must_use]
    pub fn as_param(&self) -> String {
        match self {
            Self::Bool(true) => "yes".to_string(),
            Self::Bool(false) => "no".to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Extra Mailgun parameters.
///
/// Sent as `o:{name}` (tags as `o:tag[1]`, `o:tag[2]`, ...) and variables as
/// `v:{name}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailgunOptions {
    /// Message tags.
    pub tag: Option<Vec<String>>,
    /// Campaign id.
    pub campaign: Option<String>,
    /// DKIM signing.
    pub dkim: Option<Flag>,
    /// Scheduled delivery time.
    pub deliverytime: Option<String>,
    /// Test mode.
    pub testmode: Option<Flag>,
    /// Tracking.
    pub tracking: Option<Flag>,
    /// Click tracking.
    #[serde(rename = "tracking-clicks", alias = "tracking_clicks")]
    pub tracking_clicks: Option<Flag>,
    /// Open tracking.
    #[serde(rename = "tracking-opens", alias = "tracking_opens")]
    pub tracking_opens: Option<Flag>,
    /// Custom variables. Strings are sent verbatim, other values as JSON.
    pub variables: IndexMap<String, Value>,
}

impl MailgunOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tags.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the campaign.
    #[must_use]
    pub fn campaign(mut self, campaign: impl Into<String>) -> Self {
        self.campaign = Some(campaign.into());
        self
    }

    /// Enables or disables test mode.
    #[must_use]
    pub fn testmode(mut self, testmode: impl Into<Flag>) -> Self {
        self.testmode = Some(testmode.into());
        self
    }

    /// Adds a custom variable.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Merges two option sets; values in `self` win.
    #[must_use]
    pub fn or(&self, fallback: &Self) -> Self {
        let mut variables = fallback.variables.clone();
        variables.extend(self.variables.clone());
        Self {
            tag: self.tag.clone().or_else(|| fallback.tag.clone()),
            campaign: self.campaign.clone().or_else(|| fallback.campaign.clone()),
            dkim: self.dkim.clone().or_else(|| fallback.dkim.clone()),
            deliverytime: self
                .deliverytime
                .clone()
                .or_else(|| fallback.deliverytime.clone()),
            testmode: self.testmode.clone().or_else(|| fallback.testmode.clone()),
            tracking: self.tracking.clone().or_else(|| fallback.tracking.clone()),
            tracking_clicks: self
                .tracking_clicks
                .clone()
                .or_else(|| fallback.tracking_clicks.clone()),
            tracking_opens: self
                .tracking_opens
                .clone()
                .or_else(|| fallback.tracking_opens.clone()),
            variables,
        }
    }

    /// Renders the options as form parameters, in API order.
    #[must_use]
    pub fn parameters(&self) -> Vec<(String, String)> {
        let mut parameters = Vec::new();
        if let Some(tags) = &self.tag {
            for (idx, tag) in tags.iter().enumerate() {
                parameters.push((format!("o:tag[{}]", idx + 1), tag.clone()));
            }
        }
        let text = [
            ("campaign", self.campaign.clone()),
            ("dkim", self.dkim.as_ref().map(Flag::as_param)),
            ("deliverytime", self.deliverytime.clone()),
            ("testmode", self.testmode.as_ref().map(Flag::as_param)),
            ("tracking", self.tracking.as_ref().map(Flag::as_param)),
            ("tracking-clicks", self.tracking_clicks.as_ref().map(Flag::as_param)),
            ("tracking-opens", self.tracking_opens.as_ref().map(Flag::as_param)),
        ];
        for (name, value) in text {
            if let Some(value) = value {
                parameters.push((format!("o:{name}"), value));
            }
        }
        for (name, value) in &self.variables {
            let value = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            parameters.push((format!("v:{name}"), value));
        }
        parameters
    }
}

/// Configuration for the Mailgun adapter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailgunConfig {
    /// API endpoint, without trailing slash.
    #[serde(default = "default_api")]
    pub api: String,
    /// Sending domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Complete endpoint URL, replacing `api` and `domain`.
    #[serde(default)]
    pub url: Option<String>,
    /// API key, either `key` or `user:key`.
    #[serde(default)]
    pub key: Option<String>,
    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Default extra parameters.
    #[serde(flatten)]
    pub options: MailgunOptions,
}

fn default_api() -> String {
    DEFAULT_API.to_string()
}

const fn default_timeout() -> u64 {
    30
}

impl Default for MailgunConfig {
    fn default() -> Self {
        Self {
            api: default_api(),
            domain: None,
            url: None,
            key: None,
            timeout_secs: default_timeout(),
            options: MailgunOptions::default(),
        }
    }
}

impl MailgunConfig {
    /// Creates a configuration for a domain and key.
    #[must_use]
    pub fn new(domain: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Builds the endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `Config` if neither `url` nor `domain` is set, or if `api`
    /// or `domain` carry stray slashes.
    pub fn endpoint(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let Some(domain) = &self.domain else {
            return Err(Error::config(
                "No `domain` (nor `url`) configured for `Mailgun` transport adapter",
            ));
        };
        if self.api.ends_with('/') {
            return Err(Error::config("API endpoint should not end with '/'"));
        }
        if domain.starts_with('/') {
            return Err(Error::config("Domain should not start with '/'"));
        }
        if domain.ends_with('/') {
            return Err(Error::config("Domain should not end with '/'"));
        }
        Ok(format!("{}/{domain}/messages.mime", self.api))
    }

    /// Splits the key into basic auth credentials.
    ///
    /// # Errors
    ///
    /// Returns `Config` if no key is set.
    pub fn credentials(&self) -> Result<(String, String)> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| Error::config("No `key` configured for `Mailgun` transport adapter"))?;
        Ok(match key.split_once(':') {
            Some((user, password)) => (user.to_string(), password.to_string()),
            None => (DEFAULT_USER.to_string(), key.to_string()),
        })
    }
}

/// A prepared API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailgunRequest {
    /// Endpoint URL.
    pub url: String,
    /// Basic auth user.
    pub user: String,
    /// Basic auth password.
    pub password: String,
    /// Form parameters, in order.
    pub parameters: Vec<(String, String)>,
}

impl MailgunRequest {
    /// Returns the first parameter with the given name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Sends messages through the Mailgun HTTP API.
#[derive(Debug, Clone)]
pub struct Mailgun {
    config: MailgunConfig,
    generator: Generator,
    http_client: Client,
}

impl Mailgun {
    /// Creates an adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: MailgunConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(config, http_client))
    }

    /// Creates an adapter using the given HTTP client, for the API call and
    /// for fetching remote attachments.
    #[must_use]
    pub fn with_client(config: MailgunConfig, http_client: Client) -> Self {
        Self {
            config,
            generator: Generator::new(http_client.clone()),
            http_client,
        }
    }

    /// Translates a message and options into an API call.
    ///
    /// Parameters are `to`, the full MIME document as `message`, the extra
    /// `o:` options and the `v:` variables. Per-call options take precedence
    /// over configured ones.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an unusable endpoint or missing key, and any
    /// error of serializing the message.
    pub async fn parameters(&self, message: &Message, options: &Options) -> Result<MailgunRequest> {
        let url = self.config.endpoint()?;
        let (user, password) = self.config.credentials()?;

        let envelope = self.generator.generate(message).await?;
        let mut parameters = vec![
            ("to".to_string(), format_address(message.to.as_ref())),
            ("message".to_string(), envelope.to_mime()),
        ];
        parameters.extend(options.mailgun.or(&self.config.options).parameters());

        Ok(MailgunRequest {
            url,
            user,
            password,
            parameters,
        })
    }
}

#[async_trait]
impl Transport for Mailgun {
    fn name(&self) -> &'static str {
        "mailgun"
    }

    async fn deliver(&self, message: &Message, options: &Options) -> Result<Receipt> {
        let request = self.parameters(message, options).await?;
        tracing::debug!(url = %request.url, params = request.parameters.len(), "Posting message to Mailgun");

        let form = request
            .parameters
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));

        let response = self
            .http_client
            .post(&request.url)
            .basic_auth(request.user, Some(request.password))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::info!(status = status.as_u16(), "Mailgun responded");

        if !status.is_success() {
            return Err(Error::DeliveryFailed {
                status: status.as_u16(),
                body,
            });
        }
        Ok(Receipt::Api {
            status: status.as_u16(),
            body,
        })
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
    use mailroom_mime::{AttachOptions, Registry};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn url_config() -> MailgunConfig {
        MailgunConfig {
            url: Some("explicit URL".to_string()),
            key: Some("secret".to_string()),
            ..MailgunConfig::default()
        }
    }

    fn message() -> Message {
        let mut message = Message::new(Arc::new(Registry::new()));
        message.from = Some("valid@address".into());
        message.date = Some(1_700_000_000);
        message
    }

    async fn parameters(config: MailgunConfig, options: &Options) -> Result<MailgunRequest> {
        Mailgun::with_client(config, Client::new())
            .parameters(&message(), options)
            .await
    }

    #[tokio::test]
    async fn test_parameters_to() {
        let mut message = message();
        message.to = Some("foo@bar".into());
        let mailgun = Mailgun::with_client(url_config(), Client::new());
        let request = mailgun.parameters(&message, &Options::new()).await.unwrap();
        assert_eq!(request.parameter("to"), Some("foo@bar"));
        assert_eq!(request.parameters[0].0, "to");
        assert_eq!(request.parameters[1].0, "message");
    }

    #[tokio::test]
    async fn test_parameters_message() {
        let mut message = message();
        message.push_body("html", "foo html bar");
        message.push_body("text", "foo text bar");
        let mailgun = Mailgun::with_client(url_config(), Client::new());
        let request = mailgun.parameters(&message, &Options::new()).await.unwrap();

        let document = request.parameter("message").unwrap();
        assert!(document.contains("MIME-Version: 1.0"));
        assert!(document.contains("foo html bar"));
        assert!(document.contains("foo text bar"));
        assert!(document.contains("\r\n\r\nThis is a multi-part message"));
    }

    #[tokio::test]
    async fn test_parameters_url_explicit() {
        let request = parameters(url_config(), &Options::new()).await.unwrap();
        assert_eq!(request.url, "explicit URL");
    }

    #[tokio::test]
    async fn test_parameters_url_from_api_and_domain() {
        let config = MailgunConfig {
            api: "http://foo.bar".to_string(),
            ..MailgunConfig::new("baz.qux", "secret")
        };
        let request = parameters(config, &Options::new()).await.unwrap();
        assert_eq!(request.url, "http://foo.bar/baz.qux/messages.mime");

        let request = parameters(MailgunConfig::new("baz.qux", "secret"), &Options::new())
            .await
            .unwrap();
        assert_eq!(request.url, "https://api.mailgun.net/v2/baz.qux/messages.mime");
    }

    #[tokio::test]
    async fn test_parameters_no_domain_nor_url() {
        let err = parameters(MailgunConfig::default(), &Options::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ref message)
                if message == "No `domain` (nor `url`) configured for `Mailgun` transport adapter"
        ));
    }

    #[tokio::test]
    async fn test_parameters_slashes() {
        let config = MailgunConfig {
            api: "http://foo.bar/".to_string(),
            ..MailgunConfig::new("foo.bar", "secret")
        };
        let err = parameters(config, &Options::new()).await.unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m == "API endpoint should not end with '/'"));

        let err = parameters(MailgunConfig::new("/foo.bar", "secret"), &Options::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m == "Domain should not start with '/'"));

        let err = parameters(MailgunConfig::new("foo.bar/", "secret"), &Options::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m == "Domain should not end with '/'"));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let config = MailgunConfig {
            key: None,
            ..url_config()
        };
        let err = parameters(config, &Options::new()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_credentials() {
        assert_eq!(
            url_config().credentials().unwrap(),
            ("api".to_string(), "secret".to_string())
        );
        let config = MailgunConfig::new("foo.bar", "user:pw:x");
        assert_eq!(
            config.credentials().unwrap(),
            ("user".to_string(), "pw:x".to_string())
        );
    }

    #[tokio::test]
    async fn test_extra_parameters() {
        let options: Options = serde_json::from_value(serde_json::json!({
            "campaign": "test_campaign",
            "dkim": true,
            "deliverytime": "deliverytime",
            "testmode": true,
            "tracking": false,
            "tracking-clicks": "htmlonly",
            "tracking-opens": true,
            "tag": ["tag1", "tag2"]
        }))
        .unwrap();
        let request = parameters(url_config(), &options).await.unwrap();

        let extras: Vec<_> = request.parameters[2..]
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            extras,
            [
                ("o:tag[1]", "tag1"),
                ("o:tag[2]", "tag2"),
                ("o:campaign", "test_campaign"),
                ("o:dkim", "yes"),
                ("o:deliverytime", "deliverytime"),
                ("o:testmode", "yes"),
                ("o:tracking", "no"),
                ("o:tracking-clicks", "htmlonly"),
                ("o:tracking-opens", "yes"),
            ]
        );
    }

    #[tokio::test]
    async fn test_variables() {
        let options = Options::new().mailgun(
            MailgunOptions::new()
                .variable("foo", "bar")
                .variable("baz", "qux"),
        );
        let request = parameters(url_config(), &options).await.unwrap();
        assert_eq!(request.parameter("v:foo"), Some("bar"));
        assert_eq!(request.parameter("v:baz"), Some("qux"));
    }

    #[tokio::test]
    async fn test_structured_variables() {
        let options: Options = serde_json::from_value(serde_json::json!({
            "variables": {
                "user_id": 42,
                "vip": true,
                "order": {"id": "A-1", "items": [1, 2]},
                "name": "Ada"
            }
        }))
        .unwrap();
        let request = parameters(url_config(), &options).await.unwrap();
        assert_eq!(request.parameter("v:user_id"), Some("42"));
        assert_eq!(request.parameter("v:vip"), Some("true"));
        assert_eq!(request.parameter("v:order"), Some(r#"{"id":"A-1","items":[1,2]}"#));
        assert_eq!(request.parameter("v:name"), Some("Ada"));
    }

    #[tokio::test]
    async fn test_call_options_override_config() {
        let config = MailgunConfig {
            options: MailgunOptions::new()
                .campaign("configured")
                .testmode(true)
                .variable("a", "1")
                .variable("b", "2"),
            ..url_config()
        };
        let options = Options::new().mailgun(
            MailgunOptions::new()
                .campaign("per-call")
                .variable("b", "3"),
        );
        let request = parameters(config, &options).await.unwrap();
        assert_eq!(request.parameter("o:campaign"), Some("per-call"));
        assert_eq!(request.parameter("o:testmode"), Some("yes"));
        assert_eq!(request.parameter("v:a"), Some("1"));
        assert_eq!(request.parameter("v:b"), Some("3"));
    }

    #[test]
    fn test_config_deserialize() {
        let config: MailgunConfig = serde_json::from_value(serde_json::json!({
            "domain": "my.domain",
            "key": "mysecretkey",
            "tag": ["welcome"]
        }))
        .unwrap();
        assert_eq!(config.api, DEFAULT_API);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.options.tag, Some(vec!["welcome".to_string()]));
        assert_eq!(
            config.endpoint().unwrap(),
            "https://api.mailgun.net/v2/my.domain/messages.mime"
        );
    }

    /// Answers one HTTP request and returns the raw request text.
    async fn respond_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/my.domain/messages.mime", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (url, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head.lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        });
        match length {
            Some(length) => body.len() >= length,
            None => body.ends_with("0\r\n\r\n"),
        }
    }

    fn local_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn test_deliver() {
        let (url, server) = respond_once("200 OK", r#"{"message":"Queued. Thank you."}"#).await;
        let config = MailgunConfig {
            url: Some(url),
            ..MailgunConfig::new("my.domain", "secret")
        };
        let mailgun = Mailgun::with_client(config, local_client());
        let mut message = message();
        message.to = Some("foo@bar".into());
        message.push_body("text", "hello");

        let options = Options::new().mailgun(MailgunOptions::new().tags(["welcome"]));
        let receipt = mailgun.deliver(&message, &options).await.unwrap();
        assert_eq!(
            receipt,
            Receipt::Api {
                status: 200,
                body: r#"{"message":"Queued. Thank you."}"#.to_string()
            }
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /my.domain/messages.mime HTTP/1.1\r\n"));
        assert!(request.to_ascii_lowercase().contains("authorization: basic yxbponnly3jlda=="));
        assert!(request.contains("multipart/form-data"));
        assert!(request.contains("name=\"to\"\r\n\r\nfoo@bar\r\n"));
        assert!(request.contains("name=\"o:tag[1]\"\r\n\r\nwelcome\r\n"));
        assert!(request.contains("name=\"message\""));
        assert!(request.contains("From: valid@address"));
    }

    #[tokio::test]
    async fn test_deliver_rejected() {
        let (url, server) = respond_once("401 Unauthorized", "Forbidden").await;
        let config = MailgunConfig {
            url: Some(url),
            ..MailgunConfig::new("my.domain", "wrong")
        };
        let mailgun = Mailgun::with_client(config, local_client());

        let err = mailgun.deliver(&message(), &Options::new()).await.unwrap_err();
        assert!(err.is_rejected());
        assert!(matches!(
            err,
            Error::DeliveryFailed { status: 401, ref body } if body == "Forbidden"
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_attachment_uses_client_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/slow.txt", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let mailgun = Mailgun::with_client(url_config(), client);
        let mut message = message();
        message.attach(Some(&url), AttachOptions::new()).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            mailgun.parameters(&message, &Options::new()),
        )
        .await;
        let err = result.unwrap().unwrap_err();
        assert!(matches!(err, Error::AttachmentRead { ref path, .. } if *path == url));
        server.abort();
    }
}
