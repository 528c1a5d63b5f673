//! Text generation behind a single seam.
//!
//! The pipeline only ever needs `generate(prompt) -> text`. The production
//! implementation talks to an OpenAI-compatible `/chat/completions` endpoint
//! (OpenAI itself, or Groq); tests substitute their own generators.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use url::Url;

use crate::config::Config;
use crate::{Error, Result};

/// Anything that turns a prompt into generated text
pub trait Generator {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Supported completion providers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum Provider {
    /// OpenAI chat completions
    #[default]
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
    /// Groq's OpenAI-compatible endpoint
    #[serde(rename = "groq")]
    #[value(name = "groq")]
    Groq,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
        }
    }

    /// Environment variable the API key is read from
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4",
            Provider::Groq => "llama-3.1-70b-versatile",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "groq" => Ok(Provider::Groq),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// API key that never shows up in logs or debug output
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read the key from `var`; unset or blank is an error
    pub fn from_env(var: &str) -> Result<Self> {
        Self::from_lookup(var, |name| std::env::var(name).ok())
    }

    /// Like `from_env`, with the environment lookup supplied by the caller
    pub fn from_lookup<F>(var: &str, lookup: F) -> Result<Self>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        match lookup(var) {
            Some(value) if !value.trim().is_empty() => Ok(Self(value.trim().to_string())),
            _ => Err(Error::MissingCredential(var.to_string())),
        }
    }

    /// Expose the key for the Authorization header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

/// Client for OpenAI-compatible chat completion APIs
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: ApiKey,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ChatCompletionsClient {
    /// Create a client for `{base_url}/chat/completions`
    pub fn new(base_url: &Url, api_key: ApiKey, model: impl Into<String>) -> Result<Self> {
        Self::with_http(reqwest::Client::new(), base_url, api_key, model)
    }

    /// Build a client from run configuration
    pub fn from_config(config: &Config, api_key: ApiKey) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        let mut client = Self::with_http(http, &config.base_url()?, api_key, config.model())?;
        client.temperature = config.temperature;
        client.max_tokens = config.max_tokens;
        Ok(client)
    }

    fn with_http(
        http: reqwest::Client,
        base_url: &Url,
        api_key: ApiKey,
        model: impl Into<String>,
    ) -> Result<Self> {
        let endpoint = Url::parse(&format!(
            "{}/chat/completions",
            base_url.as_str().trim_end_matches('/')
        ))
        .map_err(|e| Error::config(format!("Invalid base URL {}: {}", base_url, e)))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str) -> JsonValue {
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

impl Generator for ChatCompletionsClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        log::debug!(
            "POST {} (model {}, {} prompt chars)",
            self.endpoint,
            self.model,
            prompt.len()
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.expose())
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                message: format!(
                    "{} returned HTTP {}: {}",
                    self.endpoint,
                    status,
                    truncate(&body, 500)
                ),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            Error::provider(format!("Unexpected completion response: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::provider("Completion response has no message content"))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Exponential backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 disables retrying
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after every failed attempt
    pub multiplier: f64,
    /// Ceiling for a single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Retries the wrapped generator with exponential backoff
#[derive(Debug, Clone)]
pub struct Retrying<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G> Retrying<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

impl<G: Generator + Sync> Generator for Retrying<G> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt >= max_attempts || !e.is_retryable() => return Err(e),
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    log::warn!(
                        "Generation attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one HTTP response on a local port and hand back the raw request
    async fn stub_server(status: &'static str, body: &'static str) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
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
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        let url = Url::parse(&format!("http://{}/v1/", addr)).unwrap();
        (url, handle)
    }

    #[tokio::test]
    async fn test_chat_completion_success() {
        let (base_url, server) = stub_server(
            "200 OK",
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Feature: Pets"}}]}"#,
        )
        .await;

        let client = ChatCompletionsClient::new(&base_url, ApiKey::new("sk-test"), "gpt-4").unwrap();
        assert!(client.endpoint().as_str().ends_with("/v1/chat/completions"));

        let text = client.generate("write tests").await.unwrap();
        assert_eq!(text, "Feature: Pets");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions HTTP/1.1"));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer sk-test"));
        let body: JsonValue =
            serde_json::from_str(&request[request.find("\r\n\r\n").unwrap() + 4..]).unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "write tests");
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_chat_completion_http_error() {
        let (base_url, server) =
            stub_server("429 Too Many Requests", r#"{"error":{"message":"slow down"}}"#).await;

        let client = ChatCompletionsClient::new(&base_url, ApiKey::new("k"), "m").unwrap();
        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 429, .. }));
        assert!(err.is_retryable());
        let message = err.to_string();
        assert!(message.contains("429"));
        assert!(message.contains("slow down"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_chat_completion_without_content() {
        let (base_url, server) = stub_server("200 OK", r#"{"choices":[]}"#).await;

        let client = ChatCompletionsClient::new(&base_url, ApiKey::new("k"), "m").unwrap();
        let err = client.generate("p").await.unwrap_err();
        assert!(err.to_string().contains("no message content"));
        server.await.unwrap();
    }

    #[test]
    fn test_request_body_includes_limits_from_config() {
        let config = Config {
            max_tokens: Some(512),
            temperature: 0.0,
            ..Config::default()
        };
        let client = ChatCompletionsClient::from_config(&config, ApiKey::new("k")).unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
        let body = client.request_body("hi");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn test_api_key_lookup() {
        let key = ApiKey::from_lookup("GROQ_API_KEY", |_| Some(" gsk-123 ".into())).unwrap();
        assert_eq!(key.expose(), "gsk-123");

        let missing = ApiKey::from_lookup("GROQ_API_KEY", |_| None).unwrap_err();
        assert!(matches!(missing, Error::MissingCredential(ref v) if v == "GROQ_API_KEY"));

        let blank = ApiKey::from_lookup("GROQ_API_KEY", |_| Some("   ".into()));
        assert!(blank.is_err());
    }

    #[test]
    fn test_api_key_is_redacted() {
        let key = ApiKey::new("sk-secret");
        assert_eq!(format!("{:?}", key), "***REDACTED***");
        assert_eq!(key.to_string(), "***REDACTED***");
        let client =
            ChatCompletionsClient::new(&Url::parse("http://localhost/v1").unwrap(), key, "m").unwrap();
        assert!(!format!("{:?}", client).contains("sk-secret"));
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!("Groq".parse::<Provider>().unwrap(), Provider::Groq);
        assert!("anthropic".parse::<Provider>().is_err());
        assert_eq!(Provider::Groq.to_string(), "groq");
    }

    #[test]
    fn test_delay_after_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            multiplier: 3.0,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(300));
        assert_eq!(policy.delay_after(3), Duration::from_millis(900));
        assert_eq!(policy.delay_after(4), Duration::from_millis(1_000));
    }

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
        status: Option<u16>,
    }

    impl Generator for Flaky {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(match self.status {
                    Some(status) => Error::Status {
                        status,
                        message: format!("HTTP {}", status),
                    },
                    None => Error::provider("boom"),
                });
            }
            Ok(format!("ok: {}", prompt))
        }
    }

    fn flaky(failures: u32) -> Flaky {
        Flaky {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            status: None,
        }
    }

    fn failing_with(status: u16, failures: u32) -> Flaky {
        Flaky {
            status: Some(status),
            ..flaky(failures)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_retrying_recovers() {
        let retrying = Retrying::new(flaky(2), fast_policy(3));
        assert_eq!(retrying.generate("x").await.unwrap(), "ok: x");
        assert_eq!(retrying.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_gives_up_with_last_error() {
        let retrying = Retrying::new(flaky(10), fast_policy(3));
        let err = retrying.generate("x").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(retrying.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_policy_none_makes_one_attempt() {
        let retrying = Retrying::new(flaky(1), RetryPolicy::none());
        assert!(retrying.generate("x").await.is_err());
        assert_eq!(retrying.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrying_stops_on_client_error() {
        let retrying = Retrying::new(failing_with(401, 10), fast_policy(5));
        let err = retrying.generate("x").await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 401, .. }));
        assert_eq!(retrying.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrying_retries_rate_limits_and_server_errors() {
        let rate_limited = Retrying::new(failing_with(429, 2), fast_policy(3));
        assert_eq!(rate_limited.generate("x").await.unwrap(), "ok: x");
        assert_eq!(rate_limited.inner().calls.load(Ordering::SeqCst), 3);

        let unavailable = Retrying::new(failing_with(503, 1), fast_policy(3));
        assert_eq!(unavailable.generate("y").await.unwrap(), "ok: y");
        assert_eq!(unavailable.inner().calls.load(Ordering::SeqCst), 2);
    }
}
