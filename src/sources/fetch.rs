//! Retrying HTTP fetcher shared by every API client.
//!
//! Network-level failures (timeouts, refused or reset connections) are retried
//! with a fixed delay. HTTP statuses are never retried: 404 maps to
//! [`FetchError::NotFound`], everything else non-2xx to [`FetchError::Status`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::Credentials;
use crate::error::FetchError;
use crate::utils::json_repair::repair_json;
use crate::utils::xml::xml_to_value;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 10;
pub(crate) const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    Raw,
    #[default]
    Json,
    Xml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub credentials: Option<Credentials>,
    pub mode: ParseMode,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            credentials: None,
            mode: ParseMode::default(),
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body.into()),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn basic_auth(mut self, credentials: Option<&Credentials>) -> Self {
        self.credentials = credentials.cloned();
        self
    }

    /// URL with the query string attached, for logs and error messages.
    pub fn display_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        reqwest::Url::parse_with_params(&self.url, &self.query)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| self.url.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl Payload {
    pub fn into_json(self, url: &str) -> Result<Value, FetchError> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Text(_) => Err(FetchError::UnexpectedPayload {
                url: url.to_string(),
                message: "expected a structured document, got raw text".into(),
            }),
        }
    }

    pub fn into_text(self, url: &str) -> Result<String, FetchError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Json(_) => Err(FetchError::UnexpectedPayload {
                url: url.to_string(),
                message: "expected raw text, got a parsed document".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Payload, FetchError>;
}

enum AttemptError {
    Transport(reqwest_middleware::Error),
    Fatal(FetchError),
}

pub struct RetryingFetcher {
    client: ClientWithMiddleware,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(client: ClientWithMiddleware, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    fn build(&self, request: &FetchRequest) -> reqwest_middleware::RequestBuilder {
        let mut req = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        }
        .timeout(self.policy.timeout);

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(credentials) = &request.credentials {
            req = req.basic_auth(&credentials.username, credentials.password.as_deref());
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }
        req
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<(StatusCode, Vec<u8>), AttemptError> {
        let resp = self
            .build(request)
            .send()
            .await
            .map_err(AttemptError::Transport)?;
        let status = resp.status();
        match super::read_limited_body(resp, super::DEFAULT_MAX_BODY_BYTES).await {
            Ok(Some(bytes)) => Ok((status, bytes)),
            Ok(None) => Err(AttemptError::Fatal(FetchError::BodyTooLarge {
                url: request.display_url(),
                limit: super::DEFAULT_MAX_BODY_BYTES,
            })),
            Err(err) => Err(AttemptError::Transport(err.into())),
        }
    }
}

fn is_transient(err: &reqwest_middleware::Error) -> bool {
    match err {
        reqwest_middleware::Error::Reqwest(err) => {
            err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
        }
        reqwest_middleware::Error::Middleware(_) => false,
    }
}

#[async_trait]
impl Fetch for RetryingFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Payload, FetchError> {
        let url = request.display_url();
        let total_attempts = self.policy.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        let (status, bytes) = loop {
            attempt += 1;
            debug!(url = %url, attempt, "Fetching");
            match self.attempt(request).await {
                Ok(done) => break done,
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Transport(err))
                    if is_transient(&err) && attempt < total_attempts =>
                {
                    warn!(
                        url = %url,
                        attempt,
                        max_attempts = total_attempts,
                        error = %err,
                        "Network error; retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(AttemptError::Transport(source)) if is_transient(&source) => {
                    error!(url = %url, attempts = attempt, error = %source, "Giving up after network errors");
                    return Err(FetchError::Transient {
                        url,
                        attempts: attempt,
                        source,
                    });
                }
                Err(AttemptError::Transport(source)) => {
                    error!(url = %url, error = %source, "Request failed");
                    return Err(FetchError::Request { url, source });
                }
            }
        };

        if status == StatusCode::NOT_FOUND {
            debug!(url = %url, "Not found");
            return Err(FetchError::NotFound { url });
        }
        if !status.is_success() {
            let excerpt = super::body_excerpt(&bytes);
            error!(url = %url, status = %status, body = %excerpt, "HTTP error");
            return Err(FetchError::Status {
                url,
                status,
                excerpt,
            });
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            warn!(url = %url, "Empty response body");
            return Err(FetchError::Empty { url });
        }

        decode(request.mode, &url, bytes)
    }
}

fn decode(mode: ParseMode, url: &str, bytes: Vec<u8>) -> Result<Payload, FetchError> {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    };

    match mode {
        ParseMode::Raw => Ok(Payload::Text(text)),
        ParseMode::Json => parse_json(url, &text).map(Payload::Json),
        ParseMode::Xml => match xml_to_value(&text) {
            Ok(value) => Ok(Payload::Json(value)),
            Err(err) => {
                warn!(url = %url, error = %err, "Malformed XML; returning raw text");
                Ok(Payload::Text(text))
            }
        },
    }
}

fn parse_json(url: &str, text: &str) -> Result<Value, FetchError> {
    let source = match serde_json::from_str(text) {
        Ok(value) => return Ok(value),
        Err(source) => source,
    };
    let Some(repaired) = repair_json(text) else {
        error!(url = %url, error = %source, "Malformed JSON");
        return Err(FetchError::Decode {
            url: url.to_string(),
            source,
        });
    };

    debug!(url = %url, error = %source, "Malformed JSON; retrying parse after escape repair");
    serde_json::from_str(&repaired).map_err(|source| {
        error!(url = %url, error = %source, "Malformed JSON after repair");
        FetchError::Decode {
            url: url.to_string(),
            source,
        }
    })
}
