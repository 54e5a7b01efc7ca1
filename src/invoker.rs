use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use thiserror::Error;

pub const DEFAULT_SESSION_HEADER: &str = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id";

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request failed ({status}) {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}

/// A hosted agent that answers one prompt within a conversation session.
///
/// A single handle is shared by every simulated user, so implementations must
/// tolerate concurrent calls.
#[async_trait]
pub trait Invoke: Send + Sync {
    async fn invoke(&self, prompt: &str, session_id: &str) -> Result<String, InvokeError>;
}

#[derive(Clone, Debug)]
pub struct HttpInvokerConfig {
    pub endpoint: Url,
    pub session_header: HeaderName,
    pub headers: HeaderMap,
    pub request_timeout: Duration,
}

impl HttpInvokerConfig {
    pub fn try_new(endpoint: impl AsRef<str>, token: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint.as_ref())
            .with_context(|| format!("invalid endpoint URL: {}", endpoint.as_ref()))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            if !token.is_empty() {
                let auth_value = format!("Bearer {}", token);
                let header_value = HeaderValue::from_str(&auth_value)
                    .context("failed to build Authorization header from token")?;
                headers.insert(AUTHORIZATION, header_value);
            }
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            endpoint,
            session_header: HeaderName::from_static("x-amzn-bedrock-agentcore-runtime-session-id"),
            headers,
            request_timeout: Duration::from_secs(120),
        })
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        if !request_timeout.is_zero() {
            self.request_timeout = request_timeout;
        }
        self
    }

    pub fn with_session_header(mut self, name: &str) -> Result<Self> {
        self.session_header = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid session header name: {}", name))?;
        Ok(self)
    }
}

/// Calls an agent runtime over HTTP with a `{"prompt": ...}` JSON body.
#[derive(Clone, Debug)]
pub struct HttpInvoker {
    client: Client,
    config: HttpInvokerConfig,
}

impl HttpInvoker {
    pub fn new(config: HttpInvokerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Invoke for HttpInvoker {
    async fn invoke(&self, prompt: &str, session_id: &str) -> Result<String, InvokeError> {
        let session_value = HeaderValue::from_str(session_id)
            .map_err(|_| InvokeError::Rejected(format!("invalid session id: {}", session_id)))?;

        let response = self
            .client
            .post(self.config.endpoint.clone())
            .headers(self.config.headers.clone())
            .header(self.config.session_header.clone(), session_value)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(InvokeError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let payload: Value = serde_json::from_slice(&bytes)?;
        Ok(extract_text(&payload))
    }
}

/// Concatenates the `text` items of `response.content`. A plain string
/// `response` is returned as is; any other shape yields an empty string.
pub fn extract_text(payload: &Value) -> String {
    match payload.get("response") {
        Some(Value::String(text)) => text.clone(),
        Some(response) => response
            .get("content")
            .and_then(|content| content.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(|text| text.as_str()))
                    .collect::<String>()
            })
            .unwrap_or_default(),
        None => String::new(),
    }
}
