use super::{sse, ModelEndpoint, ModelRequest};
use crate::error_code::ProviderErrorKind;
use crate::{BoxStream, Error, Result};
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Proxy;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::debug;

const MESSAGES_PATH: &str = "/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct HttpEndpointConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Whole-request timeout. Long, since the final writing stage can run for minutes.
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl HttpEndpointConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Model endpoint reached over HTTP with a Messages-style JSON body.
pub struct HttpModelEndpoint {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpModelEndpoint {
    pub fn new(cfg: HttpEndpointConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .connect_timeout(cfg.connect_timeout)
            .pool_max_idle_per_host(
                env::var("DOCGEN_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(8),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("DOCGEN_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build()?;
        Ok(Self {
            client,
            url: format!("{}{}", cfg.base_url.trim_end_matches('/'), MESSAGES_PATH),
            api_key: cfg.api_key,
        })
    }

    fn body(request: &ModelRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "top_k": request.top_k,
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn headers(&self, request_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        if let Ok(id) = HeaderValue::from_str(request_id) {
            headers.insert("x-request-id", id);
        }
        if let Some(key) = &self.api_key {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert("x-api-key", value);
            }
        }
        headers
    }

    async fn send(&self, request: &ModelRequest, stream: bool) -> Result<reqwest::Response> {
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(
            request_id = %request_id,
            model = %request.model,
            max_tokens = request.max_tokens,
            stream,
            "Sending model request"
        );

        let mut req = self
            .client
            .post(&self.url)
            .headers(self.headers(&request_id))
            .json(&Self::body(request, stream));
        if stream {
            req = req.header("accept", "text/event-stream");
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        Err(classify_http_error(status.as_u16(), &text))
    }
}

/// Map a non-2xx response into a provider error.
///
/// A provider `error.type` wins over the status code when present.
pub(crate) fn classify_http_error(status: u16, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/type"))
        .and_then(Value::as_str);
    let message = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body.trim()));

    let kind = code
        .and_then(ProviderErrorKind::from_provider_code)
        .unwrap_or_else(|| ProviderErrorKind::from_http_status(status));

    Error::Provider {
        kind,
        name: kind.name().to_string(),
        message,
        status: Some(status),
    }
}

/// Concatenate the text blocks of a Messages response body.
pub(crate) fn response_text(body: &Value) -> Result<String> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            Error::provider(
                ProviderErrorKind::Unknown,
                "response has no content blocks",
            )
        })?;
    Ok(blocks
        .iter()
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(""))
}

#[async_trait::async_trait]
impl ModelEndpoint for HttpModelEndpoint {
    async fn invoke(&self, request: &ModelRequest) -> Result<String> {
        let resp = self.send(request, false).await?;
        let body: Value = resp.json().await?;
        response_text(&body)
    }

    async fn stream(&self, request: &ModelRequest) -> Result<BoxStream<'static, String>> {
        let resp = self.send(request, true).await?;
        let bytes = resp.bytes_stream().map_err(Error::from);
        Ok(sse::decode_text_deltas(Box::pin(bytes)))
    }

    fn name(&self) -> &str {
        "http"
    }
}
