//! HTTP plumbing shared by every tool: URL resolution for Graph and ARM, bearer auth from
//! the token cache, retries with backoff, and `nextLink` pagination.

use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::{Endpoints, GraphVersion, Settings};
use crate::error::{is_retryable_status, ToolError};
use crate::oauth::{AZURE_SCOPE, GRAPH_SCOPE};
use crate::token::TokenManager;

const MAX_BACKOFF: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("m365-mcp/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKind {
    Graph,
    Azure,
}

impl ApiKind {
    pub fn scope(&self) -> &'static str {
        match self {
            ApiKind::Graph => GRAPH_SCOPE,
            ApiKind::Azure => AZURE_SCOPE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(0),
        }
    }

    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// `base * 2^attempt`, capped; an upstream `Retry-After` wins when present.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(wait) = retry_after {
            return wait.min(MAX_BACKOFF);
        }
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Json(Value),
    Bytes { content_type: String, data: Vec<u8> },
}

/// A single upstream call. `path` is relative to the API family's base URL, or an
/// absolute continuation link previously returned by that API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub kind: ApiKind,
    pub method: Method,
    pub path: String,
    pub graph_version: Option<GraphVersion>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    payload: Option<Payload>,
    pub retry: RetryPolicy,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn graph(method: Method, path: impl Into<String>) -> Self {
        Self::new(ApiKind::Graph, method, path)
    }

    pub fn azure(method: Method, path: impl Into<String>) -> Self {
        Self::new(ApiKind::Azure, method, path)
    }

    pub fn new(kind: ApiKind, method: Method, path: impl Into<String>) -> Self {
        Self {
            kind,
            method,
            path: path.into(),
            graph_version: None,
            query: Vec::new(),
            headers: Vec::new(),
            payload: None,
            retry: RetryPolicy::none(),
            timeout: None,
        }
    }

    pub fn beta(self) -> Self {
        self.version(GraphVersion::Beta)
    }

    pub fn version(mut self, version: GraphVersion) -> Self {
        self.graph_version = Some(version);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(key, v.to_string()),
            None => self,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.payload = Some(Payload::Json(body));
        self
    }

    pub fn bytes(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.payload = Some(Payload::Bytes {
            content_type: content_type.into(),
            data,
        });
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.payload {
            Some(Payload::Json(v)) => Some(v),
            _ => None,
        }
    }

    fn follow(&self, link: &str) -> Self {
        Self {
            kind: self.kind,
            method: Method::GET,
            path: link.to_string(),
            graph_version: self.graph_version,
            query: Vec::new(),
            headers: self.headers.clone(),
            payload: None,
            retry: self.retry,
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub text: String,
}

impl ApiResponse {
    /// `@odata.nextLink` for Graph, `nextLink` for ARM.
    pub fn next_link(&self) -> Option<&str> {
        next_link(&self.body)
    }
}

pub fn next_link(body: &Value) -> Option<&str> {
    body.get("@odata.nextLink")
        .or_else(|| body.get("nextLink"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

/// Result of following continuation links.
#[derive(Debug, Clone)]
pub struct CollectedPages {
    pub items: Vec<Value>,
    pub pages: usize,
    pub truncated_at: Option<String>,
}

pub struct GraphClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    endpoints: Endpoints,
    default_version: GraphVersion,
}

impl GraphClient {
    pub fn new(settings: &Settings) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ToolError::Internal(format!("http client: {}", e)))?;
        let tokens = Arc::new(TokenManager::new(
            http.clone(),
            settings.endpoints.authority_host.clone(),
            settings.credentials.clone(),
        ));
        Ok(Self {
            http,
            tokens,
            endpoints: settings.endpoints.clone(),
            default_version: settings.graph_version,
        })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn base_url(&self, kind: ApiKind) -> &str {
        match kind {
            ApiKind::Graph => &self.endpoints.graph_base,
            ApiKind::Azure => &self.endpoints.azure_base,
        }
    }

    /// Resolve the absolute URL for a request. Absolute links are only accepted when
    /// they point back at the configured API host, so tokens never leave it.
    pub fn url_for(&self, req: &ApiRequest) -> Result<String, ToolError> {
        let base = self.base_url(req.kind).trim_end_matches('/');
        if req.path.starts_with("http://") || req.path.starts_with("https://") {
            if req.path.starts_with(&format!("{}/", base)) {
                return Ok(req.path.clone());
            }
            return Err(ToolError::invalid(format!(
                "absolute URL must target {}, got {}",
                base, req.path
            )));
        }
        let path = if req.path.starts_with('/') {
            req.path.clone()
        } else {
            format!("/{}", req.path)
        };
        Ok(match req.kind {
            ApiKind::Graph => {
                let version = req.graph_version.unwrap_or(self.default_version);
                format!("{}/{}{}", base, version.as_str(), path)
            }
            ApiKind::Azure => format!("{}{}", base, path),
        })
    }

    /// Issue a request, retrying transient failures according to its policy.
    pub async fn execute(&self, req: &ApiRequest) -> Result<ApiResponse, ToolError> {
        let url = self.url_for(req)?;
        let scope = req.kind.scope();
        let mut attempt: u32 = 0;

        loop {
            let token = self.access_token(req).await?;
            debug!(method = %req.method, url = %url, attempt, "sending upstream request");

            match self.send_once(req, &url, &token).await {
                Ok(resp) => return Ok(resp),
                Err((err, retry_after)) => {
                    if err.upstream_status() == Some(401) {
                        self.tokens.invalidate(scope).await?;
                    }
                    if attempt >= req.retry.max_retries || !err.is_transient() {
                        return Err(err);
                    }
                    let wait = req.retry.delay_for(attempt, retry_after);
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        max_retries = req.retry.max_retries,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "transient upstream failure, retrying"
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// The caller's timeout also bounds waiting for a token, including waiting behind
    /// another caller's grant for the same scope.
    async fn access_token(&self, req: &ApiRequest) -> Result<String, ToolError> {
        let scope = req.kind.scope();
        match req.timeout {
            Some(limit) => timeout(limit, self.tokens.get_access_token(scope))
                .await
                .map_err(|_| {
                    ToolError::Timeout(format!(
                        "access token for {} not acquired within {} ms",
                        scope,
                        limit.as_millis()
                    ))
                })?,
            None => self.tokens.get_access_token(scope).await,
        }
    }

    async fn send_once(
        &self,
        req: &ApiRequest,
        url: &str,
        token: &str,
    ) -> Result<ApiResponse, (ToolError, Option<Duration>)> {
        let mut builder = self
            .http
            .request(req.method.clone(), url)
            .bearer_auth(token)
            .header("Accept", "application/json");
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        for (k, v) in &req.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        match &req.payload {
            Some(Payload::Json(body)) => builder = builder.json(body),
            Some(Payload::Bytes { content_type, data }) => {
                builder = builder
                    .header("Content-Type", content_type.as_str())
                    .body(data.clone())
            }
            None => {}
        }
        if let Some(t) = req.timeout {
            builder = builder.timeout(t);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                (ToolError::Timeout(format!("{} {}", req.method, url)), None)
            } else {
                (ToolError::HttpRequest(e), None)
            }
        })?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("Retry-After")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = resp.text().await.map_err(|e| (ToolError::HttpRequest(e), None))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()))
        };

        if !(200..300).contains(&status) {
            let message = upstream_message(&body, &text);
            debug!(status, %message, "upstream returned an error");
            let retry_after = if is_retryable_status(status) {
                retry_after
            } else {
                None
            };
            return Err((ToolError::Upstream { status, message }, retry_after));
        }

        Ok(ApiResponse { status, body, text })
    }

    pub async fn send_json(&self, req: ApiRequest) -> Result<Value, ToolError> {
        Ok(self.execute(&req).await?.body)
    }

    /// Follow continuation links, concatenating each page's `value` array.
    pub async fn fetch_all(
        &self,
        req: ApiRequest,
        max_pages: usize,
    ) -> Result<CollectedPages, ToolError> {
        let mut items = Vec::new();
        let mut pages = 0usize;
        let mut current = req.clone();

        loop {
            let resp = self.execute(&current).await?;
            pages += 1;
            match resp.body.get("value") {
                Some(Value::Array(values)) => items.extend(values.iter().cloned()),
                Some(other) => items.push(other.clone()),
                None if !resp.body.is_null() => items.push(resp.body.clone()),
                None => {}
            }
            let Some(link) = resp.next_link() else {
                return Ok(CollectedPages {
                    items,
                    pages,
                    truncated_at: None,
                });
            };
            if pages >= max_pages.max(1) {
                return Ok(CollectedPages {
                    items,
                    pages,
                    truncated_at: Some(link.to_string()),
                });
            }
            current = req.follow(link);
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, ToolError> {
        self.send_json(ApiRequest::graph(Method::GET, path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ToolError> {
        self.send_json(ApiRequest::graph(Method::POST, path).json(body))
            .await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ToolError> {
        self.send_json(ApiRequest::graph(Method::PUT, path).json(body))
            .await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Value, ToolError> {
        self.send_json(ApiRequest::graph(Method::PATCH, path).json(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ToolError> {
        self.send_json(ApiRequest::graph(Method::DELETE, path))
            .await
    }
}

/// Pull `error.code` / `error.message` out of a Graph or ARM error body.
pub fn upstream_message(body: &Value, text: &str) -> String {
    let err = body.get("error");
    let code = err.and_then(|e| e.get("code")).and_then(|c| c.as_str());
    let message = err
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .or_else(|| err.and_then(|e| e.as_str()));
    match (code, message) {
        (Some(c), Some(m)) => format!("{}: {}", c, m),
        (None, Some(m)) => m.to_string(),
        (Some(c), None) => c.to_string(),
        (None, None) if text.trim().is_empty() => "no response body".to_string(),
        (None, None) => text.chars().take(500).collect(),
    }
}

/// Percent-encode a caller-supplied id for use as a single path segment.
pub fn seg(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}
