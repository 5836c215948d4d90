// src/error.rs
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Upstream call failed ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Method not found")]
    MethodNotFound,

    #[error("Parse error")]
    ParseError,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Machine-readable error kind surfaced to MCP clients.
    pub fn code_str(&self) -> &'static str {
        match self {
            ToolError::InvalidParams(_) => "invalid_params",
            ToolError::Upstream { .. } => "upstream_error",
            ToolError::HttpRequest(_) => "upstream_error",
            ToolError::Authentication(_) => "auth_failed",
            ToolError::Config(_) => "config_error",
            ToolError::ResourceNotFound(_) => "not_found",
            ToolError::ToolNotFound(_) => "tool_not_found",
            ToolError::MethodNotFound => "method_not_found",
            ToolError::ParseError => "parse_error",
            ToolError::Timeout(_) => "timeout",
            ToolError::SerdeJson(_) | ToolError::Internal(_) => "internal_error",
        }
    }

    /// Status code of the failed upstream call, when there was one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ToolError::Upstream { status, .. } => Some(*status),
            ToolError::HttpRequest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the generic caller's retry policy applies to this failure.
    pub fn is_transient(&self) -> bool {
        match self {
            ToolError::Upstream { status, .. } => is_retryable_status(*status),
            ToolError::HttpRequest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ToolError::Timeout(_) => true,
            _ => false,
        }
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let code = match self {
            ToolError::InvalidParams(_)
            | ToolError::ResourceNotFound(_)
            | ToolError::ToolNotFound(_) => -32602,
            ToolError::MethodNotFound => -32601,
            ToolError::ParseError => -32700,
            _ => -32603,
        };

        let mut data = json!({ "kind": self.code_str() });
        if let Some(status) = self.upstream_status() {
            data["status"] = json!(status);
        }

        json!({
            "code": code,
            "message": self.to_string(),
            "data": data,
        })
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ToolError::InvalidParams(msg.into())
    }
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
