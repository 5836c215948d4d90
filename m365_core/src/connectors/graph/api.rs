//! `call_microsoft_api`: arbitrary Graph or ARM requests.

use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::GraphVersion;
use crate::error::ToolError;
use crate::graph_client::{ApiKind, ApiRequest, GraphClient, RetryPolicy};
use crate::utils::{json_result, text_result, tool, Hints};

pub const TOOL_NAME: &str = "call_microsoft_api";

const DEFAULT_MAX_RETRIES: u32 = 3;
const MAX_RETRIES_LIMIT: u32 = 10;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_PAGES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    Graph,
    Azure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "GET")]
    Get,
    #[serde(alias = "POST")]
    Post,
    #[serde(alias = "PUT")]
    Put,
    #[serde(alias = "PATCH")]
    Patch,
    #[serde(alias = "DELETE")]
    Delete,
}

impl HttpMethod {
    fn as_method(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Full parsed body, pretty-printed.
    #[default]
    Json,
    /// Response text exactly as received.
    Raw,
    /// Only the `value` array when present.
    Minimal,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallMicrosoftApiArgs {
    /// `graph` for Microsoft Graph, `azure` for Azure Resource Manager.
    pub api_type: ApiType,
    /// Path relative to the API root, e.g. `/users` or `/resourceGroups`.
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Graph version segment (`v1.0` or `beta`).
    pub graph_api_version: Option<GraphVersion>,
    /// ARM `api-version` query parameter; required for azure calls.
    pub api_version: Option<String>,
    /// Azure subscription; prefixed as `/subscriptions/{id}` unless the path already is.
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, Value>,
    pub body: Option<Value>,
    /// Fields for `$select`.
    #[serde(default)]
    pub select_fields: Vec<String>,
    /// Relationships for `$expand`.
    #[serde(default)]
    pub expand_fields: Vec<String>,
    /// Sent as the `ConsistencyLevel` header (`eventual` for advanced queries).
    pub consistency_level: Option<String>,
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
    /// Retries for throttling and transient failures (default 3, max 10).
    pub max_retries: Option<u32>,
    /// Base backoff in milliseconds (default 1000).
    pub retry_delay: Option<u64>,
    /// Per-request timeout in milliseconds (default 30000).
    pub timeout: Option<u64>,
    /// Follow continuation links and concatenate `value` arrays.
    #[serde(default)]
    pub fetch_all: bool,
    /// Page limit when `fetchAll` is set (default 100).
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub response_format: ResponseFormat,
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<CallMicrosoftApiArgs>(
        TOOL_NAME,
        "Call any Microsoft Graph or Azure Resource Manager endpoint with retries, timeouts, \
         $select/$expand helpers and optional pagination.",
        Hints::WRITE,
    )
}

fn query_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Translate validated arguments into an upstream request.
pub fn build_request(args: &CallMicrosoftApiArgs) -> Result<ApiRequest, ToolError> {
    if args.path.trim().is_empty() {
        return Err(ToolError::invalid("path must not be empty"));
    }
    if args.max_retries.is_some_and(|n| n > MAX_RETRIES_LIMIT) {
        return Err(ToolError::invalid(format!(
            "maxRetries must be at most {}",
            MAX_RETRIES_LIMIT
        )));
    }

    let mut req = match args.api_type {
        ApiType::Graph => {
            let req = ApiRequest::new(ApiKind::Graph, args.method.as_method(), args.path.trim());
            match args.graph_api_version {
                Some(v) => req.version(v),
                None => req,
            }
        }
        ApiType::Azure => {
            let api_version = args
                .api_version
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ToolError::invalid("apiVersion is required for azure calls"))?;
            let path = azure_path(args.path.trim(), args.subscription_id.as_deref());
            ApiRequest::new(ApiKind::Azure, args.method.as_method(), path)
                .query("api-version", api_version)
        }
    };

    for (k, v) in &args.query_params {
        req = req.query(k.as_str(), query_value(v));
    }
    if !args.select_fields.is_empty() {
        req = req.query("$select", args.select_fields.join(","));
    }
    if !args.expand_fields.is_empty() {
        req = req.query("$expand", args.expand_fields.join(","));
    }
    if let Some(level) = &args.consistency_level {
        req = req.header("ConsistencyLevel", level.as_str());
    }
    for (k, v) in &args.custom_headers {
        req = req.header(k.as_str(), v.as_str());
    }
    if let Some(body) = &args.body {
        req = req.json(body.clone());
    }

    let retry = RetryPolicy::new(
        args.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        Duration::from_millis(args.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY_MS)),
    );
    Ok(req
        .retry(retry)
        .timeout(Duration::from_millis(args.timeout.unwrap_or(DEFAULT_TIMEOUT_MS))))
}

fn azure_path(path: &str, subscription_id: Option<&str>) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    match subscription_id {
        Some(sub) if !sub.is_empty() && !path.starts_with("/subscriptions") => {
            format!("/subscriptions/{}{}", sub, path)
        }
        _ => path,
    }
}

fn minimal(body: Value) -> Value {
    match body {
        Value::Object(mut map) => match map.remove("value") {
            Some(v) => v,
            None => Value::Object(map),
        },
        other => other,
    }
}

pub(super) async fn run(
    client: &GraphClient,
    args: CallMicrosoftApiArgs,
) -> Result<CallToolResult, ToolError> {
    let req = build_request(&args)?;

    if args.fetch_all {
        let pages = client
            .fetch_all(req, args.max_pages.unwrap_or(DEFAULT_MAX_PAGES))
            .await?;
        let items = Value::Array(pages.items);
        return match args.response_format {
            ResponseFormat::Minimal => json_result(&items),
            ResponseFormat::Json | ResponseFormat::Raw => {
                let mut out = Map::new();
                out.insert("value".into(), items);
                out.insert("pageCount".into(), json!(pages.pages));
                if let Some(link) = pages.truncated_at {
                    out.insert("@odata.nextLink".into(), json!(link));
                }
                json_result(&Value::Object(out))
            }
        };
    }

    let resp = client.execute(&req).await?;
    match args.response_format {
        ResponseFormat::Raw => Ok(text_result(resp.text)),
        ResponseFormat::Minimal => json_result(&minimal(resp.body)),
        ResponseFormat::Json if resp.body.is_null() => Ok(text_result(format!(
            "Request completed with status {}",
            resp.status
        ))),
        ResponseFormat::Json => json_result(&resp.body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(v: Value) -> CallMicrosoftApiArgs {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn select_and_expand_become_odata_options() {
        let req = build_request(&args(json!({
            "apiType": "graph",
            "path": "/users",
            "selectFields": ["id", "displayName"],
            "expandFields": ["manager"],
            "queryParams": {"$top": 5}
        })))
        .unwrap();
        assert_eq!(
            req.query,
            vec![
                ("$top".to_string(), "5".to_string()),
                ("$select".to_string(), "id,displayName".to_string()),
                ("$expand".to_string(), "manager".to_string()),
            ]
        );
        assert_eq!(req.retry.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(req.timeout, Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)));
    }

    #[test]
    fn azure_requires_api_version() {
        let err = build_request(&args(json!({"apiType": "azure", "path": "/resourceGroups"})))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }

    #[test]
    fn azure_path_gets_subscription_prefix() {
        let req = build_request(&args(json!({
            "apiType": "azure",
            "path": "resourceGroups",
            "subscriptionId": "sub-1",
            "apiVersion": "2021-04-01"
        })))
        .unwrap();
        assert_eq!(req.path, "/subscriptions/sub-1/resourceGroups");
        assert_eq!(
            req.query,
            vec![("api-version".to_string(), "2021-04-01".to_string())]
        );

        let req = build_request(&args(json!({
            "apiType": "azure",
            "path": "/subscriptions/sub-2/providers",
            "subscriptionId": "sub-1",
            "apiVersion": "2021-04-01"
        })))
        .unwrap();
        assert_eq!(req.path, "/subscriptions/sub-2/providers");
    }

    #[test]
    fn retry_limit_is_enforced() {
        let err = build_request(&args(
            json!({"apiType": "graph", "path": "/me", "maxRetries": 11}),
        ))
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }

    #[test]
    fn minimal_unwraps_value() {
        assert_eq!(minimal(json!({"value": [1, 2]})), json!([1, 2]));
        assert_eq!(minimal(json!({"id": "x"})), json!({"id": "x"}));
    }
}
