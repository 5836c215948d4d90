//! `execute_graph_batch`: JSON batching through `POST /$batch`.

use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};

use crate::config::GraphVersion;
use crate::error::ToolError;
use crate::graph_client::{ApiRequest, GraphClient};
use crate::utils::{json_result, tool, Hints};

pub const TOOL_NAME: &str = "execute_graph_batch";
pub const MAX_BATCH_SIZE: usize = 20;

const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequestItem {
    /// Caller-chosen id, unique within the batch.
    pub id: String,
    pub method: String,
    /// Graph path without the version segment, e.g. `/users/{id}`.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteGraphBatchArgs {
    /// Between 1 and 20 sub-requests.
    pub requests: Vec<BatchRequestItem>,
    pub graph_api_version: Option<GraphVersion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResponseItem {
    pub id: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    pub body: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub responses: Vec<BatchResponseItem>,
    pub succeeded: usize,
    pub failed: usize,
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<ExecuteGraphBatchArgs>(
        TOOL_NAME,
        "Execute up to 20 Graph requests in one JSON batch. Responses are returned in request order.",
        Hints::WRITE,
    )
}

/// Check batch shape and normalise methods and body content types.
pub fn validate_batch(requests: &[BatchRequestItem]) -> Result<Vec<BatchRequestItem>, ToolError> {
    if requests.is_empty() || requests.len() > MAX_BATCH_SIZE {
        return Err(ToolError::invalid(format!(
            "a batch must contain between 1 and {} requests, got {}",
            MAX_BATCH_SIZE,
            requests.len()
        )));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(requests.len());
    for item in requests {
        if item.id.trim().is_empty() {
            return Err(ToolError::invalid("every batch request needs an id"));
        }
        if !seen.insert(item.id.as_str()) {
            return Err(ToolError::invalid(format!(
                "duplicate batch request id '{}'",
                item.id
            )));
        }
        let method = item.method.to_ascii_uppercase();
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Err(ToolError::invalid(format!(
                "request '{}' has unsupported method '{}'",
                item.id, item.method
            )));
        }
        if item.url.trim().is_empty() || item.url.starts_with("http") {
            return Err(ToolError::invalid(format!(
                "request '{}' url must be a relative Graph path",
                item.id
            )));
        }
        // Dependencies must point at a request earlier in the batch.
        for dep in item.depends_on.iter().flatten() {
            if !seen.contains(dep.as_str()) || dep == &item.id {
                return Err(ToolError::invalid(format!(
                    "request '{}' depends on unknown or later id '{}'",
                    item.id, dep
                )));
            }
        }

        let mut normalized = item.clone();
        normalized.method = method;
        if !normalized.url.starts_with('/') {
            normalized.url = format!("/{}", normalized.url);
        }
        if normalized.body.is_some() {
            let headers = normalized.headers.get_or_insert_with(BTreeMap::new);
            if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                headers.insert("Content-Type".into(), "application/json".into());
            }
        }
        out.push(normalized);
    }
    Ok(out)
}

/// Reorder upstream responses to match the submitted request order.
pub fn order_responses(requests: &[BatchRequestItem], body: &Value) -> BatchSummary {
    let raw = body
        .get("responses")
        .and_then(|r| r.as_array())
        .cloned()
        .unwrap_or_default();
    let mut responses: Vec<BatchResponseItem> = raw
        .into_iter()
        .map(|r| BatchResponseItem {
            id: r
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            status: r
                .get("status")
                .and_then(|v| v.as_u64())
                .and_then(|s| u16::try_from(s).ok())
                .unwrap_or(0),
            headers: r.get("headers").cloned(),
            body: r.get("body").cloned().unwrap_or(Value::Null),
        })
        .collect();
    responses.sort_by_key(|r| {
        requests
            .iter()
            .position(|q| q.id == r.id)
            .unwrap_or(usize::MAX)
    });
    let succeeded = responses
        .iter()
        .filter(|r| (200..300).contains(&r.status))
        .count();
    let failed = responses.len() - succeeded;
    BatchSummary {
        responses,
        succeeded,
        failed,
    }
}

pub(super) async fn run(
    client: &GraphClient,
    args: ExecuteGraphBatchArgs,
) -> Result<CallToolResult, ToolError> {
    let requests = validate_batch(&args.requests)?;
    let mut req = ApiRequest::graph(Method::POST, "/$batch").json(json!({ "requests": requests }));
    if let Some(v) = args.graph_api_version {
        req = req.version(v);
    }
    let body = client.send_json(req).await?;
    json_result(&order_responses(&requests, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(id: &str) -> BatchRequestItem {
        BatchRequestItem {
            id: id.into(),
            method: "get".into(),
            url: "users".into(),
            headers: None,
            body: None,
            depends_on: None,
        }
    }

    #[test]
    fn rejects_empty_and_oversized_batches() {
        assert!(validate_batch(&[]).is_err());
        let many: Vec<_> = (0..21).map(|i| item(&i.to_string())).collect();
        assert!(matches!(
            validate_batch(&many),
            Err(ToolError::InvalidParams(_))
        ));
        let full: Vec<_> = (0..20).map(|i| item(&i.to_string())).collect();
        assert_eq!(validate_batch(&full).unwrap().len(), 20);
    }

    #[test]
    fn rejects_duplicate_ids_and_forward_dependencies() {
        assert!(validate_batch(&[item("1"), item("1")]).is_err());
        let mut second = item("2");
        second.depends_on = Some(vec!["3".into()]);
        assert!(validate_batch(&[item("1"), second, item("3")]).is_err());
    }

    #[test]
    fn normalises_method_url_and_content_type() {
        let mut post = item("1");
        post.method = "post".into();
        post.body = Some(json!({"displayName": "x"}));
        let out = validate_batch(&[post]).unwrap();
        assert_eq!(out[0].method, "POST");
        assert_eq!(out[0].url, "/users");
        assert_eq!(
            out[0].headers.as_ref().unwrap().get("Content-Type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn responses_follow_request_order() {
        let requests = vec![item("a"), item("b"), item("c")];
        let body = json!({"responses": [
            {"id": "c", "status": 404, "body": {"error": {"code": "NotFound"}}},
            {"id": "a", "status": 200, "body": {"id": "1"}},
            {"id": "b", "status": 204}
        ]});
        let summary = order_responses(&requests, &body);
        let ids: Vec<_> = summary.responses.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn out_of_range_status_is_not_a_success() {
        let requests = vec![item("a")];
        let body = json!({"responses": [{"id": "a", "status": 65736}]});
        let summary = order_responses(&requests, &body);
        assert_eq!(summary.responses[0].status, 0);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 1);
    }
}
