//! `manage_delta_queries`: incremental change tracking with opaque resume tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::graph_client::{ApiRequest, GraphClient};
use crate::utils::{json_result, tool, Hints};

pub const TOOL_NAME: &str = "manage_delta_queries";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeltaArgs {
    /// Begin tracking a collection, e.g. `users`, `groups` or `users/{id}/mailFolders/inbox/messages`.
    #[serde(rename_all = "camelCase")]
    Start {
        resource: String,
        #[serde(default)]
        select_fields: Vec<String>,
        filter: Option<String>,
    },
    /// Continue from a token returned by a previous call.
    #[serde(rename_all = "camelCase")]
    Resume { delta_token: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaPage {
    pub changes: Vec<Value>,
    pub change_count: usize,
    pub has_more_changes: bool,
    /// Pass back to `resume`; absent only when the service returned no link at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_token: Option<String>,
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<DeltaArgs>(
        TOOL_NAME,
        "Track changes to Graph collections with delta queries. `start` returns the first page \
         and a resume token; `resume` continues from that token.",
        Hints::READ_ONLY,
    )
}

pub fn encode_cursor(link: &str) -> String {
    URL_SAFE_NO_PAD.encode(link.as_bytes())
}

pub fn decode_cursor(token: &str) -> Result<String, ToolError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| ToolError::invalid("deltaToken is not a valid resume token"))?;
    let link = String::from_utf8(bytes)
        .map_err(|_| ToolError::invalid("deltaToken is not a valid resume token"))?;
    if !link.starts_with("http") {
        return Err(ToolError::invalid("deltaToken is not a valid resume token"));
    }
    Ok(link)
}

/// `@odata.nextLink` means the current round has more pages; `@odata.deltaLink` ends it.
pub fn summarize_delta_page(body: &Value) -> DeltaPage {
    let changes = body
        .get("value")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let next = body.get("@odata.nextLink").and_then(|v| v.as_str());
    let delta = body.get("@odata.deltaLink").and_then(|v| v.as_str());
    DeltaPage {
        change_count: changes.len(),
        changes,
        has_more_changes: next.is_some(),
        delta_token: next.or(delta).map(encode_cursor),
    }
}

pub(super) async fn run(client: &GraphClient, args: DeltaArgs) -> Result<CallToolResult, ToolError> {
    let req = match args {
        DeltaArgs::Start {
            resource,
            select_fields,
            filter,
        } => {
            let resource = resource.trim().trim_matches('/');
            if resource.is_empty() || resource.contains("://") {
                return Err(ToolError::invalid(
                    "resource must be a relative Graph collection path",
                ));
            }
            let resource = resource.trim_end_matches("/delta");
            let mut req = ApiRequest::graph(Method::GET, format!("/{}/delta", resource));
            if !select_fields.is_empty() {
                req = req.query("$select", select_fields.join(","));
            }
            req.query_opt("$filter", filter)
        }
        DeltaArgs::Resume { delta_token } => {
            ApiRequest::graph(Method::GET, decode_cursor(&delta_token)?)
        }
    };
    let body = client.send_json(req).await?;
    json_result(&summarize_delta_page(&body))
}
