//! `execute_advanced_search`: Microsoft Search across M365 content.

use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::graph_client::{ApiRequest, GraphClient};
use crate::utils::{json_result, tool, Hints};

pub const TOOL_NAME: &str = "execute_advanced_search";

const DEFAULT_SIZE: u32 = 25;
const MAX_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    DriveItem,
    ListItem,
    List,
    Site,
    Message,
    Event,
    ChatMessage,
    Person,
    ExternalItem,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSearchArgs {
    /// KQL query string.
    pub query: String,
    /// Defaults to `driveItem`.
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
    #[serde(default)]
    pub from: u32,
    /// Page size, 1..=500 (default 25).
    pub size: Option<u32>,
    /// Properties to return for each hit.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Geographic region, required by app-only search for some entity types (e.g. `NAM`).
    pub region: Option<String>,
    #[serde(default)]
    pub enable_top_results: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchSummary {
    pub total: u64,
    pub more_results_available: bool,
    pub hits: Vec<Value>,
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<AdvancedSearchArgs>(
        TOOL_NAME,
        "Search files, list items, sites, mail, events and people with Microsoft Search (KQL).",
        Hints::READ_ONLY,
    )
}

pub fn build_query(args: &AdvancedSearchArgs) -> Result<Value, ToolError> {
    if args.query.trim().is_empty() {
        return Err(ToolError::invalid("query must not be empty"));
    }
    let size = args.size.unwrap_or(DEFAULT_SIZE);
    if size == 0 || size > MAX_SIZE {
        return Err(ToolError::invalid(format!(
            "size must be between 1 and {}",
            MAX_SIZE
        )));
    }
    let entity_types = if args.entity_types.is_empty() {
        vec![EntityType::DriveItem]
    } else {
        args.entity_types.clone()
    };

    let mut request = Map::new();
    request.insert("entityTypes".into(), json!(entity_types));
    request.insert("query".into(), json!({ "queryString": args.query }));
    request.insert("from".into(), json!(args.from));
    request.insert("size".into(), json!(size));
    if !args.fields.is_empty() {
        request.insert("fields".into(), json!(args.fields));
    }
    if let Some(region) = &args.region {
        request.insert("region".into(), json!(region));
    }
    if args.enable_top_results {
        request.insert("enableTopResults".into(), json!(true));
    }
    Ok(json!({ "requests": [Value::Object(request)] }))
}

/// Flatten `value[].hitsContainers[]` into one hit list.
pub fn summarize_hits(body: &Value) -> SearchSummary {
    let containers = body
        .get("value")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|r| r.get("hitsContainers").and_then(|c| c.as_array()))
        .flatten();

    let mut summary = SearchSummary {
        total: 0,
        more_results_available: false,
        hits: Vec::new(),
    };
    for container in containers {
        summary.total += container.get("total").and_then(|t| t.as_u64()).unwrap_or(0);
        summary.more_results_available |= container
            .get("moreResultsAvailable")
            .and_then(|m| m.as_bool())
            .unwrap_or(false);
        if let Some(hits) = container.get("hits").and_then(|h| h.as_array()) {
            summary.hits.extend(hits.iter().cloned());
        }
    }
    summary
}

pub(super) async fn run(
    client: &GraphClient,
    args: AdvancedSearchArgs,
) -> Result<CallToolResult, ToolError> {
    let body = build_query(&args)?;
    let resp = client
        .send_json(ApiRequest::graph(Method::POST, "/search/query").json(body))
        .await?;
    json_result(&summarize_hits(&resp))
}
