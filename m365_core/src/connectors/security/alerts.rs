use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};
use crate::utils::{json_result, patch_body, tool, Hints};

pub const TOOL_NAME: &str = "manage_alerts";

pub(crate) const ALERTS: &str = "/security/alerts_v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AlertStatus {
    New,
    InProgress,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AlertSeverity {
    Informational,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AlertClassification {
    FalsePositive,
    TruePositive,
    InformationalExpectedActivity,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    pub severity: Option<AlertSeverity>,
    pub status: Option<AlertStatus>,
    /// Extra OData filter.
    pub filter: Option<String>,
    pub top: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertUpdate {
    pub alert_id: String,
    pub status: Option<AlertStatus>,
    pub classification: Option<AlertClassification>,
    /// e.g. `malware`, `phishing`, `notMalicious`.
    pub determination: Option<String>,
    pub assigned_to: Option<String>,
    /// Added as an alert comment after the update.
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AlertArgs {
    List(AlertQuery),
    #[serde(rename_all = "camelCase")]
    Get { alert_id: String },
    Update(AlertUpdate),
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<AlertArgs>(
        TOOL_NAME,
        "List, inspect and triage Microsoft 365 Defender security alerts.",
        Hints::WRITE,
    )
}

/// Alert list filter; `fixed` is AND-ed in front (used to scope to one service source).
pub fn alert_filter(query: &AlertQuery, fixed: Option<&str>) -> Option<String> {
    let mut clauses: Vec<String> = fixed.map(|f| f.to_string()).into_iter().collect();
    if let Some(sev) = query.severity {
        clauses.push(format!("severity eq '{}'", enum_str(&sev)));
    }
    if let Some(status) = query.status {
        clauses.push(format!("status eq '{}'", enum_str(&status)));
    }
    if let Some(f) = query.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        clauses.push(format!("({})", f));
    }
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    }
}

fn enum_str<T: Serialize>(v: &T) -> String {
    match serde_json::to_value(v) {
        Ok(Value::String(s)) => s,
        _ => String::new(),
    }
}

pub(crate) fn alert_path(id: &str) -> Result<String, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::invalid("alertId must not be empty"));
    }
    Ok(format!("{}/{}", ALERTS, seg(id.trim())))
}

pub(crate) async fn list_alerts(
    client: &GraphClient,
    query: &AlertQuery,
    fixed: Option<&str>,
) -> Result<Value, ToolError> {
    let req = ApiRequest::graph(Method::GET, ALERTS)
        .query_opt("$filter", alert_filter(query, fixed))
        .query_opt("$top", query.top);
    client.send_json(req).await
}

pub(crate) async fn update_alert(client: &GraphClient, update: AlertUpdate) -> Result<Value, ToolError> {
    let path = alert_path(&update.alert_id)?;
    let fields = [
        ("status", update.status.map(|s| json!(s))),
        ("classification", update.classification.map(|c| json!(c))),
        ("determination", update.determination.map(Value::String)),
        ("assignedTo", update.assigned_to.map(Value::String)),
    ];
    let has_fields = fields.iter().any(|(_, v)| v.is_some());
    if !has_fields && update.comment.is_none() {
        return Err(ToolError::invalid(
            "provide at least one of: status, classification, determination, assignedTo, comment",
        ));
    }
    let mut updated = Value::Null;
    if has_fields {
        updated = client.patch(&path, patch_body(&fields)?).await?;
    }
    if let Some(comment) = update.comment {
        client
            .post(&format!("{}/comments", path), json!({ "comment": comment }))
            .await?;
    }
    if updated.is_null() {
        updated = client.get(&path).await?;
    }
    Ok(updated)
}

pub(super) async fn run(client: &GraphClient, args: AlertArgs) -> Result<CallToolResult, ToolError> {
    match args {
        AlertArgs::List(query) => json_result(&list_alerts(client, &query, None).await?),
        AlertArgs::Get { alert_id } => json_result(&client.get(&alert_path(&alert_id)?).await?),
        AlertArgs::Update(update) => json_result(&update_alert(client, update).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_includes_enums_and_fixed_scope() {
        let query = AlertQuery {
            severity: Some(AlertSeverity::High),
            status: Some(AlertStatus::InProgress),
            ..Default::default()
        };
        assert_eq!(
            alert_filter(&query, Some("serviceSource eq 'microsoftDataLossPrevention'")).unwrap(),
            "serviceSource eq 'microsoftDataLossPrevention' and severity eq 'high' and status eq 'inProgress'"
        );
        assert_eq!(alert_filter(&AlertQuery::default(), None), None);
    }
}
