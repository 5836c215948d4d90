//! Data loss prevention: policies (beta) and DLP-sourced alerts as incidents.

use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::connectors::security::alerts::{alert_path, list_alerts, update_alert, AlertQuery, AlertUpdate};
use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};
use crate::utils::{json_result, tool, Hints, ListQuery};

pub const POLICIES_TOOL: &str = "manage_dlp_policies";
pub const INCIDENTS_TOOL: &str = "manage_dlp_incidents";

const DLP_POLICIES: &str = "/security/dataLossPreventionPolicies";
const DLP_SOURCE: &str = "serviceSource eq 'microsoftDataLossPrevention'";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DlpPolicyArgs {
    List(ListQuery),
    #[serde(rename_all = "camelCase")]
    Get { policy_id: String },
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DlpIncidentArgs {
    List(AlertQuery),
    #[serde(rename_all = "camelCase")]
    Get { incident_id: String },
    Update(AlertUpdate),
}

pub(super) fn definitions() -> Result<Vec<Tool>, ToolError> {
    Ok(vec![
        tool::<DlpPolicyArgs>(
            POLICIES_TOOL,
            "List and inspect data loss prevention policies (Graph beta).",
            Hints::READ_ONLY,
        )?,
        tool::<DlpIncidentArgs>(
            INCIDENTS_TOOL,
            "List, inspect and triage DLP incidents raised as Defender alerts. \
             For update, pass the incident id as alertId.",
            Hints::WRITE,
        )?,
    ])
}

pub(super) async fn run_policies(
    client: &GraphClient,
    args: DlpPolicyArgs,
) -> Result<CallToolResult, ToolError> {
    let req = match args {
        DlpPolicyArgs::List(query) => query.apply(ApiRequest::graph(Method::GET, DLP_POLICIES)),
        DlpPolicyArgs::Get { policy_id } => {
            if policy_id.trim().is_empty() {
                return Err(ToolError::invalid("policyId must not be empty"));
            }
            ApiRequest::graph(
                Method::GET,
                format!("{}/{}", DLP_POLICIES, seg(policy_id.trim())),
            )
        }
    };
    json_result(&client.send_json(req.beta()).await?)
}

pub(super) async fn run_incidents(
    client: &GraphClient,
    args: DlpIncidentArgs,
) -> Result<CallToolResult, ToolError> {
    match args {
        DlpIncidentArgs::List(query) => {
            json_result(&list_alerts(client, &query, Some(DLP_SOURCE)).await?)
        }
        DlpIncidentArgs::Get { incident_id } => {
            json_result(&client.get(&alert_path(&incident_id)?).await?)
        }
        DlpIncidentArgs::Update(update) => json_result(&update_alert(client, update).await?),
    }
}
