use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{json_result, tool, upstream_result, Hints};

pub const TOOL_NAME: &str = "manage_conditional_access_policies";

const POLICIES: &str = "/identity/conditionalAccess/policies";
const REPORT_ONLY: &str = "enabledForReportingButNotEnforced";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConditionalAccessArgs {
    List,
    #[serde(rename_all = "camelCase")]
    Get { policy_id: String },
    /// Policy object with `displayName`, `conditions` and `grantControls`.
    /// `state` defaults to report-only.
    #[serde(rename_all = "camelCase")]
    Create { policy: Map<String, Value> },
    #[serde(rename_all = "camelCase")]
    Update {
        policy_id: String,
        properties: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    Delete { policy_id: String },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<ConditionalAccessArgs>(
        TOOL_NAME,
        "Manage Entra ID conditional access policies. New policies start in report-only mode \
         unless a state is given.",
        Hints::WRITE,
    )
}

fn policy_path(id: &str) -> Result<String, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::invalid("policyId must not be empty"));
    }
    Ok(format!("{}/{}", POLICIES, seg(id.trim())))
}

pub fn prepare_policy(mut policy: Map<String, Value>) -> Result<Map<String, Value>, ToolError> {
    for field in ["displayName", "conditions"] {
        if !policy.contains_key(field) {
            return Err(ToolError::invalid(format!("policy.{} is required", field)));
        }
    }
    if !policy.contains_key("grantControls") && !policy.contains_key("sessionControls") {
        return Err(ToolError::invalid(
            "policy needs grantControls or sessionControls",
        ));
    }
    policy.entry("state").or_insert_with(|| json!(REPORT_ONLY));
    Ok(policy)
}

pub(super) async fn run(
    client: &GraphClient,
    args: ConditionalAccessArgs,
) -> Result<CallToolResult, ToolError> {
    match args {
        ConditionalAccessArgs::List => json_result(&client.get(POLICIES).await?),
        ConditionalAccessArgs::Get { policy_id } => {
            json_result(&client.get(&policy_path(&policy_id)?).await?)
        }
        ConditionalAccessArgs::Create { policy } => {
            let body = Value::Object(prepare_policy(policy)?);
            json_result(&client.post(POLICIES, body).await?)
        }
        ConditionalAccessArgs::Update {
            policy_id,
            properties,
        } => {
            if properties.is_empty() {
                return Err(ToolError::invalid("properties must not be empty"));
            }
            let resp = client
                .patch(&policy_path(&policy_id)?, Value::Object(properties))
                .await?;
            upstream_result(resp, "Conditional access policy updated")
        }
        ConditionalAccessArgs::Delete { policy_id } => {
            let resp = client.delete(&policy_path(&policy_id)?).await?;
            upstream_result(resp, "Conditional access policy deleted")
        }
    }
}
