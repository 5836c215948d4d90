use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::require_odata_type;
use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{json_result, list_request, tool, upstream_result, Hints, ListQuery};

pub const TOOL_NAME: &str = "manage_intune_compliance";

const COMPLIANCE_POLICIES: &str = "/deviceManagement/deviceCompliancePolicies";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ComplianceArgs {
    ListPolicies(ListQuery),
    #[serde(rename_all = "camelCase")]
    GetPolicy { policy_id: String },
    /// Full policy object including `@odata.type`
    /// (e.g. `#microsoft.graph.windows10CompliancePolicy`).
    #[serde(rename_all = "camelCase")]
    CreatePolicy { policy: Map<String, Value> },
    #[serde(rename_all = "camelCase")]
    DeletePolicy { policy_id: String },
    /// Per-device compliance state for a policy.
    #[serde(rename_all = "camelCase")]
    DeviceStatus { policy_id: String },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<ComplianceArgs>(
        TOOL_NAME,
        "Manage Intune device compliance policies and review per-device compliance status.",
        Hints::WRITE,
    )
}

fn policy_path(id: &str) -> Result<String, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::invalid("policyId must not be empty"));
    }
    Ok(format!("{}/{}", COMPLIANCE_POLICIES, seg(id.trim())))
}

/// Graph rejects compliance policies without a scheduled action; default to immediate block.
pub fn with_default_actions(mut policy: Map<String, Value>) -> Map<String, Value> {
    policy
        .entry("scheduledActionsForRule")
        .or_insert_with(|| {
            json!([{
                "ruleName": "PasswordRequired",
                "scheduledActionConfigurations": [{
                    "actionType": "block",
                    "gracePeriodHours": 0
                }]
            }])
        });
    policy
}

pub(super) async fn run(client: &GraphClient, args: ComplianceArgs) -> Result<CallToolResult, ToolError> {
    match args {
        ComplianceArgs::ListPolicies(query) => {
            json_result(&client.send_json(list_request(COMPLIANCE_POLICIES, &query)).await?)
        }
        ComplianceArgs::GetPolicy { policy_id } => {
            json_result(&client.get(&policy_path(&policy_id)?).await?)
        }
        ComplianceArgs::CreatePolicy { policy } => {
            require_odata_type(&policy)?;
            let body = Value::Object(with_default_actions(policy));
            json_result(&client.post(COMPLIANCE_POLICIES, body).await?)
        }
        ComplianceArgs::DeletePolicy { policy_id } => {
            let resp = client.delete(&policy_path(&policy_id)?).await?;
            upstream_result(resp, "Compliance policy deleted")
        }
        ComplianceArgs::DeviceStatus { policy_id } => json_result(
            &client
                .get(&format!("{}/deviceStatuses", policy_path(&policy_id)?))
                .await?,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_block_action_is_added_once() {
        let mut policy = Map::new();
        policy.insert(
            "@odata.type".into(),
            json!("#microsoft.graph.windows10CompliancePolicy"),
        );
        let out = with_default_actions(policy);
        assert_eq!(
            out["scheduledActionsForRule"][0]["scheduledActionConfigurations"][0]["actionType"],
            "block"
        );

        let mut custom = Map::new();
        custom.insert("scheduledActionsForRule".into(), json!([]));
        assert_eq!(with_default_actions(custom)["scheduledActionsForRule"], json!([]));
    }
}
