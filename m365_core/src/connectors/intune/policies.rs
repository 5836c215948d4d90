use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{group_targets, require_odata_type};
use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{json_result, list_request, require_non_empty, tool, upstream_result, Hints, ListQuery};

pub const TOOL_NAME: &str = "manage_intune_policies";

const CONFIGURATIONS: &str = "/deviceManagement/deviceConfigurations";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PolicyArgs {
    List(ListQuery),
    #[serde(rename_all = "camelCase")]
    Get { policy_id: String },
    /// Full configuration object, including `@odata.type`
    /// (e.g. `#microsoft.graph.windows10GeneralConfiguration`).
    #[serde(rename_all = "camelCase")]
    Create { policy: Map<String, Value> },
    #[serde(rename_all = "camelCase")]
    Update {
        policy_id: String,
        properties: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    Delete { policy_id: String },
    /// Replace the policy's assignments with the given groups.
    #[serde(rename_all = "camelCase")]
    Assign {
        policy_id: String,
        group_ids: Vec<String>,
    },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<PolicyArgs>(
        TOOL_NAME,
        "Manage Intune device configuration profiles and their group assignments.",
        Hints::WRITE,
    )
}

fn policy_path(id: &str) -> Result<String, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::invalid("policyId must not be empty"));
    }
    Ok(format!("{}/{}", CONFIGURATIONS, seg(id.trim())))
}

pub(super) async fn run(client: &GraphClient, args: PolicyArgs) -> Result<CallToolResult, ToolError> {
    match args {
        PolicyArgs::List(query) => {
            json_result(&client.send_json(list_request(CONFIGURATIONS, &query)).await?)
        }
        PolicyArgs::Get { policy_id } => json_result(&client.get(&policy_path(&policy_id)?).await?),
        PolicyArgs::Create { policy } => {
            require_odata_type(&policy)?;
            json_result(&client.post(CONFIGURATIONS, Value::Object(policy)).await?)
        }
        PolicyArgs::Update {
            policy_id,
            properties,
        } => {
            if properties.is_empty() {
                return Err(ToolError::invalid("properties must not be empty"));
            }
            let resp = client
                .patch(&policy_path(&policy_id)?, Value::Object(properties))
                .await?;
            upstream_result(resp, "Configuration policy updated")
        }
        PolicyArgs::Delete { policy_id } => {
            let resp = client.delete(&policy_path(&policy_id)?).await?;
            upstream_result(resp, "Configuration policy deleted")
        }
        PolicyArgs::Assign {
            policy_id,
            group_ids,
        } => {
            require_non_empty("groupIds", &group_ids)?;
            let assignments: Vec<Value> = group_targets(&group_ids)
                .into_iter()
                .map(|target| json!({ "target": target }))
                .collect();
            let resp = client
                .post(
                    &format!("{}/assign", policy_path(&policy_id)?),
                    json!({ "assignments": assignments }),
                )
                .await?;
            upstream_result(resp, "Configuration policy assigned")
        }
    }
}
