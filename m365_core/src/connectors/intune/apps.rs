use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::group_targets;
use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{json_result, list_request, require_non_empty, tool, upstream_result, Hints, ListQuery};

pub const TOOL_NAME: &str = "manage_intune_apps";

const MOBILE_APPS: &str = "/deviceAppManagement/mobileApps";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum InstallIntent {
    Required,
    Available,
    Uninstall,
    AvailableWithoutEnrollment,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IntuneAppArgs {
    List(ListQuery),
    #[serde(rename_all = "camelCase")]
    Get { app_id: String },
    #[serde(rename_all = "camelCase")]
    Assign {
        app_id: String,
        group_ids: Vec<String>,
        intent: InstallIntent,
    },
    #[serde(rename_all = "camelCase")]
    ListAssignments { app_id: String },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<IntuneAppArgs>(
        TOOL_NAME,
        "List Intune mobile apps and manage their group assignments.",
        Hints::WRITE,
    )
}

fn app_path(id: &str) -> Result<String, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::invalid("appId must not be empty"));
    }
    Ok(format!("{}/{}", MOBILE_APPS, seg(id.trim())))
}

pub fn assignment_body(group_ids: &[String], intent: InstallIntent) -> Value {
    let assignments: Vec<Value> = group_targets(group_ids)
        .into_iter()
        .map(|target| {
            json!({
                "@odata.type": "#microsoft.graph.mobileAppAssignment",
                "intent": intent,
                "target": target,
            })
        })
        .collect();
    json!({ "mobileAppAssignments": assignments })
}

pub(super) async fn run(client: &GraphClient, args: IntuneAppArgs) -> Result<CallToolResult, ToolError> {
    match args {
        IntuneAppArgs::List(query) => {
            json_result(&client.send_json(list_request(MOBILE_APPS, &query)).await?)
        }
        IntuneAppArgs::Get { app_id } => json_result(&client.get(&app_path(&app_id)?).await?),
        IntuneAppArgs::Assign {
            app_id,
            group_ids,
            intent,
        } => {
            require_non_empty("groupIds", &group_ids)?;
            let resp = client
                .post(
                    &format!("{}/assign", app_path(&app_id)?),
                    assignment_body(&group_ids, intent),
                )
                .await?;
            upstream_result(resp, "App assigned")
        }
        IntuneAppArgs::ListAssignments { app_id } => json_result(
            &client
                .get(&format!("{}/assignments", app_path(&app_id)?))
                .await?,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_targets_each_group() {
        let body = assignment_body(&["g1".into(), "g2".into()], InstallIntent::Required);
        let list = body["mobileAppAssignments"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["intent"], "required");
        assert_eq!(list[1]["target"]["groupId"], "g2");
        assert_eq!(
            list[0]["target"]["@odata.type"],
            "#microsoft.graph.groupAssignmentTarget"
        );
    }
}
