use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{directory_object_ref, json_result, tool, upstream_result, Hints};

pub const TOOL_NAME: &str = "manage_user_settings";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserSettingsArgs {
    #[serde(rename_all = "camelCase")]
    Get {
        /// Object id or user principal name.
        user_id: String,
        #[serde(default)]
        select_fields: Vec<String>,
    },
    /// PATCH the given user properties, e.g. `jobTitle`, `department`, `usageLocation`.
    #[serde(rename_all = "camelCase")]
    Update {
        user_id: String,
        properties: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    GetMailboxSettings { user_id: String },
    #[serde(rename_all = "camelCase")]
    UpdateMailboxSettings {
        user_id: String,
        settings: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    GetManager { user_id: String },
    #[serde(rename_all = "camelCase")]
    SetManager { user_id: String, manager_id: String },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<UserSettingsArgs>(
        TOOL_NAME,
        "Read and update user profile properties, mailbox settings and manager assignment.",
        Hints::WRITE,
    )
}

fn user_path(user_id: &str) -> Result<String, ToolError> {
    if user_id.trim().is_empty() {
        return Err(ToolError::invalid("userId must not be empty"));
    }
    Ok(format!("/users/{}", seg(user_id.trim())))
}

pub(super) async fn run(
    client: &GraphClient,
    args: UserSettingsArgs,
) -> Result<CallToolResult, ToolError> {
    match args {
        UserSettingsArgs::Get {
            user_id,
            select_fields,
        } => {
            let mut path = user_path(&user_id)?;
            if !select_fields.is_empty() {
                path = format!("{}?$select={}", path, select_fields.join(","));
            }
            json_result(&client.get(&path).await?)
        }
        UserSettingsArgs::Update {
            user_id,
            properties,
        } => {
            if properties.is_empty() {
                return Err(ToolError::invalid("properties must not be empty"));
            }
            let resp = client
                .patch(&user_path(&user_id)?, Value::Object(properties))
                .await?;
            upstream_result(resp, "User updated")
        }
        UserSettingsArgs::GetMailboxSettings { user_id } => json_result(
            &client
                .get(&format!("{}/mailboxSettings", user_path(&user_id)?))
                .await?,
        ),
        UserSettingsArgs::UpdateMailboxSettings { user_id, settings } => {
            if settings.is_empty() {
                return Err(ToolError::invalid("settings must not be empty"));
            }
            let resp = client
                .patch(
                    &format!("{}/mailboxSettings", user_path(&user_id)?),
                    Value::Object(settings),
                )
                .await?;
            upstream_result(resp, "Mailbox settings updated")
        }
        UserSettingsArgs::GetManager { user_id } => json_result(
            &client
                .get(&format!("{}/manager", user_path(&user_id)?))
                .await?,
        ),
        UserSettingsArgs::SetManager {
            user_id,
            manager_id,
        } => {
            if manager_id.trim().is_empty() {
                return Err(ToolError::invalid("managerId must not be empty"));
            }
            let body = directory_object_ref(&client.endpoints().graph_base, &manager_id);
            let resp = client
                .put(&format!("{}/manager/$ref", user_path(&user_id)?), body)
                .await?;
            upstream_result(resp, "Manager assigned")
        }
    }
}
