use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{json_result, list_request, tool, upstream_result, Hints, ListQuery};

pub const TOOL_NAME: &str = "manage_intune_devices";

const MANAGED_DEVICES: &str = "/deviceManagement/managedDevices";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IntuneDeviceArgs {
    List(ListQuery),
    #[serde(rename_all = "camelCase")]
    Get { device_id: String },
    #[serde(rename_all = "camelCase")]
    Sync { device_id: String },
    #[serde(rename_all = "camelCase")]
    Restart { device_id: String },
    /// Remove company data and management; personal data stays.
    #[serde(rename_all = "camelCase")]
    Retire { device_id: String },
    /// Factory reset.
    #[serde(rename_all = "camelCase")]
    Wipe {
        device_id: String,
        #[serde(default)]
        keep_enrollment_data: bool,
        #[serde(default)]
        keep_user_data: bool,
    },
    #[serde(rename_all = "camelCase")]
    RemoteLock { device_id: String },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<IntuneDeviceArgs>(
        TOOL_NAME,
        "List Intune managed devices and run remote actions: sync, restart, retire, wipe, remote lock.",
        Hints::DESTRUCTIVE,
    )
}

fn device_path(id: &str) -> Result<String, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::invalid("deviceId must not be empty"));
    }
    Ok(format!("{}/{}", MANAGED_DEVICES, seg(id.trim())))
}

async fn remote_action(
    client: &GraphClient,
    device_id: &str,
    action: &str,
    body: serde_json::Value,
    done: &str,
) -> Result<CallToolResult, ToolError> {
    let path = format!("{}/{}", device_path(device_id)?, action);
    info!(device_id, action, "issuing Intune remote action");
    let resp = client.post(&path, body).await?;
    upstream_result(resp, done)
}

pub(super) async fn run(
    client: &GraphClient,
    args: IntuneDeviceArgs,
) -> Result<CallToolResult, ToolError> {
    match args {
        IntuneDeviceArgs::List(query) => {
            json_result(&client.send_json(list_request(MANAGED_DEVICES, &query)).await?)
        }
        IntuneDeviceArgs::Get { device_id } => {
            json_result(&client.get(&device_path(&device_id)?).await?)
        }
        IntuneDeviceArgs::Sync { device_id } => {
            remote_action(client, &device_id, "syncDevice", json!({}), "Sync requested").await
        }
        IntuneDeviceArgs::Restart { device_id } => {
            remote_action(client, &device_id, "rebootNow", json!({}), "Restart requested").await
        }
        IntuneDeviceArgs::Retire { device_id } => {
            remote_action(client, &device_id, "retire", json!({}), "Retire requested").await
        }
        IntuneDeviceArgs::Wipe {
            device_id,
            keep_enrollment_data,
            keep_user_data,
        } => {
            let body = json!({
                "keepEnrollmentData": keep_enrollment_data,
                "keepUserData": keep_user_data,
            });
            remote_action(client, &device_id, "wipe", body, "Wipe requested").await
        }
        IntuneDeviceArgs::RemoteLock { device_id } => {
            remote_action(client, &device_id, "remoteLock", json!({}), "Remote lock requested")
                .await
        }
    }
}
