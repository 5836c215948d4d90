use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{json_result, list_request, tool, upstream_result, Hints, ListQuery};

pub const TOOL_NAME: &str = "manage_azure_ad_devices";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeviceArgs {
    List(ListQuery),
    #[serde(rename_all = "camelCase")]
    Get { device_id: String },
    #[serde(rename_all = "camelCase")]
    Enable { device_id: String },
    #[serde(rename_all = "camelCase")]
    Disable { device_id: String },
    #[serde(rename_all = "camelCase")]
    Delete { device_id: String },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<DeviceArgs>(
        TOOL_NAME,
        "List, inspect, enable, disable and delete Entra ID registered devices.",
        Hints::WRITE,
    )
}

fn device_path(id: &str) -> Result<String, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::invalid("deviceId must not be empty"));
    }
    Ok(format!("/devices/{}", seg(id.trim())))
}

pub(super) async fn run(client: &GraphClient, args: DeviceArgs) -> Result<CallToolResult, ToolError> {
    match args {
        DeviceArgs::List(query) => {
            json_result(&client.send_json(list_request("/devices", &query)).await?)
        }
        DeviceArgs::Get { device_id } => json_result(&client.get(&device_path(&device_id)?).await?),
        DeviceArgs::Enable { device_id } => {
            let resp = client
                .patch(&device_path(&device_id)?, json!({ "accountEnabled": true }))
                .await?;
            upstream_result(resp, "Device enabled")
        }
        DeviceArgs::Disable { device_id } => {
            let resp = client
                .patch(&device_path(&device_id)?, json!({ "accountEnabled": false }))
                .await?;
            upstream_result(resp, "Device disabled")
        }
        DeviceArgs::Delete { device_id } => {
            let resp = client.delete(&device_path(&device_id)?).await?;
            upstream_result(resp, "Device deleted")
        }
    }
}
