use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{json_result, list_request, tool, upstream_result, Hints, ListQuery};

pub const TOOL_NAME: &str = "manage_service_principals";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServicePrincipalArgs {
    List(ListQuery),
    #[serde(rename_all = "camelCase")]
    Get { service_principal_id: String },
    /// Instantiate an application in this tenant.
    #[serde(rename_all = "camelCase")]
    Create {
        /// Client (application) id of the app registration.
        app_id: String,
        properties: Option<Map<String, Value>>,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        service_principal_id: String,
        properties: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    Delete { service_principal_id: String },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<ServicePrincipalArgs>(
        TOOL_NAME,
        "Manage service principals (enterprise applications) in the tenant.",
        Hints::WRITE,
    )
}

fn sp_path(id: &str) -> Result<String, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::invalid("servicePrincipalId must not be empty"));
    }
    Ok(format!("/servicePrincipals/{}", seg(id.trim())))
}

pub(super) async fn run(
    client: &GraphClient,
    args: ServicePrincipalArgs,
) -> Result<CallToolResult, ToolError> {
    match args {
        ServicePrincipalArgs::List(query) => {
            json_result(&client.send_json(list_request("/servicePrincipals", &query)).await?)
        }
        ServicePrincipalArgs::Get {
            service_principal_id,
        } => json_result(&client.get(&sp_path(&service_principal_id)?).await?),
        ServicePrincipalArgs::Create { app_id, properties } => {
            if app_id.trim().is_empty() {
                return Err(ToolError::invalid("appId must not be empty"));
            }
            let mut body = properties.unwrap_or_default();
            body.insert("appId".into(), json!(app_id));
            json_result(&client.post("/servicePrincipals", Value::Object(body)).await?)
        }
        ServicePrincipalArgs::Update {
            service_principal_id,
            properties,
        } => {
            if properties.is_empty() {
                return Err(ToolError::invalid("properties must not be empty"));
            }
            let resp = client
                .patch(&sp_path(&service_principal_id)?, Value::Object(properties))
                .await?;
            upstream_result(resp, "Service principal updated")
        }
        ServicePrincipalArgs::Delete {
            service_principal_id,
        } => {
            let resp = client.delete(&sp_path(&service_principal_id)?).await?;
            upstream_result(resp, "Service principal deleted")
        }
    }
}
