use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{directory_object_ref, json_result, list_request, tool, upstream_result, Hints, ListQuery};

pub const TOOL_NAME: &str = "manage_azure_ad_apps";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AppArgs {
    List(ListQuery),
    #[serde(rename_all = "camelCase")]
    Get {
        /// Application object id (not the client/app id).
        app_object_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Create {
        display_name: String,
        /// `AzureADMyOrg` (default), `AzureADMultipleOrgs`, ...
        sign_in_audience: Option<String>,
        /// Web redirect URIs.
        #[serde(default)]
        redirect_uris: Vec<String>,
        /// Extra application properties merged into the request body.
        properties: Option<Map<String, Value>>,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        app_object_id: String,
        properties: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    Delete { app_object_id: String },
    #[serde(rename_all = "camelCase")]
    AddOwner {
        app_object_id: String,
        owner_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RemoveOwner {
        app_object_id: String,
        owner_id: String,
    },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<AppArgs>(
        TOOL_NAME,
        "Manage Entra ID application registrations and their owners.",
        Hints::WRITE,
    )
}

fn app_path(id: &str) -> Result<String, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::invalid("appObjectId must not be empty"));
    }
    Ok(format!("/applications/{}", seg(id.trim())))
}

pub fn create_body(
    display_name: &str,
    sign_in_audience: Option<&str>,
    redirect_uris: &[String],
    properties: Option<Map<String, Value>>,
) -> Result<Value, ToolError> {
    if display_name.trim().is_empty() {
        return Err(ToolError::invalid("displayName must not be empty"));
    }
    let mut body = properties.unwrap_or_default();
    body.insert("displayName".into(), json!(display_name));
    body.insert(
        "signInAudience".into(),
        json!(sign_in_audience.unwrap_or("AzureADMyOrg")),
    );
    if !redirect_uris.is_empty() {
        body.insert("web".into(), json!({ "redirectUris": redirect_uris }));
    }
    Ok(Value::Object(body))
}

pub(super) async fn run(client: &GraphClient, args: AppArgs) -> Result<CallToolResult, ToolError> {
    match args {
        AppArgs::List(query) => {
            json_result(&client.send_json(list_request("/applications", &query)).await?)
        }
        AppArgs::Get { app_object_id } => json_result(&client.get(&app_path(&app_object_id)?).await?),
        AppArgs::Create {
            display_name,
            sign_in_audience,
            redirect_uris,
            properties,
        } => {
            let body = create_body(
                &display_name,
                sign_in_audience.as_deref(),
                &redirect_uris,
                properties,
            )?;
            json_result(&client.post("/applications", body).await?)
        }
        AppArgs::Update {
            app_object_id,
            properties,
        } => {
            if properties.is_empty() {
                return Err(ToolError::invalid("properties must not be empty"));
            }
            let resp = client
                .patch(&app_path(&app_object_id)?, Value::Object(properties))
                .await?;
            upstream_result(resp, "Application updated")
        }
        AppArgs::Delete { app_object_id } => {
            let resp = client.delete(&app_path(&app_object_id)?).await?;
            upstream_result(resp, "Application deleted")
        }
        AppArgs::AddOwner {
            app_object_id,
            owner_id,
        } => {
            let body = directory_object_ref(&client.endpoints().graph_base, &owner_id);
            let resp = client
                .post(&format!("{}/owners/$ref", app_path(&app_object_id)?), body)
                .await?;
            upstream_result(resp, "Owner added")
        }
        AppArgs::RemoveOwner {
            app_object_id,
            owner_id,
        } => {
            let resp = client
                .delete(&format!(
                    "{}/owners/{}/$ref",
                    app_path(&app_object_id)?,
                    seg(&owner_id)
                ))
                .await?;
            upstream_result(resp, "Owner removed")
        }
    }
}
