use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};
use crate::utils::{json_result, require_non_empty, tool, Hints};

pub const TOOL_NAME: &str = "manage_sharepoint_sites";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SitePermissionRole {
    Read,
    Write,
    Manage,
    FullControl,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SiteArgs {
    /// All sites visible to the app.
    #[serde(rename_all = "camelCase")]
    List { top: Option<u32> },
    #[serde(rename_all = "camelCase")]
    Search { query: String, top: Option<u32> },
    /// Site id, or `hostname:/sites/path` form.
    #[serde(rename_all = "camelCase")]
    Get { site_id: String },
    #[serde(rename_all = "camelCase")]
    ListDrives { site_id: String },
    #[serde(rename_all = "camelCase")]
    ListPermissions { site_id: String },
    /// Grant an application access to a site (Sites.Selected).
    #[serde(rename_all = "camelCase")]
    GrantPermission {
        site_id: String,
        app_id: String,
        app_display_name: String,
        roles: Vec<SitePermissionRole>,
    },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<SiteArgs>(
        TOOL_NAME,
        "List and search SharePoint sites, inspect drives and permissions, and grant app access.",
        Hints::WRITE,
    )
}

/// Site ids may contain `,` and `:` (composite ids, path addressing). Path-addressed ids
/// are closed with `:` so sub-resources can be appended.
pub fn site_path(site_id: &str) -> Result<String, ToolError> {
    let id = site_id.trim();
    if id.is_empty() {
        return Err(ToolError::invalid("siteId must not be empty"));
    }
    if id.contains(":/") {
        let id = id.trim_end_matches(':').trim_end_matches('/');
        return Ok(format!("/sites/{}:", id.replace(' ', "%20")));
    }
    Ok(format!("/sites/{}", seg(id).replace("%2C", ",")))
}

pub(super) async fn run(client: &GraphClient, args: SiteArgs) -> Result<CallToolResult, ToolError> {
    match args {
        SiteArgs::List { top } => {
            let req = ApiRequest::graph(Method::GET, "/sites")
                .query("search", "*")
                .query_opt("$top", top);
            json_result(&client.send_json(req).await?)
        }
        SiteArgs::Search { query, top } => {
            if query.trim().is_empty() {
                return Err(ToolError::invalid("query must not be empty"));
            }
            let req = ApiRequest::graph(Method::GET, "/sites")
                .query("search", query.trim())
                .query_opt("$top", top);
            json_result(&client.send_json(req).await?)
        }
        SiteArgs::Get { site_id } => json_result(&client.get(&site_path(&site_id)?).await?),
        SiteArgs::ListDrives { site_id } => {
            json_result(&client.get(&format!("{}/drives", site_path(&site_id)?)).await?)
        }
        SiteArgs::ListPermissions { site_id } => json_result(
            &client
                .get(&format!("{}/permissions", site_path(&site_id)?))
                .await?,
        ),
        SiteArgs::GrantPermission {
            site_id,
            app_id,
            app_display_name,
            roles,
        } => {
            require_non_empty("roles", &roles)?;
            if app_id.trim().is_empty() {
                return Err(ToolError::invalid("appId must not be empty"));
            }
            let body = json!({
                "roles": roles,
                "grantedToIdentities": [{
                    "application": { "id": app_id, "displayName": app_display_name }
                }]
            });
            json_result(
                &client
                    .post(&format!("{}/permissions", site_path(&site_id)?), body)
                    .await?,
            )
        }
    }
}
