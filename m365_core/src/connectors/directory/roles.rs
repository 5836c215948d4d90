use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};
use crate::utils::{json_result, tool, upstream_result, Hints};

pub const TOOL_NAME: &str = "manage_azure_ad_roles";

const ASSIGNMENTS: &str = "/roleManagement/directory/roleAssignments";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RoleArgs {
    /// Activated directory roles.
    ListRoles,
    #[serde(rename_all = "camelCase")]
    ListRoleAssignments {
        principal_id: Option<String>,
        role_definition_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AssignRole {
        principal_id: String,
        role_definition_id: String,
        /// Defaults to `/` (tenant-wide).
        directory_scope_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RemoveRoleAssignment { assignment_id: String },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<RoleArgs>(
        TOOL_NAME,
        "List Entra ID directory roles and manage role assignments through unified RBAC.",
        Hints::WRITE,
    )
}

/// `$filter` for assignment listing; ids are quoted with OData escaping.
pub fn assignment_filter(principal_id: Option<&str>, role_definition_id: Option<&str>) -> Option<String> {
    let quote = |s: &str| s.replace('\'', "''");
    let mut clauses = Vec::new();
    if let Some(p) = principal_id.filter(|p| !p.is_empty()) {
        clauses.push(format!("principalId eq '{}'", quote(p)));
    }
    if let Some(r) = role_definition_id.filter(|r| !r.is_empty()) {
        clauses.push(format!("roleDefinitionId eq '{}'", quote(r)));
    }
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    }
}

pub(super) async fn run(client: &GraphClient, args: RoleArgs) -> Result<CallToolResult, ToolError> {
    match args {
        RoleArgs::ListRoles => json_result(&client.get("/directoryRoles").await?),
        RoleArgs::ListRoleAssignments {
            principal_id,
            role_definition_id,
        } => {
            let req = ApiRequest::graph(Method::GET, ASSIGNMENTS).query_opt(
                "$filter",
                assignment_filter(principal_id.as_deref(), role_definition_id.as_deref()),
            );
            json_result(&client.send_json(req).await?)
        }
        RoleArgs::AssignRole {
            principal_id,
            role_definition_id,
            directory_scope_id,
        } => {
            if principal_id.trim().is_empty() || role_definition_id.trim().is_empty() {
                return Err(ToolError::invalid(
                    "principalId and roleDefinitionId must not be empty",
                ));
            }
            let body = json!({
                "@odata.type": "#microsoft.graph.unifiedRoleAssignment",
                "principalId": principal_id,
                "roleDefinitionId": role_definition_id,
                "directoryScopeId": directory_scope_id.unwrap_or_else(|| "/".to_string()),
            });
            json_result(&client.post(ASSIGNMENTS, body).await?)
        }
        RoleArgs::RemoveRoleAssignment { assignment_id } => {
            if assignment_id.trim().is_empty() {
                return Err(ToolError::invalid("assignmentId must not be empty"));
            }
            let resp = client
                .delete(&format!("{}/{}", ASSIGNMENTS, seg(&assignment_id)))
                .await?;
            upstream_result(resp, "Role assignment removed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_combines_and_escapes() {
        assert_eq!(assignment_filter(None, None), None);
        assert_eq!(
            assignment_filter(Some("p1"), Some("r'1")).unwrap(),
            "principalId eq 'p1' and roleDefinitionId eq 'r''1'"
        );
    }
}
