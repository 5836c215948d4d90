//! Leaver workflow: sign-out, disable, license and membership cleanup.

use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};
use crate::utils::{json_result, tool, Hints};

pub const TOOL_NAME: &str = "manage_offboarding";

const MAX_MEMBERSHIP_PAGES: usize = 100;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OffboardingArgs {
    /// Revoke sessions, disable the account and remove licenses, in that order.
    #[serde(rename_all = "camelCase")]
    Start {
        user_id: String,
        /// Also remove the user from every assigned group.
        #[serde(default)]
        remove_group_memberships: bool,
    },
    #[serde(rename_all = "camelCase")]
    RevokeSessions { user_id: String },
    #[serde(rename_all = "camelCase")]
    DisableAccount { user_id: String },
    #[serde(rename_all = "camelCase")]
    RemoveLicenses { user_id: String },
    #[serde(rename_all = "camelCase")]
    RemoveGroupMemberships { user_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    pub status: StepStatus,
    pub detail: String,
}

impl StepReport {
    fn from_result(step: &'static str, result: Result<(StepStatus, String), ToolError>) -> Self {
        match result {
            Ok((status, detail)) => StepReport {
                step,
                status,
                detail,
            },
            Err(e) => {
                warn!(step, error = %e, "offboarding step failed");
                StepReport {
                    step,
                    status: StepStatus::Failed,
                    detail: e.to_string(),
                }
            }
        }
    }
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<OffboardingArgs>(
        TOOL_NAME,
        "Offboard a user: revoke sign-in sessions, disable the account, remove licenses and \
         optionally group memberships. `start` runs the full sequence and reports every step.",
        Hints::DESTRUCTIVE,
    )
}

fn user_path(user_id: &str) -> Result<String, ToolError> {
    if user_id.trim().is_empty() {
        return Err(ToolError::invalid("userId must not be empty"));
    }
    Ok(format!("/users/{}", seg(user_id.trim())))
}

async fn revoke_sessions(client: &GraphClient, user: &str) -> Result<(StepStatus, String), ToolError> {
    client
        .post(&format!("{}/revokeSignInSessions", user), json!({}))
        .await?;
    Ok((StepStatus::Completed, "Sign-in sessions revoked".into()))
}

async fn disable_account(client: &GraphClient, user: &str) -> Result<(StepStatus, String), ToolError> {
    client
        .patch(user, json!({ "accountEnabled": false }))
        .await?;
    Ok((StepStatus::Completed, "Account disabled".into()))
}

/// SKU ids currently assigned to a user.
pub fn assigned_sku_ids(user: &Value) -> Vec<String> {
    user.get("assignedLicenses")
        .and_then(|l| l.as_array())
        .into_iter()
        .flatten()
        .filter_map(|l| l.get("skuId").and_then(|s| s.as_str()))
        .map(str::to_string)
        .collect()
}

async fn remove_licenses(client: &GraphClient, user: &str) -> Result<(StepStatus, String), ToolError> {
    let current = client
        .get(&format!("{}?$select=id,assignedLicenses", user))
        .await?;
    let skus = assigned_sku_ids(&current);
    if skus.is_empty() {
        return Ok((StepStatus::Skipped, "No licenses assigned".into()));
    }
    client
        .post(
            &format!("{}/assignLicense", user),
            json!({ "addLicenses": [], "removeLicenses": skus }),
        )
        .await?;
    Ok((
        StepStatus::Completed,
        format!("Removed {} license(s)", skus.len()),
    ))
}

/// Group ids the user can be removed from directly (dynamic groups are excluded).
pub fn removable_group_ids(groups: &[Value]) -> Vec<String> {
    groups
        .iter()
        .filter(|g| {
            !g.get("groupTypes")
                .and_then(|t| t.as_array())
                .is_some_and(|t| t.iter().any(|x| x == "DynamicMembership"))
        })
        .filter_map(|g| g.get("id").and_then(|i| i.as_str()))
        .map(str::to_string)
        .collect()
}

/// `$ref` paths take a directory object id, while callers may pass a UPN.
async fn object_id(client: &GraphClient, user: &str) -> Result<String, ToolError> {
    let found = client.get(&format!("{}?$select=id", user)).await?;
    found
        .get("id")
        .and_then(|i| i.as_str())
        .filter(|i| !i.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ToolError::Upstream {
            status: 200,
            message: "user lookup returned no id".to_string(),
        })
}

async fn remove_group_memberships(
    client: &GraphClient,
    user: &str,
) -> Result<(StepStatus, String), ToolError> {
    let member_id = object_id(client, user).await?;
    let req = ApiRequest::graph(
        Method::GET,
        format!("{}/memberOf/microsoft.graph.group", user),
    )
    .query("$select", "id,displayName,groupTypes");
    let member_of = client.fetch_all(req, MAX_MEMBERSHIP_PAGES).await?;
    let groups = removable_group_ids(&member_of.items);
    if groups.is_empty() && member_of.truncated_at.is_none() {
        return Ok((StepStatus::Skipped, "No removable group memberships".into()));
    }
    let mut failed = Vec::new();
    for group in &groups {
        let path = format!("/groups/{}/members/{}/$ref", seg(group), seg(&member_id));
        if let Err(e) = client.delete(&path).await {
            warn!(group = %group, error = %e, "could not remove group membership");
            failed.push(group.clone());
        }
    }
    let removed = groups.len() - failed.len();
    if member_of.truncated_at.is_some() {
        return Ok((
            StepStatus::Failed,
            format!(
                "Removed from {} group(s); more than {} pages of memberships remain",
                removed, MAX_MEMBERSHIP_PAGES
            ),
        ));
    }
    if failed.is_empty() {
        Ok((
            StepStatus::Completed,
            format!("Removed from {} group(s)", groups.len()),
        ))
    } else {
        Ok((
            StepStatus::Failed,
            format!(
                "Removed from {} of {} group(s); failed: {}",
                removed,
                groups.len(),
                failed.join(", ")
            ),
        ))
    }
}

fn single(step: StepReport) -> Result<CallToolResult, ToolError> {
    json_result(&step)
}

pub(super) async fn run(
    client: &GraphClient,
    args: OffboardingArgs,
) -> Result<CallToolResult, ToolError> {
    match args {
        OffboardingArgs::Start {
            user_id,
            remove_group_memberships: include_groups,
        } => {
            let user = user_path(&user_id)?;
            info!(user_id = %user_id, "starting offboarding");
            let mut steps = vec![
                StepReport::from_result("revoke_sessions", revoke_sessions(client, &user).await),
                StepReport::from_result("disable_account", disable_account(client, &user).await),
                StepReport::from_result("remove_licenses", remove_licenses(client, &user).await),
            ];
            if include_groups {
                steps.push(StepReport::from_result(
                    "remove_group_memberships",
                    remove_group_memberships(client, &user).await,
                ));
            }
            let completed = steps
                .iter()
                .all(|s| s.status != StepStatus::Failed);
            json_result(&json!({
                "userId": user_id,
                "completed": completed,
                "steps": steps,
            }))
        }
        OffboardingArgs::RevokeSessions { user_id } => {
            let user = user_path(&user_id)?;
            let (status, detail) = revoke_sessions(client, &user).await?;
            single(StepReport { step: "revoke_sessions", status, detail })
        }
        OffboardingArgs::DisableAccount { user_id } => {
            let user = user_path(&user_id)?;
            let (status, detail) = disable_account(client, &user).await?;
            single(StepReport { step: "disable_account", status, detail })
        }
        OffboardingArgs::RemoveLicenses { user_id } => {
            let user = user_path(&user_id)?;
            let (status, detail) = remove_licenses(client, &user).await?;
            single(StepReport { step: "remove_licenses", status, detail })
        }
        OffboardingArgs::RemoveGroupMemberships { user_id } => {
            let user = user_path(&user_id)?;
            let (status, detail) = remove_group_memberships(client, &user).await?;
            single(StepReport {
                step: "remove_group_memberships",
                status,
                detail,
            })
        }
    }
}
