//! Sensitivity labels (beta, read-only) and retention labels.

use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};
use crate::utils::{json_result, tool, upstream_result, Hints};

pub const SENSITIVITY_TOOL: &str = "manage_sensitivity_labels";
pub const RETENTION_TOOL: &str = "manage_retention_labels";

const SENSITIVITY_LABELS: &str = "/security/informationProtection/sensitivityLabels";
const RETENTION_LABELS: &str = "/security/labels/retentionLabels";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SensitivityLabelArgs {
    List,
    #[serde(rename_all = "camelCase")]
    Get { label_id: String },
    /// Labels available to a specific user.
    #[serde(rename_all = "camelCase")]
    ListUserLabels { user_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RetentionBehavior {
    DoNotRetain,
    #[default]
    Retain,
    RetainAsRecord,
    RetainAsRegulatoryRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RetentionAction {
    #[default]
    None,
    Delete,
    StartDispositionReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RetentionTrigger {
    #[default]
    DateLabeled,
    DateCreated,
    DateModified,
    DateOfEvent,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewRetentionLabel {
    pub display_name: String,
    /// Retention period in days; omit for indefinite retention.
    pub retention_days: Option<u32>,
    #[serde(default)]
    pub behavior_during_retention_period: RetentionBehavior,
    #[serde(default)]
    pub action_after_retention_period: RetentionAction,
    #[serde(default)]
    pub retention_trigger: RetentionTrigger,
    pub description_for_admins: Option<String>,
    pub description_for_users: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RetentionLabelArgs {
    List,
    #[serde(rename_all = "camelCase")]
    Get { label_id: String },
    Create(NewRetentionLabel),
    #[serde(rename_all = "camelCase")]
    Delete { label_id: String },
}

pub(super) fn definitions() -> Result<Vec<Tool>, ToolError> {
    Ok(vec![
        tool::<SensitivityLabelArgs>(
            SENSITIVITY_TOOL,
            "List Microsoft Purview sensitivity labels for the tenant or a user (Graph beta).",
            Hints::READ_ONLY,
        )?,
        tool::<RetentionLabelArgs>(
            RETENTION_TOOL,
            "Manage Microsoft Purview retention labels.",
            Hints::WRITE,
        )?,
    ])
}

fn id_segment(field: &str, id: &str) -> Result<String, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::invalid(format!("{} must not be empty", field)));
    }
    Ok(seg(id.trim()))
}

pub fn retention_label_body(label: &NewRetentionLabel) -> Result<Value, ToolError> {
    if label.display_name.trim().is_empty() {
        return Err(ToolError::invalid("displayName must not be empty"));
    }
    let duration = match label.retention_days {
        Some(0) => return Err(ToolError::invalid("retentionDays must be positive")),
        Some(days) => json!({
            "@odata.type": "microsoft.graph.security.retentionDurationInDays",
            "days": days
        }),
        None => json!({ "@odata.type": "microsoft.graph.security.retentionDurationForever" }),
    };
    let mut body = json!({
        "displayName": label.display_name,
        "behaviorDuringRetentionPeriod": label.behavior_during_retention_period,
        "actionAfterRetentionPeriod": label.action_after_retention_period,
        "retentionTrigger": label.retention_trigger,
        "retentionDuration": duration,
    });
    if let Some(d) = &label.description_for_admins {
        body["descriptionForAdmins"] = json!(d);
    }
    if let Some(d) = &label.description_for_users {
        body["descriptionForUsers"] = json!(d);
    }
    Ok(body)
}

pub(super) async fn run_sensitivity(
    client: &GraphClient,
    args: SensitivityLabelArgs,
) -> Result<CallToolResult, ToolError> {
    let path = match args {
        SensitivityLabelArgs::List => SENSITIVITY_LABELS.to_string(),
        SensitivityLabelArgs::Get { label_id } => {
            format!("{}/{}", SENSITIVITY_LABELS, id_segment("labelId", &label_id)?)
        }
        SensitivityLabelArgs::ListUserLabels { user_id } => format!(
            "/users/{}{}",
            id_segment("userId", &user_id)?,
            SENSITIVITY_LABELS
        ),
    };
    let req = ApiRequest::graph(Method::GET, path).beta();
    json_result(&client.send_json(req).await?)
}

pub(super) async fn run_retention(
    client: &GraphClient,
    args: RetentionLabelArgs,
) -> Result<CallToolResult, ToolError> {
    match args {
        RetentionLabelArgs::List => json_result(&client.get(RETENTION_LABELS).await?),
        RetentionLabelArgs::Get { label_id } => json_result(
            &client
                .get(&format!("{}/{}", RETENTION_LABELS, id_segment("labelId", &label_id)?))
                .await?,
        ),
        RetentionLabelArgs::Create(label) => {
            let body = retention_label_body(&label)?;
            json_result(&client.post(RETENTION_LABELS, body).await?)
        }
        RetentionLabelArgs::Delete { label_id } => {
            let resp = client
                .delete(&format!("{}/{}", RETENTION_LABELS, id_segment("labelId", &label_id)?))
                .await?;
            upstream_result(resp, "Retention label deleted")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn label(v: Value) -> NewRetentionLabel {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn retention_body_defaults() {
        let body = retention_label_body(&label(json!({
            "displayName": "Finance - 7 years",
            "retentionDays": 2555
        })))
        .unwrap();
        assert_eq!(
            body,
            json!({
                "displayName": "Finance - 7 years",
                "behaviorDuringRetentionPeriod": "retain",
                "actionAfterRetentionPeriod": "none",
                "retentionTrigger": "dateLabeled",
                "retentionDuration": {
                    "@odata.type": "microsoft.graph.security.retentionDurationInDays",
                    "days": 2555
                }
            })
        );
    }

    #[test]
    fn indefinite_and_invalid_durations() {
        let body = retention_label_body(&label(json!({"displayName": "Legal hold"}))).unwrap();
        assert_eq!(
            body["retentionDuration"]["@odata.type"],
            "microsoft.graph.security.retentionDurationForever"
        );
        assert!(retention_label_body(&label(json!({"displayName": "x", "retentionDays": 0}))).is_err());
    }
}
