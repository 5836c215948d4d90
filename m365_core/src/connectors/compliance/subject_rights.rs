use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{json_result, list_request, tool, Hints, ListQuery};

pub const TOOL_NAME: &str = "manage_subject_rights_requests";

const REQUESTS: &str = "/security/subjectRightsRequests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    Export,
    Delete,
    Access,
    TagForAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DataSubjectType {
    #[default]
    Customer,
    CurrentEmployee,
    FormerEmployee,
    ProspectiveEmployee,
    Student,
    Teacher,
    Faculty,
    Other,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataSubject {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Country or region of residency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residency: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewSubjectRightsRequest {
    pub display_name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub data_subject: DataSubject,
    #[serde(default)]
    pub data_subject_type: DataSubjectType,
    /// Defaults to `["GDPR"]`.
    #[serde(default)]
    pub regulations: Vec<String>,
    /// ISO 8601 internal deadline.
    pub internal_due_date_time: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SubjectRightsArgs {
    List(ListQuery),
    #[serde(rename_all = "camelCase")]
    Get { request_id: String },
    Create(NewSubjectRightsRequest),
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<SubjectRightsArgs>(
        TOOL_NAME,
        "List, inspect and open Microsoft Purview subject rights (DSAR) requests.",
        Hints::WRITE,
    )
}

pub fn create_body(req: &NewSubjectRightsRequest) -> Result<Value, ToolError> {
    if req.display_name.trim().is_empty() {
        return Err(ToolError::invalid("displayName must not be empty"));
    }
    if !req.data_subject.email.contains('@') {
        return Err(ToolError::invalid("dataSubject.email must be an email address"));
    }
    let regulations = if req.regulations.is_empty() {
        vec!["GDPR".to_string()]
    } else {
        req.regulations.clone()
    };
    let mut body = json!({
        "displayName": req.display_name,
        "type": req.request_type,
        "dataSubject": req.data_subject,
        "dataSubjectType": req.data_subject_type,
        "regulations": regulations,
    });
    if let Some(d) = &req.description {
        body["description"] = json!(d);
    }
    if let Some(due) = &req.internal_due_date_time {
        chrono::DateTime::parse_from_rfc3339(due).map_err(|_| {
            ToolError::invalid("internalDueDateTime must be an ISO 8601 timestamp")
        })?;
        body["internalDueDateTime"] = json!(due);
    }
    if let Some(id) = &req.external_id {
        body["externalId"] = json!(id);
    }
    Ok(body)
}

pub(super) async fn run(
    client: &GraphClient,
    args: SubjectRightsArgs,
) -> Result<CallToolResult, ToolError> {
    match args {
        SubjectRightsArgs::List(query) => {
            json_result(&client.send_json(list_request(REQUESTS, &query)).await?)
        }
        SubjectRightsArgs::Get { request_id } => {
            if request_id.trim().is_empty() {
                return Err(ToolError::invalid("requestId must not be empty"));
            }
            json_result(
                &client
                    .get(&format!("{}/{}", REQUESTS, seg(request_id.trim())))
                    .await?,
            )
        }
        SubjectRightsArgs::Create(req) => {
            let body = create_body(&req)?;
            json_result(&client.post(REQUESTS, body).await?)
        }
    }
}
