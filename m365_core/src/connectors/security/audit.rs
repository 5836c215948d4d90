use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::ToolError;
use crate::graph_client::{ApiRequest, GraphClient};
use crate::utils::{json_result, tool, Hints};

pub const TOOL_NAME: &str = "search_audit_log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSource {
    DirectoryAudits,
    SignIns,
    Provisioning,
}

impl AuditSource {
    pub fn path(self) -> &'static str {
        match self {
            AuditSource::DirectoryAudits => "/auditLogs/directoryAudits",
            AuditSource::SignIns => "/auditLogs/signIns",
            AuditSource::Provisioning => "/auditLogs/provisioning",
        }
    }

    /// Timestamp property each log is filtered on.
    pub fn time_field(self) -> &'static str {
        match self {
            AuditSource::SignIns => "createdDateTime",
            AuditSource::DirectoryAudits | AuditSource::Provisioning => "activityDateTime",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    /// ISO 8601 lower bound, e.g. `2024-06-01T00:00:00Z`.
    pub start_date_time: Option<String>,
    pub end_date_time: Option<String>,
    /// Limit to one user (sign-ins: `userPrincipalName`; audits: `initiatedBy/user`).
    pub user_principal_name: Option<String>,
    /// Extra OData filter AND-ed with the above.
    pub filter: Option<String>,
    pub top: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditArgs {
    DirectoryAudits(AuditQuery),
    SignIns(AuditQuery),
    Provisioning(AuditQuery),
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<AuditArgs>(
        TOOL_NAME,
        "Search Entra ID audit logs: directory audits, sign-ins and provisioning events, \
         filtered by time window and user.",
        Hints::READ_ONLY,
    )
}

fn parse_instant(field: &str, value: &str) -> Result<DateTime<Utc>, ToolError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ToolError::invalid(format!("{} must be an ISO 8601 timestamp", field)))
}

/// Build the `$filter` for one audit source; `None` when no constraint applies.
pub fn audit_filter(source: AuditSource, query: &AuditQuery) -> Result<Option<String>, ToolError> {
    let mut clauses = Vec::new();
    let field = source.time_field();
    let start = query
        .start_date_time
        .as_deref()
        .map(|s| parse_instant("startDateTime", s))
        .transpose()?;
    let end = query
        .end_date_time
        .as_deref()
        .map(|s| parse_instant("endDateTime", s))
        .transpose()?;
    if let (Some(s), Some(e)) = (start, end) {
        if e <= s {
            return Err(ToolError::invalid("endDateTime must be after startDateTime"));
        }
    }
    if let Some(s) = start {
        clauses.push(format!("{} ge {}", field, s.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    if let Some(e) = end {
        clauses.push(format!("{} le {}", field, e.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    if let Some(upn) = query.user_principal_name.as_deref().filter(|u| !u.is_empty()) {
        let upn = upn.replace('\'', "''");
        clauses.push(match source {
            AuditSource::SignIns => format!("userPrincipalName eq '{}'", upn),
            AuditSource::DirectoryAudits => format!("initiatedBy/user/userPrincipalName eq '{}'", upn),
            AuditSource::Provisioning => format!("initiatedBy/displayName eq '{}'", upn),
        });
    }
    if let Some(f) = query.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        clauses.push(format!("({})", f));
    }
    Ok(if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    })
}

pub fn audit_request(source: AuditSource, query: &AuditQuery) -> Result<ApiRequest, ToolError> {
    Ok(ApiRequest::graph(Method::GET, source.path())
        .query_opt("$filter", audit_filter(source, query)?)
        .query_opt("$top", query.top))
}

pub(super) async fn run(client: &GraphClient, args: AuditArgs) -> Result<CallToolResult, ToolError> {
    let (source, query) = match args {
        AuditArgs::DirectoryAudits(q) => (AuditSource::DirectoryAudits, q),
        AuditArgs::SignIns(q) => (AuditSource::SignIns, q),
        AuditArgs::Provisioning(q) => (AuditSource::Provisioning, q),
    };
    json_result(&client.send_json(audit_request(source, &query)?).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn window_and_user_become_filters() {
        let query = AuditQuery {
            start_date_time: Some("2024-06-01T00:00:00Z".into()),
            end_date_time: Some("2024-06-02T00:00:00+00:00".into()),
            user_principal_name: Some("adele@contoso.com".into()),
            ..Default::default()
        };
        assert_eq!(
            audit_filter(AuditSource::SignIns, &query).unwrap().unwrap(),
            "createdDateTime ge 2024-06-01T00:00:00Z and createdDateTime le 2024-06-02T00:00:00Z \
             and userPrincipalName eq 'adele@contoso.com'"
        );
    }

    #[test]
    fn empty_query_has_no_filter() {
        assert_eq!(
            audit_filter(AuditSource::DirectoryAudits, &AuditQuery::default()).unwrap(),
            None
        );
    }

    #[test]
    fn bad_or_inverted_windows_are_rejected() {
        let bad = AuditQuery {
            start_date_time: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(audit_filter(AuditSource::Provisioning, &bad).is_err());
        let inverted = AuditQuery {
            start_date_time: Some("2024-06-02T00:00:00Z".into()),
            end_date_time: Some("2024-06-01T00:00:00Z".into()),
            ..Default::default()
        };
        assert!(audit_filter(AuditSource::Provisioning, &inverted).is_err());
    }
}
