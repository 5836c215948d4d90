//! `generate_audit_reports`: audit log pulls summarised into report-ready aggregates.

use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

use crate::connectors::security::audit::{audit_request, AuditQuery, AuditSource};
use crate::error::ToolError;
use crate::graph_client::GraphClient;
use crate::utils::{json_result, tool, Hints};

pub const TOOL_NAME: &str = "generate_audit_reports";

const DEFAULT_MAX_PAGES: usize = 10;
const TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// Sign-in outcomes by application, location and user.
    SignInActivity,
    /// Directory changes by category, activity and initiator.
    DirectoryChanges,
    /// Provisioning outcomes by action and status.
    Provisioning,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditReportArgs {
    pub report_type: ReportType,
    pub start_date_time: Option<String>,
    pub end_date_time: Option<String>,
    pub user_principal_name: Option<String>,
    /// Pages of audit records to aggregate (default 10).
    pub max_pages: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountEntry {
    pub key: String,
    pub count: usize,
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<AuditReportArgs>(
        TOOL_NAME,
        "Generate aggregated audit reports (sign-in activity, directory changes, provisioning) \
         over a time window.",
        Hints::READ_ONLY,
    )
}

/// Most frequent keys, ties broken alphabetically.
pub fn top_counts<'a>(keys: impl Iterator<Item = &'a str>, n: usize) -> Vec<CountEntry> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for k in keys {
        *counts.entry(k).or_default() += 1;
    }
    let mut out: Vec<CountEntry> = counts
        .into_iter()
        .map(|(key, count)| CountEntry {
            key: key.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    out.truncate(n);
    out
}

fn str_at<'a>(v: &'a Value, pointer: &str) -> &'a str {
    v.pointer(pointer).and_then(|s| s.as_str()).unwrap_or("unknown")
}

pub fn summarize_sign_ins(records: &[Value]) -> Value {
    let failed: Vec<&Value> = records
        .iter()
        .filter(|r| r.pointer("/status/errorCode").and_then(|c| c.as_i64()).unwrap_or(0) != 0)
        .collect();
    json!({
        "total": records.len(),
        "successful": records.len() - failed.len(),
        "failed": failed.len(),
        "byApplication": top_counts(records.iter().map(|r| str_at(r, "/appDisplayName")), TOP_N),
        "byCountry": top_counts(records.iter().map(|r| str_at(r, "/location/countryOrRegion")), TOP_N),
        "topFailingUsers": top_counts(failed.iter().map(|r| str_at(r, "/userPrincipalName")), TOP_N),
        "failureReasons": top_counts(failed.iter().map(|r| str_at(r, "/status/failureReason")), TOP_N),
    })
}

pub fn summarize_directory_changes(records: &[Value]) -> Value {
    let initiator = |r: &Value| -> String {
        r.pointer("/initiatedBy/user/userPrincipalName")
            .or_else(|| r.pointer("/initiatedBy/app/displayName"))
            .and_then(|s| s.as_str())
            .unwrap_or("unknown")
            .to_string()
    };
    let initiators: Vec<String> = records.iter().map(initiator).collect();
    json!({
        "total": records.len(),
        "byCategory": top_counts(records.iter().map(|r| str_at(r, "/category")), TOP_N),
        "byActivity": top_counts(records.iter().map(|r| str_at(r, "/activityDisplayName")), TOP_N),
        "byResult": top_counts(records.iter().map(|r| str_at(r, "/result")), TOP_N),
        "topInitiators": top_counts(initiators.iter().map(String::as_str), TOP_N),
    })
}

pub fn summarize_provisioning(records: &[Value]) -> Value {
    json!({
        "total": records.len(),
        "byAction": top_counts(records.iter().map(|r| str_at(r, "/provisioningAction")), TOP_N),
        "byStatus": top_counts(records.iter().map(|r| str_at(r, "/provisioningStatusInfo/status")), TOP_N),
        "bySourceSystem": top_counts(records.iter().map(|r| str_at(r, "/sourceSystem/displayName")), TOP_N),
    })
}

pub(super) async fn run(
    client: &GraphClient,
    args: AuditReportArgs,
) -> Result<CallToolResult, ToolError> {
    let source = match args.report_type {
        ReportType::SignInActivity => AuditSource::SignIns,
        ReportType::DirectoryChanges => AuditSource::DirectoryAudits,
        ReportType::Provisioning => AuditSource::Provisioning,
    };
    let query = AuditQuery {
        start_date_time: args.start_date_time.clone(),
        end_date_time: args.end_date_time.clone(),
        user_principal_name: args.user_principal_name.clone(),
        filter: None,
        top: None,
    };
    let req = audit_request(source, &query)?;
    let pages = client
        .fetch_all(req, args.max_pages.unwrap_or(DEFAULT_MAX_PAGES))
        .await?;
    info!(
        report = ?args.report_type,
        records = pages.items.len(),
        pages = pages.pages,
        "aggregating audit report"
    );

    let summary = match args.report_type {
        ReportType::SignInActivity => summarize_sign_ins(&pages.items),
        ReportType::DirectoryChanges => summarize_directory_changes(&pages.items),
        ReportType::Provisioning => summarize_provisioning(&pages.items),
    };
    json_result(&json!({
        "reportType": args.report_type,
        "window": {
            "start": args.start_date_time,
            "end": args.end_date_time,
        },
        "recordsAnalyzed": pages.items.len(),
        "truncated": pages.truncated_at.is_some(),
        "generatedAt": chrono::Utc::now().to_rfc3339(),
        "summary": summary,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_are_sorted_and_truncated() {
        let keys = ["b", "a", "b", "c", "a", "b"];
        let out = top_counts(keys.iter().copied(), 2);
        assert_eq!(
            out,
            vec![
                CountEntry { key: "b".into(), count: 3 },
                CountEntry { key: "a".into(), count: 2 },
            ]
        );
    }

    #[test]
    fn sign_in_summary_splits_failures() {
        let records = vec![
            json!({"appDisplayName": "Outlook", "userPrincipalName": "a@contoso.com",
                   "status": {"errorCode": 0}, "location": {"countryOrRegion": "US"}}),
            json!({"appDisplayName": "Teams", "userPrincipalName": "b@contoso.com",
                   "status": {"errorCode": 50126, "failureReason": "Invalid username or password"},
                   "location": {"countryOrRegion": "DE"}}),
            json!({"appDisplayName": "Outlook", "userPrincipalName": "b@contoso.com",
                   "status": {"errorCode": 50126, "failureReason": "Invalid username or password"}}),
        ];
        let out = summarize_sign_ins(&records);
        assert_eq!(out["total"], 3);
        assert_eq!(out["failed"], 2);
        assert_eq!(out["byApplication"][0]["key"], "Outlook");
        assert_eq!(out["topFailingUsers"][0], json!({"key": "b@contoso.com", "count": 2}));
        assert_eq!(out["byCountry"][0]["key"], "DE");
    }

    #[test]
    fn directory_changes_group_by_initiator() {
        let records = vec![
            json!({"category": "GroupManagement", "activityDisplayName": "Add member to group",
                   "result": "success", "initiatedBy": {"user": {"userPrincipalName": "admin@contoso.com"}}}),
            json!({"category": "ApplicationManagement", "activityDisplayName": "Update application",
                   "result": "success", "initiatedBy": {"app": {"displayName": "Provisioning"}}}),
        ];
        let out = summarize_directory_changes(&records);
        assert_eq!(out["total"], 2);
        assert_eq!(out["byResult"][0], json!({"key": "success", "count": 2}));
        assert_eq!(out["topInitiators"].as_array().unwrap().len(), 2);
    }
}
