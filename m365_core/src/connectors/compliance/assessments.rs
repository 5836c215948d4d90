//! Secure Score based compliance assessment.

use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::ToolError;
use crate::graph_client::{ApiRequest, GraphClient};
use crate::utils::{json_result, tool, Hints};

pub const TOOL_NAME: &str = "manage_compliance_assessments";

const SECURE_SCORES: &str = "/security/secureScores";
const CONTROL_PROFILES: &str = "/security/secureScoreControlProfiles";
const DEFAULT_TOP_GAPS: usize = 10;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AssessmentArgs {
    /// Most recent Secure Score snapshots (default 1).
    #[serde(rename_all = "camelCase")]
    SecureScore { top: Option<u32> },
    #[serde(rename_all = "camelCase")]
    ControlProfiles {
        /// e.g. `Identity`, `Data`, `Device`, `Apps`.
        category: Option<String>,
        top: Option<u32>,
    },
    /// Compare the latest score against control maximums and rank the gaps.
    #[serde(rename_all = "camelCase")]
    Assess {
        category: Option<String>,
        top_gaps: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlGap {
    pub control_name: String,
    pub title: Option<String>,
    pub category: Option<String>,
    pub score: f64,
    pub max_score: f64,
    pub potential_gain: f64,
    pub remediation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub current_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub controls_assessed: usize,
    pub controls_fully_implemented: usize,
    pub top_gaps: Vec<ControlGap>,
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<AssessmentArgs>(
        TOOL_NAME,
        "Review Microsoft Secure Score and control profiles, and assess the biggest \
         improvement opportunities.",
        Hints::READ_ONLY,
    )
}

fn num(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Join a Secure Score snapshot's `controlScores` with the control profiles' `maxScore`.
pub fn assess_controls(
    score: &Value,
    profiles: &[Value],
    category: Option<&str>,
    top_gaps: usize,
) -> Assessment {
    let by_name: HashMap<&str, &Value> = profiles
        .iter()
        .filter_map(|p| p.get("id").and_then(|i| i.as_str()).map(|id| (id, p)))
        .collect();

    let mut assessed = 0usize;
    let mut implemented = 0usize;
    let mut gaps = Vec::new();
    let controls = score
        .get("controlScores")
        .and_then(|c| c.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    for control in controls {
        let Some(name) = control.get("controlName").and_then(|n| n.as_str()) else {
            continue;
        };
        let profile = by_name.get(name).copied();
        let control_category = control
            .get("controlCategory")
            .or_else(|| profile.and_then(|p| p.get("controlCategory")))
            .and_then(|c| c.as_str());
        if let Some(wanted) = category {
            if !control_category.is_some_and(|c| c.eq_ignore_ascii_case(wanted)) {
                continue;
            }
        }
        let current = num(control.get("score"));
        let max = profile.map(|p| num(p.get("maxScore"))).unwrap_or(current);
        assessed += 1;
        if current >= max {
            implemented += 1;
            continue;
        }
        gaps.push(ControlGap {
            control_name: name.to_string(),
            title: profile
                .and_then(|p| p.get("title"))
                .and_then(|t| t.as_str())
                .map(str::to_string),
            category: control_category.map(str::to_string),
            score: current,
            max_score: max,
            potential_gain: round2(max - current),
            remediation: profile
                .and_then(|p| p.get("remediation"))
                .and_then(|r| r.as_str())
                .map(str::to_string),
        });
    }

    gaps.sort_by(|a, b| {
        b.potential_gain
            .partial_cmp(&a.potential_gain)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.control_name.cmp(&b.control_name))
    });
    gaps.truncate(top_gaps);

    let current_score = num(score.get("currentScore"));
    let max_score = num(score.get("maxScore"));
    Assessment {
        current_score,
        max_score,
        percentage: if max_score > 0.0 {
            round2(current_score / max_score * 100.0)
        } else {
            0.0
        },
        controls_assessed: assessed,
        controls_fully_implemented: implemented,
        top_gaps: gaps,
    }
}

fn category_filter(category: Option<&str>) -> Option<String> {
    category
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("controlCategory eq '{}'", c.replace('\'', "''")))
}

pub(super) async fn run(
    client: &GraphClient,
    args: AssessmentArgs,
) -> Result<CallToolResult, ToolError> {
    match args {
        AssessmentArgs::SecureScore { top } => {
            let req = ApiRequest::graph(Method::GET, SECURE_SCORES)
                .query("$top", top.unwrap_or(1).to_string());
            json_result(&client.send_json(req).await?)
        }
        AssessmentArgs::ControlProfiles { category, top } => {
            let req = ApiRequest::graph(Method::GET, CONTROL_PROFILES)
                .query_opt("$filter", category_filter(category.as_deref()))
                .query_opt("$top", top);
            json_result(&client.send_json(req).await?)
        }
        AssessmentArgs::Assess { category, top_gaps } => {
            let (scores, profiles) = futures::future::try_join(
                client.send_json(ApiRequest::graph(Method::GET, SECURE_SCORES).query("$top", "1")),
                client.fetch_all(ApiRequest::graph(Method::GET, CONTROL_PROFILES), 20),
            )
            .await?;
            let latest = scores
                .get("value")
                .and_then(|v| v.as_array())
                .and_then(|v| v.first())
                .cloned()
                .ok_or_else(|| ToolError::Upstream {
                    status: 404,
                    message: "no Secure Score snapshot is available for this tenant".into(),
                })?;
            let assessment = assess_controls(
                &latest,
                &profiles.items,
                category.as_deref(),
                top_gaps.unwrap_or(DEFAULT_TOP_GAPS),
            );
            json_result(&assessment)
        }
    }
}
