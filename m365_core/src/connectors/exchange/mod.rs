//! Exchange Online mailbox configuration through Graph.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;
use crate::graph_client::{seg, GraphClient};
use crate::utils::{json_result, parse_args, tool, upstream_result, Hints};
use crate::Connector;

pub const TOOL_NAME: &str = "manage_exchange_settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AutoReplyStatus {
    Disabled,
    AlwaysEnabled,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ExternalAudience {
    None,
    ContactsOnly,
    #[default]
    All,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutomaticReplies {
    pub user_id: String,
    pub status: AutoReplyStatus,
    pub internal_reply_message: Option<String>,
    pub external_reply_message: Option<String>,
    #[serde(default)]
    pub external_audience: ExternalAudience,
    /// Local date-time, `YYYY-MM-DDTHH:MM:SS`; required when scheduled.
    pub scheduled_start_date_time: Option<String>,
    pub scheduled_end_date_time: Option<String>,
    /// Windows or IANA time zone name for the schedule (default `UTC`).
    pub time_zone: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewInboxRule {
    pub user_id: String,
    pub display_name: String,
    /// Evaluation order; lower runs first.
    pub sequence: Option<u32>,
    /// `messageRulePredicates`, e.g. `{"senderContains": ["contoso.com"]}`.
    #[serde(default)]
    pub conditions: Map<String, Value>,
    /// `messageRuleActions`, e.g. `{"moveToFolder": "...", "stopProcessingRules": true}`.
    pub actions: Map<String, Value>,
    pub is_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExchangeArgs {
    #[serde(rename_all = "camelCase")]
    GetMailboxSettings { user_id: String },
    #[serde(rename_all = "camelCase")]
    UpdateMailboxSettings {
        user_id: String,
        settings: Map<String, Value>,
    },
    SetAutomaticReplies(AutomaticReplies),
    #[serde(rename_all = "camelCase")]
    ListInboxRules { user_id: String },
    CreateInboxRule(NewInboxRule),
    #[serde(rename_all = "camelCase")]
    DeleteInboxRule { user_id: String, rule_id: String },
}

fn mailbox_path(user_id: &str) -> Result<String, ToolError> {
    if user_id.trim().is_empty() {
        return Err(ToolError::invalid("userId must not be empty"));
    }
    Ok(format!("/users/{}", seg(user_id.trim())))
}

fn parse_local(field: &str, value: &str) -> Result<NaiveDateTime, ToolError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|_| {
            ToolError::invalid(format!("{} must look like 2024-07-01T09:00:00", field))
        })
}

/// `mailboxSettings` PATCH body for an automatic-replies change.
pub fn automatic_replies_body(args: &AutomaticReplies) -> Result<Value, ToolError> {
    let mut setting = Map::new();
    setting.insert("status".into(), json!(args.status));
    setting.insert("externalAudience".into(), json!(args.external_audience));
    if let Some(m) = &args.internal_reply_message {
        setting.insert("internalReplyMessage".into(), json!(m));
    }
    if let Some(m) = &args.external_reply_message {
        setting.insert("externalReplyMessage".into(), json!(m));
    }

    if args.status == AutoReplyStatus::Scheduled {
        let (Some(start), Some(end)) = (
            args.scheduled_start_date_time.as_deref(),
            args.scheduled_end_date_time.as_deref(),
        ) else {
            return Err(ToolError::invalid(
                "scheduled replies need scheduledStartDateTime and scheduledEndDateTime",
            ));
        };
        let start_at = parse_local("scheduledStartDateTime", start)?;
        let end_at = parse_local("scheduledEndDateTime", end)?;
        if end_at <= start_at {
            return Err(ToolError::invalid(
                "scheduledEndDateTime must be after scheduledStartDateTime",
            ));
        }
        let tz = args.time_zone.as_deref().unwrap_or("UTC");
        setting.insert(
            "scheduledStartDateTime".into(),
            json!({ "dateTime": start_at.format("%Y-%m-%dT%H:%M:%S").to_string(), "timeZone": tz }),
        );
        setting.insert(
            "scheduledEndDateTime".into(),
            json!({ "dateTime": end_at.format("%Y-%m-%dT%H:%M:%S").to_string(), "timeZone": tz }),
        );
    }
    Ok(json!({ "automaticRepliesSetting": Value::Object(setting) }))
}

pub fn inbox_rule_body(rule: &NewInboxRule) -> Result<Value, ToolError> {
    if rule.display_name.trim().is_empty() {
        return Err(ToolError::invalid("displayName must not be empty"));
    }
    if rule.actions.is_empty() {
        return Err(ToolError::invalid("actions must contain at least one rule action"));
    }
    Ok(json!({
        "displayName": rule.display_name,
        "sequence": rule.sequence.unwrap_or(1),
        "isEnabled": rule.is_enabled.unwrap_or(true),
        "conditions": rule.conditions,
        "actions": rule.actions,
    }))
}

pub struct ExchangeConnector {
    client: Arc<GraphClient>,
}

impl ExchangeConnector {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    async fn run(&self, args: ExchangeArgs) -> Result<CallToolResult, ToolError> {
        let client = self.client.as_ref();
        match args {
            ExchangeArgs::GetMailboxSettings { user_id } => json_result(
                &client
                    .get(&format!("{}/mailboxSettings", mailbox_path(&user_id)?))
                    .await?,
            ),
            ExchangeArgs::UpdateMailboxSettings { user_id, settings } => {
                if settings.is_empty() {
                    return Err(ToolError::invalid("settings must not be empty"));
                }
                let resp = client
                    .patch(
                        &format!("{}/mailboxSettings", mailbox_path(&user_id)?),
                        Value::Object(settings),
                    )
                    .await?;
                upstream_result(resp, "Mailbox settings updated")
            }
            ExchangeArgs::SetAutomaticReplies(replies) => {
                let body = automatic_replies_body(&replies)?;
                let resp = client
                    .patch(
                        &format!("{}/mailboxSettings", mailbox_path(&replies.user_id)?),
                        body,
                    )
                    .await?;
                upstream_result(resp, "Automatic replies updated")
            }
            ExchangeArgs::ListInboxRules { user_id } => json_result(
                &client
                    .get(&format!(
                        "{}/mailFolders/inbox/messageRules",
                        mailbox_path(&user_id)?
                    ))
                    .await?,
            ),
            ExchangeArgs::CreateInboxRule(rule) => {
                let body = inbox_rule_body(&rule)?;
                json_result(
                    &client
                        .post(
                            &format!(
                                "{}/mailFolders/inbox/messageRules",
                                mailbox_path(&rule.user_id)?
                            ),
                            body,
                        )
                        .await?,
                )
            }
            ExchangeArgs::DeleteInboxRule { user_id, rule_id } => {
                if rule_id.trim().is_empty() {
                    return Err(ToolError::invalid("ruleId must not be empty"));
                }
                let resp = client
                    .delete(&format!(
                        "{}/mailFolders/inbox/messageRules/{}",
                        mailbox_path(&user_id)?,
                        seg(&rule_id)
                    ))
                    .await?;
                upstream_result(resp, "Inbox rule deleted")
            }
        }
    }
}

#[async_trait]
impl Connector for ExchangeConnector {
    fn name(&self) -> &'static str {
        "exchange"
    }

    fn description(&self) -> &'static str {
        "Exchange Online mailbox settings, automatic replies and inbox rules."
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        Ok(vec![tool::<ExchangeArgs>(
            TOOL_NAME,
            "Manage Exchange mailbox settings, automatic replies (out of office) and inbox rules.",
            Hints::WRITE,
        )?])
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ToolError> {
        let name = request.name.as_ref();
        debug!(connector = self.name(), tool = name, "dispatching tool call");
        match name {
            TOOL_NAME => self.run(parse_args(name, request.arguments)?).await,
            _ => Err(ToolError::ToolNotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn replies(v: Value) -> AutomaticReplies {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn always_enabled_reply_body() {
        let body = automatic_replies_body(&replies(json!({
            "userId": "u",
            "status": "alwaysEnabled",
            "internalReplyMessage": "Out until Monday"
        })))
        .unwrap();
        assert_eq!(
            body,
            json!({"automaticRepliesSetting": {
                "status": "alwaysEnabled",
                "externalAudience": "all",
                "internalReplyMessage": "Out until Monday"
            }})
        );
    }

    #[test]
    fn scheduled_reply_needs_ordered_window() {
        let missing = replies(json!({"userId": "u", "status": "scheduled"}));
        assert!(automatic_replies_body(&missing).is_err());

        let backwards = replies(json!({
            "userId": "u",
            "status": "scheduled",
            "scheduledStartDateTime": "2024-07-10T09:00:00",
            "scheduledEndDateTime": "2024-07-01T09:00:00"
        }));
        assert!(automatic_replies_body(&backwards).is_err());

        let ok = replies(json!({
            "userId": "u",
            "status": "scheduled",
            "scheduledStartDateTime": "2024-07-01T09:00",
            "scheduledEndDateTime": "2024-07-10T17:00:00",
            "timeZone": "Pacific Standard Time"
        }));
        let body = automatic_replies_body(&ok).unwrap();
        let setting = &body["automaticRepliesSetting"];
        assert_eq!(setting["scheduledStartDateTime"]["dateTime"], "2024-07-01T09:00:00");
        assert_eq!(setting["scheduledEndDateTime"]["timeZone"], "Pacific Standard Time");
    }

    #[test]
    fn inbox_rule_requires_actions() {
        let rule: NewInboxRule = serde_json::from_value(json!({
            "userId": "u",
            "displayName": "Move newsletters",
            "actions": {}
        }))
        .unwrap();
        assert!(inbox_rule_body(&rule).is_err());
    }
}
