//! `manage_webhooks`: change-notification subscriptions.

use chrono::{Duration, SecondsFormat, Utc};
use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};
use crate::utils::{json_result, upstream_result, tool, Hints};

pub const TOOL_NAME: &str = "manage_webhooks";

const DEFAULT_EXPIRATION_MINUTES: i64 = 60;
/// Longest lifetime Graph grants for most resources.
const MAX_EXPIRATION_MINUTES: i64 = 4230;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WebhookArgs {
    #[serde(rename_all = "camelCase")]
    Create {
        /// Resource to watch, e.g. `users` or `groups/{id}/members`.
        resource: String,
        /// Comma-separated: `created`, `updated`, `deleted`.
        change_type: String,
        /// Public HTTPS endpoint that receives notifications.
        notification_url: String,
        lifecycle_notification_url: Option<String>,
        client_state: Option<String>,
        expiration_minutes: Option<i64>,
    },
    List,
    #[serde(rename_all = "camelCase")]
    Get { subscription_id: String },
    #[serde(rename_all = "camelCase")]
    Renew {
        subscription_id: String,
        expiration_minutes: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    Delete { subscription_id: String },
    /// Check a received notification payload locally; no upstream call.
    #[serde(rename_all = "camelCase")]
    ValidateNotification {
        payload: Value,
        expected_client_state: Option<String>,
    },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<WebhookArgs>(
        TOOL_NAME,
        "Create, list, renew and delete Graph change-notification subscriptions, and validate \
         incoming notification payloads against the expected clientState.",
        Hints::WRITE,
    )
}

fn expiration(minutes: Option<i64>) -> Result<String, ToolError> {
    let minutes = minutes.unwrap_or(DEFAULT_EXPIRATION_MINUTES);
    if !(1..=MAX_EXPIRATION_MINUTES).contains(&minutes) {
        return Err(ToolError::invalid(format!(
            "expirationMinutes must be between 1 and {}",
            MAX_EXPIRATION_MINUTES
        )));
    }
    Ok((Utc::now() + Duration::minutes(minutes)).to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn require_https(field: &str, url: &str) -> Result<(), ToolError> {
    match url::Url::parse(url) {
        Ok(u) if u.scheme() == "https" && u.host().is_some() => Ok(()),
        _ => Err(ToolError::invalid(format!(
            "{} must be an absolute https URL",
            field
        ))),
    }
}

/// Validation handshakes pass; otherwise every notification must carry the expected clientState.
pub fn validate_notification(payload: &Value, expected_client_state: Option<&str>) -> Value {
    if let Some(token) = payload.get("validationToken").and_then(|v| v.as_str()) {
        return json!({ "valid": true, "validationToken": token });
    }
    let Some(items) = payload.get("value").and_then(|v| v.as_array()) else {
        return json!({ "valid": false, "reason": "payload has no value array" });
    };
    if items.is_empty() {
        return json!({ "valid": false, "reason": "payload contains no notifications" });
    }

    let mut rejected = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let has_shape = item.get("subscriptionId").is_some() && item.get("resource").is_some();
        let state_ok = match expected_client_state {
            Some(expected) => item.get("clientState").and_then(|v| v.as_str()) == Some(expected),
            None => true,
        };
        if !has_shape || !state_ok {
            rejected.push(i);
        }
    }
    json!({
        "valid": rejected.is_empty(),
        "notificationCount": items.len(),
        "rejectedIndexes": rejected,
    })
}

pub(super) async fn run(
    client: &GraphClient,
    args: WebhookArgs,
) -> Result<CallToolResult, ToolError> {
    match args {
        WebhookArgs::Create {
            resource,
            change_type,
            notification_url,
            lifecycle_notification_url,
            client_state,
            expiration_minutes,
        } => {
            if resource.trim().is_empty() || change_type.trim().is_empty() {
                return Err(ToolError::invalid("resource and changeType are required"));
            }
            require_https("notificationUrl", &notification_url)?;
            if let Some(url) = &lifecycle_notification_url {
                require_https("lifecycleNotificationUrl", url)?;
            }
            let mut body = Map::new();
            body.insert("changeType".into(), json!(change_type));
            body.insert("notificationUrl".into(), json!(notification_url));
            body.insert("resource".into(), json!(resource));
            body.insert(
                "expirationDateTime".into(),
                json!(expiration(expiration_minutes)?),
            );
            if let Some(url) = lifecycle_notification_url {
                body.insert("lifecycleNotificationUrl".into(), json!(url));
            }
            if let Some(state) = client_state {
                body.insert("clientState".into(), json!(state));
            }
            let created = client.post("/subscriptions", Value::Object(body)).await?;
            json_result(&created)
        }
        WebhookArgs::List => json_result(&client.get("/subscriptions").await?),
        WebhookArgs::Get { subscription_id } => {
            json_result(&client.get(&format!("/subscriptions/{}", seg(&subscription_id))).await?)
        }
        WebhookArgs::Renew {
            subscription_id,
            expiration_minutes,
        } => {
            let body = json!({ "expirationDateTime": expiration(expiration_minutes)? });
            let renewed = client
                .send_json(
                    ApiRequest::graph(
                        Method::PATCH,
                        format!("/subscriptions/{}", seg(&subscription_id)),
                    )
                    .json(body),
                )
                .await?;
            upstream_result(renewed, "Subscription renewed")
        }
        WebhookArgs::Delete { subscription_id } => {
            let body = client
                .delete(&format!("/subscriptions/{}", seg(&subscription_id)))
                .await?;
            upstream_result(body, "Subscription deleted")
        }
        WebhookArgs::ValidateNotification {
            payload,
            expected_client_state,
        } => json_result(&validate_notification(
            &payload,
            expected_client_state.as_deref(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(state: &str) -> Value {
        json!({
            "subscriptionId": "sub-1",
            "resource": "users/1",
            "changeType": "updated",
            "clientState": state
        })
    }

    #[test]
    fn matching_client_state_is_valid() {
        let payload = json!({"value": [notification("secret"), notification("secret")]});
        let out = validate_notification(&payload, Some("secret"));
        assert_eq!(out["valid"], true);
        assert_eq!(out["notificationCount"], 2);
    }

    #[test]
    fn mismatched_client_state_is_reported() {
        let payload = json!({"value": [notification("secret"), notification("other")]});
        let out = validate_notification(&payload, Some("secret"));
        assert_eq!(out["valid"], false);
        assert_eq!(out["rejectedIndexes"], json!([1]));
    }

    #[test]
    fn handshake_and_malformed_payloads() {
        let out = validate_notification(&json!({"validationToken": "abc"}), Some("x"));
        assert_eq!(out["valid"], true);
        assert_eq!(out["validationToken"], "abc");
        assert_eq!(validate_notification(&json!({}), None)["valid"], false);
        assert_eq!(validate_notification(&json!({"value": []}), None)["valid"], false);
    }

    #[test]
    fn notification_url_must_be_https() {
        assert!(require_https("notificationUrl", "https://hooks.contoso.com/graph").is_ok());
        assert!(require_https("notificationUrl", "http://hooks.contoso.com/graph").is_err());
        assert!(require_https("notificationUrl", "hooks.contoso.com").is_err());
    }

    #[test]
    fn expiration_bounds() {
        assert!(expiration(None).unwrap().ends_with('Z'));
        assert!(expiration(Some(0)).is_err());
        assert!(expiration(Some(MAX_EXPIRATION_MINUTES + 1)).is_err());
    }
}
