use reqwest::Method;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::sync::Arc;

use crate::error::ToolError;
use crate::graph_client::ApiRequest;

/// Behavioural hints advertised with each tool.
#[derive(Debug, Clone, Copy)]
pub struct Hints {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
}

impl Hints {
    pub const READ_ONLY: Hints = Hints {
        read_only: true,
        destructive: false,
        idempotent: true,
    };
    pub const WRITE: Hints = Hints {
        read_only: false,
        destructive: false,
        idempotent: false,
    };
    pub const DESTRUCTIVE: Hints = Hints {
        read_only: false,
        destructive: true,
        idempotent: false,
    };
}

/// JSON schema for a tool's argument type, always rooted at an object.
pub fn input_schema<T: JsonSchema>() -> Result<Arc<JsonObject>, ToolError> {
    let value = serde_json::to_value(schemars::schema_for!(T))?;
    let mut map = match value {
        Value::Object(m) => m,
        _ => return Err(ToolError::Internal("schema is not an object".to_string())),
    };
    map.entry("type".to_string())
        .or_insert_with(|| Value::String("object".to_string()));
    Ok(Arc::new(map))
}

pub fn tool<T: JsonSchema>(
    name: &'static str,
    description: &'static str,
    hints: Hints,
) -> Result<Tool, ToolError> {
    Ok(Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema: input_schema::<T>()?,
        output_schema: None,
        annotations: Some(ToolAnnotations {
            title: None,
            read_only_hint: Some(hints.read_only),
            destructive_hint: Some(hints.destructive),
            idempotent_hint: Some(hints.idempotent),
            open_world_hint: Some(true),
        }),
        icons: None,
    })
}

/// Deserialize tool arguments; any shape mismatch is an invalid-params failure.
pub fn parse_args<T: DeserializeOwned>(
    tool: &str,
    args: Option<JsonObject>,
) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args.unwrap_or_default()))
        .map_err(|e| ToolError::InvalidParams(format!("{}: {}", tool, e)))
}

pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text.into())],
        structured_content: None,
        is_error: Some(false),
        meta: None,
    }
}

/// Pretty-printed JSON as the single text content item.
pub fn json_result<T: Serialize>(data: &T) -> Result<CallToolResult, ToolError> {
    let text = serde_json::to_string_pretty(data)?;
    Ok(text_result(text))
}

/// Upstream body as JSON text, or a status line when the call returned no content.
pub fn upstream_result(body: Value, empty_message: &str) -> Result<CallToolResult, ToolError> {
    if body.is_null() {
        return Ok(text_result(empty_message));
    }
    json_result(&body)
}

/// Lowercased display name with whitespace removed.
pub fn mail_nickname(display_name: &str) -> String {
    display_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `{"@odata.id": ".../directoryObjects/{id}"}` reference body used by member/owner adds.
pub fn directory_object_ref(graph_base: &str, id: &str) -> Value {
    json!({
        "@odata.id": format!(
            "{}/v1.0/directoryObjects/{}",
            graph_base.trim_end_matches('/'),
            crate::graph_client::seg(id)
        )
    })
}

pub fn require_non_empty<'a, T>(field: &str, items: &'a [T]) -> Result<&'a [T], ToolError> {
    if items.is_empty() {
        return Err(ToolError::invalid(format!(
            "{} must contain at least one entry",
            field
        )));
    }
    Ok(items)
}

/// Common OData paging and filtering options for `list` actions.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Page size (`$top`).
    pub top: Option<u32>,
    /// OData `$filter` expression.
    pub filter: Option<String>,
    /// Fields for `$select`.
    #[serde(default)]
    pub select_fields: Vec<String>,
}

impl ListQuery {
    pub fn apply(&self, req: ApiRequest) -> ApiRequest {
        let mut req = req
            .query_opt("$top", self.top)
            .query_opt("$filter", self.filter.as_deref());
        if !self.select_fields.is_empty() {
            req = req.query("$select", self.select_fields.join(","));
        }
        req
    }

    /// Same as `apply`, AND-ing a fixed filter in front of the caller's.
    pub fn apply_with_filter(&self, req: ApiRequest, fixed: &str) -> ApiRequest {
        let combined = match self.filter.as_deref().map(str::trim) {
            Some(f) if !f.is_empty() => format!("({}) and ({})", fixed, f),
            _ => fixed.to_string(),
        };
        let scoped = ListQuery {
            filter: Some(combined),
            ..self.clone()
        };
        scoped.apply(req)
    }
}

/// GET a collection with the caller's list options.
pub fn list_request(path: impl Into<String>, query: &ListQuery) -> ApiRequest {
    query.apply(ApiRequest::graph(Method::GET, path))
}

/// Run one request per id in order, stopping at the first failure.
///
/// A failure part-way through reports how many ids were already processed.
pub async fn for_each_id<'a, F, Fut>(
    verb: &str,
    ids: &'a [String],
    mut op: F,
) -> Result<usize, ToolError>
where
    F: FnMut(&'a str) -> Fut,
    Fut: std::future::Future<Output = Result<Value, ToolError>>,
{
    for (done, id) in ids.iter().enumerate() {
        if let Err(err) = op(id.as_str()).await {
            let context = format!("{} {}: {} of {} done before failure", verb, id, done, ids.len());
            return Err(match err {
                ToolError::Upstream { status, message } => ToolError::Upstream {
                    status,
                    message: format!("{} ({})", message, context),
                },
                other => {
                    tracing::warn!(%context, "stopping after failed step");
                    other
                }
            });
        }
    }
    Ok(ids.len())
}

/// Copy the `Some` fields into a JSON object; errors when nothing would be sent.
pub fn patch_body(fields: &[(&str, Option<Value>)]) -> Result<Value, ToolError> {
    let map: serde_json::Map<String, Value> = fields
        .iter()
        .filter_map(|(k, v)| v.clone().map(|v| (k.to_string(), v)))
        .collect();
    if map.is_empty() {
        let names: Vec<&str> = fields.iter().map(|(k, _)| *k).collect();
        return Err(ToolError::invalid(format!(
            "nothing to update; provide at least one of: {}",
            names.join(", ")
        )));
    }
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(tag = "action", rename_all = "snake_case")]
    enum Sample {
        #[serde(rename_all = "camelCase")]
        Create { display_name: String },
        List,
    }

    #[test]
    fn nickname_lowercases_and_strips_spaces() {
        assert_eq!(mail_nickname("Sales Team"), "salesteam");
        assert_eq!(mail_nickname("  EMEA  Ops\tNorth "), "emeaopsnorth");
    }

    #[test]
    fn tagged_schema_is_rooted_at_object() {
        let schema = input_schema::<Sample>().unwrap();
        assert_eq!(schema.get("type").unwrap(), "object");
    }

    #[test]
    fn missing_field_is_invalid_params() {
        let args = json!({"action": "create"}).as_object().cloned();
        let err = parse_args::<Sample>("sample", args).unwrap_err();
        match err {
            ToolError::InvalidParams(msg) => assert!(msg.contains("displayName")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_action_is_invalid_params() {
        let args = json!({"action": "explode"}).as_object().cloned();
        assert!(matches!(
            parse_args::<Sample>("sample", args),
            Err(ToolError::InvalidParams(_))
        ));
        let ok = parse_args::<Sample>("sample", json!({"action": "list"}).as_object().cloned());
        assert!(matches!(ok, Ok(Sample::List)));
    }

    #[test]
    fn empty_body_becomes_status_text() {
        let result = upstream_result(Value::Null, "Group deleted").unwrap();
        let raw = serde_json::to_value(&result).unwrap();
        assert_eq!(raw["content"][0]["text"], "Group deleted");
    }
}
