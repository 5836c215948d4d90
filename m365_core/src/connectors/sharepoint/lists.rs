use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::sites::site_path;
use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};
use crate::utils::{json_result, tool, upstream_result, Hints};

pub const TOOL_NAME: &str = "manage_sharepoint_lists";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ListArgs {
    #[serde(rename_all = "camelCase")]
    List { site_id: String },
    #[serde(rename_all = "camelCase")]
    Get { site_id: String, list_id: String },
    #[serde(rename_all = "camelCase")]
    Create {
        site_id: String,
        display_name: String,
        /// List template, default `genericList`.
        template: Option<String>,
        /// Column definitions, e.g. `{"name": "Owner", "text": {}}`.
        #[serde(default)]
        columns: Vec<Value>,
    },
    #[serde(rename_all = "camelCase")]
    ListItems {
        site_id: String,
        list_id: String,
        top: Option<u32>,
        /// OData filter over `fields/...` columns.
        filter: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GetItem {
        site_id: String,
        list_id: String,
        item_id: String,
    },
    #[serde(rename_all = "camelCase")]
    CreateItem {
        site_id: String,
        list_id: String,
        fields: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    UpdateItem {
        site_id: String,
        list_id: String,
        item_id: String,
        fields: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteItem {
        site_id: String,
        list_id: String,
        item_id: String,
    },
}

pub(super) fn definition() -> Result<Tool, ToolError> {
    tool::<ListArgs>(
        TOOL_NAME,
        "Manage SharePoint lists and list items: list, get, create lists; CRUD on items.",
        Hints::WRITE,
    )
}

fn list_path(site_id: &str, list_id: &str) -> Result<String, ToolError> {
    if list_id.trim().is_empty() {
        return Err(ToolError::invalid("listId must not be empty"));
    }
    Ok(format!("{}/lists/{}", site_path(site_id)?, seg(list_id.trim())))
}

fn item_path(site_id: &str, list_id: &str, item_id: &str) -> Result<String, ToolError> {
    if item_id.trim().is_empty() {
        return Err(ToolError::invalid("itemId must not be empty"));
    }
    Ok(format!(
        "{}/items/{}",
        list_path(site_id, list_id)?,
        seg(item_id.trim())
    ))
}

fn require_fields(fields: &Map<String, Value>) -> Result<(), ToolError> {
    if fields.is_empty() {
        return Err(ToolError::invalid("fields must not be empty"));
    }
    Ok(())
}

pub fn create_list_body(display_name: &str, template: Option<&str>, columns: &[Value]) -> Result<Value, ToolError> {
    if display_name.trim().is_empty() {
        return Err(ToolError::invalid("displayName must not be empty"));
    }
    let mut body = json!({
        "displayName": display_name,
        "list": { "template": template.unwrap_or("genericList") }
    });
    if !columns.is_empty() {
        body["columns"] = json!(columns);
    }
    Ok(body)
}

pub(super) async fn run(client: &GraphClient, args: ListArgs) -> Result<CallToolResult, ToolError> {
    match args {
        ListArgs::List { site_id } => {
            json_result(&client.get(&format!("{}/lists", site_path(&site_id)?)).await?)
        }
        ListArgs::Get { site_id, list_id } => {
            json_result(&client.get(&list_path(&site_id, &list_id)?).await?)
        }
        ListArgs::Create {
            site_id,
            display_name,
            template,
            columns,
        } => {
            let body = create_list_body(&display_name, template.as_deref(), &columns)?;
            json_result(
                &client
                    .post(&format!("{}/lists", site_path(&site_id)?), body)
                    .await?,
            )
        }
        ListArgs::ListItems {
            site_id,
            list_id,
            top,
            filter,
        } => {
            let mut req = ApiRequest::graph(
                Method::GET,
                format!("{}/items", list_path(&site_id, &list_id)?),
            )
            .query("$expand", "fields")
            .query_opt("$top", top);
            if let Some(f) = filter {
                // Filtering on non-indexed columns needs this header.
                req = req
                    .query("$filter", f)
                    .header("Prefer", "HonorNonIndexedQueriesWarningMayFailRandomly");
            }
            json_result(&client.send_json(req).await?)
        }
        ListArgs::GetItem {
            site_id,
            list_id,
            item_id,
        } => {
            let req = ApiRequest::graph(Method::GET, item_path(&site_id, &list_id, &item_id)?)
                .query("$expand", "fields");
            json_result(&client.send_json(req).await?)
        }
        ListArgs::CreateItem {
            site_id,
            list_id,
            fields,
        } => {
            require_fields(&fields)?;
            json_result(
                &client
                    .post(
                        &format!("{}/items", list_path(&site_id, &list_id)?),
                        json!({ "fields": fields }),
                    )
                    .await?,
            )
        }
        ListArgs::UpdateItem {
            site_id,
            list_id,
            item_id,
            fields,
        } => {
            require_fields(&fields)?;
            let resp = client
                .patch(
                    &format!("{}/fields", item_path(&site_id, &list_id, &item_id)?),
                    Value::Object(fields),
                )
                .await?;
            upstream_result(resp, "List item updated")
        }
        ListArgs::DeleteItem {
            site_id,
            list_id,
            item_id,
        } => {
            let resp = client
                .delete(&item_path(&site_id, &list_id, &item_id)?)
                .await?;
            upstream_result(resp, "List item deleted")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_body_defaults_to_generic_template() {
        let body = create_list_body("Assets", None, &[]).unwrap();
        assert_eq!(body, json!({"displayName": "Assets", "list": {"template": "genericList"}}));
        let body = create_list_body("Assets", Some("documentLibrary"), &[json!({"name": "Owner", "text": {}})]).unwrap();
        assert_eq!(body["list"]["template"], "documentLibrary");
        assert_eq!(body["columns"][0]["name"], "Owner");
    }

    #[test]
    fn item_paths_are_nested_under_the_site() {
        assert_eq!(
            item_path("site-1", "Tasks", "7").unwrap(),
            "/sites/site-1/lists/Tasks/items/7"
        );
        assert_eq!(
            item_path("contoso.sharepoint.com:/sites/hr", "Tasks", "7").unwrap(),
            "/sites/contoso.sharepoint.com:/sites/hr:/lists/Tasks/items/7"
        );
        assert!(item_path("site-1", "", "7").is_err());
    }
}
