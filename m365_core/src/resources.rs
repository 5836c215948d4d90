//! Read-only `m365://` resources backed by a single Graph GET each.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::connectors::sharepoint::sites::site_path;
use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};

pub const SCHEME: &str = "m365://";
const MIME_JSON: &str = "application/json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceTemplate {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

struct StaticEntry {
    uri: &'static str,
    name: &'static str,
    description: &'static str,
    path: &'static str,
    query: &'static [(&'static str, &'static str)],
}

const STATIC_RESOURCES: &[StaticEntry] = &[
    StaticEntry {
        uri: "m365://tenant/info",
        name: "Tenant information",
        description: "Organization profile of the connected tenant",
        path: "/organization",
        query: &[],
    },
    StaticEntry {
        uri: "m365://users",
        name: "Users",
        description: "First 50 users in the directory",
        path: "/users",
        query: &[("$top", "50")],
    },
    StaticEntry {
        uri: "m365://groups",
        name: "Groups",
        description: "First 50 groups in the directory",
        path: "/groups",
        query: &[("$top", "50")],
    },
    StaticEntry {
        uri: "m365://sharepoint/sites",
        name: "SharePoint sites",
        description: "Sites visible to the application",
        path: "/sites",
        query: &[("search", "*")],
    },
    StaticEntry {
        uri: "m365://security/alerts",
        name: "Security alerts",
        description: "Latest 25 security alerts",
        path: "/security/alerts_v2",
        query: &[("$top", "25")],
    },
];

type Params = HashMap<&'static str, String>;

struct TemplateEntry {
    template: &'static str,
    name: &'static str,
    description: &'static str,
    request: fn(&Params) -> Result<ApiRequest, ToolError>,
}

fn param<'a>(params: &'a Params, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ToolError::Internal(format!("template variable {} not bound", key)))
}

const TEMPLATES: &[TemplateEntry] = &[
    TemplateEntry {
        template: "m365://user/{userId}",
        name: "User",
        description: "A single user by id or userPrincipalName",
        request: |p| {
            Ok(ApiRequest::graph(
                Method::GET,
                format!("/users/{}", seg(param(p, "userId")?)),
            ))
        },
    },
    TemplateEntry {
        template: "m365://group/{groupId}",
        name: "Group",
        description: "A single group by id",
        request: |p| {
            Ok(ApiRequest::graph(
                Method::GET,
                format!("/groups/{}", seg(param(p, "groupId")?)),
            ))
        },
    },
    TemplateEntry {
        template: "m365://sharepoint/site/{siteId}",
        name: "SharePoint site",
        description: "A SharePoint site by id",
        request: |p| Ok(ApiRequest::graph(Method::GET, site_path(param(p, "siteId")?)?)),
    },
    TemplateEntry {
        template: "m365://sharepoint/site/{siteId}/list/{listId}",
        name: "SharePoint list",
        description: "A list within a SharePoint site",
        request: |p| {
            Ok(ApiRequest::graph(
                Method::GET,
                format!(
                    "{}/lists/{}",
                    site_path(param(p, "siteId")?)?,
                    seg(param(p, "listId")?)
                ),
            ))
        },
    },
    TemplateEntry {
        template: "m365://sharepoint/site/{siteId}/list/{listId}/items",
        name: "SharePoint list items",
        description: "Items of a SharePoint list with their field values",
        request: |p| {
            Ok(ApiRequest::graph(
                Method::GET,
                format!(
                    "{}/lists/{}/items",
                    site_path(param(p, "siteId")?)?,
                    seg(param(p, "listId")?)
                ),
            )
            .query("$expand", "fields"))
        },
    },
];

/// Match `uri` against a `{var}` template segment by segment. Variables bind exactly
/// one non-empty, percent-decoded segment.
pub fn match_template(template: &'static str, uri: &str) -> Option<Params> {
    let pattern = template.strip_prefix(SCHEME)?;
    let rest = uri.strip_prefix(SCHEME)?;
    let pattern: Vec<&'static str> = pattern.split('/').collect();
    let segments: Vec<&str> = rest.split('/').collect();
    if pattern.len() != segments.len() {
        return None;
    }

    let mut params = Params::new();
    for (p, s) in pattern.into_iter().zip(segments) {
        match p.strip_prefix('{').and_then(|v| v.strip_suffix('}')) {
            Some(var) => {
                if s.is_empty() {
                    return None;
                }
                let value = urlencoding::decode(s).ok()?.into_owned();
                params.insert(var, value);
            }
            None if p == s => {}
            None => return None,
        }
    }
    Some(params)
}

/// Catalog of every resource and template the server exposes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceCatalog;

impl ResourceCatalog {
    pub fn new() -> Self {
        ResourceCatalog
    }

    pub fn list(&self) -> Vec<Resource> {
        STATIC_RESOURCES
            .iter()
            .map(|r| Resource {
                uri: r.uri.to_string(),
                name: r.name.to_string(),
                description: Some(r.description.to_string()),
                mime_type: Some(MIME_JSON.to_string()),
            })
            .collect()
    }

    pub fn templates(&self) -> Vec<ResourceTemplate> {
        TEMPLATES
            .iter()
            .map(|t| ResourceTemplate {
                uri_template: t.template.to_string(),
                name: t.name.to_string(),
                description: Some(t.description.to_string()),
                mime_type: Some(MIME_JSON.to_string()),
            })
            .collect()
    }

    /// The Graph request a URI resolves to.
    pub fn resolve(&self, uri: &str) -> Result<ApiRequest, ToolError> {
        if let Some(entry) = STATIC_RESOURCES.iter().find(|r| r.uri == uri) {
            let mut req = ApiRequest::graph(Method::GET, entry.path);
            for (k, v) in entry.query {
                req = req.query(*k, *v);
            }
            return Ok(req);
        }
        for entry in TEMPLATES {
            if let Some(params) = match_template(entry.template, uri) {
                return (entry.request)(&params);
            }
        }
        Err(ToolError::ResourceNotFound(uri.to_string()))
    }

    pub async fn read(
        &self,
        client: &GraphClient,
        uri: &str,
    ) -> Result<Vec<ResourceContent>, ToolError> {
        let req = self.resolve(uri)?;
        debug!(uri, path = %req.path, "reading resource");
        let body: Value = client.send_json(req).await?;
        Ok(vec![ResourceContent {
            uri: uri.to_string(),
            mime_type: MIME_JSON.to_string(),
            text: serde_json::to_string_pretty(&body)?,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn binds_template_variables() {
        let p = match_template(
            "m365://sharepoint/site/{siteId}/list/{listId}/items",
            "m365://sharepoint/site/contoso.sharepoint.com,abc,def/list/Tasks/items",
        )
        .unwrap();
        assert_eq!(p["siteId"], "contoso.sharepoint.com,abc,def");
        assert_eq!(p["listId"], "Tasks");
    }

    #[test]
    fn rejects_length_and_literal_mismatches() {
        assert!(match_template("m365://user/{userId}", "m365://user/").is_none());
        assert!(match_template("m365://user/{userId}", "m365://user/a/b").is_none());
        assert!(match_template("m365://user/{userId}", "m365://group/a").is_none());
        assert!(match_template("m365://user/{userId}", "https://user/a").is_none());
    }

    #[test]
    fn decodes_percent_encoded_segments() {
        let p = match_template("m365://user/{userId}", "m365://user/jane%40contoso.com").unwrap();
        assert_eq!(p["userId"], "jane@contoso.com");
    }

    #[test]
    fn resolves_static_and_templated_uris() {
        let catalog = ResourceCatalog::new();
        let req = catalog.resolve("m365://users").unwrap();
        assert_eq!(req.path, "/users");

        let req = catalog.resolve("m365://user/jane@contoso.com").unwrap();
        assert_eq!(req.path, "/users/jane%40contoso.com");

        let req = catalog
            .resolve("m365://sharepoint/site/root/list/Docs")
            .unwrap();
        assert_eq!(req.path, "/sites/root/lists/Docs");
    }

    #[test]
    fn unknown_uri_is_not_found() {
        let err = ResourceCatalog::new()
            .resolve("m365://mailboxes")
            .unwrap_err();
        assert!(matches!(err, ToolError::ResourceNotFound(_)));
    }

    #[test]
    fn catalog_lists_everything() {
        let catalog = ResourceCatalog::new();
        assert_eq!(catalog.list().len(), 5);
        assert_eq!(catalog.templates().len(), 5);
        assert!(catalog.list().iter().all(|r| r.uri.starts_with(SCHEME)));
    }
}
