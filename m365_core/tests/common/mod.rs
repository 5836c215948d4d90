#![allow(dead_code)]

use m365_core::config::{Credentials, Endpoints, GraphVersion, Settings};
use m365_core::{build_registry, CallToolRequestParam, CallToolResult, GraphClient, ProviderRegistry};
use mockito::{Mock, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;

pub const TENANT: &str = "contoso-tenant";
pub const TOKEN: &str = "test-access-token";

pub fn settings(base: &str) -> Settings {
    Settings {
        credentials: Credentials {
            tenant_id: TENANT.into(),
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
        },
        endpoints: Endpoints::all_at(base),
        graph_version: GraphVersion::V1,
    }
}

pub fn client(server: &ServerGuard) -> Arc<GraphClient> {
    Arc::new(GraphClient::new(&settings(&server.url())).unwrap())
}

pub fn registry(server: &ServerGuard) -> ProviderRegistry {
    build_registry(client(server)).unwrap()
}

/// Token endpoint mock, not yet created so callers can set expectations.
pub fn token_endpoint(server: &mut ServerGuard, expires_in: i64) -> Mock {
    server
        .mock("POST", format!("/{}/oauth2/v2.0/token", TENANT).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "token_type": "Bearer",
                "expires_in": expires_in,
                "access_token": TOKEN
            })
            .to_string(),
        )
}

pub fn call(name: &str, args: Value) -> CallToolRequestParam {
    CallToolRequestParam {
        name: name.to_string().into(),
        arguments: args.as_object().cloned(),
    }
}

/// The text of the first content item.
pub fn text(result: &CallToolResult) -> String {
    let v = serde_json::to_value(result).unwrap();
    v["content"][0]["text"].as_str().unwrap_or_default().to_string()
}

/// The first content item parsed as JSON.
pub fn json_body(result: &CallToolResult) -> Value {
    serde_json::from_str(&text(result)).unwrap()
}

pub async fn call_tool(
    registry: &ProviderRegistry,
    name: &str,
    args: Value,
) -> Result<CallToolResult, m365_core::ToolError> {
    registry.call_tool(call(name, args)).await
}
