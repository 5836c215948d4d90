use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    graph_client::GraphClient, resources::ResourceCatalog, ProviderRegistry, ToolError,
};
use rmcp::model::*;

pub const SERVER_NAME: &str = "m365-mcp";

const INSTRUCTIONS: &str = "Administer a Microsoft 365 tenant through Microsoft Graph and Azure \
Resource Manager: users, groups, Exchange, SharePoint, Intune, security and compliance. Every \
tool takes an `action` field selecting the operation; read-only resources live under m365://.";

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    uri: String,
}

/// MCP server state shared by every transport.
pub struct McpServer {
    registry: Arc<ProviderRegistry>,
    client: Arc<GraphClient>,
    resources: ResourceCatalog,
}

impl McpServer {
    pub fn new(registry: Arc<ProviderRegistry>, client: Arc<GraphClient>) -> Self {
        Self {
            registry,
            client,
            resources: ResourceCatalog::new(),
        }
    }

    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities::builder()
            .enable_tools()
            .enable_resources()
            .build()
    }

    pub fn handle_initialize(&self, params: &Value) -> InitializeResult {
        match serde_json::from_value::<InitializeRequestParam>(params.clone()) {
            Ok(req) => info!(
                client = %req.client_info.name,
                client_version = %req.client_info.version,
                "MCP client initializing"
            ),
            Err(_) => info!("MCP client initializing"),
        }

        InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.capabilities(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: Some("Microsoft 365 administration".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    pub fn handle_list_tools(&self) -> ListToolsResult {
        ListToolsResult {
            tools: self.registry.tools().to_vec(),
            next_cursor: None,
        }
    }

    pub async fn handle_call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ToolError> {
        info!(tool = %request.name, "tool call");
        let result = self.registry.call_tool(request).await;
        if let Err(e) = &result {
            warn!(kind = e.code_str(), error = %e, "tool call failed");
        }
        result
    }

    pub fn handle_list_resources(&self) -> Value {
        json!({ "resources": self.resources.list() })
    }

    pub fn handle_list_resource_templates(&self) -> Value {
        json!({ "resourceTemplates": self.resources.templates() })
    }

    pub async fn handle_read_resource(&self, uri: &str) -> Result<Value, ToolError> {
        let contents = self.resources.read(&self.client, uri).await?;
        Ok(json!({ "contents": contents }))
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::InvalidParams(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(ToolError::SerdeJson)
}

/// JSON-RPC message handler for the MCP server
pub struct JsonRpcHandler {
    server: McpServer,
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Process one JSON-RPC message. Notifications produce no response.
    pub async fn handle_request(&self, request: Value) -> Option<Value> {
        let Some(method) = request.get("method").and_then(|m| m.as_str()) else {
            let id = request.get("id").cloned().unwrap_or(Value::Null);
            return Some(json!({
                "jsonrpc": "2.0",
                "error": {"code": -32600, "message": "Invalid request"},
                "id": id,
            }));
        };
        let id = match request.get("id") {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                debug!(method, "notification received");
                return None;
            }
        };
        debug!(method, id = %id, "handling request");
        let params = request.get("params").cloned().unwrap_or(json!({}));

        let result = match method {
            "initialize" => to_value(self.server.handle_initialize(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => to_value(self.server.handle_list_tools()),
            "tools/call" => match parse_params::<CallToolRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_call_tool(req)
                    .await
                    .and_then(to_value),
                Err(e) => Err(e),
            },
            "resources/list" => Ok(self.server.handle_list_resources()),
            "resources/templates/list" => Ok(self.server.handle_list_resource_templates()),
            "resources/read" => match parse_params::<ReadResourceParams>(params) {
                Ok(req) => self.server.handle_read_resource(&req.uri).await,
                Err(e) => Err(e),
            },
            _ => Err(ToolError::MethodNotFound),
        };

        Some(match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error.to_jsonrpc_error(),
                "id": id,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, Endpoints, GraphVersion, Settings};
    use crate::Connector;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct EchoConnector;

    #[derive(schemars::JsonSchema)]
    #[allow(dead_code)]
    struct EchoArgs {
        x: Option<i64>,
    }

    #[async_trait]
    impl Connector for EchoConnector {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "echoes its arguments"
        }

        fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
            Ok(vec![crate::utils::tool::<EchoArgs>(
                "echo",
                "Echo the arguments back",
                crate::utils::Hints::READ_ONLY,
            )?])
        }

        async fn call_tool(
            &self,
            request: CallToolRequestParam,
        ) -> Result<CallToolResult, ToolError> {
            match request.arguments {
                Some(args) if args.contains_key("fail") => {
                    Err(ToolError::invalid("fail was requested"))
                }
                args => crate::utils::json_result(&json!(args)),
            }
        }
    }

    fn handler() -> JsonRpcHandler {
        let client = GraphClient::new(&Settings {
            credentials: Credentials {
                tenant_id: "t".into(),
                client_id: "c".into(),
                client_secret: "s".into(),
            },
            endpoints: Endpoints::default(),
            graph_version: GraphVersion::V1,
        })
        .unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register_provider(Arc::new(EchoConnector)).unwrap();
        JsonRpcHandler::new(McpServer::new(Arc::new(registry), Arc::new(client)))
    }

    #[tokio::test]
    async fn initialize_reports_server_info_and_capabilities() {
        let resp = handler()
            .handle_request(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .await
            .unwrap();
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["serverInfo"]["name"], SERVER_NAME);
        assert!(resp["result"]["capabilities"]["tools"].is_object());
        assert!(resp["result"]["capabilities"]["resources"].is_object());
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let h = handler();
        let resp = h
            .handle_request(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(resp.is_none());
        let resp = h
            .handle_request(json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 3}}))
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let resp = handler()
            .handle_request(json!({"jsonrpc": "2.0", "id": "a", "method": "prompts/list"}))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], -32601);
        assert_eq!(resp["id"], "a");
    }

    #[tokio::test]
    async fn message_without_method_is_invalid_request() {
        let resp = handler()
            .handle_request(json!({"jsonrpc": "2.0", "id": 9}))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn lists_and_calls_registered_tools() {
        let h = handler();
        let resp = h
            .handle_request(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .await
            .unwrap();
        assert_eq!(resp["result"]["tools"][0]["name"], "echo");
        assert_eq!(resp["result"]["tools"][0]["annotations"]["readOnlyHint"], true);

        let resp = h
            .handle_request(json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "echo", "arguments": {"x": 1}}
            }))
            .await
            .unwrap();
        let text = resp["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("\"x\": 1"));
    }

    #[tokio::test]
    async fn tool_errors_become_jsonrpc_errors() {
        let h = handler();
        let resp = h
            .handle_request(json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "echo", "arguments": {"fail": true}}
            }))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], -32602);
        assert_eq!(resp["error"]["data"]["kind"], "invalid_params");

        let resp = h
            .handle_request(json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": {"name": "missing_tool"}
            }))
            .await
            .unwrap();
        assert_eq!(resp["error"]["data"]["kind"], "tool_not_found");
    }

    #[tokio::test]
    async fn resource_listing_and_unknown_read() {
        let h = handler();
        let resp = h
            .handle_request(json!({"jsonrpc": "2.0", "id": 6, "method": "resources/templates/list"}))
            .await
            .unwrap();
        assert_eq!(resp["result"]["resourceTemplates"].as_array().unwrap().len(), 5);

        let resp = h
            .handle_request(json!({
                "jsonrpc": "2.0", "id": 7, "method": "resources/read",
                "params": {"uri": "m365://nothing/here/at/all"}
            }))
            .await
            .unwrap();
        assert_eq!(resp["error"]["data"]["kind"], "not_found");
    }
}
