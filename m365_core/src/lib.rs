// src/lib.rs
pub mod config;
pub mod connectors;
pub mod error;
pub mod graph_client;
pub mod mcp_server;
pub mod oauth;
pub mod resources;
pub mod token;
pub mod transport;
pub mod utils;

use std::collections::HashMap;
use std::sync::Arc;

pub use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, InitializeRequestParam,
    InitializeResult, JsonObject, ProtocolVersion, ServerCapabilities, Tool,
};

use async_trait::async_trait;
use tracing::debug;

pub use crate::config::Settings;
pub use crate::error::ToolError;
pub use crate::graph_client::GraphClient;

/// A group of related tools backed by one area of the Graph/ARM surface.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Tool definitions, including input schemas and behaviour hints.
    fn list_tools(&self) -> Result<Vec<Tool>, ToolError>;

    async fn call_tool(&self, request: CallToolRequestParam)
        -> Result<CallToolResult, ToolError>;
}

/// Routes tool calls by name to the connector that declared the tool.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Connector>>,
    routes: HashMap<String, usize>,
    tools: Vec<Tool>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            providers: Vec::new(),
            routes: HashMap::new(),
            tools: Vec::new(),
        }
    }

    pub fn register_provider(&mut self, provider: Arc<dyn Connector>) -> Result<(), ToolError> {
        let index = self.providers.len();
        let tools = provider.list_tools()?;
        debug!(
            connector = provider.name(),
            description = provider.description(),
            tools = tools.len(),
            "registering connector"
        );
        for tool in tools {
            if self.routes.contains_key(tool.name.as_ref()) {
                return Err(ToolError::Internal(format!(
                    "tool '{}' registered twice (second by {})",
                    tool.name,
                    provider.name()
                )));
            }
            self.routes.insert(tool.name.to_string(), index);
            self.tools.push(tool);
        }
        self.providers.push(provider);
        Ok(())
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn provider_for(&self, tool_name: &str) -> Option<&Arc<dyn Connector>> {
        self.routes
            .get(tool_name)
            .and_then(|&i| self.providers.get(i))
    }

    pub async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ToolError> {
        let provider = self
            .provider_for(&request.name)
            .ok_or_else(|| ToolError::ToolNotFound(request.name.to_string()))?;
        provider.call_tool(request).await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register every connector against a shared API client.
pub fn build_registry(client: Arc<GraphClient>) -> Result<ProviderRegistry, ToolError> {
    let mut registry = ProviderRegistry::new();
    registry.register_provider(Arc::new(connectors::graph::GraphApiConnector::new(
        client.clone(),
    )))?;
    registry.register_provider(Arc::new(connectors::directory::DirectoryConnector::new(
        client.clone(),
    )))?;
    registry.register_provider(Arc::new(connectors::exchange::ExchangeConnector::new(
        client.clone(),
    )))?;
    registry.register_provider(Arc::new(connectors::sharepoint::SharePointConnector::new(
        client.clone(),
    )))?;
    registry.register_provider(Arc::new(connectors::intune::IntuneConnector::new(
        client.clone(),
    )))?;
    registry.register_provider(Arc::new(connectors::security::SecurityConnector::new(
        client.clone(),
    )))?;
    registry.register_provider(Arc::new(connectors::compliance::ComplianceConnector::new(
        client.clone(),
    )))?;
    registry.register_provider(Arc::new(connectors::documents::DocumentConnector::new(
        client,
    )))?;
    Ok(registry)
}
