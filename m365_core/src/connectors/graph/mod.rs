//! Protocol-level Graph tools: generic calls, batching, delta sync, subscriptions and search.

pub mod api;
pub mod batch;
pub mod delta;
pub mod search;
pub mod webhooks;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;
use crate::graph_client::GraphClient;
use crate::utils::parse_args;
use crate::Connector;

pub struct GraphApiConnector {
    client: Arc<GraphClient>,
}

impl GraphApiConnector {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for GraphApiConnector {
    fn name(&self) -> &'static str {
        "graph"
    }

    fn description(&self) -> &'static str {
        "Generic Microsoft Graph and Azure Resource Manager access."
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        Ok(vec![
            api::definition()?,
            batch::definition()?,
            delta::definition()?,
            webhooks::definition()?,
            search::definition()?,
        ])
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ToolError> {
        let name = request.name.as_ref();
        let args = request.arguments;
        debug!(connector = self.name(), tool = name, "dispatching tool call");
        let client = self.client.as_ref();
        match name {
            api::TOOL_NAME => api::run(client, parse_args(name, args)?).await,
            batch::TOOL_NAME => batch::run(client, parse_args(name, args)?).await,
            delta::TOOL_NAME => delta::run(client, parse_args(name, args)?).await,
            webhooks::TOOL_NAME => webhooks::run(client, parse_args(name, args)?).await,
            search::TOOL_NAME => search::run(client, parse_args(name, args)?).await,
            _ => Err(ToolError::ToolNotFound(name.to_string())),
        }
    }
}
