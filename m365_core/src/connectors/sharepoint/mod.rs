pub mod lists;
pub mod sites;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;
use crate::graph_client::GraphClient;
use crate::utils::parse_args;
use crate::Connector;

pub struct SharePointConnector {
    client: Arc<GraphClient>,
}

impl SharePointConnector {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for SharePointConnector {
    fn name(&self) -> &'static str {
        "sharepoint"
    }

    fn description(&self) -> &'static str {
        "SharePoint Online sites, drives, permissions and lists."
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        Ok(vec![sites::definition()?, lists::definition()?])
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ToolError> {
        let name = request.name.as_ref();
        let args = request.arguments;
        debug!(connector = self.name(), tool = name, "dispatching tool call");
        match name {
            sites::TOOL_NAME => sites::run(&self.client, parse_args(name, args)?).await,
            lists::TOOL_NAME => lists::run(&self.client, parse_args(name, args)?).await,
            _ => Err(ToolError::ToolNotFound(name.to_string())),
        }
    }
}
