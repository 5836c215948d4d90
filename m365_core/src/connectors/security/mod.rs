//! Security operations: audit logs, Defender alerts and conditional access.

pub mod alerts;
pub mod audit;
pub mod conditional_access;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;
use crate::graph_client::GraphClient;
use crate::utils::parse_args;
use crate::Connector;

pub struct SecurityConnector {
    client: Arc<GraphClient>,
}

impl SecurityConnector {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for SecurityConnector {
    fn name(&self) -> &'static str {
        "security"
    }

    fn description(&self) -> &'static str {
        "Audit log search, security alert triage and conditional access policies."
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        Ok(vec![
            audit::definition()?,
            alerts::definition()?,
            conditional_access::definition()?,
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
            audit::TOOL_NAME => audit::run(client, parse_args(name, args)?).await,
            alerts::TOOL_NAME => alerts::run(client, parse_args(name, args)?).await,
            conditional_access::TOOL_NAME => {
                conditional_access::run(client, parse_args(name, args)?).await
            }
            _ => Err(ToolError::ToolNotFound(name.to_string())),
        }
    }
}
