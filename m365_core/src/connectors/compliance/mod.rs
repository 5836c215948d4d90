//! Microsoft Purview compliance: DLP, labels, assessments, audit reports and DSARs.

pub mod assessments;
pub mod dlp;
pub mod labels;
pub mod reports;
pub mod subject_rights;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;
use crate::graph_client::GraphClient;
use crate::utils::parse_args;
use crate::Connector;

pub struct ComplianceConnector {
    client: Arc<GraphClient>,
}

impl ComplianceConnector {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for ComplianceConnector {
    fn name(&self) -> &'static str {
        "compliance"
    }

    fn description(&self) -> &'static str {
        "Data loss prevention, sensitivity and retention labels, Secure Score assessments, \
         audit reports and subject rights requests."
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        let mut tools = dlp::definitions()?;
        tools.extend(labels::definitions()?);
        tools.push(assessments::definition()?);
        tools.push(reports::definition()?);
        tools.push(subject_rights::definition()?);
        Ok(tools)
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
            dlp::POLICIES_TOOL => dlp::run_policies(client, parse_args(name, args)?).await,
            dlp::INCIDENTS_TOOL => dlp::run_incidents(client, parse_args(name, args)?).await,
            labels::SENSITIVITY_TOOL => {
                labels::run_sensitivity(client, parse_args(name, args)?).await
            }
            labels::RETENTION_TOOL => labels::run_retention(client, parse_args(name, args)?).await,
            assessments::TOOL_NAME => assessments::run(client, parse_args(name, args)?).await,
            reports::TOOL_NAME => reports::run(client, parse_args(name, args)?).await,
            subject_rights::TOOL_NAME => {
                subject_rights::run(client, parse_args(name, args)?).await
            }
            _ => Err(ToolError::ToolNotFound(name.to_string())),
        }
    }
}
