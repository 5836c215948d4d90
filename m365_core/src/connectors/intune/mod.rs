//! Intune device management: managed devices, configuration, apps and compliance.

pub mod apps;
pub mod compliance;
pub mod devices;
pub mod policies;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;
use crate::graph_client::GraphClient;
use crate::utils::parse_args;
use crate::Connector;

/// Group assignment targets for Intune `assign` actions.
pub(crate) fn group_targets(group_ids: &[String]) -> Vec<Value> {
    group_ids
        .iter()
        .map(|id| {
            json!({
                "@odata.type": "#microsoft.graph.groupAssignmentTarget",
                "groupId": id,
            })
        })
        .collect()
}

pub(crate) fn require_odata_type(object: &Map<String, Value>) -> Result<(), ToolError> {
    match object.get("@odata.type").and_then(|t| t.as_str()) {
        Some(t) if t.starts_with("#microsoft.graph.") => Ok(()),
        _ => Err(ToolError::invalid(
            "policy must include an @odata.type such as #microsoft.graph.windows10CompliancePolicy",
        )),
    }
}

pub struct IntuneConnector {
    client: Arc<GraphClient>,
}

impl IntuneConnector {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for IntuneConnector {
    fn name(&self) -> &'static str {
        "intune"
    }

    fn description(&self) -> &'static str {
        "Microsoft Intune managed devices, configuration profiles, apps and compliance."
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        Ok(vec![
            devices::definition()?,
            policies::definition()?,
            apps::definition()?,
            compliance::definition()?,
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
            devices::TOOL_NAME => devices::run(client, parse_args(name, args)?).await,
            policies::TOOL_NAME => policies::run(client, parse_args(name, args)?).await,
            apps::TOOL_NAME => apps::run(client, parse_args(name, args)?).await,
            compliance::TOOL_NAME => compliance::run(client, parse_args(name, args)?).await,
            _ => Err(ToolError::ToolNotFound(name.to_string())),
        }
    }
}
