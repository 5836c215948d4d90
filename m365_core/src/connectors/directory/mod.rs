//! Entra ID directory administration: groups, users, roles, apps and devices.

pub mod apps;
pub mod devices;
pub mod groups;
pub mod offboarding;
pub mod roles;
pub mod service_principals;
pub mod users;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;
use crate::graph_client::GraphClient;
use crate::utils::parse_args;
use crate::Connector;
use groups::GroupKind;

pub struct DirectoryConnector {
    client: Arc<GraphClient>,
}

impl DirectoryConnector {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for DirectoryConnector {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn description(&self) -> &'static str {
        "Entra ID groups, users, offboarding, roles, applications, devices and service principals."
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        let mut tools = groups::definitions()?;
        tools.push(users::definition()?);
        tools.push(offboarding::definition()?);
        tools.push(roles::definition()?);
        tools.push(apps::definition()?);
        tools.push(devices::definition()?);
        tools.push(service_principals::definition()?);
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
            groups::DISTRIBUTION_LISTS => {
                groups::run_groups(client, GroupKind::Distribution, parse_args(name, args)?).await
            }
            groups::SECURITY_GROUPS => {
                groups::run_groups(client, GroupKind::Security, parse_args(name, args)?).await
            }
            groups::M365_GROUPS => groups::run_m365_groups(client, parse_args(name, args)?).await,
            users::TOOL_NAME => users::run(client, parse_args(name, args)?).await,
            offboarding::TOOL_NAME => offboarding::run(client, parse_args(name, args)?).await,
            roles::TOOL_NAME => roles::run(client, parse_args(name, args)?).await,
            apps::TOOL_NAME => apps::run(client, parse_args(name, args)?).await,
            devices::TOOL_NAME => devices::run(client, parse_args(name, args)?).await,
            service_principals::TOOL_NAME => {
                service_principals::run(client, parse_args(name, args)?).await
            }
            _ => Err(ToolError::ToolNotFound(name.to_string())),
        }
    }
}
