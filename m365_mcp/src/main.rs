mod http;

use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use m365_core::{
    build_registry,
    mcp_server::{JsonRpcHandler, McpServer},
    transport::StdioTransport,
    GraphClient, Settings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[derive(Debug, Parser)]
#[command(name = "m365_mcp", version)]
#[command(about = "MCP server for Microsoft 365 administration over Graph and Azure Resource Manager")]
struct Args {
    /// Transport to serve MCP on
    #[arg(long, env = "M365_TRANSPORT", value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Listen port for the HTTP transport
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Listen address for the HTTP transport
    #[arg(long, env = "M365_HTTP_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Tracing filter, e.g. `debug` or `m365_core=trace`; falls back to RUST_LOG
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    // stdout carries JSON-RPC on the stdio transport
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    info!(transport = ?args.transport, "Starting Microsoft 365 MCP server");

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        tenant = %settings.credentials.tenant_id,
        graph = %settings.endpoints.graph_base,
        version = settings.graph_version.as_str(),
        "configuration loaded"
    );

    let client = match GraphClient::new(&settings) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("failed to build API client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let registry = match build_registry(client.clone()) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("failed to register tools: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(tools = registry.tools().len(), "tool catalog ready");

    let handler = Arc::new(JsonRpcHandler::new(McpServer::new(registry, client)));

    let result = match args.transport {
        Transport::Stdio => StdioTransport::new(handler).run().await,
        Transport::Http => http::serve(handler, SocketAddr::new(args.host, args.port)).await,
    };

    if let Err(e) = result {
        error!("Transport error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
