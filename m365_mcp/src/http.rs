//! Streamless HTTP transport: one JSON-RPC message per `POST /mcp`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use m365_core::{mcp_server::JsonRpcHandler, transport::handle_line};

pub fn router(handler: Arc<JsonRpcHandler>) -> Router {
    Router::new()
        .route("/mcp", post(mcp_endpoint))
        .route("/health", get(health))
        .with_state(handler)
}

async fn mcp_endpoint(State(handler): State<Arc<JsonRpcHandler>>, body: String) -> Response {
    match handle_line(&handler, &body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": m365_core::mcp_server::SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn serve(handler: Arc<JsonRpcHandler>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP transport listening on http://{}/mcp", listener.local_addr()?);
    axum::serve(listener, router(handler))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
