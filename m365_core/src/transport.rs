use serde_json::Value;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::mcp_server::JsonRpcHandler;

/// Handle one newline-delimited message. Unparseable input yields a -32700 response;
/// notifications yield nothing.
pub async fn handle_line(handler: &JsonRpcHandler, line: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(line) {
        Ok(request) => handler.handle_request(request).await,
        Err(e) => {
            error!("Failed to parse JSON-RPC request: {}", e);
            Some(serde_json::json!({
                "jsonrpc": "2.0",
                "error": {
                    "code": -32700,
                    "message": "Parse error",
                    "data": e.to_string()
                },
                "id": null
            }))
        }
    }
}

/// Stdio transport for MCP server
pub struct StdioTransport {
    handler: Arc<JsonRpcHandler>,
}

impl StdioTransport {
    pub fn new(handler: Arc<JsonRpcHandler>) -> Self {
        Self { handler }
    }

    /// Run the stdio transport, reading from stdin and writing to stdout
    pub async fn run(&self) -> io::Result<()> {
        info!("Starting stdio transport");
        self.serve(tokio::io::stdin(), tokio::io::stdout())
            .await
            .map(|_| ())
    }

    /// Serve requests from `reader` until EOF. Each request runs on its own task;
    /// a single writer task serialises responses onto `writer`, which is returned
    /// once every response has been flushed.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> io::Result<W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = rx.recv().await {
                let response_str = serde_json::to_string(&response)?;
                writer.write_all(response_str.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                debug!("Sent response: {}", response_str);
            }
            Ok::<W, io::Error>(writer)
        });

        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let handler = self.handler.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Some(response) = handle_line(&handler, &line).await {
                            if tx.send(response).is_err() {
                                error!("stdout writer has stopped; dropping response");
                            }
                        }
                    });
                }
                Ok(None) => {
                    debug!("EOF reached on stdin");
                    break;
                }
                Err(e) => {
                    error!("Error reading from stdin: {}", e);
                    break;
                }
            }
        }

        // In-flight request tasks hold the remaining senders.
        drop(tx);
        writer_task
            .await
            .map_err(io::Error::other)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, Endpoints, GraphVersion, Settings};
    use crate::mcp_server::McpServer;
    use crate::{GraphClient, ProviderRegistry};

    fn transport() -> StdioTransport {
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
        let server = McpServer::new(Arc::new(ProviderRegistry::new()), Arc::new(client));
        StdioTransport::new(Arc::new(JsonRpcHandler::new(server)))
    }

    #[tokio::test]
    async fn answers_requests_and_skips_notifications() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n",
        );
        let out = transport()
            .serve(input.as_bytes(), Vec::new())
            .await
            .unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 1);
        let resp: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn malformed_line_gets_parse_error() {
        let out = transport()
            .serve("{not json\n".as_bytes(), Vec::new())
            .await
            .unwrap();
        let resp: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(resp["error"]["code"], -32700);
        assert!(resp["id"].is_null());
    }
}
