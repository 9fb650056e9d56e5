use futures::future::join_all;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::tools::{RegisteredTool, ToolRegistry};
use crate::transport::{
    decode, encode, Envelope, Incoming, JsonRpcResponse, Message, Reply, RequestId, RpcError,
    Strictness, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};

const SERVER_NAME: &str = "ncbi-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Routes decoded requests to built-in methods and registered tools. Holds
/// nothing mutable: the registry is shared read-only.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    strictness: Strictness,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, strictness: Strictness) -> Self {
        Self {
            registry,
            strictness,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Handles one input line, returning the line to write back, if any.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let reply = match decode(line, self.strictness) {
            Ok(incoming) => self.dispatch(incoming).await?,
            Err(response) => {
                debug!(error = ?response.rpc_error(), "rejected input line");
                Reply::Single(response)
            }
        };
        Some(encode(&reply))
    }

    /// Answers a single request or a batch. Batch entries run concurrently and
    /// their responses keep input order; notifications add nothing, so a batch
    /// of only notifications yields `None`.
    pub async fn dispatch(&self, incoming: Incoming) -> Option<Reply> {
        match incoming {
            Incoming::Single(message) => self.handle_message(message).await.map(Reply::Single),
            Incoming::Batch(messages) => {
                let responses: Vec<JsonRpcResponse> =
                    join_all(messages.into_iter().map(|m| self.handle_message(m)))
                        .await
                        .into_iter()
                        .flatten()
                        .collect();

                if responses.is_empty() {
                    None
                } else {
                    Some(Reply::Batch(responses))
                }
            }
        }
    }

    async fn handle_message(&self, message: Message) -> Option<JsonRpcResponse> {
        match message {
            Message::Rejected(rejected) => Some(JsonRpcResponse::error(
                rejected.id,
                rejected.code,
                rejected.message,
            )),
            Message::Request(envelope) => self.handle_request(envelope).await,
        }
    }

    async fn handle_request(&self, envelope: Envelope) -> Option<JsonRpcResponse> {
        let Envelope { id, method, params } = envelope;
        debug!(method = %method, notification = id.is_none(), "request");

        let outcome = self.route(&method, params).await;

        let Some(id) = id else {
            if let Err(e) = outcome {
                debug!(method = %method, code = e.code, error = %e.message, "notification failed");
            }
            return None;
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::failure(id, e),
        })
    }

    async fn route(&self, method: &str, params: Map<String, Value>) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.list() })),
            "tools/call" => self.call_tool(params).await,
            "resources/list" => Ok(json!({ "resources": self.registry.resources() })),
            "initialized" => Ok(json!({})),
            m if m.starts_with("notifications/") => Ok(json!({})),
            name => match self.registry.lookup(name) {
                Some(tool) => self.invoke(tool, params).await,
                None => Err(RpcError::new(
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", name),
                )),
            },
        }
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            }
        })
    }

    /// `tools/call`: runs the named tool and wraps its object as MCP content.
    async fn call_tool(&self, params: Map<String, Value>) -> Result<Value, RpcError> {
        let name = match params.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.as_str(),
            _ => {
                return Err(RpcError::new(
                    INVALID_PARAMS,
                    "tools/call requires a non-empty string `name`",
                ))
            }
        };

        let arguments = params
            .get("arguments")
            .filter(|v| !v.is_null())
            .or_else(|| params.get("parameters"));
        let arguments = match arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(arguments)) => arguments.clone(),
            Some(_) => {
                return Err(RpcError::new(INVALID_PARAMS, "`arguments` must be an object"));
            }
        };

        let tool = self
            .registry
            .lookup(name)
            .ok_or_else(|| RpcError::new(METHOD_NOT_FOUND, format!("Unknown tool: {}", name)))?;

        let result = self.invoke(tool, arguments).await?;
        let text = serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());

        Ok(json!({
            "content": [{
                "type": "text",
                "text": text
            }],
            "structuredContent": result
        }))
    }

    /// Runs a tool, turning its error or panic into an [`RpcError`].
    async fn invoke(&self, tool: &RegisteredTool, args: Map<String, Value>) -> Result<Value, RpcError> {
        let name = tool.descriptor.name;
        let started = Instant::now();

        match AssertUnwindSafe(tool.invoke(args)).catch_unwind().await {
            Ok(Ok(result)) => {
                debug!(tool = name, elapsed_ms = started.elapsed().as_millis() as u64, "tool ok");
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!(tool = name, code = e.code(), error = %e, "tool failed");
                Err(RpcError::new(e.code(), e.to_string()))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(tool = name, panic = message, "tool panicked");
                Err(RpcError::new(
                    INTERNAL_ERROR,
                    format!("tool {} failed unexpectedly: {}", name, message),
                ))
            }
        }
    }

    /// Reads line-delimited requests until EOF, writing at most one line per
    /// input line. Blank lines are skipped; a line that is not UTF-8 gets a
    /// parse error and the loop carries on.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(
            tools = self.registry.len(),
            resources = self.registry.resources().len(),
            "serving on stdio"
        );

        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let output = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line.trim()).await,
                Err(e) => {
                    debug!(error = %e, "input line is not UTF-8");
                    Some(encode(&Reply::Single(JsonRpcResponse::error(
                        RequestId::Null,
                        PARSE_ERROR,
                        format!("Parse error: input is not valid UTF-8: {}", e),
                    ))))
                }
            };

            if let Some(output) = output {
                writer.write_all(output.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!("input closed, shutting down");
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return message;
    }
    match panic.downcast_ref::<String>() {
        Some(message) => message.as_str(),
        None => "panic",
    }
}
