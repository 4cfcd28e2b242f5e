//! Remote tool server connector.
//!
//! Owns the client sessions behind every connected MCP server. On
//! connect it enumerates the server's tools and hands them to the
//! manager (which applies the `mcp_` prefix and schema rewrites); on
//! disconnect it drops the tools and cancels the session. Teardown is
//! bounded: a stuck session must never block gateway shutdown.

use crate::error::{ConnectError, GatewayError, Result};
use crate::manager::{RemoteDispatch, RemoteToolDef, ToolManager, ToolSpec};
use async_trait::async_trait;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    RawContent,
};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{Peer, RoleClient, ServiceExt};
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as Json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;

/// Teardown budget for all open sessions.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport used to reach a remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    #[default]
    Stdio,
    Sse,
    #[serde(alias = "http")]
    StreamableHttp,
}

/// Configuration for one remote tool server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub transport: TransportKind,
    pub url: Option<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
}

/// Parses the conventional `{"mcpServers": {name: {...}}}` layout.
pub fn parse_server_configs(config: &Json) -> Result<Vec<ServerConfig>> {
    let Some(servers) = config.get("mcpServers").and_then(Json::as_object) else {
        return Err(GatewayError::Config(
            "expected an object with an 'mcpServers' key".to_string(),
        ));
    };
    let mut parsed = Vec::with_capacity(servers.len());
    for (name, body) in servers {
        let mut server: ServerConfig = serde_json::from_value(body.clone())?;
        server.name = name.clone();
        parsed.push(server);
    }
    Ok(parsed)
}

enum McpSession {
    Stdio(RunningService<RoleClient, ()>),
    Http(RunningService<RoleClient, ClientInfo>),
}

impl McpSession {
    fn peer(&self) -> Peer<RoleClient> {
        match self {
            Self::Stdio(service) => service.peer().clone(),
            Self::Http(service) => service.peer().clone(),
        }
    }

    async fn cancel(self) {
        match self {
            Self::Stdio(service) => {
                let _ = service.cancel().await;
            }
            Self::Http(service) => {
                let _ = service.cancel().await;
            }
        }
    }
}

/// Remote dispatch capability backed by a live session peer.
struct McpRemote {
    server: String,
    peer: Peer<RoleClient>,
}

#[async_trait]
impl RemoteDispatch for McpRemote {
    async fn call_tool(&self, name: &str, args: JsonMap<String, Json>) -> anyhow::Result<Json> {
        let result = self
            .peer
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_string().into(),
                arguments: Some(args),
                task: None,
            })
            .await
            .map_err(|e| anyhow::anyhow!("tools/call failed for {}::{name}: {e}", self.server))?;
        parse_call_result(result)
    }
}

/// Maps an MCP call result to a raw JSON value: structured content
/// when present, otherwise text content (parsed as JSON when it is).
fn parse_call_result(result: CallToolResult) -> anyhow::Result<Json> {
    let text = |result: &CallToolResult| -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    if result.is_error == Some(true) {
        anyhow::bail!("remote tool returned an error: {}", text(&result));
    }
    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }
    let text = text(&result);
    match serde_json::from_str(&text) {
        Ok(json) => Ok(json),
        Err(_) => Ok(Json::String(text)),
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        meta: None,
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "toolgate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Default::default()
        },
    }
}

/// Handles remote server connection lifecycle.
pub struct RemoteConnector {
    manager: Arc<ToolManager>,
    sessions: Mutex<HashMap<String, McpSession>>,
}

impl RemoteConnector {
    #[must_use]
    pub fn new(manager: Arc<ToolManager>) -> Self {
        Self {
            manager,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn is_connected(&self, server_name: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(server_name)
    }

    /// Connects to a server and registers its tools with the manager.
    pub async fn connect(&self, config: &ServerConfig) -> Result<Vec<ToolSpec>> {
        if self.is_connected(&config.name) {
            return Err(ConnectError::AlreadyConnected {
                name: config.name.clone(),
            }
            .into());
        }

        let session = self.open_session(config).await?;
        let peer = session.peer();

        let listed = match peer.list_tools(Default::default()).await {
            Ok(listed) => listed,
            Err(e) => {
                session.cancel().await;
                return Err(ConnectError::Transport {
                    server: config.name.clone(),
                    source: anyhow::Error::new(e),
                }
                .into());
            }
        };

        let defs: Vec<RemoteToolDef> = listed
            .tools
            .into_iter()
            .map(|tool| RemoteToolDef {
                name: tool.name.to_string(),
                description: tool
                    .description
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
                input_schema: Json::Object((*tool.input_schema).clone()),
                output_schema: tool
                    .output_schema
                    .map(|schema| Json::Object((*schema).clone())),
            })
            .collect();

        let dispatch = Arc::new(McpRemote {
            server: config.name.clone(),
            peer,
        });
        let specs = match self
            .manager
            .add_remote_server(&config.name, dispatch, defs)
        {
            Ok(specs) => specs,
            Err(e) => {
                session.cancel().await;
                return Err(e.into());
            }
        };

        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(config.name.clone(), session);

        tracing::info!(
            server = %config.name,
            tools = specs.len(),
            "connected remote server"
        );
        Ok(specs)
    }

    /// Connects every configured server, skipping failures.
    ///
    /// A server that fails to start is logged and left out; the
    /// survivors keep the gateway useful.
    pub async fn connect_all(&self, configs: &[ServerConfig]) -> usize {
        let mut connected = 0;
        for config in configs {
            match self.connect(config).await {
                Ok(specs) => {
                    connected += 1;
                    tracing::info!(server = %config.name, tools = specs.len(), "server ready");
                }
                Err(e) => {
                    tracing::error!(server = %config.name, error = %e, "failed to connect");
                }
            }
        }
        connected
    }

    /// Removes the server's tools and closes its session.
    pub async fn disconnect(&self, server_name: &str) -> Result<Vec<String>> {
        let session = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(server_name);
        let Some(session) = session else {
            return Err(ConnectError::NotConnected {
                name: server_name.to_string(),
            }
            .into());
        };

        let removed = self.manager.remove_remote_server(server_name);
        session.cancel().await;
        tracing::info!(server = %server_name, tools = removed.len(), "disconnected");
        Ok(removed)
    }

    /// Shuts down every open session under [`SHUTDOWN_TIMEOUT`].
    ///
    /// Partial-failure policy is continue: sessions that refuse to die
    /// in time are abandoned rather than allowed to block teardown.
    pub async fn close(&self) {
        let sessions: Vec<(String, McpSession)> = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        if sessions.is_empty() {
            return;
        }

        let teardown = futures::future::join_all(sessions.into_iter().map(
            |(name, session)| async move {
                session.cancel().await;
                tracing::debug!(server = %name, "session closed");
            },
        ));

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, teardown).await.is_err() {
            tracing::warn!("shutdown timeout elapsed; abandoning remaining sessions");
        }
    }

    async fn open_session(&self, config: &ServerConfig) -> Result<McpSession> {
        match config.transport {
            TransportKind::Stdio => {
                let Some(command) = &config.command else {
                    return Err(ConnectError::InvalidConfig {
                        name: config.name.clone(),
                        reason: "stdio transport requires 'command'".to_string(),
                    }
                    .into());
                };
                let mut cmd = Command::new(command);
                cmd.args(&config.args);
                for (key, value) in &config.env {
                    cmd.env(key, value);
                }
                if let Some(cwd) = &config.cwd {
                    cmd.current_dir(cwd);
                }

                let transport =
                    TokioChildProcess::new(cmd).map_err(|e| ConnectError::Transport {
                        server: config.name.clone(),
                        source: anyhow::Error::new(e),
                    })?;
                let service = ()
                    .serve(transport)
                    .await
                    .map_err(|e| ConnectError::Transport {
                        server: config.name.clone(),
                        source: anyhow::Error::new(e),
                    })?;
                Ok(McpSession::Stdio(service))
            }
            TransportKind::Sse | TransportKind::StreamableHttp => {
                let Some(url) = &config.url else {
                    return Err(ConnectError::InvalidConfig {
                        name: config.name.clone(),
                        reason: format!("{:?} transport requires 'url'", config.transport),
                    }
                    .into());
                };
                let transport = StreamableHttpClientTransport::from_config(
                    StreamableHttpClientTransportConfig::with_uri(url.as_str()),
                );
                let service =
                    client_info()
                        .serve(transport)
                        .await
                        .map_err(|e| ConnectError::Transport {
                            server: config.name.clone(),
                            source: anyhow::Error::new(e),
                        })?;
                Ok(McpSession::Http(service))
            }
        }
    }
}
