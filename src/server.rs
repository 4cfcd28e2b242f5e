//! MCP server implementation using rmcp.
//!
//! Exposes the three gateway operations as MCP tools. The planner
//! never sees the real tool population directly; it searches, then
//! either executes one tool or submits a whole workflow program.

use crate::audit::JsonDirSink;
use crate::connector::RemoteConnector;
use crate::error::ElicitError;
use crate::manager::ToolManager;
use crate::tools;
use crate::workflow::{ElicitCapability, TrackingStrategy, RESERVED_NAMESPACE};
use async_trait::async_trait;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::ToolCallContext;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, CreateElicitationRequestParams,
    Implementation, ListToolsResult, PaginatedRequestParams, ProtocolVersion,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{Peer, RequestContext};
use rmcp::{tool, tool_router, RoleServer, ServerHandler};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value as Json;
use std::sync::Arc;

/// Workflow dialect documentation served to planners.
pub const WORKFLOW_GUIDE: &str = r#"## Workflow Structure

```
from toolgate.functions import <tool_name>
from toolgate.servers.<server> import <mcp_tool_name>

async def workflow():
    result = await <tool_name>(arg=value)
    return result
```

### Rules

1. Entry point: `async def workflow():`
2. Use `await` for tool calls
3. Keyword arguments: `tool(arg=value)`
4. Import only the tools listed by search_tools; all other imports are rejected

### Return Value Handling

Scalars assign directly; objects access fields by key:

```
user = await get_user(id=123)   # {"name": "Alice", "age": 30}
name = user["name"]
```

User input mid-run (when the client supports elicitation):

```
c = await elicit(message="Enter value:", response_type=int)
result = await compute(a=10, b=c)
```
"#;

// ─── MCP Parameter Structs ───────────────────────────────────────────────────
// Doc comments on fields become the JSON schema descriptions LLMs see.

#[derive(Deserialize, JsonSchema)]
pub struct SearchToolsParams {
    /// Search query - natural language or keywords.
    /// Examples: 'appliance status', 'search network', 'get user'
    pub query: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct ExecuteToolParams {
    /// The tool's name from search_tools output (e.g. 'mcp_search',
    /// 'send_email') - just the name, not the import path
    pub tool_name: String,
    /// Keyword arguments matching the tool's inputSchema
    pub args: serde_json::Map<String, Json>,
}

#[derive(Deserialize, JsonSchema)]
pub struct ExecuteWorkflowParams {
    /// Restricted program defining `async def workflow():` with its
    /// imports at the top. See the server instructions for the dialect.
    pub program: String,
}

// ─── Elicitation adapter ─────────────────────────────────────────────────────

/// Bridges the engine's elicitation capability onto MCP elicitation.
///
/// Scalars travel wrapped in a single `value` property, per the
/// protocol's object-schema requirement; accepted responses unwrap it.
struct McpElicit {
    peer: Peer<RoleServer>,
}

#[async_trait]
impl ElicitCapability for McpElicit {
    async fn elicit(
        &self,
        message: &str,
        kind: crate::workflow::value::ElicitKind,
    ) -> Result<Json, ElicitError> {
        let param: CreateElicitationRequestParams = serde_json::from_value(serde_json::json!({
            "message": message,
            "requestedSchema": {
                "type": "object",
                "properties": { "value": kind.schema() },
                "required": ["value"],
            },
        }))
        .map_err(|e| ElicitError::Transport(anyhow::Error::new(e)))?;

        let result = self
            .peer
            .create_elicitation(param)
            .await
            .map_err(|e| ElicitError::Transport(anyhow::Error::new(e)))?;

        let result = serde_json::to_value(&result)
            .map_err(|e| ElicitError::Transport(anyhow::Error::new(e)))?;
        match result.get("action").and_then(Json::as_str) {
            Some("accept") => {
                let content = result.get("content").cloned().unwrap_or(Json::Null);
                Ok(content.get("value").cloned().unwrap_or(content))
            }
            Some("decline") => Err(ElicitError::Declined {
                message: message.to_string(),
            }),
            _ => Err(ElicitError::Cancelled {
                message: message.to_string(),
            }),
        }
    }
}

// ─── MCP Server ──────────────────────────────────────────────────────────────

/// The gateway's MCP surface.
#[derive(Clone)]
pub struct GatewayServer {
    manager: Arc<ToolManager>,
    connector: Arc<RemoteConnector>,
    strategy: TrackingStrategy,
    audit: Arc<JsonDirSink>,
    tool_router: ToolRouter<GatewayServer>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        manager: Arc<ToolManager>,
        connector: Arc<RemoteConnector>,
        strategy: TrackingStrategy,
        audit: JsonDirSink,
    ) -> Self {
        Self {
            manager,
            connector,
            strategy,
            audit: Arc::new(audit),
            tool_router: Self::tool_router(),
        }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<ToolManager> {
        &self.manager
    }

    #[must_use]
    pub fn connector(&self) -> &Arc<RemoteConnector> {
        &self.connector
    }

    /// Returns the gateway tool schemas without an MCP context.
    #[must_use]
    pub fn tool_schemas(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }
}

/// Maps a gateway error onto the right MCP channel: client-fixable
/// errors stay on the tool result channel (LLM-visible), server
/// faults use the protocol error channel.
fn classify(err: crate::error::GatewayError) -> Result<CallToolResult, rmcp::ErrorData> {
    if err.is_client_fixable() {
        Ok(CallToolResult::error(vec![Content::text(format!(
            "{}: {err}",
            err.code()
        ))]))
    } else {
        Err(err.into())
    }
}

#[tool_router]
impl GatewayServer {
    #[tool(
        description = "Search for tools by name, description, or argument names.\n\n\
        ALWAYS call this before execute_workflow to find relevant tools and get their schemas.\n\
        Returns up to 5 matching tools WITH their full schemas and the import_path to use\n\
        in execute_workflow programs.",
        annotations(
            title = "Search Tools",
            read_only_hint = true,
            destructive_hint = false,
            idempotent_hint = true,
            open_world_hint = false
        )
    )]
    async fn search_tools(
        &self,
        Parameters(params): Parameters<SearchToolsParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let output = tools::execute_search_tools(
            &self.manager,
            tools::SearchToolsInput {
                query: params.query,
            },
        );
        let json = serde_json::to_string(&output)
            .map_err(|e| rmcp::ErrorData::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        description = "Execute a single tool directly.\n\n\
        Prefer execute_workflow for multi-step operations: it tracks how data flows\n\
        between tools and produces an audit trail.",
        annotations(
            title = "Execute Tool",
            read_only_hint = false,
            destructive_hint = true,
            idempotent_hint = false,
            open_world_hint = true
        )
    )]
    async fn execute_tool(
        &self,
        Parameters(params): Parameters<ExecuteToolParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let input = tools::ExecuteToolInput {
            tool_name: params.tool_name,
            args: params.args,
        };
        match tools::execute_tool(&self.manager, input).await {
            Ok(value) => {
                let json = serde_json::to_string(&value)
                    .map_err(|e| rmcp::ErrorData::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(err) => classify(err),
        }
    }

    #[tool(
        description = "Execute a multi-step workflow written in the restricted dialect.\n\n\
        The program imports tools from the reserved namespace, defines\n\
        `async def workflow():`, awaits tool calls, and returns a value.\n\
        Every tool call is recorded with per-argument data-flow provenance.",
        annotations(
            title = "Execute Workflow",
            read_only_hint = false,
            destructive_hint = true,
            idempotent_hint = false,
            open_world_hint = true
        )
    )]
    async fn execute_workflow(
        &self,
        Parameters(params): Parameters<ExecuteWorkflowParams>,
        peer: Peer<RoleServer>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let elicit: Arc<dyn ElicitCapability> = Arc::new(McpElicit { peer });
        let input = tools::ExecuteWorkflowInput {
            program: params.program,
            timeout_secs: None,
        };
        let outcome = tools::execute_workflow(
            Arc::clone(&self.manager),
            self.strategy,
            input,
            Some(elicit),
            Some(self.audit.as_ref()),
        )
        .await;

        match outcome {
            Ok(output) => {
                let json = serde_json::to_string(&output.returned)
                    .map_err(|e| rmcp::ErrorData::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(err) => {
                // Stage-tag workflow errors so the planner can tell a
                // rejected program from a failed run
                if let crate::error::GatewayError::Workflow(ref wf) = err {
                    let stage = wf.stage();
                    if err.is_client_fixable() {
                        return Ok(CallToolResult::error(vec![Content::text(format!(
                            "{stage} error [{}]: {err}",
                            err.code()
                        ))]));
                    }
                }
                classify(err)
            }
        }
    }
}

// ─── ServerHandler Implementation ────────────────────────────────────────────

impl ServerHandler for GatewayServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!(
            "toolgate: secure tool-execution gateway with data-flow provenance.\n\n\
             WORKFLOW:\n\
             1. search_tools -> find tools and their import paths\n\
             2. execute_workflow -> run a multi-step program (preferred)\n\
             3. execute_tool -> run a single tool directly\n\n\
             Programs import only from the reserved '{RESERVED_NAMESPACE}' namespace;\n\
             every tool call is recorded with per-argument origins and the run's\n\
             data-flow graph is written to the audit sink.\n\n\
             {WORKFLOW_GUIDE}"
        );

        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            server_info: Implementation {
                name: "toolgate".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(instructions),
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let tool_name = request.name.to_string();
        let start = std::time::Instant::now();

        let tcc = ToolCallContext::new(self, request, context);
        let result = self.tool_router.call(tcc).await;

        tracing::debug!(
            tool = %tool_name,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            is_error = result.as_ref().map(|r| r.is_error == Some(true)).unwrap_or(true),
            "gateway op"
        );
        result
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::ErrorData> {
        Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        })
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tool_router.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> GatewayServer {
        let manager = Arc::new(ToolManager::new());
        let connector = Arc::new(RemoteConnector::new(Arc::clone(&manager)));
        GatewayServer::new(
            manager,
            connector,
            TrackingStrategy::Transparent,
            JsonDirSink::default(),
        )
    }

    #[test]
    fn test_exposes_exactly_three_operations() {
        let mut names: Vec<String> = server()
            .tool_schemas()
            .iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["execute_tool", "execute_workflow", "search_tools"]);
    }

    #[test]
    fn test_instructions_document_the_dialect() {
        let info = server().get_info();
        let instructions = info.instructions.unwrap();
        assert!(instructions.contains("async def workflow():"));
        assert!(instructions.contains(RESERVED_NAMESPACE));
    }
}
