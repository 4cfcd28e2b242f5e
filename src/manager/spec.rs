//! Tool specifications and runtime tool representation.

use crate::workflow::RESERVED_NAMESPACE;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as Json};
use std::fmt;
use std::sync::Arc;

/// Reserved prefix keeping remote tool names disjoint from local ones.
pub const MCP_PREFIX: &str = "mcp_";

/// Immutable description of a tool. Identity is the name alone.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Json,
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Json>,
}

impl PartialEq for ToolSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ToolSpec {}

/// Boxed async executor: resolved arguments in, raw JSON out.
pub type ToolFuture = BoxFuture<'static, anyhow::Result<Json>>;
pub type Executor = Arc<dyn Fn(JsonMap<String, Json>) -> ToolFuture + Send + Sync>;

/// A registered tool: spec, executor, and the owning server tag.
///
/// No server tag means a local function; a tagged tool came from a
/// remote server and carries the [`MCP_PREFIX`] on its name.
#[derive(Clone)]
pub struct Tool {
    pub spec: ToolSpec,
    pub server: Option<String>,
    executor: Executor,
}

impl Tool {
    #[must_use]
    pub fn new(spec: ToolSpec, server: Option<String>, executor: Executor) -> Self {
        Self {
            spec,
            server,
            executor,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.server.is_some()
    }

    /// Runs the executor. Errors surface unmodified; classification
    /// happens above the manager.
    pub async fn invoke(&self, args: JsonMap<String, Json>) -> anyhow::Result<Json> {
        (self.executor)(args).await
    }

    /// Stable import identifier a planner may re-emit in its program.
    #[must_use]
    pub fn import_path(&self) -> String {
        match &self.server {
            Some(server) => format!(
                "from {RESERVED_NAMESPACE}.servers.{server} import {}",
                self.spec.name
            ),
            None => format!(
                "from {RESERVED_NAMESPACE}.functions import {}",
                self.spec.name
            ),
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.spec.name)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, server: Option<&str>) -> Tool {
        Tool::new(
            ToolSpec {
                name: name.to_string(),
                description: String::new(),
                input_schema: serde_json::json!({"type": "object"}),
                output_schema: None,
            },
            server.map(str::to_string),
            Arc::new(|_| Box::pin(async { Ok(Json::Null) })),
        )
    }

    #[test]
    fn test_spec_equality_is_by_name() {
        let a = tool("x", None).spec;
        let mut b = tool("x", None).spec;
        b.description = "different".into();
        assert_eq!(a, b);
    }

    #[test]
    fn test_import_paths() {
        assert_eq!(
            tool("send_email", None).import_path(),
            "from toolgate.functions import send_email"
        );
        assert_eq!(
            tool("mcp_search", Some("versa")).import_path(),
            "from toolgate.servers.versa import mcp_search"
        );
    }
}
