//! Execute a single tool directly, without the workflow engine.

use crate::error::{GatewayError, ManagerError, Result, ToolExecutionError};
use crate::manager::ToolManager;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as Json};

/// Input for the `execute_tool` operation.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteToolInput {
    /// The tool's registered name (e.g. 'mcp_search', 'send_email')
    pub tool_name: String,
    /// Keyword arguments matching the tool's input schema
    pub args: JsonMap<String, Json>,
}

/// Executes one tool by name and returns its raw value.
///
/// No provenance bookkeeping happens here; that is the workflow
/// engine's concern.
///
/// # Errors
///
/// `ToolNotFound` for a lookup miss; `ToolExecutionError` carrying the
/// tool name and original cause when the executor raises.
pub async fn execute_tool(manager: &ToolManager, input: ExecuteToolInput) -> Result<Json> {
    let start = std::time::Instant::now();
    tracing::info!(tool = %input.tool_name, "execute_tool");

    match manager.call(&input.tool_name, input.args).await {
        Ok(result) => {
            tracing::info!(
                tool = %input.tool_name,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "execute_tool completed"
            );
            Ok(result)
        }
        Err(ManagerError::Executor(cause)) => {
            tracing::warn!(
                tool = %input.tool_name,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                error = %cause,
                "execute_tool failed"
            );
            Err(GatewayError::Tool(ToolExecutionError {
                tool_name: input.tool_name,
                source: cause,
            }))
        }
        Err(other) => Err(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    struct DivParams {
        a: i64,
        b: i64,
    }

    fn manager() -> ToolManager {
        let manager = ToolManager::new();
        manager
            .add_function("div", "Divide a by b", |p: DivParams| async move {
                if p.b == 0 {
                    anyhow::bail!("division by zero");
                }
                Ok(p.a / p.b)
            })
            .unwrap();
        manager
    }

    #[tokio::test]
    async fn test_returns_raw_value() {
        let mut args = JsonMap::new();
        args.insert("a".into(), json!(10));
        args.insert("b".into(), json!(2));
        let result = execute_tool(
            &manager(),
            ExecuteToolInput {
                tool_name: "div".into(),
                args,
            },
        )
        .await
        .unwrap();
        assert_eq!(result, json!(5));
    }

    #[tokio::test]
    async fn test_executor_error_carries_tool_name() {
        let mut args = JsonMap::new();
        args.insert("a".into(), json!(1));
        args.insert("b".into(), json!(0));
        let err = execute_tool(
            &manager(),
            ExecuteToolInput {
                tool_name: "div".into(),
                args,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "TOOL_EXECUTION_ERROR");
        assert!(err.to_string().contains("div"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = execute_tool(
            &manager(),
            ExecuteToolInput {
                tool_name: "ghost".into(),
                args: JsonMap::new(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "TOOL_NOT_FOUND");
    }
}
