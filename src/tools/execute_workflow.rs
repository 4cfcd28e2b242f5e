//! Execute a multi-step workflow program.

use crate::audit::AuditSink;
use crate::error::Result;
use crate::manager::ToolManager;
use crate::types::RunId;
use crate::workflow::{ElicitCapability, TrackingStrategy, WorkflowEngine};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Input for the `execute_workflow` operation.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteWorkflowInput {
    /// Restricted program defining `async def workflow():` with its
    /// tool imports at the top
    pub program: String,
    /// Wall-clock budget in seconds (default: 30)
    pub timeout_secs: Option<f64>,
}

/// Output for the `execute_workflow` operation.
#[derive(Debug, Serialize)]
pub struct ExecuteWorkflowOutput {
    /// Raw value returned by the entry routine
    pub returned: Json,
    /// Identifier keying the audit artifact
    pub run_id: RunId,
    /// Number of tool calls recorded
    pub call_count: usize,
    /// Where the audit artifact landed, when the sink accepted it
    pub audit_path: Option<PathBuf>,
}

/// Runs a workflow program with provenance tracking.
///
/// On success the serialized execution result goes to the audit sink
/// best-effort: a sink failure is logged and does not fail the call.
///
/// # Errors
///
/// Workflow errors surface with their stage (`parsing`, `validating`
/// or `executing`); pre-execution stages abort before any record is
/// appended.
pub async fn execute_workflow(
    manager: Arc<ToolManager>,
    strategy: TrackingStrategy,
    input: ExecuteWorkflowInput,
    elicit: Option<Arc<dyn ElicitCapability>>,
    sink: Option<&dyn AuditSink>,
) -> Result<ExecuteWorkflowOutput> {
    let run_id = RunId::generate();
    let start = std::time::Instant::now();

    tracing::info!(
        run_id = %run_id,
        strategy = %strategy,
        available_tools = manager.len(),
        "workflow run start"
    );
    tracing::debug!(program = %input.program, "planner program");

    let mut engine = WorkflowEngine::new(manager).with_strategy(strategy);
    if let Some(seconds) = input.timeout_secs {
        engine = engine.with_timeout(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let result = match engine.execute(&input.program, elicit).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(
                run_id = %run_id,
                stage = %err.stage(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                error = %err,
                "workflow run failed"
            );
            return Err(err.into());
        }
    };

    tracing::info!(
        run_id = %run_id,
        calls = result.calls.len(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "workflow run completed"
    );

    let audit_path = sink.and_then(|sink| match sink.write(&run_id, &result) {
        Ok(path) => {
            tracing::info!(run_id = %run_id, path = %path.display(), "audit trail saved");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(run_id = %run_id, error = %e, "could not write audit trail");
            None
        }
    });

    Ok(ExecuteWorkflowOutput {
        returned: result.returned,
        call_count: result.calls.len(),
        run_id,
        audit_path,
    })
}
