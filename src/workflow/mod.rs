//! Workflow engine: compiles and runs restricted planner programs.
//!
//! A workflow is a small indentation-structured program that imports
//! tools from the reserved `toolgate` namespace, defines a single
//! entry routine named `workflow`, and awaits tool calls. The engine
//! enforces the import whitelist, builds a namespace containing only
//! proxies for the imported tools (plus `elicit` when a capability is
//! provided), applies the configured tracking strategy, and executes
//! the entry routine under a timeout. Every proxy call is recorded in
//! the run's provenance store; the run returns the unwrapped root
//! value together with the record sequence.

pub mod ast;
mod interp;
pub mod lexer;
pub mod parser;
pub mod strategy;
pub mod value;

pub use strategy::TrackingStrategy;

use crate::error::{ElicitError, WorkflowError, WorkflowResult};
use crate::provenance::{resolve_value, ExecutionResult};
use ast::{ImportStmt, Program, Stmt};
use async_trait::async_trait;
use interp::{Binding, Helper, Interp};
use serde_json::{Map as JsonMap, Value as Json};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use value::ElicitKind;

/// The fixed import root workflow programs may import from.
pub const RESERVED_NAMESPACE: &str = "toolgate";

/// Default wall-clock budget for one run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Capability the engine dispatches tool calls through.
///
/// The tool manager implements this; tests substitute in-memory stubs.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    /// Names of every callable tool.
    fn tool_names(&self) -> Vec<String>;

    /// Executes a tool with resolved (carrier-free) arguments.
    async fn call(&self, tool_name: &str, args: JsonMap<String, Json>) -> anyhow::Result<Json>;
}

/// One-shot mid-run request for a typed value from the caller.
#[async_trait]
pub trait ElicitCapability: Send + Sync {
    /// Returns a raw value conforming to `kind`, or a declined or
    /// cancelled error which the run surfaces as a workflow failure.
    async fn elicit(&self, message: &str, kind: ElicitKind) -> Result<Json, ElicitError>;
}

/// Lifecycle of one run. Only `Executing` may suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Ready,
    Parsing,
    Validating,
    Preparing,
    Executing,
    Completed,
    Failed,
}

/// Executes planner programs with provenance tracking.
pub struct WorkflowEngine {
    dispatch: Arc<dyn ToolDispatch>,
    strategy: TrackingStrategy,
    timeout: Duration,
}

impl WorkflowEngine {
    #[must_use]
    pub fn new(dispatch: Arc<dyn ToolDispatch>) -> Self {
        Self {
            dispatch,
            strategy: TrackingStrategy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: TrackingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn strategy(&self) -> TrackingStrategy {
        self.strategy
    }

    /// Runs a program and returns its result with the audit trail.
    ///
    /// # Errors
    ///
    /// Parsing and validating failures abort before any record is
    /// appended; executing failures discard the fresh value.
    pub async fn execute(
        &self,
        source: &str,
        elicit: Option<Arc<dyn ElicitCapability>>,
    ) -> WorkflowResult<ExecutionResult> {
        let mut state = RunState::Ready;

        let transition = |state: &mut RunState, next: RunState| {
            tracing::debug!(from = ?*state, to = ?next, "run state");
            *state = next;
        };

        transition(&mut state, RunState::Parsing);
        let mut program = parser::parse_program(source)?;

        transition(&mut state, RunState::Validating);
        let imports = self.validate(&program)?;

        transition(&mut state, RunState::Preparing);
        let bindings = self.prepare(&mut program, &imports, elicit.is_some());
        if self.strategy.instruments() {
            tracing::debug!(
                transformed = %ast::unparse(&program.body),
                "instrumented program"
            );
        }

        transition(&mut state, RunState::Executing);
        if self.timeout.is_zero() {
            transition(&mut state, RunState::Failed);
            return Err(WorkflowError::Timeout { seconds: 0.0 });
        }

        let mut interp = Interp::new(
            bindings,
            self.dispatch.as_ref(),
            elicit.as_deref(),
            self.strategy,
        );
        let outcome = tokio::time::timeout(self.timeout, interp.run(&program.body)).await;

        match outcome {
            Err(_) => {
                transition(&mut state, RunState::Failed);
                Err(WorkflowError::Timeout {
                    seconds: self.timeout.as_secs_f64(),
                })
            }
            Ok(Err(err)) => {
                transition(&mut state, RunState::Failed);
                Err(err)
            }
            Ok(Ok(returned)) => {
                transition(&mut state, RunState::Completed);
                Ok(ExecutionResult {
                    returned: resolve_value(&returned),
                    calls: interp.store.into_records(),
                })
            }
        }
    }

    /// Enforces the import whitelist and the entry-routine contract.
    fn validate(&self, program: &Program) -> WorkflowResult<Vec<(String, String)>> {
        let mut imports: Vec<(String, String)> = Vec::new();

        for stmt in &program.imports {
            match stmt {
                ImportStmt::Plain { module, .. } => {
                    return Err(WorkflowError::ImportDisallowed {
                        root: RESERVED_NAMESPACE,
                        module: module.clone(),
                    });
                }
                ImportStmt::From { module, names, .. } => {
                    let allowed = module == RESERVED_NAMESPACE
                        || module.starts_with(&format!("{RESERVED_NAMESPACE}."));
                    if !allowed {
                        return Err(WorkflowError::ImportDisallowed {
                            root: RESERVED_NAMESPACE,
                            module: module.clone(),
                        });
                    }
                    for name in names {
                        imports.push((name.binding().to_string(), name.name.clone()));
                    }
                }
            }
        }

        let available: BTreeSet<String> = self.dispatch.tool_names().into_iter().collect();
        for (_, tool_name) in &imports {
            if !available.contains(tool_name) {
                return Err(WorkflowError::UnknownTool {
                    name: tool_name.clone(),
                    available: available.iter().cloned().collect(),
                });
            }
        }

        let has_entry = program.body.iter().any(
            |stmt| matches!(stmt, Stmt::FuncDef { name, .. } if name == "workflow"),
        );
        if !has_entry {
            return Err(WorkflowError::MissingEntry);
        }

        Ok(imports)
    }

    /// Builds the restricted namespace and applies the strategy's
    /// program transformation.
    fn prepare(
        &self,
        program: &mut Program,
        imports: &[(String, String)],
        has_elicit: bool,
    ) -> ahash::AHashMap<String, Binding> {
        let mut bindings = ahash::AHashMap::new();

        for (binding, tool_name) in imports {
            bindings.insert(binding.clone(), Binding::Tool(tool_name.clone()));
        }

        if has_elicit {
            bindings.insert("elicit".to_string(), Binding::Elicit);
            // Response-type tokens travel with the builtin
            bindings.insert("int".to_string(), Binding::Kind(ElicitKind::Int));
            bindings.insert("float".to_string(), Binding::Kind(ElicitKind::Float));
            bindings.insert("str".to_string(), Binding::Kind(ElicitKind::Str));
            bindings.insert("bool".to_string(), Binding::Kind(ElicitKind::Bool));
        }

        if self.strategy.instruments() {
            strategy::instrument(&mut program.body);
            bindings.insert(
                strategy::TRACK_ASSIGN.to_string(),
                Binding::Helper(Helper::Assign),
            );
            bindings.insert(
                strategy::TRACK_SUBSCRIPT.to_string(),
                Binding::Helper(Helper::Subscript),
            );
            bindings.insert(
                strategy::TRACK_ATTR.to_string(),
                Binding::Helper(Helper::Attr),
            );
        }

        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubTools {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolDispatch for StubTools {
        fn tool_names(&self) -> Vec<String> {
            vec!["add".to_string(), "get_user".to_string()]
        }

        async fn call(&self, tool_name: &str, args: JsonMap<String, Json>) -> anyhow::Result<Json> {
            self.calls.lock().unwrap().push(tool_name.to_string());
            match tool_name {
                "add" => {
                    let a = args["a"].as_i64().unwrap_or(0);
                    let b = args["b"].as_i64().unwrap_or(0);
                    Ok(Json::from(a + b))
                }
                "get_user" => Ok(serde_json::json!({"name": "Alice", "score": 10})),
                other => anyhow::bail!("no such tool: {other}"),
            }
        }
    }

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(Arc::new(StubTools {
            calls: Mutex::new(Vec::new()),
        }))
    }

    #[tokio::test]
    async fn test_single_call_records_origin() {
        let result = engine()
            .execute(
                "from toolgate.functions import add\n\
                 async def workflow():\n    result = await add(a=2, b=3)\n    return result\n",
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.returned, Json::from(5));
        assert_eq!(result.calls.len(), 1);
        assert_eq!(result.calls[0].call_id.as_str(), "add#0");
        assert!(result.calls[0].input_origins.is_empty());
    }

    #[tokio::test]
    async fn test_import_outside_namespace_rejected() {
        let err = engine()
            .execute("from os import path\nasync def workflow():\n    pass\n", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ImportDisallowed { .. }));
    }

    #[tokio::test]
    async fn test_plain_import_rejected() {
        let err = engine()
            .execute("import toolgate\nasync def workflow():\n    pass\n", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ImportDisallowed { .. }));
    }

    #[tokio::test]
    async fn test_unknown_tool_rejected() {
        let err = engine()
            .execute(
                "from toolgate.functions import missing\nasync def workflow():\n    pass\n",
                None,
            )
            .await
            .unwrap_err();
        match err {
            WorkflowError::UnknownTool { name, available } => {
                assert_eq!(name, "missing");
                assert!(available.contains(&"add".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let err = engine()
            .execute("from toolgate.functions import add\nx = 1\n", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::MissingEntry));
    }

    #[tokio::test]
    async fn test_zero_timeout_is_immediate() {
        let err = engine()
            .with_timeout(Duration::ZERO)
            .execute("async def workflow():\n    return 1\n", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_empty_workflow_zero_records() {
        let result = engine()
            .execute("async def workflow():\n    return 7\n", None)
            .await
            .unwrap();
        assert!(result.calls.is_empty());
        assert_eq!(result.returned, Json::from(7));
    }

    #[tokio::test]
    async fn test_alias_binding() {
        let result = engine()
            .execute(
                "from toolgate.functions import add as plus\n\
                 async def workflow():\n    return await plus(a=1, b=1)\n",
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.returned, Json::from(2));
        assert_eq!(result.calls[0].tool_name, "add");
    }

    #[tokio::test]
    async fn test_unimported_tool_not_in_namespace() {
        let err = engine()
            .execute(
                "from toolgate.functions import add\n\
                 async def workflow():\n    return await get_user(id=1)\n",
                None,
            )
            .await
            .unwrap_err();
        match err {
            WorkflowError::Failure { message } => {
                assert!(message.contains("get_user"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_attribute_and_index_spellings() {
        for accessor in ["user[\"score\"]", "user.score"] {
            let source = format!(
                "from toolgate.functions import get_user, add\n\
                 async def workflow():\n    user = await get_user(id=1)\n    return await add(a={accessor}, b=1)\n"
            );
            let result = engine().execute(&source, None).await.unwrap();
            assert_eq!(result.returned, Json::from(11));
            assert_eq!(
                result.calls[1].input_origins["a"],
                vec![crate::types::CallId::from("get_user#0")]
            );
        }
    }
}
