//! Shared builders for gateway integration tests.
#![allow(dead_code)]

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::sync::Arc;
use toolgate::error::ElicitError;
use toolgate::manager::ToolManager;
use toolgate::workflow::value::ElicitKind;
use toolgate::workflow::{ElicitCapability, ToolDispatch, TrackingStrategy, WorkflowEngine};

#[derive(Deserialize, JsonSchema)]
pub struct Empty {}

#[derive(Deserialize, JsonSchema)]
pub struct OneInt {
    #[allow(dead_code)]
    pub x: i64,
}

/// Tool set for the diamond scenario:
/// `A() -> {x, y}`, `B(x) -> x*2`, `C(y) -> y*3`, `D(b, c) -> b+c`.
pub fn diamond_manager() -> Arc<ToolManager> {
    #[derive(Deserialize, JsonSchema)]
    struct BParams {
        x: i64,
    }
    #[derive(Deserialize, JsonSchema)]
    struct CParams {
        y: i64,
    }
    #[derive(Deserialize, JsonSchema)]
    struct DParams {
        b: i64,
        c: i64,
    }

    let manager = ToolManager::new();
    manager
        .add_function("A", "Produce the seed values", |_p: Empty| async move {
            Ok(json!({"x": 10, "y": 20}))
        })
        .unwrap();
    manager
        .add_function("B", "Double x", |p: BParams| async move { Ok(p.x * 2) })
        .unwrap();
    manager
        .add_function("C", "Triple y", |p: CParams| async move { Ok(p.y * 3) })
        .unwrap();
    manager
        .add_function("D", "Sum both branches", |p: DParams| async move {
            Ok(p.b + p.c)
        })
        .unwrap();
    Arc::new(manager)
}

/// Tool set for the merged-arithmetic scenario:
/// `P() -> 100`, `T() -> 10`, `S(total) -> total+1`.
pub fn arithmetic_manager() -> Arc<ToolManager> {
    #[derive(Deserialize, JsonSchema)]
    struct SParams {
        total: i64,
    }

    let manager = ToolManager::new();
    manager
        .add_function("P", "Base price", |_p: Empty| async move { Ok(100) })
        .unwrap();
    manager
        .add_function("T", "Tax amount", |_p: Empty| async move { Ok(10) })
        .unwrap();
    manager
        .add_function("S", "Submit the total", |p: SParams| async move {
            Ok(p.total + 1)
        })
        .unwrap();
    Arc::new(manager)
}

/// Tool set for chained transformations:
/// `G() -> {value: 100}`, `H(x) -> x`, plus `F(c) -> c+1` and a
/// null-returning and a slow tool for boundary tests.
pub fn misc_manager() -> Arc<ToolManager> {
    #[derive(Deserialize, JsonSchema)]
    struct HParams {
        x: i64,
    }
    #[derive(Deserialize, JsonSchema)]
    struct FParams {
        c: i64,
    }

    let manager = ToolManager::new();
    manager
        .add_function("G", "Produce a wrapped value", |_p: Empty| async move {
            Ok(json!({"value": 100}))
        })
        .unwrap();
    manager
        .add_function("H", "Identity", |p: HParams| async move { Ok(p.x) })
        .unwrap();
    manager
        .add_function("F", "Increment", |p: FParams| async move { Ok(p.c + 1) })
        .unwrap();
    manager
        .add_function("nothing", "Return null", |_p: Empty| async move {
            Ok(Json::Null)
        })
        .unwrap();
    manager
        .add_function("slow", "Sleep for a long time", |_p: Empty| async move {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(1)
        })
        .unwrap();
    manager
        .add_function("boom", "Always fail", |_p: Empty| async move {
            Err::<i64, anyhow::Error>(anyhow::anyhow!("kaboom"))
        })
        .unwrap();
    Arc::new(manager)
}

pub fn engine(manager: &Arc<ToolManager>, strategy: TrackingStrategy) -> WorkflowEngine {
    WorkflowEngine::new(Arc::clone(manager) as Arc<dyn ToolDispatch>).with_strategy(strategy)
}

/// Elicitation stub returning a fixed value.
pub struct FixedElicit(pub Json);

#[async_trait::async_trait]
impl ElicitCapability for FixedElicit {
    async fn elicit(&self, _message: &str, _kind: ElicitKind) -> Result<Json, ElicitError> {
        Ok(self.0.clone())
    }
}

/// Elicitation stub that always declines.
pub struct DecliningElicit;

#[async_trait::async_trait]
impl ElicitCapability for DecliningElicit {
    async fn elicit(&self, message: &str, _kind: ElicitKind) -> Result<Json, ElicitError> {
        Err(ElicitError::Declined {
            message: message.to_string(),
        })
    }
}

/// Collects origin call-id strings for one argument of one record.
pub fn origins_of(
    result: &toolgate::provenance::ExecutionResult,
    call_id: &str,
    arg: &str,
) -> Vec<String> {
    result
        .calls
        .iter()
        .find(|c| c.call_id.as_str() == call_id)
        .and_then(|c| c.input_origins.get(arg))
        .map(|ids| ids.iter().map(|id| id.as_str().to_string()).collect())
        .unwrap_or_default()
}
