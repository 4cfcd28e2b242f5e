//! Tracking strategy equivalence and divergence.

mod common;

use common::{arithmetic_manager, diamond_manager, engine, misc_manager};
use serde_json::json;
use toolgate::provenance::ExecutionResult;
use toolgate::workflow::TrackingStrategy;

const DIAMOND: &str = "from toolgate.functions import A, B, C, D\n\
    \n\
    async def workflow():\n\
    \x20   a = await A()\n\
    \x20   b = await B(x=a.x)\n\
    \x20   c = await C(y=a.y)\n\
    \x20   d = await D(b=b, c=c)\n\
    \x20   return d\n";

const MERGED_ARITHMETIC: &str = "from toolgate.functions import P, T, S\n\
    \n\
    async def workflow():\n\
    \x20   p = await P()\n\
    \x20   t = await T()\n\
    \x20   return await S(total=p + t)\n";

const CHAINED: &str = "from toolgate.functions import G, H\n\
    \n\
    async def workflow():\n\
    \x20   v = (await G())[\"value\"]\n\
    \x20   v = v * 2\n\
    \x20   v = v + 50\n\
    \x20   v = v // 3\n\
    \x20   return await H(x=v)\n";

const ITERATION: &str = "from toolgate.functions import A, D\n\
    \n\
    async def workflow():\n\
    \x20   a = await A()\n\
    \x20   total = 0\n\
    \x20   for key in [\"x\", \"y\"]:\n\
    \x20       total = total + a[key]\n\
    \x20   return await D(b=total, c=0)\n";

fn comparable(result: &ExecutionResult) -> (serde_json::Value, Vec<serde_json::Value>) {
    let origins = result
        .calls
        .iter()
        .map(|c| {
            json!({
                "call_id": c.call_id,
                "input_origins": c
                    .input_origins
                    .iter()
                    .map(|(arg, ids)| (arg.clone(), json!(ids)))
                    .collect::<serde_json::Map<_, _>>(),
            })
        })
        .collect();
    (result.data_flow(), origins)
}

async fn assert_equivalent(
    manager: std::sync::Arc<toolgate::ToolManager>,
    program: &str,
    expected_return: serde_json::Value,
) {
    let transparent = engine(&manager, TrackingStrategy::Transparent)
        .execute(program, None)
        .await
        .unwrap();
    let instrumented = engine(&manager, TrackingStrategy::Instrumented)
        .execute(program, None)
        .await
        .unwrap();

    assert_eq!(transparent.returned, expected_return);
    assert_eq!(instrumented.returned, expected_return);

    let (t_flow, t_origins) = comparable(&transparent);
    let (i_flow, i_origins) = comparable(&instrumented);
    assert_eq!(t_flow, i_flow, "data_flow must match across T and I");
    assert_eq!(t_origins, i_origins, "input_origins must match across T and I");
}

#[tokio::test]
async fn test_equivalence_on_diamond() {
    assert_equivalent(diamond_manager(), DIAMOND, json!(80)).await;
}

#[tokio::test]
async fn test_equivalence_on_merged_arithmetic() {
    assert_equivalent(arithmetic_manager(), MERGED_ARITHMETIC, json!(111)).await;
}

#[tokio::test]
async fn test_equivalence_on_chained_transformations() {
    assert_equivalent(misc_manager(), CHAINED, json!(83)).await;
}

#[tokio::test]
async fn test_equivalence_on_iteration() {
    assert_equivalent(diamond_manager(), ITERATION, json!(30)).await;
}

#[tokio::test]
async fn test_call_ids_stable_across_all_strategies() {
    for strategy in [
        TrackingStrategy::Transparent,
        TrackingStrategy::Instrumented,
        TrackingStrategy::None,
    ] {
        let result = engine(&diamond_manager(), strategy)
            .execute(DIAMOND, None)
            .await
            .unwrap();
        let ids: Vec<&str> = result.calls.iter().map(|c| c.call_id.as_str()).collect();
        assert_eq!(ids, vec!["A#0", "B#0", "C#0", "D#0"], "{strategy}");
    }
}

#[tokio::test]
async fn test_none_strategy_records_empty_origins() {
    let result = engine(&diamond_manager(), TrackingStrategy::None)
        .execute(DIAMOND, None)
        .await
        .unwrap();

    assert_eq!(result.returned, json!(80));
    assert_eq!(result.calls.len(), 4);
    for record in &result.calls {
        assert!(
            record.input_origins.is_empty(),
            "{} carried origins under the none strategy",
            record.call_id
        );
    }
    assert_eq!(result.data_flow()["edges"], json!([]));
}

#[tokio::test]
async fn test_instrumented_recovers_origins_through_fstrings() {
    let manager = misc_manager();
    // String formatting drops origins at expression level; the
    // assignment helper recovers them from the right-hand side names.
    let program = "from toolgate.functions import G, H\n\
        \n\
        async def workflow():\n\
        \x20   v = (await G())[\"value\"]\n\
        \x20   label = f\"value is {v}\"\n\
        \x20   n = await H(x=v)\n\
        \x20   return label\n";

    let instrumented = engine(&manager, TrackingStrategy::Instrumented)
        .execute(program, None)
        .await
        .unwrap();
    assert_eq!(instrumented.returned, json!("value is 100"));

    // The f-string itself did not break tracking of v
    assert_eq!(
        instrumented.calls[1].input_origins["x"]
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>(),
        vec!["G#0"]
    );

    // And an assignment derived from a formatted string keeps its
    // source variable's origins in instrumented mode
    let program = "from toolgate.functions import G, H\n\
        \n\
        async def workflow():\n\
        \x20   v = (await G())[\"value\"]\n\
        \x20   label = f\"value is {v}\"\n\
        \x20   combined = label\n\
        \x20   return await H(x=v)\n";
    let instrumented = engine(&manager, TrackingStrategy::Instrumented)
        .execute(program, None)
        .await
        .unwrap();
    assert_eq!(
        instrumented.calls[1].input_origins["x"]
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>(),
        vec!["G#0"]
    );
}
