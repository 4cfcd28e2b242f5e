//! End-to-end provenance tracking scenarios.

mod common;

use common::{arithmetic_manager, diamond_manager, engine, misc_manager, origins_of, FixedElicit};
use serde_json::{json, Value as Json};
use std::collections::BTreeSet;
use std::sync::Arc;
use toolgate::workflow::TrackingStrategy;

#[tokio::test]
async fn test_diamond_data_flow() {
    let manager = diamond_manager();
    let result = engine(&manager, TrackingStrategy::Transparent)
        .execute(
            "from toolgate.functions import A, B, C, D\n\
             \n\
             async def workflow():\n\
             \x20   a = await A()\n\
             \x20   b = await B(x=a.x)\n\
             \x20   c = await C(y=a.y)\n\
             \x20   d = await D(b=b, c=c)\n\
             \x20   return d\n",
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.returned, json!(80));

    let ids: Vec<&str> = result.calls.iter().map(|c| c.call_id.as_str()).collect();
    assert_eq!(ids, vec!["A#0", "B#0", "C#0", "D#0"]);

    assert_eq!(origins_of(&result, "B#0", "x"), vec!["A#0"]);
    assert_eq!(origins_of(&result, "C#0", "y"), vec!["A#0"]);
    assert_eq!(origins_of(&result, "D#0", "b"), vec!["B#0"]);
    assert_eq!(origins_of(&result, "D#0", "c"), vec!["C#0"]);

    let flow = result.data_flow();
    let edges: BTreeSet<(String, String, String)> = flow["edges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["source"].as_str().unwrap().to_string(),
                e["sink"].as_str().unwrap().to_string(),
                serde_json::to_string(&e["args"]).unwrap(),
            )
        })
        .collect();
    let expected: BTreeSet<(String, String, String)> = [
        ("A#0", "B#0", "[\"x\"]"),
        ("A#0", "C#0", "[\"y\"]"),
        ("B#0", "D#0", "[\"b\"]"),
        ("C#0", "D#0", "[\"c\"]"),
    ]
    .into_iter()
    .map(|(s, k, a)| (s.to_string(), k.to_string(), a.to_string()))
    .collect();
    assert_eq!(edges, expected);
}

#[tokio::test]
async fn test_merged_origins_in_arithmetic() {
    let manager = arithmetic_manager();
    let result = engine(&manager, TrackingStrategy::Transparent)
        .execute(
            "from toolgate.functions import P, T, S\n\
             \n\
             async def workflow():\n\
             \x20   p = await P()\n\
             \x20   t = await T()\n\
             \x20   s = await S(total=p + t)\n\
             \x20   return s\n",
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.returned, json!(111));
    assert_eq!(origins_of(&result, "S#0", "total"), vec!["P#0", "T#0"]);
}

#[tokio::test]
async fn test_elicited_values_are_literals() {
    let manager = misc_manager();
    let result = engine(&manager, TrackingStrategy::Transparent)
        .execute(
            "from toolgate.functions import F\n\
             \n\
             async def workflow():\n\
             \x20   c = await elicit(message=\"c?\", response_type=int)\n\
             \x20   r = await F(c=c)\n\
             \x20   return r\n",
            Some(Arc::new(FixedElicit(json!(42)))),
        )
        .await
        .unwrap();

    assert_eq!(result.returned, json!(43));
    let record = &result.calls[0];
    assert_eq!(record.call_id.as_str(), "F#0");
    assert!(record.input_origins.is_empty());
    assert_eq!(record.input_value["c"], json!(42));
}

#[tokio::test]
async fn test_chained_transformations_preserve_origin() {
    let manager = misc_manager();
    let result = engine(&manager, TrackingStrategy::Transparent)
        .execute(
            "from toolgate.functions import G, H\n\
             \n\
             async def workflow():\n\
             \x20   v = (await G())[\"value\"]\n\
             \x20   v = v * 2\n\
             \x20   v = v + 50\n\
             \x20   v = v // 3\n\
             \x20   return await H(x=v)\n",
            None,
        )
        .await
        .unwrap();

    // (100*2 + 50) // 3 = 83, passed through the identity tool
    assert_eq!(result.returned, json!(83));
    assert_eq!(origins_of(&result, "H#0", "x"), vec!["G#0"]);
}

#[tokio::test]
async fn test_same_tool_n_times_gets_sequential_ids() {
    let manager = misc_manager();
    let result = engine(&manager, TrackingStrategy::Transparent)
        .execute(
            "from toolgate.functions import F\n\
             \n\
             async def workflow():\n\
             \x20   a = await F(c=1)\n\
             \x20   b = await F(c=2)\n\
             \x20   c = await F(c=3)\n\
             \x20   return a + b + c\n",
            None,
        )
        .await
        .unwrap();

    let ids: Vec<&str> = result.calls.iter().map(|c| c.call_id.as_str()).collect();
    assert_eq!(ids, vec!["F#0", "F#1", "F#2"]);
    assert_eq!(result.returned, json!(9));
}

#[tokio::test]
async fn test_null_returning_tool_still_recorded() {
    let manager = misc_manager();
    let result = engine(&manager, TrackingStrategy::Transparent)
        .execute(
            "from toolgate.functions import nothing\n\
             \n\
             async def workflow():\n\
             \x20   return await nothing()\n",
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.calls.len(), 1);
    assert_eq!(result.calls[0].output_value, Json::Null);
    assert_eq!(result.returned, Json::Null);
}

#[tokio::test]
async fn test_record_origins_reference_earlier_indices_only() {
    let manager = diamond_manager();
    let result = engine(&manager, TrackingStrategy::Transparent)
        .execute(
            "from toolgate.functions import A, B, D\n\
             \n\
             async def workflow():\n\
             \x20   a = await A()\n\
             \x20   b = await B(x=a.x)\n\
             \x20   return await D(b=b, c=a.y)\n",
            None,
        )
        .await
        .unwrap();

    for (idx, record) in result.calls.iter().enumerate() {
        let earlier: BTreeSet<&str> = result.calls[..idx]
            .iter()
            .map(|c| c.call_id.as_str())
            .collect();
        for origin in record.all_input_origins() {
            assert!(
                earlier.contains(origin.as_str()),
                "{} references {} which is not earlier",
                record.call_id,
                origin
            );
        }
    }
}

#[tokio::test]
async fn test_graph_nodes_match_call_ids_and_edges_point_forward() {
    let manager = diamond_manager();
    let result = engine(&manager, TrackingStrategy::Transparent)
        .execute(
            "from toolgate.functions import A, B, C, D\n\
             \n\
             async def workflow():\n\
             \x20   a = await A()\n\
             \x20   b = await B(x=a.x)\n\
             \x20   c = await C(y=a.y)\n\
             \x20   return await D(b=b, c=c)\n",
            None,
        )
        .await
        .unwrap();

    let flow = result.data_flow();
    let node_ids: BTreeSet<String> = flow["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap().to_string())
        .collect();
    let call_ids: BTreeSet<String> = result
        .calls
        .iter()
        .map(|c| c.call_id.as_str().to_string())
        .collect();
    assert_eq!(node_ids, call_ids);

    let position: std::collections::HashMap<&str, usize> = result
        .calls
        .iter()
        .enumerate()
        .map(|(i, c)| (c.call_id.as_str(), i))
        .collect();
    for edge in flow["edges"].as_array().unwrap() {
        let source = position[edge["source"].as_str().unwrap()];
        let sink = position[edge["sink"].as_str().unwrap()];
        assert!(source < sink, "edge must point forward");
    }
}

#[tokio::test]
async fn test_serialized_result_shape() {
    let manager = arithmetic_manager();
    let result = engine(&manager, TrackingStrategy::Transparent)
        .execute(
            "from toolgate.functions import P, S\n\
             \n\
             async def workflow():\n\
             \x20   p = await P()\n\
             \x20   return await S(total=p)\n",
            None,
        )
        .await
        .unwrap();

    let serialized = result.to_json();
    assert_eq!(serialized["returned"], json!(101));
    assert_eq!(serialized["calls"][1]["input_origins"], json!({"total": ["P#0"]}));
    assert!(serialized["calls"][0]["timestamp"].is_number());
    assert!(serialized["calls"][0]["duration_ms"].is_number());
    assert_eq!(
        serialized["data_flow"]["edges"],
        json!([{"source": "P#0", "sink": "S#0", "args": ["total"]}])
    );
}

#[tokio::test]
async fn test_nested_container_origins_reach_arguments() {
    let manager = misc_manager();
    let result = engine(&manager, TrackingStrategy::Transparent)
        .execute(
            "from toolgate.functions import G, H\n\
             \n\
             async def workflow():\n\
             \x20   g = await G()\n\
             \x20   wrapped = {\"inner\": [g]}\n\
             \x20   first = wrapped[\"inner\"][0]\n\
             \x20   return await H(x=first[\"value\"])\n",
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.returned, json!(100));
    assert_eq!(origins_of(&result, "H#0", "x"), vec!["G#0"]);
}
