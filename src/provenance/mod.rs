//! Provenance domain models and the run-scoped record store.
//!
//! Every tool invocation inside a workflow run is recorded as an
//! immutable [`ToolCallRecord`]; the record sequence plus the returned
//! value form an [`ExecutionResult`], which serializes to the audit
//! artifact of record: a JSON data-flow graph whose edges state, per
//! argument, which prior tool outputs reached which later tool input.

mod extract;

pub use extract::{extract_origins, extract_per_arg, resolve_value};

use crate::types::CallId;
use serde_json::{json, Map, Value as Json};
use std::collections::{BTreeMap, BTreeSet};

/// Provenance atom: where a value came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub call_id: CallId,
    pub tool_name: String,
    pub timestamp: f64,
}

/// Immutable audit entry for one tool invocation.
///
/// `input_origins` maps argument names to the sorted call ids whose
/// outputs reached that argument; arguments with no origins are
/// omitted entirely.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub call_id: CallId,
    pub tool_name: String,
    pub input_value: Map<String, Json>,
    pub input_origins: BTreeMap<String, Vec<CallId>>,
    pub output_value: Json,
    pub timestamp: f64,
    pub duration_ms: f64,
}

impl ToolCallRecord {
    /// All unique origin call ids across every argument.
    #[must_use]
    pub fn all_input_origins(&self) -> BTreeSet<CallId> {
        self.input_origins
            .values()
            .flat_map(|ids| ids.iter().cloned())
            .collect()
    }

    fn to_json(&self) -> Json {
        json!({
            "call_id": self.call_id,
            "tool_name": self.tool_name,
            "input_value": Json::Object(self.input_value.clone()),
            "input_origins": self
                .input_origins
                .iter()
                .map(|(arg, ids)| (arg.clone(), json!(ids)))
                .collect::<Map<String, Json>>(),
            "output_value": self.output_value,
            "timestamp": self.timestamp,
            "duration_ms": self.duration_ms,
        })
    }
}

/// Append-only record store for one workflow run.
///
/// Holds the ordered record sequence and a per-tool counter used to
/// mint call ids. Call ids are assigned in proxy-entry order; records
/// append in completion order. Never shared across runs.
#[derive(Debug, Default)]
pub struct ProvenanceStore {
    records: Vec<ToolCallRecord>,
    counts: ahash::AHashMap<String, u64>,
}

impl ProvenanceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints the next call id for a tool, advancing its counter.
    pub fn next_call_id(&mut self, tool_name: &str) -> CallId {
        let count = self.counts.entry(tool_name.to_string()).or_insert(0);
        let id = CallId::new(tool_name, *count);
        *count += 1;
        id
    }

    pub fn record(&mut self, record: ToolCallRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consumes the store, yielding the record sequence.
    #[must_use]
    pub fn into_records(self) -> Vec<ToolCallRecord> {
        self.records
    }
}

/// Result of a workflow run with its full audit trail.
#[derive(Debug)]
pub struct ExecutionResult {
    /// The raw value returned by the entry routine (carriers unwrapped).
    pub returned: Json,
    /// The ordered record sequence for the run.
    pub calls: Vec<ToolCallRecord>,
}

impl ExecutionResult {
    /// Serializes the result to its canonical JSON form:
    /// `{returned, calls, data_flow: {nodes, edges}}`.
    #[must_use]
    pub fn to_json(&self) -> Json {
        json!({
            "returned": self.returned,
            "calls": self.calls.iter().map(ToolCallRecord::to_json).collect::<Vec<_>>(),
            "data_flow": self.data_flow(),
        })
    }

    /// Pretty-printed canonical JSON.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Derives the data-flow graph from the record sequence.
    ///
    /// Nodes are records keyed by call id. For each record and each
    /// argument with a non-empty origin set there is one edge per
    /// distinct source; edges collapse by `(source, sink)` with their
    /// argument labels merged and sorted.
    #[must_use]
    pub fn data_flow(&self) -> Json {
        let nodes: Vec<Json> = self
            .calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.call_id,
                    "tool": call.tool_name,
                    "timestamp": call.timestamp,
                })
            })
            .collect();

        let mut edges: Vec<Json> = Vec::new();
        for call in &self.calls {
            // Group by source so args flowing from one source collapse
            // into a single labelled edge.
            let mut source_to_args: BTreeMap<&CallId, BTreeSet<&str>> = BTreeMap::new();
            for (arg, origins) in &call.input_origins {
                for origin_id in origins {
                    source_to_args
                        .entry(origin_id)
                        .or_default()
                        .insert(arg.as_str());
                }
            }
            for (source, args) in source_to_args {
                edges.push(json!({
                    "source": source,
                    "sink": call.call_id,
                    "args": args.into_iter().collect::<Vec<_>>(),
                }));
            }
        }

        json!({ "nodes": nodes, "edges": edges })
    }
}
