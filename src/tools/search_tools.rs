//! Search for tools by query.

use crate::manager::ToolManager;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Input for the `search_tools` operation.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchToolsInput {
    /// Search query: natural language or keywords
    pub query: String,
}

/// One scored tool with everything a planner needs to import it.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ToolDescriptor {
    /// Tool name (use in imports)
    pub name: String,
    /// What the tool does
    pub description: String,
    /// JSON Schema for the tool's arguments
    #[serde(rename = "inputSchema")]
    pub input_schema: Json,
    /// JSON Schema for the tool's result, when declared
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Json>,
    /// Import statement for `execute_workflow` programs
    pub import_path: String,
}

/// Output for the `search_tools` operation.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SearchToolsOutput {
    /// Up to 5 matching tools, best first
    pub tools: Vec<ToolDescriptor>,
}

/// Executes the `search_tools` operation.
pub fn execute_search_tools(manager: &ToolManager, input: SearchToolsInput) -> SearchToolsOutput {
    let start = std::time::Instant::now();
    let hits = manager.search(&input.query, 5);

    let tools: Vec<ToolDescriptor> = hits
        .into_iter()
        .filter_map(|hit| {
            let tool = manager.lookup(&hit.spec.name).ok()?;
            Some(ToolDescriptor {
                name: hit.spec.name,
                description: hit.spec.description,
                input_schema: hit.spec.input_schema,
                output_schema: hit.spec.output_schema,
                import_path: tool.import_path(),
            })
        })
        .collect();

    tracing::info!(
        query = %input.query,
        results = tools.len(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "search_tools"
    );
    SearchToolsOutput { tools }
}
