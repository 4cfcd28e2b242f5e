//! The three gateway operations.

mod execute_tool;
mod execute_workflow;
mod search_tools;

pub use execute_tool::{execute_tool, ExecuteToolInput};
pub use execute_workflow::{execute_workflow, ExecuteWorkflowInput, ExecuteWorkflowOutput};
pub use search_tools::{execute_search_tools, SearchToolsInput, SearchToolsOutput, ToolDescriptor};
