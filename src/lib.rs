//! toolgate: provenance-tracking MCP gateway.
//!
//! Mediates between an untrusted code generator (an LLM planner) and a
//! population of real side-effectful tools. Instead of letting the
//! model emit individual tool calls, it exposes a narrow surface:
//! search for tools, execute one tool, or execute a whole multi-step
//! workflow written in a restricted dialect. Every value flowing
//! through a workflow carries an origin set; the artifact of record is
//! a JSON data-flow graph stating, per argument, which prior tool
//! outputs reached which later tool input.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              MCP Server (rmcp)              │
//! │         JSON-RPC over stdin/stdout          │
//! └─────────────────┬───────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────┐
//! │            Gateway Operations                │
//! │  search_tools, execute_tool, execute_workflow│
//! └───────┬─────────────────────┬───────────────┘
//!         │                     │
//! ┌───────▼────────┐   ┌────────▼───────────────┐
//! │  Tool Manager   │   │    Workflow Engine     │
//! │ registry, BM25  │◄──┤ parse, whitelist, run  │
//! └───────┬────────┘   └────────┬───────────────┘
//!         │                     │
//! ┌───────▼────────┐   ┌────────▼───────────────┐
//! │ Remote Servers  │   │   Provenance Store     │
//! │  (MCP clients)  │   │ records + data flow    │
//! └────────────────┘   └────────────────────────┘
//! ```

pub mod audit;
pub mod connector;
pub mod error;
pub mod manager;
pub mod provenance;
pub mod schema;
pub mod server;
pub mod tools;
pub mod types;
pub mod workflow;

pub use error::{GatewayError, Result};
pub use manager::ToolManager;
pub use types::{CallId, RunId};
pub use workflow::{TrackingStrategy, WorkflowEngine};
