//! Error types for toolgate.
//!
//! Uses thiserror for ergonomic error handling with proper
//! error chain propagation.

use thiserror::Error;

/// Top-level gateway error.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Manager error: {0}")]
    Manager(#[from] ManagerError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Connector error: {0}")]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Tool(#[from] ToolExecutionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Tool registry and dispatch errors.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Tool already exists: {name}")]
    Duplicate { name: String },

    #[error("Tool not found: {name}")]
    NotFound { name: String },

    /// Executor failures surface unmodified; classification happens
    /// one layer above the manager.
    #[error(transparent)]
    Executor(#[from] anyhow::Error),
}

/// Stage of a workflow run in which an error was raised.
///
/// Pre-execution stages abort before any provenance record is appended;
/// `Executing` errors leave the partial record sequence intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parsing,
    Validating,
    Executing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parsing => write!(f, "parsing"),
            Self::Validating => write!(f, "validating"),
            Self::Executing => write!(f, "executing"),
        }
    }
}

/// Workflow compilation and execution errors.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Only imports from '{root}.*' are allowed, got: {module}")]
    ImportDisallowed { root: &'static str, module: String },

    #[error("Tool '{name}' not found. Available tools: {available:?}")]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Workflow code must define 'async def workflow():'")]
    MissingEntry,

    #[error("Workflow timed out after {seconds}s")]
    Timeout { seconds: f64 },

    #[error(transparent)]
    Tool(#[from] ToolExecutionError),

    #[error(transparent)]
    Elicit(#[from] ElicitError),

    #[error("Workflow failed: {message}")]
    Failure { message: String },
}

impl WorkflowError {
    /// Classifies the error by run stage for gateway-facing reporting.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Syntax { .. } | Self::ImportDisallowed { .. } => Stage::Parsing,
            Self::UnknownTool { .. } | Self::MissingEntry => Stage::Validating,
            Self::Timeout { .. } | Self::Tool(_) | Self::Elicit(_) | Self::Failure { .. } => {
                Stage::Executing
            }
        }
    }

    /// Shorthand for runtime failures raised inside the entry routine.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }
}

/// A tool raised during provenance-tracked dispatch.
#[derive(Error, Debug)]
#[error("tool '{tool_name}': {source}")]
pub struct ToolExecutionError {
    pub tool_name: String,
    #[source]
    pub source: anyhow::Error,
}

/// Negative or failed responses to a mid-run elicitation request.
#[derive(Error, Debug)]
pub enum ElicitError {
    #[error("User declined elicitation: {message}")]
    Declined { message: String },

    #[error("User cancelled elicitation: {message}")]
    Cancelled { message: String },

    #[error("Elicitation transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

/// Remote server connector errors.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Already connected: {name}")]
    AlreadyConnected { name: String },

    #[error("Not connected: {name}")]
    NotConnected { name: String },

    #[error("Server '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("Server '{server}': transport error: {source}")]
    Transport {
        server: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Result type alias for workflow operations.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

// Error code implementations for machine-readable error responses
impl GatewayError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Manager(e) => e.code(),
            Self::Workflow(e) => e.code(),
            Self::Connect(e) => e.code(),
            Self::Tool(_) => "TOOL_EXECUTION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the caller (an LLM planner) can see this error and adapt,
    /// as opposed to a server-side fault.
    #[must_use]
    pub fn is_client_fixable(&self) -> bool {
        matches!(
            self,
            Self::Manager(ManagerError::NotFound { .. } | ManagerError::Executor(_))
                | Self::Workflow(_)
                | Self::Tool(_)
        )
    }
}

impl ManagerError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Duplicate { .. } => "DUPLICATE_TOOL",
            Self::NotFound { .. } => "TOOL_NOT_FOUND",
            Self::Executor(_) => "TOOL_EXECUTION_ERROR",
        }
    }
}

impl WorkflowError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "SYNTAX_ERROR",
            Self::ImportDisallowed { .. } => "IMPORT_DISALLOWED",
            Self::UnknownTool { .. } => "UNKNOWN_TOOL",
            Self::MissingEntry => "MISSING_ENTRY",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Tool(_) => "TOOL_EXECUTION_ERROR",
            Self::Elicit(e) => e.code(),
            Self::Failure { .. } => "WORKFLOW_FAILURE",
        }
    }
}

impl ElicitError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Declined { .. } => "USER_DECLINED",
            Self::Cancelled { .. } => "USER_CANCELLED",
            Self::Transport(_) => "ELICIT_TRANSPORT_ERROR",
        }
    }
}

impl ConnectError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyConnected { .. } => "ALREADY_CONNECTED",
            Self::NotConnected { .. } => "NOT_CONNECTED",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Transport { .. } => "REMOTE_TRANSPORT_ERROR",
        }
    }
}

// Conversion to rmcp protocol errors
impl From<GatewayError> for rmcp::ErrorData {
    fn from(err: GatewayError) -> Self {
        rmcp::ErrorData::internal_error(err.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_classification() {
        assert_eq!(
            WorkflowError::ImportDisallowed {
                root: "toolgate",
                module: "os".into()
            }
            .stage(),
            Stage::Parsing
        );
        assert_eq!(WorkflowError::MissingEntry.stage(), Stage::Validating);
        assert_eq!(
            WorkflowError::Timeout { seconds: 30.0 }.stage(),
            Stage::Executing
        );
    }

    #[test]
    fn test_codes_are_stable() {
        let err = GatewayError::Manager(ManagerError::Duplicate {
            name: "add".into(),
        });
        assert_eq!(err.code(), "DUPLICATE_TOOL");

        let err = GatewayError::Workflow(WorkflowError::Elicit(ElicitError::Declined {
            message: "no".into(),
        }));
        assert_eq!(err.code(), "USER_DECLINED");
    }

    #[test]
    fn test_client_fixable_split() {
        let fixable = GatewayError::Manager(ManagerError::NotFound { name: "x".into() });
        assert!(fixable.is_client_fixable());

        let fault = GatewayError::Config("bad audit dir".into());
        assert!(!fault.is_client_fixable());
    }
}
