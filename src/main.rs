//! toolgate: provenance-tracking MCP gateway.
//!
//! Usage:
//!   toolgate --mcp --config mcp.json     # Start the gateway as an MCP server
//!   toolgate search <query>              # CLI tool search
//!   toolgate call <tool> --args <json>   # CLI single-tool execution
//!   toolgate run <program.wf>            # CLI workflow execution

use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use std::path::PathBuf;
use std::sync::Arc;
use toolgate::audit::JsonDirSink;
use toolgate::connector::{parse_server_configs, RemoteConnector};
use toolgate::manager::ToolManager;
use toolgate::server::GatewayServer;
use toolgate::tools;
use toolgate::workflow::TrackingStrategy;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "Provenance-tracking MCP gateway")]
#[command(version)]
struct Cli {
    /// Run as MCP server (stdin/stdout JSON-RPC)
    #[arg(long)]
    mcp: bool,

    /// Remote server configuration file ({"mcpServers": {...}})
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data-flow tracking strategy: transparent, instrumented, or none
    #[arg(long, default_value = "transparent")]
    strategy: TrackingStrategy,

    /// Directory for workflow audit artifacts
    #[arg(long)]
    audit_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for tools
    Search {
        /// Search query
        query: String,
    },

    /// Execute a single tool
    Call {
        /// Tool name
        tool: String,

        /// JSON object of keyword arguments
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Execute a workflow program from a file
    Run {
        /// Path to the program
        program: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // CRITICAL: Log to stderr only (stdout is JSON-RPC for MCP)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("toolgate=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let manager = Arc::new(ToolManager::new());
    let connector = Arc::new(RemoteConnector::new(Arc::clone(&manager)));

    if let Some(config_path) = &cli.config {
        let raw = std::fs::read_to_string(config_path)?;
        let configs = parse_server_configs(&serde_json::from_str(&raw)?)?;
        let connected = connector.connect_all(&configs).await;
        tracing::info!(
            servers = connected,
            tools = manager.len(),
            "remote servers connected"
        );
    }

    let audit = cli
        .audit_dir
        .clone()
        .map_or_else(JsonDirSink::default, JsonDirSink::new);

    let outcome = if cli.mcp {
        run_mcp_server(manager, Arc::clone(&connector), cli.strategy, audit).await
    } else if let Some(cmd) = cli.command {
        run_cli(manager, cli.strategy, audit, cmd).await
    } else {
        eprintln!("Use --mcp to start the gateway, or a subcommand for CLI mode.");
        eprintln!("Run with --help for more information.");
        std::process::exit(1);
    };

    // Remote sessions shut down under a bounded deadline either way
    connector.close().await;
    outcome
}

async fn run_mcp_server(
    manager: Arc<ToolManager>,
    connector: Arc<RemoteConnector>,
    strategy: TrackingStrategy,
    audit: JsonDirSink,
) -> anyhow::Result<()> {
    tracing::info!(tools = manager.len(), "starting MCP gateway");

    let server = GatewayServer::new(manager, connector, strategy, audit);
    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}

async fn run_cli(
    manager: Arc<ToolManager>,
    strategy: TrackingStrategy,
    audit: JsonDirSink,
    cmd: Commands,
) -> anyhow::Result<()> {
    match cmd {
        Commands::Search { query } => {
            let output = tools::execute_search_tools(&manager, tools::SearchToolsInput { query });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Call { tool, args } => {
            let args: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&args)?;
            let input = tools::ExecuteToolInput {
                tool_name: tool,
                args,
            };
            let result = tools::execute_tool(&manager, input)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Run { program } => {
            let source = std::fs::read_to_string(&program)?;
            let input = tools::ExecuteWorkflowInput {
                program: source,
                timeout_secs: None,
            };
            let output = tools::execute_workflow(manager, strategy, input, None, Some(&audit))
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("{}", serde_json::to_string_pretty(&output.returned)?);
            if let Some(path) = output.audit_path {
                eprintln!("audit trail: {}", path.display());
            }
        }
    }

    Ok(())
}
