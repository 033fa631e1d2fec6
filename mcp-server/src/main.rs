use std::io::Result as IoResult;
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use mcp_runtime::SessionManager;
use mcp_runtime::TaskStore;
use mcp_server::McpServer;
use mcp_server::ServerConfig;
use mcp_server::reference_registry;
use tracing_subscriber::EnvFilter;

/// Reference MCP server speaking stdio or Streamable HTTP.
#[derive(Debug, Parser)]
#[command(name = "mcp-server", version)]
struct Cli {
    /// Serve the Streamable HTTP transport on this address; stdio otherwise.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Events retained per HTTP session for Last-Event-ID resumption.
    #[arg(long, default_value_t = 1024)]
    replay_buffer_size: usize,

    /// How often the task sweeper runs.
    #[arg(long, default_value_t = 30)]
    sweeper_interval_secs: u64,

    /// Default TTL for long-running tasks.
    #[arg(long, default_value_t = 300)]
    task_ttl_secs: u64,

    /// Include failure detail in internal-error data. For debugging only.
    #[arg(long)]
    debug_errors: bool,
}

#[tokio::main]
async fn main() -> IoResult<()> {
    // Install a simple subscriber so `tracing` output is visible. Users can
    // control the log level with `RUST_LOG`. Diagnostics must stay on
    // stderr: stdout may be the transport.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ServerConfig {
        debug_errors: cli.debug_errors,
        replay_buffer_size: cli.replay_buffer_size,
        default_task_ttl: Duration::from_secs(cli.task_ttl_secs),
        sweep_interval: Duration::from_secs(cli.sweeper_interval_secs),
        ..Default::default()
    };

    let session_manager = SessionManager::new();
    let tasks = TaskStore::new(config.default_task_ttl, config.sweep_interval);
    let registry = reference_registry(&session_manager, &tasks);
    let server = McpServer::new(registry, session_manager, tasks, config);

    match cli.listen {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            server.serve_http(listener, "/mcp").await
        }
        None => server.run_stdio().await,
    }
}
