//! MCP protocol server: the engine from `mcp-runtime` wired to two
//! transports, line-delimited stdio and Streamable HTTP.
#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::io::Result as IoResult;
use std::sync::Arc;
use std::time::Duration;

use mcp_runtime::HandlerRegistry;
use mcp_runtime::OutgoingSender;
use mcp_runtime::Session;
use mcp_runtime::SessionManager;
use mcp_runtime::TaskStore;
use mcp_runtime::outgoing::OUTGOING_CHANNEL_CAPACITY;
use mcp_types::JSONRPC_VERSION;
use mcp_types::JSONRPCError;
use mcp_types::JSONRPCErrorError;
use mcp_types::JSONRPCMessage;
use mcp_types::PARSE_ERROR_CODE;
use mcp_types::RequestId;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::{self};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use uuid::Uuid;

pub mod http_transport;
pub(crate) mod message_processor;
mod reference;
mod replay_buffer;

use crate::message_processor::MessageProcessor;

pub use crate::http_transport::MCP_SESSION_ID_HEADER;
pub use crate::http_transport::build_router;
pub use crate::reference::reference_registry;

/// Size of the bounded channel between the stdin reader and the processor.
/// 128 messages of headroom is plenty for an interactive peer.
const CHANNEL_CAPACITY: usize = 128;

pub struct ServerConfig {
    pub server_name: String,
    pub server_title: Option<String>,
    pub server_version: String,
    pub instructions: Option<String>,
    /// Include failure detail in `-32603` error data. Off by default so
    /// internals never leak to peers.
    pub debug_errors: bool,
    /// Events retained per HTTP session for `Last-Event-ID` resumption.
    pub replay_buffer_size: usize,
    pub default_task_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "mcp-server".to_string(),
            server_title: None,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            debug_errors: false,
            replay_buffer_size: 1024,
            default_task_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// One configured server, shareable across transports and sessions.
#[derive(Clone)]
pub struct McpServer {
    registry: Arc<HandlerRegistry>,
    session_manager: Arc<SessionManager>,
    tasks: TaskStore,
    config: Arc<ServerConfig>,
}

impl McpServer {
    pub fn new(
        registry: HandlerRegistry,
        session_manager: Arc<SessionManager>,
        tasks: TaskStore,
        config: ServerConfig,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            session_manager,
            tasks,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        self.registry.clone()
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session_manager
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    /// Application hook: a resource's content changed. Fans
    /// `notifications/resources/updated` out to subscribed sessions.
    pub async fn notify_resource_updated(&self, uri: &str) -> usize {
        self.session_manager.notify_resource_updated(uri).await
    }

    /// Serve a single session over stdin/stdout. Diagnostics go to stderr;
    /// stdout carries nothing but envelopes.
    pub async fn run_stdio(&self) -> IoResult<()> {
        let sweeper_shutdown = CancellationToken::new();
        let sweeper = self.tasks.spawn_sweeper(sweeper_shutdown.clone());

        // Set up channels.
        let (incoming_tx, mut incoming_rx) = mpsc::channel::<JSONRPCMessage>(CHANNEL_CAPACITY);
        let (outgoing_tx, mut outgoing_rx) =
            mpsc::channel::<JSONRPCMessage>(OUTGOING_CHANNEL_CAPACITY);

        let session = Session::new(
            Uuid::new_v4().to_string(),
            OutgoingSender::new(outgoing_tx.clone()),
        );
        self.session_manager.register(session.clone()).await;
        let processor = Arc::new(MessageProcessor::new(
            session.clone(),
            self.registry.clone(),
            self.tasks.clone(),
            self.config.clone(),
        ));

        // Task: read from stdin, push to `incoming_tx`.
        let stdin_reader_handle = tokio::spawn({
            let error_tx = outgoing_tx.clone();
            let session = session.clone();
            async move {
                let stdin = io::stdin();
                let reader = BufReader::new(stdin);
                let mut lines = reader.lines();

                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => match serde_json::from_str::<JSONRPCMessage>(&line) {
                            Ok(msg) => {
                                if incoming_tx.send(msg).await.is_err() {
                                    // Receiver gone, nothing left to do.
                                    break;
                                }
                            }
                            Err(e) => match recover_request_id(&line) {
                                Some(id) => {
                                    let envelope = JSONRPCMessage::Error(JSONRPCError {
                                        jsonrpc: JSONRPC_VERSION.into(),
                                        id,
                                        error: JSONRPCErrorError {
                                            code: PARSE_ERROR_CODE,
                                            message: format!("Parse error: {e}"),
                                            data: None,
                                        },
                                    });
                                    let _ = error_tx.send(envelope).await;
                                }
                                None => error!("dropping undecodable line: {e}"),
                            },
                        },
                        Ok(None) => {
                            debug!("stdin reader finished (EOF)");
                            break;
                        }
                        Err(e) => {
                            // Transport failure is fatal for the session,
                            // not the process.
                            error!("stdin read error: {e}");
                            session.fail().await;
                            break;
                        }
                    }
                }
            }
        });

        // Task: process incoming messages.
        let processor_handle = tokio::spawn({
            let session_manager = self.session_manager.clone();
            async move {
                while let Some(msg) = incoming_rx.recv().await {
                    processor.process_message(msg).await;
                }
                // EOF from the peer: tear the session down, cancelling
                // inflight work and failing pending outbound requests.
                session_manager.remove(session.session_id()).await;
                info!("processor task exited (stdin closed)");
            }
        });

        // Explicitly drop our clone so the writer observes channel closure
        // once the session is gone.
        drop(outgoing_tx);

        // Task: write outgoing messages to stdout, one envelope per line.
        let stdout_writer_handle = tokio::spawn(async move {
            let mut stdout = io::stdout();
            while let Some(message) = outgoing_rx.recv().await {
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if let Err(e) = stdout.write_all(json.as_bytes()).await {
                            error!("failed to write to stdout: {e}");
                            break;
                        }
                        if let Err(e) = stdout.write_all(b"\n").await {
                            error!("failed to write newline to stdout: {e}");
                            break;
                        }
                    }
                    Err(e) => error!("failed to serialize JSONRPCMessage: {e}"),
                }
            }
            info!("stdout writer exited (channel closed)");
        });

        // The typical exit path is the stdin reader hitting EOF which, once
        // it drops `incoming_tx`, propagates shutdown to the processor and
        // then to the stdout task.
        let _ = tokio::join!(stdin_reader_handle, processor_handle, stdout_writer_handle);
        sweeper_shutdown.cancel();
        let _ = sweeper.await;

        Ok(())
    }

    /// Serve the Streamable HTTP transport on an already-bound listener,
    /// with the MCP endpoint mounted at `path`.
    pub async fn serve_http(&self, listener: tokio::net::TcpListener, path: &str) -> IoResult<()> {
        let sweeper_shutdown = CancellationToken::new();
        let _sweeper = self.tasks.spawn_sweeper(sweeper_shutdown.clone());
        let router = http_transport::build_router(self.clone(), path);
        let result = axum::serve(listener, router).await;
        sweeper_shutdown.cancel();
        result
    }
}

/// Best effort: pull a usable `id` out of a line that failed envelope
/// decoding, so the peer gets a `-32700` instead of silence.
fn recover_request_id(line: &str) -> Option<RequestId> {
    let value: Value = serde_json::from_str(line).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}
