//! Transport-agnostic engine for MCP endpoints.
//!
//! This crate holds everything both transports and both directions share:
//! the outbound request multiplexer with its pending registry, the inflight
//! registry with cooperative cancellation, the capability state machine,
//! the handler registry, the subscription fan-out, and the long-running
//! task store. Transports (line-delimited stdio, Streamable HTTP) live in
//! the `mcp-server` and `mcp-client` crates and only move envelopes.

pub mod context;
pub mod error;
pub mod outgoing;
pub mod registry;
pub mod session;
pub mod session_manager;
pub mod tasks;
pub mod uri_template;

pub use context::ProgressEmitter;
pub use context::RequestContext;
pub use error::HandlerError;
pub use error::RequestError;
pub use outgoing::OutgoingSender;
pub use outgoing::RequestOptions;
pub use registry::HandlerFuture;
pub use registry::HandlerRegistry;
pub use registry::ResourceRequest;
pub use session::Session;
pub use session::SessionHandle;
pub use session::SessionState;
pub use session::method_covered;
pub use session_manager::SessionManager;
pub use tasks::TaskHandle;
pub use tasks::TaskStore;
