mod mcp_client;

pub use mcp_client::ClientHandlerFuture;
pub use mcp_client::ClientHandlers;
pub use mcp_client::McpClient;
