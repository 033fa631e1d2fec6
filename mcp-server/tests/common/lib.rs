mod mcp_process;

pub use mcp_process::McpProcess;
use mcp_types::JSONRPCResponse;
use serde::de::DeserializeOwned;

pub fn to_response<T: DeserializeOwned>(response: JSONRPCResponse) -> anyhow::Result<T> {
    let value = serde_json::to_value(response.result)?;
    let typed = serde_json::from_value(value)?;
    Ok(typed)
}
