use mcp_test_support::McpProcess;
use mcp_test_support::to_response;
use mcp_types::CallToolResult;
use mcp_types::ContentBlock;
use mcp_types::METHOD_NOT_FOUND_ERROR_CODE;
use mcp_types::RequestId;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::timeout;

const DEFAULT_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// The server-side outbound caller sees the client's answer. A client that
/// never advertised `sampling` answers `-32601`, and the tool reports that
/// rejection back.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sampling_rejected_by_non_advertising_client() -> anyhow::Result<()> {
    let mut mcp = McpProcess::new().await?;
    timeout(DEFAULT_READ_TIMEOUT, mcp.initialize()).await??;

    let tool_call_id = mcp
        .send_call_tool_request("request_sampling", Some(json!({"prompt": "hi"})))
        .await?;

    // The server turns around and asks us to sample.
    let server_request = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_request_message(),
    )
    .await??;
    assert_eq!(server_request.method, "sampling/createMessage");

    // Play a client without the sampling capability.
    mcp.send_error(
        server_request.id,
        METHOD_NOT_FOUND_ERROR_CODE,
        "method not found: sampling/createMessage",
    )
    .await?;

    let response = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(tool_call_id)),
    )
    .await??;
    let result: CallToolResult = to_response(response)?;
    assert_eq!(result.is_error, Some(true));
    let ContentBlock::Text(text) = &result.content[0] else {
        panic!("expected text content");
    };
    assert_eq!(text.text, "sampling rejected: code -32601");
    Ok(())
}

/// The happy path: the client answers the sampling request and the tool
/// folds the completion into its result.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sampling_round_trip() -> anyhow::Result<()> {
    let mut mcp = McpProcess::new().await?;
    timeout(DEFAULT_READ_TIMEOUT, mcp.initialize()).await??;

    let tool_call_id = mcp
        .send_call_tool_request("request_sampling", Some(json!({"prompt": "say hi"})))
        .await?;

    let server_request = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_request_message(),
    )
    .await??;
    assert_eq!(server_request.method, "sampling/createMessage");

    mcp.send_response(
        server_request.id,
        json!({
            "role": "assistant",
            "content": {"type": "text", "text": "hello there"},
            "model": "test-model",
            "stopReason": "endTurn"
        }),
    )
    .await?;

    let response = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(tool_call_id)),
    )
    .await??;
    let result: CallToolResult = to_response(response)?;
    let ContentBlock::Text(text) = &result.content[0] else {
        panic!("expected text content");
    };
    assert_eq!(text.text, "sampled: hello there");
    Ok(())
}
