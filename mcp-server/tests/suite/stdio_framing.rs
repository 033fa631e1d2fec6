use mcp_test_support::McpProcess;
use mcp_types::PARSE_ERROR_CODE;
use mcp_types::RequestId;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::timeout;

const DEFAULT_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// A line that is valid JSON but not a valid envelope still carries an
/// `id`; the server answers `-32700` against it.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_envelope_with_recoverable_id() -> anyhow::Result<()> {
    let mut mcp = McpProcess::new().await?;
    timeout(DEFAULT_READ_TIMEOUT, mcp.initialize()).await??;

    // `jsonrpc` must be a string; decoding the envelope fails.
    mcp.send_raw_line(r#"{"jsonrpc": 2, "id": 77, "method": "ping"}"#)
        .await?;

    let error = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_error_message(RequestId::Integer(77)),
    )
    .await??;
    assert_eq!(error.error.code, PARSE_ERROR_CODE);
    Ok(())
}

/// A line that is not JSON at all is dropped; the session survives.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_garbage_line_is_dropped() -> anyhow::Result<()> {
    let mut mcp = McpProcess::new().await?;
    timeout(DEFAULT_READ_TIMEOUT, mcp.initialize()).await??;

    mcp.send_raw_line("this is not json").await?;

    let request_id = mcp.send_ping_request().await?;
    let response = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(request_id)),
    )
    .await??;
    assert_eq!(response.result, json!({}));
    Ok(())
}
