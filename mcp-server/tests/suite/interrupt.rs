use mcp_test_support::McpProcess;
use mcp_test_support::to_response;
use mcp_types::CallToolResult;
use mcp_types::ContentBlock;
use mcp_types::JSONRPCMessage;
use mcp_types::RequestId;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::timeout;

const DEFAULT_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// A cancelled request must never produce a response envelope. The sleep
/// tool runs for 10 s; we cancel within ~100 ms and then round-trip an echo.
/// Because stdout is a single ordered stream, seeing the echo response
/// without having seen a response for the sleep proves suppression.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_tool_call_is_suppressed() -> anyhow::Result<()> {
    let mut mcp = McpProcess::new().await?;
    timeout(DEFAULT_READ_TIMEOUT, mcp.initialize()).await??;

    let sleep_id = mcp
        .send_call_tool_request("sleep", Some(json!({"ms": 10_000})))
        .await?;

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    mcp.send_cancelled_notification(sleep_id).await?;

    let echo_id = mcp
        .send_call_tool_request("echo", Some(json!({"message": "after-cancel"})))
        .await?;

    // Drain the stream up to the echo response, asserting nothing for the
    // sleep request shows up on the way.
    let echo_response = loop {
        let message = timeout(DEFAULT_READ_TIMEOUT, mcp.read_message()).await??;
        match message {
            JSONRPCMessage::Response(response) => {
                assert_ne!(
                    response.id,
                    RequestId::Integer(sleep_id),
                    "cancelled request got a response"
                );
                if response.id == RequestId::Integer(echo_id) {
                    break response;
                }
            }
            JSONRPCMessage::Error(error) => {
                assert_ne!(
                    error.id,
                    RequestId::Integer(sleep_id),
                    "cancelled request got an error response"
                );
            }
            JSONRPCMessage::Notification(_) => {}
            JSONRPCMessage::Request(_) => panic!("unexpected server request"),
        }
    };

    let result: CallToolResult = to_response(echo_response)?;
    let ContentBlock::Text(text) = &result.content[0] else {
        panic!("expected text content");
    };
    assert_eq!(text.text, "after-cancel");
    Ok(())
}

/// Cancelling an unknown or already-finished request is a silent no-op.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelling_unknown_request_is_ignored() -> anyhow::Result<()> {
    let mut mcp = McpProcess::new().await?;
    timeout(DEFAULT_READ_TIMEOUT, mcp.initialize()).await??;

    mcp.send_cancelled_notification(424_242).await?;

    // The session is still fully usable.
    let request_id = mcp.send_ping_request().await?;
    let response = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(request_id)),
    )
    .await??;
    assert_eq!(response.result, json!({}));
    Ok(())
}
