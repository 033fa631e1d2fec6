use mcp_test_support::McpProcess;
use mcp_types::INVALID_REQUEST_ERROR_CODE;
use mcp_types::JSONRPC_VERSION;
use mcp_types::JSONRPCMessage;
use mcp_types::JSONRPCRequest;
use mcp_types::RequestId;
use mcp_types::SERVER_NOT_INITIALIZED_ERROR_CODE;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::timeout;

const DEFAULT_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_initialize_handshake() {
    let mut mcp = McpProcess::new().await.expect("spawn mcp process");
    // The harness asserts on the initialize response shape internally.
    timeout(DEFAULT_READ_TIMEOUT, mcp.initialize())
        .await
        .expect("init timed out")
        .expect("init failed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_before_initialize_is_rejected() {
    let mut mcp = McpProcess::new().await.expect("spawn mcp process");

    let request_id = mcp
        .send_list_tools_request()
        .await
        .expect("send tools/list");
    let error = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_error_message(RequestId::Integer(request_id)),
    )
    .await
    .expect("timeout")
    .expect("read error");

    assert_eq!(error.error.code, SERVER_NOT_INITIALIZED_ERROR_CODE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ping_is_allowed_before_initialize() {
    let mut mcp = McpProcess::new().await.expect("spawn mcp process");

    let request_id = mcp.send_ping_request().await.expect("send ping");
    let response = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(request_id)),
    )
    .await
    .expect("timeout")
    .expect("read response");

    assert_eq!(response.result, json!({}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unsupported_protocol_version_is_an_error() {
    let mut mcp = McpProcess::new().await.expect("spawn mcp process");

    let raw = JSONRPCMessage::Request(JSONRPCRequest {
        jsonrpc: JSONRPC_VERSION.into(),
        id: RequestId::Integer(99),
        method: "initialize".into(),
        params: Some(json!({
            "capabilities": {},
            "clientInfo": { "name": "old-client", "version": "0" },
            "protocolVersion": "1999-01-01"
        })),
    });
    let line = serde_json::to_string(&raw).expect("serialize");
    mcp.send_raw_line(&line).await.expect("send raw");

    let error = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_error_message(RequestId::Integer(99)),
    )
    .await
    .expect("timeout")
    .expect("read error");

    assert_eq!(error.error.code, INVALID_REQUEST_ERROR_CODE);
    let supported = error
        .error
        .data
        .as_ref()
        .and_then(|d| d.get("supported"))
        .cloned();
    assert_eq!(
        supported,
        Some(json!(["2025-06-18", "2025-03-26", "2024-11-05"]))
    );

    // The session stayed `Uninitialized`, so a proper handshake still works.
    timeout(DEFAULT_READ_TIMEOUT, mcp.initialize())
        .await
        .expect("init timed out")
        .expect("init failed");
}
