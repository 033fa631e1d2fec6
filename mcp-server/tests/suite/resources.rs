use mcp_test_support::McpProcess;
use mcp_test_support::to_response;
use mcp_types::CallToolResult;
use mcp_types::ListResourcesResult;
use mcp_types::ReadResourceResult;
use mcp_types::RequestId;
use mcp_types::ResourceContents;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::timeout;

const DEFAULT_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_read_static_and_templated_resources() -> anyhow::Result<()> {
    let mut mcp = McpProcess::new().await?;
    timeout(DEFAULT_READ_TIMEOUT, mcp.initialize()).await??;

    // Static resources appear in resources/list; templates do not.
    let request_id = mcp.send_list_resources_request().await?;
    let response = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(request_id)),
    )
    .await??;
    let resources: ListResourcesResult = to_response(response)?;
    assert_eq!(resources.resources.len(), 1);
    assert_eq!(resources.resources[0].uri, "memo://welcome");

    let request_id = mcp.send_read_resource_request("memo://standup").await?;
    let response = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(request_id)),
    )
    .await??;
    let read: ReadResourceResult = to_response(response)?;
    let ResourceContents::Text(contents) = &read.contents[0] else {
        panic!("expected text contents");
    };
    assert_eq!(contents.text, "memo: standup");
    Ok(())
}

/// Subscribing to a URI then mutating it yields exactly one
/// `notifications/resources/updated`; after unsubscribing, zero.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribe_update_unsubscribe() -> anyhow::Result<()> {
    let mut mcp = McpProcess::new().await?;
    timeout(DEFAULT_READ_TIMEOUT, mcp.initialize()).await??;

    let subscribe_id = mcp.send_subscribe_request("memo://welcome").await?;
    timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(subscribe_id)),
    )
    .await??;

    // Trigger a change; the tool reports how many sessions were reached.
    let touch_id = mcp
        .send_call_tool_request("touch_resource", Some(json!({"uri": "memo://welcome"})))
        .await?;
    let notification = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_notification_message("notifications/resources/updated"),
    )
    .await??;
    assert_eq!(
        notification.params,
        Some(json!({"uri": "memo://welcome"}))
    );
    let response = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(touch_id)),
    )
    .await??;
    let result: CallToolResult = to_response(response)?;
    assert_eq!(result.structured_content, Some(json!({"delivered": 1})));

    // After unsubscribe the same mutation reaches nobody.
    let unsubscribe_id = mcp.send_unsubscribe_request("memo://welcome").await?;
    timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(unsubscribe_id)),
    )
    .await??;

    let touch_id = mcp
        .send_call_tool_request("touch_resource", Some(json!({"uri": "memo://welcome"})))
        .await?;
    let response = timeout(
        DEFAULT_READ_TIMEOUT,
        mcp.read_stream_until_response_message(RequestId::Integer(touch_id)),
    )
    .await??;
    let result: CallToolResult = to_response(response)?;
    assert_eq!(result.structured_content, Some(json!({"delivered": 0})));
    Ok(())
}
