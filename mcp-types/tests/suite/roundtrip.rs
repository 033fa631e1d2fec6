use base64::Engine;
use mcp_types::BlobResourceContents;
use mcp_types::CallToolResult;
use mcp_types::ContentBlock;
use mcp_types::EmbeddedResource;
use mcp_types::JSONRPCMessage;
use mcp_types::ResourceContents;
use pretty_assertions::assert_eq;
use serde_json::json;

/// Fields introduced by newer protocol revisions must survive
/// decode-then-encode unchanged, since envelope params stay raw JSON.
#[test]
fn envelope_roundtrip_preserves_unknown_fields() {
    let raw = json!({
        "jsonrpc": "2.0",
        "id": "req-7",
        "method": "tools/call",
        "params": {
            "name": "lookup",
            "arguments": {"q": "weather"},
            "_meta": {"progressToken": "tok-1"},
            "fieldFromTheFuture": {"nested": [1, 2, 3]}
        }
    });

    let msg: JSONRPCMessage = serde_json::from_value(raw.clone()).expect("decode");
    let reencoded = serde_json::to_value(&msg).expect("encode");
    assert_eq!(raw, reencoded);
}

#[test]
fn response_roundtrip_preserves_unknown_fields() {
    let raw = json!({
        "jsonrpc": "2.0",
        "id": 3,
        "result": {
            "tools": [],
            "experimentalHint": true
        }
    });

    let msg: JSONRPCMessage = serde_json::from_value(raw.clone()).expect("decode");
    assert!(matches!(msg, JSONRPCMessage::Response(_)));
    assert_eq!(raw, serde_json::to_value(&msg).expect("encode"));
}

#[test]
fn blob_content_roundtrips_base64_unchanged() {
    let bytes: Vec<u8> = (0u8..=255).collect();
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

    let result = CallToolResult {
        content: vec![ContentBlock::Resource(EmbeddedResource {
            resource: ResourceContents::Blob(BlobResourceContents {
                uri: "blob://payload".to_string(),
                mime_type: Some("application/octet-stream".to_string()),
                blob: encoded.clone(),
            }),
            annotations: None,
        })],
        is_error: None,
        structured_content: None,
    };

    let wire = serde_json::to_string(&result).expect("encode");
    let back: CallToolResult = serde_json::from_str(&wire).expect("decode");
    let ContentBlock::Resource(EmbeddedResource {
        resource: ResourceContents::Blob(blob),
        ..
    }) = &back.content[0]
    else {
        panic!("expected blob resource block");
    };

    assert_eq!(blob.blob, encoded);
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&blob.blob)
        .expect("valid base64");
    assert_eq!(decoded, bytes);
}
