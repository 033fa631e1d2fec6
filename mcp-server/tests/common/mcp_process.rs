use std::process::Stdio;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;

use anyhow::Context;
use assert_cmd::prelude::*;

use mcp_types::CallToolRequestParams;
use mcp_types::CancelTaskRequestParams;
use mcp_types::ClientCapabilities;
use mcp_types::GetTaskRequestParams;
use mcp_types::Implementation;
use mcp_types::InitializeRequestParams;
use mcp_types::JSONRPC_VERSION;
use mcp_types::JSONRPCMessage;
use mcp_types::JSONRPCNotification;
use mcp_types::JSONRPCRequest;
use mcp_types::JSONRPCResponse;
use mcp_types::ModelContextProtocolNotification;
use mcp_types::ModelContextProtocolRequest;
use mcp_types::ReadResourceRequestParams;
use mcp_types::RequestId;
use mcp_types::SetLevelRequestParams;
use mcp_types::SubscribeRequestParams;
use mcp_types::UnsubscribeRequestParams;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::process::Command as StdCommand;
use tokio::process::Command;

pub struct McpProcess {
    next_request_id: AtomicI64,
    /// Retain this child process until the client is dropped. The Tokio runtime
    /// will make a "best effort" to reap the process after it exits, but it is
    /// not a guarantee. See the `kill_on_drop` documentation for details.
    #[allow(dead_code)]
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl McpProcess {
    pub async fn new() -> anyhow::Result<Self> {
        Self::new_with_args(&[]).await
    }

    /// Creates a new MCP server process with extra command-line arguments,
    /// e.g. a short `--task-ttl-secs` for expiry tests.
    pub async fn new_with_args(extra_args: &[&str]) -> anyhow::Result<Self> {
        // Use assert_cmd to locate the binary path and then switch to
        // tokio::process::Command.
        let std_cmd = StdCommand::cargo_bin("mcp-server")
            .context("should find binary for mcp-server")?;

        let program = std_cmd.get_program().to_owned();

        let mut cmd = Command::new(program);
        cmd.args(extra_args);

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.env("RUST_LOG", "debug");

        let mut process = cmd
            .kill_on_drop(true)
            .spawn()
            .context("mcp-server proc should start")?;
        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| anyhow::format_err!("mcp should have stdin fd"))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| anyhow::format_err!("mcp should have stdout fd"))?;
        let stdout = BufReader::new(stdout);

        // Forward child's stderr to our stderr so failures are visible even
        // when stdout/stderr are captured by the test harness.
        if let Some(stderr) = process.stderr.take() {
            let mut stderr_reader = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = stderr_reader.next_line().await {
                    eprintln!("[mcp stderr] {line}");
                }
            });
        }
        Ok(Self {
            next_request_id: AtomicI64::new(0),
            process,
            stdin,
            stdout,
        })
    }

    /// Performs the initialization handshake with the MCP server.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        let params = InitializeRequestParams {
            capabilities: ClientCapabilities {
                elicitation: Some(json!({})),
                experimental: None,
                roots: None,
                sampling: None,
            },
            client_info: Implementation {
                name: "mcp test harness".into(),
                title: Some("MCP Test Harness".into()),
                version: "0.0.0".into(),
            },
            protocol_version: mcp_types::MCP_SCHEMA_VERSION.into(),
        };
        let params_value = serde_json::to_value(params)?;

        self.send_jsonrpc_message(JSONRPCMessage::Request(JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.into(),
            id: RequestId::Integer(request_id),
            method: mcp_types::InitializeRequest::METHOD.into(),
            params: Some(params_value),
        }))
        .await?;

        let initialized = self.read_jsonrpc_message().await?;
        assert_eq!(
            JSONRPCMessage::Response(JSONRPCResponse {
                jsonrpc: JSONRPC_VERSION.into(),
                id: RequestId::Integer(request_id),
                result: json!({
                    "capabilities": {
                        "completions": {},
                        "logging": {},
                        "prompts": {
                            "listChanged": true
                        },
                        "resources": {
                            "listChanged": true,
                            "subscribe": true
                        },
                        "tools": {
                            "listChanged": true
                        },
                        "tasks": {}
                    },
                    "serverInfo": {
                        "name": "mcp-server",
                        "version": env!("CARGO_PKG_VERSION")
                    },
                    "protocolVersion": mcp_types::MCP_SCHEMA_VERSION
                })
            }),
            initialized
        );

        // Send notifications/initialized to ack the response.
        self.send_jsonrpc_message(JSONRPCMessage::Notification(JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.into(),
            method: mcp_types::InitializedNotification::METHOD.into(),
            params: None,
        }))
        .await?;

        Ok(())
    }

    /// Returns the id used to make the request so it can be used when
    /// correlating responses and notifications.
    pub async fn send_call_tool_request(
        &mut self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> anyhow::Result<i64> {
        let params = CallToolRequestParams {
            name: name.to_string(),
            arguments,
        };
        self.send_request(
            mcp_types::CallToolRequest::METHOD,
            Some(serde_json::to_value(params)?),
        )
        .await
    }

    /// Send a `tools/list` JSON-RPC request.
    pub async fn send_list_tools_request(&mut self) -> anyhow::Result<i64> {
        self.send_request(mcp_types::ListToolsRequest::METHOD, None)
            .await
    }

    /// Send a `ping` JSON-RPC request.
    pub async fn send_ping_request(&mut self) -> anyhow::Result<i64> {
        self.send_request(mcp_types::PingRequest::METHOD, None).await
    }

    /// Send a `resources/list` JSON-RPC request.
    pub async fn send_list_resources_request(&mut self) -> anyhow::Result<i64> {
        self.send_request(mcp_types::ListResourcesRequest::METHOD, None)
            .await
    }

    /// Send a `resources/read` JSON-RPC request.
    pub async fn send_read_resource_request(&mut self, uri: &str) -> anyhow::Result<i64> {
        let params = ReadResourceRequestParams {
            uri: uri.to_string(),
        };
        self.send_request(
            mcp_types::ReadResourceRequest::METHOD,
            Some(serde_json::to_value(params)?),
        )
        .await
    }

    /// Send a `resources/subscribe` JSON-RPC request.
    pub async fn send_subscribe_request(&mut self, uri: &str) -> anyhow::Result<i64> {
        let params = SubscribeRequestParams {
            uri: uri.to_string(),
        };
        self.send_request(
            mcp_types::SubscribeRequest::METHOD,
            Some(serde_json::to_value(params)?),
        )
        .await
    }

    /// Send a `resources/unsubscribe` JSON-RPC request.
    pub async fn send_unsubscribe_request(&mut self, uri: &str) -> anyhow::Result<i64> {
        let params = UnsubscribeRequestParams {
            uri: uri.to_string(),
        };
        self.send_request(
            mcp_types::UnsubscribeRequest::METHOD,
            Some(serde_json::to_value(params)?),
        )
        .await
    }

    /// Send a `prompts/get` JSON-RPC request.
    pub async fn send_get_prompt_request(
        &mut self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> anyhow::Result<i64> {
        let params = json!({ "name": name, "arguments": arguments });
        self.send_request(mcp_types::GetPromptRequest::METHOD, Some(params))
            .await
    }

    /// Send a `logging/setLevel` JSON-RPC request.
    pub async fn send_set_level_request(
        &mut self,
        params: SetLevelRequestParams,
    ) -> anyhow::Result<i64> {
        self.send_request(
            mcp_types::SetLevelRequest::METHOD,
            Some(serde_json::to_value(params)?),
        )
        .await
    }

    /// Send a `tasks/get` JSON-RPC request.
    pub async fn send_get_task_request(&mut self, task_id: &str) -> anyhow::Result<i64> {
        let params = GetTaskRequestParams {
            task_id: task_id.to_string(),
        };
        self.send_request(
            mcp_types::GetTaskRequest::METHOD,
            Some(serde_json::to_value(params)?),
        )
        .await
    }

    /// Send a `tasks/cancel` JSON-RPC request.
    pub async fn send_cancel_task_request(&mut self, task_id: &str) -> anyhow::Result<i64> {
        let params = CancelTaskRequestParams {
            task_id: task_id.to_string(),
        };
        self.send_request(
            mcp_types::CancelTaskRequest::METHOD,
            Some(serde_json::to_value(params)?),
        )
        .await
    }

    /// Send a `tasks/list` JSON-RPC request.
    pub async fn send_list_tasks_request(&mut self) -> anyhow::Result<i64> {
        self.send_request(mcp_types::ListTasksRequest::METHOD, None)
            .await
    }

    async fn send_request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> anyhow::Result<i64> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        let message = JSONRPCMessage::Request(JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.into(),
            id: RequestId::Integer(request_id),
            method: method.to_string(),
            params,
        });
        self.send_jsonrpc_message(message).await?;
        Ok(request_id)
    }

    /// Answer a server-initiated request.
    pub async fn send_response(
        &mut self,
        id: RequestId,
        result: serde_json::Value,
    ) -> anyhow::Result<()> {
        self.send_jsonrpc_message(JSONRPCMessage::Response(JSONRPCResponse {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result,
        }))
        .await
    }

    /// Reject a server-initiated request with a JSON-RPC error.
    pub async fn send_error(
        &mut self,
        id: RequestId,
        code: i64,
        message: &str,
    ) -> anyhow::Result<()> {
        self.send_jsonrpc_message(JSONRPCMessage::Error(mcp_types::JSONRPCError {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            error: mcp_types::JSONRPCErrorError {
                code,
                message: message.to_string(),
                data: None,
            },
        }))
        .await
    }

    /// Send a `notifications/cancelled` for a previously issued request.
    pub async fn send_cancelled_notification(&mut self, request_id: i64) -> anyhow::Result<()> {
        self.send_jsonrpc_message(JSONRPCMessage::Notification(JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.into(),
            method: mcp_types::CancelledNotification::METHOD.into(),
            params: Some(json!({ "requestId": request_id })),
        }))
        .await
    }

    /// Write a raw line to the server's stdin, bypassing serialization.
    pub async fn send_raw_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn send_jsonrpc_message(&mut self, message: JSONRPCMessage) -> anyhow::Result<()> {
        eprintln!("writing message to stdin: {message:?}");
        let payload = serde_json::to_string(&message)?;
        self.stdin.write_all(payload.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_jsonrpc_message(&mut self) -> anyhow::Result<JSONRPCMessage> {
        let mut line = String::new();
        self.stdout.read_line(&mut line).await?;
        let message = serde_json::from_str::<JSONRPCMessage>(&line)?;
        eprintln!("read message from stdout: {message:?}");
        Ok(message)
    }

    pub async fn read_stream_until_request_message(&mut self) -> anyhow::Result<JSONRPCRequest> {
        eprintln!("in read_stream_until_request_message()");

        loop {
            let message = self.read_jsonrpc_message().await?;

            match message {
                JSONRPCMessage::Notification(_) => {
                    eprintln!("notification: {message:?}");
                }
                JSONRPCMessage::Request(jsonrpc_request) => {
                    return Ok(jsonrpc_request);
                }
                JSONRPCMessage::Error(_) => {
                    anyhow::bail!("unexpected JSONRPCMessage::Error: {message:?}");
                }
                JSONRPCMessage::Response(_) => {
                    anyhow::bail!("unexpected JSONRPCMessage::Response: {message:?}");
                }
            }
        }
    }

    pub async fn read_stream_until_response_message(
        &mut self,
        request_id: RequestId,
    ) -> anyhow::Result<JSONRPCResponse> {
        eprintln!("in read_stream_until_response_message({request_id:?})");

        loop {
            let message = self.read_jsonrpc_message().await?;
            match message {
                JSONRPCMessage::Notification(_) => {
                    eprintln!("notification: {message:?}");
                }
                JSONRPCMessage::Request(_) => {
                    anyhow::bail!("unexpected JSONRPCMessage::Request: {message:?}");
                }
                JSONRPCMessage::Error(_) => {
                    anyhow::bail!("unexpected JSONRPCMessage::Error: {message:?}");
                }
                JSONRPCMessage::Response(jsonrpc_response) => {
                    if jsonrpc_response.id == request_id {
                        return Ok(jsonrpc_response);
                    }
                }
            }
        }
    }

    pub async fn read_stream_until_error_message(
        &mut self,
        request_id: RequestId,
    ) -> anyhow::Result<mcp_types::JSONRPCError> {
        loop {
            let message = self.read_jsonrpc_message().await?;
            match message {
                JSONRPCMessage::Notification(_) => {
                    eprintln!("notification: {message:?}");
                }
                JSONRPCMessage::Request(_) => {
                    anyhow::bail!("unexpected JSONRPCMessage::Request: {message:?}");
                }
                JSONRPCMessage::Response(_) => {
                    // Keep scanning; we're waiting for an error with matching id.
                }
                JSONRPCMessage::Error(err) => {
                    if err.id == request_id {
                        return Ok(err);
                    }
                }
            }
        }
    }

    pub async fn read_stream_until_notification_message(
        &mut self,
        method: &str,
    ) -> anyhow::Result<JSONRPCNotification> {
        eprintln!("in read_stream_until_notification_message({method})");

        loop {
            let message = self.read_jsonrpc_message().await?;
            match message {
                JSONRPCMessage::Notification(notification) => {
                    if notification.method == method {
                        return Ok(notification);
                    }
                }
                JSONRPCMessage::Request(_) => {
                    anyhow::bail!("unexpected JSONRPCMessage::Request: {message:?}");
                }
                JSONRPCMessage::Error(_) => {
                    anyhow::bail!("unexpected JSONRPCMessage::Error: {message:?}");
                }
                JSONRPCMessage::Response(_) => {
                    eprintln!("response: {message:?}");
                }
            }
        }
    }

    /// Read one message of any kind, for tests that must assert on silence
    /// or interleaving themselves.
    pub async fn read_message(&mut self) -> anyhow::Result<JSONRPCMessage> {
        self.read_jsonrpc_message().await
    }
}
