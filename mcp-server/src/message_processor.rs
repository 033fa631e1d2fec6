//! Inbound dispatch for one server-side session.
//!
//! The processor enforces the handshake state machine and capability gating
//! before anything reaches a handler, runs handlers on spawned tasks with a
//! cancellation token registered in the inflight table, and suppresses the
//! response envelope when that token fired first.

use std::sync::Arc;

use mcp_runtime::HandlerError;
use mcp_runtime::HandlerRegistry;
use mcp_runtime::RequestContext;
use mcp_runtime::Session;
use mcp_runtime::SessionState;
use mcp_runtime::TaskStore;
use mcp_runtime::method_covered;
use mcp_types::CallToolRequestParams;
use mcp_types::CallToolResult;
use mcp_types::ClientNotification;
use mcp_types::ClientRequest;
use mcp_types::CompleteResult;
use mcp_types::CompleteResultCompletion;
use mcp_types::ContentBlock;
use mcp_types::ConversionError;
use mcp_types::INTERNAL_ERROR_CODE;
use mcp_types::INVALID_PARAMS_ERROR_CODE;
use mcp_types::Implementation;
use mcp_types::InitializeResult;
use mcp_types::JSONRPCError;
use mcp_types::JSONRPCErrorError;
use mcp_types::JSONRPCMessage;
use mcp_types::JSONRPCNotification;
use mcp_types::JSONRPCRequest;
use mcp_types::JSONRPCResponse;
use mcp_types::ListPromptsResult;
use mcp_types::ListResourceTemplatesResult;
use mcp_types::ListResourcesResult;
use mcp_types::ListTasksResult;
use mcp_types::ListToolsResult;
use mcp_types::METHOD_NOT_FOUND_ERROR_CODE;
use mcp_types::RequestId;
use mcp_types::SERVER_NOT_INITIALIZED_ERROR_CODE;
use mcp_types::ServerCapabilities;
use mcp_types::TextContent;
use serde_json::Value;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::ServerConfig;

pub struct MessageProcessor {
    session: Arc<Session>,
    registry: Arc<HandlerRegistry>,
    tasks: TaskStore,
    capabilities: ServerCapabilities,
    config: Arc<ServerConfig>,
}

impl MessageProcessor {
    pub fn new(
        session: Arc<Session>,
        registry: Arc<HandlerRegistry>,
        tasks: TaskStore,
        config: Arc<ServerConfig>,
    ) -> Self {
        let capabilities = registry.capabilities();
        Self {
            session,
            registry,
            tasks,
            capabilities,
            config,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub async fn process_message(self: &Arc<Self>, message: JSONRPCMessage) {
        match message {
            JSONRPCMessage::Request(request) => self.process_request(request).await,
            JSONRPCMessage::Response(response) => self.process_response(response).await,
            JSONRPCMessage::Notification(notification) => {
                self.process_notification(notification).await;
            }
            JSONRPCMessage::Error(error) => self.process_error(error).await,
        }
    }

    pub async fn process_request(self: &Arc<Self>, request: JSONRPCRequest) {
        // Hold on to the ID so we can respond.
        let request_id = request.id.clone();

        // Handshake gate: before `Operational`, only `initialize` and `ping`
        // are served.
        let state = self.session.state().await;
        let method = request.method.as_str();
        if !matches!(state, SessionState::Operational)
            && method != "initialize"
            && method != "ping"
        {
            self.session
                .outgoing()
                .send_error(
                    request_id,
                    JSONRPCErrorError {
                        code: SERVER_NOT_INITIALIZED_ERROR_CODE,
                        message: "server not initialized".to_string(),
                        data: None,
                    },
                )
                .await;
            return;
        }

        // Capability gate: a method outside the advertised set is
        // indistinguishable from an unimplemented one.
        if matches!(state, SessionState::Operational)
            && !method_covered(method, &self.capabilities)
        {
            self.send_method_not_found(request_id, method).await;
            return;
        }

        let client_request = match ClientRequest::try_from(request.clone()) {
            Ok(client_request) => client_request,
            Err(ConversionError::UnknownMethod(method)) => {
                self.send_method_not_found(request_id, &method).await;
                return;
            }
            Err(err @ ConversionError::InvalidParams { .. }) => {
                self.session
                    .outgoing()
                    .send_error(
                        request_id,
                        JSONRPCErrorError {
                            code: INVALID_PARAMS_ERROR_CODE,
                            message: err.to_string(),
                            data: None,
                        },
                    )
                    .await;
                return;
            }
        };

        // `initialize` mutates session state and must answer in-line, before
        // any other request for this session is admitted.
        if let ClientRequest::InitializeRequest(params) = &client_request {
            self.handle_initialize(request_id, params.clone()).await;
            return;
        }

        // Everything else runs on its own task so one slow handler cannot
        // stall the dispatch loop. The response is suppressed if the
        // request's cancellation token fired before completion.
        let cancel = self.session.inflight().insert(request_id.clone()).await;
        let processor = self.clone();
        let ctx = RequestContext::new(request, &self.session);
        tokio::spawn(async move {
            let result = processor
                .dispatch_request(client_request, ctx, cancel.clone())
                .await;
            processor.session.inflight().remove(&request_id).await;
            if cancel.is_cancelled() {
                // The peer is no longer expecting a reply for this ID.
                return;
            }
            match result {
                Ok(result) => {
                    processor
                        .session
                        .outgoing()
                        .send_response(request_id, result)
                        .await;
                }
                Err(error) => {
                    processor
                        .session
                        .outgoing()
                        .send_error(request_id, error)
                        .await;
                }
            }
        });
    }

    /// Handle a standalone JSON-RPC response originating from the peer.
    pub async fn process_response(&self, response: JSONRPCResponse) {
        let JSONRPCResponse { id, result, .. } = response;
        self.session.outgoing().notify_reply(id, Ok(result)).await;
    }

    /// Handle an error object received from the peer.
    pub async fn process_error(&self, error: JSONRPCError) {
        let JSONRPCError { id, error, .. } = error;
        self.session.outgoing().notify_reply(id, Err(error)).await;
    }

    /// Handle a fire-and-forget JSON-RPC notification. Decode failures are
    /// logged and dropped; notifications have no reply channel.
    pub async fn process_notification(&self, notification: JSONRPCNotification) {
        let client_notification = match ClientNotification::try_from(notification) {
            Ok(n) => n,
            Err(err) => {
                warn!("dropping undecodable notification: {err}");
                return;
            }
        };

        match client_notification {
            ClientNotification::InitializedNotification(_) => {
                self.session.mark_initialized().await;
            }
            ClientNotification::CancelledNotification(params) => {
                // Idempotent: unknown or already-completed IDs are ignored.
                self.session.inflight().cancel(&params.request_id).await;
            }
            ClientNotification::ProgressNotification(params) => {
                tracing::debug!("notifications/progress -> params: {params:?}");
            }
        }
    }

    async fn handle_initialize(
        &self,
        id: RequestId,
        params: mcp_types::InitializeRequestParams,
    ) {
        match self.session.begin_initialize(&params).await {
            Ok(protocol_version) => {
                let result = InitializeResult {
                    capabilities: self.capabilities.clone(),
                    instructions: self.config.instructions.clone(),
                    protocol_version,
                    server_info: Implementation {
                        name: self.config.server_name.clone(),
                        title: self.config.server_title.clone(),
                        version: self.config.server_version.clone(),
                    },
                };
                self.session.outgoing().send_response(id, result).await;
            }
            Err(error) => {
                self.session.outgoing().send_error(id, error).await;
            }
        }
    }

    async fn send_method_not_found(&self, id: RequestId, method: &str) {
        self.session
            .outgoing()
            .send_error(
                id,
                JSONRPCErrorError {
                    code: METHOD_NOT_FOUND_ERROR_CODE,
                    message: format!("method not found: {method}"),
                    data: None,
                },
            )
            .await;
    }

    async fn dispatch_request(
        &self,
        request: ClientRequest,
        ctx: RequestContext,
        cancel: CancellationToken,
    ) -> Result<Value, JSONRPCErrorError> {
        match request {
            // Answered in-line by `process_request`.
            ClientRequest::InitializeRequest(_) => Ok(json!({})),
            ClientRequest::PingRequest(_) => Ok(json!({})),
            ClientRequest::ListToolsRequest(_) => to_result(ListToolsResult {
                tools: self.registry.list_tools(),
                next_cursor: None,
            }),
            ClientRequest::CallToolRequest(params) => self.handle_call_tool(ctx, params, cancel).await,
            ClientRequest::ListResourcesRequest(_) => to_result(ListResourcesResult {
                resources: self.registry.list_resources(),
                next_cursor: None,
            }),
            ClientRequest::ListResourceTemplatesRequest(_) => {
                to_result(ListResourceTemplatesResult {
                    resource_templates: self.registry.list_resource_templates(),
                    next_cursor: None,
                })
            }
            ClientRequest::ReadResourceRequest(params) => {
                let Some((registration, resource_request)) =
                    self.registry.find_resource(&params.uri)
                else {
                    return Err(JSONRPCErrorError {
                        code: INVALID_PARAMS_ERROR_CODE,
                        message: format!("unknown resource: {}", params.uri),
                        data: None,
                    });
                };
                let future = registration.invoke(ctx, resource_request, cancel);
                let result = self.run_handler(future).await?;
                to_result(result)
            }
            ClientRequest::SubscribeRequest(params) => {
                self.session.subscribe(params.uri).await;
                Ok(json!({}))
            }
            ClientRequest::UnsubscribeRequest(params) => {
                self.session.unsubscribe(&params.uri).await;
                Ok(json!({}))
            }
            ClientRequest::ListPromptsRequest(_) => to_result(ListPromptsResult {
                prompts: self.registry.list_prompts(),
                next_cursor: None,
            }),
            ClientRequest::GetPromptRequest(params) => {
                let Some(registration) = self.registry.find_prompt(&params.name) else {
                    return Err(JSONRPCErrorError {
                        code: INVALID_PARAMS_ERROR_CODE,
                        message: format!("unknown prompt: {}", params.name),
                        data: None,
                    });
                };
                let future = registration.invoke(ctx, params.arguments, cancel);
                let result = self.run_handler(future).await?;
                to_result(result)
            }
            ClientRequest::SetLevelRequest(params) => {
                self.session.set_log_threshold(params.level).await;
                Ok(json!({}))
            }
            ClientRequest::CompleteRequest(params) => match self.registry.completion_handler() {
                Some(handler) => {
                    let future = handler(ctx, params, cancel);
                    let result = self.run_handler(future).await?;
                    to_result(result)
                }
                None => to_result(CompleteResult {
                    completion: CompleteResultCompletion::default(),
                }),
            },
            ClientRequest::ListTasksRequest(_) => to_result(ListTasksResult {
                tasks: self.tasks.list(self.session.session_id()).await,
                next_cursor: None,
            }),
            ClientRequest::GetTaskRequest(params) => {
                match self.tasks.get(&params.task_id).await {
                    Some(task) => to_result(task),
                    None => Err(unknown_task(&params.task_id)),
                }
            }
            ClientRequest::CancelTaskRequest(params) => {
                match self.tasks.cancel(&params.task_id).await {
                    Some(task) => to_result(task),
                    None => Err(unknown_task(&params.task_id)),
                }
            }
        }
    }

    async fn handle_call_tool(
        &self,
        ctx: RequestContext,
        params: CallToolRequestParams,
        cancel: CancellationToken,
    ) -> Result<Value, JSONRPCErrorError> {
        let CallToolRequestParams { name, arguments } = params;
        let Some(registration) = self.registry.find_tool(&name) else {
            // Unknown tools answer a tool-level error result rather than a
            // protocol error, so the model sees something it can react to.
            return to_result(CallToolResult {
                content: vec![ContentBlock::Text(TextContent {
                    text: format!("Unknown tool '{name}'"),
                    annotations: None,
                })],
                is_error: Some(true),
                structured_content: None,
            });
        };
        let future = registration.invoke(ctx, arguments, cancel);
        let result = self.run_handler(future).await?;
        to_result(result)
    }

    /// Run a handler future on its own task so a panic is contained and
    /// surfaces as `-32603` instead of tearing the session down. Panic
    /// payloads only reach the wire when `debug_errors` is set.
    async fn run_handler<T: Send + 'static>(
        &self,
        future: mcp_runtime::HandlerFuture<T>,
    ) -> Result<T, JSONRPCErrorError> {
        match tokio::spawn(future).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(handler_error)) => Err(handler_error.into_error_object()),
            Err(join_error) => {
                let detail = if join_error.is_panic() {
                    "handler panicked".to_string()
                } else {
                    "handler was aborted".to_string()
                };
                warn!("handler failure: {detail}");
                Err(JSONRPCErrorError {
                    code: INTERNAL_ERROR_CODE,
                    message: "internal error".to_string(),
                    data: self
                        .config
                        .debug_errors
                        .then(|| json!({ "detail": format!("{join_error}") })),
                })
            }
        }
    }
}

fn to_result<T: serde::Serialize>(value: T) -> Result<Value, JSONRPCErrorError> {
    serde_json::to_value(value).map_err(|err| {
        HandlerError::Internal(format!("failed to serialize result: {err}")).into_error_object()
    })
}

fn unknown_task(task_id: &str) -> JSONRPCErrorError {
    JSONRPCErrorError {
        code: INVALID_PARAMS_ERROR_CODE,
        message: format!("unknown task: {task_id}"),
        data: None,
    }
}
