//! An async client endpoint for the Model Context Protocol (MCP).
//!
//! The client spawns a conforming MCP server as a subprocess and speaks
//! line-delimited JSON-RPC over its stdio. Outbound requests are paired
//! with their responses through a pending map; inbound traffic is the
//! interesting part: servers may send notifications at any time and may
//! initiate their own requests (`ping`, `sampling/createMessage`,
//! `elicitation/create`), which are answered by the handlers registered at
//! construction — or rejected with `-32601` when the corresponding
//! capability was never advertised.

use std::collections::HashMap;
use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use mcp_types::CallToolRequest;
use mcp_types::CallToolRequestParams;
use mcp_types::CancelledNotification;
use mcp_types::CancelledNotificationParams;
use mcp_types::ClientCapabilities;
use mcp_types::ConversionError;
use mcp_types::CreateMessageRequestParams;
use mcp_types::CreateMessageResult;
use mcp_types::ElicitRequestParams;
use mcp_types::ElicitResult;
use mcp_types::INVALID_PARAMS_ERROR_CODE;
use mcp_types::Implementation;
use mcp_types::InitializeRequest;
use mcp_types::InitializeRequestParams;
use mcp_types::InitializedNotification;
use mcp_types::JSONRPC_VERSION;
use mcp_types::JSONRPCError;
use mcp_types::JSONRPCErrorError;
use mcp_types::JSONRPCMessage;
use mcp_types::JSONRPCNotification;
use mcp_types::JSONRPCRequest;
use mcp_types::JSONRPCResponse;
use mcp_types::ListToolsRequest;
use mcp_types::ListToolsRequestParams;
use mcp_types::ListToolsResult;
use mcp_types::MCP_SCHEMA_VERSION;
use mcp_types::METHOD_NOT_FOUND_ERROR_CODE;
use mcp_types::ModelContextProtocolNotification;
use mcp_types::ModelContextProtocolRequest;
use mcp_types::ReadResourceRequest;
use mcp_types::ReadResourceRequestParams;
use mcp_types::ReadResourceResult;
use mcp_types::RequestId;
use mcp_types::SERVER_NOT_INITIALIZED_ERROR_CODE;
use mcp_types::ServerRequest;
use mcp_types::SetLevelRequest;
use mcp_types::SetLevelRequestParams;
use mcp_types::SubscribeRequest;
use mcp_types::SubscribeRequestParams;
use mcp_types::UnsubscribeRequest;
use mcp_types::UnsubscribeRequestParams;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

/// Depth of the outbound queue and of the notification-observer queue. The
/// writer drains continuously, so this only has to absorb short bursts.
const CHANNEL_CAPACITY: usize = 128;

/// Where a reply envelope is delivered once the peer answers.
type ReplySlot = oneshot::Sender<JSONRPCMessage>;

pub type ClientHandlerFuture<T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, JSONRPCErrorError>> + Send>>;

type SamplingHandler = Arc<
    dyn Fn(CreateMessageRequestParams, CancellationToken) -> ClientHandlerFuture<CreateMessageResult>
        + Send
        + Sync,
>;
type ElicitationHandler = Arc<
    dyn Fn(ElicitRequestParams, CancellationToken) -> ClientHandlerFuture<ElicitResult>
        + Send
        + Sync,
>;

/// Handlers for server-initiated requests. What is registered here decides
/// which capabilities the client advertises on `initialize`; an
/// unregistered direction is answered with `-32601` on the wire.
#[derive(Clone, Default)]
pub struct ClientHandlers {
    sampling: Option<SamplingHandler>,
    elicitation: Option<ElicitationHandler>,
}

impl ClientHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sampling<F>(mut self, handler: F) -> Self
    where
        F: Fn(CreateMessageRequestParams, CancellationToken) -> ClientHandlerFuture<CreateMessageResult>
            + Send
            + Sync
            + 'static,
    {
        self.sampling = Some(Arc::new(handler));
        self
    }

    pub fn elicitation<F>(mut self, handler: F) -> Self
    where
        F: Fn(ElicitRequestParams, CancellationToken) -> ClientHandlerFuture<ElicitResult>
            + Send
            + Sync
            + 'static,
    {
        self.elicitation = Some(Arc::new(handler));
        self
    }

    pub fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            experimental: None,
            roots: None,
            sampling: self.sampling.as_ref().map(|_| json!({})),
            elicitation: self.elicitation.as_ref().map(|_| json!({})),
        }
    }
}

struct ClientInner {
    /// Feeds the writer task; envelopes leave in queue order.
    outgoing_tx: mpsc::Sender<JSONRPCMessage>,

    /// Callers waiting on a reply, keyed by the integer request ID we
    /// allocated for them.
    pending: Mutex<HashMap<i64, ReplySlot>>,

    handlers: ClientHandlers,

    /// Set once the `initialize` handshake completed. Server-initiated
    /// requests other than `ping` are rejected with `-32002` before that.
    operational: AtomicBool,

    /// Server-initiated requests currently running, by their IDs, so a
    /// `notifications/cancelled` from the server can reach them.
    inflight: Mutex<HashMap<RequestId, CancellationToken>>,

    /// Server notifications are forwarded here, best-effort.
    notifications_tx: mpsc::Sender<JSONRPCNotification>,
}

/// A running MCP client instance.
pub struct McpClient {
    /// Held so the server process lives exactly as long as the client;
    /// `kill_on_drop` on the spawn tears it down with us.
    #[allow(dead_code)]
    child: tokio::process::Child,

    inner: Arc<ClientInner>,

    /// Source of outbound request IDs. Integers only, never reused.
    id_counter: AtomicI64,

    /// Handed out once via [`McpClient::take_notifications`].
    notifications_rx: Mutex<Option<mpsc::Receiver<JSONRPCNotification>>>,
}

impl McpClient {
    /// Spawn the given command and establish an MCP session over its STDIO.
    /// Caller is responsible for sending the `initialize` request. See
    /// [`initialize`](Self::initialize) for details.
    pub async fn new_stdio_client(
        program: OsString,
        args: Vec<OsString>,
        env: Option<HashMap<String, String>>,
        handlers: ClientHandlers,
    ) -> std::io::Result<Self> {
        let mut command = Command::new(program);
        command
            .args(args)
            // The server gets a curated environment, not ours wholesale.
            .env_clear()
            .envs(spawn_environment(env))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        let mut child = command.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("child stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout was not piped"))?;

        let (outgoing_tx, outgoing_rx) = mpsc::channel::<JSONRPCMessage>(CHANNEL_CAPACITY);
        let (notifications_tx, notifications_rx) =
            mpsc::channel::<JSONRPCNotification>(CHANNEL_CAPACITY);

        let inner = Arc::new(ClientInner {
            outgoing_tx,
            pending: Mutex::new(HashMap::new()),
            handlers,
            operational: AtomicBool::new(false),
            inflight: Mutex::new(HashMap::new()),
            notifications_tx,
        });

        // The IO loops are deliberately detached rather than joined: each
        // ends on its own when its side of the pipe (or its queue) closes,
        // and dropping `McpClient` closes both.
        tokio::spawn(write_loop(stdin, outgoing_rx));
        tokio::spawn(read_loop(inner.clone(), stdout));

        Ok(Self {
            child,
            inner,
            id_counter: AtomicI64::new(1),
            notifications_rx: Mutex::new(Some(notifications_rx)),
        })
    }

    /// Send an arbitrary MCP request and await the typed result.
    ///
    /// With `timeout: None` the call waits as long as the session lives.
    /// When a deadline elapses the request is abandoned: its slot is
    /// removed, `notifications/cancelled` goes out for its ID, and any
    /// reply that still arrives is discarded.
    pub async fn send_request<R>(
        &self,
        params: R::Params,
        timeout: Option<Duration>,
    ) -> Result<R::Result>
    where
        R: ModelContextProtocolRequest,
        R::Params: Serialize,
        R::Result: DeserializeOwned,
    {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let request_id = RequestId::Integer(id);
        let envelope = JSONRPCMessage::Request(JSONRPCRequest {
            id: request_id.clone(),
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: R::METHOD.to_string(),
            params: optional_params(&params)?,
        });

        // The slot must exist before the envelope hits the wire, or a fast
        // peer could answer into the void.
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        if self.inner.outgoing_tx.send(envelope).await.is_err() {
            self.inner.pending.lock().await.remove(&id);
            bail!("writer task is gone; the session is shut down");
        }

        let deadline = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };
        let reply = tokio::select! {
            reply = rx => reply,
            _ = deadline => {
                self.inner.pending.lock().await.remove(&id);
                self.inner.send_cancelled(request_id, "timed out").await;
                bail!("no response to `{}` within the allotted time", R::METHOD);
            }
        };

        match reply {
            Ok(JSONRPCMessage::Response(JSONRPCResponse { result, .. })) => {
                Ok(serde_json::from_value(result)?)
            }
            Ok(JSONRPCMessage::Error(err)) => bail!(
                "peer answered `{}` with error code {}: {}",
                R::METHOD,
                err.error.code,
                err.error.message
            ),
            Ok(other) => bail!("reply channel delivered a non-reply message: {other:?}"),
            Err(_) => bail!("session closed while `{}` was pending", R::METHOD),
        }
    }

    pub async fn send_notification<N>(&self, params: N::Params) -> Result<()>
    where
        N: ModelContextProtocolNotification,
        N::Params: Serialize,
    {
        self.inner.send_notification::<N>(params).await
    }

    /// Negotiates the initialization with the MCP server: sends `initialize`
    /// carrying the capabilities implied by the registered handlers, then
    /// `notifications/initialized` once the response has been received.
    /// Returns the response to the `initialize` request.
    pub async fn initialize(
        &self,
        client_info: Implementation,
        timeout: Option<Duration>,
    ) -> Result<mcp_types::InitializeResult> {
        let params = InitializeRequestParams {
            capabilities: self.inner.handlers.capabilities(),
            client_info,
            protocol_version: MCP_SCHEMA_VERSION.to_string(),
        };
        let response = self.send_request::<InitializeRequest>(params, timeout).await?;
        self.send_notification::<InitializedNotification>(None).await?;
        self.inner.operational.store(true, Ordering::SeqCst);
        Ok(response)
    }

    /// `tools/list`, typed.
    pub async fn list_tools(
        &self,
        params: Option<ListToolsRequestParams>,
        timeout: Option<Duration>,
    ) -> Result<ListToolsResult> {
        self.send_request::<ListToolsRequest>(params, timeout).await
    }

    /// `tools/call`, typed.
    pub async fn call_tool(
        &self,
        name: String,
        arguments: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<mcp_types::CallToolResult> {
        let params = CallToolRequestParams { name, arguments };
        debug!("MCP tool call: {params:?}");
        self.send_request::<CallToolRequest>(params, timeout).await
    }

    /// `resources/read`, typed.
    pub async fn read_resource(
        &self,
        uri: String,
        timeout: Option<Duration>,
    ) -> Result<ReadResourceResult> {
        self.send_request::<ReadResourceRequest>(ReadResourceRequestParams { uri }, timeout)
            .await
    }

    /// `resources/subscribe`, typed.
    pub async fn subscribe(&self, uri: String, timeout: Option<Duration>) -> Result<()> {
        self.send_request::<SubscribeRequest>(SubscribeRequestParams { uri }, timeout)
            .await?;
        Ok(())
    }

    /// `resources/unsubscribe`, typed.
    pub async fn unsubscribe(&self, uri: String, timeout: Option<Duration>) -> Result<()> {
        self.send_request::<UnsubscribeRequest>(UnsubscribeRequestParams { uri }, timeout)
            .await?;
        Ok(())
    }

    /// `logging/setLevel`, typed.
    pub async fn set_level(
        &self,
        params: SetLevelRequestParams,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.send_request::<SetLevelRequest>(params, timeout).await?;
        Ok(())
    }

    /// The stream of server notifications. Yields `None` after the first
    /// call; there is exactly one consumer.
    pub async fn take_notifications(&self) -> Option<mpsc::Receiver<JSONRPCNotification>> {
        self.notifications_rx.lock().await.take()
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        // `kill_on_drop` already signals the child; reaping it here means
        // an already-exited server does not linger as a zombie until the
        // runtime gets around to it.
        let _ = self.child.try_wait();
    }
}

/// Drains the outbound queue onto the child's stdin, one envelope per line.
/// Ends when the queue closes (client dropped) or the pipe breaks; dropping
/// stdin is how the server learns the session is over.
async fn write_loop(mut stdin: ChildStdin, mut outgoing_rx: mpsc::Receiver<JSONRPCMessage>) {
    while let Some(message) = outgoing_rx.recv().await {
        let mut line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                error!("unserializable outgoing message: {e}");
                continue;
            }
        };
        debug!("MCP message to server: {line}");
        line.push('\n');
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            error!("child stdin went away: {e}");
            break;
        }
    }
}

/// Reads line-delimited envelopes from the child's stdout and routes each
/// by kind: replies to their pending slot, notifications to the observer,
/// server-initiated requests onto their own task so a slow handler cannot
/// stall the reader.
async fn read_loop(inner: Arc<ClientInner>, stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("MCP message from server: {line}");
        let message = match serde_json::from_str::<JSONRPCMessage>(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("skipping undecodable line from server: {e}");
                continue;
            }
        };
        match message {
            JSONRPCMessage::Response(response) => {
                let id = response.id.clone();
                inner
                    .complete_pending(&id, JSONRPCMessage::Response(response))
                    .await;
            }
            JSONRPCMessage::Error(err) => {
                let id = err.id.clone();
                inner.complete_pending(&id, JSONRPCMessage::Error(err)).await;
            }
            JSONRPCMessage::Notification(notification) => {
                inner.dispatch_notification(notification).await;
            }
            JSONRPCMessage::Request(request) => {
                let inner = inner.clone();
                tokio::spawn(async move {
                    inner.handle_server_request(request).await;
                });
            }
        }
    }
    // EOF: abandon every in-flight caller so they observe closure instead
    // of hanging on a slot nobody will fill.
    inner.pending.lock().await.clear();
}

/// `None` params are encoded as *absence* of the field, not `null`.
fn optional_params<T: Serialize>(params: &T) -> Result<Option<Value>> {
    let value = serde_json::to_value(params)?;
    Ok(if value.is_null() { None } else { Some(value) })
}

impl ClientInner {
    async fn send_notification<N>(&self, params: N::Params) -> Result<()>
    where
        N: ModelContextProtocolNotification,
        N::Params: Serialize,
    {
        let method = N::METHOD.to_string();
        let notification = JSONRPCMessage::Notification(JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.clone(),
            params: optional_params(&params)?,
        });
        self.outgoing_tx
            .send(notification)
            .await
            .with_context(|| format!("failed to send notification `{method}` to writer task"))
    }

    async fn send_cancelled(&self, request_id: RequestId, reason: &str) {
        let params = CancelledNotificationParams {
            request_id,
            reason: Some(reason.to_string()),
        };
        match serde_json::to_value(&params) {
            Ok(params) => {
                let _ = self
                    .outgoing_tx
                    .send(JSONRPCMessage::Notification(JSONRPCNotification {
                        jsonrpc: JSONRPC_VERSION.to_string(),
                        method: CancelledNotification::METHOD.to_string(),
                        params: Some(params),
                    }))
                    .await;
            }
            Err(e) => warn!("failed to serialize cancelled params: {e}"),
        }
    }

    /// Hand a reply envelope to whichever caller is waiting on its ID.
    /// Replies for unknown IDs were either abandoned (timeout) or never
    /// ours; both are dropped quietly.
    async fn complete_pending(&self, id: &RequestId, message: JSONRPCMessage) {
        // We only ever allocate integer IDs, so anything else cannot match.
        let RequestId::Integer(id) = id else {
            warn!("ignoring reply with non-integer id: {id}");
            return;
        };
        let slot = self.pending.lock().await.remove(id);
        match slot {
            Some(slot) => {
                // A closed receiver just means the caller gave up first.
                let _ = slot.send(message);
            }
            None => debug!("reply for request {id} arrived after it was abandoned"),
        }
    }

    async fn dispatch_notification(&self, notification: JSONRPCNotification) {
        if notification.method == CancelledNotification::METHOD
            && let Some(params) = notification.params.clone()
            && let Ok(params) = serde_json::from_value::<CancelledNotificationParams>(params)
        {
            // The server withdrew one of its own requests.
            if let Some(token) = self.inflight.lock().await.get(&params.request_id) {
                token.cancel();
            }
        }

        // Forward best-effort; an observer that stopped draining must not
        // stall the reader.
        if self.notifications_tx.try_send(notification).is_err() {
            info!("dropping server notification: observer queue full or gone");
        }
    }

    /// Answer a server-initiated request.
    async fn handle_server_request(&self, request: JSONRPCRequest) {
        let id = request.id.clone();

        // Before the handshake completes only `ping` is answerable.
        if !self.operational.load(Ordering::SeqCst) && request.method != "ping" {
            self.respond_error(
                id,
                JSONRPCErrorError {
                    code: SERVER_NOT_INITIALIZED_ERROR_CODE,
                    message: "session not initialized".to_string(),
                    data: None,
                },
            )
            .await;
            return;
        }

        let server_request = match ServerRequest::try_from(request) {
            Ok(server_request) => server_request,
            Err(ConversionError::UnknownMethod(method)) => {
                self.respond_error(
                    id,
                    JSONRPCErrorError {
                        code: METHOD_NOT_FOUND_ERROR_CODE,
                        message: format!("method not found: {method}"),
                        data: None,
                    },
                )
                .await;
                return;
            }
            Err(err @ ConversionError::InvalidParams { .. }) => {
                self.respond_error(
                    id,
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

        match server_request {
            ServerRequest::PingRequest(_) => {
                self.respond_result(id, json!({})).await;
            }
            ServerRequest::CreateMessageRequest(params) => {
                match self.handlers.sampling.clone() {
                    Some(handler) => {
                        self.run_server_request(id, move |token| handler(params, token))
                            .await;
                    }
                    // Not advertised: indistinguishable from unimplemented.
                    None => self.respond_method_not_found(id, "sampling/createMessage").await,
                }
            }
            ServerRequest::ElicitRequest(params) => match self.handlers.elicitation.clone() {
                Some(handler) => {
                    self.run_server_request(id, move |token| handler(params, token))
                        .await;
                }
                None => self.respond_method_not_found(id, "elicitation/create").await,
            },
        }
    }

    /// Run one handler with a cancellation token registered under the
    /// request's ID. If the server cancels first, the response is suppressed;
    /// it is no longer expecting one.
    async fn run_server_request<T, F, Fut>(&self, id: RequestId, f: F)
    where
        T: Serialize,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, JSONRPCErrorError>>,
    {
        let token = CancellationToken::new();
        self.inflight.lock().await.insert(id.clone(), token.clone());
        let result = f(token.clone()).await;
        self.inflight.lock().await.remove(&id);
        if token.is_cancelled() {
            return;
        }
        match result {
            Ok(value) => match serde_json::to_value(value) {
                Ok(value) => self.respond_result(id, value).await,
                Err(e) => {
                    self.respond_error(
                        id,
                        JSONRPCErrorError {
                            code: mcp_types::INTERNAL_ERROR_CODE,
                            message: format!("failed to serialize handler result: {e}"),
                            data: None,
                        },
                    )
                    .await;
                }
            },
            Err(error) => self.respond_error(id, error).await,
        }
    }

    async fn respond_result(&self, id: RequestId, result: serde_json::Value) {
        let _ = self
            .outgoing_tx
            .send(JSONRPCMessage::Response(JSONRPCResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id,
                result,
            }))
            .await;
    }

    async fn respond_error(&self, id: RequestId, error: JSONRPCErrorError) {
        let _ = self
            .outgoing_tx
            .send(JSONRPCMessage::Error(JSONRPCError {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id,
                error,
            }))
            .await;
    }

    async fn respond_method_not_found(&self, id: RequestId, method: &str) {
        self.respond_error(
            id,
            JSONRPCErrorError {
                code: METHOD_NOT_FOUND_ERROR_CODE,
                message: format!("method not found: {method}"),
                data: None,
            },
        )
        .await;
    }
}

/// Environment the spawned server starts from. Everything else in the
/// host's environment is withheld: servers should see a small, predictable
/// environment rather than whatever the embedding process happens to carry,
/// and the MCP debugging docs note that hosts pass through only a basic
/// subset along these lines.
#[cfg(unix)]
const INHERITED_ENV_VARS: &[&str] = &[
    // Identity and shell basics.
    "HOME",
    "LOGNAME",
    "SHELL",
    "USER",
    "__CF_USER_TEXT_ENCODING",
    // Program lookup.
    "PATH",
    // Locale, terminal, and scratch space, which well-behaved CLI servers
    // consult.
    "LANG",
    "LC_ALL",
    "TERM",
    "TMPDIR",
    "TZ",
];

#[cfg(windows)]
const INHERITED_ENV_VARS: &[&str] = &[
    "PATH",
    "PATHEXT",
    "USERNAME",
    "USERDOMAIN",
    "USERPROFILE",
    "TEMP",
    "TMP",
];

/// The allow-listed variables that are actually set, with `extra_env` (the
/// host's per-server configuration) layered on top so it can override any
/// inherited value.
fn spawn_environment(extra_env: Option<HashMap<String, String>>) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for name in INHERITED_ENV_VARS {
        if let Ok(value) = std::env::var(name) {
            env.insert((*name).to_string(), value);
        }
    }
    env.extend(extra_env.unwrap_or_default());
    env
}
