//! Streamable HTTP transport.
//!
//! One mountable endpoint accepts `POST` (client envelopes, single or
//! batch), `GET` (the session's server-initiated event stream), and
//! `DELETE` (explicit session termination). Sessions are minted on
//! `initialize` and identified by the `Mcp-Session-Id` header; every SSE
//! event carries a session-monotonic ID, and `Last-Event-ID` resumes from
//! the per-session replay ring.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::ACCEPT;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::routing::post;
use futures::StreamExt;
use futures::stream;
use mcp_runtime::OutgoingSender;
use mcp_runtime::Session;
use mcp_runtime::outgoing::OUTGOING_CHANNEL_CAPACITY;
use mcp_types::INVALID_REQUEST_ERROR_CODE;
use mcp_types::JSONRPC_VERSION;
use mcp_types::JSONRPCMessage;
use mcp_types::PARSE_ERROR_CODE;
use mcp_types::RequestId;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::McpServer;
use crate::message_processor::MessageProcessor;
use crate::replay_buffer::Replay;
use crate::replay_buffer::ReplayBuffer;

pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Upper bound on how long a POST waits for its request's response before
/// giving up with 504. Cancelled requests do not wait this long; they
/// resolve as soon as the cancellation is observed.
const POST_RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared state across all HTTP request handlers.
#[derive(Clone)]
pub struct HttpState {
    server: McpServer,
    channels: Arc<Mutex<HashMap<String, Arc<HttpChannel>>>>,
}

/// Everything attached to one HTTP session: its protocol session and
/// processor, the pending map routing responses back to held POSTs, the
/// replay ring, and the live broadcast feeding connected GET streams.
struct HttpChannel {
    processor: Arc<MessageProcessor>,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<JSONRPCMessage>>>,
    replay: Mutex<ReplayBuffer>,
    live: broadcast::Sender<(u64, String)>,
    /// Stops the outgoing-router task when the session is terminated.
    shutdown: CancellationToken,
}

impl HttpChannel {
    fn session(&self) -> &Arc<Session> {
        self.processor.session()
    }
}

/// Build the axum [`Router`] serving the MCP endpoint at `path`.
pub fn build_router(server: McpServer, path: &str) -> Router {
    let state = HttpState {
        server,
        channels: Arc::new(Mutex::new(HashMap::new())),
    };
    Router::new()
        .route(
            path,
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .with_state(state)
}

impl HttpState {
    /// Mint a session: a fresh protocol session wired to a router task that
    /// splits the outgoing stream between held POSTs and the SSE ring.
    async fn create_channel(&self) -> (String, Arc<HttpChannel>) {
        let session_id = Uuid::new_v4().to_string();
        let (outgoing_tx, mut outgoing_rx) =
            mpsc::channel::<JSONRPCMessage>(OUTGOING_CHANNEL_CAPACITY);
        let session = Session::new(session_id.clone(), OutgoingSender::new(outgoing_tx));
        let processor = Arc::new(MessageProcessor::new(
            session.clone(),
            self.server.registry(),
            self.server.tasks().clone(),
            self.server.config(),
        ));
        self.server.session_manager().register(session).await;

        let (live, _) = broadcast::channel(OUTGOING_CHANNEL_CAPACITY);
        let channel = Arc::new(HttpChannel {
            processor,
            pending: Mutex::new(HashMap::new()),
            replay: Mutex::new(ReplayBuffer::new(self.server.config().replay_buffer_size)),
            live,
            shutdown: CancellationToken::new(),
        });

        // Outgoing router: responses matching a held POST go back on that
        // POST; everything else becomes an SSE event with a replay slot.
        // The shutdown token matters: the router holds the channel (and
        // through it the session's sender), so it would otherwise never see
        // the stream end.
        let router_channel = channel.clone();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = router_channel.shutdown.cancelled() => break,
                    message = outgoing_rx.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                };
                let reply_id = match &message {
                    JSONRPCMessage::Response(r) => Some(r.id.clone()),
                    JSONRPCMessage::Error(e) => Some(e.id.clone()),
                    _ => None,
                };
                if let Some(id) = reply_id {
                    let slot = router_channel.pending.lock().await.remove(&id);
                    if let Some(slot) = slot {
                        let _ = slot.send(message);
                        continue;
                    }
                }
                match serde_json::to_string(&message) {
                    Ok(payload) => {
                        let mut replay = router_channel.replay.lock().await;
                        let event_id = replay.push(payload.clone());
                        let _ = router_channel.live.send((event_id, payload));
                    }
                    Err(err) => warn!("failed to serialize outgoing message: {err}"),
                }
            }
            debug!("outgoing router exited (session gone)");
        });

        self.channels
            .lock()
            .await
            .insert(session_id.clone(), channel.clone());
        (session_id, channel)
    }

    async fn channel_for(&self, headers: &HeaderMap) -> Result<Arc<HttpChannel>, Response> {
        let Some(session_id) = header_str(headers, MCP_SESSION_ID_HEADER) else {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "missing Mcp-Session-Id header",
            ));
        };
        match self.channels.lock().await.get(session_id) {
            Some(channel) => Ok(channel.clone()),
            None => Err(error_response(
                StatusCode::NOT_FOUND,
                "unknown or expired session",
            )),
        }
    }
}

/// `POST` — one envelope or a batch array.
async fn handle_post(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !accepts(&headers, "application/json") && !accepts(&headers, "text/event-stream") {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            return json_error_body(
                StatusCode::BAD_REQUEST,
                PARSE_ERROR_CODE,
                &format!("Parse error: {err}"),
            );
        }
    };

    match value {
        Value::Array(items) => handle_post_batch(state, headers, items).await,
        single => handle_post_single(state, headers, single).await,
    }
}

async fn handle_post_single(state: HttpState, headers: HeaderMap, value: Value) -> Response {
    let message: JSONRPCMessage = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(err) => {
            return json_error_body(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST_ERROR_CODE,
                &format!("Invalid request: {err}"),
            );
        }
    };

    let request_id = match &message {
        JSONRPCMessage::Request(request) => Some(request.id.clone()),
        _ => None,
    };
    let initialize_id = match &message {
        JSONRPCMessage::Request(request) if request.method == "initialize" => {
            Some(request.id.clone())
        }
        _ => None,
    };

    // `initialize` mints the session; everything else must present one.
    if let Some(id) = initialize_id {
        let (session_id, channel) = state.create_channel().await;
        info!("minted HTTP session {session_id}");
        return match drive_request(&channel, message, id).await {
            PostOutcome::Reply(reply) => (
                StatusCode::OK,
                [
                    ("content-type", "application/json".to_string()),
                    (MCP_SESSION_ID_HEADER, session_id),
                ],
                reply,
            )
                .into_response(),
            other => other.into_response(),
        };
    }

    let channel = match state.channel_for(&headers).await {
        Ok(channel) => channel,
        Err(response) => return response,
    };

    match request_id {
        Some(id) => {
            // SSE delivery is an explicit opt-in; `*/*` or an absent Accept
            // header gets plain JSON.
            let wants_sse = header_str(&headers, ACCEPT.as_str())
                .is_some_and(|accept| accept.contains("text/event-stream"));
            let outcome = drive_request(&channel, message, id).await;
            match outcome {
                PostOutcome::Reply(reply) if wants_sse => sse_single_event(&channel, reply).await,
                other => other.into_response(),
            }
        }
        None => {
            // Notifications and client replies have no response body.
            channel.processor.process_message(message).await;
            StatusCode::ACCEPTED.into_response()
        }
    }
}

async fn handle_post_batch(state: HttpState, headers: HeaderMap, items: Vec<Value>) -> Response {
    let channel = match state.channel_for(&headers).await {
        Ok(channel) => channel,
        Err(response) => return response,
    };

    let mut replies: Vec<Value> = Vec::new();
    for item in items {
        let message: JSONRPCMessage = match serde_json::from_value(item) {
            Ok(message) => message,
            Err(err) => {
                replies.push(json!({
                    "jsonrpc": JSONRPC_VERSION,
                    "id": null,
                    "error": {
                        "code": INVALID_REQUEST_ERROR_CODE,
                        "message": format!("Invalid request: {err}"),
                    }
                }));
                continue;
            }
        };
        let request_id = match &message {
            JSONRPCMessage::Request(request) => Some(request.id.clone()),
            _ => None,
        };
        match request_id {
            Some(id) => match drive_request(&channel, message, id).await {
                PostOutcome::Reply(reply) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&reply) {
                        replies.push(value);
                    }
                }
                // Cancelled, failed, or timed out entries are omitted.
                PostOutcome::Cancelled | PostOutcome::TimedOut | PostOutcome::Failed => {}
            },
            // Notification elements are consumed and omitted from the
            // response array entirely.
            None => channel.processor.process_message(message).await,
        }
    }

    if replies.is_empty() {
        StatusCode::ACCEPTED.into_response()
    } else {
        (
            StatusCode::OK,
            [("content-type", "application/json")],
            Value::Array(replies).to_string(),
        )
            .into_response()
    }
}

enum PostOutcome {
    Reply(String),
    Cancelled,
    TimedOut,
    Failed,
}

impl IntoResponse for PostOutcome {
    fn into_response(self) -> Response {
        match self {
            PostOutcome::Reply(reply) => (
                StatusCode::OK,
                [("content-type", "application/json")],
                reply,
            )
                .into_response(),
            // The request was cancelled; the peer is owed no envelope.
            PostOutcome::Cancelled => StatusCode::ACCEPTED.into_response(),
            PostOutcome::TimedOut => StatusCode::GATEWAY_TIMEOUT.into_response(),
            PostOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Feed one request through the processor and wait for its reply, resolving
/// early when the request's cancellation token fires (the response envelope
/// is suppressed in that case). Dropping this future — the client aborted
/// the POST — cancels only this request; the session survives.
async fn drive_request(
    channel: &Arc<HttpChannel>,
    message: JSONRPCMessage,
    id: RequestId,
) -> PostOutcome {
    let (tx, rx) = oneshot::channel();
    channel.pending.lock().await.insert(id.clone(), tx);
    channel.processor.process_message(message).await;

    let mut abort_guard = CancelOnDrop {
        session: channel.session().clone(),
        id: id.clone(),
        armed: true,
    };

    // After process_message returns the inflight entry exists (or the
    // request already failed and its reply is in the slot).
    let cancelled = async {
        match channel.session().inflight().get(&id).await {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    let outcome = tokio::select! {
        reply = rx => match reply {
            Ok(message) => match serde_json::to_string(&message) {
                Ok(payload) => PostOutcome::Reply(payload),
                Err(_) => PostOutcome::Failed,
            },
            Err(_) => PostOutcome::Cancelled,
        },
        _ = cancelled => {
            channel.pending.lock().await.remove(&id);
            PostOutcome::Cancelled
        }
        _ = tokio::time::sleep(POST_RESPONSE_TIMEOUT) => {
            channel.pending.lock().await.remove(&id);
            PostOutcome::TimedOut
        }
    };
    abort_guard.armed = false;
    outcome
}

/// Abort handling for a dropped POST: fire the request's cancellation
/// token without touching the rest of the session.
struct CancelOnDrop {
    session: Arc<Session>,
    id: RequestId,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            let session = self.session.clone();
            let id = self.id.clone();
            tokio::spawn(async move {
                session.inflight().cancel(&id).await;
            });
        }
    }
}

/// Deliver a POST reply as a one-event SSE stream with a replay-backed ID.
async fn sse_single_event(channel: &Arc<HttpChannel>, payload: String) -> Response {
    let event_id = channel.replay.lock().await.push(payload.clone());
    let stream = stream::once(async move {
        Ok::<Event, Infallible>(Event::default().id(event_id.to_string()).data(payload))
    });
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// `GET` — the session's server-initiated event stream, resumable via
/// `Last-Event-ID`.
async fn handle_get(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if !accepts(&headers, "text/event-stream") {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    let channel = match state.channel_for(&headers).await {
        Ok(channel) => channel,
        Err(response) => return response,
    };

    let last_event_id = header_str(&headers, LAST_EVENT_ID_HEADER)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    // Snapshot the replay tail and subscribe to live events under the same
    // lock, so nothing falls between replayed and live.
    let (backlog, live_rx) = {
        let replay = channel.replay.lock().await;
        let backlog = match replay.since(last_event_id) {
            Replay::Events(events) => events,
            Replay::Lost => {
                return error_response(
                    StatusCode::NOT_FOUND,
                    "requested events fell out of the replay window; reinitialize",
                );
            }
        };
        (backlog, channel.live.subscribe())
    };

    let replayed = stream::iter(backlog)
        .map(|(id, payload)| Ok::<Event, Infallible>(Event::default().id(id.to_string()).data(payload)));
    let live = BroadcastStream::new(live_rx).filter_map(|item| async move {
        match item {
            Ok((id, payload)) => {
                Some(Ok::<Event, Infallible>(Event::default().id(id.to_string()).data(payload)))
            }
            // A lagged receiver lost events; ending the stream forces the
            // client to reconnect with Last-Event-ID and use the replay path.
            Err(_) => None,
        }
    });

    Sse::new(replayed.chain(live))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// `DELETE` — explicit session termination.
async fn handle_delete(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let Some(session_id) = header_str(&headers, MCP_SESSION_ID_HEADER) else {
        return error_response(StatusCode::BAD_REQUEST, "missing Mcp-Session-Id header");
    };
    let removed = state.channels.lock().await.remove(session_id);
    match removed {
        Some(channel) => {
            state
                .server
                .session_manager()
                .remove(channel.session().session_id())
                .await;
            channel.shutdown.cancel();
            info!("terminated HTTP session {session_id}");
            StatusCode::OK.into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "unknown or expired session"),
    }
}

fn accepts(headers: &HeaderMap, content_type: &str) -> bool {
    match header_str(headers, ACCEPT.as_str()) {
        // An absent Accept header accepts everything.
        None => true,
        Some(accept) => accept.contains(content_type) || accept.contains("*/*"),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, message.to_string()).into_response()
}

fn json_error_body(status: StatusCode, code: i64, message: &str) -> Response {
    let body = json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": null,
        "error": { "code": code, "message": message },
    });
    (
        status,
        [("content-type", "application/json")],
        body.to_string(),
    )
        .into_response()
}
