//! Outbound half of a session: envelope construction, the pending-request
//! registry, and the exclusive-writer queue feeding the transport.

use std::collections::HashMap;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use mcp_types::CancelledNotification;
use mcp_types::CancelledNotificationParams;
use mcp_types::INTERNAL_ERROR_CODE;
use mcp_types::JSONRPC_VERSION;
use mcp_types::JSONRPCError;
use mcp_types::JSONRPCErrorError;
use mcp_types::JSONRPCMessage;
use mcp_types::JSONRPCNotification;
use mcp_types::JSONRPCRequest;
use mcp_types::JSONRPCResponse;
use mcp_types::ModelContextProtocolNotification;
use mcp_types::ProgressToken;
use mcp_types::RequestId;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::RequestError;

/// How deep the per-transport outbound queue is. One envelope is fully
/// written before the next begins, so this bounds memory, not framing.
pub const OUTGOING_CHANNEL_CAPACITY: usize = 128;

type PendingReply = std::result::Result<Value, JSONRPCErrorError>;

/// Options for a single outbound request.
#[derive(Default)]
pub struct RequestOptions {
    /// Cancelling this token abandons the request: the pending slot is
    /// removed, `notifications/cancelled` is emitted, and the caller gets
    /// [`RequestError::Cancelled`]. A late reply from the peer is discarded.
    pub cancel: Option<CancellationToken>,
    /// Elapsing behaves exactly like cancellation.
    pub timeout: Option<Duration>,
    /// When set, injected into `params._meta.progressToken` so the peer can
    /// correlate progress notifications with this request.
    pub progress_token: Option<ProgressToken>,
}

/// Sends messages to the peer and manages request callbacks.
///
/// Request IDs are allocated from a monotonically increasing counter and are
/// never recycled for the lifetime of the session.
pub struct OutgoingSender {
    next_request_id: AtomicI64,
    sender: mpsc::Sender<JSONRPCMessage>,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<PendingReply>>>,
    dropped_notifications: AtomicU64,
}

impl OutgoingSender {
    pub fn new(sender: mpsc::Sender<JSONRPCMessage>) -> Self {
        Self {
            next_request_id: AtomicI64::new(0),
            sender,
            pending: Mutex::new(HashMap::new()),
            dropped_notifications: AtomicU64::new(0),
        }
    }

    /// Send a request and await the peer's reply.
    ///
    /// Exactly one of three things happens: the matched reply is returned,
    /// the caller's cancellation (or timeout) wins and `Cancelled` is
    /// returned, or the session shuts down and `SessionClosed` is returned.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> std::result::Result<Value, RequestError> {
        let params = match options.progress_token {
            Some(token) => Some(inject_progress_token(params, &token)?),
            None => params,
        };

        let id = RequestId::Integer(self.next_request_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        let request = JSONRPCMessage::Request(JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.into(),
            id: id.clone(),
            method: method.to_string(),
            params,
        });
        if self.sender.send(request).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(RequestError::ChannelClosed);
        }

        let cancel = options.cancel.unwrap_or_default();
        let deadline = async {
            match options.timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                self.abandon(id, Some("request cancelled by caller".to_string())).await;
                Err(RequestError::Cancelled)
            }
            _ = deadline => {
                self.abandon(id, Some("request timed out".to_string())).await;
                Err(RequestError::Cancelled)
            }
            reply = rx => match reply {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(error)) => Err(RequestError::Rpc(error)),
                Err(_) => Err(RequestError::SessionClosed),
            }
        }
    }

    /// Remove the pending slot and tell the peer to stop working on `id`.
    async fn abandon(&self, id: RequestId, reason: Option<String>) {
        self.pending.lock().await.remove(&id);
        let params = CancelledNotificationParams {
            request_id: id,
            reason,
        };
        match serde_json::to_value(&params) {
            Ok(params) => {
                self.send_notification(CancelledNotification::METHOD, Some(params))
                    .await;
            }
            Err(err) => warn!("failed to serialize cancelled notification: {err}"),
        }
    }

    /// Route an inbound reply to the caller awaiting it. Replies for unknown
    /// IDs (already cancelled, or never ours) are dropped with a warning.
    pub async fn notify_reply(&self, id: RequestId, reply: std::result::Result<Value, JSONRPCErrorError>) {
        let entry = {
            let mut pending = self.pending.lock().await;
            pending.remove_entry(&id)
        };

        match entry {
            Some((id, sender)) => {
                if sender.send(reply).is_err() {
                    warn!("caller for request {id} went away before the reply arrived");
                }
            }
            None => {
                warn!("no pending request found for reply to {id}");
            }
        }
    }

    /// Drop every pending slot. Awaiting callers observe `SessionClosed`.
    pub async fn fail_all_pending(&self) {
        self.pending.lock().await.clear();
    }

    pub async fn send_response<T: Serialize>(&self, id: RequestId, response: T) {
        match serde_json::to_value(response) {
            Ok(result) => {
                let message = JSONRPCMessage::Response(JSONRPCResponse {
                    jsonrpc: JSONRPC_VERSION.into(),
                    id,
                    result,
                });
                let _ = self.sender.send(message).await;
            }
            Err(err) => {
                self.send_error(
                    id,
                    JSONRPCErrorError {
                        code: INTERNAL_ERROR_CODE,
                        message: format!("failed to serialize response: {err}"),
                        data: None,
                    },
                )
                .await;
            }
        }
    }

    pub async fn send_error(&self, id: RequestId, error: JSONRPCErrorError) {
        let message = JSONRPCMessage::Error(JSONRPCError {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            error,
        });
        let _ = self.sender.send(message).await;
    }

    pub async fn send_notification(&self, method: &str, params: Option<Value>) {
        let message = notification_message(method, params);
        let _ = self.sender.send(message).await;
    }

    /// Non-blocking enqueue for notifications that are allowed to be shed
    /// under backpressure (progress, subscription fan-out). Returns `false`
    /// and bumps the drop counter when the queue is saturated.
    pub fn try_send_notification(&self, method: &str, params: Option<Value>) -> bool {
        let message = notification_message(method, params);
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(_) => {
                self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Notifications shed so far because the outbound queue was full.
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }
}

fn notification_message(method: &str, params: Option<Value>) -> JSONRPCMessage {
    JSONRPCMessage::Notification(JSONRPCNotification {
        jsonrpc: JSONRPC_VERSION.into(),
        method: method.to_string(),
        params,
    })
}

fn inject_progress_token(
    params: Option<Value>,
    token: &ProgressToken,
) -> std::result::Result<Value, RequestError> {
    let mut params = match params {
        Some(Value::Object(map)) => Value::Object(map),
        None => Value::Object(serde_json::Map::new()),
        Some(other) => return Ok(other),
    };
    if let Value::Object(map) = &mut params {
        let meta = map
            .entry("_meta")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(meta) = meta {
            meta.insert("progressToken".to_string(), serde_json::to_value(token)?);
        }
    }
    Ok(params)
}
