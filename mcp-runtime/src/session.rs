//! Per-session state: the capability state machine, the inflight-request
//! registry, subscriptions, and the logging threshold.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Weak;

use mcp_types::ClientCapabilities;
use mcp_types::INVALID_REQUEST_ERROR_CODE;
use mcp_types::JSONRPCErrorError;
use mcp_types::LoggingLevel;
use mcp_types::LoggingMessageNotification;
use mcp_types::LoggingMessageNotificationParams;
use mcp_types::ModelContextProtocolNotification;
use mcp_types::RequestId;
use mcp_types::SUPPORTED_PROTOCOL_VERSIONS;
use mcp_types::ServerCapabilities;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::outgoing::OutgoingSender;

/// Lifecycle of one client-server pairing.
///
/// `Failed` is a sink reachable from any state on a fatal transport or
/// protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Operational,
    Closing,
    Closed,
    Failed,
}

/// Inbound request IDs currently being dispatched, each with the token a
/// `notifications/cancelled` fires. Idempotent: cancelling an unknown or
/// completed ID is a no-op.
#[derive(Default)]
pub struct Inflight {
    map: Mutex<HashMap<RequestId, CancellationToken>>,
}

impl Inflight {
    pub async fn insert(&self, id: RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        self.map.lock().await.insert(id, token.clone());
        token
    }

    pub async fn cancel(&self, id: &RequestId) {
        if let Some(token) = self.map.lock().await.get(id) {
            token.cancel();
        }
    }

    pub async fn get(&self, id: &RequestId) -> Option<CancellationToken> {
        self.map.lock().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &RequestId) {
        self.map.lock().await.remove(id);
    }

    pub async fn cancel_all(&self) {
        let mut map = self.map.lock().await;
        for token in map.values() {
            token.cancel();
        }
        map.clear();
    }
}

/// State shared between the dispatch loop, running handlers, and the
/// cross-session fan-out. Handlers reach it through a [`SessionHandle`]
/// (a weak reference), never by owning it, so a handler outliving its
/// session cannot keep the session alive.
pub struct Session {
    session_id: String,
    outgoing: OutgoingSender,
    state: Mutex<SessionState>,
    inflight: Inflight,
    log_threshold: Mutex<LoggingLevel>,
    subscriptions: Mutex<HashSet<String>>,
    peer_capabilities: Mutex<Option<ClientCapabilities>>,
    negotiated_version: Mutex<Option<String>>,
}

impl Session {
    pub fn new(session_id: String, outgoing: OutgoingSender) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            outgoing,
            state: Mutex::new(SessionState::Uninitialized),
            inflight: Inflight::default(),
            log_threshold: Mutex::new(LoggingLevel::Info),
            subscriptions: Mutex::new(HashSet::new()),
            peer_capabilities: Mutex::new(None),
            negotiated_version: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn outgoing(&self) -> &OutgoingSender {
        &self.outgoing
    }

    pub fn inflight(&self) -> &Inflight {
        &self.inflight
    }

    pub fn handle(self: &Arc<Self>) -> SessionHandle {
        SessionHandle {
            inner: Arc::downgrade(self),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub async fn set_state(&self, state: SessionState) {
        *self.state.lock().await = state;
    }

    /// `initialize` received. Validates the requested protocol version and
    /// moves `Uninitialized -> Initializing`; on any failure the state is
    /// left untouched and the returned error goes on the wire.
    pub async fn begin_initialize(
        &self,
        params: &mcp_types::InitializeRequestParams,
    ) -> Result<String, JSONRPCErrorError> {
        let mut state = self.state.lock().await;
        if *state != SessionState::Uninitialized {
            return Err(JSONRPCErrorError {
                code: INVALID_REQUEST_ERROR_CODE,
                message: "initialize called more than once".to_string(),
                data: None,
            });
        }

        let requested = params.protocol_version.as_str();
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&requested) {
            return Err(JSONRPCErrorError {
                code: INVALID_REQUEST_ERROR_CODE,
                message: format!("unsupported protocol version: {requested}"),
                data: Some(json!({ "supported": SUPPORTED_PROTOCOL_VERSIONS })),
            });
        }

        *state = SessionState::Initializing;
        drop(state);

        *self.peer_capabilities.lock().await = Some(params.capabilities.clone());
        *self.negotiated_version.lock().await = Some(requested.to_string());
        Ok(requested.to_string())
    }

    /// `notifications/initialized` received.
    pub async fn mark_initialized(&self) {
        let mut state = self.state.lock().await;
        match *state {
            SessionState::Initializing => *state = SessionState::Operational,
            other => warn!("ignoring notifications/initialized in state {other:?}"),
        }
    }

    pub async fn peer_capabilities(&self) -> Option<ClientCapabilities> {
        self.peer_capabilities.lock().await.clone()
    }

    pub async fn negotiated_version(&self) -> Option<String> {
        self.negotiated_version.lock().await.clone()
    }

    /// Orderly teardown: every inflight handler is cancelled and every
    /// pending outbound caller observes `SessionClosed`. Subscriptions die
    /// with the session, without notification.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            if matches!(*state, SessionState::Closed | SessionState::Failed) {
                return;
            }
            *state = SessionState::Closing;
        }
        self.inflight.cancel_all().await;
        self.outgoing.fail_all_pending().await;
        self.subscriptions.lock().await.clear();
        *self.state.lock().await = SessionState::Closed;
    }

    /// Fatal transport or protocol error: like [`Session::close`] but the
    /// session lands in `Failed`.
    pub async fn fail(&self) {
        self.inflight.cancel_all().await;
        self.outgoing.fail_all_pending().await;
        self.subscriptions.lock().await.clear();
        *self.state.lock().await = SessionState::Failed;
    }

    // ----- subscriptions -------------------------------------------------

    pub async fn subscribe(&self, uri: String) {
        self.subscriptions.lock().await.insert(uri);
    }

    pub async fn unsubscribe(&self, uri: &str) {
        self.subscriptions.lock().await.remove(uri);
    }

    pub async fn is_subscribed(&self, uri: &str) -> bool {
        self.subscriptions.lock().await.contains(uri)
    }

    // ----- logging -------------------------------------------------------

    pub async fn set_log_threshold(&self, level: LoggingLevel) {
        *self.log_threshold.lock().await = level;
    }

    pub async fn log_threshold(&self) -> LoggingLevel {
        *self.log_threshold.lock().await
    }

    /// Emit a `notifications/message` unless `level` is below the session's
    /// threshold, in which case it is dropped at the source.
    pub async fn log(&self, level: LoggingLevel, logger: Option<String>, data: Value) {
        if level < self.log_threshold().await {
            return;
        }
        let params = LoggingMessageNotificationParams {
            level,
            logger,
            data,
        };
        match serde_json::to_value(&params) {
            Ok(params) => {
                self.outgoing
                    .send_notification(LoggingMessageNotification::METHOD, Some(params))
                    .await;
            }
            Err(err) => warn!("failed to serialize log notification: {err}"),
        }
    }
}

/// Weak back-reference handed to handler contexts. Upgrading fails once the
/// session is gone, which is exactly when a handler should stop emitting.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Weak<Session>,
}

impl SessionHandle {
    pub fn upgrade(&self) -> Option<Arc<Session>> {
        self.inner.upgrade()
    }
}

/// Does the negotiated capability set cover `method`? Called only in
/// `Operational`; a `false` answer surfaces as `-32601`.
pub fn method_covered(method: &str, caps: &ServerCapabilities) -> bool {
    match method {
        "initialize" | "ping" => true,
        "tools/list" | "tools/call" => caps.tools.is_some(),
        "resources/list" | "resources/read" | "resources/templates/list" => {
            caps.resources.is_some()
        }
        "resources/subscribe" | "resources/unsubscribe" => caps
            .resources
            .as_ref()
            .is_some_and(|r| r.subscribe == Some(true)),
        "prompts/list" | "prompts/get" => caps.prompts.is_some(),
        "completion/complete" => caps.completions.is_some(),
        "logging/setLevel" => caps.logging.is_some(),
        "tasks/list" | "tasks/get" | "tasks/cancel" => caps.tasks.is_some(),
        _ => false,
    }
}
