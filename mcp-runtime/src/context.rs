//! Per-request context handed to handlers.

use std::sync::Arc;

use mcp_types::CreateMessageRequest;
use mcp_types::CreateMessageRequestParams;
use mcp_types::CreateMessageResult;
use mcp_types::ElicitRequest;
use mcp_types::ElicitRequestParams;
use mcp_types::ElicitResult;
use mcp_types::JSONRPCRequest;
use mcp_types::LoggingLevel;
use mcp_types::ModelContextProtocolNotification;
use mcp_types::ModelContextProtocolRequest;
use mcp_types::ProgressNotification;
use mcp_types::ProgressNotificationParams;
use mcp_types::ProgressToken;
use mcp_types::RequestId;
use serde_json::Value;
use tracing::warn;

use crate::error::RequestError;
use crate::outgoing::RequestOptions;
use crate::session::Session;
use crate::session::SessionHandle;

/// Everything a handler may need about the request it is serving: the raw
/// envelope, the owning session (weakly, so contexts cannot keep a dead
/// session alive), and a progress emitter bound to the request's
/// `_meta.progressToken` if the caller supplied one.
pub struct RequestContext {
    request_id: RequestId,
    session_id: String,
    request: JSONRPCRequest,
    session: SessionHandle,
}

impl RequestContext {
    pub fn new(request: JSONRPCRequest, session: &Arc<Session>) -> Self {
        Self {
            request_id: request.id.clone(),
            session_id: session.session_id().to_string(),
            request,
            session: session.handle(),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The undecoded envelope, unknown fields and all.
    pub fn raw_request(&self) -> &JSONRPCRequest {
        &self.request
    }

    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    /// Progress emitter for this request. Emissions are silently dropped
    /// when the caller supplied no progress token.
    pub fn progress(&self) -> ProgressEmitter {
        let token = self
            .request
            .params
            .as_ref()
            .and_then(|p| p.get("_meta"))
            .and_then(|m| m.get("progressToken"))
            .cloned()
            .and_then(|v| serde_json::from_value::<ProgressToken>(v).ok());
        ProgressEmitter {
            token,
            session: self.session.clone(),
        }
    }

    /// Ask the peer to run a model completion (`sampling/createMessage`).
    pub async fn sample(
        &self,
        params: CreateMessageRequestParams,
        options: RequestOptions,
    ) -> Result<CreateMessageResult, RequestError> {
        self.peer_request::<CreateMessageRequest>(params, options)
            .await
    }

    /// Ask the peer to collect structured input (`elicitation/create`).
    pub async fn elicit(
        &self,
        params: ElicitRequestParams,
        options: RequestOptions,
    ) -> Result<ElicitResult, RequestError> {
        self.peer_request::<ElicitRequest>(params, options).await
    }

    /// Emit a log record on the owning session, subject to its threshold.
    pub async fn log(&self, level: LoggingLevel, logger: Option<String>, data: Value) {
        if let Some(session) = self.session.upgrade() {
            session.log(level, logger, data).await;
        }
    }

    async fn peer_request<R>(
        &self,
        params: R::Params,
        options: RequestOptions,
    ) -> Result<R::Result, RequestError>
    where
        R: ModelContextProtocolRequest,
    {
        let session = self.session.upgrade().ok_or(RequestError::SessionClosed)?;
        let params = serde_json::to_value(&params)?;
        let result = session
            .outgoing()
            .request(R::METHOD, Some(params), options)
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Produces `notifications/progress` correlated with one inbound request.
///
/// Progress is the one notification class allowed to be shed under
/// backpressure, so emission never blocks.
pub struct ProgressEmitter {
    token: Option<ProgressToken>,
    session: SessionHandle,
}

impl ProgressEmitter {
    pub fn emit(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        let Some(token) = &self.token else {
            return;
        };
        let Some(session) = self.session.upgrade() else {
            return;
        };
        let params = ProgressNotificationParams {
            progress_token: token.clone(),
            progress,
            total,
            message,
        };
        match serde_json::to_value(&params) {
            Ok(params) => {
                session
                    .outgoing()
                    .try_send_notification(ProgressNotification::METHOD, Some(params));
            }
            Err(err) => warn!("failed to serialize progress notification: {err}"),
        }
    }
}
