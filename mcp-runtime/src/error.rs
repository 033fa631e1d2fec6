use mcp_types::INTERNAL_ERROR_CODE;
use mcp_types::INVALID_PARAMS_ERROR_CODE;
use mcp_types::JSONRPCErrorError;
use thiserror::Error;

/// Failure of an outbound request, surfaced to the local caller. None of
/// these reach the wire: a cancelled request simply never gets a response
/// envelope, and transport failures show up at the peer as a dropped
/// connection.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Local cancellation (explicit token or timeout elapse).
    #[error("request was cancelled")]
    Cancelled,

    /// The session shut down before the peer replied.
    #[error("session closed before a reply was received")]
    SessionClosed,

    /// The peer answered with a JSON-RPC error envelope.
    #[error("peer returned JSON-RPC error: code = {}, message = {}", .0.code, .0.message)]
    Rpc(JSONRPCErrorError),

    /// The outbound queue is gone; the writer task has exited.
    #[error("failed to enqueue outgoing message: channel closed")]
    ChannelClosed,

    #[error("failed to serialize request params: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Error returned by a registered handler. Converted to a JSON-RPC error
/// envelope at the dispatch boundary.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Internal(String),

    /// Full control over the wire error for handlers that need it.
    #[error("handler error: code = {}, message = {}", .0.code, .0.message)]
    Rpc(JSONRPCErrorError),
}

impl HandlerError {
    pub fn into_error_object(self) -> JSONRPCErrorError {
        match self {
            HandlerError::InvalidParams(message) => JSONRPCErrorError {
                code: INVALID_PARAMS_ERROR_CODE,
                message,
                data: None,
            },
            HandlerError::Internal(message) => JSONRPCErrorError {
                code: INTERNAL_ERROR_CODE,
                message,
                data: None,
            },
            HandlerError::Rpc(error) => error,
        }
    }
}
