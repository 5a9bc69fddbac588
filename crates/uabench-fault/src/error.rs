use uabench_frame::{ErrorMessage, FrameError, MessageType, StatusCode};
use uabench_transport::TransportError;

use crate::registry::TransportId;

/// Errors that can occur in bench server and client operations.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The HEL/ACK exchange failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The peer answered with an ERR message.
    #[error(
        "peer sent ERR {}: {}",
        .0.status,
        .0.reason.as_deref().unwrap_or("<no reason>")
    )]
    Rejected(ErrorMessage),

    /// A message of the wrong type arrived.
    #[error("expected {expected} message, got {actual}")]
    UnexpectedMessage {
        expected: MessageType,
        actual: MessageType,
    },

    /// The peer broke the bench protocol in some other way.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;

/// The deferred queue's consumer is gone; nothing will ever run the task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("deferred queue closed; task '{0}' dropped")]
pub struct ScheduleError(pub &'static str);

/// Failures raised before a method's deferred work was scheduled.
///
/// These reach the calling client as a failed call result.
#[derive(Debug, thiserror::Error)]
pub enum MethodInvocationError {
    /// No handler is registered under the requested name.
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    /// More input arguments than the method declares.
    #[error("too many arguments (expected {expected}, got {actual})")]
    TooManyArguments { expected: usize, actual: usize },

    /// The fault could not be queued.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// The frame to inject could not be encoded.
    #[error("failed to encode fault frame: {0}")]
    Encode(#[from] FrameError),

    /// Any other handler failure.
    #[error("method failed: {0}")]
    Failed(String),
}

impl MethodInvocationError {
    /// Status code reported to the caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            MethodInvocationError::UnknownMethod(_) => StatusCode::BAD_METHOD_INVALID,
            MethodInvocationError::TooManyArguments { .. } => StatusCode::BAD_TOO_MANY_ARGUMENTS,
            MethodInvocationError::Schedule(_) => StatusCode::BAD_SERVER_HALTED,
            MethodInvocationError::Encode(_) => StatusCode::BAD_ENCODING_ERROR,
            MethodInvocationError::Failed(_) => StatusCode::BAD_INTERNAL_ERROR,
        }
    }
}

/// Failures inside a deferred task. Only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Writing to or closing a transport failed.
    #[error("{transport}: {source}")]
    Transport {
        transport: TransportId,
        source: TransportError,
    },

    /// Some transports could not be force-closed.
    #[error("failed to close {failed} of {total} transports")]
    CloseFailed { failed: usize, total: usize },
}
