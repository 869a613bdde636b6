use std::time::Duration;

use thiserror::Error;

use crate::session::{RequestId, SessionState};

/// Failures surfaced by [`crate::EngineSession`]. All of them are reported to
/// the caller; none is fatal to the session except `SessionClosed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("engine is busy with another request")]
    EngineBusy,

    #[error("engine session is not ready (state: {0})")]
    NotReady(SessionState),

    #[error("engine session is closed")]
    SessionClosed,

    #[error("request {request_id} timed out after {after:?}")]
    EngineTimeout { request_id: RequestId, after: Duration },

    #[error("search was stopped before a move was found")]
    Cancelled,

    #[error("engine reported no legal move")]
    NoBestMove,

    #[error("no search in progress")]
    NotBusy,

    #[error("engine did not complete the handshake within {0:?}")]
    HandshakeTimeout(Duration),
}
