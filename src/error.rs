use crate::frame::FrameError;
use thiserror::Error;

/// Errors surfaced by [`crate::endpoint::Endpoint`] operations.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("call timed out waiting for a reply")]
    Timeout,

    #[error("endpoint is closed")]
    EndpointClosed,

    #[error("endpoint has not started serving yet")]
    NotRunning,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Framing(#[from] FrameError),

    #[error("no handler registered for protocol id {0}")]
    UnknownProtocol(i32),

    #[error("protocol id {0} is already registered")]
    RegistrationConflict(i32),

    #[error("remote returned an error: {0}")]
    Remote(String),
}

pub type RpcResult<T> = std::result::Result<T, RpcError>;
