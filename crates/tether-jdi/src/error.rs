use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JdiError {
    /// The VM connection is gone. Every capability call after a disconnect
    /// reports this; the event queue reports it once the queued disconnect
    /// events have been drained.
    #[error("VM disconnected")]
    Disconnected,

    /// The referenced object has been garbage-collected by the target VM.
    #[error("object has been garbage collected")]
    ObjectCollected,

    #[error("thread is not suspended")]
    ThreadNotSuspended,

    /// Attach-time failure: refused connection, handshake mismatch, or the
    /// handshake deadline elapsed.
    #[error("attach failed: {0}")]
    AttachFailed(String),

    #[error("operation not implemented by this transport")]
    NotImplemented,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, JdiError>;
