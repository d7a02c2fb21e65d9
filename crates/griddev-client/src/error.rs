//! Errors surfaced to callers of the client library.

use griddev_core::{Opcode, ProtocolError};
use thiserror::Error;

use crate::application::dispatch_worker::TransportError;
use crate::infrastructure::supervisor::SupervisorError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered `SERVER_ERROR` for a result-bearing call.
    #[error("grid server reported an error for {0:?}")]
    Communication(Opcode),

    /// The server could not be reached even after restarting it.
    #[error("grid server unreachable while sending {opcode:?}: {source}")]
    Unreachable {
        opcode: Opcode,
        #[source]
        source: TransportError,
    },

    /// The HTTP client could not be created.
    #[error("failed to set up the HTTP transport: {0}")]
    TransportSetup(#[source] TransportError),

    /// A request was submitted with the wrong calling convention for its
    /// opcode, or without an opcode at all.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The dispatch worker has stopped; no further requests can be sent.
    #[error("dispatch worker is no longer running")]
    WorkerStopped,

    /// CREATE_IMAGE was refused because the server cannot render the format.
    #[error("image format {0:?} is not supported by the grid server")]
    NotSupportedImageFormat(String),

    /// The device closed but reported a problem (for example a failed write).
    #[error("device close failed: {0}")]
    DeviceClose(String),

    /// The reply payload did not match the opcode's layout.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server process could not be located or started.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}
