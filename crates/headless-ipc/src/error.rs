//! Control socket errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Control socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Frame length above [`crate::MAX_REQUEST_SIZE`]
    #[error("Control message exceeds {} bytes", crate::MAX_REQUEST_SIZE)]
    RequestTooLarge,

    #[error("Malformed control message: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),

    #[error("Cannot encode control message: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),

    #[error("Control request timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// Host answered with an error or something unexpected
    #[error("Host rejected request: {0}")]
    Rejected(String),

    #[error("Cannot reach host: {0}")]
    ConnectionFailed(String),

    #[error("Headless host is not running (no control socket)")]
    HostNotRunning,
}
