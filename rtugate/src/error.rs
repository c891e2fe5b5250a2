//! High-level error types

use rtugate_core::Status;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Frame error: {0}")]
    Core(#[from] rtugate_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] rtugate_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] rtugate_types::Error),

    /// Response is well formed but does not answer the request that was sent
    #[error("Response does not match request: {0}")]
    ContextMismatch(String),

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Transaction status carried by this error
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Core(e) => e.status(),
            Self::Transport(e) => e.status(),
            Self::ContextMismatch(_) => Some(Status::ContextMismatch),
            Self::InvalidResponse(_) => Some(Status::LengthMismatch),
            _ => None,
        }
    }

    /// Device exception code, if the device rejected the request
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Transport(e) => e.exception_code(),
            _ => None,
        }
    }

    /// Local failure that a retry might fix
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_recoverable(),
            Self::Core(rtugate_core::Error::CrcMismatch { .. }) => true,
            Self::ContextMismatch(_) | Self::InvalidResponse(_) => true,
            _ => false,
        }
    }

    /// Check if the connection this error occurred on is unusable
    pub fn requires_disconnect(&self) -> bool {
        match self {
            Self::Transport(e) => e.requires_reconnect(),
            _ => false,
        }
    }
}
