//! Transport errors

use std::io;

use rtugate_core::Status;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Read timeout")]
    Timeout,

    #[error("CRC mismatch in {0}-byte reply")]
    CrcMismatch(usize),

    #[error("Length mismatch: {0} bytes")]
    LengthMismatch(usize),

    #[error("Modbus exception 0x{code:02X} for function 0x{function:02X}")]
    Exception { function: u8, code: u8 },

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Unsupported baud rate: {0}")]
    InvalidBaudRate(u32),

    #[error("Frame error: {0}")]
    Frame(#[from] rtugate_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Transaction status carried by this error, if it is a transaction outcome
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Timeout => Some(Status::Timeout),
            Self::CrcMismatch(_) => Some(Status::CrcError),
            Self::LengthMismatch(_) => Some(Status::LengthMismatch),
            Self::Exception { code, .. } => Some(Status::Exception(*code)),
            Self::Frame(e) => e.status(),
            _ => None,
        }
    }

    /// Local transport failure; retry might succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::CrcMismatch(_) | Self::LengthMismatch(_)
        )
    }

    /// Device exception code, if the device rejected the request
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Exception { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if the connection can no longer carry frames
    pub fn requires_reconnect(&self) -> bool {
        match self {
            Self::NotConnected | Self::ConnectionClosed | Self::Io(_) => true,
            Self::Frame(e) => e.is_protocol_violation(),
            _ => false,
        }
    }
}
