//! Error types for rtugate-core

use crate::status::Status;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Frame codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Frame is too short to hold its envelope and a function code
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort {
        expected: usize,
        actual: usize,
    },

    /// Frame or PDU exceeds the protocol maximum
    #[error("Frame too large: {size} bytes (max: {max} bytes)")]
    FrameTooLarge {
        size: usize,
        max: usize,
    },

    /// CRC residue over the received frame is not zero
    #[error("CRC mismatch: residue 0x{residue:04X}")]
    CrcMismatch {
        residue: u16,
    },

    /// MBAP length field disagrees with the bytes that follow it
    #[error("Length mismatch: header declares {declared} bytes, frame carries {actual} bytes")]
    LengthMismatch {
        declared: usize,
        actual: usize,
    },

    /// MBAP protocol identifier is not Modbus (0)
    #[error("Invalid protocol ID: {0}")]
    InvalidProtocolId(u16),

    /// Context belongs to the other transport kind
    #[error("Context mismatch: {0} context used with {1} framing")]
    ContextMismatch(&'static str, &'static str),

    /// Unknown function code
    #[error("Unknown function code: 0x{0:02X}")]
    UnknownFunction(u8),
}

impl Error {
    /// Check if error is a violation of the framing protocol
    ///
    /// Violations are fatal for the frame they were found in; the peer
    /// should not be asked to repeat the same bytes.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::LengthMismatch { .. }
                | Self::InvalidProtocolId(_)
                | Self::FrameTooShort { .. }
                | Self::FrameTooLarge { .. }
        )
    }

    /// Map to the transaction status reported to callers
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::CrcMismatch { .. } => Some(Status::CrcError),
            Self::FrameTooShort { .. }
            | Self::FrameTooLarge { .. }
            | Self::LengthMismatch { .. } => Some(Status::LengthMismatch),
            Self::ContextMismatch(..) | Self::InvalidProtocolId(_) => {
                Some(Status::ContextMismatch)
            }
            Self::UnknownFunction(_) => None,
        }
    }
}
