//! Transaction status codes
//!
//! A transaction either succeeds (`0`), fails locally (negative codes), or is
//! rejected by the device with an exception code (`1..=255`, echoed verbatim).

use std::fmt;

use crate::function::ExceptionCode;

/// Outcome of one request/response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Response received and well formed
    Success,

    /// No (complete) response within the timeout
    Timeout,

    /// Response failed the CRC check
    CrcError,

    /// Response length outside the protocol bounds
    LengthMismatch,

    /// Response does not belong to the request that was sent
    ContextMismatch,

    /// Device exception code
    Exception(u8),
}

impl Status {
    pub const SUCCESS: i32 = 0;
    pub const TIMEOUT: i32 = -1;
    pub const CRC_ERROR: i32 = -2;
    pub const LENGTH_MISMATCH: i32 = -3;
    pub const CONTEXT_MISMATCH: i32 = -4;

    /// Integer status code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => Self::SUCCESS,
            Self::Timeout => Self::TIMEOUT,
            Self::CrcError => Self::CRC_ERROR,
            Self::LengthMismatch => Self::LENGTH_MISMATCH,
            Self::ContextMismatch => Self::CONTEXT_MISMATCH,
            Self::Exception(code) => code as i32,
        }
    }

    /// Parse an integer status code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            Self::SUCCESS => Some(Self::Success),
            Self::TIMEOUT => Some(Self::Timeout),
            Self::CRC_ERROR => Some(Self::CrcError),
            Self::LENGTH_MISMATCH => Some(Self::LengthMismatch),
            Self::CONTEXT_MISMATCH => Some(Self::ContextMismatch),
            1..=255 => Some(Self::Exception(code as u8)),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Local failure; the caller may retry
    pub fn is_local_failure(self) -> bool {
        self.code() < 0
    }

    /// Authoritative rejection by the device; retrying unchanged is pointless
    pub fn is_exception(self) -> bool {
        matches!(self, Self::Exception(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Timeout => write!(f, "timeout"),
            Self::CrcError => write!(f, "CRC error"),
            Self::LengthMismatch => write!(f, "length mismatch"),
            Self::ContextMismatch => write!(f, "context mismatch"),
            Self::Exception(code) => {
                write!(f, "exception 0x{:02X} ({})", code, ExceptionCode::describe(*code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Success.code(), 0);
        assert_eq!(Status::Timeout.code(), -1);
        assert_eq!(Status::CrcError.code(), -2);
        assert_eq!(Status::LengthMismatch.code(), -3);
        assert_eq!(Status::ContextMismatch.code(), -4);
        assert_eq!(Status::Exception(2).code(), 2);
    }

    #[test]
    fn test_status_from_code() {
        assert_eq!(Status::from_code(-2), Some(Status::CrcError));
        assert_eq!(Status::from_code(255), Some(Status::Exception(255)));
        assert_eq!(Status::from_code(256), None);
        assert_eq!(Status::from_code(-9), None);
    }

    #[test]
    fn test_status_classes() {
        assert!(Status::Timeout.is_local_failure());
        assert!(!Status::Timeout.is_exception());
        assert!(Status::Exception(4).is_exception());
        assert!(!Status::Exception(4).is_local_failure());
        assert!(!Status::Success.is_local_failure());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            Status::Exception(2).to_string(),
            "exception 0x02 (illegal data address)"
        );
    }
}
