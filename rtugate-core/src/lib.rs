//! # rtugate-core
//!
//! Transport-independent Modbus primitives:
//! - CRC16/MODBUS
//! - ADU/PDU encapsulation for RTU and TCP framing
//! - Function codes, exception codes and transaction status
//! - Register swap policy and transaction ids

pub mod constants;
pub mod crc;
pub mod error;
pub mod frame;
pub mod function;
pub mod sequence;
pub mod status;
pub mod swap;

pub use error::{Error, Result};
pub use frame::{Context, Framing, MbapHeader, MAX_PDU_SIZE};
pub use function::{ExceptionCode, FunctionCode};
pub use sequence::TransactionIds;
pub use status::Status;
pub use swap::SwapPolicy;
