//! Modbus function and exception code definitions

use std::fmt;

use crate::error::{Error, Result};

/// Bit set in a response function code when the device rejects the request
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Check whether a response function byte signals an exception
pub fn is_exception(function: u8) -> bool {
    function & EXCEPTION_FLAG != 0
}

/// Function codes issued by the master
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    // Bit access
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    WriteSingleCoil = 0x05,
    WriteMultipleCoils = 0x0F,

    // 16-bit access
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleRegister = 0x06,
    WriteMultipleRegisters = 0x10,

    // Extensions
    EncapsulatedInterface = 0x2B,
    ReadFileRecord = 0x64,
}

impl FunctionCode {
    /// Check if this function reads from the device
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
                | Self::ReadFileRecord
        )
    }

    /// Check if this function writes to the device
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteSingleCoil
                | Self::WriteSingleRegister
                | Self::WriteMultipleCoils
                | Self::WriteMultipleRegisters
        )
    }

    /// Get function name
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadCoils => "READ_COILS",
            Self::ReadDiscreteInputs => "READ_DISCRETE_INPUTS",
            Self::ReadHoldingRegisters => "READ_HOLDING_REGISTERS",
            Self::ReadInputRegisters => "READ_INPUT_REGISTERS",
            Self::WriteSingleCoil => "WRITE_SINGLE_COIL",
            Self::WriteSingleRegister => "WRITE_SINGLE_REGISTER",
            Self::WriteMultipleCoils => "WRITE_MULTIPLE_COILS",
            Self::WriteMultipleRegisters => "WRITE_MULTIPLE_REGISTERS",
            Self::EncapsulatedInterface => "ENCAPSULATED_INTERFACE",
            Self::ReadFileRecord => "READ_FILE_RECORD",
        }
    }
}

impl From<FunctionCode> for u8 {
    fn from(function: FunctionCode) -> u8 {
        function as u8
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::ReadCoils),
            0x02 => Ok(Self::ReadDiscreteInputs),
            0x03 => Ok(Self::ReadHoldingRegisters),
            0x04 => Ok(Self::ReadInputRegisters),
            0x05 => Ok(Self::WriteSingleCoil),
            0x06 => Ok(Self::WriteSingleRegister),
            0x0F => Ok(Self::WriteMultipleCoils),
            0x10 => Ok(Self::WriteMultipleRegisters),
            0x2B => Ok(Self::EncapsulatedInterface),
            0x64 => Ok(Self::ReadFileRecord),
            _ => Err(Error::UnknownFunction(value)),
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

/// Encapsulated interface (0x2B) sub-functions
pub mod mei {
    /// Read device identification
    pub const READ_DEVICE_ID: u8 = 0x0E;

    /// Read device real-time clock (vendor)
    pub const READ_TIME: u8 = 0x0F;

    /// Write device real-time clock (vendor)
    pub const WRITE_TIME: u8 = 0x10;
}

/// Standard exception codes
///
/// Devices may answer with codes outside this set; status values keep the
/// raw byte, this type only names the well-known ones.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetFailedToRespond = 0x0B,
}

impl ExceptionCode {
    /// Look up a raw exception byte
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::ServerDeviceFailure),
            0x05 => Some(Self::Acknowledge),
            0x06 => Some(Self::ServerDeviceBusy),
            0x08 => Some(Self::MemoryParityError),
            0x0A => Some(Self::GatewayPathUnavailable),
            0x0B => Some(Self::GatewayTargetFailedToRespond),
            _ => None,
        }
    }

    /// Human readable description of a raw exception byte
    pub fn describe(code: u8) -> &'static str {
        match Self::from_code(code) {
            Some(Self::IllegalFunction) => "illegal function",
            Some(Self::IllegalDataAddress) => "illegal data address",
            Some(Self::IllegalDataValue) => "illegal data value",
            Some(Self::ServerDeviceFailure) => "server device failure",
            Some(Self::Acknowledge) => "acknowledge",
            Some(Self::ServerDeviceBusy) => "server device busy",
            Some(Self::MemoryParityError) => "memory parity error",
            Some(Self::GatewayPathUnavailable) => "gateway path unavailable",
            Some(Self::GatewayTargetFailedToRespond) => "gateway target failed to respond",
            None => "vendor specific exception",
        }
    }
}
