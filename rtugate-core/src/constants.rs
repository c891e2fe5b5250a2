//! Protocol constants

/// Unit id addressing every device on the bus; no device replies
pub const BROADCAST_UNIT_ID: u8 = 0x00;

/// Default Modbus TCP port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Serial baud rates the RTU transport accepts
pub const SUPPORTED_BAUD_RATES: [u32; 3] = [9600, 19200, 38400];

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Default quiet time between bus transactions (milliseconds)
pub const DEFAULT_POLL_DELAY_MS: u64 = 20;

/// Extra settle time added after a failed transaction (milliseconds)
pub const DEFAULT_ERROR_DELAY_MS: u64 = 200;

/// Silence that ends a frame of unknown length (milliseconds)
pub const DEFAULT_INTER_CHAR_TIMEOUT_MS: u64 = 50;

/// Default response timeout of the master (milliseconds)
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;

/// Bytes read before the RTU receiver decides how to continue
pub const RTU_FIRST_CHUNK: usize = 5;

/// Smallest RTU reply the receiver accepts (exception frame)
pub const RTU_MIN_REPLY: usize = 5;

/// Largest RTU frame
pub const RTU_MAX_FRAME: usize = 256;

/// Receive buffer used by single-read TCP framing
pub const TCP_READ_BUFFER: usize = 1024;

/// Quantity limits per request
pub mod limits {
    pub const MAX_READ_BITS: u16 = 2000;
    pub const MAX_READ_REGISTERS: u16 = 125;
    pub const MAX_WRITE_BITS: u16 = 1968;
    pub const MAX_WRITE_REGISTERS: u16 = 123;
}

/// Read device identification categories (MEI 0x0E)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadDeviceIdCode {
    Basic = 1,
    Regular = 2,
    Extended = 3,
}
