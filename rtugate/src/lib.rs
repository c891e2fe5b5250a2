//! # rtugate
//!
//! Modbus master for RTU and TCP transports, and a bypass gateway that
//! shares one RTU bus between many Modbus TCP clients.
//!
//! ## Features
//!
//! - Async/await API using Tokio
//! - Exclusive, paced access to the serial bus
//! - Pluggable response validation
//! - Per-connection gateway tasks serialized only by the bus lock
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtugate::{Master, RtuConfig, RtuTransport};
//!
//! #[tokio::main]
//! async fn main() -> rtugate::Result<()> {
//!     let transport = RtuTransport::open("/dev/ttyUSB0", RtuConfig::default())?;
//!     let master = Master::new(Arc::new(transport));
//!
//!     let echo = master.write_single_register(1, 0x0001, 0x0003).await?;
//!     println!("{:02X?}", echo);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod master;
pub mod server;
pub mod stub;
pub mod validate;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use gateway::Bypass;
pub use master::Master;
pub use server::{RequestHandler, Server};
pub use stub::EchoStub;
pub use validate::{ResponseValidator, Validators};

// Re-export lower layers
pub use rtugate_core::{constants::ReadDeviceIdCode, Framing, FunctionCode, Status, SwapPolicy};
pub use rtugate_transport::{RtuConfig, RtuTransport, TcpFraming, TcpTransport, Transport};
pub use rtugate_types::{DeviceClock, DeviceRecord, ProductInfo};
