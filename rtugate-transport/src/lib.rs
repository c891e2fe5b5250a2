//! Transport layer for Modbus
//!
//! Provides exclusive-access RTU (serial) and TCP communication behind one
//! [`Transport`] trait.

pub mod error;
pub mod rtu;
pub mod tcp;

pub use error::{Error, Result};
pub use rtu::{RtuBus, RtuConfig, RtuTransport, SerialLine};
pub use tcp::{TcpFraming, TcpTransport};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use rtugate_core::Framing;

/// Frame transport
///
/// Every operation is atomic with respect to other callers sharing the same
/// transport: an exchange holds the channel from the first transmitted byte
/// to the last received one.
#[async_trait]
pub trait Transport: Send + Sync {
    /// ADU framing spoken on this transport
    fn framing(&self) -> Framing;

    /// Send one complete ADU
    async fn transmit(&self, frame: &[u8]) -> Result<()>;

    /// Receive one ADU
    ///
    /// `timeout = None` waits indefinitely. `expected_length` is the full ADU
    /// size when known in advance, `0` otherwise.
    async fn receive(&self, timeout: Option<Duration>, expected_length: usize) -> Result<BytesMut>;

    /// Transmit a request and receive its response
    ///
    /// Returns `None` when no response is expected (broadcast).
    async fn exchange(
        &self,
        frame: &[u8],
        timeout: Option<Duration>,
        expected_length: usize,
    ) -> Result<Option<BytesMut>>;

    /// Get remote address (serial port name or socket address)
    fn remote_addr(&self) -> String;
}

/// Run `future` under an optional time limit; `None` on expiry
pub(crate) async fn within<F: Future>(limit: Option<Duration>, future: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}
