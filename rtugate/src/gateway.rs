//! Serial-to-TCP bypass gateway
//!
//! TCP clients share one [`Master`] on the RTU bus. Each request PDU is
//! forwarded verbatim; the bus lock orders requests from all connections.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, trace};

use rtugate_transport::RtuTransport;

use crate::{
    config::GatewayConfig,
    error::{Error, Result},
    master::Master,
    server::{RequestHandler, Server},
};

/// Request handler forwarding PDUs onto the bus
pub struct Bypass {
    master: Arc<Master>,
}

impl Bypass {
    pub fn new(master: Arc<Master>) -> Self {
        Self { master }
    }

    pub fn master(&self) -> &Arc<Master> {
        &self.master
    }
}

#[async_trait]
impl RequestHandler for Bypass {
    async fn handle(&self, unit_id: u8, pdu: &[u8]) -> Result<Bytes> {
        trace!(unit_id, len = pdu.len(), "Bypass request");
        self.master.bypass(unit_id, pdu).await
    }
}

/// Open the serial bus and bind the TCP listener
///
/// Fails if the configuration is invalid, the serial port cannot be opened
/// or the listen address cannot be bound.
pub async fn bind(config: &GatewayConfig) -> Result<Server<Bypass>> {
    config.validate()?;

    let transport = RtuTransport::open(config.serial_port.clone(), config.rtu.clone())
        .map_err(|e| Error::Config(format!("serial port {}: {}", config.serial_port, e)))?;

    info!(
        port = %config.serial_port,
        baud = config.rtu.baud_rate,
        "Serial bus open"
    );

    let master = Master::new(Arc::new(transport)).with_timeout(config.response_timeout);

    Ok(Server::bind(config.listen, Arc::new(Bypass::new(Arc::new(master))))
        .await?
        .with_framing(config.tcp_framing))
}
