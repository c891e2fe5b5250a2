//! Gateway configuration

use std::net::SocketAddr;
use std::time::Duration;

use rtugate_core::constants::{DEFAULT_RESPONSE_TIMEOUT_MS, DEFAULT_TCP_PORT};
use rtugate_transport::{RtuConfig, TcpFraming};

use crate::error::{Error, Result};

#[cfg(windows)]
const DEFAULT_SERIAL_PORT: &str = "COM1";

#[cfg(not(windows))]
const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// Bypass gateway settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Serial device of the RTU bus
    pub serial_port: String,

    /// Serial line and bus timing
    pub rtu: RtuConfig,

    /// TCP listen address
    pub listen: SocketAddr,

    /// Timeout for each bus transaction
    pub response_timeout: Duration,

    /// How request frames are delimited on client connections
    pub tcp_framing: TcpFraming,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            rtu: RtuConfig::default(),
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_TCP_PORT)),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            tcp_framing: TcpFraming::default(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.serial_port.trim().is_empty() {
            return Err(Error::Config("serial port name is empty".to_string()));
        }
        if self.response_timeout.is_zero() {
            return Err(Error::Config("response timeout must be positive".to_string()));
        }
        self.rtu
            .validate()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen.port(), 502);
        assert_eq!(config.rtu.baud_rate, 38400);
        assert_eq!(config.response_timeout, Duration::from_millis(1000));
        assert_eq!(config.tcp_framing, TcpFraming::Mbap);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let config = GatewayConfig {
            rtu: RtuConfig::default().with_baud_rate(57600),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = GatewayConfig {
            serial_port: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = GatewayConfig {
            response_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
