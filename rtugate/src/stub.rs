//! Echo-stub slave for exercising TCP clients without a bus

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use rtugate_core::{
    constants::limits::MAX_READ_REGISTERS,
    function::EXCEPTION_FLAG,
    ExceptionCode, FunctionCode,
};

use crate::{error::Result, server::RequestHandler};

/// Answers register reads with zeros and everything else with
/// "illegal data address"
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoStub;

impl EchoStub {
    /// Response PDU for a request PDU
    pub fn respond(pdu: &[u8]) -> Bytes {
        let function = pdu.first().copied().unwrap_or_default();

        let quantity = pdu
            .get(3..5)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .filter(|q| (1..=MAX_READ_REGISTERS).contains(q));

        match (FunctionCode::try_from(function), quantity) {
            (Ok(FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters), Some(quantity)) => {
                let count = quantity as usize * 2;
                let mut response = BytesMut::with_capacity(2 + count);
                response.put_u8(function);
                response.put_u8(count as u8);
                response.put_bytes(0, count);
                response.freeze()
            }
            _ => Bytes::copy_from_slice(&[
                function | EXCEPTION_FLAG,
                ExceptionCode::IllegalDataAddress as u8,
            ]),
        }
    }
}

#[async_trait]
impl RequestHandler for EchoStub {
    async fn handle(&self, unit_id: u8, pdu: &[u8]) -> Result<Bytes> {
        let response = Self::respond(pdu);
        trace!(unit_id, request = ?pdu, response = ?&response[..], "Stub reply");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_register_read() {
        let response = EchoStub::respond(&[0x03, 0x00, 0x6B, 0x00, 0x03]);
        assert_eq!(&response[..], &[0x03, 0x06, 0, 0, 0, 0, 0, 0]);

        let response = EchoStub::respond(&[0x04, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&response[..], &[0x04, 0x02, 0, 0]);
    }

    #[test]
    fn test_other_functions_rejected() {
        assert_eq!(
            &EchoStub::respond(&[0x06, 0x00, 0x01, 0x00, 0x03])[..],
            &[0x86, 0x02]
        );
        assert_eq!(&EchoStub::respond(&[0x2B, 0x0E])[..], &[0xAB, 0x02]);
    }

    #[test]
    fn test_bad_quantity_rejected() {
        assert_eq!(
            &EchoStub::respond(&[0x03, 0x00, 0x00, 0x00, 0x7E])[..],
            &[0x83, 0x02]
        );
        assert_eq!(&EchoStub::respond(&[0x03, 0x00])[..], &[0x83, 0x02]);
    }
}
