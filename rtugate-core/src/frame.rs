//! ADU <-> PDU encapsulation for RTU and TCP framing

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    crc,
    error::{Error, Result},
};

/// Maximum PDU size (function code + payload)
pub const MAX_PDU_SIZE: usize = 253;

/// Transport framing
///
/// # Frame Structure
///
/// ```text
///                         ┌─────────┬──────────┬─────────────┬─────────┐
///   RTU ADU               │ Unit ID │ Function │   Data ...  │ CRC16   │
///                         │ 1 byte  │  1 byte  │   N bytes   │ 2 bytes │
///                         └─────────┴──────────┴─────────────┴─────────┘
///                                   │<───────── PDU ────────>│
/// ┌────────────┬────────────┬────────┬─────────┬──────────┬─────────────┐
/// │ Transaction│ Protocol   │ Length │ Unit ID │ Function │   Data ...  │  TCP ADU
/// │ 2 bytes BE │ 2 bytes BE │ 2 B BE │ 1 byte  │  1 byte  │   N bytes   │
/// └────────────┴────────────┴────────┴─────────┴──────────┴─────────────┘
/// ```
///
/// RTU check bytes are little-endian; every MBAP field is big-endian. The
/// MBAP length counts the unit id and the PDU.
///
/// # Examples
///
/// ```
/// use rtugate_core::Framing;
///
/// let framing = Framing::Rtu;
/// let context = framing.make_context(0x11, 0);
/// let adu = framing.encapsulate(&context, &[0x03, 0x00, 0x6B, 0x00, 0x03]).unwrap();
///
/// let pdu = framing.decapsulate(&adu).unwrap();
/// assert_eq!(&pdu[..], &[0x03, 0x00, 0x6B, 0x00, 0x03]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framing {
    Rtu,
    Tcp,
}

impl Framing {
    /// Smallest complete RTU ADU: unit id, function code, CRC
    pub const MIN_RTU_ADU: usize = 4;

    /// Largest RTU ADU
    pub const MAX_RTU_ADU: usize = 256;

    /// Smallest complete TCP ADU: header and function code
    pub const MIN_TCP_ADU: usize = MbapHeader::SIZE + 1;

    /// Largest TCP ADU
    pub const MAX_TCP_ADU: usize = MbapHeader::SIZE + MAX_PDU_SIZE;

    pub fn name(self) -> &'static str {
        match self {
            Self::Rtu => "RTU",
            Self::Tcp => "TCP",
        }
    }

    /// Build the addressing context for one transaction
    ///
    /// RTU ignores `sequence`; TCP uses it as the transaction id.
    pub fn make_context(self, unit_id: u8, sequence: u16) -> Context {
        match self {
            Self::Rtu => Context::Rtu { unit_id },
            Self::Tcp => Context::Tcp(MbapHeader::new(sequence, unit_id)),
        }
    }

    /// Wrap a PDU into a transport ADU
    ///
    /// # Errors
    ///
    /// - the context was made for the other framing
    /// - the PDU is empty or longer than [`MAX_PDU_SIZE`]
    pub fn encapsulate(self, context: &Context, pdu: &[u8]) -> Result<BytesMut> {
        if context.framing() != self {
            return Err(Error::ContextMismatch(context.framing().name(), self.name()));
        }
        if pdu.is_empty() {
            return Err(Error::FrameTooShort {
                expected: 1,
                actual: 0,
            });
        }
        if pdu.len() > MAX_PDU_SIZE {
            return Err(Error::FrameTooLarge {
                size: pdu.len(),
                max: MAX_PDU_SIZE,
            });
        }

        match context {
            Context::Rtu { unit_id } => {
                let mut buf = BytesMut::with_capacity(pdu.len() + 3);
                buf.put_u8(*unit_id);
                buf.put_slice(pdu);
                crc::append(&mut buf);
                Ok(buf)
            }
            Context::Tcp(header) => {
                let header = MbapHeader {
                    length: (pdu.len() + 1) as u16,
                    ..*header
                };
                let mut buf = BytesMut::with_capacity(MbapHeader::SIZE + pdu.len());
                header.encode(&mut buf);
                buf.put_slice(pdu);
                Ok(buf)
            }
        }
    }

    /// Extract the PDU from a transport ADU
    ///
    /// # Errors
    ///
    /// - RTU: frame shorter than 4 bytes, longer than 256, or non-zero CRC residue
    /// - TCP: frame shorter than header + function code, or a length field
    ///   that disagrees with the bytes present (protocol violation)
    pub fn decapsulate(self, adu: &[u8]) -> Result<Bytes> {
        match self {
            Self::Rtu => {
                check_rtu(adu)?;
                Ok(Bytes::copy_from_slice(&adu[1..adu.len() - 2]))
            }
            Self::Tcp => {
                check_size(adu, Self::MIN_TCP_ADU, Self::MAX_TCP_ADU)?;
                let header = MbapHeader::decode(adu)?;
                let actual = adu.len() - MbapHeader::SIZE + 1;
                if header.length as usize != actual {
                    return Err(Error::LengthMismatch {
                        declared: header.length as usize,
                        actual,
                    });
                }
                Ok(Bytes::copy_from_slice(&adu[MbapHeader::SIZE..]))
            }
        }
    }

    /// Recover the addressing context of a received ADU
    pub fn extract_context(self, adu: &[u8]) -> Result<Context> {
        match self {
            Self::Rtu => {
                check_rtu(adu)?;
                Ok(Context::Rtu { unit_id: adu[0] })
            }
            Self::Tcp => {
                let header = MbapHeader::decode(adu)?;
                if header.protocol_id != MbapHeader::MODBUS_PROTOCOL {
                    return Err(Error::InvalidProtocolId(header.protocol_id));
                }
                Ok(Context::Tcp(header))
            }
        }
    }
}

fn check_size(adu: &[u8], min: usize, max: usize) -> Result<()> {
    if adu.len() < min {
        return Err(Error::FrameTooShort {
            expected: min,
            actual: adu.len(),
        });
    }
    if adu.len() > max {
        return Err(Error::FrameTooLarge {
            size: adu.len(),
            max,
        });
    }
    Ok(())
}

fn check_rtu(adu: &[u8]) -> Result<()> {
    check_size(adu, Framing::MIN_RTU_ADU, Framing::MAX_RTU_ADU)?;
    let residue = crc::calculate(adu);
    if residue != 0 {
        return Err(Error::CrcMismatch { residue });
    }
    Ok(())
}

/// Modbus application protocol header
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MbapHeader {
    /// Echoed by the server, pairs responses with requests
    pub transaction_id: u16,

    /// Always 0 for Modbus
    pub protocol_id: u16,

    /// Byte count of unit id + PDU
    pub length: u16,

    /// Target unit behind the TCP endpoint
    pub unit_id: u8,
}

impl MbapHeader {
    /// Header size in bytes
    pub const SIZE: usize = 7;

    /// Protocol identifier of Modbus
    pub const MODBUS_PROTOCOL: u16 = 0;

    /// Create a header for an empty PDU
    pub fn new(transaction_id: u16, unit_id: u8) -> Self {
        Self {
            transaction_id,
            protocol_id: Self::MODBUS_PROTOCOL,
            length: 1,
            unit_id,
        }
    }

    /// Append the encoded header
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.transaction_id);
        buf.put_u16(self.protocol_id);
        buf.put_u16(self.length);
        buf.put_u8(self.unit_id);
    }

    /// Decode the header at the start of `buf`
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::FrameTooShort {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        Ok(Self {
            transaction_id: buf.get_u16(),
            protocol_id: buf.get_u16(),
            length: buf.get_u16(),
            unit_id: buf.get_u8(),
        })
    }

    /// Number of PDU bytes announced by the length field
    pub fn pdu_len(&self) -> usize {
        (self.length as usize).saturating_sub(1)
    }
}

impl fmt::Debug for MbapHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MbapHeader")
            .field("transaction_id", &format!("0x{:04X}", self.transaction_id))
            .field("protocol_id", &self.protocol_id)
            .field("length", &self.length)
            .field("unit_id", &self.unit_id)
            .finish()
    }
}

/// Transport specific addressing of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Rtu { unit_id: u8 },
    Tcp(MbapHeader),
}

impl Context {
    pub fn unit_id(&self) -> u8 {
        match self {
            Self::Rtu { unit_id } => *unit_id,
            Self::Tcp(header) => header.unit_id,
        }
    }

    pub fn framing(&self) -> Framing {
        match self {
            Self::Rtu { .. } => Framing::Rtu,
            Self::Tcp(_) => Framing::Tcp,
        }
    }

    /// Transaction id, TCP only
    pub fn transaction_id(&self) -> Option<u16> {
        match self {
            Self::Rtu { .. } => None,
            Self::Tcp(header) => Some(header.transaction_id),
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rtu { unit_id } => write!(f, "RTU(unit={})", unit_id),
            Self::Tcp(header) => write!(
                f,
                "TCP(tid=0x{:04X}, unit={})",
                header.transaction_id, header.unit_id
            ),
        }
    }
}
