//! Simulated RTU device on an in-memory serial line

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

use rtugate_core::{function::mei, Framing};
use rtugate_transport::{RtuConfig, RtuTransport};

/// Silence that ends a request on the device side
const REQUEST_GAP: Duration = Duration::from_millis(3);

/// Time the device takes to answer; the line is watched meanwhile
const PROCESSING: Duration = Duration::from_millis(3);

/// Registers at or above this address do not exist
const ADDRESS_LIMIT: u16 = 0x1000;

#[derive(Debug, Default)]
pub(crate) struct DeviceState {
    /// Requests framed by the device, broadcasts included
    pub requests: usize,

    /// Bytes that arrived while a reply was still pending
    pub overlaps: usize,

    /// Do not answer at all
    pub silent: bool,

    /// Last write request PDU
    pub last_write: Option<Vec<u8>>,

    clock: [u8; 8],
}

pub(crate) struct SimulatedBus {
    pub transport: Arc<RtuTransport<DuplexStream>>,
    pub state: Arc<Mutex<DeviceState>>,
}

pub(crate) fn test_config() -> RtuConfig {
    RtuConfig::default()
        .with_delay_between_polls(Duration::from_millis(1))
        .with_error_delay(Duration::from_millis(5))
        .with_inter_char_timeout(Duration::from_millis(10))
}

/// Spawn a device answering on every unit id
///
/// Register `n` holds the value `n`; coil `n` is on when `n` is even.
pub(crate) fn simulated_bus() -> SimulatedBus {
    let (master, device) = tokio::io::duplex(4096);
    let transport = RtuTransport::new("sim", master, test_config()).unwrap();
    let state = Arc::new(Mutex::new(DeviceState::default()));

    tokio::spawn(run_device(device, state.clone()));

    SimulatedBus {
        transport: Arc::new(transport),
        state,
    }
}

async fn run_device(mut line: DuplexStream, state: Arc<Mutex<DeviceState>>) {
    let mut buf = [0u8; 512];

    loop {
        let mut request = Vec::new();
        match line.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
        while let Ok(Ok(n)) = timeout(REQUEST_GAP, line.read(&mut buf)).await {
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let reply = {
            let mut state = state.lock();
            state.requests += 1;
            if state.silent { None } else { respond(&request, &mut state) }
        };

        let Some(reply) = reply else { continue };

        if let Ok(Ok(n)) = timeout(PROCESSING, line.read(&mut buf)).await {
            if n > 0 {
                state.lock().overlaps += 1;
            }
        }

        if line.write_all(&reply).await.is_err() {
            return;
        }
    }
}

fn respond(request: &[u8], state: &mut DeviceState) -> Option<Vec<u8>> {
    let context = Framing::Rtu.extract_context(request).ok()?;
    let pdu = Framing::Rtu.decapsulate(request).ok()?;
    if context.unit_id() == 0 {
        if is_write(pdu[0]) {
            state.last_write = Some(pdu.to_vec());
        }
        return None;
    }

    let reply = match answer(&pdu, state) {
        Ok(reply) => reply,
        Err(code) => vec![pdu[0] | 0x80, code],
    };

    let encoded = Framing::Rtu.encapsulate(&context, &reply).ok()?;
    Some(encoded.to_vec())
}

fn is_write(function: u8) -> bool {
    matches!(function, 0x05 | 0x06 | 0x0F | 0x10)
}

fn field(pdu: &[u8], offset: usize) -> Result<u16, u8> {
    pdu.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(0x03)
}

fn answer(pdu: &[u8], state: &mut DeviceState) -> Result<Vec<u8>, u8> {
    let function = pdu[0];

    match function {
        0x01 | 0x02 | 0x03 | 0x04 => {
            let address = field(pdu, 1)?;
            let quantity = field(pdu, 3)?;
            if address.saturating_add(quantity) > ADDRESS_LIMIT {
                return Err(0x02);
            }

            let mut data = Vec::new();
            if function <= 0x02 {
                data.resize((quantity as usize).div_ceil(8), 0);
                for i in 0..quantity as usize {
                    if (address as usize + i) % 2 == 0 {
                        data[i / 8] |= 1 << (i % 8);
                    }
                }
            } else {
                for register in address..address + quantity {
                    data.extend_from_slice(&register.to_be_bytes());
                }
            }

            let mut reply = vec![function, data.len() as u8];
            reply.extend_from_slice(&data);
            Ok(reply)
        }
        0x05 | 0x06 | 0x0F | 0x10 => {
            if field(pdu, 1)? >= ADDRESS_LIMIT {
                return Err(0x02);
            }
            let echo = pdu.get(..5).ok_or(0x03)?.to_vec();
            state.last_write = Some(pdu.to_vec());
            Ok(echo)
        }
        0x2B => match pdu.get(1).copied() {
            Some(mei::READ_DEVICE_ID) => {
                let objects: [(u8, &[u8]); 3] = [
                    (0x00, &b"ACME"[..]),
                    (0x01, &b"SIM-MAP\0"[..]),
                    (0x80, &b"SIM0001"[..]),
                ];

                let code = pdu.get(2).copied().unwrap_or(0x01);
                let mut reply = vec![0x2B, mei::READ_DEVICE_ID, code, 0x01, 0x00, 0x00, 3];
                for (id, value) in objects {
                    reply.push(id);
                    reply.push(value.len() as u8);
                    reply.extend_from_slice(value);
                }
                Ok(reply)
            }
            Some(mei::READ_TIME) => {
                let mut reply = vec![0x2B, mei::READ_TIME, 0x00];
                reply.extend_from_slice(&state.clock);
                Ok(reply)
            }
            Some(mei::WRITE_TIME) => {
                let record = pdu.get(3..11).ok_or(0x03)?;
                state.clock.copy_from_slice(record);
                Ok(vec![0x2B, mei::WRITE_TIME, 0x00])
            }
            _ => Err(0x01),
        },
        0x64 => {
            let length = field(pdu, 7)?;
            let mut data = Vec::new();
            for register in 1..=length {
                data.extend_from_slice(&register.to_be_bytes());
            }

            let mut reply = vec![0x64, (data.len() + 1) as u8, data.len() as u8];
            reply.extend_from_slice(&data);
            Ok(reply)
        }
        _ => Err(0x01),
    }
}
