//! Read holding registers over a serial RTU bus

use std::sync::Arc;

use rtugate::{Master, RtuConfig, RtuTransport, SwapPolicy};

#[tokio::main]
async fn main() -> rtugate::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    // Change to your serial port
    let port = std::env::var("SERIAL_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let unit_id: u8 = std::env::var("UNIT_ID")
        .ok()
        .and_then(|id| id.parse().ok())
        .unwrap_or(1);

    println!("Opening {} at 38400 baud...", port);

    let transport = RtuTransport::open(port, RtuConfig::default())?;
    let master = Master::new(Arc::new(transport));

    // Raw register bytes, as sent by the device
    let raw = master
        .read_holding_registers_with(unit_id, 0x0000, 4, SwapPolicy::NONE)
        .await?;
    println!("✓ Registers: {:02X?}", raw);

    // Default policy reverses words and bytes for little-endian decoding
    let swapped = master.read_holding_registers(unit_id, 0x0000, 2).await?;
    let value = u32::from_le_bytes([swapped[0], swapped[1], swapped[2], swapped[3]]);
    println!("✓ 32-bit value: {}", value);

    Ok(())
}
