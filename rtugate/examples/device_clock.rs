//! Identify a device through a Modbus TCP gateway and sync its clock

use std::sync::Arc;

use rtugate::{DeviceRecord, Master, ReadDeviceIdCode, TcpTransport};

#[tokio::main]
async fn main() -> rtugate::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let ip = std::env::var("GATEWAY_IP").unwrap_or_else(|_| "192.168.1.50".to_string());
    let unit_id = 1;

    let mut transport = TcpTransport::new(ip, 502);
    transport.connect().await?;
    let master = Master::new(Arc::new(transport));

    let info = master
        .read_product_info(unit_id, ReadDeviceIdCode::Regular)
        .await?;
    let record = DeviceRecord::from_product_info(unit_id, unit_id, &info);
    println!("Found {}", record);

    let before = master.read_time(unit_id).await?;
    println!("Device clock: {}", before);

    // Sync device clock to local time
    let now = chrono::Local::now().naive_local();
    master.write_time(unit_id, now).await?;
    println!("Device clock set to {}", now);

    Ok(())
}
