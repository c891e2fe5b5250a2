//! Modbus master
//!
//! Function-code level API over any [`Transport`]. Every call runs one
//! transaction:
//!
//! ```text
//! build PDU -> context -> encapsulate -> exchange -> decapsulate
//!           -> exception check -> response validation -> post-processing
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use tracing::{debug, trace};

use rtugate_core::{
    constants::{limits, ReadDeviceIdCode, BROADCAST_UNIT_ID, DEFAULT_RESPONSE_TIMEOUT_MS},
    function::{is_exception, mei, EXCEPTION_FLAG},
    Context, Framing, FunctionCode, MbapHeader, SwapPolicy, TransactionIds,
};
use rtugate_transport::Transport;
use rtugate_types::{DeviceClock, ProductInfo};

use crate::{
    error::{Error, Result},
    validate::Validators,
};

/// Modbus master
///
/// Safe to share between tasks; on an RTU transport concurrent calls queue
/// for the bus.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use rtugate::{Master, RtuConfig, RtuTransport};
///
/// #[tokio::main]
/// async fn main() -> rtugate::Result<()> {
///     let transport = RtuTransport::open("/dev/ttyUSB0", RtuConfig::default())?;
///     let master = Master::new(Arc::new(transport));
///
///     let registers = master.read_holding_registers(1, 0x0000, 2).await?;
///     println!("{:02X?}", registers);
///     Ok(())
/// }
/// ```
pub struct Master {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    swap: RwLock<SwapPolicy>,
    validators: RwLock<Validators>,
    transactions: TransactionIds,
}

impl Master {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            swap: RwLock::new(SwapPolicy::default()),
            validators: RwLock::new(Validators::default()),
            transactions: TransactionIds::new(),
        }
    }

    /// Set response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set default register swap policy
    pub fn with_swap_policy(self, policy: SwapPolicy) -> Self {
        *self.swap.write() = policy;
        self
    }

    pub fn with_validators(self, validators: Validators) -> Self {
        *self.validators.write() = validators;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn swap_policy(&self) -> SwapPolicy {
        *self.swap.read()
    }

    pub fn set_swap_policy(&self, policy: SwapPolicy) {
        *self.swap.write() = policy;
    }

    pub fn set_validators(&self, validators: Validators) {
        *self.validators.write() = validators;
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    // Bit access

    /// Read coils (0x01); returns the packed coil bytes
    pub async fn read_coils(&self, unit_id: u8, address: u16, quantity: u16) -> Result<Bytes> {
        self.read_bits(FunctionCode::ReadCoils, unit_id, address, quantity)
            .await
    }

    /// Read discrete inputs (0x02); returns the packed input bytes
    pub async fn read_discrete_inputs(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Bytes> {
        self.read_bits(FunctionCode::ReadDiscreteInputs, unit_id, address, quantity)
            .await
    }

    // 16-bit access

    /// Read holding registers (0x03) with the master's swap policy
    pub async fn read_holding_registers(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Bytes> {
        let policy = self.swap_policy();
        self.read_holding_registers_with(unit_id, address, quantity, policy)
            .await
    }

    /// Read holding registers (0x03) with an explicit swap policy
    pub async fn read_holding_registers_with(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
        policy: SwapPolicy,
    ) -> Result<Bytes> {
        self.read_registers(FunctionCode::ReadHoldingRegisters, unit_id, address, quantity, policy)
            .await
    }

    /// Read input registers (0x04) with the master's swap policy
    pub async fn read_input_registers(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Bytes> {
        let policy = self.swap_policy();
        self.read_input_registers_with(unit_id, address, quantity, policy)
            .await
    }

    /// Read input registers (0x04) with an explicit swap policy
    pub async fn read_input_registers_with(
        &self,
        unit_id: u8,
        address: u16,
        quantity: u16,
        policy: SwapPolicy,
    ) -> Result<Bytes> {
        self.read_registers(FunctionCode::ReadInputRegisters, unit_id, address, quantity, policy)
            .await
    }

    /// Write single coil (0x05); returns the echoed PDU
    pub async fn write_single_coil(&self, unit_id: u8, address: u16, value: bool) -> Result<Bytes> {
        let value = if value { 0xFF00 } else { 0x0000 };
        let pdu = request(FunctionCode::WriteSingleCoil, address, value);
        self.transact(unit_id, &pdu, Some(WRITE_RESPONSE_PDU), true)
            .await
    }

    /// Write single register (0x06); returns the echoed PDU
    pub async fn write_single_register(
        &self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<Bytes> {
        let pdu = request(FunctionCode::WriteSingleRegister, address, value);
        self.transact(unit_id, &pdu, Some(WRITE_RESPONSE_PDU), true)
            .await
    }

    /// Write multiple coils (0x0F); returns the response PDU
    pub async fn write_multiple_coils(
        &self,
        unit_id: u8,
        address: u16,
        values: &[bool],
    ) -> Result<Bytes> {
        let quantity = check_quantity(values.len(), limits::MAX_WRITE_BITS)?;
        let packed = pack_bits(values);

        let mut pdu = request(FunctionCode::WriteMultipleCoils, address, quantity);
        pdu.put_u8(packed.len() as u8);
        pdu.put_slice(&packed);

        self.transact(unit_id, &pdu, Some(WRITE_RESPONSE_PDU), true)
            .await
    }

    /// Write multiple registers (0x10); returns the response PDU
    pub async fn write_multiple_registers(
        &self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<Bytes> {
        let quantity = check_quantity(values.len(), limits::MAX_WRITE_REGISTERS)?;

        let mut pdu = request(FunctionCode::WriteMultipleRegisters, address, quantity);
        pdu.put_u8((values.len() * 2) as u8);
        for value in values {
            pdu.put_u16(*value);
        }

        self.transact(unit_id, &pdu, Some(WRITE_RESPONSE_PDU), true)
            .await
    }

    // Extensions

    /// Encapsulated interface transport (0x2B) with an arbitrary MEI payload
    pub async fn encapsulated_interface(&self, unit_id: u8, data: &[u8]) -> Result<Bytes> {
        let mut pdu = BytesMut::with_capacity(data.len() + 1);
        pdu.put_u8(FunctionCode::EncapsulatedInterface.into());
        pdu.put_slice(data);

        self.transact(unit_id, &pdu, None, true).await
    }

    /// Read device identification objects (MEI 0x0E)
    pub async fn read_product_info(
        &self,
        unit_id: u8,
        code: ReadDeviceIdCode,
    ) -> Result<ProductInfo> {
        let response = self
            .encapsulated_interface(unit_id, &[mei::READ_DEVICE_ID, code as u8, 0x00])
            .await?;
        if response.is_empty() {
            return Ok(ProductInfo::default());
        }

        let info = ProductInfo::parse(&response)?;
        debug!(unit_id, objects = info.len(), "Product info read");
        Ok(info)
    }

    /// Read the device real-time clock (MEI 0x0F)
    pub async fn read_time(&self, unit_id: u8) -> Result<NaiveDateTime> {
        let response = self
            .encapsulated_interface(unit_id, &[mei::READ_TIME, 0x00])
            .await?;

        let record = response.get(CLOCK_RECORD_OFFSET..).ok_or_else(|| {
            Error::InvalidResponse(format!("Clock response too short: {} bytes", response.len()))
        })?;
        Ok(DeviceClock::decode(record)?.datetime())
    }

    /// Set the device real-time clock (MEI 0x10)
    pub async fn write_time(&self, unit_id: u8, datetime: NaiveDateTime) -> Result<()> {
        let record = DeviceClock::new(datetime)?.encode();

        let mut data = Vec::with_capacity(2 + record.len());
        data.extend_from_slice(&[mei::WRITE_TIME, 0x00]);
        data.extend_from_slice(&record);

        self.encapsulated_interface(unit_id, &data).await?;
        debug!(unit_id, %datetime, "Device clock set");
        Ok(())
    }

    /// Read file record (0x64); returns the response PDU
    ///
    /// See [`file_record_payload`] for the record data.
    pub async fn read_file_record(
        &self,
        unit_id: u8,
        reference_type: u8,
        file_number: u16,
        record_number: u16,
        record_length: u16,
    ) -> Result<Bytes> {
        let mut pdu = BytesMut::with_capacity(9);
        pdu.put_u8(FunctionCode::ReadFileRecord.into());
        pdu.put_u8(7);
        pdu.put_u8(reference_type);
        pdu.put_u16(file_number);
        pdu.put_u16(record_number);
        pdu.put_u16(record_length);

        self.transact(unit_id, &pdu, None, true).await
    }

    /// Forward a caller-built PDU verbatim and return the response PDU
    ///
    /// The reply length is not known in advance and no validator runs.
    pub async fn bypass(&self, unit_id: u8, pdu: &[u8]) -> Result<Bytes> {
        self.transact(unit_id, pdu, None, false).await
    }

    async fn read_bits(
        &self,
        function: FunctionCode,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Bytes> {
        check_quantity(quantity as usize, limits::MAX_READ_BITS)?;

        let pdu = request(function, address, quantity);
        let data_len = (quantity as usize).div_ceil(8);
        let response = self.transact(unit_id, &pdu, Some(2 + data_len), true).await?;

        register_payload(&response)
    }

    async fn read_registers(
        &self,
        function: FunctionCode,
        unit_id: u8,
        address: u16,
        quantity: u16,
        policy: SwapPolicy,
    ) -> Result<Bytes> {
        check_quantity(quantity as usize, limits::MAX_READ_REGISTERS)?;

        let pdu = request(function, address, quantity);
        let response = self
            .transact(unit_id, &pdu, Some(2 + 2 * quantity as usize), true)
            .await?;

        let mut data = BytesMut::from(&register_payload(&response)?[..]);
        policy.apply(&mut data);
        Ok(data.freeze())
    }

    /// Run one transaction
    ///
    /// `response_pdu_len` is the full response PDU size when known. Returns
    /// an empty PDU for a broadcast.
    async fn transact(
        &self,
        unit_id: u8,
        pdu: &[u8],
        response_pdu_len: Option<usize>,
        validate: bool,
    ) -> Result<Bytes> {
        let framing = self.transport.framing();
        let context = framing.make_context(unit_id, self.transactions.next_id());
        let adu = framing.encapsulate(&context, pdu)?;

        let expected = response_pdu_len.map_or(0, |len| adu_len(framing, len));

        trace!(%context, function = pdu[0], expected, "Transaction");

        let reply = match self
            .transport
            .exchange(&adu, Some(self.timeout), expected)
            .await?
        {
            Some(reply) => reply,
            None => return Ok(Bytes::new()),
        };

        let reply_context = framing.extract_context(&reply)?;
        let response = framing.decapsulate(&reply)?;

        check_context(&context, &reply_context)?;

        if is_exception(response[0]) {
            return Err(rtugate_transport::Error::Exception {
                function: response[0] & !EXCEPTION_FLAG,
                code: response.get(1).copied().unwrap_or_default(),
            }
            .into());
        }

        if validate {
            self.validators.read().check(pdu, &response)?;
        }

        Ok(response)
    }
}

/// Response PDU size of every write function
const WRITE_RESPONSE_PDU: usize = 5;

/// Clock record position in a read-time response PDU
const CLOCK_RECORD_OFFSET: usize = 3;

fn adu_len(framing: Framing, pdu_len: usize) -> usize {
    match framing {
        Framing::Rtu => pdu_len + 3,
        Framing::Tcp => pdu_len + MbapHeader::SIZE,
    }
}

fn check_context(sent: &Context, received: &Context) -> Result<()> {
    if let (Context::Tcp(sent), Context::Tcp(received)) = (sent, received) {
        if sent.transaction_id != received.transaction_id {
            return Err(Error::ContextMismatch(format!(
                "transaction id 0x{:04X} answered by 0x{:04X}",
                sent.transaction_id, received.transaction_id
            )));
        }
    }

    if sent.unit_id() != received.unit_id() {
        return Err(Error::ContextMismatch(format!(
            "unit {} answered by unit {}",
            sent.unit_id(),
            received.unit_id()
        )));
    }
    Ok(())
}

fn request(function: FunctionCode, address: u16, value: u16) -> BytesMut {
    let mut pdu = BytesMut::with_capacity(5);
    pdu.put_u8(function.into());
    pdu.put_u16(address);
    pdu.put_u16(value);
    pdu
}

fn check_quantity(quantity: usize, max: u16) -> Result<u16> {
    if quantity == 0 || quantity > max as usize {
        return Err(Error::InvalidRequest(format!(
            "quantity {} outside 1..={}",
            quantity, max
        )));
    }
    Ok(quantity as u16)
}

fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; values.len().div_ceil(8)];
    for (i, _) in values.iter().enumerate().filter(|(_, on)| **on) {
        packed[i / 8] |= 1 << (i % 8);
    }
    packed
}

/// Unpack `quantity` bits from a coil or discrete input payload, LSB first
pub fn unpack_bits(payload: &[u8], quantity: usize) -> Vec<bool> {
    (0..quantity)
        .map(|i| payload.get(i / 8).is_some_and(|byte| byte & (1 << (i % 8)) != 0))
        .collect()
}

/// Data of a read response PDU: byte count at offset 1, data from offset 2
///
/// An empty PDU (broadcast) yields empty data.
pub fn register_payload(pdu: &Bytes) -> Result<Bytes> {
    if pdu.is_empty() {
        return Ok(Bytes::new());
    }

    let count = *pdu.get(1).ok_or_else(|| {
        Error::InvalidResponse("read response without byte count".to_string())
    })? as usize;

    if pdu.len() < 2 + count {
        return Err(Error::InvalidResponse(format!(
            "byte count {} exceeds {} data bytes",
            count,
            pdu.len() - 2
        )));
    }
    Ok(pdu.slice(2..2 + count))
}

/// Record data of a read file record response PDU
///
/// Data length at offset 2, data from offset 3.
pub fn file_record_payload(pdu: &Bytes) -> Result<Bytes> {
    let len = *pdu.get(2).ok_or_else(|| {
        Error::InvalidResponse(format!("file record response too short: {} bytes", pdu.len()))
    })? as usize;

    if pdu.len() < 3 + len {
        return Err(Error::InvalidResponse(format!(
            "file record length {} exceeds {} data bytes",
            len,
            pdu.len() - 3
        )));
    }
    Ok(pdu.slice(3..3 + len))
}

/// Check if a unit id addresses every device on an RTU bus
pub fn is_broadcast(unit_id: u8) -> bool {
    unit_id == BROADCAST_UNIT_ID
}
