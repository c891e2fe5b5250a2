//! RTU (serial) transport
//!
//! One serial line is shared by every caller. All access goes through
//! [`RtuTransport::exclusive`], which hands out an [`RtuBus`] guard; the
//! guard is the only way to touch the line, so a request and its response
//! can never interleave with another caller's traffic.
//!
//! The bus is paced: a transaction starts no earlier than
//! `delay_between_polls` after the previous one finished, and a failed
//! transaction pushes the next one back by an extra `error_delay`.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use rtugate_core::{
    constants::{
        BROADCAST_UNIT_ID, DEFAULT_BAUD_RATE, DEFAULT_ERROR_DELAY_MS,
        DEFAULT_INTER_CHAR_TIMEOUT_MS, DEFAULT_POLL_DELAY_MS, RTU_FIRST_CHUNK, RTU_MAX_FRAME,
        RTU_MIN_REPLY, SUPPORTED_BAUD_RATES,
    },
    crc,
    function::{is_exception, EXCEPTION_FLAG},
    Framing,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, trace, warn};

use crate::{error::*, within, Transport};

/// Byte stream with serial line controls
#[async_trait]
pub trait SerialLine: AsyncRead + AsyncWrite + Unpin + Send {
    /// Drop everything buffered in both directions
    async fn discard_buffers(&mut self) -> io::Result<()>;

    /// Reconfigure the line speed
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()>;
}

#[async_trait]
impl SerialLine for SerialStream {
    async fn discard_buffers(&mut self) -> io::Result<()> {
        tokio_serial::SerialPort::clear(self, tokio_serial::ClearBuffer::All)
            .map_err(io::Error::from)
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        tokio_serial::SerialPort::set_baud_rate(self, baud_rate).map_err(io::Error::from)
    }
}

/// In-memory line, used to simulate a bus
#[async_trait]
impl SerialLine for DuplexStream {
    async fn discard_buffers(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; 64];
        loop {
            match tokio::time::timeout(Duration::ZERO, self.read(&mut scratch)).await {
                Ok(Ok(n)) if n > 0 => continue,
                Ok(Err(e)) => return Err(e),
                _ => return Ok(()),
            }
        }
    }

    fn set_baud_rate(&mut self, _baud_rate: u32) -> io::Result<()> {
        Ok(())
    }
}

/// Serial line and bus timing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtuConfig {
    /// Line speed; 8 data bits, no parity, 1 stop bit
    pub baud_rate: u32,

    /// Minimum quiet time between transactions
    pub delay_between_polls: Duration,

    /// Extra quiet time after a failed transaction
    pub error_delay: Duration,

    /// Silence that ends a reply of unknown length
    pub inter_char_timeout: Duration,
}

impl Default for RtuConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            delay_between_polls: Duration::from_millis(DEFAULT_POLL_DELAY_MS),
            error_delay: Duration::from_millis(DEFAULT_ERROR_DELAY_MS),
            inter_char_timeout: Duration::from_millis(DEFAULT_INTER_CHAR_TIMEOUT_MS),
        }
    }
}

impl RtuConfig {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_delay_between_polls(mut self, delay: Duration) -> Self {
        self.delay_between_polls = delay;
        self
    }

    pub fn with_error_delay(mut self, delay: Duration) -> Self {
        self.error_delay = delay;
        self
    }

    pub fn with_inter_char_timeout(mut self, timeout: Duration) -> Self {
        self.inter_char_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_baud_rate(self.baud_rate)
    }
}

fn check_baud_rate(baud_rate: u32) -> Result<()> {
    if SUPPORTED_BAUD_RATES.contains(&baud_rate) {
        Ok(())
    } else {
        Err(Error::InvalidBaudRate(baud_rate))
    }
}

struct Link<L> {
    line: L,
    baud_rate: u32,
    /// Earliest moment the previous transaction allows the next to start from
    last_poll: Option<Instant>,
}

/// Shared serial bus
pub struct RtuTransport<L = SerialStream> {
    port_name: String,
    config: RtuConfig,
    link: Mutex<Link<L>>,
}

impl RtuTransport<SerialStream> {
    /// Open a serial port, 8N1 at the configured baud rate
    pub fn open(port_name: impl Into<String>, config: RtuConfig) -> Result<Self> {
        config.validate()?;
        let port_name = port_name.into();

        debug!(port = %port_name, baud = config.baud_rate, "Opening serial port");

        let line = tokio_serial::new(&port_name, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(io::Error::from)?;

        Self::new(port_name, line, config)
    }
}

impl<L: SerialLine> RtuTransport<L> {
    /// Wrap an already open line
    pub fn new(port_name: impl Into<String>, line: L, config: RtuConfig) -> Result<Self> {
        config.validate()?;
        let baud_rate = config.baud_rate;

        Ok(Self {
            port_name: port_name.into(),
            config,
            link: Mutex::new(Link {
                line,
                baud_rate,
                last_poll: None,
            }),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn config(&self) -> &RtuConfig {
        &self.config
    }

    /// Take exclusive ownership of the bus
    ///
    /// Waiters are served in arrival order. The bus is released when the
    /// returned guard is dropped.
    pub async fn exclusive(&self) -> RtuBus<'_, L> {
        RtuBus {
            link: self.link.lock().await,
            config: &self.config,
            port_name: &self.port_name,
        }
    }

    /// Current line speed
    pub async fn baud_rate(&self) -> u32 {
        self.exclusive().await.baud_rate()
    }

    /// Change the line speed between transactions
    pub async fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        self.exclusive().await.set_baud_rate(baud_rate).await
    }
}

/// Exclusive access to the serial bus
pub struct RtuBus<'a, L> {
    link: MutexGuard<'a, Link<L>>,
    config: &'a RtuConfig,
    port_name: &'a str,
}

impl<L: SerialLine> RtuBus<'_, L> {
    /// Send one frame
    ///
    /// Waits for the pacing window and discards stale input first.
    pub async fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        self.wait_for_turn().await;
        let result = self.send(frame).await;
        self.record_outcome(result.is_ok());
        result
    }

    /// Receive one reply
    ///
    /// With `expected_length > 0` the reply size is known (5..=256 bytes).
    /// Otherwise the reply ends at the first gap longer than the inter-char
    /// timeout. In both modes an exception reply is reported as soon as its
    /// five bytes have arrived.
    pub async fn receive(
        &mut self,
        timeout: Option<Duration>,
        expected_length: usize,
    ) -> Result<BytesMut> {
        let frame = if expected_length > 0 {
            self.read_expected(timeout, expected_length).await?
        } else {
            self.read_until_silence(timeout).await?
        };
        check_reply(self.port_name, frame)
    }

    /// Send a request and read its reply
    ///
    /// A request to the broadcast unit returns `None` without reading.
    pub async fn exchange(
        &mut self,
        frame: &[u8],
        timeout: Option<Duration>,
        expected_length: usize,
    ) -> Result<Option<BytesMut>> {
        self.wait_for_turn().await;

        let result = match self.send(frame).await {
            Ok(()) if frame.first() == Some(&BROADCAST_UNIT_ID) => {
                trace!(port = self.port_name, "Broadcast, no reply expected");
                Ok(None)
            }
            Ok(()) => self.receive(timeout, expected_length).await.map(Some),
            Err(e) => Err(e),
        };

        self.record_outcome(result.is_ok());
        result
    }

    pub fn baud_rate(&self) -> u32 {
        self.link.baud_rate
    }

    /// Change the line speed
    ///
    /// Buffered bytes were sent at the old speed and are discarded.
    pub async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        check_baud_rate(baud_rate)?;

        self.link.line.discard_buffers().await?;
        self.link.line.set_baud_rate(baud_rate)?;
        self.link.baud_rate = baud_rate;

        debug!(port = self.port_name, baud = baud_rate, "Baud rate changed");
        Ok(())
    }

    async fn wait_for_turn(&mut self) {
        let turn = self
            .link
            .last_poll
            .map(|last| last + self.config.delay_between_polls);
        if let Some(turn) = turn {
            sleep_until(turn).await;
        }
    }

    fn record_outcome(&mut self, success: bool) {
        let now = Instant::now();
        self.link.last_poll = Some(if success {
            now
        } else {
            now + self.config.error_delay
        });
    }

    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.link.line.discard_buffers().await?;

        trace!(port = self.port_name, tx = %hex::encode_upper(frame), "Tx");

        self.link.line.write_all(frame).await?;
        self.link.line.flush().await?;
        Ok(())
    }

    async fn read_first_chunk(&mut self, buf: &mut BytesMut, timeout: Option<Duration>) -> Result<()> {
        let mut chunk = [0u8; RTU_FIRST_CHUNK];

        match within(timeout, self.link.line.read_exact(&mut chunk)).await {
            Some(Ok(_)) => {
                buf.put_slice(&chunk);
                Ok(())
            }
            Some(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::ConnectionClosed),
            Some(Err(e)) => Err(Error::Io(e)),
            None => {
                debug!(port = self.port_name, "No reply within timeout");
                Err(Error::Timeout)
            }
        }
    }

    async fn read_expected(&mut self, timeout: Option<Duration>, expected: usize) -> Result<BytesMut> {
        if !(RTU_MIN_REPLY..=RTU_MAX_FRAME).contains(&expected) {
            return Err(Error::LengthMismatch(expected));
        }

        let mut buf = BytesMut::with_capacity(expected);
        self.read_first_chunk(&mut buf, timeout).await?;
        if is_complete_exception(&buf) {
            return Ok(buf);
        }

        // A short reply keeps whatever arrived and goes through the frame check
        let mut scratch = [0u8; RTU_MAX_FRAME];
        while buf.len() < expected {
            let wanted = expected - buf.len();
            match within(timeout, self.link.line.read(&mut scratch[..wanted])).await {
                Some(Ok(0)) | None => {
                    debug!(port = self.port_name, got = buf.len(), expected, "Reply cut short");
                    break;
                }
                Some(Ok(n)) => buf.put_slice(&scratch[..n]),
                Some(Err(e)) => return Err(Error::Io(e)),
            }
        }

        Ok(buf)
    }

    async fn read_until_silence(&mut self, timeout: Option<Duration>) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(RTU_MAX_FRAME);
        self.read_first_chunk(&mut buf, timeout).await?;
        if is_complete_exception(&buf) {
            return Ok(buf);
        }

        let gap = self.config.inter_char_timeout;
        let mut byte = [0u8; 1];
        loop {
            match tokio::time::timeout(gap, self.link.line.read(&mut byte)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(_)) => {
                    buf.put_u8(byte[0]);
                    if buf.len() > RTU_MAX_FRAME {
                        warn!(port = self.port_name, "Reply exceeds {} bytes", RTU_MAX_FRAME);
                        return Err(Error::LengthMismatch(buf.len()));
                    }
                }
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_) => break,
            }
        }

        Ok(buf)
    }
}

/// Exception reply whose five bytes are already in and intact
fn is_complete_exception(buf: &[u8]) -> bool {
    buf.len() == RTU_MIN_REPLY && is_exception(buf[1]) && crc::verify(buf)
}

fn check_reply(port: &str, frame: BytesMut) -> Result<BytesMut> {
    if !(RTU_MIN_REPLY..=RTU_MAX_FRAME).contains(&frame.len()) {
        return Err(Error::LengthMismatch(frame.len()));
    }

    if !crc::verify(&frame) {
        warn!(port, rx = %hex::encode_upper(&frame), "CRC error");
        return Err(Error::CrcMismatch(frame.len()));
    }

    trace!(port, rx = %hex::encode_upper(&frame), "Rx");

    if is_exception(frame[1]) {
        let (function, code) = (frame[1] & !EXCEPTION_FLAG, frame[2]);
        debug!(port, function, code, "Device exception");
        return Err(Error::Exception { function, code });
    }

    Ok(frame)
}

#[async_trait]
impl<L: SerialLine + 'static> Transport for RtuTransport<L> {
    fn framing(&self) -> Framing {
        Framing::Rtu
    }

    async fn transmit(&self, frame: &[u8]) -> Result<()> {
        let mut bus = self.exclusive().await;
        bus.transmit(frame).await
    }

    async fn receive(&self, timeout: Option<Duration>, expected_length: usize) -> Result<BytesMut> {
        let mut bus = self.exclusive().await;
        bus.receive(timeout, expected_length).await
    }

    async fn exchange(
        &self,
        frame: &[u8],
        timeout: Option<Duration>,
        expected_length: usize,
    ) -> Result<Option<BytesMut>> {
        let mut bus = self.exclusive().await;
        bus.exchange(frame, timeout, expected_length).await
    }

    fn remote_addr(&self) -> String {
        self.port_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::duplex;

    const REPLY_TIMEOUT: Option<Duration> = Some(Duration::from_millis(500));

    fn test_config() -> RtuConfig {
        RtuConfig::default()
            .with_delay_between_polls(Duration::from_millis(1))
            .with_error_delay(Duration::from_millis(5))
            .with_inter_char_timeout(Duration::from_millis(10))
    }

    fn rtu(unit_id: u8, pdu: &[u8]) -> Vec<u8> {
        let context = Framing::Rtu.make_context(unit_id, 0);
        Framing::Rtu.encapsulate(&context, pdu).unwrap().to_vec()
    }

    fn bus_with_config(config: RtuConfig) -> (RtuTransport<DuplexStream>, DuplexStream) {
        let (master, device) = duplex(1024);
        (RtuTransport::new("sim", master, config).unwrap(), device)
    }

    fn bus() -> (RtuTransport<DuplexStream>, DuplexStream) {
        bus_with_config(test_config())
    }

    async fn answer(device: &mut DuplexStream, request_len: usize, reply: &[u8]) -> Vec<u8> {
        let mut request = vec![0u8; request_len];
        device.read_exact(&mut request).await.unwrap();
        device.write_all(reply).await.unwrap();
        request
    }

    #[test]
    fn test_config_rejects_baud_rate() {
        let config = RtuConfig::default().with_baud_rate(4800);
        assert!(matches!(config.validate(), Err(Error::InvalidBaudRate(4800))));
        assert!(RtuConfig::default().with_baud_rate(9600).validate().is_ok());
    }

    #[tokio::test]
    async fn test_exchange_expected_length() {
        let (transport, mut device) = bus();
        let request = rtu(0x11, &[0x03, 0x00, 0x6B, 0x00, 0x01]);
        let reply = rtu(0x11, &[0x03, 0x02, 0x12, 0x34]);

        let sent = reply.clone();
        let device_task = tokio::spawn(async move { answer(&mut device, 8, &sent).await });

        let frame = transport.exchange(&request, REPLY_TIMEOUT, 7).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&reply[..]));
        assert_eq!(device_task.await.unwrap(), request);
    }

    #[tokio::test]
    async fn test_exchange_unknown_length() {
        let (transport, mut device) = bus();
        let request = rtu(0x11, &[0x04, 0x00, 0x00, 0x00, 0x02]);
        let reply = rtu(0x11, &[0x04, 0x04, 0x00, 0x0A, 0x00, 0x0B]);

        let sent = reply.clone();
        tokio::spawn(async move { answer(&mut device, 8, &sent).await });

        let frame = transport.exchange(&request, REPLY_TIMEOUT, 0).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&reply[..]));
    }

    #[tokio::test]
    async fn test_exception_returns_early() {
        let (transport, mut device) = bus();
        let request = rtu(0x11, &[0x03, 0x00, 0x6B, 0x00, 0x03]);
        let reply = rtu(0x11, &[0x83, 0x02]);

        tokio::spawn(async move { answer(&mut device, 8, &reply).await });

        let started = std::time::Instant::now();
        let result = transport
            .exchange(&request, Some(Duration::from_secs(2)), 11)
            .await;

        assert!(matches!(
            result,
            Err(Error::Exception {
                function: 0x03,
                code: 0x02
            })
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_exception_in_unknown_length_mode() {
        let (transport, mut device) = bus();
        let request = rtu(0x11, &[0x06, 0x00, 0x01, 0x00, 0x03]);
        let reply = rtu(0x11, &[0x86, 0x04]);

        tokio::spawn(async move { answer(&mut device, 8, &reply).await });

        let result = transport.exchange(&request, REPLY_TIMEOUT, 0).await;
        assert_eq!(result.unwrap_err().exception_code(), Some(0x04));
    }

    #[tokio::test]
    async fn test_broadcast_skips_receive() {
        let (transport, mut device) = bus();
        let request = rtu(0x00, &[0x06, 0x00, 0x01, 0x00, 0x03]);

        let started = std::time::Instant::now();
        let result = transport
            .exchange(&request, Some(Duration::from_secs(2)), 8)
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_millis(500));

        let mut seen = vec![0u8; request.len()];
        device.read_exact(&mut seen).await.unwrap();
        assert_eq!(seen, request);
    }

    #[tokio::test]
    async fn test_timeout() {
        let (transport, _device) = bus();
        let request = rtu(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]);

        let result = transport
            .exchange(&request, Some(Duration::from_millis(30)), 7)
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_torn_reply_is_crc_error() {
        let (transport, mut device) = bus();
        let request = rtu(0x11, &[0x03, 0x00, 0x00, 0x00, 0x02]);
        let reply = rtu(0x11, &[0x03, 0x04, 0x12, 0x34, 0x56, 0x78]);

        tokio::spawn(async move {
            answer(&mut device, 8, &reply[..7]).await;
            // keep the line open past the timeout
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let err = transport
            .exchange(&request, Some(Duration::from_millis(50)), 9)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CrcMismatch(7)));
        assert_eq!(err.status().map(|s| s.code()), Some(-2));
    }

    #[tokio::test]
    async fn test_reply_torn_by_closed_line_is_crc_error() {
        let (transport, mut device) = bus();
        let request = rtu(0x11, &[0x03, 0x00, 0x00, 0x00, 0x02]);
        let reply = rtu(0x11, &[0x03, 0x04, 0x12, 0x34, 0x56, 0x78]);

        tokio::spawn(async move { answer(&mut device, 8, &reply[..6]).await });

        let result = transport.exchange(&request, REPLY_TIMEOUT, 9).await;
        assert!(matches!(result, Err(Error::CrcMismatch(6))));
    }

    #[tokio::test]
    async fn test_crc_error() {
        let (transport, mut device) = bus();
        let request = rtu(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        let mut reply = rtu(0x11, &[0x03, 0x02, 0x12, 0x34]);
        reply[3] ^= 0xFF;

        tokio::spawn(async move { answer(&mut device, 8, &reply).await });

        let result = transport.exchange(&request, REPLY_TIMEOUT, 7).await;
        let err = result.unwrap_err();
        assert!(matches!(err, Error::CrcMismatch(7)));
        assert_eq!(err.status().map(|s| s.code()), Some(-2));
    }

    #[tokio::test]
    async fn test_expected_length_out_of_range() {
        let (transport, mut device) = bus();
        let request = rtu(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        let reply = rtu(0x11, &[0x03, 0x02, 0x12, 0x34]);

        tokio::spawn(async move { answer(&mut device, 8, &reply).await });

        let result = transport.exchange(&request, REPLY_TIMEOUT, 300).await;
        assert!(matches!(result, Err(Error::LengthMismatch(300))));
    }

    #[tokio::test]
    async fn test_unknown_length_overflow() {
        let (transport, mut device) = bus();
        let request = rtu(0x11, &[0x03, 0x00, 0x00, 0x00, 0x7D]);

        tokio::spawn(async move {
            let mut seen = [0u8; 8];
            device.read_exact(&mut seen).await.unwrap();
            device.write_all(&[0x11; 300]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let result = transport.exchange(&request, REPLY_TIMEOUT, 0).await;
        assert!(matches!(result, Err(Error::LengthMismatch(257))));
    }

    #[tokio::test]
    async fn test_stale_input_discarded() {
        let (transport, mut device) = bus();
        let request = rtu(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        let reply = rtu(0x11, &[0x03, 0x02, 0xAB, 0xCD]);

        device.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sent = reply.clone();
        tokio::spawn(async move { answer(&mut device, 8, &sent).await });

        let frame = transport.exchange(&request, REPLY_TIMEOUT, 7).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&reply[..]));
    }

    #[tokio::test]
    async fn test_poll_delay_between_transmits() {
        let config = test_config().with_delay_between_polls(Duration::from_millis(40));
        let (transport, _device) = bus_with_config(config);
        let frame = rtu(0x00, &[0x06, 0x00, 0x01, 0x00, 0x03]);

        transport.transmit(&frame).await.unwrap();
        let started = std::time::Instant::now();
        transport.transmit(&frame).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(35));
    }

    #[tokio::test]
    async fn test_error_delay_after_failure() {
        let config = test_config()
            .with_delay_between_polls(Duration::from_millis(10))
            .with_error_delay(Duration::from_millis(60));
        let (transport, _device) = bus_with_config(config);
        let request = rtu(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]);

        let result = transport
            .exchange(&request, Some(Duration::from_millis(10)), 7)
            .await;
        assert!(matches!(result, Err(Error::Timeout)));

        let started = std::time::Instant::now();
        transport.transmit(&request).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(65));
    }

    #[tokio::test]
    async fn test_exclusive_bus_serializes_callers() {
        let (transport, mut device) = bus();
        let transport = std::sync::Arc::new(transport);

        tokio::spawn(async move {
            for value in [0x0001u16, 0x0002] {
                let mut request = [0u8; 8];
                device.read_exact(&mut request).await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                let [hi, lo] = value.to_be_bytes();
                device
                    .write_all(&rtu(request[0], &[0x03, 0x02, hi, lo]))
                    .await
                    .unwrap();
            }
        });

        let a = {
            let transport = transport.clone();
            tokio::spawn(async move {
                let request = rtu(0x01, &[0x03, 0x00, 0x00, 0x00, 0x01]);
                transport.exchange(&request, REPLY_TIMEOUT, 7).await
            })
        };
        let b = {
            let transport = transport.clone();
            tokio::spawn(async move {
                let request = rtu(0x02, &[0x03, 0x00, 0x00, 0x00, 0x01]);
                transport.exchange(&request, REPLY_TIMEOUT, 7).await
            })
        };

        let a = a.await.unwrap().unwrap().unwrap();
        let b = b.await.unwrap().unwrap().unwrap();
        assert_eq!(a[0], 0x01);
        assert_eq!(b[0], 0x02);
    }

    #[tokio::test]
    async fn test_set_baud_rate() {
        let (transport, _device) = bus();
        assert_eq!(transport.baud_rate().await, DEFAULT_BAUD_RATE);

        transport.set_baud_rate(9600).await.unwrap();
        assert_eq!(transport.baud_rate().await, 9600);

        assert!(matches!(
            transport.set_baud_rate(115200).await,
            Err(Error::InvalidBaudRate(115200))
        ));
        assert_eq!(transport.baud_rate().await, 9600);
    }

    #[tokio::test]
    async fn test_remote_addr_is_port_name() {
        let (transport, _device) = bus();
        assert_eq!(transport.remote_addr(), "sim");
        assert_eq!(transport.framing(), Framing::Rtu);
    }
}
