//! TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use rtugate_core::{constants::TCP_READ_BUFFER, Error as FrameError, Framing, MbapHeader, MAX_PDU_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::{error::*, within, Transport};

/// How a received TCP frame is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TcpFraming {
    /// Read the MBAP header, then exactly the bytes its length field declares
    #[default]
    Mbap,

    /// Whatever one socket read returns is one frame
    ///
    /// Only correct when peers never split or coalesce frames.
    SingleRead,
}

/// TCP transport for Modbus TCP peers
///
/// Used on both sides of a connection: [`TcpTransport::new`] +
/// [`TcpTransport::connect`] for a client, [`TcpTransport::from_stream`] for
/// a connection accepted by a server.
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Mutex<Option<TcpStream>>,
    framing: TcpFraming,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: Mutex::new(None),
            framing: TcpFraming::default(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Wrap an accepted connection
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;

        Ok(Self {
            addr: peer.ip().to_string(),
            port: peer.port(),
            socket_addr: Some(peer),
            stream: Mutex::new(Some(stream)),
            framing: TcpFraming::default(),
            connect_timeout: Duration::from_secs(5),
        })
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set receive framing
    pub fn with_framing(mut self, framing: TcpFraming) -> Self {
        self.framing = framing;
        self
    }

    pub fn tcp_framing(&self) -> TcpFraming {
        self.framing
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }

    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        *self.stream.get_mut() = Some(stream);
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.get_mut().take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Graceful shutdown
            let _ = stream.shutdown().await;
        }

        Ok(())
    }

    /// Close the write half; the peer sees end of stream
    pub async fn shutdown(&self) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(Error::NotConnected)?;
        stream.shutdown().await?;
        Ok(())
    }

    pub fn is_connected(&mut self) -> bool {
        self.stream.get_mut().is_some()
    }

    async fn read_frame(&self, stream: &mut TcpStream, limit: Option<Duration>) -> Result<BytesMut> {
        let frame = match self.framing {
            TcpFraming::Mbap => read_mbap(stream, limit).await?,
            TcpFraming::SingleRead => read_once(stream, limit).await?,
        };

        trace!(peer = %self.remote_addr(), rx = %hex::encode_upper(&frame), "Rx");
        Ok(frame)
    }
}

async fn fill(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::ConnectionClosed),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Read one MBAP frame; `limit` bounds the whole frame, not each part
async fn read_mbap(stream: &mut TcpStream, limit: Option<Duration>) -> Result<BytesMut> {
    within(limit, read_mbap_frame(stream))
        .await
        .unwrap_or(Err(Error::Timeout))
}

async fn read_mbap_frame(stream: &mut TcpStream) -> Result<BytesMut> {
    let mut header = [0u8; MbapHeader::SIZE];
    fill(stream, &mut header).await?;

    let parsed = MbapHeader::decode(&header)?;
    if parsed.length < 2 {
        return Err(FrameError::FrameTooShort {
            expected: 2,
            actual: parsed.length as usize,
        }
        .into());
    }
    if parsed.pdu_len() > MAX_PDU_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: parsed.pdu_len(),
            max: MAX_PDU_SIZE,
        }
        .into());
    }

    let mut frame = BytesMut::zeroed(MbapHeader::SIZE + parsed.pdu_len());
    frame[..MbapHeader::SIZE].copy_from_slice(&header);
    fill(stream, &mut frame[MbapHeader::SIZE..]).await?;

    Ok(frame)
}

async fn read_once(stream: &mut TcpStream, limit: Option<Duration>) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(TCP_READ_BUFFER);

    let n = within(limit, stream.read_buf(&mut buf))
        .await
        .ok_or(Error::Timeout)?
        .map_err(Error::Io)?;

    if n == 0 {
        return Err(Error::ConnectionClosed);
    }

    Ok(buf)
}

#[async_trait]
impl Transport for TcpTransport {
    fn framing(&self) -> Framing {
        Framing::Tcp
    }

    async fn transmit(&self, frame: &[u8]) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(Error::NotConnected)?;

        trace!(peer = %self.remote_addr(), tx = %hex::encode_upper(frame), "Tx");

        stream.write_all(frame).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn receive(&self, timeout: Option<Duration>, _expected_length: usize) -> Result<BytesMut> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(Error::NotConnected)?;

        self.read_frame(stream, timeout).await
    }

    async fn exchange(
        &self,
        frame: &[u8],
        timeout: Option<Duration>,
        _expected_length: usize,
    ) -> Result<Option<BytesMut>> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(Error::NotConnected)?;

        trace!(peer = %self.remote_addr(), tx = %hex::encode_upper(frame), "Tx");
        stream.write_all(frame).await?;
        stream.flush().await?;

        self.read_frame(stream, timeout).await.map(Some)
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}
