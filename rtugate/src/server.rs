//! Modbus TCP server loop
//!
//! Accepts connections and runs one task per connection. Each task reads a
//! request ADU, hands its PDU to a [`RequestHandler`], and writes the answer
//! back under the client's own MBAP header.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, info, info_span, warn, Instrument};

use rtugate_core::{function::EXCEPTION_FLAG, Framing};
use rtugate_transport::{TcpFraming, TcpTransport, Transport};

use crate::error::{Error, Result};

/// Answer one request PDU
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the response PDU for `pdu` addressed to `unit_id`
    ///
    /// An empty response sends nothing back. An error carrying a device
    /// exception is relayed to the client as an exception response; any
    /// other error is logged and the request is dropped.
    async fn handle(&self, unit_id: u8, pdu: &[u8]) -> Result<Bytes>;
}

/// TCP listener dispatching requests to a handler
pub struct Server<H> {
    listener: TcpListener,
    handler: Arc<H>,
    framing: TcpFraming,
}

impl<H: RequestHandler + 'static> Server<H> {
    pub async fn bind(addr: impl ToSocketAddrs, handler: Arc<H>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(rtugate_transport::Error::Io)?;

        Ok(Self {
            listener,
            handler,
            framing: TcpFraming::default(),
        })
    }

    /// Set how request frames are delimited on accepted connections
    pub fn with_framing(mut self, framing: TcpFraming) -> Self {
        self.framing = framing;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self
            .listener
            .local_addr()
            .map_err(rtugate_transport::Error::Io)?)
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "Listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };

            let transport = match TcpTransport::from_stream(stream) {
                Ok(transport) => transport.with_framing(self.framing),
                Err(e) => {
                    warn!(%peer, "Failed to set up connection: {}", e);
                    continue;
                }
            };

            let handler = self.handler.clone();
            tokio::spawn(
                serve_connection(transport, handler).instrument(info_span!("connection", %peer)),
            );
        }
    }
}

/// Serve one client until it disconnects
pub async fn serve_connection<H: RequestHandler>(transport: TcpTransport, handler: Arc<H>) {
    info!("Client connected");

    loop {
        let frame = match transport.receive(None, 0).await {
            Ok(frame) => frame,
            Err(e) if e.requires_reconnect() => {
                debug!("Connection ended: {}", e);
                break;
            }
            Err(e) => {
                warn!("Receive failed: {}", e);
                continue;
            }
        };

        match handle_frame(&transport, handler.as_ref(), &frame).await {
            Ok(()) => {}
            Err(e) if e.requires_disconnect() => {
                debug!("Connection ended: {}", e);
                break;
            }
            Err(e) => warn!("Request dropped: {}", e),
        }
    }

    let _ = transport.shutdown().await;
    info!("Client disconnected");
}

async fn handle_frame<H: RequestHandler + ?Sized>(
    transport: &TcpTransport,
    handler: &H,
    frame: &[u8],
) -> Result<()> {
    let context = Framing::Tcp.extract_context(frame)?;
    let pdu = Framing::Tcp.decapsulate(frame)?;

    // Handler failures belong to the request, never to this connection
    let response = match handler.handle(context.unit_id(), &pdu).await {
        Ok(response) => response,
        Err(e) => match exception_response(&e) {
            Some(response) => {
                debug!(%context, "Relaying {}", e);
                response
            }
            None => {
                warn!(%context, "Request failed: {}", e);
                return Ok(());
            }
        },
    };

    if response.is_empty() {
        return Ok(());
    }

    let adu = Framing::Tcp.encapsulate(&context, &response)?;
    transport.transmit(&adu).await?;
    Ok(())
}

fn exception_response(error: &Error) -> Option<Bytes> {
    match error {
        Error::Transport(rtugate_transport::Error::Exception { function, code }) => {
            Some(Bytes::copy_from_slice(&[function | EXCEPTION_FLAG, *code]))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// Answers unit 1 with the request PDU, fails unit 2 with an exception,
    /// unit 3 with a timeout, unit 5 with a closed bus, and stays silent
    /// for unit 4
    struct Scripted;

    #[async_trait]
    impl RequestHandler for Scripted {
        async fn handle(&self, unit_id: u8, pdu: &[u8]) -> Result<Bytes> {
            match unit_id {
                1 => Ok(Bytes::copy_from_slice(pdu)),
                2 => Err(rtugate_transport::Error::Exception {
                    function: pdu[0],
                    code: 0x0B,
                }
                .into()),
                3 => Err(rtugate_transport::Error::Timeout.into()),
                5 => Err(rtugate_transport::Error::ConnectionClosed.into()),
                _ => Ok(Bytes::new()),
            }
        }
    }

    async fn start() -> SocketAddr {
        let server = Server::bind("127.0.0.1:0", Arc::new(Scripted)).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    fn request(tid: u16, unit_id: u8) -> Vec<u8> {
        let [hi, lo] = tid.to_be_bytes();
        vec![hi, lo, 0x00, 0x00, 0x00, 0x06, unit_id, 0x03, 0x00, 0x00, 0x00, 0x01]
    }

    async fn read_reply(client: &mut TcpStream) -> Vec<u8> {
        let mut header = [0u8; 7];
        client.read_exact(&mut header).await.unwrap();
        let len = u16::from_be_bytes([header[4], header[5]]) as usize - 1;
        let mut reply = header.to_vec();
        reply.resize(7 + len, 0);
        client.read_exact(&mut reply[7..]).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_reply_keeps_transaction_id() {
        let addr = start().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(&request(0xBEEF, 1)).await.unwrap();
        assert_eq!(read_reply(&mut client).await, request(0xBEEF, 1));
    }

    #[tokio::test]
    async fn test_exception_relayed() {
        let addr = start().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(&request(7, 2)).await.unwrap();
        assert_eq!(
            read_reply(&mut client).await,
            vec![0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x02, 0x83, 0x0B]
        );
    }

    #[tokio::test]
    async fn test_failures_keep_connection_open() {
        let addr = start().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        // Local failure and empty response: nothing comes back
        client.write_all(&request(1, 3)).await.unwrap();
        client.write_all(&request(2, 4)).await.unwrap();

        // Malformed frame: wrong protocol id
        let mut bad = request(3, 1);
        bad[3] = 0x01;
        client.write_all(&bad).await.unwrap();

        client.write_all(&request(4, 1)).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(1), read_reply(&mut client))
            .await
            .unwrap();
        assert_eq!(reply, request(4, 1));
    }

    #[tokio::test]
    async fn test_handler_io_failure_keeps_connection_open() {
        let addr = start().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(&request(1, 5)).await.unwrap();
        client.write_all(&request(2, 1)).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(1), read_reply(&mut client))
            .await
            .unwrap();
        assert_eq!(reply, request(2, 1));
    }

    #[tokio::test]
    async fn test_connections_are_independent() {
        let addr = start().await;
        let mut first = TcpStream::connect(addr).await.unwrap();
        let mut second = TcpStream::connect(addr).await.unwrap();

        second.write_all(&request(20, 1)).await.unwrap();
        first.write_all(&request(10, 1)).await.unwrap();

        assert_eq!(read_reply(&mut first).await, request(10, 1));
        assert_eq!(read_reply(&mut second).await, request(20, 1));

        drop(first);
        second.write_all(&request(21, 1)).await.unwrap();
        assert_eq!(read_reply(&mut second).await, request(21, 1));
    }
}
