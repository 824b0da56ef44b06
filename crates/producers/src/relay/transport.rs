//! Relay transport - the wire seam of the batched delivery producer
//!
//! The relay producer ships windows of entries through this trait; the
//! protocol adapter behind it is interchangeable (and stubbed in tests).

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use socket2::SockRef;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// One formatted message with its delivery category
#[derive(Debug, Clone)]
pub struct RelayEntry {
    /// Remote category (resolved from the stream map)
    pub category: String,
    /// Formatted payload
    pub payload: Bytes,
}

/// Result of shipping one window
#[derive(Debug)]
pub enum ShipOutcome {
    /// The whole window was accepted
    Delivered,
    /// The remote is throttling; retry with a smaller window
    TryLater,
    /// Transport failure; reconnect before the next attempt
    Failed(std::io::Error),
}

/// Wire seam for the relay producer
#[async_trait]
pub trait RelayTransport: Send {
    /// Whether the connection is currently usable
    fn is_open(&self) -> bool;

    /// Establish the connection
    async fn open(&mut self) -> std::io::Result<()>;

    /// Ship one window of entries
    async fn ship(&mut self, entries: &[RelayEntry]) -> ShipOutcome;

    /// Tear the connection down (forces a reconnect before the next ship)
    fn close(&mut self);
}

/// Length-prefixed TCP transport
///
/// Frame layout per entry, all big-endian:
///
/// ```text
/// [4 bytes] frame length (category + payload)
/// [2 bytes] category length
/// [N bytes] category
/// [M bytes] payload
/// ```
pub struct TcpRelayTransport {
    address: String,
    buffer_size: usize,
    connect_timeout: Duration,
    write_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpRelayTransport {
    /// Transport for `address` (`host:port`) with a send buffer hint
    pub fn new(address: impl Into<String>, buffer_size: usize) -> Self {
        Self {
            address: address.into(),
            buffer_size,
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            stream: None,
        }
    }

    async fn write_frames(&mut self, entries: &[RelayEntry]) -> std::io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "relay not connected"))?;

        for entry in entries {
            let frame_len = (2 + entry.category.len() + entry.payload.len()) as u32;
            stream.write_all(&frame_len.to_be_bytes()).await?;
            stream
                .write_all(&(entry.category.len() as u16).to_be_bytes())
                .await?;
            stream.write_all(entry.category.as_bytes()).await?;
            stream.write_all(&entry.payload).await?;
        }
        stream.flush().await
    }
}

#[async_trait]
impl RelayTransport for TcpRelayTransport {
    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn open(&mut self) -> std::io::Result<()> {
        self.stream = None;

        let stream = match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(std::io::Error::new(
                    ErrorKind::TimedOut,
                    "relay connection timed out",
                ))
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY on relay connection");
        }

        let sock = SockRef::from(&stream);
        if let Err(e) = sock.set_send_buffer_size(self.buffer_size) {
            tracing::debug!(
                error = %e,
                size = self.buffer_size,
                "failed to set relay send buffer size"
            );
        }

        tracing::debug!(address = %self.address, "relay connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn ship(&mut self, entries: &[RelayEntry]) -> ShipOutcome {
        match timeout(self.write_timeout, self.write_frames(entries)).await {
            Ok(Ok(())) => ShipOutcome::Delivered,
            Ok(Err(e)) => {
                self.stream = None;
                ShipOutcome::Failed(e)
            }
            Err(_) => {
                self.stream = None;
                ShipOutcome::Failed(std::io::Error::new(
                    ErrorKind::TimedOut,
                    "relay write timed out",
                ))
            }
        }
    }

    fn close(&mut self) {
        self.stream = None;
    }
}
