//! # Transport Abstraction
//!
//! A minimal, async interface for moving bytes between engines.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: A transport knows nothing about frames, operations or
//!   providers. It moves opaque buffers.
//! - **Duplex**: Either side may send at any time; replies are matched to calls
//!   above this layer, by correlation id, so many calls can share one connection.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc;

/// Errors that occur at the connection layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing is listening at this address.
    Unreachable(String),
    /// The peer went away or the connection was dropped.
    ConnectionLost(String),
    /// Generic I/O failure inside the transport.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(addr) => write!(f, "No endpoint listening at {}", addr),
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// One end of a connection.
///
/// Object safe, so connections are passed around as `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues a payload for the other end.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Waits for the next payload. `Ok(None)` means the other end hung up.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}

/// An in-process duplex connection built on unbounded tokio channels.
///
/// Payloads sent on one end appear on the other end's `recv`, in order.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl ChannelTransport {
    /// Creates two connected ends.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self { tx: tx_a, rx: Arc::new(Mutex::new(rx_b)) };
        let b = Self { tx: tx_b, rx: Arc::new(Mutex::new(rx_a)) };

        (a, b)
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, payload: &[u8]) -> Result<()> {
        self.tx
            .send(payload.to_vec())
            .map_err(|_| TransportError::ConnectionLost("channel closed".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}
