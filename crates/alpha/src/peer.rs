//! # Client Peer with Async Pump
//!
//! A `Peer` is one client connection to one server engine. Calls are written
//! straight to the transport; a background pump reads replies and settles the
//! matching `Future` by sequence number.
//!
//! A reply whose sequence number is no longer pending (the caller timed out or
//! dropped its future) is discarded. When the connection closes every pending
//! call fails with the transport error.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::runtime::Handle;

use alphapack::Decoder;
use alpharpc::CallEncoder;
use alpharpc::RpcError;
use alpharpc::RpcFrame;
use alpharpc::Type;
use alpharpc::Val;
use alpharpc::decode_vals;

use crate::error::Error;
use crate::error::Result;
use crate::future::Completer;
use crate::provider::Operation;
use crate::transport::Transport;
use crate::transport::TransportError;

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

/// How the result of a call reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The decoded value is handed to the future as is.
    Value,
    /// The value is a list of exactly `len` integers, to be written into a
    /// caller buffer of that length.
    Scatter { len: usize },
}

struct PendingCall {
    result: Type,
    delivery: Delivery,
    completer: Completer,
}

type PendingMap = DashMap<u64, PendingCall>;

/// Client connection with a background reply pump.
pub(crate) struct Peer {
    id: u64,
    address: String,
    transport: Arc<dyn Transport>,
    pending: Arc<PendingMap>,
    next_seq: AtomicU64,
}

impl Peer {
    /// Wraps a connected transport and starts its pump on `handle`.
    ///
    /// `on_close` runs once, with this peer's id, when the connection is gone.
    pub fn new(
        address: &str,
        transport: Arc<dyn Transport>,
        handle: &Handle,
        on_close: impl FnOnce(u64) + Send + 'static,
    ) -> Arc<Self> {
        let id = NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::new(PendingMap::new());

        let pump = Pump {
            peer: id,
            address: address.to_string(),
            transport: transport.clone(),
            pending: pending.clone(),
            on_close: Some(Box::new(on_close)),
        };
        handle.spawn(pump.run());

        tracing::debug!(peer = id, address, "connected");
        Arc::new(Self {
            id,
            address: address.to_string(),
            transport,
            pending,
            next_seq: AtomicU64::new(1),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sends one call. Every outcome is reported through `completer`: a send
    /// failure fails it here, anything else is settled by the pump.
    pub async fn call(
        &self,
        provider: u16,
        op: Operation,
        args: &[Val],
        delivery: Delivery,
        completer: Completer,
    ) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let payload = match CallEncoder::new(seq, provider, op.name(), args).into_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                completer.fail(e.into());
                return;
            }
        };

        self.pending.insert(seq, PendingCall {
            result: op.result(),
            delivery,
            completer: completer.clone(),
        });

        // A cancelled or abandoned future forgets its slot, so a late reply finds nothing.
        let pending = Arc::downgrade(&self.pending);
        completer.on_release(move || {
            if let Some(pending) = pending.upgrade() {
                pending.remove(&seq);
            }
        });

        tracing::trace!(peer = self.id, provider, op = op.name(), seq, "sending call");
        if let Err(e) = self.transport.send(&payload).await {
            tracing::warn!(peer = self.id, address = %self.address, "send failed: {}", e);
            if let Some((_, call)) = self.pending.remove(&seq) {
                call.completer.fail(e.into());
            }
        }
    }
}

/// The receive half of a peer. Dropping it, whether the loop ended or the
/// runtime went away, fails whatever is still pending.
struct Pump {
    peer: u64,
    address: String,
    transport: Arc<dyn Transport>,
    pending: Arc<PendingMap>,
    on_close: Option<Box<dyn FnOnce(u64) + Send>>,
}

impl Pump {
    async fn run(self) {
        loop {
            match self.transport.recv().await {
                Ok(Some(msg)) => {
                    if let Err(e) = handle_message(&msg, &self.pending) {
                        tracing::error!(peer = self.peer, "dropping connection: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!(peer = self.peer, address = %self.address, "connection closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(peer = self.peer, "transport error in pump: {}", e);
                    break;
                }
            }
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        let error = Error::Transport(TransportError::ConnectionLost(format!(
            "connection to {} closed", self.address
        )));
        // Evict first, so a caller woken by the failure reconnects on its next call.
        if let Some(on_close) = self.on_close.take() {
            on_close(self.peer);
        }
        notify_all_pending(&self.pending, error);
    }
}

fn notify_all_pending(pending: &PendingMap, error: Error) {
    let keys: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
    for key in keys {
        if let Some((_, call)) = pending.remove(&key) {
            call.completer.fail(error.clone());
        }
    }
}

/// Routes one reply frame. An error here means the stream itself is unusable.
fn handle_message(msg: &[u8], pending: &PendingMap) -> std::result::Result<(), RpcError> {
    let mut dec = Decoder::new(msg);
    let RpcFrame::Reply(reply) = RpcFrame::decode(&mut dec)? else {
        return Err(RpcError::ProtocolViolation("client received a Call frame".into()));
    };

    let Some((_, call)) = pending.remove(&reply.seq) else {
        tracing::debug!(seq = reply.seq, "discarding reply with no pending call");
        return Ok(());
    };

    let outcome = match reply.status {
        Ok(results) => decode_result(results, &call),
        Err(reason) => Err(Error::from(reason)),
    };
    call.completer.settle(outcome);
    Ok(())
}

fn decode_result(results: Decoder, call: &PendingCall) -> Result<Val> {
    let mut vals = decode_vals(results, std::slice::from_ref(&call.result))?;
    let val = vals.pop().ok_or_else(|| RpcError::ProtocolViolation("empty results".into()))?;

    if let Delivery::Scatter { len } = call.delivery {
        let got = match &val {
            Val::List(items) => items.len(),
            _ => 0,
        };
        if got != len {
            return Err(RpcError::ProtocolViolation(format!(
                "expected {} output values, got {}", len, got
            ))
            .into());
        }
    }
    Ok(val)
}
