//! # Client and Resource Handles
//!
//! A `Client` hands out `ResourceHandle`s and keeps one connection per server
//! address, opened on first use and reopened after it drops.
//!
//! Handle methods never block and never fail directly. Each one queues a
//! submit task on the engine runtime and returns a `Future`; connection and
//! encoding failures arrive through that future like any remote failure.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use dashmap::DashMap;

use alpharpc::Val;

use crate::engine::Engine;
use crate::error::Error;
use crate::error::Result;
use crate::fabric;
use crate::future;
use crate::future::Completer;
use crate::future::Future;
use crate::future::ScatterFuture;
use crate::peer::Delivery;
use crate::peer::Peer;
use crate::provider::Operation;
use crate::transport::TransportError;

type Peers = DashMap<String, Arc<Peer>>;

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    engine: Engine,
    peers: Arc<Peers>,
}

impl Client {
    pub fn new(engine: &Engine) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                engine: engine.clone(),
                peers: Arc::new(Peers::new()),
            }),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// A handle on provider `provider_id` at `address`. Nothing is contacted
    /// until the first call.
    pub fn make_resource_handle(&self, address: &str, provider_id: u16) -> ResourceHandle {
        ResourceHandle {
            client: self.clone(),
            address: Arc::from(address),
            provider_id,
        }
    }

    fn peer(&self, address: &str) -> Result<Arc<Peer>> {
        if let Some(peer) = self.inner.peers.get(address) {
            return Ok(peer.value().clone());
        }
        let entry = self
            .inner
            .peers
            .entry(address.to_string())
            .or_try_insert_with(|| self.connect(address))?;
        Ok(entry.value().clone())
    }

    fn connect(&self, address: &str) -> Result<Arc<Peer>> {
        let transport = fabric::connect(address)?;

        // Evict only the peer that closed; a replacement may already be in the map.
        let peers = Arc::downgrade(&self.inner.peers);
        let key = address.to_string();
        let on_close = move |id: u64| {
            if let Some(peers) = peers.upgrade() {
                peers.remove_if(&key, |_, peer| peer.id() == id);
            }
        };

        Ok(Peer::new(address, Arc::new(transport), self.inner.engine.handle(), on_close))
    }
}

/// Fails a call whose submit task is dropped before the call reaches a peer.
struct Unsent(Option<Completer>);

impl Drop for Unsent {
    fn drop(&mut self) {
        if let Some(completer) = self.0.take() {
            completer.fail(Error::Transport(TransportError::ConnectionLost(
                "engine shut down before the call was sent".into(),
            )));
        }
    }
}

/// Client-side proxy for one remote provider.
///
/// Cheap to clone. Dropping a handle never contacts the server.
#[derive(Clone)]
pub struct ResourceHandle {
    client: Client,
    address: Arc<str>,
    provider_id: u16,
}

impl ResourceHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn provider_id(&self) -> u16 {
        self.provider_id
    }

    /// Asks the provider whether it is alive and serving.
    pub fn check(&self) -> Future<()> {
        self.submit(Operation::Check, vec![], Delivery::Value, |_| Ok(()))
    }

    /// `x + y`, wrapping on overflow.
    pub fn compute_sum(&self, x: i32, y: i32) -> Future<i32> {
        let args = vec![Val::S32(x), Val::S32(y)];
        self.submit(Operation::Sum, args, Delivery::Value, |val| Ok(val.into_s32()?))
    }

    /// Like `compute_sum`, but the returned future gives up after `timeout`
    /// with `Error::Timeout`. The provider still runs the call; its reply is
    /// then discarded.
    pub fn compute_sum_with_timeout(&self, x: i32, y: i32, timeout: Duration) -> Future<i32> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let args = vec![Val::S32(x), Val::S32(y), Val::U64(timeout_ms)];
        let (future, completer) = self.start(Operation::SumWithTimeout, args, Delivery::Value, |val| {
            Ok(val.into_s32()?)
        });

        self.client.engine().handle().spawn(async move {
            tokio::time::sleep(timeout).await;
            if completer.cancel(Error::Timeout) {
                tracing::debug!(?timeout, "call timed out");
            }
        });
        future.with_deadline(Instant::now() + timeout)
    }

    /// Pairwise sums of `x` and `y`, written into `out` when the returned
    /// future is waited on. All three slices must have the same length;
    /// otherwise the future fails with `Error::LengthMismatch`.
    pub fn compute_sums<'a>(&self, x: &[i32], y: &[i32], out: &'a mut [i32]) -> ScatterFuture<'a> {
        let args = vec![Val::s32_list(x), Val::s32_list(y), Val::U64(out.len() as u64)];
        let delivery = Delivery::Scatter { len: out.len() };
        let inner = self.submit(Operation::SumArrays, args, delivery, |val| Ok(val.into_s32_vec()?));
        ScatterFuture::new(inner, out)
    }

    fn submit<T>(
        &self,
        op: Operation,
        args: Vec<Val>,
        delivery: Delivery,
        convert: fn(Val) -> Result<T>,
    ) -> Future<T> {
        self.start(op, args, delivery, convert).0
    }

    fn start<T>(
        &self,
        op: Operation,
        args: Vec<Val>,
        delivery: Delivery,
        convert: fn(Val) -> Result<T>,
    ) -> (Future<T>, Completer) {
        let (future, completer) = future::pair(convert);
        let client = self.client.clone();
        let address = self.address.clone();
        let provider = self.provider_id;
        let mut unsent = Unsent(Some(completer.clone()));

        self.client.engine().handle().spawn(async move {
            let peer = match client.peer(&address) {
                Ok(peer) => peer,
                Err(e) => {
                    tracing::debug!(address = %address, provider, "connect failed: {}", e);
                    if let Some(completer) = unsent.0.take() {
                        completer.fail(e);
                    }
                    return;
                }
            };
            if let Some(completer) = unsent.0.take() {
                peer.call(provider, op, &args, delivery, completer).await;
            }
        });

        (future, completer)
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("address", &self.address)
            .field("provider_id", &self.provider_id)
            .finish()
    }
}
