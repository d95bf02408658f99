//! # Providers
//!
//! A provider owns one resource and answers calls addressed to its id on the
//! engine it was registered with. The engine keeps the registry; this module
//! holds the per-provider state, the operation table and the dispatcher that
//! turns an inbound Call frame into a Reply frame.
//!
//! Handlers for one provider are serialized by the resource lock. Handlers for
//! different providers run concurrently.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;

use alphapack::Decoder;
use alpharpc::ReplyErrEncoder;
use alpharpc::ReplyOkEncoder;
use alpharpc::RpcFrame;
use alpharpc::Type;
use alpharpc::Val;
use alpharpc::decode_vals;

use crate::config::ProviderConfig;
use crate::config::ResourceSpec;
use crate::engine::Engine;
use crate::error::Error;
use crate::error::Result;
use crate::resource::Resource;
use crate::resource::ResourceFactory;

/// Provider id -> provider, one per engine.
pub(crate) type Registry = Arc<DashMap<u16, Arc<ProviderState>>>;

/// The operations every provider answers, keyed by wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Liveness probe. No arguments, returns unit.
    Check,
    /// `(x: s32, y: s32) -> s32`
    Sum,
    /// `(x: s32, y: s32, timeout_ms: u64) -> s32`. The timeout is enforced by
    /// the caller; the provider computes exactly as for `Sum`.
    SumWithTimeout,
    /// `(x: list<s32>, y: list<s32>, out_len: u64) -> list<s32>`. All three
    /// lengths must agree.
    SumArrays,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Check,
        Operation::Sum,
        Operation::SumWithTimeout,
        Operation::SumArrays,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Check => "check",
            Operation::Sum => "sum",
            Operation::SumWithTimeout => "sum_with_timeout",
            Operation::SumArrays => "sum_arrays",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn params(self) -> Vec<Type> {
        match self {
            Operation::Check => vec![],
            Operation::Sum => vec![Type::S32, Type::S32],
            Operation::SumWithTimeout => vec![Type::S32, Type::S32, Type::U64],
            Operation::SumArrays => vec![
                Type::list_of(Type::S32),
                Type::list_of(Type::S32),
                Type::U64,
            ],
        }
    }

    pub fn result(self) -> Type {
        match self {
            Operation::Check => Type::Unit,
            Operation::Sum | Operation::SumWithTimeout => Type::S32,
            Operation::SumArrays => Type::list_of(Type::S32),
        }
    }
}

/// What the registry holds for one provider.
pub(crate) struct ProviderState {
    id: u16,
    /// `None` once the provider has been shut down.
    resource: Mutex<Option<Box<dyn Resource>>>,
    /// Set before shutdown queues on the lock, so handlers queued ahead of it bail out.
    closing: AtomicBool,
    config: ProviderConfig,
}

impl ProviderState {
    async fn invoke(&self, op: Operation, args: Vec<Val>) -> Result<Val> {
        let mut guard = self.resource.lock().await;
        let Some(resource) = guard.as_mut() else {
            return Err(Error::ProviderShutdown);
        };
        if self.closing.load(Ordering::Acquire) {
            return Err(Error::ProviderShutdown);
        }

        match (op, args.as_slice()) {
            (Operation::Check, []) => Ok(Val::Unit),
            (Operation::Sum, [Val::S32(x), Val::S32(y)])
            | (Operation::SumWithTimeout, [Val::S32(x), Val::S32(y), Val::U64(_)]) => {
                Ok(Val::S32(resource.compute_sum(*x, *y).await?))
            }
            (Operation::SumArrays, [x, y, Val::U64(out_len)]) => {
                let x = s32_items(x)?;
                let y = s32_items(y)?;
                let out = *out_len as usize;
                if x.len() != y.len() || x.len() != out {
                    return Err(Error::LengthMismatch { x: x.len(), y: y.len(), out });
                }
                let sums = resource.compute_sums(&x, &y).await?;
                Ok(Val::s32_list(&sums))
            }
            (op, args) => Err(Error::BadArguments(format!(
                "{} does not take {} arguments of these types", op.name(), args.len()
            ))),
        }
    }

    /// Releases the resource once no handler holds it. Calls still queued on
    /// the lock find it gone and fail with `ProviderShutdown`.
    pub(crate) async fn shutdown(&self) -> Result<()> {
        self.closing.store(true, Ordering::Release);
        let mut guard = self.resource.lock().await;
        let Some(mut resource) = guard.take() else {
            return Ok(());
        };
        tracing::debug!(provider = self.id, "destroying resource");
        resource.destroy().await
    }
}

fn s32_items(val: &Val) -> Result<Vec<i32>> {
    val.clone()
        .into_s32_vec()
        .map_err(|e| Error::BadArguments(e.to_string()))
}

/// A resource served under a provider id on a server engine.
///
/// Dropping the provider deregisters it and destroys its resource.
pub struct Provider {
    engine: Engine,
    id: u16,
    state: Option<Arc<ProviderState>>,
}

impl Provider {
    /// Creates a provider using the resource types built into this crate.
    pub fn new(engine: &Engine, provider_id: u16, config: ProviderConfig) -> Result<Self> {
        Self::with_factory(engine, provider_id, config, &ResourceFactory::with_builtins())
    }

    pub fn with_factory(
        engine: &Engine,
        provider_id: u16,
        config: ProviderConfig,
        factory: &ResourceFactory,
    ) -> Result<Self> {
        if !engine.is_server() {
            return Err(Error::NotServer);
        }
        let ResourceSpec { kind, config: params } = config.resource;
        if !factory.knows(&kind) {
            return Err(Error::Configuration(format!("Unknown resource type {}", kind)));
        }

        let state = match engine.providers().entry(provider_id) {
            Entry::Occupied(_) => return Err(Error::DuplicateProvider(provider_id)),
            Entry::Vacant(slot) => {
                let resource = factory.create(&kind, &params)?;
                let config = ProviderConfig {
                    resource: ResourceSpec {
                        kind: resource.name().to_string(),
                        config: resource.config(),
                    },
                };
                let state = Arc::new(ProviderState {
                    id: provider_id,
                    resource: Mutex::new(Some(resource)),
                    closing: AtomicBool::new(false),
                    config,
                });
                slot.insert(state.clone());
                state
            }
        };

        tracing::info!(provider = provider_id, kind = %kind, address = engine.address(), "provider registered");
        Ok(Self { engine: engine.clone(), id: provider_id, state: Some(state) })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The resource type and its configuration, as JSON.
    pub fn config(&self) -> String {
        match &self.state {
            Some(state) => state.config.to_json(),
            None => String::new(),
        }
    }

    /// Deregisters the provider, waits for any running handler, then destroys
    /// the resource.
    pub fn shutdown(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        self.engine.providers().remove_if(&self.id, |_, registered| Arc::ptr_eq(registered, &state));
        tracing::info!(provider = self.id, "provider shutting down");
        self.engine.run(async move { state.shutdown().await })
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::warn!(provider = self.id, "shutdown failed: {}", e);
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("address", &self.engine.address())
            .finish()
    }
}

/// A Call frame with its arguments decoded, ready to run off the receive path.
struct Request {
    seq: u64,
    provider: u16,
    op: String,
    call: Result<(Operation, Vec<Val>)>,
}

fn parse_request(msg: &[u8]) -> std::result::Result<Request, String> {
    let mut dec = Decoder::new(msg);
    let frame = RpcFrame::decode(&mut dec).map_err(|e| e.to_string())?;
    let RpcFrame::Call(call) = frame else {
        return Err("server received a Reply frame".into());
    };

    let parsed = match Operation::from_name(call.op) {
        None => Err(Error::UnknownOperation(call.op.to_string())),
        Some(op) => decode_vals(call.args, &op.params())
            .map(|args| (op, args))
            .map_err(|e| Error::BadArguments(e.to_string())),
    };

    Ok(Request {
        seq: call.seq,
        provider: call.provider,
        op: call.op.to_string(),
        call: parsed,
    })
}

/// Answers one inbound payload. Returns the encoded reply, or `None` if the
/// payload is not a Call frame this side can reply to.
pub(crate) async fn dispatch(msg: &[u8], registry: &Registry) -> Option<Vec<u8>> {
    let request = match parse_request(msg) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("discarding malformed call: {}", e);
            return None;
        }
    };
    let Request { seq, provider, op, call } = request;

    let outcome = match call {
        Err(e) => Err(e),
        Ok((operation, args)) => {
            // Cloned out so the registry shard is not held across the handler.
            let state = registry.get(&provider).map(|entry| entry.value().clone());
            match state {
                None => Err(Error::UnknownProvider(provider)),
                Some(state) => {
                    tracing::trace!(provider, op = %op, seq, "dispatching");
                    state.invoke(operation, args).await
                }
            }
        }
    };

    let encoded = match &outcome {
        Ok(val) => ReplyOkEncoder::new(seq, std::slice::from_ref(val)).into_bytes(),
        Err(e) => {
            tracing::debug!(provider, op = %op, seq, "call failed: {}", e);
            ReplyErrEncoder::new(seq, &e.to_failure()).into_bytes()
        }
    };

    match encoded {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::error!(provider, seq, "could not encode reply: {}", e);
            None
        }
    }
}
