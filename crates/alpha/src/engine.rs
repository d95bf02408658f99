//! # Engine
//!
//! The engine is the process-level endpoint: it owns the runtime that drives
//! connections, handlers and timers, holds the provider registry, and in
//! server mode listens for inbound connections at its address.
//!
//! `Engine` is a cheap handle; clones share one endpoint. The endpoint is
//! finalized by `finalize()` or when the last clone is dropped.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::runtime::Handle;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::config::Mode;
use crate::error::Error;
use crate::error::Result;
use crate::fabric;
use crate::provider;
use crate::provider::Registry;
use crate::transport::ChannelTransport;
use crate::transport::Transport;
use crate::transport::TransportError;

/// Protocol selectors served by the in-process fabric.
const SHARED_MEMORY_PROTOCOLS: [&str; 2] = ["sm", "na+sm"];

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    address: String,
    protocol: String,
    mode: Mode,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    providers: Registry,
}

impl Engine {
    /// Starts an engine with default settings for everything but protocol and mode.
    pub fn new(protocol: &str, mode: Mode) -> Result<Self> {
        Self::with_config(EngineConfig {
            protocol: protocol.to_string(),
            mode,
            ..EngineConfig::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        if !SHARED_MEMORY_PROTOCOLS.contains(&config.protocol.as_str()) {
            return Err(Error::UnsupportedProtocol(config.protocol));
        }
        if config.worker_threads == 0 {
            return Err(Error::Configuration("worker_threads must be at least 1".into()));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("alpha-engine")
            .enable_all()
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let handle = runtime.handle().clone();

        let n = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        let address = format!("{}://{}/{}", config.protocol, std::process::id(), n);
        let providers = Registry::default();

        if config.mode == Mode::Server {
            let incoming = fabric::listen(&address)?;
            handle.spawn(accept_loop(incoming, providers.clone()));
        }

        tracing::debug!(address = %address, mode = ?config.mode, threads = config.worker_threads, "engine started");
        Ok(Self {
            inner: Arc::new(EngineInner {
                address,
                protocol: config.protocol,
                mode: config.mode,
                handle,
                runtime: Mutex::new(Some(runtime)),
                providers,
            }),
        })
    }

    /// The address clients use to reach this engine.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn protocol(&self) -> &str {
        &self.inner.protocol
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn is_server(&self) -> bool {
        self.inner.mode == Mode::Server
    }

    /// Ids of the providers currently registered here.
    pub fn provider_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.inner.providers.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Stops listening, shuts every registered provider down and stops the
    /// runtime. Further calls through this engine fail.
    pub fn finalize(&self) {
        self.inner.finalize();
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    pub(crate) fn providers(&self) -> &Registry {
        &self.inner.providers
    }

    /// Runs `task` to completion on the engine runtime.
    ///
    /// From inside any runtime blocking is not possible; the task is spawned
    /// instead and its error, if any, is logged.
    pub(crate) fn run<F>(&self, task: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        if Handle::try_current().is_ok() {
            self.inner.handle.spawn(async move {
                if let Err(e) = task.await {
                    tracing::warn!("background task failed: {}", e);
                }
            });
            return Ok(());
        }
        self.inner.handle.block_on(task)
    }
}

impl EngineInner {
    fn finalize(&self) {
        let Some(runtime) = self.runtime.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };

        if self.mode == Mode::Server {
            fabric::unlisten(&self.address);
        }

        let providers: Vec<_> = self.providers.iter().map(|e| e.value().clone()).collect();
        self.providers.clear();
        if Handle::try_current().is_ok() {
            if !providers.is_empty() {
                tracing::warn!(address = %self.address, "finalized inside a runtime; resources not destroyed");
            }
        } else {
            for state in providers {
                if let Err(e) = runtime.block_on(state.shutdown()) {
                    tracing::warn!("provider shutdown failed: {}", e);
                }
            }
        }

        runtime.shutdown_background();
        tracing::debug!(address = %self.address, "engine finalized");
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("address", &self.inner.address)
            .field("mode", &self.inner.mode)
            .finish()
    }
}

async fn accept_loop(mut incoming: mpsc::UnboundedReceiver<ChannelTransport>, providers: Registry) {
    while let Some(conn) = incoming.recv().await {
        tokio::spawn(serve_connection(Arc::new(conn), providers.clone()));
    }
}

/// Reads calls off one connection. Each call runs in its own task so a slow
/// handler does not hold up calls to other providers.
async fn serve_connection(transport: Arc<dyn Transport>, providers: Registry) {
    loop {
        match transport.recv().await {
            Ok(Some(msg)) => {
                let transport = transport.clone();
                let providers = providers.clone();
                tokio::spawn(async move {
                    let Some(reply) = provider::dispatch(&msg, &providers).await else {
                        return;
                    };
                    if let Err(e) = transport.send(&reply).await {
                        tracing::debug!("reply not delivered: {}", e);
                    }
                });
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("transport error on inbound connection: {}", e);
                break;
            }
        }
    }
}
