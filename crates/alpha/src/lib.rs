//! # Alpha
//!
//! Remote resource providers over an asynchronous request/response core.
//!
//! A server process creates an `Engine` and registers `Provider`s on it, each
//! owning one `Resource` under a small integer id. A client process creates
//! its own `Engine`, a `Client`, and `ResourceHandle`s naming
//! `(address, provider_id)`. Every handle method returns a `Future` at once;
//! `wait` blocks the calling thread until the reply, a failure or a timeout.
//!
//! ```no_run
//! use alpha::{Client, Engine, Mode, Provider, ProviderConfig};
//!
//! # fn main() -> alpha::Result<()> {
//! let server = Engine::new("na+sm", Mode::Server)?;
//! let config = ProviderConfig::from_json(r#"{"resource":{"type":"dummy"}}"#)?;
//! let _provider = Provider::new(&server, 42, config)?;
//!
//! let engine = Engine::new("na+sm", Mode::Client)?;
//! let client = Client::new(&engine);
//! let handle = client.make_resource_handle(server.address(), 42);
//! assert_eq!(handle.compute_sum(34, 56).wait()?, 90);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dummy;
pub mod engine;
pub mod error;
pub mod future;
pub mod provider;
pub mod resource;
pub mod transport;

mod fabric;
mod peer;

pub use client::Client;
pub use client::ResourceHandle;
pub use config::EngineConfig;
pub use config::Mode;
pub use config::ProviderConfig;
pub use config::ResourceSpec;
pub use dummy::DummyResource;
pub use engine::Engine;
pub use error::Error;
pub use error::Result;
pub use future::Future;
pub use future::FutureState;
pub use future::ScatterFuture;
pub use provider::Operation;
pub use provider::Provider;
pub use resource::Resource;
pub use resource::ResourceFactory;
pub use transport::ChannelTransport;
pub use transport::Transport;
pub use transport::TransportError;
