//! # Errors
//!
//! One error type for everything a caller of this crate can observe. Local
//! validation failures are returned directly from the call that detects them;
//! anything that happens remotely arrives through a `Future`.

use std::fmt;

use alpharpc::FailureReason;
use alpharpc::RpcError;

use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed provider or engine configuration, or an unknown resource type.
    Configuration(String),
    /// A provider with this id is already registered on the engine.
    DuplicateProvider(u16),
    /// The engine does not know this transport selector.
    UnsupportedProtocol(String),
    /// Providers can only be hosted on a server-mode engine.
    NotServer,
    /// The target engine has no provider with this id.
    UnknownProvider(u16),
    /// The provider has no handler for this operation.
    UnknownOperation(String),
    /// Array arguments of unequal length.
    LengthMismatch { x: usize, y: usize, out: usize },
    /// Arguments did not match the operation's parameter types.
    BadArguments(String),
    /// The wait deadline passed before a reply arrived.
    Timeout,
    /// The provider was torn down while the request was pending.
    ProviderShutdown,
    /// The resource reported a failure of its own.
    Resource(String),
    /// Connection-level failure.
    Transport(TransportError),
    /// Frame encoding or decoding failed.
    Rpc(RpcError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            Self::DuplicateProvider(id) => write!(f, "Provider id {} is already registered", id),
            Self::UnsupportedProtocol(p) => write!(f, "Unsupported protocol '{}'", p),
            Self::NotServer => write!(f, "Engine is not in server mode"),
            Self::UnknownProvider(id) => write!(f, "No provider with id {}", id),
            Self::UnknownOperation(op) => write!(f, "Unknown operation '{}'", op),
            Self::LengthMismatch { x, y, out } => {
                write!(f, "Array lengths differ: x={}, y={}, out={}", x, y, out)
            }
            Self::BadArguments(msg) => write!(f, "Bad arguments: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::ProviderShutdown => write!(f, "Provider shut down"),
            Self::Resource(msg) => write!(f, "Resource error: {}", msg),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Rpc(e) => write!(f, "RPC error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Rpc(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self { Self::Transport(e) }
}

impl From<RpcError> for Error {
    fn from(e: RpcError) -> Self { Self::Rpc(e) }
}

impl From<alphapack::Error> for Error {
    fn from(e: alphapack::Error) -> Self { Self::Rpc(RpcError::Serialization(e)) }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self { Self::Configuration(e.to_string()) }
}

impl From<FailureReason> for Error {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::UnknownProvider(id) => Self::UnknownProvider(id),
            FailureReason::UnknownOperation(op) => Self::UnknownOperation(op),
            FailureReason::BadArguments(msg) => Self::BadArguments(msg),
            FailureReason::LengthMismatch { x, y, out } => Self::LengthMismatch {
                x: x as usize,
                y: y as usize,
                out: out as usize,
            },
            FailureReason::ProviderShutdown => Self::ProviderShutdown,
            FailureReason::Resource(msg) => Self::Resource(msg),
            FailureReason::ProtocolViolation(msg) => Self::Rpc(RpcError::ProtocolViolation(msg)),
        }
    }
}

impl Error {
    /// The form this error takes when a provider sends it back in a reply.
    pub(crate) fn to_failure(&self) -> FailureReason {
        match self {
            Self::UnknownProvider(id) => FailureReason::UnknownProvider(*id),
            Self::UnknownOperation(op) => FailureReason::UnknownOperation(op.clone()),
            Self::BadArguments(msg) => FailureReason::BadArguments(msg.clone()),
            Self::LengthMismatch { x, y, out } => FailureReason::LengthMismatch {
                x: *x as u64,
                y: *y as u64,
                out: *out as u64,
            },
            Self::ProviderShutdown => FailureReason::ProviderShutdown,
            Self::Resource(msg) => FailureReason::Resource(msg.clone()),
            other => FailureReason::Resource(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
