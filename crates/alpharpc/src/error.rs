//! # Errors
//!
//! `RpcError` is this side failing to speak the protocol. `FailureReason` is the
//! other side saying no: it travels inside a Reply frame.

use alphapack::Error as PackError;

/// Local failures while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The underlying alphapack layer failed.
    Serialization(PackError),
    /// A value did not have the shape the receiver expected.
    TypeMismatch { expected: String, found: String },
    /// An unknown top-level frame or failure variant.
    UnknownVariant(String),
    /// Missing or malformed envelope fields.
    ProtocolViolation(String),
    /// Values nested deeper than the codec accepts.
    RecursionLimitExceeded,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "serialization failed: {}", e),
            Self::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {}, found {}", expected, found)
            }
            Self::UnknownVariant(name) => write!(f, "unknown variant '{}'", name),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            Self::RecursionLimitExceeded => write!(f, "value nesting too deep"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PackError> for RpcError {
    fn from(e: PackError) -> Self { Self::Serialization(e) }
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// Why a provider refused or failed a call. Carried in the Err arm of a Reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No provider with this id is registered on the target engine.
    UnknownProvider(u16),
    /// The provider has no handler for this operation name.
    UnknownOperation(String),
    /// Arguments did not decode against the operation's parameter types.
    BadArguments(String),
    /// Array arguments of unequal length.
    LengthMismatch { x: u64, y: u64, out: u64 },
    /// The provider was torn down before the call could run.
    ProviderShutdown,
    /// The resource itself reported an error.
    Resource(String),
    /// The call frame could not be understood.
    ProtocolViolation(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownProvider(id) => write!(f, "no provider with id {}", id),
            Self::UnknownOperation(op) => write!(f, "unknown operation '{}'", op),
            Self::BadArguments(msg) => write!(f, "bad arguments: {}", msg),
            Self::LengthMismatch { x, y, out } => {
                write!(f, "array lengths differ (x={}, y={}, out={})", x, y, out)
            }
            Self::ProviderShutdown => write!(f, "provider shut down"),
            Self::Resource(msg) => write!(f, "resource error: {}", msg),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
        }
    }
}
