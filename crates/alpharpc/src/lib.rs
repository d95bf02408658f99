//! # Alpharpc
//!
//! Call and reply frames for alpha providers, encoded with `alphapack`.
//!
//! ## Architecture
//!
//! - `codec`: translates the small `Val` model to and from the wire, driven by
//!   the `Type` the receiver expects.
//! - `frame`: the envelope. A Call names a provider and an operation and carries
//!   a correlation `seq`; a Reply echoes the `seq` and holds either the result
//!   values or a `FailureReason`.
//! - `error`: local protocol errors (`RpcError`) and remote failures
//!   (`FailureReason`), kept apart on purpose.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::Type;
pub use codec::Val;
pub use codec::decode_val;
pub use codec::decode_vals;
pub use codec::encode_val;
pub use codec::encode_vals;
pub use error::FailureReason;
pub use error::Result;
pub use error::RpcError;
pub use frame::CallDecoder;
pub use frame::CallEncoder;
pub use frame::ReplyDecoder;
pub use frame::ReplyErrEncoder;
pub use frame::ReplyOkEncoder;
pub use frame::RpcFrame;

#[cfg(test)]
mod tests;
