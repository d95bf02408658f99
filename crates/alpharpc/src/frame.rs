//! # Protocol Frames
//!
//! The envelope around every message.
//!
//! ```text
//! Call  := Variant("Call",  Map { seq: u64, provider: u16, op: str, args: List })
//! Reply := Variant("Reply", Ok(Map { seq: u64, results: List })
//!                         | Err(Map { seq: u64, reason: Variant }))
//! ```
//!
//! ## Invariants
//! - **Panic Safety**: Decoding returns `Result` on any malformed input.
//! - **Forward Compatibility**: Unknown header fields are skipped.

use alphapack::Decoder;
use alphapack::Encoder;

use crate::codec::Val;
use crate::codec::encode_vals;
use crate::error::FailureReason;
use crate::error::Result;
use crate::error::RpcError;

/// Encodes an outbound Call frame.
pub struct CallEncoder<'a> {
    pub seq: u64,
    pub provider: u16,
    pub op: &'a str,
    pub args: &'a [Val],
}

impl<'a> CallEncoder<'a> {
    pub fn new(seq: u64, provider: u16, op: &'a str, args: &'a [Val]) -> Self {
        Self { seq, provider, op, args }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Call")?;
        enc.map_begin()?;

        enc.variant_begin("seq")?;
        enc.u64(self.seq)?;
        enc.variant_end()?;

        enc.variant_begin("provider")?;
        enc.u16(self.provider)?;
        enc.variant_end()?;

        enc.variant_begin("op")?;
        enc.str(self.op)?;
        enc.variant_end()?;

        enc.variant_begin("args")?;
        encode_vals(enc, self.args)?;
        enc.variant_end()?;

        enc.map_end()?;
        enc.variant_end()?;
        Ok(())
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        Ok(enc.into_bytes()?)
    }
}

/// A decoded Call header. Arguments stay encoded until the handler knows their types.
#[derive(Debug)]
pub struct CallDecoder<'a> {
    pub seq: u64,
    pub provider: u16,
    pub op: &'a str,
    /// Feed to `decode_vals` with the operation's parameter types.
    pub args: Decoder<'a>,
}

impl<'a> CallDecoder<'a> {
    fn decode(mut body: Decoder<'a>) -> Result<Self> {
        let mut map = body.map()?;
        let mut seq = None;
        let mut provider = None;
        let mut op = None;
        let mut args = None;

        while let Some((key, mut val)) = map.next()? {
            match key {
                "seq" => seq = Some(val.u64()?),
                "provider" => provider = Some(val.u16()?),
                "op" => op = Some(val.str()?),
                "args" => args = Some(val),
                _ => val.skip()?,
            }
        }

        Ok(Self {
            seq: seq.ok_or(missing("seq"))?,
            provider: provider.ok_or(missing("provider"))?,
            op: op.ok_or(missing("op"))?,
            args: args.ok_or(missing("args"))?,
        })
    }
}

/// Encodes a successful Reply.
pub struct ReplyOkEncoder<'a> {
    pub seq: u64,
    pub results: &'a [Val],
}

impl<'a> ReplyOkEncoder<'a> {
    pub fn new(seq: u64, results: &'a [Val]) -> Self {
        Self { seq, results }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Reply")?;
        enc.ok_begin()?;
        enc.map_begin()?;

        enc.variant_begin("seq")?;
        enc.u64(self.seq)?;
        enc.variant_end()?;

        enc.variant_begin("results")?;
        encode_vals(enc, self.results)?;
        enc.variant_end()?;

        enc.map_end()?;
        enc.ok_end()?;
        enc.variant_end()?;
        Ok(())
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        Ok(enc.into_bytes()?)
    }
}

/// Encodes a failed Reply.
pub struct ReplyErrEncoder<'a> {
    pub seq: u64,
    pub reason: &'a FailureReason,
}

impl<'a> ReplyErrEncoder<'a> {
    pub fn new(seq: u64, reason: &'a FailureReason) -> Self {
        Self { seq, reason }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Reply")?;
        enc.err_begin()?;
        enc.map_begin()?;

        enc.variant_begin("seq")?;
        enc.u64(self.seq)?;
        enc.variant_end()?;

        enc.variant_begin("reason")?;
        encode_reason(enc, self.reason)?;
        enc.variant_end()?;

        enc.map_end()?;
        enc.err_end()?;
        enc.variant_end()?;
        Ok(())
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        Ok(enc.into_bytes()?)
    }
}

/// A decoded Reply header.
#[derive(Debug)]
pub struct ReplyDecoder<'a> {
    pub seq: u64,
    /// `Ok` holds the results list for `decode_vals`; `Err` the remote failure.
    pub status: std::result::Result<Decoder<'a>, FailureReason>,
}

impl<'a> ReplyDecoder<'a> {
    fn decode(mut body: Decoder<'a>) -> Result<Self> {
        let (mut arm, ok) = match body.result()? {
            Ok(arm) => (arm, true),
            Err(arm) => (arm, false),
        };

        let mut map = arm.map()?;
        let mut seq = None;
        let mut results = None;
        let mut reason = None;

        while let Some((key, mut val)) = map.next()? {
            match key {
                "seq" => seq = Some(val.u64()?),
                "results" if ok => results = Some(val),
                "reason" if !ok => reason = Some(decode_reason(&mut val)?),
                _ => val.skip()?,
            }
        }

        let seq = seq.ok_or(missing("seq"))?;
        let status = if ok {
            Ok(results.ok_or(missing("results"))?)
        } else {
            Err(reason.ok_or(missing("reason"))?)
        };
        Ok(Self { seq, status })
    }
}

/// Either kind of frame, decided by the outermost variant name.
#[derive(Debug)]
pub enum RpcFrame<'a> {
    Call(CallDecoder<'a>),
    Reply(ReplyDecoder<'a>),
}

impl<'a> RpcFrame<'a> {
    pub fn decode(dec: &mut Decoder<'a>) -> Result<Self> {
        let (kind, body) = dec.variant()?;
        match kind {
            "Call" => Ok(RpcFrame::Call(CallDecoder::decode(body)?)),
            "Reply" => Ok(RpcFrame::Reply(ReplyDecoder::decode(body)?)),
            other => Err(RpcError::UnknownVariant(other.to_string())),
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            RpcFrame::Call(call) => call.seq,
            RpcFrame::Reply(reply) => reply.seq,
        }
    }
}

fn encode_reason(enc: &mut Encoder, reason: &FailureReason) -> Result<()> {
    match reason {
        FailureReason::UnknownProvider(id) => {
            enc.variant_begin("UnknownProvider")?;
            enc.u16(*id)?;
        }
        FailureReason::UnknownOperation(op) => {
            enc.variant_begin("UnknownOperation")?;
            enc.str(op)?;
        }
        FailureReason::BadArguments(msg) => {
            enc.variant_begin("BadArguments")?;
            enc.str(msg)?;
        }
        FailureReason::LengthMismatch { x, y, out } => {
            enc.variant_begin("LengthMismatch")?;
            enc.list_begin()?;
            enc.u64(*x)?;
            enc.u64(*y)?;
            enc.u64(*out)?;
            enc.list_end()?;
        }
        FailureReason::ProviderShutdown => {
            enc.variant_begin("ProviderShutdown")?;
            enc.unit()?;
        }
        FailureReason::Resource(msg) => {
            enc.variant_begin("Resource")?;
            enc.str(msg)?;
        }
        FailureReason::ProtocolViolation(msg) => {
            enc.variant_begin("ProtocolViolation")?;
            enc.str(msg)?;
        }
    }
    enc.variant_end()?;
    Ok(())
}

fn decode_reason(dec: &mut Decoder) -> Result<FailureReason> {
    let (name, mut payload) = dec.variant()?;
    let reason = match name {
        "UnknownProvider" => FailureReason::UnknownProvider(payload.u16()?),
        "UnknownOperation" => FailureReason::UnknownOperation(payload.str()?.to_string()),
        "BadArguments" => FailureReason::BadArguments(payload.str()?.to_string()),
        "LengthMismatch" => {
            let mut lens = payload.list()?;
            let mut next = || -> Result<u64> {
                let mut item = lens.next()?.ok_or(missing("length"))?;
                Ok(item.u64()?)
            };
            let (x, y, out) = (next()?, next()?, next()?);
            FailureReason::LengthMismatch { x, y, out }
        }
        "ProviderShutdown" => {
            payload.unit()?;
            FailureReason::ProviderShutdown
        }
        "Resource" => FailureReason::Resource(payload.str()?.to_string()),
        "ProtocolViolation" => FailureReason::ProtocolViolation(payload.str()?.to_string()),
        other => return Err(RpcError::UnknownVariant(other.to_string())),
    };
    Ok(reason)
}

fn missing(field: &str) -> RpcError {
    RpcError::ProtocolViolation(format!("missing {}", field))
}
