//! # Codec
//!
//! Translation between `Val` and the alphapack wire format.
//!
//! ## Invariants
//! - **Type Strictness**: Decoding is driven by the expected `Type`; the wire
//!   tag must agree with it.
//! - **Bounded Recursion**: Nesting beyond `MAX_DEPTH` is rejected in both directions.

use alphapack::Decoder;
use alphapack::Encoder;

use crate::error::Result;
use crate::error::RpcError;

const MAX_DEPTH: usize = 16;

/// A value crossing the wire as an argument or result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Val {
    Unit,
    Bool(bool),
    S32(i32),
    U32(u32),
    U64(u64),
    String(String),
    List(Vec<Val>),
}

impl Val {
    /// Shorthand for a list of `S32`.
    pub fn s32_list(items: &[i32]) -> Self {
        Val::List(items.iter().copied().map(Val::S32).collect())
    }

    pub fn into_s32(self) -> Result<i32> {
        match self {
            Val::S32(v) => Ok(v),
            other => Err(mismatch("s32", &other)),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        match self {
            Val::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }

    /// Unpacks a list of `S32` into plain integers.
    pub fn into_s32_vec(self) -> Result<Vec<i32>> {
        match self {
            Val::List(items) => items.into_iter().map(Val::into_s32).collect(),
            other => Err(mismatch("list<s32>", &other)),
        }
    }

    fn desc(&self) -> &'static str {
        match self {
            Val::Unit => "unit",
            Val::Bool(_) => "bool",
            Val::S32(_) => "s32",
            Val::U32(_) => "u32",
            Val::U64(_) => "u64",
            Val::String(_) => "string",
            Val::List(_) => "list",
        }
    }
}

/// The shape a receiver expects for a `Val`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Unit,
    Bool,
    S32,
    U32,
    U64,
    String,
    List(Box<Type>),
}

impl Type {
    pub fn list_of(inner: Type) -> Self {
        Type::List(Box::new(inner))
    }
}

pub fn encode_val(enc: &mut Encoder, val: &Val) -> Result<()> {
    encode_at(enc, val, 0)
}

fn encode_at(enc: &mut Encoder, val: &Val, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(RpcError::RecursionLimitExceeded);
    }
    match val {
        Val::Unit => enc.unit()?,
        Val::Bool(b) => enc.bool(*b)?,
        Val::S32(v) => enc.s32(*v)?,
        Val::U32(v) => enc.u32(*v)?,
        Val::U64(v) => enc.u64(*v)?,
        Val::String(s) => enc.str(s)?,
        Val::List(items) => {
            enc.list_begin()?;
            for item in items {
                encode_at(enc, item, depth + 1)?;
            }
            enc.list_end()?;
        }
    }
    Ok(())
}

/// Writes `vals` as one list, the layout used for call arguments and reply results.
pub fn encode_vals(enc: &mut Encoder, vals: &[Val]) -> Result<()> {
    enc.list_begin()?;
    for val in vals {
        encode_val(enc, val)?;
    }
    enc.list_end()?;
    Ok(())
}

pub fn decode_val(dec: &mut Decoder, ty: &Type) -> Result<Val> {
    decode_at(dec, ty, 0)
}

fn decode_at(dec: &mut Decoder, ty: &Type, depth: usize) -> Result<Val> {
    if depth > MAX_DEPTH {
        return Err(RpcError::RecursionLimitExceeded);
    }
    let val = match ty {
        Type::Unit => { dec.unit()?; Val::Unit }
        Type::Bool => Val::Bool(dec.bool()?),
        Type::S32 => Val::S32(dec.s32()?),
        Type::U32 => Val::U32(dec.u32()?),
        Type::U64 => Val::U64(dec.u64()?),
        Type::String => Val::String(dec.str()?.to_string()),
        Type::List(inner) => {
            let mut iter = dec.list()?;
            let mut items = Vec::new();
            while let Some(mut item) = iter.next()? {
                items.push(decode_at(&mut item, inner, depth + 1)?);
            }
            Val::List(items)
        }
    };
    Ok(val)
}

/// Decodes a list of values, one per expected type. The counts must match exactly.
pub fn decode_vals(mut list: Decoder, types: &[Type]) -> Result<Vec<Val>> {
    let mut iter = list.list()?;
    let mut vals = Vec::with_capacity(types.len());

    for ty in types {
        let Some(mut item) = iter.next()? else {
            return Err(RpcError::ProtocolViolation(format!(
                "expected {} values, got {}", types.len(), vals.len()
            )));
        };
        vals.push(decode_val(&mut item, ty)?);
    }

    if iter.next()?.is_some() {
        return Err(RpcError::ProtocolViolation(format!(
            "more than {} values", types.len()
        )));
    }

    Ok(vals)
}

fn mismatch(expected: &str, found: &Val) -> RpcError {
    RpcError::TypeMismatch {
        expected: expected.to_string(),
        found: found.desc().to_string(),
    }
}
