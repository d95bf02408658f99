use alphapack::Decoder;
use alphapack::Encoder;

use crate::*;

fn decode_frame(bytes: &[u8]) -> Result<RpcFrame<'_>> {
    let mut dec = Decoder::new(bytes);
    RpcFrame::decode(&mut dec)
}

// ============================================================================
//  CALL FRAMES
// ============================================================================

#[test]
fn test_call_frame_carries_header_and_args() -> anyhow::Result<()> {
    let args = [Val::S32(34), Val::S32(56)];
    let bytes = CallEncoder::new(7, 42, "sum", &args).into_bytes()?;

    let RpcFrame::Call(call) = decode_frame(&bytes)? else {
        panic!("expected a call frame");
    };
    assert_eq!(call.seq, 7);
    assert_eq!(call.provider, 42);
    assert_eq!(call.op, "sum");

    let vals = decode_vals(call.args, &[Type::S32, Type::S32])?;
    assert_eq!(vals, args);
    Ok(())
}

#[test]
fn test_call_with_array_args() -> anyhow::Result<()> {
    let args = [Val::s32_list(&[1, 2, 3]), Val::s32_list(&[4, 5, 6]), Val::U64(3)];
    let bytes = CallEncoder::new(1, 0, "sum_arrays", &args).into_bytes()?;

    let RpcFrame::Call(call) = decode_frame(&bytes)? else {
        panic!("expected a call frame");
    };
    let list = Type::list_of(Type::S32);
    let mut vals = decode_vals(call.args, &[list.clone(), list, Type::U64])?.into_iter();

    assert_eq!(vals.next().unwrap().into_s32_vec()?, vec![1, 2, 3]);
    assert_eq!(vals.next().unwrap().into_s32_vec()?, vec![4, 5, 6]);
    assert_eq!(vals.next(), Some(Val::U64(3)));
    Ok(())
}

#[test]
fn test_call_missing_field_is_protocol_violation() -> anyhow::Result<()> {
    let mut enc = Encoder::new();
    enc.variant_begin("Call")?;
    enc.map_begin()?;
    enc.variant_begin("seq")?;
    enc.u64(1)?;
    enc.variant_end()?;
    enc.map_end()?;
    enc.variant_end()?;
    let bytes = enc.into_bytes()?;

    let err = decode_frame(&bytes).unwrap_err();
    assert!(matches!(err, RpcError::ProtocolViolation(_)), "got {:?}", err);
    Ok(())
}

#[test]
fn test_unknown_frame_kind() -> anyhow::Result<()> {
    let mut enc = Encoder::new();
    enc.variant_begin("Ping")?;
    enc.unit()?;
    enc.variant_end()?;
    let bytes = enc.into_bytes()?;

    assert_eq!(decode_frame(&bytes).unwrap_err(), RpcError::UnknownVariant("Ping".into()));
    Ok(())
}

// ============================================================================
//  REPLY FRAMES
// ============================================================================

#[test]
fn test_ok_reply() -> anyhow::Result<()> {
    let bytes = ReplyOkEncoder::new(11, &[Val::S32(90)]).into_bytes()?;

    let RpcFrame::Reply(reply) = decode_frame(&bytes)? else {
        panic!("expected a reply frame");
    };
    assert_eq!(reply.seq, 11);
    let results = reply.status.expect("ok reply");
    assert_eq!(decode_vals(results, &[Type::S32])?, vec![Val::S32(90)]);
    Ok(())
}

#[test]
fn test_every_failure_reason_survives_the_wire() -> anyhow::Result<()> {
    let reasons = [
        FailureReason::UnknownProvider(55),
        FailureReason::UnknownOperation("multiply".into()),
        FailureReason::BadArguments("expected 2 values, got 1".into()),
        FailureReason::LengthMismatch { x: 3, y: 2, out: 3 },
        FailureReason::ProviderShutdown,
        FailureReason::Resource("disk on fire".into()),
        FailureReason::ProtocolViolation("missing op".into()),
    ];

    for (seq, reason) in reasons.iter().enumerate() {
        let bytes = ReplyErrEncoder::new(seq as u64, reason).into_bytes()?;
        let frame = decode_frame(&bytes)?;
        assert_eq!(frame.seq(), seq as u64);
        let RpcFrame::Reply(reply) = frame else {
            panic!("expected a reply frame");
        };
        assert_eq!(reply.status.unwrap_err(), *reason);
    }
    Ok(())
}

// ============================================================================
//  VALUE DECODING
// ============================================================================

#[test]
fn test_type_mismatch_on_decode() -> anyhow::Result<()> {
    let mut enc = Encoder::new();
    encode_vals(&mut enc, &[Val::Bool(true)])?;
    let bytes = enc.into_bytes()?;

    let err = decode_vals(Decoder::new(&bytes), &[Type::S32]).unwrap_err();
    assert!(matches!(err, RpcError::Serialization(_)), "got {:?}", err);
    Ok(())
}

#[test]
fn test_value_count_must_match() -> anyhow::Result<()> {
    let mut enc = Encoder::new();
    encode_vals(&mut enc, &[Val::S32(1)])?;
    let bytes = enc.into_bytes()?;

    let too_many = decode_vals(Decoder::new(&bytes), &[Type::S32, Type::S32]).unwrap_err();
    assert!(matches!(too_many, RpcError::ProtocolViolation(_)));

    let too_few = decode_vals(Decoder::new(&bytes), &[]).unwrap_err();
    assert!(matches!(too_few, RpcError::ProtocolViolation(_)));
    Ok(())
}

#[test]
fn test_recursion_limit() {
    let mut deep = Val::Unit;
    for _ in 0..32 {
        deep = Val::List(vec![deep]);
    }
    let mut enc = Encoder::new();
    assert_eq!(encode_val(&mut enc, &deep).unwrap_err(), RpcError::RecursionLimitExceeded);
}

#[test]
fn test_val_accessors() {
    assert_eq!(Val::S32(3).into_s32(), Ok(3));
    assert_eq!(Val::Bool(true).into_bool(), Ok(true));
    assert!(matches!(Val::U32(1).into_s32(), Err(RpcError::TypeMismatch { .. })));
    assert!(matches!(
        Val::List(vec![Val::Bool(false)]).into_s32_vec(),
        Err(RpcError::TypeMismatch { .. })
    ));
}
