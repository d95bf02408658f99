use crate::*;

// ============================================================================
//  SCALARS
// ============================================================================

#[test]
fn test_scalars_in_sequence() -> Result<()> {
    let mut enc = Encoder::new();
    enc.bool(true)?;
    enc.bool(false)?;
    enc.u16(42)?;
    enc.u32(u32::MAX)?;
    enc.u64(7)?;
    enc.s32(i32::MIN)?;
    enc.unit()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert!(dec.bool()?);
    assert!(!dec.bool()?);
    assert_eq!(dec.u16()?, 42);
    assert_eq!(dec.u32()?, u32::MAX);
    assert_eq!(dec.u64()?, 7);
    assert_eq!(dec.s32()?, i32::MIN);
    dec.unit()?;
    assert_eq!(dec.remaining(), 0);
    Ok(())
}

#[test]
fn test_scalar_layout_is_little_endian() -> Result<()> {
    let mut enc = Encoder::new();
    enc.s32(-2)?;
    let bytes = enc.into_bytes()?;
    assert_eq!(bytes, vec![Tag::S32 as u8, 0xFE, 0xFF, 0xFF, 0xFF]);
    Ok(())
}

#[test]
fn test_string_with_multibyte_chars() -> Result<()> {
    let mut enc = Encoder::new();
    enc.str("provider ⇄ client")?;
    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.str()?, "provider ⇄ client");
    Ok(())
}

#[test]
fn test_wrong_tag_is_reported() -> Result<()> {
    let mut enc = Encoder::new();
    enc.u32(1)?;
    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    assert_eq!(
        dec.s32().unwrap_err(),
        Error::UnexpectedTag { expected: Tag::S32, found: Tag::U32 }
    );
    Ok(())
}

// ============================================================================
//  CONTAINERS
// ============================================================================

#[test]
fn test_list_of_s32() -> Result<()> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    for v in [1, 2, 3] {
        enc.s32(v)?;
    }
    enc.list_end()?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    let mut items = dec.list()?;
    let mut seen = Vec::new();
    while let Some(mut item) = items.next()? {
        seen.push(item.s32()?);
    }
    assert_eq!(seen, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_map_entries_and_skip_unknown() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    enc.variant_begin("seq")?;
    enc.u64(9)?;
    enc.variant_end()?;
    enc.variant_begin("extra")?;
    enc.list_begin()?;
    enc.str("ignored")?;
    enc.list_end()?;
    enc.variant_end()?;
    enc.variant_begin("op")?;
    enc.str("sum")?;
    enc.variant_end()?;
    enc.map_end()?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    let mut map = dec.map()?;
    let mut seq = None;
    let mut op = None;
    while let Some((key, mut val)) = map.next()? {
        match key {
            "seq" => seq = Some(val.u64()?),
            "op" => op = Some(val.str()?),
            _ => val.skip()?,
        }
    }
    assert_eq!(seq, Some(9));
    assert_eq!(op, Some("sum"));
    Ok(())
}

#[test]
fn test_result_arms() -> Result<()> {
    let mut enc = Encoder::new();
    enc.ok_begin()?;
    enc.s32(90)?;
    enc.ok_end()?;
    enc.err_begin()?;
    enc.str("boom")?;
    enc.err_end()?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    let mut ok = dec.result()?.expect("ok arm");
    assert_eq!(ok.s32()?, 90);
    let mut err = dec.result()?.expect_err("err arm");
    assert_eq!(err.str()?, "boom");
    Ok(())
}

// ============================================================================
//  STRUCTURAL VIOLATIONS
// ============================================================================

#[test]
fn test_map_rejects_bare_scalars() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    assert_eq!(enc.u64(1).unwrap_err(), Error::InvalidMapEntry);
    Ok(())
}

#[test]
fn test_variant_holds_one_item() -> Result<()> {
    let mut enc = Encoder::new();
    enc.variant_begin("v")?;
    enc.unit()?;
    assert_eq!(enc.unit().unwrap_err(), Error::TooManyItems(Scope::Variant));
    Ok(())
}

#[test]
fn test_empty_result_cannot_close() -> Result<()> {
    let mut enc = Encoder::new();
    enc.ok_begin()?;
    assert_eq!(enc.ok_end().unwrap_err(), Error::EmptyScope(Scope::Result));
    Ok(())
}

#[test]
fn test_mismatched_close() -> Result<()> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    assert_eq!(
        enc.map_end().unwrap_err(),
        Error::ScopeMismatch { expected: Scope::Map, actual: Scope::List }
    );
    Ok(())
}

#[test]
fn test_underflow_and_unclosed() {
    let mut enc = Encoder::new();
    assert_eq!(enc.list_end().unwrap_err(), Error::ScopeUnderflow);

    let mut enc = Encoder::new();
    enc.list_begin().unwrap();
    assert_eq!(enc.into_bytes().unwrap_err(), Error::ScopeStillOpen);
}

// ============================================================================
//  HOSTILE INPUT
// ============================================================================

#[test]
fn test_truncated_input() {
    let mut dec = Decoder::new(&[Tag::U64 as u8, 1, 2]);
    assert_eq!(dec.u64().unwrap_err(), Error::UnexpectedEnd);

    let mut dec = Decoder::new(&[Tag::List as u8, 10, 0, 0, 0, 1]);
    assert_eq!(dec.list().unwrap_err(), Error::UnexpectedEnd);
}

#[test]
fn test_garbage_tag() {
    let dec = Decoder::new(&[0xFF, 0xFF]);
    assert_eq!(dec.peek_tag().unwrap_err(), Error::InvalidTag(0xFF));
}

#[test]
fn test_list_with_corrupt_item_errors_instead_of_ending() {
    // list body: one valid s32 then an unknown tag
    let mut bytes = vec![Tag::List as u8, 6, 0, 0, 0];
    bytes.extend_from_slice(&[Tag::S32 as u8, 1, 0, 0, 0, 0xEE]);
    let mut dec = Decoder::new(&bytes);
    let mut items = dec.list().unwrap();
    assert!(items.next().unwrap().is_some());
    assert_eq!(items.next().unwrap_err(), Error::InvalidTag(0xEE));
}

#[test]
fn test_invalid_utf8() {
    let bytes = [Tag::String as u8, 2, 0, 0, 0, 0xC3, 0x28];
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.str().unwrap_err(), Error::InvalidUtf8);
}
