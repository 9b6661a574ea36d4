//! Wire format primitives for Google's Protocol Buffers, aka
//! [protobuf](https://protobuf.dev).
//!
//! A message on the wire is a sequence of records, each introduced by a key
//! packing a field number and a [`WireType`]. This module owns key and
//! length framing, the fixed-width payloads, and field skipping, including
//! the deprecated group framing the codec still has to honor.

use bytes::{Buf, BufMut};

use crate::error::{DecodeError, InvalidKeyReason};
use crate::varint::{decode_varint, encode_varint, varint_len};

/// Minimum value of a protobuf field number.
pub const MIN_FIELD_NUMBER: u32 = 1;
/// Maximum value of a protobuf field number.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;
/// Ceiling for extension field numbers on message-set messages. The wire
/// never carries these in a key (message-set items encode the number as a
/// varint payload), so the key grammar is unaffected.
pub const MAX_MESSAGE_SET_NUMBER: u32 = (1 << 31) - 1;

/// First field numbers of the range reserved for protobuf's own use.
pub const FIRST_RESERVED_NUMBER: u32 = 19_000;
/// Last field number of the reserved range.
pub const LAST_RESERVED_NUMBER: u32 = 19_999;

/// Denotes the framing of a field in an encoded protobuf message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WireType {
    /// Variable length integer: `int32`, `int64`, `uint32`, `uint64`,
    /// `sint32`, `sint64`, `bool`, `enum`.
    Varint = 0,
    /// 64-bit little-endian payload: `fixed64`, `sfixed64`, `double`.
    I64 = 1,
    /// Length-delimited: `string`, `bytes`, `message`, packed repeated.
    Len = 2,
    /// Group start (proto2 legacy).
    StartGroup = 3,
    /// Group end (proto2 legacy).
    EndGroup = 4,
    /// 32-bit little-endian payload: `fixed32`, `sfixed32`, `float`.
    I32 = 5,
}

impl WireType {
    const MAX_VAL: u8 = WireType::I32 as u8;

    /// Try to decode a [`WireType`] from its 3-bit raw value.
    #[inline(always)]
    pub fn try_from_val(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(DecodeError::invalid_wire_type(value)),
        }
    }

    /// The raw 3-bit value of this wire type.
    #[inline(always)]
    pub const fn into_val(self) -> u8 {
        self as u8
    }
}

/// A decoded field key: field number plus [`WireType`].
///
/// The layout mirrors the wire format: bits 0-2 hold the wire type, bits
/// 3-31 the field number. Keys are validated on construction, so accessors
/// are infallible.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FieldKey(u32);

impl FieldKey {
    /// Build a key from a field number and wire type.
    ///
    /// The caller guarantees `number` is within the valid domain; keys for
    /// schema fields always are.
    #[inline(always)]
    pub const fn new(number: u32, wire_type: WireType) -> Self {
        FieldKey((number << 3) | wire_type.into_val() as u32)
    }

    #[inline(always)]
    fn try_from_raw(raw: u32) -> Result<Self, DecodeError> {
        let wire_type_raw = (raw & 0b111) as u8;
        if wire_type_raw > WireType::MAX_VAL {
            return Err(DecodeError::invalid_wire_type(wire_type_raw));
        }
        let number = raw >> 3;
        if number == 0 {
            return Err(DecodeError::invalid_tag(InvalidKeyReason::ZeroFieldNumber));
        }
        Ok(FieldKey(raw))
    }

    /// The field number component.
    #[inline(always)]
    pub const fn number(self) -> u32 {
        self.0 >> 3
    }

    /// The wire type component.
    #[inline(always)]
    pub fn wire_type(self) -> WireType {
        // Validated during construction; the match compiles away.
        match WireType::try_from_val((self.0 & 0b111) as u8) {
            Ok(wt) => wt,
            Err(_) => unreachable!(),
        }
    }

    /// The raw `(number << 3) | wire_type` value.
    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl core::fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FieldKey")
            .field("number", &self.number())
            .field("wire_type", &self.wire_type())
            .finish()
    }
}

/// Encode a field key.
///
/// Hot path: called once per field per message.
#[inline(always)]
pub fn encode_key<B: BufMut>(number: u32, wire_type: WireType, buf: &mut B) {
    encode_varint(u64::from(FieldKey::new(number, wire_type).raw()), buf);
}

/// The encoded length of a field key for `number`. The wire type lives in
/// the low 3 bits and never changes the length.
#[inline(always)]
pub fn key_len(number: u32) -> usize {
    varint_len(u64::from(number) << 3)
}

/// Decode the next field key, validating the wire type and number.
#[inline]
pub fn decode_key<B: Buf>(buf: &mut B) -> Result<FieldKey, DecodeError> {
    if !buf.has_remaining() {
        return Err(DecodeError::invalid_tag(InvalidKeyReason::EmptyBuffer));
    }
    let raw = decode_varint(buf)?;
    if raw > u64::from(u32::MAX) {
        return Err(DecodeError::invalid_tag(
            InvalidKeyReason::FieldNumberOutOfRange,
        ));
    }
    FieldKey::try_from_raw(raw as u32)
}

/// Decode the length prefix of a length-delimited field.
#[inline]
pub fn decode_len<B: Buf>(buf: &mut B) -> Result<usize, DecodeError> {
    let chunk = buf.chunk();
    // Fast path: most lengths fit in one byte.
    if let Some(&first) = chunk.first() {
        if first < 0x80 {
            buf.advance(1);
            return Ok(usize::from(first));
        }
    }
    let len = decode_varint(buf)?;
    usize::try_from(len).map_err(|_| DecodeError::overflow())
}

/// The encoded length of a length-delimited payload of `len` bytes,
/// including its prefix.
#[inline(always)]
pub fn len_delimited_len(len: usize) -> usize {
    varint_len(len as u64) + len
}

/// Read a little-endian fixed 32-bit payload.
#[inline(always)]
pub fn decode_fixed32<B: Buf>(buf: &mut B) -> Result<u32, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::truncated());
    }
    Ok(buf.get_u32_le())
}

/// Read a little-endian fixed 64-bit payload.
#[inline(always)]
pub fn decode_fixed64<B: Buf>(buf: &mut B) -> Result<u64, DecodeError> {
    if buf.remaining() < 8 {
        return Err(DecodeError::truncated());
    }
    Ok(buf.get_u64_le())
}

/// Take the next `len` bytes of `buf` as a sub-slice, advancing past them.
#[inline]
pub fn split_len_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let len = decode_len(buf)?;
    if buf.len() < len {
        return Err(DecodeError::truncated());
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

/// Skip over a field value based on its wire type.
///
/// Start-group skips the whole group body, recursing through nested groups
/// up to `depth` levels. An end-group wire type is the caller's to handle;
/// seeing one here means the input is unbalanced.
pub fn skip_value(
    key: FieldKey,
    buf: &mut &[u8],
    depth: usize,
) -> Result<(), DecodeError> {
    match key.wire_type() {
        WireType::Varint => {
            decode_varint(buf)?;
            Ok(())
        }
        WireType::I64 => {
            if buf.len() < 8 {
                return Err(DecodeError::truncated());
            }
            buf.advance(8);
            Ok(())
        }
        WireType::Len => {
            split_len_delimited(buf)?;
            Ok(())
        }
        WireType::I32 => {
            if buf.len() < 4 {
                return Err(DecodeError::truncated());
            }
            buf.advance(4);
            Ok(())
        }
        WireType::StartGroup => {
            if depth == 0 {
                return Err(DecodeError::recursion_depth_exceeded());
            }
            loop {
                let inner = decode_key(buf)?;
                if inner.wire_type() == WireType::EndGroup {
                    if inner.number() != key.number() {
                        return Err(DecodeError::unbalanced_group());
                    }
                    return Ok(());
                }
                skip_value(inner, buf, depth - 1)?;
            }
        }
        WireType::EndGroup => Err(DecodeError::unbalanced_group()),
    }
}

/// Parse one whole field (key and value) from the front of `data`,
/// returning its field number and total encoded length.
///
/// Used to group raw unknown-field bytes by number.
pub fn consume_field(data: &[u8]) -> Result<(u32, usize), DecodeError> {
    let mut buf = data;
    let key = decode_key(&mut buf)?;
    skip_value(key, &mut buf, crate::codec::RECURSION_LIMIT)?;
    Ok((key.number(), data.len() - buf.len()))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::DecodeErrorKind;

    #[test]
    fn test_key_zero_is_invalid() {
        let err = decode_key(&mut &[0x00u8][..]).unwrap_err();
        assert!(matches!(err.kind(), DecodeErrorKind::InvalidTag { .. }));
    }

    #[test]
    fn test_invalid_wire_type() {
        // Key with wire type 6.
        let err = decode_key(&mut &[0x0eu8][..]).unwrap_err();
        assert_eq!(*err.kind(), DecodeErrorKind::InvalidWireType { value: 6 });
    }

    #[test]
    fn test_decode_len() {
        let mut buf = &[0u8][..];
        assert_eq!(decode_len(&mut buf).unwrap(), 0);

        let mut buf = &[127u8][..];
        assert_eq!(decode_len(&mut buf).unwrap(), 127);

        let mut buf = &[0x80, 0x01][..];
        assert_eq!(decode_len(&mut buf).unwrap(), 128);

        let mut buf = &[0xAC, 0x02][..];
        assert_eq!(decode_len(&mut buf).unwrap(), 300);
    }

    #[test]
    fn test_skip_value_scalar() {
        let key = FieldKey::new(1, WireType::Varint);
        let mut buf = &[0x96, 0x01, 0xff][..];
        skip_value(key, &mut buf, 10).unwrap();
        assert_eq!(buf, &[0xff]);

        let key = FieldKey::new(1, WireType::I32);
        let mut buf = &[1, 2, 3, 4, 0xff][..];
        skip_value(key, &mut buf, 10).unwrap();
        assert_eq!(buf, &[0xff]);

        let key = FieldKey::new(1, WireType::Len);
        let mut buf = &[3, 1, 2, 3, 0xff][..];
        skip_value(key, &mut buf, 10).unwrap();
        assert_eq!(buf, &[0xff]);
    }

    #[test]
    fn test_skip_value_group() {
        // group 2 { field 1 varint 5; group 3 {} } trailing 0xff
        let mut body = Vec::new();
        encode_key(2, WireType::StartGroup, &mut body);
        let start = body.len();
        let mut buf = Vec::new();
        encode_key(1, WireType::Varint, &mut buf);
        buf.push(5);
        encode_key(3, WireType::StartGroup, &mut buf);
        encode_key(3, WireType::EndGroup, &mut buf);
        encode_key(2, WireType::EndGroup, &mut buf);
        buf.push(0xff);
        body.extend_from_slice(&buf);

        let key = decode_key(&mut &body[..start]).unwrap();
        let mut rest = &body[start..];
        skip_value(key, &mut rest, 10).unwrap();
        assert_eq!(rest, &[0xff]);
    }

    #[test]
    fn test_skip_value_unbalanced_group() {
        let key = FieldKey::new(2, WireType::StartGroup);
        // End-group for a different field number.
        let mut buf = Vec::new();
        encode_key(7, WireType::EndGroup, &mut buf);
        let err = skip_value(key, &mut &buf[..], 10).unwrap_err();
        assert_eq!(*err.kind(), DecodeErrorKind::UnbalancedGroup);

        // Bare end-group.
        let key = FieldKey::new(2, WireType::EndGroup);
        let err = skip_value(key, &mut &[][..], 10).unwrap_err();
        assert_eq!(*err.kind(), DecodeErrorKind::UnbalancedGroup);
    }

    #[test]
    fn test_consume_field() {
        let mut buf = Vec::new();
        encode_key(4, WireType::Len, &mut buf);
        buf.extend_from_slice(&[4, b't', b'e', b's', b't']);
        encode_key(1, WireType::Varint, &mut buf);
        buf.push(0x2a);

        let (num, len) = consume_field(&buf).unwrap();
        assert_eq!(num, 4);
        let (num, _) = consume_field(&buf[len..]).unwrap();
        assert_eq!(num, 1);
    }

    proptest! {
        #[test]
        fn proptest_key_roundtrip(
            number in MIN_FIELD_NUMBER..=MAX_FIELD_NUMBER,
            wt_raw in 0u8..=5,
        ) {
            let wire_type = WireType::try_from_val(wt_raw).unwrap();
            let mut buf = Vec::with_capacity(8);
            encode_key(number, wire_type, &mut buf);
            prop_assert_eq!(buf.len(), key_len(number));

            let key = decode_key(&mut &buf[..]).unwrap();
            prop_assert_eq!(key.number(), number);
            prop_assert_eq!(key.wire_type(), wire_type);
        }
    }
}
