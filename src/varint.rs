//! Base-128 variable-length integer encoding.
//!
//! Every varint on the wire is treated as a `u64`; narrower kinds truncate
//! or sign-extend at the codec layer. Encoding always produces the canonical
//! shortest form. Decoding accepts up to 10 bytes and reports [`Overflow`]
//! when a continuation bit survives the tenth byte.
//!
//! [`Overflow`]: crate::error::DecodeErrorKind::Overflow

use bytes::{Buf, BufMut};

use crate::error::DecodeError;

/// Maximum number of bytes a `u64` varint can occupy.
pub const MAX_VARINT_LEN: usize = 10;

/// Encode `value` into `buf`, returning the number of bytes written.
#[inline]
pub fn encode_varint<B: BufMut>(mut value: u64, buf: &mut B) -> usize {
    let mut written = 0;
    loop {
        written += 1;
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return written;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Decode a varint from the front of `buf`, advancing past it.
///
/// Fails with `Truncated` when the buffer ends mid-varint and `Overflow`
/// when the encoding runs past ten bytes.
#[inline]
pub fn decode_varint<B: Buf>(buf: &mut B) -> Result<u64, DecodeError> {
    let chunk = buf.chunk();

    // Fast path: single-byte varints dominate real schemas.
    if let Some(&first) = chunk.first() {
        if first < 0x80 {
            buf.advance(1);
            return Ok(u64::from(first));
        }
    }

    // Fast path: the current chunk is long enough to decode in place.
    if chunk.len() >= MAX_VARINT_LEN {
        let (value, read) = decode_varint_slice(chunk)?;
        buf.advance(read);
        return Ok(value);
    }

    decode_varint_slow(buf)
}

/// Decode a varint from a slice, returning the value and bytes consumed.
#[inline]
pub fn decode_varint_slice(data: &[u8]) -> Result<(u64, usize), DecodeError> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        if i == MAX_VARINT_LEN - 1 {
            // Tenth byte: only the low bit may carry payload, and the
            // continuation bit must be clear.
            if byte > 0x01 {
                return Err(DecodeError::overflow());
            }
            value |= u64::from(byte) << 63;
            return Ok((value, MAX_VARINT_LEN));
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte < 0x80 {
            return Ok((value, i + 1));
        }
    }
    Err(DecodeError::truncated())
}

#[cold]
fn decode_varint_slow<B: Buf>(buf: &mut B) -> Result<u64, DecodeError> {
    let mut scratch = [0u8; MAX_VARINT_LEN];
    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(DecodeError::truncated());
        }
        scratch[i] = buf.get_u8();
        if scratch[i] < 0x80 {
            return decode_varint_slice(&scratch[..=i]).map(|(v, _)| v);
        }
    }
    Err(DecodeError::overflow())
}

/// The number of bytes `value` occupies when varint-encoded.
///
/// Varints carry 7 payload bits per byte, so the length is
/// `ceil(significant_bits / 7)` with a floor of one byte. A lookup on
/// `leading_zeros` avoids the division.
#[inline]
pub fn varint_len(value: u64) -> usize {
    #[rustfmt::skip]
    const LZ_TO_LEN: [u8; 65] = [
        10,                                         // 0:     64 bits
        9, 9, 9, 9, 9, 9, 9,                        // 1-7:   63-57 bits
        8, 8, 8, 8, 8, 8, 8,                        // 8-14:  56-50 bits
        7, 7, 7, 7, 7, 7, 7,                        // 15-21: 49-43 bits
        6, 6, 6, 6, 6, 6, 6,                        // 22-28: 42-36 bits
        5, 5, 5, 5, 5, 5, 5,                        // 29-35: 35-29 bits
        4, 4, 4, 4, 4, 4, 4,                        // 36-42: 28-22 bits
        3, 3, 3, 3, 3, 3, 3,                        // 43-49: 21-15 bits
        2, 2, 2, 2, 2, 2, 2,                        // 50-56: 14-8 bits
        1, 1, 1, 1, 1, 1, 1, 1,                     // 57-64: 7-0 bits
    ];
    usize::from(LZ_TO_LEN[value.leading_zeros() as usize])
}

#[inline]
pub const fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

#[inline]
pub const fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

#[inline]
pub const fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub const fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn smoketest_varint_roundtrip() {
        #[track_caller]
        fn test_case(val: u64, len: usize) {
            let mut buf = Vec::with_capacity(MAX_VARINT_LEN);
            let written = encode_varint(val, &mut buf);
            assert_eq!(written, len, "encode length");
            assert_eq!(varint_len(val), len, "computed length");

            let decoded = decode_varint(&mut &buf[..]).unwrap();
            assert_eq!(decoded, val, "value");
        }

        test_case(0, 1);
        test_case(1, 1);
        test_case(127, 1);
        test_case(128, 2);
        test_case(150, 2);
        test_case(16383, 2);
        test_case(16384, 3);
        test_case(u64::from(u32::MAX), 5);
        test_case(u64::MAX, 10);
    }

    #[test]
    fn test_truncated_varint() {
        // Continuation bit set, no following byte.
        let err = decode_varint(&mut &[0x80u8][..]).unwrap_err();
        assert_eq!(*err.kind(), crate::error::DecodeErrorKind::Truncated);

        let err = decode_varint(&mut &[][..]).unwrap_err();
        assert_eq!(*err.kind(), crate::error::DecodeErrorKind::Truncated);
    }

    #[test]
    fn test_varint_overflow() {
        // Eleven continuation bytes can never be valid.
        let bad = [0xffu8; 11];
        let err = decode_varint(&mut &bad[..]).unwrap_err();
        assert_eq!(*err.kind(), crate::error::DecodeErrorKind::Overflow);

        // Ten bytes whose final byte carries more than one payload bit
        // would encode a 65-bit value.
        let bad = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        let err = decode_varint(&mut &bad[..]).unwrap_err();
        assert_eq!(*err.kind(), crate::error::DecodeErrorKind::Overflow);
    }

    #[test]
    fn test_zigzag_known_values() {
        // From the protobuf encoding guide.
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(-2), 3);
        assert_eq!(zigzag_encode32(i32::MAX), 4294967294);
        assert_eq!(zigzag_encode32(i32::MIN), 4294967295);
        assert_eq!(zigzag_encode64(i64::MIN), u64::MAX);
    }

    proptest! {
        #[test]
        fn proptest_varint_roundtrip(val: u64) {
            let mut buf = Vec::with_capacity(MAX_VARINT_LEN);
            let written = encode_varint(val, &mut buf);
            prop_assert_eq!(written, buf.len());
            prop_assert_eq!(varint_len(val), written);

            let (decoded, read) = decode_varint_slice(&buf).unwrap();
            prop_assert_eq!(decoded, val);
            prop_assert_eq!(read, written);
        }

        #[test]
        fn proptest_zigzag_roundtrip(a: i32, b: i64) {
            prop_assert_eq!(zigzag_decode32(zigzag_encode32(a)), a);
            prop_assert_eq!(zigzag_decode64(zigzag_encode64(b)), b);
        }

        #[test]
        fn proptest_varint_buf_matches_slice(val: u64, prefix: u8) {
            // Decoding through the Buf-driven entry point must agree with
            // the slice decoder regardless of chunk boundaries.
            let mut buf = vec![prefix & 0x7f];
            encode_varint(val, &mut buf);
            let mut reader = &buf[..];
            prop_assert_eq!(decode_varint(&mut reader).unwrap(), u64::from(prefix & 0x7f));
            prop_assert_eq!(decode_varint(&mut reader).unwrap(), val);
            prop_assert!(reader.is_empty());
        }
    }
}
