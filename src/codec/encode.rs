//! Message encoding.
//!
//! The fast path walks the per-type table in emission order, writing the
//! precomputed wire tag and dispatching on the coder strategy. The slow
//! path ranges over populated fields reflectively and carries the framings
//! the table does not model. Length-delimited records reserve a single
//! speculative length byte and shift the payload right on the rare occasion
//! the final varint needs more.

use bytes::BufMut;
use smallvec::SmallVec;

use crate::descriptor::{Cardinality, FieldDescriptor, Kind};
use crate::error::EncodeError;
use crate::message::DynamicMessage;
use crate::table::{Coder, CoderField};
use crate::value::{MapKey, Value};
use crate::varint::{encode_varint, varint_len, zigzag_encode32, zigzag_encode64};
use crate::wire::{self, WireType};

use super::{
    check_initialized, RECURSION_LIMIT, MESSAGE_SET_ITEM_NUMBER, MESSAGE_SET_MESSAGE_NUMBER,
    MESSAGE_SET_TYPE_ID_NUMBER,
};

/// Configures the encoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncodeOptions {
    /// Permit messages with missing required fields.
    pub allow_partial: bool,
    /// Promise byte-stable output for equal messages within this build of
    /// the library: map entries sort by key and oneof fields trail others.
    ///
    /// Deterministic output is NOT canonical: it is not stable across
    /// implementations, languages, or library versions. Callers needing a
    /// canonical form must define their own.
    pub deterministic: bool,
    /// Trust the size cache filled by a previous `encoded_len` call on this
    /// exact message state. Violating that precondition produces undefined
    /// output.
    pub use_cached_size: bool,
}

impl EncodeOptions {
    /// Encode `m` into a fresh buffer.
    pub fn encode(&self, m: &DynamicMessage) -> Result<Vec<u8>, EncodeError> {
        self.encode_append(Vec::new(), m)
    }

    /// Append the encoding of `m` to `buf` and return the extended buffer.
    pub fn encode_append(
        &self,
        mut buf: Vec<u8>,
        m: &DynamicMessage,
    ) -> Result<Vec<u8>, EncodeError> {
        let expected = match m.cached_size() {
            Some(size) if self.use_cached_size => size,
            _ => self.encoded_len(m),
        };
        if buf.capacity() < buf.len() + expected {
            buf.reserve(growcap(buf.capacity(), buf.len() + expected) - buf.len());
        }

        encode_message(m, &mut buf, self, RECURSION_LIMIT)?;

        if !self.allow_partial {
            check_initialized(m)?;
        }
        Ok(buf)
    }
}

/// Scale up a buffer capacity the way repeated appends would, so chained
/// `encode_append` calls do not thrash: doubling below 1024, quarter-growth
/// steps beyond.
pub(crate) fn growcap(oldcap: usize, wantcap: usize) -> usize {
    if wantcap > oldcap * 2 {
        wantcap
    } else if oldcap < 1024 {
        oldcap * 2
    } else {
        let mut newcap = oldcap;
        while newcap < wantcap {
            newcap += newcap / 4;
        }
        newcap
    }
}

/// Encode the body of `m` (no outer framing).
pub(crate) fn encode_message(
    m: &DynamicMessage,
    buf: &mut Vec<u8>,
    opts: &EncodeOptions,
    depth: usize,
) -> Result<(), EncodeError> {
    if depth == 0 {
        return Err(EncodeError::RecursionDepthExceeded);
    }
    let info = m.descriptor().coder_info();
    if info.is_message_set {
        return encode_message_set(m, buf, opts, depth);
    }
    // Per-type selection: a table that cannot honor the requested mode
    // falls back to the reflective path.
    if opts.deterministic && !info.supports_deterministic {
        return encode_message_slow(m, buf, opts, depth);
    }

    for cf in info.ordered_fields() {
        let Some(value) = populated_value(m, cf) else {
            continue;
        };
        encode_coder_field(cf, value, buf, opts, depth)?;
    }

    for (field, value) in m.populated_extensions() {
        encode_field_slow(field, value, buf, opts, depth)?;
    }

    buf.put_slice(m.unknown_fields());
    Ok(())
}

/// A populated value of a table entry, applying emptiness and
/// implicit-presence rules.
pub(crate) fn populated_value<'a>(m: &'a DynamicMessage, cf: &CoderField) -> Option<&'a Value> {
    let value = m.slot(cf.index)?;
    match value {
        Value::List(list) if list.is_empty() => None,
        Value::Map(map) if map.is_empty() => None,
        v if cf.implicit && v.is_default() => None,
        v => Some(v),
    }
}

fn encode_coder_field(
    cf: &CoderField,
    value: &Value,
    buf: &mut Vec<u8>,
    opts: &EncodeOptions,
    depth: usize,
) -> Result<(), EncodeError> {
    match cf.coder {
        Coder::Scalar => {
            encode_varint(u64::from(cf.wiretag), buf);
            encode_scalar_payload(cf.kind, value, buf);
        }
        Coder::Message => {
            let child = value.as_message().expect("typed on set");
            encode_varint(u64::from(cf.wiretag), buf);
            let pos = append_speculative_len(buf);
            encode_message(child, buf, opts, depth - 1)?;
            finish_speculative_len(buf, pos);
        }
        Coder::Group => {
            let child = value.as_message().expect("typed on set");
            encode_varint(u64::from(cf.wiretag), buf);
            encode_message(child, buf, opts, depth - 1)?;
            wire::encode_key(cf.number, WireType::EndGroup, buf);
        }
        Coder::List => {
            let list = value.as_list().expect("typed on set");
            for element in list {
                encode_varint(u64::from(cf.wiretag), buf);
                encode_scalar_payload(cf.kind, element, buf);
            }
        }
        Coder::ListPacked => {
            let list = value.as_list().expect("typed on set");
            encode_varint(u64::from(cf.wiretag), buf);
            let pos = append_speculative_len(buf);
            for element in list {
                encode_scalar_payload(cf.kind, element, buf);
            }
            finish_speculative_len(buf, pos);
        }
        Coder::ListMessage => {
            let list = value.as_list().expect("typed on set");
            for element in list {
                let child = element.as_message().expect("typed on set");
                encode_varint(u64::from(cf.wiretag), buf);
                let pos = append_speculative_len(buf);
                encode_message(child, buf, opts, depth - 1)?;
                finish_speculative_len(buf, pos);
            }
        }
        Coder::ListGroup => {
            let list = value.as_list().expect("typed on set");
            for element in list {
                let child = element.as_message().expect("typed on set");
                encode_varint(u64::from(cf.wiretag), buf);
                encode_message(child, buf, opts, depth - 1)?;
                wire::encode_key(cf.number, WireType::EndGroup, buf);
            }
        }
        Coder::Map { key_kind, value_kind } => {
            let map = value.as_map().expect("typed on set");
            // BTreeMap iterates in canonical key order, so map output is
            // deterministic whether or not the flag asks for it.
            for (key, entry_value) in map {
                encode_varint(u64::from(cf.wiretag), buf);
                let pos = append_speculative_len(buf);
                encode_map_entry(key, key_kind, entry_value, value_kind, buf, opts, depth)?;
                finish_speculative_len(buf, pos);
            }
        }
    }
    Ok(())
}

fn encode_map_entry(
    key: &MapKey,
    key_kind: Kind,
    value: &Value,
    value_kind: Kind,
    buf: &mut Vec<u8>,
    opts: &EncodeOptions,
    depth: usize,
) -> Result<(), EncodeError> {
    wire::encode_key(
        crate::descriptor::MAP_ENTRY_KEY_NUMBER,
        effective_wire_type(key_kind),
        buf,
    );
    encode_scalar_payload(key_kind, &key.to_value(), buf);

    wire::encode_key(
        crate::descriptor::MAP_ENTRY_VALUE_NUMBER,
        effective_wire_type(value_kind),
        buf,
    );
    match value_kind {
        Kind::Message | Kind::Group => {
            let child = value.as_message().expect("typed on set");
            let pos = append_speculative_len(buf);
            encode_message(child, buf, opts, depth - 1)?;
            finish_speculative_len(buf, pos);
        }
        _ => encode_scalar_payload(value_kind, value, buf),
    }
    Ok(())
}

fn effective_wire_type(kind: Kind) -> WireType {
    match kind {
        // Map values of group kind are illegal; message values frame as Len.
        Kind::Group => WireType::Len,
        other => other.wire_type(),
    }
}

/// Encode one populated field reflectively: the slow path, also used for
/// extension fields on the fast path.
pub(crate) fn encode_field_slow(
    field: &FieldDescriptor,
    value: &Value,
    buf: &mut Vec<u8>,
    opts: &EncodeOptions,
    depth: usize,
) -> Result<(), EncodeError> {
    let number = field.number();
    let kind = field.kind();
    if field.is_map() {
        let map = value.as_map().expect("typed on set");
        let key_kind = field.map_key().expect("map shape validated").kind();
        let value_field = field.map_value().expect("map shape validated");
        for (key, entry_value) in map {
            wire::encode_key(number, WireType::Len, buf);
            let pos = append_speculative_len(buf);
            wire::encode_key(
                crate::descriptor::MAP_ENTRY_KEY_NUMBER,
                effective_wire_type(key_kind),
                buf,
            );
            encode_scalar_payload(key_kind, &key.to_value(), buf);
            wire::encode_key(
                crate::descriptor::MAP_ENTRY_VALUE_NUMBER,
                effective_wire_type(value_field.kind()),
                buf,
            );
            match value_field.kind() {
                Kind::Message | Kind::Group => {
                    let child = entry_value.as_message().expect("typed on set");
                    let inner = append_speculative_len(buf);
                    encode_message(child, buf, opts, depth - 1)?;
                    finish_speculative_len(buf, inner);
                }
                value_kind => encode_scalar_payload(value_kind, entry_value, buf),
            }
            finish_speculative_len(buf, pos);
        }
        return Ok(());
    }
    if field.cardinality() == Cardinality::Repeated {
        let list = value.as_list().expect("typed on set");
        if field.is_packed() {
            if list.is_empty() {
                return Ok(());
            }
            wire::encode_key(number, WireType::Len, buf);
            let pos = append_speculative_len(buf);
            for element in list {
                encode_scalar_payload(kind, element, buf);
            }
            finish_speculative_len(buf, pos);
            return Ok(());
        }
        for element in list {
            encode_singular(number, kind, element, buf, opts, depth)?;
        }
        return Ok(());
    }
    encode_singular(number, kind, value, buf, opts, depth)
}

fn encode_singular(
    number: u32,
    kind: Kind,
    value: &Value,
    buf: &mut Vec<u8>,
    opts: &EncodeOptions,
    depth: usize,
) -> Result<(), EncodeError> {
    match kind {
        Kind::Message => {
            let child = value.as_message().expect("typed on set");
            wire::encode_key(number, WireType::Len, buf);
            let pos = append_speculative_len(buf);
            encode_message(child, buf, opts, depth - 1)?;
            finish_speculative_len(buf, pos);
        }
        Kind::Group => {
            let child = value.as_message().expect("typed on set");
            wire::encode_key(number, WireType::StartGroup, buf);
            encode_message(child, buf, opts, depth - 1)?;
            wire::encode_key(number, WireType::EndGroup, buf);
        }
        _ => {
            wire::encode_key(number, kind.wire_type(), buf);
            encode_scalar_payload(kind, value, buf);
        }
    }
    Ok(())
}

/// Reflective encoding of a whole message body: populated fields and
/// extensions merged in field-number order (legacy order when
/// deterministic), then unknown bytes.
pub(crate) fn encode_message_slow(
    m: &DynamicMessage,
    buf: &mut Vec<u8>,
    opts: &EncodeOptions,
    depth: usize,
) -> Result<(), EncodeError> {
    if depth == 0 {
        return Err(EncodeError::RecursionDepthExceeded);
    }
    if m.descriptor().is_message_set() {
        return encode_message_set(m, buf, opts, depth);
    }

    let mut fields: SmallVec<[(FieldDescriptor, &Value); 16]> = m.populated_fields().collect();
    for (field, value) in m.populated_extensions() {
        fields.push((field.clone(), value));
    }
    fields.sort_by_key(|(field, _)| field.number());
    if opts.deterministic {
        // Legacy wire order: oneof members after everything else.
        fields.sort_by_key(|(field, _)| {
            let oneof = field.containing_oneof().filter(|o| !o.is_synthetic());
            (
                oneof.is_some(),
                oneof.map(|o| o.index()).unwrap_or(u32::MAX),
                field.number(),
            )
        });
    }

    for (field, value) in &fields {
        encode_field_slow(field, value, buf, opts, depth)?;
    }
    buf.put_slice(m.unknown_fields());
    Ok(())
}

/// Legacy message-set framing: each extension is wrapped as
/// `group{ type_id, message }`.
fn encode_message_set(
    m: &DynamicMessage,
    buf: &mut Vec<u8>,
    opts: &EncodeOptions,
    depth: usize,
) -> Result<(), EncodeError> {
    for (field, value) in m.populated_extensions() {
        wire::encode_key(MESSAGE_SET_ITEM_NUMBER, WireType::StartGroup, buf);
        wire::encode_key(MESSAGE_SET_TYPE_ID_NUMBER, WireType::Varint, buf);
        encode_varint(u64::from(field.number()), buf);
        wire::encode_key(MESSAGE_SET_MESSAGE_NUMBER, WireType::Len, buf);
        let child = value.as_message().expect("message-set extensions are messages");
        let pos = append_speculative_len(buf);
        encode_message(child, buf, opts, depth - 1)?;
        finish_speculative_len(buf, pos);
        wire::encode_key(MESSAGE_SET_ITEM_NUMBER, WireType::EndGroup, buf);
    }
    buf.put_slice(m.unknown_fields());
    Ok(())
}

/// Write the payload of a singular scalar value, no tag.
pub(crate) fn encode_scalar_payload(kind: Kind, value: &Value, buf: &mut Vec<u8>) {
    match (kind, value) {
        (Kind::Bool, Value::Bool(v)) => {
            buf.put_u8(u8::from(*v));
        }
        (Kind::Int32, Value::I32(v)) => {
            // Negative int32 sign-extends to 64 bits on the wire.
            encode_varint(*v as i64 as u64, buf);
        }
        (Kind::Int64, Value::I64(v)) => {
            encode_varint(*v as u64, buf);
        }
        (Kind::Uint32, Value::U32(v)) => {
            encode_varint(u64::from(*v), buf);
        }
        (Kind::Uint64, Value::U64(v)) => {
            encode_varint(*v, buf);
        }
        (Kind::Sint32, Value::I32(v)) => {
            encode_varint(u64::from(zigzag_encode32(*v)), buf);
        }
        (Kind::Sint64, Value::I64(v)) => {
            encode_varint(zigzag_encode64(*v), buf);
        }
        (Kind::Enum, Value::EnumNumber(v)) => {
            encode_varint(*v as i64 as u64, buf);
        }
        (Kind::Fixed32, Value::U32(v)) => {
            buf.put_u32_le(*v);
        }
        (Kind::Sfixed32, Value::I32(v)) => {
            buf.put_i32_le(*v);
        }
        (Kind::Float, Value::F32(v)) => {
            buf.put_f32_le(*v);
        }
        (Kind::Fixed64, Value::U64(v)) => {
            buf.put_u64_le(*v);
        }
        (Kind::Sfixed64, Value::I64(v)) => {
            buf.put_i64_le(*v);
        }
        (Kind::Double, Value::F64(v)) => {
            buf.put_f64_le(*v);
        }
        (Kind::String, Value::String(v)) => {
            encode_varint(v.len() as u64, buf);
            buf.put_slice(v.as_bytes());
        }
        (Kind::Bytes, Value::Bytes(v)) => {
            encode_varint(v.len() as u64, buf);
            buf.put_slice(v);
        }
        (kind, value) => unreachable!(
            "value kind {} checked against field kind {kind:?} on set",
            value.kind_name()
        ),
    }
}

/// The exact payload length `encode_scalar_payload` would write.
pub(crate) fn scalar_payload_len(kind: Kind, value: &Value) -> usize {
    match (kind, value) {
        (Kind::Bool, _) => 1,
        (Kind::Int32, Value::I32(v)) => varint_len(*v as i64 as u64),
        (Kind::Int64, Value::I64(v)) => varint_len(*v as u64),
        (Kind::Uint32, Value::U32(v)) => varint_len(u64::from(*v)),
        (Kind::Uint64, Value::U64(v)) => varint_len(*v),
        (Kind::Sint32, Value::I32(v)) => varint_len(u64::from(zigzag_encode32(*v))),
        (Kind::Sint64, Value::I64(v)) => varint_len(zigzag_encode64(*v)),
        (Kind::Enum, Value::EnumNumber(v)) => varint_len(*v as i64 as u64),
        (Kind::Fixed32 | Kind::Sfixed32 | Kind::Float, _) => 4,
        (Kind::Fixed64 | Kind::Sfixed64 | Kind::Double, _) => 8,
        (Kind::String, Value::String(v)) => wire::len_delimited_len(v.len()),
        (Kind::Bytes, Value::Bytes(v)) => wire::len_delimited_len(v.len()),
        (kind, value) => unreachable!(
            "value kind {} checked against field kind {kind:?} on set",
            value.kind_name()
        ),
    }
}

/// Reserve one byte for a length prefix whose payload follows.
const SPECULATIVE_LENGTH: usize = 1;

pub(crate) fn append_speculative_len(buf: &mut Vec<u8>) -> usize {
    let pos = buf.len();
    buf.push(0);
    pos
}

/// Backfill the length reserved at `pos`, shifting the payload right when
/// the varint needs more than the speculative byte.
pub(crate) fn finish_speculative_len(buf: &mut Vec<u8>, pos: usize) {
    let payload_len = buf.len() - pos - SPECULATIVE_LENGTH;
    let len_size = varint_len(payload_len as u64);
    if len_size != SPECULATIVE_LENGTH {
        buf.resize(buf.len() + len_size - SPECULATIVE_LENGTH, 0);
        buf.copy_within(
            pos + SPECULATIVE_LENGTH..pos + SPECULATIVE_LENGTH + payload_len,
            pos + len_size,
        );
    }
    let mut scratch = [0u8; crate::varint::MAX_VARINT_LEN];
    let written = encode_varint(payload_len as u64, &mut scratch.as_mut_slice());
    buf[pos..pos + written].copy_from_slice(&scratch[..written]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speculative_len_one_byte() {
        let mut buf = vec![0xAA];
        let pos = append_speculative_len(&mut buf);
        buf.extend_from_slice(&[1, 2, 3]);
        finish_speculative_len(&mut buf, pos);
        assert_eq!(buf, &[0xAA, 3, 1, 2, 3]);
    }

    #[test]
    fn test_speculative_len_shift() {
        // 200 bytes of payload needs a two-byte varint length.
        let mut buf = Vec::new();
        let pos = append_speculative_len(&mut buf);
        buf.extend(std::iter::repeat(7u8).take(200));
        finish_speculative_len(&mut buf, pos);
        assert_eq!(buf.len(), 2 + 200);
        assert_eq!(&buf[..2], &[0xC8, 0x01]);
        assert!(buf[2..].iter().all(|&b| b == 7));
    }

    #[test]
    fn test_growcap() {
        assert_eq!(growcap(0, 100), 100);
        assert_eq!(growcap(100, 150), 200);
        assert_eq!(growcap(2048, 2100), 2560);
        assert!(growcap(4096, 10_000) >= 10_000);
    }
}
