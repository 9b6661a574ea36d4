//! Message decoding.
//!
//! The tag loop reads a key, looks the number up in the dense array (hash
//! map beyond its cutoff), and dispatches on the coder strategy. Numbers
//! the schema does not know either route through the extension resolver or
//! land byte-exactly in the message's unknown-field string. Wire types are
//! checked per field; a declared-packed field accepts the unpacked
//! encoding and vice versa, and other mismatches fall through to unknown.

use bytes::Bytes;

use crate::descriptor::{FieldDescriptor, Kind, MessageDescriptor, Syntax};
use crate::error::DecodeError;
use crate::message::DynamicMessage;
use crate::table::{Coder, CoderField};
use crate::value::{MapKey, Str, Value};
use crate::varint::{decode_varint, zigzag_decode32, zigzag_decode64};
use crate::wire::{self, FieldKey, WireType};

use super::{check_initialized, ExtensionResolver, RECURSION_LIMIT};
use super::{MESSAGE_SET_ITEM_NUMBER, MESSAGE_SET_MESSAGE_NUMBER, MESSAGE_SET_TYPE_ID_NUMBER};

/// Configures the decoder.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Merge into the destination instead of resetting it first.
    pub merge: bool,
    /// Do not raise `RequiredNotSet` for missing required fields.
    pub allow_partial: bool,
    /// Drop unrecognized fields instead of preserving their bytes.
    pub discard_unknown: bool,
    /// Accept invalid UTF-8 in proto3 string fields. Strings admitted this
    /// way round-trip byte-exactly but must not be read as `str`.
    pub allow_invalid_utf8: bool,
    /// Maximum message nesting before decoding fails.
    pub recursion_limit: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            merge: false,
            allow_partial: false,
            discard_unknown: false,
            allow_invalid_utf8: false,
            recursion_limit: RECURSION_LIMIT,
        }
    }
}

impl DecodeOptions {
    /// Decode a fresh message of type `desc` from `data`.
    pub fn decode(
        &self,
        desc: MessageDescriptor,
        data: &[u8],
    ) -> Result<DynamicMessage, DecodeError> {
        let mut m = DynamicMessage::new(desc);
        self.decode_into_with(&mut m, data, &())?;
        Ok(m)
    }

    /// Decode `data` into `m` with no extension resolution.
    pub fn decode_into(&self, m: &mut DynamicMessage, data: &[u8]) -> Result<(), DecodeError> {
        self.decode_into_with(m, data, &())
    }

    /// Decode `data` into `m`, routing extension-range numbers and
    /// message-set items through `resolver`.
    pub fn decode_into_with(
        &self,
        m: &mut DynamicMessage,
        data: &[u8],
        resolver: &dyn ExtensionResolver,
    ) -> Result<(), DecodeError> {
        if !self.merge {
            m.clear_all();
        }
        let mut buf = data;
        decode_message_body(m, &mut buf, self, resolver, self.recursion_limit, None)?;
        if !self.allow_partial {
            check_initialized(m)
                .map_err(|e| match e {
                    crate::error::EncodeError::RequiredNotSet { field } => {
                        DecodeError::required_not_set(field)
                    }
                    crate::error::EncodeError::RecursionDepthExceeded => {
                        DecodeError::recursion_depth_exceeded()
                    }
                })?;
        }
        Ok(())
    }
}

/// Decode one message body from `buf`. A `group` number means the body
/// terminates at the matching end-group tag; otherwise it runs to the end
/// of the buffer.
pub(crate) fn decode_message_body(
    m: &mut DynamicMessage,
    buf: &mut &[u8],
    opts: &DecodeOptions,
    resolver: &dyn ExtensionResolver,
    depth: usize,
    group: Option<u32>,
) -> Result<(), DecodeError> {
    if depth == 0 {
        return Err(DecodeError::recursion_depth_exceeded());
    }
    let info = m.descriptor().coder_info();
    if info.is_message_set && group.is_none() {
        return decode_message_set(m, buf, opts, resolver, depth);
    }

    loop {
        if buf.is_empty() {
            return match group {
                None => Ok(()),
                Some(_) => Err(DecodeError::unbalanced_group()),
            };
        }
        let start = *buf;
        let key = wire::decode_key(buf)?;
        if key.wire_type() == WireType::EndGroup {
            return match group {
                Some(number) if number == key.number() => Ok(()),
                _ => Err(DecodeError::unbalanced_group()),
            };
        }

        let consumed = match info.field_by_number(key.number()) {
            Some(cf) => decode_coder_field(m, cf, key, buf, opts, resolver, depth)?,
            None => {
                if m.descriptor().extension_ranges().has(key.number()) {
                    match resolver.find_extension_by_number(m.descriptor(), key.number()) {
                        Some(ext) => decode_field_reflective(m, &ext, key, buf, opts, resolver, depth)?,
                        None => false,
                    }
                } else {
                    false
                }
            }
        };

        if !consumed {
            preserve_unknown(m, key, start, buf, opts, depth)?;
        }
    }
}

/// Skip the value of `key` and append the whole raw field to the unknown
/// string (unless unknowns are being discarded).
fn preserve_unknown(
    m: &mut DynamicMessage,
    key: FieldKey,
    start: &[u8],
    buf: &mut &[u8],
    opts: &DecodeOptions,
    depth: usize,
) -> Result<(), DecodeError> {
    wire::skip_value(key, buf, depth)?;
    if !opts.discard_unknown {
        let consumed = start.len() - buf.len();
        m.append_unknown(&start[..consumed]);
    }
    Ok(())
}

/// Decode a field through its table entry. Returns `false` when the wire
/// type is incompatible and the record belongs in unknown fields.
fn decode_coder_field(
    m: &mut DynamicMessage,
    cf: &CoderField,
    key: FieldKey,
    buf: &mut &[u8],
    opts: &DecodeOptions,
    resolver: &dyn ExtensionResolver,
    depth: usize,
) -> Result<bool, DecodeError> {
    let wt = key.wire_type();
    match cf.coder {
        Coder::Scalar => {
            if wt != cf.kind.wire_type() {
                return Ok(false);
            }
            let field = m.descriptor().field(cf.index as usize);
            let value = decode_scalar_value(cf.kind, buf, &field, opts)?;
            m.set_trusted(&field, value);
        }
        Coder::Message => {
            if wt != WireType::Len {
                return Ok(false);
            }
            let mut body = wire::split_len_delimited(buf)?;
            let field = m.descriptor().field(cf.index as usize);
            let child = m
                .mutable(&field)
                .as_message_mut()
                .expect("message slots hold messages");
            decode_message_body(child, &mut body, opts, resolver, depth - 1, None)?;
        }
        Coder::Group => {
            if wt != WireType::StartGroup {
                return Ok(false);
            }
            let field = m.descriptor().field(cf.index as usize);
            let child = m
                .mutable(&field)
                .as_message_mut()
                .expect("group slots hold messages");
            decode_message_body(child, buf, opts, resolver, depth - 1, Some(cf.number))?;
        }
        Coder::List | Coder::ListPacked => {
            let field = m.descriptor().field(cf.index as usize);
            if wt == WireType::Len && cf.kind.is_packable() {
                // Packed block, regardless of the declared encoding.
                let mut body = wire::split_len_delimited(buf)?;
                let list = m
                    .mutable(&field)
                    .as_list_mut()
                    .expect("repeated slots hold lists");
                while !body.is_empty() {
                    list.push(decode_scalar_raw(cf.kind, &mut body)?);
                }
            } else if wt == cf.kind.wire_type() {
                let value = decode_scalar_value(cf.kind, buf, &field, opts)?;
                m.mutable(&field)
                    .as_list_mut()
                    .expect("repeated slots hold lists")
                    .push(value);
            } else {
                return Ok(false);
            }
        }
        Coder::ListMessage => {
            if wt != WireType::Len {
                return Ok(false);
            }
            let mut body = wire::split_len_delimited(buf)?;
            let field = m.descriptor().field(cf.index as usize);
            let child_desc = child_descriptor(m.descriptor(), cf);
            let mut child = DynamicMessage::new(child_desc);
            decode_message_body(&mut child, &mut body, opts, resolver, depth - 1, None)?;
            m.mutable(&field)
                .as_list_mut()
                .expect("repeated slots hold lists")
                .push(Value::Message(Box::new(child)));
        }
        Coder::ListGroup => {
            if wt != WireType::StartGroup {
                return Ok(false);
            }
            let field = m.descriptor().field(cf.index as usize);
            let child_desc = child_descriptor(m.descriptor(), cf);
            let mut child = DynamicMessage::new(child_desc);
            decode_message_body(&mut child, buf, opts, resolver, depth - 1, Some(cf.number))?;
            m.mutable(&field)
                .as_list_mut()
                .expect("repeated slots hold lists")
                .push(Value::Message(Box::new(child)));
        }
        Coder::Map { key_kind, value_kind } => {
            if wt != WireType::Len {
                return Ok(false);
            }
            let mut body = wire::split_len_delimited(buf)?;
            let field = m.descriptor().field(cf.index as usize);
            let entry_desc = child_descriptor(m.descriptor(), cf);
            let (map_key, map_value) = decode_map_entry(
                &mut body, key_kind, value_kind, &entry_desc, opts, resolver, depth,
            )?;
            m.mutable(&field)
                .as_map_mut()
                .expect("map slots hold maps")
                .insert(map_key, map_value);
        }
    }
    Ok(true)
}

fn child_descriptor(owner: &MessageDescriptor, cf: &CoderField) -> MessageDescriptor {
    let file = owner
        .parent_file()
        .expect("table entries come from real messages");
    cf.child
        .as_ref()
        .expect("message coders carry a child reference")
        .resolve(file)
}

/// Decode one map entry. Missing key or value fields fall back to their
/// defaults, per the map-entry grammar.
fn decode_map_entry(
    body: &mut &[u8],
    key_kind: Kind,
    value_kind: Kind,
    entry_desc: &MessageDescriptor,
    opts: &DecodeOptions,
    resolver: &dyn ExtensionResolver,
    depth: usize,
) -> Result<(MapKey, Value), DecodeError> {
    let mut map_key: Option<MapKey> = None;
    let mut map_value: Option<Value> = None;

    while !body.is_empty() {
        let key = wire::decode_key(body)?;
        match key.number() {
            crate::descriptor::MAP_ENTRY_KEY_NUMBER if key.wire_type() == key_kind.wire_type() => {
                let value = decode_scalar_raw(key_kind, body)?;
                map_key = MapKey::from_value(value);
            }
            crate::descriptor::MAP_ENTRY_VALUE_NUMBER => match value_kind {
                Kind::Message | Kind::Group if key.wire_type() == WireType::Len => {
                    let mut value_body = wire::split_len_delimited(body)?;
                    let value_desc = entry_desc
                        .field_by_number(crate::descriptor::MAP_ENTRY_VALUE_NUMBER)
                        .and_then(|f| f.message_type())
                        .expect("map entry value field resolves");
                    // Repeated entries for one key merge into one message.
                    let mut child = match map_value.take() {
                        Some(Value::Message(existing)) => *existing,
                        _ => DynamicMessage::new(value_desc),
                    };
                    decode_message_body(&mut child, &mut value_body, opts, resolver, depth - 1, None)?;
                    map_value = Some(Value::Message(Box::new(child)));
                }
                _ if key.wire_type() == value_kind.wire_type() => {
                    map_value = Some(decode_scalar_raw(value_kind, body)?);
                }
                _ => {
                    wire::skip_value(key, body, depth)?;
                }
            },
            _ => {
                wire::skip_value(key, body, depth)?;
            }
        }
    }

    let map_key = match map_key {
        Some(k) => k,
        None => Value::default_for(key_kind)
            .and_then(MapKey::from_value)
            .expect("map key kinds have scalar defaults"),
    };
    let map_value = match map_value {
        Some(v) => v,
        None => match value_kind {
            Kind::Message | Kind::Group => {
                let value_desc = entry_desc
                    .field_by_number(crate::descriptor::MAP_ENTRY_VALUE_NUMBER)
                    .and_then(|f| f.message_type())
                    .expect("map entry value field resolves");
                Value::Message(Box::new(DynamicMessage::new(value_desc)))
            }
            _ => Value::default_for(value_kind).expect("scalar kinds have defaults"),
        },
    };
    Ok((map_key, map_value))
}

/// Reflective field decode, driven by the descriptor alone: the slow path,
/// also serving extension fields.
pub(crate) fn decode_field_reflective(
    m: &mut DynamicMessage,
    field: &FieldDescriptor,
    key: FieldKey,
    buf: &mut &[u8],
    opts: &DecodeOptions,
    resolver: &dyn ExtensionResolver,
    depth: usize,
) -> Result<bool, DecodeError> {
    let kind = field.kind();
    let wt = key.wire_type();
    let repeated = field.cardinality() == crate::descriptor::Cardinality::Repeated;

    if field.is_map() {
        if wt != WireType::Len {
            return Ok(false);
        }
        let mut body = wire::split_len_delimited(buf)?;
        let entry_desc = field.message_type().expect("map fields resolve");
        let key_kind = field.map_key().expect("map shape validated").kind();
        let value_kind = field.map_value().expect("map shape validated").kind();
        let (map_key, map_value) = decode_map_entry(
            &mut body, key_kind, value_kind, &entry_desc, opts, resolver, depth,
        )?;
        m.mutable(field)
            .as_map_mut()
            .expect("map slots hold maps")
            .insert(map_key, map_value);
        return Ok(true);
    }

    if repeated {
        if wt == WireType::Len && kind.is_packable() {
            let mut body = wire::split_len_delimited(buf)?;
            let list = m
                .mutable(field)
                .as_list_mut()
                .expect("repeated slots hold lists");
            while !body.is_empty() {
                list.push(decode_scalar_raw(kind, &mut body)?);
            }
            return Ok(true);
        }
        match kind {
            Kind::Message if wt == WireType::Len => {
                let mut body = wire::split_len_delimited(buf)?;
                let child_desc = field.message_type().expect("message fields resolve");
                let mut child = DynamicMessage::new(child_desc);
                decode_message_body(&mut child, &mut body, opts, resolver, depth - 1, None)?;
                m.mutable(field)
                    .as_list_mut()
                    .expect("repeated slots hold lists")
                    .push(Value::Message(Box::new(child)));
                return Ok(true);
            }
            Kind::Group if wt == WireType::StartGroup => {
                let child_desc = field.message_type().expect("group fields resolve");
                let mut child = DynamicMessage::new(child_desc);
                decode_message_body(&mut child, buf, opts, resolver, depth - 1, Some(field.number()))?;
                m.mutable(field)
                    .as_list_mut()
                    .expect("repeated slots hold lists")
                    .push(Value::Message(Box::new(child)));
                return Ok(true);
            }
            _ if wt == kind.wire_type() && !matches!(kind, Kind::Message | Kind::Group) => {
                let value = decode_scalar_value(kind, buf, field, opts)?;
                m.mutable(field)
                    .as_list_mut()
                    .expect("repeated slots hold lists")
                    .push(value);
                return Ok(true);
            }
            _ => return Ok(false),
        }
    }

    match kind {
        Kind::Message => {
            if wt != WireType::Len {
                return Ok(false);
            }
            let mut body = wire::split_len_delimited(buf)?;
            let child = m
                .mutable(field)
                .as_message_mut()
                .expect("message slots hold messages");
            decode_message_body(child, &mut body, opts, resolver, depth - 1, None)?;
        }
        Kind::Group => {
            if wt != WireType::StartGroup {
                return Ok(false);
            }
            let child = m
                .mutable(field)
                .as_message_mut()
                .expect("group slots hold messages");
            decode_message_body(child, buf, opts, resolver, depth - 1, Some(field.number()))?;
        }
        _ => {
            if wt != kind.wire_type() {
                return Ok(false);
            }
            let value = decode_scalar_value(kind, buf, field, opts)?;
            m.set_trusted(field, value);
        }
    }
    Ok(true)
}

/// Decode the legacy message-set framing: items are groups under field 1
/// with a varint type id and a length-delimited payload.
fn decode_message_set(
    m: &mut DynamicMessage,
    buf: &mut &[u8],
    opts: &DecodeOptions,
    resolver: &dyn ExtensionResolver,
    depth: usize,
) -> Result<(), DecodeError> {
    while !buf.is_empty() {
        let start = *buf;
        let key = wire::decode_key(buf)?;
        if key.number() == MESSAGE_SET_ITEM_NUMBER && key.wire_type() == WireType::StartGroup {
            let mut type_id: Option<u32> = None;
            let mut payload: Vec<u8> = Vec::new();
            loop {
                let item_key = wire::decode_key(buf)?;
                if item_key.wire_type() == WireType::EndGroup {
                    if item_key.number() != MESSAGE_SET_ITEM_NUMBER {
                        return Err(DecodeError::unbalanced_group());
                    }
                    break;
                }
                match (item_key.number(), item_key.wire_type()) {
                    (MESSAGE_SET_TYPE_ID_NUMBER, WireType::Varint) => {
                        let raw = decode_varint(buf)?;
                        type_id = u32::try_from(raw).ok();
                    }
                    (MESSAGE_SET_MESSAGE_NUMBER, WireType::Len) => {
                        // Split payloads concatenate, like any message field.
                        payload.extend_from_slice(wire::split_len_delimited(buf)?);
                    }
                    _ => wire::skip_value(item_key, buf, depth)?,
                }
            }

            let extension = type_id.and_then(|id| {
                resolver.find_extension_by_number(m.descriptor(), id)
            });
            match extension {
                Some(ext) => {
                    let child = m
                        .mutable(&ext)
                        .as_message_mut()
                        .expect("message-set extensions are messages");
                    let mut body = payload.as_slice();
                    decode_message_body(child, &mut body, opts, resolver, depth - 1, None)?;
                }
                None if !opts.discard_unknown => {
                    let consumed = start.len() - buf.len();
                    m.append_unknown(&start[..consumed]);
                }
                None => {}
            }
        } else {
            preserve_unknown(m, key, start, buf, opts, depth)?;
        }
    }
    Ok(())
}

/// Decode a scalar payload into a typed value, applying string policy.
fn decode_scalar_value(
    kind: Kind,
    buf: &mut &[u8],
    field: &FieldDescriptor,
    opts: &DecodeOptions,
) -> Result<Value, DecodeError> {
    if kind == Kind::String {
        let bytes = Bytes::copy_from_slice(wire::split_len_delimited(buf)?);
        let validate = field.parent_syntax() == Syntax::Proto3 && !opts.allow_invalid_utf8;
        let value = if validate {
            Str::from_utf8(bytes).map_err(|()| DecodeError::invalid_utf8(field.full_name()))?
        } else {
            Str::from_unchecked(bytes)
        };
        return Ok(Value::String(value));
    }
    decode_scalar_raw(kind, buf)
}

/// Decode a scalar payload with no field context. Strings are admitted
/// unchecked here; map keys and packed elements validate at a higher
/// level when the schema demands it.
fn decode_scalar_raw(kind: Kind, buf: &mut &[u8]) -> Result<Value, DecodeError> {
    Ok(match kind {
        Kind::Bool => Value::Bool(decode_varint(buf)? != 0),
        Kind::Int32 => Value::I32(decode_varint(buf)? as i32),
        Kind::Int64 => Value::I64(decode_varint(buf)? as i64),
        Kind::Uint32 => Value::U32(decode_varint(buf)? as u32),
        Kind::Uint64 => Value::U64(decode_varint(buf)?),
        Kind::Sint32 => Value::I32(zigzag_decode32(decode_varint(buf)? as u32)),
        Kind::Sint64 => Value::I64(zigzag_decode64(decode_varint(buf)?)),
        Kind::Enum => Value::EnumNumber(decode_varint(buf)? as i32),
        Kind::Fixed32 => Value::U32(wire::decode_fixed32(buf)?),
        Kind::Sfixed32 => Value::I32(wire::decode_fixed32(buf)? as i32),
        Kind::Float => Value::F32(f32::from_bits(wire::decode_fixed32(buf)?)),
        Kind::Fixed64 => Value::U64(wire::decode_fixed64(buf)?),
        Kind::Sfixed64 => Value::I64(wire::decode_fixed64(buf)? as i64),
        Kind::Double => Value::F64(f64::from_bits(wire::decode_fixed64(buf)?)),
        Kind::String => {
            let bytes = Bytes::copy_from_slice(wire::split_len_delimited(buf)?);
            match Str::from_utf8(bytes) {
                Ok(s) => Value::String(s),
                Err(()) => return Err(DecodeError::invalid_utf8("<map key>")),
            }
        }
        Kind::Bytes => Value::Bytes(Bytes::copy_from_slice(wire::split_len_delimited(buf)?)),
        Kind::Message | Kind::Group => {
            unreachable!("message kinds never reach the scalar decoder")
        }
    })
}
