//! Structural equality over reflected messages.

use std::collections::HashMap;

use crate::descriptor::{FieldDescriptor, Kind};
use crate::message::DynamicMessage;
use crate::value::Value;
use crate::wire;

/// Reports whether two messages are equal: same descriptor, same set of
/// populated known and extension fields with equal values, and equal
/// unknown-field byte sets.
///
/// Floating point values treat NaN as equal to NaN, so any message equals
/// a decode of its own encoding. Unknown fields compare grouped by field
/// number, since the wire permits interleaved repetition.
pub fn equal(x: &DynamicMessage, y: &DynamicMessage) -> bool {
    if x.descriptor() != y.descriptor() {
        return false;
    }

    let mut nx = 0;
    for (field, vx) in x.populated_fields() {
        nx += 1;
        let Some(vy) = y.get(&field) else {
            return false;
        };
        if !equal_field(&field, vx, vy) {
            return false;
        }
    }
    for (field, vx) in x.populated_extensions() {
        nx += 1;
        let Some(vy) = y.get(field) else {
            return false;
        };
        if !equal_field(field, vx, vy) {
            return false;
        }
    }

    let ny = y.populated_fields().count() + y.populated_extensions().count();
    if nx != ny {
        return false;
    }

    equal_unknown(x.unknown_fields(), y.unknown_fields())
}

fn equal_field(field: &FieldDescriptor, x: &Value, y: &Value) -> bool {
    if field.is_map() {
        let (Ok(mx), Ok(my)) = (x.as_map(), y.as_map()) else {
            return false;
        };
        if mx.len() != my.len() {
            return false;
        }
        let value_field = field.map_value().expect("map shape validated");
        return mx.iter().all(|(key, vx)| match my.get(key) {
            Some(vy) => equal_value(value_field.kind(), vx, vy),
            None => false,
        });
    }
    if field.is_list() {
        let (Ok(lx), Ok(ly)) = (x.as_list(), y.as_list()) else {
            return false;
        };
        return lx.len() == ly.len()
            && lx
                .iter()
                .zip(ly)
                .all(|(vx, vy)| equal_value(field.kind(), vx, vy));
    }
    equal_value(field.kind(), x, y)
}

fn equal_value(kind: Kind, x: &Value, y: &Value) -> bool {
    match (kind, x, y) {
        (Kind::Bool, Value::Bool(a), Value::Bool(b)) => a == b,
        (Kind::Int32 | Kind::Sint32 | Kind::Sfixed32, Value::I32(a), Value::I32(b)) => a == b,
        (Kind::Int64 | Kind::Sint64 | Kind::Sfixed64, Value::I64(a), Value::I64(b)) => a == b,
        (Kind::Uint32 | Kind::Fixed32, Value::U32(a), Value::U32(b)) => a == b,
        (Kind::Uint64 | Kind::Fixed64, Value::U64(a), Value::U64(b)) => a == b,
        (Kind::Enum, Value::EnumNumber(a), Value::EnumNumber(b)) => a == b,
        (Kind::Float, Value::F32(a), Value::F32(b)) => {
            if a.is_nan() || b.is_nan() {
                a.is_nan() && b.is_nan()
            } else {
                a == b
            }
        }
        (Kind::Double, Value::F64(a), Value::F64(b)) => {
            if a.is_nan() || b.is_nan() {
                a.is_nan() && b.is_nan()
            } else {
                a == b
            }
        }
        (Kind::String, Value::String(a), Value::String(b)) => a.as_bytes() == b.as_bytes(),
        (Kind::Bytes, Value::Bytes(a), Value::Bytes(b)) => a == b,
        (Kind::Message | Kind::Group, Value::Message(a), Value::Message(b)) => equal(a, b),
        _ => false,
    }
}

/// Compare unknown-field strings: byte-equal fast path, then grouped by
/// field number with per-number concatenations compared.
fn equal_unknown(x: &[u8], y: &[u8]) -> bool {
    if x.len() != y.len() {
        return false;
    }
    if x == y {
        return true;
    }
    let (Some(mx), Some(my)) = (group_by_number(x), group_by_number(y)) else {
        return false;
    };
    mx == my
}

fn group_by_number(mut raw: &[u8]) -> Option<HashMap<u32, Vec<u8>>> {
    let mut groups: HashMap<u32, Vec<u8>> = HashMap::new();
    while !raw.is_empty() {
        let (number, len) = wire::consume_field(raw).ok()?;
        groups.entry(number).or_default().extend_from_slice(&raw[..len]);
        raw = &raw[len..];
    }
    Some(groups)
}
