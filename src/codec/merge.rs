//! Merge semantics over reflected messages.

use crate::descriptor::{Cardinality, FieldDescriptor, Kind};
use crate::message::DynamicMessage;
use crate::value::Value;

/// Merge `src` into `dst`. Both must share a message descriptor.
///
/// Populated scalars overwrite, list elements append (deep-copied), map
/// entries replace per key with a deep copy, and populated singular
/// messages merge recursively. Unknown fields concatenate. Semantically
/// equivalent to decoding `src`'s encoding into `dst` with merge enabled.
///
/// # Panics
///
/// Panics when the descriptors differ; merging across types is a
/// programming error with no sensible fallback.
pub fn merge(dst: &mut DynamicMessage, src: &DynamicMessage) {
    assert!(
        dst.descriptor() == src.descriptor(),
        "descriptor mismatch: {} != {}",
        dst.descriptor().full_name(),
        src.descriptor().full_name(),
    );
    for (field, value) in src.populated_fields() {
        merge_field(dst, &field, value);
    }
    for (field, value) in src.populated_extensions() {
        merge_field(dst, field, value);
    }
    if !src.unknown_fields().is_empty() {
        dst.append_unknown(src.unknown_fields());
    }
}

/// Deep copy of `m`, built by merging into a fresh message.
pub fn clone_message(m: &DynamicMessage) -> DynamicMessage {
    let mut out = DynamicMessage::new(m.descriptor().clone());
    merge(&mut out, m);
    out
}

fn merge_field(dst: &mut DynamicMessage, field: &FieldDescriptor, value: &Value) {
    if field.is_map() {
        let src_map = value.as_map().expect("typed on set");
        let dst_map = dst
            .mutable(field)
            .as_map_mut()
            .expect("map slots hold maps");
        // Merge semantics replaces entries rather than merging into them.
        for (key, entry) in src_map {
            dst_map.insert(key.clone(), deep_copy(entry));
        }
        return;
    }
    if field.cardinality() == Cardinality::Repeated {
        let src_list = value.as_list().expect("typed on set");
        let dst_list = dst
            .mutable(field)
            .as_list_mut()
            .expect("repeated slots hold lists");
        // Merge semantics appends to the end of the existing list.
        dst_list.extend(src_list.iter().map(deep_copy));
        return;
    }
    match field.kind() {
        Kind::Message | Kind::Group => {
            let src_child = value.as_message().expect("typed on set");
            let dst_child = dst
                .mutable(field)
                .as_message_mut()
                .expect("message slots hold messages");
            merge(dst_child, src_child);
        }
        _ => {
            dst.set_trusted(field, value.clone());
        }
    }
}

fn deep_copy(value: &Value) -> Value {
    match value {
        Value::Message(child) => Value::Message(Box::new(clone_message(child))),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_copy_scalars_are_plain_clones() {
        assert!(matches!(deep_copy(&Value::I32(7)), Value::I32(7)));
        let bytes = Value::Bytes(bytes::Bytes::from_static(b"abc"));
        match deep_copy(&bytes) {
            Value::Bytes(b) => assert_eq!(&b[..], b"abc"),
            other => panic!("unexpected value: {other:?}"),
        }
    }
}
