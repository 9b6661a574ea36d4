//! The per-message-type dispatch table.
//!
//! Built once per message type on first use and cached on the descriptor
//! behind a one-shot cell, so steady-state lookups are a single
//! acquire-load. The table precomputes everything the codec would otherwise
//! re-derive per field per message: wire tags, tag sizes, coder strategies,
//! and a field-number index that is a dense array for small numbers and a
//! hash map beyond.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::descriptor::{
    Cardinality, FieldDescriptor, FileDescriptor, Kind, MessageDescriptor,
};
use crate::varint::varint_len;
use crate::wire::{FieldKey, WireType};

/// Sentinel index marking an empty dense-table entry.
const NO_FIELD: u32 = u32::MAX;

/// How a field's values are framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Coder {
    /// Singular scalar, enum, string, or bytes.
    Scalar,
    /// Singular embedded message, length-delimited.
    Message,
    /// Singular group, start/end framed.
    Group,
    /// Repeated scalar, one tagged record per element.
    List,
    /// Repeated scalar, one length-delimited block of payloads.
    ListPacked,
    /// Repeated embedded message.
    ListMessage,
    /// Repeated group.
    ListGroup,
    /// Map field; entries are synthetic key/value messages.
    Map {
        key_kind: Kind,
        value_kind: Kind,
    },
}

/// A reference from a coder field to the dispatch-relevant child message
/// type: the field's message type, or a map field's entry type.
///
/// Same-file children are indices so the cached table never owns its own
/// file; foreign children hold the imported file handle (imports are a DAG).
#[derive(Debug, Clone)]
pub(crate) enum ChildRef {
    Local(u32),
    Foreign(FileDescriptor, u32),
    /// Unresolvable child; values decode as empty placeholders.
    Placeholder(Arc<str>),
}

impl ChildRef {
    pub(crate) fn resolve(&self, file: &FileDescriptor) -> MessageDescriptor {
        match self {
            ChildRef::Local(index) => MessageDescriptor::real(file.clone(), *index),
            ChildRef::Foreign(foreign, index) => MessageDescriptor::real(foreign.clone(), *index),
            ChildRef::Placeholder(name) => MessageDescriptor::placeholder(name.clone()),
        }
    }

    fn of(field: &FieldDescriptor, owner: &MessageDescriptor) -> Option<ChildRef> {
        let child = field.message_type()?;
        if child.is_placeholder() {
            return Some(ChildRef::Placeholder(Arc::from(child.full_name())));
        }
        let owner_file = owner.parent_file()?;
        let child_file = child.parent_file()?;
        if owner_file == child_file {
            Some(ChildRef::Local(child.index()))
        } else {
            Some(ChildRef::Foreign(child_file.clone(), child.index()))
        }
    }
}

/// Per-field entry of the dispatch table.
#[derive(Debug, Clone)]
pub(crate) struct CoderField {
    pub(crate) number: u32,
    /// `(number << 3) | wire_type`, with packed repeated forced to the
    /// length-delimited wire type.
    pub(crate) wiretag: u32,
    /// Varint size of `wiretag`.
    pub(crate) tag_len: u8,
    /// Storage slot: the field's declaration index.
    pub(crate) index: u32,
    pub(crate) kind: Kind,
    pub(crate) coder: Coder,
    /// Dispatch table of the child message type, for message-typed fields
    /// and map fields (the entry type).
    pub(crate) child: Option<ChildRef>,
    pub(crate) is_required: bool,
    /// Member of a non-synthetic oneof; emitted last under legacy order.
    pub(crate) in_oneof: bool,
    /// Implicit presence: a populated slot holding the default value still
    /// counts as unset.
    pub(crate) implicit: bool,
}

/// The cached per-type information driving the fast path.
#[derive(Debug)]
pub(crate) struct MessageInfo {
    /// One entry per declared field, in declaration order; the position is
    /// the storage slot.
    pub(crate) fields: Box<[CoderField]>,
    /// Indices into `fields` in emission order: ascending field number,
    /// re-sorted so oneof members trail everything else when the type has
    /// a non-synthetic oneof.
    pub(crate) ordered: Vec<u32>,
    /// Field number to `fields` index for numbers below the dense cutoff.
    dense: Vec<u32>,
    /// Field number to `fields` index for every field.
    sparse: HashMap<u32, u32>,
    pub(crate) needs_init_check: bool,
    pub(crate) is_message_set: bool,
    pub(crate) num_required_fields: u32,
    /// The fast path always produces deterministic-capable output; kept as
    /// data so a hand-rolled message type could opt out.
    pub(crate) supports_deterministic: bool,
}

impl MessageInfo {
    /// Compute the table for `desc`. Called once per type through the
    /// descriptor's one-shot cell.
    pub(crate) fn build(desc: &MessageDescriptor) -> MessageInfo {
        let field_count = desc.field_count();
        let mut fields = Vec::with_capacity(field_count);
        let mut sparse = HashMap::with_capacity(field_count);
        let mut num_required = 0u32;

        for (slot, field) in desc.fields().enumerate() {
            let cf = Self::make_coder_field(&field, desc, slot as u32);
            if cf.is_required {
                num_required += 1;
            }
            sparse.insert(cf.number, slot as u32);
            fields.push(cf);
        }

        let mut ordered: Vec<u32> = (0..field_count as u32).collect();
        ordered.sort_unstable_by_key(|&i| fields[i as usize].number);

        let dense = Self::build_dense(&fields, &ordered);

        // To preserve compatibility with historic wire output, oneof
        // members marshal last.
        let has_oneof = fields.iter().any(|cf| cf.in_oneof);
        if has_oneof {
            let oneof_index = |i: u32| -> (bool, u32, u32) {
                let field = desc.field(i as usize);
                let in_oneof = fields[i as usize].in_oneof;
                let oneof = field
                    .containing_oneof()
                    .map(|o| o.index())
                    .unwrap_or(u32::MAX);
                (in_oneof, oneof, fields[i as usize].number)
            };
            ordered.sort_by_key(|&i| oneof_index(i));
        }

        MessageInfo {
            needs_init_check: needs_init_check(desc, &mut HashSet::new()),
            is_message_set: desc.is_message_set(),
            num_required_fields: num_required,
            supports_deterministic: true,
            fields: fields.into_boxed_slice(),
            ordered,
            dense,
            sparse,
        }
    }

    fn make_coder_field(
        field: &FieldDescriptor,
        owner: &MessageDescriptor,
        slot: u32,
    ) -> CoderField {
        let kind = field.kind();
        let is_map = field.is_map();
        let repeated = field.cardinality() == Cardinality::Repeated;
        let packed = field.is_packed();

        let coder = if is_map {
            let key_kind = field
                .map_key()
                .map(|f| f.kind())
                .unwrap_or(Kind::Int32);
            let value_kind = field
                .map_value()
                .map(|f| f.kind())
                .unwrap_or(Kind::Int32);
            Coder::Map { key_kind, value_kind }
        } else if repeated {
            match kind {
                Kind::Message => Coder::ListMessage,
                Kind::Group => Coder::ListGroup,
                _ if packed => Coder::ListPacked,
                _ => Coder::List,
            }
        } else {
            match kind {
                Kind::Message => Coder::Message,
                Kind::Group => Coder::Group,
                _ => Coder::Scalar,
            }
        };

        // Packed repeated always frames as one length-delimited record;
        // everything else uses the kind's canonical wire type.
        let wire_type = if is_map || (repeated && packed) {
            WireType::Len
        } else {
            kind.wire_type()
        };

        let wiretag = FieldKey::new(field.number(), wire_type).raw();

        let in_oneof = field
            .containing_oneof()
            .map_or(false, |oneof| !oneof.is_synthetic());

        CoderField {
            number: field.number(),
            wiretag,
            tag_len: varint_len(u64::from(wiretag)) as u8,
            index: slot,
            kind,
            coder,
            child: ChildRef::of(field, owner),
            is_required: field.is_required(),
            in_oneof,
            implicit: !field.has_presence() && !repeated,
        }
    }

    /// The dense cutoff: stop at the first number `n >= 16` that is not
    /// within twice the densest prefix seen so far.
    fn build_dense(fields: &[CoderField], ordered_by_number: &[u32]) -> Vec<u32> {
        let mut max_dense = 0u32;
        for &i in ordered_by_number {
            let num = fields[i as usize].number;
            if num >= 16 && num >= 2 * max_dense {
                break;
            }
            max_dense = num;
        }
        let mut dense = vec![NO_FIELD; max_dense as usize + 1];
        for &i in ordered_by_number {
            let num = fields[i as usize].number;
            if (num as usize) < dense.len() {
                dense[num as usize] = i;
            }
        }
        dense
    }

    /// Find the coder entry for a field number: dense array first, sparse
    /// map beyond.
    #[inline]
    pub(crate) fn field_by_number(&self, number: u32) -> Option<&CoderField> {
        if let Some(&index) = self.dense.get(number as usize) {
            if index == NO_FIELD {
                return None;
            }
            return Some(&self.fields[index as usize]);
        }
        self.sparse
            .get(&number)
            .map(|&index| &self.fields[index as usize])
    }

    /// Entries in emission order.
    pub(crate) fn ordered_fields(&self) -> impl Iterator<Item = &CoderField> + '_ {
        self.ordered.iter().map(move |&i| &self.fields[i as usize])
    }
}

/// A type needs an initialization check when it transitively contains a
/// required field. The visited set breaks recursive type cycles.
fn needs_init_check(
    desc: &MessageDescriptor,
    visited: &mut HashSet<(usize, u32)>,
) -> bool {
    let Some(file) = desc.parent_file() else {
        // Placeholders contribute nothing.
        return false;
    };
    let key = (Arc::as_ptr(&file.inner) as usize, desc.index());
    if !visited.insert(key) {
        return false;
    }
    for field in desc.fields() {
        if field.is_required() {
            return true;
        }
        if matches!(field.kind(), Kind::Message | Kind::Group) {
            if let Some(child) = field.message_type() {
                if needs_init_check(&child, visited) {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::proto::{
        DescriptorProto, FieldDescriptorProto, FileDescriptorProto, OneofDescriptorProto,
    };
    use crate::descriptor::FileOptions;

    fn int32_field(name: &str, number: i32) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_owned()),
            number: Some(number),
            label: Some(1),
            r#type: Some(5),
            ..Default::default()
        }
    }

    fn build_info(numbers: &[i32]) -> Arc<MessageInfo> {
        let fd = FileDescriptorProto {
            name: Some("t.proto".to_owned()),
            package: Some("t".to_owned()),
            syntax: Some("proto3".to_owned()),
            message_type: vec![DescriptorProto {
                name: Some("M".to_owned()),
                field: numbers
                    .iter()
                    .enumerate()
                    .map(|(i, &n)| int32_field(&format!("f{i}"), n))
                    .collect(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let file = FileOptions::default().new_file(&fd, &()).unwrap();
        let info = file.messages().next().unwrap().coder_info();
        info
    }

    #[test]
    fn test_lookup_dense_and_sparse() {
        let info = build_info(&[1, 2, 3, 500]);
        assert_eq!(info.field_by_number(1).unwrap().number, 1);
        assert_eq!(info.field_by_number(3).unwrap().number, 3);
        // 500 is past the dense cutoff; the sparse map serves it.
        assert_eq!(info.field_by_number(500).unwrap().number, 500);
        assert!(info.field_by_number(4).is_none());
        assert!(info.field_by_number(499).is_none());
    }

    #[test]
    fn test_dense_cutoff() {
        // 17 < 2*15, so a dense prefix absorbs slightly sparse tails;
        // a lone 16 never qualifies.
        let info = build_info(&[14, 15, 17]);
        assert!(info.dense.len() > 17);

        let info = build_info(&[16]);
        assert_eq!(info.dense.len(), 1);
        assert_eq!(info.field_by_number(16).unwrap().number, 16);

        let info = build_info(&[1, 2, 100]);
        assert_eq!(info.dense.len(), 3);
    }

    #[test]
    fn test_ordered_fields_sorted_by_number() {
        let info = build_info(&[9, 1, 5]);
        let order: Vec<u32> = info.ordered_fields().map(|cf| cf.number).collect();
        assert_eq!(order, [1, 5, 9]);
    }

    #[test]
    fn test_oneof_members_trail_in_emission_order() {
        let fd = FileDescriptorProto {
            name: Some("t.proto".to_owned()),
            package: Some("t".to_owned()),
            syntax: Some("proto3".to_owned()),
            message_type: vec![DescriptorProto {
                name: Some("M".to_owned()),
                field: vec![
                    FieldDescriptorProto {
                        oneof_index: Some(0),
                        ..int32_field("member", 1)
                    },
                    int32_field("plain", 2),
                ],
                oneof_decl: vec![OneofDescriptorProto {
                    name: Some("choice".to_owned()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let file = FileOptions::default().new_file(&fd, &()).unwrap();
        let info = file.messages().next().unwrap().coder_info();

        let order: Vec<u32> = info.ordered_fields().map(|cf| cf.number).collect();
        assert_eq!(order, [2, 1]);
        assert!(info.fields[0].in_oneof);
        assert!(!info.fields[1].in_oneof);
    }
}
