//! Exact size computation, mirroring the encoder byte for byte.

use crate::descriptor::{Cardinality, FieldDescriptor, Kind};
use crate::message::DynamicMessage;
use crate::table::Coder;
use crate::value::{MapKey, Value};
use crate::varint::varint_len;
use crate::wire;

use super::encode::{populated_value, scalar_payload_len, EncodeOptions};

impl EncodeOptions {
    /// The exact byte length [`EncodeOptions::encode`] would produce for
    /// `m`. Field ordering never changes the length, so the deterministic
    /// flag is irrelevant here.
    ///
    /// The result is stored in the message's size cache, which a subsequent
    /// encode may trust under `use_cached_size`.
    pub fn encoded_len(&self, m: &DynamicMessage) -> usize {
        let info = m.descriptor().coder_info();
        let size = if self.deterministic && !info.supports_deterministic {
            message_len_slow(m)
        } else {
            message_len(m)
        };
        m.store_cached_size(size);
        size
    }
}

pub(crate) fn message_len(m: &DynamicMessage) -> usize {
    let info = m.descriptor().coder_info();
    if info.is_message_set {
        return message_set_len(m);
    }

    let mut size = 0;
    for cf in info.ordered_fields() {
        let Some(value) = populated_value(m, cf) else {
            continue;
        };
        let tag_len = usize::from(cf.tag_len);
        size += match cf.coder {
            Coder::Scalar => tag_len + scalar_payload_len(cf.kind, value),
            Coder::Message => {
                let child = value.as_message().expect("typed on set");
                tag_len + wire::len_delimited_len(message_len(child))
            }
            Coder::Group => {
                let child = value.as_message().expect("typed on set");
                tag_len + message_len(child) + wire::key_len(cf.number)
            }
            Coder::List => {
                let list = value.as_list().expect("typed on set");
                list.iter()
                    .map(|element| tag_len + scalar_payload_len(cf.kind, element))
                    .sum()
            }
            Coder::ListPacked => {
                let list = value.as_list().expect("typed on set");
                let content: usize = list
                    .iter()
                    .map(|element| scalar_payload_len(cf.kind, element))
                    .sum();
                tag_len + wire::len_delimited_len(content)
            }
            Coder::ListMessage => {
                let list = value.as_list().expect("typed on set");
                list.iter()
                    .map(|element| {
                        let child = element.as_message().expect("typed on set");
                        tag_len + wire::len_delimited_len(message_len(child))
                    })
                    .sum()
            }
            Coder::ListGroup => {
                let list = value.as_list().expect("typed on set");
                list.iter()
                    .map(|element| {
                        let child = element.as_message().expect("typed on set");
                        tag_len + message_len(child) + wire::key_len(cf.number)
                    })
                    .sum()
            }
            Coder::Map { key_kind, value_kind } => {
                let map = value.as_map().expect("typed on set");
                map.iter()
                    .map(|(key, entry_value)| {
                        let entry = map_entry_len(key, key_kind, entry_value, value_kind);
                        tag_len + wire::len_delimited_len(entry)
                    })
                    .sum()
            }
        };
    }

    for (field, value) in m.populated_extensions() {
        size += field_len_slow(field, value);
    }

    size + m.unknown_fields().len()
}

fn map_entry_len(key: &MapKey, key_kind: Kind, value: &Value, value_kind: Kind) -> usize {
    let key_len =
        wire::key_len(crate::descriptor::MAP_ENTRY_KEY_NUMBER) + scalar_payload_len(key_kind, &key.to_value());
    let value_len = wire::key_len(crate::descriptor::MAP_ENTRY_VALUE_NUMBER)
        + match value_kind {
            Kind::Message | Kind::Group => {
                let child = value.as_message().expect("typed on set");
                wire::len_delimited_len(message_len(child))
            }
            _ => scalar_payload_len(value_kind, value),
        };
    key_len + value_len
}

/// Reflective size of one populated field, the slow-path counterpart of
/// `encode_field_slow`.
pub(crate) fn field_len_slow(field: &FieldDescriptor, value: &Value) -> usize {
    let number = field.number();
    let kind = field.kind();
    let tag_len = wire::key_len(number);
    if field.is_map() {
        let map = value.as_map().expect("typed on set");
        let key_kind = field.map_key().expect("map shape validated").kind();
        let value_kind = field.map_value().expect("map shape validated").kind();
        return map
            .iter()
            .map(|(key, entry_value)| {
                tag_len
                    + wire::len_delimited_len(map_entry_len(key, key_kind, entry_value, value_kind))
            })
            .sum();
    }
    if field.cardinality() == Cardinality::Repeated {
        let list = value.as_list().expect("typed on set");
        if field.is_packed() {
            if list.is_empty() {
                return 0;
            }
            let content: usize = list
                .iter()
                .map(|element| scalar_payload_len(kind, element))
                .sum();
            return tag_len + wire::len_delimited_len(content);
        }
        return list
            .iter()
            .map(|element| singular_len(number, kind, element))
            .sum();
    }
    singular_len(number, kind, value)
}

fn singular_len(number: u32, kind: Kind, value: &Value) -> usize {
    let tag_len = wire::key_len(number);
    match kind {
        Kind::Message => {
            let child = value.as_message().expect("typed on set");
            tag_len + wire::len_delimited_len(message_len(child))
        }
        Kind::Group => {
            let child = value.as_message().expect("typed on set");
            tag_len + message_len(child) + wire::key_len(number)
        }
        _ => tag_len + scalar_payload_len(kind, value),
    }
}

/// Reflective size of a whole message body, the slow-path counterpart of
/// `encode_message_slow`.
pub(crate) fn message_len_slow(m: &DynamicMessage) -> usize {
    if m.descriptor().is_message_set() {
        return message_set_len(m);
    }
    let mut size = 0;
    for (field, value) in m.populated_fields() {
        size += field_len_slow(&field, value);
    }
    for (field, value) in m.populated_extensions() {
        size += field_len_slow(field, value);
    }
    size + m.unknown_fields().len()
}

fn message_set_len(m: &DynamicMessage) -> usize {
    let mut size = 0;
    for (field, value) in m.populated_extensions() {
        let child = value.as_message().expect("message-set extensions are messages");
        size += wire::key_len(super::MESSAGE_SET_ITEM_NUMBER) * 2;
        size += wire::key_len(super::MESSAGE_SET_TYPE_ID_NUMBER)
            + varint_len(u64::from(field.number()));
        size += wire::key_len(super::MESSAGE_SET_MESSAGE_NUMBER)
            + wire::len_delimited_len(message_len(child));
    }
    size + m.unknown_fields().len()
}
