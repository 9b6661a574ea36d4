//! The reflective message: descriptor-indexed dynamic storage.
//!
//! A [`DynamicMessage`] stores one optional [`Value`] slot per declared
//! field, extension values keyed by number, and the raw bytes of every
//! unknown field seen during decode. Handles are not thread-safe for
//! mutation; a frozen message may be read concurrently.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::descriptor::{Cardinality, FieldDescriptor, Kind, MessageDescriptor};
use crate::error::{DecodeError, EncodeError, WrongKindError};
use crate::value::{MapKey, Value};

pub(crate) struct ExtensionSlot {
    pub(crate) field: FieldDescriptor,
    pub(crate) value: Value,
}

/// A message instance described entirely by its descriptor.
pub struct DynamicMessage {
    desc: MessageDescriptor,
    slots: Box<[Option<Value>]>,
    extensions: BTreeMap<u32, ExtensionSlot>,
    unknown: Vec<u8>,
    /// Byte length of the last `encoded_len` computation, trusted only
    /// under `use_cached_size`. Zero means unset.
    cached_size: AtomicU32,
}

impl DynamicMessage {
    /// An empty message of the given type.
    pub fn new(desc: MessageDescriptor) -> Self {
        let slots = (0..desc.field_count()).map(|_| None).collect();
        DynamicMessage {
            desc,
            slots,
            extensions: BTreeMap::new(),
            unknown: Vec::new(),
            cached_size: AtomicU32::new(0),
        }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.desc
    }

    /// Decode a message of type `desc` from `data` with default options.
    pub fn decode(desc: MessageDescriptor, data: &[u8]) -> Result<Self, DecodeError> {
        crate::codec::DecodeOptions::default().decode(desc, data)
    }

    /// Encode with default options.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        crate::codec::EncodeOptions::default().encode(self)
    }

    /// The exact encoded length under default options.
    pub fn encoded_len(&self) -> usize {
        crate::codec::EncodeOptions::default().encoded_len(self)
    }

    /// Whether `field` is populated: present for explicit-presence fields,
    /// non-empty for lists and maps, non-default for implicit-presence
    /// scalars.
    pub fn has(&self, field: &FieldDescriptor) -> bool {
        if field.is_extension() {
            return self.extensions.contains_key(&field.number());
        }
        let Some(index) = field.member_index() else {
            return false;
        };
        match &self.slots[index as usize] {
            Some(value) => Self::counts_as_populated(field, value),
            None => false,
        }
    }

    fn counts_as_populated(field: &FieldDescriptor, value: &Value) -> bool {
        match value {
            Value::List(list) => !list.is_empty(),
            Value::Map(map) => !map.is_empty(),
            _ if field.has_presence() => true,
            v => !v.is_default(),
        }
    }

    /// The populated value of `field`, if any.
    pub fn get(&self, field: &FieldDescriptor) -> Option<&Value> {
        if field.is_extension() {
            return self.extensions.get(&field.number()).map(|slot| &slot.value);
        }
        let index = field.member_index()?;
        let value = self.slots[index as usize].as_ref()?;
        Self::counts_as_populated(field, value).then_some(value)
    }

    /// Store `value` into `field`, replacing any previous value. Setting a
    /// member of a oneof clears its other members.
    pub fn set(&mut self, field: &FieldDescriptor, value: Value) -> Result<(), WrongKindError> {
        check_field_value(field, &value)?;
        self.invalidate_cached_size();
        if field.is_extension() {
            self.extensions.insert(
                field.number(),
                ExtensionSlot {
                    field: field.clone(),
                    value,
                },
            );
            return Ok(());
        }
        let index = field
            .member_index()
            .expect("non-extension fields carry a member index");
        self.clear_other_oneof_members(field);
        self.slots[index as usize] = Some(value);
        Ok(())
    }

    /// Internal setter for values produced by the decoder, which are typed
    /// by construction.
    pub(crate) fn set_trusted(&mut self, field: &FieldDescriptor, value: Value) {
        self.invalidate_cached_size();
        if field.is_extension() {
            self.extensions.insert(
                field.number(),
                ExtensionSlot {
                    field: field.clone(),
                    value,
                },
            );
            return;
        }
        let index = field
            .member_index()
            .expect("non-extension fields carry a member index");
        self.clear_other_oneof_members(field);
        self.slots[index as usize] = Some(value);
    }

    fn clear_other_oneof_members(&mut self, field: &FieldDescriptor) {
        let Some(oneof) = field.containing_oneof() else {
            return;
        };
        // Last one wins across all members, whatever their arrival order.
        let member_indices: Vec<u32> = oneof
            .fields()
            .filter_map(|member| member.member_index())
            .collect();
        let keep = field.member_index();
        for index in member_indices {
            if Some(index) != keep {
                self.slots[index as usize] = None;
            }
        }
    }

    /// Remove any value of `field`.
    pub fn clear(&mut self, field: &FieldDescriptor) {
        self.invalidate_cached_size();
        if field.is_extension() {
            self.extensions.remove(&field.number());
            return;
        }
        if let Some(index) = field.member_index() {
            self.slots[index as usize] = None;
        }
    }

    /// The value of `field`, initializing an empty one if absent.
    ///
    /// Lists initialize empty, maps initialize empty, message fields
    /// initialize to an empty child message, scalars to their default.
    pub fn mutable(&mut self, field: &FieldDescriptor) -> &mut Value {
        self.invalidate_cached_size();
        if field.is_extension() {
            let slot = self
                .extensions
                .entry(field.number())
                .or_insert_with(|| ExtensionSlot {
                    field: field.clone(),
                    value: empty_value_for(field),
                });
            return &mut slot.value;
        }
        let index = field
            .member_index()
            .expect("non-extension fields carry a member index") as usize;
        if self.slots[index].is_none() {
            self.clear_other_oneof_members(field);
            self.slots[index] = Some(empty_value_for(field));
        }
        self.slots[index].as_mut().expect("slot was just filled")
    }

    /// The member of `oneof` currently set, if any.
    pub fn which_oneof(
        &self,
        oneof: &crate::descriptor::OneofDescriptor,
    ) -> Option<FieldDescriptor> {
        oneof.fields().find(|field| self.has(field))
    }

    /// Populated declared fields in declaration order.
    pub fn populated_fields(&self) -> impl Iterator<Item = (FieldDescriptor, &Value)> + '_ {
        self.desc.fields().filter_map(move |field| {
            let index = field.member_index()? as usize;
            let value = self.slots[index].as_ref()?;
            Self::counts_as_populated(&field, value).then_some((field, value))
        })
    }

    /// Populated extensions in ascending field-number order.
    pub fn populated_extensions(&self) -> impl Iterator<Item = (&FieldDescriptor, &Value)> + '_ {
        self.extensions.values().map(|slot| (&slot.field, &slot.value))
    }

    /// Reset every field, extension, and unknown byte.
    pub fn clear_all(&mut self) {
        self.invalidate_cached_size();
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.extensions.clear();
        self.unknown.clear();
    }

    /// Raw slot access for the table-driven codec paths.
    pub(crate) fn slot(&self, index: u32) -> Option<&Value> {
        self.slots[index as usize].as_ref()
    }

    /// The raw bytes of every unrecognized field, in arrival order.
    pub fn unknown_fields(&self) -> &[u8] {
        &self.unknown
    }

    /// Append raw bytes to the unknown-field string. The bytes must be a
    /// whole number of well-formed fields.
    pub fn append_unknown(&mut self, raw: &[u8]) {
        self.invalidate_cached_size();
        self.unknown.extend_from_slice(raw);
    }

    pub fn clear_unknown(&mut self) {
        self.invalidate_cached_size();
        self.unknown.clear();
    }

    pub(crate) fn cached_size(&self) -> Option<usize> {
        match self.cached_size.load(Ordering::Acquire) {
            0 => None,
            n => Some(n as usize),
        }
    }

    pub(crate) fn store_cached_size(&self, size: usize) {
        let stored = u32::try_from(size).unwrap_or(0);
        self.cached_size.store(stored, Ordering::Release);
    }

    fn invalidate_cached_size(&mut self) {
        *self.cached_size.get_mut() = 0;
    }
}

/// The empty value a just-initialized field slot holds.
fn empty_value_for(field: &FieldDescriptor) -> Value {
    if field.is_map() {
        return Value::Map(BTreeMap::new());
    }
    match field.cardinality() {
        Cardinality::Repeated => Value::List(Vec::new()),
        _ => match field.kind() {
            Kind::Message | Kind::Group => {
                let desc = field
                    .message_type()
                    .expect("message fields resolve to a message type");
                Value::Message(Box::new(DynamicMessage::new(desc)))
            }
            kind => field
                .default_value()
                .or_else(|| Value::default_for(kind))
                .expect("scalar kinds always have a zero value"),
        },
    }
}

/// Validate that `value`'s shape matches the field declaration.
fn check_field_value(field: &FieldDescriptor, value: &Value) -> Result<(), WrongKindError> {
    if field.is_map() {
        let map = value.as_map()?;
        let value_field = field
            .map_value()
            .expect("map fields carry an entry value field");
        for (key, entry) in map {
            check_map_key(field, key)?;
            check_singular_value(&value_field, entry)?;
        }
        return Ok(());
    }
    if field.cardinality() == Cardinality::Repeated {
        let list = value.as_list()?;
        for element in list {
            check_singular_value(field, element)?;
        }
        return Ok(());
    }
    check_singular_value(field, value)
}

fn check_map_key(field: &FieldDescriptor, key: &MapKey) -> Result<(), WrongKindError> {
    let key_field = field.map_key().expect("map fields carry an entry key field");
    let expected = expected_scalar_name(key_field.kind());
    if key.kind_name() == expected {
        Ok(())
    } else {
        Err(WrongKindError {
            expected,
            actual: key.kind_name(),
        })
    }
}

fn check_singular_value(field: &FieldDescriptor, value: &Value) -> Result<(), WrongKindError> {
    let matches = match (field.kind(), value) {
        (Kind::Bool, Value::Bool(_)) => true,
        (Kind::Int32 | Kind::Sint32 | Kind::Sfixed32, Value::I32(_)) => true,
        (Kind::Int64 | Kind::Sint64 | Kind::Sfixed64, Value::I64(_)) => true,
        (Kind::Uint32 | Kind::Fixed32, Value::U32(_)) => true,
        (Kind::Uint64 | Kind::Fixed64, Value::U64(_)) => true,
        (Kind::Float, Value::F32(_)) => true,
        (Kind::Double, Value::F64(_)) => true,
        (Kind::Enum, Value::EnumNumber(_)) => true,
        (Kind::String, Value::String(_)) => true,
        (Kind::Bytes, Value::Bytes(_)) => true,
        (Kind::Message | Kind::Group, Value::Message(m)) => {
            field
                .message_type()
                .map_or(false, |desc| desc == *m.descriptor())
        }
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(WrongKindError {
            expected: expected_scalar_name(field.kind()),
            actual: value.kind_name(),
        })
    }
}

fn expected_scalar_name(kind: Kind) -> &'static str {
    match kind {
        Kind::Bool => "bool",
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => "int32",
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => "int64",
        Kind::Uint32 | Kind::Fixed32 => "uint32",
        Kind::Uint64 | Kind::Fixed64 => "uint64",
        Kind::Float => "float",
        Kind::Double => "double",
        Kind::Enum => "enum",
        Kind::String => "string",
        Kind::Bytes => "bytes",
        Kind::Message | Kind::Group => "message",
    }
}

impl Clone for DynamicMessage {
    fn clone(&self) -> Self {
        DynamicMessage {
            desc: self.desc.clone(),
            slots: self.slots.clone(),
            extensions: self
                .extensions
                .iter()
                .map(|(&num, slot)| {
                    (
                        num,
                        ExtensionSlot {
                            field: slot.field.clone(),
                            value: slot.value.clone(),
                        },
                    )
                })
                .collect(),
            unknown: self.unknown.clone(),
            // A clone may be mutated immediately; do not carry the cache.
            cached_size: AtomicU32::new(0),
        }
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        crate::codec::equal(self, other)
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries = f.debug_map();
        for (field, value) in self.populated_fields() {
            entries.entry(&field.name(), value);
        }
        for (field, value) in self.populated_extensions() {
            entries.entry(&format_args!("[{}]", field.full_name()), value);
        }
        if !self.unknown.is_empty() {
            entries.entry(&"<unknown>", &format_args!("{} bytes", self.unknown.len()));
        }
        entries.finish()
    }
}
