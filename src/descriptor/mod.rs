//! The linked descriptor object model.
//!
//! A [`FileDescriptor`] is the resolved form of a `FileDescriptorProto`:
//! imports point at other files, type references point at message and enum
//! declarations, and every declaration carries its full name. Descriptors
//! are immutable once resolution finishes; handles are `(file, index)`
//! pairs and cost an `Arc` clone to copy.
//!
//! Same-file type references are stored as indices (recursive messages are
//! the norm), cross-file references hold the foreign file handle. Imports
//! form a DAG, so the handle graph has no reference cycles.

pub mod proto;
pub mod ranges;
mod registry;
mod resolve;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::table::MessageInfo;
use crate::value::Value;
use crate::wire::WireType;

pub use ranges::{EnumRanges, FieldRanges, Names};
pub use registry::FileRegistry;
pub use resolve::{new_file, new_files, DescriptorSource, FileOptions};

/// Field number of a map entry's key field.
pub(crate) const MAP_ENTRY_KEY_NUMBER: u32 = 1;
/// Field number of a map entry's value field.
pub(crate) const MAP_ENTRY_VALUE_NUMBER: u32 = 2;

/// The declared syntax of a `.proto` file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
}

/// The declared type of a field, naming both its value domain and its wire
/// representation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Kind {
    Double = 1,
    Float = 2,
    Int64 = 3,
    Uint64 = 4,
    Int32 = 5,
    Fixed64 = 6,
    Fixed32 = 7,
    Bool = 8,
    String = 9,
    Group = 10,
    Message = 11,
    Bytes = 12,
    Uint32 = 13,
    Enum = 14,
    Sfixed32 = 15,
    Sfixed64 = 16,
    Sint32 = 17,
    Sint64 = 18,
}

impl Kind {
    pub fn from_proto(value: i32) -> Option<Self> {
        Some(match value {
            1 => Kind::Double,
            2 => Kind::Float,
            3 => Kind::Int64,
            4 => Kind::Uint64,
            5 => Kind::Int32,
            6 => Kind::Fixed64,
            7 => Kind::Fixed32,
            8 => Kind::Bool,
            9 => Kind::String,
            10 => Kind::Group,
            11 => Kind::Message,
            12 => Kind::Bytes,
            13 => Kind::Uint32,
            14 => Kind::Enum,
            15 => Kind::Sfixed32,
            16 => Kind::Sfixed64,
            17 => Kind::Sint32,
            18 => Kind::Sint64,
            _ => return None,
        })
    }

    /// The wire type a singular value of this kind uses.
    pub fn wire_type(self) -> WireType {
        match self {
            Kind::Int32
            | Kind::Int64
            | Kind::Uint32
            | Kind::Uint64
            | Kind::Sint32
            | Kind::Sint64
            | Kind::Bool
            | Kind::Enum => WireType::Varint,
            Kind::Fixed64 | Kind::Sfixed64 | Kind::Double => WireType::I64,
            Kind::String | Kind::Bytes | Kind::Message => WireType::Len,
            Kind::Group => WireType::StartGroup,
            Kind::Fixed32 | Kind::Sfixed32 | Kind::Float => WireType::I32,
        }
    }

    /// Only fixed-width and varint kinds may use the packed encoding.
    pub fn is_packable(self) -> bool {
        !matches!(
            self,
            Kind::String | Kind::Bytes | Kind::Message | Kind::Group
        )
    }
}

/// Whether a field is singular, required, or repeated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cardinality {
    Optional,
    Required,
    Repeated,
}

/// One import of a file, as declared.
#[derive(Debug, Clone)]
pub struct FileImport {
    pub path: String,
    pub is_public: bool,
    pub is_weak: bool,
    /// The resolved file; `None` when resolution was permitted to leave a
    /// placeholder behind.
    pub file: Option<FileDescriptor>,
}

/// A source position attached to a declaration path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceLocation {
    pub path: Vec<i32>,
    pub start_line: i32,
    pub start_column: i32,
    pub end_line: i32,
    pub end_column: i32,
    pub leading_comments: String,
    pub trailing_comments: String,
    pub leading_detached_comments: Vec<String>,
}

/// What a full name refers to inside a file.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Symbol {
    Message(u32),
    Enum(u32),
    EnumValue { enum_index: u32, value_index: u32 },
    Extension(u32),
    Service(u32),
}

/// Any named declaration, as returned by name lookup.
#[derive(Clone)]
pub enum AnyDescriptor {
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
    EnumValue(EnumValueDescriptor),
    Extension(FieldDescriptor),
    Service(ServiceDescriptor),
}

impl fmt::Debug for AnyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyDescriptor::Message(d) => write!(f, "Message({})", d.full_name()),
            AnyDescriptor::Enum(d) => write!(f, "Enum({})", d.full_name()),
            AnyDescriptor::EnumValue(d) => write!(f, "EnumValue({})", d.full_name()),
            AnyDescriptor::Extension(d) => write!(f, "Extension({})", d.full_name()),
            AnyDescriptor::Service(d) => write!(f, "Service({})", d.full_name()),
        }
    }
}

pub(crate) struct FileInner {
    pub(crate) path: String,
    pub(crate) package: String,
    pub(crate) syntax: Syntax,
    pub(crate) imports: Vec<FileImport>,
    /// All messages in the file, nested included, parent-first.
    pub(crate) messages: Vec<MessageInner>,
    /// All enums in the file, nested included.
    pub(crate) enums: Vec<EnumInner>,
    /// All extension fields in the file, nested included.
    pub(crate) extensions: Vec<FieldInner>,
    pub(crate) services: Vec<ServiceInner>,
    pub(crate) top_messages: Vec<u32>,
    pub(crate) top_enums: Vec<u32>,
    pub(crate) top_extensions: Vec<u32>,
    pub(crate) symbols: HashMap<String, Symbol>,
    pub(crate) locations: Vec<SourceLocation>,
}

pub(crate) struct MessageInner {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) parent: Option<u32>,
    pub(crate) fields: Vec<FieldInner>,
    pub(crate) oneofs: Vec<OneofInner>,
    pub(crate) nested_messages: Vec<u32>,
    pub(crate) nested_enums: Vec<u32>,
    pub(crate) extension_ranges: FieldRanges,
    pub(crate) reserved_ranges: FieldRanges,
    pub(crate) reserved_names: Names,
    pub(crate) is_map_entry: bool,
    pub(crate) is_message_set: bool,
    pub(crate) fields_by_number: OnceCell<HashMap<u32, u32>>,
    pub(crate) fields_by_name: OnceCell<HashMap<String, u32>>,
    pub(crate) info: OnceCell<Arc<MessageInfo>>,
}

pub(crate) struct FieldInner {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) json_name: String,
    pub(crate) number: u32,
    pub(crate) kind: Kind,
    pub(crate) cardinality: Cardinality,
    pub(crate) packed: bool,
    pub(crate) proto3_optional: bool,
    pub(crate) oneof: Option<u32>,
    pub(crate) default: Option<Value>,
    pub(crate) type_ref: TypeRef,
    pub(crate) is_extension: bool,
    pub(crate) extendee: TypeRef,
}

pub(crate) struct OneofInner {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) fields: Vec<u32>,
}

pub(crate) struct EnumInner {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) values: Vec<EnumValueInner>,
    pub(crate) reserved_ranges: EnumRanges,
    pub(crate) reserved_names: Names,
    pub(crate) by_number: OnceCell<HashMap<i32, u32>>,
}

pub(crate) struct EnumValueInner {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) number: i32,
}

pub(crate) struct ServiceInner {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) methods: Vec<MethodInner>,
}

pub(crate) struct MethodInner {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) input: TypeRef,
    pub(crate) output: TypeRef,
}

/// A reference from a declaration to a message or enum type.
#[derive(Debug, Clone)]
pub(crate) enum TypeRef {
    None,
    /// Message in the same file, by flattened index.
    LocalMessage(u32),
    /// Enum in the same file, by flattened index.
    LocalEnum(u32),
    /// Message in an imported file.
    ForeignMessage(FileDescriptor, u32),
    /// Enum in an imported file.
    ForeignEnum(FileDescriptor, u32),
    /// Unresolvable message reference; the name may carry a `*.` prefix
    /// marking an unknown leading segment.
    PlaceholderMessage(Arc<str>),
    /// Unresolvable enum reference.
    PlaceholderEnum(Arc<str>),
}

// --- FileDescriptor ---------------------------------------------------------

/// A resolved `.proto` file.
#[derive(Clone)]
pub struct FileDescriptor {
    pub(crate) inner: Arc<FileInner>,
}

impl FileDescriptor {
    /// The unique path of the file, e.g. `"google/protobuf/descriptor.proto"`.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// The declared package, possibly empty.
    pub fn package(&self) -> &str {
        &self.inner.package
    }

    pub fn syntax(&self) -> Syntax {
        self.inner.syntax
    }

    pub fn imports(&self) -> &[FileImport] {
        &self.inner.imports
    }

    pub fn source_locations(&self) -> &[SourceLocation] {
        &self.inner.locations
    }

    /// Top-level messages, in declaration order.
    pub fn messages(&self) -> impl ExactSizeIterator<Item = MessageDescriptor> + '_ {
        self.inner
            .top_messages
            .iter()
            .map(move |&index| MessageDescriptor::real(self.clone(), index))
    }

    /// Top-level enums, in declaration order.
    pub fn enums(&self) -> impl ExactSizeIterator<Item = EnumDescriptor> + '_ {
        self.inner
            .top_enums
            .iter()
            .map(move |&index| EnumDescriptor::real(self.clone(), index))
    }

    /// Top-level extensions, in declaration order.
    pub fn extensions(&self) -> impl ExactSizeIterator<Item = FieldDescriptor> + '_ {
        self.inner.top_extensions.iter().map(move |&index| FieldDescriptor {
            file: self.clone(),
            loc: FieldLoc::Extension(index),
        })
    }

    pub fn services(&self) -> impl ExactSizeIterator<Item = ServiceDescriptor> + '_ {
        (0..self.inner.services.len() as u32)
            .map(move |index| ServiceDescriptor { file: self.clone(), index })
    }

    /// Look up any declaration in this file by full name.
    pub fn descriptor_by_name(&self, full_name: &str) -> Option<AnyDescriptor> {
        let symbol = self.inner.symbols.get(full_name)?;
        Some(match *symbol {
            Symbol::Message(index) => {
                AnyDescriptor::Message(MessageDescriptor::real(self.clone(), index))
            }
            Symbol::Enum(index) => AnyDescriptor::Enum(EnumDescriptor::real(self.clone(), index)),
            Symbol::EnumValue { enum_index, value_index } => {
                AnyDescriptor::EnumValue(EnumValueDescriptor {
                    parent: EnumDescriptor::real(self.clone(), enum_index),
                    index: value_index,
                })
            }
            Symbol::Extension(index) => AnyDescriptor::Extension(FieldDescriptor {
                file: self.clone(),
                loc: FieldLoc::Extension(index),
            }),
            Symbol::Service(index) => {
                AnyDescriptor::Service(ServiceDescriptor { file: self.clone(), index })
            }
        })
    }

    fn ptr_eq(&self, other: &FileDescriptor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for FileDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for FileDescriptor {}

impl fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("path", &self.path())
            .field("package", &self.package())
            .finish()
    }
}

// --- MessageDescriptor ------------------------------------------------------

#[derive(Clone)]
enum MessageDescriptorInner {
    Real { file: FileDescriptor, index: u32 },
    /// A stand-in for an unresolvable reference; carries only a full name.
    Placeholder(Arc<str>),
}

/// A message type.
#[derive(Clone)]
pub struct MessageDescriptor {
    inner: MessageDescriptorInner,
}

impl MessageDescriptor {
    pub(crate) fn real(file: FileDescriptor, index: u32) -> Self {
        MessageDescriptor {
            inner: MessageDescriptorInner::Real { file, index },
        }
    }

    pub(crate) fn placeholder(full_name: Arc<str>) -> Self {
        MessageDescriptor {
            inner: MessageDescriptorInner::Placeholder(full_name),
        }
    }

    fn get(&self) -> Option<(&FileDescriptor, &MessageInner)> {
        match &self.inner {
            MessageDescriptorInner::Real { file, index } => {
                Some((file, &file.inner.messages[*index as usize]))
            }
            MessageDescriptorInner::Placeholder(_) => None,
        }
    }

    /// Whether this descriptor is a placeholder for an unresolved reference.
    pub fn is_placeholder(&self) -> bool {
        matches!(self.inner, MessageDescriptorInner::Placeholder(_))
    }

    pub fn full_name(&self) -> &str {
        match &self.inner {
            MessageDescriptorInner::Real { file, index } => {
                &file.inner.messages[*index as usize].full_name
            }
            MessageDescriptorInner::Placeholder(name) => name,
        }
    }

    /// The short name: the last segment of the full name.
    pub fn name(&self) -> &str {
        match &self.inner {
            MessageDescriptorInner::Real { file, index } => {
                &file.inner.messages[*index as usize].name
            }
            MessageDescriptorInner::Placeholder(name) => {
                name.rsplit('.').next().unwrap_or(name)
            }
        }
    }

    /// The file this message was declared in, if it is not a placeholder.
    pub fn parent_file(&self) -> Option<&FileDescriptor> {
        self.get().map(|(file, _)| file)
    }

    pub fn syntax(&self) -> Syntax {
        self.get()
            .map(|(file, _)| file.inner.syntax)
            .unwrap_or(Syntax::Proto2)
    }

    /// The message containing this one, for nested declarations.
    pub fn parent_message(&self) -> Option<MessageDescriptor> {
        let (file, inner) = self.get()?;
        inner
            .parent
            .map(|parent| MessageDescriptor::real(file.clone(), parent))
    }

    pub fn field_count(&self) -> usize {
        self.get().map_or(0, |(_, inner)| inner.fields.len())
    }

    /// The field at declaration index `index`.
    pub fn field(&self, index: usize) -> FieldDescriptor {
        let (file, inner) = self.get().expect("placeholder messages have no fields");
        assert!(index < inner.fields.len());
        FieldDescriptor {
            file: file.clone(),
            loc: FieldLoc::Member {
                message: self.index(),
                field: index as u32,
            },
        }
    }

    /// All fields, in declaration order.
    pub fn fields(&self) -> impl ExactSizeIterator<Item = FieldDescriptor> + '_ {
        let count = self.field_count();
        (0..count).map(move |index| self.field(index))
    }

    pub fn field_by_number(&self, number: u32) -> Option<FieldDescriptor> {
        let (_, inner) = self.get()?;
        let by_number = inner.fields_by_number.get_or_init(|| {
            inner
                .fields
                .iter()
                .enumerate()
                .map(|(index, field)| (field.number, index as u32))
                .collect()
        });
        by_number.get(&number).map(|&index| self.field(index as usize))
    }

    pub fn field_by_name(&self, name: &str) -> Option<FieldDescriptor> {
        let (_, inner) = self.get()?;
        let by_name = inner.fields_by_name.get_or_init(|| {
            inner
                .fields
                .iter()
                .enumerate()
                .map(|(index, field)| (field.name.clone(), index as u32))
                .collect()
        });
        by_name.get(name).map(|&index| self.field(index as usize))
    }

    pub fn oneof_count(&self) -> usize {
        self.get().map_or(0, |(_, inner)| inner.oneofs.len())
    }

    pub fn oneof(&self, index: usize) -> OneofDescriptor {
        let (file, inner) = self.get().expect("placeholder messages have no oneofs");
        assert!(index < inner.oneofs.len());
        OneofDescriptor {
            file: file.clone(),
            message: self.index(),
            index: index as u32,
        }
    }

    pub fn oneofs(&self) -> impl ExactSizeIterator<Item = OneofDescriptor> + '_ {
        (0..self.oneof_count()).map(move |index| self.oneof(index))
    }

    pub fn nested_messages(&self) -> impl ExactSizeIterator<Item = MessageDescriptor> + '_ {
        let nested: &[u32] = match self.get() {
            Some((_, inner)) => &inner.nested_messages,
            None => &[],
        };
        nested.iter().map(move |&index| {
            let (file, _) = self.get().expect("nested index implies real message");
            MessageDescriptor::real(file.clone(), index)
        })
    }

    pub fn nested_enums(&self) -> impl ExactSizeIterator<Item = EnumDescriptor> + '_ {
        let nested: &[u32] = match self.get() {
            Some((_, inner)) => &inner.nested_enums,
            None => &[],
        };
        nested.iter().map(move |&index| {
            let (file, _) = self.get().expect("nested index implies real message");
            EnumDescriptor::real(file.clone(), index)
        })
    }

    pub fn extension_ranges(&self) -> &FieldRanges {
        static EMPTY: OnceCell<FieldRanges> = OnceCell::new();
        self.get().map_or_else(
            || EMPTY.get_or_init(FieldRanges::default),
            |(_, inner)| &inner.extension_ranges,
        )
    }

    pub fn reserved_ranges(&self) -> &FieldRanges {
        static EMPTY: OnceCell<FieldRanges> = OnceCell::new();
        self.get().map_or_else(
            || EMPTY.get_or_init(FieldRanges::default),
            |(_, inner)| &inner.reserved_ranges,
        )
    }

    pub fn reserved_names(&self) -> &Names {
        static EMPTY: OnceCell<Names> = OnceCell::new();
        self.get().map_or_else(
            || EMPTY.get_or_init(Names::default),
            |(_, inner)| &inner.reserved_names,
        )
    }

    /// Whether this message is the synthetic entry type of a map field.
    pub fn is_map_entry(&self) -> bool {
        self.get().map_or(false, |(_, inner)| inner.is_map_entry)
    }

    /// Whether this message uses the legacy message-set wire format.
    pub fn is_message_set(&self) -> bool {
        self.get().map_or(false, |(_, inner)| inner.is_message_set)
    }

    pub(crate) fn index(&self) -> u32 {
        match &self.inner {
            MessageDescriptorInner::Real { index, .. } => *index,
            MessageDescriptorInner::Placeholder(_) => unreachable!("placeholder has no index"),
        }
    }

    /// The per-type dispatch table, built on first use and cached.
    pub(crate) fn coder_info(&self) -> Arc<MessageInfo> {
        match self.get() {
            Some((_, inner)) => inner
                .info
                .get_or_init(|| Arc::new(MessageInfo::build(self)))
                .clone(),
            // Placeholder messages decode as empty; nothing to cache them on.
            None => Arc::new(MessageInfo::build(self)),
        }
    }
}

impl PartialEq for MessageDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (
                MessageDescriptorInner::Real { file: fa, index: ia },
                MessageDescriptorInner::Real { file: fb, index: ib },
            ) => fa.ptr_eq(fb) && ia == ib,
            (
                MessageDescriptorInner::Placeholder(a),
                MessageDescriptorInner::Placeholder(b),
            ) => a == b,
            _ => false,
        }
    }
}

impl Eq for MessageDescriptor {}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("full_name", &self.full_name())
            .field("is_placeholder", &self.is_placeholder())
            .finish()
    }
}

// --- FieldDescriptor --------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum FieldLoc {
    Member { message: u32, field: u32 },
    Extension(u32),
}

/// A field of a message, or an extension field.
#[derive(Clone)]
pub struct FieldDescriptor {
    file: FileDescriptor,
    loc: FieldLoc,
}

impl FieldDescriptor {
    pub(crate) fn extension(file: FileDescriptor, index: u32) -> Self {
        FieldDescriptor {
            file,
            loc: FieldLoc::Extension(index),
        }
    }

    fn inner(&self) -> &FieldInner {
        match self.loc {
            FieldLoc::Member { message, field } => {
                &self.file.inner.messages[message as usize].fields[field as usize]
            }
            FieldLoc::Extension(index) => &self.file.inner.extensions[index as usize],
        }
    }

    pub fn name(&self) -> &str {
        &self.inner().name
    }

    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    pub fn json_name(&self) -> &str {
        &self.inner().json_name
    }

    /// The name used by the text format: the message name for groups, the
    /// field name otherwise. Extensions print bracketed full names; that
    /// rendering belongs to a text encoder, not this accessor.
    pub fn text_name(&self) -> &str {
        let inner = self.inner();
        if inner.kind == Kind::Group {
            if let TypeRef::LocalMessage(index) = inner.type_ref {
                return &self.file.inner.messages[index as usize].name;
            }
            if let TypeRef::ForeignMessage(ref file, index) = inner.type_ref {
                return &file.inner.messages[index as usize].name;
            }
        }
        &inner.name
    }

    pub fn number(&self) -> u32 {
        self.inner().number
    }

    pub fn kind(&self) -> Kind {
        self.inner().kind
    }

    pub fn cardinality(&self) -> Cardinality {
        self.inner().cardinality
    }

    pub fn is_extension(&self) -> bool {
        self.inner().is_extension
    }

    pub fn is_required(&self) -> bool {
        self.inner().cardinality == Cardinality::Required
    }

    /// Whether repeated values of this field use the packed encoding.
    pub fn is_packed(&self) -> bool {
        self.inner().packed
    }

    /// A repeated field that is not a map.
    pub fn is_list(&self) -> bool {
        self.inner().cardinality == Cardinality::Repeated && !self.is_map()
    }

    /// A field is a map iff it is repeated and its message type is a map
    /// entry.
    pub fn is_map(&self) -> bool {
        let inner = self.inner();
        inner.cardinality == Cardinality::Repeated
            && inner.kind == Kind::Message
            && self.message_type().map_or(false, |m| m.is_map_entry())
    }

    /// The key field of a map field's entry message.
    pub fn map_key(&self) -> Option<FieldDescriptor> {
        if !self.is_map() {
            return None;
        }
        self.message_type()?.field_by_number(MAP_ENTRY_KEY_NUMBER)
    }

    /// The value field of a map field's entry message.
    pub fn map_value(&self) -> Option<FieldDescriptor> {
        if !self.is_map() {
            return None;
        }
        self.message_type()?.field_by_number(MAP_ENTRY_VALUE_NUMBER)
    }

    /// The oneof this field belongs to, if any.
    pub fn containing_oneof(&self) -> Option<OneofDescriptor> {
        let FieldLoc::Member { message, .. } = self.loc else {
            return None;
        };
        self.inner().oneof.map(|index| OneofDescriptor {
            file: self.file.clone(),
            message,
            index,
        })
    }

    /// The message this field is a member of; for extensions, the extended
    /// message.
    pub fn containing_message(&self) -> Option<MessageDescriptor> {
        match self.loc {
            FieldLoc::Member { message, .. } => {
                Some(MessageDescriptor::real(self.file.clone(), message))
            }
            FieldLoc::Extension(_) => self.resolve_message_ref(&self.inner().extendee),
        }
    }

    /// Whether presence of this field is tracked explicitly rather than
    /// inferred from a non-default value.
    pub fn has_presence(&self) -> bool {
        let inner = self.inner();
        if inner.cardinality == Cardinality::Repeated {
            return false;
        }
        matches!(inner.kind, Kind::Message | Kind::Group)
            || inner.oneof.is_some()
            || inner.is_extension
            || self.file.inner.syntax == Syntax::Proto2
    }

    /// The message type of a message or group field.
    pub fn message_type(&self) -> Option<MessageDescriptor> {
        self.resolve_message_ref(&self.inner().type_ref)
    }

    fn resolve_message_ref(&self, type_ref: &TypeRef) -> Option<MessageDescriptor> {
        match type_ref {
            TypeRef::LocalMessage(index) => {
                Some(MessageDescriptor::real(self.file.clone(), *index))
            }
            TypeRef::ForeignMessage(file, index) => {
                Some(MessageDescriptor::real(file.clone(), *index))
            }
            TypeRef::PlaceholderMessage(name) => {
                Some(MessageDescriptor::placeholder(name.clone()))
            }
            _ => None,
        }
    }

    /// The enum type of an enum field.
    pub fn enum_type(&self) -> Option<EnumDescriptor> {
        match &self.inner().type_ref {
            TypeRef::LocalEnum(index) => Some(EnumDescriptor::real(self.file.clone(), *index)),
            TypeRef::ForeignEnum(file, index) => Some(EnumDescriptor::real(file.clone(), *index)),
            TypeRef::PlaceholderEnum(name) => Some(EnumDescriptor::placeholder(name.clone())),
            _ => None,
        }
    }

    /// The default value for this field when unset: the declared proto2
    /// default if present, the first enum value for enum fields, the kind's
    /// zero value otherwise. Message and group fields have no default.
    pub fn default_value(&self) -> Option<Value> {
        let inner = self.inner();
        if let Some(default) = &inner.default {
            return Some(default.clone());
        }
        if inner.kind == Kind::Enum {
            let number = self
                .enum_type()
                .and_then(|e| e.value(0).map(|v| v.number()))
                .unwrap_or(0);
            return Some(Value::EnumNumber(number));
        }
        Value::default_for(inner.kind)
    }

    /// Declaration index within the containing message; the storage slot of
    /// this field in a dynamic message.
    pub(crate) fn member_index(&self) -> Option<u32> {
        match self.loc {
            FieldLoc::Member { field, .. } => Some(field),
            FieldLoc::Extension(_) => None,
        }
    }

    pub(crate) fn parent_syntax(&self) -> Syntax {
        self.file.inner.syntax
    }
}

impl PartialEq for FieldDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.file.ptr_eq(&other.file) && self.loc == other.loc
    }
}

impl Eq for FieldDescriptor {}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("full_name", &self.full_name())
            .field("number", &self.number())
            .field("kind", &self.kind())
            .finish()
    }
}

// --- OneofDescriptor --------------------------------------------------------

/// A oneof declaration.
#[derive(Clone)]
pub struct OneofDescriptor {
    file: FileDescriptor,
    message: u32,
    index: u32,
}

impl OneofDescriptor {
    fn inner(&self) -> &OneofInner {
        &self.file.inner.messages[self.message as usize].oneofs[self.index as usize]
    }

    pub fn name(&self) -> &str {
        &self.inner().name
    }

    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    pub fn containing_message(&self) -> MessageDescriptor {
        MessageDescriptor::real(self.file.clone(), self.message)
    }

    pub fn fields(&self) -> impl ExactSizeIterator<Item = FieldDescriptor> + '_ {
        let message = self.message;
        self.inner().fields.iter().map(move |&field| FieldDescriptor {
            file: self.file.clone(),
            loc: FieldLoc::Member { message, field },
        })
    }

    /// A synthetic oneof wraps exactly one proto3 optional field and exists
    /// only to model its presence.
    pub fn is_synthetic(&self) -> bool {
        let inner = self.inner();
        inner.fields.len() == 1
            && self.file.inner.messages[self.message as usize].fields
                [inner.fields[0] as usize]
                .proto3_optional
    }
}

impl PartialEq for OneofDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.file.ptr_eq(&other.file) && self.message == other.message && self.index == other.index
    }
}

impl Eq for OneofDescriptor {}

impl fmt::Debug for OneofDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneofDescriptor")
            .field("full_name", &self.full_name())
            .finish()
    }
}

// --- EnumDescriptor ---------------------------------------------------------

#[derive(Clone)]
enum EnumDescriptorInner {
    Real { file: FileDescriptor, index: u32 },
    Placeholder(Arc<str>),
}

/// An enum type.
#[derive(Clone)]
pub struct EnumDescriptor {
    inner: EnumDescriptorInner,
}

impl EnumDescriptor {
    pub(crate) fn real(file: FileDescriptor, index: u32) -> Self {
        EnumDescriptor {
            inner: EnumDescriptorInner::Real { file, index },
        }
    }

    pub(crate) fn placeholder(full_name: Arc<str>) -> Self {
        EnumDescriptor {
            inner: EnumDescriptorInner::Placeholder(full_name),
        }
    }

    fn get(&self) -> Option<(&FileDescriptor, &EnumInner)> {
        match &self.inner {
            EnumDescriptorInner::Real { file, index } => {
                Some((file, &file.inner.enums[*index as usize]))
            }
            EnumDescriptorInner::Placeholder(_) => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.inner, EnumDescriptorInner::Placeholder(_))
    }

    /// The file this enum was declared in, if it is not a placeholder.
    pub fn parent_file(&self) -> Option<&FileDescriptor> {
        self.get().map(|(file, _)| file)
    }

    pub(crate) fn real_parts(&self) -> Option<(FileDescriptor, u32)> {
        match &self.inner {
            EnumDescriptorInner::Real { file, index } => Some((file.clone(), *index)),
            EnumDescriptorInner::Placeholder(_) => None,
        }
    }

    pub fn full_name(&self) -> &str {
        match &self.inner {
            EnumDescriptorInner::Real { file, index } => {
                &file.inner.enums[*index as usize].full_name
            }
            EnumDescriptorInner::Placeholder(name) => name,
        }
    }

    pub fn name(&self) -> &str {
        match &self.inner {
            EnumDescriptorInner::Real { file, index } => &file.inner.enums[*index as usize].name,
            EnumDescriptorInner::Placeholder(name) => {
                name.rsplit('.').next().unwrap_or(name)
            }
        }
    }

    pub fn value_count(&self) -> usize {
        self.get().map_or(0, |(_, inner)| inner.values.len())
    }

    pub fn value(&self, index: usize) -> Option<EnumValueDescriptor> {
        if index >= self.value_count() {
            return None;
        }
        Some(EnumValueDescriptor {
            parent: self.clone(),
            index: index as u32,
        })
    }

    pub fn values(&self) -> impl ExactSizeIterator<Item = EnumValueDescriptor> + '_ {
        (0..self.value_count()).map(move |index| EnumValueDescriptor {
            parent: self.clone(),
            index: index as u32,
        })
    }

    pub fn value_by_number(&self, number: i32) -> Option<EnumValueDescriptor> {
        let (_, inner) = self.get()?;
        let by_number = inner.by_number.get_or_init(|| {
            let mut map = HashMap::with_capacity(inner.values.len());
            for (index, value) in inner.values.iter().enumerate() {
                // First declaration wins for aliased numbers.
                map.entry(value.number).or_insert(index as u32);
            }
            map
        });
        by_number.get(&number).map(|&index| EnumValueDescriptor {
            parent: self.clone(),
            index,
        })
    }

    pub fn reserved_ranges(&self) -> &EnumRanges {
        static EMPTY: OnceCell<EnumRanges> = OnceCell::new();
        self.get().map_or_else(
            || EMPTY.get_or_init(EnumRanges::default),
            |(_, inner)| &inner.reserved_ranges,
        )
    }

    pub fn reserved_names(&self) -> &Names {
        static EMPTY: OnceCell<Names> = OnceCell::new();
        self.get().map_or_else(
            || EMPTY.get_or_init(Names::default),
            |(_, inner)| &inner.reserved_names,
        )
    }
}

impl PartialEq for EnumDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (
                EnumDescriptorInner::Real { file: fa, index: ia },
                EnumDescriptorInner::Real { file: fb, index: ib },
            ) => fa.ptr_eq(fb) && ia == ib,
            (EnumDescriptorInner::Placeholder(a), EnumDescriptorInner::Placeholder(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for EnumDescriptor {}

impl fmt::Debug for EnumDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumDescriptor")
            .field("full_name", &self.full_name())
            .field("is_placeholder", &self.is_placeholder())
            .finish()
    }
}

/// A single enum value.
#[derive(Clone, PartialEq, Eq)]
pub struct EnumValueDescriptor {
    parent: EnumDescriptor,
    index: u32,
}

impl EnumValueDescriptor {
    fn inner(&self) -> &EnumValueInner {
        let (_, parent) = self.parent.get().expect("value handles come from real enums");
        &parent.values[self.index as usize]
    }

    pub fn name(&self) -> &str {
        &self.inner().name
    }

    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    pub fn number(&self) -> i32 {
        self.inner().number
    }

    pub fn containing_enum(&self) -> &EnumDescriptor {
        &self.parent
    }
}

impl fmt::Debug for EnumValueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumValueDescriptor")
            .field("full_name", &self.full_name())
            .field("number", &self.number())
            .finish()
    }
}

// --- ServiceDescriptor ------------------------------------------------------

/// A service declaration.
#[derive(Clone)]
pub struct ServiceDescriptor {
    file: FileDescriptor,
    index: u32,
}

impl ServiceDescriptor {
    fn inner(&self) -> &ServiceInner {
        &self.file.inner.services[self.index as usize]
    }

    pub fn name(&self) -> &str {
        &self.inner().name
    }

    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    pub fn methods(&self) -> impl ExactSizeIterator<Item = MethodDescriptor> + '_ {
        (0..self.inner().methods.len() as u32).map(move |index| MethodDescriptor {
            service: self.clone(),
            index,
        })
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("full_name", &self.full_name())
            .finish()
    }
}

/// A method of a service.
#[derive(Clone)]
pub struct MethodDescriptor {
    service: ServiceDescriptor,
    index: u32,
}

impl MethodDescriptor {
    fn inner(&self) -> &MethodInner {
        &self.service.inner().methods[self.index as usize]
    }

    pub fn name(&self) -> &str {
        &self.inner().name
    }

    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    pub fn input_type(&self) -> Option<MessageDescriptor> {
        resolve_message_type(&self.service.file, &self.inner().input)
    }

    pub fn output_type(&self) -> Option<MessageDescriptor> {
        resolve_message_type(&self.service.file, &self.inner().output)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("full_name", &self.full_name())
            .finish()
    }
}

fn resolve_message_type(file: &FileDescriptor, type_ref: &TypeRef) -> Option<MessageDescriptor> {
    match type_ref {
        TypeRef::LocalMessage(index) => Some(MessageDescriptor::real(file.clone(), *index)),
        TypeRef::ForeignMessage(foreign, index) => {
            Some(MessageDescriptor::real(foreign.clone(), *index))
        }
        TypeRef::PlaceholderMessage(name) => Some(MessageDescriptor::placeholder(name.clone())),
        _ => None,
    }
}
