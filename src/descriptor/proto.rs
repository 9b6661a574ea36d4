//! The raw, self-describing descriptor model.
//!
//! These types mirror `google/protobuf/descriptor.proto` and carry their own
//! binary codec so a `FileDescriptorSet` produced by `protoc` can be read
//! without any other machinery, and re-encoded byte-identically. Unknown
//! fields are preserved per message and appended verbatim on encode.

use bytes::Buf;

use crate::error::DecodeError;
use crate::varint::{decode_varint, encode_varint};
use crate::wire::{self, FieldKey, WireType};

/// A collection of file descriptors, `google.protobuf.FileDescriptorSet`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDescriptorSetProto {
    pub file: Vec<FileDescriptorProto>, // field 1
    pub unknown: Vec<u8>,
}

/// Describes a complete `.proto` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDescriptorProto {
    pub name: Option<String>,               // field 1
    pub package: Option<String>,            // field 2
    pub dependency: Vec<String>,            // field 3
    pub public_dependency: Vec<i32>,        // field 10
    pub weak_dependency: Vec<i32>,          // field 11
    pub message_type: Vec<DescriptorProto>, // field 4
    pub enum_type: Vec<EnumDescriptorProto>, // field 5
    pub service: Vec<ServiceDescriptorProto>, // field 6
    pub extension: Vec<FieldDescriptorProto>, // field 7
    pub source_code_info: Option<SourceCodeInfoProto>, // field 9
    pub syntax: Option<String>,             // field 12
    pub unknown: Vec<u8>,
}

/// Source position metadata for declarations in a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceCodeInfoProto {
    pub location: Vec<LocationProto>, // field 1
    pub unknown: Vec<u8>,
}

/// One source location record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationProto {
    pub path: Vec<i32>,                         // field 1, packed
    pub span: Vec<i32>,                         // field 2, packed
    pub leading_comments: Option<String>,       // field 3
    pub trailing_comments: Option<String>,      // field 4
    pub leading_detached_comments: Vec<String>, // field 6
    pub unknown: Vec<u8>,
}

/// Describes a message type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorProto {
    pub name: Option<String>,                     // field 1
    pub field: Vec<FieldDescriptorProto>,         // field 2
    pub nested_type: Vec<DescriptorProto>,        // field 3
    pub enum_type: Vec<EnumDescriptorProto>,      // field 4
    pub extension_range: Vec<ExtensionRangeProto>, // field 5
    pub extension: Vec<FieldDescriptorProto>,     // field 6
    pub options: Option<MessageOptionsProto>,     // field 7
    pub oneof_decl: Vec<OneofDescriptorProto>,    // field 8
    pub reserved_range: Vec<ReservedRangeProto>,  // field 9
    pub reserved_name: Vec<String>,               // field 10
    pub unknown: Vec<u8>,
}

/// An extension number range, start inclusive and end exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionRangeProto {
    pub start: Option<i32>, // field 1
    pub end: Option<i32>,   // field 2
    pub unknown: Vec<u8>,
}

/// A reserved number range, start inclusive and end exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservedRangeProto {
    pub start: Option<i32>, // field 1
    pub end: Option<i32>,   // field 2
    pub unknown: Vec<u8>,
}

/// Describes a field within a message, or an extension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDescriptorProto {
    pub name: Option<String>,          // field 1
    pub extendee: Option<String>,      // field 2
    pub number: Option<i32>,           // field 3
    pub label: Option<i32>,            // field 4
    pub r#type: Option<i32>,           // field 5
    pub type_name: Option<String>,     // field 6
    pub default_value: Option<String>, // field 7
    pub options: Option<FieldOptionsProto>, // field 8
    pub oneof_index: Option<i32>,      // field 9
    pub json_name: Option<String>,     // field 10
    pub proto3_optional: Option<bool>, // field 17
    pub unknown: Vec<u8>,
}

/// Describes an enum type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumDescriptorProto {
    pub name: Option<String>,                    // field 1
    pub value: Vec<EnumValueDescriptorProto>,    // field 2
    pub reserved_range: Vec<EnumReservedRangeProto>, // field 4
    pub reserved_name: Vec<String>,              // field 5
    pub unknown: Vec<u8>,
}

/// An enum reserved range, inclusive on both sides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumReservedRangeProto {
    pub start: Option<i32>, // field 1
    pub end: Option<i32>,   // field 2
    pub unknown: Vec<u8>,
}

/// Describes an enum value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumValueDescriptorProto {
    pub name: Option<String>, // field 1
    pub number: Option<i32>,  // field 2
    pub unknown: Vec<u8>,
}

/// Describes a oneof declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OneofDescriptorProto {
    pub name: Option<String>, // field 1
    pub unknown: Vec<u8>,
}

/// Describes a service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceDescriptorProto {
    pub name: Option<String>,               // field 1
    pub method: Vec<MethodDescriptorProto>, // field 2
    pub unknown: Vec<u8>,
}

/// Describes a service method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodDescriptorProto {
    pub name: Option<String>,        // field 1
    pub input_type: Option<String>,  // field 2
    pub output_type: Option<String>, // field 3
    pub unknown: Vec<u8>,
}

/// Options for a message type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageOptionsProto {
    pub message_set_wire_format: Option<bool>, // field 1
    pub map_entry: Option<bool>,               // field 7
    pub unknown: Vec<u8>,
}

/// Options for a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOptionsProto {
    pub packed: Option<bool>, // field 2
    pub unknown: Vec<u8>,
}

// Decode helpers. Every descriptor message follows the same shape: loop
// over keys, match on the field number, skip-and-preserve everything else.

fn decode_string(buf: &mut &[u8], what: &'static str) -> Result<String, DecodeError> {
    let bytes = wire::split_len_delimited(buf)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::invalid_utf8(what))
}

fn decode_int32(buf: &mut &[u8]) -> Result<i32, DecodeError> {
    Ok(decode_varint(buf)? as i32)
}

fn decode_bool(buf: &mut &[u8]) -> Result<bool, DecodeError> {
    Ok(decode_varint(buf)? != 0)
}

fn preserve_unknown(
    unknown: &mut Vec<u8>,
    key: FieldKey,
    buf: &mut &[u8],
) -> Result<(), DecodeError> {
    wire::encode_key(key.number(), key.wire_type(), unknown);
    let before = *buf;
    wire::skip_value(key, buf, crate::codec::RECURSION_LIMIT)?;
    let consumed = before.len() - buf.len();
    unknown.extend_from_slice(&before[..consumed]);
    Ok(())
}

// Encode helpers. Nested messages are encoded to a scratch vector first;
// descriptor payloads are small and cold, so the simple two-pass shape wins
// over speculative lengths here.

fn put_string(number: u32, value: &str, buf: &mut Vec<u8>) {
    wire::encode_key(number, WireType::Len, buf);
    encode_varint(value.len() as u64, buf);
    buf.extend_from_slice(value.as_bytes());
}

fn put_int32(number: u32, value: i32, buf: &mut Vec<u8>) {
    wire::encode_key(number, WireType::Varint, buf);
    encode_varint(value as i64 as u64, buf);
}

fn put_bool(number: u32, value: bool, buf: &mut Vec<u8>) {
    wire::encode_key(number, WireType::Varint, buf);
    buf.push(u8::from(value));
}

fn put_message(number: u32, body: &[u8], buf: &mut Vec<u8>) {
    wire::encode_key(number, WireType::Len, buf);
    encode_varint(body.len() as u64, buf);
    buf.extend_from_slice(body);
}

macro_rules! decode_loop {
    ($data:expr, $out:ident, $buf:ident, $key:ident, { $($pat:pat => $arm:expr),+ $(,)? }) => {{
        let mut $buf: &[u8] = $data;
        while $buf.has_remaining() {
            let $key = wire::decode_key(&mut $buf)?;
            match $key.number() {
                $($pat => $arm,)+
                _ => preserve_unknown(&mut $out.unknown, $key, &mut $buf)?,
            }
        }
    }};
}

impl FileDescriptorSetProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = FileDescriptorSetProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out
                .file
                .push(FileDescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        for file in &self.file {
            let mut body = Vec::new();
            file.encode(&mut body);
            put_message(1, &body, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

impl FileDescriptorProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = FileDescriptorProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out.name = Some(decode_string(&mut buf, "file name")?),
            2 => out.package = Some(decode_string(&mut buf, "file package")?),
            3 => out.dependency.push(decode_string(&mut buf, "file dependency")?),
            4 => out
                .message_type
                .push(DescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
            5 => out
                .enum_type
                .push(EnumDescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
            6 => out
                .service
                .push(ServiceDescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
            7 => out
                .extension
                .push(FieldDescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
            9 => out.source_code_info =
                Some(SourceCodeInfoProto::decode(wire::split_len_delimited(&mut buf)?)?),
            10 => out.public_dependency.push(decode_int32(&mut buf)?),
            11 => out.weak_dependency.push(decode_int32(&mut buf)?),
            12 => out.syntax = Some(decode_string(&mut buf, "file syntax")?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(name) = &self.name {
            put_string(1, name, buf);
        }
        if let Some(package) = &self.package {
            put_string(2, package, buf);
        }
        for dep in &self.dependency {
            put_string(3, dep, buf);
        }
        for msg in &self.message_type {
            let mut body = Vec::new();
            msg.encode(&mut body);
            put_message(4, &body, buf);
        }
        for en in &self.enum_type {
            let mut body = Vec::new();
            en.encode(&mut body);
            put_message(5, &body, buf);
        }
        for service in &self.service {
            let mut body = Vec::new();
            service.encode(&mut body);
            put_message(6, &body, buf);
        }
        for ext in &self.extension {
            let mut body = Vec::new();
            ext.encode(&mut body);
            put_message(7, &body, buf);
        }
        if let Some(info) = &self.source_code_info {
            let mut body = Vec::new();
            info.encode(&mut body);
            put_message(9, &body, buf);
        }
        for &idx in &self.public_dependency {
            put_int32(10, idx, buf);
        }
        for &idx in &self.weak_dependency {
            put_int32(11, idx, buf);
        }
        if let Some(syntax) = &self.syntax {
            put_string(12, syntax, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

impl DescriptorProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = DescriptorProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out.name = Some(decode_string(&mut buf, "message name")?),
            2 => out
                .field
                .push(FieldDescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
            3 => out
                .nested_type
                .push(DescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
            4 => out
                .enum_type
                .push(EnumDescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
            5 => out
                .extension_range
                .push(ExtensionRangeProto::decode(wire::split_len_delimited(&mut buf)?)?),
            6 => out
                .extension
                .push(FieldDescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
            7 => out.options =
                Some(MessageOptionsProto::decode(wire::split_len_delimited(&mut buf)?)?),
            8 => out
                .oneof_decl
                .push(OneofDescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
            9 => out
                .reserved_range
                .push(ReservedRangeProto::decode(wire::split_len_delimited(&mut buf)?)?),
            10 => out.reserved_name.push(decode_string(&mut buf, "reserved name")?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(name) = &self.name {
            put_string(1, name, buf);
        }
        for field in &self.field {
            let mut body = Vec::new();
            field.encode(&mut body);
            put_message(2, &body, buf);
        }
        for nested in &self.nested_type {
            let mut body = Vec::new();
            nested.encode(&mut body);
            put_message(3, &body, buf);
        }
        for en in &self.enum_type {
            let mut body = Vec::new();
            en.encode(&mut body);
            put_message(4, &body, buf);
        }
        for range in &self.extension_range {
            let mut body = Vec::new();
            range.encode(&mut body);
            put_message(5, &body, buf);
        }
        for ext in &self.extension {
            let mut body = Vec::new();
            ext.encode(&mut body);
            put_message(6, &body, buf);
        }
        if let Some(options) = &self.options {
            let mut body = Vec::new();
            options.encode(&mut body);
            put_message(7, &body, buf);
        }
        for oneof in &self.oneof_decl {
            let mut body = Vec::new();
            oneof.encode(&mut body);
            put_message(8, &body, buf);
        }
        for range in &self.reserved_range {
            let mut body = Vec::new();
            range.encode(&mut body);
            put_message(9, &body, buf);
        }
        for name in &self.reserved_name {
            put_string(10, name, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

macro_rules! range_proto_impl {
    ($ty:ident) => {
        impl $ty {
            pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
                let mut out = $ty::default();
                decode_loop!(data, out, buf, key, {
                    1 => out.start = Some(decode_int32(&mut buf)?),
                    2 => out.end = Some(decode_int32(&mut buf)?),
                });
                Ok(out)
            }

            pub fn encode(&self, buf: &mut Vec<u8>) {
                if let Some(start) = self.start {
                    put_int32(1, start, buf);
                }
                if let Some(end) = self.end {
                    put_int32(2, end, buf);
                }
                buf.extend_from_slice(&self.unknown);
            }
        }
    };
}

range_proto_impl!(ExtensionRangeProto);
range_proto_impl!(ReservedRangeProto);
range_proto_impl!(EnumReservedRangeProto);

impl FieldDescriptorProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = FieldDescriptorProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out.name = Some(decode_string(&mut buf, "field name")?),
            2 => out.extendee = Some(decode_string(&mut buf, "field extendee")?),
            3 => out.number = Some(decode_int32(&mut buf)?),
            4 => out.label = Some(decode_int32(&mut buf)?),
            5 => out.r#type = Some(decode_int32(&mut buf)?),
            6 => out.type_name = Some(decode_string(&mut buf, "field type name")?),
            7 => out.default_value = Some(decode_string(&mut buf, "field default")?),
            8 => out.options =
                Some(FieldOptionsProto::decode(wire::split_len_delimited(&mut buf)?)?),
            9 => out.oneof_index = Some(decode_int32(&mut buf)?),
            10 => out.json_name = Some(decode_string(&mut buf, "field json name")?),
            17 => out.proto3_optional = Some(decode_bool(&mut buf)?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(name) = &self.name {
            put_string(1, name, buf);
        }
        if let Some(extendee) = &self.extendee {
            put_string(2, extendee, buf);
        }
        if let Some(number) = self.number {
            put_int32(3, number, buf);
        }
        if let Some(label) = self.label {
            put_int32(4, label, buf);
        }
        if let Some(ty) = self.r#type {
            put_int32(5, ty, buf);
        }
        if let Some(type_name) = &self.type_name {
            put_string(6, type_name, buf);
        }
        if let Some(default) = &self.default_value {
            put_string(7, default, buf);
        }
        if let Some(options) = &self.options {
            let mut body = Vec::new();
            options.encode(&mut body);
            put_message(8, &body, buf);
        }
        if let Some(idx) = self.oneof_index {
            put_int32(9, idx, buf);
        }
        if let Some(json_name) = &self.json_name {
            put_string(10, json_name, buf);
        }
        if let Some(p3o) = self.proto3_optional {
            put_bool(17, p3o, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

impl EnumDescriptorProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = EnumDescriptorProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out.name = Some(decode_string(&mut buf, "enum name")?),
            2 => out
                .value
                .push(EnumValueDescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
            4 => out
                .reserved_range
                .push(EnumReservedRangeProto::decode(wire::split_len_delimited(&mut buf)?)?),
            5 => out.reserved_name.push(decode_string(&mut buf, "reserved name")?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(name) = &self.name {
            put_string(1, name, buf);
        }
        for value in &self.value {
            let mut body = Vec::new();
            value.encode(&mut body);
            put_message(2, &body, buf);
        }
        for range in &self.reserved_range {
            let mut body = Vec::new();
            range.encode(&mut body);
            put_message(4, &body, buf);
        }
        for name in &self.reserved_name {
            put_string(5, name, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

impl EnumValueDescriptorProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = EnumValueDescriptorProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out.name = Some(decode_string(&mut buf, "enum value name")?),
            2 => out.number = Some(decode_int32(&mut buf)?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(name) = &self.name {
            put_string(1, name, buf);
        }
        if let Some(number) = self.number {
            put_int32(2, number, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

impl OneofDescriptorProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = OneofDescriptorProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out.name = Some(decode_string(&mut buf, "oneof name")?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(name) = &self.name {
            put_string(1, name, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

impl ServiceDescriptorProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = ServiceDescriptorProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out.name = Some(decode_string(&mut buf, "service name")?),
            2 => out
                .method
                .push(MethodDescriptorProto::decode(wire::split_len_delimited(&mut buf)?)?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(name) = &self.name {
            put_string(1, name, buf);
        }
        for method in &self.method {
            let mut body = Vec::new();
            method.encode(&mut body);
            put_message(2, &body, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

impl MethodDescriptorProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = MethodDescriptorProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out.name = Some(decode_string(&mut buf, "method name")?),
            2 => out.input_type = Some(decode_string(&mut buf, "method input")?),
            3 => out.output_type = Some(decode_string(&mut buf, "method output")?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(name) = &self.name {
            put_string(1, name, buf);
        }
        if let Some(input) = &self.input_type {
            put_string(2, input, buf);
        }
        if let Some(output) = &self.output_type {
            put_string(3, output, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

impl SourceCodeInfoProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = SourceCodeInfoProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out
                .location
                .push(LocationProto::decode(wire::split_len_delimited(&mut buf)?)?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        for location in &self.location {
            let mut body = Vec::new();
            location.encode(&mut body);
            put_message(1, &body, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

/// Packed repeated int32. The unpacked encoding is accepted too, per the
/// wire compatibility rules.
fn decode_packed_int32(
    out: &mut Vec<i32>,
    key: FieldKey,
    buf: &mut &[u8],
) -> Result<(), DecodeError> {
    if key.wire_type() == WireType::Len {
        let mut body = wire::split_len_delimited(buf)?;
        while body.has_remaining() {
            out.push(decode_int32(&mut body)?);
        }
    } else {
        out.push(decode_int32(buf)?);
    }
    Ok(())
}

fn put_packed_int32(number: u32, values: &[i32], buf: &mut Vec<u8>) {
    if values.is_empty() {
        return;
    }
    let body_len: usize = values
        .iter()
        .map(|&v| crate::varint::varint_len(v as i64 as u64))
        .sum();
    wire::encode_key(number, WireType::Len, buf);
    encode_varint(body_len as u64, buf);
    for &v in values {
        encode_varint(v as i64 as u64, buf);
    }
}

impl LocationProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = LocationProto::default();
        decode_loop!(data, out, buf, key, {
            1 => decode_packed_int32(&mut out.path, key, &mut buf)?,
            2 => decode_packed_int32(&mut out.span, key, &mut buf)?,
            3 => out.leading_comments = Some(decode_string(&mut buf, "leading comments")?),
            4 => out.trailing_comments = Some(decode_string(&mut buf, "trailing comments")?),
            6 => out
                .leading_detached_comments
                .push(decode_string(&mut buf, "detached comments")?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        put_packed_int32(1, &self.path, buf);
        put_packed_int32(2, &self.span, buf);
        if let Some(comments) = &self.leading_comments {
            put_string(3, comments, buf);
        }
        if let Some(comments) = &self.trailing_comments {
            put_string(4, comments, buf);
        }
        for comments in &self.leading_detached_comments {
            put_string(6, comments, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

impl MessageOptionsProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = MessageOptionsProto::default();
        decode_loop!(data, out, buf, key, {
            1 => out.message_set_wire_format = Some(decode_bool(&mut buf)?),
            7 => out.map_entry = Some(decode_bool(&mut buf)?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(msw) = self.message_set_wire_format {
            put_bool(1, msw, buf);
        }
        if let Some(map_entry) = self.map_entry {
            put_bool(7, map_entry, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

impl FieldOptionsProto {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut out = FieldOptionsProto::default();
        decode_loop!(data, out, buf, key, {
            2 => out.packed = Some(decode_bool(&mut buf)?),
        });
        Ok(out)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(packed) = self.packed {
            put_bool(2, packed, buf);
        }
        buf.extend_from_slice(&self.unknown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("test/sample.proto".into()),
            package: Some("test".into()),
            syntax: Some("proto3".into()),
            message_type: vec![DescriptorProto {
                name: Some("Sample".into()),
                field: vec![FieldDescriptorProto {
                    name: Some("id".into()),
                    number: Some(1),
                    label: Some(1),
                    r#type: Some(5), // int32
                    json_name: Some("id".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_file_descriptor_roundtrip() {
        let file = sample_file();
        let bytes = file.encode_to_vec();
        let decoded = FileDescriptorProto::decode(&bytes).unwrap();
        assert_eq!(decoded, file);

        // Byte-identical re-encode.
        assert_eq!(decoded.encode_to_vec(), bytes);
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let mut bytes = sample_file().encode_to_vec();
        // Append a field this model does not know: number 999, varint 7.
        wire::encode_key(999, WireType::Varint, &mut bytes);
        bytes.push(7);

        let decoded = FileDescriptorProto::decode(&bytes).unwrap();
        assert!(!decoded.unknown.is_empty());
        assert_eq!(decoded.encode_to_vec(), bytes);
    }

    #[test]
    fn test_set_roundtrip() {
        let set = FileDescriptorSetProto {
            file: vec![sample_file()],
            unknown: Vec::new(),
        };
        let bytes = set.encode_to_vec();
        let decoded = FileDescriptorSetProto::decode(&bytes).unwrap();
        assert_eq!(decoded, set);
        assert_eq!(decoded.encode_to_vec(), bytes);
    }

    #[test]
    fn test_truncated_descriptor() {
        let bytes = sample_file().encode_to_vec();
        assert!(FileDescriptorProto::decode(&bytes[..bytes.len() - 1]).is_err());
    }
}
