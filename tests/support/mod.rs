//! Shared helpers for building descriptors in tests without protoc.

#![allow(dead_code)]

use protoflect::descriptor::proto::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FieldOptionsProto, FileDescriptorProto, MessageOptionsProto,
};
use protoflect::descriptor::{FileDescriptor, FileOptions, MessageDescriptor};

pub const TYPE_DOUBLE: i32 = 1;
pub const TYPE_FLOAT: i32 = 2;
pub const TYPE_INT64: i32 = 3;
pub const TYPE_UINT64: i32 = 4;
pub const TYPE_INT32: i32 = 5;
pub const TYPE_FIXED64: i32 = 6;
pub const TYPE_FIXED32: i32 = 7;
pub const TYPE_BOOL: i32 = 8;
pub const TYPE_STRING: i32 = 9;
pub const TYPE_GROUP: i32 = 10;
pub const TYPE_MESSAGE: i32 = 11;
pub const TYPE_BYTES: i32 = 12;
pub const TYPE_UINT32: i32 = 13;
pub const TYPE_ENUM: i32 = 14;
pub const TYPE_SFIXED32: i32 = 15;
pub const TYPE_SFIXED64: i32 = 16;
pub const TYPE_SINT32: i32 = 17;
pub const TYPE_SINT64: i32 = 18;

pub const LABEL_OPTIONAL: i32 = 1;
pub const LABEL_REQUIRED: i32 = 2;
pub const LABEL_REPEATED: i32 = 3;

pub fn field(name: &str, number: i32, ty: i32, label: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_owned()),
        number: Some(number),
        label: Some(label),
        r#type: Some(ty),
        ..Default::default()
    }
}

pub fn message_field(name: &str, number: i32, label: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_owned()),
        ..field(name, number, TYPE_MESSAGE, label)
    }
}

pub fn packed(mut f: FieldDescriptorProto, packed: bool) -> FieldDescriptorProto {
    f.options = Some(FieldOptionsProto {
        packed: Some(packed),
        ..Default::default()
    });
    f
}

pub fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_owned()),
        field: fields,
        ..Default::default()
    }
}

/// A map field plus the synthetic entry message it references.
pub fn map_field(
    name: &str,
    number: i32,
    key_ty: i32,
    value_field: FieldDescriptorProto,
) -> (FieldDescriptorProto, DescriptorProto) {
    let entry_name = map_entry_name(name);
    let entry = DescriptorProto {
        name: Some(entry_name.clone()),
        field: vec![
            field("key", 1, key_ty, LABEL_OPTIONAL),
            value_field,
        ],
        options: Some(MessageOptionsProto {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    let f = FieldDescriptorProto {
        type_name: Some(entry_name),
        ..field(name, number, TYPE_MESSAGE, LABEL_REPEATED)
    };
    (f, entry)
}

fn map_entry_name(field_name: &str) -> String {
    let mut out = String::new();
    let mut upper_next = true;
    for c in field_name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out + "Entry"
}

pub fn enumeration(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(name.to_owned()),
        value: values
            .iter()
            .map(|&(value_name, number)| EnumValueDescriptorProto {
                name: Some(value_name.to_owned()),
                number: Some(number),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

pub fn file_proto(
    path: &str,
    package: &str,
    syntax: &str,
    messages: Vec<DescriptorProto>,
) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(path.to_owned()),
        package: Some(package.to_owned()),
        syntax: Some(syntax.to_owned()),
        message_type: messages,
        ..Default::default()
    }
}

/// Resolve a single standalone file.
pub fn resolve(fd: &FileDescriptorProto) -> FileDescriptor {
    FileOptions::default()
        .new_file(fd, &())
        .expect("test file resolves")
}

pub fn message_desc(file: &FileDescriptor, full_name: &str) -> MessageDescriptor {
    match file.descriptor_by_name(full_name) {
        Some(protoflect::descriptor::AnyDescriptor::Message(m)) => m,
        other => panic!("expected message {full_name}, found {other:?}"),
    }
}
