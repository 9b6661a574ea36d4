//! Extension decoding through a resolver, and the legacy message-set
//! framing.

mod support;

use protoflect::descriptor::proto::{
    DescriptorProto, ExtensionRangeProto, FieldDescriptorProto, FileDescriptorSetProto,
    MessageOptionsProto,
};
use protoflect::descriptor::{FileOptions, FileRegistry};
use protoflect::{DecodeOptions, DynamicMessage, Str, Value};
use support::*;

/// proto2 file with an extendable host message and two extensions.
fn extension_registry() -> FileRegistry {
    let mut host = message("Host", vec![field("base", 1, TYPE_INT32, LABEL_OPTIONAL)]);
    host.extension_range.push(ExtensionRangeProto {
        start: Some(100),
        end: Some(200),
        ..Default::default()
    });

    let mut ext_int = field("ext_int", 100, TYPE_INT32, LABEL_OPTIONAL);
    ext_int.extendee = Some(".test.Host".to_owned());
    let mut ext_msg = message_field("ext_child", 101, LABEL_OPTIONAL, ".test.Child");
    ext_msg.extendee = Some(".test.Host".to_owned());

    let mut fd = file_proto(
        "ext.proto",
        "test",
        "proto2",
        vec![
            host,
            message("Child", vec![field("x", 1, TYPE_INT32, LABEL_OPTIONAL)]),
        ],
    );
    fd.extension.push(ext_int);
    fd.extension.push(ext_msg);

    FileOptions::default()
        .new_files(&FileDescriptorSetProto {
            file: vec![fd],
            unknown: Vec::new(),
        })
        .unwrap()
}

#[test]
fn test_extension_roundtrip_through_resolver() {
    let registry = extension_registry();
    let desc = registry.find_message_by_name("test.Host").unwrap();
    let ext = match registry.find_descriptor_by_name("test.ext_int") {
        Some(protoflect::descriptor::AnyDescriptor::Extension(f)) => f,
        other => panic!("expected extension, found {other:?}"),
    };
    assert!(ext.is_extension());

    let mut m = DynamicMessage::new(desc.clone());
    m.set(&desc.field_by_number(1).unwrap(), Value::I32(1)).unwrap();
    m.set(&ext, Value::I32(77)).unwrap();
    assert!(m.has(&ext));

    let encoded = m.encode_to_vec().unwrap();

    // With the resolver, the extension decodes as a typed field.
    let mut decoded = DynamicMessage::new(desc.clone());
    DecodeOptions::default()
        .decode_into_with(&mut decoded, &encoded, &registry)
        .unwrap();
    assert_eq!(decoded.get(&ext).unwrap().as_int().unwrap(), 77);
    assert!(protoflect::equal(&m, &decoded));

    // Without it, the bytes survive as unknown fields and re-encode
    // identically.
    let blind = DynamicMessage::decode(desc, &encoded).unwrap();
    assert!(!blind.unknown_fields().is_empty());
    assert_eq!(blind.encode_to_vec().unwrap(), encoded);
}

#[test]
fn test_number_outside_extension_ranges_is_unknown() {
    let registry = extension_registry();
    let desc = registry.find_message_by_name("test.Host").unwrap();

    // Field 300 is outside [100, 200): never routed to the resolver.
    let bytes = [0xE0, 0x12, 0x07]; // key (300 << 3) | varint, value 7
    let mut decoded = DynamicMessage::new(desc);
    DecodeOptions::default()
        .decode_into_with(&mut decoded, &bytes, &registry)
        .unwrap();
    assert_eq!(decoded.unknown_fields(), &bytes);
}

/// proto2 file with a message-set container and a message extension.
fn message_set_registry() -> FileRegistry {
    let mut the_set = DescriptorProto {
        name: Some("TheSet".to_owned()),
        options: Some(MessageOptionsProto {
            message_set_wire_format: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    the_set.extension_range.push(ExtensionRangeProto {
        start: Some(4),
        end: Some(2147483647),
        ..Default::default()
    });

    let item = message("Item", vec![field("s", 1, TYPE_STRING, LABEL_OPTIONAL)]);

    let mut ext: FieldDescriptorProto = message_field("item_ext", 4, LABEL_OPTIONAL, ".test.Item");
    ext.extendee = Some(".test.TheSet".to_owned());

    let mut fd = file_proto("mset.proto", "test", "proto2", vec![the_set, item]);
    fd.extension.push(ext);

    FileOptions::default()
        .new_files(&FileDescriptorSetProto {
            file: vec![fd],
            unknown: Vec::new(),
        })
        .unwrap()
}

#[test]
fn test_message_set_roundtrip() {
    let registry = message_set_registry();
    let set_desc = registry.find_message_by_name("test.TheSet").unwrap();
    let item_desc = registry.find_message_by_name("test.Item").unwrap();
    let ext = match registry.find_descriptor_by_name("test.item_ext") {
        Some(protoflect::descriptor::AnyDescriptor::Extension(f)) => f,
        other => panic!("expected extension, found {other:?}"),
    };

    let mut item = DynamicMessage::new(item_desc.clone());
    item.set(
        &item_desc.field_by_number(1).unwrap(),
        Value::String(Str::from("hello")),
    )
    .unwrap();

    let mut m = DynamicMessage::new(set_desc.clone());
    m.set(&ext, Value::Message(Box::new(item))).unwrap();

    let encoded = m.encode_to_vec().unwrap();
    // Item framing: group start (field 1), type id (field 2), payload
    // (field 3), group end.
    assert_eq!(encoded[0], 0x0B);
    assert_eq!(encoded[1], 0x10); // type_id key
    assert_eq!(encoded[2], 0x04); // type_id value
    assert_eq!(encoded[3], 0x1A); // message key
    assert_eq!(*encoded.last().unwrap(), 0x0C);
    assert_eq!(encoded.len(), m.encoded_len());

    let mut decoded = DynamicMessage::new(set_desc.clone());
    DecodeOptions::default()
        .decode_into_with(&mut decoded, &encoded, &registry)
        .unwrap();
    assert!(protoflect::equal(&m, &decoded));

    let child = decoded.get(&ext).unwrap().as_message().unwrap();
    assert_eq!(
        child
            .get(&item_desc.field_by_number(1).unwrap())
            .unwrap()
            .as_str()
            .unwrap()
            .as_str(),
        "hello"
    );
}

#[test]
fn test_message_set_unknown_item_preserved() {
    let registry = message_set_registry();
    let set_desc = registry.find_message_by_name("test.TheSet").unwrap();

    // An item with type id 99, which no resolver knows.
    let mut bytes = Vec::new();
    bytes.push(0x0B); // item start
    bytes.push(0x10); // type_id key
    bytes.push(99);
    bytes.extend_from_slice(&[0x1A, 0x02, 0x08, 0x01]); // message payload
    bytes.push(0x0C); // item end

    let mut decoded = DynamicMessage::new(set_desc);
    DecodeOptions::default()
        .decode_into_with(&mut decoded, &bytes, &registry)
        .unwrap();
    assert_eq!(decoded.unknown_fields(), &bytes);
    assert_eq!(decoded.encode_to_vec().unwrap(), bytes);
}
