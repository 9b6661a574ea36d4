//! Wire-format conformance: literal byte expectations from the protobuf
//! encoding guide, wire-type compatibility, groups, unknown fields, and
//! the recursion guard.

mod support;

use protoflect::error::DecodeErrorKind;
use protoflect::{DecodeOptions, DynamicMessage, EncodeOptions, MapKey, Str, Value};
use support::*;

#[test]
fn test_varint_field_150() {
    // message M { optional int32 a = 1; } with a = 150.
    let file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto3",
        vec![message("M", vec![field("a", 1, TYPE_INT32, LABEL_OPTIONAL)])],
    ));
    let desc = message_desc(&file, "test.M");

    let mut m = DynamicMessage::new(desc.clone());
    let a = desc.field_by_number(1).unwrap();
    m.set(&a, Value::I32(150)).unwrap();

    let bytes = m.encode_to_vec().unwrap();
    assert_eq!(bytes, [0x08, 0x96, 0x01]);
    assert_eq!(m.encoded_len(), 3);
}

#[test]
fn test_packed_repeated_int32() {
    // message M { repeated int32 a = 4 [packed=true]; } with a = [1, 2, 150].
    let file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto2",
        vec![message(
            "M",
            vec![packed(field("a", 4, TYPE_INT32, LABEL_REPEATED), true)],
        )],
    ));
    let desc = message_desc(&file, "test.M");

    let mut m = DynamicMessage::new(desc.clone());
    let a = desc.field_by_number(4).unwrap();
    m.set(
        &a,
        Value::List(vec![Value::I32(1), Value::I32(2), Value::I32(150)]),
    )
    .unwrap();

    let bytes = m.encode_to_vec().unwrap();
    assert_eq!(bytes, [0x22, 0x04, 0x01, 0x02, 0x96, 0x01]);
}

#[test]
fn test_string_field() {
    // message M { optional string s = 2; } with s = "test".
    let file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto3",
        vec![message("M", vec![field("s", 2, TYPE_STRING, LABEL_OPTIONAL)])],
    ));
    let desc = message_desc(&file, "test.M");

    let mut m = DynamicMessage::new(desc.clone());
    let s = desc.field_by_number(2).unwrap();
    m.set(&s, Value::String(Str::from("test"))).unwrap();

    let bytes = m.encode_to_vec().unwrap();
    assert_eq!(bytes, [0x12, 0x04, 0x74, 0x65, 0x73, 0x74]);
}

#[test]
fn test_scalar_last_one_wins() {
    // Decode `08 96 01 08 2A`: the second occurrence overwrites.
    let file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto3",
        vec![message("M", vec![field("a", 1, TYPE_INT32, LABEL_OPTIONAL)])],
    ));
    let desc = message_desc(&file, "test.M");

    let m = DynamicMessage::decode(desc.clone(), &[0x08, 0x96, 0x01, 0x08, 0x2A]).unwrap();
    let a = desc.field_by_number(1).unwrap();
    assert_eq!(m.get(&a).unwrap().as_int().unwrap(), 42);
}

fn recursive_message_file() -> protoflect::descriptor::FileDescriptor {
    resolve(&file_proto(
        "m.proto",
        "test",
        "proto2",
        vec![message(
            "M",
            vec![message_field("child", 1, LABEL_OPTIONAL, ".test.M")],
        )],
    ))
}

#[test]
fn test_empty_nested_message_is_present() {
    // Decode `0A 00`: child present, empty.
    let file = recursive_message_file();
    let desc = message_desc(&file, "test.M");

    let m = DynamicMessage::decode(desc.clone(), &[0x0A, 0x00]).unwrap();
    let child_field = desc.field_by_number(1).unwrap();
    assert!(m.has(&child_field));
    let child = m.get(&child_field).unwrap().as_message().unwrap();
    assert_eq!(child.encoded_len(), 0);
}

#[test]
fn test_recursion_depth_guard() {
    let file = recursive_message_file();
    let desc = message_desc(&file, "test.M");

    // `child` nested to the given total depth.
    fn nested(levels: usize) -> Vec<u8> {
        let mut body: Vec<u8> = Vec::new();
        for _ in 1..levels {
            let mut outer = vec![0x0A];
            protoflect::varint::encode_varint(body.len() as u64, &mut outer);
            outer.extend_from_slice(&body);
            body = outer;
        }
        body
    }

    assert!(DynamicMessage::decode(desc.clone(), &nested(100)).is_ok());
    let err = DynamicMessage::decode(desc.clone(), &nested(101)).unwrap_err();
    assert_eq!(*err.kind(), DecodeErrorKind::RecursionDepthExceeded);
}

#[test]
fn test_packed_unpacked_interop() {
    // A declared-packed field accepts per-element records and vice versa.
    let packed_file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto2",
        vec![message(
            "M",
            vec![packed(field("a", 1, TYPE_INT32, LABEL_REPEATED), true)],
        )],
    ));
    let desc = message_desc(&packed_file, "test.M");
    let a = desc.field_by_number(1).unwrap();

    // Unpacked encoding of [1, 150]: `08 01 08 96 01`.
    let m = DynamicMessage::decode(desc.clone(), &[0x08, 0x01, 0x08, 0x96, 0x01]).unwrap();
    let list = m.get(&a).unwrap().as_list().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[1].as_int().unwrap(), 150);

    let unpacked_file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto2",
        vec![message(
            "M",
            vec![packed(field("a", 1, TYPE_INT32, LABEL_REPEATED), false)],
        )],
    ));
    let desc = message_desc(&unpacked_file, "test.M");
    let a = desc.field_by_number(1).unwrap();

    // Packed encoding of [1, 150]: `0A 03 01 96 01`.
    let m = DynamicMessage::decode(desc.clone(), &[0x0A, 0x03, 0x01, 0x96, 0x01]).unwrap();
    let list = m.get(&a).unwrap().as_list().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].as_int().unwrap(), 1);
}

#[test]
fn test_unknown_fields_roundtrip() {
    // Encode with a wide schema, decode with a narrow one, re-encode:
    // the unseen fields must reproduce byte-exactly.
    let wide = resolve(&file_proto(
        "wide.proto",
        "test",
        "proto3",
        vec![message(
            "M",
            vec![
                field("a", 1, TYPE_INT32, LABEL_OPTIONAL),
                field("extra_str", 2, TYPE_STRING, LABEL_OPTIONAL),
                field("extra_num", 3, TYPE_INT64, LABEL_OPTIONAL),
            ],
        )],
    ));
    let wide_desc = message_desc(&wide, "test.M");

    let mut m = DynamicMessage::new(wide_desc.clone());
    m.set(&wide_desc.field_by_number(1).unwrap(), Value::I32(7)).unwrap();
    m.set(
        &wide_desc.field_by_number(2).unwrap(),
        Value::String(Str::from("keep me")),
    )
    .unwrap();
    m.set(&wide_desc.field_by_number(3).unwrap(), Value::I64(-1)).unwrap();
    let encoded = m.encode_to_vec().unwrap();

    let narrow = resolve(&file_proto(
        "narrow.proto",
        "test",
        "proto3",
        vec![message("M", vec![field("a", 1, TYPE_INT32, LABEL_OPTIONAL)])],
    ));
    let narrow_desc = message_desc(&narrow, "test.M");

    let decoded = DynamicMessage::decode(narrow_desc.clone(), &encoded).unwrap();
    assert!(!decoded.unknown_fields().is_empty());
    assert_eq!(decoded.encode_to_vec().unwrap(), encoded);

    // DiscardUnknown drops them instead.
    let discarding = DecodeOptions {
        discard_unknown: true,
        ..Default::default()
    };
    let decoded = discarding.decode(narrow_desc, &encoded).unwrap();
    assert!(decoded.unknown_fields().is_empty());
    assert!(decoded.encode_to_vec().unwrap().len() < encoded.len());
}

#[test]
fn test_group_roundtrip() {
    // proto2 group fields: start/end framing with nested payload.
    let mut group_field = field("grp", 1, TYPE_GROUP, LABEL_OPTIONAL);
    group_field.type_name = Some(".test.Grp".to_owned());
    let file = resolve(&file_proto(
        "g.proto",
        "test",
        "proto2",
        vec![
            message("M", vec![group_field]),
            message("Grp", vec![field("x", 2, TYPE_INT32, LABEL_OPTIONAL)]),
        ],
    ));
    let desc = message_desc(&file, "test.M");
    let grp_desc = message_desc(&file, "test.Grp");

    let mut inner = DynamicMessage::new(grp_desc.clone());
    inner
        .set(&grp_desc.field_by_number(2).unwrap(), Value::I32(5))
        .unwrap();
    let mut m = DynamicMessage::new(desc.clone());
    m.set(
        &desc.field_by_number(1).unwrap(),
        Value::Message(Box::new(inner)),
    )
    .unwrap();

    let bytes = m.encode_to_vec().unwrap();
    // `0B` start-group 1, `10 05` x=5, `0C` end-group 1.
    assert_eq!(bytes, [0x0B, 0x10, 0x05, 0x0C]);
    assert_eq!(m.encoded_len(), bytes.len());

    let decoded = DynamicMessage::decode(desc, &bytes).unwrap();
    assert!(protoflect::equal(&decoded, &m));
}

#[test]
fn test_group_in_unknown_fields() {
    // A group for an unknown number is preserved whole.
    let file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto2",
        vec![message("M", vec![field("a", 1, TYPE_INT32, LABEL_OPTIONAL)])],
    ));
    let desc = message_desc(&file, "test.M");

    // group 2 { varint 1 = 9 } then a = 3.
    let bytes = [0x13, 0x08, 0x09, 0x14, 0x08, 0x03];
    let decoded = DynamicMessage::decode(desc, &bytes).unwrap();
    assert_eq!(
        decoded
            .get(&decoded.descriptor().field_by_number(1).unwrap())
            .unwrap()
            .as_int()
            .unwrap(),
        3
    );
    assert_eq!(decoded.unknown_fields(), &bytes[..4]);
}

#[test]
fn test_truncated_input() {
    let file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto3",
        vec![message("M", vec![field("s", 2, TYPE_STRING, LABEL_OPTIONAL)])],
    ));
    let desc = message_desc(&file, "test.M");

    // Length prefix promises 10 bytes, only 2 follow.
    let err = DynamicMessage::decode(desc.clone(), &[0x12, 0x0A, 0x61, 0x62]).unwrap_err();
    assert_eq!(*err.kind(), DecodeErrorKind::Truncated);

    // Tag zero is invalid.
    let err = DynamicMessage::decode(desc, &[0x00]).unwrap_err();
    assert!(matches!(err.kind(), DecodeErrorKind::InvalidTag { .. }));
}

#[test]
fn test_invalid_utf8_policy() {
    let file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto3",
        vec![message("M", vec![field("s", 2, TYPE_STRING, LABEL_OPTIONAL)])],
    ));
    let desc = message_desc(&file, "test.M");

    let bytes = [0x12, 0x02, 0xFF, 0xFE];
    let err = DynamicMessage::decode(desc.clone(), &bytes).unwrap_err();
    assert!(matches!(err.kind(), DecodeErrorKind::InvalidUtf8 { .. }));

    let lenient = DecodeOptions {
        allow_invalid_utf8: true,
        ..Default::default()
    };
    let decoded = lenient.decode(desc, &bytes).unwrap();
    assert_eq!(decoded.encode_to_vec().unwrap(), bytes);
}

#[test]
fn test_map_deterministic_order() {
    let (map_f, entry) = map_field("tags", 1, TYPE_STRING, field("value", 2, TYPE_INT32, LABEL_OPTIONAL));
    let mut msg = message("M", vec![map_f]);
    msg.nested_type.push(entry);
    let file = resolve(&file_proto("m.proto", "test", "proto3", vec![msg]));
    let desc = message_desc(&file, "test.M");

    let mut m = DynamicMessage::new(desc.clone());
    let tags = desc.field_by_number(1).unwrap();
    let mut map = std::collections::BTreeMap::new();
    map.insert(MapKey::String(Str::from("zebra")), Value::I32(1));
    map.insert(MapKey::String(Str::from("alpha")), Value::I32(2));
    m.set(&tags, Value::Map(map)).unwrap();

    let opts = EncodeOptions {
        deterministic: true,
        ..Default::default()
    };
    let first = opts.encode(&m).unwrap();
    let second = opts.encode(&m).unwrap();
    assert_eq!(first, second);

    // Entries appear sorted by key: "alpha" before "zebra".
    let alpha = first.windows(5).position(|w| w == b"alpha");
    let zebra = first.windows(5).position(|w| w == b"zebra");
    assert!(alpha.unwrap() < zebra.unwrap());

    let decoded = DynamicMessage::decode(desc, &first).unwrap();
    assert!(protoflect::equal(&decoded, &m));
}

#[test]
fn test_oneof_last_one_wins() {
    use protoflect::descriptor::proto::OneofDescriptorProto;

    let mut a = field("a", 1, TYPE_INT32, LABEL_OPTIONAL);
    a.oneof_index = Some(0);
    let mut b = field("b", 2, TYPE_STRING, LABEL_OPTIONAL);
    b.oneof_index = Some(0);
    let mut msg = message("M", vec![a, b]);
    msg.oneof_decl.push(OneofDescriptorProto {
        name: Some("choice".to_owned()),
        ..Default::default()
    });
    let file = resolve(&file_proto("m.proto", "test", "proto3", vec![msg]));
    let desc = message_desc(&file, "test.M");

    // a=1 then b="x": b wins, a cleared.
    let m = DynamicMessage::decode(desc.clone(), &[0x08, 0x01, 0x12, 0x01, 0x78]).unwrap();
    let field_a = desc.field_by_number(1).unwrap();
    let field_b = desc.field_by_number(2).unwrap();
    assert!(!m.has(&field_a));
    assert_eq!(m.get(&field_b).unwrap().as_str().unwrap().as_str(), "x");

    // Reverse arrival order: a wins.
    let m = DynamicMessage::decode(desc.clone(), &[0x12, 0x01, 0x78, 0x08, 0x01]).unwrap();
    assert!(m.has(&field_a));
    assert!(!m.has(&field_b));

    let oneof = desc.oneof(0);
    assert_eq!(m.which_oneof(&oneof).unwrap().number(), 1);
}
