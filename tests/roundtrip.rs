//! Universal codec properties over a schema exercising every framing:
//! round-trip, size agreement, deterministic idempotence, merge
//! homomorphism, and concatenation semantics.

mod support;

use std::collections::BTreeMap;

use bytes::Bytes;
use proptest::prelude::*;
use protoflect::descriptor::{FileDescriptor, MessageDescriptor};
use protoflect::{DecodeOptions, DynamicMessage, EncodeOptions, MapKey, Str, Value};
use support::*;

/// A message covering varint, zigzag, fixed, length-delimited, packed,
/// nested-message, and map framings.
fn rich_file() -> FileDescriptor {
    let (map_f, entry) = map_field("labels", 10, TYPE_STRING, field("value", 2, TYPE_INT32, LABEL_OPTIONAL));
    let mut rich = message(
        "Rich",
        vec![
            field("id", 1, TYPE_INT32, LABEL_OPTIONAL),
            field("name", 2, TYPE_STRING, LABEL_OPTIONAL),
            field("flag", 3, TYPE_BOOL, LABEL_OPTIONAL),
            field("counts", 4, TYPE_UINT32, LABEL_REPEATED),
            field("payload", 5, TYPE_BYTES, LABEL_OPTIONAL),
            field("ratio", 6, TYPE_DOUBLE, LABEL_OPTIONAL),
            field("delta", 7, TYPE_SINT64, LABEL_OPTIONAL),
            field("token", 8, TYPE_FIXED32, LABEL_OPTIONAL),
            message_field("child", 9, LABEL_OPTIONAL, ".test.Child"),
            map_f,
            field("names", 11, TYPE_STRING, LABEL_REPEATED),
        ],
    );
    rich.nested_type.push(entry);
    resolve(&file_proto(
        "rich.proto",
        "test",
        "proto3",
        vec![
            rich,
            message("Child", vec![field("x", 1, TYPE_INT64, LABEL_OPTIONAL)]),
        ],
    ))
}

#[derive(Debug, Clone)]
struct RichData {
    id: i32,
    name: String,
    flag: bool,
    counts: Vec<u32>,
    payload: Vec<u8>,
    ratio: f64,
    delta: i64,
    token: u32,
    child_x: Option<i64>,
    labels: Vec<(String, i32)>,
    names: Vec<String>,
}

fn arb_rich() -> impl Strategy<Value = RichData> {
    (
        (
            any::<i32>(),
            ".{0,12}",
            any::<bool>(),
            proptest::collection::vec(any::<u32>(), 0..6),
            proptest::collection::vec(any::<u8>(), 0..16),
            any::<f64>(),
        ),
        (
            any::<i64>(),
            any::<u32>(),
            proptest::option::of(any::<i64>()),
            proptest::collection::vec(("[a-z]{0,6}", any::<i32>()), 0..4),
            proptest::collection::vec(".{0,8}", 0..4),
        ),
    )
        .prop_map(
            |((id, name, flag, counts, payload, ratio), (delta, token, child_x, labels, names))| {
                RichData {
                    id,
                    name,
                    flag,
                    counts,
                    payload,
                    ratio,
                    delta,
                    token,
                    child_x,
                    labels,
                    names,
                }
            },
        )
}

fn build_rich(file: &FileDescriptor, data: &RichData) -> DynamicMessage {
    let desc = message_desc(file, "test.Rich");
    let child_desc = message_desc(file, "test.Child");
    let mut m = DynamicMessage::new(desc.clone());
    let set = |m: &mut DynamicMessage, number: u32, value: Value| {
        m.set(&desc.field_by_number(number).unwrap(), value).unwrap();
    };
    set(&mut m, 1, Value::I32(data.id));
    set(&mut m, 2, Value::String(Str::from(data.name.as_str())));
    set(&mut m, 3, Value::Bool(data.flag));
    set(
        &mut m,
        4,
        Value::List(data.counts.iter().map(|&v| Value::U32(v)).collect()),
    );
    set(&mut m, 5, Value::Bytes(Bytes::from(data.payload.clone())));
    set(&mut m, 6, Value::F64(data.ratio));
    set(&mut m, 7, Value::I64(data.delta));
    set(&mut m, 8, Value::U32(data.token));
    if let Some(x) = data.child_x {
        let mut child = DynamicMessage::new(child_desc.clone());
        child
            .set(&child_desc.field_by_number(1).unwrap(), Value::I64(x))
            .unwrap();
        set(&mut m, 9, Value::Message(Box::new(child)));
    }
    let labels: BTreeMap<MapKey, Value> = data
        .labels
        .iter()
        .map(|(k, v)| (MapKey::String(Str::from(k.as_str())), Value::I32(*v)))
        .collect();
    set(&mut m, 10, Value::Map(labels));
    set(
        &mut m,
        11,
        Value::List(
            data.names
                .iter()
                .map(|n| Value::String(Str::from(n.as_str())))
                .collect(),
        ),
    );
    m
}

fn empty_of(desc: &MessageDescriptor) -> DynamicMessage {
    DynamicMessage::new(desc.clone())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn proptest_roundtrip(data in arb_rich()) {
        let file = rich_file();
        let m = build_rich(&file, &data);

        let encoded = m.encode_to_vec().unwrap();
        let decoded = DynamicMessage::decode(m.descriptor().clone(), &encoded).unwrap();
        prop_assert!(protoflect::equal(&m, &decoded));
    }

    #[test]
    fn proptest_size_agreement(data in arb_rich()) {
        let file = rich_file();
        let m = build_rich(&file, &data);

        for deterministic in [false, true] {
            let opts = EncodeOptions { deterministic, ..Default::default() };
            let encoded = opts.encode(&m).unwrap();
            prop_assert_eq!(encoded.len(), opts.encoded_len(&m));
        }
    }

    #[test]
    fn proptest_deterministic_idempotent(data in arb_rich()) {
        let file = rich_file();
        let m = build_rich(&file, &data);

        let opts = EncodeOptions { deterministic: true, ..Default::default() };
        prop_assert_eq!(opts.encode(&m).unwrap(), opts.encode(&m).unwrap());
    }

    #[test]
    fn proptest_merge_homomorphism(data in arb_rich()) {
        let file = rich_file();
        let m = build_rich(&file, &data);

        let mut target = empty_of(m.descriptor());
        protoflect::merge(&mut target, &m);
        prop_assert_eq!(
            target.encode_to_vec().unwrap(),
            m.encode_to_vec().unwrap()
        );
    }

    #[test]
    fn proptest_concatenation_is_merge(a in arb_rich(), b in arb_rich()) {
        let file = rich_file();
        let ma = build_rich(&file, &a);
        let mb = build_rich(&file, &b);

        let mut concat = ma.encode_to_vec().unwrap();
        concat.extend(mb.encode_to_vec().unwrap());
        let decoded = DynamicMessage::decode(ma.descriptor().clone(), &concat).unwrap();

        let mut merged = DynamicMessage::decode(ma.descriptor().clone(), &ma.encode_to_vec().unwrap()).unwrap();
        let decoded_b = DynamicMessage::decode(ma.descriptor().clone(), &mb.encode_to_vec().unwrap()).unwrap();
        protoflect::merge(&mut merged, &decoded_b);

        prop_assert!(protoflect::equal(&decoded, &merged));
    }

    #[test]
    fn proptest_clone_equals(data in arb_rich()) {
        let file = rich_file();
        let m = build_rich(&file, &data);
        let copy = protoflect::clone_message(&m);
        prop_assert!(protoflect::equal(&m, &copy));
    }
}

#[test]
fn test_nan_equals_itself_after_roundtrip() {
    let file = rich_file();
    let desc = message_desc(&file, "test.Rich");
    let mut m = DynamicMessage::new(desc.clone());
    m.set(&desc.field_by_number(6).unwrap(), Value::F64(f64::NAN))
        .unwrap();

    assert!(protoflect::equal(&m, &m));
    let decoded = DynamicMessage::decode(desc, &m.encode_to_vec().unwrap()).unwrap();
    assert!(protoflect::equal(&m, &decoded));
}

#[test]
fn test_merge_appends_repeated() {
    // merge {a:[1,2]} into {a:[3]} yields {a:[3,1,2]}.
    let file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto3",
        vec![message("M", vec![field("a", 1, TYPE_INT32, LABEL_REPEATED)])],
    ));
    let desc = message_desc(&file, "test.M");
    let a = desc.field_by_number(1).unwrap();

    let mut dst = DynamicMessage::new(desc.clone());
    dst.set(&a, Value::List(vec![Value::I32(3)])).unwrap();
    let mut src = DynamicMessage::new(desc.clone());
    src.set(&a, Value::List(vec![Value::I32(1), Value::I32(2)]))
        .unwrap();

    protoflect::merge(&mut dst, &src);
    let list = dst.get(&a).unwrap().as_list().unwrap();
    let values: Vec<i64> = list.iter().map(|v| v.as_int().unwrap()).collect();
    assert_eq!(values, [3, 1, 2]);
}

#[test]
fn test_merge_map_replaces_entries() {
    let (map_f, entry) = map_field("m", 1, TYPE_INT32, field("value", 2, TYPE_STRING, LABEL_OPTIONAL));
    let mut msg = message("M", vec![map_f]);
    msg.nested_type.push(entry);
    let file = resolve(&file_proto("m.proto", "test", "proto3", vec![msg]));
    let desc = message_desc(&file, "test.M");
    let f = desc.field_by_number(1).unwrap();

    let mut dst = DynamicMessage::new(desc.clone());
    let mut dst_map = BTreeMap::new();
    dst_map.insert(MapKey::I32(1), Value::String(Str::from("old")));
    dst_map.insert(MapKey::I32(2), Value::String(Str::from("keep")));
    dst.set(&f, Value::Map(dst_map)).unwrap();

    let mut src = DynamicMessage::new(desc.clone());
    let mut src_map = BTreeMap::new();
    src_map.insert(MapKey::I32(1), Value::String(Str::from("new")));
    src.set(&f, Value::Map(src_map)).unwrap();

    protoflect::merge(&mut dst, &src);
    let map = dst.get(&f).unwrap().as_map().unwrap();
    assert_eq!(map[&MapKey::I32(1)].as_str().unwrap().as_str(), "new");
    assert_eq!(map[&MapKey::I32(2)].as_str().unwrap().as_str(), "keep");
}

#[test]
fn test_merge_recurses_into_singular_message() {
    let file = rich_file();
    let desc = message_desc(&file, "test.Rich");
    let child_desc = message_desc(&file, "test.Child");
    let child_field = desc.field_by_number(9).unwrap();

    // dst.child = {}, src.child = {x: 7}: merge fills x without replacing.
    let mut dst = DynamicMessage::new(desc.clone());
    dst.set(
        &child_field,
        Value::Message(Box::new(DynamicMessage::new(child_desc.clone()))),
    )
    .unwrap();

    let mut src_child = DynamicMessage::new(child_desc.clone());
    src_child
        .set(&child_desc.field_by_number(1).unwrap(), Value::I64(7))
        .unwrap();
    let mut src = DynamicMessage::new(desc.clone());
    src.set(&child_field, Value::Message(Box::new(src_child)))
        .unwrap();

    protoflect::merge(&mut dst, &src);
    let merged_child = dst.get(&child_field).unwrap().as_message().unwrap();
    assert_eq!(
        merged_child
            .get(&child_desc.field_by_number(1).unwrap())
            .unwrap()
            .as_int()
            .unwrap(),
        7
    );
}

#[test]
fn test_required_field_enforcement() {
    let file = resolve(&file_proto(
        "m.proto",
        "test",
        "proto2",
        vec![message("M", vec![field("req", 1, TYPE_INT32, LABEL_REQUIRED)])],
    ));
    let desc = message_desc(&file, "test.M");

    let m = DynamicMessage::new(desc.clone());
    let err = m.encode_to_vec().unwrap_err();
    assert!(err.to_string().contains("test.M.req"), "unexpected error: {err}");

    // AllowPartial suppresses the failure.
    let opts = EncodeOptions {
        allow_partial: true,
        ..Default::default()
    };
    assert_eq!(opts.encode(&m).unwrap(), Vec::<u8>::new());

    // Decode enforces it too.
    let err = DynamicMessage::decode(desc.clone(), &[]).unwrap_err();
    assert!(err.to_string().contains("required"), "unexpected error: {err}");
    let opts = DecodeOptions {
        allow_partial: true,
        ..Default::default()
    };
    assert!(opts.decode(desc, &[]).is_ok());
}

#[test]
fn test_cached_size_reuse() {
    let file = rich_file();
    let desc = message_desc(&file, "test.Rich");
    let mut m = DynamicMessage::new(desc.clone());
    m.set(&desc.field_by_number(1).unwrap(), Value::I32(150)).unwrap();

    let opts = EncodeOptions::default();
    let size = opts.encoded_len(&m);
    let cached = EncodeOptions {
        use_cached_size: true,
        ..Default::default()
    };
    let encoded = cached.encode(&m).unwrap();
    assert_eq!(encoded.len(), size);
}

#[test]
fn test_encode_append_extends_buffer() {
    let file = rich_file();
    let desc = message_desc(&file, "test.Rich");
    let mut m = DynamicMessage::new(desc.clone());
    m.set(&desc.field_by_number(1).unwrap(), Value::I32(150)).unwrap();

    let prefix = vec![0xDE, 0xAD];
    let buf = EncodeOptions::default().encode_append(prefix, &m).unwrap();
    assert_eq!(&buf[..2], &[0xDE, 0xAD]);
    assert_eq!(&buf[2..], &[0x08, 0x96, 0x01]);
}
