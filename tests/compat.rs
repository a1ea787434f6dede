//! Wire-compatibility tests: forward compatibility with unknown fields,
//! schema-wins type matching, skip correctness over nested payloads, both
//! map termination forms, and malformed-input rejection.

use std::collections::BTreeMap;
use std::sync::Arc;
use wirestruct::{
    BinaryProtocol, CodecConfig, CodecError, CompactProtocol, FieldDef, MapKey, MemTransport,
    Protocol, SchemaBuilder, SchemaSet, StructValue, TypeExpr, Value, WireType,
};

fn pair_schema() -> Arc<SchemaSet> {
    SchemaBuilder::new()
        .define(
            "KeyPair",
            vec![
                FieldDef::optional(1, "private_key", TypeExpr::Bytes),
                FieldDef::optional(2, "public_key", TypeExpr::Bytes),
            ],
        )
        .link()
        .expect("link")
}

fn map_schema() -> Arc<SchemaSet> {
    SchemaBuilder::new()
        .define(
            "KeyMap",
            vec![FieldDef::required(
                1,
                "keys",
                TypeExpr::Map(Box::new(TypeExpr::Text), Box::new(TypeExpr::Bytes)),
            )],
        )
        .link()
        .expect("link")
}

fn decode_pair(bytes: Vec<u8>, cfg: &CodecConfig) -> Result<StructValue, CodecError> {
    let set = pair_schema();
    let h = set.lookup("KeyPair").unwrap();
    let mut prot = BinaryProtocol::new(MemTransport::with_bytes(bytes));
    let mut msg = StructValue::new(&set, h);
    msg.read(&mut prot, cfg)?;
    Ok(msg)
}

#[test]
fn test_unknown_field_is_invisible_binary() {
    let cfg = CodecConfig::new();

    // Stream A: private_key plus an unknown i32 field 99.
    let mut prot = BinaryProtocol::new(MemTransport::new());
    prot.write_field_begin(WireType::String, 1).unwrap();
    prot.write_bytes(b"secret").unwrap();
    prot.write_field_end().unwrap();
    prot.write_field_begin(WireType::I32, 99).unwrap();
    prot.write_i32(7).unwrap();
    prot.write_field_end().unwrap();
    prot.write_field_stop().unwrap();
    let with_unknown = prot.into_transport().into_bytes();

    // Stream B: the same without the unknown field.
    let mut prot = BinaryProtocol::new(MemTransport::new());
    prot.write_field_begin(WireType::String, 1).unwrap();
    prot.write_bytes(b"secret").unwrap();
    prot.write_field_end().unwrap();
    prot.write_field_stop().unwrap();
    let without_unknown = prot.into_transport().into_bytes();

    let a = decode_pair(with_unknown, &cfg).expect("decode A");
    let b = decode_pair(without_unknown, &cfg).expect("decode B");
    assert_eq!(a, b);
    assert_eq!(a.get("private_key").and_then(Value::as_bytes), Some(&b"secret"[..]));
}

#[test]
fn test_unknown_field_is_invisible_compact() {
    let set = pair_schema();
    let cfg = CodecConfig::new();
    let h = set.lookup("KeyPair").unwrap();

    let mut w = CompactProtocol::new(MemTransport::new());
    w.write_struct_begin("KeyPair").unwrap();
    w.write_field_begin(WireType::String, 1).unwrap();
    w.write_bytes(b"secret").unwrap();
    w.write_field_end().unwrap();
    w.write_field_begin(WireType::Bool, 77).unwrap();
    w.write_bool(true).unwrap();
    w.write_field_end().unwrap();
    w.write_field_begin(WireType::I64, 78).unwrap();
    w.write_i64(-5).unwrap();
    w.write_field_end().unwrap();
    w.write_field_stop().unwrap();
    w.write_struct_end().unwrap();
    let bytes = w.into_transport().into_bytes();

    let mut msg = StructValue::new(&set, h);
    let mut prot = CompactProtocol::new(MemTransport::with_bytes(bytes));
    msg.read(&mut prot, &cfg).expect("read");
    assert_eq!(msg.get("private_key").and_then(Value::as_bytes), Some(&b"secret"[..]));
    assert!(!msg.is_set("public_key"));
}

#[test]
fn test_schema_type_wins_over_stream_type() {
    let cfg = CodecConfig::new();

    // Field id 2 is declared STRING; the stream carries it as I64. The
    // mismatched field is skipped, not decoded and not an error.
    let mut prot = BinaryProtocol::new(MemTransport::new());
    prot.write_field_begin(WireType::String, 1).unwrap();
    prot.write_bytes(b"k").unwrap();
    prot.write_field_end().unwrap();
    prot.write_field_begin(WireType::I64, 2).unwrap();
    prot.write_i64(0x1234_5678).unwrap();
    prot.write_field_end().unwrap();
    prot.write_field_stop().unwrap();
    let bytes = prot.into_transport().into_bytes();

    let msg = decode_pair(bytes, &cfg).expect("decode");
    assert_eq!(msg.get("private_key").and_then(Value::as_bytes), Some(&b"k"[..]));
    assert!(!msg.is_set("public_key"));
}

#[test]
fn test_skip_deeply_nested_unknown_payload() {
    let cfg = CodecConfig::new();

    // Unknown field 50 carries struct { map<i32, list<struct{}>> } and the
    // known field follows it; the skip must consume exactly the payload.
    let mut prot = BinaryProtocol::new(MemTransport::new());
    prot.write_field_begin(WireType::Struct, 50).unwrap();
    {
        prot.write_field_begin(WireType::Map, 1).unwrap();
        prot.write_map_begin(WireType::I32, WireType::List, 2).unwrap();
        for k in [10, 20] {
            prot.write_i32(k).unwrap();
            prot.write_list_begin(WireType::Struct, 2).unwrap();
            prot.write_field_stop().unwrap(); // empty struct
            prot.write_field_stop().unwrap(); // empty struct
            prot.write_list_end().unwrap();
        }
        prot.write_map_end().unwrap();
        prot.write_field_end().unwrap();
        prot.write_field_stop().unwrap();
    }
    prot.write_field_end().unwrap();
    prot.write_field_begin(WireType::String, 1).unwrap();
    prot.write_bytes(b"after").unwrap();
    prot.write_field_end().unwrap();
    prot.write_field_stop().unwrap();
    let bytes = prot.into_transport().into_bytes();
    let total = bytes.len();

    let set = pair_schema();
    let h = set.lookup("KeyPair").unwrap();
    let mut prot = BinaryProtocol::new(MemTransport::with_bytes(bytes));
    let mut msg = StructValue::new(&set, h);
    msg.read(&mut prot, &cfg).expect("read");
    assert_eq!(msg.get("private_key").and_then(Value::as_bytes), Some(&b"after"[..]));
    assert_eq!(prot.transport().position(), total);
}

#[test]
fn test_map_termination_forms_decode_equal() {
    let set = map_schema();
    let cfg = CodecConfig::new();
    let h = set.lookup("KeyMap").unwrap();

    let mut expected = StructValue::new(&set, h);
    let mut m = BTreeMap::new();
    m.insert(MapKey::Text("nodeA".into()), Value::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF]));
    m.insert(MapKey::Text("nodeB".into()), Value::Bytes(vec![0x01]));
    expected.set("keys", Value::Map(m)).unwrap();

    // Counted form straight from the writer.
    let mut prot = BinaryProtocol::new(MemTransport::new());
    expected.write(&mut prot, &cfg).expect("write");
    let mut counted = StructValue::new(&set, h);
    counted.read(&mut prot, &cfg).expect("read counted");

    // Streaming form, hand-assembled: declared size -1, every entry preceded
    // by a continuation marker, zero marker terminates.
    let mut bytes = vec![WireType::Map.tag(), 0, 1];
    bytes.extend([WireType::String.tag(), WireType::String.tag()]);
    bytes.extend((-1i32).to_be_bytes());
    for (key, val) in [(&b"nodeA"[..], &[0xDE, 0xAD, 0xBE, 0xEF][..]), (&b"nodeB"[..], &[0x01][..])] {
        bytes.push(1);
        bytes.extend((key.len() as i32).to_be_bytes());
        bytes.extend(key);
        bytes.extend((val.len() as i32).to_be_bytes());
        bytes.extend(val);
    }
    bytes.push(0); // no more entries
    bytes.push(0); // STOP
    let mut prot = BinaryProtocol::new(MemTransport::with_bytes(bytes));
    let mut streamed = StructValue::new(&set, h);
    streamed.read(&mut prot, &cfg).expect("read streamed");

    assert_eq!(counted, expected);
    assert_eq!(streamed, expected);
    assert_eq!(streamed, counted);
}

#[test]
fn test_streaming_map_skipped_in_unknown_field() {
    let cfg = CodecConfig::new();

    // Unknown field 9 carries a streaming map; the known field follows.
    let mut bytes = vec![WireType::Map.tag(), 0, 9];
    bytes.extend([WireType::I32.tag(), WireType::I32.tag()]);
    bytes.extend((-1i32).to_be_bytes());
    for k in [1i32, 2, 3] {
        bytes.push(1);
        bytes.extend(k.to_be_bytes());
        bytes.extend((k * 10).to_be_bytes());
    }
    bytes.push(0);
    bytes.extend([WireType::String.tag(), 0, 1]);
    bytes.extend((2i32).to_be_bytes());
    bytes.extend(b"ok");
    bytes.push(0);

    let msg = decode_pair(bytes, &cfg).expect("decode");
    assert_eq!(msg.get("private_key").and_then(Value::as_bytes), Some(&b"ok"[..]));
}

#[test]
fn test_duplicate_map_keys_last_write_wins() {
    let set = map_schema();
    let cfg = CodecConfig::new();
    let h = set.lookup("KeyMap").unwrap();

    let mut bytes = vec![WireType::Map.tag(), 0, 1];
    bytes.extend([WireType::String.tag(), WireType::String.tag()]);
    bytes.extend(2i32.to_be_bytes());
    for val in [&[0x01][..], &[0x02][..]] {
        bytes.extend(1i32.to_be_bytes());
        bytes.extend(b"k");
        bytes.extend((val.len() as i32).to_be_bytes());
        bytes.extend(val);
    }
    bytes.push(0);

    let mut prot = BinaryProtocol::new(MemTransport::with_bytes(bytes));
    let mut msg = StructValue::new(&set, h);
    msg.read(&mut prot, &cfg).expect("read");
    let keys = msg.get("keys").and_then(Value::as_map).unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(
        keys.get(&MapKey::Text("k".into())).and_then(Value::as_bytes),
        Some(&[0x02][..])
    );
}

#[test]
fn test_length_prefix_overrun_is_malformed() {
    let cfg = CodecConfig::new();
    let mut bytes = vec![WireType::String.tag(), 0, 1];
    bytes.extend(100i32.to_be_bytes());
    bytes.extend([1, 2, 3]);
    let err = decode_pair(bytes, &cfg).unwrap_err();
    match err {
        CodecError::Malformed(m) => assert!(m.contains("length prefix"), "{}", m),
        other => panic!("expected Malformed, got {:?}", other),
    }
}

#[test]
fn test_invalid_type_tag_is_malformed() {
    let cfg = CodecConfig::new();
    // 0x07 is not an assigned tag.
    let bytes = vec![0x07, 0, 1, 0];
    let err = decode_pair(bytes, &cfg).unwrap_err();
    assert!(matches!(err, CodecError::Malformed(_)));
}

#[test]
fn test_negative_list_size_is_malformed() {
    let cfg = CodecConfig::new();
    let mut bytes = vec![WireType::List.tag(), 0, 40, WireType::I32.tag()];
    bytes.extend((-5i32).to_be_bytes());
    bytes.push(0);
    let err = decode_pair(bytes, &cfg).unwrap_err();
    assert!(matches!(err, CodecError::Malformed(_)));
}

#[test]
fn test_invalid_utf8_only_rejected_in_text_mode() {
    let set = SchemaBuilder::new()
        .define("Named", vec![FieldDef::optional(1, "name", TypeExpr::Text)])
        .link()
        .expect("link");
    let h = set.lookup("Named").unwrap();

    let mut bytes = vec![WireType::String.tag(), 0, 1];
    bytes.extend(2i32.to_be_bytes());
    bytes.extend([0xFF, 0xFE]);
    bytes.push(0);

    let cfg = CodecConfig::new();
    let mut prot = BinaryProtocol::new(MemTransport::with_bytes(bytes.clone()));
    let mut msg = StructValue::new(&set, h);
    let err = msg.read(&mut prot, &cfg).unwrap_err();
    match err {
        CodecError::Malformed(m) => assert!(m.contains("UTF-8"), "{}", m),
        other => panic!("expected Malformed, got {:?}", other),
    }

    let mut cfg = CodecConfig::new();
    cfg.text_mode = false;
    let mut prot = BinaryProtocol::new(MemTransport::with_bytes(bytes));
    let mut msg = StructValue::new(&set, h);
    msg.read(&mut prot, &cfg).expect("read raw");
    assert_eq!(msg.get("name").and_then(Value::as_bytes), Some(&[0xFF, 0xFE][..]));
}

#[test]
fn test_runaway_nesting_is_malformed_not_a_crash() {
    let cfg = CodecConfig::new();
    // 70 levels of unknown nested structs, deeper than the codec allows.
    let mut bytes = Vec::new();
    for _ in 0..70 {
        bytes.extend([WireType::Struct.tag(), 0, 99]);
    }
    bytes.extend(std::iter::repeat(0u8).take(71));
    let err = decode_pair(bytes, &cfg).unwrap_err();
    match err {
        CodecError::Malformed(m) => assert!(m.contains("nesting"), "{}", m),
        other => panic!("expected Malformed, got {:?}", other),
    }
}

#[test]
fn test_truncated_input_is_an_error() {
    let cfg = CodecConfig::new();
    // Field header announcing an i64 with only two payload bytes behind it.
    let mut bytes = vec![WireType::I64.tag(), 0, 1];
    bytes.extend([0x01, 0x02]);
    let err = decode_pair(bytes, &cfg).unwrap_err();
    assert!(matches!(err, CodecError::UnexpectedEof));
}

#[test]
fn test_accelerated_path_skips_and_validates_identically() {
    // The same unknown-field stream decoded via the specialized slice codec.
    let set = pair_schema();
    let accel_cfg = CodecConfig::accelerated(&set);
    let h = set.lookup("KeyPair").unwrap();

    let mut prot = BinaryProtocol::new(MemTransport::new());
    prot.write_field_begin(WireType::Struct, 50).unwrap();
    prot.write_field_begin(WireType::I32, 1).unwrap();
    prot.write_i32(5).unwrap();
    prot.write_field_end().unwrap();
    prot.write_field_stop().unwrap();
    prot.write_field_end().unwrap();
    prot.write_field_begin(WireType::String, 2).unwrap();
    prot.write_bytes(b"pub").unwrap();
    prot.write_field_end().unwrap();
    prot.write_field_stop().unwrap();
    let bytes = prot.into_transport().into_bytes();

    let mut prot = BinaryProtocol::accelerated(MemTransport::with_bytes(bytes));
    let mut msg = StructValue::new(&set, h);
    msg.read(&mut prot, &accel_cfg).expect("read");
    assert!(!msg.is_set("private_key"));
    assert_eq!(msg.get("public_key").and_then(Value::as_bytes), Some(&b"pub"[..]));

    // Required enforcement on the accelerated path.
    let map_set = map_schema();
    let map_cfg = CodecConfig::accelerated(&map_set);
    let mh = map_set.lookup("KeyMap").unwrap();
    let mut prot = BinaryProtocol::accelerated(MemTransport::with_bytes(vec![0x00]));
    let mut msg = StructValue::new(&map_set, mh);
    let err = msg.read(&mut prot, &map_cfg).unwrap_err();
    assert!(matches!(err, CodecError::MissingRequiredField { .. }));
}
