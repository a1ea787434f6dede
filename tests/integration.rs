//! Integration tests: schema building and linking, the concrete KeyMap /
//! KeyPair scenarios, round-trips across protocols, and generic vs
//! accelerated path equivalence.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use wirestruct::{
    BinaryProtocol, CodecConfig, CodecError, CompactProtocol, FieldDef, HeaderProtocol,
    IoTransport, MapKey, MemTransport, Protocol, SchemaBuilder, SchemaError, SchemaSet,
    StructValue, TypeExpr, Value,
};

fn key_schemas() -> Arc<SchemaSet> {
    SchemaBuilder::new()
        .define(
            "KeyMap",
            vec![FieldDef::required(
                1,
                "keys",
                TypeExpr::Map(Box::new(TypeExpr::Text), Box::new(TypeExpr::Bytes)),
            )],
        )
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

fn sample_key_map(set: &Arc<SchemaSet>) -> StructValue {
    let h = set.lookup("KeyMap").expect("KeyMap");
    let mut msg = StructValue::new(set, h);
    let mut keys = BTreeMap::new();
    keys.insert(
        MapKey::Text("nodeA".to_string()),
        Value::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF]),
    );
    msg.set("keys", Value::Map(keys)).expect("set keys");
    msg
}

fn roundtrip_binary(msg: &StructValue, cfg: &CodecConfig) -> StructValue {
    let mut prot = BinaryProtocol::new(MemTransport::new());
    msg.write(&mut prot, cfg).expect("write");
    let mut back = StructValue::new(msg.schema_set(), msg.handle());
    back.read(&mut prot, cfg).expect("read");
    back
}

fn roundtrip_compact(msg: &StructValue, cfg: &CodecConfig) -> StructValue {
    let mut prot = CompactProtocol::new(MemTransport::new());
    msg.write(&mut prot, cfg).expect("write");
    let mut back = StructValue::new(msg.schema_set(), msg.handle());
    back.read(&mut prot, cfg).expect("read");
    back
}

#[test]
fn test_link_and_lookup() {
    let set = key_schemas();
    assert_eq!(set.len(), 2);
    let h = set.lookup("KeyMap").expect("KeyMap");
    let schema = set.get(h);
    assert_eq!(schema.name, "KeyMap");
    assert_eq!(schema.fields().len(), 1);
    assert_eq!(schema.fields()[0].id, 1);
    assert!(set.lookup("NoSuchStruct").is_none());
}

#[test]
fn test_link_unresolved_reference_is_fatal() {
    let err = SchemaBuilder::new()
        .define(
            "Broken",
            vec![FieldDef::optional(1, "peer", TypeExpr::StructRef("Missing".into()))],
        )
        .link()
        .unwrap_err();
    assert!(matches!(err, SchemaError::UnresolvedRef { .. }));
}

#[test]
fn test_link_rejects_duplicates() {
    let err = SchemaBuilder::new()
        .define("A", vec![])
        .define("A", vec![])
        .link()
        .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateStruct(_)));

    let err = SchemaBuilder::new()
        .define(
            "B",
            vec![
                FieldDef::optional(1, "x", TypeExpr::I32),
                FieldDef::optional(1, "y", TypeExpr::I32),
            ],
        )
        .link()
        .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateFieldId { .. }));
}

#[test]
fn test_mutually_recursive_schemas_link_and_roundtrip() {
    let set = SchemaBuilder::new()
        .define(
            "Node",
            vec![
                FieldDef::required(1, "label", TypeExpr::Text),
                FieldDef::optional(2, "next", TypeExpr::StructRef("Chain".into())),
            ],
        )
        .define(
            "Chain",
            vec![FieldDef::optional(1, "node", TypeExpr::StructRef("Node".into()))],
        )
        .link()
        .expect("link");
    let cfg = CodecConfig::new();

    let node_h = set.lookup("Node").unwrap();
    let chain_h = set.lookup("Chain").unwrap();

    let mut inner = StructValue::new(&set, node_h);
    inner.set("label", Value::Text("leaf".into())).unwrap();
    let mut chain = StructValue::new(&set, chain_h);
    chain.set("node", Value::Struct(inner)).unwrap();
    let mut outer = StructValue::new(&set, node_h);
    outer.set("label", Value::Text("root".into())).unwrap();
    outer.set("next", Value::Struct(chain)).unwrap();

    assert_eq!(roundtrip_binary(&outer, &cfg), outer);
    assert_eq!(roundtrip_compact(&outer, &cfg), outer);
}

#[test]
fn test_keymap_roundtrip_scenario() {
    let set = key_schemas();
    let cfg = CodecConfig::new();
    let msg = sample_key_map(&set);

    let back = roundtrip_binary(&msg, &cfg);
    let keys = back.get("keys").and_then(Value::as_map).expect("map");
    assert_eq!(keys.len(), 1);
    assert_eq!(
        keys.get(&MapKey::Text("nodeA".into())).and_then(Value::as_bytes),
        Some(&[0xDE, 0xAD, 0xBE, 0xEF][..])
    );
    assert_eq!(back, msg);
}

#[test]
fn test_keymap_missing_required_field() {
    let set = key_schemas();
    let cfg = CodecConfig::new();
    let h = set.lookup("KeyMap").unwrap();

    // An empty struct on the wire: STOP with no fields.
    let mut prot = BinaryProtocol::new(MemTransport::with_bytes(vec![0x00]));
    let mut msg = StructValue::new(&set, h);
    let err = msg.read(&mut prot, &cfg).unwrap_err();
    match err {
        CodecError::MissingRequiredField { strukt, field } => {
            assert_eq!(strukt, "KeyMap");
            assert_eq!(field, "keys");
        }
        other => panic!("expected MissingRequiredField, got {:?}", other),
    }
}

#[test]
fn test_keypair_optional_fields_scenario() {
    let set = key_schemas();
    let cfg = CodecConfig::new();
    let h = set.lookup("KeyPair").unwrap();

    let mut msg = StructValue::new(&set, h);
    msg.set("private_key", Value::Bytes(vec![1, 2, 3, 4])).unwrap();

    let back = roundtrip_binary(&msg, &cfg);
    assert_eq!(back.get("private_key").and_then(Value::as_bytes), Some(&[1, 2, 3, 4][..]));
    assert!(!back.is_set("public_key"));

    let mut fresh = StructValue::new(&set, h);
    fresh.set("private_key", Value::Bytes(vec![1, 2, 3, 4])).unwrap();
    assert_eq!(back, fresh);

    // And inequality when the unset field differs.
    let mut both = StructValue::new(&set, h);
    both.set("private_key", Value::Bytes(vec![1, 2, 3, 4])).unwrap();
    both.set("public_key", Value::Bytes(vec![])).unwrap();
    assert_ne!(back, both);
}

#[test]
fn test_write_unset_required_is_caller_error() {
    let set = key_schemas();
    let cfg = CodecConfig::new();
    let h = set.lookup("KeyMap").unwrap();
    let msg = StructValue::new(&set, h);

    let mut prot = BinaryProtocol::new(MemTransport::new());
    let err = msg.write(&mut prot, &cfg).unwrap_err();
    assert!(matches!(err, CodecError::MissingRequiredField { .. }));

    // Same contract on the accelerated path.
    let accel_cfg = CodecConfig::accelerated(&set);
    let mut prot = BinaryProtocol::accelerated(MemTransport::new());
    let err = msg.write(&mut prot, &accel_cfg).unwrap_err();
    assert!(matches!(err, CodecError::MissingRequiredField { .. }));
}

fn all_scalars_set() -> (Arc<SchemaSet>, StructValue) {
    let set = SchemaBuilder::new()
        .define(
            "Everything",
            vec![
                FieldDef::optional(1, "flag", TypeExpr::Bool),
                FieldDef::optional(2, "small", TypeExpr::Byte),
                FieldDef::optional(3, "short", TypeExpr::I16),
                FieldDef::optional(4, "medium", TypeExpr::I32),
                FieldDef::optional(5, "large", TypeExpr::I64),
                FieldDef::optional(6, "ratio", TypeExpr::Double),
                FieldDef::optional(7, "label", TypeExpr::Text),
                FieldDef::optional(8, "blob", TypeExpr::Bytes),
                FieldDef::optional(9, "numbers", TypeExpr::List(Box::new(TypeExpr::I32))),
                FieldDef::optional(10, "tags", TypeExpr::Set(Box::new(TypeExpr::I16))),
                FieldDef::optional(
                    11,
                    "index",
                    TypeExpr::Map(Box::new(TypeExpr::Text), Box::new(TypeExpr::I64)),
                ),
                FieldDef::optional(12, "off", TypeExpr::Bool),
            ],
        )
        .link()
        .expect("link");
    let h = set.lookup("Everything").unwrap();
    let mut msg = StructValue::new(&set, h);
    msg.set("flag", Value::Bool(true)).unwrap();
    msg.set("small", Value::Byte(-7)).unwrap();
    msg.set("short", Value::I16(-12345)).unwrap();
    msg.set("medium", Value::I32(1 << 20)).unwrap();
    msg.set("large", Value::I64(-(1_i64 << 40))).unwrap();
    msg.set("ratio", Value::Double(2.5)).unwrap();
    msg.set("label", Value::Text("héllo".into())).unwrap();
    msg.set("blob", Value::Bytes(vec![0, 1, 2, 255])).unwrap();
    msg.set(
        "numbers",
        Value::List(vec![Value::I32(-1), Value::I32(0), Value::I32(99)]),
    )
    .unwrap();
    let mut tags = BTreeSet::new();
    tags.insert(MapKey::I16(3));
    tags.insert(MapKey::I16(-3));
    msg.set("tags", Value::Set(tags)).unwrap();
    let mut index = BTreeMap::new();
    index.insert(MapKey::Text("a".into()), Value::I64(1));
    index.insert(MapKey::Text("b".into()), Value::I64(-2));
    msg.set("index", Value::Map(index)).unwrap();
    msg.set("off", Value::Bool(false)).unwrap();
    (set, msg)
}

#[test]
fn test_all_scalar_kinds_roundtrip_binary_and_compact() {
    let (_set, msg) = all_scalars_set();
    let cfg = CodecConfig::new();
    assert_eq!(roundtrip_binary(&msg, &cfg), msg);
    assert_eq!(roundtrip_compact(&msg, &cfg), msg);
}

#[test]
fn test_accelerated_path_agrees_with_generic() {
    let (set, msg) = all_scalars_set();
    let plain = CodecConfig::new();
    let accel = CodecConfig::accelerated(&set);

    // Accelerated write, generic read.
    let mut prot = BinaryProtocol::accelerated(MemTransport::new());
    msg.write(&mut prot, &accel).expect("accel write");
    let fast_bytes = prot.into_transport().into_bytes();
    let mut back = StructValue::new(msg.schema_set(), msg.handle());
    let mut prot = BinaryProtocol::new(MemTransport::with_bytes(fast_bytes.clone()));
    back.read(&mut prot, &plain).expect("generic read");
    assert_eq!(back, msg);

    // Generic write, accelerated read.
    let mut prot = BinaryProtocol::new(MemTransport::new());
    msg.write(&mut prot, &plain).expect("generic write");
    let slow_bytes = prot.into_transport().into_bytes();
    let mut back = StructValue::new(msg.schema_set(), msg.handle());
    let mut prot = BinaryProtocol::accelerated(MemTransport::with_bytes(slow_bytes));
    back.read(&mut prot, &accel).expect("accel read");
    assert_eq!(back, msg);

    // Same pair over the compact encoding.
    let mut prot = CompactProtocol::accelerated(MemTransport::new());
    msg.write(&mut prot, &accel).expect("accel write");
    let fast_bytes = prot.into_transport().into_bytes();
    let mut back = StructValue::new(msg.schema_set(), msg.handle());
    let mut prot = CompactProtocol::new(MemTransport::with_bytes(fast_bytes));
    back.read(&mut prot, &plain).expect("generic read");
    assert_eq!(back, msg);

    let mut prot = CompactProtocol::new(MemTransport::new());
    msg.write(&mut prot, &plain).expect("generic write");
    let slow_bytes = prot.into_transport().into_bytes();
    let mut back = StructValue::new(msg.schema_set(), msg.handle());
    let mut prot = CompactProtocol::accelerated(MemTransport::with_bytes(slow_bytes));
    back.read(&mut prot, &accel).expect("accel read");
    assert_eq!(back, msg);
}

#[test]
fn test_stream_transport_forces_generic_path() {
    // Accelerated protocol and registered codecs, but the transport cannot
    // hand out its buffer: the dispatcher must silently fall through and the
    // result must be identical.
    let (set, msg) = all_scalars_set();
    let accel = CodecConfig::accelerated(&set);

    let mut prot = BinaryProtocol::accelerated(IoTransport::new(std::io::Cursor::new(Vec::new())));
    msg.write(&mut prot, &accel).expect("write");
    let mut stream = prot.into_transport().into_inner();
    stream.set_position(0);

    let mut back = StructValue::new(msg.schema_set(), msg.handle());
    let mut prot = BinaryProtocol::accelerated(IoTransport::new(stream));
    back.read(&mut prot, &accel).expect("read");
    assert_eq!(back, msg);
}

#[test]
fn test_header_protocol_declares_encoding() {
    let set = key_schemas();
    let cfg = CodecConfig::accelerated(&set);
    let msg = sample_key_map(&set);

    for compact in [false, true] {
        let trans = MemTransport::new();
        let mut prot = if compact {
            HeaderProtocol::compact(trans)
        } else {
            HeaderProtocol::binary(trans)
        };
        prot.emit_header().expect("header");
        msg.write(&mut prot, &cfg).expect("write");
        let bytes = prot.into_transport().into_bytes();

        let mut prot = HeaderProtocol::accept(MemTransport::with_bytes(bytes)).expect("accept");
        let mut back = StructValue::new(msg.schema_set(), msg.handle());
        back.read(&mut prot, &cfg).expect("read");
        assert_eq!(back, msg);
    }
}

#[test]
fn test_header_protocol_rejects_bad_frame() {
    assert!(matches!(
        HeaderProtocol::accept(MemTransport::with_bytes(vec![0xAA, 0xBB, 0x00])),
        Err(CodecError::Malformed(_))
    ));
    assert!(matches!(
        HeaderProtocol::accept(MemTransport::with_bytes(vec![0x0F, 0xFF, 0x09])),
        Err(CodecError::Malformed(_))
    ));
}

#[test]
fn test_defaults_applied_on_fresh_and_on_read() {
    let set = SchemaBuilder::new()
        .define(
            "Tuned",
            vec![
                FieldDef::new(1, "retries", wirestruct::Requiredness::Default, TypeExpr::I32)
                    .with_default(Value::I32(3)),
                FieldDef::optional(2, "name", TypeExpr::Text),
            ],
        )
        .link()
        .expect("link");
    let cfg = CodecConfig::new();
    let h = set.lookup("Tuned").unwrap();

    let fresh = StructValue::new(&set, h);
    assert_eq!(fresh.get("retries").and_then(Value::as_i64), Some(3));

    // A wire struct carrying neither field decodes back to the default.
    let mut prot = BinaryProtocol::new(MemTransport::with_bytes(vec![0x00]));
    let mut msg = StructValue::new(&set, h);
    msg.set("retries", Value::I32(9)).unwrap();
    msg.read(&mut prot, &cfg).expect("read");
    assert_eq!(msg.get("retries").and_then(Value::as_i64), Some(3));
    assert!(!msg.is_set("name"));
}

#[test]
fn test_dump_rendering_is_deterministic() {
    let set = key_schemas();
    let msg = sample_key_map(&set);
    let text = wirestruct::render(&msg);
    assert_eq!(text, "KeyMap {\n  keys: {\n    \"nodeA\": 0xdeadbeef\n  }\n}");
    assert_eq!(text, format!("{}", msg));

    let h = set.lookup("KeyPair").unwrap();
    let pair = StructValue::new(&set, h);
    assert_eq!(
        wirestruct::render(&pair),
        "KeyPair {\n  private_key: unset\n  public_key: unset\n}"
    );
}

#[test]
fn test_set_rejects_wrong_shape_and_unknown_field() {
    let set = key_schemas();
    let h = set.lookup("KeyMap").unwrap();
    let mut msg = StructValue::new(&set, h);
    assert!(matches!(
        msg.set("keys", Value::I32(1)),
        Err(SchemaError::TypeMismatch { .. })
    ));
    assert!(matches!(
        msg.set("nope", Value::I32(1)),
        Err(SchemaError::UnknownField { .. })
    ));
}

#[test]
fn test_text_mode_off_passes_bytes_through() {
    let set = key_schemas();
    let mut cfg = CodecConfig::new();
    cfg.text_mode = false;
    let msg = sample_key_map(&set);

    let back = roundtrip_binary(&msg, &cfg);
    let keys = back.get("keys").and_then(Value::as_map).expect("map");
    // Keys come back as raw bytes, not text.
    assert_eq!(
        keys.get(&MapKey::Bytes(b"nodeA".to_vec())).and_then(Value::as_bytes),
        Some(&[0xDE, 0xAD, 0xBE, 0xEF][..])
    );
}

#[test]
fn test_manual_protocol_use_matches_codec() {
    // The protocol surface is usable directly; the codec's output for the
    // KeyMap sample is exactly what hand-driven primitives produce.
    let set = key_schemas();
    let cfg = CodecConfig::new();
    let msg = sample_key_map(&set);

    let mut prot = BinaryProtocol::new(MemTransport::new());
    msg.write(&mut prot, &cfg).expect("write");
    let codec_bytes = prot.into_transport().into_bytes();

    let mut prot = BinaryProtocol::new(MemTransport::new());
    prot.write_struct_begin("KeyMap").unwrap();
    prot.write_field_begin(wirestruct::WireType::Map, 1).unwrap();
    prot.write_map_begin(wirestruct::WireType::String, wirestruct::WireType::String, 1)
        .unwrap();
    prot.write_bytes(b"nodeA").unwrap();
    prot.write_bytes(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    prot.write_map_end().unwrap();
    prot.write_field_end().unwrap();
    prot.write_field_stop().unwrap();
    prot.write_struct_end().unwrap();
    let manual_bytes = prot.into_transport().into_bytes();

    assert_eq!(codec_bytes, manual_bytes);
}
