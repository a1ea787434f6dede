//! Decoder fuzz target: feed arbitrary bytes to the struct reader over both
//! encodings and both codec paths. Every outcome must be Ok or a CodecError;
//! panics and runaway recursion are bugs.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

use std::sync::{Arc, OnceLock};
use wirestruct::{
    BinaryProtocol, CodecConfig, CompactProtocol, FieldDef, MemTransport, SchemaSet,
    SchemaBuilder, StructValue, TypeExpr,
};

fn schemas() -> &'static Arc<SchemaSet> {
    static SET: OnceLock<Arc<SchemaSet>> = OnceLock::new();
    SET.get_or_init(|| {
        SchemaBuilder::new()
            .define(
                "Target",
                vec![
                    FieldDef::required(
                        1,
                        "keys",
                        TypeExpr::Map(Box::new(TypeExpr::Text), Box::new(TypeExpr::Bytes)),
                    ),
                    FieldDef::optional(2, "peer", TypeExpr::StructRef("Target".into())),
                    FieldDef::optional(3, "numbers", TypeExpr::List(Box::new(TypeExpr::I64))),
                    FieldDef::optional(4, "note", TypeExpr::Text),
                ],
            )
            .link()
            .expect("link")
    })
}

fn exercise(data: &[u8]) {
    let set = schemas();
    let h = set.lookup("Target").expect("Target");
    let plain = CodecConfig::new();
    let accel = CodecConfig::accelerated(set);

    let mut msg = StructValue::new(set, h);
    let mut prot = BinaryProtocol::new(MemTransport::with_bytes(data.to_vec()));
    let _ = msg.read(&mut prot, &plain);

    let mut msg = StructValue::new(set, h);
    let mut prot = BinaryProtocol::accelerated(MemTransport::with_bytes(data.to_vec()));
    let _ = msg.read(&mut prot, &accel);

    let mut msg = StructValue::new(set, h);
    let mut prot = CompactProtocol::new(MemTransport::with_bytes(data.to_vec()));
    let _ = msg.read(&mut prot, &plain);

    let mut msg = StructValue::new(set, h);
    let mut prot = CompactProtocol::accelerated(MemTransport::with_bytes(data.to_vec()));
    let _ = msg.read(&mut prot, &accel);
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    exercise(data);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
