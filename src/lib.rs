//! # wirestruct — Schema-Driven Struct Codec
//!
//! A generic encoder/decoder for structured records over a binary wire.
//! Struct types are described by runtime schemas (field id, wire type, name,
//! requiredness, default, nested element descriptors); instances serialize to
//! any of the interchangeable wire protocols and deserialize from bytes
//! produced by any of them.
//!
//! ## Pieces
//!
//! - **Schema**: [`SchemaBuilder`] registers struct layouts with by-name
//!   references, [`SchemaBuilder::link`] resolves them in one pass into an
//!   immutable, `Arc`-shared [`SchemaSet`] (mutually recursive structs link
//!   via handles).
//! - **Values**: [`StructValue`] holds one presence-tagged slot per field;
//!   unset is distinct from present-but-empty.
//! - **Protocols**: [`BinaryProtocol`] (big-endian, fixed width),
//!   [`CompactProtocol`] (varints, field-id deltas), [`HeaderProtocol`]
//!   (framing wrapper declaring the carried encoding) — all over a
//!   [`Transport`] byte source/sink.
//! - **Codec**: `StructValue::read`/`write` run the schema-driven field loop,
//!   skip unknown and type-mismatched fields wholesale (forward
//!   compatibility), and validate required fields after every read.
//! - **Accelerated path**: protocols constructed as `accelerated` plus a
//!   transport with direct buffer access dispatch whole structs to
//!   specialized slice codecs registered in an [`AccelTable`]; otherwise the
//!   generic loop runs. The two paths decode equal instances.
//!
//! ## Example
//!
//! ```
//! use wirestruct::{
//!     BinaryProtocol, CodecConfig, FieldDef, MapKey, MemTransport, SchemaBuilder,
//!     StructValue, TypeExpr, Value,
//! };
//!
//! let set = SchemaBuilder::new()
//!     .define(
//!         "KeyMap",
//!         vec![FieldDef::required(
//!             1,
//!             "keys",
//!             TypeExpr::Map(Box::new(TypeExpr::Text), Box::new(TypeExpr::Bytes)),
//!         )],
//!     )
//!     .link()
//!     .expect("link");
//! let cfg = CodecConfig::new();
//!
//! let h = set.lookup("KeyMap").unwrap();
//! let mut msg = StructValue::new(&set, h);
//! let mut keys = std::collections::BTreeMap::new();
//! keys.insert(MapKey::Text("nodeA".into()), Value::Bytes(vec![0xDE, 0xAD]));
//! msg.set("keys", Value::Map(keys)).unwrap();
//!
//! let mut prot = BinaryProtocol::new(MemTransport::new());
//! msg.write(&mut prot, &cfg).unwrap();
//!
//! let mut back = StructValue::new(&set, h);
//! back.read(&mut prot, &cfg).unwrap();
//! assert_eq!(back, msg);
//! ```

pub mod accel;
pub mod binary;
pub mod codec;
pub mod compact;
pub mod dump;
pub mod header;
pub mod protocol;
pub mod schema;
pub mod transport;
pub mod value;

pub use accel::AccelTable;
pub use binary::BinaryProtocol;
pub use codec::{check_required, skip, CodecConfig, CodecError};
pub use compact::CompactProtocol;
pub use dump::render;
pub use header::HeaderProtocol;
pub use protocol::{AccelEncoding, FieldHeader, MapHeader, Protocol};
pub use schema::{
    FieldDef, FieldSchema, FieldType, Requiredness, SchemaBuilder, SchemaError, SchemaSet,
    StructHandle, StructSchema, TypeExpr, WireType,
};
pub use transport::{IoTransport, MemTransport, Transport};
pub use value::{MapKey, StructValue, Value};
