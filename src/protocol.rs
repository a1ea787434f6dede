//! The protocol seam: everything the generic reader/writer needs from a wire
//! encoding, plus the capability queries the accelerated-path dispatcher asks.

use crate::codec::CodecError;
use crate::schema::WireType;

/// The two primary encodings a specialized codec implementation exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelEncoding {
    Binary,
    Compact,
}

/// Result of reading a field header: either a field follows or the struct is
/// terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldHeader {
    Stop,
    Field { kind: WireType, id: i16 },
}

/// Map container header. `size < 0` signals the streaming form: entries are
/// not counted, the reader must call [`Protocol::read_map_has_next`] before
/// each entry. Writers only ever emit the counted form. The declared element
/// types are advisory; for known fields the schema's types win and the
/// header types only size skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    pub key: WireType,
    pub value: WireType,
    pub size: i32,
}

/// One wire encoding over a transport. Struct/field/container structure plus
/// scalar primitives; the codec drives these in a fixed order, so
/// implementations may keep internal state (the compact encoding does).
pub trait Protocol {
    // -- write side --

    fn write_struct_begin(&mut self, name: &str) -> Result<(), CodecError>;
    fn write_struct_end(&mut self) -> Result<(), CodecError>;
    fn write_field_begin(&mut self, kind: WireType, id: i16) -> Result<(), CodecError>;
    fn write_field_end(&mut self) -> Result<(), CodecError>;
    fn write_field_stop(&mut self) -> Result<(), CodecError>;
    fn write_map_begin(&mut self, key: WireType, value: WireType, size: usize)
        -> Result<(), CodecError>;
    fn write_map_end(&mut self) -> Result<(), CodecError>;
    fn write_list_begin(&mut self, elem: WireType, size: usize) -> Result<(), CodecError>;
    fn write_list_end(&mut self) -> Result<(), CodecError>;
    fn write_set_begin(&mut self, elem: WireType, size: usize) -> Result<(), CodecError>;
    fn write_set_end(&mut self) -> Result<(), CodecError>;
    fn write_bool(&mut self, v: bool) -> Result<(), CodecError>;
    fn write_byte(&mut self, v: i8) -> Result<(), CodecError>;
    fn write_i16(&mut self, v: i16) -> Result<(), CodecError>;
    fn write_i32(&mut self, v: i32) -> Result<(), CodecError>;
    fn write_i64(&mut self, v: i64) -> Result<(), CodecError>;
    fn write_double(&mut self, v: f64) -> Result<(), CodecError>;
    fn write_bytes(&mut self, v: &[u8]) -> Result<(), CodecError>;

    // -- read side --

    fn read_struct_begin(&mut self) -> Result<(), CodecError>;
    fn read_struct_end(&mut self) -> Result<(), CodecError>;
    fn read_field_begin(&mut self) -> Result<FieldHeader, CodecError>;
    fn read_field_end(&mut self) -> Result<(), CodecError>;
    fn read_map_begin(&mut self) -> Result<MapHeader, CodecError>;
    /// For streaming maps (negative declared size): is another entry next?
    /// Consumes the continuation marker.
    fn read_map_has_next(&mut self) -> Result<bool, CodecError>;
    fn read_map_end(&mut self) -> Result<(), CodecError>;
    fn read_list_begin(&mut self) -> Result<(WireType, u32), CodecError>;
    fn read_list_end(&mut self) -> Result<(), CodecError>;
    fn read_set_begin(&mut self) -> Result<(WireType, u32), CodecError>;
    fn read_set_end(&mut self) -> Result<(), CodecError>;
    fn read_bool(&mut self) -> Result<bool, CodecError>;
    fn read_byte(&mut self) -> Result<i8, CodecError>;
    fn read_i16(&mut self) -> Result<i16, CodecError>;
    fn read_i32(&mut self) -> Result<i32, CodecError>;
    fn read_i64(&mut self) -> Result<i64, CodecError>;
    fn read_double(&mut self) -> Result<f64, CodecError>;
    fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError>;

    // -- capability queries (accelerated-path dispatch) --

    /// Which primary encoding this protocol instance carries, when it was
    /// constructed as acceleratable. `None` forces the generic path.
    fn accel_encoding(&self) -> Option<AccelEncoding> {
        None
    }

    /// Unread bytes of the underlying transport, when it allows direct reads.
    fn direct_read_slice(&self) -> Option<&[u8]> {
        None
    }

    /// Consume bytes after a specialized codec decoded from the direct slice.
    fn direct_advance(&mut self, n: usize) {
        let _ = n;
    }

    /// Output buffer of the underlying transport, when it allows direct writes.
    fn direct_write_buf(&mut self) -> Option<&mut Vec<u8>> {
        None
    }
}
