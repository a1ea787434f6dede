//! Header-framed protocol: a thin framing layer that declares which of the
//! two primary encodings it carries. The codec sees it as the inner
//! encoding; in particular the accelerated-path capability passes through.

use crate::binary::BinaryProtocol;
use crate::codec::CodecError;
use crate::compact::CompactProtocol;
use crate::protocol::{AccelEncoding, FieldHeader, MapHeader, Protocol};
use crate::schema::WireType;
use crate::transport::Transport;

const HEADER_MAGIC: [u8; 2] = [0x0F, 0xFF];
const PROTO_ID_BINARY: u8 = 0;
const PROTO_ID_COMPACT: u8 = 2;

#[derive(Debug)]
enum Inner<T: Transport> {
    Binary(BinaryProtocol<T>),
    Compact(CompactProtocol<T>),
}

/// Frame wrapper around one of the primary encodings. Constructed either
/// explicitly (write side) or by reading the frame header off the transport
/// (read side, [`HeaderProtocol::accept`]).
#[derive(Debug)]
pub struct HeaderProtocol<T: Transport> {
    inner: Inner<T>,
}

macro_rules! delegate {
    ($self:ident, $m:ident $(, $arg:expr)*) => {
        match &mut $self.inner {
            Inner::Binary(p) => p.$m($($arg),*),
            Inner::Compact(p) => p.$m($($arg),*),
        }
    };
}

impl<T: Transport> HeaderProtocol<T> {
    /// Frame carrying the binary encoding (acceleratable).
    pub fn binary(trans: T) -> Self {
        HeaderProtocol {
            inner: Inner::Binary(BinaryProtocol::accelerated(trans)),
        }
    }

    /// Frame carrying the compact encoding (acceleratable).
    pub fn compact(trans: T) -> Self {
        HeaderProtocol {
            inner: Inner::Compact(CompactProtocol::accelerated(trans)),
        }
    }

    /// Write the frame header declaring the carried encoding.
    pub fn emit_header(&mut self) -> Result<(), CodecError> {
        let proto_id = match &self.inner {
            Inner::Binary(_) => PROTO_ID_BINARY,
            Inner::Compact(_) => PROTO_ID_COMPACT,
        };
        let trans = match &mut self.inner {
            Inner::Binary(p) => p.transport_mut(),
            Inner::Compact(p) => p.transport_mut(),
        };
        trans.write_all(&HEADER_MAGIC)?;
        trans.write_all(&[proto_id])
    }

    /// Read a frame header and wrap the declared encoding around the
    /// transport.
    pub fn accept(mut trans: T) -> Result<Self, CodecError> {
        let mut magic = [0u8; 2];
        trans.read_exact(&mut magic)?;
        if magic != HEADER_MAGIC {
            return Err(CodecError::Malformed(format!(
                "bad frame magic {:02x}{:02x}",
                magic[0], magic[1]
            )));
        }
        let inner = match trans.read_byte()? {
            PROTO_ID_BINARY => Inner::Binary(BinaryProtocol::accelerated(trans)),
            PROTO_ID_COMPACT => Inner::Compact(CompactProtocol::accelerated(trans)),
            id => {
                return Err(CodecError::Malformed(format!(
                    "unknown frame protocol id {}",
                    id
                )))
            }
        };
        Ok(HeaderProtocol { inner })
    }

    pub fn into_transport(self) -> T {
        match self.inner {
            Inner::Binary(p) => p.into_transport(),
            Inner::Compact(p) => p.into_transport(),
        }
    }
}

impl<T: Transport> Protocol for HeaderProtocol<T> {
    fn write_struct_begin(&mut self, name: &str) -> Result<(), CodecError> {
        delegate!(self, write_struct_begin, name)
    }

    fn write_struct_end(&mut self) -> Result<(), CodecError> {
        delegate!(self, write_struct_end)
    }

    fn write_field_begin(&mut self, kind: WireType, id: i16) -> Result<(), CodecError> {
        delegate!(self, write_field_begin, kind, id)
    }

    fn write_field_end(&mut self) -> Result<(), CodecError> {
        delegate!(self, write_field_end)
    }

    fn write_field_stop(&mut self) -> Result<(), CodecError> {
        delegate!(self, write_field_stop)
    }

    fn write_map_begin(
        &mut self,
        key: WireType,
        value: WireType,
        size: usize,
    ) -> Result<(), CodecError> {
        delegate!(self, write_map_begin, key, value, size)
    }

    fn write_map_end(&mut self) -> Result<(), CodecError> {
        delegate!(self, write_map_end)
    }

    fn write_list_begin(&mut self, elem: WireType, size: usize) -> Result<(), CodecError> {
        delegate!(self, write_list_begin, elem, size)
    }

    fn write_list_end(&mut self) -> Result<(), CodecError> {
        delegate!(self, write_list_end)
    }

    fn write_set_begin(&mut self, elem: WireType, size: usize) -> Result<(), CodecError> {
        delegate!(self, write_set_begin, elem, size)
    }

    fn write_set_end(&mut self) -> Result<(), CodecError> {
        delegate!(self, write_set_end)
    }

    fn write_bool(&mut self, v: bool) -> Result<(), CodecError> {
        delegate!(self, write_bool, v)
    }

    fn write_byte(&mut self, v: i8) -> Result<(), CodecError> {
        delegate!(self, write_byte, v)
    }

    fn write_i16(&mut self, v: i16) -> Result<(), CodecError> {
        delegate!(self, write_i16, v)
    }

    fn write_i32(&mut self, v: i32) -> Result<(), CodecError> {
        delegate!(self, write_i32, v)
    }

    fn write_i64(&mut self, v: i64) -> Result<(), CodecError> {
        delegate!(self, write_i64, v)
    }

    fn write_double(&mut self, v: f64) -> Result<(), CodecError> {
        delegate!(self, write_double, v)
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<(), CodecError> {
        delegate!(self, write_bytes, v)
    }

    fn read_struct_begin(&mut self) -> Result<(), CodecError> {
        delegate!(self, read_struct_begin)
    }

    fn read_struct_end(&mut self) -> Result<(), CodecError> {
        delegate!(self, read_struct_end)
    }

    fn read_field_begin(&mut self) -> Result<FieldHeader, CodecError> {
        delegate!(self, read_field_begin)
    }

    fn read_field_end(&mut self) -> Result<(), CodecError> {
        delegate!(self, read_field_end)
    }

    fn read_map_begin(&mut self) -> Result<MapHeader, CodecError> {
        delegate!(self, read_map_begin)
    }

    fn read_map_has_next(&mut self) -> Result<bool, CodecError> {
        delegate!(self, read_map_has_next)
    }

    fn read_map_end(&mut self) -> Result<(), CodecError> {
        delegate!(self, read_map_end)
    }

    fn read_list_begin(&mut self) -> Result<(WireType, u32), CodecError> {
        delegate!(self, read_list_begin)
    }

    fn read_list_end(&mut self) -> Result<(), CodecError> {
        delegate!(self, read_list_end)
    }

    fn read_set_begin(&mut self) -> Result<(WireType, u32), CodecError> {
        delegate!(self, read_set_begin)
    }

    fn read_set_end(&mut self) -> Result<(), CodecError> {
        delegate!(self, read_set_end)
    }

    fn read_bool(&mut self) -> Result<bool, CodecError> {
        delegate!(self, read_bool)
    }

    fn read_byte(&mut self) -> Result<i8, CodecError> {
        delegate!(self, read_byte)
    }

    fn read_i16(&mut self) -> Result<i16, CodecError> {
        delegate!(self, read_i16)
    }

    fn read_i32(&mut self) -> Result<i32, CodecError> {
        delegate!(self, read_i32)
    }

    fn read_i64(&mut self) -> Result<i64, CodecError> {
        delegate!(self, read_i64)
    }

    fn read_double(&mut self) -> Result<f64, CodecError> {
        delegate!(self, read_double)
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        delegate!(self, read_bytes)
    }

    fn accel_encoding(&self) -> Option<AccelEncoding> {
        match &self.inner {
            Inner::Binary(p) => p.accel_encoding(),
            Inner::Compact(p) => p.accel_encoding(),
        }
    }

    fn direct_read_slice(&self) -> Option<&[u8]> {
        match &self.inner {
            Inner::Binary(p) => p.direct_read_slice(),
            Inner::Compact(p) => p.direct_read_slice(),
        }
    }

    fn direct_advance(&mut self, n: usize) {
        delegate!(self, direct_advance, n)
    }

    fn direct_write_buf(&mut self) -> Option<&mut Vec<u8>> {
        delegate!(self, direct_write_buf)
    }
}
