//! Compact encoding: zigzag varints, delta-encoded field ids, bool values
//! folded into the field type nibble, little-endian doubles.

use crate::codec::CodecError;
use crate::protocol::{AccelEncoding, FieldHeader, MapHeader, Protocol};
use crate::schema::WireType;
use crate::transport::Transport;
use byteorder::{ByteOrder, LittleEndian};

pub(crate) const CT_STOP: u8 = 0x00;
pub(crate) const CT_BOOL_TRUE: u8 = 0x01;
pub(crate) const CT_BOOL_FALSE: u8 = 0x02;
pub(crate) const CT_BYTE: u8 = 0x03;
pub(crate) const CT_I16: u8 = 0x04;
pub(crate) const CT_I32: u8 = 0x05;
pub(crate) const CT_I64: u8 = 0x06;
pub(crate) const CT_DOUBLE: u8 = 0x07;
pub(crate) const CT_BINARY: u8 = 0x08;
pub(crate) const CT_LIST: u8 = 0x09;
pub(crate) const CT_SET: u8 = 0x0A;
pub(crate) const CT_MAP: u8 = 0x0B;
pub(crate) const CT_STRUCT: u8 = 0x0C;

/// Compact type nibble for a wire type. Bools map to `CT_BOOL_TRUE` as the
/// container element marker; field headers substitute the actual value.
pub(crate) fn compact_type(kind: WireType) -> u8 {
    match kind {
        WireType::Stop => CT_STOP,
        WireType::Bool => CT_BOOL_TRUE,
        WireType::Byte => CT_BYTE,
        WireType::I16 => CT_I16,
        WireType::I32 => CT_I32,
        WireType::I64 => CT_I64,
        WireType::Double => CT_DOUBLE,
        WireType::String => CT_BINARY,
        WireType::Struct => CT_STRUCT,
        WireType::Map => CT_MAP,
        WireType::Set => CT_SET,
        WireType::List => CT_LIST,
    }
}

pub(crate) fn wire_type_from_compact(ct: u8) -> Option<WireType> {
    match ct {
        CT_BOOL_TRUE | CT_BOOL_FALSE => Some(WireType::Bool),
        CT_BYTE => Some(WireType::Byte),
        CT_I16 => Some(WireType::I16),
        CT_I32 => Some(WireType::I32),
        CT_I64 => Some(WireType::I64),
        CT_DOUBLE => Some(WireType::Double),
        CT_BINARY => Some(WireType::String),
        CT_LIST => Some(WireType::List),
        CT_SET => Some(WireType::Set),
        CT_MAP => Some(WireType::Map),
        CT_STRUCT => Some(WireType::Struct),
        _ => None,
    }
}

pub(crate) fn zigzag_i16(v: i16) -> u64 {
    ((v << 1) ^ (v >> 15)) as u16 as u64
}

pub(crate) fn zigzag_i32(v: i32) -> u64 {
    ((v << 1) ^ (v >> 31)) as u32 as u64
}

pub(crate) fn zigzag_i64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub(crate) fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// The primary compact protocol. Field ids are written as deltas against the
/// previous field of the same struct, so both sides keep a per-nesting-depth
/// last-id stack.
#[derive(Debug)]
pub struct CompactProtocol<T: Transport> {
    trans: T,
    accelerated: bool,
    last_field_id: i16,
    field_id_stack: Vec<i16>,
    /// Field id waiting for its bool value (write side).
    pending_bool_field: Option<i16>,
    /// Bool value lifted from the field type nibble (read side).
    pending_bool_value: Option<bool>,
}

impl<T: Transport> CompactProtocol<T> {
    pub fn new(trans: T) -> Self {
        Self::build(trans, false)
    }

    /// Acceleratable flavor: reports [`AccelEncoding::Compact`].
    pub fn accelerated(trans: T) -> Self {
        Self::build(trans, true)
    }

    fn build(trans: T, accelerated: bool) -> Self {
        CompactProtocol {
            trans,
            accelerated,
            last_field_id: 0,
            field_id_stack: Vec::new(),
            pending_bool_field: None,
            pending_bool_value: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.trans
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.trans
    }

    pub fn into_transport(self) -> T {
        self.trans
    }

    fn write_varint(&mut self, mut v: u64) -> Result<(), CodecError> {
        loop {
            let b = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                return self.trans.write_all(&[b]);
            }
            self.trans.write_all(&[b | 0x80])?;
        }
    }

    fn read_varint(&mut self) -> Result<u64, CodecError> {
        let mut out = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.trans.read_byte()?;
            out |= ((b & 0x7F) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(out);
            }
            shift += 7;
            if shift >= 64 {
                return Err(CodecError::Malformed("varint longer than 10 bytes".into()));
            }
        }
    }

    fn write_field_header(&mut self, ct: u8, id: i16) -> Result<(), CodecError> {
        let delta = id as i32 - self.last_field_id as i32;
        if delta > 0 && delta <= 15 {
            self.trans.write_all(&[((delta as u8) << 4) | ct])?;
        } else {
            self.trans.write_all(&[ct])?;
            self.write_varint(zigzag_i16(id))?;
        }
        self.last_field_id = id;
        Ok(())
    }

    fn read_size(&mut self) -> Result<u32, CodecError> {
        let v = self.read_varint()?;
        u32::try_from(v)
            .map_err(|_| CodecError::Malformed(format!("container size {} out of range", v)))
    }
}

impl<T: Transport> Protocol for CompactProtocol<T> {
    fn write_struct_begin(&mut self, _name: &str) -> Result<(), CodecError> {
        self.field_id_stack.push(self.last_field_id);
        self.last_field_id = 0;
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<(), CodecError> {
        self.last_field_id = self.field_id_stack.pop().unwrap_or(0);
        Ok(())
    }

    fn write_field_begin(&mut self, kind: WireType, id: i16) -> Result<(), CodecError> {
        if kind == WireType::Bool {
            // Header written by write_bool, which knows the value.
            self.pending_bool_field = Some(id);
            Ok(())
        } else {
            self.write_field_header(compact_type(kind), id)
        }
    }

    fn write_field_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn write_field_stop(&mut self) -> Result<(), CodecError> {
        self.trans.write_all(&[CT_STOP])
    }

    fn write_map_begin(
        &mut self,
        key: WireType,
        value: WireType,
        size: usize,
    ) -> Result<(), CodecError> {
        if size == 0 {
            return self.write_varint(0);
        }
        self.write_varint(size as u64)?;
        self.trans
            .write_all(&[(compact_type(key) << 4) | compact_type(value)])
    }

    fn write_map_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn write_list_begin(&mut self, elem: WireType, size: usize) -> Result<(), CodecError> {
        let ct = compact_type(elem);
        if size < 15 {
            self.trans.write_all(&[((size as u8) << 4) | ct])
        } else {
            self.trans.write_all(&[0xF0 | ct])?;
            self.write_varint(size as u64)
        }
    }

    fn write_list_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn write_set_begin(&mut self, elem: WireType, size: usize) -> Result<(), CodecError> {
        self.write_list_begin(elem, size)
    }

    fn write_set_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn write_bool(&mut self, v: bool) -> Result<(), CodecError> {
        let ct = if v { CT_BOOL_TRUE } else { CT_BOOL_FALSE };
        match self.pending_bool_field.take() {
            Some(id) => self.write_field_header(ct, id),
            None => self.trans.write_all(&[ct]),
        }
    }

    fn write_byte(&mut self, v: i8) -> Result<(), CodecError> {
        self.trans.write_all(&[v as u8])
    }

    fn write_i16(&mut self, v: i16) -> Result<(), CodecError> {
        self.write_varint(zigzag_i16(v))
    }

    fn write_i32(&mut self, v: i32) -> Result<(), CodecError> {
        self.write_varint(zigzag_i32(v))
    }

    fn write_i64(&mut self, v: i64) -> Result<(), CodecError> {
        self.write_varint(zigzag_i64(v))
    }

    fn write_double(&mut self, v: f64) -> Result<(), CodecError> {
        let mut b = [0u8; 8];
        LittleEndian::write_f64(&mut b, v);
        self.trans.write_all(&b)
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<(), CodecError> {
        self.write_varint(v.len() as u64)?;
        self.trans.write_all(v)
    }

    fn read_struct_begin(&mut self) -> Result<(), CodecError> {
        self.field_id_stack.push(self.last_field_id);
        self.last_field_id = 0;
        Ok(())
    }

    fn read_struct_end(&mut self) -> Result<(), CodecError> {
        self.last_field_id = self.field_id_stack.pop().unwrap_or(0);
        Ok(())
    }

    fn read_field_begin(&mut self) -> Result<FieldHeader, CodecError> {
        let b = self.trans.read_byte()?;
        if b == CT_STOP {
            return Ok(FieldHeader::Stop);
        }
        let ct = b & 0x0F;
        let delta = (b >> 4) as i16;
        let id = if delta == 0 {
            let raw = unzigzag(self.read_varint()?);
            i16::try_from(raw)
                .map_err(|_| CodecError::Malformed(format!("field id {} out of range", raw)))?
        } else {
            self.last_field_id
                .checked_add(delta)
                .ok_or_else(|| CodecError::Malformed("field id delta overflow".into()))?
        };
        self.last_field_id = id;
        if ct == CT_BOOL_TRUE || ct == CT_BOOL_FALSE {
            self.pending_bool_value = Some(ct == CT_BOOL_TRUE);
        }
        let kind = wire_type_from_compact(ct)
            .ok_or_else(|| CodecError::Malformed(format!("invalid compact type {:#04x}", ct)))?;
        Ok(FieldHeader::Field { kind, id })
    }

    fn read_field_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn read_map_begin(&mut self) -> Result<MapHeader, CodecError> {
        let size = self.read_size()?;
        if size == 0 {
            // No types byte follows an empty map; the tags are placeholders.
            return Ok(MapHeader {
                key: WireType::Bool,
                value: WireType::Bool,
                size: 0,
            });
        }
        if size > i32::MAX as u32 {
            return Err(CodecError::Malformed(format!("map size {} out of range", size)));
        }
        let types = self.trans.read_byte()?;
        let key = wire_type_from_compact(types >> 4).ok_or_else(|| {
            CodecError::Malformed(format!("invalid compact map key type {:#04x}", types >> 4))
        })?;
        let value = wire_type_from_compact(types & 0x0F).ok_or_else(|| {
            CodecError::Malformed(format!("invalid compact map value type {:#04x}", types & 0x0F))
        })?;
        Ok(MapHeader {
            key,
            value,
            size: size as i32,
        })
    }

    fn read_map_has_next(&mut self) -> Result<bool, CodecError> {
        Ok(self.trans.read_byte()? != 0)
    }

    fn read_map_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn read_list_begin(&mut self) -> Result<(WireType, u32), CodecError> {
        let b = self.trans.read_byte()?;
        let ct = b & 0x0F;
        let elem = wire_type_from_compact(ct)
            .ok_or_else(|| CodecError::Malformed(format!("invalid compact type {:#04x}", ct)))?;
        let short = (b >> 4) as u32;
        let size = if short == 15 { self.read_size()? } else { short };
        Ok((elem, size))
    }

    fn read_list_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn read_set_begin(&mut self) -> Result<(WireType, u32), CodecError> {
        self.read_list_begin()
    }

    fn read_set_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn read_bool(&mut self) -> Result<bool, CodecError> {
        if let Some(v) = self.pending_bool_value.take() {
            return Ok(v);
        }
        match self.trans.read_byte()? {
            CT_BOOL_TRUE => Ok(true),
            CT_BOOL_FALSE | 0x00 => Ok(false),
            b => Err(CodecError::Malformed(format!(
                "invalid bool element {:#04x}",
                b
            ))),
        }
    }

    fn read_byte(&mut self) -> Result<i8, CodecError> {
        Ok(self.trans.read_byte()? as i8)
    }

    fn read_i16(&mut self) -> Result<i16, CodecError> {
        let raw = unzigzag(self.read_varint()?);
        i16::try_from(raw)
            .map_err(|_| CodecError::Malformed(format!("i16 value {} out of range", raw)))
    }

    fn read_i32(&mut self) -> Result<i32, CodecError> {
        let raw = unzigzag(self.read_varint()?);
        i32::try_from(raw)
            .map_err(|_| CodecError::Malformed(format!("i32 value {} out of range", raw)))
    }

    fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(unzigzag(self.read_varint()?))
    }

    fn read_double(&mut self) -> Result<f64, CodecError> {
        let mut b = [0u8; 8];
        self.trans.read_exact(&mut b)?;
        Ok(LittleEndian::read_f64(&b))
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| CodecError::Malformed(format!("byte-string length {} out of range", len)))?;
        crate::binary::read_len_prefixed(&mut self.trans, len)
    }

    fn accel_encoding(&self) -> Option<AccelEncoding> {
        if self.accelerated {
            Some(AccelEncoding::Compact)
        } else {
            None
        }
    }

    fn direct_read_slice(&self) -> Option<&[u8]> {
        self.trans.read_slice()
    }

    fn direct_advance(&mut self, n: usize) {
        self.trans.advance(n);
    }

    fn direct_write_buf(&mut self) -> Option<&mut Vec<u8>> {
        self.trans.write_buf()
    }
}
