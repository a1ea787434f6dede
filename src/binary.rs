//! Binary encoding: big-endian fixed-width scalars, one-byte type tags,
//! i32-prefixed byte strings.
//!
//! Struct layout on the wire: a sequence of field entries (type tag byte,
//! i16 field id, payload), terminated by a single STOP tag byte. Map payload
//! is key tag, value tag, i32 count, then the entries; a negative count is
//! the streaming form where every entry is preceded by a one-byte
//! continuation marker (non-zero = entry follows, zero = end). The writer
//! only emits counted maps.

use crate::codec::CodecError;
use crate::protocol::{AccelEncoding, FieldHeader, MapHeader, Protocol};
use crate::schema::WireType;
use crate::transport::Transport;
use byteorder::{BigEndian, ByteOrder};

/// Read a length-prefixed payload without trusting the declared length:
/// against a bounded transport the length is checked before allocating, and
/// unbounded transports are read in capped chunks so a hostile prefix cannot
/// force a huge allocation up front.
pub(crate) fn read_len_prefixed<T: Transport>(
    trans: &mut T,
    len: usize,
) -> Result<Vec<u8>, CodecError> {
    if let Some(rem) = trans.remaining() {
        if len > rem {
            return Err(CodecError::Malformed(format!(
                "length prefix {} exceeds {} remaining byte(s)",
                len, rem
            )));
        }
    }
    const CHUNK: usize = 4096;
    let mut out = Vec::with_capacity(len.min(CHUNK));
    while out.len() < len {
        let take = (len - out.len()).min(CHUNK);
        let start = out.len();
        out.resize(start + take, 0);
        trans.read_exact(&mut out[start..])?;
    }
    Ok(out)
}

/// The primary binary protocol. `accelerated` instances advertise themselves
/// to the dispatcher; plain instances always run the generic codec.
#[derive(Debug)]
pub struct BinaryProtocol<T: Transport> {
    trans: T,
    accelerated: bool,
}

impl<T: Transport> BinaryProtocol<T> {
    pub fn new(trans: T) -> Self {
        BinaryProtocol {
            trans,
            accelerated: false,
        }
    }

    /// Acceleratable flavor: reports [`AccelEncoding::Binary`] so registered
    /// specialized codecs may take over when the transport cooperates.
    pub fn accelerated(trans: T) -> Self {
        BinaryProtocol {
            trans,
            accelerated: true,
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

    fn read_raw_i32(&mut self) -> Result<i32, CodecError> {
        let mut b = [0u8; 4];
        self.trans.read_exact(&mut b)?;
        Ok(BigEndian::read_i32(&b))
    }

    fn read_wire_type(&mut self) -> Result<WireType, CodecError> {
        let tag = self.trans.read_byte()?;
        WireType::from_tag(tag)
            .ok_or_else(|| CodecError::Malformed(format!("invalid wire type tag {:#04x}", tag)))
    }
}

impl<T: Transport> Protocol for BinaryProtocol<T> {
    fn write_struct_begin(&mut self, _name: &str) -> Result<(), CodecError> {
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn write_field_begin(&mut self, kind: WireType, id: i16) -> Result<(), CodecError> {
        self.trans.write_all(&[kind.tag()])?;
        self.write_i16(id)
    }

    fn write_field_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn write_field_stop(&mut self) -> Result<(), CodecError> {
        self.trans.write_all(&[WireType::Stop.tag()])
    }

    fn write_map_begin(
        &mut self,
        key: WireType,
        value: WireType,
        size: usize,
    ) -> Result<(), CodecError> {
        self.trans.write_all(&[key.tag(), value.tag()])?;
        self.write_i32(size as i32)
    }

    fn write_map_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn write_list_begin(&mut self, elem: WireType, size: usize) -> Result<(), CodecError> {
        self.trans.write_all(&[elem.tag()])?;
        self.write_i32(size as i32)
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
        self.trans.write_all(&[v as u8])
    }

    fn write_byte(&mut self, v: i8) -> Result<(), CodecError> {
        self.trans.write_all(&[v as u8])
    }

    fn write_i16(&mut self, v: i16) -> Result<(), CodecError> {
        let mut b = [0u8; 2];
        BigEndian::write_i16(&mut b, v);
        self.trans.write_all(&b)
    }

    fn write_i32(&mut self, v: i32) -> Result<(), CodecError> {
        let mut b = [0u8; 4];
        BigEndian::write_i32(&mut b, v);
        self.trans.write_all(&b)
    }

    fn write_i64(&mut self, v: i64) -> Result<(), CodecError> {
        let mut b = [0u8; 8];
        BigEndian::write_i64(&mut b, v);
        self.trans.write_all(&b)
    }

    fn write_double(&mut self, v: f64) -> Result<(), CodecError> {
        let mut b = [0u8; 8];
        BigEndian::write_f64(&mut b, v);
        self.trans.write_all(&b)
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<(), CodecError> {
        self.write_i32(v.len() as i32)?;
        self.trans.write_all(v)
    }

    fn read_struct_begin(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn read_struct_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn read_field_begin(&mut self) -> Result<FieldHeader, CodecError> {
        let tag = self.trans.read_byte()?;
        if tag == WireType::Stop.tag() {
            return Ok(FieldHeader::Stop);
        }
        let kind = WireType::from_tag(tag)
            .ok_or_else(|| CodecError::Malformed(format!("invalid wire type tag {:#04x}", tag)))?;
        let id = self.read_i16()?;
        Ok(FieldHeader::Field { kind, id })
    }

    fn read_field_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn read_map_begin(&mut self) -> Result<MapHeader, CodecError> {
        let key = self.read_wire_type()?;
        let value = self.read_wire_type()?;
        let size = self.read_raw_i32()?;
        Ok(MapHeader { key, value, size })
    }

    fn read_map_has_next(&mut self) -> Result<bool, CodecError> {
        Ok(self.trans.read_byte()? != 0)
    }

    fn read_map_end(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn read_list_begin(&mut self) -> Result<(WireType, u32), CodecError> {
        let elem = self.read_wire_type()?;
        let size = self.read_raw_i32()?;
        if size < 0 {
            return Err(CodecError::Malformed(format!(
                "negative list/set size {}",
                size
            )));
        }
        Ok((elem, size as u32))
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
        Ok(self.trans.read_byte()? != 0)
    }

    fn read_byte(&mut self) -> Result<i8, CodecError> {
        Ok(self.trans.read_byte()? as i8)
    }

    fn read_i16(&mut self) -> Result<i16, CodecError> {
        let mut b = [0u8; 2];
        self.trans.read_exact(&mut b)?;
        Ok(BigEndian::read_i16(&b))
    }

    fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.read_raw_i32()
    }

    fn read_i64(&mut self) -> Result<i64, CodecError> {
        let mut b = [0u8; 8];
        self.trans.read_exact(&mut b)?;
        Ok(BigEndian::read_i64(&b))
    }

    fn read_double(&mut self) -> Result<f64, CodecError> {
        let mut b = [0u8; 8];
        self.trans.read_exact(&mut b)?;
        Ok(BigEndian::read_f64(&b))
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_raw_i32()?;
        if len < 0 {
            return Err(CodecError::Malformed(format!(
                "negative byte-string length {}",
                len
            )));
        }
        read_len_prefixed(&mut self.trans, len as usize)
    }

    fn accel_encoding(&self) -> Option<AccelEncoding> {
        if self.accelerated {
            Some(AccelEncoding::Binary)
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
