//! Specialized whole-struct codecs running directly over byte slices, and
//! the per-schema registration table the dispatcher consults. Observationally
//! equivalent to the generic reader/writer, including required-field
//! enforcement; only the mechanics differ (no protocol/transport dispatch per
//! scalar, one bounds-checked cursor).

use crate::codec::{check_depth, check_required, CodecConfig, CodecError};
use crate::compact::{
    compact_type, unzigzag, wire_type_from_compact, zigzag_i16, zigzag_i32, zigzag_i64,
    CT_BOOL_FALSE, CT_BOOL_TRUE, CT_STOP,
};
use crate::protocol::AccelEncoding;
use crate::schema::{FieldType, Requiredness, SchemaSet, StructHandle, WireType};
use crate::value::{MapKey, StructValue, Value};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Which struct schemas have a specialized codec registered. Built once at
/// startup next to the schema set; immutable in steady state.
#[derive(Debug, Clone)]
pub struct AccelTable {
    enabled: Vec<bool>,
}

impl AccelTable {
    /// Register the native specialized codec for every struct in the set.
    pub fn all(set: &SchemaSet) -> Self {
        AccelTable {
            enabled: vec![true; set.len()],
        }
    }

    /// No registrations; every call falls through to the generic path.
    pub fn none(set: &SchemaSet) -> Self {
        AccelTable {
            enabled: vec![false; set.len()],
        }
    }

    pub fn enable(&mut self, h: StructHandle) {
        if let Some(e) = self.enabled.get_mut(h.0) {
            *e = true;
        }
    }

    pub fn disable(&mut self, h: StructHandle) {
        if let Some(e) = self.enabled.get_mut(h.0) {
            *e = false;
        }
    }

    pub fn contains(&self, h: StructHandle) -> bool {
        self.enabled.get(h.0).copied().unwrap_or(false)
    }
}

/// Decode one struct from the front of `buf`; returns bytes consumed.
pub(crate) fn decode(
    value: &mut StructValue,
    buf: &[u8],
    enc: AccelEncoding,
    cfg: &CodecConfig,
) -> Result<usize, CodecError> {
    let mut r = SliceReader::new(buf);
    match enc {
        AccelEncoding::Binary => binary_decode_struct(value, &mut r, cfg, 0)?,
        AccelEncoding::Compact => compact_decode_struct(value, &mut r, cfg, 0)?,
    }
    Ok(r.pos)
}

/// Encode one struct onto the end of `out`.
pub(crate) fn encode(
    value: &StructValue,
    out: &mut Vec<u8>,
    enc: AccelEncoding,
    cfg: &CodecConfig,
) -> Result<(), CodecError> {
    match enc {
        AccelEncoding::Binary => binary_encode_struct(value, out, cfg, 0),
        AccelEncoding::Compact => compact_encode_struct(value, out, cfg, 0),
    }
}

struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        SliceReader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        let b = *self.buf.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::UnexpectedEof);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    /// Like `take`, but for wire-declared lengths: an overrun is malformed
    /// input, not mere truncation.
    fn take_declared(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::Malformed(format!(
                "length prefix {} exceeds {} remaining byte(s)",
                n,
                self.remaining()
            )));
        }
        self.take(n)
    }

    fn i16_be(&mut self) -> Result<i16, CodecError> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    fn i32_be(&mut self) -> Result<i32, CodecError> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    fn i64_be(&mut self) -> Result<i64, CodecError> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    fn f64_be(&mut self) -> Result<f64, CodecError> {
        Ok(BigEndian::read_f64(self.take(8)?))
    }

    fn f64_le(&mut self) -> Result<f64, CodecError> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    fn varint(&mut self) -> Result<u64, CodecError> {
        let mut out = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.u8()?;
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
}

fn push_varint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let b = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            out.push(b);
            return;
        }
        out.push(b | 0x80);
    }
}

fn string_value(raw: &[u8], text: bool, cfg: &CodecConfig) -> Result<Value, CodecError> {
    if text && cfg.text_mode {
        let s = std::str::from_utf8(raw)
            .map_err(|e| CodecError::Malformed(format!("invalid UTF-8 in text field: {}", e)))?;
        Ok(Value::Text(s.to_string()))
    } else {
        Ok(Value::Bytes(raw.to_vec()))
    }
}

fn string_key(raw: &[u8], text: bool, cfg: &CodecConfig) -> Result<MapKey, CodecError> {
    if text && cfg.text_mode {
        let s = std::str::from_utf8(raw)
            .map_err(|e| CodecError::Malformed(format!("invalid UTF-8 in text key: {}", e)))?;
        Ok(MapKey::Text(s.to_string()))
    } else {
        Ok(MapKey::Bytes(raw.to_vec()))
    }
}

// ---- binary encoding, slice-specialized ----

fn binary_decode_struct(
    value: &mut StructValue,
    r: &mut SliceReader<'_>,
    cfg: &CodecConfig,
    depth: usize,
) -> Result<(), CodecError> {
    value.reset_to_defaults();
    loop {
        let tag = r.u8()?;
        if tag == WireType::Stop.tag() {
            break;
        }
        let kind = WireType::from_tag(tag)
            .ok_or_else(|| CodecError::Malformed(format!("invalid wire type tag {:#04x}", tag)))?;
        let id = r.i16_be()?;
        let target = value
            .schema()
            .field_by_id(id)
            .filter(|(_, f)| f.ty.wire_type() == kind)
            .map(|(i, f)| (i, f.ty.clone()));
        match target {
            Some((i, ty)) => {
                let set = Arc::clone(value.schema_set());
                let v = binary_decode_value(&set, &ty, r, cfg, depth + 1)?;
                *value.slot_mut(i) = Some(v);
            }
            None => binary_skip(r, kind, depth + 1)?,
        }
    }
    check_required(value)
}

fn binary_decode_value(
    set: &Arc<SchemaSet>,
    ty: &FieldType,
    r: &mut SliceReader<'_>,
    cfg: &CodecConfig,
    depth: usize,
) -> Result<Value, CodecError> {
    check_depth(depth)?;
    match ty {
        FieldType::Bool => Ok(Value::Bool(r.u8()? != 0)),
        FieldType::Byte => Ok(Value::Byte(r.u8()? as i8)),
        FieldType::I16 => Ok(Value::I16(r.i16_be()?)),
        FieldType::I32 => Ok(Value::I32(r.i32_be()?)),
        FieldType::I64 => Ok(Value::I64(r.i64_be()?)),
        FieldType::Double => Ok(Value::Double(r.f64_be()?)),
        FieldType::String { text } => {
            let len = binary_read_len(r)?;
            string_value(r.take_declared(len)?, *text, cfg)
        }
        FieldType::Struct(h) => {
            let mut s = StructValue::new(set, *h);
            binary_decode_struct(&mut s, r, cfg, depth)?;
            Ok(Value::Struct(s))
        }
        FieldType::Map { key, value } => {
            let _key_tag = r.u8()?;
            let _value_tag = r.u8()?;
            let size = r.i32_be()?;
            let mut map = BTreeMap::new();
            if size >= 0 {
                for _ in 0..size {
                    let k = binary_decode_key(key, r, cfg)?;
                    let v = binary_decode_value(set, value, r, cfg, depth + 1)?;
                    map.insert(k, v);
                }
            } else {
                while r.u8()? != 0 {
                    let k = binary_decode_key(key, r, cfg)?;
                    let v = binary_decode_value(set, value, r, cfg, depth + 1)?;
                    map.insert(k, v);
                }
            }
            Ok(Value::Map(map))
        }
        FieldType::Set(elem) => {
            let _elem_tag = r.u8()?;
            let n = binary_read_container_size(r)?;
            let mut out = BTreeSet::new();
            for _ in 0..n {
                out.insert(binary_decode_key(elem, r, cfg)?);
            }
            Ok(Value::Set(out))
        }
        FieldType::List(elem) => {
            let _elem_tag = r.u8()?;
            let n = binary_read_container_size(r)?;
            let mut out = Vec::new();
            for _ in 0..n {
                out.push(binary_decode_value(set, elem, r, cfg, depth + 1)?);
            }
            Ok(Value::List(out))
        }
    }
}

fn binary_read_len(r: &mut SliceReader<'_>) -> Result<usize, CodecError> {
    let len = r.i32_be()?;
    if len < 0 {
        return Err(CodecError::Malformed(format!(
            "negative byte-string length {}",
            len
        )));
    }
    Ok(len as usize)
}

fn binary_read_container_size(r: &mut SliceReader<'_>) -> Result<u32, CodecError> {
    let n = r.i32_be()?;
    if n < 0 {
        return Err(CodecError::Malformed(format!("negative list/set size {}", n)));
    }
    Ok(n as u32)
}

fn binary_decode_key(
    ty: &FieldType,
    r: &mut SliceReader<'_>,
    cfg: &CodecConfig,
) -> Result<MapKey, CodecError> {
    match ty {
        FieldType::Bool => Ok(MapKey::Bool(r.u8()? != 0)),
        FieldType::Byte => Ok(MapKey::Byte(r.u8()? as i8)),
        FieldType::I16 => Ok(MapKey::I16(r.i16_be()?)),
        FieldType::I32 => Ok(MapKey::I32(r.i32_be()?)),
        FieldType::I64 => Ok(MapKey::I64(r.i64_be()?)),
        FieldType::String { text } => {
            let len = binary_read_len(r)?;
            string_key(r.take_declared(len)?, *text, cfg)
        }
        _ => Err(CodecError::Malformed(
            "non-scalar map/set key type".to_string(),
        )),
    }
}

fn binary_skip(r: &mut SliceReader<'_>, kind: WireType, depth: usize) -> Result<(), CodecError> {
    check_depth(depth)?;
    match kind {
        WireType::Stop => Err(CodecError::Malformed(
            "STOP tag in value position".to_string(),
        )),
        WireType::Bool | WireType::Byte => r.u8().map(drop),
        WireType::I16 => r.take(2).map(drop),
        WireType::I32 => r.take(4).map(drop),
        WireType::I64 | WireType::Double => r.take(8).map(drop),
        WireType::String => {
            let len = binary_read_len(r)?;
            r.take_declared(len).map(drop)
        }
        WireType::Struct => {
            loop {
                let tag = r.u8()?;
                if tag == WireType::Stop.tag() {
                    break;
                }
                let kind = WireType::from_tag(tag).ok_or_else(|| {
                    CodecError::Malformed(format!("invalid wire type tag {:#04x}", tag))
                })?;
                r.take(2)?; // field id
                binary_skip(r, kind, depth + 1)?;
            }
            Ok(())
        }
        WireType::Map => {
            let key = WireType::from_tag(r.u8()?)
                .ok_or_else(|| CodecError::Malformed("invalid map key tag".to_string()))?;
            let value = WireType::from_tag(r.u8()?)
                .ok_or_else(|| CodecError::Malformed("invalid map value tag".to_string()))?;
            let size = r.i32_be()?;
            if size >= 0 {
                for _ in 0..size {
                    binary_skip(r, key, depth + 1)?;
                    binary_skip(r, value, depth + 1)?;
                }
            } else {
                while r.u8()? != 0 {
                    binary_skip(r, key, depth + 1)?;
                    binary_skip(r, value, depth + 1)?;
                }
            }
            Ok(())
        }
        WireType::Set | WireType::List => {
            let elem = WireType::from_tag(r.u8()?)
                .ok_or_else(|| CodecError::Malformed("invalid element tag".to_string()))?;
            let n = binary_read_container_size(r)?;
            for _ in 0..n {
                binary_skip(r, elem, depth + 1)?;
            }
            Ok(())
        }
    }
}

fn binary_encode_struct(
    value: &StructValue,
    out: &mut Vec<u8>,
    cfg: &CodecConfig,
    depth: usize,
) -> Result<(), CodecError> {
    let schema = value.schema();
    for (i, f) in schema.fields().iter().enumerate() {
        match value.slot(i) {
            Some(v) => {
                out.push(f.ty.wire_type().tag());
                out.extend_from_slice(&f.id.to_be_bytes());
                binary_encode_value(&f.ty, v, out, cfg, depth + 1)?;
            }
            None if f.requiredness == Requiredness::Required => {
                return Err(CodecError::MissingRequiredField {
                    strukt: schema.name.clone(),
                    field: f.name.clone(),
                });
            }
            None => {}
        }
    }
    out.push(WireType::Stop.tag());
    Ok(())
}

fn binary_encode_value(
    ty: &FieldType,
    v: &Value,
    out: &mut Vec<u8>,
    cfg: &CodecConfig,
    depth: usize,
) -> Result<(), CodecError> {
    check_depth(depth)?;
    match (ty, v) {
        (FieldType::Bool, Value::Bool(b)) => {
            out.push(*b as u8);
            Ok(())
        }
        (FieldType::Byte, Value::Byte(x)) => {
            out.push(*x as u8);
            Ok(())
        }
        (FieldType::I16, Value::I16(x)) => {
            out.extend_from_slice(&x.to_be_bytes());
            Ok(())
        }
        (FieldType::I32, Value::I32(x)) => {
            out.extend_from_slice(&x.to_be_bytes());
            Ok(())
        }
        (FieldType::I64, Value::I64(x)) => {
            out.extend_from_slice(&x.to_be_bytes());
            Ok(())
        }
        (FieldType::Double, Value::Double(x)) => {
            out.extend_from_slice(&x.to_be_bytes());
            Ok(())
        }
        (FieldType::String { .. }, Value::Text(s)) => {
            binary_push_bytes(out, s.as_bytes());
            Ok(())
        }
        (FieldType::String { .. }, Value::Bytes(b)) => {
            binary_push_bytes(out, b);
            Ok(())
        }
        (FieldType::Struct(_), Value::Struct(s)) => binary_encode_struct(s, out, cfg, depth),
        (FieldType::Map { key, value }, Value::Map(m)) => {
            out.push(key.wire_type().tag());
            out.push(value.wire_type().tag());
            out.extend_from_slice(&(m.len() as i32).to_be_bytes());
            for (k, item) in m {
                binary_encode_key(k, out);
                binary_encode_value(value, item, out, cfg, depth + 1)?;
            }
            Ok(())
        }
        (FieldType::Set(elem), Value::Set(s)) => {
            out.push(elem.wire_type().tag());
            out.extend_from_slice(&(s.len() as i32).to_be_bytes());
            for k in s {
                binary_encode_key(k, out);
            }
            Ok(())
        }
        (FieldType::List(elem), Value::List(items)) => {
            out.push(elem.wire_type().tag());
            out.extend_from_slice(&(items.len() as i32).to_be_bytes());
            for item in items {
                binary_encode_value(elem, item, out, cfg, depth + 1)?;
            }
            Ok(())
        }
        _ => Err(CodecError::Malformed(
            "value does not match declared field type".to_string(),
        )),
    }
}

fn binary_push_bytes(out: &mut Vec<u8>, b: &[u8]) {
    out.extend_from_slice(&(b.len() as i32).to_be_bytes());
    out.extend_from_slice(b);
}

fn binary_encode_key(k: &MapKey, out: &mut Vec<u8>) {
    match k {
        MapKey::Bool(b) => out.push(*b as u8),
        MapKey::Byte(x) => out.push(*x as u8),
        MapKey::I16(x) => out.extend_from_slice(&x.to_be_bytes()),
        MapKey::I32(x) => out.extend_from_slice(&x.to_be_bytes()),
        MapKey::I64(x) => out.extend_from_slice(&x.to_be_bytes()),
        MapKey::Text(s) => binary_push_bytes(out, s.as_bytes()),
        MapKey::Bytes(b) => binary_push_bytes(out, b),
    }
}

// ---- compact encoding, slice-specialized ----

fn compact_decode_struct(
    value: &mut StructValue,
    r: &mut SliceReader<'_>,
    cfg: &CodecConfig,
    depth: usize,
) -> Result<(), CodecError> {
    value.reset_to_defaults();
    let mut last_id: i16 = 0;
    loop {
        let b = r.u8()?;
        if b == CT_STOP {
            break;
        }
        let ct = b & 0x0F;
        let delta = (b >> 4) as i16;
        let id = if delta == 0 {
            let raw = unzigzag(r.varint()?);
            i16::try_from(raw)
                .map_err(|_| CodecError::Malformed(format!("field id {} out of range", raw)))?
        } else {
            last_id
                .checked_add(delta)
                .ok_or_else(|| CodecError::Malformed("field id delta overflow".into()))?
        };
        last_id = id;
        let header_bool = match ct {
            CT_BOOL_TRUE => Some(true),
            CT_BOOL_FALSE => Some(false),
            _ => None,
        };
        let kind = wire_type_from_compact(ct)
            .ok_or_else(|| CodecError::Malformed(format!("invalid compact type {:#04x}", ct)))?;
        let target = value
            .schema()
            .field_by_id(id)
            .filter(|(_, f)| f.ty.wire_type() == kind)
            .map(|(i, f)| (i, f.ty.clone()));
        match target {
            Some((i, ty)) => {
                let v = match header_bool {
                    Some(bv) => Value::Bool(bv),
                    None => {
                        let set = Arc::clone(value.schema_set());
                        compact_decode_value(&set, &ty, r, cfg, depth + 1)?
                    }
                };
                *value.slot_mut(i) = Some(v);
            }
            None => compact_skip(r, kind, header_bool.is_some(), depth + 1)?,
        }
    }
    check_required(value)
}

fn compact_decode_value(
    set: &Arc<SchemaSet>,
    ty: &FieldType,
    r: &mut SliceReader<'_>,
    cfg: &CodecConfig,
    depth: usize,
) -> Result<Value, CodecError> {
    check_depth(depth)?;
    match ty {
        FieldType::Bool => Ok(Value::Bool(compact_read_bool_elem(r)?)),
        FieldType::Byte => Ok(Value::Byte(r.u8()? as i8)),
        FieldType::I16 => {
            let raw = unzigzag(r.varint()?);
            i16::try_from(raw)
                .map(Value::I16)
                .map_err(|_| CodecError::Malformed(format!("i16 value {} out of range", raw)))
        }
        FieldType::I32 => {
            let raw = unzigzag(r.varint()?);
            i32::try_from(raw)
                .map(Value::I32)
                .map_err(|_| CodecError::Malformed(format!("i32 value {} out of range", raw)))
        }
        FieldType::I64 => Ok(Value::I64(unzigzag(r.varint()?))),
        FieldType::Double => Ok(Value::Double(r.f64_le()?)),
        FieldType::String { text } => {
            let len = compact_read_len(r)?;
            string_value(r.take_declared(len)?, *text, cfg)
        }
        FieldType::Struct(h) => {
            let mut s = StructValue::new(set, *h);
            compact_decode_struct(&mut s, r, cfg, depth)?;
            Ok(Value::Struct(s))
        }
        FieldType::Map { key, value } => {
            let size = compact_read_container_size(r)?;
            let mut map = BTreeMap::new();
            if size > 0 {
                let _types = r.u8()?;
                for _ in 0..size {
                    let k = compact_decode_key(key, r, cfg)?;
                    let v = compact_decode_value(set, value, r, cfg, depth + 1)?;
                    map.insert(k, v);
                }
            }
            Ok(Value::Map(map))
        }
        FieldType::Set(elem) => {
            let (_tag, n) = compact_read_list_header(r)?;
            let mut out = BTreeSet::new();
            for _ in 0..n {
                out.insert(compact_decode_key(elem, r, cfg)?);
            }
            Ok(Value::Set(out))
        }
        FieldType::List(elem) => {
            let (_tag, n) = compact_read_list_header(r)?;
            let mut out = Vec::new();
            for _ in 0..n {
                out.push(compact_decode_value(set, elem, r, cfg, depth + 1)?);
            }
            Ok(Value::List(out))
        }
    }
}

fn compact_read_bool_elem(r: &mut SliceReader<'_>) -> Result<bool, CodecError> {
    match r.u8()? {
        CT_BOOL_TRUE => Ok(true),
        CT_BOOL_FALSE | 0x00 => Ok(false),
        b => Err(CodecError::Malformed(format!(
            "invalid bool element {:#04x}",
            b
        ))),
    }
}

fn compact_read_len(r: &mut SliceReader<'_>) -> Result<usize, CodecError> {
    let len = r.varint()?;
    usize::try_from(len)
        .map_err(|_| CodecError::Malformed(format!("byte-string length {} out of range", len)))
}

fn compact_read_container_size(r: &mut SliceReader<'_>) -> Result<u32, CodecError> {
    let n = r.varint()?;
    u32::try_from(n).map_err(|_| CodecError::Malformed(format!("container size {} out of range", n)))
}

fn compact_read_list_header(r: &mut SliceReader<'_>) -> Result<(WireType, u32), CodecError> {
    let b = r.u8()?;
    let ct = b & 0x0F;
    let elem = wire_type_from_compact(ct)
        .ok_or_else(|| CodecError::Malformed(format!("invalid compact type {:#04x}", ct)))?;
    let short = (b >> 4) as u32;
    let n = if short == 15 {
        compact_read_container_size(r)?
    } else {
        short
    };
    Ok((elem, n))
}

fn compact_decode_key(
    ty: &FieldType,
    r: &mut SliceReader<'_>,
    cfg: &CodecConfig,
) -> Result<MapKey, CodecError> {
    match ty {
        FieldType::Bool => Ok(MapKey::Bool(compact_read_bool_elem(r)?)),
        FieldType::Byte => Ok(MapKey::Byte(r.u8()? as i8)),
        FieldType::I16 => {
            let raw = unzigzag(r.varint()?);
            i16::try_from(raw)
                .map(MapKey::I16)
                .map_err(|_| CodecError::Malformed(format!("i16 value {} out of range", raw)))
        }
        FieldType::I32 => {
            let raw = unzigzag(r.varint()?);
            i32::try_from(raw)
                .map(MapKey::I32)
                .map_err(|_| CodecError::Malformed(format!("i32 value {} out of range", raw)))
        }
        FieldType::I64 => Ok(MapKey::I64(unzigzag(r.varint()?))),
        FieldType::String { text } => {
            let len = compact_read_len(r)?;
            string_key(r.take_declared(len)?, *text, cfg)
        }
        _ => Err(CodecError::Malformed(
            "non-scalar map/set key type".to_string(),
        )),
    }
}

fn compact_skip(
    r: &mut SliceReader<'_>,
    kind: WireType,
    bool_in_header: bool,
    depth: usize,
) -> Result<(), CodecError> {
    check_depth(depth)?;
    match kind {
        WireType::Stop => Err(CodecError::Malformed(
            "STOP tag in value position".to_string(),
        )),
        WireType::Bool => {
            if !bool_in_header {
                r.u8()?;
            }
            Ok(())
        }
        WireType::Byte => r.u8().map(drop),
        WireType::I16 | WireType::I32 | WireType::I64 => r.varint().map(drop),
        WireType::Double => r.take(8).map(drop),
        WireType::String => {
            let len = compact_read_len(r)?;
            r.take_declared(len).map(drop)
        }
        WireType::Struct => {
            loop {
                let b = r.u8()?;
                if b == CT_STOP {
                    break;
                }
                let ct = b & 0x0F;
                if (b >> 4) == 0 {
                    r.varint()?; // long-form field id
                }
                let header_bool = ct == CT_BOOL_TRUE || ct == CT_BOOL_FALSE;
                let kind = wire_type_from_compact(ct).ok_or_else(|| {
                    CodecError::Malformed(format!("invalid compact type {:#04x}", ct))
                })?;
                compact_skip(r, kind, header_bool, depth + 1)?;
            }
            Ok(())
        }
        WireType::Map => {
            let size = compact_read_container_size(r)?;
            if size == 0 {
                return Ok(());
            }
            let types = r.u8()?;
            let key = wire_type_from_compact(types >> 4)
                .ok_or_else(|| CodecError::Malformed("invalid map key type".to_string()))?;
            let value = wire_type_from_compact(types & 0x0F)
                .ok_or_else(|| CodecError::Malformed("invalid map value type".to_string()))?;
            for _ in 0..size {
                compact_skip(r, key, false, depth + 1)?;
                compact_skip(r, value, false, depth + 1)?;
            }
            Ok(())
        }
        WireType::Set | WireType::List => {
            let (elem, n) = compact_read_list_header(r)?;
            for _ in 0..n {
                compact_skip(r, elem, false, depth + 1)?;
            }
            Ok(())
        }
    }
}

fn compact_encode_struct(
    value: &StructValue,
    out: &mut Vec<u8>,
    cfg: &CodecConfig,
    depth: usize,
) -> Result<(), CodecError> {
    let schema = value.schema();
    let mut last_id: i16 = 0;
    for (i, f) in schema.fields().iter().enumerate() {
        match value.slot(i) {
            Some(v) => {
                let ct = match v {
                    Value::Bool(true) => CT_BOOL_TRUE,
                    Value::Bool(false) => CT_BOOL_FALSE,
                    _ => compact_type(f.ty.wire_type()),
                };
                compact_push_field_header(out, ct, f.id, &mut last_id);
                if !matches!(v, Value::Bool(_)) {
                    compact_encode_value(&f.ty, v, out, cfg, depth + 1)?;
                }
            }
            None if f.requiredness == Requiredness::Required => {
                return Err(CodecError::MissingRequiredField {
                    strukt: schema.name.clone(),
                    field: f.name.clone(),
                });
            }
            None => {}
        }
    }
    out.push(CT_STOP);
    Ok(())
}

fn compact_push_field_header(out: &mut Vec<u8>, ct: u8, id: i16, last_id: &mut i16) {
    let delta = id as i32 - *last_id as i32;
    if delta > 0 && delta <= 15 {
        out.push(((delta as u8) << 4) | ct);
    } else {
        out.push(ct);
        push_varint(out, zigzag_i16(id));
    }
    *last_id = id;
}

fn compact_encode_value(
    ty: &FieldType,
    v: &Value,
    out: &mut Vec<u8>,
    cfg: &CodecConfig,
    depth: usize,
) -> Result<(), CodecError> {
    check_depth(depth)?;
    match (ty, v) {
        (FieldType::Bool, Value::Bool(b)) => {
            out.push(if *b { CT_BOOL_TRUE } else { CT_BOOL_FALSE });
            Ok(())
        }
        (FieldType::Byte, Value::Byte(x)) => {
            out.push(*x as u8);
            Ok(())
        }
        (FieldType::I16, Value::I16(x)) => {
            push_varint(out, zigzag_i16(*x));
            Ok(())
        }
        (FieldType::I32, Value::I32(x)) => {
            push_varint(out, zigzag_i32(*x));
            Ok(())
        }
        (FieldType::I64, Value::I64(x)) => {
            push_varint(out, zigzag_i64(*x));
            Ok(())
        }
        (FieldType::Double, Value::Double(x)) => {
            out.extend_from_slice(&x.to_le_bytes());
            Ok(())
        }
        (FieldType::String { .. }, Value::Text(s)) => {
            compact_push_bytes(out, s.as_bytes());
            Ok(())
        }
        (FieldType::String { .. }, Value::Bytes(b)) => {
            compact_push_bytes(out, b);
            Ok(())
        }
        (FieldType::Struct(_), Value::Struct(s)) => compact_encode_struct(s, out, cfg, depth),
        (FieldType::Map { key, value }, Value::Map(m)) => {
            if m.is_empty() {
                push_varint(out, 0);
                return Ok(());
            }
            push_varint(out, m.len() as u64);
            out.push((compact_type(key.wire_type()) << 4) | compact_type(value.wire_type()));
            for (k, item) in m {
                compact_encode_key(k, out);
                compact_encode_value(value, item, out, cfg, depth + 1)?;
            }
            Ok(())
        }
        (FieldType::Set(elem), Value::Set(s)) => {
            compact_push_list_header(out, compact_type(elem.wire_type()), s.len());
            for k in s {
                compact_encode_key(k, out);
            }
            Ok(())
        }
        (FieldType::List(elem), Value::List(items)) => {
            compact_push_list_header(out, compact_type(elem.wire_type()), items.len());
            for item in items {
                compact_encode_value(elem, item, out, cfg, depth + 1)?;
            }
            Ok(())
        }
        _ => Err(CodecError::Malformed(
            "value does not match declared field type".to_string(),
        )),
    }
}

fn compact_push_list_header(out: &mut Vec<u8>, ct: u8, size: usize) {
    if size < 15 {
        out.push(((size as u8) << 4) | ct);
    } else {
        out.push(0xF0 | ct);
        push_varint(out, size as u64);
    }
}

fn compact_push_bytes(out: &mut Vec<u8>, b: &[u8]) {
    push_varint(out, b.len() as u64);
    out.extend_from_slice(b);
}

fn compact_encode_key(k: &MapKey, out: &mut Vec<u8>) {
    match k {
        MapKey::Bool(b) => out.push(if *b { CT_BOOL_TRUE } else { CT_BOOL_FALSE }),
        MapKey::Byte(x) => out.push(*x as u8),
        MapKey::I16(x) => push_varint(out, zigzag_i16(*x)),
        MapKey::I32(x) => push_varint(out, zigzag_i32(*x)),
        MapKey::I64(x) => push_varint(out, zigzag_i64(*x)),
        MapKey::Text(s) => compact_push_bytes(out, s.as_bytes()),
        MapKey::Bytes(b) => compact_push_bytes(out, b),
    }
}
