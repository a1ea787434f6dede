//! Generic reader/writer: the schema-driven field loop, the skip routine for
//! unknown fields, required-field validation, and the dispatch that hands
//! whole structs to a specialized codec when protocol and transport allow.

use crate::accel::AccelTable;
use crate::protocol::{FieldHeader, Protocol};
use crate::schema::{FieldType, Requiredness, SchemaSet, WireType};
use crate::value::{MapKey, StructValue, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Nested containers/structs deeper than this are rejected as malformed
/// rather than risking the call stack. Real schemas sit nowhere near it.
pub(crate) const MAX_NESTING_DEPTH: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("malformed wire data: {0}")]
    Malformed(String),
    #[error("required field '{field}' was not found in serialized data, struct {strukt}")]
    MissingRequiredField { strukt: String, field: String },
}

/// Immutable per-deployment codec configuration, passed explicitly to every
/// read/write call. `text_mode` turns STRING fields declared as text into
/// UTF-8-validated [`Value::Text`]; off, their bytes pass through unvalidated.
/// `accel` is the table of registered specialized codecs; `None` disables the
/// accelerated path entirely.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub text_mode: bool,
    pub accel: Option<AccelTable>,
}

impl CodecConfig {
    pub fn new() -> Self {
        CodecConfig {
            text_mode: true,
            accel: None,
        }
    }

    /// Text mode on, specialized codecs registered for every struct in `set`.
    pub fn accelerated(set: &SchemaSet) -> Self {
        CodecConfig {
            text_mode: true,
            accel: Some(AccelTable::all(set)),
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig::new()
    }
}

impl StructValue {
    /// Decode one struct off the protocol into this instance. Slots are reset
    /// to declared defaults first; unknown and type-mismatched fields are
    /// skipped; required fields are validated once the STOP tag is reached.
    /// On error the cursor position is unspecified and the partial instance
    /// must not be used.
    pub fn read<P: Protocol>(&mut self, prot: &mut P, cfg: &CodecConfig) -> Result<(), CodecError> {
        if let Some(enc) = prot.accel_encoding() {
            if cfg.accel.as_ref().map_or(false, |t| t.contains(self.handle())) {
                if let Some(buf) = prot.direct_read_slice() {
                    let consumed = crate::accel::decode(self, buf, enc, cfg)?;
                    prot.direct_advance(consumed);
                    return Ok(());
                }
                tracing::trace!(
                    strukt = %self.schema().name,
                    "transport lacks direct buffer access, using generic decode"
                );
            }
        }
        self.read_fields(prot, cfg, 0)
    }

    /// Encode this struct onto the protocol: set fields in declared id order,
    /// then STOP. Unset optional fields are omitted; an unset required field
    /// is a caller error.
    pub fn write<P: Protocol>(&self, prot: &mut P, cfg: &CodecConfig) -> Result<(), CodecError> {
        if let Some(enc) = prot.accel_encoding() {
            if cfg.accel.as_ref().map_or(false, |t| t.contains(self.handle())) {
                if let Some(out) = prot.direct_write_buf() {
                    return crate::accel::encode(self, out, enc, cfg);
                }
                tracing::trace!(
                    strukt = %self.schema().name,
                    "transport lacks direct buffer access, using generic encode"
                );
            }
        }
        self.write_fields(prot, cfg, 0)
    }

    pub(crate) fn read_fields<P: Protocol>(
        &mut self,
        prot: &mut P,
        cfg: &CodecConfig,
        depth: usize,
    ) -> Result<(), CodecError> {
        prot.read_struct_begin()?;
        self.reset_to_defaults();
        loop {
            match prot.read_field_begin()? {
                FieldHeader::Stop => break,
                FieldHeader::Field { kind, id } => {
                    // Schema wins over the stream: an id we know with a tag we
                    // don't expect is treated as unknown, the tag only sizing
                    // the skip.
                    let target = self
                        .schema()
                        .field_by_id(id)
                        .filter(|(_, f)| f.ty.wire_type() == kind)
                        .map(|(i, f)| (i, f.ty.clone()));
                    match target {
                        Some((i, ty)) => {
                            let set = Arc::clone(self.schema_set());
                            let v = decode_value(&set, &ty, prot, cfg, depth + 1)?;
                            *self.slot_mut(i) = Some(v);
                        }
                        None => {
                            tracing::trace!(field_id = id, kind = ?kind, "skipping field");
                            skip_value(prot, kind, depth + 1)?;
                        }
                    }
                    prot.read_field_end()?;
                }
            }
        }
        prot.read_struct_end()?;
        check_required(self)
    }

    pub(crate) fn write_fields<P: Protocol>(
        &self,
        prot: &mut P,
        cfg: &CodecConfig,
        depth: usize,
    ) -> Result<(), CodecError> {
        let schema = self.schema();
        prot.write_struct_begin(&schema.name)?;
        for (i, f) in schema.fields().iter().enumerate() {
            match self.slot(i) {
                Some(v) => {
                    prot.write_field_begin(f.ty.wire_type(), f.id)?;
                    encode_value(&f.ty, v, prot, cfg, depth + 1)?;
                    prot.write_field_end()?;
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
        prot.write_field_stop()?;
        prot.write_struct_end()
    }
}

/// Post-read validation pass: the first required field left unset fails the
/// whole read. Never invoked before write.
pub fn check_required(value: &StructValue) -> Result<(), CodecError> {
    for (f, slot) in value.fields() {
        if f.requiredness == Requiredness::Required && slot.is_none() {
            tracing::debug!(
                strukt = %value.schema().name,
                field = %f.name,
                "required field missing after read"
            );
            return Err(CodecError::MissingRequiredField {
                strukt: value.schema().name.clone(),
                field: f.name.clone(),
            });
        }
    }
    Ok(())
}

/// Skip one value of the given wire type without interpreting it, nested
/// containers and structs included. Unknown fields route through here.
pub fn skip<P: Protocol>(prot: &mut P, kind: WireType) -> Result<(), CodecError> {
    skip_value(prot, kind, 0)
}

pub(crate) fn check_depth(depth: usize) -> Result<(), CodecError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(CodecError::Malformed(
            "nesting depth limit exceeded".to_string(),
        ));
    }
    Ok(())
}

fn decode_value<P: Protocol>(
    set: &Arc<SchemaSet>,
    ty: &FieldType,
    prot: &mut P,
    cfg: &CodecConfig,
    depth: usize,
) -> Result<Value, CodecError> {
    check_depth(depth)?;
    match ty {
        FieldType::Bool => Ok(Value::Bool(prot.read_bool()?)),
        FieldType::Byte => Ok(Value::Byte(prot.read_byte()?)),
        FieldType::I16 => Ok(Value::I16(prot.read_i16()?)),
        FieldType::I32 => Ok(Value::I32(prot.read_i32()?)),
        FieldType::I64 => Ok(Value::I64(prot.read_i64()?)),
        FieldType::Double => Ok(Value::Double(prot.read_double()?)),
        FieldType::String { text } => decode_string(*text, prot, cfg),
        FieldType::Struct(h) => {
            let mut s = StructValue::new(set, *h);
            s.read_fields(prot, cfg, depth)?;
            Ok(Value::Struct(s))
        }
        FieldType::Map { key, value } => {
            let header = prot.read_map_begin()?;
            let mut map = BTreeMap::new();
            if header.size >= 0 {
                for _ in 0..header.size {
                    let k = decode_key(key, prot, cfg)?;
                    let v = decode_value(set, value, prot, cfg, depth + 1)?;
                    map.insert(k, v);
                }
            } else {
                while prot.read_map_has_next()? {
                    let k = decode_key(key, prot, cfg)?;
                    let v = decode_value(set, value, prot, cfg, depth + 1)?;
                    map.insert(k, v);
                }
            }
            prot.read_map_end()?;
            Ok(Value::Map(map))
        }
        FieldType::Set(elem) => {
            let (_elem_tag, n) = prot.read_set_begin()?;
            let mut out = BTreeSet::new();
            for _ in 0..n {
                out.insert(decode_key(elem, prot, cfg)?);
            }
            prot.read_set_end()?;
            Ok(Value::Set(out))
        }
        FieldType::List(elem) => {
            let (_elem_tag, n) = prot.read_list_begin()?;
            let mut out = Vec::new();
            for _ in 0..n {
                out.push(decode_value(set, elem, prot, cfg, depth + 1)?);
            }
            prot.read_list_end()?;
            Ok(Value::List(out))
        }
    }
}

fn decode_string<P: Protocol>(
    text: bool,
    prot: &mut P,
    cfg: &CodecConfig,
) -> Result<Value, CodecError> {
    let raw = prot.read_bytes()?;
    if text && cfg.text_mode {
        let s = String::from_utf8(raw)
            .map_err(|e| CodecError::Malformed(format!("invalid UTF-8 in text field: {}", e)))?;
        Ok(Value::Text(s))
    } else {
        Ok(Value::Bytes(raw))
    }
}

fn decode_key<P: Protocol>(
    ty: &FieldType,
    prot: &mut P,
    cfg: &CodecConfig,
) -> Result<MapKey, CodecError> {
    match ty {
        FieldType::Bool => Ok(MapKey::Bool(prot.read_bool()?)),
        FieldType::Byte => Ok(MapKey::Byte(prot.read_byte()?)),
        FieldType::I16 => Ok(MapKey::I16(prot.read_i16()?)),
        FieldType::I32 => Ok(MapKey::I32(prot.read_i32()?)),
        FieldType::I64 => Ok(MapKey::I64(prot.read_i64()?)),
        FieldType::String { text } => {
            let raw = prot.read_bytes()?;
            if *text && cfg.text_mode {
                let s = String::from_utf8(raw).map_err(|e| {
                    CodecError::Malformed(format!("invalid UTF-8 in text key: {}", e))
                })?;
                Ok(MapKey::Text(s))
            } else {
                Ok(MapKey::Bytes(raw))
            }
        }
        // The linker rejects non-scalar key types.
        _ => Err(CodecError::Malformed(
            "non-scalar map/set key type".to_string(),
        )),
    }
}

fn encode_value<P: Protocol>(
    ty: &FieldType,
    v: &Value,
    prot: &mut P,
    cfg: &CodecConfig,
    depth: usize,
) -> Result<(), CodecError> {
    check_depth(depth)?;
    match (ty, v) {
        (FieldType::Bool, Value::Bool(b)) => prot.write_bool(*b),
        (FieldType::Byte, Value::Byte(x)) => prot.write_byte(*x),
        (FieldType::I16, Value::I16(x)) => prot.write_i16(*x),
        (FieldType::I32, Value::I32(x)) => prot.write_i32(*x),
        (FieldType::I64, Value::I64(x)) => prot.write_i64(*x),
        (FieldType::Double, Value::Double(x)) => prot.write_double(*x),
        (FieldType::String { .. }, Value::Text(s)) => prot.write_bytes(s.as_bytes()),
        (FieldType::String { .. }, Value::Bytes(b)) => prot.write_bytes(b),
        (FieldType::Struct(_), Value::Struct(s)) => s.write_fields(prot, cfg, depth),
        (FieldType::Map { key, value }, Value::Map(m)) => {
            prot.write_map_begin(key.wire_type(), value.wire_type(), m.len())?;
            for (k, item) in m {
                encode_key(k, prot)?;
                encode_value(value, item, prot, cfg, depth + 1)?;
            }
            prot.write_map_end()
        }
        (FieldType::Set(elem), Value::Set(s)) => {
            prot.write_set_begin(elem.wire_type(), s.len())?;
            for k in s {
                encode_key(k, prot)?;
            }
            prot.write_set_end()
        }
        (FieldType::List(elem), Value::List(items)) => {
            prot.write_list_begin(elem.wire_type(), items.len())?;
            for item in items {
                encode_value(elem, item, prot, cfg, depth + 1)?;
            }
            prot.write_list_end()
        }
        _ => Err(CodecError::Malformed(
            "value does not match declared field type".to_string(),
        )),
    }
}

fn encode_key<P: Protocol>(k: &MapKey, prot: &mut P) -> Result<(), CodecError> {
    match k {
        MapKey::Bool(b) => prot.write_bool(*b),
        MapKey::Byte(x) => prot.write_byte(*x),
        MapKey::I16(x) => prot.write_i16(*x),
        MapKey::I32(x) => prot.write_i32(*x),
        MapKey::I64(x) => prot.write_i64(*x),
        MapKey::Text(s) => prot.write_bytes(s.as_bytes()),
        MapKey::Bytes(b) => prot.write_bytes(b),
    }
}

fn skip_value<P: Protocol>(prot: &mut P, kind: WireType, depth: usize) -> Result<(), CodecError> {
    check_depth(depth)?;
    match kind {
        WireType::Stop => Err(CodecError::Malformed(
            "STOP tag in value position".to_string(),
        )),
        WireType::Bool => prot.read_bool().map(drop),
        WireType::Byte => prot.read_byte().map(drop),
        WireType::I16 => prot.read_i16().map(drop),
        WireType::I32 => prot.read_i32().map(drop),
        WireType::I64 => prot.read_i64().map(drop),
        WireType::Double => prot.read_double().map(drop),
        WireType::String => prot.read_bytes().map(drop),
        WireType::Struct => {
            prot.read_struct_begin()?;
            loop {
                match prot.read_field_begin()? {
                    FieldHeader::Stop => break,
                    FieldHeader::Field { kind, .. } => {
                        skip_value(prot, kind, depth + 1)?;
                        prot.read_field_end()?;
                    }
                }
            }
            prot.read_struct_end()
        }
        WireType::Map => {
            let header = prot.read_map_begin()?;
            if header.size >= 0 {
                for _ in 0..header.size {
                    skip_value(prot, header.key, depth + 1)?;
                    skip_value(prot, header.value, depth + 1)?;
                }
            } else {
                while prot.read_map_has_next()? {
                    skip_value(prot, header.key, depth + 1)?;
                    skip_value(prot, header.value, depth + 1)?;
                }
            }
            prot.read_map_end()
        }
        WireType::Set => {
            let (elem, n) = prot.read_set_begin()?;
            for _ in 0..n {
                skip_value(prot, elem, depth + 1)?;
            }
            prot.read_set_end()
        }
        WireType::List => {
            let (elem, n) = prot.read_list_begin()?;
            for _ in 0..n {
                skip_value(prot, elem, depth + 1)?;
            }
            prot.read_list_end()
        }
    }
}
