//! Runtime values: field values, scalar map keys, and struct instances with
//! presence-tagged slots.

use crate::schema::{FieldSchema, SchemaError, SchemaSet, StructHandle, StructSchema};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A single field value (scalar or compound).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Double(f64),
    /// UTF-8 text (a STRING field read with text mode on).
    Text(String),
    /// Raw bytes (a STRING field declared binary, or text mode off).
    Bytes(Vec<u8>),
    Struct(StructValue),
    Map(BTreeMap<MapKey, Value>),
    Set(BTreeSet<MapKey>),
    List(Vec<Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(x) => Some(*x as i64),
            Value::I16(x) => Some(*x as i64),
            Value::I32(x) => Some(*x as i64),
            Value::I64(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<MapKey, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<MapKey>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}

/// Scalar map/set key. Ordered so container iteration (and the diagnostic
/// dump) is deterministic; duplicate keys on read overwrite earlier entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    Byte(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl MapKey {
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Byte(x) => Value::Byte(*x),
            MapKey::I16(x) => Value::I16(*x),
            MapKey::I32(x) => Value::I32(*x),
            MapKey::I64(x) => Value::I64(*x),
            MapKey::Text(s) => Value::Text(s.clone()),
            MapKey::Bytes(b) => Value::Bytes(b.clone()),
        }
    }
}

/// One struct instance: a presence-tagged slot per schema field. Fresh
/// instances carry declared defaults; everything else is unset. Unset is
/// distinct from any present value (an unset text field is not an empty
/// string).
#[derive(Debug, Clone)]
pub struct StructValue {
    set: Arc<SchemaSet>,
    handle: StructHandle,
    slots: Vec<Option<Value>>,
}

impl StructValue {
    /// New instance of the given struct type with defaults applied.
    pub fn new(set: &Arc<SchemaSet>, handle: StructHandle) -> StructValue {
        let schema = set.get(handle);
        let slots = schema.fields().iter().map(|f| f.default.clone()).collect();
        StructValue {
            set: Arc::clone(set),
            handle,
            slots,
        }
    }

    pub fn handle(&self) -> StructHandle {
        self.handle
    }

    pub fn schema(&self) -> &StructSchema {
        self.set.get(self.handle)
    }

    pub fn schema_set(&self) -> &Arc<SchemaSet> {
        &self.set
    }

    /// Value of the named field, or `None` when unset (or unknown).
    pub fn get(&self, name: &str) -> Option<&Value> {
        let i = self.schema().field_index(name)?;
        self.slots[i].as_ref()
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set the named field; the value must match the field's declared type.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), SchemaError> {
        let schema = self.set.get(self.handle);
        let i = schema
            .field_index(name)
            .ok_or_else(|| SchemaError::UnknownField {
                strukt: schema.name.clone(),
                field: name.to_string(),
            })?;
        if !schema.fields()[i].ty.accepts(&value) {
            return Err(SchemaError::TypeMismatch {
                strukt: schema.name.clone(),
                field: name.to_string(),
            });
        }
        self.slots[i] = Some(value);
        Ok(())
    }

    /// Unset the named field.
    pub fn clear(&mut self, name: &str) -> Result<(), SchemaError> {
        let schema = self.set.get(self.handle);
        let i = schema
            .field_index(name)
            .ok_or_else(|| SchemaError::UnknownField {
                strukt: schema.name.clone(),
                field: name.to_string(),
            })?;
        self.slots[i] = None;
        Ok(())
    }

    /// Put every slot back to its declared default (or unset). The reader
    /// calls this on struct begin, so fields absent from the wire end up
    /// default-or-unset rather than keeping stale values.
    pub(crate) fn reset_to_defaults(&mut self) {
        let schema = self.set.get(self.handle);
        for (slot, field) in self.slots.iter_mut().zip(schema.fields()) {
            *slot = field.default.clone();
        }
    }

    pub(crate) fn slot(&self, i: usize) -> &Option<Value> {
        &self.slots[i]
    }

    pub(crate) fn slot_mut(&mut self, i: usize) -> &mut Option<Value> {
        &mut self.slots[i]
    }

    /// Pairs of (field schema, slot) in declared id order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldSchema, &Option<Value>)> {
        self.schema().fields().iter().zip(self.slots.iter())
    }
}

/// Deep structural equality: same struct type and pairwise-equal slots,
/// unset included.
impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && self.slots == other.slots
    }
}
