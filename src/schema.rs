//! Schema model: wire types, field descriptors, and the two-phase
//! register/link build that resolves struct references into handles.

use crate::value::{MapKey, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Wire-level type tag. `Stop` terminates a struct and never describes a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Stop,
    Bool,
    Byte,
    Double,
    I16,
    I32,
    I64,
    String,
    Struct,
    Map,
    Set,
    List,
}

impl WireType {
    /// Tag byte as emitted by the binary encoding.
    pub fn tag(self) -> u8 {
        match self {
            WireType::Stop => 0,
            WireType::Bool => 2,
            WireType::Byte => 3,
            WireType::Double => 4,
            WireType::I16 => 6,
            WireType::I32 => 8,
            WireType::I64 => 10,
            WireType::String => 11,
            WireType::Struct => 12,
            WireType::Map => 13,
            WireType::Set => 14,
            WireType::List => 15,
        }
    }

    /// Inverse of [`WireType::tag`]; unassigned tag bytes are `None`.
    pub fn from_tag(tag: u8) -> Option<WireType> {
        match tag {
            0 => Some(WireType::Stop),
            2 => Some(WireType::Bool),
            3 => Some(WireType::Byte),
            4 => Some(WireType::Double),
            6 => Some(WireType::I16),
            8 => Some(WireType::I32),
            10 => Some(WireType::I64),
            11 => Some(WireType::String),
            12 => Some(WireType::Struct),
            13 => Some(WireType::Map),
            14 => Some(WireType::Set),
            15 => Some(WireType::List),
            _ => None,
        }
    }
}

/// Presence contract of a field after a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requiredness {
    /// Must be set after read; enforced by the post-read validation pass.
    Required,
    /// May be unset; omitted from output when unset.
    Optional,
    /// Neither enforced nor omitted-by-contract; behaves like optional on
    /// read and is written whenever set.
    Default,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate struct name '{0}'")]
    DuplicateStruct(String),
    #[error("duplicate field id {id} in struct {strukt}")]
    DuplicateFieldId { strukt: String, id: i16 },
    #[error("field id {id} in struct {strukt} must be positive")]
    NonPositiveFieldId { strukt: String, id: i16 },
    #[error("unresolved struct reference '{reference}' in struct {strukt}")]
    UnresolvedRef { strukt: String, reference: String },
    #[error("map/set key type of field '{field}' in struct {strukt} must be a scalar")]
    NonScalarKey { strukt: String, field: String },
    #[error("default for field '{field}' of struct {strukt} does not match its declared type")]
    BadDefault { strukt: String, field: String },
    #[error("no field named '{field}' in struct {strukt}")]
    UnknownField { strukt: String, field: String },
    #[error("value shape does not match field '{field}' of struct {strukt}")]
    TypeMismatch { strukt: String, field: String },
}

/// Builder-side type expression. Struct references are by name; they become
/// [`StructHandle`]s when the builder links.
#[derive(Debug, Clone)]
pub enum TypeExpr {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    /// Length-prefixed bytes decoded as UTF-8 text (subject to the
    /// deployment-wide text mode).
    Text,
    /// Length-prefixed raw bytes, never UTF-8 validated.
    Bytes,
    StructRef(String),
    Map(Box<TypeExpr>, Box<TypeExpr>),
    Set(Box<TypeExpr>),
    List(Box<TypeExpr>),
}

/// Builder-side field declaration.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub id: i16,
    pub name: String,
    pub requiredness: Requiredness,
    pub ty: TypeExpr,
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn new(id: i16, name: &str, requiredness: Requiredness, ty: TypeExpr) -> Self {
        FieldDef {
            id,
            name: name.to_string(),
            requiredness,
            ty,
            default: None,
        }
    }

    pub fn required(id: i16, name: &str, ty: TypeExpr) -> Self {
        FieldDef::new(id, name, Requiredness::Required, ty)
    }

    pub fn optional(id: i16, name: &str, ty: TypeExpr) -> Self {
        FieldDef::new(id, name, Requiredness::Optional, ty)
    }

    /// Declared default, applied to fresh instances and on read reset.
    /// Struct-valued defaults are not supported; the value must match the
    /// declared type at link time.
    pub fn with_default(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }
}

/// Index of a struct schema inside its [`SchemaSet`]. Handles allow
/// mutually-recursive schemas without infinitely-sized descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructHandle(pub(crate) usize);

/// Linked field type descriptor: struct references resolved to handles.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String { text: bool },
    Struct(StructHandle),
    Map { key: Box<FieldType>, value: Box<FieldType> },
    Set(Box<FieldType>),
    List(Box<FieldType>),
}

impl FieldType {
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Bool => WireType::Bool,
            FieldType::Byte => WireType::Byte,
            FieldType::I16 => WireType::I16,
            FieldType::I32 => WireType::I32,
            FieldType::I64 => WireType::I64,
            FieldType::Double => WireType::Double,
            FieldType::String { .. } => WireType::String,
            FieldType::Struct(_) => WireType::Struct,
            FieldType::Map { .. } => WireType::Map,
            FieldType::Set(_) => WireType::Set,
            FieldType::List(_) => WireType::List,
        }
    }

    /// Deep shape check: does `v` fit this descriptor?
    pub fn accepts(&self, v: &Value) -> bool {
        match (self, v) {
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Byte, Value::Byte(_)) => true,
            (FieldType::I16, Value::I16(_)) => true,
            (FieldType::I32, Value::I32(_)) => true,
            (FieldType::I64, Value::I64(_)) => true,
            (FieldType::Double, Value::Double(_)) => true,
            (FieldType::String { text: true }, Value::Text(_)) => true,
            // Text fields hold raw bytes when text mode is off, so bytes are
            // always an acceptable shape for a STRING field.
            (FieldType::String { .. }, Value::Bytes(_)) => true,
            (FieldType::Struct(h), Value::Struct(s)) => s.handle() == *h,
            (FieldType::Map { key, value }, Value::Map(m)) => m
                .iter()
                .all(|(k, v)| key.accepts_key(k) && value.accepts(v)),
            (FieldType::Set(elem), Value::Set(s)) => s.iter().all(|k| elem.accepts_key(k)),
            (FieldType::List(elem), Value::List(items)) => items.iter().all(|v| elem.accepts(v)),
            _ => false,
        }
    }

    fn accepts_key(&self, k: &MapKey) -> bool {
        matches!(
            (self, k),
            (FieldType::Bool, MapKey::Bool(_))
                | (FieldType::Byte, MapKey::Byte(_))
                | (FieldType::I16, MapKey::I16(_))
                | (FieldType::I32, MapKey::I32(_))
                | (FieldType::I64, MapKey::I64(_))
                | (FieldType::String { text: true }, MapKey::Text(_))
                | (FieldType::String { .. }, MapKey::Bytes(_))
        )
    }

    fn is_scalar_key(&self) -> bool {
        matches!(
            self,
            FieldType::Bool
                | FieldType::Byte
                | FieldType::I16
                | FieldType::I32
                | FieldType::I64
                | FieldType::String { .. }
        )
    }
}

/// Linked field descriptor.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub id: i16,
    pub name: String,
    pub requiredness: Requiredness,
    pub ty: FieldType,
    pub default: Option<Value>,
}

/// Linked schema of one struct type: fields sorted by id, id lookup table.
#[derive(Debug)]
pub struct StructSchema {
    pub name: String,
    fields: Vec<FieldSchema>,
    by_id: HashMap<i16, usize>,
}

impl StructSchema {
    /// Fields in declared id order (the order the writer emits them).
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field_by_id(&self, id: i16) -> Option<(usize, &FieldSchema)> {
        self.by_id.get(&id).map(|&i| (i, &self.fields[i]))
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Immutable, process-wide set of linked struct schemas. Built once by
/// [`SchemaBuilder::link`], shared read-only via `Arc` thereafter.
#[derive(Debug)]
pub struct SchemaSet {
    structs: Vec<StructSchema>,
    by_name: HashMap<String, StructHandle>,
}

impl SchemaSet {
    pub fn get(&self, h: StructHandle) -> &StructSchema {
        &self.structs[h.0]
    }

    pub fn lookup(&self, name: &str) -> Option<StructHandle> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = StructHandle> {
        (0..self.structs.len()).map(StructHandle)
    }
}

/// Two-phase schema construction: `define` registers struct layouts with
/// by-name references, `link` resolves every reference in one pass. A
/// reference that no registered struct satisfies fails the link; callers
/// treat that as fatal initialization.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    defs: Vec<(String, Vec<FieldDef>)>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        SchemaBuilder::default()
    }

    pub fn define(mut self, name: &str, fields: Vec<FieldDef>) -> Self {
        self.defs.push((name.to_string(), fields));
        self
    }

    /// Resolve all struct references and freeze the set.
    pub fn link(self) -> Result<Arc<SchemaSet>, SchemaError> {
        let mut by_name = HashMap::new();
        for (i, (name, _)) in self.defs.iter().enumerate() {
            if by_name.insert(name.clone(), StructHandle(i)).is_some() {
                return Err(SchemaError::DuplicateStruct(name.clone()));
            }
        }

        let mut structs = Vec::with_capacity(self.defs.len());
        for (name, defs) in &self.defs {
            let mut fields = Vec::with_capacity(defs.len());
            for def in defs {
                if def.id <= 0 {
                    return Err(SchemaError::NonPositiveFieldId {
                        strukt: name.clone(),
                        id: def.id,
                    });
                }
                let ty = resolve_type(&def.ty, &by_name, name, &def.name)?;
                if let Some(ref default) = def.default {
                    if !ty.accepts(default) || matches!(default, Value::Struct(_)) {
                        return Err(SchemaError::BadDefault {
                            strukt: name.clone(),
                            field: def.name.clone(),
                        });
                    }
                }
                fields.push(FieldSchema {
                    id: def.id,
                    name: def.name.clone(),
                    requiredness: def.requiredness,
                    ty,
                    default: def.default.clone(),
                });
            }
            fields.sort_by_key(|f| f.id);
            let mut by_id = HashMap::new();
            for (i, f) in fields.iter().enumerate() {
                if by_id.insert(f.id, i).is_some() {
                    return Err(SchemaError::DuplicateFieldId {
                        strukt: name.clone(),
                        id: f.id,
                    });
                }
            }
            structs.push(StructSchema {
                name: name.clone(),
                fields,
                by_id,
            });
        }

        Ok(Arc::new(SchemaSet { structs, by_name }))
    }
}

fn resolve_type(
    expr: &TypeExpr,
    by_name: &HashMap<String, StructHandle>,
    strukt: &str,
    field: &str,
) -> Result<FieldType, SchemaError> {
    Ok(match expr {
        TypeExpr::Bool => FieldType::Bool,
        TypeExpr::Byte => FieldType::Byte,
        TypeExpr::I16 => FieldType::I16,
        TypeExpr::I32 => FieldType::I32,
        TypeExpr::I64 => FieldType::I64,
        TypeExpr::Double => FieldType::Double,
        TypeExpr::Text => FieldType::String { text: true },
        TypeExpr::Bytes => FieldType::String { text: false },
        TypeExpr::StructRef(name) => {
            let h = by_name
                .get(name)
                .copied()
                .ok_or_else(|| SchemaError::UnresolvedRef {
                    strukt: strukt.to_string(),
                    reference: name.clone(),
                })?;
            FieldType::Struct(h)
        }
        TypeExpr::Map(k, v) => {
            let key = resolve_type(k, by_name, strukt, field)?;
            if !key.is_scalar_key() {
                return Err(SchemaError::NonScalarKey {
                    strukt: strukt.to_string(),
                    field: field.to_string(),
                });
            }
            let value = resolve_type(v, by_name, strukt, field)?;
            FieldType::Map {
                key: Box::new(key),
                value: Box::new(value),
            }
        }
        TypeExpr::Set(elem) => {
            let elem = resolve_type(elem, by_name, strukt, field)?;
            if !elem.is_scalar_key() {
                return Err(SchemaError::NonScalarKey {
                    strukt: strukt.to_string(),
                    field: field.to_string(),
                });
            }
            FieldType::Set(Box::new(elem))
        }
        TypeExpr::List(elem) => {
            FieldType::List(Box::new(resolve_type(elem, by_name, strukt, field)?))
        }
    })
}
