//! Dynamic representation of font tables while they are being merged
//!
//! Each table is lifted out of its binary form into an [`Object`]: a class
//! name plus an ordered map of named fields. Field names follow the
//! OpenType table field naming used by the merge rules. A field that an
//! instance does not have is simply missing from the map, and reducers see it
//! as `None`.

use std::fmt;

use indexmap::IndexMap;
use read_fonts::types::Tag;

use crate::{
    MergeError, Result,
    glyph_order::GlyphName,
    layout::{FeatureRef, LookupRef},
    tables::glyf::Outline,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Tag(Tag),
    Bytes(Vec<u8>),
    Glyph(GlyphName),
    List(Vec<Value>),
    /// Per-glyph data keyed by (unified) glyph name
    Dict(IndexMap<GlyphName, Value>),
    /// Codepoint to glyph mapping of a cmap subtable
    CharMap(IndexMap<u32, GlyphName>),
    Object(Object),
    Feature(FeatureRef),
    Lookup(LookupRef),
    Outline(Box<Outline>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<Tag> {
        match self {
            Value::Tag(tag) => Some(*tag),
            _ => None,
        }
    }

    pub fn as_glyph(&self) -> Option<&GlyphName> {
        match self {
            Value::Glyph(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Tag(_) => "tag",
            Value::Bytes(_) => "bytes",
            Value::Glyph(_) => "glyph",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::CharMap(_) => "charmap",
            Value::Object(_) => "object",
            Value::Feature(_) => "feature",
            Value::Lookup(_) => "lookup",
            Value::Outline(_) => "outline",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Tag(tag) => write!(f, "'{tag}'"),
            Value::Glyph(name) => write!(f, "{name}"),
            Value::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::List(items) => write!(f, "<list of {}>", items.len()),
            Value::Dict(map) => write!(f, "<dict of {}>", map.len()),
            Value::CharMap(map) => write!(f, "<charmap of {}>", map.len()),
            Value::Object(obj) => write!(f, "<{}>", obj.class()),
            Value::Feature(r) => write!(f, "{r:?}"),
            Value::Lookup(r) => write!(f, "{r:?}"),
            Value::Outline(_) => f.write_str("<outline>"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Tag> for Value {
    fn from(tag: Tag) -> Self {
        Value::Tag(tag)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl From<GlyphName> for Value {
    fn from(name: GlyphName) -> Self {
        Value::Glyph(name)
    }
}

/// One instance of a table or sub-table
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    class: &'static str,
    fields: IndexMap<&'static str, Value>,
}

impl Object {
    pub fn new(class: &'static str) -> Self {
        Self { class, fields: IndexMap::new() }
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    /// Builder-style field assignment
    pub fn with(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    /// Builder-style assignment that leaves the field missing for `None`
    pub fn with_opt(mut self, field: &'static str, value: Option<impl Into<Value>>) -> Self {
        if let Some(value) = value {
            self.fields.insert(field, value.into());
        }
        self
    }

    pub fn set(&mut self, field: &'static str, value: impl Into<Value>) {
        self.fields.insert(field, value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }

    pub fn fields_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut Value)> + '_ {
        self.fields.iter_mut().map(|(name, value)| (*name, value))
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_int)
    }

    pub fn tag(&self, field: &str) -> Option<Tag> {
        self.get(field).and_then(Value::as_tag)
    }

    pub fn list(&self, field: &str) -> Option<&[Value]> {
        self.get(field).and_then(Value::as_list)
    }

    pub fn list_mut(&mut self, field: &str) -> Option<&mut Vec<Value>> {
        match self.get_mut(field) {
            Some(Value::List(items)) => Some(items),
            _ => None,
        }
    }

    pub fn object(&self, field: &str) -> Option<&Object> {
        self.get(field).and_then(Value::as_object)
    }

    pub fn object_mut(&mut self, field: &str) -> Option<&mut Object> {
        self.get_mut(field).and_then(Value::as_object_mut)
    }

    pub fn dict(&self, field: &str) -> Option<&IndexMap<GlyphName, Value>> {
        match self.get(field) {
            Some(Value::Dict(map)) => Some(map),
            _ => None,
        }
    }

    pub fn type_mismatch(&self, field: &str) -> MergeError {
        MergeError::TypeMismatch { class: self.class.to_string(), field: field.to_string() }
    }

    /// An integer field that lowering cannot do without
    pub fn require_int(&self, field: &str) -> Result<i64> {
        self.int(field).ok_or_else(|| self.type_mismatch(field))
    }

    /// An integer field narrowed to the width it is stored with on disk
    pub fn require<T: TryFrom<i64>>(&self, field: &str) -> Result<T> {
        T::try_from(self.require_int(field)?).map_err(|_| self.type_mismatch(field))
    }

    /// Like [`Object::require`] but for version-dependent fields
    pub fn optional<T: TryFrom<i64>>(&self, field: &str) -> Result<Option<T>> {
        self.int(field)
            .map(|v| T::try_from(v).map_err(|_| self.type_mismatch(field)))
            .transpose()
    }
}
