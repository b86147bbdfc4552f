//! Dynamic tabular schema shared by the vectors and rasters attribute tables: every row
//! carries a geometry plus a set of named, dynamically typed fields instead of a compile-time
//! struct, since the set of attribute columns is only known at runtime (defined by whatever
//! connector a user builds).

use std::collections::BTreeMap;

/// The kind of value a [`Field`] carries. Mirrors the small set of primitives GDAL/OGR field
/// types and GeoJSON properties can both represent losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
}

/// A single typed attribute value. `Null` represents an absent/unset value for a field that
/// is otherwise declared in the schema.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Field {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl Field {
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Field::String(_) => Some(FieldType::String),
            Field::Integer(_) => Some(FieldType::Integer),
            Field::Float(_) => Some(FieldType::Float),
            Field::Boolean(_) => Some(FieldType::Boolean),
            Field::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Field::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Field::Float(v) => Some(*v),
            Field::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Field::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::String(value)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::String(value.to_string())
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Integer(value)
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Float(value)
    }
}

impl From<bool> for Field {
    fn from(value: bool) -> Self {
        Field::Boolean(value)
    }
}

/// Name and declared type of a single schema column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldInfo {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldInfo {
            name: name.into(),
            field_type,
        }
    }
}

/// The set of attribute columns declared for a table. Schemas are additive: adding a row
/// whose fields are not yet declared extends the schema (see `Schema::widen`), mirroring how
/// a new connector attribute column gets created the first time it is assigned.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Schema {
    fields: Vec<FieldInfo>,
}

impl Schema {
    pub fn new(fields: Vec<FieldInfo>) -> Self {
        Schema { fields }
    }

    pub fn empty() -> Self {
        Schema::default()
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Adds `name` to the schema with `field_type` if it is not already present. Returns
    /// `true` if the schema was extended.
    pub fn widen(&mut self, name: &str, field_type: FieldType) -> bool {
        if self.contains(name) {
            return false;
        }
        self.fields.push(FieldInfo::new(name, field_type));
        true
    }
}

/// One row's worth of attribute values, keyed by field name. Kept as a sorted map so
/// serialized rows are deterministic (important for the on-disk GeoJSON dumps to diff cleanly).
pub type Attributes = BTreeMap<String, Field>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_adds_new_field_once() {
        let mut schema = Schema::empty();
        assert!(schema.widen("name", FieldType::String));
        assert!(!schema.widen("name", FieldType::String));
        assert_eq!(schema.fields().len(), 1);
    }

    #[test]
    fn field_conversions() {
        let f = Field::from(42i64);
        assert_eq!(f.as_f64(), Some(42.0));
        assert_eq!(f.as_i64(), Some(42));
        assert_eq!(f.as_str(), None);
    }
}
