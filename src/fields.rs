//! Schema-less field values.
//!
//! Front matter, record entries and site metadata all carry arbitrary
//! key/value data. Instead of passing untyped `serde_yaml::Value`s around, every
//! value is normalized into [`FieldValue`], a tagged union that the graph and
//! the query layer can reason about:
//!
//! | Variant | Source |
//! |---|---|
//! | `Null`, `Bool`, `Int`, `Float`, `String` | YAML/JSON/TOML scalars |
//! | `List` | sequences |
//! | `Map` | nested mappings (keys are always strings) |
//! | `Reference` | produced at graph assembly, never parsed |
//!
//! Deserialization rejects duplicate keys inside a single mapping; a record
//! entry with `title:` twice is a parse error, not a silent overwrite.

use crate::types::NodeId;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// String-keyed map of field values.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A weak, id-based link to another node.
///
/// `target` is `None` when assembly could not resolve `raw`. The link is kept
/// so a query that needs it can fail with a precise error.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// The value as written by the author (e.g. `./cover.jpg`).
    pub raw: String,
    /// Collection the target is expected to live in.
    pub collection: String,
    pub target: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<FieldValue>),
    Map(FieldMap),
    Reference(Reference),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Short name of the variant, for schemas and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Int(_) | FieldValue::Float(_) => "number",
            FieldValue::String(_) => "string",
            FieldValue::List(_) => "list",
            FieldValue::Map(_) => "map",
            FieldValue::Reference(_) => "reference",
        }
    }

    /// Rank used to order values of different types (nulls sort last).
    fn type_rank(&self) -> u8 {
        match self {
            FieldValue::Bool(_) => 0,
            FieldValue::Int(_) | FieldValue::Float(_) => 1,
            FieldValue::String(_) => 2,
            FieldValue::Reference(_) => 3,
            FieldValue::List(_) => 4,
            FieldValue::Map(_) => 5,
            FieldValue::Null => 6,
        }
    }

    /// Total order used by query sorting.
    ///
    /// Numbers compare numerically across `Int`/`Float`, strings
    /// lexicographically, lists element-wise. Values of different types are
    /// ordered by type, with `Null` always last.
    pub fn total_cmp(&self, other: &FieldValue) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Reference(a), Reference(b)) => a.raw.cmp(&b.raw),
            (List(a), List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Map(a), Map(b)) => a.len().cmp(&b.len()),
            (Null, Null) => Ordering::Equal,
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Equality used by query filters: `Int(1)` matches `Float(1.0)`.
    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Float(b)) | (FieldValue::Float(b), FieldValue::Int(a)) => {
                (*a as f64) == *b
            }
            _ => self == other,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Int(n)
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::Int(n as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Float(n)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(m: FieldMap) -> Self {
        FieldValue::Map(m)
    }
}

impl From<toml::Value> for FieldValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => FieldValue::String(s),
            toml::Value::Integer(n) => FieldValue::Int(n),
            toml::Value::Float(n) => FieldValue::Float(n),
            toml::Value::Boolean(b) => FieldValue::Bool(b),
            toml::Value::Datetime(d) => FieldValue::String(d.to_string()),
            toml::Value::Array(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from).collect())
            }
            toml::Value::Table(table) => FieldValue::Map(
                table
                    .into_iter()
                    .map(|(k, v)| (k, FieldValue::from(v)))
                    .collect(),
            ),
        }
    }
}

// =============================================================================
// Serde
// =============================================================================

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Int(n) => serializer.serialize_i64(*n),
            FieldValue::Float(n) => serializer.serialize_f64(*n),
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FieldValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            // Links serialize as the target id; dangling links as null.
            FieldValue::Reference(r) => match &r.target {
                Some(id) => serializer.serialize_str(id.as_str()),
                None => serializer.serialize_unit(),
            },
        }
    }
}

struct FieldValueVisitor;

impl<'de> Visitor<'de> for FieldValueVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a scalar, sequence or string-keyed mapping")
    }

    fn visit_bool<E>(self, v: bool) -> Result<FieldValue, E> {
        Ok(FieldValue::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<FieldValue, E> {
        Ok(FieldValue::Int(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<FieldValue, E> {
        Ok(i64::try_from(v)
            .map(FieldValue::Int)
            .unwrap_or(FieldValue::Float(v as f64)))
    }

    fn visit_f64<E>(self, v: f64) -> Result<FieldValue, E> {
        Ok(FieldValue::Float(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<FieldValue, E> {
        Ok(FieldValue::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<FieldValue, E> {
        Ok(FieldValue::String(v))
    }

    fn visit_unit<E>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Null)
    }

    fn visit_none<E>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<FieldValue, D::Error> {
        FieldValue::deserialize(d)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FieldValue, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<FieldValue>()? {
            items.push(item);
        }
        Ok(FieldValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldValue, A::Error> {
        let mut map = FieldMap::new();
        while let Some(key) = access.next_key::<String>()? {
            if map.contains_key(&key) {
                return Err(de::Error::custom(format!("duplicate key `{key}`")));
            }
            let value = access.next_value::<FieldValue>()?;
            map.insert(key, value);
        }
        Ok(FieldValue::Map(map))
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldValueVisitor)
    }
}
