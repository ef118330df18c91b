//! Field schema inferred from the assembled nodes.
//!
//! Every collection records the dotted paths that occur on any of its nodes.
//! Lists are transparent: `conferences.name` is the path of `name` inside each
//! element of the `conferences` list. Reference fields record their target
//! collection, and paths continue into the target's own schema.

use crate::fields::{FieldMap, FieldValue};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// What is known about one field path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    /// Value types seen at this path (`string`, `number`, `list`, …).
    pub types: BTreeSet<&'static str>,
    /// Collection the path links into, for reference fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Field paths of one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionSchema {
    pub fields: BTreeMap<String, FieldInfo>,
}

impl CollectionSchema {
    /// Record every path of one node's fields.
    pub fn observe(&mut self, fields: &FieldMap) {
        for (key, value) in fields {
            self.observe_value(key.clone(), value);
        }
    }

    fn observe_value(&mut self, path: String, value: &FieldValue) {
        let info = self.fields.entry(path.clone()).or_default();
        info.types.insert(value.type_name());
        match value {
            FieldValue::Reference(reference) => {
                info.target.get_or_insert_with(|| reference.collection.clone());
            }
            FieldValue::Map(map) => {
                for (key, child) in map {
                    self.observe_value(format!("{path}.{key}"), child);
                }
            }
            FieldValue::List(items) => {
                for item in items {
                    match item {
                        FieldValue::Map(map) => {
                            for (key, child) in map {
                                self.observe_value(format!("{path}.{key}"), child);
                            }
                        }
                        FieldValue::Reference(reference) => {
                            let info = self.fields.entry(path.clone()).or_default();
                            info.target.get_or_insert_with(|| reference.collection.clone());
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

/// Where a validated path ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathCheck {
    Valid,
    UnknownCollection(String),
    UnknownField { collection: String },
}

/// Schemas of every collection in the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub collections: BTreeMap<String, CollectionSchema>,
}

impl Schema {
    /// Ensure a collection exists, even when it has no nodes.
    pub fn declare(&mut self, collection: &str) -> &mut CollectionSchema {
        self.collections.entry(collection.to_string()).or_default()
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }

    /// Check a dotted path against `collection`, following references into
    /// their target collections.
    pub fn check_path(&self, collection: &str, path: &str) -> PathCheck {
        let mut current = collection;
        let mut prefix = String::new();
        let segments: Vec<&str> = path.split('.').collect();

        for (i, segment) in segments.iter().enumerate() {
            let Some(schema) = self.collections.get(current) else {
                return PathCheck::UnknownCollection(current.to_string());
            };
            if segment.is_empty() {
                return PathCheck::UnknownField {
                    collection: current.to_string(),
                };
            }
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            let Some(info) = schema.fields.get(&prefix) else {
                return PathCheck::UnknownField {
                    collection: current.to_string(),
                };
            };
            if let Some(target) = &info.target
                && i + 1 < segments.len()
            {
                current = target;
                prefix.clear();
            }
        }
        PathCheck::Valid
    }
}
