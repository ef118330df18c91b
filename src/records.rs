//! Structured record files.
//!
//! A record file (`.yaml`, `.yml`, `.json`) holds either a sequence of
//! mappings or a single mapping. Each mapping becomes one [`RecordEntry`]; the
//! pipeline turns entries into record nodes that share a collection named after
//! the file stem (`talks.yaml` → `talks`).
//!
//! ```yaml
//! - title: Fantastic Bugs and How to Fix Them
//!   slides: https://speakerdeck.com/...
//!   conferences:
//!     - name: RailsConf
//!       website: https://railsconf.com
//! ```
//!
//! No key schema is enforced; an entry is whatever mapping the author wrote.

use crate::fields::{FieldMap, FieldValue};
use crate::sources::{ContentRoot, FileDescriptor};
use crate::types::{NodeId, NodeWarning};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Record parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Yaml,
    Json,
}

impl RecordFormat {
    /// Format for a lowercase extension, if it is a record file.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "yaml" | "yml" => Some(RecordFormat::Yaml),
            "json" => Some(RecordFormat::Json),
            _ => None,
        }
    }
}

/// One parsed entry, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    pub index: usize,
    pub fields: FieldMap,
}

impl RecordEntry {
    /// Author-supplied id, when the entry has a string `id` field.
    pub fn explicit_id(&self) -> Option<&str> {
        self.fields.get("id").and_then(FieldValue::as_str)
    }
}

/// Parse a record file into entries.
pub fn parse(contents: &str, format: RecordFormat) -> Result<Vec<RecordEntry>, RecordError> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: FieldValue = match format {
        RecordFormat::Yaml => {
            serde_yaml::from_str(contents).map_err(|e| RecordError::Parse(e.to_string()))?
        }
        RecordFormat::Json => {
            serde_json::from_str(contents).map_err(|e| RecordError::Parse(e.to_string()))?
        }
    };

    let items = match value {
        FieldValue::Null => Vec::new(),
        FieldValue::List(items) => items,
        map @ FieldValue::Map(_) => vec![map],
        other => {
            return Err(RecordError::Parse(format!(
                "expected a sequence of mappings, found {}",
                other.type_name()
            )));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            FieldValue::Map(fields) => Ok(RecordEntry { index, fields }),
            other => Err(RecordError::Parse(format!(
                "entry {index} is a {}, expected a mapping",
                other.type_name()
            ))),
        })
        .collect()
}

/// One record entry as a graph node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordNode {
    pub id: NodeId,
    /// File stem of the record file.
    pub collection: String,
    pub source_instance: String,
    pub source_path: String,
    #[serde(skip)]
    pub path: PathBuf,
    /// Position of the entry in its file.
    pub index: usize,
    pub fields: FieldMap,
    pub warnings: Vec<NodeWarning>,
}

/// Id of an entry without an explicit `id`, unique per root, file and index.
fn hashed_id(root: &str, source_path: &str, index: usize) -> NodeId {
    NodeId::from_key(&format!("{root}/{source_path}#{index}"))
}

/// Turn the entries of one record file into nodes, in file order.
pub fn into_nodes(
    root: &ContentRoot,
    file: &FileDescriptor,
    entries: Vec<RecordEntry>,
) -> Vec<RecordNode> {
    entries
        .into_iter()
        .map(|entry| RecordNode {
            id: entry
                .explicit_id()
                .map(NodeId::explicit)
                .unwrap_or_else(|| hashed_id(&root.collection, &file.relative_path, entry.index)),
            collection: file.stem().to_string(),
            source_instance: root.collection.clone(),
            source_path: file.relative_path.clone(),
            path: file.path.clone(),
            index: entry.index,
            fields: entry.fields,
            warnings: Vec::new(),
        })
        .collect()
}

/// Make ids unique across all record nodes.
///
/// The first holder of an id keeps it; later holders fall back to their
/// hashed id (suffixed until unused) and carry a [`NodeWarning::DuplicateId`].
pub fn dedupe_ids(nodes: &mut [RecordNode]) {
    let mut seen = HashSet::new();
    for node in nodes.iter_mut() {
        if !seen.insert(node.id.clone()) {
            let mut fallback = hashed_id(&node.source_instance, &node.source_path, node.index);
            let mut attempt = 1;
            while seen.contains(&fallback) {
                fallback = NodeId::from_key(&format!(
                    "{}/{}#{}~{attempt}",
                    node.source_instance, node.source_path, node.index
                ));
                attempt += 1;
            }
            let duplicate = std::mem::replace(&mut node.id, fallback);
            tracing::warn!("duplicate record id `{duplicate}` in {}", node.source_path);
            node.warnings.push(NodeWarning::DuplicateId {
                id: duplicate.to_string(),
            });
            seen.insert(node.id.clone());
        }
    }
}
