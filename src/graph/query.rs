//! Declarative queries over the sealed graph.
//!
//! A [`Query`] names one collection, the dotted field paths to return, exact
//! match filters, an optional sort and a window. Every path is checked against
//! the assembled [`Schema`](super::schema::Schema) before anything is
//! evaluated, so a typo fails loudly instead of returning empty rows.
//!
//! ```json
//! {
//!   "collection": "blog",
//!   "fields": ["slug", "frontmatter.title", "frontmatter.cover.src"],
//!   "filters": { "frontmatter.draft": false },
//!   "sort": { "field": "frontmatter.date", "order": "desc" },
//!   "limit": 10
//! }
//! ```
//!
//! Projection keeps the nesting of the requested paths. Lists are projected
//! element by element, and paths through a reference continue in the linked
//! node. Selecting a reference itself yields the target id. Any evaluation
//! that needs a dangling reference fails with
//! [`QueryError::MissingLinkedNode`].
//!
//! Rows hold nothing but the requested paths. Every node view carries an
//! `id` field, so `id` is selectable like any other path.

use super::ContentGraph;
use super::schema::PathCheck;
use crate::fields::{FieldMap, FieldValue, Reference};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum QueryError {
    #[error("Unknown collection `{0}`")]
    UnknownCollection(String),
    #[error("Unknown field `{field}` in collection `{collection}`")]
    UnknownField { collection: String, field: String },
    #[error("Node {node} links to missing {collection} node via `{field}` (`{raw}`)")]
    MissingLinkedNode {
        node: NodeId,
        field: String,
        collection: String,
        raw: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// The shape of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Query {
    pub collection: String,
    /// Dotted paths to return. Nothing else appears in a row.
    pub fields: Vec<String>,
    /// Path → value. A list matches when any element equals the value.
    pub filters: BTreeMap<String, FieldValue>,
    pub sort: Option<Sort>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            ..Self::default()
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.insert(path.into(), value.into());
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            order,
        });
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// One result row: the projected fields of one node.
pub type QueryRow = FieldMap;

/// Requested paths as a tree; `whole` marks a path selected in full.
#[derive(Debug, Default)]
struct Shape {
    whole: bool,
    children: BTreeMap<String, Shape>,
}

impl Shape {
    fn from_paths<'a>(paths: impl IntoIterator<Item = &'a String>) -> Self {
        let mut root = Shape::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.split('.') {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.whole = true;
        }
        root
    }
}

/// Evaluation state for one node.
struct Eval<'g> {
    graph: &'g ContentGraph,
    node: &'g NodeId,
}

impl<'g> Eval<'g> {
    fn follow(&self, reference: &Reference, field: &str) -> Result<&'g FieldMap, QueryError> {
        reference
            .target
            .as_ref()
            .and_then(|id| self.graph.node(id))
            .map(|node| &node.fields)
            .ok_or_else(|| QueryError::MissingLinkedNode {
                node: self.node.clone(),
                field: field.to_string(),
                collection: reference.collection.clone(),
                raw: reference.raw.clone(),
            })
    }

    /// A value selected in full, with references replaced by target ids.
    fn whole(&self, value: &FieldValue, field: &str) -> Result<FieldValue, QueryError> {
        Ok(match value {
            FieldValue::Reference(reference) => {
                self.follow(reference, field)?;
                match &reference.target {
                    Some(id) => FieldValue::String(id.to_string()),
                    None => FieldValue::Null,
                }
            }
            FieldValue::List(items) => FieldValue::List(
                items
                    .iter()
                    .map(|item| self.whole(item, field))
                    .collect::<Result<_, _>>()?,
            ),
            FieldValue::Map(map) => FieldValue::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.whole(v, &format!("{field}.{k}"))?)))
                    .collect::<Result<_, QueryError>>()?,
            ),
            other => other.clone(),
        })
    }

    fn project(&self, value: &FieldValue, shape: &Shape, field: &str) -> Result<FieldValue, QueryError> {
        if shape.whole {
            return self.whole(value, field);
        }
        match value {
            FieldValue::Map(map) => self.project_map(map, shape, field).map(FieldValue::Map),
            FieldValue::List(items) => Ok(FieldValue::List(
                items
                    .iter()
                    .map(|item| self.project(item, shape, field))
                    .collect::<Result<_, _>>()?,
            )),
            FieldValue::Reference(reference) => {
                let target = self.follow(reference, field)?;
                self.project_map(target, shape, field).map(FieldValue::Map)
            }
            _ => Ok(FieldValue::Null),
        }
    }

    fn project_map(&self, map: &FieldMap, shape: &Shape, field: &str) -> Result<FieldMap, QueryError> {
        let mut out = FieldMap::new();
        for (key, child) in &shape.children {
            let path = if field.is_empty() {
                key.clone()
            } else {
                format!("{field}.{key}")
            };
            let value = map.get(key).unwrap_or(&FieldValue::Null);
            out.insert(key.clone(), self.project(value, child, &path)?);
        }
        Ok(out)
    }

    /// Every leaf value at `path`, flattening lists and following resolved
    /// references. Dangling references contribute nothing.
    fn collect(&self, fields: &'g FieldMap, path: &str) -> Vec<&'g FieldValue> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut out = Vec::new();
        self.collect_in(fields, &segments, &mut out);
        out
    }

    fn collect_in(&self, map: &'g FieldMap, segments: &[&str], out: &mut Vec<&'g FieldValue>) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };
        if let Some(value) = map.get(*first) {
            self.collect_value(value, rest, out);
        }
    }

    fn collect_value(&self, value: &'g FieldValue, rest: &[&str], out: &mut Vec<&'g FieldValue>) {
        match value {
            FieldValue::List(items) => {
                for item in items {
                    self.collect_value(item, rest, out);
                }
            }
            FieldValue::Map(map) if !rest.is_empty() => self.collect_in(map, rest, out),
            FieldValue::Reference(reference) if !rest.is_empty() => {
                if let Some(node) = reference.target.as_ref().and_then(|id| self.graph.node(id)) {
                    self.collect_in(&node.fields, rest, out);
                }
            }
            _ if rest.is_empty() => out.push(value),
            _ => {}
        }
    }
}

fn filter_matches(value: &FieldValue, expected: &FieldValue) -> bool {
    match value {
        FieldValue::Reference(reference) => match (&reference.target, expected) {
            (Some(id), FieldValue::String(s)) => id.as_str() == s,
            _ => false,
        },
        other => other.loosely_equals(expected),
    }
}

fn sort_key(value: Option<&FieldValue>) -> FieldValue {
    match value {
        Some(FieldValue::Reference(reference)) => reference
            .target
            .as_ref()
            .map_or(FieldValue::Null, |id| FieldValue::String(id.to_string())),
        Some(other) => other.clone(),
        None => FieldValue::Null,
    }
}

impl ContentGraph {
    /// Run a query. Never mutates the graph.
    pub fn query(&self, query: &Query) -> Result<Vec<QueryRow>, QueryError> {
        let Some(ids) = self.collection_index(&query.collection) else {
            return Err(QueryError::UnknownCollection(query.collection.clone()));
        };

        let sort_field = query.sort.as_ref().map(|s| &s.field);
        for path in query.fields.iter().chain(query.filters.keys()).chain(sort_field) {
            match self.schema().check_path(&query.collection, path) {
                PathCheck::Valid => {}
                PathCheck::UnknownCollection(name) => {
                    return Err(QueryError::UnknownCollection(name));
                }
                PathCheck::UnknownField { collection } => {
                    return Err(QueryError::UnknownField {
                        collection,
                        field: path.clone(),
                    });
                }
            }
        }

        let mut matched = Vec::new();
        for node in ids.iter().filter_map(|id| self.node(id)) {
            let eval = Eval {
                graph: self,
                node: &node.id,
            };
            let keep = query.filters.iter().all(|(path, expected)| {
                eval.collect(&node.fields, path)
                    .into_iter()
                    .any(|value| filter_matches(value, expected))
            });
            if keep {
                matched.push(node);
            }
        }

        if let Some(sort) = &query.sort {
            let mut keyed: Vec<_> = matched
                .into_iter()
                .map(|node| {
                    let eval = Eval {
                        graph: self,
                        node: &node.id,
                    };
                    let key = sort_key(eval.collect(&node.fields, &sort.field).first().copied());
                    (key, node)
                })
                .collect();
            keyed.sort_by(|(a, _), (b, _)| match (a.is_null(), b.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ if sort.order == SortOrder::Desc => b.total_cmp(a),
                _ => a.total_cmp(b),
            });
            matched = keyed.into_iter().map(|(_, node)| node).collect();
        }

        let shape = Shape::from_paths(&query.fields);
        matched
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|node| {
                let eval = Eval {
                    graph: self,
                    node: &node.id,
                };
                eval.project_map(&node.fields, &shape, "")
            })
            .collect()
    }
}
