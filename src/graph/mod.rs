//! The content graph: every node of a build, indexed and cross-linked.
//!
//! [`assemble`] is the last stage of a build. It takes the outputs of the
//! transformers and the image pipeline, turns them into uniform
//! [`GraphNode`]s, resolves references, infers the [`Schema`] and seals the
//! result. A [`ContentGraph`] has no mutation API; it is `Send + Sync` and can
//! be queried from any number of threads.
//!
//! ## References
//!
//! | Source | Becomes | Resolved against |
//! |---|---|---|
//! | a string naming a local raster file (`cover: ./cover.jpg`) | `Reference` into `images` | image nodes by absolute path |
//! | a `[mapping]` entry (`"talks.speaker" = "authors.name"`) | `Reference` into the target collection | target nodes by field value (`id` by default) |
//!
//! Unresolved references stay in place, dangling, and put an
//! [`UnresolvedReference`](NodeWarning::UnresolvedReference) warning on their
//! node. Queries that need them fail with
//! [`QueryError::MissingLinkedNode`].

pub mod query;
pub mod schema;

pub use query::{Query, QueryError, QueryRow, Sort, SortOrder};
pub use schema::{CollectionSchema, FieldInfo, Schema};

use crate::document::chain::{is_local_reference, reference_extension, strip_suffix};
use crate::document::{DocumentNode, resolve_relative};
use crate::fields::{FieldMap, FieldValue, Reference};
use crate::imaging::{DerivativeSet, ImageNode};
use crate::records::RecordNode;
use crate::sources::FileKind;
use crate::types::{IMAGES_COLLECTION, NodeId, NodeKind, NodeWarning, SITE_COLLECTION};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// One node in the sealed graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub collection: String,
    /// Queryable fields, references resolved.
    pub fields: FieldMap,
    pub warnings: Vec<NodeWarning>,
    /// Absolute source path; relative references resolve against its
    /// directory.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

/// Everything a build hands to assembly.
#[derive(Debug, Default)]
pub struct GraphInputs {
    pub documents: Vec<DocumentNode>,
    pub records: Vec<RecordNode>,
    pub images: Vec<ImageNode>,
    /// Every derivative set built, default constraint first per image.
    pub derivatives: Vec<DerivativeSet>,
    /// Problems found while deriving, keyed by image.
    pub image_warnings: Vec<(NodeId, NodeWarning)>,
}

/// The sealed content graph.
#[derive(Debug, Serialize)]
pub struct ContentGraph {
    nodes: Vec<GraphNode>,
    #[serde(skip)]
    by_id: HashMap<NodeId, usize>,
    collections: BTreeMap<String, Vec<NodeId>>,
    derivatives: BTreeMap<NodeId, Vec<DerivativeSet>>,
    #[serde(skip)]
    documents: HashMap<NodeId, DocumentNode>,
    schema: Schema,
}

impl ContentGraph {
    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.by_id.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes of a collection in source order.
    pub fn collection(&self, name: &str) -> Option<Vec<&GraphNode>> {
        self.collection_index(name)
            .map(|ids| ids.iter().filter_map(|id| self.node(id)).collect())
    }

    pub(crate) fn collection_index(&self, name: &str) -> Option<&Vec<NodeId>> {
        self.collections.get(name)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// The full document behind a document node.
    pub fn document(&self, id: &NodeId) -> Option<&DocumentNode> {
        self.documents.get(id)
    }

    /// Derivative set of an image for its default constraint.
    pub fn derivatives(&self, image_id: &NodeId) -> Option<&DerivativeSet> {
        self.derivatives.get(image_id).and_then(|sets| sets.first())
    }

    /// Every derivative set built for an image.
    pub fn derivative_sets(&self, image_id: &NodeId) -> &[DerivativeSet] {
        self.derivatives
            .get(image_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The site metadata node. Assembly always places it first.
    pub fn site(&self) -> &GraphNode {
        &self.nodes[0]
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every warning attached to any node, in node order.
    pub fn warnings(&self) -> Vec<(&NodeId, &NodeWarning)> {
        self.nodes
            .iter()
            .flat_map(|n| n.warnings.iter().map(move |w| (&n.id, w)))
            .collect()
    }
}

// =============================================================================
// Node views
// =============================================================================

fn record_fields(record: &RecordNode) -> FieldMap {
    let mut fields = record.fields.clone();
    fields
        .entry("id".to_string())
        .or_insert_with(|| FieldValue::String(record.id.to_string()));
    fields
}

fn image_fields(image: &ImageNode, set: Option<&DerivativeSet>) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("id".into(), image.id.as_str().into());
    fields.insert("source_path".into(), image.source_path.as_str().into());
    fields.insert("source_instance".into(), image.source_instance.as_str().into());
    fields.insert("width".into(), image.natural_width.into());
    fields.insert("height".into(), image.natural_height.into());
    fields.insert(
        "aspect_ratio".into(),
        FieldValue::Float(image.natural_width as f64 / image.natural_height.max(1) as f64),
    );
    if let Some(set) = set {
        if let Some(fallback) = set.fallback() {
            fields.insert("src".into(), fallback.uri.as_str().into());
        }
        if let Some(&primary) = set.formats().first() {
            fields.insert("srcset".into(), set.srcset(primary).into());
        }
        fields.insert("sizes".into(), set.sizes().into());
        fields.insert("placeholder".into(), set.placeholder.data_uri.as_str().into());
        let derivatives = set
            .derivatives
            .iter()
            .map(|d| {
                let mut m = FieldMap::new();
                m.insert("width".into(), d.width.into());
                m.insert("height".into(), d.height.into());
                m.insert("format".into(), d.format.extension().into());
                m.insert("uri".into(), d.uri.as_str().into());
                FieldValue::Map(m)
            })
            .collect();
        fields.insert("derivatives".into(), FieldValue::List(derivatives));
    }
    fields
}

// =============================================================================
// Reference resolution
// =============================================================================

fn is_image_reference(value: &str) -> bool {
    let path = strip_suffix(value);
    is_local_reference(path)
        && !path.contains('\n')
        && FileKind::from_extension(&reference_extension(path)) == FileKind::Image
}

/// Replace strings that name local images with references into `images`.
fn link_images(
    value: &mut FieldValue,
    field: &str,
    base: &Path,
    images: &HashMap<PathBuf, NodeId>,
    warnings: &mut Vec<NodeWarning>,
) {
    match value {
        FieldValue::String(s) if is_image_reference(s) => {
            let path = resolve_relative(base, strip_suffix(s));
            let target = images.get(&path).cloned();
            if target.is_none() {
                warnings.push(NodeWarning::UnresolvedReference {
                    field: field.to_string(),
                    value: s.clone(),
                });
            }
            *value = FieldValue::Reference(Reference {
                raw: std::mem::take(s),
                collection: IMAGES_COLLECTION.to_string(),
                target,
            });
        }
        FieldValue::List(items) => {
            for item in items {
                link_images(item, field, base, images, warnings);
            }
        }
        FieldValue::Map(map) => {
            for (key, child) in map.iter_mut() {
                link_images(child, &format!("{field}.{key}"), base, images, warnings);
            }
        }
        _ => {}
    }
}

/// Key a field value is matched on when resolving mapping links.
fn link_key(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::String(s) => Some(s.clone()),
        FieldValue::Int(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Apply `f` to every value at `segments` below `value`, through lists.
fn visit_path(value: &mut FieldValue, segments: &[&str], f: &mut dyn FnMut(&mut FieldValue)) {
    match value {
        FieldValue::List(items) => {
            for item in items {
                visit_path(item, segments, f);
            }
        }
        FieldValue::Map(map) => {
            if let Some((first, rest)) = segments.split_first()
                && let Some(child) = map.get_mut(*first)
            {
                if rest.is_empty() {
                    f(child);
                } else {
                    visit_path(child, rest, f);
                }
            }
        }
        _ => {}
    }
}

/// Parsed `[mapping]` entry.
struct Link<'a> {
    source_collection: &'a str,
    source_field: &'a str,
    target_collection: &'a str,
    target_field: &'a str,
}

impl<'a> Link<'a> {
    fn parse(key: &'a str, value: &'a str) -> Option<Self> {
        let (source_collection, source_field) = key.split_once('.')?;
        let (target_collection, target_field) = value.split_once('.').unwrap_or((value, "id"));
        Some(Self {
            source_collection,
            source_field,
            target_collection,
            target_field,
        })
    }
}

fn resolve_mapping(nodes: &mut [GraphNode], mapping: &BTreeMap<String, String>) {
    for (key, value) in mapping {
        let Some(link) = Link::parse(key, value) else {
            continue;
        };
        let target_field: Vec<&str> = link.target_field.split('.').collect();
        let mut index: HashMap<String, NodeId> = HashMap::new();
        for node in nodes.iter().filter(|n| n.collection == link.target_collection) {
            let mut wrapped = FieldValue::Map(node.fields.clone());
            visit_path(&mut wrapped, &target_field, &mut |v| {
                if let Some(k) = link_key(v) {
                    index.entry(k).or_insert_with(|| node.id.clone());
                }
            });
        }

        let source_field: Vec<&str> = link.source_field.split('.').collect();
        for node in nodes
            .iter_mut()
            .filter(|n| n.collection == link.source_collection)
        {
            let mut fields = FieldValue::Map(std::mem::take(&mut node.fields));
            let warnings = &mut node.warnings;
            visit_path(&mut fields, &source_field, &mut |v| {
                link_value(v, &link, &index, warnings);
            });
            if let FieldValue::Map(map) = fields {
                node.fields = map;
            }
        }
    }
}

fn link_value(
    value: &mut FieldValue,
    link: &Link,
    index: &HashMap<String, NodeId>,
    warnings: &mut Vec<NodeWarning>,
) {
    if let FieldValue::List(items) = value {
        for item in items {
            link_value(item, link, index, warnings);
        }
        return;
    }
    let Some(key) = link_key(value) else { return };
    let target = index.get(&key).cloned();
    if target.is_none() {
        warnings.push(NodeWarning::UnresolvedReference {
            field: link.source_field.to_string(),
            value: key.clone(),
        });
    }
    *value = FieldValue::Reference(Reference {
        raw: key,
        collection: link.target_collection.to_string(),
        target,
    });
}

// =============================================================================
// Assembly
// =============================================================================

/// Build and seal the graph.
///
/// Nodes keep the order they arrive in, which is source order per
/// collection. A node whose id is already taken is dropped with a warning on
/// the first holder.
pub fn assemble(
    inputs: GraphInputs,
    mapping: &BTreeMap<String, String>,
    site: FieldMap,
) -> ContentGraph {
    let GraphInputs {
        documents,
        records,
        images,
        derivatives,
        image_warnings,
    } = inputs;

    let mut sets: BTreeMap<NodeId, Vec<DerivativeSet>> = BTreeMap::new();
    for set in derivatives {
        sets.entry(set.image_id.clone()).or_default().push(set);
    }

    let image_paths: HashMap<PathBuf, NodeId> = images
        .iter()
        .map(|i| (i.path.clone(), i.id.clone()))
        .collect();

    let mut nodes = vec![GraphNode {
        id: NodeId::from_key(SITE_COLLECTION),
        kind: NodeKind::Record,
        collection: SITE_COLLECTION.to_string(),
        fields: site,
        warnings: Vec::new(),
        path: None,
    }];

    for image in &images {
        let set = sets.get(&image.id).and_then(|s| s.first());
        let warnings = image_warnings
            .iter()
            .filter(|(id, _)| *id == image.id)
            .map(|(_, w)| w.clone())
            .collect();
        nodes.push(GraphNode {
            id: image.id.clone(),
            kind: NodeKind::Image,
            collection: IMAGES_COLLECTION.to_string(),
            fields: image_fields(image, set),
            warnings,
            path: Some(image.path.clone()),
        });
    }
    for doc in &documents {
        nodes.push(GraphNode {
            id: doc.id.clone(),
            kind: NodeKind::Document,
            collection: doc.collection.clone(),
            fields: doc.fields(),
            warnings: doc.warnings.clone(),
            path: Some(doc.path.clone()),
        });
    }
    for record in &records {
        nodes.push(GraphNode {
            id: record.id.clone(),
            kind: NodeKind::Record,
            collection: record.collection.clone(),
            fields: record_fields(record),
            warnings: record.warnings.clone(),
            path: Some(record.path.clone()),
        });
    }

    resolve_mapping(&mut nodes, mapping);

    for node in nodes.iter_mut().filter(|n| n.kind != NodeKind::Image) {
        let Some(base) = node.path.as_ref().and_then(|p| p.parent()).map(Path::to_path_buf) else {
            continue;
        };
        let mut new_warnings = Vec::new();
        match node.kind {
            NodeKind::Document => {
                if let Some(front) = node.fields.get_mut("frontmatter") {
                    link_images(front, "frontmatter", &base, &image_paths, &mut new_warnings);
                }
            }
            _ => {
                for (key, value) in node.fields.iter_mut() {
                    link_images(value, key, &base, &image_paths, &mut new_warnings);
                }
            }
        }
        node.warnings.extend(new_warnings);
    }

    let mut by_id = HashMap::new();
    let mut collections: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    let mut kept = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let Some(&first) = by_id.get(&node.id) {
            let holder: &mut GraphNode = &mut kept[first];
            holder.warnings.push(NodeWarning::DuplicateId {
                id: node.id.to_string(),
            });
            continue;
        }
        by_id.insert(node.id.clone(), kept.len());
        collections
            .entry(node.collection.clone())
            .or_default()
            .push(node.id.clone());
        kept.push(node);
    }

    let mut schema = Schema::default();
    schema.declare(IMAGES_COLLECTION);
    schema.declare(SITE_COLLECTION);
    collections.entry(IMAGES_COLLECTION.to_string()).or_default();
    for node in &kept {
        schema.declare(&node.collection).observe(&node.fields);
    }

    let warning_count: usize = kept.iter().map(|n| n.warnings.len()).sum();
    tracing::info!(
        "assembled {} nodes in {} collections ({} warnings)",
        kept.len(),
        collections.len(),
        warning_count
    );

    ContentGraph {
        nodes: kept,
        by_id,
        collections,
        derivatives: sets,
        documents: documents.into_iter().map(|d| (d.id.clone(), d)).collect(),
        schema,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{RecordFormat, into_nodes, parse};
    use crate::sources::{ContentRoot, FileDescriptor, KindHint};
    use crate::test_helpers::{derivative_set, image_node};
    use crate::imaging::Constraint;

    fn record_nodes(file: &str, yaml: &str) -> Vec<RecordNode> {
        let root = ContentRoot {
            path: PathBuf::from("/site/data"),
            collection: "data".into(),
            kind_hint: KindHint::Auto,
        };
        let desc = FileDescriptor {
            path: PathBuf::from(format!("/site/data/{file}")),
            relative_path: file.into(),
            extension: "yaml".into(),
            size: 0,
            kind: FileKind::Record,
        };
        into_nodes(&root, &desc, parse(yaml, RecordFormat::Yaml).unwrap())
    }

    fn graph_with(mapping: &[(&str, &str)]) -> ContentGraph {
        let mut records = record_nodes(
            "talks.yaml",
            "- title: Bugs\n  speaker: kelley\n  cover: ./bugs.jpg\n  year: 2019\n- title: Second\n  speaker: nobody\n  year: 2018\n",
        );
        records.extend(record_nodes(
            "authors.yaml",
            "- id: kelley\n  name: Kelley\n",
        ));
        let mut image = image_node("/site/data/bugs.jpg", 2000, 1000);
        image.id = NodeId::from_key("images/bugs.jpg");
        let mut set = derivative_set("bugs", 2000, 1000, Constraint::MaxWidth(800));
        set.image_id = image.id.clone();
        let inputs = GraphInputs {
            records,
            images: vec![image],
            derivatives: vec![set],
            ..GraphInputs::default()
        };
        let mapping = mapping
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut site = FieldMap::new();
        site.insert("title".into(), "Kelley's blog".into());
        assemble(inputs, &mapping, site)
    }

    #[test]
    fn collections_keep_source_order() {
        let graph = graph_with(&[]);
        let talks = graph.collection("talks").unwrap();
        assert_eq!(talks.len(), 2);
        assert_eq!(talks[0].fields["title"], FieldValue::from("Bugs"));
        assert_eq!(talks[1].fields["title"], FieldValue::from("Second"));
        assert!(graph.collection("images").is_some());
        assert!(graph.collection("missing").is_none());
    }

    #[test]
    fn image_paths_become_references() {
        let graph = graph_with(&[]);
        let talk = graph.collection("talks").unwrap()[0];
        match &talk.fields["cover"] {
            FieldValue::Reference(r) => {
                assert_eq!(r.collection, "images");
                assert_eq!(r.target, Some(NodeId::from_key("images/bugs.jpg")));
            }
            other => panic!("expected reference, got {other:?}"),
        }
        assert!(talk.warnings.is_empty());
    }

    #[test]
    fn mapping_links_with_warnings_for_misses() {
        let graph = graph_with(&[("talks.speaker", "authors")]);
        let talks = graph.collection("talks").unwrap();
        match &talks[0].fields["speaker"] {
            FieldValue::Reference(r) => assert_eq!(r.target, Some(NodeId::explicit("kelley"))),
            other => panic!("expected reference, got {other:?}"),
        }
        assert_eq!(
            talks[1].warnings,
            vec![NodeWarning::UnresolvedReference {
                field: "speaker".into(),
                value: "nobody".into()
            }]
        );
        assert_eq!(graph.warnings().len(), 1);
        assert_eq!(
            graph.schema().collection("talks").unwrap().fields["speaker"].target.as_deref(),
            Some("authors")
        );
    }

    #[test]
    fn mapping_on_named_target_field() {
        let graph = graph_with(&[("talks.speaker", "authors.name")]);
        let talks = graph.collection("talks").unwrap();
        assert_eq!(talks[0].warnings.len(), 1, "kelley != Kelley");
    }

    #[test]
    fn image_nodes_expose_derivatives() {
        let graph = graph_with(&[]);
        let id = NodeId::from_key("images/bugs.jpg");
        let set = graph.derivatives(&id).unwrap();
        assert_eq!(set.derivatives[0].width, 800);
        let node = graph.node(&id).unwrap();
        assert_eq!(node.kind, NodeKind::Image);
        assert_eq!(node.fields["width"], FieldValue::Int(2000));
        assert!(node.fields["src"].as_str().unwrap().ends_with("/bugs-800.jpg"));
        assert!(node.fields["placeholder"].as_str().unwrap().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn site_node_always_present() {
        let graph = graph_with(&[]);
        assert_eq!(graph.site().fields["title"], FieldValue::from("Kelley's blog"));
        assert_eq!(graph.collection("site").unwrap().len(), 1);
    }

    #[test]
    fn graph_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ContentGraph>();
    }
}
