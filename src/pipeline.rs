//! Build orchestration.
//!
//! Runs the build as a fixed sequence of phases with a barrier between each:
//!
//! 1. **Discover**: register every `[[sources]]` root and list its files.
//! 2. **Parse**: front matter and record files, in parallel per file.
//! 3. **Images**: identify and hash every image, then derive each unique
//!    `(image, constraint)` pair exactly once, in parallel.
//! 4. **Documents**: run the transformer chain per document, in parallel.
//! 5. **Assemble**: copy linked files, build and seal the graph, persist the
//!    cache manifest.
//!
//! Per-file failures never abort a build. Files that cannot be parsed or
//! identified are skipped and listed in [`BuildReport::skipped`]; problems
//! inside a node become [`NodeWarning`]s. Only a bad configuration, a missing
//! content root, an I/O failure while writing output, or cancellation stop
//! the build, and a stopped build never hands out a graph.
//!
//! ## Output Structure
//!
//! ```text
//! public/
//! └── static/
//!     ├── .cache-manifest.json
//!     ├── 3f9a1c0e5b7d2468/              # derivative source hash
//!     │   └── 0c1d2e3f/salty_egg-590.jpg
//!     └── 9b8a7c6d5e4f3a2b/slides.pdf    # linked file, content hash
//! ```

use crate::cache::{CacheStats, DerivativeStore, hash_file};
use crate::config::{BuildConfig, ConfigError, SourceConfig};
use crate::document::{
    AssetLookup, Chain, DocumentNode, LinkedAsset, ParsedDocument, StageContext, body_constraint,
    local_image_refs, local_link_targets, resolve_relative, transform,
};
use crate::fields::{FieldMap, FieldValue};
use crate::graph::{self, ContentGraph, GraphInputs};
use crate::imaging::{
    Constraint, DerivativeSet, ImageBackend, ImageNode, RustBackend, STATIC_DIR,
    default_constraint,
};
use crate::records::{self, RecordFormat, RecordNode};
use crate::sources::{self, ContentRoot, FileDescriptor, FileKind, SourceError};
use crate::types::{IMAGES_COLLECTION, NodeId, NodeWarning, SITE_COLLECTION};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Build cancelled")]
    Cancelled,
}

/// Cooperative cancellation shared with a running build.
///
/// Checked before every phase and every unit of work inside a phase.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), BuildError> {
        if self.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// Events and report
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Discover,
    Parse,
    Images,
    Documents,
    Assemble,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Discover => "Discovering sources",
            Phase::Parse => "Parsing documents and records",
            Phase::Images => "Deriving images",
            Phase::Documents => "Transforming documents",
            Phase::Assemble => "Assembling graph",
        })
    }
}

/// Progress of a running build, sent as work completes.
///
/// Events from parallel phases arrive in completion order.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    PhaseStarted {
        phase: Phase,
        units: usize,
    },
    RootListed {
        collection: String,
        path: PathBuf,
        files: usize,
    },
    FileSkipped {
        path: PathBuf,
        reason: String,
    },
    ImageDerived {
        source_path: String,
        constraint: Constraint,
        derivatives: usize,
    },
    ImageFailed {
        source_path: String,
        message: String,
    },
    DocumentBuilt {
        collection: String,
        source_path: String,
        warnings: usize,
    },
}

/// A file left out of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// A node warning with the node it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedWarning {
    pub node: NodeId,
    pub collection: String,
    pub warning: NodeWarning,
}

/// Everything a build or check found, besides the graph itself.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub records: usize,
    pub images: usize,
    pub derivative_sets: usize,
    pub linked_files: usize,
    pub skipped: Vec<SkippedFile>,
    pub warnings: Vec<ReportedWarning>,
    pub cache: CacheStats,
}

#[derive(Debug)]
pub struct BuildResult {
    pub graph: ContentGraph,
    pub report: BuildReport,
}

/// Where a build reads from and writes to.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory `[[sources]]` paths are relative to.
    pub project_root: PathBuf,
    /// Receives derivatives, linked files and the cache manifest.
    pub output_dir: PathBuf,
    /// Consult the cache manifest from a previous build.
    pub use_cache: bool,
    pub cancel: CancelToken,
}

impl BuildOptions {
    /// Options for `project_root` with the configured output directory.
    pub fn new(project_root: &Path, config: &BuildConfig) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            output_dir: project_root.join(&config.output_dir),
            use_cache: true,
            cancel: CancelToken::new(),
        }
    }
}

type Events<'a> = Option<&'a Sender<BuildEvent>>;

fn emit(events: Events, event: BuildEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening.
        let _ = tx.send(event);
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Build with the production image backend.
pub fn build(
    config: &BuildConfig,
    options: &BuildOptions,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildResult, BuildError> {
    build_with_backend(&RustBackend::new(), config, options, events)
}

/// Build using a specific backend (allows testing with mock).
pub fn build_with_backend(
    backend: &impl ImageBackend,
    config: &BuildConfig,
    options: &BuildOptions,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildResult, BuildError> {
    let events = events.as_ref();
    let cancel = &options.cancel;

    let listed = discover(config, options, events)?;
    check_mapping(&config.mapping, &listed)?;

    let parsed = parse_sources(&listed, cancel, events)?;
    let (images, mut skipped) = identify_images(backend, &listed, cancel, events)?;
    skipped.extend(parsed.skipped);

    std::fs::create_dir_all(&options.output_dir)?;
    let store = DerivativeStore::open(&options.output_dir, options.use_cache);
    let derived = derive_images(backend, &store, &images, &parsed.documents, config, cancel, events)?;

    let index = AssetIndex {
        images: derived.lookup,
        files: index_linked_files(&listed, &parsed.documents, cancel)?,
    };
    let documents = transform_documents(parsed.documents, &index, config, cancel, events)?;

    cancel.check()?;
    emit(
        events,
        BuildEvent::PhaseStarted {
            phase: Phase::Assemble,
            units: documents.len() + parsed.records.len() + images.len(),
        },
    );
    let linked_files = copy_linked_files(&documents, &options.output_dir)?;

    let mut report = BuildReport {
        documents: documents.len(),
        records: parsed.records.len(),
        images: images.len(),
        derivative_sets: derived.sets.len(),
        linked_files,
        skipped,
        ..BuildReport::default()
    };

    let graph = graph::assemble(
        GraphInputs {
            documents,
            records: parsed.records,
            images,
            derivatives: derived.sets,
            image_warnings: derived.warnings,
        },
        &config.mapping,
        site_fields(&config.site),
    );
    store.save()?;

    report.cache = store.stats();
    report.warnings = graph
        .warnings()
        .into_iter()
        .map(|(id, warning)| ReportedWarning {
            node: id.clone(),
            collection: graph
                .node(id)
                .map(|n| n.collection.clone())
                .unwrap_or_default(),
            warning: warning.clone(),
        })
        .collect();

    tracing::info!(
        "built {} nodes ({} warnings, {} skipped); cache: {}",
        graph.len(),
        report.warnings.len(),
        report.skipped.len(),
        report.cache
    );
    Ok(BuildResult { graph, report })
}

/// Validate content with the production image backend.
pub fn check(config: &BuildConfig, options: &BuildOptions) -> Result<BuildReport, BuildError> {
    check_with_backend(&RustBackend::new(), config, options)
}

/// Run discovery, parsing and image identification without deriving or
/// writing anything.
pub fn check_with_backend(
    backend: &impl ImageBackend,
    config: &BuildConfig,
    options: &BuildOptions,
) -> Result<BuildReport, BuildError> {
    let cancel = &options.cancel;
    let listed = discover(config, options, None)?;
    check_mapping(&config.mapping, &listed)?;
    let parsed = parse_sources(&listed, cancel, None)?;
    let (images, mut skipped) = identify_images(backend, &listed, cancel, None)?;
    skipped.extend(parsed.skipped);

    let records = parsed.records;
    let warnings = records
        .iter()
        .flat_map(|r| {
            r.warnings.iter().map(|w| ReportedWarning {
                node: r.id.clone(),
                collection: r.collection.clone(),
                warning: w.clone(),
            })
        })
        .collect();

    Ok(BuildReport {
        documents: parsed.documents.len(),
        records: records.len(),
        images: images.len(),
        skipped,
        warnings,
        ..BuildReport::default()
    })
}

// =============================================================================
// Phase 1: discovery
// =============================================================================

struct SourceFiles<'a> {
    source: &'a SourceConfig,
    root: ContentRoot,
    files: Vec<FileDescriptor>,
}

impl SourceFiles<'_> {
    fn of_kind(&self, kind: FileKind) -> impl Iterator<Item = (&Self, &FileDescriptor)> {
        self.files
            .iter()
            .filter(move |f| f.kind == kind)
            .map(move |f| (self, f))
    }
}

fn discover<'a>(
    config: &'a BuildConfig,
    options: &BuildOptions,
    events: Events,
) -> Result<Vec<SourceFiles<'a>>, BuildError> {
    options.cancel.check()?;
    emit(
        events,
        BuildEvent::PhaseStarted {
            phase: Phase::Discover,
            units: config.sources.len(),
        },
    );

    // Registration is sequential so the first missing root is the one reported.
    let roots = config
        .sources
        .iter()
        .map(|source| {
            let path = options.project_root.join(&source.path);
            let root = sources::register_root(&path, &source.name, source.kind)?;
            Ok((source, root))
        })
        .collect::<Result<Vec<_>, SourceError>>()?;

    let listed = roots
        .into_par_iter()
        .map(|(source, root)| {
            options.cancel.check()?;
            let files = sources::list_files(&root)?;
            Ok(SourceFiles {
                source,
                root,
                files,
            })
        })
        .collect::<Result<Vec<_>, BuildError>>()?;

    for unit in &listed {
        tracing::info!(
            "{}: {} files in {}",
            unit.root.collection,
            unit.files.len(),
            unit.root.path.display()
        );
        emit(
            events,
            BuildEvent::RootListed {
                collection: unit.root.collection.clone(),
                path: unit.root.path.clone(),
                files: unit.files.len(),
            },
        );
    }
    Ok(listed)
}

/// Every collection a mapping names must exist before anything is
/// transformed.
fn check_mapping(
    mapping: &BTreeMap<String, String>,
    listed: &[SourceFiles],
) -> Result<(), ConfigError> {
    let mut known: HashSet<&str> = HashSet::from([IMAGES_COLLECTION, SITE_COLLECTION]);
    for unit in listed {
        known.insert(&unit.root.collection);
        for (_, file) in unit.of_kind(FileKind::Record) {
            known.insert(file.stem());
        }
    }

    for (key, value) in mapping {
        let source = key.split('.').next().unwrap_or(key);
        let target = value.split('.').next().unwrap_or(value);
        for collection in [source, target] {
            if !known.contains(collection) {
                return Err(ConfigError::MissingCollection {
                    mapping: format!("{key} = {value}"),
                    collection: collection.to_string(),
                });
            }
        }
    }
    Ok(())
}

// =============================================================================
// Phase 2: parsing
// =============================================================================

enum Parsed {
    Document(ParsedDocument),
    Records(Vec<RecordNode>),
}

struct ParseOutput {
    documents: Vec<ParsedDocument>,
    records: Vec<RecordNode>,
    skipped: Vec<SkippedFile>,
}

fn parse_sources(
    listed: &[SourceFiles],
    cancel: &CancelToken,
    events: Events,
) -> Result<ParseOutput, BuildError> {
    cancel.check()?;
    let units: Vec<(&SourceFiles, &FileDescriptor)> = listed
        .iter()
        .flat_map(|unit| {
            unit.of_kind(FileKind::Document)
                .chain(unit.of_kind(FileKind::Record))
        })
        .collect();
    emit(
        events,
        BuildEvent::PhaseStarted {
            phase: Phase::Parse,
            units: units.len(),
        },
    );

    let results = units
        .par_iter()
        .map(|(unit, file)| {
            cancel.check()?;
            tracing::debug!("parsing {}", file.path.display());
            Ok(parse_file(unit, file))
        })
        .collect::<Result<Vec<_>, BuildError>>()?;

    let mut output = ParseOutput {
        documents: Vec::new(),
        records: Vec::new(),
        skipped: Vec::new(),
    };
    for result in results {
        match result {
            Ok(Parsed::Document(doc)) => output.documents.push(doc),
            Ok(Parsed::Records(nodes)) => output.records.extend(nodes),
            Err(skipped) => output.skipped.push(report_skip(skipped, events)),
        }
    }
    records::dedupe_ids(&mut output.records);
    Ok(output)
}

fn parse_file(unit: &SourceFiles, file: &FileDescriptor) -> Result<Parsed, SkippedFile> {
    let skip = |reason: String| SkippedFile {
        path: file.path.clone(),
        reason,
    };
    let contents = std::fs::read_to_string(&file.path).map_err(|e| skip(e.to_string()))?;

    if file.kind == FileKind::Document {
        return ParsedDocument::from_file(&unit.root, file, &contents, &unit.source.required_fields)
            .map(Parsed::Document)
            .map_err(|e| skip(e.to_string()));
    }
    let format = RecordFormat::from_extension(&file.extension)
        .ok_or_else(|| skip(format!("not a record file: .{}", file.extension)))?;
    let entries = records::parse(&contents, format).map_err(|e| skip(e.to_string()))?;
    Ok(Parsed::Records(records::into_nodes(&unit.root, file, entries)))
}

fn report_skip(skipped: SkippedFile, events: Events) -> SkippedFile {
    tracing::warn!("skipping {}: {}", skipped.path.display(), skipped.reason);
    emit(
        events,
        BuildEvent::FileSkipped {
            path: skipped.path.clone(),
            reason: skipped.reason.clone(),
        },
    );
    skipped
}

// =============================================================================
// Phase 3: images
// =============================================================================

fn identify_images(
    backend: &impl ImageBackend,
    listed: &[SourceFiles],
    cancel: &CancelToken,
    events: Events,
) -> Result<(Vec<ImageNode>, Vec<SkippedFile>), BuildError> {
    cancel.check()?;
    let units: Vec<(&SourceFiles, &FileDescriptor)> = listed
        .iter()
        .flat_map(|unit| unit.of_kind(FileKind::Image))
        .collect();

    let results = units
        .par_iter()
        .map(|(unit, file)| {
            cancel.check()?;
            Ok(identify(backend, &unit.root, file))
        })
        .collect::<Result<Vec<_>, BuildError>>()?;

    let mut images = Vec::new();
    let mut skipped = Vec::new();
    for result in results {
        match result {
            Ok(image) => images.push(image),
            Err(skip) => skipped.push(report_skip(skip, events)),
        }
    }
    Ok((images, skipped))
}

fn identify(
    backend: &impl ImageBackend,
    root: &ContentRoot,
    file: &FileDescriptor,
) -> Result<ImageNode, SkippedFile> {
    let skip = |reason: String| SkippedFile {
        path: file.path.clone(),
        reason,
    };
    let source = backend.identify(&file.path).map_err(|e| skip(e.to_string()))?;
    let content_hash = hash_file(&file.path).map_err(|e| skip(e.to_string()))?;
    Ok(ImageNode {
        id: NodeId::from_key(&format!(
            "{IMAGES_COLLECTION}/{}/{}",
            root.collection, file.relative_path
        )),
        source_instance: root.collection.clone(),
        source_path: file.relative_path.clone(),
        path: file.path.clone(),
        content_hash,
        natural_width: source.width,
        natural_height: source.height,
        format: source.format,
    })
}

/// Unique `(image index, constraint)` pairs, default constraints first.
fn plan_jobs(
    images: &[ImageNode],
    documents: &[ParsedDocument],
    config: &BuildConfig,
) -> Vec<(usize, Constraint)> {
    let default = default_constraint(&config.images);
    let mut jobs: Vec<(usize, Constraint)> = (0..images.len()).map(|i| (i, default)).collect();
    if !config.markdown.stages.images {
        return jobs;
    }

    let by_path: HashMap<&Path, usize> = images
        .iter()
        .enumerate()
        .map(|(i, image)| (image.path.as_path(), i))
        .collect();
    let body = body_constraint(config.markdown.max_width);
    let mut seen: HashSet<(usize, Constraint)> = jobs.iter().copied().collect();
    for doc in documents {
        for reference in local_image_refs(&doc.raw_body) {
            let path = resolve_relative(doc.source_dir(), &reference);
            if let Some(&i) = by_path.get(path.as_path())
                && seen.insert((i, body))
            {
                jobs.push((i, body));
            }
        }
    }
    jobs
}

struct Derived {
    /// Sets in job order.
    sets: Vec<DerivativeSet>,
    lookup: HashMap<(PathBuf, Constraint), DerivativeSet>,
    warnings: Vec<(NodeId, NodeWarning)>,
}

fn derive_images(
    backend: &impl ImageBackend,
    store: &DerivativeStore,
    images: &[ImageNode],
    documents: &[ParsedDocument],
    config: &BuildConfig,
    cancel: &CancelToken,
    events: Events,
) -> Result<Derived, BuildError> {
    cancel.check()?;
    let jobs = plan_jobs(images, documents, config);
    emit(
        events,
        BuildEvent::PhaseStarted {
            phase: Phase::Images,
            units: jobs.len(),
        },
    );
    tracing::info!("deriving {} image sets", jobs.len());

    let results = jobs
        .par_iter()
        .map(|&(i, constraint)| {
            cancel.check()?;
            let image = &images[i];
            let result = store.derive(backend, image, &constraint, &config.images);
            match &result {
                Ok(set) => {
                    tracing::debug!("derived {} ({constraint})", image.source_path);
                    emit(
                        events,
                        BuildEvent::ImageDerived {
                            source_path: image.source_path.clone(),
                            constraint,
                            derivatives: set.derivatives.len(),
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!("cannot derive {}: {e}", image.source_path);
                    emit(
                        events,
                        BuildEvent::ImageFailed {
                            source_path: image.source_path.clone(),
                            message: e.to_string(),
                        },
                    );
                }
            }
            Ok((i, result))
        })
        .collect::<Result<Vec<_>, BuildError>>()?;

    let mut derived = Derived {
        sets: Vec::new(),
        lookup: HashMap::new(),
        warnings: Vec::new(),
    };
    let mut failed = HashSet::new();
    for (i, result) in results {
        let image = &images[i];
        match result {
            Ok(set) => {
                derived
                    .lookup
                    .insert((image.path.clone(), set.constraint), set.clone());
                derived.sets.push(set);
            }
            Err(e) => {
                if failed.insert(i) {
                    derived.warnings.push((
                        image.id.clone(),
                        NodeWarning::UnsupportedFormat {
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }
    }
    Ok(derived)
}

// =============================================================================
// Phase 4: documents
// =============================================================================

/// Everything the chain may reference, built before any chain runs.
struct AssetIndex {
    images: HashMap<(PathBuf, Constraint), DerivativeSet>,
    files: HashMap<PathBuf, LinkedAsset>,
}

impl AssetLookup for AssetIndex {
    fn image(&self, path: &Path, constraint: &Constraint) -> Option<&DerivativeSet> {
        self.images.get(&(path.to_path_buf(), *constraint))
    }

    fn linked_file(&self, path: &Path) -> Option<LinkedAsset> {
        self.files.get(path).cloned()
    }
}

/// Public URI of a linked file: `/static/<content hash16>/<file name>`.
fn linked_uri(path: &Path, content_hash: &str) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        "/{STATIC_DIR}/{}/{name}",
        &content_hash[..content_hash.len().min(16)]
    )
}

/// Hash every listed file some document links to.
///
/// Unreadable targets are left out and surface as unresolved references.
fn index_linked_files(
    listed: &[SourceFiles],
    documents: &[ParsedDocument],
    cancel: &CancelToken,
) -> Result<HashMap<PathBuf, LinkedAsset>, BuildError> {
    cancel.check()?;
    let known: HashSet<&Path> = listed
        .iter()
        .flat_map(|unit| unit.files.iter().map(|f| f.path.as_path()))
        .collect();
    let targets: BTreeSet<PathBuf> = documents
        .iter()
        .flat_map(|doc| {
            local_link_targets(&doc.raw_body)
                .into_iter()
                .map(|target| resolve_relative(doc.source_dir(), &target))
        })
        .filter(|path| known.contains(path.as_path()))
        .collect();

    let hashed = targets
        .into_par_iter()
        .map(|path| {
            cancel.check()?;
            match hash_file(&path) {
                Ok(hash) => {
                    let uri = linked_uri(&path, &hash);
                    Ok(Some((path.clone(), LinkedAsset { source: path, uri })))
                }
                Err(e) => {
                    tracing::warn!("cannot read linked file {}: {e}", path.display());
                    Ok(None)
                }
            }
        })
        .collect::<Result<Vec<_>, BuildError>>()?;
    Ok(hashed.into_iter().flatten().collect())
}

fn transform_documents(
    documents: Vec<ParsedDocument>,
    index: &AssetIndex,
    config: &BuildConfig,
    cancel: &CancelToken,
    events: Events,
) -> Result<Vec<DocumentNode>, BuildError> {
    cancel.check()?;
    emit(
        events,
        BuildEvent::PhaseStarted {
            phase: Phase::Documents,
            units: documents.len(),
        },
    );
    let chain = Chain::from_config(&config.markdown.stages);

    documents
        .into_par_iter()
        .map(|doc| {
            cancel.check()?;
            let ctx = StageContext {
                source_dir: doc.source_dir(),
                metadata: &doc.metadata,
                assets: index,
                config: &config.markdown,
            };
            let output = transform(&doc.raw_body, &chain, &ctx);
            let node = doc.finish(output);
            for warning in &node.warnings {
                tracing::warn!("{}/{}: {warning}", node.collection, node.source_path);
            }
            emit(
                events,
                BuildEvent::DocumentBuilt {
                    collection: node.collection.clone(),
                    source_path: node.source_path.clone(),
                    warnings: node.warnings.len(),
                },
            );
            Ok(node)
        })
        .collect()
}

// =============================================================================
// Phase 5: assembly
// =============================================================================

/// Copy every file a built document links to. Returns the number of files.
///
/// Destinations are content-addressed, so an existing file is already
/// current.
fn copy_linked_files(documents: &[DocumentNode], output_dir: &Path) -> Result<usize, BuildError> {
    let assets: BTreeMap<&str, &Path> = documents
        .iter()
        .flat_map(|doc| &doc.linked_files)
        .map(|asset| (asset.uri.as_str(), asset.source.as_path()))
        .collect();

    for (uri, source) in &assets {
        let dest = output_dir.join(uri.trim_start_matches('/'));
        if dest.exists() {
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, &dest)?;
        tracing::debug!("copied {} -> {uri}", source.display());
    }
    Ok(assets.len())
}

fn site_fields(site: &toml::Table) -> FieldMap {
    site.iter()
        .map(|(key, value)| (key.clone(), FieldValue::from(value.clone())))
        .collect()
}
