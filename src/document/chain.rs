//! The fixed, ordered chain of body-rewriting stages.
//!
//! | # | Stage | Rewrites |
//! |---|---|---|
//! | 1 | [`Images`](StageKind::Images) | local `![alt](src)` → responsive `<img>` markup |
//! | 2 | [`Embeds`](StageKind::Embeds) | `<iframe>`/`<video>`/… → aspect-ratio wrapper |
//! | 3 | [`Highlight`](StageKind::Highlight) | fenced code → `<pre>` with token spans |
//! | 4 | [`LinkedFiles`](StageKind::LinkedFiles) | local `[x](file.pdf)` → `/static/<hash>/file.pdf` |
//! | 5 | [`Punctuation`](StageKind::Punctuation) | `"` `'` `--` `---` `...` → typographic forms |
//!
//! Every stage is a plain function over markdown source. Stages locate what
//! they rewrite with `pulldown-cmark`'s offset iterator and splice replacements
//! into the original text, so untouched markdown passes through byte for byte
//! and later stages see earlier rewrites. Each stage produces output it would
//! leave alone on a second run; the chain as a whole is idempotent.

use super::{embeds, highlight, images, linked_files, punctuation};
use crate::config::{MarkdownConfig, StagesConfig};
use crate::fields::FieldMap;
use crate::imaging::{Constraint, DerivativeSet};
use crate::types::NodeWarning;
use pulldown_cmark::Options;
use serde::Serialize;
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

/// Markdown extensions enabled for every parse, in the chain and for HTML.
pub(crate) fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// A file a document links to, materialized under the static directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LinkedAsset {
    /// Absolute source path.
    pub source: PathBuf,
    /// Public URI, `/static/<hash>/<file name>`.
    pub uri: String,
}

/// Resolves body references to built assets.
///
/// Implemented by the pipeline over everything derived before the chain runs.
pub trait AssetLookup: Sync {
    /// Derivative set of the image at `path` for `constraint`.
    fn image(&self, path: &Path, constraint: &Constraint) -> Option<&DerivativeSet>;

    /// Materialization target of a linked file.
    fn linked_file(&self, path: &Path) -> Option<LinkedAsset>;
}

/// What a stage sees besides the body.
pub struct StageContext<'a> {
    /// Directory of the document; relative references resolve against it.
    pub source_dir: &'a Path,
    pub metadata: &'a FieldMap,
    pub assets: &'a dyn AssetLookup,
    pub config: &'a MarkdownConfig,
}

/// Side output collected while stages run.
#[derive(Debug, Default)]
pub struct StageReport {
    pub warnings: Vec<NodeWarning>,
    pub linked_files: Vec<LinkedAsset>,
}

impl StageReport {
    pub(crate) fn unresolved(&mut self, reference: &str) {
        self.warnings.push(NodeWarning::UnresolvedAsset {
            reference: reference.to_string(),
        });
    }
}

type StageFn = fn(&str, &StageContext, &mut StageReport) -> String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Images,
    Embeds,
    Highlight,
    LinkedFiles,
    Punctuation,
}

impl StageKind {
    /// Composition order. Not configurable.
    pub const ORDER: [StageKind; 5] = [
        StageKind::Images,
        StageKind::Embeds,
        StageKind::Highlight,
        StageKind::LinkedFiles,
        StageKind::Punctuation,
    ];

    fn function(self) -> StageFn {
        match self {
            StageKind::Images => images::rewrite,
            StageKind::Embeds => embeds::rewrite,
            StageKind::Highlight => highlight::rewrite,
            StageKind::LinkedFiles => linked_files::rewrite,
            StageKind::Punctuation => punctuation::rewrite,
        }
    }

    fn enabled(self, stages: &StagesConfig) -> bool {
        match self {
            StageKind::Images => stages.images,
            StageKind::Embeds => stages.embeds,
            StageKind::Highlight => stages.highlight,
            StageKind::LinkedFiles => stages.linked_files,
            StageKind::Punctuation => stages.punctuation,
        }
    }
}

/// The enabled stages, always in [`StageKind::ORDER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    stages: Vec<StageKind>,
}

impl Chain {
    /// All five stages.
    pub fn full() -> Self {
        Self {
            stages: StageKind::ORDER.to_vec(),
        }
    }

    pub fn from_config(stages: &StagesConfig) -> Self {
        Self {
            stages: StageKind::ORDER
                .into_iter()
                .filter(|s| s.enabled(stages))
                .collect(),
        }
    }

    pub fn stages(&self) -> &[StageKind] {
        &self.stages
    }
}

/// Result of running the chain over one body.
#[derive(Debug)]
pub struct ChainOutput {
    pub body: String,
    pub warnings: Vec<NodeWarning>,
    pub linked_files: Vec<LinkedAsset>,
}

/// Run every enabled stage over `raw_body`, in order.
pub fn transform(raw_body: &str, chain: &Chain, ctx: &StageContext) -> ChainOutput {
    let mut report = StageReport::default();
    let mut body = raw_body.to_string();
    for stage in chain.stages() {
        body = (stage.function())(&body, ctx, &mut report);
    }
    let mut seen = HashSet::new();
    report.linked_files.retain(|asset| seen.insert(asset.clone()));
    ChainOutput {
        body,
        warnings: report.warnings,
        linked_files: report.linked_files,
    }
}

// =============================================================================
// Shared helpers for stages
// =============================================================================

/// Splice replacements into `source`. Overlapping edits after the first are
/// dropped.
pub(crate) fn apply_edits(source: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    if edits.is_empty() {
        return source.to_string();
    }
    edits.sort_by_key(|(range, _)| range.start);
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        if range.start < cursor {
            continue;
        }
        out.push_str(&source[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// True for relative references that point into the content tree.
///
/// Absolute paths, fragments, protocol-relative URLs and anything with a URI
/// scheme (`https:`, `mailto:`, `data:`) are not local.
pub(crate) fn is_local_reference(dest: &str) -> bool {
    if dest.is_empty() || dest.starts_with('/') || dest.starts_with('#') || dest.starts_with('?') {
        return false;
    }
    !has_scheme(dest)
}

fn has_scheme(dest: &str) -> bool {
    let Some((scheme, _)) = dest.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Drop any `?query` or `#fragment`.
pub(crate) fn strip_suffix(dest: &str) -> &str {
    dest.split(['?', '#']).next().unwrap_or(dest)
}

/// Lowercase extension of a reference path, empty when absent.
pub(crate) fn reference_extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Join and lexically normalize (`.` and `..`) without touching the
/// filesystem.
pub fn resolve_relative(base: &Path, reference: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in base.join(reference).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
