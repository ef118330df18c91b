//! Markdown documents with YAML front matter.
//!
//! A document file is split into metadata and body by [`parse`], the body is
//! run through the fixed rewriting [`chain`], and the result is rendered to
//! HTML. Everything a page template needs about a post (slug, excerpt, reading
//! time) is derived here once, at build time.
//!
//! ```text
//! ---
//! title: Salty Egg
//! date: 2019-08-03
//! ---
//! Body markdown…
//! ```

pub mod chain;
mod embeds;
mod highlight;
mod images;
mod linked_files;
mod punctuation;

pub use chain::{
    AssetLookup, Chain, ChainOutput, LinkedAsset, StageContext, StageKind, StageReport,
    resolve_relative, transform,
};
pub use images::{body_constraint, local_image_refs};
pub use linked_files::local_link_targets;
pub use punctuation::smarten;

use crate::fields::{FieldMap, FieldValue};
use crate::sources::{ContentRoot, FileDescriptor};
use crate::types::{NodeId, NodeWarning};
use pulldown_cmark::{Event, Parser, TagEnd};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reading speed used for `time_to_read`, in words per minute.
const WORDS_PER_MINUTE: usize = 265;

/// Excerpt length in characters, before the ellipsis.
const EXCERPT_CHARS: usize = 140;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Malformed front matter: {0}")]
    MalformedMetadata(String),
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),
}

/// Split a document into front matter and body.
///
/// Front matter is a YAML mapping between a first line of `---` and the next
/// line that is exactly `---` or `...`. Without a leading `---` the whole file
/// is body.
pub fn parse(contents: &str) -> Result<(FieldMap, String), DocumentError> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let mut lines = contents.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok((FieldMap::new(), String::new()));
    };
    if first.trim_end() != "---" {
        return Ok((FieldMap::new(), contents.to_string()));
    }

    let mut offset = first.len();
    let mut yaml_end = None;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            yaml_end = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }
    let Some((yaml_end, body_start)) = yaml_end else {
        return Err(DocumentError::MalformedMetadata(
            "front matter is not terminated".to_string(),
        ));
    };

    let yaml = &contents[first.len()..yaml_end];
    let metadata = if yaml.trim().is_empty() {
        FieldMap::new()
    } else {
        match serde_yaml::from_str::<FieldValue>(yaml)
            .map_err(|e| DocumentError::MalformedMetadata(e.to_string()))?
        {
            FieldValue::Map(map) => map,
            FieldValue::Null => FieldMap::new(),
            _ => {
                return Err(DocumentError::MalformedMetadata(
                    "front matter must be a mapping".to_string(),
                ));
            }
        }
    };

    Ok((metadata, contents[body_start..].to_string()))
}

/// Fail when any of `required` is absent or null.
pub fn check_required(metadata: &FieldMap, required: &[String]) -> Result<(), DocumentError> {
    match required
        .iter()
        .find(|name| metadata.get(*name).is_none_or(FieldValue::is_null))
    {
        Some(name) => Err(DocumentError::MissingRequiredField(name.clone())),
        None => Ok(()),
    }
}

/// Public path of a document: `/<relative path without extension>/`, with a
/// trailing `index` collapsing to its directory.
pub fn slug(relative_path: &str) -> String {
    let name_start = relative_path.rfind('/').map_or(0, |i| i + 1);
    let without_ext = match relative_path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &relative_path[..name_start + dot],
        _ => relative_path,
    };
    let trimmed = without_ext
        .strip_suffix("/index")
        .or_else(|| (without_ext == "index").then_some(""))
        .unwrap_or(without_ext);
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// CommonMark rendering, with the same extensions the chain parses with.
pub fn render_html(body: &str) -> String {
    let mut html = String::with_capacity(body.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut html, Parser::new_ext(body, chain::parser_options()));
    html
}

/// Prose of a body with markup and raw HTML dropped.
pub fn plain_text(body: &str) -> String {
    let mut out = String::new();
    for event in Parser::new_ext(body, chain::parser_options()) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::TableCell,
            ) => out.push(' '),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `EXCERPT_CHARS` characters, cut back to a word boundary.
pub fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .nth(EXCERPT_CHARS)
        .map_or(text.len(), |(i, _)| i);
    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => &head[..space],
        _ => head,
    };
    format!("{}…", head.trim_end_matches([',', ';', ':', ' ']))
}

pub fn time_to_read(word_count: usize) -> usize {
    word_count.div_ceil(WORDS_PER_MINUTE).max(1)
}

/// A document after front-matter parsing, before the chain runs.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub id: NodeId,
    pub collection: String,
    pub source_path: String,
    pub path: PathBuf,
    pub metadata: FieldMap,
    pub raw_body: String,
}

impl ParsedDocument {
    /// Parse a document file of `root` and check the root's required fields.
    pub fn from_file(
        root: &ContentRoot,
        file: &FileDescriptor,
        contents: &str,
        required: &[String],
    ) -> Result<Self, DocumentError> {
        let (metadata, raw_body) = parse(contents)?;
        check_required(&metadata, required)?;
        Ok(Self {
            id: NodeId::from_key(&format!("{}/{}", root.collection, file.relative_path)),
            collection: root.collection.clone(),
            source_path: file.relative_path.clone(),
            path: file.path.clone(),
            metadata,
            raw_body,
        })
    }

    /// Directory relative references in the body resolve against.
    pub fn source_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }

    /// Combine with the chain output into the final node.
    pub fn finish(self, output: ChainOutput) -> DocumentNode {
        let html = render_html(&output.body);
        let text = plain_text(&output.body);
        let word_count = text.split_whitespace().count();
        DocumentNode {
            slug: slug(&self.source_path),
            excerpt: excerpt(&text),
            time_to_read: time_to_read(word_count),
            word_count,
            html,
            id: self.id,
            source_instance: self.collection.clone(),
            collection: self.collection,
            source_path: self.source_path,
            path: self.path,
            metadata: self.metadata,
            raw_body: self.raw_body,
            transformed_body: output.body,
            warnings: output.warnings,
            linked_files: output.linked_files,
        }
    }
}

/// A fully built document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentNode {
    pub id: NodeId,
    pub collection: String,
    pub source_instance: String,
    pub source_path: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub slug: String,
    pub metadata: FieldMap,
    pub raw_body: String,
    /// Output of the chain over `raw_body`.
    pub transformed_body: String,
    pub html: String,
    pub excerpt: String,
    pub word_count: usize,
    pub time_to_read: usize,
    pub warnings: Vec<NodeWarning>,
    #[serde(skip)]
    pub linked_files: Vec<LinkedAsset>,
}

impl DocumentNode {
    /// Queryable view of the document; front matter nests under
    /// `frontmatter`.
    pub fn fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), self.id.as_str().into());
        fields.insert("slug".into(), self.slug.as_str().into());
        fields.insert("source_path".into(), self.source_path.as_str().into());
        fields.insert("frontmatter".into(), FieldValue::Map(self.metadata.clone()));
        fields.insert("body".into(), self.transformed_body.as_str().into());
        fields.insert("html".into(), self.html.as_str().into());
        fields.insert("excerpt".into(), self.excerpt.as_str().into());
        fields.insert("word_count".into(), FieldValue::Int(self.word_count as i64));
        fields.insert("time_to_read".into(), FieldValue::Int(self.time_to_read as i64));
        fields
    }
}
