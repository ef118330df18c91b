//! # quire
//!
//! A build-time content graph compiler for static blogs. Markdown posts,
//! YAML/JSON record files and raster images go in; a sealed, queryable graph
//! of typed nodes comes out, together with responsive image derivatives
//! written under the output directory.
//!
//! # Architecture: Phased Build
//!
//! ```text
//! 1. Discover   [[sources]]  →  file lists         (one walk per root)
//! 2. Parse      files        →  documents, records (front matter, YAML, JSON)
//! 3. Images     images       →  derivative sets    (identify, resize, cache)
//! 4. Documents  bodies       →  transformed bodies (five-stage chain)
//! 5. Assemble   nodes        →  ContentGraph       (references, schema, seal)
//! ```
//!
//! Each phase finishes before the next starts. Inside a phase, units run in
//! parallel on rayon. Once assembled, the graph is immutable and can be
//! queried from any thread.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`sources`] | Content roots and file discovery |
//! | [`document`] | Front matter, slugs, excerpts and the markdown transformer chain |
//! | [`records`] | YAML/JSON record files as node entries |
//! | [`imaging`] | `ImageBackend` trait, derivative planning, placeholders |
//! | [`cache`] | Content-addressed derivative cache for incremental builds |
//! | [`typography`] | Vertical rhythm and modular type scale |
//! | [`graph`] | Graph assembly, inferred schema and the query engine |
//! | [`fields`] | The schema-less `FieldValue` tree shared by every node |
//! | [`pipeline`] | Build orchestration, cancellation and progress events |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`types`] | Node ids, kinds and warnings |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## A Fixed Transformer Chain
//!
//! Markdown bodies pass through five stages in a fixed order: images, embeds,
//! highlight, linked files, punctuation. Stages can be switched off in config
//! but never reordered. Each stage is a pure function of the body and its
//! context, and running the chain over its own output changes nothing.
//!
//! ## Derive Before Transform
//!
//! Every image a body references is derived before any chain runs, so the
//! images stage only ever looks up finished derivative sets. Each unique
//! `(image, constraint)` pair is derived once no matter how many documents
//! reference it.
//!
//! ## Ids Over Pointers
//!
//! Nodes reference each other by [`types::NodeId`], resolved through the
//! graph index at assembly time. A dangling reference is a warning on the node
//! and an error only when a query actually needs its target.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate for decoding, Lanczos3
//! resampling and encoding. No ImageMagick, no system libraries: the binary is
//! self-contained.

pub mod cache;
pub mod config;
pub mod document;
pub mod fields;
pub mod graph;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod records;
pub mod sources;
pub mod types;
pub mod typography;

#[cfg(test)]
pub(crate) mod test_helpers;
