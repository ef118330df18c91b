//! CLI output formatting for builds and checks.
//!
//! # Information-First Display
//!
//! Output is **information-centric, not file-centric**. Every node is shown by
//! its semantic identity (title, or id when it has none) under a positional
//! index, with filesystem paths as secondary context on indented `Source:`
//! lines. The graph summary reads as a content inventory while still letting
//! users trace data back to specific files.
//!
//! # Output Format
//!
//! ## Build progress
//!
//! ```text
//! ==> Discovering sources
//!     blog: 12 files
//! ==> Deriving images (6)
//!     salty-egg/salty_egg.jpg (constrained 590): 5 derivatives
//!     drafts/broken.png: FAILED unsupported format
//! ==> Transforming documents (3)
//!     blog/salty-egg/index.md
//!     blog/old/index.md (1 warning)
//! ```
//!
//! ## Graph summary
//!
//! ```text
//! Collections
//! 001 blog (2 nodes)
//!     001 Salty Egg
//!         Source: salty-egg/index.md
//! 002 talks (2 nodes)
//!     001 Fantastic Bugs and How to Fix Them
//!     002 Second Talk
//! ```
//!
//! ## Report
//!
//! ```text
//! Skipped
//!     drafts/index.md: missing required field `title`
//!
//! Warnings
//!     blog 3f9a1c0e5b7d2468: unresolved asset: ./missing.png
//!
//! Built 2 documents, 3 records, 4 images (6 derivative sets, 1 linked file)
//! Cache: 4 cached, 2 encoded (6 total)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::fields::FieldValue;
use crate::graph::{ContentGraph, GraphNode};
use crate::pipeline::{BuildEvent, BuildReport};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 document`, `2 documents`.
fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Display title of a node: its `title` (top level or in front matter),
/// else `name`, else the id.
fn node_title(node: &GraphNode) -> String {
    let frontmatter = node.fields.get("frontmatter").and_then(FieldValue::as_map);
    ["title", "name"]
        .iter()
        .find_map(|key| {
            node.fields
                .get(*key)
                .or_else(|| frontmatter.and_then(|m| m.get(*key)))
                .and_then(FieldValue::as_str)
        })
        .map(|t| truncate(t, 60))
        .unwrap_or_else(|| format!("({})", node.id))
}

// ============================================================================
// Build progress
// ============================================================================

/// Format a single build progress event as display lines.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::PhaseStarted { phase, units } => match phase {
            crate::pipeline::Phase::Discover => vec![format!("==> {phase}")],
            _ => vec![format!("==> {phase} ({units})")],
        },
        BuildEvent::RootListed {
            collection, files, ..
        } => vec![format!("{}{collection}: {}", indent(1), plural(*files, "file"))],
        BuildEvent::FileSkipped { path, reason } => {
            vec![format!("{}SKIPPED {}: {reason}", indent(1), path.display())]
        }
        BuildEvent::ImageDerived {
            source_path,
            constraint,
            derivatives,
        } => vec![format!(
            "{}{source_path} ({constraint}): {}",
            indent(1),
            plural(*derivatives, "derivative")
        )],
        BuildEvent::ImageFailed {
            source_path,
            message,
        } => vec![format!("{}{source_path}: FAILED {message}", indent(1))],
        BuildEvent::DocumentBuilt {
            collection,
            source_path,
            warnings,
        } => {
            let detail = if *warnings > 0 {
                format!(" ({})", plural(*warnings, "warning"))
            } else {
                String::new()
            };
            vec![format!("{}{collection}/{source_path}{detail}", indent(1))]
        }
    }
}

// ============================================================================
// Graph summary
// ============================================================================

/// Format every collection and its nodes in source order.
///
/// The `site` node is not listed; it is configuration, not content.
pub fn format_graph_summary(graph: &ContentGraph) -> Vec<String> {
    let mut lines = vec!["Collections".to_string()];
    let names = graph
        .collection_names()
        .filter(|name| *name != crate::types::SITE_COLLECTION);

    for (i, name) in names.enumerate() {
        let nodes = graph.collection(name).unwrap_or_default();
        lines.push(format!(
            "{} {name} ({})",
            format_index(i + 1),
            plural(nodes.len(), "node")
        ));
        for (j, node) in nodes.iter().enumerate() {
            lines.push(format!(
                "{}{} {}",
                indent(1),
                format_index(j + 1),
                node_title(node)
            ));
            if let Some(source) = node.fields.get("source_path").and_then(FieldValue::as_str) {
                lines.push(format!("{}Source: {source}", indent(2)));
            }
        }
    }
    lines
}

/// Print the graph summary to stdout.
pub fn print_graph_summary(graph: &ContentGraph) {
    for line in format_graph_summary(graph) {
        println!("{}", line);
    }
}

// ============================================================================
// Build and check reports
// ============================================================================

fn format_problems(report: &BuildReport, lines: &mut Vec<String>) {
    if !report.skipped.is_empty() {
        lines.push("Skipped".to_string());
        for skipped in &report.skipped {
            lines.push(format!(
                "{}{}: {}",
                indent(1),
                skipped.path.display(),
                skipped.reason
            ));
        }
        lines.push(String::new());
    }
    if !report.warnings.is_empty() {
        lines.push("Warnings".to_string());
        for w in &report.warnings {
            lines.push(format!(
                "{}{} {}: {}",
                indent(1),
                w.collection,
                w.node,
                w.warning
            ));
        }
        lines.push(String::new());
    }
}

/// Format the end-of-build report: problems first, then totals.
pub fn format_build_report(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();
    format_problems(report, &mut lines);
    lines.push(format!(
        "Built {}, {}, {} ({}, {})",
        plural(report.documents, "document"),
        plural(report.records, "record"),
        plural(report.images, "image"),
        plural(report.derivative_sets, "derivative set"),
        plural(report.linked_files, "linked file"),
    ));
    lines.push(format!("Cache: {}", report.cache));
    lines
}

/// Print the build report to stdout.
pub fn print_build_report(report: &BuildReport) {
    for line in format_build_report(report) {
        println!("{}", line);
    }
}

/// Format the report of `check`, which derives nothing.
pub fn format_check_report(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();
    format_problems(report, &mut lines);
    lines.push(format!(
        "Found {}, {}, {}",
        plural(report.documents, "document"),
        plural(report.records, "record"),
        plural(report.images, "image"),
    ));
    lines
}

/// Print the check report to stdout.
pub fn print_check_report(report: &BuildReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStats;
    use crate::fields::FieldMap;
    use crate::graph::{GraphInputs, assemble};
    use crate::imaging::{Constraint, Layout};
    use crate::pipeline::{Phase, ReportedWarning, SkippedFile};
    use crate::records::{RecordFormat, into_nodes, parse};
    use crate::sources::{ContentRoot, FileDescriptor, FileKind, KindHint};
    use crate::types::{NodeId, NodeWarning};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(1234), "1234");
    }

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(1), "    ");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "file"), "1 file");
        assert_eq!(plural(0, "file"), "0 files");
        assert_eq!(plural(3, "file"), "3 files");
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("crème brûlée", 5), "crème...");
    }

    // =========================================================================
    // Event formatting tests
    // =========================================================================

    #[test]
    fn phase_lines() {
        let lines = format_build_event(&BuildEvent::PhaseStarted {
            phase: Phase::Images,
            units: 6,
        });
        assert_eq!(lines, vec!["==> Deriving images (6)"]);

        let lines = format_build_event(&BuildEvent::PhaseStarted {
            phase: Phase::Discover,
            units: 2,
        });
        assert_eq!(lines, vec!["==> Discovering sources"]);
    }

    #[test]
    fn image_lines() {
        let lines = format_build_event(&BuildEvent::ImageDerived {
            source_path: "salty-egg/salty_egg.jpg".into(),
            constraint: Constraint::Layout(Layout::Constrained(590)),
            derivatives: 5,
        });
        assert_eq!(
            lines,
            vec!["    salty-egg/salty_egg.jpg (constrained 590): 5 derivatives"]
        );

        let lines = format_build_event(&BuildEvent::ImageFailed {
            source_path: "broken.png".into(),
            message: "Unsupported format: broken.png".into(),
        });
        assert_eq!(lines, vec!["    broken.png: FAILED Unsupported format: broken.png"]);
    }

    #[test]
    fn document_lines_mention_warnings() {
        let clean = format_build_event(&BuildEvent::DocumentBuilt {
            collection: "blog".into(),
            source_path: "salty-egg/index.md".into(),
            warnings: 0,
        });
        assert_eq!(clean, vec!["    blog/salty-egg/index.md"]);

        let warned = format_build_event(&BuildEvent::DocumentBuilt {
            collection: "blog".into(),
            source_path: "old/index.md".into(),
            warnings: 1,
        });
        assert_eq!(warned, vec!["    blog/old/index.md (1 warning)"]);
    }

    #[test]
    fn root_and_skip_lines() {
        let lines = format_build_event(&BuildEvent::RootListed {
            collection: "blog".into(),
            path: PathBuf::from("/site/content/blog"),
            files: 12,
        });
        assert_eq!(lines, vec!["    blog: 12 files"]);

        let lines = format_build_event(&BuildEvent::FileSkipped {
            path: PathBuf::from("/site/data/broken.yaml"),
            reason: "Record parse error: bad".into(),
        });
        assert_eq!(
            lines,
            vec!["    SKIPPED /site/data/broken.yaml: Record parse error: bad"]
        );
    }

    // =========================================================================
    // Summary and report tests
    // =========================================================================

    #[test]
    fn graph_summary_lists_collections_in_source_order() {
        let root = ContentRoot {
            path: PathBuf::from("/site/data"),
            collection: "data".into(),
            kind_hint: KindHint::Records,
        };
        let file = FileDescriptor {
            path: PathBuf::from("/site/data/talks.yaml"),
            relative_path: "talks.yaml".into(),
            extension: "yaml".into(),
            size: 0,
            kind: FileKind::Record,
        };
        let entries = parse(
            "- title: Fantastic Bugs\n- name: Untitled Talk\n- abstract: none\n",
            RecordFormat::Yaml,
        )
        .unwrap();
        let inputs = GraphInputs {
            records: into_nodes(&root, &file, entries),
            ..GraphInputs::default()
        };
        let graph = assemble(inputs, &BTreeMap::new(), FieldMap::new());

        let lines = format_graph_summary(&graph);
        assert_eq!(lines[0], "Collections");
        assert_eq!(lines[1], "001 images (0 nodes)");
        assert_eq!(lines[2], "002 talks (3 nodes)");
        assert_eq!(lines[3], "    001 Fantastic Bugs");
        assert_eq!(lines[4], "    002 Untitled Talk");
        assert!(lines[5].starts_with("    003 ("));
        assert_eq!(lines.len(), 6);
        assert!(!lines.iter().any(|l| l.contains(" site ")));
    }

    fn report() -> BuildReport {
        BuildReport {
            documents: 2,
            records: 3,
            images: 1,
            derivative_sets: 2,
            linked_files: 1,
            skipped: vec![SkippedFile {
                path: PathBuf::from("drafts/index.md"),
                reason: "Missing required field: title".into(),
            }],
            warnings: vec![ReportedWarning {
                node: NodeId::explicit("abc"),
                collection: "blog".into(),
                warning: NodeWarning::UnresolvedAsset {
                    reference: "./missing.png".into(),
                },
            }],
            cache: CacheStats {
                hits: 4,
                copies: 0,
                misses: 2,
            },
        }
    }

    #[test]
    fn build_report_layout() {
        let lines = format_build_report(&report());
        assert_eq!(
            lines,
            vec![
                "Skipped",
                "    drafts/index.md: Missing required field: title",
                "",
                "Warnings",
                "    blog abc: unresolved asset: ./missing.png",
                "",
                "Built 2 documents, 3 records, 1 image (2 derivative sets, 1 linked file)",
                "Cache: 4 cached, 2 encoded (6 total)",
            ]
        );
    }

    #[test]
    fn clean_report_has_only_totals() {
        let lines = format_build_report(&BuildReport::default());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Built 0 documents"));
    }

    #[test]
    fn check_report_has_no_cache_line() {
        let lines = format_check_report(&report());
        assert_eq!(lines.last().unwrap(), "Found 2 documents, 3 records, 1 image");
        assert!(!lines.iter().any(|l| l.starts_with("Cache")));
    }
}
