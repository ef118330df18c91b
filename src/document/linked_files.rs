//! Stage 4: local file links → content-addressed static copies.
//!
//! `[slides](./talk.pdf)` becomes `[slides](/static/<hash>/talk.pdf)` and the
//! file is reported for copying. Links to pages (`.md`, `.html`, no extension)
//! and to images are left for routing and the image stage.

use super::chain::{StageContext, StageReport, apply_edits, is_local_reference, parser_options};
use super::chain::{reference_extension, resolve_relative, strip_suffix};
use crate::sources::FileKind;
use pulldown_cmark::{Event, LinkType, Parser, Tag, TagEnd};
use std::ops::Range;

const PAGE_EXTENSIONS: [&str; 5] = ["", "md", "markdown", "html", "htm"];

fn is_linked_file(dest: &str) -> bool {
    if !is_local_reference(dest) {
        return false;
    }
    let ext = reference_extension(dest);
    !PAGE_EXTENSIONS.contains(&ext.as_str()) && FileKind::from_extension(&ext) != FileKind::Image
}

/// Local file link destinations in a body, suffix stripped, in document order.
pub fn local_link_targets(body: &str) -> Vec<String> {
    Parser::new_ext(body, parser_options())
        .filter_map(|event| match event {
            Event::Start(Tag::Link {
                link_type: LinkType::Inline,
                dest_url,
                ..
            }) => {
                let dest = strip_suffix(&dest_url);
                is_linked_file(dest).then(|| dest.to_string())
            }
            _ => None,
        })
        .collect()
}

struct PendingLink {
    range: Range<usize>,
    dest: String,
    text_end: usize,
}

/// Byte range of `dest` inside the link source `[text](dest "title")`.
fn dest_range(body: &str, link: &PendingLink, dest: &str) -> Option<Range<usize>> {
    let from = link.text_end.max(link.range.start);
    let open = body[from..link.range.end].find("](")? + from + 2;
    let after = &body[open..link.range.end];
    let skipped = after.len() - after.trim_start().len();
    let mut start = open + skipped;
    if body[start..].starts_with('<') {
        start += 1;
    }
    body[start..link.range.end]
        .starts_with(dest)
        .then(|| start..start + dest.len())
}

pub(crate) fn rewrite(body: &str, ctx: &StageContext, report: &mut StageReport) -> String {
    let mut edits = Vec::new();
    let mut stack: Vec<Option<PendingLink>> = Vec::new();

    for (event, range) in Parser::new_ext(body, parser_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                ..
            }) => {
                let pending = (link_type == LinkType::Inline).then(|| PendingLink {
                    text_end: range.start,
                    range,
                    dest: dest_url.to_string(),
                });
                stack.push(pending);
            }
            Event::End(TagEnd::Link) => {
                let Some(Some(link)) = stack.pop() else { continue };
                let dest = strip_suffix(&link.dest);
                if !is_linked_file(dest) {
                    continue;
                }
                let path = resolve_relative(ctx.source_dir, dest);
                let Some(asset) = ctx.assets.linked_file(&path) else {
                    tracing::debug!("unresolved linked file {}", path.display());
                    report.unresolved(&link.dest);
                    continue;
                };
                if let Some(at) = dest_range(body, &link, dest) {
                    edits.push((at, asset.uri.clone()));
                    report.linked_files.push(asset);
                }
            }
            _ => {
                if let Some(Some(link)) = stack.last_mut() {
                    link.text_end = link.text_end.max(range.end);
                }
            }
        }
    }

    apply_edits(body, edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkdownConfig;
    use crate::fields::FieldMap;
    use crate::test_helpers::TestAssets;
    use std::path::{Path, PathBuf};

    fn run(body: &str, assets: &TestAssets) -> (String, StageReport) {
        let config = MarkdownConfig::default();
        let metadata = FieldMap::new();
        let ctx = StageContext {
            source_dir: Path::new("/blog/talk"),
            metadata: &metadata,
            assets,
            config: &config,
        };
        let mut report = StageReport::default();
        let out = rewrite(body, &ctx, &mut report);
        (out, report)
    }

    fn assets_with_slides() -> TestAssets {
        let mut assets = TestAssets::default();
        assets.add_file("/blog/talk/slides.pdf", "/static/0123456789abcdef/slides.pdf");
        assets
    }

    #[test]
    fn local_file_link_is_rewritten() {
        let assets = assets_with_slides();
        let (out, report) = run("Get the [slides](./slides.pdf \"PDF\").\n", &assets);
        assert_eq!(
            out,
            "Get the [slides](/static/0123456789abcdef/slides.pdf \"PDF\").\n"
        );
        assert_eq!(report.linked_files.len(), 1);
        assert_eq!(
            report.linked_files[0].source,
            PathBuf::from("/blog/talk/slides.pdf")
        );
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn fragment_is_kept() {
        let assets = assets_with_slides();
        let (out, _) = run("[p2](slides.pdf#page=2)\n", &assets);
        assert_eq!(out, "[p2](/static/0123456789abcdef/slides.pdf#page=2)\n");
    }

    #[test]
    fn link_text_mentioning_destination_is_untouched() {
        let assets = assets_with_slides();
        let (out, _) = run("[./slides.pdf](./slides.pdf)\n", &assets);
        assert_eq!(out, "[./slides.pdf](/static/0123456789abcdef/slides.pdf)\n");
    }

    #[test]
    fn missing_file_warns() {
        let assets = TestAssets::default();
        let body = "[notes](./notes.txt)\n";
        let (out, report) = run(body, &assets);
        assert_eq!(out, body);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].to_string().contains("./notes.txt"));
    }

    #[test]
    fn pages_images_and_remote_links_untouched() {
        let assets = assets_with_slides();
        let body = "[a](../other-post/) [b](./post.md) [c](https://x.org/a.pdf) [d](./pic.jpg) [e](/static/x.pdf)\n";
        let (out, report) = run(body, &assets);
        assert_eq!(out, body);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn rewrite_is_idempotent() {
        let assets = assets_with_slides();
        let (once, _) = run("[slides](./slides.pdf)\n", &assets);
        let (twice, report) = run(&once, &assets);
        assert_eq!(once, twice);
        assert!(report.linked_files.is_empty());
    }

    #[test]
    fn targets_are_collected() {
        assert_eq!(
            local_link_targets("[a](./a.pdf) [b](b.md) [c](./c.zip?x=1) ![d](./d.png)"),
            vec!["./a.pdf", "./c.zip"]
        );
    }
}
