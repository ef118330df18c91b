//! Stage 1: local image references → responsive image markup.
//!
//! `![alt](./photo.jpg "title")` becomes a single line of inline HTML: a
//! wrapper capped at the image's display width, a padding box painted with
//! the blurred placeholder, and a lazily loaded `<img>` with `srcset`/`sizes`.
//! When more than one output format is configured the `<img>` is wrapped in a
//! `<picture>` with one `<source>` per extra format.

use super::chain::{StageContext, StageReport, apply_edits, is_local_reference, parser_options};
use super::chain::{reference_extension, resolve_relative, strip_suffix};
use crate::imaging::{Constraint, DerivativeSet, Layout, aspect_percent};
use crate::sources::FileKind;
use maud::html;
use pulldown_cmark::{Event, LinkType, Parser, Tag, TagEnd};
use std::ops::Range;

/// Constraint inline images are derived for.
pub fn body_constraint(max_width: u32) -> Constraint {
    Constraint::Layout(Layout::Constrained(max_width))
}

/// Local inline image references in a body, in document order.
///
/// The pipeline uses this to request derivatives before the chain runs.
pub fn local_image_refs(body: &str) -> Vec<String> {
    let mut refs = Vec::new();
    for event in Parser::new_ext(body, parser_options()) {
        if let Event::Start(Tag::Image {
            link_type: LinkType::Inline,
            dest_url,
            ..
        }) = event
        {
            let dest = strip_suffix(&dest_url);
            if is_local_image(dest) {
                refs.push(dest.to_string());
            }
        }
    }
    refs
}

fn is_local_image(dest: &str) -> bool {
    is_local_reference(dest)
        && FileKind::from_extension(&reference_extension(dest)) == FileKind::Image
}

struct PendingImage {
    range: Range<usize>,
    dest: String,
    title: String,
    alt: String,
}

pub(crate) fn rewrite(body: &str, ctx: &StageContext, report: &mut StageReport) -> String {
    let constraint = body_constraint(ctx.config.max_width);
    let mut edits = Vec::new();
    let mut pending: Option<PendingImage> = None;

    for (event, range) in Parser::new_ext(body, parser_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::Image {
                link_type: LinkType::Inline,
                dest_url,
                title,
                ..
            }) if pending.is_none() => {
                pending = Some(PendingImage {
                    range,
                    dest: dest_url.to_string(),
                    title: title.to_string(),
                    alt: String::new(),
                });
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(img) = pending.as_mut() {
                    img.alt.push_str(&text);
                }
            }
            Event::End(TagEnd::Image) => {
                let Some(img) = pending.take() else { continue };
                let dest = strip_suffix(&img.dest);
                if !is_local_image(dest) {
                    continue;
                }
                let path = resolve_relative(ctx.source_dir, dest);
                match ctx.assets.image(&path, &constraint) {
                    Some(set) if !set.derivatives.is_empty() => {
                        edits.push((img.range, markup(set, &img.alt, &img.title)));
                    }
                    _ => {
                        tracing::debug!("unresolved image {}", path.display());
                        report.unresolved(&img.dest);
                    }
                }
            }
            _ => {}
        }
    }

    apply_edits(body, edits)
}

/// Render one image as inline HTML on a single line.
pub fn markup(set: &DerivativeSet, alt: &str, title: &str) -> String {
    let Some(fallback) = set.fallback() else {
        return String::new();
    };
    let formats = set.formats();
    let primary = formats[0];
    let display = set.display_width.unwrap_or(fallback.width);
    let sizes = set.sizes();
    let title = (!title.is_empty()).then_some(title);

    let wrapper_style = format!(
        "position: relative; display: block; margin-left: auto; margin-right: auto; max-width: {display}px;"
    );
    let placeholder_style = format!(
        "padding-bottom: {}%; position: relative; bottom: 0; left: 0; background-image: url({}); background-size: cover; display: block;",
        aspect_percent(fallback.width, fallback.height),
        set.placeholder.data_uri
    );
    let img_style = "width: 100%; height: 100%; margin: 0; vertical-align: middle; position: absolute; top: 0; left: 0;";

    html! {
        span.responsive-image-wrapper style=(wrapper_style) {
            span.responsive-image-placeholder style=(placeholder_style) {}
            @if formats.len() > 1 {
                picture {
                    @for format in &formats[1..] {
                        source type=(format.mime_type()) srcset=(set.srcset(*format)) sizes=(sizes);
                    }
                    img.responsive-image alt=(alt) title=[title] src=(fallback.uri)
                        srcset=(set.srcset(primary)) sizes=(sizes) loading="lazy" style=(img_style);
                }
            } @else {
                img.responsive-image alt=(alt) title=[title] src=(fallback.uri)
                    srcset=(set.srcset(primary)) sizes=(sizes) loading="lazy" style=(img_style);
            }
        }
    }
    .into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkdownConfig;
    use crate::fields::FieldMap;
    use crate::test_helpers::{TestAssets, derivative_set};
    use std::path::Path;

    fn run(body: &str, assets: &TestAssets) -> (String, StageReport) {
        let config = MarkdownConfig::default();
        let metadata = FieldMap::new();
        let ctx = StageContext {
            source_dir: Path::new("/blog/post"),
            metadata: &metadata,
            assets,
            config: &config,
        };
        let mut report = StageReport::default();
        let out = rewrite(body, &ctx, &mut report);
        (out, report)
    }

    fn assets_with_egg() -> TestAssets {
        let mut assets = TestAssets::default();
        assets.add_image(
            "/blog/post/salty_egg.jpg",
            body_constraint(590),
            derivative_set("egg", 2000, 1500, body_constraint(590)),
        );
        assets
    }

    #[test]
    fn resolved_image_becomes_markup() {
        let assets = assets_with_egg();
        let (out, report) = run("Look:\n\n![An \"egg\"](./salty_egg.jpg \"Salty\")\n", &assets);
        assert!(report.warnings.is_empty());
        assert!(out.starts_with("Look:\n\n<span class=\"responsive-image-wrapper\""));
        assert!(out.contains("max-width: 590px;"));
        assert!(out.contains("alt=\"An &quot;egg&quot;\""));
        assert!(out.contains("title=\"Salty\""));
        assert!(out.contains("loading=\"lazy\""));
        assert!(out.contains("srcset=\"/static/"));
        assert!(out.contains("sizes=\"(max-width: 590px) 100vw, 590px\""));
        assert!(out.contains("background-image: url(data:image/png;base64,"));
        assert!(!out.contains("!["));
        assert!(out.ends_with("</span>\n"));
    }

    #[test]
    fn missing_image_warns_and_keeps_reference() {
        let assets = TestAssets::default();
        let body = "![gone](./missing.png)\n";
        let (out, report) = run(body, &assets);
        assert_eq!(out, body);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].to_string().contains("./missing.png"));
    }

    #[test]
    fn remote_and_reference_images_untouched() {
        let assets = assets_with_egg();
        let body = "![a](https://example.com/a.jpg)\n\n![b][egg]\n\n[egg]: ./salty_egg.jpg\n";
        let (out, report) = run(body, &assets);
        assert_eq!(out, body);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn images_in_code_untouched() {
        let assets = assets_with_egg();
        let body = "`![x](./salty_egg.jpg)`\n\n```\n![x](./salty_egg.jpg)\n```\n";
        let (out, _) = run(body, &assets);
        assert_eq!(out, body);
    }

    #[test]
    fn rewrite_is_idempotent() {
        let assets = assets_with_egg();
        let (once, _) = run("![egg](./salty_egg.jpg)\n", &assets);
        let (twice, report) = run(&once, &assets);
        assert_eq!(once, twice);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn local_refs_are_collected() {
        let refs = local_image_refs(
            "![a](./a.jpg) ![b](https://x/b.jpg) ![c](../c.PNG?v=1) [d](./d.pdf)",
        );
        assert_eq!(refs, vec!["./a.jpg", "../c.PNG"]);
    }
}
