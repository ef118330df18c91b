//! Stage 2: responsive embeds.
//!
//! Raw `<iframe>`, `<video>`, `<object>` and `<embed>` elements that declare a
//! numeric `width` and `height` are wrapped in a zero-height box whose
//! `padding-bottom` holds the aspect ratio; the element itself is stretched to
//! fill it. The rewritten element carries `width="100%"`, so a second pass
//! finds nothing numeric to wrap.

use super::chain::{StageContext, StageReport, apply_edits, parser_options};
use crate::imaging::aspect_percent;
use pulldown_cmark::{Event as MdEvent, Parser};
use quick_xml::Reader;
use quick_xml::escape;
use quick_xml::events::Event;
use std::ops::Range;

const EMBED_TAGS: [&str; 4] = ["iframe", "video", "object", "embed"];

const ELEMENT_STYLE: &str = "position: absolute; top: 0; left: 0; width: 100%; height: 100%;";

/// One attribute with its value decoded. `None` for bare attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Attribute {
    name: String,
    value: Option<String>,
}

/// Parse the start tag at the beginning of `s`.
///
/// Returns the lowercased tag name, the attributes and the byte length of the
/// tag. Attribute values are unescaped; a value with an entity XML does not
/// know (`&nbsp;`) is kept as written.
fn parse_start_tag(s: &str) -> Option<(String, Vec<Attribute>, usize)> {
    let mut reader = Reader::from_str(s);
    let tag = match reader.read_event() {
        Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => tag,
        _ => return None,
    };
    let name = String::from_utf8_lossy(tag.name().as_ref()).to_ascii_lowercase();
    let mut attrs = Vec::new();
    for attr in tag.html_attributes() {
        let attr = attr.ok()?;
        let raw = String::from_utf8_lossy(&attr.value);
        let value = match escape::unescape(&raw) {
            Ok(value) => value.into_owned(),
            Err(_) => raw.into_owned(),
        };
        attrs.push(Attribute {
            name: String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase(),
            value: (!value.is_empty()).then_some(value),
        });
    }
    Some((name, attrs, reader.buffer_position() as usize))
}

fn numeric(attrs: &[Attribute], name: &str) -> Option<u32> {
    attrs
        .iter()
        .find(|a| a.name == name)
        .and_then(|a| a.value.as_deref())
        .and_then(|v| v.trim().trim_end_matches("px").parse::<u32>().ok())
        .filter(|&n| n > 0)
}

fn escape_attr(value: &str) -> String {
    escape::escape(value).into_owned()
}

fn render_start_tag(name: &str, attrs: &[Attribute]) -> String {
    let mut out = format!("<{name}");
    let mut has_style = false;
    for attr in attrs {
        out.push(' ');
        out.push_str(&attr.name);
        let value = match attr.name.as_str() {
            "width" | "height" => Some("100%".to_string()),
            "style" => {
                has_style = true;
                let existing = attr.value.as_deref().unwrap_or("").trim().trim_end_matches(';');
                Some(if existing.is_empty() {
                    ELEMENT_STYLE.to_string()
                } else {
                    format!("{existing}; {ELEMENT_STYLE}")
                })
            }
            _ => attr.value.clone(),
        };
        if let Some(v) = value {
            out.push_str("=\"");
            out.push_str(&escape_attr(&v));
            out.push('"');
        }
    }
    if !has_style {
        out.push_str(&format!(" style=\"{ELEMENT_STYLE}\""));
    }
    out.push('>');
    out
}

/// Byte ranges of raw HTML in the body.
fn html_ranges(body: &str) -> Vec<Range<usize>> {
    Parser::new_ext(body, parser_options())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            MdEvent::Html(_) | MdEvent::InlineHtml(_) => Some(range),
            _ => None,
        })
        .collect()
}

fn find_embed_starts(body: &str, ranges: &[Range<usize>]) -> Vec<usize> {
    let lower = body.to_ascii_lowercase();
    let mut starts = Vec::new();
    for range in ranges {
        let segment = &lower[range.clone()];
        let mut offset = 0;
        while let Some(pos) = segment[offset..].find('<') {
            let at = offset + pos;
            let rest = &segment[at + 1..];
            let is_embed = EMBED_TAGS.iter().any(|tag| {
                rest.starts_with(tag)
                    && rest[tag.len()..]
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_ascii_whitespace() || c == '>' || c == '/')
            });
            if is_embed {
                starts.push(range.start + at);
            }
            offset = at + 1;
        }
    }
    starts.sort_unstable();
    starts.dedup();
    starts
}

pub(crate) fn rewrite(body: &str, ctx: &StageContext, _report: &mut StageReport) -> String {
    let lower = body.to_ascii_lowercase();
    let mut edits = Vec::new();

    for start in find_embed_starts(body, &html_ranges(body)) {
        let Some((name, attrs, tag_len)) = parse_start_tag(&body[start..]) else {
            continue;
        };
        let (Some(width), Some(height)) = (numeric(&attrs, "width"), numeric(&attrs, "height"))
        else {
            continue;
        };
        let tag_end = start + tag_len;
        let self_closing = body[start..tag_end].ends_with("/>");
        let closing = format!("</{name}>");
        let element_end = if name == "embed" || self_closing {
            tag_end
        } else {
            match lower[tag_end..].find(&closing) {
                Some(pos) => tag_end + pos + closing.len(),
                None => tag_end,
            }
        };
        let inner = &body[tag_end..element_end];

        let mut wrapper_style = format!(
            "position: relative; height: 0; overflow: hidden; padding-bottom: {}%;",
            aspect_percent(width, height)
        );
        let extra = ctx.config.embed_wrapper_style.trim();
        if !extra.is_empty() {
            wrapper_style.push(' ');
            wrapper_style.push_str(extra);
            if !extra.ends_with(';') {
                wrapper_style.push(';');
            }
        }
        let replacement = format!(
            "<div class=\"embed-container\" style=\"{}\">{}{}</div>",
            escape_attr(&wrapper_style),
            render_start_tag(&name, &attrs),
            inner
        );
        edits.push((start..element_end, replacement));
    }

    apply_edits(body, edits)
}
