//! Stage 5: typographic punctuation.
//!
//! Straight quotes become curly ones, `---` an em dash, `--` an en dash and
//! `...` an ellipsis. Only prose is touched: code spans, code blocks, raw HTML
//! and backslash-escaped characters keep their straight forms.

use super::chain::{StageContext, StageReport, apply_edits, parser_options};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};

/// Characters after which a quote opens rather than closes.
fn opens_after(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => c.is_whitespace() || "([{<\u{2014}\u{2013}-\u{201c}\u{2018}".contains(c),
    }
}

/// Convert one run of prose. `prev` is the character before the run and is
/// advanced past it.
pub fn smarten(text: &str, prev: &mut Option<char>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        let (replacement, consumed) = if rest.starts_with("---") {
            ('\u{2014}', 3)
        } else if rest.starts_with("--") {
            ('\u{2013}', 2)
        } else if rest.starts_with("...") {
            ('\u{2026}', 3)
        } else {
            let converted = match c {
                '"' if opens_after(*prev) => '\u{201c}',
                '"' => '\u{201d}',
                '\'' if opens_after(*prev) => '\u{2018}',
                '\'' => '\u{2019}',
                other => other,
            };
            (converted, c.len_utf8())
        };
        out.push(replacement);
        *prev = Some(replacement);
        rest = &rest[consumed..];
    }
    out
}

pub(crate) fn rewrite(body: &str, _ctx: &StageContext, _report: &mut StageReport) -> String {
    let mut edits = Vec::new();
    let mut prev: Option<char> = None;
    let mut in_code_block = false;

    for (event, range) in Parser::new_ext(body, parser_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => in_code_block = false,
            Event::Start(
                Tag::Paragraph
                | Tag::Heading { .. }
                | Tag::Item
                | Tag::BlockQuote(_)
                | Tag::TableCell
                | Tag::FootnoteDefinition(_),
            ) => prev = None,
            Event::SoftBreak | Event::HardBreak => prev = Some(' '),
            Event::Code(_) => prev = Some('x'),
            Event::Text(text) if !in_code_block => {
                if &body[range.clone()] == text.as_ref() {
                    let escaped = body[..range.start].ends_with('\\');
                    let smart = if escaped {
                        let mut chars = text.chars();
                        let first = chars.next();
                        prev = first.or(prev);
                        first.into_iter().collect::<String>() + &smarten(chars.as_str(), &mut prev)
                    } else {
                        smarten(&text, &mut prev)
                    };
                    if smart != text.as_ref() {
                        edits.push((range, smart));
                    }
                } else {
                    prev = text.chars().last().or(prev);
                }
            }
            _ => {}
        }
    }

    apply_edits(body, edits)
}
