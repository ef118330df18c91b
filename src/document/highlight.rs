//! Stage 3: syntax-highlight annotation.
//!
//! Fenced code blocks whose info string names a known language are parsed
//! with tree-sitter and replaced by a raw
//! `<pre class="language-x"><code class="language-x">` block with
//! Prism-compatible `<span class="token …">` spans, so any Prism theme styles
//! the output. The `<pre>` opener makes the replacement a CommonMark HTML block
//! that runs to `</pre>`, blank lines included. Unknown or missing languages,
//! indented code and fences behind container markers (`>`, `-`) are left as
//! they are, and so is a block the highlighter fails on.
//!
//! | Language | Grammar | Highlight query |
//! |---|---|---|
//! | Rust | `tree-sitter-rust` | bundled |
//! | Python | `tree-sitter-python` | bundled |
//! | TypeScript / JavaScript | `tree-sitter-typescript` | [`SCRIPT_HIGHLIGHTS`] |

use super::chain::{StageContext, StageReport, apply_edits, parser_options};
use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use std::ops::Range;
use std::sync::LazyLock;
use tree_sitter_highlight::{HighlightConfiguration, HighlightEvent, Highlighter};

/// Capture names the highlighter recognizes, paired with the Prism class
/// each one renders as. Longer capture names (`punctuation.bracket`,
/// `function.method`) fall back to their recognized prefix.
const CAPTURES: &[(&str, &str)] = &[
    ("attribute", "attr-name"),
    ("boolean", "boolean"),
    ("comment", "comment"),
    ("constant", "constant"),
    ("escape", "char"),
    ("function", "function"),
    ("keyword", "keyword"),
    ("number", "number"),
    ("operator", "operator"),
    ("property", "property"),
    ("punctuation", "punctuation"),
    ("string", "string"),
    ("type", "class-name"),
    ("variable.builtin", "builtin"),
];

/// The TypeScript grammar ships highlights that only extend the JavaScript
/// ones, so scripts carry their own query.
const SCRIPT_HIGHLIGHTS: &str = r#"
(comment) @comment
[(string) (template_string)] @string
(number) @number
[(true) (false)] @boolean
[(null) (undefined)] @constant
(function_declaration name: (identifier) @function)
(call_expression function: (identifier) @function)
(call_expression function: (member_expression property: (property_identifier) @function))
[
  "async" "await" "break" "case" "catch" "class" "const" "continue" "default"
  "else" "export" "extends" "finally" "for" "function" "if" "import" "let"
  "new" "return" "switch" "throw" "try" "var" "while" "interface"
] @keyword
["(" ")" "[" "]" "{" "}"] @punctuation.bracket
[";" "," "." ":"] @punctuation.delimiter
"#;

struct Grammar {
    name: &'static str,
    aliases: &'static [&'static str],
    config: &'static LazyLock<Option<HighlightConfiguration>>,
}

fn load(
    language: tree_sitter::Language,
    name: &str,
    highlights: &str,
) -> Option<HighlightConfiguration> {
    match HighlightConfiguration::new(language, name, highlights, "", "") {
        Ok(mut config) => {
            let names: Vec<&str> = CAPTURES.iter().map(|(capture, _)| *capture).collect();
            config.configure(&names);
            Some(config)
        }
        Err(e) => {
            tracing::warn!("cannot load {name} highlights: {e}");
            None
        }
    }
}

static RUST: LazyLock<Option<HighlightConfiguration>> = LazyLock::new(|| {
    load(tree_sitter_rust::LANGUAGE.into(), "rust", tree_sitter_rust::HIGHLIGHTS_QUERY)
});

static PYTHON: LazyLock<Option<HighlightConfiguration>> = LazyLock::new(|| {
    load(tree_sitter_python::LANGUAGE.into(), "python", tree_sitter_python::HIGHLIGHTS_QUERY)
});

static TYPESCRIPT: LazyLock<Option<HighlightConfiguration>> = LazyLock::new(|| {
    load(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(), "typescript", SCRIPT_HIGHLIGHTS)
});

static TSX: LazyLock<Option<HighlightConfiguration>> = LazyLock::new(|| {
    load(tree_sitter_typescript::LANGUAGE_TSX.into(), "tsx", SCRIPT_HIGHLIGHTS)
});

static GRAMMARS: &[Grammar] = &[
    Grammar {
        name: "rust",
        aliases: &["rs"],
        config: &RUST,
    },
    Grammar {
        name: "python",
        aliases: &["py"],
        config: &PYTHON,
    },
    Grammar {
        name: "typescript",
        aliases: &["ts", "javascript", "js", "mjs"],
        config: &TYPESCRIPT,
    },
    Grammar {
        name: "tsx",
        aliases: &["jsx"],
        config: &TSX,
    },
];

fn find_grammar(tag: &str) -> Option<&'static Grammar> {
    let tag = tag.to_ascii_lowercase();
    GRAMMARS
        .iter()
        .find(|g| g.name == tag || g.aliases.contains(&tag.as_str()))
}

/// Language named by a fence info string (`rust`, `js{1,3}`, `python title=x`).
fn info_language(info: &str) -> &str {
    info.split(|c: char| c.is_whitespace() || c == ',' || c == '{')
        .next()
        .unwrap_or("")
}

fn escape(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// Highlight `code` and return escaped HTML with token spans.
fn annotate(code: &str, config: &HighlightConfiguration) -> Result<String, tree_sitter_highlight::Error> {
    let mut highlighter = Highlighter::new();
    let events = highlighter.highlight(config, code.as_bytes(), None, |_| None)?;
    let mut out = String::with_capacity(code.len() * 2);
    for event in events {
        match event? {
            HighlightEvent::Source { start, end } => escape(&code[start..end], &mut out),
            HighlightEvent::HighlightStart(highlight) => {
                let class = CAPTURES.get(highlight.0).map_or("plain", |(_, class)| *class);
                out.push_str("<span class=\"token ");
                out.push_str(class);
                out.push_str("\">");
            }
            HighlightEvent::HighlightEnd => out.push_str("</span>"),
        }
    }
    Ok(out)
}

/// Render a highlighted block.
fn render_block(code: &str, lang_tag: &str) -> Option<String> {
    let config = LazyLock::force(find_grammar(lang_tag)?.config).as_ref()?;
    let class = format!("language-{}", lang_tag.to_ascii_lowercase());
    let code = code.strip_suffix('\n').unwrap_or(code);
    let html = match annotate(code, config) {
        Ok(html) => html,
        Err(e) => {
            tracing::debug!("cannot highlight {lang_tag} block: {e}");
            return None;
        }
    };
    Some(format!(
        "<pre class=\"{class}\"><code class=\"{class}\">{html}</code></pre>"
    ))
}

struct PendingBlock {
    range: Range<usize>,
    lang: String,
    code: String,
}

pub(crate) fn rewrite(body: &str, _ctx: &StageContext, _report: &mut StageReport) -> String {
    let mut edits = Vec::new();
    let mut pending: Option<PendingBlock> = None;

    for (event, range) in Parser::new_ext(body, parser_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                pending = Some(PendingBlock {
                    range,
                    lang: info_language(&info).to_string(),
                    code: String::new(),
                });
            }
            Event::Text(text) => {
                if let Some(block) = pending.as_mut() {
                    block.code.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                let Some(block) = pending.take() else { continue };
                let line_start = body[..block.range.start].rfind('\n').map_or(0, |p| p + 1);
                let indent = &body[line_start..block.range.start];
                if !indent.chars().all(|c| c == ' ' || c == '\t') {
                    continue;
                }
                let Some(html) = render_block(&block.code, &block.lang) else {
                    continue;
                };
                let mut replacement = html.replace('\n', &format!("\n{indent}"));
                if body[block.range.clone()].ends_with('\n') {
                    replacement.push('\n');
                }
                edits.push((block.range, replacement));
            }
            _ => {}
        }
    }

    apply_edits(body, edits)
}
