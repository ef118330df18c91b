//! Parameter types for image operations.
//!
//! These types describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides which derivatives exist) and the [`backend`](super::backend)
//! (which does the pixel work). This separation allows swapping backends
//! (e.g. for testing with a mock) without changing operation logic.
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`Constraint`] / [`Layout`] — The target a derivative set is planned for.
//! - [`SourceFormat`] / [`OutputFormat`] / [`FormatChoice`] — Decoded and encoded formats.
//! - [`ResizeParams`] — Everything needed to encode one derivative: source, size, format, quality.
//! - [`PlaceholderParams`] — Everything needed to render the inline placeholder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Responsive layout modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "mode", content = "width", rename_all = "snake_case")]
pub enum Layout {
    /// Displayed at most `width` px wide; variants for smaller and denser screens.
    Constrained(u32),
    /// Spans the viewport; one variant per configured breakpoint.
    FullWidth,
    /// Always `width` px; 1x and 2x variants.
    Fixed(u32),
}

/// What a derivative set is sized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    MaxWidth(u32),
    Layout(Layout),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::MaxWidth(w) => write!(f, "max-width {w}"),
            Constraint::Layout(Layout::Constrained(w)) => write!(f, "constrained {w}"),
            Constraint::Layout(Layout::FullWidth) => f.write_str("full-width"),
            Constraint::Layout(Layout::Fixed(w)) => write!(f, "fixed {w}"),
        }
    }
}

/// Decoded source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Tiff,
    Webp,
}

impl SourceFormat {
    /// Output format `auto` resolves to: keep the family, TIFF becomes PNG.
    pub fn auto_output(self) -> OutputFormat {
        match self {
            SourceFormat::Jpeg => OutputFormat::Jpeg,
            SourceFormat::Png | SourceFormat::Tiff => OutputFormat::Png,
            SourceFormat::Webp => OutputFormat::Webp,
        }
    }
}

/// Encoded derivative formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Avif => "avif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Avif => "image/avif",
        }
    }
}

/// A configured output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatChoice {
    Auto,
    Webp,
    Avif,
}

/// Resolve configured choices into concrete output formats, deduplicated, in
/// config order.
pub fn resolve_formats(source: SourceFormat, choices: &[FormatChoice]) -> Vec<OutputFormat> {
    let mut formats = Vec::new();
    for choice in choices {
        let format = match choice {
            FormatChoice::Auto => source.auto_output(),
            FormatChoice::Webp => OutputFormat::Webp,
            FormatChoice::Avif => OutputFormat::Avif,
        };
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    if formats.is_empty() {
        formats.push(source.auto_output());
    }
    formats
}

/// Parameters for one resize + encode.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}

/// Parameters for the low-fidelity placeholder (always PNG).
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderParams {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn auto_keeps_family_and_tiff_becomes_png() {
        assert_eq!(SourceFormat::Jpeg.auto_output(), OutputFormat::Jpeg);
        assert_eq!(SourceFormat::Png.auto_output(), OutputFormat::Png);
        assert_eq!(SourceFormat::Webp.auto_output(), OutputFormat::Webp);
        assert_eq!(SourceFormat::Tiff.auto_output(), OutputFormat::Png);
    }

    #[test]
    fn resolve_formats_dedupes() {
        let formats = resolve_formats(
            SourceFormat::Webp,
            &[FormatChoice::Auto, FormatChoice::Webp, FormatChoice::Avif],
        );
        assert_eq!(formats, vec![OutputFormat::Webp, OutputFormat::Avif]);
    }

    #[test]
    fn resolve_formats_empty_falls_back_to_auto() {
        assert_eq!(resolve_formats(SourceFormat::Jpeg, &[]), vec![OutputFormat::Jpeg]);
    }

    #[test]
    fn constraint_serializes_readably() {
        let json = serde_json::to_string(&Constraint::Layout(Layout::Constrained(590))).unwrap();
        assert_eq!(json, r#"{"layout":{"mode":"constrained","width":590}}"#);
        let json = serde_json::to_string(&Constraint::MaxWidth(590)).unwrap();
        assert_eq!(json, r#"{"max_width":590}"#);
    }
}
