//! Build configuration.
//!
//! Handles loading, validating, and merging the project's `config.toml`. User
//! values are layered over stock defaults: every key is optional, unknown keys
//! are rejected to catch typos early.
//!
//! ## Config File Location
//!
//! `config.toml` lives in the project root, next to the content directories it
//! names:
//!
//! ```text
//! project/
//! ├── config.toml
//! ├── content/
//! │   ├── blog/                    # markdown posts + their images
//! │   └── assets/                  # shared images (avatar, headshot)
//! └── data/
//!     └── talks.yaml               # record file → `talks` collection
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! output_dir = "public"
//!
//! [site]                         # free-form, becomes the `site` node
//! title = "kelley robinson"
//!
//! [[sources]]
//! path = "content/blog"
//! name = "blog"
//! kind = "auto"                  # auto | documents | records | images
//! required_fields = ["title"]
//!
//! [markdown]
//! max_width = 590
//! embed_wrapper_style = "margin-bottom: 1.0725rem"
//!
//! [markdown.stages]
//! images = true
//! embeds = true
//! highlight = true
//! linked_files = true
//! punctuation = true
//!
//! [images]
//! quality = 90
//! breakpoints = [750, 1080, 1366, 1920]
//! default_layout = "constrained" # constrained | full_width | fixed
//! default_width = 800
//! placeholder_width = 20
//! formats = ["auto"]             # auto | webp | avif
//!
//! [typography]
//! base_font_size_px = 16.0
//! base_line_height_px = 28.0
//! scale_ratio = 2.5
//! min_leading = 1.2
//!
//! [mapping]
//! "talks.speaker" = "authors.id"
//!
//! [processing]
//! max_processes = 4
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse: override just the values you want. Tables merge
//! key by key; arrays (including `[[sources]]`) replace the default wholesale.

use crate::imaging::FormatChoice;
use crate::sources::KindHint;
use crate::typography::RhythmConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the configuration file in the project root.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Mapping `{mapping}` names unknown collection `{collection}`")]
    MissingCollection { mapping: String, collection: String },
}

/// Build configuration loaded from `config.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Directory (relative to the project root) that receives derived assets.
    pub output_dir: String,
    /// Free-form site metadata (title, description, author, …).
    pub site: toml::Table,
    /// Content roots to scan.
    pub sources: Vec<SourceConfig>,
    /// Markdown transformer chain settings.
    pub markdown: MarkdownConfig,
    /// Image derivative settings.
    pub images: ImagesConfig,
    /// Vertical rhythm and modular scale.
    pub typography: RhythmConfig,
    /// Declared cross-collection links: `"<collection>.<field>" = "<collection>[.<field>]"`.
    pub mapping: BTreeMap<String, String>,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: "public".to_string(),
            site: toml::Table::new(),
            sources: vec![SourceConfig {
                path: "content".to_string(),
                name: "content".to_string(),
                kind: KindHint::Auto,
                required_fields: Vec::new(),
            }],
            markdown: MarkdownConfig::default(),
            images: ImagesConfig::default(),
            typography: RhythmConfig::default(),
            mapping: BTreeMap::new(),
            processing: ProcessingConfig::default(),
        }
    }
}

/// Reserved collection names that no source may claim.
const RESERVED_COLLECTIONS: &[&str] = &[crate::types::IMAGES_COLLECTION, crate::types::SITE_COLLECTION];

impl BuildConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Validation(
                "at least one [[sources]] entry is required".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if source.name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "source `{}` has an empty name",
                    source.path
                )));
            }
            if RESERVED_COLLECTIONS.contains(&source.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "source name `{}` is reserved",
                    source.name
                )));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate source name `{}`",
                    source.name
                )));
            }
        }
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.images.breakpoints.is_empty() || self.images.breakpoints.contains(&0) {
            return Err(ConfigError::Validation(
                "images.breakpoints must be non-empty and non-zero".into(),
            ));
        }
        if self.images.default_width == 0 || self.images.placeholder_width == 0 {
            return Err(ConfigError::Validation(
                "images.default_width and images.placeholder_width must be non-zero".into(),
            ));
        }
        if self.markdown.max_width == 0 {
            return Err(ConfigError::Validation(
                "markdown.max_width must be non-zero".into(),
            ));
        }
        for key in self.mapping.keys() {
            if !key.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "mapping key `{key}` must look like `<collection>.<field>`"
                )));
            }
        }
        self.typography.validate()?;
        Ok(())
    }
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Directory, relative to the project root.
    pub path: String,
    /// Collection name for documents found under this root.
    pub name: String,
    /// Which file kinds this root contributes.
    #[serde(default)]
    pub kind: KindHint,
    /// Front-matter fields every document in this root must define.
    #[serde(default)]
    pub required_fields: Vec<String>,
}

/// Markdown transformer chain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkdownConfig {
    /// Maximum display width of inline images, in pixels.
    pub max_width: u32,
    /// Extra CSS appended to the responsive embed wrapper.
    pub embed_wrapper_style: String,
    /// Per-stage switches. Order is fixed; stages can only be turned off.
    pub stages: StagesConfig,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            max_width: 590,
            embed_wrapper_style: "margin-bottom: 1.0725rem".to_string(),
            stages: StagesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagesConfig {
    pub images: bool,
    pub embeds: bool,
    pub highlight: bool,
    pub linked_files: bool,
    pub punctuation: bool,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            images: true,
            embeds: true,
            highlight: true,
            linked_files: true,
            punctuation: true,
        }
    }
}

/// Layout used for the derivatives attached to every image node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutName {
    Constrained,
    FullWidth,
    Fixed,
}

/// Image derivative settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Lossy encoding quality (1 = worst, 100 = best).
    pub quality: u32,
    /// Widths generated for full-width layouts.
    pub breakpoints: Vec<u32>,
    /// Layout of the derivative set exposed on image nodes.
    pub default_layout: LayoutName,
    /// Width used by `constrained` and `fixed` default layouts.
    pub default_width: u32,
    /// Width of the inline placeholder, in pixels.
    pub placeholder_width: u32,
    /// Output formats; `auto` keeps the source format family.
    pub formats: Vec<FormatChoice>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            quality: 90,
            breakpoints: vec![750, 1080, 1366, 1920],
            default_layout: LayoutName::Constrained,
            default_width: 800,
            placeholder_width: 20,
            formats: vec![FormatChoice::Auto],
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged on top of.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(BuildConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the project root.
pub fn load_config(project_root: &Path) -> Result<BuildConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(project_root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# quire configuration
# ===================
# All settings are optional. Values shown below are the defaults.
# Unknown keys cause an error.

# Where derived images and copied files are written (relative to this file).
output_dir = "public"

# ---------------------------------------------------------------------------
# Site metadata. Free-form: every key becomes a field of the `site` node.
# ---------------------------------------------------------------------------
[site]
# title = "my blog"
# description = "..."
# site_url = "https://example.com"
# [site.author]
# name = "..."
# bio = "..."

# ---------------------------------------------------------------------------
# Content roots. Each root is walked recursively.
#   kind = "auto"       markdown, records and images
#   kind = "documents"  markdown only
#   kind = "records"    .yaml / .yml / .json only
#   kind = "images"     raster images only
# Documents take the root name as their collection; records take their file
# stem (talks.yaml -> "talks"); images always land in "images".
# ---------------------------------------------------------------------------
[[sources]]
path = "content"
name = "content"
kind = "auto"
required_fields = []

# ---------------------------------------------------------------------------
# Markdown transformer chain. Stage order is fixed:
# images -> embeds -> highlight -> linked_files -> punctuation
# ---------------------------------------------------------------------------
[markdown]
# Display width of inline images, in pixels.
max_width = 590

# Extra CSS on the wrapper around iframes/videos.
embed_wrapper_style = "margin-bottom: 1.0725rem"

[markdown.stages]
images = true
embeds = true
highlight = true
linked_files = true
punctuation = true

# ---------------------------------------------------------------------------
# Image derivatives
# ---------------------------------------------------------------------------
[images]
# Lossy encoding quality (1-100).
quality = 90

# Widths generated for full-width layouts.
breakpoints = [750, 1080, 1366, 1920]

# Derivative set attached to every image node: constrained | full_width | fixed
default_layout = "constrained"
default_width = 800

# Width of the blurred inline placeholder.
placeholder_width = 20

# auto keeps the source family (jpeg -> jpeg, png -> png). Add "webp" or "avif"
# for extra variants.
formats = ["auto"]

# ---------------------------------------------------------------------------
# Typography: vertical rhythm and modular scale
# ---------------------------------------------------------------------------
[typography]
base_font_size_px = 16.0
base_line_height_px = 28.0
scale_ratio = 2.5
min_leading = 1.2

# ---------------------------------------------------------------------------
# Cross-collection links: "<collection>.<field>" = "<collection>[.<field>]"
# The target field defaults to `id`.
# ---------------------------------------------------------------------------
[mapping]
# "talks.speaker" = "authors.id"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers. Omit to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = BuildConfig::default();
        config.validate().unwrap();
        assert_eq!(config.output_dir, "public");
        assert_eq!(config.markdown.max_width, 590);
        assert_eq!(config.images.breakpoints, vec![750, 1080, 1366, 1920]);
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn stock_config_toml_parses_to_defaults() {
        let value: toml::Value = toml::from_str(stock_config_toml()).unwrap();
        let config = resolve_config(stock_defaults_value().unwrap(), Some(value)).unwrap();
        assert_eq!(config.markdown.max_width, 590);
        assert_eq!(config.images.quality, 90);
        assert_eq!(config.sources[0].name, "content");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let overlay: toml::Value = toml::from_str(
            r#"
[images]
quality = 75
"#,
        )
        .unwrap();
        let config = resolve_config(stock_defaults_value().unwrap(), Some(overlay)).unwrap();
        assert_eq!(config.images.quality, 75);
        assert_eq!(config.images.placeholder_width, 20);
        assert_eq!(config.markdown.max_width, 590);
    }

    #[test]
    fn sources_array_replaces_default() {
        let overlay: toml::Value = toml::from_str(
            r#"
[[sources]]
path = "content/blog"
name = "blog"
required_fields = ["title"]

[[sources]]
path = "data"
name = "data"
kind = "records"
"#,
        )
        .unwrap();
        let config = resolve_config(stock_defaults_value().unwrap(), Some(overlay)).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].required_fields, vec!["title"]);
        assert_eq!(config.sources[1].kind, KindHint::Records);
    }

    #[test]
    fn unknown_keys_rejected() {
        let overlay: toml::Value = toml::from_str("[images]\nqualty = 80\n").unwrap();
        let result = resolve_config(stock_defaults_value().unwrap(), Some(overlay));
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn site_table_is_free_form() {
        let overlay: toml::Value = toml::from_str(
            r#"
[site]
title = "kelley robinson"
[site.author]
name = "Kelley Robinson"
"#,
        )
        .unwrap();
        let config = resolve_config(stock_defaults_value().unwrap(), Some(overlay)).unwrap();
        assert_eq!(config.site["title"].as_str(), Some("kelley robinson"));
    }

    #[test]
    fn validation_rejects_bad_quality() {
        let mut config = BuildConfig::default();
        config.images.quality = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
        config.images.quality = 101;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validation_rejects_reserved_and_duplicate_names() {
        let mut config = BuildConfig::default();
        config.sources[0].name = "images".into();
        assert!(config.validate().is_err());

        let mut config = BuildConfig::default();
        let dup = config.sources[0].clone();
        config.sources.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_malformed_mapping_key() {
        let mut config = BuildConfig::default();
        config.mapping.insert("talks".into(), "authors".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_bad_typography() {
        let mut config = BuildConfig::default();
        config.typography.scale_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn merge_toml_overlays_nested_tables() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.output_dir, "public");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "output_dir = \"dist\"\n[markdown]\nmax_width = 700\n",
        )
        .unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.output_dir, "dist");
        assert_eq!(config.markdown.max_width, 700);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "output_dir = [").unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn effective_threads_clamps_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(10_000),
        };
        assert_eq!(effective_threads(&config), cores);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }
}
