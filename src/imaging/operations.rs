//! High-level image operations.
//!
//! These functions combine calculations with backend execution. They take
//! configuration, compute parameters, and call the backend.
//!
//! Derivative paths are content-addressed:
//!
//! ```text
//! static/<source hash, 16 hex>/<params hash, 8 hex>/<stem>-<width>.<ext>
//! ```
//!
//! so the same source bytes encoded with the same parameters always land at
//! the same path, whichever document or worker asked for them.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{display_width, plan_sizes, scale_to_width};
use super::params::{
    Constraint, Layout, OutputFormat, PlaceholderParams, Quality, ResizeParams, SourceFormat,
    resolve_formats,
};
use crate::cache::{hash_placeholder_params, hash_resize_params};
use crate::config::{ImagesConfig, LayoutName};
use crate::types::NodeId;
use base64::prelude::*;
use serde::Serialize;
use std::path::PathBuf;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Directory under the output root that receives derived assets.
pub const STATIC_DIR: &str = "static";

/// A discovered raster image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageNode {
    pub id: NodeId,
    /// Collection of the root the image was found in.
    pub source_instance: String,
    /// Path relative to its content root.
    pub source_path: String,
    /// Absolute path on disk.
    #[serde(skip)]
    pub path: PathBuf,
    /// SHA-256 of the file contents.
    #[serde(skip)]
    pub content_hash: String,
    pub natural_width: u32,
    pub natural_height: u32,
    pub format: SourceFormat,
}

impl ImageNode {
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
    }

    fn natural(&self) -> (u32, u32) {
        (self.natural_width, self.natural_height)
    }
}

/// One encoded derivative. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDerivative {
    pub parent_image_id: NodeId,
    pub constraint: Constraint,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub uri: String,
    /// Encoded bytes when derived in memory; `None` once written to disk.
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
}

/// Low-fidelity inline preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct Placeholder {
    pub width: u32,
    pub height: u32,
    pub data_uri: String,
}

impl Placeholder {
    pub fn from_png(width: u32, height: u32, png: &[u8]) -> Self {
        Self {
            width,
            height,
            data_uri: format!("data:image/png;base64,{}", BASE64_STANDARD.encode(png)),
        }
    }
}

/// Every derivative of one image for one constraint, plus its placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivativeSet {
    pub image_id: NodeId,
    pub constraint: Constraint,
    /// Width the image is displayed at, when the constraint fixes one.
    pub display_width: Option<u32>,
    /// Ascending by width.
    pub derivatives: Vec<ImageDerivative>,
    pub placeholder: Placeholder,
}

impl DerivativeSet {
    /// Formats present, in the order they were configured.
    pub fn formats(&self) -> Vec<OutputFormat> {
        let mut formats = Vec::new();
        for d in &self.derivatives {
            if !formats.contains(&d.format) {
                formats.push(d.format);
            }
        }
        formats
    }

    /// `srcset` attribute value for one format.
    pub fn srcset(&self, format: OutputFormat) -> String {
        self.derivatives
            .iter()
            .filter(|d| d.format == format)
            .map(|d| format!("{} {}w", d.uri, d.width))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `sizes` attribute value.
    pub fn sizes(&self) -> String {
        match self.display_width {
            Some(w) => format!("(max-width: {w}px) 100vw, {w}px"),
            None => "100vw".to_string(),
        }
    }

    /// Largest derivative of the primary format, used as `src`.
    pub fn fallback(&self) -> Option<&ImageDerivative> {
        let primary = self.derivatives.first()?.format;
        self.derivatives.iter().rev().find(|d| d.format == primary)
    }
}

/// One derivative the plan calls for.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDerivative {
    pub params: ResizeParams,
    pub params_hash: String,
    /// Path relative to the output root, `/`-separated.
    pub relative_path: String,
}

impl PlannedDerivative {
    pub fn uri(&self) -> String {
        format!("/{}", self.relative_path)
    }
}

/// Everything needed to produce a [`DerivativeSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativePlan {
    pub image_id: NodeId,
    pub constraint: Constraint,
    pub display_width: Option<u32>,
    pub items: Vec<PlannedDerivative>,
    pub placeholder: PlaceholderParams,
    pub placeholder_hash: String,
}

/// The constraint every image node gets, from `[images]` config.
pub fn default_constraint(config: &ImagesConfig) -> Constraint {
    let layout = match config.default_layout {
        LayoutName::Constrained => Layout::Constrained(config.default_width),
        LayoutName::FullWidth => Layout::FullWidth,
        LayoutName::Fixed => Layout::Fixed(config.default_width),
    };
    Constraint::Layout(layout)
}

/// Plan the derivatives for one image and constraint without executing them.
pub fn plan_derivatives(
    image: &ImageNode,
    constraint: &Constraint,
    config: &ImagesConfig,
) -> DerivativePlan {
    let quality = Quality::new(config.quality);
    let formats = resolve_formats(image.format, &config.formats);
    let source_prefix = &image.content_hash[..image.content_hash.len().min(16)];

    let mut items = Vec::new();
    for size in plan_sizes(image.natural(), constraint, &config.breakpoints) {
        for &format in &formats {
            let params_hash = hash_resize_params(size.width, size.height, format, quality.value());
            let relative_path = format!(
                "{STATIC_DIR}/{source_prefix}/{}/{}-{}.{}",
                &params_hash[..8],
                image.stem(),
                size.width,
                format.extension()
            );
            items.push(PlannedDerivative {
                params: ResizeParams {
                    source: image.path.clone(),
                    width: size.width,
                    height: size.height,
                    format,
                    quality,
                },
                params_hash,
                relative_path,
            });
        }
    }

    let thumb = scale_to_width(
        image.natural(),
        config.placeholder_width.min(image.natural_width),
    );
    DerivativePlan {
        image_id: image.id.clone(),
        constraint: *constraint,
        display_width: display_width(image.natural_width, constraint),
        items,
        placeholder: PlaceholderParams {
            source: image.path.clone(),
            width: thumb.width,
            height: thumb.height,
        },
        placeholder_hash: hash_placeholder_params(thumb.width, thumb.height),
    }
}

impl DerivativePlan {
    /// Assemble the finished set from per-item bytes (or `None` when on disk).
    pub fn into_set(self, bytes: Vec<Option<Vec<u8>>>, placeholder: Placeholder) -> DerivativeSet {
        let derivatives = self
            .items
            .iter()
            .zip(bytes)
            .map(|(item, bytes)| ImageDerivative {
                parent_image_id: self.image_id.clone(),
                constraint: self.constraint,
                width: item.params.width,
                height: item.params.height,
                format: item.params.format,
                uri: item.uri(),
                bytes,
            })
            .collect();
        DerivativeSet {
            image_id: self.image_id,
            constraint: self.constraint,
            display_width: self.display_width,
            derivatives,
            placeholder,
        }
    }
}

/// Derive every planned size in memory.
///
/// Deterministic: the same image and constraint always yield byte-identical
/// derivatives. Nothing is written to disk; see
/// [`DerivativeStore`](crate::cache::DerivativeStore) for the cached variant.
pub fn derive_image(
    backend: &impl ImageBackend,
    image: &ImageNode,
    constraint: &Constraint,
    config: &ImagesConfig,
) -> Result<DerivativeSet> {
    let plan = plan_derivatives(image, constraint, config);
    let source = backend.decode(&image.path)?;
    let bytes = plan
        .items
        .iter()
        .map(|item| backend.resize(&source, &item.params).map(Some))
        .collect::<Result<Vec<_>>>()?;
    let png = backend.placeholder(&source, &plan.placeholder)?;
    let placeholder = Placeholder::from_png(plan.placeholder.width, plan.placeholder.height, &png);
    Ok(plan.into_set(bytes, placeholder))
}
