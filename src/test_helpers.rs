//! Shared test utilities for the quire test suite.
//!
//! Provides image fixture writers, canned image nodes and derivative sets,
//! and an in-memory [`AssetLookup`] so chain stages can be tested without
//! running the image pipeline.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mut assets = TestAssets::default();
//! assets.add_image(
//!     "/blog/post/egg.jpg",
//!     body_constraint(590),
//!     derivative_set("egg", 2000, 1500, body_constraint(590)),
//! );
//! assets.add_file("/blog/post/slides.pdf", "/static/0123456789abcdef/slides.pdf");
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::{ImageEncoder, RgbImage};
use sha2::{Digest, Sha256};

use crate::config::ImagesConfig;
use crate::document::{AssetLookup, LinkedAsset};
use crate::imaging::{
    Constraint, DerivativeSet, ImageNode, Placeholder, SourceFormat, plan_derivatives,
};
use crate::types::NodeId;

// =========================================================================
// Image fixtures
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// Write a small gradient JPEG.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = gradient(width, height);
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Write a small gradient PNG.
pub fn write_test_png(path: &Path, width: u32, height: u32) {
    gradient(width, height).save(path).unwrap();
}

// =========================================================================
// Canned nodes
// =========================================================================

/// A JPEG image node for `path` without touching the filesystem.
///
/// The content hash is the SHA-256 of the path, so distinct paths never share
/// cache entries by accident.
pub fn image_node(path: &str, width: u32, height: u32) -> ImageNode {
    let relative = path.trim_start_matches('/').to_string();
    ImageNode {
        id: NodeId::from_key(&format!("images/{relative}")),
        source_instance: "content".to_string(),
        source_path: relative,
        path: PathBuf::from(path),
        content_hash: format!("{:x}", Sha256::digest(path.as_bytes())),
        natural_width: width,
        natural_height: height,
        format: SourceFormat::Jpeg,
    }
}

/// A planned derivative set for a `stem.jpg` of the given size, with no bytes.
pub fn derivative_set(stem: &str, width: u32, height: u32, constraint: Constraint) -> DerivativeSet {
    let image = image_node(&format!("/fixtures/{stem}.jpg"), width, height);
    let plan = plan_derivatives(&image, &constraint, &ImagesConfig::default());
    let placeholder = Placeholder::from_png(
        plan.placeholder.width,
        plan.placeholder.height,
        &[0x89, b'P', b'N', b'G'],
    );
    let bytes = vec![None; plan.items.len()];
    plan.into_set(bytes, placeholder)
}

// =========================================================================
// In-memory asset lookup
// =========================================================================

/// [`AssetLookup`] over hand-registered images and files.
#[derive(Default)]
pub struct TestAssets {
    images: HashMap<(PathBuf, Constraint), DerivativeSet>,
    files: HashMap<PathBuf, String>,
}

impl TestAssets {
    pub fn add_image(&mut self, path: &str, constraint: Constraint, set: DerivativeSet) {
        self.images.insert((PathBuf::from(path), constraint), set);
    }

    pub fn add_file(&mut self, path: &str, uri: &str) {
        self.files.insert(PathBuf::from(path), uri.to_string());
    }
}

impl AssetLookup for TestAssets {
    fn image(&self, path: &Path, constraint: &Constraint) -> Option<&DerivativeSet> {
        self.images.get(&(path.to_path_buf(), *constraint))
    }

    fn linked_file(&self, path: &Path) -> Option<LinkedAsset> {
        self.files.get(path).map(|uri| LinkedAsset {
            source: path.to_path_buf(),
            uri: uri.clone(),
        })
    }
}
