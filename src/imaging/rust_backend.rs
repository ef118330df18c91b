//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders), once per set |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (configured quality) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Placeholder | `Triangle` resize + `imageops::blur`, PNG |

use super::backend::{BackendError, ImageBackend, SourceImage};
use super::params::{OutputFormat, PlaceholderParams, ResizeParams, SourceFormat};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::path::Path;

/// Gaussian sigma applied to placeholders.
const PLACEHOLDER_BLUR: f32 = 1.0;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn source_format(format: ImageFormat) -> Option<SourceFormat> {
    match format {
        ImageFormat::Jpeg => Some(SourceFormat::Jpeg),
        ImageFormat::Png => Some(SourceFormat::Png),
        ImageFormat::Tiff => Some(SourceFormat::Tiff),
        ImageFormat::WebP => Some(SourceFormat::Webp),
        _ => None,
    }
}

fn open_reader(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>, BackendError> {
    Ok(ImageReader::open(path)?.with_guessed_format()?)
}

/// Load and decode an image from disk.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    open_reader(path)?.decode().map_err(|e| {
        BackendError::UnsupportedFormat(format!("failed to decode {}: {}", path.display(), e))
    })
}

/// Encode into an in-memory buffer.
fn encode(img: &DynamicImage, format: OutputFormat, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let result = match format {
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality as u8))
        }
        OutputFormat::Png => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(PngEncoder::new(&mut buf))
        }
        OutputFormat::Webp => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_with_encoder(WebPEncoder::new_lossless(&mut buf)),
        OutputFormat::Avif => DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(
            AvifEncoder::new_with_speed_quality(&mut buf, 6, quality as u8),
        ),
    };
    result.map_err(|e| {
        BackendError::ProcessingFailed(format!("{} encode failed: {}", format.extension(), e))
    })?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    type Decoded = DynamicImage;

    fn identify(&self, path: &Path) -> Result<SourceImage, BackendError> {
        let reader = open_reader(path)?;
        let format = reader.format().and_then(source_format).ok_or_else(|| {
            BackendError::UnsupportedFormat(format!("{} is not a supported raster image", path.display()))
        })?;
        let (width, height) = reader.into_dimensions().map_err(|e| {
            BackendError::UnsupportedFormat(format!("failed to read {}: {}", path.display(), e))
        })?;
        if width == 0 || height == 0 {
            return Err(BackendError::UnsupportedFormat(format!(
                "{} has zero dimensions",
                path.display()
            )));
        }
        Ok(SourceImage {
            width,
            height,
            format,
        })
    }

    fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError> {
        load_image(path)
    }

    fn resize(&self, source: &DynamicImage, params: &ResizeParams) -> Result<Vec<u8>, BackendError> {
        if (source.width(), source.height()) == (params.width, params.height) {
            return encode(source, params.format, params.quality.value());
        }
        let resized = source.resize_exact(params.width, params.height, FilterType::Lanczos3);
        encode(&resized, params.format, params.quality.value())
    }

    fn placeholder(
        &self,
        source: &DynamicImage,
        params: &PlaceholderParams,
    ) -> Result<Vec<u8>, BackendError> {
        let small = source
            .resize_exact(params.width, params.height, FilterType::Triangle)
            .to_rgba8();
        let blurred = DynamicImage::ImageRgba8(image::imageops::blur(&small, PLACEHOLDER_BLUR));
        encode(&blurred, OutputFormat::Png, 100)
    }
}
