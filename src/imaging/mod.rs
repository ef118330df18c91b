//! Image derivatives: pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader` (header only) |
//! | **Resize → JPEG / PNG / WebP / AVIF** | Lanczos3 + `image` encoders |
//! | **Placeholder** | Triangle downscale + blur → base64 PNG |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Derivative planning and in-memory derivation

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, SourceImage};
pub use calculations::{Size, aspect_percent, plan_widths, scale_to_width};
pub use operations::{
    DerivativePlan, DerivativeSet, ImageDerivative, ImageNode, Placeholder, STATIC_DIR,
    default_constraint, derive_image, plan_derivatives,
};
pub use params::{
    Constraint, FormatChoice, Layout, OutputFormat, PlaceholderParams, Quality, ResizeParams,
    SourceFormat,
};
pub use rust_backend::RustBackend;
