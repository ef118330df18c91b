//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the operations every backend must
//! support: identify, decode, resize, and placeholder. A source is decoded
//! once per derivative set and every resize of that set starts from the same
//! decoded pixels. Backends return encoded bytes; writing them to
//! content-addressed paths is the caller's job.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate.

use super::params::{PlaceholderParams, ResizeParams, SourceFormat};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceImage {
    pub width: u32,
    pub height: u32,
    pub format: SourceFormat,
}

/// Trait for image processing backends.
///
/// `Sync` so a single backend can be shared across rayon workers.
pub trait ImageBackend: Sync {
    /// A fully decoded source image.
    type Decoded;

    /// Read dimensions and format without a full decode.
    fn identify(&self, path: &Path) -> Result<SourceImage, BackendError>;

    /// Decode the whole image.
    fn decode(&self, path: &Path) -> Result<Self::Decoded, BackendError>;

    /// Resize a decoded source to exactly `width × height` and encode.
    fn resize(&self, source: &Self::Decoded, params: &ResizeParams) -> Result<Vec<u8>, BackendError>;

    /// Produce the blurred PNG placeholder from a decoded source.
    fn placeholder(
        &self,
        source: &Self::Decoded,
        params: &PlaceholderParams,
    ) -> Result<Vec<u8>, BackendError>;
}

/// Decode into `slot` on first use and hand out the decoded image.
pub fn decode_once<'a, B: ImageBackend>(
    backend: &B,
    slot: &'a mut Option<B::Decoded>,
    path: &Path,
) -> Result<&'a B::Decoded, BackendError> {
    let decoded = match slot.take() {
        Some(decoded) => decoded,
        None => backend.decode(path)?,
    };
    let decoded: &'a B::Decoded = slot.insert(decoded);
    Ok(decoded)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::params::{OutputFormat, Quality};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Mock backend that records operations without executing them.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    ///
    /// Identify answers come from a per-path table so results do not depend on
    /// call order; unknown paths fail with `UnsupportedFormat`.
    #[derive(Default)]
    pub struct MockBackend {
        pub images: Mutex<HashMap<PathBuf, SourceImage>>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        Decode(String),
        Resize {
            source: String,
            width: u32,
            height: u32,
            format: OutputFormat,
            quality: u32,
        },
        Placeholder {
            source: String,
            width: u32,
            height: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_image(self, path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
            self.images.lock().unwrap().insert(
                path.into(),
                SourceImage {
                    width,
                    height,
                    format: SourceFormat::Jpeg,
                },
            );
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn decode_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Decode(_)))
                .count()
        }

        pub fn resize_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Resize { .. }))
                .count()
        }
    }

    impl ImageBackend for MockBackend {
        /// The mock "decodes" to the source path.
        type Decoded = PathBuf;

        fn identify(&self, path: &Path) -> Result<SourceImage, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(path.to_string_lossy().to_string()));

            self.images
                .lock()
                .unwrap()
                .get(path)
                .copied()
                .ok_or_else(|| BackendError::UnsupportedFormat(path.display().to_string()))
        }

        fn decode(&self, path: &Path) -> Result<PathBuf, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Decode(path.to_string_lossy().to_string()));
            Ok(path.to_path_buf())
        }

        fn resize(&self, _source: &PathBuf, params: &ResizeParams) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Resize {
                source: params.source.to_string_lossy().to_string(),
                width: params.width,
                height: params.height,
                format: params.format,
                quality: params.quality.value(),
            });
            Ok(format!(
                "{}x{}.{}",
                params.width,
                params.height,
                params.format.extension()
            )
            .into_bytes())
        }

        fn placeholder(
            &self,
            _source: &PathBuf,
            params: &PlaceholderParams,
        ) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Placeholder {
                source: params.source.to_string_lossy().to_string(),
                width: params.width,
                height: params.height,
            });
            Ok(vec![0x89, b'P', b'N', b'G'])
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::new().with_image("/test/image.jpg", 800, 600);

        let result = backend.identify(Path::new("/test/image.jpg")).unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Identify(p) if p == "/test/image.jpg"));
    }

    #[test]
    fn mock_identify_unknown_path_is_unsupported() {
        let backend = MockBackend::new();
        let result = backend.identify(Path::new("/nope.jpg"));
        assert!(matches!(result, Err(BackendError::UnsupportedFormat(_))));
    }

    #[test]
    fn mock_records_resize() {
        let backend = MockBackend::new();

        let source = backend.decode(Path::new("/source.jpg")).unwrap();
        let bytes = backend
            .resize(&source, &ResizeParams {
                source: "/source.jpg".into(),
                width: 800,
                height: 600,
                format: OutputFormat::Webp,
                quality: Quality::new(90),
            })
            .unwrap();
        assert_eq!(bytes, b"800x600.webp");

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(
            &ops[1],
            RecordedOp::Resize {
                width: 800,
                height: 600,
                quality: 90,
                format: OutputFormat::Webp,
                ..
            }
        ));
    }

    #[test]
    fn decode_once_reuses_the_slot() {
        let backend = MockBackend::new();
        let mut slot = None;
        decode_once(&backend, &mut slot, Path::new("/a.jpg")).unwrap();
        decode_once(&backend, &mut slot, Path::new("/a.jpg")).unwrap();
        assert_eq!(backend.decode_count(), 1);
    }
}
