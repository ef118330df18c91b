//! Derivative cache for incremental builds.
//!
//! Encoding is the bottleneck of a build: a single photo at five constrained
//! widths takes far longer than parsing every markdown file in a blog. This
//! module lets the image phase skip encoding when the source image and
//! encoding parameters haven't changed since the last build.
//!
//! # Design
//!
//! The cache targets only the expensive operations (resize + encode and
//! placeholder generation). Identify and hashing always run.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: lookups are by the combination of
//! `source_hash` and `params_hash`, not by output file path. Renaming a post
//! directory or moving an image between roots does not invalidate the cache;
//! only actual image content or encoding parameter changes do.
//!
//! - **`source_hash`**: SHA-256 of the source file contents. Content-based
//!   rather than mtime-based so it survives `git checkout` (which resets
//!   modification times).
//!
//! - **`params_hash`**: SHA-256 of the encoding parameters (width, height,
//!   format, quality). If any of these change, the image is re-encoded.
//!
//! A cache hit requires:
//! 1. An entry with matching `source_hash` and `params_hash` exists
//! 2. The previously-written output file still exists on disk
//!
//! When a hit is found but the output path has changed (the file stem is part
//! of the path), the cached file is copied instead of re-encoding.
//!
//! Placeholders are tiny, so they are stored inline in the manifest.
//!
//! ## Storage
//!
//! The manifest is a JSON file at `<output_dir>/static/.cache-manifest.json`,
//! next to the derivatives it describes.
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` to `build` to force a full rebuild. This starts from an
//! empty manifest, so every image is re-encoded and old files are overwritten.

use crate::config::ImagesConfig;
use crate::imaging::{
    BackendError, Constraint, DerivativeSet, ImageBackend, ImageNode, OutputFormat, Placeholder,
    STATIC_DIR, plan_derivatives,
};
use crate::imaging::backend::decode_once;
use crate::imaging::operations::{DerivativePlan, PlannedDerivative};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Name of the cache manifest file within the static directory.
const MANIFEST_FILENAME: &str = ".cache-manifest.json";

/// Version of the cache manifest format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

/// A single cached output file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub params_hash: String,
}

/// On-disk cache manifest mapping output paths to their cache entries.
///
/// Lookups go through a runtime `content_index` that maps
/// `"{source_hash}:{params_hash}"` to the stored output path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
    /// Placeholders keyed by `"{source_hash}:{params_hash}"`.
    #[serde(default)]
    pub placeholders: HashMap<String, Placeholder>,
    /// Runtime reverse index: `"{source_hash}:{params_hash}"` → output_path.
    /// Built at load time, maintained on insert. Never serialized.
    #[serde(skip)]
    content_index: HashMap<String, String>,
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{}:{}", source_hash, params_hash)
}

impl CacheManifest {
    /// Create an empty manifest (used for `--no-cache` or first build).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            placeholders: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Load from a directory. Returns an empty manifest if the file doesn't
    /// exist or can't be parsed (version mismatch, corruption).
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(MANIFEST_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let mut manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("ignoring unreadable cache manifest: {e}");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest.content_index = build_content_index(&manifest.entries);
        manifest
    }

    /// Save to a directory, creating it if needed.
    pub fn save(&self, dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(MANIFEST_FILENAME), json)
    }

    /// Look up a cached output file by content hashes.
    ///
    /// Returns `Some(stored_output_path)` if an entry with matching
    /// `source_hash` and `params_hash` exists **and** the file is still
    /// on disk under `output_root`.
    pub fn find_cached(
        &self,
        source_hash: &str,
        params_hash: &str,
        output_root: &Path,
    ) -> Option<String> {
        let stored_path = self.content_index.get(&content_key(source_hash, params_hash))?;
        if output_root.join(stored_path).exists() {
            Some(stored_path.clone())
        } else {
            None
        }
    }

    /// Record a cache entry for an output file.
    ///
    /// If an entry with the same content already exists under a different
    /// output path, the old entry is removed.
    pub fn insert(&mut self, output_path: String, source_hash: String, params_hash: String) {
        let key = content_key(&source_hash, &params_hash);

        if let Some(old_path) = self.content_index.get(&key)
            && *old_path != output_path
        {
            self.entries.remove(old_path.as_str());
        }

        self.content_index.insert(key, output_path.clone());
        self.entries.insert(
            output_path,
            CacheEntry {
                source_hash,
                params_hash,
            },
        );
    }

    pub fn find_placeholder(&self, source_hash: &str, params_hash: &str) -> Option<&Placeholder> {
        self.placeholders.get(&content_key(source_hash, params_hash))
    }

    pub fn insert_placeholder(&mut self, source_hash: &str, params_hash: &str, p: Placeholder) {
        self.placeholders.insert(content_key(source_hash, params_hash), p);
    }
}

/// Build the content_index reverse map from the entries map.
fn build_content_index(entries: &HashMap<String, CacheEntry>) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(output_path, entry)| {
            (
                content_key(&entry.source_hash, &entry.params_hash),
                output_path.clone(),
            )
        })
        .collect()
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// SHA-256 hash of the parameters of one derivative.
pub fn hash_resize_params(width: u32, height: u32, format: OutputFormat, quality: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"resize\0");
    hasher.update(width.to_le_bytes());
    hasher.update(height.to_le_bytes());
    hasher.update(format.extension().as_bytes());
    hasher.update(b"\0");
    hasher.update(quality.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hash of placeholder parameters.
pub fn hash_placeholder_params(width: u32, height: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"placeholder\0");
    hasher.update(width.to_le_bytes());
    hasher.update(height.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u32,
    pub copies: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn copy(&mut self) {
        self.copies += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.copies + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 || self.copies > 0 {
            if self.copies > 0 {
                write!(
                    f,
                    "{} cached, {} copied, {} encoded ({} total)",
                    self.hits,
                    self.copies,
                    self.misses,
                    self.total()
                )
            } else {
                write!(
                    f,
                    "{} cached, {} encoded ({} total)",
                    self.hits,
                    self.misses,
                    self.total()
                )
            }
        } else {
            write!(f, "{} encoded", self.misses)
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write through a temp file so concurrent writers of the same derivative
/// never expose a half-written file.
fn write_atomically(dest: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = dest.with_extension(format!("tmp{}-{n}", std::process::id()));
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, dest)
}

/// Writes derivatives under an output root, consulting the cache manifest.
///
/// Shared across rayon workers; the manifest and stats sit behind mutexes
/// that are never held while encoding.
pub struct DerivativeStore {
    output_root: PathBuf,
    manifest: Mutex<CacheManifest>,
    stats: Mutex<CacheStats>,
}

impl DerivativeStore {
    /// Open the store for `output_root`. With `use_cache = false` the
    /// existing manifest is ignored.
    pub fn open(output_root: &Path, use_cache: bool) -> Self {
        let manifest = if use_cache {
            CacheManifest::load(&output_root.join(STATIC_DIR))
        } else {
            CacheManifest::empty()
        };
        Self {
            output_root: output_root.to_path_buf(),
            manifest: Mutex::new(manifest),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Derive one set, writing missing files to disk.
    ///
    /// Returned derivatives carry `bytes: None`; their `uri` resolves under
    /// the output root.
    pub fn derive(
        &self,
        backend: &impl ImageBackend,
        image: &ImageNode,
        constraint: &Constraint,
        config: &ImagesConfig,
    ) -> Result<DerivativeSet, BackendError> {
        let plan = plan_derivatives(image, constraint, config);
        let mut decoded = None;
        for item in &plan.items {
            self.materialize(backend, image, &mut decoded, item)?;
        }
        let placeholder = self.placeholder(backend, image, &mut decoded, &plan)?;
        let bytes = vec![None; plan.items.len()];
        Ok(plan.into_set(bytes, placeholder))
    }

    fn materialize<B: ImageBackend>(
        &self,
        backend: &B,
        image: &ImageNode,
        decoded: &mut Option<B::Decoded>,
        item: &PlannedDerivative,
    ) -> Result<(), BackendError> {
        let source_hash = image.content_hash.as_str();
        let cached = lock(&self.manifest).find_cached(
            source_hash,
            &item.params_hash,
            &self.output_root,
        );
        let dest = self.output_root.join(&item.relative_path);
        match cached {
            Some(stored) if stored == item.relative_path => lock(&self.stats).hit(),
            Some(stored) => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(self.output_root.join(&stored), &dest)?;
                lock(&self.stats).copy();
            }
            None => {
                let source = decode_once(backend, decoded, &image.path)?;
                let data = backend.resize(source, &item.params)?;
                write_atomically(&dest, &data)?;
                tracing::debug!("encoded {}", item.relative_path);
                lock(&self.stats).miss();
            }
        }
        lock(&self.manifest).insert(
            item.relative_path.clone(),
            source_hash.to_string(),
            item.params_hash.clone(),
        );
        Ok(())
    }

    fn placeholder<B: ImageBackend>(
        &self,
        backend: &B,
        image: &ImageNode,
        decoded: &mut Option<B::Decoded>,
        plan: &DerivativePlan,
    ) -> Result<Placeholder, BackendError> {
        let source_hash = image.content_hash.as_str();
        if let Some(p) = lock(&self.manifest).find_placeholder(source_hash, &plan.placeholder_hash) {
            return Ok(p.clone());
        }
        let source = decode_once(backend, decoded, &image.path)?;
        let png = backend.placeholder(source, &plan.placeholder)?;
        let p = Placeholder::from_png(plan.placeholder.width, plan.placeholder.height, &png);
        lock(&self.manifest).insert_placeholder(source_hash, &plan.placeholder_hash, p.clone());
        Ok(p)
    }

    pub fn stats(&self) -> CacheStats {
        *lock(&self.stats)
    }

    /// Persist the manifest next to the derivatives.
    pub fn save(&self) -> io::Result<()> {
        lock(&self.manifest).save(&self.output_root.join(STATIC_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Layout;
    use crate::imaging::backend::tests::MockBackend;
    use crate::test_helpers::image_node;
    use std::fs;
    use tempfile::TempDir;

    // =========================================================================
    // CacheManifest basics
    // =========================================================================

    #[test]
    fn empty_manifest_has_no_entries() {
        let m = CacheManifest::empty();
        assert_eq!(m.version, MANIFEST_VERSION);
        assert!(m.entries.is_empty());
        assert!(m.content_index.is_empty());
    }

    #[test]
    fn find_cached_hit() {
        let tmp = TempDir::new().unwrap();
        let mut m = CacheManifest::empty();
        m.insert("a/b.jpg".into(), "src123".into(), "prm456".into());

        let out = tmp.path().join("a");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("b.jpg"), "data").unwrap();

        assert_eq!(
            m.find_cached("src123", "prm456", tmp.path()),
            Some("a/b.jpg".to_string())
        );
    }

    #[test]
    fn find_cached_miss_wrong_hashes() {
        let tmp = TempDir::new().unwrap();
        let mut m = CacheManifest::empty();
        m.insert("out.jpg".into(), "hash".into(), "params".into());
        fs::write(tmp.path().join("out.jpg"), "data").unwrap();

        assert_eq!(m.find_cached("other", "params", tmp.path()), None);
        assert_eq!(m.find_cached("hash", "other", tmp.path()), None);
    }

    #[test]
    fn find_cached_miss_file_deleted() {
        let mut m = CacheManifest::empty();
        m.insert("gone.jpg".into(), "h".into(), "p".into());
        let tmp = TempDir::new().unwrap();
        assert_eq!(m.find_cached("h", "p", tmp.path()), None);
    }

    #[test]
    fn insert_removes_stale_entry_on_path_change() {
        let mut m = CacheManifest::empty();
        m.insert("static/a/b/old-800.jpg".into(), "src".into(), "prm".into());
        m.insert("static/a/b/new-800.jpg".into(), "src".into(), "prm".into());

        assert!(!m.entries.contains_key("static/a/b/old-800.jpg"));
        assert!(m.entries.contains_key("static/a/b/new-800.jpg"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut m = CacheManifest::empty();
        m.insert("out.jpg".into(), "s".into(), "p".into());
        m.insert_placeholder("s", "ph", Placeholder::from_png(2, 1, b"png"));
        m.save(tmp.path()).unwrap();
        fs::write(tmp.path().join("out.jpg"), "x").unwrap();

        let loaded = CacheManifest::load(tmp.path());
        assert_eq!(loaded.find_cached("s", "p", tmp.path()), Some("out.jpg".into()));
        assert_eq!(loaded.find_placeholder("s", "ph").unwrap().width, 2);
    }

    #[test]
    fn load_corrupt_or_old_manifest_is_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(MANIFEST_FILENAME), "{ nope").unwrap();
        assert!(CacheManifest::load(tmp.path()).entries.is_empty());

        fs::write(
            tmp.path().join(MANIFEST_FILENAME),
            r#"{"version": 0, "entries": {}}"#,
        )
        .unwrap();
        assert!(CacheManifest::load(tmp.path()).entries.is_empty());
    }

    // =========================================================================
    // Hashing
    // =========================================================================

    #[test]
    fn hash_file_matches_content() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::write(&a, "same").unwrap();
        fs::write(&b, "same").unwrap();
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn resize_params_hash_changes_with_every_input() {
        let base = hash_resize_params(590, 443, OutputFormat::Jpeg, 90);
        assert_ne!(base, hash_resize_params(591, 443, OutputFormat::Jpeg, 90));
        assert_ne!(base, hash_resize_params(590, 444, OutputFormat::Jpeg, 90));
        assert_ne!(base, hash_resize_params(590, 443, OutputFormat::Webp, 90));
        assert_ne!(base, hash_resize_params(590, 443, OutputFormat::Jpeg, 80));
        assert_eq!(base, hash_resize_params(590, 443, OutputFormat::Jpeg, 90));
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn stats_display() {
        let mut s = CacheStats::default();
        s.miss();
        assert_eq!(s.to_string(), "1 encoded");
        s.hit();
        assert_eq!(s.to_string(), "1 cached, 1 encoded (2 total)");
        s.copy();
        assert_eq!(s.to_string(), "1 cached, 1 copied, 1 encoded (3 total)");
    }

    // =========================================================================
    // DerivativeStore
    // =========================================================================

    #[test]
    fn store_writes_then_hits() {
        let tmp = TempDir::new().unwrap();
        let image = image_node("/src/photo.jpg", 2000, 1500);
        let config = ImagesConfig::default();
        let constraint = Constraint::MaxWidth(590);

        let store = DerivativeStore::open(tmp.path(), true);
        let backend = MockBackend::new();
        let set = store.derive(&backend, &image, &constraint, &config).unwrap();
        let uri = &set.derivatives[0].uri;
        assert!(tmp.path().join(uri.trim_start_matches('/')).exists());
        assert_eq!(store.stats().misses, 1);
        store.save().unwrap();

        let store = DerivativeStore::open(tmp.path(), true);
        let backend = MockBackend::new();
        let again = store.derive(&backend, &image, &constraint, &config).unwrap();
        assert_eq!(again, set);
        assert_eq!(store.stats().hits, 1);
        assert_eq!(backend.resize_count(), 0);
        assert!(backend.get_operations().is_empty(), "placeholder came from cache");
    }

    #[test]
    fn store_without_cache_reencodes() {
        let tmp = TempDir::new().unwrap();
        let image = image_node("/src/photo.jpg", 1000, 1000);
        let config = ImagesConfig::default();

        let store = DerivativeStore::open(tmp.path(), true);
        store
            .derive(&MockBackend::new(), &image, &Constraint::MaxWidth(500), &config)
            .unwrap();
        store.save().unwrap();

        let store = DerivativeStore::open(tmp.path(), false);
        let backend = MockBackend::new();
        store
            .derive(&backend, &image, &Constraint::MaxWidth(500), &config)
            .unwrap();
        assert_eq!(backend.resize_count(), 1);
        assert_eq!(backend.decode_count(), 1);
    }

    #[test]
    fn store_decodes_once_per_set() {
        let tmp = TempDir::new().unwrap();
        let image = image_node("/src/photo.jpg", 2000, 1500);
        let store = DerivativeStore::open(tmp.path(), true);
        let backend = MockBackend::new();
        let set = store
            .derive(
                &backend,
                &image,
                &Constraint::Layout(Layout::Constrained(800)),
                &ImagesConfig::default(),
            )
            .unwrap();
        assert!(set.derivatives.len() > 1);
        assert_eq!(backend.resize_count(), set.derivatives.len());
        assert_eq!(backend.decode_count(), 1);
    }

    #[test]
    fn renamed_source_copies_cached_file() {
        let tmp = TempDir::new().unwrap();
        let config = ImagesConfig::default();
        let original = image_node("/src/photo.jpg", 1000, 1000);
        let mut renamed = image_node("/src/renamed.jpg", 1000, 1000);
        renamed.content_hash = original.content_hash.clone();

        let store = DerivativeStore::open(tmp.path(), true);
        store
            .derive(&MockBackend::new(), &original, &Constraint::MaxWidth(500), &config)
            .unwrap();

        let backend = MockBackend::new();
        let set = store
            .derive(&backend, &renamed, &Constraint::MaxWidth(500), &config)
            .unwrap();
        assert_eq!(backend.resize_count(), 0);
        assert_eq!(store.stats().copies, 1);
        assert!(set.derivatives[0].uri.ends_with("/renamed-500.jpg"));
        assert!(tmp.path().join(set.derivatives[0].uri.trim_start_matches('/')).exists());
    }
}
