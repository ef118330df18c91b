//! Content root discovery.
//!
//! Stage 1 of the build. Each configured root is registered once, then walked
//! recursively to produce a sorted list of [`FileDescriptor`]s that the
//! transformers consume.
//!
//! ## File Classification
//!
//! | Extension | Kind |
//! |---|---|
//! | `md`, `markdown` | [`FileKind::Document`] |
//! | `yaml`, `yml`, `json` | [`FileKind::Record`] |
//! | `jpg`, `jpeg`, `png`, `tif`, `tiff`, `webp` | [`FileKind::Image`] |
//! | anything else | [`FileKind::Other`] (linked files only) |
//!
//! Hidden entries (dot-prefixed files and directories) are never listed. A
//! root with a kind hint other than `auto` only contributes files of that kind;
//! `Other` files are always listed so documents can link to them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Content root not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Which file kinds a root contributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindHint {
    #[default]
    Auto,
    Documents,
    Records,
    Images,
}

impl KindHint {
    fn admits(self, kind: FileKind) -> bool {
        match (self, kind) {
            (KindHint::Auto, _) | (_, FileKind::Other) => true,
            (KindHint::Documents, FileKind::Document) => true,
            (KindHint::Records, FileKind::Record) => true,
            (KindHint::Images, FileKind::Image) => true,
            _ => false,
        }
    }
}

/// A registered content root. Immutable for the duration of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRoot {
    /// Canonical absolute path.
    pub path: PathBuf,
    pub collection: String,
    pub kind_hint: KindHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Document,
    Record,
    Image,
    Other,
}

impl FileKind {
    /// Classify a lowercase extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "md" | "markdown" => FileKind::Document,
            "yaml" | "yml" | "json" => FileKind::Record,
            "jpg" | "jpeg" | "png" | "tif" | "tiff" | "webp" => FileKind::Image,
            _ => FileKind::Other,
        }
    }
}

/// A discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to the root, always `/`-separated.
    pub relative_path: String,
    /// Lowercase extension, empty when the file has none.
    pub extension: String,
    pub size: u64,
    pub kind: FileKind,
}

impl FileDescriptor {
    /// File name without extension.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }
}

/// Register a content root.
///
/// Fails with [`SourceError::NotFound`] when `path` does not exist or is not a
/// directory.
pub fn register_root(
    path: &Path,
    collection: &str,
    kind_hint: KindHint,
) -> Result<ContentRoot, SourceError> {
    if !path.is_dir() {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }
    Ok(ContentRoot {
        path: path.canonicalize()?,
        collection: collection.to_string(),
        kind_hint,
    })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// List every file under a root, sorted by path.
pub fn list_files(root: &ContentRoot) -> Result<Vec<FileDescriptor>, SourceError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(&root.path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let kind = FileKind::from_extension(&extension);
        if !root.kind_hint.admits(kind) {
            continue;
        }
        let relative_path = path
            .strip_prefix(&root.path)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(FileDescriptor {
            path: path.to_path_buf(),
            relative_path,
            extension,
            size: entry.metadata()?.len(),
            kind,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("hello-world")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("hello-world/index.md"), "# hi").unwrap();
        fs::write(root.join("hello-world/salty_egg.JPG"), b"x").unwrap();
        fs::write(root.join("hello-world/slides.pdf"), b"%PDF").unwrap();
        fs::write(root.join("talks.yaml"), "- title: a").unwrap();
        fs::write(root.join(".DS_Store"), b"").unwrap();
        fs::write(root.join(".git/config"), b"").unwrap();
        tmp
    }

    #[test]
    fn register_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let result = register_root(&tmp.path().join("nope"), "blog", KindHint::Auto);
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[test]
    fn register_file_as_root_fails() {
        let tmp = setup();
        let result = register_root(&tmp.path().join("talks.yaml"), "blog", KindHint::Auto);
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[test]
    fn list_files_classifies_and_sorts() {
        let tmp = setup();
        let root = register_root(tmp.path(), "blog", KindHint::Auto).unwrap();
        let files = list_files(&root).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(
            rels,
            vec![
                "hello-world/index.md",
                "hello-world/salty_egg.JPG",
                "hello-world/slides.pdf",
                "talks.yaml",
            ]
        );
        assert_eq!(files[0].kind, FileKind::Document);
        assert_eq!(files[1].kind, FileKind::Image);
        assert_eq!(files[1].extension, "jpg");
        assert_eq!(files[2].kind, FileKind::Other);
        assert_eq!(files[3].kind, FileKind::Record);
        assert_eq!(files[3].stem(), "talks");
    }

    #[test]
    fn kind_hint_filters_but_keeps_other() {
        let tmp = setup();
        let root = register_root(tmp.path(), "blog", KindHint::Documents).unwrap();
        let kinds: Vec<FileKind> = list_files(&root).unwrap().iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FileKind::Document, FileKind::Other]);
    }

    #[test]
    fn listing_is_deterministic() {
        let tmp = setup();
        let root = register_root(tmp.path(), "blog", KindHint::Auto).unwrap();
        assert_eq!(list_files(&root).unwrap(), list_files(&root).unwrap());
    }

    #[test]
    fn stored_path_is_canonical() {
        let tmp = setup();
        let root = register_root(&tmp.path().join("hello-world/.."), "blog", KindHint::Auto).unwrap();
        assert_eq!(root.path, tmp.path().canonicalize().unwrap());
    }
}
