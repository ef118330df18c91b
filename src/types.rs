//! Shared types used across the pipeline stages.
//!
//! Node identity lives here because every stage needs it: the transformers mint
//! ids, the image pipeline keys derivatives by them, and the graph indexes and
//! resolves references through them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the SHA-256 digest of a node key.
const ID_LEN: usize = 16;

/// Stable identifier of a node in the content graph.
///
/// Ids are derived from stable keys (source paths, entry indices) so the same
/// content tree always produces the same ids, build after build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Hash a stable key into an id.
    ///
    /// ```
    /// # use quire::types::NodeId;
    /// let a = NodeId::from_key("blog/hello-world/index.md");
    /// let b = NodeId::from_key("blog/hello-world/index.md");
    /// assert_eq!(a, b);
    /// assert_eq!(a.as_str().len(), 16);
    /// ```
    pub fn from_key(key: &str) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        let hex = format!("{:x}", digest);
        Self(hex[..ID_LEN].to_string())
    }

    /// Use an author-supplied id verbatim (records carrying an `id` field).
    pub fn explicit(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three kinds of addressable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Document,
    Record,
    Image,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Document => "document",
            NodeKind::Record => "record",
            NodeKind::Image => "image",
        };
        f.write_str(s)
    }
}

/// Collection that holds every image node, whatever root it came from.
pub const IMAGES_COLLECTION: &str = "images";

/// Collection that holds the single site-metadata node.
pub const SITE_COLLECTION: &str = "site";

/// A non-fatal problem attached to a node.
///
/// Warnings never abort the build. They are surfaced in the build report and,
/// for references, turn into query-time errors when a query needs the missing
/// target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeWarning {
    /// A body reference (image or linked file) did not resolve to an asset.
    UnresolvedAsset { reference: String },
    /// A field declared as a reference did not resolve to a node.
    UnresolvedReference { field: String, value: String },
    /// The image could not be decoded or encoded; it has no derivatives.
    UnsupportedFormat { message: String },
    /// An explicit record id was already taken; a hashed id was used instead.
    DuplicateId { id: String },
}

impl fmt::Display for NodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeWarning::UnresolvedAsset { reference } => {
                write!(f, "unresolved asset: {reference}")
            }
            NodeWarning::UnresolvedReference { field, value } => {
                write!(f, "unresolved reference in `{field}`: {value}")
            }
            NodeWarning::UnsupportedFormat { message } => {
                write!(f, "unsupported image: {message}")
            }
            NodeWarning::DuplicateId { id } => write!(f, "duplicate record id `{id}`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_short() {
        let id = NodeId::from_key("blog/post.md");
        assert_eq!(id, NodeId::from_key("blog/post.md"));
        assert_eq!(id.as_str().len(), ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_keys_give_different_ids() {
        assert_ne!(NodeId::from_key("a.md"), NodeId::from_key("b.md"));
    }

    #[test]
    fn explicit_id_is_kept_verbatim() {
        assert_eq!(NodeId::explicit("kelley").as_str(), "kelley");
    }

    #[test]
    fn warning_display() {
        let w = NodeWarning::UnresolvedAsset {
            reference: "./missing.png".into(),
        };
        assert_eq!(w.to_string(), "unresolved asset: ./missing.png");
    }
}
