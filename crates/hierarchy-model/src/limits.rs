//! Structural limits for hierarchy trees
//!
//! These bounds keep every tree walk (re-parenting, cascading delete,
//! descendant queries) proportional to a known worst case.

use serde::{Deserialize, Serialize};

/// Hard cap on tree depth: `len(path)` must stay strictly below this.
pub const MAX_DEPTH: usize = 50;

/// Hard cap on direct children of a single node.
pub const MAX_CHILDREN: usize = 1000;

/// Hard cap on the serialized size of an entity's metadata, in bytes.
pub const MAX_METADATA_BYTES: usize = 16 * 1024;

/// Hard cap on entity name length, in characters.
pub const MAX_NAME_LEN: usize = 100;

/// Limits enforced by the tree engine on every mutation.
///
/// The defaults are the hard caps. Deployments may tighten them but never
/// loosen them past the caps.
///
/// # Examples
///
/// ```
/// use hierarchy_model::TreeLimits;
///
/// let limits = TreeLimits::default();
/// assert!(limits.depth_allows(49));
/// assert!(!limits.depth_allows(50));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeLimits {
    /// Exclusive upper bound on `len(path)`
    pub max_depth: usize,

    /// Maximum direct children per node, across all types
    pub max_children: usize,

    /// Maximum serialized metadata size in bytes
    pub max_metadata_bytes: usize,

    /// Maximum entity name length in characters
    pub max_name_len: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            max_children: MAX_CHILDREN,
            max_metadata_bytes: MAX_METADATA_BYTES,
            max_name_len: MAX_NAME_LEN,
        }
    }
}

impl TreeLimits {
    /// Whether a node whose path has `path_len` elements is within depth bounds.
    pub fn depth_allows(&self, path_len: usize) -> bool {
        path_len < self.max_depth
    }

    /// Whether a parent that already has `current` children may take one more.
    pub fn fan_out_allows(&self, current: usize) -> bool {
        current < self.max_children
    }

    /// These limits with every value lowered to its hard cap.
    pub fn capped(self) -> Self {
        Self {
            max_depth: self.max_depth.min(MAX_DEPTH),
            max_children: self.max_children.min(MAX_CHILDREN),
            max_metadata_bytes: self.max_metadata_bytes.min(MAX_METADATA_BYTES),
            max_name_len: self.max_name_len.min(MAX_NAME_LEN),
        }
    }

    /// Whether every limit is non-zero and within the hard caps.
    pub fn is_within_caps(&self) -> bool {
        (1..=MAX_DEPTH).contains(&self.max_depth)
            && (1..=MAX_CHILDREN).contains(&self.max_children)
            && (1..=MAX_METADATA_BYTES).contains(&self.max_metadata_bytes)
            && (1..=MAX_NAME_LEN).contains(&self.max_name_len)
    }
}
