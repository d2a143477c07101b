//! Result of walking the node tree towards a target path.

use crate::constants::PARTITION_LAYER;

/// The deepest node reached while resolving a path.
///
/// The walk stops early at a missing child or at a partition. `path` is the
/// prefix of `target_path` that was actually reached.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    /// Content prefix of the node, `None` if the node does not exist.
    pub prefix: Option<Vec<u8>>,
    /// Path of the node relative to the layer that resolved it.
    pub path: Vec<String>,
    /// The path that was being resolved.
    pub target_path: Vec<String>,
    /// Stored layer, `None` until loaded.
    pub layer: Option<Vec<u8>>,
}

impl Node {
    pub fn exists(&self) -> bool {
        self.prefix.is_some()
    }

    /// Stored layer, empty when absent or not loaded.
    pub fn layer(&self) -> &[u8] {
        self.layer.as_deref().unwrap_or_default()
    }

    pub fn is_partition(&self) -> bool {
        self.exists() && self.layer() == PARTITION_LAYER
    }

    /// Whether the target lies in the partition this node embeds.
    ///
    /// With `include_empty_subpath`, a target naming the partition itself
    /// also counts.
    pub fn is_in_partition(&self, include_empty_subpath: bool) -> bool {
        self.is_partition() && (include_empty_subpath || self.target_path.len() > self.path.len())
    }

    /// Remainder of the target path below this node.
    pub fn partition_subpath(&self) -> Vec<String> {
        self.target_path[self.path.len()..].to_vec()
    }
}
