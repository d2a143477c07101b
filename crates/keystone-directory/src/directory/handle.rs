//! Handles to opened directories.

use futures::StreamExt;
use futures::stream;
use futures::stream::BoxStream;
use keystone_kv::Transaction;
use keystone_kv::TransactionContext;
use keystone_kv::Transactor;
use keystone_layer::Subspace;

use super::CrossPartitionMoveSnafu;
use super::DirectoryError;
use super::DirectoryLayer;
use super::PartitionSubspaceSnafu;
use super::validation::validate_path;
use crate::constants::PARTITION_LAYER;

/// An opened directory.
///
/// Holds the directory's absolute path and content prefix. Every operation
/// takes paths relative to the directory. The handle is not invalidated by
/// moves or removals made through other handles; its content subspace keeps
/// pointing at the same prefix.
#[derive(Debug, Clone)]
pub struct Directory {
    path: Vec<String>,
    kind: DirectoryKind,
}

#[derive(Debug, Clone)]
enum DirectoryKind {
    Standard {
        content: Subspace,
        layer: Vec<u8>,
        directory_layer: DirectoryLayer,
    },
    /// The embedded layer owns the partition's content prefix; the parent
    /// layer is where the partition itself is recorded.
    Partition {
        partition_layer: DirectoryLayer,
        parent_layer: DirectoryLayer,
    },
}

impl Directory {
    pub(crate) fn new(path: Vec<String>, content: Subspace, layer: Vec<u8>, directory_layer: DirectoryLayer) -> Self {
        Self {
            path,
            kind: DirectoryKind::Standard {
                content,
                layer,
                directory_layer,
            },
        }
    }

    pub(crate) fn partition(path: Vec<String>, partition_layer: DirectoryLayer, parent_layer: DirectoryLayer) -> Self {
        Self {
            path,
            kind: DirectoryKind::Partition {
                partition_layer,
                parent_layer,
            },
        }
    }

    /// Absolute path of the directory.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Layer identifier, empty if none was recorded.
    pub fn layer(&self) -> &[u8] {
        match &self.kind {
            DirectoryKind::Standard { layer, .. } => layer,
            DirectoryKind::Partition { .. } => PARTITION_LAYER,
        }
    }

    pub fn is_partition(&self) -> bool {
        matches!(self.kind, DirectoryKind::Partition { .. })
    }

    /// Content prefix of the directory.
    pub fn prefix(&self) -> &[u8] {
        match &self.kind {
            DirectoryKind::Standard { content, .. } => content.prefix(),
            DirectoryKind::Partition { partition_layer, .. } => partition_layer.content_subspace().prefix(),
        }
    }

    /// Subspace for the directory's own data.
    ///
    /// Partitions have none: their prefix belongs to the embedded layer.
    pub fn subspace(&self) -> Result<&Subspace, DirectoryError> {
        match &self.kind {
            DirectoryKind::Standard { content, .. } => Ok(content),
            DirectoryKind::Partition { .. } => PartitionSubspaceSnafu { path: self.path.clone() }.fail(),
        }
    }

    /// The layer that resolves paths below this directory.
    pub fn directory_layer(&self) -> &DirectoryLayer {
        match &self.kind {
            DirectoryKind::Standard { directory_layer, .. } => directory_layer,
            DirectoryKind::Partition { partition_layer, .. } => partition_layer,
        }
    }

    // ========================================================================
    // Operations relative to this directory
    // ========================================================================

    /// Open `path` below this directory, creating it if needed.
    pub async fn create_or_open<S: Transactor>(
        &self,
        scope: &S,
        path: &[&str],
        layer: Option<&[u8]>,
    ) -> Result<Directory, DirectoryError> {
        let layer_ref = self.directory_layer();
        let path = self.subpath(validate_path(path)?, layer_ref);
        layer_ref
            .create_or_open_at(scope, path, layer.unwrap_or_default().to_vec(), None, true, true)
            .await
    }

    /// Open an existing directory below this one.
    pub async fn open<S: Transactor>(
        &self,
        scope: &S,
        path: &[&str],
        layer: Option<&[u8]>,
    ) -> Result<Directory, DirectoryError> {
        let layer_ref = self.directory_layer();
        let path = self.subpath(validate_path(path)?, layer_ref);
        layer_ref
            .create_or_open_at(scope, path, layer.unwrap_or_default().to_vec(), None, false, true)
            .await
    }

    /// Create a new directory below this one.
    pub async fn create<S: Transactor>(
        &self,
        scope: &S,
        path: &[&str],
        layer: Option<&[u8]>,
        prefix: Option<&[u8]>,
    ) -> Result<Directory, DirectoryError> {
        let layer_ref = self.directory_layer();
        let path = self.subpath(validate_path(path)?, layer_ref);
        layer_ref
            .create_or_open_at(
                scope,
                path,
                layer.unwrap_or_default().to_vec(),
                prefix.map(<[u8]>::to_vec),
                true,
                false,
            )
            .await
    }

    /// Move a directory between two paths relative to this one.
    pub async fn move_directory<S: Transactor>(
        &self,
        scope: &S,
        old_path: &[&str],
        new_path: &[&str],
    ) -> Result<Directory, DirectoryError> {
        let layer_ref = self.directory_layer();
        let old_path = self.subpath(validate_path(old_path)?, layer_ref);
        let new_path = self.subpath(validate_path(new_path)?, layer_ref);
        layer_ref.move_at(scope, old_path, new_path).await
    }

    /// Move this directory to an absolute path in the same partition.
    pub async fn move_to<S: Transactor>(&self, scope: &S, new_absolute_path: &[&str]) -> Result<Directory, DirectoryError> {
        let new_absolute_path = validate_path(new_absolute_path)?;
        let layer_ref = self.layer_for_path(&[]);
        let partition_len = layer_ref.path().len();

        if new_absolute_path.len() < partition_len || new_absolute_path[..partition_len] != *layer_ref.path() {
            return CrossPartitionMoveSnafu {
                old_path: self.path.clone(),
                new_path: new_absolute_path,
            }
            .fail();
        }

        let old_path = self.subpath(Vec::new(), layer_ref);
        let new_path = new_absolute_path[partition_len..].to_vec();
        layer_ref.move_at(scope, old_path, new_path).await
    }

    /// Remove `path` below this directory, or this directory itself when
    /// `path` is empty.
    pub async fn remove<S: Transactor>(&self, scope: &S, path: &[&str]) -> Result<(), DirectoryError> {
        let path = validate_path(path)?;
        let layer_ref = self.layer_for_path(&path);
        let path = self.subpath(path, layer_ref);
        layer_ref.remove_at(scope, path, true).await.map(|_| ())
    }

    /// Like [`remove`](Self::remove), returning whether anything was removed.
    pub async fn remove_if_exists<S: Transactor>(&self, scope: &S, path: &[&str]) -> Result<bool, DirectoryError> {
        let path = validate_path(path)?;
        let layer_ref = self.layer_for_path(&path);
        let path = self.subpath(path, layer_ref);
        layer_ref.remove_at(scope, path, false).await
    }

    /// Whether `path` exists below this directory. An empty path asks about
    /// this directory.
    pub async fn exists<S: Transactor>(&self, scope: &S, path: &[&str]) -> Result<bool, DirectoryError> {
        let path = validate_path(path)?;
        let layer_ref = self.layer_for_path(&path);
        let path = self.subpath(path, layer_ref);
        layer_ref.exists_at(scope, path).await
    }

    /// Names of the immediate subdirectories of `path` below this directory.
    pub async fn list_all<S: Transactor>(&self, scope: &S, path: &[&str]) -> Result<Vec<String>, DirectoryError> {
        let layer_ref = self.directory_layer();
        let path = self.subpath(validate_path(path)?, layer_ref);
        layer_ref.list_all_at(scope, path).await
    }

    /// Stream the immediate subdirectories of `path` below this directory.
    pub fn list<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        path: &[&str],
    ) -> BoxStream<'static, Result<String, DirectoryError>> {
        let layer_ref = self.directory_layer();
        match validate_path(path) {
            Ok(path) => layer_ref.list_at(tr.clone(), self.subpath(path, layer_ref)),
            Err(err) => stream::once(async move { Err(err) }).boxed(),
        }
    }

    // ========================================================================
    // Path resolution
    // ========================================================================

    /// A partition refers to itself through its parent layer; everything
    /// else goes through [`directory_layer`](Self::directory_layer).
    fn layer_for_path(&self, path: &[String]) -> &DirectoryLayer {
        match &self.kind {
            DirectoryKind::Partition { parent_layer, .. } if path.is_empty() => parent_layer,
            _ => self.directory_layer(),
        }
    }

    /// `path`, relative to this directory, as a path relative to `layer`.
    fn subpath(&self, path: Vec<String>, layer: &DirectoryLayer) -> Vec<String> {
        let mut full = self.path[layer.path().len()..].to_vec();
        full.extend(path);
        full
    }
}
