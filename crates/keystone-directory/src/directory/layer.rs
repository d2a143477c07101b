//! The directory layer: path resolution, creation, moves, removal, listing.
//!
//! # Layout
//!
//! ```text
//! <node_subspace> [prefix]                      node of the directory at `prefix`
//! <node_subspace> [prefix, 0, name] -> child    child entries
//! <node_subspace> [prefix, "layer"] -> layer    layer identifier
//! <root node> ["version"] -> 3 x u32 LE         layout version
//! <root node> ["hca", ...]                      prefix allocator
//! ```
//!
//! The root node is the node whose prefix is the node subspace prefix
//! itself. Content prefixes are the content subspace prefix followed by an
//! allocated (or manual) suffix.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::FutureExt;
use futures::StreamExt;
use futures::TryStreamExt;
use futures::future::BoxFuture;
use futures::stream;
use futures::stream::BoxStream;
use keystone_kv::RangeOptions;
use keystone_kv::Transaction;
use keystone_kv::TransactionContext;
use keystone_kv::Transactor;
use keystone_layer::Element;
use keystone_layer::KeyRange;
use keystone_layer::Subspace;
use keystone_layer::Transformer;
use keystone_layer::Tuple;
use keystone_layer::strinc;
use snafu::ResultExt;
use tracing::debug;
use tracing::info;

use super::AllocationFailedSnafu;
use super::AllocatorPrefixInUseSnafu;
use super::AllocatorPrefixNotEmptySnafu;
use super::AlreadyExistsSnafu;
use super::CorruptedMetadataSnafu;
use super::CrossPartitionMoveSnafu;
use super::DirectoryError;
use super::IncompatibleVersionSnafu;
use super::LayerMismatchSnafu;
use super::ManualPrefixNotAllowedSnafu;
use super::MoveCycleSnafu;
use super::NotFoundSnafu;
use super::ParentNotFoundSnafu;
use super::PartitionLayerSnafu;
use super::PrefixInUseSnafu;
use super::ReadOnlyVersionSnafu;
use super::RootOperationSnafu;
use super::StorageSnafu;
use super::SubspaceSnafu;
use super::display_path;
use super::handle::Directory;
use super::node::Node;
use super::validation::check_depth;
use super::validation::validate_path;
use crate::allocator::HighContentionAllocator;
use crate::constants::DEFAULT_NODE_PREFIX;
use crate::constants::EXPECTED_VERSION;
use crate::constants::HCA_PREFIX;
use crate::constants::LAYER_KEY;
use crate::constants::LIST_PAGE_SIZE;
use crate::constants::PARTITION_LAYER;
use crate::constants::SUBDIRS_KEY;
use crate::constants::VERSION_KEY;
use crate::verified::VersionCheck;
use crate::verified::check_version;
use crate::verified::path_starts_with;
use crate::version::VersionEncoding;

/// Where a directory layer keeps its metadata and contents.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLayerOptions {
    /// Metadata subspace. Defaults to the single byte `0xFE`.
    pub node_subspace: Option<Subspace>,
    /// Raw metadata prefix, used when `node_subspace` is not set.
    pub node_prefix: Option<Vec<u8>>,
    /// Subspace under which content prefixes are allocated. Defaults to the
    /// empty prefix.
    pub content_subspace: Option<Subspace>,
    /// Raw content prefix, used when `content_subspace` is not set.
    pub content_prefix: Option<Vec<u8>>,
    /// Accept caller-chosen prefixes in [`DirectoryLayer::create`].
    pub allow_manual_prefixes: bool,
}

/// A tree of named directories, each owning a unique key prefix.
///
/// Cheap to clone. Every operation takes a [`Transactor`]: pass a database
/// to run the operation in its own retried transaction, or a
/// [`TransactionContext`] to make it part of a larger transaction.
#[derive(Debug, Clone)]
pub struct DirectoryLayer {
    inner: Arc<LayerInner>,
}

#[derive(Debug)]
struct LayerInner {
    node_subspace: Subspace,
    content_subspace: Subspace,
    root_node: Subspace,
    allocator: HighContentionAllocator,
    allow_manual_prefixes: bool,
    /// Absolute path of the partition this layer is embedded in.
    path: Vec<String>,
}

impl Default for DirectoryLayer {
    fn default() -> Self {
        Self::new(DirectoryLayerOptions::default())
    }
}

impl DirectoryLayer {
    /// Create a directory layer.
    pub fn new(options: DirectoryLayerOptions) -> Self {
        let node_subspace = options.node_subspace.unwrap_or_else(|| {
            Subspace::from_bytes(options.node_prefix.unwrap_or_else(|| vec![DEFAULT_NODE_PREFIX]))
        });
        let content_subspace = options
            .content_subspace
            .unwrap_or_else(|| Subspace::from_bytes(options.content_prefix.unwrap_or_default()));
        Self::build(node_subspace, content_subspace, options.allow_manual_prefixes, Vec::new())
    }

    /// The layer embedded in the partition whose content prefix is `prefix`.
    pub(crate) fn for_partition(prefix: &[u8], path: Vec<String>) -> Self {
        let content = Subspace::from_bytes(prefix.to_vec());
        Self::build(content.at_raw(&[DEFAULT_NODE_PREFIX]), content, false, path)
    }

    fn build(node_subspace: Subspace, content_subspace: Subspace, allow_manual_prefixes: bool, path: Vec<String>) -> Self {
        let root_node = node_subspace.subspace(&Tuple::new().push(node_subspace.prefix()));
        let allocator = HighContentionAllocator::new(&root_node.subspace(&Tuple::new().push(HCA_PREFIX)));
        Self {
            inner: Arc::new(LayerInner {
                node_subspace,
                content_subspace,
                root_node,
                allocator,
                allow_manual_prefixes,
                path,
            }),
        }
    }

    /// Absolute path of this layer: empty for a top-level layer, the
    /// partition's path for an embedded one.
    pub fn path(&self) -> &[String] {
        &self.inner.path
    }

    /// Metadata subspace.
    pub fn node_subspace(&self) -> &Subspace {
        &self.inner.node_subspace
    }

    /// Subspace content prefixes are allocated under.
    pub fn content_subspace(&self) -> &Subspace {
        &self.inner.content_subspace
    }

    pub fn allows_manual_prefixes(&self) -> bool {
        self.inner.allow_manual_prefixes
    }

    /// The prefix allocator of this layer.
    pub fn allocator(&self) -> &HighContentionAllocator {
        &self.inner.allocator
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Open the directory at `path`, creating it and any missing parents.
    ///
    /// A non-empty `layer` must match the layer stored with an existing
    /// directory and is recorded for a new one.
    pub async fn create_or_open<S: Transactor>(
        &self,
        scope: &S,
        path: &[&str],
        layer: Option<&[u8]>,
    ) -> Result<Directory, DirectoryError> {
        let path = validate_path(path)?;
        self.create_or_open_at(scope, path, layer.unwrap_or_default().to_vec(), None, true, true)
            .await
    }

    /// Open an existing directory.
    pub async fn open<S: Transactor>(
        &self,
        scope: &S,
        path: &[&str],
        layer: Option<&[u8]>,
    ) -> Result<Directory, DirectoryError> {
        let path = validate_path(path)?;
        self.create_or_open_at(scope, path, layer.unwrap_or_default().to_vec(), None, false, true)
            .await
    }

    /// Create a directory that must not exist yet.
    ///
    /// `prefix` chooses the content prefix instead of allocating one and
    /// requires a layer created with manual prefixes allowed.
    pub async fn create<S: Transactor>(
        &self,
        scope: &S,
        path: &[&str],
        layer: Option<&[u8]>,
        prefix: Option<&[u8]>,
    ) -> Result<Directory, DirectoryError> {
        let path = validate_path(path)?;
        self.create_or_open_at(
            scope,
            path,
            layer.unwrap_or_default().to_vec(),
            prefix.map(<[u8]>::to_vec),
            true,
            false,
        )
        .await
    }

    /// Move the directory at `old_path` to `new_path`.
    ///
    /// Only metadata changes; the directory keeps its content prefix. The
    /// parent of `new_path` must exist.
    pub async fn move_directory<S: Transactor>(
        &self,
        scope: &S,
        old_path: &[&str],
        new_path: &[&str],
    ) -> Result<Directory, DirectoryError> {
        let old_path = validate_path(old_path)?;
        let new_path = validate_path(new_path)?;
        self.move_at(scope, old_path, new_path).await
    }

    /// Remove a directory, its descendants and all of their contents.
    pub async fn remove<S: Transactor>(&self, scope: &S, path: &[&str]) -> Result<(), DirectoryError> {
        let path = validate_path(path)?;
        self.remove_at(scope, path, true).await.map(|_| ())
    }

    /// Remove a directory if it exists. Returns whether it existed.
    pub async fn remove_if_exists<S: Transactor>(&self, scope: &S, path: &[&str]) -> Result<bool, DirectoryError> {
        let path = validate_path(path)?;
        self.remove_at(scope, path, false).await
    }

    /// Whether a directory exists at `path`. The root always exists.
    pub async fn exists<S: Transactor>(&self, scope: &S, path: &[&str]) -> Result<bool, DirectoryError> {
        let path = validate_path(path)?;
        self.exists_at(scope, path).await
    }

    /// Names of the immediate subdirectories of `path`, in key order.
    pub async fn list_all<S: Transactor>(&self, scope: &S, path: &[&str]) -> Result<Vec<String>, DirectoryError> {
        let path = validate_path(path)?;
        self.list_all_at(scope, path).await
    }

    /// Stream the names of the immediate subdirectories of `path`.
    ///
    /// Names are read page by page as the stream is polled, all within `tr`.
    pub fn list<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        path: &[&str],
    ) -> BoxStream<'static, Result<String, DirectoryError>> {
        match validate_path(path) {
            Ok(path) => self.list_at(tr.clone(), path),
            Err(err) => stream::once(async move { Err(err) }).boxed(),
        }
    }

    // ========================================================================
    // Owned-path entry points, shared with directory handles
    // ========================================================================

    pub(crate) async fn create_or_open_at<S: Transactor>(
        &self,
        scope: &S,
        path: Vec<String>,
        layer: Vec<u8>,
        prefix: Option<Vec<u8>>,
        allow_create: bool,
        allow_open: bool,
    ) -> Result<Directory, DirectoryError> {
        check_depth(&path)?;
        scope
            .transact(|tr| {
                let this = self.clone();
                let path = path.clone();
                let layer = layer.clone();
                let prefix = prefix.clone();
                async move {
                    this.create_or_open_in(&tr, &path, &layer, prefix.as_deref(), allow_create, allow_open)
                        .await
                }
            })
            .await
    }

    pub(crate) async fn move_at<S: Transactor>(
        &self,
        scope: &S,
        old_path: Vec<String>,
        new_path: Vec<String>,
    ) -> Result<Directory, DirectoryError> {
        check_depth(&old_path)?;
        check_depth(&new_path)?;
        scope
            .transact(|tr| {
                let this = self.clone();
                let old_path = old_path.clone();
                let new_path = new_path.clone();
                async move { this.move_in(&tr, &old_path, &new_path).await }
            })
            .await
    }

    pub(crate) async fn remove_at<S: Transactor>(
        &self,
        scope: &S,
        path: Vec<String>,
        fail_on_missing: bool,
    ) -> Result<bool, DirectoryError> {
        check_depth(&path)?;
        scope
            .transact(|tr| {
                let this = self.clone();
                let path = path.clone();
                async move { this.remove_in(&tr, &path, fail_on_missing).await }
            })
            .await
    }

    pub(crate) async fn exists_at<S: Transactor>(&self, scope: &S, path: Vec<String>) -> Result<bool, DirectoryError> {
        check_depth(&path)?;
        scope
            .transact(|tr| {
                let this = self.clone();
                let path = path.clone();
                async move { this.exists_in(&tr, &path).await }
            })
            .await
    }

    pub(crate) async fn list_all_at<S: Transactor>(
        &self,
        scope: &S,
        path: Vec<String>,
    ) -> Result<Vec<String>, DirectoryError> {
        check_depth(&path)?;
        scope
            .transact(|tr| {
                let names = self.list_at(tr, path.clone());
                async move { names.try_collect::<Vec<_>>().await }
            })
            .await
    }

    pub(crate) fn list_at<T: Transaction>(
        &self,
        tr: TransactionContext<T>,
        path: Vec<String>,
    ) -> BoxStream<'static, Result<String, DirectoryError>> {
        let this = self.clone();
        stream::try_unfold(None, move |page| {
            let this = this.clone();
            let tr = tr.clone();
            let path = path.clone();
            async move { this.next_listed(&tr, &path, page).await }
        })
        .boxed()
    }

    // ========================================================================
    // Transaction bodies
    // ========================================================================

    fn create_or_open_in<'a, T: Transaction>(
        &'a self,
        tr: &'a TransactionContext<T>,
        path: &'a [String],
        layer: &'a [u8],
        prefix: Option<&'a [u8]>,
        allow_create: bool,
        allow_open: bool,
    ) -> BoxFuture<'a, Result<Directory, DirectoryError>> {
        async move {
            if prefix.is_some() && !self.inner.allow_manual_prefixes {
                return ManualPrefixNotAllowedSnafu {
                    path: self.full_path(path),
                }
                .fail();
            }
            if path.is_empty() {
                return RootOperationSnafu { operation: "open" }.fail();
            }

            self.check_version(tr, false).await?;
            let node = self.find_with_meta(tr, path).await?;

            if let Some(node_prefix) = node.prefix.as_deref() {
                if node.is_in_partition(false) {
                    let partition = self.partition_layer(node_prefix, &node.path);
                    let subpath = node.partition_subpath();
                    return partition
                        .create_or_open_in(tr, &subpath, layer, prefix, allow_create, allow_open)
                        .await;
                }

                if !allow_open {
                    return AlreadyExistsSnafu {
                        path: self.full_path(path),
                    }
                    .fail();
                }

                let stored = node.layer();
                if !layer.is_empty() && layer != stored {
                    if node.is_partition() {
                        return PartitionLayerSnafu {
                            path: self.full_path(path),
                        }
                        .fail();
                    }
                    return LayerMismatchSnafu {
                        path: self.full_path(path),
                        expected: layer.to_vec(),
                        actual: stored.to_vec(),
                    }
                    .fail();
                }

                return Ok(self.contents_of_node(node_prefix, path, stored));
            }

            if !allow_create {
                return NotFoundSnafu {
                    path: self.full_path(path),
                }
                .fail();
            }

            self.check_version(tr, true).await?;

            let prefix = match prefix {
                Some(manual) => {
                    if !self.is_prefix_free(tr, manual, false).await? {
                        return PrefixInUseSnafu { prefix: manual.to_vec() }.fail();
                    }
                    manual.to_vec()
                }
                None => self.allocate_prefix(tr).await?,
            };

            let parent_prefix = if path.len() > 1 {
                let parent = self.create_or_open_in(tr, &path[..path.len() - 1], &[], None, true, true).await?;
                parent.prefix().to_vec()
            } else {
                self.root_prefix().to_vec()
            };

            let name = &path[path.len() - 1];
            tr.set(&subdir_key(&self.node_with_prefix(&parent_prefix), name), &prefix);
            tr.set(&layer_key(&self.node_with_prefix(&prefix)), layer);

            debug!(
                path = %display_path(&self.full_path(path)),
                prefix = %hex::encode(&prefix),
                "created directory"
            );
            Ok(self.contents_of_node(&prefix, path, layer))
        }
        .boxed()
    }

    fn move_in<'a, T: Transaction>(
        &'a self,
        tr: &'a TransactionContext<T>,
        old_path: &'a [String],
        new_path: &'a [String],
    ) -> BoxFuture<'a, Result<Directory, DirectoryError>> {
        async move {
            self.check_version(tr, true).await?;

            if old_path.is_empty() {
                return RootOperationSnafu { operation: "move" }.fail();
            }
            if path_starts_with(new_path, old_path) {
                return MoveCycleSnafu {
                    old_path: self.full_path(old_path),
                    new_path: self.full_path(new_path),
                }
                .fail();
            }

            let old_node = self.find_with_meta(tr, old_path).await?;
            let new_node = self.find_with_meta(tr, new_path).await?;

            let Some(old_prefix) = old_node.prefix.as_deref() else {
                return NotFoundSnafu {
                    path: self.full_path(old_path),
                }
                .fail();
            };

            if old_node.is_in_partition(false) || new_node.is_in_partition(false) {
                if !old_node.is_in_partition(false) || !new_node.is_in_partition(false) || old_node.path != new_node.path
                {
                    return CrossPartitionMoveSnafu {
                        old_path: self.full_path(old_path),
                        new_path: self.full_path(new_path),
                    }
                    .fail();
                }
                let partition = self.partition_layer(old_prefix, &old_node.path);
                let old_subpath = old_node.partition_subpath();
                let new_subpath = new_node.partition_subpath();
                return partition.move_in(tr, &old_subpath, &new_subpath).await;
            }

            if new_node.exists() {
                return AlreadyExistsSnafu {
                    path: self.full_path(new_path),
                }
                .fail();
            }

            let (new_name, new_parent_path) = match new_path.split_last() {
                Some(split) => split,
                None => return RootOperationSnafu { operation: "replace" }.fail(),
            };
            let parent = self.find(tr, new_parent_path).await?;
            let Some(parent_prefix) = parent.prefix.as_deref() else {
                return ParentNotFoundSnafu {
                    path: self.full_path(new_path),
                }
                .fail();
            };

            tr.set(&subdir_key(&self.node_with_prefix(parent_prefix), new_name), old_prefix);
            self.remove_from_parent(tr, old_path).await?;

            debug!(
                from = %display_path(&self.full_path(old_path)),
                to = %display_path(&self.full_path(new_path)),
                "moved directory"
            );
            Ok(self.contents_of_node(old_prefix, new_path, old_node.layer()))
        }
        .boxed()
    }

    fn remove_in<'a, T: Transaction>(
        &'a self,
        tr: &'a TransactionContext<T>,
        path: &'a [String],
        fail_on_missing: bool,
    ) -> BoxFuture<'a, Result<bool, DirectoryError>> {
        async move {
            self.check_version(tr, true).await?;

            if path.is_empty() {
                return RootOperationSnafu { operation: "remove" }.fail();
            }

            let node = self.find_with_meta(tr, path).await?;
            let Some(node_prefix) = node.prefix.as_deref() else {
                if fail_on_missing {
                    return NotFoundSnafu {
                        path: self.full_path(path),
                    }
                    .fail();
                }
                return Ok(false);
            };

            if node.is_in_partition(false) {
                let partition = self.partition_layer(node_prefix, &node.path);
                let subpath = node.partition_subpath();
                return partition.remove_in(tr, &subpath, fail_on_missing).await;
            }

            self.remove_recursive(tr, node_prefix.to_vec()).await?;
            self.remove_from_parent(tr, path).await?;

            info!(path = %display_path(&self.full_path(path)), "removed directory");
            Ok(true)
        }
        .boxed()
    }

    fn exists_in<'a, T: Transaction>(
        &'a self,
        tr: &'a TransactionContext<T>,
        path: &'a [String],
    ) -> BoxFuture<'a, Result<bool, DirectoryError>> {
        async move {
            self.check_version(tr, false).await?;

            let node = self.find_with_meta(tr, path).await?;
            let Some(node_prefix) = node.prefix.as_deref() else {
                return Ok(false);
            };

            if node.is_in_partition(false) {
                let partition = self.partition_layer(node_prefix, &node.path);
                let subpath = node.partition_subpath();
                return partition.exists_in(tr, &subpath).await;
            }
            Ok(true)
        }
        .boxed()
    }

    /// Locate the node whose children a listing of `path` enumerates.
    fn resolve_listing<'a, T: Transaction>(
        &'a self,
        tr: &'a TransactionContext<T>,
        path: &'a [String],
    ) -> BoxFuture<'a, Result<ListPage, DirectoryError>> {
        async move {
            self.check_version(tr, false).await?;

            let node = self.find_with_meta(tr, path).await?;
            let Some(node_prefix) = node.prefix.as_deref() else {
                return NotFoundSnafu {
                    path: self.full_path(path),
                }
                .fail();
            };

            if node.is_in_partition(true) {
                let partition = self.partition_layer(node_prefix, &node.path);
                let subpath = node.partition_subpath();
                return partition.resolve_listing(tr, &subpath).await;
            }

            Ok(ListPage::new(&self.node_with_prefix(node_prefix), self.full_path(path)))
        }
        .boxed()
    }

    async fn next_listed<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        path: &[String],
        page: Option<ListPage>,
    ) -> Result<Option<(String, Option<ListPage>)>, DirectoryError> {
        let mut page = match page {
            Some(page) => page,
            None => self.resolve_listing(tr, path).await?,
        };

        loop {
            if let Some(name) = page.pending.pop_front() {
                return Ok(Some((name, Some(page))));
            }
            if page.exhausted {
                return Ok(None);
            }
            page.fetch(tr).await?;
        }
    }

    // ========================================================================
    // Node tree
    // ========================================================================

    /// Walk from the root towards `path`, stopping at the first missing
    /// child or at a partition.
    async fn find<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        path: &[String],
    ) -> Result<Node, DirectoryError> {
        let mut node = Node {
            prefix: Some(self.root_prefix().to_vec()),
            path: Vec::new(),
            target_path: path.to_vec(),
            layer: None,
        };

        for (depth, name) in path.iter().enumerate() {
            let Some(parent_prefix) = node.prefix.as_deref() else {
                break;
            };
            let child = tr
                .get(&subdir_key(&self.node_with_prefix(parent_prefix), name), false)
                .await
                .context(StorageSnafu)?;

            node = Node {
                prefix: child,
                path: path[..=depth].to_vec(),
                target_path: path.to_vec(),
                layer: None,
            };

            let Some(child_prefix) = node.prefix.as_deref() else {
                break;
            };
            let layer = self.read_layer(tr, child_prefix).await?;
            let is_partition = layer == PARTITION_LAYER;
            node.layer = Some(layer);
            if is_partition {
                break;
            }
        }

        Ok(node)
    }

    /// [`find`](Self::find), with the layer of the reached node loaded.
    async fn find_with_meta<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        path: &[String],
    ) -> Result<Node, DirectoryError> {
        let mut node = self.find(tr, path).await?;
        if node.layer.is_none()
            && let Some(prefix) = node.prefix.as_deref()
        {
            node.layer = Some(self.read_layer(tr, prefix).await?);
        }
        Ok(node)
    }

    async fn read_layer<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        prefix: &[u8],
    ) -> Result<Vec<u8>, DirectoryError> {
        let layer = tr
            .get(&layer_key(&self.node_with_prefix(prefix)), false)
            .await
            .context(StorageSnafu)?;
        Ok(layer.unwrap_or_default())
    }

    /// Immediate children of the node at `prefix` as `(name, prefix)` pairs.
    async fn subdirectories<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        prefix: &[u8],
    ) -> Result<Vec<(String, Vec<u8>)>, DirectoryError> {
        let subdirs = subdirs_subspace(&self.node_with_prefix(prefix));
        let range = subdirs.range();
        let entries = tr
            .get_range(&range.begin, &range.end, RangeOptions::default(), false)
            .await
            .context(StorageSnafu)?;

        let mut children = Vec::with_capacity(entries.len());
        for kv in entries {
            let name = decode_subdir_name(&subdirs, &kv.key, self.path())?;
            children.push((name, kv.value));
        }
        Ok(children)
    }

    fn remove_recursive<'a, T: Transaction>(
        &'a self,
        tr: &'a TransactionContext<T>,
        prefix: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), DirectoryError>> {
        async move {
            for (_, child_prefix) in self.subdirectories(tr, &prefix).await? {
                self.remove_recursive(tr, child_prefix).await?;
            }

            let contents = KeyRange::starts_with(&prefix);
            tr.clear_range(&contents.begin, &contents.end);
            let node = self.node_with_prefix(&prefix).range();
            tr.clear_range(&node.begin, &node.end);
            Ok::<_, DirectoryError>(())
        }
        .boxed()
    }

    async fn remove_from_parent<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        path: &[String],
    ) -> Result<(), DirectoryError> {
        let Some((name, parent_path)) = path.split_last() else {
            return Ok(());
        };
        let parent = self.find(tr, parent_path).await?;
        if let Some(parent_prefix) = parent.prefix.as_deref() {
            tr.clear(&subdir_key(&self.node_with_prefix(parent_prefix), name));
        }
        Ok(())
    }

    // ========================================================================
    // Prefixes
    // ========================================================================

    /// Allocate a fresh content prefix and make sure nothing occupies it.
    async fn allocate_prefix<T: Transaction>(&self, tr: &TransactionContext<T>) -> Result<Vec<u8>, DirectoryError> {
        let suffix = self.inner.allocator.allocate(tr).await.context(AllocationFailedSnafu)?;
        let mut prefix = self.inner.content_subspace.prefix().to_vec();
        prefix.extend_from_slice(&suffix);

        let range = KeyRange::starts_with(&prefix);
        let existing = tr
            .get_range(&range.begin, &range.end, RangeOptions::limit(1), false)
            .await
            .context(StorageSnafu)?;
        if !existing.is_empty() {
            return AllocatorPrefixNotEmptySnafu { prefix }.fail();
        }

        if !self.is_prefix_free(tr, &prefix, true).await? {
            return AllocatorPrefixInUseSnafu { prefix }.fail();
        }

        Ok(prefix)
    }

    /// A prefix is free when it is non-empty, lies inside no directory's
    /// prefix, and no directory's prefix lies inside it.
    async fn is_prefix_free<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        prefix: &[u8],
        snapshot: bool,
    ) -> Result<bool, DirectoryError> {
        if prefix.is_empty() {
            return Ok(false);
        }
        if self.node_containing_key(tr, prefix, snapshot).await?.is_some() {
            return Ok(false);
        }

        let begin = self.inner.node_subspace.pack(&Tuple::new().push(prefix));
        let end = match strinc(prefix) {
            Ok(next) => self.inner.node_subspace.pack(&Tuple::new().push(next)),
            Err(_) => self.inner.node_subspace.range().end,
        };
        let overlapping = tr
            .get_range(&begin, &end, RangeOptions::limit(1), snapshot)
            .await
            .context(StorageSnafu)?;
        Ok(overlapping.is_empty())
    }

    /// Prefix of the node whose content (or metadata) contains `key`.
    async fn node_containing_key<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        key: &[u8],
        snapshot: bool,
    ) -> Result<Option<Vec<u8>>, DirectoryError> {
        let node_subspace = &self.inner.node_subspace;
        if key.starts_with(node_subspace.prefix()) {
            return Ok(Some(self.root_prefix().to_vec()));
        }

        let begin = node_subspace.pack(&Tuple::new().push(()));
        let end = node_subspace.pack(&Tuple::new().push(key).push(()));
        let preceding = tr
            .get_range(&begin, &end, RangeOptions::limit(1).reversed(), snapshot)
            .await
            .context(StorageSnafu)?;

        let Some(kv) = preceding.first() else {
            return Ok(None);
        };
        let tuple = node_subspace.unpack(&kv.key).context(SubspaceSnafu)?;
        match tuple.get(0).and_then(Element::as_bytes) {
            Some(candidate) if key.starts_with(candidate) => Ok(Some(candidate.to_vec())),
            _ => Ok(None),
        }
    }

    // ========================================================================
    // Version gate
    // ========================================================================

    async fn check_version<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        write_access: bool,
    ) -> Result<(), DirectoryError> {
        let key = self.inner.root_node.pack(&Tuple::new().push(VERSION_KEY));
        let stored = match tr.get(&key, false).await.context(StorageSnafu)? {
            Some(raw) => Some(VersionEncoding.unpack(&raw).context(SubspaceSnafu)?),
            None => None,
        };

        match check_version(stored, EXPECTED_VERSION, write_access) {
            VersionCheck::Compatible => Ok(()),
            VersionCheck::Missing => {
                if write_access {
                    let encoded = VersionEncoding.pack(&EXPECTED_VERSION).context(SubspaceSnafu)?;
                    tr.set(&key, &encoded);
                    debug!(version = %EXPECTED_VERSION, "initialized directory layout version");
                }
                Ok(())
            }
            VersionCheck::Incompatible => IncompatibleVersionSnafu {
                stored: stored.unwrap_or(EXPECTED_VERSION),
                expected: EXPECTED_VERSION,
            }
            .fail(),
            VersionCheck::ReadOnly => ReadOnlyVersionSnafu {
                stored: stored.unwrap_or(EXPECTED_VERSION),
                expected: EXPECTED_VERSION,
            }
            .fail(),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn root_prefix(&self) -> &[u8] {
        self.inner.node_subspace.prefix()
    }

    fn node_with_prefix(&self, prefix: &[u8]) -> Subspace {
        self.inner.node_subspace.subspace(&Tuple::new().push(prefix))
    }

    fn full_path(&self, path: &[String]) -> Vec<String> {
        let mut full = self.inner.path.clone();
        full.extend_from_slice(path);
        full
    }

    fn partition_layer(&self, prefix: &[u8], node_path: &[String]) -> DirectoryLayer {
        DirectoryLayer::for_partition(prefix, self.full_path(node_path))
    }

    fn contents_of_node(&self, prefix: &[u8], path: &[String], layer: &[u8]) -> Directory {
        let full_path = self.full_path(path);
        if layer == PARTITION_LAYER {
            let partition = DirectoryLayer::for_partition(prefix, full_path.clone());
            Directory::partition(full_path, partition, self.clone())
        } else {
            Directory::new(full_path, Subspace::from_bytes(prefix.to_vec()), layer.to_vec(), self.clone())
        }
    }
}

fn subdirs_subspace(node: &Subspace) -> Subspace {
    node.subspace(&Tuple::new().push(SUBDIRS_KEY))
}

fn subdir_key(node: &Subspace, name: &str) -> Vec<u8> {
    node.pack(&Tuple::new().push(SUBDIRS_KEY).push(name))
}

fn layer_key(node: &Subspace) -> Vec<u8> {
    node.pack(&Tuple::new().push(LAYER_KEY))
}

fn decode_subdir_name(subdirs: &Subspace, key: &[u8], path: &[String]) -> Result<String, DirectoryError> {
    let tuple = subdirs.unpack(key).context(SubspaceSnafu)?;
    match tuple.get(0).and_then(Element::as_str) {
        Some(name) => Ok(name.to_string()),
        None => CorruptedMetadataSnafu {
            path: path.to_vec(),
            reason: format!("child entry {} has no name", hex::encode(key)),
        }
        .fail(),
    }
}

/// Cursor over the child entries of one node.
struct ListPage {
    subdirs: Subspace,
    path: Vec<String>,
    begin: Vec<u8>,
    end: Vec<u8>,
    pending: VecDeque<String>,
    exhausted: bool,
}

impl ListPage {
    fn new(node: &Subspace, path: Vec<String>) -> Self {
        let subdirs = subdirs_subspace(node);
        let range = subdirs.range();
        Self {
            subdirs,
            path,
            begin: range.begin,
            end: range.end,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    async fn fetch<T: Transaction>(&mut self, tr: &TransactionContext<T>) -> Result<(), DirectoryError> {
        let entries = tr
            .get_range(&self.begin, &self.end, RangeOptions::limit(LIST_PAGE_SIZE), false)
            .await
            .context(StorageSnafu)?;

        self.exhausted = entries.len() < LIST_PAGE_SIZE;
        if let Some(last) = entries.last() {
            let mut next = last.key.clone();
            next.push(0x00);
            self.begin = next;
        }
        for kv in &entries {
            self.pending.push_back(decode_subdir_name(&self.subdirs, &kv.key, &self.path)?);
        }
        Ok(())
    }
}
