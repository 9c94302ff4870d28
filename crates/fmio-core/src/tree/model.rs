//! The node tree bundled with its gatherer, as a view binds to it.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::settings::GeneralConfig;
use crate::error::{CoreError, CoreResult};
use crate::event::TreeEvent;
use crate::fs::entry::NodeInfo;
use crate::tree::gatherer::Gatherer;
use crate::tree::node::{NodeId, NodeTree};
use crate::tree::sort::SortSpec;

/// One browsable filesystem model: a [`NodeTree`] plus the [`Gatherer`]
/// that fills it.
///
/// Each window or tab owns its own model; two models never share a worker.
pub struct FsModel {
    tree: Arc<Mutex<NodeTree>>,
    gatherer: Gatherer,
}

impl FsModel {
    pub fn new(events: Sender<TreeEvent>, sort: SortSpec, show_hidden: bool) -> CoreResult<Self> {
        let tree = Arc::new(Mutex::new(NodeTree::new(events.clone(), sort, show_hidden)));
        let gatherer = Gatherer::new(Arc::clone(&tree), events)?;
        Ok(Self { tree, gatherer })
    }

    /// Builds a model using the browsing preferences from the config file.
    pub fn from_config(events: Sender<TreeEvent>, general: &GeneralConfig) -> CoreResult<Self> {
        let sort = SortSpec {
            field: general.sort_field(),
            direction: general.sort_direction(),
            dirs_first: general.sort_dir_first,
        };
        Self::new(events, sort, general.show_hidden)
    }

    /// Locks the tree for reading or direct edits. Keep the guard short-lived;
    /// the gatherer needs the same lock to publish results.
    pub fn tree(&self) -> MutexGuard<'_, NodeTree> {
        self.tree.lock()
    }

    /// Points the model at `path` and queues its listing.
    ///
    /// Costs one `stat` on the calling thread; the listing itself happens
    /// on the gatherer.
    pub fn set_root(&self, path: &Path) -> CoreResult<NodeId> {
        let info = NodeInfo::stat(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => CoreError::PermissionDenied(path.to_path_buf()),
            _ => CoreError::Io(e),
        })?;
        if !info.is_dir() {
            return Err(CoreError::NotADirectory(path.to_path_buf()));
        }
        let root = self.tree.lock().set_root(info);
        self.gatherer.populate_node(root);
        Ok(root)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.tree.lock().root()
    }

    /// Looks up an already materialised path without touching the disk.
    pub fn from_path(&self, path: &Path) -> Option<NodeId> {
        self.tree.lock().from_path(path)
    }

    pub fn generate_node(&self, path: PathBuf) {
        self.gatherer.generate_node(path);
    }

    /// Lists `node` for the first time.
    pub fn populate(&self, node: NodeId) {
        self.gatherer.populate_node(node);
    }

    /// Requests a fresh listing; children are replaced once it arrives.
    pub fn re_populate(&self, node: NodeId) {
        self.gatherer.populate_node(node);
    }

    /// Re-stats `node`'s own metadata.
    pub fn refresh(&self, node: NodeId) {
        self.gatherer.refresh_node(node);
    }

    /// Creates an empty, unindexed node to receive search results.
    pub fn new_result_node(&self, start: &Path) -> CoreResult<NodeId> {
        let info = NodeInfo::stat(start)?;
        Ok(self.tree.lock().insert_detached(info))
    }

    pub fn search(&self, name: &str, start: PathBuf, result: NodeId) {
        self.gatherer.search(name, start, result);
    }

    pub fn cancel_search(&self) {
        self.gatherer.cancel_search();
    }

    pub fn set_sort(&self, spec: SortSpec) {
        self.tree.lock().set_sort(spec);
    }

    pub fn set_show_hidden(&self, show: bool) {
        self.tree.lock().set_show_hidden(show);
    }

    /// Reacts to a "directory changed" notification for `path`.
    ///
    /// Each notification is handled on its own; a burst of changes may
    /// trigger redundant listings.
    pub fn directory_changed(&self, path: &Path) {
        let (node, parent) = {
            let tree = self.tree.lock();
            let node = tree.from_path(path);
            let parent = path.parent().and_then(|p| tree.from_path(p));
            (node, parent)
        };
        match node {
            Some(node) => {
                self.gatherer.refresh_node(node);
                let is_populated_dir = self
                    .tree
                    .lock()
                    .get(node)
                    .is_some_and(|n| n.info().is_dir() && n.is_populated());
                if is_populated_dir {
                    self.gatherer.populate_node(node);
                }
            }
            None => {
                if let Some(parent) = parent {
                    self.gatherer.populate_node(parent);
                }
            }
        }
    }
}
