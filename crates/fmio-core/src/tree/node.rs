//! In-memory cache of the visited part of the filesystem.
//!
//! Nodes live in an arena owned by [`NodeTree`] and refer to each other by
//! [`NodeId`]. Children are owned by their parent through the arena; the
//! parent link is a plain id, so dropping a subtree never has to chase
//! reference cycles.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use crate::event::TreeEvent;
use crate::fs::entry::NodeInfo;
use crate::tree::sort::{compare, SortSpec};

/// Stable handle to a node for as long as the node stays in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// One filesystem entry in the tree.
#[derive(Debug, Clone)]
pub struct FsNode {
    info: NodeInfo,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    populated: bool,
    indexed: bool,
}

impl FsNode {
    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        self.info.path()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// All children, hidden ones included, in sorted order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether at least one listing has completed for this node.
    pub fn is_populated(&self) -> bool {
        self.populated
    }
}

/// Arena of [`FsNode`]s addressable by id and by path.
///
/// Structural changes are reported as [`TreeEvent`]s on the channel given
/// to [`NodeTree::new`].
pub struct NodeTree {
    nodes: HashMap<NodeId, FsNode>,
    by_path: HashMap<PathBuf, NodeId>,
    root: Option<NodeId>,
    next_id: u64,
    sort: SortSpec,
    show_hidden: bool,
    events: Sender<TreeEvent>,
}

impl NodeTree {
    pub fn new(events: Sender<TreeEvent>, sort: SortSpec, show_hidden: bool) -> Self {
        Self {
            nodes: HashMap::new(),
            by_path: HashMap::new(),
            root: None,
            next_id: 0,
            sort,
            show_hidden,
            events,
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn sort_spec(&self) -> SortSpec {
        self.sort
    }

    pub fn get(&self, id: NodeId) -> Option<&FsNode> {
        self.nodes.get(&id)
    }

    pub fn info(&self, id: NodeId) -> Option<&NodeInfo> {
        self.nodes.get(&id).map(FsNode::info)
    }

    /// Resolves an already-materialised path. Never touches the disk.
    pub fn from_path(&self, path: &Path) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    /// Makes `info` the root, dropping every node outside its subtree.
    ///
    /// If the path is already in the tree its subtree (and populated state)
    /// is kept; otherwise the whole tree is replaced by a fresh root.
    pub fn set_root(&mut self, info: NodeInfo) -> NodeId {
        let id = match self.from_path(info.path()) {
            Some(id) => {
                let keep: HashSet<NodeId> = self.subtree(id).into_iter().collect();
                let doomed: Vec<NodeId> = self
                    .nodes
                    .keys()
                    .filter(|k| !keep.contains(k))
                    .copied()
                    .collect();
                for d in doomed {
                    self.forget(d);
                }
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.parent = None;
                    node.info = info;
                }
                id
            }
            None => {
                self.nodes.clear();
                self.by_path.clear();
                self.alloc(info, None, true)
            }
        };
        self.root = Some(id);
        let _ = self.events.send(TreeEvent::LayoutChanged { parent: None });
        id
    }

    /// Inserts a chain of entries ordered from the outermost ancestor down
    /// to the target, reusing nodes that already exist. Returns the id of
    /// the last entry.
    pub fn insert_chain(&mut self, chain: Vec<NodeInfo>) -> Option<NodeId> {
        let mut parent: Option<NodeId> = None;
        let mut last = None;
        for info in chain {
            let id = match self.from_path(info.path()) {
                Some(existing) => existing,
                None => {
                    let id = self.alloc(info, parent, true);
                    if let Some(p) = parent {
                        self.attach_sorted(p, id);
                        let _ = self.events.send(TreeEvent::LayoutChanged { parent: Some(p) });
                    }
                    id
                }
            };
            parent = Some(id);
            last = Some(id);
        }
        last
    }

    /// Creates a node that is not reachable by path lookup, e.g. to hold
    /// search results.
    pub fn insert_detached(&mut self, info: NodeInfo) -> NodeId {
        let id = self.alloc(info, None, false);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.populated = true;
        }
        id
    }

    /// Replaces the children of `id` with a fresh listing.
    ///
    /// Children whose path is still listed keep their id and subtree; the
    /// rest are dropped together with their descendants.
    pub fn replace_children(&mut self, id: NodeId, listing: Vec<NodeInfo>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let old: HashMap<PathBuf, NodeId> = node
            .children
            .iter()
            .filter_map(|c| self.nodes.get(c).map(|n| (n.path().to_path_buf(), *c)))
            .collect();

        let mut seen = HashSet::new();
        let mut children = Vec::with_capacity(listing.len());
        for info in listing {
            if !seen.insert(info.path().to_path_buf()) {
                continue;
            }
            match old.get(info.path()) {
                Some(&existing) => {
                    if let Some(child) = self.nodes.get_mut(&existing) {
                        child.info = info;
                    }
                    children.push(existing);
                }
                None => children.push(self.alloc(info, Some(id), true)),
            }
        }

        for (path, old_id) in old {
            if !seen.contains(&path) {
                self.drop_subtree(old_id);
                let _ = self.events.send(TreeEvent::NodeRemoved { path });
            }
        }

        self.sort_ids(&mut children);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = children;
            node.populated = true;
        }
        let _ = self.events.send(TreeEvent::LayoutChanged { parent: Some(id) });
    }

    /// Adds entries to `id` without removing existing children. Paths
    /// already present are ignored. Returns how many were added.
    pub fn append_children(&mut self, id: NodeId, entries: Vec<NodeInfo>) -> usize {
        let Some(node) = self.nodes.get(&id) else {
            return 0;
        };
        let mut present: HashSet<PathBuf> = node
            .children
            .iter()
            .filter_map(|c| self.nodes.get(c).map(|n| n.path().to_path_buf()))
            .collect();
        let indexed = node.indexed;

        let mut added = 0;
        for info in entries {
            if !present.insert(info.path().to_path_buf()) {
                continue;
            }
            let child = self.alloc(info, Some(id), indexed);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.children.push(child);
            }
            added += 1;
        }
        if added > 0 {
            let _ = self.events.send(TreeEvent::LayoutChanged { parent: Some(id) });
        }
        added
    }

    /// Stores fresh metadata for `id`.
    pub fn update_info(&mut self, id: NodeId, info: NodeInfo) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.info = info;
            let _ = self.events.send(TreeEvent::DataChanged { node: id });
        }
    }

    /// Removes `id` and its descendants, detaching it from its parent.
    pub fn remove(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let path = node.path().to_path_buf();
        let parent = node.parent;
        if let Some(p) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            p.children.retain(|c| *c != id);
        }
        self.drop_subtree(id);
        if self.root == Some(id) {
            self.root = None;
        }
        let _ = self.events.send(TreeEvent::NodeRemoved { path });
        let _ = self.events.send(TreeEvent::LayoutChanged { parent });
    }

    /// Changes the ordering and re-sorts every node.
    pub fn set_sort(&mut self, spec: SortSpec) {
        self.sort = spec;
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            let Some(mut children) = self.nodes.get_mut(&id).map(|n| std::mem::take(&mut n.children))
            else {
                continue;
            };
            self.sort_ids(&mut children);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.children = children;
            }
        }
        let _ = self.events.send(TreeEvent::LayoutChanged { parent: None });
    }

    pub fn set_show_hidden(&mut self, show: bool) {
        if self.show_hidden != show {
            self.show_hidden = show;
            let _ = self.events.send(TreeEvent::LayoutChanged { parent: None });
        }
    }

    /// Children of `id` as presented to a view (hidden entries filtered).
    pub fn visible_children(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        node.children
            .iter()
            .copied()
            .filter(|c| {
                self.show_hidden || self.nodes.get(c).is_some_and(|n| !n.info.is_hidden())
            })
            .collect()
    }

    /// Row of `id` among its parent's visible children.
    pub fn row_of(&self, id: NodeId) -> Option<usize> {
        let parent = self.nodes.get(&id)?.parent?;
        self.visible_children(parent).iter().position(|c| *c == id)
    }

    pub fn child_at(&self, parent: NodeId, row: usize) -> Option<NodeId> {
        self.visible_children(parent).get(row).copied()
    }

    fn alloc(&mut self, info: NodeInfo, parent: Option<NodeId>, indexed: bool) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        if indexed {
            self.by_path.insert(info.path().to_path_buf(), id);
        }
        self.nodes.insert(
            id,
            FsNode {
                info,
                parent,
                children: Vec::new(),
                populated: false,
                indexed,
            },
        );
        id
    }

    fn attach_sorted(&mut self, parent: NodeId, child: NodeId) {
        let Some(mut children) = self
            .nodes
            .get_mut(&parent)
            .map(|n| std::mem::take(&mut n.children))
        else {
            return;
        };
        if !children.contains(&child) {
            children.push(child);
        }
        self.sort_ids(&mut children);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children = children;
        }
    }

    fn sort_ids(&self, ids: &mut [NodeId]) {
        let spec = self.sort;
        ids.sort_by(|a, b| match (self.nodes.get(a), self.nodes.get(b)) {
            (Some(x), Some(y)) => compare(&x.info, &y.info, spec),
            _ => a.cmp(b),
        });
    }

    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                out.push(current);
                stack.extend(node.children.iter().copied());
            }
        }
        out
    }

    fn drop_subtree(&mut self, id: NodeId) {
        for d in self.subtree(id) {
            self.forget(d);
        }
    }

    fn forget(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(&id) {
            if node.indexed && self.by_path.get(node.path()) == Some(&id) {
                self.by_path.remove(node.path());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn stat(path: &Path) -> NodeInfo {
        NodeInfo::stat(path).unwrap()
    }

    fn tree() -> (NodeTree, mpsc::Receiver<TreeEvent>) {
        let (tx, rx) = mpsc::channel();
        (NodeTree::new(tx, SortSpec::default(), false), rx)
    }

    fn listing(dir: &Path) -> Vec<NodeInfo> {
        crate::fs::ops::read_directory(dir).unwrap()
    }

    #[test]
    fn replace_children_sorts_and_indexes() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "").unwrap();
        fs::write(tmp.path().join("a.txt"), "").unwrap();
        fs::create_dir(tmp.path().join("z")).unwrap();
        let (mut t, _rx) = tree();
        let root = t.set_root(stat(tmp.path()));

        t.replace_children(root, listing(tmp.path()));

        let names: Vec<_> = t
            .visible_children(root)
            .iter()
            .map(|c| t.info(*c).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["z", "a.txt", "b.txt"]);
        assert!(t.get(root).unwrap().is_populated());
        let a = t.from_path(&tmp.path().join("a.txt")).unwrap();
        assert_eq!(t.row_of(a), Some(1));
        assert_eq!(t.child_at(root, 1), Some(a));
    }

    #[test]
    fn replace_children_keeps_surviving_ids_and_drops_vanished() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("keep")).unwrap();
        fs::write(tmp.path().join("keep/inner"), "").unwrap();
        fs::write(tmp.path().join("gone.txt"), "").unwrap();
        let (mut t, rx) = tree();
        let root = t.set_root(stat(tmp.path()));
        t.replace_children(root, listing(tmp.path()));
        let keep = t.from_path(&tmp.path().join("keep")).unwrap();
        t.replace_children(keep, listing(&tmp.path().join("keep")));
        while rx.try_recv().is_ok() {}

        fs::remove_file(tmp.path().join("gone.txt")).unwrap();
        t.replace_children(root, listing(tmp.path()));

        assert_eq!(t.from_path(&tmp.path().join("keep")), Some(keep));
        assert!(t.from_path(&tmp.path().join("keep/inner")).is_some());
        assert!(t.from_path(&tmp.path().join("gone.txt")).is_none());
        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            TreeEvent::NodeRemoved { path } if path.ends_with("gone.txt")
        )));
    }

    #[test]
    fn duplicate_paths_in_listing_are_collapsed() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a"), "").unwrap();
        let (mut t, _rx) = tree();
        let root = t.set_root(stat(tmp.path()));
        let info = stat(&tmp.path().join("a"));

        t.replace_children(root, vec![info.clone(), info]);

        assert_eq!(t.get(root).unwrap().children().len(), 1);
    }

    #[test]
    fn hidden_children_filtered_until_enabled() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".dot"), "").unwrap();
        fs::write(tmp.path().join("plain"), "").unwrap();
        let (mut t, _rx) = tree();
        let root = t.set_root(stat(tmp.path()));
        t.replace_children(root, listing(tmp.path()));

        assert_eq!(t.visible_children(root).len(), 1);
        t.set_show_hidden(true);
        assert_eq!(t.visible_children(root).len(), 2);
    }

    #[test]
    fn set_root_outside_tree_replaces_everything() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::write(a.path().join("x"), "").unwrap();
        let (mut t, _rx) = tree();
        let root = t.set_root(stat(a.path()));
        t.replace_children(root, listing(a.path()));

        let new_root = t.set_root(stat(b.path()));

        assert_eq!(t.len(), 1);
        assert_eq!(t.root(), Some(new_root));
        assert!(t.from_path(&a.path().join("x")).is_none());
    }

    #[test]
    fn set_root_to_descendant_keeps_its_subtree() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/f"), "").unwrap();
        fs::write(tmp.path().join("other"), "").unwrap();
        let (mut t, _rx) = tree();
        let root = t.set_root(stat(tmp.path()));
        t.replace_children(root, listing(tmp.path()));
        let sub = t.from_path(&tmp.path().join("sub")).unwrap();
        t.replace_children(sub, listing(&tmp.path().join("sub")));

        let new_root = t.set_root(stat(&tmp.path().join("sub")));

        assert_eq!(new_root, sub);
        assert_eq!(t.len(), 2);
        assert!(t.from_path(tmp.path()).is_none());
        assert!(t.get(sub).unwrap().parent().is_none());
    }

    #[test]
    fn insert_chain_reuses_existing_ancestors() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        let (mut t, _rx) = tree();
        let root = t.set_root(stat(tmp.path()));

        let leaf = t
            .insert_chain(vec![
                stat(tmp.path()),
                stat(&tmp.path().join("a")),
                stat(&tmp.path().join("a/b")),
            ])
            .unwrap();

        let a = t.from_path(&tmp.path().join("a")).unwrap();
        assert_eq!(t.get(a).unwrap().parent(), Some(root));
        assert_eq!(t.get(leaf).unwrap().parent(), Some(a));
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn remove_drops_descendants() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("d")).unwrap();
        fs::write(tmp.path().join("d/f"), "").unwrap();
        let (mut t, _rx) = tree();
        let root = t.set_root(stat(tmp.path()));
        t.replace_children(root, listing(tmp.path()));
        let d = t.from_path(&tmp.path().join("d")).unwrap();
        t.replace_children(d, listing(&tmp.path().join("d")));

        t.remove(d);

        assert_eq!(t.len(), 1);
        assert!(t.get(root).unwrap().children().is_empty());
        assert!(t.from_path(&tmp.path().join("d/f")).is_none());
    }

    #[test]
    fn detached_nodes_are_not_path_addressable() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("hit.txt"), "").unwrap();
        let (mut t, _rx) = tree();
        t.set_root(stat(tmp.path()));
        let results = t.insert_detached(stat(tmp.path()));

        let added = t.append_children(results, vec![stat(&tmp.path().join("hit.txt"))]);
        let again = t.append_children(results, vec![stat(&tmp.path().join("hit.txt"))]);

        assert_eq!(added, 1);
        assert_eq!(again, 0);
        assert!(t.from_path(&tmp.path().join("hit.txt")).is_none());
        assert_eq!(t.from_path(tmp.path()), t.root());
    }
}
