//! Background directory enumeration for a [`NodeTree`].
//!
//! A single worker thread per model drains a FIFO of requests. The caller
//! only pushes onto the queue; results land in the tree under a short lock
//! and are announced as [`TreeEvent`]s.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::event::TreeEvent;
use crate::fs::entry::NodeInfo;
use crate::fs::ops::read_directory;
use crate::tree::node::{NodeId, NodeTree};

#[derive(Debug)]
enum GatherRequest {
    Generate(PathBuf),
    Populate(NodeId),
    Refresh(NodeId),
    Search {
        needle: String,
        start: PathBuf,
        result: NodeId,
        generation: u64,
    },
}

#[derive(Default)]
struct GatherQueue {
    pending: VecDeque<GatherRequest>,
    shutdown: bool,
}

struct Shared {
    tree: Arc<Mutex<NodeTree>>,
    queue: Mutex<GatherQueue>,
    wake: Condvar,
    search_generation: AtomicU64,
    events: Sender<TreeEvent>,
}

/// Owns the worker thread that lists directories for one tree.
pub struct Gatherer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Gatherer {
    /// Spawns the worker. It parks until the first request arrives.
    pub fn new(tree: Arc<Mutex<NodeTree>>, events: Sender<TreeEvent>) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            tree,
            queue: Mutex::new(GatherQueue::default()),
            wake: Condvar::new(),
            search_generation: AtomicU64::new(0),
            events,
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("fmio-gatherer".to_string())
            .spawn(move || run(&worker_shared))?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Materialises `path` (and any missing ancestors below the nearest
    /// known node). Answered by [`TreeEvent::NodeGenerated`].
    pub fn generate_node(&self, path: PathBuf) {
        self.push(GatherRequest::Generate(path));
    }

    /// Lists `node` and replaces its children. Answered by
    /// [`TreeEvent::FinishedWorking`].
    pub fn populate_node(&self, node: NodeId) {
        self.push(GatherRequest::Populate(node));
    }

    /// Re-stats `node`; a vanished node makes its parent re-populate.
    pub fn refresh_node(&self, node: NodeId) {
        self.push(GatherRequest::Refresh(node));
    }

    /// Recursively collects entries under `start` whose name contains
    /// `name` (case-insensitive) into `result`. Starting a search cancels
    /// any search still running.
    pub fn search(&self, name: &str, start: PathBuf, result: NodeId) {
        let generation = self.shared.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.push(GatherRequest::Search {
            needle: crate::nfc_string(name).to_lowercase(),
            start,
            result,
            generation,
        });
    }

    /// Stops the running search at its next directory step.
    pub fn cancel_search(&self) {
        self.shared.search_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of requests not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().pending.len()
    }

    fn push(&self, request: GatherRequest) {
        let mut queue = self.shared.queue.lock();
        queue.pending.push_back(request);
        self.shared.wake.notify_one();
    }
}

impl Drop for Gatherer {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            queue.pending.clear();
        }
        self.cancel_search();
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run(shared: &Shared) {
    loop {
        let request = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.shutdown {
                    return;
                }
                if let Some(request) = queue.pending.pop_front() {
                    break request;
                }
                shared.wake.wait(&mut queue);
            }
        };

        match request {
            GatherRequest::Generate(path) => generate(shared, &path),
            GatherRequest::Populate(node) => populate(shared, node),
            GatherRequest::Refresh(node) => refresh(shared, node),
            GatherRequest::Search {
                needle,
                start,
                result,
                generation,
            } => search(shared, &needle, &start, result, generation),
        }
    }
}

fn generate(shared: &Shared, path: &Path) {
    let ancestors: Vec<PathBuf> = path.ancestors().map(Path::to_path_buf).collect();
    let known = {
        let tree = shared.tree.lock();
        ancestors.iter().position(|a| tree.from_path(a).is_some())
    };
    // Only the target itself when nothing above it is known yet.
    let needed = match known {
        Some(i) => &ancestors[..=i],
        None => &ancestors[..1],
    };

    let mut chain = Vec::with_capacity(needed.len());
    for p in needed.iter().rev() {
        match NodeInfo::stat(p) {
            Ok(info) => chain.push(info),
            Err(e) => {
                tracing::debug!("cannot stat {}: {e}", p.display());
                let _ = shared.events.send(TreeEvent::NodeGenerated {
                    path: path.to_path_buf(),
                    node: None,
                });
                return;
            }
        }
    }

    let node = shared.tree.lock().insert_chain(chain);
    let _ = shared.events.send(TreeEvent::NodeGenerated {
        path: path.to_path_buf(),
        node,
    });
}

fn populate(shared: &Shared, node: NodeId) {
    let Some(path) = shared.tree.lock().get(node).map(|n| n.path().to_path_buf()) else {
        return;
    };

    let listing = match read_directory(&path) {
        Ok(listing) => listing,
        Err(e) => {
            tracing::debug!("listing {} failed: {e}", path.display());
            Vec::new()
        }
    };

    shared.tree.lock().replace_children(node, listing);
    let _ = shared.events.send(TreeEvent::FinishedWorking { node });
}

fn refresh(shared: &Shared, node: NodeId) {
    let Some((path, parent)) = shared
        .tree
        .lock()
        .get(node)
        .map(|n| (n.path().to_path_buf(), n.parent()))
    else {
        return;
    };

    match NodeInfo::stat(&path) {
        Ok(info) => shared.tree.lock().update_info(node, info),
        Err(_) => match parent {
            Some(parent) => populate(shared, parent),
            None => shared.tree.lock().remove(node),
        },
    }
}

fn search(shared: &Shared, needle: &str, start: &Path, result: NodeId, generation: u64) {
    let cancelled = || shared.search_generation.load(Ordering::SeqCst) != generation;
    let mut stack = vec![start.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if cancelled() {
            let _ = shared.events.send(TreeEvent::SearchFinished {
                node: result,
                cancelled: true,
            });
            return;
        }

        let read_dir = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) => {
                tracing::debug!("search skipped {}: {e}", dir.display());
                continue;
            }
        };

        let mut batch = Vec::new();
        let mut subdirs = Vec::new();
        for dir_entry in read_dir {
            let Ok(dir_entry) = dir_entry else { continue };
            let Ok(info) = NodeInfo::stat(&dir_entry.path()) else {
                continue;
            };
            if info.is_dir() && !info.is_symlink() {
                subdirs.push(info.path().to_path_buf());
            }
            if info.name().to_lowercase().contains(needle) {
                batch.push(info);
            }
        }
        subdirs.sort_by(|a, b| b.cmp(a));
        stack.extend(subdirs);

        if !batch.is_empty() {
            let found = shared.tree.lock().append_children(result, batch);
            if found > 0 {
                let _ = shared
                    .events
                    .send(TreeEvent::SearchProgress { node: result, found });
            }
        }
    }

    let _ = shared.events.send(TreeEvent::SearchFinished {
        node: result,
        cancelled: false,
    });
}
