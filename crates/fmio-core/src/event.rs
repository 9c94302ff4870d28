//! Notifications sent from background workers to the UI.
//!
//! Workers never call back into their requester. Every result travels as
//! one of these values over a `std::sync::mpsc` channel the UI drains at
//! its own pace. Events flow **Core → UI** only; requests go through
//! methods on the owning service.

use std::path::PathBuf;

use crate::io::{JobOutcome, TaskKind};
use crate::tree::NodeId;

/// Structural and data changes in a node tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// A `generate_node` request finished. `node` is `None` if the path
    /// could not be stat'ed.
    NodeGenerated {
        path: PathBuf,
        node: Option<NodeId>,
    },
    /// A population request finished; busy indicators can stop.
    FinishedWorking { node: NodeId },
    /// Children of `parent` were added, removed or re-ordered. `None`
    /// means the whole tree.
    LayoutChanged { parent: Option<NodeId> },
    /// Metadata of `node` changed in place.
    DataChanged { node: NodeId },
    /// A node (and its subtree) left the tree.
    NodeRemoved { path: PathBuf },
    /// A search appended `found` more results to `node`.
    SearchProgress { node: NodeId, found: usize },
    /// A search ended, either exhausted or cancelled.
    SearchFinished { node: NodeId, cancelled: bool },
}

/// Derived display data became available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Data for this path was (re)generated.
    NewData(PathBuf),
    /// A theme icon was resolved (or found missing) for this name.
    NewIcon(String),
}

/// Progress and prompts from the IO job manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// A job left the queue and began executing.
    Started { kind: TaskKind, inputs: usize },
    /// Periodic progress. `overall` is `-1` while the job has no byte
    /// measure (removal); `file` is `100` exactly once per finished file.
    Progress {
        source: PathBuf,
        destination: PathBuf,
        overall: i32,
        file: i32,
    },
    /// Throughput over the last second, e.g. `"12.5 MB/s"`.
    Speed(String),
    /// The destination already exists. The job waits for
    /// `IoJobManager::resolve_conflict`.
    Conflict {
        source: PathBuf,
        destination: PathBuf,
    },
    /// The job hit an unrecoverable error and waits for
    /// `IoJobManager::acknowledge_error` (or a cancel).
    Error { message: String },
    /// The job is done; the manager moves on to the next one.
    Finished { kind: TaskKind, outcome: JobOutcome },
}
