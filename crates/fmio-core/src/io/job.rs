//! Job descriptors and the values that flow in and out of a running job.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// What a job does to its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Copy,
    Move,
    Remove,
}

impl TaskKind {
    /// Leading relay token selecting this kind.
    pub fn flag(self) -> &'static str {
        match self {
            Self::Copy => "--copy",
            Self::Move => "--move",
            Self::Remove => "--remove",
        }
    }

    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "--copy" => Some(Self::Copy),
            "--move" => Some(Self::Move),
            "--remove" => Some(Self::Remove),
            _ => None,
        }
    }

    /// Whether jobs of this kind need a destination directory.
    pub fn needs_output(self) -> bool {
        !matches!(self, Self::Remove)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Remove => "remove",
        })
    }
}

/// One Copy/Move/Remove request: task kind, input paths and destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub kind: TaskKind,
    pub inputs: Vec<PathBuf>,
    /// Destination directory; always `None` for [`TaskKind::Remove`].
    pub output: Option<PathBuf>,
}

impl JobDescriptor {
    pub fn copy(inputs: Vec<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            kind: TaskKind::Copy,
            inputs,
            output: Some(output.into()),
        }
    }

    pub fn move_to(inputs: Vec<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            kind: TaskKind::Move,
            inputs,
            output: Some(output.into()),
        }
    }

    pub fn remove(inputs: Vec<PathBuf>) -> Self {
        Self {
            kind: TaskKind::Remove,
            inputs,
            output: None,
        }
    }

    /// Checks that the descriptor names at least one input and carries an
    /// output exactly when its kind needs one.
    pub fn validate(&self) -> CoreResult<()> {
        if self.inputs.is_empty() {
            return Err(CoreError::InvalidName(format!("{} job without inputs", self.kind)));
        }
        match (&self.output, self.kind.needs_output()) {
            (None, true) => Err(CoreError::InvalidName(format!(
                "{} job without a destination",
                self.kind
            ))),
            (Some(out), false) => Err(CoreError::InvalidName(format!(
                "remove job with a destination: {}",
                out.display()
            ))),
            _ => Ok(()),
        }
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output.as_deref()
    }
}

/// The operator's answer to a [`crate::event::JobEvent::Conflict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Replace this destination entry; directories are merged.
    Overwrite,
    /// Like `Overwrite`, and stop asking for the rest of the job.
    OverwriteAll,
    /// Leave this destination entry alone.
    Skip,
    /// Like `Skip`, and stop asking for the rest of the job.
    SkipAll,
    /// Write to this sibling name instead.
    Rename(String),
    /// Abort the job.
    Cancel,
    /// No decision; treated as `Skip`.
    Continue,
}

/// Lifecycle of the job currently owned by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Running,
    PausedForConflict,
    PausedByUser,
    /// Waiting for `acknowledge_error` or `cancel`.
    Errored,
    Finished,
    Cancelled,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Remove jobs only: these entries could not be deleted.
    PartiallyCompleted { failed: Vec<PathBuf> },
    Cancelled,
    /// The job would have copied a tree into itself; nothing was touched.
    NoOp,
    /// A fatal error, already acknowledged by the operator.
    Failed(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::NoOp)
    }
}

/// Counters accumulated over the manager's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Files whose bytes were streamed.
    pub files_cloned: u64,
    /// Entries moved with a single rename.
    pub entries_renamed: u64,
    pub entries_removed: u64,
    pub bytes_copied: u64,
    pub jobs_finished: u64,
}
