//! File system watcher feeding "directory changed" notifications to the model.
//!
//! Uses [`notify`] with debouncing. Every distinct path in a debounced batch
//! is reported on its own; the session hands each one to
//! `FsModel::directory_changed`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};

/// Messages from the watcher to the session loop.
#[derive(Debug)]
pub enum WatchMessage {
    /// Something at this path was created, modified or removed.
    Changed(PathBuf),
    /// An error occurred while watching.
    Error(String),
}

/// Watches a single directory for changes with debouncing.
pub struct DirWatcher {
    debouncer: Debouncer<notify::RecommendedWatcher>,
    current_dir: Option<PathBuf>,
}

impl DirWatcher {
    /// Creates a new directory watcher that sends messages through `tx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying notify watcher cannot be initialised.
    pub fn new(tx: Sender<WatchMessage>) -> anyhow::Result<Self> {
        let debouncer = new_debouncer(
            Duration::from_millis(200),
            move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                match result {
                    Ok(events) => {
                        let changed: BTreeSet<PathBuf> = events
                            .into_iter()
                            .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                            .map(|e| e.path)
                            .collect();
                        for path in changed {
                            let _ = tx.send(WatchMessage::Changed(path));
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(WatchMessage::Error(format!("{e}")));
                    }
                }
            },
        )?;

        Ok(Self {
            debouncer,
            current_dir: None,
        })
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Watches a new directory, unwatching the previous one if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be watched.
    pub fn watch(&mut self, dir: &Path) -> anyhow::Result<()> {
        if let Some(prev) = self.current_dir.take() {
            let _ = self.debouncer.watcher().unwatch(&prev);
        }

        // Non-recursive: only direct children are listed in the view.
        self.debouncer
            .watcher()
            .watch(dir, notify::RecursiveMode::NonRecursive)?;
        self.current_dir = Some(dir.to_path_buf());
        Ok(())
    }
}
