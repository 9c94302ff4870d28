//! Executes one job on the manager's worker thread.

use std::fs::{File, Metadata};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::settings::ConflictPolicy;
use crate::error::{CoreError, CoreResult};
use crate::event::JobEvent;
use crate::fs::ops;
use crate::io::control::JobControl;
use crate::io::job::{ConflictResolution, JobDescriptor, JobOutcome, JobStats, TaskKind};
use crate::io::progress::ProgressClock;

/// Streamed copies move data in blocks of this size.
pub const BLOCK_SIZE: usize = 1024 * 1024;

/// How the next conflict is settled. Only the `*All` answers and the
/// configured policy make a mode stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConflictMode {
    Ask,
    SkipAll,
    OverwriteAll,
    RenameAll,
}

impl From<ConflictPolicy> for ConflictMode {
    fn from(policy: ConflictPolicy) -> Self {
        match policy {
            ConflictPolicy::Ask => Self::Ask,
            ConflictPolicy::Skip => Self::SkipAll,
            ConflictPolicy::Overwrite => Self::OverwriteAll,
            ConflictPolicy::Rename => Self::RenameAll,
        }
    }
}

enum Decision {
    Skip,
    Overwrite,
    Target(PathBuf),
}

pub(crate) struct JobRunner<'a> {
    control: &'a JobControl,
    events: &'a Sender<JobEvent>,
    stats: &'a Mutex<JobStats>,
    clock: ProgressClock,
    mode: ConflictMode,
    current: Option<(PathBuf, PathBuf)>,
}

impl<'a> JobRunner<'a> {
    pub(crate) fn new(
        control: &'a JobControl,
        events: &'a Sender<JobEvent>,
        stats: &'a Mutex<JobStats>,
        policy: ConflictPolicy,
    ) -> Self {
        Self {
            control,
            events,
            stats,
            clock: ProgressClock::new(None, Instant::now()),
            mode: policy.into(),
            current: None,
        }
    }

    pub(crate) fn run(mut self, job: &JobDescriptor) -> JobOutcome {
        match (job.kind, job.output_dir()) {
            (TaskKind::Remove, _) => self.remove(&job.inputs),
            (kind, Some(output)) => self.transfer(kind, &job.inputs, output),
            (kind, None) => JobOutcome::Failed(format!("{kind} job without a destination")),
        }
    }

    fn transfer(&mut self, kind: TaskKind, inputs: &[PathBuf], output: &Path) -> JobOutcome {
        let is_move = kind == TaskKind::Move;
        let Some(total) = ops::total_size(inputs, output) else {
            tracing::info!("Refusing to {kind} into {}: it lies inside an input", output.display());
            return JobOutcome::NoOp;
        };
        self.clock = ProgressClock::new(Some(total), Instant::now());

        if let Some(first) = inputs.first() {
            self.current = Some((first.clone(), output.to_path_buf()));
        }
        if let Err(e) = self.prepare_output(inputs, output, total, is_move) {
            return self.fail(kind, e);
        }

        for input in inputs {
            let result = match input.file_name() {
                Some(name) => {
                    let dest = output.join(name);
                    let same_fs = is_move && ops::is_same_filesystem(input, output);
                    self.copy_recursive(input, &dest, is_move, same_fs)
                }
                None => Err(CoreError::InvalidName(input.display().to_string())),
            };
            match result {
                Ok(()) => {}
                Err(CoreError::Cancelled) => return JobOutcome::Cancelled,
                Err(e) => return self.fail(kind, e),
            }
        }

        if let Some(overall) = self.clock.finish() {
            let (source, destination) = self.current.clone().unwrap_or_default();
            self.emit_progress(&source, &destination, overall, 100);
        }
        JobOutcome::Completed
    }

    /// Checks the destination directory exists and can hold the payload.
    fn prepare_output(&self, inputs: &[PathBuf], output: &Path, total: u64, is_move: bool) -> CoreResult<()> {
        match std::fs::metadata(output) {
            Ok(meta) if !meta.is_dir() => return Err(CoreError::NotADirectory(output.to_path_buf())),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::NotFound(output.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        }

        let needed = if is_move {
            inputs
                .iter()
                .filter(|input| !ops::is_same_filesystem(input, output))
                .map(|input| ops::tree_size(input))
                .sum()
        } else {
            total
        };
        if needed == 0 {
            return Ok(());
        }
        match ops::available_space(output) {
            Some(available) if needed > available => Err(CoreError::InsufficientSpace {
                path: output.to_path_buf(),
                needed,
                available,
            }),
            _ => Ok(()),
        }
    }

    /// Copies (or moves) `src` to `dest`, settling conflicts on the way.
    fn copy_recursive(&mut self, src: &Path, dest: &Path, is_move: bool, same_fs: bool) -> CoreResult<()> {
        self.control.checkpoint()?;
        self.current = Some((src.to_path_buf(), dest.to_path_buf()));
        let meta = std::fs::symlink_metadata(src).map_err(|e| CoreError::transfer(src, dest, e))?;

        let mut dest = dest.to_path_buf();
        let mut merge = false;
        if std::fs::symlink_metadata(&dest).is_ok() {
            if same_entry(src, &dest) {
                if is_move {
                    self.clock.skip_bytes(ops::tree_size(src));
                    return Ok(());
                }
                dest = ops::unique_copy_name(&dest);
            } else {
                match self.decide(src, &dest)? {
                    Decision::Skip => {
                        tracing::debug!("Skipping existing {}", dest.display());
                        self.clock.skip_bytes(ops::tree_size(src));
                        return Ok(());
                    }
                    Decision::Overwrite => {
                        let dest_is_dir = std::fs::symlink_metadata(&dest).is_ok_and(|m| m.is_dir());
                        if meta.is_dir() && dest_is_dir {
                            merge = true;
                        } else {
                            ops::remove_path(&dest).map_err(|e| CoreError::transfer(src, &dest, e))?;
                        }
                    }
                    Decision::Target(target) => {
                        return self.copy_recursive(src, &target, is_move, same_fs);
                    }
                }
            }
        }

        if same_fs && !merge {
            let size = ops::tree_size(src);
            std::fs::rename(src, &dest).map_err(|e| CoreError::transfer(src, &dest, e))?;
            self.stats.lock().entries_renamed += 1;
            self.clock.skip_bytes(size);
            let (overall, file) = self.clock.file_finished();
            self.emit_progress(src, &dest, overall, file);
            return Ok(());
        }

        if meta.is_symlink() {
            ops::copy_symlink(src, &dest).map_err(|e| CoreError::transfer(src, &dest, e))?;
            if is_move {
                std::fs::remove_file(src).map_err(|e| CoreError::transfer(src, &dest, e))?;
            }
            return Ok(());
        }

        if meta.is_dir() {
            if !merge {
                std::fs::create_dir(&dest).map_err(|e| CoreError::transfer(src, &dest, e))?;
            }
            let children = ops::sorted_children(src).map_err(|e| CoreError::transfer(src, &dest, e))?;
            for child in children {
                let Some(name) = child.file_name() else { continue };
                let target = dest.join(name);
                self.copy_recursive(&child, &target, is_move, same_fs)?;
            }
            if !merge {
                if let Err(e) = std::fs::set_permissions(&dest, meta.permissions()) {
                    tracing::debug!("Could not copy permissions to {}: {e}", dest.display());
                }
            }
            if is_move {
                // Skipped children keep the source directory alive.
                if let Err(e) = std::fs::remove_dir(src) {
                    tracing::debug!("Keeping source directory {}: {e}", src.display());
                }
            }
            return Ok(());
        }

        self.clone_file(src, &dest, &meta)?;
        if is_move {
            std::fs::remove_file(src).map_err(|e| CoreError::transfer(src, &dest, e))?;
        }
        Ok(())
    }

    fn decide(&mut self, src: &Path, dest: &Path) -> CoreResult<Decision> {
        match self.mode {
            ConflictMode::SkipAll => return Ok(Decision::Skip),
            ConflictMode::OverwriteAll => return Ok(Decision::Overwrite),
            ConflictMode::RenameAll => return Ok(Decision::Target(ops::unique_copy_name(dest))),
            ConflictMode::Ask => {}
        }

        let events = self.events;
        let reply = self.control.prompt_conflict(|| {
            let _ = events.send(JobEvent::Conflict {
                source: src.to_path_buf(),
                destination: dest.to_path_buf(),
            });
        })?;

        match reply {
            ConflictResolution::Overwrite => Ok(Decision::Overwrite),
            ConflictResolution::OverwriteAll => {
                self.mode = ConflictMode::OverwriteAll;
                Ok(Decision::Overwrite)
            }
            ConflictResolution::Skip | ConflictResolution::Continue => Ok(Decision::Skip),
            ConflictResolution::SkipAll => {
                self.mode = ConflictMode::SkipAll;
                Ok(Decision::Skip)
            }
            ConflictResolution::Rename(name) => {
                if !ops::is_valid_filename(&name) {
                    return Err(CoreError::InvalidName(name));
                }
                Ok(Decision::Target(dest.with_file_name(name)))
            }
            ConflictResolution::Cancel => Err(CoreError::Cancelled),
        }
    }

    /// Streams `src` into a fresh `dest`. Any failure, cancellation
    /// included, deletes the partial destination.
    pub(crate) fn clone_file(&mut self, src: &Path, dest: &Path, meta: &Metadata) -> CoreResult<()> {
        let mut reader = File::open(src).map_err(|e| CoreError::transfer(src, dest, e))?;
        let mut writer = File::create(dest).map_err(|e| CoreError::transfer(src, dest, e))?;
        self.clock.begin_file(meta.len());

        let copied = match self.stream(&mut reader, &mut writer, src, dest) {
            Ok(copied) => copied,
            Err(e) => {
                drop(writer);
                if let Err(rm) = std::fs::remove_file(dest) {
                    tracing::debug!("Could not remove partial {}: {rm}", dest.display());
                }
                return Err(e);
            }
        };
        if let Err(e) = writer.set_permissions(meta.permissions()) {
            tracing::debug!("Could not copy permissions to {}: {e}", dest.display());
        }

        {
            let mut stats = self.stats.lock();
            stats.files_cloned += 1;
            stats.bytes_copied += copied;
        }
        let (overall, file) = self.clock.file_finished();
        self.emit_progress(src, dest, overall, file);
        Ok(())
    }

    fn stream(&mut self, reader: &mut File, writer: &mut File, src: &Path, dest: &Path) -> CoreResult<u64> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        let mut copied = 0u64;
        loop {
            self.control.checkpoint()?;
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(copied),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CoreError::transfer(src, dest, e)),
            };
            writer
                .write_all(&buf[..n])
                .map_err(|e| CoreError::transfer(src, dest, e))?;
            copied += n as u64;
            self.clock.add_bytes(n as u64);
            self.report(src, dest);
        }
    }

    fn remove(&mut self, inputs: &[PathBuf]) -> JobOutcome {
        self.clock = ProgressClock::new(None, Instant::now());
        let mut failed = Vec::new();
        for input in inputs {
            if let Err(CoreError::Cancelled) = self.remove_recursive(input, &mut failed) {
                return JobOutcome::Cancelled;
            }
        }
        if failed.is_empty() {
            JobOutcome::Completed
        } else {
            JobOutcome::PartiallyCompleted { failed }
        }
    }

    /// Children first, then the entry itself. Returns whether `path` is gone.
    fn remove_recursive(&mut self, path: &Path, failed: &mut Vec<PathBuf>) -> CoreResult<bool> {
        self.control.checkpoint()?;
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Cannot remove {}: {e}", path.display());
                failed.push(path.to_path_buf());
                return Ok(false);
            }
        };

        let result = if meta.is_dir() {
            let children = match ops::sorted_children(path) {
                Ok(children) => children,
                Err(e) => {
                    tracing::warn!("Cannot list {}: {e}", path.display());
                    failed.push(path.to_path_buf());
                    return Ok(false);
                }
            };
            let mut emptied = true;
            for child in children {
                emptied &= self.remove_recursive(&child, failed)?;
            }
            if !emptied {
                return Ok(false);
            }
            std::fs::remove_dir(path)
        } else {
            std::fs::remove_file(path)
        };

        match result {
            Ok(()) => {
                self.stats.lock().entries_removed += 1;
                self.report(path, Path::new(""));
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("Cannot remove {}: {e}", path.display());
                failed.push(path.to_path_buf());
                Ok(false)
            }
        }
    }

    /// Reports a fatal error and waits for the operator.
    fn fail(&mut self, kind: TaskKind, err: CoreError) -> JobOutcome {
        let (source, destination) = self.current.clone().unwrap_or_default();
        let directory = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let reason = match &err {
            CoreError::Transfer { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        let message = format!(
            "Cannot {kind} {} to {} (in {}): {reason}",
            source.display(),
            destination.display(),
            directory.display()
        );
        tracing::warn!("{message}");

        let events = self.events;
        let cancelled = self.control.await_acknowledge(|| {
            let _ = events.send(JobEvent::Error {
                message: message.clone(),
            });
        });
        if cancelled {
            JobOutcome::Cancelled
        } else {
            JobOutcome::Failed(message)
        }
    }

    fn report(&mut self, src: &Path, dest: &Path) {
        let now = Instant::now();
        if let Some((overall, file)) = self.clock.tick(now) {
            self.emit_progress(src, dest, overall, file);
        }
        if let Some(rate) = self.clock.speed(now) {
            let _ = self.events.send(JobEvent::Speed(rate));
        }
    }

    fn emit_progress(&self, src: &Path, dest: &Path, overall: i32, file: i32) {
        let _ = self.events.send(JobEvent::Progress {
            source: src.to_path_buf(),
            destination: dest.to_path_buf(),
            overall,
            file,
        });
    }
}

/// Whether `a` and `b` name the same directory entry.
fn same_entry(a: &Path, b: &Path) -> bool {
    match (a.parent(), a.file_name(), b.parent(), b.file_name()) {
        (Some(pa), Some(na), Some(pb), Some(nb)) => na == nb && ops::normalize(pa) == ops::normalize(pb),
        _ => false,
    }
}
