//! FIFO job queue drained by a single lazily spawned worker thread.

use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::settings::{ConflictPolicy, IoConfig};
use crate::error::CoreResult;
use crate::event::JobEvent;
use crate::io::control::JobControl;
use crate::io::job::{ConflictResolution, JobDescriptor, JobOutcome, JobState, JobStats};
use crate::io::runner::JobRunner;

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<JobDescriptor>,
    worker: Option<JoinHandle<()>>,
    running: bool,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    idle: Condvar,
    control: JobControl,
    stats: Mutex<JobStats>,
    policy: Mutex<ConflictPolicy>,
    events: Sender<JobEvent>,
}

/// Runs Copy/Move/Remove jobs one at a time, in submission order.
///
/// The worker thread is started by [`IoJobManager::queue`] and exits once
/// the queue is empty. Progress, prompts and results arrive as
/// [`JobEvent`]s; prompts are answered through [`IoJobManager::resolve_conflict`]
/// and [`IoJobManager::acknowledge_error`].
pub struct IoJobManager {
    shared: Arc<Shared>,
}

impl IoJobManager {
    pub fn new(events: Sender<JobEvent>) -> Self {
        Self::with_policy(events, ConflictPolicy::default())
    }

    pub fn with_policy(events: Sender<JobEvent>, policy: ConflictPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState::default()),
                idle: Condvar::new(),
                control: JobControl::new(),
                stats: Mutex::new(JobStats::default()),
                policy: Mutex::new(policy),
                events,
            }),
        }
    }

    pub fn from_config(events: Sender<JobEvent>, io: &IoConfig) -> Self {
        Self::with_policy(events, io.conflict)
    }

    /// Takes effect from the next job on.
    pub fn set_conflict_policy(&self, policy: ConflictPolicy) {
        *self.shared.policy.lock() = policy;
    }

    /// Appends `job` and starts the worker if it is not running.
    ///
    /// # Errors
    ///
    /// - [`crate::CoreError::InvalidName`] for a malformed descriptor.
    /// - [`crate::CoreError::Io`] if the worker thread cannot be spawned;
    ///   the job stays queued for the next attempt.
    pub fn queue(&self, job: JobDescriptor) -> CoreResult<()> {
        job.validate()?;
        let mut queue = self.shared.queue.lock();
        queue.jobs.push_back(job);
        if queue.running {
            return Ok(());
        }
        if let Some(previous) = queue.worker.take() {
            let _ = previous.join();
        }
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("fmio-io-jobs".to_string())
            .spawn(move || run(&shared))?;
        queue.worker = Some(handle);
        queue.running = true;
        Ok(())
    }

    pub fn set_paused(&self, paused: bool) {
        self.shared.control.set_paused(paused);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.control.is_paused()
    }

    /// Cancels the running job; queued jobs still run.
    pub fn cancel(&self) {
        self.shared.control.cancel();
    }

    /// Answers the pending conflict prompt. Returns `false` if none is pending.
    pub fn resolve_conflict(&self, resolution: ConflictResolution) -> bool {
        self.shared.control.resolve(resolution)
    }

    /// Releases a job waiting in [`JobState::Errored`].
    pub fn acknowledge_error(&self) -> bool {
        self.shared.control.acknowledge()
    }

    /// Drops every job that has not started yet and returns how many.
    pub fn clear_queue(&self) -> usize {
        let mut queue = self.shared.queue.lock();
        let dropped = queue.jobs.len();
        queue.jobs.clear();
        dropped
    }

    /// Jobs waiting behind the running one.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    pub fn state(&self) -> JobState {
        self.shared.control.state()
    }

    pub fn stats(&self) -> JobStats {
        *self.shared.stats.lock()
    }

    pub fn is_idle(&self) -> bool {
        !self.shared.queue.lock().running
    }

    /// Blocks until the worker has drained the queue. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.queue.lock();
        while queue.running {
            if self.shared.idle.wait_until(&mut queue, deadline).timed_out() {
                return !queue.running;
            }
        }
        true
    }
}

impl Drop for IoJobManager {
    fn drop(&mut self) {
        let worker = {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            queue.jobs.clear();
            self.shared.control.cancel();
            queue.worker.take()
        };
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

fn run(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            match queue.jobs.pop_front() {
                Some(job) if !queue.shutdown => {
                    shared.control.begin_job();
                    job
                }
                _ => {
                    shared.control.set_idle();
                    queue.running = false;
                    shared.idle.notify_all();
                    return;
                }
            }
        };

        tracing::info!("Starting {} of {} item(s)", job.kind, job.inputs.len());
        let _ = shared.events.send(JobEvent::Started {
            kind: job.kind,
            inputs: job.inputs.len(),
        });

        let policy = *shared.policy.lock();
        let outcome = JobRunner::new(&shared.control, &shared.events, &shared.stats, policy).run(&job);

        shared.control.end_job(match outcome {
            JobOutcome::Cancelled => JobState::Cancelled,
            _ => JobState::Finished,
        });
        shared.stats.lock().jobs_finished += 1;
        tracing::info!("Finished {}: {:?}", job.kind, outcome);
        let _ = shared.events.send(JobEvent::Finished {
            kind: job.kind,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::job::TaskKind;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::mpsc::{self, Receiver};
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(10);

    fn manager(policy: ConflictPolicy) -> (IoJobManager, Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel();
        (IoJobManager::with_policy(tx, policy), rx)
    }

    /// Collects events up to and including the next `Finished`, letting
    /// `respond` react to prompts on the way.
    fn drain(rx: &Receiver<JobEvent>, mut respond: impl FnMut(&JobEvent)) -> (Vec<JobEvent>, JobOutcome) {
        let mut seen = Vec::new();
        loop {
            let event = rx.recv_timeout(WAIT).expect("job did not finish");
            respond(&event);
            if let JobEvent::Finished { outcome, .. } = &event {
                let outcome = outcome.clone();
                seen.push(event);
                return (seen, outcome);
            }
            seen.push(event);
        }
    }

    fn progress(events: &[JobEvent]) -> Vec<(PathBuf, i32, i32)> {
        events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress {
                    source,
                    overall,
                    file,
                    ..
                } => Some((source.clone(), *overall, *file)),
                _ => None,
            })
            .collect()
    }

    fn conflicts(events: &[JobEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, JobEvent::Conflict { .. }))
            .count()
    }

    fn wait_state(manager: &IoJobManager, state: JobState) {
        let deadline = Instant::now() + WAIT;
        while manager.state() != state {
            assert!(Instant::now() < deadline, "never reached {state:?}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn layout(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path.clone());
                }
                out.push(path);
            }
        }
        out.sort();
        out
    }

    #[test]
    fn copy_single_file_reports_full_progress() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        fs::write(src.join("a.txt"), &payload).unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager
            .queue(JobDescriptor::copy(vec![src.join("a.txt")], &dst))
            .unwrap();
        let (events, outcome) = drain(&rx, |_| {});

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(
            events.first(),
            Some(&JobEvent::Started {
                kind: TaskKind::Copy,
                inputs: 1
            })
        );
        let reports = progress(&events);
        let last = reports.last().unwrap();
        assert_eq!((last.1, last.2), (100, 100));
        let completions = reports
            .iter()
            .filter(|(source, _, file)| *source == src.join("a.txt") && *file == 100)
            .count();
        assert_eq!(completions, 1);
        assert_eq!(fs::read(dst.join("a.txt")).unwrap(), payload);
        assert!(src.join("a.txt").exists());
        assert_eq!(manager.stats().files_cloned, 1);
    }

    #[cfg(unix)]
    #[test]
    fn same_filesystem_move_is_a_rename() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(src.join("tree")).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("a.txt"), vec![1u8; 1000]).unwrap();
        fs::write(src.join("tree/inner"), "x").unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager
            .queue(JobDescriptor::move_to(
                vec![src.join("a.txt"), src.join("tree")],
                &dst,
            ))
            .unwrap();
        let (_, outcome) = drain(&rx, |_| {});

        assert_eq!(outcome, JobOutcome::Completed);
        assert!(!src.join("a.txt").exists());
        assert!(!src.join("tree").exists());
        assert_eq!(fs::read(dst.join("a.txt")).unwrap(), vec![1u8; 1000]);
        assert!(dst.join("tree/inner").exists());
        let stats = manager.stats();
        assert_eq!(stats.files_cloned, 0);
        assert_eq!(stats.entries_renamed, 2);
    }

    #[test]
    fn copy_into_own_subdirectory_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("src/dir");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("file"), "keep").unwrap();
        let before = layout(tmp.path());
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager
            .queue(JobDescriptor::copy(vec![dir.clone()], dir.join("sub")))
            .unwrap();
        let (events, outcome) = drain(&rx, |_| {});

        assert_eq!(outcome, JobOutcome::NoOp);
        assert!(progress(&events).is_empty());
        assert_eq!(layout(tmp.path()), before);
        assert_eq!(manager.stats().files_cloned, 0);
    }

    #[test]
    fn rename_answer_writes_beside_existing_file() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("a.txt"), "new").unwrap();
        fs::write(dst.join("a.txt"), "old").unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager
            .queue(JobDescriptor::move_to(vec![src.join("a.txt")], &dst))
            .unwrap();
        let (events, outcome) = drain(&rx, |event| {
            if let JobEvent::Conflict { destination, .. } = event {
                assert_eq!(*destination, dst.join("a.txt"));
                assert_eq!(manager.state(), JobState::PausedForConflict);
                assert!(manager.resolve_conflict(ConflictResolution::Rename("a_2.txt".to_string())));
            }
        });

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(conflicts(&events), 1);
        assert_eq!(fs::read_to_string(dst.join("a_2.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "old");
        assert!(!src.join("a.txt").exists());
    }

    #[test]
    fn remove_deletes_children_before_parent() {
        let tmp = TempDir::new().unwrap();
        let d = tmp.path().join("d");
        fs::create_dir(&d).unwrap();
        fs::write(d.join("sub"), "x").unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager.queue(JobDescriptor::remove(vec![d.clone()])).unwrap();
        let (events, outcome) = drain(&rx, |_| {});

        assert_eq!(outcome, JobOutcome::Completed);
        assert!(!d.join("sub").exists());
        assert!(!d.exists());
        assert_eq!(manager.stats().entries_removed, 2);
        assert!(progress(&events).iter().all(|(_, overall, _)| *overall == -1));
    }

    #[test]
    fn remove_continues_past_failures() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing");
        let present = tmp.path().join("present");
        fs::write(&present, "").unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager
            .queue(JobDescriptor::remove(vec![missing.clone(), present.clone()]))
            .unwrap();
        let (_, outcome) = drain(&rx, |_| {});

        assert_eq!(
            outcome,
            JobOutcome::PartiallyCompleted {
                failed: vec![missing]
            }
        );
        assert!(!present.exists());
    }

    fn nested_conflict_fixture(tmp: &TempDir) -> (PathBuf, PathBuf) {
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        for root in [&src, &dst] {
            fs::create_dir_all(root.join("tree/sub")).unwrap();
        }
        fs::write(src.join("tree/x"), "src-x").unwrap();
        fs::write(src.join("tree/sub/y"), "src-y").unwrap();
        fs::write(src.join("tree/sub/z"), "src-z").unwrap();
        fs::write(dst.join("tree/x"), "dst-x").unwrap();
        fs::write(dst.join("tree/sub/y"), "dst-y").unwrap();
        (src, dst)
    }

    #[test]
    fn overwrite_all_stops_prompting_in_nested_directories() {
        let tmp = TempDir::new().unwrap();
        let (src, dst) = nested_conflict_fixture(&tmp);
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager
            .queue(JobDescriptor::copy(vec![src.join("tree")], &dst))
            .unwrap();
        let (events, outcome) = drain(&rx, |event| {
            if let JobEvent::Conflict { .. } = event {
                manager.resolve_conflict(ConflictResolution::OverwriteAll);
            }
        });

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(conflicts(&events), 1);
        assert_eq!(fs::read_to_string(dst.join("tree/x")).unwrap(), "src-x");
        assert_eq!(fs::read_to_string(dst.join("tree/sub/y")).unwrap(), "src-y");
        assert_eq!(fs::read_to_string(dst.join("tree/sub/z")).unwrap(), "src-z");
    }

    #[test]
    fn skip_all_leaves_destination_untouched() {
        let tmp = TempDir::new().unwrap();
        let (src, dst) = nested_conflict_fixture(&tmp);
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager
            .queue(JobDescriptor::copy(vec![src.join("tree")], &dst))
            .unwrap();
        let (events, outcome) = drain(&rx, |event| {
            if let JobEvent::Conflict { .. } = event {
                manager.resolve_conflict(ConflictResolution::SkipAll);
            }
        });

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(conflicts(&events), 1);
        assert_eq!(fs::read_to_string(dst.join("tree/x")).unwrap(), "dst-x");
        assert!(!dst.join("tree/sub/z").exists());
    }

    #[test]
    fn single_overwrite_asks_again_for_next_entry() {
        let tmp = TempDir::new().unwrap();
        let (src, dst) = nested_conflict_fixture(&tmp);
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager
            .queue(JobDescriptor::copy(vec![src.join("tree")], &dst))
            .unwrap();
        let (events, outcome) = drain(&rx, |event| {
            if let JobEvent::Conflict { .. } = event {
                manager.resolve_conflict(ConflictResolution::Overwrite);
            }
        });

        assert_eq!(outcome, JobOutcome::Completed);
        // tree, tree/sub, tree/sub/y, tree/x
        assert_eq!(conflicts(&events), 4);
        assert_eq!(fs::read_to_string(dst.join("tree/x")).unwrap(), "src-x");
    }

    #[test]
    fn configured_overwrite_policy_never_prompts() {
        let tmp = TempDir::new().unwrap();
        let (src, dst) = nested_conflict_fixture(&tmp);
        let (manager, rx) = manager(ConflictPolicy::Overwrite);

        manager
            .queue(JobDescriptor::copy(vec![src.join("tree")], &dst))
            .unwrap();
        let (events, outcome) = drain(&rx, |_| {});

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(conflicts(&events), 0);
        assert_eq!(fs::read_to_string(dst.join("tree/sub/y")).unwrap(), "src-y");
    }

    #[test]
    fn cancel_while_paused_leaves_no_output() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("big.bin");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&dst).unwrap();
        fs::write(&src, vec![0u8; 3 * 1024 * 1024]).unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);
        manager.set_paused(true);

        manager.queue(JobDescriptor::copy(vec![src.clone()], &dst)).unwrap();
        wait_state(&manager, JobState::PausedByUser);
        manager.cancel();
        let (_, outcome) = drain(&rx, |_| {});

        assert_eq!(outcome, JobOutcome::Cancelled);
        assert!(!dst.join("big.bin").exists());
        assert!(manager.wait_idle(WAIT));
        assert_eq!(manager.state(), JobState::Idle);
    }

    #[test]
    fn overall_progress_is_monotonic_and_ends_at_100() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        for (i, size) in [3usize << 20, 0, 1500, 2 << 20].into_iter().enumerate() {
            fs::write(src.join(format!("f{i}")), vec![i as u8; size]).unwrap();
        }
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager.queue(JobDescriptor::copy(vec![src.clone()], &dst)).unwrap();
        let (events, outcome) = drain(&rx, |_| {});

        assert_eq!(outcome, JobOutcome::Completed);
        let overall: Vec<i32> = progress(&events).iter().map(|(_, o, _)| *o).collect();
        assert!(overall.windows(2).all(|w| w[0] <= w[1]), "{overall:?}");
        assert_eq!(overall.last(), Some(&100));
        for i in 0..4 {
            let completions = progress(&events)
                .iter()
                .filter(|(s, _, f)| *s == src.join(format!("f{i}")) && *f == 100)
                .count();
            assert_eq!(completions, 1, "f{i}");
        }
    }

    #[test]
    fn error_waits_for_acknowledgement_then_next_job_runs() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&dst).unwrap();
        let victim = tmp.path().join("victim");
        fs::write(&victim, "").unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager
            .queue(JobDescriptor::copy(vec![tmp.path().join("ghost")], &dst))
            .unwrap();
        manager.queue(JobDescriptor::remove(vec![victim.clone()])).unwrap();

        let mut message = String::new();
        let (_, outcome) = drain(&rx, |event| {
            if let JobEvent::Error { message: m } = event {
                message = m.clone();
                assert_eq!(manager.state(), JobState::Errored);
                assert_eq!(manager.pending(), 1);
                assert!(manager.acknowledge_error());
            }
        });

        assert!(message.contains("ghost"));
        assert!(message.contains(&dst.display().to_string()));
        assert_eq!(outcome, JobOutcome::Failed(message));

        let (_, outcome) = drain(&rx, |_| {});
        assert_eq!(outcome, JobOutcome::Completed);
        assert!(!victim.exists());
        assert!(manager.wait_idle(WAIT));
        assert_eq!(manager.stats().jobs_finished, 2);
    }

    #[test]
    fn missing_destination_is_an_error_not_created() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "data").unwrap();
        let dst = tmp.path().join("typo/does/not/exist");
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager.queue(JobDescriptor::copy(vec![file.clone()], &dst)).unwrap();
        let mut errors = 0;
        let (_, outcome) = drain(&rx, |event| {
            if let JobEvent::Error { message } = event {
                errors += 1;
                assert!(message.contains("path not found"), "{message}");
                assert!(manager.acknowledge_error());
            }
        });

        assert_eq!(errors, 1);
        assert!(matches!(outcome, JobOutcome::Failed(_)));
        assert!(!tmp.path().join("typo").exists());
        assert!(file.exists());
        assert_eq!(manager.stats().files_cloned, 0);
    }

    #[test]
    fn copy_onto_itself_picks_copy_name() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("report.txt");
        fs::write(&file, "data").unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager
            .queue(JobDescriptor::copy(vec![file.clone()], tmp.path()))
            .unwrap();
        let (events, outcome) = drain(&rx, |_| {});

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(conflicts(&events), 0);
        assert_eq!(
            fs::read_to_string(tmp.path().join("report (copy).txt")).unwrap(),
            "data"
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_recreated_not_followed() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(tmp.path().join("target.txt"), "t").unwrap();
        std::os::unix::fs::symlink("../target.txt", src.join("link")).unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager.queue(JobDescriptor::copy(vec![src.clone()], &dst)).unwrap();
        let (_, outcome) = drain(&rx, |_| {});

        assert_eq!(outcome, JobOutcome::Completed);
        let copied = dst.join("src/link");
        assert!(fs::symlink_metadata(&copied).unwrap().is_symlink());
        assert_eq!(fs::read_link(&copied).unwrap(), PathBuf::from("../target.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn clone_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let script = tmp.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&dst).unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);

        manager.queue(JobDescriptor::copy(vec![script], &dst)).unwrap();
        drain(&rx, |_| {});

        let mode = fs::metadata(dst.join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn jobs_run_in_fifo_order_and_queue_can_be_cleared() {
        let tmp = TempDir::new().unwrap();
        let files: Vec<PathBuf> = (0..3).map(|i| tmp.path().join(format!("f{i}"))).collect();
        for f in &files {
            fs::write(f, "").unwrap();
        }
        let (manager, rx) = manager(ConflictPolicy::Ask);
        manager.set_paused(true);

        for f in &files {
            manager.queue(JobDescriptor::remove(vec![f.clone()])).unwrap();
        }
        wait_state(&manager, JobState::PausedByUser);
        assert_eq!(manager.pending(), 2);
        assert_eq!(manager.clear_queue(), 2);
        manager.set_paused(false);
        let (_, outcome) = drain(&rx, |_| {});

        assert_eq!(outcome, JobOutcome::Completed);
        assert!(manager.wait_idle(WAIT));
        assert!(!files[0].exists());
        assert!(files[1].exists());
        assert!(files[2].exists());
        assert_eq!(manager.state(), JobState::Idle);
    }

    #[test]
    fn invalid_descriptor_is_rejected() {
        let (manager, _rx) = manager(ConflictPolicy::Ask);
        let job = JobDescriptor {
            kind: TaskKind::Copy,
            inputs: vec![PathBuf::from("/a")],
            output: None,
        };
        assert!(manager.queue(job).is_err());
        assert!(manager.is_idle());
    }

    #[test]
    fn worker_restarts_after_going_idle() {
        let tmp = TempDir::new().unwrap();
        let (manager, rx) = manager(ConflictPolicy::Ask);

        for name in ["one", "two"] {
            let path = tmp.path().join(name);
            fs::write(&path, "").unwrap();
            manager.queue(JobDescriptor::remove(vec![path.clone()])).unwrap();
            let (_, outcome) = drain(&rx, |_| {});
            assert_eq!(outcome, JobOutcome::Completed);
            assert!(manager.wait_idle(WAIT));
            assert!(!path.exists());
        }
    }
}
