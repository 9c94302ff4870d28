//! The IO worker role: executes jobs and reports progress to the session.

use std::io::{BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use fmio_core::relay::{self, Claim, RelayListener, Role};
use fmio_core::{Config, ConflictResolution, IoJobManager, JobDescriptor, JobEvent, JobOutcome, RelayMessage};
use tokio::runtime::Handle;

/// How long an idle worker keeps listening before it exits.
const IDLE_GRACE: Duration = Duration::from_secs(2);

/// Hands `job` to the running worker, or becomes the worker and runs it.
pub async fn submit(job: JobDescriptor, config: &Config) -> anyhow::Result<()> {
    if !config.io.use_queue {
        return run_in_process(job, config).await;
    }
    let message = RelayMessage::Job(job.clone());
    match relay::claim(&Role::Worker.socket_path(), Some(&message)).await? {
        Claim::Forwarded => {
            tracing::info!("Handed {} job to the running worker", job.kind);
            Ok(())
        }
        Claim::Listening(listener) => serve(config, listener, Some(job)).await,
    }
}

/// Runs as the worker until the queue drains.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    match relay::claim(&Role::Worker.socket_path(), None).await? {
        Claim::Forwarded => {
            tracing::info!("A worker is already running");
            Ok(())
        }
        Claim::Listening(listener) => serve(config, listener, None).await,
    }
}

async fn serve(config: &Config, listener: RelayListener, initial: Option<JobDescriptor>) -> anyhow::Result<()> {
    let socket = listener.path().to_path_buf();
    let (event_tx, event_rx) = std::sync::mpsc::channel();
    let manager = Arc::new(IoJobManager::from_config(event_tx, &config.io));
    let session = config.io.queue_visible.then(|| (Handle::current(), Role::Session.socket_path()));
    let pump = spawn_event_pump(event_rx, Arc::downgrade(&manager), session)?;

    if let Some(job) = initial {
        manager.queue(job)?;
    }

    let mut listener = Some(listener);
    while let Some(current) = listener.take() {
        if listen_until_idle(&manager, current).await == 0 {
            break;
        }
        // Jobs arrived while closing: take the role back unless another
        // worker already did, in which case ours just drain.
        listener = match relay::claim(&socket, None).await? {
            Claim::Listening(listener) => Some(listener),
            Claim::Forwarded => None,
        };
    }

    let waiter = Arc::clone(&manager);
    tokio::task::spawn_blocking(move || while !waiter.wait_idle(Duration::from_secs(60)) {}).await?;
    let stats = manager.stats();
    tracing::info!(
        "IO worker exiting: {} job(s), {} file(s) copied, {} renamed, {} removed",
        stats.jobs_finished,
        stats.files_cloned,
        stats.entries_renamed,
        stats.entries_removed
    );
    drop(manager);
    tokio::task::spawn_blocking(move || pump.join())
        .await?
        .map_err(|_| anyhow::anyhow!("event pump panicked"))?;
    Ok(())
}

/// Queues relayed jobs until the manager has been idle for [`IDLE_GRACE`],
/// then closes the socket. Returns how many jobs arrived during the close.
async fn listen_until_idle(manager: &IoJobManager, listener: RelayListener) -> usize {
    tracing::info!("IO worker listening on {}", listener.path().display());
    let (relay_tx, mut relay_rx) = tokio::sync::mpsc::unbounded_channel();
    let server = listener.spawn(relay_tx);

    loop {
        tokio::select! {
            message = relay_rx.recv() => match message {
                Some(message) => {
                    queue_relayed(manager, message);
                }
                None => break,
            },
            _ = tokio::time::sleep(IDLE_GRACE) => {
                if manager.is_idle() && relay_rx.is_empty() {
                    break;
                }
            }
        }
    }

    server.close().await;
    let mut late = 0;
    while let Some(message) = relay_rx.recv().await {
        if queue_relayed(manager, message) {
            late += 1;
        }
    }
    late
}

/// Queues `message` if it is a job; returns whether it was accepted.
fn queue_relayed(manager: &IoJobManager, message: RelayMessage) -> bool {
    match message {
        RelayMessage::Job(job) => {
            tracing::info!("Queued {} job from relay ({} pending)", job.kind, manager.pending() + 1);
            match manager.queue(job) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Rejected relayed job: {e}");
                    false
                }
            }
        }
        other => {
            tracing::debug!("Worker ignores {other:?}");
            false
        }
    }
}

/// Runs `job` on a manager owned by this process.
async fn run_in_process(job: JobDescriptor, config: &Config) -> anyhow::Result<()> {
    let (event_tx, event_rx) = std::sync::mpsc::channel();
    let manager = Arc::new(IoJobManager::from_config(event_tx, &config.io));
    let pump = spawn_event_pump(event_rx, Arc::downgrade(&manager), None)?;
    manager.queue(job)?;

    let waiter = Arc::clone(&manager);
    tokio::task::spawn_blocking(move || while !waiter.wait_idle(Duration::from_secs(60)) {}).await?;
    drop(manager);

    let outcome = tokio::task::spawn_blocking(move || pump.join())
        .await?
        .map_err(|_| anyhow::anyhow!("event pump panicked"))?;
    match outcome {
        Some(outcome) if !outcome.is_success() => anyhow::bail!("job ended with {outcome:?}"),
        _ => Ok(()),
    }
}

/// Consumes job events on a dedicated thread: logs them, answers prompts and
/// mirrors progress to the session when `session` is set. Returns the last
/// outcome once the manager is gone.
fn spawn_event_pump(
    events: Receiver<JobEvent>,
    manager: Weak<IoJobManager>,
    session: Option<(Handle, PathBuf)>,
) -> anyhow::Result<JoinHandle<Option<JobOutcome>>> {
    std::thread::Builder::new()
        .name("fmio-job-events".to_string())
        .spawn(move || {
            let mut last = None;
            for event in events {
                match event {
                    JobEvent::Started { kind, inputs } => {
                        tracing::info!("Started {kind} of {inputs} item(s)");
                        relay_to(&session, RelayMessage::Status(format!("{kind} started")));
                    }
                    JobEvent::Progress {
                        source,
                        destination,
                        overall,
                        file,
                    } => {
                        tracing::debug!("{overall}% ({file}%) {}", source.display());
                        relay_to(
                            &session,
                            RelayMessage::IoProgress {
                                percent: overall,
                                source,
                                destination,
                            },
                        );
                    }
                    JobEvent::Speed(rate) => tracing::info!("{rate}"),
                    JobEvent::Conflict { source, destination } => {
                        let answer = ask_conflict(&source, &destination);
                        if let Some(manager) = manager.upgrade() {
                            manager.resolve_conflict(answer);
                        }
                    }
                    JobEvent::Error { message } => {
                        tracing::error!("{message}");
                        relay_to(&session, RelayMessage::Status(message));
                        wait_for_enter();
                        if let Some(manager) = manager.upgrade() {
                            manager.acknowledge_error();
                        }
                    }
                    JobEvent::Finished { kind, outcome } => {
                        tracing::info!("Finished {kind}: {outcome:?}");
                        relay_to(&session, RelayMessage::Status(format!("{kind} finished")));
                        last = Some(outcome);
                    }
                }
            }
            last
        })
        .context("cannot spawn job event thread")
}

fn relay_to(session: &Option<(Handle, PathBuf)>, message: RelayMessage) {
    if let Some((handle, path)) = session {
        handle.block_on(relay::send(path, &message));
    }
}

fn ask_conflict(source: &Path, destination: &Path) -> ConflictResolution {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        tracing::warn!("{} exists and nobody can be asked; skipping", destination.display());
        return ConflictResolution::Skip;
    }
    loop {
        eprintln!(
            "{} already exists (copying {}).\n[o]verwrite, overwrite [a]ll, [s]kip, skip a[l]l, [r]ename <name>, [c]ancel?",
            destination.display(),
            source.display()
        );
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            return ConflictResolution::Cancel;
        }
        if let Some(answer) = parse_answer(&line) {
            return answer;
        }
    }
}

fn wait_for_enter() {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("Press Enter to continue.");
        let mut line = String::new();
        let _ = stdin.lock().read_line(&mut line);
    }
}

/// Maps a typed answer to a resolution; `None` asks again.
pub fn parse_answer(line: &str) -> Option<ConflictResolution> {
    let line = line.trim();
    let (word, arg) = line.split_once(' ').unwrap_or((line, ""));
    match word {
        "o" | "overwrite" => Some(ConflictResolution::Overwrite),
        "a" | "all" => Some(ConflictResolution::OverwriteAll),
        "s" | "skip" => Some(ConflictResolution::Skip),
        "l" | "skip-all" => Some(ConflictResolution::SkipAll),
        "r" | "rename" if !arg.trim().is_empty() => Some(ConflictResolution::Rename(arg.trim().to_string())),
        "c" | "cancel" => Some(ConflictResolution::Cancel),
        _ => None,
    }
}
