//! Pause, cancel and prompt handshakes between a running job and its owner.

use parking_lot::{Condvar, Mutex};

use crate::error::{CoreError, CoreResult};
use crate::io::job::{ConflictResolution, JobState};

#[derive(Debug, Default)]
struct ControlState {
    phase: JobState,
    paused: bool,
    cancelled: bool,
    reply: Option<ConflictResolution>,
    acknowledged: bool,
}

/// Flags the worker polls at its yield points, plus the rendezvous used
/// when it has to wait for the operator.
///
/// The worker never blocks while holding anything but this control's own
/// lock, and every wait wakes on `cancel`.
#[derive(Debug, Default)]
pub struct JobControl {
    state: Mutex<ControlState>,
    wake: Condvar,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> JobState {
        self.state.lock().phase
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Pauses or resumes at the next yield point. Survives across jobs.
    pub fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
        self.wake.notify_all();
    }

    /// Cancels the current job. Has no effect once it has finished.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if matches!(state.phase, JobState::Idle | JobState::Finished | JobState::Cancelled) {
            return;
        }
        state.cancelled = true;
        self.wake.notify_all();
    }

    /// Answers a pending conflict prompt. Ignored when none is pending.
    pub fn resolve(&self, resolution: ConflictResolution) -> bool {
        let mut state = self.state.lock();
        if state.phase != JobState::PausedForConflict {
            return false;
        }
        state.reply = Some(resolution);
        self.wake.notify_all();
        true
    }

    /// Releases a job waiting in [`JobState::Errored`].
    pub fn acknowledge(&self) -> bool {
        let mut state = self.state.lock();
        if state.phase != JobState::Errored {
            return false;
        }
        state.acknowledged = true;
        self.wake.notify_all();
        true
    }

    pub(crate) fn begin_job(&self) {
        let mut state = self.state.lock();
        state.phase = JobState::Running;
        state.cancelled = false;
        state.reply = None;
        state.acknowledged = false;
    }

    pub(crate) fn end_job(&self, phase: JobState) {
        let mut state = self.state.lock();
        state.phase = phase;
        state.cancelled = false;
        self.wake.notify_all();
    }

    pub(crate) fn set_idle(&self) {
        self.state.lock().phase = JobState::Idle;
    }

    /// Yield point: blocks while paused and fails with
    /// [`CoreError::Cancelled`] once a cancel has been requested.
    pub fn checkpoint(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return Err(CoreError::Cancelled);
            }
            if !state.paused {
                state.phase = JobState::Running;
                return Ok(());
            }
            state.phase = JobState::PausedByUser;
            self.wake.wait(&mut state);
        }
    }

    /// Enters [`JobState::PausedForConflict`], runs `notify` to publish the
    /// prompt, then waits for [`JobControl::resolve`].
    pub fn prompt_conflict(&self, notify: impl FnOnce()) -> CoreResult<ConflictResolution> {
        {
            let mut state = self.state.lock();
            state.reply = None;
            state.phase = JobState::PausedForConflict;
        }
        notify();

        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return Err(CoreError::Cancelled);
            }
            if let Some(reply) = state.reply.take() {
                state.phase = JobState::Running;
                return Ok(reply);
            }
            self.wake.wait(&mut state);
        }
    }

    /// Enters [`JobState::Errored`], runs `notify`, then waits for
    /// [`JobControl::acknowledge`]. Returns `true` if the wait ended with a
    /// cancel instead.
    pub fn await_acknowledge(&self, notify: impl FnOnce()) -> bool {
        {
            let mut state = self.state.lock();
            state.acknowledged = false;
            state.phase = JobState::Errored;
        }
        notify();

        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return true;
            }
            if state.acknowledged {
                state.acknowledged = false;
                return false;
            }
            self.wake.wait(&mut state);
        }
    }
}
