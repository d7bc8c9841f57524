//! Run state machine shared by every hardware-driving operation
//!
//! `Idle -> Running -> {Completed, Aborted, Faulted}`; a terminal phase
//! goes back to `Idle` when acknowledged or when the next run is launched.
//!
//! An operation implements [`RunStep`]: `begin` once, `step` until it
//! reports [`StepOutcome::Finished`] or fails, then `finish` for cleanup and
//! the report. [`drive`] checks cancellation between steps, never inside
//! one. [`RunSlot`] owns one run at a time on the presentation side.

use crate::report::{OutcomeReport, RunReport};
use crate::task::{TaskError, TaskHandle, TaskPoll, TaskRunner};
use sbemkit_core::emit;
use sbemkit_core::event_bus::{AppEvent, ErrorEvent, RunEvent};
use sbemkit_core::{thread_safe_rw, RunError, RunKind, Severity, ThreadSafeRw};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunPhase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// A worker owns the run.
    Running,
    /// Finished all its work.
    Completed,
    /// Stopped early at the operator's request.
    Aborted,
    /// Stopped by a fault.
    Faulted,
}

impl RunPhase {
    /// Whether this is one of the terminal phases.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Aborted | RunPhase::Faulted)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a step asks the driver to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Call `step` again (after a cancellation check).
    Continue,
    /// All work is done.
    Finished,
}

/// How the loop ended, handed to [`RunStep::finish`]
#[derive(Debug)]
pub enum RunEnd<F> {
    /// `step` returned `Finished`.
    Completed,
    /// Cancellation was observed between steps.
    Aborted,
    /// `begin` or `step` failed.
    Faulted(F),
}

impl<F> RunEnd<F> {
    /// Phase corresponding to this end.
    pub fn phase(&self) -> RunPhase {
        match self {
            RunEnd::Completed => RunPhase::Completed,
            RunEnd::Aborted => RunPhase::Aborted,
            RunEnd::Faulted(_) => RunPhase::Faulted,
        }
    }
}

/// One long-running operation
pub trait RunStep: Send + 'static {
    /// State the presentation side reads after each progress ping.
    type Snapshot: Clone + Default + Send + Sync + 'static;
    /// Fault that ends the run.
    type Fault: Send + 'static;
    /// Final report.
    type Report: RunReport;

    /// Which operation this is.
    fn kind(&self) -> RunKind;

    /// Snapshot published when the run is launched.
    fn initial_snapshot(&self) -> Self::Snapshot {
        Self::Snapshot::default()
    }

    /// Preparation before the first step.
    fn begin(&mut self, _snapshot: &ThreadSafeRw<Self::Snapshot>) -> Result<(), Self::Fault> {
        Ok(())
    }

    /// One atomic unit of work.
    fn step(&mut self, snapshot: &ThreadSafeRw<Self::Snapshot>)
        -> Result<StepOutcome, Self::Fault>;

    /// Cleanup and report. Runs for every end, including faults in `begin`.
    fn finish(
        self,
        end: RunEnd<Self::Fault>,
        snapshot: &ThreadSafeRw<Self::Snapshot>,
    ) -> Self::Report;
}

/// Drive `run` to completion on the current (worker) thread.
///
/// `is_cancelled` is consulted between steps; `notify` is called after each
/// completed step.
pub fn drive<S: RunStep>(
    mut run: S,
    snapshot: &ThreadSafeRw<S::Snapshot>,
    is_cancelled: impl Fn() -> bool,
    notify: impl Fn(),
) -> (RunPhase, S::Report) {
    let end = match run.begin(snapshot) {
        Err(fault) => RunEnd::Faulted(fault),
        Ok(()) => loop {
            if is_cancelled() {
                break RunEnd::Aborted;
            }
            match run.step(snapshot) {
                Ok(StepOutcome::Continue) => notify(),
                Ok(StepOutcome::Finished) => break RunEnd::Completed,
                Err(fault) => break RunEnd::Faulted(fault),
            }
        },
    };
    let phase = end.phase();
    let report = run.finish(end, snapshot);
    (phase, report)
}

/// What a [`RunSlot::poll`] observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPoll {
    /// Nothing running.
    Idle,
    /// Running, no news.
    Quiet,
    /// Running and the snapshot changed.
    Progressed,
    /// The run ended during this poll; the report is available.
    Finished(RunPhase),
}

/// Presentation-side owner of one run type
///
/// Busy state belongs to the slot instance: two slots never share it.
pub struct RunSlot<S: RunStep> {
    kind: RunKind,
    phase: RunPhase,
    snapshot: ThreadSafeRw<S::Snapshot>,
    handle: Option<TaskHandle<(RunPhase, S::Report)>>,
    report: Option<S::Report>,
    failure: Option<OutcomeReport>,
}

impl<S: RunStep> fmt::Debug for RunSlot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSlot")
            .field("kind", &self.kind)
            .field("phase", &self.phase)
            .finish()
    }
}

impl<S: RunStep> RunSlot<S> {
    /// Idle slot for runs of `kind`.
    pub fn new(kind: RunKind) -> Self {
        Self {
            kind,
            phase: RunPhase::Idle,
            snapshot: thread_safe_rw(S::Snapshot::default()),
            handle: None,
            report: None,
            failure: None,
        }
    }

    /// Start `run` on a worker. Rejected while a run is in flight.
    pub fn launch(&mut self, run: S) -> Result<(), RunError> {
        if self.phase == RunPhase::Running {
            return Err(RunError::Busy {
                run: self.kind.to_string(),
            });
        }
        *self.snapshot.write() = run.initial_snapshot();
        self.report = None;
        self.failure = None;

        let snapshot = self.snapshot.clone();
        let handle = TaskRunner::spawn(&self.kind.to_string(), move |ctx| {
            drive(run, &snapshot, || ctx.is_cancelled(), || ctx.notify_progress())
        })
        .map_err(|e| RunError::WorkerUnavailable {
            run: self.kind.to_string(),
            reason: e.to_string(),
        })?;

        self.handle = Some(handle);
        self.phase = RunPhase::Running;
        emit!(AppEvent::Run(RunEvent::Started { run: self.kind }));
        Ok(())
    }

    /// Check the worker. Call regularly from the presentation thread.
    pub fn poll(&mut self) -> SlotPoll {
        let Some(handle) = self.handle.as_mut() else {
            return SlotPoll::Idle;
        };
        match handle.poll() {
            TaskPoll::Pending { progressed: true } => SlotPoll::Progressed,
            TaskPoll::Pending { progressed: false } => SlotPoll::Quiet,
            TaskPoll::Finished(result) => {
                self.handle = None;
                SlotPoll::Finished(self.settle(result))
            }
            TaskPoll::Done => {
                self.handle = None;
                SlotPoll::Idle
            }
        }
    }

    /// Block until the current run ends; returns its phase.
    pub fn wait(&mut self) -> RunPhase {
        if let Some(mut handle) = self.handle.take() {
            let result = handle.wait();
            self.settle(result);
        }
        self.phase
    }

    fn settle(&mut self, result: Result<(RunPhase, S::Report), TaskError>) -> RunPhase {
        let summary = match result {
            Ok((phase, report)) => {
                self.phase = phase;
                let summary = report.outcome().title.clone();
                self.report = Some(report);
                summary
            }
            Err(e) => {
                self.phase = RunPhase::Faulted;
                let failure = OutcomeReport::error(
                    format!("{} failed", self.kind),
                    format!("The operation stopped unexpectedly: {}", e),
                );
                let summary = failure.title.clone();
                self.failure = Some(failure);
                summary
            }
        };
        if self.phase == RunPhase::Faulted {
            if let Some(outcome) = self.outcome() {
                emit!(AppEvent::Error(ErrorEvent {
                    run: self.kind,
                    severity: Severity::Error,
                    message: outcome.message.clone(),
                }));
            }
        }
        emit!(AppEvent::Run(RunEvent::Finished {
            run: self.kind,
            summary,
        }));
        self.phase
    }

    /// Ask the running worker to stop at its next safe point.
    pub fn request_abort(&self) {
        if let Some(handle) = &self.handle {
            handle.cancel();
            emit!(AppEvent::Run(RunEvent::AbortRequested { run: self.kind }));
        }
    }

    /// Move a terminal phase back to `Idle`.
    pub fn acknowledge(&mut self) {
        if self.phase.is_terminal() {
            self.phase = RunPhase::Idle;
        }
    }

    /// Current phase
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Whether a worker owns the run
    pub fn is_running(&self) -> bool {
        self.phase == RunPhase::Running
    }

    /// Whether the start control should be enabled
    pub fn start_enabled(&self) -> bool {
        !self.is_running()
    }

    /// Refuse to close while a worker is still mutating run state.
    pub fn try_close(&self) -> Result<(), RunError> {
        if self.is_running() {
            Err(RunError::CloseRefused {
                run: self.kind.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Copy of the shared run state
    pub fn snapshot(&self) -> S::Snapshot {
        self.snapshot.read().clone()
    }

    /// Report of the last finished run
    pub fn report(&self) -> Option<&S::Report> {
        self.report.as_ref()
    }

    /// Take the report of the last finished run
    pub fn take_report(&mut self) -> Option<S::Report> {
        self.report.take()
    }

    /// Operator-facing outcome of the last finished run, including worker
    /// failures that produced no report
    pub fn outcome(&self) -> Option<&OutcomeReport> {
        self.report
            .as_ref()
            .map(RunReport::outcome)
            .or(self.failure.as_ref())
    }

    /// Run type
    pub fn kind(&self) -> RunKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, Default)]
    struct Counter {
        done: u32,
    }

    struct CountTo {
        target: u32,
        fail_at: Option<u32>,
        delay: Duration,
    }

    impl RunStep for CountTo {
        type Snapshot = Counter;
        type Fault = String;
        type Report = OutcomeReport;

        fn kind(&self) -> RunKind {
            RunKind::Approach
        }

        fn step(&mut self, snapshot: &ThreadSafeRw<Counter>) -> Result<StepOutcome, String> {
            std::thread::sleep(self.delay);
            let next = snapshot.read().done + 1;
            if self.fail_at == Some(next) {
                return Err(format!("failed at {}", next));
            }
            snapshot.write().done = next;
            Ok(if next == self.target {
                StepOutcome::Finished
            } else {
                StepOutcome::Continue
            })
        }

        fn finish(self, end: RunEnd<String>, snapshot: &ThreadSafeRw<Counter>) -> OutcomeReport {
            let done = snapshot.read().done;
            match end {
                RunEnd::Faulted(e) => OutcomeReport::error("Faulted", e),
                _ => OutcomeReport::info(format!("{:?}", end.phase()), done.to_string()),
            }
        }
    }

    #[test]
    fn test_drive_completes() {
        let snapshot = thread_safe_rw(Counter::default());
        let run = CountTo {
            target: 3,
            fail_at: None,
            delay: Duration::ZERO,
        };
        let (phase, report) = drive(run, &snapshot, || false, || {});
        assert_eq!(phase, RunPhase::Completed);
        assert_eq!(report.message, "3");
    }

    #[test]
    fn test_drive_fault_preserves_progress() {
        let snapshot = thread_safe_rw(Counter::default());
        let run = CountTo {
            target: 5,
            fail_at: Some(3),
            delay: Duration::ZERO,
        };
        let (phase, report) = drive(run, &snapshot, || false, || {});
        assert_eq!(phase, RunPhase::Faulted);
        assert_eq!(report.message, "failed at 3");
        assert_eq!(snapshot.read().done, 2);
    }

    #[test]
    fn test_slot_rejects_second_launch() {
        let mut slot: RunSlot<CountTo> = RunSlot::new(RunKind::Approach);
        let slow = || CountTo {
            target: 50,
            fail_at: None,
            delay: Duration::from_millis(5),
        };
        slot.launch(slow()).expect("first launch");
        assert!(!slot.start_enabled());
        assert!(matches!(slot.launch(slow()), Err(RunError::Busy { .. })));
        assert!(matches!(slot.try_close(), Err(RunError::CloseRefused { .. })));

        slot.request_abort();
        assert_eq!(slot.wait(), RunPhase::Aborted);
        assert!(slot.start_enabled());
        assert!(slot.try_close().is_ok());
        assert!(slot.snapshot().done < 50);
    }
}
