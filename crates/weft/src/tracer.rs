//! Scheduler tracing infrastructure.
//!
//! A trait-based hook system for observing scheduler activity. All hooks
//! default to no-ops, so [`NoopTracer`] (the production default) costs one
//! virtual call per event and nothing else. [`StderrTracer`] prints a
//! human-readable log; [`RecordingTracer`] captures events for test
//! assertions or post-mortem inspection.

use std::{cell::RefCell, fmt, rc::Rc, time::Duration};

use crate::{exception::CoException, task::TaskId};

/// One recorded scheduler event. Used by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A task was created and is about to be scheduled.
    TaskCreated(TaskId),
    /// A task entered the ready queue (fresh, re-queued, or woken).
    TaskScheduled(TaskId),
    /// One `step()` ran; the payload is the outcome kind
    /// ("pending", "suspend", "finished", "failed").
    Step(TaskId, &'static str),
    /// An asynchronous call was armed for a parked task.
    CallArmed(TaskId, String),
    /// A task terminated normally.
    TaskDone(TaskId),
    /// A task terminated fatally.
    TaskFailed(TaskId),
    /// A single step exceeded the long-iteration budget.
    LongIteration(TaskId, Duration),
    /// A batch ended after running `steps` steps.
    BatchEnd { steps: usize, timeout: bool },
    /// The tick was disarmed: no ready tasks, nothing parked.
    Idle,
}

/// Trait for scheduler tracing.
///
/// All methods have default no-op implementations; implementations override
/// only the hooks they care about.
pub trait SchedTracer: fmt::Debug {
    /// Called when `new_task` builds a task, before it is first scheduled.
    fn on_task_created(&mut self, _task: TaskId) {}

    /// Called whenever a task enters the ready queue.
    fn on_task_scheduled(&mut self, _task: TaskId) {}

    /// Called after each `step()` with the outcome kind.
    fn on_step(&mut self, _task: TaskId, _outcome: &'static str) {}

    /// Called when an asynchronous call is armed for a parked task.
    fn on_call_armed(&mut self, _task: TaskId, _call: &str) {}

    /// Called when a task terminates normally.
    fn on_task_done(&mut self, _task: TaskId) {}

    /// Called when a task terminates fatally, before the exception is
    /// surfaced to the host.
    fn on_task_failed(&mut self, _task: TaskId, _exc: &CoException) {}

    /// Called when one step overran the long-iteration budget.
    fn on_long_iteration(&mut self, _task: TaskId, _elapsed: Duration) {}

    /// Called at the end of every batch.
    fn on_batch_end(&mut self, _steps: usize, _timeout: bool) {}

    /// Called when the scheduler disarms its tick.
    fn on_idle(&mut self) {}
}

/// A tracer that does nothing. The production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl SchedTracer for NoopTracer {}

/// Tracer that prints a human-readable event log to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl SchedTracer for StderrTracer {
    fn on_task_created(&mut self, task: TaskId) {
        eprintln!("[weft] {task} created");
    }

    fn on_task_scheduled(&mut self, task: TaskId) {
        eprintln!("[weft] {task} scheduled");
    }

    fn on_step(&mut self, task: TaskId, outcome: &'static str) {
        eprintln!("[weft] {task} step -> {outcome}");
    }

    fn on_call_armed(&mut self, task: TaskId, call: &str) {
        eprintln!("[weft] {task} armed {call}");
    }

    fn on_task_done(&mut self, task: TaskId) {
        eprintln!("[weft] {task} done");
    }

    fn on_task_failed(&mut self, task: TaskId, exc: &CoException) {
        eprintln!("[weft] {task} failed: {}", exc.orig());
    }

    fn on_long_iteration(&mut self, task: TaskId, elapsed: Duration) {
        eprintln!("[weft] {task} long iteration: {elapsed:?}");
    }

    fn on_batch_end(&mut self, steps: usize, timeout: bool) {
        eprintln!("[weft] batch end: {steps} steps, timeout={timeout}");
    }

    fn on_idle(&mut self) {
        eprintln!("[weft] idle, tick disarmed");
    }
}

/// Tracer that records every event for later inspection.
///
/// The event buffer is shared: clone [`RecordingTracer::events`] before
/// handing the tracer to the scheduler, then inspect (or drain) the buffer
/// from the outside.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Rc<RefCell<Vec<TraceEvent>>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded events.
    pub fn events(&self) -> Rc<RefCell<Vec<TraceEvent>>> {
        Rc::clone(&self.events)
    }

    fn push(&self, event: TraceEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl SchedTracer for RecordingTracer {
    fn on_task_created(&mut self, task: TaskId) {
        self.push(TraceEvent::TaskCreated(task));
    }

    fn on_task_scheduled(&mut self, task: TaskId) {
        self.push(TraceEvent::TaskScheduled(task));
    }

    fn on_step(&mut self, task: TaskId, outcome: &'static str) {
        self.push(TraceEvent::Step(task, outcome));
    }

    fn on_call_armed(&mut self, task: TaskId, call: &str) {
        self.push(TraceEvent::CallArmed(task, call.to_owned()));
    }

    fn on_task_done(&mut self, task: TaskId) {
        self.push(TraceEvent::TaskDone(task));
    }

    fn on_task_failed(&mut self, task: TaskId, _exc: &CoException) {
        self.push(TraceEvent::TaskFailed(task));
    }

    fn on_long_iteration(&mut self, task: TaskId, elapsed: Duration) {
        self.push(TraceEvent::LongIteration(task, elapsed));
    }

    fn on_batch_end(&mut self, steps: usize, timeout: bool) {
        self.push(TraceEvent::BatchEnd { steps, timeout });
    }

    fn on_idle(&mut self) {
        self.push(TraceEvent::Idle);
    }
}
