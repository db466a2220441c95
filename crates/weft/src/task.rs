//! The task state machine: one top-level coroutine plus its subcoroutine stack.
//!
//! A task drives its current coroutine in bounded micro-steps, converting
//! whatever the coroutine yields into a scheduler directive. Subcoroutine
//! calls push the caller onto an explicit stack; completions pop it and
//! inject the envelope value; exceptions unwind the stack one frame per
//! micro-step, offering each caller a catch site on its next resumption.

use std::mem;

use smallvec::SmallVec;

use crate::{
    call::AsynchronousCall,
    coroutine::{Coroutine, Resume, Step, Yielded},
    exception::{CoException, ExcType, Exception, Frame},
    value::{Return, Value},
};

/// Unique identifier for a task.
///
/// Sequential integers allocated by the scheduler that created the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u32);

impl TaskId {
    #[inline]
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task #{}", self.0)
    }
}

/// What one call to [`Task::step`] asks the scheduler to do.
pub(crate) enum StepOutcome {
    /// Nothing actionable was yielded; re-queue the task.
    Pending,
    /// The current coroutine produced an asynchronous call; park the task
    /// until the call wakes it.
    Suspend(Box<dyn AsynchronousCall>),
    /// The task terminated, normally or fatally.
    Finished(Result<Return, CoException>),
}

impl StepOutcome {
    /// Short kind name for traces.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Suspend(_) => "suspend",
            Self::Finished(Ok(_)) => "finished",
            Self::Finished(Err(_)) => "failed",
        }
    }
}

/// A scheduling unit owning one top-level coroutine and the nested
/// subcoroutine stack.
pub(crate) struct Task {
    id: TaskId,
    /// The coroutine currently being driven; the logical top of `stack`.
    current: Box<dyn Coroutine>,
    /// Suspended callers, outermost first. Empty iff `current` is the task's
    /// top-level coroutine.
    stack: SmallVec<[Box<dyn Coroutine>; 4]>,
    /// Value injected into `current` on its next normal resumption.
    pending_send: Value,
    /// If set, thrown into `current` instead of a normal resumption.
    /// Consumed (and exclusive with `pending_send`) per resumption.
    pending_exception: Option<CoException>,
    /// The envelope of the most recently completed subcoroutine, cleared
    /// whenever a later yield produces anything else. A coroutine that
    /// exhausts right after a subcoroutine returned inherits that envelope.
    last_envelope: Option<Return>,
    /// Completion observers registered through the task handle.
    done_hooks: Vec<Box<dyn FnOnce(&Return)>>,
    finished: bool,
}

impl Task {
    pub(crate) fn new(id: TaskId, coroutine: Box<dyn Coroutine>) -> Self {
        Self {
            id,
            current: coroutine,
            stack: SmallVec::new(),
            pending_send: Value::None,
            pending_exception: None,
            last_envelope: None,
            done_hooks: Vec::new(),
            finished: false,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// A backtrace frame for the coroutine currently being driven.
    pub(crate) fn current_frame(&self) -> Frame {
        Frame::new(self.current.name(), self.current.location())
    }

    pub(crate) fn set_pending_send(&mut self, value: Value) {
        self.pending_send = value;
    }

    /// Replaces any pending exception. An asynchronous wake always wins over
    /// whatever was stored before it.
    pub(crate) fn set_pending_exception(&mut self, exception: CoException) {
        self.pending_exception = Some(exception);
    }

    pub(crate) fn push_done_hook(&mut self, hook: Box<dyn FnOnce(&Return)>) {
        self.done_hooks.push(hook);
    }

    pub(crate) fn take_done_hooks(&mut self) -> Vec<Box<dyn FnOnce(&Return)>> {
        mem::take(&mut self.done_hooks)
    }

    #[cfg(test)]
    pub(crate) fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Advances execution by up to `max_iterations` micro-steps.
    ///
    /// Each micro-step resumes the current coroutine (injecting the pending
    /// exception if set, the pending send value otherwise) and dispatches on
    /// what came back. Subcoroutine pushes, completions and unwind frames
    /// are all handled within the micro-step budget; once it is spent the
    /// task cedes back to the scheduler with [`StepOutcome::Pending`].
    pub(crate) fn step(&mut self, max_iterations: usize) -> StepOutcome {
        debug_assert!(!self.finished, "step() called on a finished task");

        for _ in 0..max_iterations {
            let step = match self.pending_exception.take() {
                Some(co) => {
                    let step = self.current.resume(Resume::Throw(co.orig().clone()));
                    if let Step::Raise(raised) = step {
                        // The same exception propagating keeps accumulating
                        // frames; a handler that raised something new starts
                        // a fresh backtrace.
                        let co = if *co.orig() == raised {
                            co
                        } else {
                            CoException::new(raised)
                        };
                        match self.unwind(co) {
                            Some(outcome) => return outcome,
                            None => continue,
                        }
                    }
                    step
                }
                None => {
                    let sendval = mem::take(&mut self.pending_send);
                    self.current.resume(Resume::Send(sendval))
                }
            };

            match step {
                Step::Yield(Yielded::Value(Value::None)) => {
                    self.last_envelope = None;
                    return StepOutcome::Pending;
                }
                Step::Yield(Yielded::Async(call)) => {
                    self.last_envelope = None;
                    return StepOutcome::Suspend(call);
                }
                Step::Yield(Yielded::Sub(coroutine)) => {
                    self.last_envelope = None;
                    let caller = mem::replace(&mut self.current, coroutine);
                    self.stack.push(caller);
                    self.pending_send = Value::None;
                }
                Step::Yield(Yielded::Return(envelope)) => {
                    self.last_envelope = Some(envelope.clone());
                    if let Some(outcome) = self.complete(envelope) {
                        return outcome;
                    }
                }
                Step::Yield(Yielded::Value(other)) => {
                    // Type-fault: none of the recognised kinds.
                    self.last_envelope = None;
                    let exc = Exception::new(
                        ExcType::TypeFault,
                        format!("wrong type yielded: {}", other.kind()),
                    );
                    if let Some(outcome) = self.unwind(CoException::new(exc)) {
                        return outcome;
                    }
                }
                Step::Complete => {
                    let envelope = self.last_envelope.clone().unwrap_or_else(Return::none);
                    if let Some(outcome) = self.complete(envelope) {
                        return outcome;
                    }
                }
                Step::Raise(raised) => {
                    if let Some(outcome) = self.unwind(CoException::new(raised)) {
                        return outcome;
                    }
                }
            }
        }

        StepOutcome::Pending
    }

    /// End of the current (sub)coroutine. Pops the caller and injects the
    /// envelope value, or finishes the task when the stack is empty.
    fn complete(&mut self, envelope: Return) -> Option<StepOutcome> {
        match self.stack.pop() {
            Some(caller) => {
                self.current = caller;
                self.pending_send = envelope.into_value();
                None
            }
            None => {
                self.finished = true;
                Some(StepOutcome::Finished(Ok(envelope)))
            }
        }
    }

    /// One unwind frame: records the current coroutine in the backtrace,
    /// then pops the caller (offering it a catch site on its next
    /// resumption) or finishes the task fatally.
    fn unwind(&mut self, mut co: CoException) -> Option<StepOutcome> {
        co.push_caller_frame(self.current_frame());
        match self.stack.pop() {
            Some(caller) => {
                self.current = caller;
                self.pending_exception = Some(co);
                None
            }
            None => {
                self.finished = true;
                Some(StepOutcome::Finished(Err(co)))
            }
        }
    }
}
