//! Asynchronous suspension primitives.
//!
//! An [`AsynchronousCall`] is how a coroutine suspends its task on an
//! external event: the coroutine yields the call, the scheduler parks the
//! task and hands the call a [`CallContext`], and the call arms whatever
//! event source it needs (typically a host timer). When the event fires, the
//! call wakes the task through the context and the scheduler re-queues it.
//!
//! [`Sleep`] is the canonical implementation; everything else is a user
//! extension point.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
    time::Duration,
};

use crate::{
    exception::{CoException, Exception},
    host::EventHost,
    scheduler::{self, SchedulerInner},
    task::Task,
    value::Value,
};

/// Return value or exception delivered by a completed asynchronous call.
#[derive(Debug)]
pub enum CallResult {
    /// Resumes the task with the value injected at the yield site.
    Return(Value),
    /// Resumes the task with the exception thrown at the yield site.
    Error(Exception),
}

impl From<Value> for CallResult {
    fn from(value: Value) -> Self {
        Self::Return(value)
    }
}

impl From<Exception> for CallResult {
    fn from(exception: Exception) -> Self {
        Self::Error(exception)
    }
}

/// A user-supplied suspension primitive.
///
/// The scheduler guarantees that [`arm`] is invoked exactly once per yielded
/// call, with the task and scheduler back-references already wired into the
/// context. Ownership of the boxed call passes into `arm`; implementations
/// that wait on an external event move themselves (or whatever state they
/// need) into the event callback, which keeps the call alive until
/// [`CallContext::wake`] has run.
///
/// [`arm`]: AsynchronousCall::arm
pub trait AsynchronousCall {
    /// Registers with the external event source.
    ///
    /// The context must eventually be consumed by [`CallContext::wake`];
    /// dropping it unwoken abandons the parked task.
    fn arm(self: Box<Self>, ctx: CallContext);

    /// Display name used in traces.
    fn name(&self) -> &str {
        "<async call>"
    }
}

/// The framework-provided wake handle for one suspension.
///
/// Carries the back-references to the parked task and its scheduler, valid
/// from just before [`AsynchronousCall::arm`] until [`wake`] runs. `wake`
/// consumes the context, so a call can never wake its task twice and a call
/// object cannot be re-used for a second suspension.
///
/// [`wake`]: CallContext::wake
pub struct CallContext {
    inner: Option<CtxInner>,
}

struct CtxInner {
    task: Rc<RefCell<Task>>,
    scheduler: Weak<RefCell<SchedulerInner>>,
}

impl CallContext {
    pub(crate) fn new(task: Rc<RefCell<Task>>, scheduler: Weak<RefCell<SchedulerInner>>) -> Self {
        Self {
            inner: Some(CtxInner { task, scheduler }),
        }
    }

    /// The host loop the owning scheduler is embedded in, for starting
    /// timers. `None` once the scheduler has been dropped, in which case
    /// there is nothing left to wake.
    pub fn host(&self) -> Option<Rc<dyn EventHost>> {
        let inner = self.inner.as_ref()?;
        let sched = inner.scheduler.upgrade()?;
        let host = sched.borrow().host().clone();
        Some(host)
    }

    /// Wakes the parked task with the call's result.
    ///
    /// A plain [`Value`] is injected at the yield site on the task's next
    /// resumption. An [`Exception`] replaces any pending one, wrapped in a
    /// fresh [`CoException`] with a synthesised top-of-stack frame, and is
    /// thrown at the yield site instead. Either way the task is re-queued at
    /// the near end of the ready queue and the scheduler tick is re-armed if
    /// it had gone idle.
    pub fn wake(mut self, result: impl Into<CallResult>) {
        let Some(CtxInner { task, scheduler }) = self.inner.take() else {
            return;
        };
        match result.into() {
            CallResult::Return(value) => task.borrow_mut().set_pending_send(value),
            CallResult::Error(exception) => {
                let mut co = CoException::new(exception);
                co.push_caller_frame(task.borrow().current_frame());
                task.borrow_mut().set_pending_exception(co);
            }
        }
        if let Some(inner_rc) = scheduler.upgrade() {
            scheduler::wake_parked(&inner_rc, task);
        }
    }
}

impl Drop for CallContext {
    fn drop(&mut self) {
        // An unwoken context means the call was dropped without completing;
        // the parked task can never resume, so release its accounting.
        if let Some(CtxInner { task, scheduler }) = self.inner.take()
            && let Some(inner_rc) = scheduler.upgrade()
        {
            drop(task);
            scheduler::abandon_parked(&inner_rc);
        }
    }
}

/// Suspends the task for the given number of milliseconds.
///
/// Arms a one-shot host timer; on expiry the task is woken with
/// [`Value::None`].
///
/// # Example
/// ```no_run
/// use weft::{from_fn, Resume, Sleep, Step};
///
/// let mut slept = false;
/// let co = from_fn("napper", move |input| {
///     if let Resume::Throw(exc) = input {
///         return Step::Raise(exc);
///     }
///     if !slept {
///         slept = true;
///         Step::call(Sleep::new(100))
///     } else {
///         Step::Complete
///     }
/// });
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Sleep {
    ms: u64,
}

impl Sleep {
    pub fn new(ms: u64) -> Self {
        Self { ms }
    }
}

impl AsynchronousCall for Sleep {
    fn arm(self: Box<Self>, ctx: CallContext) {
        let Some(host) = ctx.host() else { return };
        host.start_timer(
            Duration::from_millis(self.ms),
            Box::new(move || ctx.wake(Value::None)),
        );
    }

    fn name(&self) -> &str {
        "Sleep"
    }
}
