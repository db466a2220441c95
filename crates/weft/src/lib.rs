//! A cooperative, single-threaded coroutine scheduler for event-driven hosts.
//!
//! Application code expresses long-running logic as [`Coroutine`]s that
//! yield at well-defined suspension points; the [`Scheduler`] multiplexes
//! many such coroutines onto the host's event loop while keeping batches
//! bounded in step count and wall-clock time, so the host stays responsive
//! for its own work.
//!
//! A coroutine may yield:
//!
//! - nothing ([`Step::plain`]): the task is re-queued and resumed next tick;
//! - a subcoroutine ([`Step::sub`]): nested as a child call frame whose
//!   final value is injected back into the caller;
//! - an asynchronous call ([`Step::call`]): the task parks until the call's
//!   external event wakes it ([`Sleep`] is the canonical one);
//! - a [`Return`] envelope ([`Step::ret`]): terminating the (sub)coroutine
//!   with a value.
//!
//! Exceptions unwind the subcoroutine stack one frame per resumption,
//! offering every caller a catch site; only when the stack empties does the
//! failure become fatal to the task, carrying a [`CoException`] with the
//! virtual backtrace accumulated along the way.
//!
//! The scheduler owns no event loop of its own: anything implementing
//! [`EventHost`] (one-shot timers plus a repeating zero-delay tick) can
//! embed it. [`MiniLoop`] is a small self-contained host for demos and
//! tests.
//!
//! # Example
//! ```
//! use weft::{from_fn, MiniLoop, Resume, Return, Scheduler, Sleep, Step};
//!
//! let host = MiniLoop::new();
//! let scheduler = Scheduler::new(host.clone());
//!
//! let mut slept = false;
//! let task = scheduler.new_task(from_fn("napper", move |input| {
//!     if let Resume::Throw(exc) = input {
//!         return Step::Raise(exc);
//!     }
//!     if !slept {
//!         slept = true;
//!         Step::call(Sleep::new(10))
//!     } else {
//!         Step::ret(Return::of("rested"))
//!     }
//! }));
//! task.on_done(|envelope| println!("{}", envelope.value()));
//!
//! host.run();
//! ```

mod call;
mod coroutine;
mod exception;
mod host;
mod scheduler;
mod task;
pub mod tracer;
mod value;

pub use crate::{
    call::{AsynchronousCall, CallContext, CallResult, Sleep},
    coroutine::{Coroutine, FnCoroutine, Resume, Step, Yielded, from_fn},
    exception::{CoException, CodeLoc, ExcType, Exception, Frame},
    host::{EventHost, MiniLoop, TickAction},
    scheduler::{
        AVERAGE_SCHEDULER_TIME, MAX_ITERATION_TIME, MAX_SCHEDULER_ITERATIONS, MAX_TASK_ITERATIONS,
        SchedConfig, Scheduler, TaskHandle,
    },
    task::TaskId,
    tracer::{NoopTracer, RecordingTracer, SchedTracer, StderrTracer, TraceEvent},
    value::{Return, Value},
};
