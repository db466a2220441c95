//! The resumable coroutine abstraction.
//!
//! A [`Coroutine`] is a producer that is resumed step by step by its owning
//! task. Each resumption injects either a value or an exception, and the
//! coroutine answers with a [`Step`]: something it yielded, a completion
//! signal, or a raised exception. Coroutines are ordinary user values: a
//! coroutine may itself be yielded, which nests it as a subcoroutine on the
//! caller's task.
//!
//! Rust has no native resumable functions, so coroutines are written as
//! explicit state machines (or closures over mutable state via [`from_fn`]).
//! The framework never relies on anything beyond the trait: the subcoroutine
//! call-stack is explicit data inside the task.

use std::fmt;

use crate::{
    call::AsynchronousCall,
    exception::{CodeLoc, Exception},
    value::{Return, Value},
};

/// What a resumption injects into the coroutine.
#[derive(Debug)]
pub enum Resume {
    /// Normal resumption carrying a value ([`Value::None`] when there is
    /// nothing to deliver).
    Send(Value),
    /// Exceptional resumption: the exception is delivered at the suspension
    /// point, exactly as if the coroutine's own yield had raised it.
    Throw(Exception),
}

/// What a coroutine yielded on one step.
pub enum Yielded {
    /// A plain value. [`Value::None`] cedes control back to the scheduler
    /// (the task is re-queued); any other value is a type-fault, fatal to the
    /// yielding coroutine unless caught upstream.
    Value(Value),
    /// Nest the given coroutine as a child call frame; its final envelope
    /// value is injected into this coroutine on resumption.
    Sub(Box<dyn Coroutine>),
    /// Suspend the task until the call's external event wakes it.
    Async(Box<dyn AsynchronousCall>),
    /// Terminate this (sub)coroutine, delivering the envelope's value.
    Return(Return),
}

impl Yielded {
    /// Short kind name for diagnostics and traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Sub(_) => "sub",
            Self::Async(_) => "async",
            Self::Return(_) => "return",
        }
    }
}

impl fmt::Debug for Yielded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Sub(sub) => f.debug_tuple("Sub").field(&sub.name()).finish(),
            Self::Async(call) => f.debug_tuple("Async").field(&call.name()).finish(),
            Self::Return(env) => f.debug_tuple("Return").field(env).finish(),
        }
    }
}

/// The outcome of one resumption.
pub enum Step {
    /// The coroutine yielded an item and is suspended at that yield site.
    Yield(Yielded),
    /// The coroutine has no more values to produce. Not an error: this is
    /// the normal end of a coroutine that never yielded a `Return`.
    Complete,
    /// The coroutine raised. A coroutine that receives [`Resume::Throw`] and
    /// has no handler must answer with `Raise` carrying the same exception,
    /// so the unwind can continue one level up.
    Raise(Exception),
}

impl Step {
    /// Plain yield: cede to the scheduler, be resumed next tick.
    pub fn plain() -> Self {
        Self::Yield(Yielded::Value(Value::None))
    }

    /// Yield a subcoroutine call frame.
    pub fn sub(coroutine: impl Coroutine + 'static) -> Self {
        Self::Yield(Yielded::Sub(Box::new(coroutine)))
    }

    /// Yield an asynchronous call, suspending the task until it wakes.
    pub fn call(call: impl AsynchronousCall + 'static) -> Self {
        Self::Yield(Yielded::Async(Box::new(call)))
    }

    /// Yield a `Return` envelope, terminating this (sub)coroutine.
    pub fn ret(envelope: Return) -> Self {
        Self::Yield(Yielded::Return(envelope))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yield(y) => f.debug_tuple("Yield").field(y).finish(),
            Self::Complete => write!(f, "Complete"),
            Self::Raise(exc) => f.debug_tuple("Raise").field(exc).finish(),
        }
    }
}

/// A resumable routine driven by a task.
///
/// Implementors hold their own state and advance it on every [`resume`]:
///
/// - on `Resume::Send(v)`, continue from the last suspension point with `v`
///   injected (the result of a completed subcoroutine or asynchronous call);
/// - on `Resume::Throw(e)`, either handle `e` and continue, or propagate it
///   by returning [`Step::Raise`] with the same exception.
///
/// [`resume`]: Coroutine::resume
pub trait Coroutine {
    /// Advances the coroutine by one step.
    fn resume(&mut self, input: Resume) -> Step;

    /// Display name used in backtrace frames and traces.
    fn name(&self) -> &str {
        "<coroutine>"
    }

    /// Current source location, used when synthesising backtrace frames.
    fn location(&self) -> CodeLoc {
        CodeLoc::UNKNOWN
    }
}

/// A coroutine built from a closure. See [`from_fn`].
pub struct FnCoroutine<F> {
    name: String,
    loc: CodeLoc,
    f: F,
}

impl<F> FnCoroutine<F> {
    /// Attaches a source location for backtrace frames.
    pub fn located(mut self, loc: CodeLoc) -> Self {
        self.loc = loc;
        self
    }
}

impl<F: FnMut(Resume) -> Step> Coroutine for FnCoroutine<F> {
    fn resume(&mut self, input: Resume) -> Step {
        (self.f)(input)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> CodeLoc {
        self.loc
    }
}

/// Builds a coroutine from a closure over mutable state.
///
/// The closure is called once per resumption. It must uphold the
/// [`Coroutine`] contract: an unhandled [`Resume::Throw`] must come back as
/// [`Step::Raise`] with the same exception.
///
/// # Example
/// ```
/// use weft::{from_fn, Resume, Return, Step};
///
/// let mut ticks = 0;
/// let co = from_fn("three_ticks", move |input| {
///     if let Resume::Throw(exc) = input {
///         return Step::Raise(exc);
///     }
///     ticks += 1;
///     if ticks < 3 { Step::plain() } else { Step::ret(Return::of(ticks)) }
/// });
/// ```
pub fn from_fn<F: FnMut(Resume) -> Step>(name: impl Into<String>, f: F) -> FnCoroutine<F> {
    FnCoroutine {
        name: name.into(),
        loc: CodeLoc::UNKNOWN,
        f,
    }
}
