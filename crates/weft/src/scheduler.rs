//! The scheduler: a ready queue of tasks multiplexed onto a host event loop.
//!
//! On every host tick the scheduler runs one bounded batch: it pops tasks
//! from the far end of the ready queue, steps each briefly, and either
//! re-queues it, parks it on an asynchronous call, or drops it on
//! completion. Batches are bounded both in step count and in wall-clock
//! time, so non-coroutine host work (redraws, timers, I/O callbacks) keeps
//! getting its share of the thread.
//!
//! Newly scheduled and freshly woken tasks enter the near end of the queue
//! while the batch pops from the far end: runnable tasks are served FIFO,
//! but fresh work is served before the next round of already-runnable
//! tasks, a mild preference for responsiveness.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt, mem,
    rc::{Rc, Weak},
    time::{Duration, Instant},
};

use crate::{
    call::CallContext,
    coroutine::Coroutine,
    exception::CoException,
    host::{EventHost, TickAction},
    task::{StepOutcome, Task, TaskId},
    tracer::{NoopTracer, SchedTracer},
    value::Return,
};

/// Micro-steps one task may take per `step()` before ceding to the scheduler.
pub const MAX_TASK_ITERATIONS: usize = 3;

/// Tasks stepped per batch before control returns to the host loop.
pub const MAX_SCHEDULER_ITERATIONS: usize = 10;

/// A single step longer than this emits a long-iteration diagnostic and ends
/// the batch.
pub const MAX_ITERATION_TIME: Duration = Duration::from_millis(300);

/// Total batch time beyond which no further task is started this tick.
pub const AVERAGE_SCHEDULER_TIME: Duration = Duration::from_millis(30);

/// Tunable scheduler knobs. The defaults are the crate-level constants.
#[derive(Debug, Clone)]
pub struct SchedConfig {
    /// Micro-step budget per task step.
    pub max_task_iterations: usize,
    /// Task-step budget per batch.
    pub max_scheduler_iterations: usize,
    /// Long-iteration diagnostic threshold.
    pub max_iteration_time: Duration,
    /// Wall-clock budget per batch.
    pub average_scheduler_time: Duration,
    /// Print the formatted backtrace of exceptions that escape a task's
    /// top-level coroutine.
    pub print_uncaught: bool,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            max_task_iterations: MAX_TASK_ITERATIONS,
            max_scheduler_iterations: MAX_SCHEDULER_ITERATIONS,
            max_iteration_time: MAX_ITERATION_TIME,
            average_scheduler_time: AVERAGE_SCHEDULER_TIME,
            print_uncaught: true,
        }
    }
}

pub(crate) struct SchedulerInner {
    host: Rc<dyn EventHost>,
    config: SchedConfig,
    /// Runnable tasks. Near end = front, far end = back: `schedule` pushes
    /// front, the batch pops back.
    ready: VecDeque<Rc<RefCell<Task>>>,
    /// Whether the zero-delay tick is armed in the host loop. Armed exactly
    /// when `ready` is non-empty or at least one task is parked.
    tick_armed: bool,
    /// Tasks parked on an armed asynchronous call.
    parked: usize,
    /// Tasks created and not yet released.
    live_tasks: usize,
    next_task_id: u32,
    tracer: Box<dyn SchedTracer>,
    done_hooks: Vec<Box<dyn FnMut()>>,
    long_iteration_hooks: Vec<Box<dyn FnMut(Duration, TaskId)>>,
    uncaught_hooks: Vec<Box<dyn FnMut(&CoException)>>,
}

impl SchedulerInner {
    pub(crate) fn host(&self) -> &Rc<dyn EventHost> {
        &self.host
    }
}

/// A cooperative, single-threaded coroutine scheduler embedded in a host
/// event loop.
///
/// Cheap to clone; clones share one scheduler. All state lives on the host
/// loop's thread, and every callback (task completion, all-done, long
/// iteration, uncaught) is delivered there too.
///
/// # Example
/// ```
/// use weft::{from_fn, MiniLoop, Resume, Return, Scheduler, Step};
///
/// let host = MiniLoop::new();
/// let scheduler = Scheduler::new(host.clone());
///
/// let task = scheduler.new_task(from_fn("answer", |input| {
///     if let Resume::Throw(exc) = input {
///         return Step::Raise(exc);
///     }
///     Step::ret(Return::of(42i64))
/// }));
/// task.on_done(|envelope| println!("answer: {}", envelope.value()));
///
/// host.run();
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl Scheduler {
    /// Creates a scheduler embedded in the given host, with default
    /// configuration and no running tasks.
    pub fn new(host: impl EventHost + 'static) -> Self {
        Self::with_config(host, SchedConfig::default())
    }

    /// Creates a scheduler with explicit configuration.
    pub fn with_config(host: impl EventHost + 'static, config: SchedConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                host: Rc::new(host),
                config,
                ready: VecDeque::new(),
                tick_armed: false,
                parked: 0,
                live_tasks: 0,
                next_task_id: 0,
                tracer: Box::new(NoopTracer),
                done_hooks: Vec::new(),
                long_iteration_hooks: Vec::new(),
                uncaught_hooks: Vec::new(),
            })),
        }
    }

    /// Replaces the tracer. [`NoopTracer`] is installed by default.
    pub fn set_tracer(&self, tracer: impl SchedTracer + 'static) {
        self.inner.borrow_mut().tracer = Box::new(tracer);
    }

    /// Builds a task around `coroutine`, schedules it, and returns a handle
    /// whose completion notification the caller may observe.
    pub fn new_task(&self, coroutine: impl Coroutine + 'static) -> TaskHandle {
        self.new_task_boxed(Box::new(coroutine))
    }

    fn new_task_boxed(&self, coroutine: Box<dyn Coroutine>) -> TaskHandle {
        let task = {
            let mut inner = self.inner.borrow_mut();
            let id = TaskId::new(inner.next_task_id);
            inner.next_task_id += 1;
            inner.live_tasks += 1;
            inner.tracer.on_task_created(id);
            Rc::new(RefCell::new(Task::new(id, coroutine)))
        };
        let handle = TaskHandle {
            id: task.borrow().id(),
            task: Rc::downgrade(&task),
        };
        schedule(&self.inner, task);
        handle
    }

    /// Number of tasks created and not yet released.
    pub fn live_tasks(&self) -> usize {
        self.inner.borrow().live_tasks
    }

    /// Whether uncaught exceptions print their formatted backtrace.
    pub fn print_uncaught(&self) -> bool {
        self.inner.borrow().config.print_uncaught
    }

    /// Enables or disables the uncaught-exception report (default: enabled).
    pub fn set_print_uncaught(&self, print: bool) {
        self.inner.borrow_mut().config.print_uncaught = print;
    }

    /// Registers a hook fired every time the live-task count reaches zero.
    pub fn on_done(&self, hook: impl FnMut() + 'static) {
        self.inner.borrow_mut().done_hooks.push(Box::new(hook));
    }

    /// Registers a hook fired for every step that overran the
    /// long-iteration budget. Observational only: nothing is preempted.
    pub fn on_long_iteration(&self, hook: impl FnMut(Duration, TaskId) + 'static) {
        self.inner
            .borrow_mut()
            .long_iteration_hooks
            .push(Box::new(hook));
    }

    /// Registers a hook fired when an exception escapes a task's top-level
    /// coroutine. This is the channel through which scheduler-fatal
    /// exceptions surface to the host; the demo policy is to quit the loop.
    pub fn on_uncaught(&self, hook: impl FnMut(&CoException) + 'static) {
        self.inner.borrow_mut().uncaught_hooks.push(Box::new(hook));
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("ready", &inner.ready.len())
            .field("parked", &inner.parked)
            .field("live_tasks", &inner.live_tasks)
            .field("tick_armed", &inner.tick_armed)
            .finish()
    }
}

/// A handle to a scheduled task.
///
/// Holds no ownership: the scheduler releases the task when it finishes,
/// after which the handle only reports `is_finished() == true`.
pub struct TaskHandle {
    id: TaskId,
    task: Weak<RefCell<Task>>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Registers a completion observer, fired exactly once with the task's
    /// final envelope if the task terminates normally. Registering on an
    /// already-released task is a no-op.
    pub fn on_done(&self, hook: impl FnOnce(&Return) + 'static) {
        if let Some(task) = self.task.upgrade() {
            task.borrow_mut().push_done_hook(Box::new(hook));
        }
    }

    /// True once the task has terminated (normally or fatally) or been
    /// released.
    pub fn is_finished(&self) -> bool {
        match self.task.upgrade() {
            Some(task) => task.borrow().is_finished(),
            None => true,
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Enqueues a task at the near end of the ready queue and arms the host
/// tick if it had gone idle.
pub(crate) fn schedule(inner_rc: &Rc<RefCell<SchedulerInner>>, task: Rc<RefCell<Task>>) {
    let needs_arm = {
        let mut inner = inner_rc.borrow_mut();
        let id = task.borrow().id();
        inner.ready.push_front(task);
        inner.tracer.on_task_scheduled(id);
        !inner.tick_armed
    };
    if needs_arm {
        arm_tick(inner_rc);
    }
}

/// Re-queues a task whose asynchronous call completed.
pub(crate) fn wake_parked(inner_rc: &Rc<RefCell<SchedulerInner>>, task: Rc<RefCell<Task>>) {
    {
        let mut inner = inner_rc.borrow_mut();
        inner.parked = inner.parked.saturating_sub(1);
    }
    schedule(inner_rc, task);
}

/// Accounts for a parked task whose call was dropped without ever waking.
/// The task is gone; release it so the scheduler can still go idle.
pub(crate) fn abandon_parked(inner_rc: &Rc<RefCell<SchedulerInner>>) {
    {
        let mut inner = inner_rc.borrow_mut();
        inner.parked = inner.parked.saturating_sub(1);
    }
    release_accounting(inner_rc);
}

fn arm_tick(inner_rc: &Rc<RefCell<SchedulerInner>>) {
    let host = {
        let mut inner = inner_rc.borrow_mut();
        if inner.tick_armed {
            return;
        }
        inner.tick_armed = true;
        Rc::clone(&inner.host)
    };
    let weak = Rc::downgrade(inner_rc);
    host.start_tick(Box::new(move || match weak.upgrade() {
        Some(inner_rc) => run_batch(&inner_rc),
        None => TickAction::Stop,
    }));
}

/// One scheduler batch, driven by the host tick.
fn run_batch(inner_rc: &Rc<RefCell<SchedulerInner>>) -> TickAction {
    let config = inner_rc.borrow().config.clone();
    let batch_start = Instant::now();
    let mut last_step_end = batch_start;
    let mut timeout = false;
    let mut steps = 0_usize;
    let mut fatal: Option<CoException> = None;

    for _ in 0..config.max_scheduler_iterations {
        if timeout {
            break;
        }
        let Some(task_rc) = inner_rc.borrow_mut().ready.pop_back() else {
            break;
        };
        let task_id = task_rc.borrow().id();

        let outcome = task_rc.borrow_mut().step(config.max_task_iterations);
        steps += 1;
        inner_rc.borrow_mut().tracer.on_step(task_id, outcome.kind());

        let mut requeue: Option<Rc<RefCell<Task>>> = None;
        match outcome {
            StepOutcome::Pending => requeue = Some(task_rc),
            StepOutcome::Suspend(call) => {
                {
                    let mut inner = inner_rc.borrow_mut();
                    inner.parked += 1;
                    inner.tracer.on_call_armed(task_id, call.name());
                }
                let ctx = CallContext::new(task_rc, Rc::downgrade(inner_rc));
                call.arm(ctx);
            }
            StepOutcome::Finished(Ok(envelope)) => {
                inner_rc.borrow_mut().tracer.on_task_done(task_id);
                let hooks = task_rc.borrow_mut().take_done_hooks();
                for hook in hooks {
                    hook(&envelope);
                }
                drop(task_rc);
                release_accounting(inner_rc);
            }
            StepOutcome::Finished(Err(co)) => {
                inner_rc.borrow_mut().tracer.on_task_failed(task_id, &co);
                drop(task_rc);
                release_accounting(inner_rc);
                if config.print_uncaught {
                    eprint!("{}", co.render_report());
                }
                fatal = Some(co);
            }
        }

        // Measure after each step, before any re-queueing.
        let now = Instant::now();
        let step_time = now.duration_since(last_step_end);
        if step_time > config.max_iteration_time {
            inner_rc
                .borrow_mut()
                .tracer
                .on_long_iteration(task_id, step_time);
            emit_long_iteration(inner_rc, step_time, task_id);
            timeout = true;
        }
        if now.duration_since(batch_start) > config.average_scheduler_time {
            timeout = true;
        }
        last_step_end = now;

        if fatal.is_some() {
            break;
        }
        if let Some(task) = requeue {
            inner_rc.borrow_mut().ready.push_front(task);
        }
    }

    // A scheduler-fatal exception ends the batch; the remaining ready tasks
    // run on the next tick.
    if let Some(co) = fatal {
        emit_uncaught(inner_rc, &co);
    }

    let mut inner = inner_rc.borrow_mut();
    inner.tracer.on_batch_end(steps, timeout);
    if inner.ready.is_empty() && inner.parked == 0 {
        inner.tick_armed = false;
        inner.tracer.on_idle();
        TickAction::Stop
    } else {
        TickAction::Continue
    }
}

/// One task released: decrement the live count and fire the all-done
/// notification on the transition to zero. Further decrements from zero are
/// ignored.
fn release_accounting(inner_rc: &Rc<RefCell<SchedulerInner>>) {
    let became_zero = {
        let mut inner = inner_rc.borrow_mut();
        if inner.live_tasks > 0 {
            inner.live_tasks -= 1;
            inner.live_tasks == 0
        } else {
            false
        }
    };
    if became_zero {
        emit_all_done(inner_rc);
    }
}

// Hook emission takes the hook list out of the scheduler for the duration of
// the calls, so a hook may register further hooks without re-entering the
// borrow.

fn emit_all_done(inner_rc: &Rc<RefCell<SchedulerInner>>) {
    let mut hooks = mem::take(&mut inner_rc.borrow_mut().done_hooks);
    for hook in &mut hooks {
        hook();
    }
    let mut inner = inner_rc.borrow_mut();
    let added = mem::take(&mut inner.done_hooks);
    hooks.extend(added);
    inner.done_hooks = hooks;
}

fn emit_long_iteration(inner_rc: &Rc<RefCell<SchedulerInner>>, elapsed: Duration, task: TaskId) {
    let mut hooks = mem::take(&mut inner_rc.borrow_mut().long_iteration_hooks);
    for hook in &mut hooks {
        hook(elapsed, task);
    }
    let mut inner = inner_rc.borrow_mut();
    let added = mem::take(&mut inner.long_iteration_hooks);
    hooks.extend(added);
    inner.long_iteration_hooks = hooks;
}

fn emit_uncaught(inner_rc: &Rc<RefCell<SchedulerInner>>, co: &CoException) {
    let mut hooks = mem::take(&mut inner_rc.borrow_mut().uncaught_hooks);
    for hook in &mut hooks {
        hook(co);
    }
    let mut inner = inner_rc.borrow_mut();
    let added = mem::take(&mut inner.uncaught_hooks);
    hooks.extend(added);
    inner.uncaught_hooks = hooks;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        call::{AsynchronousCall, CallContext},
        coroutine::{from_fn, Resume, Step},
        exception::Exception,
        tracer::{RecordingTracer, TraceEvent},
        value::{Return, Value},
    };

    /// A host test double whose ticks and timers are pumped by hand.
    #[derive(Clone, Default)]
    struct ManualHost {
        inner: Rc<RefCell<ManualInner>>,
    }

    #[derive(Default)]
    struct ManualInner {
        ticks: Vec<Option<Box<dyn FnMut() -> TickAction>>>,
        timers: Vec<Box<dyn FnOnce()>>,
    }

    impl ManualHost {
        fn new() -> Self {
            Self::default()
        }

        /// Runs every armed tick once; true if any tick remains armed.
        fn pump_tick(&self) -> bool {
            let len = self.inner.borrow().ticks.len();
            for i in 0..len {
                let taken = self.inner.borrow_mut().ticks[i].take();
                let Some(mut callback) = taken else { continue };
                if callback() == TickAction::Continue {
                    self.inner.borrow_mut().ticks[i] = Some(callback);
                }
            }
            let mut inner = self.inner.borrow_mut();
            inner.ticks.retain(Option::is_some);
            !inner.ticks.is_empty()
        }

        /// Fires all pending timers, in registration order.
        fn fire_timers(&self) -> usize {
            let timers = mem::take(&mut self.inner.borrow_mut().timers);
            let count = timers.len();
            for callback in timers {
                callback();
            }
            count
        }

        fn armed_ticks(&self) -> usize {
            self.inner.borrow().ticks.len()
        }
    }

    impl EventHost for ManualHost {
        fn start_timer(&self, _delay: Duration, callback: Box<dyn FnOnce()>) {
            self.inner.borrow_mut().timers.push(callback);
        }

        fn start_tick(&self, callback: Box<dyn FnMut() -> TickAction>) {
            self.inner.borrow_mut().ticks.push(Some(callback));
        }
    }

    /// A coroutine that records its name on every resumption, yields plainly
    /// `plain_yields` times, then completes.
    fn recorder(
        name: &'static str,
        plain_yields: usize,
        log: Rc<RefCell<Vec<&'static str>>>,
    ) -> impl Coroutine {
        let mut resumed = 0;
        from_fn(name, move |input| {
            if let Resume::Throw(exc) = input {
                return Step::Raise(exc);
            }
            log.borrow_mut().push(name);
            resumed += 1;
            if resumed <= plain_yields {
                Step::plain()
            } else {
                Step::Complete
            }
        })
    }

    fn step_count(events: &[TraceEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, TraceEvent::Step(..)))
            .count()
    }

    #[test]
    fn runnable_tasks_are_served_fifo_and_fresh_tasks_first() {
        let host = ManualHost::new();
        let scheduler = Scheduler::new(host.clone());
        let log = Rc::new(RefCell::new(Vec::new()));

        // A spawns C on its first resumption; C should run before A's and
        // B's second turns.
        let spawner = scheduler.clone();
        let a_log = Rc::clone(&log);
        let c_log = Rc::clone(&log);
        let mut resumed = 0;
        let a = from_fn("a", move |input| {
            if let Resume::Throw(exc) = input {
                return Step::Raise(exc);
            }
            a_log.borrow_mut().push("a");
            resumed += 1;
            if resumed == 1 {
                spawner.new_task(recorder("c", 0, Rc::clone(&c_log)));
                Step::plain()
            } else {
                Step::Complete
            }
        });
        scheduler.new_task(a);
        scheduler.new_task(recorder("b", 1, Rc::clone(&log)));

        while host.pump_tick() {}

        assert_eq!(*log.borrow(), vec!["a", "b", "c", "a", "b"]);
        assert_eq!(scheduler.live_tasks(), 0);
    }

    #[test]
    fn batch_is_bounded_by_max_scheduler_iterations() {
        let host = ManualHost::new();
        let scheduler = Scheduler::new(host.clone());
        let tracer = RecordingTracer::new();
        let events = tracer.events();
        scheduler.set_tracer(tracer);

        let log = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..12 {
            // Effectively endless: far more plain yields than pumped batches.
            scheduler.new_task(recorder("spin", 1000, Rc::clone(&log)));
        }

        host.pump_tick();
        assert_eq!(step_count(&events.borrow()), 10);

        host.pump_tick();
        assert_eq!(step_count(&events.borrow()), 20);
    }

    /// An asynchronous call that stashes its wake context for the test to
    /// fire later.
    struct HoldCall {
        slot: Rc<RefCell<Option<CallContext>>>,
    }

    impl AsynchronousCall for HoldCall {
        fn arm(self: Box<Self>, ctx: CallContext) {
            *self.slot.borrow_mut() = Some(ctx);
        }

        fn name(&self) -> &str {
            "HoldCall"
        }
    }

    #[test]
    fn parked_task_is_not_in_the_ready_queue() {
        let host = ManualHost::new();
        let scheduler = Scheduler::new(host.clone());
        let tracer = RecordingTracer::new();
        let events = tracer.events();
        scheduler.set_tracer(tracer);

        let slot = Rc::new(RefCell::new(None));
        let call_slot = Rc::clone(&slot);
        let mut suspended = false;
        scheduler.new_task(from_fn("parker", move |input| match input {
            Resume::Send(value) if suspended => {
                assert_eq!(value, Value::Int(7));
                Step::ret(Return::of(value))
            }
            Resume::Send(_) => {
                suspended = true;
                Step::call(HoldCall {
                    slot: Rc::clone(&call_slot),
                })
            }
            Resume::Throw(exc) => Step::Raise(exc),
        }));

        assert!(host.pump_tick(), "tick stays armed while a task is parked");
        // Pump again: the parked task must not be stepped.
        host.pump_tick();
        assert_eq!(step_count(&events.borrow()), 1);
        assert_eq!(scheduler.live_tasks(), 1);

        let ctx = slot.borrow_mut().take().expect("call was armed");
        ctx.wake(Value::Int(7));
        while host.pump_tick() {}

        assert_eq!(step_count(&events.borrow()), 2);
        assert_eq!(scheduler.live_tasks(), 0);
        assert!(events.borrow().contains(&TraceEvent::Idle));
    }

    #[test]
    fn all_done_fires_once_when_live_tasks_reach_zero() {
        let host = ManualHost::new();
        let scheduler = Scheduler::new(host.clone());

        let done = Rc::new(RefCell::new(0));
        let done_count = Rc::clone(&done);
        scheduler.on_done(move || *done_count.borrow_mut() += 1);

        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.new_task(recorder("x", 1, Rc::clone(&log)));
        scheduler.new_task(recorder("y", 2, Rc::clone(&log)));

        while host.pump_tick() {}

        assert_eq!(*done.borrow(), 1);
        assert_eq!(scheduler.live_tasks(), 0);
    }

    #[test]
    fn tick_disarms_when_idle_and_rearms_on_new_work() {
        let host = ManualHost::new();
        let scheduler = Scheduler::new(host.clone());
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.new_task(recorder("first", 0, Rc::clone(&log)));
        assert_eq!(host.armed_ticks(), 1);
        while host.pump_tick() {}
        assert_eq!(host.armed_ticks(), 0);

        scheduler.new_task(recorder("second", 0, Rc::clone(&log)));
        assert_eq!(host.armed_ticks(), 1);
        while host.pump_tick() {}

        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn long_iteration_is_diagnosed_and_ends_the_batch() {
        let host = ManualHost::new();
        let scheduler = Scheduler::with_config(
            host.clone(),
            SchedConfig {
                max_iteration_time: Duration::from_millis(1),
                ..SchedConfig::default()
            },
        );
        let tracer = RecordingTracer::new();
        let events = tracer.events();
        scheduler.set_tracer(tracer);

        let reports = Rc::new(RefCell::new(Vec::new()));
        let report_log = Rc::clone(&reports);
        scheduler.on_long_iteration(move |elapsed, task| {
            report_log.borrow_mut().push((elapsed, task));
        });

        let slow = from_fn("slow", |input| {
            if let Resume::Throw(exc) = input {
                return Step::Raise(exc);
            }
            std::thread::sleep(Duration::from_millis(5));
            Step::Complete
        });
        let slow_task = scheduler.new_task(slow);
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.new_task(recorder("other", 0, log));

        host.pump_tick();
        // The slow step is diagnosed and the batch ends before "other" runs.
        assert_eq!(step_count(&events.borrow()), 1);
        {
            let reports = reports.borrow();
            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].1, slow_task.id());
            assert!(reports[0].0 >= Duration::from_millis(5));
        }

        while host.pump_tick() {}
        assert_eq!(scheduler.live_tasks(), 0);
    }

    #[test]
    fn batch_time_budget_ends_the_batch_early() {
        let host = ManualHost::new();
        let scheduler = Scheduler::with_config(
            host.clone(),
            SchedConfig {
                average_scheduler_time: Duration::ZERO,
                ..SchedConfig::default()
            },
        );
        let tracer = RecordingTracer::new();
        let events = tracer.events();
        scheduler.set_tracer(tracer);

        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.new_task(recorder("p", 3, Rc::clone(&log)));
        scheduler.new_task(recorder("q", 3, Rc::clone(&log)));

        // A zero budget times out after every step: one step per batch.
        host.pump_tick();
        assert_eq!(step_count(&events.borrow()), 1);
        host.pump_tick();
        assert_eq!(step_count(&events.borrow()), 2);
    }

    /// A call that drops its context without waking.
    struct LeakyCall;

    impl AsynchronousCall for LeakyCall {
        fn arm(self: Box<Self>, ctx: CallContext) {
            drop(ctx);
        }
    }

    #[test]
    fn abandoned_call_releases_the_parked_task() {
        let host = ManualHost::new();
        let scheduler = Scheduler::new(host.clone());

        let done = Rc::new(RefCell::new(0));
        let done_count = Rc::clone(&done);
        scheduler.on_done(move || *done_count.borrow_mut() += 1);

        let mut armed = false;
        scheduler.new_task(from_fn("leaker", move |input| {
            if let Resume::Throw(exc) = input {
                return Step::Raise(exc);
            }
            if armed {
                panic!("never resumed after an abandoned call");
            }
            armed = true;
            Step::call(LeakyCall)
        }));

        while host.pump_tick() {}

        assert_eq!(scheduler.live_tasks(), 0);
        assert_eq!(*done.borrow(), 1);
        assert_eq!(host.armed_ticks(), 0);
    }

    #[test]
    fn fatal_task_ends_the_batch_but_not_its_siblings() {
        let host = ManualHost::new();
        let scheduler = Scheduler::new(host.clone());
        scheduler.set_print_uncaught(false);

        let uncaught = Rc::new(RefCell::new(Vec::new()));
        let uncaught_log = Rc::clone(&uncaught);
        scheduler.on_uncaught(move |co| {
            uncaught_log.borrow_mut().push(co.orig().clone());
        });

        scheduler.new_task(from_fn("failer", |input| match input {
            Resume::Send(_) => Step::Raise(Exception::error("boom")),
            Resume::Throw(exc) => Step::Raise(exc),
        }));
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.new_task(recorder("survivor", 1, Rc::clone(&log)));

        while host.pump_tick() {}

        assert_eq!(*uncaught.borrow(), vec![Exception::error("boom")]);
        // The sibling still ran to completion on later ticks.
        assert_eq!(*log.borrow(), vec!["survivor", "survivor"]);
        assert_eq!(scheduler.live_tasks(), 0);
    }

    #[test]
    fn sleep_parks_until_the_host_timer_fires() {
        let host = ManualHost::new();
        let scheduler = Scheduler::new(host.clone());

        let mut slept = false;
        let finished = Rc::new(RefCell::new(false));
        let finished_flag = Rc::clone(&finished);
        let task = scheduler.new_task(from_fn("napper", move |input| {
            if let Resume::Throw(exc) = input {
                return Step::Raise(exc);
            }
            if slept {
                Step::Complete
            } else {
                slept = true;
                Step::call(crate::call::Sleep::new(50))
            }
        }));
        task.on_done(move |_| *finished_flag.borrow_mut() = true);

        host.pump_tick();
        assert!(!task.is_finished());
        assert_eq!(host.fire_timers(), 1);
        while host.pump_tick() {}

        assert!(*finished.borrow());
        assert!(task.is_finished());
    }
}
