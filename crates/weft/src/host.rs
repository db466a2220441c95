//! The host event loop contract, and a minimal host for demos and tests.
//!
//! The scheduler does not own an event loop; it is embedded in one. All it
//! requires from the host is captured by [`EventHost`]: one-shot timers and
//! a repeating zero-delay tick, both delivering callbacks on the host's own
//! thread. Real applications wire these to their GUI or I/O loop;
//! [`MiniLoop`] is a small self-contained host good enough to run demos and
//! timing tests.

use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::BinaryHeap,
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use ahash::AHashMap;

/// Whether a tick callback wants to keep firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Deliver the tick again on the next loop cycle.
    Continue,
    /// Kill the tick; the callback is dropped.
    Stop,
}

/// What the scheduler requires from its host event loop.
///
/// Both primitives deliver their callbacks on the host loop's thread; no
/// cross-thread marshalling happens anywhere in this crate. An external
/// event source that completes on another thread must hop back onto the
/// host thread before waking a task.
pub trait EventHost {
    /// Arms a one-shot timer: `callback` runs once, no earlier than `delay`
    /// from now.
    fn start_timer(&self, delay: Duration, callback: Box<dyn FnOnce()>);

    /// Arms a repeating zero-delay tick: `callback` runs once per loop cycle
    /// until it returns [`TickAction::Stop`].
    fn start_tick(&self, callback: Box<dyn FnMut() -> TickAction>);
}

/// Pause between loop cycles while ticks are armed, so a scheduler waiting
/// on a timer does not peg a core.
const IDLE_PAUSE: Duration = Duration::from_micros(100);

struct TimerEntry {
    deadline: Instant,
    /// Registration order; breaks deadline ties so equal timers fire FIFO.
    seq: u64,
    callback: Box<dyn FnOnce()>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so the BinaryHeap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

type TickCallback = Box<dyn FnMut() -> TickAction>;

struct LoopInner {
    timers: BinaryHeap<TimerEntry>,
    /// Armed ticks by id. The slot is `None` while its callback is running,
    /// which keeps re-entrant arming from the callback well-defined.
    ticks: AHashMap<u64, Option<TickCallback>>,
    next_id: u64,
    quit: bool,
}

/// A minimal single-threaded event loop.
///
/// Runs timers from a deadline heap and zero-delay ticks in arming order,
/// sleeping when only future timers remain. [`run`] returns when
/// [`quit`] is called or when no timer and no tick is left.
///
/// Handles are cheap clones sharing one loop; callbacks may freely arm new
/// timers and ticks or call `quit` from inside the loop.
///
/// [`run`]: MiniLoop::run
/// [`quit`]: MiniLoop::quit
#[derive(Clone)]
pub struct MiniLoop {
    inner: Rc<RefCell<LoopInner>>,
}

impl Default for MiniLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl MiniLoop {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(LoopInner {
                timers: BinaryHeap::new(),
                ticks: AHashMap::new(),
                next_id: 0,
                quit: false,
            })),
        }
    }

    /// Asks a running [`run`](MiniLoop::run) to return at the next cycle.
    pub fn quit(&self) {
        self.inner.borrow_mut().quit = true;
    }

    /// Drives the loop until [`quit`](MiniLoop::quit) or until no work
    /// remains.
    pub fn run(&self) {
        self.inner.borrow_mut().quit = false;

        loop {
            if self.inner.borrow().quit {
                break;
            }
            self.fire_due_timers();
            let ran_tick = self.run_ticks();

            enum Wait {
                Done,
                Until(Instant),
                Pause,
            }

            let wait = {
                let inner = self.inner.borrow();
                if inner.quit {
                    Wait::Done
                } else if ran_tick || !inner.ticks.is_empty() {
                    Wait::Pause
                } else {
                    match inner.timers.peek() {
                        Some(entry) => Wait::Until(entry.deadline),
                        None => Wait::Done,
                    }
                }
            };

            match wait {
                Wait::Done => break,
                Wait::Until(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                }
                Wait::Pause => thread::sleep(IDLE_PAUSE),
            }
        }
    }

    fn fire_due_timers(&self) {
        loop {
            let due = {
                let mut inner = self.inner.borrow_mut();
                if inner.quit {
                    return;
                }
                let is_due = inner
                    .timers
                    .peek()
                    .is_some_and(|entry| entry.deadline <= Instant::now());
                if is_due { inner.timers.pop() } else { None }
            };
            match due {
                Some(entry) => (entry.callback)(),
                None => return,
            }
        }
    }

    fn run_ticks(&self) -> bool {
        let mut ids: Vec<u64> = self.inner.borrow().ticks.keys().copied().collect();
        ids.sort_unstable();

        let mut ran = false;
        for id in ids {
            if self.inner.borrow().quit {
                break;
            }
            let taken = self
                .inner
                .borrow_mut()
                .ticks
                .get_mut(&id)
                .and_then(Option::take);
            let Some(mut callback) = taken else { continue };

            let action = callback();
            ran = true;

            let mut inner = self.inner.borrow_mut();
            match action {
                TickAction::Continue => {
                    if let Some(slot) = inner.ticks.get_mut(&id) {
                        *slot = Some(callback);
                    }
                }
                TickAction::Stop => {
                    inner.ticks.remove(&id);
                }
            }
        }
        ran
    }
}

impl EventHost for MiniLoop {
    fn start_timer(&self, delay: Duration, callback: Box<dyn FnOnce()>) {
        let mut inner = self.inner.borrow_mut();
        let seq = inner.next_id;
        inner.next_id += 1;
        inner.timers.push(TimerEntry {
            deadline: Instant::now() + delay,
            seq,
            callback,
        });
    }

    fn start_tick(&self, callback: Box<dyn FnMut() -> TickAction>) {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.ticks.insert(id, Some(callback));
    }
}
