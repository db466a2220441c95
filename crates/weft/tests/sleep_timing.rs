//! Timing behaviour of the canonical `Sleep` call against the real host.

use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

use weft::{MiniLoop, Resume, Scheduler, Sleep, Step, from_fn};

/// A coroutine that sleeps once and completes.
fn sleeper(ms: u64) -> impl weft::Coroutine {
    let mut slept = false;
    from_fn(format!("sleeper_{ms}"), move |input| {
        if let Resume::Throw(exc) = input {
            return Step::Raise(exc);
        }
        if slept {
            Step::Complete
        } else {
            slept = true;
            Step::call(Sleep::new(ms))
        }
    })
}

#[test]
fn sleep_durations_are_honoured() {
    let host = MiniLoop::new();
    let scheduler = Scheduler::new(host.clone());

    let finishes: Rc<RefCell<Vec<(u64, Duration)>>> = Rc::new(RefCell::new(Vec::new()));
    let start = Instant::now();

    for ms in [10_u64, 0, 300, 100] {
        let task = scheduler.new_task(sleeper(ms));
        let finishes = Rc::clone(&finishes);
        task.on_done(move |_| finishes.borrow_mut().push((ms, start.elapsed())));
    }
    host.run();

    let finishes = finishes.borrow();
    assert_eq!(finishes.len(), 4);
    for (ms, elapsed) in finishes.iter() {
        let requested = Duration::from_millis(*ms);
        assert!(
            *elapsed >= requested,
            "sleeper_{ms} finished after {elapsed:?}, before its deadline"
        );
        // Generous slack for host timer jitter.
        assert!(
            *elapsed < requested + Duration::from_millis(20),
            "sleeper_{ms} lagged its deadline: {elapsed:?}"
        );
    }
}

#[test]
fn sleepers_finish_in_deadline_order() {
    let host = MiniLoop::new();
    let scheduler = Scheduler::new(host.clone());

    let order: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
    for ms in [60_u64, 20, 40] {
        let task = scheduler.new_task(sleeper(ms));
        let order = Rc::clone(&order);
        task.on_done(move |_| order.borrow_mut().push(ms));
    }
    host.run();

    assert_eq!(*order.borrow(), vec![20, 40, 60]);
}
