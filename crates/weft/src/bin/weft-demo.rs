//! Demo: a handful of tasks mixing sleeps, subcoroutine calls, multi-value
//! returns and exception handling, driven by the [`MiniLoop`] host.
//!
//! Each task sleeps a random while, then calls two subcoroutines (one of
//! which sometimes raises) and either handles the exception or delivers a
//! four-value envelope to its done notification.

use rand::Rng;
use weft::{
    CodeLoc, Coroutine, Exception, MiniLoop, Resume, Return, Scheduler, Sleep, Step, Value,
};

/// Yields a single-value envelope on its first resumption.
struct ValueReturner {
    name: String,
}

impl Coroutine for ValueReturner {
    fn resume(&mut self, input: Resume) -> Step {
        match input {
            Resume::Send(_) => {
                println!("{} value_returner()", self.name);
                Step::ret(Return::of("value_returner!"))
            }
            Resume::Throw(exc) => Step::Raise(exc),
        }
    }

    fn name(&self) -> &str {
        "value_returner"
    }

    fn location(&self) -> CodeLoc {
        CodeLoc::new(file!(), line!())
    }
}

/// Yields a two-value envelope, or raises about a third of the time.
struct MultipleValueReturner {
    name: String,
}

impl Coroutine for MultipleValueReturner {
    fn resume(&mut self, input: Resume) -> Step {
        match input {
            Resume::Send(_) => {
                println!("{} multiple_value_returner()", self.name);
                if rand::thread_rng().gen_range(0..3) == 0 {
                    return Step::Raise(Exception::error("multiple_value_returner ooops!"));
                }
                Step::ret(Return::of(Value::Tuple(vec![
                    Value::from("multiple_value_returner!"),
                    Value::Int(2),
                ])))
            }
            Resume::Throw(exc) => Step::Raise(exc),
        }
    }

    fn name(&self) -> &str {
        "multiple_value_returner"
    }

    fn location(&self) -> CodeLoc {
        CodeLoc::new(file!(), line!())
    }
}

#[derive(Clone, Copy)]
enum DemoState {
    Start,
    Sleeping,
    AwaitingPair,
    AwaitingValue,
}

/// The top-level demo coroutine: sleep, call both subcoroutines, handle or
/// report what came back.
struct SubcoroutinesTest {
    name: String,
    state: DemoState,
    pair: Vec<Value>,
}

impl SubcoroutinesTest {
    fn new(name: String) -> Self {
        Self {
            name,
            state: DemoState::Start,
            pair: Vec::new(),
        }
    }
}

impl Coroutine for SubcoroutinesTest {
    fn resume(&mut self, input: Resume) -> Step {
        match (self.state, input) {
            (DemoState::Start, Resume::Send(_)) => {
                let ms = rand::thread_rng().gen_range(1000..=2000);
                println!("{} sleep({ms})", self.name);
                self.state = DemoState::Sleeping;
                Step::call(Sleep::new(ms))
            }
            (DemoState::Sleeping, Resume::Send(_)) => {
                println!("{} subcoroutines_test()", self.name);
                self.state = DemoState::AwaitingPair;
                Step::sub(MultipleValueReturner {
                    name: self.name.clone(),
                })
            }
            (DemoState::AwaitingPair, Resume::Send(Value::Tuple(items))) => {
                self.pair = items;
                self.state = DemoState::AwaitingValue;
                Step::sub(ValueReturner {
                    name: self.name.clone(),
                })
            }
            (DemoState::AwaitingValue, Resume::Send(v)) => {
                let (v1, v2) = (self.pair[0].clone(), self.pair[1].clone());
                println!("{} v = {v}, v1 = {v1}, v2 = {v2}", self.name);
                Step::ret(Return::of(Value::Tuple(vec![
                    Value::from(self.name.clone()),
                    v,
                    v1,
                    v2,
                ])))
            }
            // The randomly failing subcoroutine is handled here; anything
            // else propagates.
            (DemoState::AwaitingPair, Resume::Throw(exc)) => {
                println!("{} exception '{exc}' handled!", self.name);
                Step::Complete
            }
            (_, Resume::Throw(exc)) => Step::Raise(exc),
            (_, Resume::Send(v)) => {
                println!("{} unexpected resume value {v}", self.name);
                Step::Complete
            }
        }
    }

    fn name(&self) -> &str {
        "subcoroutines_test"
    }

    fn location(&self) -> CodeLoc {
        CodeLoc::new(file!(), line!())
    }
}

fn main() {
    let host = MiniLoop::new();
    let scheduler = Scheduler::new(host.clone());

    let quitter = host.clone();
    scheduler.on_done(move || {
        println!("all tasks done");
        quitter.quit();
    });
    let on_fatal = host.clone();
    scheduler.on_uncaught(move |_| on_fatal.quit());

    for i in 0..3 {
        let task = scheduler.new_task(SubcoroutinesTest::new(format!("task {i}")));
        task.on_done(|envelope| println!("done: {}", envelope.value()));
    }

    host.run();
}
