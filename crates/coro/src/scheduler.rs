use std::{
    any::Any,
    cmp::Ordering,
    collections::{
        BinaryHeap,
        HashMap,
        VecDeque,
    },
    panic,
    sync::{
        atomic::{
            self,
            AtomicUsize,
        },
        Arc,
    },
    thread,
};

use crossbeam_channel::{
    Receiver,
    Sender,
};
use parking_lot::Mutex;
use sim_time::{
    Duration,
    TimePoint,
};

use crate::{
    coroutine::{
        coroutine_main,
        Coroutine,
        CoroutineCore,
        CoroutineId,
    },
    VirtualClock,
};

// Scenario bodies recurse shallowly; 1 MiB leaves plenty of headroom.
const COROUTINE_STACK_SIZE: usize = 1 << 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RunState {
    Ready,
    Running,
    Sleeping { until: TimePoint, ticket: u64 },
    SleepingForever,
    Exited,
}

pub(crate) struct SleepEntry {
    pub(crate) until: TimePoint,
    pub(crate) ticket: u64,
    pub(crate) core: Arc<CoroutineCore>,
}

impl PartialEq for SleepEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.until, self.ticket) == (other.until, other.ticket)
    }
}
impl Eq for SleepEntry {}
impl PartialOrd for SleepEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SleepEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the std max-heap acts as a min-heap; the ticket breaks
        // ties in insertion order.
        (other.until, other.ticket).cmp(&(self.until, self.ticket))
    }
}

/// Suspension/exit report from a coroutine thread. A panic payload is
/// rethrown on the scheduler's thread so test failures surface normally.
pub(crate) struct Event {
    pub(crate) panic: Option<Box<dyn Any + Send>>,
}

pub(crate) struct SchedState {
    pub(crate) clock: VirtualClock,
    pub(crate) run_queue: VecDeque<Arc<CoroutineCore>>,
    pub(crate) sleep_queue: BinaryHeap<SleepEntry>,
    pub(crate) states: HashMap<CoroutineId, RunState>,
    pub(crate) sleeping_forever: usize,
    pub(crate) next_ticket: u64,
}

impl SchedState {
    /// Pick the next coroutine to run, advancing the clock when the pick
    /// comes from the sleep queue. Returning `None` ends the scheduler loop.
    fn select_next(&mut self) -> Option<Arc<CoroutineCore>> {
        if let Some(core) = self.run_queue.pop_front() {
            self.states.insert(core.id, RunState::Running);
            return Some(core);
        }
        while let Some(entry) = self.sleep_queue.pop() {
            let live = matches!(
                self.states.get(&entry.core.id),
                Some(RunState::Sleeping { ticket, .. }) if *ticket == entry.ticket
            );
            if !live {
                // Woken (or re-slept) since this entry was pushed.
                continue;
            }
            if entry.until == TimePoint::END_OF_EPOCH {
                self.states
                    .insert(entry.core.id, RunState::SleepingForever);
                self.sleeping_forever += 1;
                self.clock.jump_to_end_of_epoch();
                return None;
            }
            self.clock.advance_to(entry.until);
            self.states.insert(entry.core.id, RunState::Running);
            return Some(entry.core);
        }
        if self.sleeping_forever > 0 {
            self.clock.jump_to_end_of_epoch();
        }
        None
    }
}

pub(crate) struct SchedulerShared {
    pub(crate) state: Mutex<SchedState>,
    pub(crate) events_tx: Sender<Event>,
    pub(crate) events_rx: Receiver<Event>,
}

/// Drives coroutines until every one has exited or is sleeping to infinity.
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    coroutines: Mutex<Vec<Arc<CoroutineCore>>>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
    next_id: AtomicUsize,
}

impl Scheduler {
    pub fn new() -> Self {
        let (events_tx, events_rx) = crossbeam_channel::bounded(1);
        let shared = SchedulerShared {
            state: Mutex::new(SchedState {
                clock: VirtualClock::new(),
                run_queue: VecDeque::new(),
                sleep_queue: BinaryHeap::new(),
                states: HashMap::new(),
                sleeping_forever: 0,
                next_ticket: 0,
            }),
            events_tx,
            events_rx,
        };
        Scheduler {
            shared: Arc::new(shared),
            coroutines: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn now(&self) -> TimePoint {
        self.shared.state.lock().clock.now()
    }

    /// Duration until `until` on the virtual clock; zero if already past.
    pub fn time_until(&self, until: TimePoint) -> Duration {
        let now = self.now();
        if until <= now {
            Duration::ZERO
        } else {
            until - now
        }
    }

    /// Create a coroutine and append it to the run queue. The body does not
    /// run until [`Scheduler::run`].
    pub fn spawn<F>(&self, name: &str, f: F) -> Coroutine
    where
        F: FnOnce(Coroutine) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, atomic::Ordering::SeqCst);
        let core = CoroutineCore::new(id, name.to_owned());
        {
            let mut st = self.shared.state.lock();
            st.states.insert(id, RunState::Ready);
            st.run_queue.push_back(core.clone());
        }
        let handle = Coroutine {
            core: core.clone(),
            shared: self.shared.clone(),
        };
        let thread_handle = handle.clone();
        let join = thread::Builder::new()
            .name(format!("coro-{name}"))
            .stack_size(COROUTINE_STACK_SIZE)
            .spawn(move || coroutine_main(thread_handle, f))
            .expect("failed to spawn coroutine thread");
        self.coroutines.lock().push(core);
        self.threads.lock().push(join);
        handle
    }

    /// The scheduler loop: resume the selected coroutine, block until it
    /// suspends or exits, repeat. Panics from coroutine bodies are rethrown
    /// here.
    pub fn run(&self) {
        loop {
            let next = self.shared.state.lock().select_next();
            let Some(core) = next else {
                break;
            };
            {
                let tx = core.resume_tx.lock();
                tx.as_ref()
                    .expect("coroutine already torn down")
                    .send(())
                    .expect("coroutine thread went away");
            }
            let event = self
                .shared
                .events_rx
                .recv()
                .expect("coroutine thread hung up without reporting");
            if let Some(payload) = event.panic {
                panic::resume_unwind(payload);
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Release every thread still blocked on its resume channel, then join
        // them all.
        for core in self.coroutines.lock().drain(..) {
            core.resume_tx.lock().take();
        }
        for handle in self.threads.lock().drain(..) {
            if let Err(e) = handle.join() {
                tracing::error!("coroutine thread panicked during teardown: {e:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    };

    use parking_lot::Mutex;
    use sim_time::Duration;

    use super::Scheduler;

    #[test]
    fn test_yield_runs_to_completion() {
        let scheduler = Scheduler::new();
        let reached = Arc::new(AtomicBool::new(false));
        let flag = reached.clone();
        scheduler.spawn("a", move |coro| {
            coro.yield_now();
            flag.store(true, Ordering::SeqCst);
        });
        scheduler.run();
        assert!(reached.load(Ordering::SeqCst));
        assert_eq!(scheduler.now().as_millis(), 0);
    }

    #[test]
    fn test_two_yielding_coroutines_interleave() {
        let scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b"] {
            let order = order.clone();
            scheduler.spawn(name, move |coro| {
                order.lock().push(format!("{name}1"));
                coro.yield_now();
                order.lock().push(format!("{name}2"));
            });
        }
        scheduler.run();
        assert_eq!(*order.lock(), vec!["a1", "b1", "a2", "b2"]);
        assert_eq!(scheduler.now().as_millis(), 0);
    }

    #[test]
    fn test_wait_advances_clock() {
        let scheduler = Scheduler::new();
        scheduler.spawn("a", |coro| {
            let timeout = coro.wait(Duration::milliseconds(100));
            assert!(timeout);
        });
        scheduler.run();
        assert_eq!(scheduler.now().as_millis(), 100);
    }

    #[test]
    fn test_sleepers_resume_in_due_order() {
        let scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (name, ms) in [("slow", 100i64), ("fast", 10)] {
            let order = order.clone();
            scheduler.spawn(name, move |coro| {
                coro.wait(Duration::milliseconds(ms));
                order.lock().push(name);
            });
        }
        scheduler.run();
        assert_eq!(*order.lock(), vec!["fast", "slow"]);
        assert_eq!(scheduler.now().as_millis(), 100);
    }

    #[test]
    fn test_same_due_time_is_fifo() {
        let scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = order.clone();
            scheduler.spawn(name, move |coro| {
                coro.wait(Duration::milliseconds(5));
                order.lock().push(name);
            });
        }
        scheduler.run();
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_wakeup_cuts_wait_short() {
        let scheduler = Scheduler::new();
        let sleeper = scheduler.spawn("slpr", |coro| {
            let timeout = coro.wait(Duration::seconds(100));
            assert!(!timeout, "woken explicitly, not by timeout");
            assert_eq!(coro.now().as_millis(), 30);
        });
        scheduler.spawn("wakr", move |coro| {
            coro.wait(Duration::milliseconds(30));
            assert!(sleeper.is_waiting());
            assert!(sleeper.wakeup());
        });
        scheduler.run();
        assert_eq!(scheduler.now().as_millis(), 30);
    }

    #[test]
    fn test_infinite_sleeper_moves_clock_to_end_of_epoch() {
        let scheduler = Scheduler::new();
        scheduler.spawn("a", |coro| {
            coro.wait(Duration::INFINITY);
            unreachable!("never woken");
        });
        scheduler.run();
        assert_eq!(scheduler.now(), sim_time::TimePoint::END_OF_EPOCH);
    }

    #[test]
    fn test_wakeup_of_running_coroutine_is_noop() {
        let scheduler = Scheduler::new();
        scheduler.spawn("a", |coro| {
            assert!(!coro.wakeup());
        });
        scheduler.run();
    }

    #[test]
    #[should_panic(expected = "scenario failed")]
    fn test_panic_propagates_to_scheduler_thread() {
        let scheduler = Scheduler::new();
        scheduler.spawn("a", |coro| {
            coro.wait(Duration::milliseconds(1));
            panic!("scenario failed");
        });
        scheduler.run();
    }
}
