use std::{
    any::Any,
    panic::{
        self,
        AssertUnwindSafe,
    },
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    thread::ThreadId,
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

use crate::scheduler::{
    Event,
    RunState,
    SchedulerShared,
    SleepEntry,
};

pub type CoroutineId = usize;

/// Payload used to unwind a coroutine thread out of its user code when the
/// scheduler goes away. Raised with `resume_unwind` so the panic hook stays
/// silent, and swallowed by the thread entry point.
pub(crate) struct ShutdownSignal;

pub(crate) struct CoroutineCore {
    pub(crate) id: CoroutineId,
    pub(crate) name: String,
    /// Set between entering `wait` and the wake cause being decided. `wait`
    /// returns true (timeout) iff the flag is still set on resume.
    waiting: AtomicBool,
    /// Taken (and dropped) at scheduler teardown to release a thread that is
    /// still suspended.
    pub(crate) resume_tx: Mutex<Option<Sender<()>>>,
    pub(crate) resume_rx: Receiver<()>,
    thread: Mutex<Option<ThreadId>>,
}

impl CoroutineCore {
    pub(crate) fn new(id: CoroutineId, name: String) -> Arc<Self> {
        let (resume_tx, resume_rx) = crossbeam_channel::bounded(1);
        Arc::new(CoroutineCore {
            id,
            name,
            waiting: AtomicBool::new(false),
            resume_tx: Mutex::new(Some(resume_tx)),
            resume_rx,
            thread: Mutex::new(None),
        })
    }
}

/// Handle to one cooperative task. Cloneable; `wait` and `yield_now` must be
/// called from the task's own thread, `wakeup` from anywhere else.
#[derive(Clone)]
pub struct Coroutine {
    pub(crate) core: Arc<CoroutineCore>,
    pub(crate) shared: Arc<SchedulerShared>,
}

impl Coroutine {
    pub fn id(&self) -> CoroutineId {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn now(&self) -> TimePoint {
        self.shared.state.lock().clock.now()
    }

    pub fn is_waiting(&self) -> bool {
        self.core.waiting.load(Ordering::SeqCst)
    }

    /// Suspend until `duration` of simulated time elapsed or someone calls
    /// [`Coroutine::wakeup`]. Returns true iff the wake cause was the
    /// timeout. `Duration::INFINITY` never times out.
    pub fn wait(&self, duration: Duration) -> bool {
        self.assert_own_thread();
        self.core.waiting.store(true, Ordering::SeqCst);
        {
            let mut st = self.shared.state.lock();
            if duration.is_infinite() {
                st.states.insert(self.core.id, RunState::SleepingForever);
                st.sleeping_forever += 1;
            } else {
                let until = st.clock.now() + duration;
                let ticket = st.next_ticket;
                st.next_ticket += 1;
                st.states
                    .insert(self.core.id, RunState::Sleeping { until, ticket });
                st.sleep_queue.push(SleepEntry {
                    until,
                    ticket,
                    core: self.core.clone(),
                });
            }
        }
        self.suspend();
        self.core.waiting.swap(false, Ordering::SeqCst)
    }

    /// Move to the tail of the run queue and suspend.
    pub fn yield_now(&self) {
        self.assert_own_thread();
        {
            let mut st = self.shared.state.lock();
            st.states.insert(self.core.id, RunState::Ready);
            st.run_queue.push_back(self.core.clone());
        }
        self.suspend();
    }

    /// Wake a waiting coroutine, returning it to the run queue. No-op (false)
    /// if the coroutine is not currently waiting.
    pub fn wakeup(&self) -> bool {
        if !self.core.waiting.swap(false, Ordering::SeqCst) {
            return false;
        }
        let mut st = self.shared.state.lock();
        match st.states.get(&self.core.id) {
            Some(RunState::Sleeping { .. }) => {
                // The stale sleep-queue entry is skipped by its ticket when
                // the scheduler reaches it.
                st.states.insert(self.core.id, RunState::Ready);
                st.run_queue.push_back(self.core.clone());
                true
            },
            Some(RunState::SleepingForever) => {
                st.sleeping_forever -= 1;
                st.states.insert(self.core.id, RunState::Ready);
                st.run_queue.push_back(self.core.clone());
                true
            },
            _ => false,
        }
    }

    /// Hand control back to the scheduler and block until resumed.
    fn suspend(&self) {
        let _ = self.shared.events_tx.send(Event { panic: None });
        if self.core.resume_rx.recv().is_err() {
            // Scheduler went away while we were suspended; unwind out of the
            // user code without tripping the panic hook.
            panic::resume_unwind(Box::new(ShutdownSignal));
        }
    }

    fn assert_own_thread(&self) {
        let own = self.core.thread.lock();
        assert_eq!(
            *own,
            Some(std::thread::current().id()),
            "suspending operation called from outside the coroutine"
        );
    }
}

/// Thread entry point: waits for the first resume, runs the task body, then
/// reports the exit (or the panic payload) to the scheduler.
pub(crate) fn coroutine_main<F>(handle: Coroutine, f: F)
where
    F: FnOnce(Coroutine) + Send + 'static,
{
    if handle.core.resume_rx.recv().is_err() {
        return;
    }
    *handle.core.thread.lock() = Some(std::thread::current().id());

    let result = panic::catch_unwind(AssertUnwindSafe(|| f(handle.clone())));
    let panic_payload: Option<Box<dyn Any + Send>> = match result {
        Ok(()) => None,
        Err(payload) if payload.is::<ShutdownSignal>() => return,
        Err(payload) => Some(payload),
    };
    {
        let mut st = handle.shared.state.lock();
        st.states.insert(handle.core.id, RunState::Exited);
    }
    let _ = handle.shared.events_tx.send(Event {
        panic: panic_payload,
    });
}
