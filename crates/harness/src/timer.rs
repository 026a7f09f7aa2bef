//! One-shot, restartable timers.

use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
    Weak,
};

use parking_lot::Mutex;
use sim_log::LogTag;
use sim_time::{
    Duration,
    TimePoint,
};

use crate::{
    context,
    job::{
        Job,
        JobListener,
    },
    meta::CallContext,
    runner::Runner,
};

struct TimerState {
    remaining: Duration,
    start_value: Duration,
    started_at: TimePoint,
}

pub(crate) struct TimerInner {
    runner: Runner,
    callback: Mutex<Box<dyn FnMut(&Timer) + Send>>,
    state: Mutex<TimerState>,
    armed: AtomicBool,
    job: Arc<Job>,
    call: CallContext,
    // Lets the job listener hand the callback a full Timer handle.
    weak_self: Weak<TimerInner>,
}

impl TimerInner {
    fn start_with(self: &Arc<Self>, duration: Duration) {
        assert!(!self.armed.load(Ordering::SeqCst), "timer is already armed");
        let now = self.runner.now();
        let due = {
            let mut state = self.state.lock();
            state.start_value = duration;
            state.remaining = duration;
            state.started_at = now;
            now + state.remaining
        };
        let listener: Arc<dyn JobListener> = self.clone();
        self.job.set_due(due, &listener);
        self.runner.add_job(&self.job);
        self.armed.store(true, Ordering::SeqCst);
    }

    fn restart(self: &Arc<Self>) {
        assert!(!self.armed.load(Ordering::SeqCst), "timer is already armed");
        let now = self.runner.now();
        let due = {
            let mut state = self.state.lock();
            state.started_at = now;
            now + state.remaining
        };
        let listener: Arc<dyn JobListener> = self.clone();
        self.job.set_due(due, &listener);
        self.runner.add_job(&self.job);
        self.armed.store(true, Ordering::SeqCst);
    }

    fn stop(self: &Arc<Self>) {
        assert!(self.armed.load(Ordering::SeqCst), "timer is not armed");
        {
            let mut state = self.state.lock();
            state.remaining = self.runner.now() - state.started_at;
        }
        // A timer cancelled at the instant it expires still fires once: the
        // removal executes the due job.
        self.runner.remove_job(&self.job);
        self.armed.store(false, Ordering::SeqCst);
    }

    fn reset(self: &Arc<Self>) {
        if self.armed.load(Ordering::SeqCst) {
            self.stop();
        }
        let start_value = self.state.lock().start_value;
        self.start_with(start_value);
    }
}

impl JobListener for TimerInner {
    fn fire(&self) {
        assert!(self.armed.load(Ordering::SeqCst));
        self.armed.store(false, Ordering::SeqCst);

        let start_value = self.state.lock().start_value;
        self.runner
            .logger()
            .record(
                LogTag::Expr,
                self.runner.now(),
                self.call.file,
                self.call.line,
            )
            .line(format!(
                "Timer expired after {} ms",
                start_value.as_millis()
            ));

        let Some(inner) = self.weak_self.upgrade() else {
            tracing::warn!("timer fired after its handle went away");
            return;
        };
        let timer = Timer { inner };
        // The callback is attributed to the owning runner even when another
        // runner's removal executed the job.
        self.runner.with_virtual(|| {
            (self.callback.lock())(&timer);
        });
    }
}

/// Handle to a timer. The callback runs attributed to the runner that
/// created the timer and receives a handle so it can restart it.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    fn new(runner: Runner, callback: Box<dyn FnMut(&Timer) + Send>, call: CallContext) -> Self {
        Timer {
            inner: Arc::new_cyclic(|weak_self| TimerInner {
                runner,
                callback: Mutex::new(callback),
                state: Mutex::new(TimerState {
                    remaining: Duration::INFINITY,
                    start_value: Duration::INFINITY,
                    started_at: TimePoint::START_OF_EPOCH,
                }),
                armed: AtomicBool::new(false),
                job: Job::new(),
                call,
                weak_self: weak_self.clone(),
            }),
        }
    }

    pub fn start(&self, duration: Duration) {
        self.inner.start_with(duration);
    }

    /// Re-arm with the remaining duration recorded at the last stop.
    pub fn resume(&self) {
        self.inner.restart();
    }

    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Stop (if armed) and start again with the original duration.
    pub fn reset(&self) {
        self.inner.reset();
    }

    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }
}

/// Create a timer owned by the current runner; it is not armed until
/// [`Timer::start`].
#[track_caller]
pub fn create_timer(callback: impl FnMut(&Timer) + Send + 'static) -> Timer {
    Timer::new(
        context::current_runner(),
        Box::new(callback),
        CallContext::capture(),
    )
}

/// Create a timer and arm it immediately.
#[track_caller]
pub fn create_timer_started(
    callback: impl FnMut(&Timer) + Send + 'static,
    duration: Duration,
) -> Timer {
    let timer = Timer::new(
        context::current_runner(),
        Box::new(callback),
        CallContext::capture(),
    );
    timer.start(duration);
    timer
}
