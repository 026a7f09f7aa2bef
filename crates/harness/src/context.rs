//! The scenario context: scheduler, log sink, report, and the registry of
//! runners.

use std::{
    cell::RefCell,
    sync::{
        Arc,
        Weak,
    },
};

use coro::Scheduler;
use parking_lot::Mutex;
use rand::{
    Rng,
    SeedableRng,
};
use rand_chacha::ChaCha12Rng;
use sim_log::{
    Logger,
    LogSink,
};
use sim_time::{
    Duration,
    TimePoint,
};

use crate::{
    report::Report,
    runner::{
        Runner,
        MAX_RUNNER_NAME_LEN,
    },
};

const DEFAULT_SEED: u64 = 0;

pub(crate) struct ContextInner {
    pub(crate) scheduler: Scheduler,
    pub(crate) sink: LogSink,
    /// Context-level logger, used for records not attributable to a runner
    /// (teardown diagnostics, the postamble).
    pub(crate) logger: Logger,
    pub(crate) report: Report,
    pub(crate) runners: Mutex<Vec<Runner>>,
    /// While a runner executes a callback on behalf of another, this holds
    /// the runner the work is attributed to.
    pub(crate) current_virtual: Mutex<Option<Runner>>,
    pub(crate) rng: Mutex<ChaCha12Rng>,
    end_checks: Mutex<Vec<Box<dyn FnOnce(&Context) + Send>>>,
}

thread_local! {
    /// Set once per runner thread, before the runner body starts. Holds the
    /// context weakly: a runner thread must not keep its own scenario alive,
    /// or the scheduler could never tear the threads down.
    static CURRENT: RefCell<Option<(Weak<ContextInner>, Runner)>> = const { RefCell::new(None) };
}

/// One scenario. Create it, add runners, [`Context::run`] it, and use the
/// returned exit code as the process exit code.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new() -> Self {
        Self::with_sink(LogSink::stdout())
    }

    pub fn with_sink(sink: LogSink) -> Self {
        Self::with_sink_and_seed(sink, DEFAULT_SEED)
    }

    /// Scenario with an explicit random seed; the same seed reproduces the
    /// same `random_duration`/`coin_flip` draws run-to-run.
    pub fn with_sink_and_seed(sink: LogSink, seed: u64) -> Self {
        let logger = Logger::new(sink.clone(), "main");
        Context {
            inner: Arc::new(ContextInner {
                scheduler: Scheduler::new(),
                sink,
                logger,
                report: Report::new(),
                runners: Mutex::new(Vec::new()),
                current_virtual: Mutex::new(None),
                rng: Mutex::new(ChaCha12Rng::seed_from_u64(seed)),
                end_checks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Add a runner. `body` runs cooperatively once [`Context::run`] starts;
    /// after it returns the runner keeps serving its timers and callbacks
    /// until the scenario ends.
    pub fn runner(&self, name: &str, body: impl FnOnce() + Send + 'static) -> Runner {
        assert!(
            !name.is_empty() && name.len() <= MAX_RUNNER_NAME_LEN,
            "runner names are 1 to {MAX_RUNNER_NAME_LEN} characters"
        );
        let runner = Runner::new(
            name,
            Logger::new(self.inner.sink.clone(), name),
            Arc::downgrade(&self.inner),
        );
        self.inner.runners.lock().push(runner.clone());

        let weak_context = Arc::downgrade(&self.inner);
        let thread_runner = runner.clone();
        let coroutine = self.inner.scheduler.spawn(name, move |_coroutine| {
            CURRENT.with(|current| {
                *current.borrow_mut() = Some((weak_context, thread_runner.clone()));
            });
            thread_runner.log_start_banner();
            body();
            // Keep serving jobs and callbacks until the scenario ends, so a
            // timer due after the body returns still fires.
            thread_runner.wait_internal(Duration::INFINITY, None);
        });
        runner.attach_coroutine(coroutine);
        runner
    }

    /// Drive the scenario to completion and produce the exit code: 1 when
    /// any FAIL-class counter is non-zero, 0 otherwise.
    pub fn run(&self) -> i32 {
        self.inner.scheduler.run();
        for runner in self.inner.runners.lock().iter() {
            runner.log_exit_banner();
        }
        let checks = std::mem::take(&mut *self.inner.end_checks.lock());
        for check in checks {
            check(self);
        }
        self.inner.report.finish(&self.inner.logger)
    }

    pub fn now(&self) -> TimePoint {
        self.inner.scheduler.now()
    }

    pub fn report(&self) -> Report {
        self.inner.report.clone()
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    /// Register a check that runs after all runners finished, before the
    /// postamble. The mock layer reports missing calls through this.
    pub fn add_end_check(&self, check: Box<dyn FnOnce(&Context) + Send>) {
        self.inner.end_checks.lock().push(check);
    }

    pub fn random_duration(&self, from: Duration, to: Duration) -> Duration {
        assert!(from <= to);
        let nanos = self.inner.rng.lock().gen_range(from.as_nanos()..=to.as_nanos());
        Duration::nanoseconds(nanos)
    }

    pub fn coin_flip(&self, probability: f64) -> bool {
        assert!((0.0..=1.0).contains(&probability));
        self.inner.rng.lock().gen_bool(probability)
    }
}

/// The context of the runner thread this call happens on. Panics outside a
/// runner body.
pub fn current_context() -> Context {
    try_current()
        .map(|(context, _)| context)
        .expect("not inside a runner")
}

/// The runner the current work is attributed to: the virtual runner when a
/// callback is being delivered on its owner's behalf, the executing runner
/// otherwise.
pub fn current_runner() -> Runner {
    let (context, executing) = try_current().expect("not inside a runner");
    let virtual_runner = context.inner.current_virtual.lock().clone();
    virtual_runner.unwrap_or(executing)
}

pub(crate) fn try_current() -> Option<(Context, Runner)> {
    CURRENT
        .with(|current| current.borrow().clone())
        .and_then(|(weak, runner)| {
            weak.upgrade().map(|inner| (Context { inner }, runner))
        })
}
