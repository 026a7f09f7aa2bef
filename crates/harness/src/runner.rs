//! The runner: one thread of control in a scenario.

use std::{
    any::Any,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        Weak,
    },
};

use coro::Coroutine;
use parking_lot::Mutex;
use sim_log::{
    Logger,
    LogTag,
    RULE_LENGTH,
};
use sim_time::{
    Duration,
    TimePoint,
};

use crate::{
    condition::{
        ConditionListener,
        DynCondition,
    },
    context::ContextInner,
    job::{
        Job,
        JobHeap,
    },
    report::Report,
};

pub const MAX_RUNNER_NAME_LEN: usize = 4;

struct SectionState {
    counter: usize,
    name: Option<String>,
}

pub(crate) struct RunnerCore {
    name: String,
    logger: Logger,
    pub(crate) context: Weak<ContextInner>,
    coroutine: Mutex<Option<Coroutine>>,
    jobs: Mutex<JobHeap>,
    /// Set by an explicit `Runner::wakeup`; distinguishes "woken on purpose"
    /// from "woken to recompute the next deadline".
    wake_event: AtomicBool,
    /// Guards the invariant that at most one suspending operation with a
    /// condition is in flight.
    in_condition_wait: AtomicBool,
    section: Mutex<SectionState>,
    userdata: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

/// Cloneable handle to a runner. Mostly used through the free functions in
/// [`crate::api`], which resolve the runner currently executing.
#[derive(Clone)]
pub struct Runner {
    pub(crate) core: Arc<RunnerCore>,
}

impl Runner {
    pub(crate) fn new(name: &str, logger: Logger, context: Weak<ContextInner>) -> Self {
        Runner {
            core: Arc::new(RunnerCore {
                name: name.to_owned(),
                logger,
                context,
                coroutine: Mutex::new(None),
                jobs: Mutex::new(JobHeap::new()),
                wake_event: AtomicBool::new(false),
                in_condition_wait: AtomicBool::new(false),
                section: Mutex::new(SectionState {
                    counter: 1,
                    name: None,
                }),
                userdata: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn logger(&self) -> &Logger {
        &self.core.logger
    }

    pub fn now(&self) -> TimePoint {
        self.coroutine().now()
    }

    pub fn report(&self) -> Report {
        self.core
            .context
            .upgrade()
            .expect("runner outlived its context")
            .report
            .clone()
    }

    /// Wake the runner out of its current wait. The interrupted `wait`
    /// reports "not a timeout".
    pub fn wakeup(&self) {
        let coroutine = self.coroutine();
        if coroutine.is_waiting() {
            self.core.wake_event.store(true, Ordering::SeqCst);
            coroutine.wakeup();
        }
    }

    /// Run `body` attributed to this runner (log records carry this runner's
    /// identity even though another runner's coroutine executes it).
    pub fn with_virtual<R>(&self, body: impl FnOnce() -> R) -> R {
        let context = self
            .core
            .context
            .upgrade()
            .expect("runner outlived its context");
        *context.current_virtual.lock() = Some(self.clone());
        let result = body();
        *context.current_virtual.lock() = None;
        result
    }

    pub(crate) fn coroutine(&self) -> Coroutine {
        self.core
            .coroutine
            .lock()
            .clone()
            .expect("runner has not been started")
    }

    pub(crate) fn attach_coroutine(&self, coroutine: Coroutine) {
        let mut slot = self.core.coroutine.lock();
        assert!(slot.is_none(), "runner already has a coroutine");
        *slot = Some(coroutine);
    }

    /// Queue a job; wakes the runner so its wait loop can account for the new
    /// deadline.
    pub(crate) fn add_job(&self, job: &Arc<Job>) {
        self.core.jobs.lock().push(job.clone());
        let coroutine = self.coroutine();
        if coroutine.is_waiting() {
            coroutine.wakeup();
        }
    }

    /// Remove a job from the heap. A job that is due at the instant of
    /// removal is executed once first, so a timer cancelled at its own expiry
    /// still fires.
    pub(crate) fn remove_job(&self, job: &Arc<Job>) {
        assert!(job.is_armed(), "removing a disarmed job");
        let due_now = job.is_due(self.now());
        self.core.jobs.lock().remove(job);
        if due_now {
            job.execute();
        } else {
            job.disarm();
        }
        let coroutine = self.coroutine();
        if coroutine.is_waiting() {
            coroutine.wakeup();
        }
    }

    /// The wait loop everything suspends through. Returns true iff the wait
    /// timed out: the condition (if any) is unfulfilled and no explicit
    /// wakeup arrived.
    pub(crate) fn wait_internal(
        &self,
        mut timeout: Duration,
        condition: Option<&dyn DynCondition>,
    ) -> bool {
        if condition.is_some() {
            assert!(
                !self.core.in_condition_wait.swap(true, Ordering::SeqCst),
                "nested condition waits on one runner"
            );
        }
        let coroutine = self.coroutine();
        // No suspension has happened yet, so no wakeup can race this store.
        self.core.wake_event.store(false, Ordering::SeqCst);

        let fulfilled =
            |condition: Option<&dyn DynCondition>| condition.is_some_and(|c| c.is_fulfilled());

        while timeout > Duration::ZERO
            && !fulfilled(condition)
            && !self.core.wake_event.load(Ordering::SeqCst)
        {
            let started_at = self.now();
            let mut sleep_for = timeout;
            if let Some(job) = self.core.jobs.lock().peek() {
                let until_due = job.time_until_due(started_at);
                assert!(until_due >= Duration::ZERO);
                if timeout >= until_due {
                    sleep_for = until_due;
                }
            }

            coroutine.wait(sleep_for);

            if !timeout.is_infinite() {
                timeout -= self.now() - started_at;
                assert!(timeout >= Duration::ZERO);
            }

            // Execute everything that came due.
            loop {
                let due_job = {
                    let now = self.now();
                    let mut jobs = self.core.jobs.lock();
                    if jobs.peek().is_some_and(|job| job.is_due(now)) {
                        jobs.pop()
                    } else {
                        None
                    }
                };
                match due_job {
                    Some(job) => job.execute(),
                    None => break,
                }
            }
        }

        let got_timeout = !(fulfilled(condition) || self.core.wake_event.load(Ordering::SeqCst));
        if condition.is_some() {
            self.core.in_condition_wait.store(false, Ordering::SeqCst);
        }
        got_timeout
    }

    // Sections.

    pub(crate) fn start_section(&self, name: Option<&str>) {
        let mut section = self.core.section.lock();
        section.name = name.map(str::to_owned);
        let label = section_label(name, section.counter);
        let mut record = self.core.logger.record_untracked(LogTag::Section, self.now());
        record.rule('=');
        record.line(format!(
            "Section{label:>width$}",
            width = RULE_LENGTH - "Section".len()
        ));
        record.rule('-');
    }

    pub(crate) fn end_section(&self) {
        let mut section = self.core.section.lock();
        let label = section_label(section.name.as_deref(), section.counter);
        section.counter += 1;
        section.name = None;
        let mut record = self.core.logger.record_untracked(LogTag::Section, self.now());
        record.rule('-');
        record.line(format!(
            "End section{label:>width$}",
            width = RULE_LENGTH - "End section".len()
        ));
        record.rule('=');
    }

    // Userdata: one opaque slot, used by the mock layer for the implicit
    // sequence guard.

    pub fn set_userdata(&self, value: Option<Arc<dyn Any + Send + Sync>>) {
        *self.core.userdata.lock() = value;
    }

    pub fn userdata(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.core.userdata.lock().clone()
    }

    pub(crate) fn log_start_banner(&self) {
        let mut record = self.core.logger.record_timeless(LogTag::Info);
        record.rule('-');
        record.line(format!("Start runner '{}'", self.core.name));
        record.rule('-');
    }

    pub(crate) fn log_exit_banner(&self) {
        let mut record = self.core.logger.record_timeless(LogTag::Info);
        record.rule('-');
        record.line(format!("Exit of '{}'", self.core.name));
        record.rule('-');
    }
}

fn section_label(name: Option<&str>, counter: usize) -> String {
    match name {
        Some(name) => format!("{name} ({counter})"),
        None => format!("({counter})"),
    }
}

/// A changed condition input wakes the runner so its wait loop re-checks
/// fulfillment.
impl ConditionListener for RunnerCore {
    fn on_change(&self) {
        let coroutine = self.coroutine.lock().clone();
        if let Some(coroutine) = coroutine {
            if coroutine.is_waiting() {
                coroutine.wakeup();
            }
        }
    }
}
