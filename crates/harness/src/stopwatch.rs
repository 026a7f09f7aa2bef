//! Stopwatches: elapsed-time accumulators whose comparisons are reactive
//! expression leaves.
//!
//! Each comparison operator owns a job whose due time is the next instant
//! the predicate's value changes. The `SMALLEST_NON_ZERO` bumps below place
//! that instant just past the boundary for the operators that are false *at*
//! the boundary.

use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
    Weak,
};

use parking_lot::Mutex;
use sim_time::{
    Duration,
    TimePoint,
};

use crate::{
    condition::{
        Condition,
        ConditionSet,
    },
    context,
    expr::{
        CmpOp,
        Expr,
        IntoExpr,
    },
    job::{
        Job,
        JobListener,
    },
    runner::Runner,
};

struct SwState {
    started_at: TimePoint,
    accumulated: Duration,
    running: bool,
}

pub(crate) struct StopwatchInner {
    runner: Runner,
    state: Mutex<SwState>,
    operators: Mutex<Vec<Weak<OperatorInner>>>,
}

impl StopwatchInner {
    fn lap(&self) -> Duration {
        let state = self.state.lock();
        if state.running {
            state.accumulated + (self.runner.now() - state.started_at)
        } else {
            state.accumulated
        }
    }

    fn running(&self) -> bool {
        self.state.lock().running
    }

    fn live_operators(&self) -> Vec<Arc<OperatorInner>> {
        self.operators
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    fn start(&self) {
        let now = self.runner.now();
        let stopped_for = {
            let mut state = self.state.lock();
            assert!(!state.running, "stopwatch is already running");
            let stopped_for = now - state.started_at;
            state.started_at = now;
            state.running = true;
            stopped_for
        };
        for operator in self.live_operators() {
            operator.job.shift_due(stopped_for);
            if !operator.job.is_due(now) {
                self.runner.add_job(&operator.job);
            } else {
                operator.job.disarm();
            }
        }
    }

    fn stop(&self) {
        let now = self.runner.now();
        {
            let mut state = self.state.lock();
            assert!(state.running, "stopwatch is not running");
            let started_at = state.started_at;
            state.accumulated += now - started_at;
            state.started_at = now;
            state.running = false;
        }
        for operator in self.live_operators() {
            if operator.job.is_armed() {
                // Executes the job first if it is due at this very instant.
                self.runner.remove_job(&operator.job);
            }
        }
    }

    fn reset(&self) {
        let was_running = self.running();
        if was_running {
            // Jobs must leave the heap before their dues are rewritten.
            self.stop();
        }
        self.state.lock().accumulated = Duration::ZERO;
        for operator in self.live_operators() {
            operator.notify_and_reschedule();
        }
        if was_running {
            self.start();
        }
    }

    /// Re-arm an operator's job for the instant `lap()` reaches `target`.
    fn schedule(&self, operator: &Arc<OperatorInner>, target: Duration) {
        assert!(!operator.job.is_armed());
        let now = self.runner.now();
        let due = now + (target - self.lap());
        let listener: Arc<dyn JobListener> = operator.clone();
        operator.job.set_due(due, &listener);
        if self.running() && !operator.job.is_due(now) {
            self.runner.add_job(&operator.job);
        } else {
            operator.job.disarm();
        }
    }

    fn add_operator(&self, operator: &Arc<OperatorInner>) {
        self.operators.lock().push(Arc::downgrade(operator));
        operator.reschedule();
    }

    fn remove_operator(&self, operator: &Arc<OperatorInner>) {
        self.operators
            .lock()
            .retain(|weak| !weak.ptr_eq(&Arc::downgrade(operator)));
        if operator.job.is_armed() {
            self.runner.remove_job(&operator.job);
        }
    }
}

/// One reactive comparison of a stopwatch against a fixed duration.
pub(crate) struct OperatorInner {
    op: CmpOp,
    duration: Duration,
    stopwatch: Arc<StopwatchInner>,
    job: Arc<Job>,
    condition: Mutex<Option<Arc<Condition>>>,
    enabled: AtomicBool,
    /// Conditions can be notified without going through the job (stopwatch
    /// reset), so keep a set like other leaves do.
    conditions: ConditionSet,
}

impl OperatorInner {
    fn new(op: CmpOp, duration: Duration, stopwatch: Arc<StopwatchInner>) -> Arc<Self> {
        Arc::new(OperatorInner {
            op,
            duration,
            stopwatch,
            job: Job::new(),
            condition: Mutex::new(None),
            enabled: AtomicBool::new(false),
            conditions: ConditionSet::new(),
        })
    }

    fn holds(&self) -> bool {
        let lap = self.stopwatch.lap();
        match self.op {
            CmpOp::Eq => lap == self.duration,
            CmpOp::Ne => lap != self.duration,
            CmpOp::Lt => lap < self.duration,
            CmpOp::Le => lap <= self.duration,
            CmpOp::Gt => lap > self.duration,
            CmpOp::Ge => lap >= self.duration,
        }
    }

    /// Where the next boundary crossing sits, relative to the stopwatch
    /// origin.
    fn target(&self) -> Duration {
        let lap = self.stopwatch.lap();
        match self.op {
            // True exactly at the boundary: once reached, step one tick past
            // it so the predicate crosses back.
            CmpOp::Eq | CmpOp::Ne | CmpOp::Ge => {
                if lap == self.duration {
                    self.duration + Duration::SMALLEST_NON_ZERO
                } else {
                    self.duration
                }
            }
            CmpOp::Gt | CmpOp::Le => self.duration + Duration::SMALLEST_NON_ZERO,
            CmpOp::Lt => self.duration,
        }
    }

    fn reschedule(self: &Arc<Self>) {
        self.stopwatch.schedule(self, self.target());
    }

    fn notify_and_reschedule(self: &Arc<Self>) {
        self.conditions.notify_all();
        self.reschedule();
    }

    fn enable(self: &Arc<Self>, condition: &Arc<Condition>) {
        assert!(
            !self.enabled.swap(true, Ordering::SeqCst),
            "stopwatch comparison enabled twice"
        );
        *self.condition.lock() = Some(condition.clone());
        self.conditions.add(condition);
        self.stopwatch.add_operator(self);
    }

    fn disable(self: &Arc<Self>) {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(condition) = self.condition.lock().take() {
            self.conditions.remove(&condition);
        }
        self.stopwatch.remove_operator(self);
    }
}

impl JobListener for OperatorInner {
    fn fire(&self) {
        self.conditions.notify_all();
    }
}

/// Elapsed-time accumulator. Created stopped at zero; `start`/`stop`
/// accumulate, `lap` reads without disturbing the state.
#[derive(Clone)]
pub struct Stopwatch {
    inner: Arc<StopwatchInner>,
}

impl Stopwatch {
    pub(crate) fn new(runner: Runner) -> Self {
        let started_at = runner.now();
        Stopwatch {
            inner: Arc::new(StopwatchInner {
                runner,
                state: Mutex::new(SwState {
                    started_at,
                    accumulated: Duration::ZERO,
                    running: false,
                }),
                operators: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn start(&self) {
        self.inner.start();
    }

    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Zero the accumulated time; a running stopwatch keeps running from
    /// now. Subscribed comparisons are re-checked.
    pub fn reset(&self) {
        self.inner.reset();
    }

    pub fn is_running(&self) -> bool {
        self.inner.running()
    }

    pub fn lap(&self) -> Duration {
        self.inner.lap()
    }

    pub fn elapsed_eq(&self, duration: Duration) -> StopwatchCmp {
        self.cmp_expr(CmpOp::Eq, duration)
    }

    pub fn elapsed_ne(&self, duration: Duration) -> StopwatchCmp {
        self.cmp_expr(CmpOp::Ne, duration)
    }

    pub fn elapsed_lt(&self, duration: Duration) -> StopwatchCmp {
        self.cmp_expr(CmpOp::Lt, duration)
    }

    pub fn elapsed_le(&self, duration: Duration) -> StopwatchCmp {
        self.cmp_expr(CmpOp::Le, duration)
    }

    pub fn elapsed_gt(&self, duration: Duration) -> StopwatchCmp {
        self.cmp_expr(CmpOp::Gt, duration)
    }

    pub fn elapsed_ge(&self, duration: Duration) -> StopwatchCmp {
        self.cmp_expr(CmpOp::Ge, duration)
    }

    fn cmp_expr(&self, op: CmpOp, duration: Duration) -> StopwatchCmp {
        StopwatchCmp {
            operator: OperatorInner::new(op, duration, self.inner.clone()),
        }
    }
}

/// Expression leaf for one stopwatch comparison. Holds its operator alive,
/// so the snapshot stays valid even if the [`Stopwatch`] handle is dropped.
pub struct StopwatchCmp {
    operator: Arc<OperatorInner>,
}

impl Expr for StopwatchCmp {
    type Output = bool;

    fn value(&self) -> bool {
        self.operator.holds()
    }

    fn enable(&self, _owner: &Runner, condition: &Arc<Condition>) {
        self.operator.enable(condition);
    }

    fn disable(&self) {
        self.operator.disable();
    }
}

impl IntoExpr for StopwatchCmp {
    type Expr = Self;

    fn into_expr(self) -> Self {
        self
    }
}

/// A stopwatch owned by the current runner.
pub fn create_stopwatch() -> Stopwatch {
    Stopwatch::new(context::current_runner())
}
