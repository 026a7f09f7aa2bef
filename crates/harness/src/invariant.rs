//! Invariants: conditions asserted to hold across their lifetime.

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

use crate::{
    condition::{
        ConditionListener,
        DynCondition,
        ExprCondition,
    },
    context,
    expr::Expr,
    meta::CallContext,
    report::Report,
    runner::Runner,
};

pub(crate) struct InvariantInner {
    condition: Mutex<Option<Box<dyn DynCondition>>>,
    holds: AtomicBool,
    runner: Runner,
    report: Report,
    call: CallContext,
}

impl InvariantInner {
    /// Re-check the condition. The first violation is reported once; the
    /// invariant stays violated for the rest of the scenario.
    fn probe(&self) {
        let fulfilled = self
            .condition
            .lock()
            .as_ref()
            .map(|condition| condition.is_fulfilled());
        let Some(fulfilled) = fulfilled else {
            return;
        };
        if self.holds.load(Ordering::SeqCst) && !fulfilled {
            self.holds.store(false, Ordering::SeqCst);
            self.report.invariant_violated();
            self.runner
                .logger()
                .record(
                    LogTag::Invariant,
                    self.runner.now(),
                    self.call.file,
                    self.call.line,
                )
                .line("Invariant does not hold:")
                .line(format!("'{}'", self.call.arg(0)));
        }
    }
}

impl ConditionListener for InvariantInner {
    fn on_change(&self) {
        self.probe();
    }
}

/// Handle to an invariant. Created enabled; `stop` ends the monitored
/// interval with one final check.
pub struct Invariant {
    inner: Arc<InvariantInner>,
}

impl Invariant {
    /// Enable the condition and probe once: an invariant that is already
    /// false at start counts as violated.
    pub fn start(&self) {
        // The condition leaves may fire jobs while being (un)registered, and
        // those re-enter `probe`; keep the slot unlocked across the call.
        let condition = self.inner.condition.lock().take();
        if let Some(condition) = &condition {
            condition.enable();
        }
        *self.inner.condition.lock() = condition;
        self.inner.probe();
    }

    /// Disable, then probe once more. The final probe covers the race where
    /// the stopping job and a violating job are due at the same instant.
    pub fn stop(&self) {
        let condition = self.inner.condition.lock().take();
        if let Some(condition) = &condition {
            condition.disable();
        }
        *self.inner.condition.lock() = condition;
        self.inner.probe();
    }

    pub fn holds(&self) -> bool {
        self.inner.holds.load(Ordering::SeqCst)
    }
}

impl Drop for Invariant {
    fn drop(&mut self) {
        let condition = self.inner.condition.lock().take();
        if let Some(condition) = &condition {
            if condition.is_enabled() {
                condition.disable();
            }
        }
        *self.inner.condition.lock() = condition;
    }
}

/// Create an invariant over `expr` on the current runner and start it.
#[track_caller]
pub fn create_invariant<E: Expr<Output = bool>>(expr: E) -> Invariant {
    create_invariant_with(expr, CallContext::capture())
}

pub fn create_invariant_with<E: Expr<Output = bool>>(expr: E, call: CallContext) -> Invariant {
    let runner = context::current_runner();
    let report = runner.report();
    let inner = Arc::new(InvariantInner {
        condition: Mutex::new(None),
        holds: AtomicBool::new(true),
        runner: runner.clone(),
        report,
        call,
    });
    let listener: Weak<dyn ConditionListener> = {
        let as_listener: Arc<dyn ConditionListener> = inner.clone();
        Arc::downgrade(&as_listener)
    };
    let condition = ExprCondition::new(&runner, expr, Some(listener));
    *inner.condition.lock() = Some(Box::new(condition));
    let invariant = Invariant { inner };
    invariant.start();
    invariant
}
