//! Reactive conditions over expression trees.

use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
    Weak,
};

use parking_lot::Mutex;

use crate::{
    expr::Expr,
    runner::Runner,
};

/// Told when a subscribed input of the condition changed value. The listener
/// decides whether to re-check `is_fulfilled` and act: a runner wakes its
/// wait loop, an invariant probes and possibly records a violation.
pub trait ConditionListener: Send + Sync {
    fn on_change(&self);
}

/// The shared cell every leaf of an enabled expression holds on to. Leaves
/// call [`Condition::notify_listener`] whenever their value may have changed.
pub struct Condition {
    owner: Runner,
    listener: Mutex<Option<Weak<dyn ConditionListener>>>,
    enabled: AtomicBool,
}

impl Condition {
    pub(crate) fn new(owner: Runner, listener: Option<Weak<dyn ConditionListener>>) -> Arc<Self> {
        Arc::new(Condition {
            owner,
            listener: Mutex::new(listener),
            enabled: AtomicBool::new(false),
        })
    }

    pub fn owner(&self) -> &Runner {
        &self.owner
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn notify_listener(&self) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener.and_then(|weak| weak.upgrade()) {
            listener.on_change();
        }
    }
}

/// A boolean expression bound to a condition cell.
///
/// Enabling registers the cell with every leaf that can change; the caller
/// must probe `is_fulfilled` explicitly afterwards: enabling an
/// already-satisfied condition does not fire the listener on its own.
pub struct ExprCondition<E: Expr<Output = bool>> {
    cell: Arc<Condition>,
    expr: E,
}

impl<E: Expr<Output = bool>> ExprCondition<E> {
    pub fn new(owner: &Runner, expr: E, listener: Option<Weak<dyn ConditionListener>>) -> Self {
        ExprCondition {
            cell: Condition::new(owner.clone(), listener),
            expr,
        }
    }

    pub fn cell(&self) -> &Arc<Condition> {
        &self.cell
    }
}

/// Object-safe view of an [`ExprCondition`]; what invariants and `when`
/// gates store.
pub trait DynCondition: Send {
    fn enable(&self);
    fn disable(&self);
    fn is_enabled(&self) -> bool;
    fn is_fulfilled(&self) -> bool;
}

impl<E: Expr<Output = bool>> DynCondition for ExprCondition<E> {
    fn enable(&self) {
        assert!(
            !self.cell.enabled.swap(true, Ordering::SeqCst),
            "condition enabled twice"
        );
        self.expr.enable(&self.cell.owner, &self.cell);
    }

    // Idempotent; conditions are disabled from both wait exits and drops.
    fn disable(&self) {
        if self.cell.enabled.swap(false, Ordering::SeqCst) {
            self.expr.disable();
        }
    }

    fn is_enabled(&self) -> bool {
        self.cell.is_enabled()
    }

    fn is_fulfilled(&self) -> bool {
        self.expr.value()
    }
}

/// Subscription list held by leaves that can change value (ports, value
/// cells, stopwatch operators).
pub(crate) struct ConditionSet {
    conditions: Mutex<Vec<Weak<Condition>>>,
}

impl ConditionSet {
    pub(crate) fn new() -> Self {
        ConditionSet {
            conditions: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, condition: &Arc<Condition>) {
        self.conditions.lock().push(Arc::downgrade(condition));
    }

    pub(crate) fn remove(&self, condition: &Arc<Condition>) {
        self.conditions
            .lock()
            .retain(|weak| !weak.ptr_eq(&Arc::downgrade(condition)));
    }

    pub(crate) fn notify_all(&self) {
        let snapshot = self.conditions.lock().clone();
        for weak in snapshot {
            if let Some(condition) = weak.upgrade() {
                condition.notify_listener();
            }
        }
    }
}
