//! Sample ports: latest-value subscribers.

use std::sync::Arc;

use parking_lot::Mutex;
use sim_log::LogTag;

use crate::{
    condition::{
        Condition,
        ConditionSet,
    },
    context,
    expr::{
        Expr,
        IntoExpr,
    },
    meta::CallContext,
    port::{
        CallbackId,
        Callbacks,
        FilterId,
        Filters,
        PortValue,
    },
    runner::Runner,
    signal::Signal,
};

pub(crate) struct SamplePortInner<T> {
    value: Mutex<T>,
    owner: Runner,
    signal_name: String,
    conditions: ConditionSet,
    callbacks: Callbacks<T>,
    filters: Filters<T>,
}

impl<T: PortValue> SamplePortInner<T> {
    /// Deliver one published value: filter, store, notify conditions, run
    /// callbacks. Everything here is attributed to the owning runner even
    /// though the publisher's coroutine executes it.
    pub(crate) fn insert(&self, value: T) {
        self.owner.with_virtual(|| {
            if !self.filters.accepts(&value) {
                return;
            }
            *self.value.lock() = value.clone();
            self.conditions.notify_all();
            for (call, callback) in self.callbacks.snapshot() {
                self.owner
                    .logger()
                    .record(LogTag::Handle, self.owner.now(), call.file, call.line)
                    .line(format!("Handle value of '{}':", self.signal_name))
                    .value(&value);
                (callback.lock())(&value);
            }
        });
    }
}

/// Latest-value endpoint of a signal, owned by one runner.
#[derive(Clone)]
pub struct SamplePort<T> {
    inner: Arc<SamplePortInner<T>>,
}

impl<T: PortValue> SamplePort<T> {
    pub(crate) fn bind(signal: &Signal<T>, owner: Runner) -> Self {
        let inner = Arc::new(SamplePortInner {
            value: Mutex::new(T::default()),
            owner,
            signal_name: signal.name().to_owned(),
            conditions: ConditionSet::new(),
            callbacks: Callbacks::new(),
            filters: Filters::new(),
        });
        signal.inner.sample_ports.lock().push(inner.clone());
        SamplePort { inner }
    }

    /// The most recently accepted value.
    pub fn read(&self) -> T {
        self.inner.value.lock().clone()
    }

    pub fn expr(&self) -> SamplePortExpr<T> {
        SamplePortExpr {
            inner: self.inner.clone(),
            registered: Mutex::new(None),
        }
    }

    #[track_caller]
    pub fn add_listener(&self, callback: impl FnMut(&T) + Send + 'static) -> CallbackId {
        self.inner
            .callbacks
            .add(CallContext::capture(), Box::new(callback))
    }

    pub fn remove_listener(&self, id: CallbackId) {
        self.inner.callbacks.remove(id);
    }

    pub fn add_filter(&self, filter: impl FnMut(&T) -> bool + Send + 'static) -> FilterId {
        self.inner.filters.add(Box::new(filter))
    }

    pub fn remove_filter(&self, id: FilterId) {
        self.inner.filters.remove(id);
    }
}

/// Expression leaf producing the port's latest value.
pub struct SamplePortExpr<T> {
    inner: Arc<SamplePortInner<T>>,
    registered: Mutex<Option<Arc<Condition>>>,
}

impl<T: PortValue> Expr for SamplePortExpr<T> {
    type Output = T;

    fn value(&self) -> T {
        self.inner.value.lock().clone()
    }

    fn enable(&self, _owner: &Runner, condition: &Arc<Condition>) {
        self.inner.conditions.add(condition);
        *self.registered.lock() = Some(condition.clone());
    }

    fn disable(&self) {
        if let Some(condition) = self.registered.lock().take() {
            self.inner.conditions.remove(&condition);
        }
    }
}

impl<T: PortValue> IntoExpr for SamplePortExpr<T> {
    type Expr = Self;

    fn into_expr(self) -> Self {
        self
    }
}

crate::expr::impl_arith_for!(SamplePortExpr<T>, [T: PortValue]);

impl<T: PortValue> IntoExpr for &SamplePort<T> {
    type Expr = SamplePortExpr<T>;

    fn into_expr(self) -> SamplePortExpr<T> {
        self.expr()
    }
}

/// Bind a new sample port of the current runner to `signal`.
pub fn create_sample_port<T: PortValue>(signal: &Signal<T>) -> SamplePort<T> {
    SamplePort::bind(signal, context::current_runner())
}
