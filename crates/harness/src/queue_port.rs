//! Queue ports: bounded-FIFO subscribers.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
};

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

/// Ring capacity of every queue port.
pub const QUEUE_CAPACITY: usize = 100;

/// Returned by [`QueuePort::try_pop`] when nothing is queued.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("pop on an empty queue port")]
pub struct EmptyQueue;

pub(crate) struct QueuePortInner<T> {
    ring: Mutex<VecDeque<T>>,
    /// Latches once a push on a full ring displaced the oldest element.
    lost_element: AtomicBool,
    owner: Runner,
    signal_name: String,
    conditions: ConditionSet,
    callbacks: Callbacks<T>,
    filters: Filters<T>,
}

impl<T: PortValue> QueuePortInner<T> {
    pub(crate) fn insert(&self, value: T) {
        self.owner.with_virtual(|| {
            if !self.filters.accepts(&value) {
                return;
            }
            {
                let mut ring = self.ring.lock();
                if ring.len() == QUEUE_CAPACITY {
                    ring.pop_front();
                    self.lost_element.store(true, Ordering::SeqCst);
                }
                ring.push_back(value.clone());
            }
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

/// FIFO endpoint of a signal, owned by one runner. Capacity is
/// [`QUEUE_CAPACITY`]; an overflowing push displaces the oldest element and
/// latches [`QueuePort::lost_element`].
#[derive(Clone)]
pub struct QueuePort<T> {
    inner: Arc<QueuePortInner<T>>,
}

impl<T: PortValue> QueuePort<T> {
    pub(crate) fn bind(signal: &Signal<T>, owner: Runner) -> Self {
        let inner = Arc::new(QueuePortInner {
            ring: Mutex::new(VecDeque::new()),
            lost_element: AtomicBool::new(false),
            owner,
            signal_name: signal.name().to_owned(),
            conditions: ConditionSet::new(),
            callbacks: Callbacks::new(),
            filters: Filters::new(),
        });
        signal.inner.queue_ports.lock().push(inner.clone());
        QueuePort { inner }
    }

    /// Take the oldest queued value. Popping an empty queue is a programmer
    /// error in the scenario.
    #[track_caller]
    pub fn pop(&self) -> T {
        self.try_pop().expect("pop on an empty queue port")
    }

    /// Non-panicking [`QueuePort::pop`].
    #[track_caller]
    pub fn try_pop(&self) -> Result<T, EmptyQueue> {
        let call = CallContext::capture();
        let value = self.inner.ring.lock().pop_front().ok_or(EmptyQueue)?;
        let runner = context::current_runner();
        runner
            .logger()
            .record(LogTag::Pop, runner.now(), call.file, call.line)
            .line(format!("Pop value of '{}':", self.inner.signal_name))
            .value(&value);
        self.inner.conditions.notify_all();
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.inner.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.ring.lock().is_empty()
    }

    /// Whether a push ever displaced an element. Diagnostic only.
    pub fn lost_element(&self) -> bool {
        self.inner.lost_element.load(Ordering::SeqCst)
    }

    /// Expression leaf: the current queue length.
    pub fn size(&self) -> QueueSizeExpr<T> {
        QueueSizeExpr {
            inner: self.inner.clone(),
            registered: Mutex::new(None),
        }
    }

    /// Expression leaf: whether at least one element is queued.
    pub fn is_available(&self) -> QueueAvailableExpr<T> {
        QueueAvailableExpr {
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

pub struct QueueSizeExpr<T> {
    inner: Arc<QueuePortInner<T>>,
    registered: Mutex<Option<Arc<Condition>>>,
}

impl<T: PortValue> Expr for QueueSizeExpr<T> {
    type Output = usize;

    fn value(&self) -> usize {
        self.inner.ring.lock().len()
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

impl<T: PortValue> IntoExpr for QueueSizeExpr<T> {
    type Expr = Self;

    fn into_expr(self) -> Self {
        self
    }
}

crate::expr::impl_arith_for!(QueueSizeExpr<T>, [T: PortValue]);

pub struct QueueAvailableExpr<T> {
    inner: Arc<QueuePortInner<T>>,
    registered: Mutex<Option<Arc<Condition>>>,
}

impl<T: PortValue> Expr for QueueAvailableExpr<T> {
    type Output = bool;

    fn value(&self) -> bool {
        !self.inner.ring.lock().is_empty()
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

impl<T: PortValue> IntoExpr for QueueAvailableExpr<T> {
    type Expr = Self;

    fn into_expr(self) -> Self {
        self
    }
}

crate::expr::impl_arith_for!(QueueAvailableExpr<T>, [T: PortValue]);

/// Bind a new queue port of the current runner to `signal`.
pub fn create_queue_port<T: PortValue>(signal: &Signal<T>) -> QueuePort<T> {
    QueuePort::bind(signal, context::current_runner())
}
