//! Pieces shared by both port flavors: value bounds, callback and filter
//! registries.

use std::sync::{
    atomic::{
        AtomicU64,
        Ordering,
    },
    Arc,
};

use parking_lot::Mutex;

use crate::meta::CallContext;

/// Bound required of values carried by signals and ports.
pub trait PortValue: Clone + std::fmt::Debug + Default + Send + 'static {}
impl<T: Clone + std::fmt::Debug + Default + Send + 'static> PortValue for T {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallbackId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterId(u64);

type CallbackFn<T> = Arc<Mutex<Box<dyn FnMut(&T) + Send>>>;

/// Listener callbacks registered on a port. Each callback is individually
/// locked so a callback may add or remove others while running.
pub(crate) struct Callbacks<T> {
    entries: Mutex<Vec<(u64, CallContext, CallbackFn<T>)>>,
    next_id: AtomicU64,
}

impl<T> Callbacks<T> {
    pub(crate) fn new() -> Self {
        Callbacks {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn add(
        &self,
        context: CallContext,
        callback: Box<dyn FnMut(&T) + Send>,
    ) -> CallbackId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .push((id, context, Arc::new(Mutex::new(callback))));
        CallbackId(id)
    }

    pub(crate) fn remove(&self, id: CallbackId) {
        self.entries.lock().retain(|(entry, ..)| *entry != id.0);
    }

    pub(crate) fn snapshot(&self) -> Vec<(CallContext, CallbackFn<T>)> {
        self.entries
            .lock()
            .iter()
            .map(|(_, context, callback)| (context.clone(), callback.clone()))
            .collect()
    }
}

type FilterFn<T> = Arc<Mutex<Box<dyn FnMut(&T) -> bool + Send>>>;

/// Filters run in registration order; a value is accepted only if every
/// filter accepts it. All filters run even after one rejected.
pub(crate) struct Filters<T> {
    entries: Mutex<Vec<(u64, FilterFn<T>)>>,
    next_id: AtomicU64,
}

impl<T> Filters<T> {
    pub(crate) fn new() -> Self {
        Filters {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn add(&self, filter: Box<dyn FnMut(&T) -> bool + Send>) -> FilterId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().push((id, Arc::new(Mutex::new(filter))));
        FilterId(id)
    }

    pub(crate) fn remove(&self, id: FilterId) {
        self.entries.lock().retain(|(entry, _)| *entry != id.0);
    }

    pub(crate) fn accepts(&self, value: &T) -> bool {
        let snapshot: Vec<FilterFn<T>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, filter)| filter.clone())
            .collect();
        let mut accepted = true;
        for filter in snapshot {
            if !(filter.lock())(value) {
                accepted = false;
            }
        }
        accepted
    }
}
