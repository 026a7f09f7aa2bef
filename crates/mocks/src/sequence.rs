//! Ordering of expectations: named sequences and the scoped implicit one.

use std::sync::Arc;

use harness::{
    context::current_runner,
    runner::Runner,
};
use parking_lot::Mutex;

use crate::expectation::ExpectationCore;

/// A named ordering constraint: expectations added to the same sequence form
/// a linear prerequisite chain in the order they were added.
#[derive(Clone)]
pub struct Sequence {
    last: Arc<Mutex<Option<Arc<ExpectationCore>>>>,
}

impl Sequence {
    pub fn new() -> Self {
        Sequence {
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn add(&self, core: &Arc<ExpectationCore>) {
        let mut last = self.last.lock();
        if let Some(previous) = last.as_ref() {
            core.add_prerequisite(previous.clone());
        }
        *last = Some(core.clone());
    }
}

/// The chain an [`InSequence`] guard installs in the runner's userdata slot.
pub(crate) struct ImplicitSequence {
    last: Mutex<Option<Arc<ExpectationCore>>>,
}

impl ImplicitSequence {
    pub(crate) fn add(&self, core: &Arc<ExpectationCore>) {
        let mut last = self.last.lock();
        if let Some(previous) = last.as_ref() {
            core.add_prerequisite(previous.clone());
        }
        *last = Some(core.clone());
    }
}

/// While alive, every newly created expectation on this runner is chained
/// after the previous one. Nesting is idempotent: only the outermost guard
/// owns the slot.
pub struct InSequence {
    runner: Runner,
    owned: Option<Arc<ImplicitSequence>>,
}

impl InSequence {
    pub fn new() -> Self {
        let runner = current_runner();
        let already_active = runner
            .userdata()
            .is_some_and(|userdata| userdata.downcast::<ImplicitSequence>().is_ok());
        let owned = if already_active {
            None
        } else {
            let sequence = Arc::new(ImplicitSequence {
                last: Mutex::new(None),
            });
            runner.set_userdata(Some(sequence.clone()));
            Some(sequence)
        };
        InSequence { runner, owned }
    }
}

impl Drop for InSequence {
    fn drop(&mut self) {
        if self.owned.take().is_some() {
            self.runner.set_userdata(None);
        }
    }
}
