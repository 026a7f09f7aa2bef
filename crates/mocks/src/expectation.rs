//! Expectations: matchers + actions + cardinality + ordering + gating.

use std::sync::Arc;

use harness::{
    context::current_runner,
    meta::CallContext,
    DynCondition,
    Expr,
    ExprCondition,
};
use parking_lot::Mutex;

use crate::{
    action::Action,
    cardinality::{
        at_least,
        exactly,
        Cardinality,
    },
    matcher::TupleMatchers,
    sequence::Sequence,
};

pub(crate) struct WhenGate {
    pub(crate) condition: Box<dyn DynCondition>,
    pub(crate) call: CallContext,
}

struct CoreState {
    cardinality: Cardinality,
    cardinality_specified: bool,
    will_repeatedly_called: bool,
    retires_on_saturation: bool,
    call_counter: usize,
    prerequisites: Vec<Arc<ExpectationCore>>,
}

/// The untyped half of an expectation: everything that does not depend on
/// the mocked function's signature. Prerequisites link cores across
/// differently-typed mockers.
pub(crate) struct ExpectationCore {
    pub(crate) call: CallContext,
    pub(crate) function_name: String,
    pub(crate) param_names: Vec<String>,
    state: Mutex<CoreState>,
    pub(crate) when: Mutex<Option<WhenGate>>,
}

impl ExpectationCore {
    pub(crate) fn new(call: CallContext, function_name: &str, param_names: &[String]) -> Self {
        ExpectationCore {
            call,
            function_name: function_name.to_owned(),
            param_names: param_names.to_vec(),
            state: Mutex::new(CoreState {
                cardinality: exactly(1),
                cardinality_specified: false,
                will_repeatedly_called: false,
                retires_on_saturation: false,
                call_counter: 0,
                prerequisites: Vec::new(),
            }),
            when: Mutex::new(None),
        }
    }

    pub(crate) fn cardinality(&self) -> Cardinality {
        self.state.lock().cardinality
    }

    pub(crate) fn call_count(&self) -> usize {
        self.state.lock().call_counter
    }

    pub(crate) fn is_satisfied(&self) -> bool {
        let state = self.state.lock();
        state.cardinality.is_satisfied(state.call_counter)
    }

    pub(crate) fn is_saturated(&self) -> bool {
        let state = self.state.lock();
        state.cardinality.is_saturated(state.call_counter)
    }

    pub(crate) fn retires_on_saturation(&self) -> bool {
        self.state.lock().retires_on_saturation
    }

    pub(crate) fn add_prerequisite(&self, prerequisite: Arc<ExpectationCore>) {
        self.state.lock().prerequisites.push(prerequisite);
    }

    pub(crate) fn prerequisites(&self) -> Vec<Arc<ExpectationCore>> {
        self.state.lock().prerequisites.clone()
    }

    pub(crate) fn prerequisites_met(&self) -> bool {
        self.prerequisites()
            .iter()
            .all(|prerequisite| prerequisite.is_satisfied())
    }

    /// Retire the whole prerequisite chain of a dispatched expectation, so
    /// stale predecessors cannot swallow later calls.
    pub(crate) fn retire_all_prerequisites(&self, first: bool) {
        if !first {
            self.state.lock().retires_on_saturation = true;
        }
        for prerequisite in self.prerequisites() {
            prerequisite.retire_all_prerequisites(false);
        }
    }

    pub(crate) fn increment_call_counter(&self) -> usize {
        let mut state = self.state.lock();
        state.call_counter += 1;
        state.call_counter
    }

    pub(crate) fn is_when_fulfilled(&self) -> bool {
        self.when
            .lock()
            .as_ref()
            .map_or(true, |gate| gate.condition.is_fulfilled())
    }

    pub(crate) fn has_when(&self) -> bool {
        self.when.lock().is_some()
    }

    pub(crate) fn when_text(&self) -> String {
        self.when
            .lock()
            .as_ref()
            .map_or_else(|| "<expr>".to_owned(), |gate| gate.call.arg(0).to_owned())
    }

    /// `name(eq(1), gt(2))`: signature with the stringified matcher args
    /// where the capture macro recorded them, parameter names otherwise.
    pub(crate) fn signature(&self) -> String {
        let args = if self.call.args.is_empty() {
            self.param_names.join(", ")
        } else {
            self.call.args.join(", ")
        };
        format!("{}({})", self.function_name, args)
    }
}

/// The typed half: matchers over the argument tuple and the action list.
pub(crate) struct TypedExpectation<A, R> {
    pub(crate) core: Arc<ExpectationCore>,
    matchers: Mutex<Box<dyn TupleMatchers<A>>>,
    actions: Mutex<Vec<Action<A, R>>>,
    repeated: Mutex<Option<Action<A, R>>>,
}

impl<A: Send + 'static, R: Send + 'static> TypedExpectation<A, R> {
    pub(crate) fn new(core: ExpectationCore, matchers: Box<dyn TupleMatchers<A>>) -> Arc<Self> {
        Arc::new(TypedExpectation {
            core: Arc::new(core),
            matchers: Mutex::new(matchers),
            actions: Mutex::new(Vec::new()),
            repeated: Mutex::new(None),
        })
    }

    pub(crate) fn is_match(&self, args: &A) -> bool {
        self.matchers.lock().matches(args)
    }

    /// Dispatch one call: retire the prerequisite chain, advance the call
    /// counter, and run the `will_once` action at that index, the
    /// `will_repeatedly` action past the end, or the type default.
    pub(crate) fn perform_next(&self, args: &A) -> R
    where
        R: Default,
    {
        self.core.retire_all_prerequisites(true);
        let count = self.core.increment_call_counter();
        let mut actions = self.actions.lock();
        if count <= actions.len() {
            actions[count - 1].perform(args)
        } else if let Some(repeated) = self.repeated.lock().as_mut() {
            repeated.perform(args)
        } else {
            R::default()
        }
    }

    fn push_once(&self, action: Action<A, R>) {
        let mut state = self.core.state.lock();
        assert!(
            !state.will_repeatedly_called,
            "will_once after will_repeatedly"
        );
        assert!(
            !state.retires_on_saturation,
            "will_once after retire_on_saturation"
        );
        let mut actions = self.actions.lock();
        actions.push(action);
        if !state.cardinality_specified {
            state.cardinality = exactly(actions.len());
        }
    }

    fn push_repeated(&self, action: Action<A, R>) {
        let mut state = self.core.state.lock();
        assert!(!state.will_repeatedly_called, "will_repeatedly called twice");
        assert!(
            !state.retires_on_saturation,
            "will_repeatedly after retire_on_saturation"
        );
        state.will_repeatedly_called = true;
        *self.repeated.lock() = Some(action);
        if !state.cardinality_specified {
            state.cardinality = at_least(self.actions.lock().len());
        }
    }
}

/// Chainable configuration handle returned by `expect_call`.
///
/// Configuration follows the order `times` / `will_once`* /
/// `will_repeatedly`? / (`after` | `in_sequence`)* / `when`? /
/// `retire_on_saturation`?; violations are programmer errors and panic.
pub struct ExpectationHandle<A, R> {
    pub(crate) exp: Arc<TypedExpectation<A, R>>,
}

impl<A, R> Clone for ExpectationHandle<A, R> {
    fn clone(&self) -> Self {
        ExpectationHandle {
            exp: self.exp.clone(),
        }
    }
}

impl<A: Send + 'static, R: Send + 'static> ExpectationHandle<A, R> {
    /// Shorthand for `times_card(exactly(n))`.
    pub fn times(self, count: usize) -> Self {
        self.times_card(exactly(count))
    }

    pub fn times_card(self, cardinality: Cardinality) -> Self {
        let mut state = self.exp.core.state.lock();
        state.cardinality_specified = true;
        state.cardinality = cardinality;
        drop(state);
        self
    }

    /// Append an action consumed by exactly one call. Without an explicit
    /// `times`, `k` calls to `will_once` imply `exactly(k)`.
    pub fn will_once(self, action: Action<A, R>) -> Self {
        self.exp.push_once(action);
        self
    }

    /// Fallback action once all `will_once` actions are consumed. Without an
    /// explicit `times`, raises the cardinality to `at_least(k)`.
    pub fn will_repeatedly(self, action: Action<A, R>) -> Self {
        self.exp.push_repeated(action);
        self
    }

    /// Once saturated, stop matching entirely instead of reporting
    /// oversaturated calls.
    pub fn retire_on_saturation(self) -> Self {
        let mut state = self.exp.core.state.lock();
        assert!(
            !state.retires_on_saturation,
            "retire_on_saturation called twice"
        );
        state.retires_on_saturation = true;
        drop(state);
        self
    }

    /// Require `other` to be satisfied before this expectation may match.
    pub fn after<OA, OR>(self, other: &ExpectationHandle<OA, OR>) -> Self {
        self.exp
            .core
            .add_prerequisite(other.exp.core.clone());
        self
    }

    /// Append this expectation to a named sequence's prerequisite chain.
    pub fn in_sequence(self, sequence: &Sequence) -> Self {
        sequence.add(&self.exp.core);
        self
    }

    /// Gate the expectation on a condition evaluated at call time.
    #[track_caller]
    pub fn when<E: Expr<Output = bool>>(self, expr: E) -> Self {
        self.when_with(expr, CallContext::capture())
    }

    pub fn when_with<E: Expr<Output = bool>>(self, expr: E, call: CallContext) -> Self {
        let runner = current_runner();
        // The gate is evaluated on demand, never enabled; it does not
        // subscribe to its leaves.
        let condition = ExprCondition::new(&runner, expr, None);
        let mut slot = self.exp.core.when.lock();
        assert!(slot.is_none(), "when specified twice");
        *slot = Some(WhenGate {
            condition: Box::new(condition),
            call,
        });
        drop(slot);
        self
    }
}
