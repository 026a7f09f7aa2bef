//! Mock objects and per-function expectation registries.

use std::{
    fmt::Debug,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
};

use harness::{
    context::{
        current_context,
        current_runner,
    },
    meta::CallContext,
    Context,
};
use itertools::Itertools;
use parking_lot::Mutex;
use sim_log::LogTag;

use crate::{
    expectation::{
        ExpectationCore,
        ExpectationHandle,
        TypedExpectation,
    },
    matcher::TupleMatchers,
    sequence::ImplicitSequence,
};

/// Per-argument `Debug` rendering of an argument tuple, for call records.
pub trait ArgsFormat: Send {
    fn formatted(&self) -> Vec<String>;
}

impl ArgsFormat for () {
    fn formatted(&self) -> Vec<String> {
        Vec::new()
    }
}

macro_rules! args_format {
    ($($idx:tt $ty:ident),+) => {
        impl<$($ty: Debug + Send),+> ArgsFormat for ($($ty,)+) {
            fn formatted(&self) -> Vec<String> {
                vec![$(format!("{:?}", self.$idx)),+]
            }
        }
    };
}

args_format!(0 T0);
args_format!(0 T0, 1 T1);
args_format!(0 T0, 1 T1, 2 T2);
args_format!(0 T0, 1 T1, 2 T2, 3 T3);

trait PassiveMode: Send + Sync {
    fn enter_passive_mode(&self);
}

struct MockInner {
    name: String,
    mockers: Mutex<Vec<Arc<dyn PassiveMode>>>,
}

impl Drop for MockInner {
    fn drop(&mut self) {
        // Drop the mockers' half of the shared ownership; expectations stay
        // alive through the recorded list for the final diagnostic pass.
        for mocker in self.mockers.lock().drain(..) {
            mocker.enter_passive_mode();
        }
    }
}

/// A mock object: a named bag of mocked functions. Dropping it sends every
/// function into passive mode; missing-call checks still run at scenario
/// end.
pub struct Mock {
    inner: Arc<MockInner>,
}

impl Mock {
    pub fn new(name: &str) -> Self {
        Mock {
            inner: Arc::new(MockInner {
                name: name.to_owned(),
                mockers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register a mocked function with the given parameter names. The
    /// mocker's argument tuple and return type fix the call signature.
    #[track_caller]
    pub fn function<A, R>(&self, name: &str, params: &[&str]) -> FunctionMocker<A, R>
    where
        A: ArgsFormat + Send + 'static,
        R: Send + 'static,
    {
        let mocker = FunctionMocker {
            inner: Arc::new(MockerInner {
                function_name: name.to_owned(),
                param_names: params.iter().map(|p| (*p).to_owned()).collect(),
                mock_call: CallContext::capture(),
                expectations: Mutex::new(Vec::new()),
                recorded: Arc::new(Mutex::new(Vec::new())),
                passive: AtomicBool::new(false),
            }),
        };
        self.inner.mockers.lock().push(mocker.inner.clone());

        // Missing calls are reported when the scenario finishes, whether or
        // not the mock is still alive by then.
        let recorded = mocker.inner.recorded.clone();
        current_context().add_end_check(Box::new(move |context| {
            for core in recorded.lock().iter() {
                report_missing_call(context, core);
            }
        }));
        mocker
    }
}

fn report_missing_call(context: &Context, core: &Arc<ExpectationCore>) {
    if core.is_satisfied() {
        return;
    }
    context.report().missing_call();
    context
        .logger()
        .record_timeless(LogTag::Fail)
        .line(format!("Missing function call for '{}'", core.signature()))
        .line(format!("Expected: {}", core.cardinality().describe()))
        .line(format!(
            "     But: {}",
            core.cardinality().describe_actual(core.call_count())
        ));
}

struct MockerInner<A, R> {
    function_name: String,
    param_names: Vec<String>,
    mock_call: CallContext,
    /// Insertion order; dispatch walks it in reverse so later expectations
    /// override earlier ones.
    expectations: Mutex<Vec<Arc<TypedExpectation<A, R>>>>,
    /// Every expectation ever added, kept for the end-of-scenario
    /// missing-call pass. Survives passive mode.
    recorded: Arc<Mutex<Vec<Arc<ExpectationCore>>>>,
    passive: AtomicBool,
}

impl<A: Send + 'static, R: Send + 'static> PassiveMode for MockerInner<A, R> {
    fn enter_passive_mode(&self) {
        self.passive.store(true, Ordering::SeqCst);
        self.expectations.lock().clear();
    }
}

/// Registry of expectations for one mocked function, and its dispatcher.
pub struct FunctionMocker<A, R> {
    inner: Arc<MockerInner<A, R>>,
}

impl<A, R> Clone for FunctionMocker<A, R> {
    fn clone(&self) -> Self {
        FunctionMocker {
            inner: self.inner.clone(),
        }
    }
}

impl<A, R> FunctionMocker<A, R>
where
    A: ArgsFormat + Send + 'static,
    R: Debug + Default + Send + 'static,
{
    /// Add an expectation over the given argument matchers.
    #[track_caller]
    pub fn expect_call(&self, matchers: impl TupleMatchers<A> + 'static) -> ExpectationHandle<A, R> {
        self.expect_call_with(matchers, CallContext::capture())
    }

    pub fn expect_call_with(
        &self,
        matchers: impl TupleMatchers<A> + 'static,
        call: CallContext,
    ) -> ExpectationHandle<A, R> {
        assert!(
            !self.inner.passive.load(Ordering::SeqCst),
            "expectation added to a destroyed mock"
        );
        let core = ExpectationCore::new(call, &self.inner.function_name, &self.inner.param_names);
        let typed = TypedExpectation::new(core, Box::new(matchers));
        self.inner.expectations.lock().push(typed.clone());
        self.inner.recorded.lock().push(typed.core.clone());

        // An active InSequence guard chains each new expectation to the
        // previous one.
        if let Some(userdata) = current_runner().userdata() {
            if let Ok(sequence) = userdata.downcast::<ImplicitSequence>() {
                sequence.add(&typed.core);
            }
        }
        ExpectationHandle { exp: typed }
    }

    /// Dispatch a call to the mocked function.
    pub fn call(&self, args: A) -> R {
        let (chosen, fallback) = self.find_matching(&args);
        let Some(expectation) = chosen.or(fallback) else {
            return self.unexpected_no_match(&args);
        };
        let core = &expectation.core;
        if core.is_saturated() || !core.is_when_fulfilled() {
            // Saturated but not retired, or gated off: counted against the
            // expectation, reported, default returned.
            current_runner().report().oversaturated_call();
            return self.unexpected_with_expectation(&expectation);
        }
        self.dispatch(&expectation, &args)
    }

    /// Reverse-insertion-order search. A match that is unusable only because
    /// of unmet prerequisites or an unfulfilled `when` is remembered as the
    /// fallback: it still produces the most useful diagnostic if nothing
    /// better matches. Every disqualified match overwrites the fallback, so
    /// the oldest one in scan order is the one reported.
    fn find_matching(
        &self,
        args: &A,
    ) -> (
        Option<Arc<TypedExpectation<A, R>>>,
        Option<Arc<TypedExpectation<A, R>>>,
    ) {
        let expectations = self.inner.expectations.lock().clone();
        let mut fallback = None;
        for expectation in expectations.iter().rev() {
            if !expectation.is_match(args) {
                continue;
            }
            let core = &expectation.core;
            let retired = core.is_saturated() && core.retires_on_saturation();
            if retired {
                continue;
            }
            if core.prerequisites_met() && core.is_when_fulfilled() {
                return (Some(expectation.clone()), fallback);
            }
            fallback = Some(expectation.clone());
        }
        (None, fallback)
    }

    fn dispatch(&self, expectation: &Arc<TypedExpectation<A, R>>, args: &A) -> R {
        let core = &expectation.core;
        let runner = current_runner();
        let prerequisites_met = core.prerequisites_met();
        if !prerequisites_met {
            runner.report().unmet_prerequisite();
        }

        let width = self.param_width();
        let mut record = runner.logger().record(
            LogTag::Mock,
            runner.now(),
            core.call.file,
            core.call.line,
        );
        record.line(format!(
            "Call to mock function '{}'{}",
            self.declaration(),
            if self.inner.param_names.is_empty() {
                ""
            } else {
                " with:"
            }
        ));
        for (name, value) in self.inner.param_names.iter().zip(args.formatted()) {
            record.line(format!("{name:>width$}: {value}"));
        }

        let result = expectation.perform_next(args);
        record.line(format!("{:>width$}: {result:?}", "return"));
        drop(record);

        if !prerequisites_met {
            self.log_unmet_prerequisites(core);
        }
        result
    }

    fn unexpected_no_match(&self, args: &A) -> R {
        let runner = current_runner();
        runner.report().unexpected_call();
        let width = self.param_width();
        let mut record = runner.logger().record(
            LogTag::Fail,
            runner.now(),
            self.inner.mock_call.file,
            self.inner.mock_call.line,
        );
        record.line(format!(
            "Unexpected call to mock function '{}'{}",
            self.declaration(),
            if self.inner.param_names.is_empty() {
                ""
            } else {
                " with:"
            }
        ));
        for (name, value) in self.inner.param_names.iter().zip(args.formatted()) {
            record.line(format!("{name:>width$}: {value}"));
        }
        let result = R::default();
        record.line(format!("{:>width$}: {result:?}", "return"));
        result
    }

    fn unexpected_with_expectation(&self, expectation: &Arc<TypedExpectation<A, R>>) -> R {
        let core = &expectation.core;
        let runner = current_runner();
        let mut record = runner.logger().record(
            LogTag::Fail,
            runner.now(),
            core.call.file,
            core.call.line,
        );
        record.line(format!(
            "Unexpected function call for '{}'",
            core.signature()
        ));
        if core.is_saturated() {
            record.line(format!("Expected: {}", core.cardinality().describe()));
        } else if core.has_when() {
            record.line(format!(
                "    when: '{}' not fulfilled!",
                core.when_text()
            ));
        }
        let result = R::default();
        record.line(format!(
            "{:>width$}: {result:?}",
            "return",
            width = self.param_width()
        ));
        result
    }

    fn log_unmet_prerequisites(&self, core: &Arc<ExpectationCore>) {
        let runner = current_runner();
        for prerequisite in core.prerequisites() {
            if prerequisite.is_satisfied() {
                continue;
            }
            runner
                .logger()
                .record(
                    LogTag::Fail,
                    runner.now(),
                    prerequisite.call.file,
                    prerequisite.call.line,
                )
                .line(format!("Unmet prerequisite '{}'", prerequisite.signature()))
                .line(format!(
                    "Expected: {}",
                    prerequisite.cardinality().describe()
                ));
        }
    }

    /// `name(a, b)`: the declaration with parameter names.
    fn declaration(&self) -> String {
        format!(
            "{}({})",
            self.inner.function_name,
            self.inner.param_names.iter().join(", ")
        )
    }

    fn param_width(&self) -> usize {
        self.inner
            .param_names
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max("return".len())
    }
}
