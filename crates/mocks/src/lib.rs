//! The mock layer: typed expectations with matchers, cardinalities, actions,
//! ordering prerequisites, sequences, and condition gating.
//!
//! A [`Mock`] owns any number of [`FunctionMocker`]s, one per mocked
//! function. The unit under test calls `mocker.call(args)`; dispatch walks
//! the expectations in reverse insertion order ("last match wins") and every
//! deviation (unexpected, oversaturated, missing calls, unmet
//! prerequisites) is logged and counted into the scenario report.

mod action;
mod cardinality;
mod expectation;
mod matcher;
mod mocker;
mod sequence;

pub use action::{
    invoke,
    return_default,
    return_value,
    Action,
};
pub use cardinality::{
    any_count,
    at_least,
    at_most,
    between,
    exactly,
    Cardinality,
};
pub use expectation::ExpectationHandle;
pub use matcher::{
    any_value,
    by_ref,
    eq,
    ge,
    gt,
    is_false,
    is_none,
    is_some,
    is_true,
    le,
    lt,
    ne,
    not,
    Matcher,
    TupleMatchers,
};
pub use mocker::{
    ArgsFormat,
    FunctionMocker,
    Mock,
};
pub use sequence::{
    InSequence,
    Sequence,
};

/// `expect_call!(mocker, (eq(1), gt(2)))`: like
/// [`FunctionMocker::expect_call`], with the matcher expressions stringified
/// into the diagnostics.
#[macro_export]
macro_rules! expect_call {
    ($mocker:expr, ($($matcher:expr),* $(,)?)) => {
        $mocker.expect_call_with(
            ($($matcher,)*),
            ::harness::meta::CallContext::capture_with_args(&[$(stringify!($matcher)),*]),
        )
    };
}

/// `when!(handle, expr)`: like [`ExpectationHandle::when`], with the gate
/// expression stringified into the diagnostics.
#[macro_export]
macro_rules! when {
    ($handle:expr, $expr:expr) => {
        $handle.when_with(
            $expr,
            ::harness::meta::CallContext::capture_with_args(&[stringify!($expr)]),
        )
    };
}
