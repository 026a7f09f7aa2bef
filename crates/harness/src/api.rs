//! The scenario-facing API: free functions that resolve the runner currently
//! executing.
//!
//! These must be called from inside a runner body (or a callback attributed
//! to one). The capture macros in [`crate::macros`] wrap the `_with` variants
//! and stringify their condition expressions for the log.

use sim_log::{
    LogTag,
    RULE_LENGTH,
};
use sim_time::{
    Duration,
    TimePoint,
};

use crate::{
    condition::{
        ConditionListener,
        DynCondition,
        ExprCondition,
    },
    context::{
        current_context,
        current_runner,
    },
    expr::Expr,
    meta::CallContext,
    runner::Runner,
};

/// Current simulated time.
pub fn now() -> TimePoint {
    current_runner().now()
}

/// Let the current runner sleep for `duration` of simulated time.
#[track_caller]
pub fn wait(duration: Duration) {
    wait_with(duration, CallContext::capture());
}

pub fn wait_with(duration: Duration, call: CallContext) {
    let runner = current_runner();
    runner
        .logger()
        .record(LogTag::Wait, runner.now(), call.file, call.line)
        .line(format!("Wait for {} ms", duration.as_millis()));

    runner.wait_internal(duration, None);

    runner
        .logger()
        .record(LogTag::Wait, runner.now(), call.file, call.line)
        .line(format!("Timeout of {} ms elapsed!", duration.as_millis()));
}

/// Suspend the current runner until `expr` evaluates to true.
#[track_caller]
pub fn wait_until<E: Expr<Output = bool>>(expr: E) {
    wait_until_with(expr, CallContext::capture());
}

pub fn wait_until_with<E: Expr<Output = bool>>(expr: E, call: CallContext) {
    let runner = current_runner();
    let condition = runner_condition(&runner, expr);

    runner
        .logger()
        .record(LogTag::Wait, runner.now(), call.file, call.line)
        .line("Wait for condition:")
        .line(format!("'{}'", call.arg(0)));

    condition.enable();
    let got_timeout = runner.wait_internal(Duration::INFINITY, Some(&condition));
    assert!(!got_timeout, "infinite wait reported a timeout");
    condition.disable();

    runner
        .logger()
        .record(LogTag::Resume, runner.now(), call.file, call.line)
        .line("Condition is fulfilled:")
        .line(format!("'{}'", call.arg(0)));
}

/// Suspend until `expr` is true or `timeout` elapsed. Returns true iff the
/// condition was fulfilled.
#[track_caller]
pub fn wait_until_for<E: Expr<Output = bool>>(expr: E, timeout: Duration) -> bool {
    wait_until_for_with(expr, timeout, CallContext::capture())
}

pub fn wait_until_for_with<E: Expr<Output = bool>>(
    expr: E,
    timeout: Duration,
    call: CallContext,
) -> bool {
    let runner = current_runner();
    let condition = runner_condition(&runner, expr);

    runner
        .logger()
        .record(LogTag::Wait, runner.now(), call.file, call.line)
        .line("Wait for condition:")
        .line(format!("'{}'", call.arg(0)));

    condition.enable();
    let got_timeout = runner.wait_internal(timeout, Some(&condition));
    condition.disable();

    let mut record = runner
        .logger()
        .record(LogTag::Resume, runner.now(), call.file, call.line);
    if got_timeout {
        record.line(format!(
            "Condition is not fulfilled (timeout after {} ms):",
            timeout.as_millis()
        ));
    } else {
        record.line("Condition is fulfilled:");
    }
    record.line(format!("'{}'", call.arg(0)));
    drop(record);

    !got_timeout
}

fn runner_condition<E: Expr<Output = bool>>(
    runner: &Runner,
    expr: E,
) -> ExprCondition<E> {
    let listener: std::sync::Arc<dyn ConditionListener> = runner.core.clone();
    ExprCondition::new(runner, expr, Some(std::sync::Arc::downgrade(&listener)))
}

/// Hard assertion: a false condition is a FAIL and flips the exit code.
/// Returns the condition so scenarios can chain on it.
#[track_caller]
pub fn assert_that(condition: bool) -> bool {
    assert_that_with(condition, CallContext::capture())
}

pub fn assert_that_with(condition: bool, call: CallContext) -> bool {
    let runner = current_runner();
    if condition {
        runner.report().assertion_passed();
        runner
            .logger()
            .record(LogTag::Pass, runner.now(), call.file, call.line)
            .line("PASS: the condition evaluates to true:")
            .line(format!("'{}'", call.arg(0)));
    } else {
        runner.report().assertion_failed();
        runner
            .logger()
            .record(LogTag::Fail, runner.now(), call.file, call.line)
            .line("FAIL: the condition evaluates to false:")
            .line(format!("'{}'", call.arg(0)));
    }
    condition
}

/// Soft assertion: a false condition is logged and counted as a warning but
/// does not fail the scenario.
#[track_caller]
pub fn check_that(condition: bool) -> bool {
    check_that_with(condition, CallContext::capture())
}

pub fn check_that_with(condition: bool, call: CallContext) -> bool {
    let runner = current_runner();
    if !condition {
        runner.report().check_failed();
        runner
            .logger()
            .record(LogTag::Warn, runner.now(), call.file, call.line)
            .line("WARN: the condition evaluates to false:")
            .line(format!("'{}'", call.arg(0)));
    }
    condition
}

/// Free-form log line under the current runner's identity.
#[track_caller]
pub fn info(text: impl AsRef<str>) {
    let call = CallContext::capture();
    let runner = current_runner();
    runner
        .logger()
        .record(LogTag::Info, runner.now(), call.file, call.line)
        .line(text.as_ref());
}

/// Free-form warning line; logged, not counted.
#[track_caller]
pub fn warn(text: impl AsRef<str>) {
    let call = CallContext::capture();
    let runner = current_runner();
    runner
        .logger()
        .record(LogTag::Warn, runner.now(), call.file, call.line)
        .line(text.as_ref());
}

/// A bare horizontal rule in the log.
pub fn line() {
    let runner = current_runner();
    runner
        .logger()
        .record_timeless(LogTag::Info)
        .line("-".repeat(RULE_LENGTH));
}

/// Begin a named section; ending happens when the guard drops.
pub fn section(name: &str) -> Section {
    let runner = current_runner();
    runner.start_section(Some(name));
    Section { runner }
}

/// Begin an unnamed (numbered) section.
pub fn next_section() -> Section {
    let runner = current_runner();
    runner.start_section(None);
    Section { runner }
}

/// RAII guard for a log section.
pub struct Section {
    runner: Runner,
}

impl Drop for Section {
    fn drop(&mut self) {
        self.runner.end_section();
    }
}

/// Uniformly random duration in `[from, to]`, drawn from the scenario's
/// seeded generator.
pub fn random_duration(from: Duration, to: Duration) -> Duration {
    current_context().random_duration(from, to)
}

/// Biased coin from the scenario's seeded generator.
pub fn coin_flip(probability: f64) -> bool {
    current_context().coin_flip(probability)
}
