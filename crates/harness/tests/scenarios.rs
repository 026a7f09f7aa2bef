//! End-to-end scenarios driving the virtual clock, conditions, stopwatches,
//! timers and invariants.

use std::sync::{
    atomic::{
        AtomicU64,
        Ordering,
    },
    Arc,
};

use harness::{
    api,
    assert_that,
    create_invariant,
    wait_until,
    Context,
    Counters,
    ExprExt,
    Value,
};
use sim_log::LogSink;
use sim_time::Duration;

fn run_single(body: impl FnOnce() + Send + 'static) -> (i32, Counters, String) {
    sim_log::testing::config_test();
    let (sink, buffer) = LogSink::buffered();
    let context = Context::with_sink(sink);
    context.runner("main", body);
    let code = context.run();
    (code, context.report().snapshot(), buffer.contents())
}

#[test]
fn test_pure_time_wait() {
    let (code, counters, _) = run_single(|| {
        api::wait(Duration::milliseconds(100));
        assert_that!(api::now().as_millis() == 100);
    });
    assert_eq!(code, 0);
    assert_eq!(counters.failed_assertions, 0);
    assert_eq!(counters.passed_assertions, 1);
}

#[test]
fn test_wait_advances_exactly() {
    let (code, counters, _) = run_single(|| {
        let before = api::now();
        api::wait(Duration::seconds(3600));
        assert_that!(api::now() - before == Duration::seconds(3600));
        let before = api::now();
        api::wait(Duration::nanoseconds(1));
        assert_that!(api::now() - before == Duration::nanoseconds(1));
    });
    assert_eq!(code, 0);
    assert_eq!(counters.failed_assertions, 0);
}

#[test]
fn test_time_is_monotonic_across_operations() {
    let (code, counters, _) = run_single(|| {
        let mut previous = api::now();
        for _ in 0..10 {
            api::wait(Duration::milliseconds(7));
            let now = api::now();
            assert_that!(now >= previous);
            previous = now;
        }
    });
    assert_eq!(code, 0);
    assert_eq!(counters.failed_assertions, 0);
}

#[test]
fn test_wait_until_value_condition() {
    let (sink, _buffer) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let value = Value::new(0);

    let watched = value.clone();
    context.runner("wtch", move || {
        wait_until!(watched.expr().ge(10));
        assert_that!(api::now().as_millis() == 25);
    });
    let setter = value.clone();
    context.runner("set", move || {
        api::wait(Duration::milliseconds(25));
        setter.set(12);
    });

    assert_eq!(context.run(), 0);
    assert_eq!(context.report().snapshot().failed_assertions, 0);
}

#[test]
fn test_wait_until_timeout_expires() {
    let (code, counters, _) = run_single(|| {
        let value = Value::new(false);
        let before = api::now();
        let fulfilled = wait_until!(value.expr().eq(true), Duration::milliseconds(50));
        assert_that!(!fulfilled);
        assert_that!(api::now() - before == Duration::milliseconds(50));
    });
    assert_eq!(code, 0);
    assert_eq!(counters.failed_assertions, 0);
}

#[test]
fn test_stopwatch_boundary() {
    let (code, counters, _) = run_single(|| {
        let stopwatch = harness::create_stopwatch();
        stopwatch.start();
        wait_until!(stopwatch.elapsed_ge(Duration::seconds(5)));
        assert_that!(api::now().as_millis() == 5000);
        assert_that!(stopwatch.lap() == Duration::seconds(5));
    });
    assert_eq!(code, 0);
    assert_eq!(counters.failed_assertions, 0);
}

#[test]
fn test_stopwatch_round_trip() {
    let (code, counters, _) = run_single(|| {
        let stopwatch = harness::create_stopwatch();
        stopwatch.start();
        api::wait(Duration::milliseconds(250));
        assert_that!(stopwatch.lap() == Duration::milliseconds(250));
        stopwatch.stop();
        api::wait(Duration::milliseconds(250));
        assert_that!(stopwatch.lap() == Duration::milliseconds(250));
    });
    assert_eq!(code, 0);
    assert_eq!(counters.failed_assertions, 0);
}

#[test]
fn test_stopwatch_strictly_greater_fires_one_tick_late() {
    let (code, counters, _) = run_single(|| {
        let stopwatch = harness::create_stopwatch();
        stopwatch.start();
        wait_until!(stopwatch.elapsed_gt(Duration::milliseconds(10)));
        assert_that!(stopwatch.lap() == Duration::milliseconds(10) + Duration::SMALLEST_NON_ZERO);
    });
    assert_eq!(code, 0);
    assert_eq!(counters.failed_assertions, 0);
}

#[test]
fn test_stopwatch_reset_restarts_from_zero() {
    let (code, counters, _) = run_single(|| {
        let stopwatch = harness::create_stopwatch();
        stopwatch.start();
        api::wait(Duration::seconds(2));
        stopwatch.reset();
        assert_that!(stopwatch.lap() == Duration::ZERO);
        api::wait(Duration::seconds(1));
        assert_that!(stopwatch.lap() == Duration::seconds(1));
    });
    assert_eq!(code, 0);
    assert_eq!(counters.failed_assertions, 0);
}

#[test]
fn test_invariant_violation() {
    let (code, counters, log) = run_single(|| {
        let stopwatch = harness::create_stopwatch();
        let _invariant = create_invariant!(stopwatch.elapsed_le(Duration::seconds(3)));
        stopwatch.start();
        api::wait(Duration::seconds(5));
    });
    assert_eq!(code, 1);
    assert_eq!(counters.invariant_violations, 1);
    assert!(log.contains("Invariant does not hold"));
}

#[test]
fn test_invariant_that_holds() {
    let (code, counters, _) = run_single(|| {
        let value = Value::new(1);
        let invariant = create_invariant!(value.expr().gt(0));
        api::wait(Duration::seconds(10));
        invariant.stop();
        assert_that!(invariant.holds());
    });
    assert_eq!(code, 0);
    assert_eq!(counters.invariant_violations, 0);
}

#[test]
fn test_invariant_violated_at_start() {
    let (code, counters, _) = run_single(|| {
        let value = Value::new(false);
        let _invariant = create_invariant!(value.expr().eq(true));
    });
    assert_eq!(code, 1);
    assert_eq!(counters.invariant_violations, 1);
}

#[test]
fn test_invariant_is_violated_only_once() {
    let (code, counters, _) = run_single(|| {
        let value = Value::new(0);
        let _invariant = create_invariant!(value.expr().lt(10));
        value.set(11);
        value.set(12);
        value.set(13);
    });
    assert_eq!(code, 1);
    assert_eq!(counters.invariant_violations, 1);
}

#[test]
fn test_timer_fires_at_due_time() {
    let fired_at = Arc::new(AtomicU64::new(u64::MAX));
    let observed = fired_at.clone();
    let (code, _, log) = run_single(move || {
        let _timer = harness::create_timer_started(
            move |_timer| {
                observed.store(api::now().as_millis(), Ordering::SeqCst);
            },
            Duration::milliseconds(40),
        );
        api::wait(Duration::milliseconds(100));
    });
    assert_eq!(code, 0);
    assert_eq!(fired_at.load(Ordering::SeqCst), 40);
    assert!(log.contains("Timer expired after 40 ms"));
}

#[test]
fn test_timer_cancelled_before_expiry_does_not_fire() {
    let fired = Arc::new(AtomicU64::new(0));
    let observed = fired.clone();
    let (code, ..) = run_single(move || {
        let timer = harness::create_timer_started(
            move |_timer| {
                observed.fetch_add(1, Ordering::SeqCst);
            },
            Duration::milliseconds(40),
        );
        api::wait(Duration::milliseconds(10));
        timer.stop();
        api::wait(Duration::milliseconds(100));
    });
    assert_eq!(code, 0);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_timer_cancelled_at_expiry_instant_still_fires_once() {
    let fired = Arc::new(AtomicU64::new(0));
    let observed = fired.clone();
    let (code, ..) = run_single(move || {
        // Due right now; the cancellation below removes a job that is
        // already due, which executes it exactly once.
        let timer = harness::create_timer_started(
            move |_timer| {
                observed.fetch_add(1, Ordering::SeqCst);
            },
            Duration::ZERO,
        );
        timer.stop();
        api::wait(Duration::milliseconds(100));
    });
    assert_eq!(code, 0);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_timer_fires_after_process_body_returns() {
    let fired_at = Arc::new(AtomicU64::new(u64::MAX));
    let observed = fired_at.clone();
    let (code, ..) = run_single(move || {
        let _timer = harness::create_timer_started(
            move |_timer| {
                observed.store(api::now().as_millis(), Ordering::SeqCst);
            },
            Duration::milliseconds(500),
        );
        // Return immediately; the post-process wait keeps the runner's jobs
        // alive.
    });
    assert_eq!(code, 0);
    assert_eq!(fired_at.load(Ordering::SeqCst), 500);
}

#[test]
fn test_check_that_warns_without_failing() {
    let (code, counters, log) = run_single(|| {
        harness::check_that!(1 + 1 == 3);
    });
    assert_eq!(code, 0, "a failed check must not flip the exit code");
    assert_eq!(counters.failed_checks, 1);
    assert!(log.contains("WARN"));
}

#[test]
fn test_failed_assertion_flips_exit_code() {
    let (code, counters, log) = run_single(|| {
        assert_that!(false);
    });
    assert_eq!(code, 1);
    assert_eq!(counters.failed_assertions, 1);
    assert!(log.contains("FAIL: the condition evaluates to false"));
    assert!(log.contains("'false'"));
}

#[test]
fn test_sections_appear_in_log() {
    let (code, _, log) = run_single(|| {
        {
            let _section = api::section("setup");
            api::wait(Duration::milliseconds(1));
        }
        {
            let _section = api::next_section();
            api::wait(Duration::milliseconds(1));
        }
    });
    assert_eq!(code, 0);
    assert!(log.contains("setup (1)"));
    assert!(log.contains("End section"));
    assert!(log.contains("(2)"));
}

#[test]
fn test_two_runners_same_deadline_wake_in_creation_order() {
    let (sink, _) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for name in ["one", "two", "thr"] {
        let order = order.clone();
        context.runner(name, move || {
            api::wait(Duration::milliseconds(20));
            order.lock().push(name);
        });
    }
    assert_eq!(context.run(), 0);
    assert_eq!(*order.lock(), vec!["one", "two", "thr"]);
}

#[test]
fn test_explicit_wakeup_interrupts_wait() {
    let (sink, _) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let sleeper = context.runner("slpr", || {
        let before = api::now();
        api::wait(Duration::seconds(1000));
        // Wakeup happened long before the timeout.
        assert_that!(api::now() - before == Duration::milliseconds(15));
    });
    context.runner("wakr", move || {
        api::wait(Duration::milliseconds(15));
        sleeper.wakeup();
    });
    assert_eq!(context.run(), 0);
    assert_eq!(context.report().snapshot().failed_assertions, 0);
}

#[test]
fn test_random_draws_are_reproducible() {
    let (sink_a, _) = LogSink::buffered();
    let (sink_b, _) = LogSink::buffered();
    let draws = |sink| {
        let context = Context::with_sink_and_seed(sink, 7);
        let out = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sums = out.clone();
        context.runner("main", move || {
            for _ in 0..8 {
                sums.lock().push(
                    api::random_duration(Duration::ZERO, Duration::seconds(10)).as_nanos(),
                );
            }
        });
        context.run();
        Arc::try_unwrap(out).unwrap().into_inner()
    };
    assert_eq!(draws(sink_a), draws(sink_b));
}
