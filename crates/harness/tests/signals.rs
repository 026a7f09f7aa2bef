//! Signal fan-out, port semantics, filters and listeners.

use std::sync::{
    atomic::{
        AtomicUsize,
        Ordering,
    },
    Arc,
};

use harness::{
    api,
    assert_that,
    create_queue_port,
    create_sample_port,
    wait_until,
    Context,
    ExprExt,
    Signal,
    QUEUE_CAPACITY,
};
use parking_lot::Mutex;
use sim_log::LogSink;
use sim_time::Duration;

#[test]
fn test_condition_wait_wakes_exactly_on_push() {
    let (sink, _) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let signal = Signal::<i32>::new("numbers");

    let consumer_signal = signal.clone();
    context.runner("cons", move || {
        let port = create_queue_port(&consumer_signal);
        wait_until!(port.is_available());
        let value = port.pop();
        assert_that!(value == 7);
        assert_that!(api::now().as_millis() == 30);
    });
    context.runner("prod", move || {
        api::wait(Duration::milliseconds(30));
        signal.push(7);
    });

    assert_eq!(context.run(), 0);
    assert_eq!(context.report().snapshot().failed_assertions, 0);
}

#[test]
fn test_sample_port_keeps_latest_value() {
    let (sink, _) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let signal = Signal::<u32>::new("level");

    let reader_signal = signal.clone();
    context.runner("read", move || {
        let port = create_sample_port(&reader_signal);
        assert_that!(port.read() == 0);
        api::wait(Duration::milliseconds(50));
        assert_that!(port.read() == 3);
    });
    context.runner("writ", move || {
        for value in 1..=3 {
            api::wait(Duration::milliseconds(10));
            signal.push(value);
        }
    });

    assert_eq!(context.run(), 0);
    assert_eq!(context.report().snapshot().failed_assertions, 0);
}

#[test]
fn test_queue_port_preserves_order_and_size() {
    let (sink, _) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let signal = Signal::<i32>::new("queue");

    let consumer_signal = signal.clone();
    context.runner("cons", move || {
        let port = create_queue_port(&consumer_signal);
        wait_until!(port.size().eq(3usize));
        assert_that!(port.pop() == 10);
        assert_that!(port.pop() == 20);
        assert_that!(port.pop() == 30);
        assert_that!(port.is_empty());
    });
    context.runner("prod", move || {
        api::wait(Duration::milliseconds(5));
        for value in [10, 20, 30] {
            signal.push(value);
        }
    });

    assert_eq!(context.run(), 0);
    assert_eq!(context.report().snapshot().failed_assertions, 0);
}

#[test]
fn test_queue_port_overflow_latches_lost_flag() {
    let (sink, _) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let signal = Signal::<usize>::new("burst");

    let consumer_signal = signal.clone();
    context.runner("cons", move || {
        let port = create_queue_port(&consumer_signal);
        api::wait(Duration::milliseconds(10));
        assert_that!(port.len() == QUEUE_CAPACITY);
        assert_that!(port.lost_element());
        // The displaced element is the oldest one.
        assert_that!(port.pop() == 1);
    });
    context.runner("prod", move || {
        for value in 0..=QUEUE_CAPACITY {
            signal.push(value);
        }
    });

    assert_eq!(context.run(), 0);
    assert_eq!(context.report().snapshot().failed_assertions, 0);
}

#[test]
fn test_filter_drops_values_per_port() {
    let (sink, _) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let signal = Signal::<i32>::new("mixed");

    let consumer_signal = signal.clone();
    context.runner("cons", move || {
        let all = create_queue_port(&consumer_signal);
        let evens = create_queue_port(&consumer_signal);
        evens.add_filter(|value| value % 2 == 0);
        api::wait(Duration::milliseconds(10));
        assert_that!(all.len() == 4);
        assert_that!(evens.len() == 2);
        assert_that!(evens.pop() == 2);
        assert_that!(evens.pop() == 4);
    });
    context.runner("prod", move || {
        for value in 1..=4 {
            signal.push(value);
        }
    });

    assert_eq!(context.run(), 0);
    assert_eq!(context.report().snapshot().failed_assertions, 0);
}

#[test]
fn test_listener_callback_runs_on_delivery() {
    let (sink, buffer) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let signal = Signal::<i32>::new("notif");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let consumer_signal = signal.clone();
    let sink_seen = seen.clone();
    context.runner("cons", move || {
        let port = create_sample_port(&consumer_signal);
        let inner = sink_seen.clone();
        port.add_listener(move |value| {
            inner.lock().push(*value);
        });
        api::wait(Duration::milliseconds(10));
    });
    context.runner("prod", move || {
        signal.push(5);
        signal.push(6);
    });

    assert_eq!(context.run(), 0);
    assert_eq!(*seen.lock(), vec![5, 6]);
    // Callback records are attributed to the owning runner.
    assert!(buffer.contents().contains("HDL "));
    assert!(buffer.contents().contains("Handle value of 'notif'"));
}

#[test]
fn test_removed_listener_stops_firing() {
    let (sink, _) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let signal = Signal::<i32>::new("once");
    let count = Arc::new(AtomicUsize::new(0));

    let consumer_signal = signal.clone();
    let counter = count.clone();
    context.runner("cons", move || {
        let port = create_sample_port(&consumer_signal);
        let inner = counter.clone();
        let id = port.add_listener(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        api::wait(Duration::milliseconds(10));
        port.remove_listener(id);
        api::wait(Duration::milliseconds(10));
    });
    context.runner("prod", move || {
        api::wait(Duration::milliseconds(5));
        signal.push(1);
        api::wait(Duration::milliseconds(10));
        signal.push(2);
    });

    assert_eq!(context.run(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_two_publishers_interleave_deliveries() {
    // Each push yields once per subscriber, so two runners publishing at the
    // same instant alternate their deliveries instead of bursting.
    let (sink, _) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let signal = Signal::<&'static str>::new("interleaved");
    let order = Arc::new(Mutex::new(Vec::new()));

    let consumer_signal = signal.clone();
    let observed = order.clone();
    context.runner("cons", move || {
        let port = create_sample_port(&consumer_signal);
        let inner = observed.clone();
        port.add_listener(move |value| {
            inner.lock().push(*value);
        });
        api::wait(Duration::milliseconds(10));
    });
    let signal_a = signal.clone();
    context.runner("pa", move || {
        signal_a.push("a1");
        signal_a.push("a2");
    });
    context.runner("pb", move || {
        signal.push("b1");
        signal.push("b2");
    });

    assert_eq!(context.run(), 0);
    assert_eq!(*order.lock(), vec!["a1", "b1", "a2", "b2"]);
}

#[test]
fn test_push_is_logged_with_value() {
    let (sink, buffer) = LogSink::buffered();
    let context = Context::with_sink(sink);
    let signal = Signal::<i32>::new("logged");
    context.runner("main", move || {
        signal.push(42);
    });
    assert_eq!(context.run(), 0);
    let log = buffer.contents();
    assert!(log.contains("PUSH"));
    assert!(log.contains("Push value to 'logged'"));
    assert!(log.contains("42"));
}
