//! A thermostat scenario: an environment runner publishes temperature
//! samples, a controller runner drives a mocked heater and must keep the
//! simulated room inside its comfort band.
//!
//! Run with `cargo run --bin thermostat`; the process exit code follows the
//! scenario outcome.

use std::process::ExitCode;

use harness::{
    api,
    assert_that,
    create_invariant,
    create_queue_port,
    wait_until,
    Context,
    ExprExt,
    Signal,
    Value,
};
use mocks::{
    eq,
    expect_call,
    return_value,
    when,
    Mock,
    Sequence,
};
use sim_time::Duration;

const COMFORT_MIN: i32 = 18;
const COMFORT_MAX: i32 = 24;

fn main() -> ExitCode {
    let context = Context::new();
    let temperature = Signal::<i32>::new("temperature");
    let room = Value::new(21);

    // The environment: the room loses one degree every ten minutes while the
    // heater is off and gains one while it is on.
    let heater_on = Value::new(false);
    let env_signal = temperature.clone();
    let env_room = room.clone();
    let env_heater = heater_on.clone();
    context.runner("env", move || {
        for _ in 0..24 {
            api::wait(Duration::minutes(10));
            let drift = if env_heater.get() { 1 } else { -1 };
            let reading = env_room.get() + drift;
            env_room.set(reading);
            env_signal.push(reading);
        }
    });

    // The controller under test, talking to a mocked heater.
    let ctl_heater = heater_on.clone();
    let ctl_room = room.clone();
    context.runner("ctl", move || {
        let mock = Mock::new("heater");
        let set_power = mock.function::<(bool,), bool>("set_power", &["on"]);

        // Power-up handshake must precede everything else.
        let boot = mock.function::<(), bool>("boot", &[]);
        let sequence = Sequence::new();
        let booted = expect_call!(boot, ())
            .will_once(return_value(true))
            .in_sequence(&sequence);
        let cold = ctl_room.clone();
        when!(
            expect_call!(set_power, (eq(true),))
                .will_repeatedly(return_value(true))
                .after(&booted),
            cold.expr().lt(COMFORT_MIN + 2)
        );
        let warm = ctl_room.clone();
        when!(
            expect_call!(set_power, (eq(false),))
                .will_repeatedly(return_value(true))
                .after(&booted),
            warm.expr().gt(COMFORT_MAX - 2)
        );

        let port = create_queue_port(&temperature);
        let comfort = create_invariant!(
            ctl_room.expr().ge(COMFORT_MIN).and(ctl_room.expr().le(COMFORT_MAX))
        );

        assert_that!(boot.call(()));

        let _section = api::section("regulate");
        for _ in 0..24 {
            wait_until!(port.is_available());
            let reading = port.pop();
            if reading <= COMFORT_MIN + 1 && !ctl_heater.get() {
                assert_that!(set_power.call((true,)));
                ctl_heater.set(true);
            } else if reading >= COMFORT_MAX - 1 && ctl_heater.get() {
                assert_that!(set_power.call((false,)));
                ctl_heater.set(false);
            }
        }
        drop(_section);

        comfort.stop();
        assert_that!(comfort.holds());
        api::info(format!("final temperature: {}", ctl_room.get()));
    });

    ExitCode::from(context.run() as u8)
}
