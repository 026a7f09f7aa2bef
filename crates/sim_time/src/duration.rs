use std::{
    fmt,
    ops::{
        Add,
        AddAssign,
        Mul,
        Sub,
        SubAssign,
    },
};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const SECONDS_PER_MINUTE: i64 = 60;
const MINUTES_PER_HOUR: i64 = 60;
const HOURS_PER_DAY: i64 = 24;

/// A signed span of simulated time with nanosecond resolution.
///
/// `INFINITY` is a designated sentinel ("wait forever"), not a value that
/// participates in arithmetic: `Duration::INFINITY + x` wraps like any other
/// addition, so callers that can see `INFINITY` must branch on it before
/// doing arithmetic. The scheduler and the runner wait loop do exactly that.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    nanos: i64,
}

impl Duration {
    pub const ZERO: Duration = Duration { nanos: 0 };
    /// The granularity of the virtual clock; used by reactive comparisons to
    /// step just past a boundary.
    pub const SMALLEST_NON_ZERO: Duration = Duration { nanos: 1 };
    pub const INFINITY: Duration = Duration { nanos: i64::MAX };

    pub const fn nanoseconds(nanos: i64) -> Self {
        Duration { nanos }
    }

    pub const fn microseconds(micros: i64) -> Self {
        Duration {
            nanos: micros * NANOS_PER_MICRO,
        }
    }

    pub const fn milliseconds(millis: i64) -> Self {
        Duration {
            nanos: millis * NANOS_PER_MILLI,
        }
    }

    pub const fn seconds(seconds: i64) -> Self {
        Duration {
            nanos: seconds * NANOS_PER_SECOND,
        }
    }

    pub const fn minutes(minutes: i64) -> Self {
        Duration::seconds(minutes * SECONDS_PER_MINUTE)
    }

    pub const fn hours(hours: i64) -> Self {
        Duration::minutes(hours * MINUTES_PER_HOUR)
    }

    pub const fn days(days: i64) -> Self {
        Duration::hours(days * HOURS_PER_DAY)
    }

    pub const fn as_nanos(self) -> i64 {
        self.nanos
    }

    pub const fn as_micros(self) -> i64 {
        self.nanos / NANOS_PER_MICRO
    }

    pub const fn as_millis(self) -> i64 {
        self.nanos / NANOS_PER_MILLI
    }

    pub const fn as_secs(self) -> i64 {
        self.nanos / NANOS_PER_SECOND
    }

    pub const fn is_infinite(self) -> bool {
        self.nanos == i64::MAX
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration {
            nanos: self.nanos + rhs.nanos,
        }
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        self.nanos += rhs.nanos;
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration {
            nanos: self.nanos - rhs.nanos,
        }
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Duration) {
        self.nanos -= rhs.nanos;
    }
}

impl Mul<i64> for Duration {
    type Output = Duration;

    fn mul(self, factor: i64) -> Duration {
        Duration {
            nanos: self.nanos * factor,
        }
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "inf")
        } else {
            write!(f, "{}ns", self.nanos)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::Duration;

    #[test]
    fn test_conversion_factors() {
        assert_eq!(Duration::microseconds(1).as_nanos(), 1_000);
        assert_eq!(Duration::milliseconds(1).as_nanos(), 1_000_000);
        assert_eq!(Duration::seconds(1).as_nanos(), 1_000_000_000);
        assert_eq!(Duration::minutes(2).as_secs(), 120);
        assert_eq!(Duration::hours(1).as_secs(), 3600);
        assert_eq!(Duration::days(1).as_secs(), 86400);
    }

    #[test]
    fn test_truncating_accessors() {
        let d = Duration::nanoseconds(1_999_999);
        assert_eq!(d.as_millis(), 1);
        assert_eq!(d.as_micros(), 1_999);
    }

    #[test]
    fn test_sentinels() {
        assert!(Duration::ZERO < Duration::SMALLEST_NON_ZERO);
        assert!(Duration::SMALLEST_NON_ZERO < Duration::INFINITY);
        assert!(Duration::INFINITY.is_infinite());
        assert!(!Duration::seconds(1).is_infinite());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 1024, ..ProptestConfig::default() })]

        #[test]
        fn proptest_add_sub_roundtrip(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
            let da = Duration::nanoseconds(a);
            let db = Duration::nanoseconds(b);
            prop_assert_eq!(da + db - db, da);
        }

        #[test]
        fn proptest_total_order(a in any::<i64>(), b in any::<i64>()) {
            let da = Duration::nanoseconds(a);
            let db = Duration::nanoseconds(b);
            prop_assert_eq!(da < db, a < b);
            prop_assert_eq!(da == db, a == b);
        }
    }
}
