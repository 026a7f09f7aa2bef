use std::{
    fmt,
    ops::{
        Add,
        Sub,
    },
};

use crate::Duration;

/// An instant on the virtual clock: unsigned nanoseconds since the start of
/// the simulated epoch.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint {
    nanos: u64,
}

impl TimePoint {
    pub const START_OF_EPOCH: TimePoint = TimePoint { nanos: 0 };
    pub const END_OF_EPOCH: TimePoint = TimePoint { nanos: u64::MAX };

    pub const fn from_nanos(nanos: u64) -> Self {
        TimePoint { nanos }
    }

    pub const fn as_nanos(self) -> u64 {
        self.nanos
    }

    pub const fn as_millis(self) -> u64 {
        self.nanos / 1_000_000
    }
}

impl Add<Duration> for TimePoint {
    type Output = TimePoint;

    fn add(self, rhs: Duration) -> TimePoint {
        TimePoint {
            nanos: self.nanos.wrapping_add_signed(rhs.as_nanos()),
        }
    }
}

impl Sub<Duration> for TimePoint {
    type Output = TimePoint;

    fn sub(self, rhs: Duration) -> TimePoint {
        TimePoint {
            nanos: self.nanos.wrapping_sub(rhs.as_nanos() as u64),
        }
    }
}

impl Sub for TimePoint {
    type Output = Duration;

    /// Difference between two time points. The magnitude must fit a signed
    /// 64-bit nanosecond count; anything larger is a programmer error in the
    /// scenario.
    fn sub(self, rhs: TimePoint) -> Duration {
        let (diff, negative) = if self.nanos >= rhs.nanos {
            (self.nanos - rhs.nanos, false)
        } else {
            (rhs.nanos - self.nanos, true)
        };
        assert!(diff <= i64::MAX as u64, "time point difference overflows");
        let diff = diff as i64;
        Duration::nanoseconds(if negative { -diff } else { diff })
    }
}

impl fmt::Debug for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TimePoint::END_OF_EPOCH {
            write!(f, "end-of-epoch")
        } else {
            write!(f, "t+{}ns", self.nanos)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::TimePoint;
    use crate::Duration;

    #[test]
    fn test_epoch_bounds() {
        assert!(TimePoint::START_OF_EPOCH < TimePoint::END_OF_EPOCH);
        assert_eq!(TimePoint::START_OF_EPOCH.as_nanos(), 0);
    }

    #[test]
    fn test_signed_difference() {
        let a = TimePoint::from_nanos(100);
        let b = TimePoint::from_nanos(40);
        assert_eq!(a - b, Duration::nanoseconds(60));
        assert_eq!(b - a, Duration::nanoseconds(-60));
    }

    proptest! {
        #[test]
        fn proptest_add_then_sub(start in 0u64..1 << 60, delta in 0i64..1 << 40) {
            let tp = TimePoint::from_nanos(start);
            let d = Duration::nanoseconds(delta);
            prop_assert_eq!((tp + d) - tp, d);
            prop_assert!((tp + d) >= tp);
        }
    }
}
