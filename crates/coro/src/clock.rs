use sim_time::TimePoint;

/// The virtual clock. Owned by the scheduler; nothing else mutates it.
pub struct VirtualClock {
    now: TimePoint,
}

impl VirtualClock {
    pub fn new() -> Self {
        VirtualClock {
            now: TimePoint::START_OF_EPOCH,
        }
    }

    pub fn now(&self) -> TimePoint {
        self.now
    }

    /// Move the clock forward to `to`. Moving backwards is a scheduler bug.
    pub fn advance_to(&mut self, to: TimePoint) {
        assert!(to >= self.now, "virtual clock may only move forward");
        self.now = to;
    }

    pub fn jump_to_end_of_epoch(&mut self) {
        self.now = TimePoint::END_OF_EPOCH;
    }
}

#[cfg(test)]
mod tests {
    use sim_time::{
        Duration,
        TimePoint,
    };

    use super::VirtualClock;

    #[test]
    fn test_advance() {
        let mut clock = VirtualClock::new();
        assert_eq!(clock.now(), TimePoint::START_OF_EPOCH);
        clock.advance_to(TimePoint::START_OF_EPOCH + Duration::seconds(3));
        assert_eq!(clock.now().as_millis(), 3000);
        clock.jump_to_end_of_epoch();
        assert_eq!(clock.now(), TimePoint::END_OF_EPOCH);
    }

    #[test]
    #[should_panic(expected = "only move forward")]
    fn test_no_backwards() {
        let mut clock = VirtualClock::new();
        clock.advance_to(TimePoint::from_nanos(10));
        clock.advance_to(TimePoint::from_nanos(5));
    }
}
