//! How often an expectation may and must be called.

/// A satisfied/saturated predicate over call counts. Every builder reduces
/// to an inclusive `[min, max]` range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cardinality {
    min: usize,
    max: usize,
}

pub fn exactly(count: usize) -> Cardinality {
    between(count, count)
}

pub fn at_most(max: usize) -> Cardinality {
    between(0, max)
}

pub fn at_least(min: usize) -> Cardinality {
    between(min, usize::MAX)
}

pub fn between(min: usize, max: usize) -> Cardinality {
    assert!(min <= max);
    Cardinality { min, max }
}

pub fn any_count() -> Cardinality {
    between(0, usize::MAX)
}

impl Cardinality {
    /// The call count is acceptable as a final tally.
    pub fn is_satisfied(&self, calls: usize) -> bool {
        calls >= self.min && calls <= self.max
    }

    /// No further call is acceptable.
    pub fn is_saturated(&self, calls: usize) -> bool {
        calls >= self.max
    }

    /// "called once", "called at least twice", ...
    pub fn describe(&self) -> String {
        if self.min == 0 {
            if self.max == 0 {
                "never called".to_owned()
            } else if self.max == usize::MAX {
                "called any number of times".to_owned()
            } else {
                format!("called at most {}", format_count(self.max))
            }
        } else if self.min == self.max {
            format!("called {}", format_count(self.min))
        } else if self.max == usize::MAX {
            format!("called at least {}", format_count(self.min))
        } else {
            format!("called between {} and {} times", self.min, self.max)
        }
    }

    /// "never called", "called twice", ... for an observed count.
    pub fn describe_actual(&self, calls: usize) -> String {
        if calls == 0 {
            "never called".to_owned()
        } else {
            format!("called {}", format_count(calls))
        }
    }
}

fn format_count(count: usize) -> String {
    match count {
        0 => "never".to_owned(),
        1 => "once".to_owned(),
        2 => "twice".to_owned(),
        n => format!("{n} times"),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_exactly() {
        let cardinality = exactly(2);
        assert!(!cardinality.is_satisfied(1));
        assert!(cardinality.is_satisfied(2));
        assert!(!cardinality.is_satisfied(3));
        assert!(!cardinality.is_saturated(1));
        assert!(cardinality.is_saturated(2));
    }

    #[test]
    fn test_at_least_never_saturates() {
        let cardinality = at_least(1);
        assert!(!cardinality.is_satisfied(0));
        assert!(cardinality.is_satisfied(100));
        assert!(!cardinality.is_saturated(usize::MAX - 1));
    }

    #[test]
    fn test_at_most() {
        let cardinality = at_most(2);
        assert!(cardinality.is_satisfied(0));
        assert!(cardinality.is_satisfied(2));
        assert!(!cardinality.is_satisfied(3));
        assert!(cardinality.is_saturated(2));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(exactly(1).describe(), "called once");
        assert_eq!(exactly(2).describe(), "called twice");
        assert_eq!(exactly(5).describe(), "called 5 times");
        assert_eq!(at_least(1).describe(), "called at least once");
        assert_eq!(at_most(3).describe(), "called at most 3 times");
        assert_eq!(between(1, 3).describe(), "called between 1 and 3 times");
        assert_eq!(any_count().describe(), "called any number of times");
        assert_eq!(exactly(0).describe(), "never called");
        assert_eq!(exactly(1).describe_actual(0), "never called");
        assert_eq!(exactly(1).describe_actual(2), "called twice");
    }

    proptest! {
        #[test]
        fn proptest_satisfied_iff_in_range(
            min in 0usize..100,
            span in 0usize..100,
            calls in 0usize..300,
        ) {
            let cardinality = between(min, min + span);
            prop_assert_eq!(
                cardinality.is_satisfied(calls),
                calls >= min && calls <= min + span
            );
            prop_assert_eq!(cardinality.is_saturated(calls), calls >= min + span);
        }
    }
}
