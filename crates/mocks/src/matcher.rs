//! Argument matchers: polymorphic predicates with positive and negative
//! explanations.

use std::fmt::Debug;

pub(crate) trait MatcherImpl<T>: Send {
    fn check(&self, value: &T) -> bool;
    fn explain(&self, param: &str, value: &T) -> String;
    fn explain_negative(&self, param: &str, value: &T) -> String;
}

/// A predicate over one argument of a mocked function. Stored by value
/// inside expectations, so nothing dangles when the mock is torn down.
pub struct Matcher<T> {
    imp: Box<dyn MatcherImpl<T>>,
}

impl<T> Matcher<T> {
    pub(crate) fn new(imp: Box<dyn MatcherImpl<T>>) -> Self {
        Matcher { imp }
    }

    pub fn check(&self, value: &T) -> bool {
        self.imp.check(value)
    }

    /// Why the matcher accepted (or would accept) `value`.
    pub fn explain(&self, param: &str, value: &T) -> String {
        self.imp.explain(param, value)
    }

    /// The explanation with the expectation inverted, used by [`not`].
    pub fn explain_negative(&self, param: &str, value: &T) -> String {
        self.imp.explain_negative(param, value)
    }
}

#[derive(Clone, Copy)]
enum CmpKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpKind {
    fn description(self) -> &'static str {
        match self {
            CmpKind::Eq => "is equal to",
            CmpKind::Ne => "is not equal to",
            CmpKind::Lt => "is less than",
            CmpKind::Le => "is less than or equal to",
            CmpKind::Gt => "is greater than",
            CmpKind::Ge => "is greater than or equal to",
        }
    }

    fn negative_description(self) -> &'static str {
        match self {
            CmpKind::Eq => "is not equal to",
            CmpKind::Ne => "is equal to",
            CmpKind::Lt => "is not less than",
            CmpKind::Le => "is not less than or equal to",
            CmpKind::Gt => "is not greater than",
            CmpKind::Ge => "is not greater than or equal to",
        }
    }
}

struct Comparison<T> {
    kind: CmpKind,
    rhs: T,
}

impl<T: PartialOrd + Debug + Send + 'static> MatcherImpl<T> for Comparison<T> {
    fn check(&self, value: &T) -> bool {
        match self.kind {
            CmpKind::Eq => value == &self.rhs,
            CmpKind::Ne => value != &self.rhs,
            CmpKind::Lt => value < &self.rhs,
            CmpKind::Le => value <= &self.rhs,
            CmpKind::Gt => value > &self.rhs,
            CmpKind::Ge => value >= &self.rhs,
        }
    }

    fn explain(&self, param: &str, value: &T) -> String {
        explain_lines(
            param,
            self.kind.description(),
            &self.rhs,
            value,
            self.check(value),
        )
    }

    fn explain_negative(&self, param: &str, value: &T) -> String {
        explain_lines(
            param,
            self.kind.negative_description(),
            &self.rhs,
            value,
            !self.check(value),
        )
    }
}

fn explain_lines<T: Debug>(
    param: &str,
    description: &str,
    rhs: &T,
    value: &T,
    matched: bool,
) -> String {
    let actual = if matched { "  Actual" } else { "  But is" };
    format!(
        "Value of: {param}\nExpected: {description}\n          {rhs:?}\n{actual}: {value:?}"
    )
}

fn comparison<T: PartialOrd + Debug + Send + 'static>(kind: CmpKind, rhs: T) -> Matcher<T> {
    Matcher::new(Box::new(Comparison { kind, rhs }))
}

pub fn eq<T: PartialOrd + Debug + Send + 'static>(rhs: T) -> Matcher<T> {
    comparison(CmpKind::Eq, rhs)
}

pub fn ne<T: PartialOrd + Debug + Send + 'static>(rhs: T) -> Matcher<T> {
    comparison(CmpKind::Ne, rhs)
}

pub fn lt<T: PartialOrd + Debug + Send + 'static>(rhs: T) -> Matcher<T> {
    comparison(CmpKind::Lt, rhs)
}

pub fn le<T: PartialOrd + Debug + Send + 'static>(rhs: T) -> Matcher<T> {
    comparison(CmpKind::Le, rhs)
}

pub fn gt<T: PartialOrd + Debug + Send + 'static>(rhs: T) -> Matcher<T> {
    comparison(CmpKind::Gt, rhs)
}

pub fn ge<T: PartialOrd + Debug + Send + 'static>(rhs: T) -> Matcher<T> {
    comparison(CmpKind::Ge, rhs)
}

struct NotImpl<T> {
    inner: Matcher<T>,
}

impl<T: Send + 'static> MatcherImpl<T> for NotImpl<T> {
    fn check(&self, value: &T) -> bool {
        !self.inner.check(value)
    }

    // Negation swaps the two explanations.
    fn explain(&self, param: &str, value: &T) -> String {
        self.inner.explain_negative(param, value)
    }

    fn explain_negative(&self, param: &str, value: &T) -> String {
        self.inner.explain(param, value)
    }
}

pub fn not<T: Send + 'static>(inner: Matcher<T>) -> Matcher<T> {
    Matcher::new(Box::new(NotImpl { inner }))
}

struct Predicate<T> {
    accepts: fn(&T) -> bool,
    description: &'static str,
    negative_description: &'static str,
}

impl<T: Debug + Send + 'static> MatcherImpl<T> for Predicate<T> {
    fn check(&self, value: &T) -> bool {
        (self.accepts)(value)
    }

    fn explain(&self, param: &str, value: &T) -> String {
        let actual = if self.check(value) {
            "  Actual"
        } else {
            "  But is"
        };
        format!(
            "Value of: {param}\nExpected: {}\n{actual}: {value:?}",
            self.description
        )
    }

    fn explain_negative(&self, param: &str, value: &T) -> String {
        let actual = if self.check(value) {
            "  But is"
        } else {
            "  Actual"
        };
        format!(
            "Value of: {param}\nExpected: {}\n{actual}: {value:?}",
            self.negative_description
        )
    }
}

/// Accepts every value.
pub fn any_value<T: Debug + Send + 'static>() -> Matcher<T> {
    Matcher::new(Box::new(Predicate {
        accepts: |_| true,
        description: "is anything",
        negative_description: "is nothing",
    }))
}

pub fn is_true() -> Matcher<bool> {
    Matcher::new(Box::new(Predicate {
        accepts: |value: &bool| *value,
        description: "is true",
        negative_description: "is false",
    }))
}

pub fn is_false() -> Matcher<bool> {
    Matcher::new(Box::new(Predicate {
        accepts: |value: &bool| !*value,
        description: "is false",
        negative_description: "is true",
    }))
}

/// Accepts `Some(..)`; the `Option` analog of a not-null matcher.
pub fn is_some<T: Debug + Send + 'static>() -> Matcher<Option<T>> {
    Matcher::new(Box::new(Predicate {
        accepts: |value: &Option<T>| value.is_some(),
        description: "is some value",
        negative_description: "is none",
    }))
}

/// Accepts `None`; the `Option` analog of a null matcher.
pub fn is_none<T: Debug + Send + 'static>() -> Matcher<Option<T>> {
    Matcher::new(Box::new(Predicate {
        accepts: |value: &Option<T>| value.is_none(),
        description: "is none",
        negative_description: "is some value",
    }))
}

struct RefIdentity<T: ?Sized + 'static> {
    target: &'static T,
}

impl<T: ?Sized + Debug + Sync + 'static> MatcherImpl<&'static T> for RefIdentity<T> {
    fn check(&self, value: &&'static T) -> bool {
        std::ptr::eq(*value, self.target)
    }

    fn explain(&self, param: &str, value: &&'static T) -> String {
        let actual = if self.check(value) {
            "  Actual"
        } else {
            "  But is"
        };
        format!(
            "Value of: {param}\nExpected: references the object at {:p}\n          {:?}\n{actual}: {:?} at {:p}",
            self.target as *const T,
            self.target,
            *value,
            *value as *const T,
        )
    }

    fn explain_negative(&self, param: &str, value: &&'static T) -> String {
        let actual = if self.check(value) {
            "  But is"
        } else {
            "  Actual"
        };
        format!(
            "Value of: {param}\nExpected: does not reference the object at {:p}\n          {:?}\n{actual}: {:?} at {:p}",
            self.target as *const T,
            self.target,
            *value,
            *value as *const T,
        )
    }
}

/// Matches a reference-typed argument by identity: accepts exactly the
/// object `target` points at. Two distinct objects with equal values do not
/// match; use [`eq`] for value equality.
pub fn by_ref<T: ?Sized + Debug + Sync + 'static>(target: &'static T) -> Matcher<&'static T> {
    Matcher::new(Box::new(RefIdentity { target }))
}

/// Conjunction of per-argument matchers over an argument tuple.
pub trait TupleMatchers<A>: Send {
    fn matches(&self, args: &A) -> bool;
}

impl TupleMatchers<()> for () {
    fn matches(&self, _args: &()) -> bool {
        true
    }
}

macro_rules! tuple_matchers {
    ($($idx:tt $ty:ident),+) => {
        impl<$($ty: Send + 'static),+> TupleMatchers<($($ty,)+)> for ($(Matcher<$ty>,)+) {
            fn matches(&self, args: &($($ty,)+)) -> bool {
                $(self.$idx.check(&args.$idx))&&+
            }
        }
    };
}

tuple_matchers!(0 T0);
tuple_matchers!(0 T0, 1 T1);
tuple_matchers!(0 T0, 1 T1, 2 T2);
tuple_matchers!(0 T0, 1 T1, 2 T2, 3 T3);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_matchers() {
        assert!(eq(3).check(&3));
        assert!(!eq(3).check(&4));
        assert!(ne(3).check(&4));
        assert!(lt(3).check(&2));
        assert!(le(3).check(&3));
        assert!(gt(3).check(&4));
        assert!(ge(3).check(&3));
    }

    #[test]
    fn test_not_swaps_explanations() {
        let inner = eq(3);
        let inverted = not(eq(3));
        assert!(inverted.check(&4));
        assert_eq!(inverted.explain("x", &4), inner.explain_negative("x", &4));
    }

    #[test]
    fn test_explanation_shape() {
        let text = eq(3).explain("code", &4);
        assert!(text.contains("Value of: code"));
        assert!(text.contains("Expected: is equal to"));
        assert!(text.contains("But is: 4"));
    }

    #[test]
    fn test_option_matchers() {
        assert!(is_some::<i32>().check(&Some(1)));
        assert!(is_none::<i32>().check(&None));
        assert!(!is_some::<i32>().check(&None));
    }

    #[test]
    fn test_by_ref_matches_identity_not_value() {
        static FIRST: i32 = 7;
        static SECOND: i32 = 7;
        let matcher = by_ref(&FIRST);
        assert!(matcher.check(&&FIRST));
        // Equal value, different object.
        assert!(!matcher.check(&&SECOND));
        assert!(matcher
            .explain("target", &&SECOND)
            .contains("references the object at"));
    }

    #[test]
    fn test_tuple_matchers() {
        let matchers = (eq(1), gt(10));
        use super::TupleMatchers;
        assert!(matchers.matches(&(1, 11)));
        assert!(!matchers.matches(&(1, 9)));
        assert!(!matchers.matches(&(2, 11)));
    }
}
