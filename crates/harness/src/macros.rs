//! Capture macros: same operations as [`crate::api`], with the condition
//! expression stringified into the log record.

/// `assert_that!(expr)`: hard assertion with the expression text in the
/// PASS/FAIL record.
#[macro_export]
macro_rules! assert_that {
    ($cond:expr) => {
        $crate::api::assert_that_with(
            $cond,
            $crate::meta::CallContext::capture_with_args(&[stringify!($cond)]),
        )
    };
}

/// `check_that!(expr)`: soft assertion with the expression text in the WARN
/// record.
#[macro_export]
macro_rules! check_that {
    ($cond:expr) => {
        $crate::api::check_that_with(
            $cond,
            $crate::meta::CallContext::capture_with_args(&[stringify!($cond)]),
        )
    };
}

/// `wait_until!(expr)`: suspend until the expression is true.
#[macro_export]
macro_rules! wait_until {
    ($expr:expr) => {
        $crate::api::wait_until_with(
            $expr,
            $crate::meta::CallContext::capture_with_args(&[stringify!($expr)]),
        )
    };
    ($expr:expr, $timeout:expr) => {
        $crate::api::wait_until_for_with(
            $expr,
            $timeout,
            $crate::meta::CallContext::capture_with_args(&[stringify!($expr)]),
        )
    };
}

/// `create_invariant!(expr)`: invariant with the expression text in the INV
/// record.
#[macro_export]
macro_rules! create_invariant {
    ($expr:expr) => {
        $crate::invariant::create_invariant_with(
            $expr,
            $crate::meta::CallContext::capture_with_args(&[stringify!($expr)]),
        )
    };
}
