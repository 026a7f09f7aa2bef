//! Integer-nanosecond virtual time: [`Duration`] and [`TimePoint`].
//!
//! All simulated time in the harness is expressed in these two types. They
//! deliberately do not interoperate with `std::time`: the virtual clock has
//! no relation to the wall clock, and keeping the types separate makes it
//! impossible to accidentally mix the two domains.

mod duration;
mod time_point;

pub use duration::Duration;
pub use time_point::TimePoint;
