//! Cooperative stackful tasks over a virtual clock.
//!
//! A [`Coroutine`] is an OS thread driven in lock-step by the [`Scheduler`]:
//! the scheduler blocks while a coroutine runs and the coroutine blocks while
//! anything else runs, so exactly one logical thread of control exists at any
//! time and every interleaving is deterministic. Simulated time only moves in
//! the scheduler's select-next step, and only forward.

mod clock;
mod coroutine;
mod scheduler;

pub use clock::VirtualClock;
pub use coroutine::{
    Coroutine,
    CoroutineId,
};
pub use scheduler::Scheduler;
