//! The scenario log: tagged, timestamped records written to a shared sink.
//!
//! Every record starts with a header line
//!
//! ```text
//! TAG tttttttttt  nnnn file:line
//! ```
//!
//! where `TAG` is one of [`LogTag`], `t` is the simulated time in
//! milliseconds (zero-padded to ten digits), and `nnnn` is the runner name
//! right-aligned to four characters. Body lines follow, indented past the
//! header columns so that a scenario log stays scannable by tag.

mod logger;
mod sink;
pub mod testing;

pub use logger::{
    Logger,
    Record,
    RULE_LENGTH,
};
pub use sink::{
    BufferHandle,
    LogSink,
};

/// Record tags, in the order they appear in a typical scenario log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogTag {
    /// Free-form informational output.
    Info,
    /// A runner started waiting.
    Wait,
    /// A runner resumed from a condition wait.
    Resume,
    /// A value was pushed into a signal.
    Push,
    /// A value was popped from a queue port.
    Pop,
    /// A port callback handled a value.
    Handle,
    /// A failed assertion or mock failure.
    Fail,
    /// A passed assertion.
    Pass,
    /// A failed check (soft assertion).
    Warn,
    /// An invariant stopped holding.
    Invariant,
    /// A reactive expression fired (timer expiry).
    Expr,
    /// A call to a mocked function.
    Mock,
    /// Section begin/end markers.
    Section,
    /// The postamble.
    Post,
}

impl LogTag {
    /// The four-character column form of the tag.
    pub fn as_str(self) -> &'static str {
        match self {
            LogTag::Info => "INFO",
            LogTag::Wait => "WAIT",
            LogTag::Resume => "RESM",
            LogTag::Push => "PUSH",
            LogTag::Pop => "POP ",
            LogTag::Handle => "HDL ",
            LogTag::Fail => "FAIL",
            LogTag::Pass => "PASS",
            LogTag::Warn => "WARN",
            LogTag::Invariant => "INV ",
            LogTag::Expr => "EXPR",
            LogTag::Mock => "MOCK",
            LogTag::Section => "SECT",
            LogTag::Post => "POST",
        }
    }
}
