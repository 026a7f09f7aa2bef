//! Call-site metadata attached to log records and diagnostics.

use std::panic::Location;

/// Where in the scenario source an operation was written, plus the
/// stringified argument expressions when a capture macro was used.
///
/// The capture macros (`assert_that!`, `wait_until!`, …) fill in `args`; a
/// plain function call only carries file and line via `#[track_caller]`.
#[derive(Clone, Debug)]
pub struct CallContext {
    pub file: &'static str,
    pub line: u32,
    pub args: Vec<String>,
}

impl CallContext {
    /// Context for an operation with no usable call site.
    pub fn empty() -> Self {
        CallContext {
            file: "<unknown>",
            line: 0,
            args: Vec::new(),
        }
    }

    /// Capture the caller's file and line.
    #[track_caller]
    pub fn capture() -> Self {
        let location = Location::caller();
        CallContext {
            file: location.file(),
            line: location.line(),
            args: Vec::new(),
        }
    }

    #[track_caller]
    pub fn capture_with_args(args: &[&str]) -> Self {
        let mut context = Self::capture();
        context.args = args.iter().map(|s| (*s).to_owned()).collect();
        context
    }

    /// The nth stringified argument, or a placeholder when the call was not
    /// made through a capture macro.
    pub fn arg(&self, index: usize) -> &str {
        self.args.get(index).map_or("<expr>", String::as_str)
    }
}
