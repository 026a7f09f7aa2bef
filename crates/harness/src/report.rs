//! Scenario-wide outcome counters and the postamble.

use std::sync::Arc;

use parking_lot::Mutex;
use sim_log::{
    Logger,
    LogTag,
};

/// Everything the postamble summarizes. FAIL-class counters decide the exit
/// code; `passed_assertions` and `failed_checks` are informational.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub passed_assertions: usize,
    pub failed_assertions: usize,
    pub failed_checks: usize,
    pub invariant_violations: usize,
    pub oversaturated_calls: usize,
    pub missing_calls: usize,
    pub unexpected_calls: usize,
    pub unmet_prerequisites: usize,
}

impl Counters {
    pub fn has_failures(&self) -> bool {
        self.failed_assertions > 0
            || self.invariant_violations > 0
            || self.oversaturated_calls > 0
            || self.missing_calls > 0
            || self.unexpected_calls > 0
            || self.unmet_prerequisites > 0
    }
}

/// Shared handle onto the counters. Every diagnostic site holds one.
#[derive(Clone)]
pub struct Report {
    counters: Arc<Mutex<Counters>>,
}

impl Report {
    pub fn new() -> Self {
        Report {
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    pub fn snapshot(&self) -> Counters {
        *self.counters.lock()
    }

    pub fn assertion_passed(&self) {
        self.counters.lock().passed_assertions += 1;
    }

    pub fn assertion_failed(&self) {
        self.counters.lock().failed_assertions += 1;
    }

    pub fn check_failed(&self) {
        self.counters.lock().failed_checks += 1;
    }

    pub fn invariant_violated(&self) {
        self.counters.lock().invariant_violations += 1;
    }

    pub fn oversaturated_call(&self) {
        self.counters.lock().oversaturated_calls += 1;
    }

    pub fn missing_call(&self) {
        self.counters.lock().missing_calls += 1;
    }

    pub fn unexpected_call(&self) {
        self.counters.lock().unexpected_calls += 1;
    }

    pub fn unmet_prerequisite(&self) {
        self.counters.lock().unmet_prerequisites += 1;
    }

    /// Write the postamble and compute the process exit code.
    pub fn finish(&self, logger: &Logger) -> i32 {
        let counters = self.snapshot();
        let mut record = logger.record_timeless(LogTag::Post);
        record.rule('=');
        record.line(format!(
            "passed assertions:      {}",
            counters.passed_assertions
        ));
        record.line(format!(
            "failed assertions:      {}",
            counters.failed_assertions
        ));
        record.line(format!(
            "failed checks:          {}",
            counters.failed_checks
        ));
        record.line(format!(
            "invariant violations:   {}",
            counters.invariant_violations
        ));
        record.line(format!(
            "oversaturated calls:    {}",
            counters.oversaturated_calls
        ));
        record.line(format!(
            "missing calls:          {}",
            counters.missing_calls
        ));
        record.line(format!(
            "unexpected calls:       {}",
            counters.unexpected_calls
        ));
        record.line(format!(
            "unmet prerequisites:    {}",
            counters.unmet_prerequisites
        ));
        record.rule('=');
        if counters.has_failures() {
            1
        } else {
            0
        }
    }
}
