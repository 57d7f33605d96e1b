use probr_core::{RunEnd, RunReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed (including an `abortOnFail` stop).
    ThresholdsFailed = 11,

    /// The run was interrupted (Ctrl-C) before it completed.
    Cancelled = 13,

    /// Invalid CLI/config/options (bad flags, invalid durations, invalid thresholds syntax, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_report(report: &RunReport) -> Self {
        match report.end {
            RunEnd::Cancelled => Self::Cancelled,
            RunEnd::ThresholdAbort => Self::ThresholdsFailed,
            RunEnd::Completed if report.verdict.passed() => Self::Success,
            RunEnd::Completed => Self::ThresholdsFailed,
        }
    }
}
