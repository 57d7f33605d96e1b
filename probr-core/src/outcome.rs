use std::sync::Arc;
use std::time::Duration;

use probr_metrics::OutcomeKind;
use tokio::time::Instant;

/// Result of a single probe, or of an arrival that never became one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub tag: Arc<str>,
    pub status_code: Option<u16>,
    pub latency: Duration,
    pub kind: OutcomeKind,
    pub timestamp: Instant,
}

/// Only an exact 200 is a success.
pub fn classify_status(status: u16) -> OutcomeKind {
    if status == 200 {
        OutcomeKind::Success
    } else {
        OutcomeKind::ProtocolFailure
    }
}

impl Outcome {
    pub fn new(tag: Arc<str>, kind: OutcomeKind, latency: Duration) -> Self {
        Self {
            tag,
            status_code: None,
            latency,
            kind,
            timestamp: Instant::now(),
        }
    }

    pub fn from_status(tag: Arc<str>, status: u16, latency: Duration) -> Self {
        Self {
            status_code: Some(status),
            ..Self::new(tag, classify_status(status), latency)
        }
    }

    /// An arrival rejected by an exhausted pool. Latency is zero by definition.
    pub fn dropped(tag: Arc<str>) -> Self {
        Self::new(tag, OutcomeKind::Dropped, Duration::ZERO)
    }

    pub fn success(&self) -> bool {
        self.kind.is_success()
    }
}
