/// How a single probe ended.
///
/// Only [`OutcomeKind::Success`] counts as a success. Everything else is folded into the
/// failure count of its series.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum OutcomeKind {
    /// The target answered with status 200.
    Success,
    /// The target answered with any other status.
    ProtocolFailure,
    /// Connection, TLS or body read failure.
    TransportFailure,
    /// The per-probe timeout elapsed before a response arrived.
    Timeout,
    /// Arrival shed because the worker pool was at its ceiling.
    Dropped,
    /// Still in flight when the drain grace period ran out.
    Abandoned,
    /// Still in flight when the run was stopped externally.
    Cancelled,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 7] = [
        OutcomeKind::Success,
        OutcomeKind::ProtocolFailure,
        OutcomeKind::TransportFailure,
        OutcomeKind::Timeout,
        OutcomeKind::Dropped,
        OutcomeKind::Abandoned,
        OutcomeKind::Cancelled,
    ];

    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Whether the outcome carries a measured round trip.
    ///
    /// Synthetic outcomes (dropped, abandoned, cancelled) never reach the latency samples.
    #[must_use]
    pub fn has_latency(self) -> bool {
        matches!(
            self,
            Self::Success | Self::ProtocolFailure | Self::TransportFailure | Self::Timeout
        )
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}
