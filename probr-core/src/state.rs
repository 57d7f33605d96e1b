use tokio::sync::watch;

/// Lifecycle of a run. Transitions only move forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<RunState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::Idle);
        Self { tx }
    }

    pub fn current(&self) -> RunState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }

    /// Moves to `to` if it is ahead of the current state. Returns whether a transition happened.
    pub fn advance(&self, to: RunState) -> bool {
        let mut from = RunState::Idle;
        let moved = self.tx.send_if_modified(|cur| {
            if to <= *cur {
                return false;
            }
            from = *cur;
            *cur = to;
            true
        });
        if moved {
            tracing::debug!(%from, %to, "run state transition");
        }
        moved
    }
}
