use serde::Serialize;
use tracing::{debug, warn};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Connecting,
    SchemaReady,
    Cleared,
    /// 1-based index of the entity being transferred.
    Transferring(usize),
    Verifying,
    Failed,
    Logged,
    Closed,
}

impl RunPhase {
    /// Whether `next` may follow `self`.
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            (Closed, _) => false,
            (Failed, Logged) | (Failed, Closed) => true,
            (Failed, _) => false,
            (_, Failed) => true,
            (Idle, Connecting) => true,
            (Connecting, SchemaReady) => true,
            (SchemaReady, Cleared) => true,
            (Cleared, Transferring(1)) => true,
            (Transferring(n), Transferring(m)) => m == n + 1,
            (Transferring(_), Verifying) | (Transferring(_), Logged) => true,
            (Verifying, Logged) => true,
            (Logged, Closed) => true,
            _ => false,
        }
    }
}

/// Records every phase a run passes through.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    history: Vec<RunPhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            history: vec![RunPhase::Idle],
        }
    }

    pub fn current(&self) -> RunPhase {
        self.history.last().copied().unwrap_or(RunPhase::Idle)
    }

    pub fn advance(&mut self, next: RunPhase) {
        let current = self.current();
        if !current.can_advance_to(next) {
            warn!("Unexpected phase transition {:?} -> {:?}", current, next);
        }
        debug!("Phase: {:?}", next);
        self.history.push(next);
    }

    pub fn history(&self) -> &[RunPhase] {
        &self.history
    }

    pub fn into_history(self) -> Vec<RunPhase> {
        self.history
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
