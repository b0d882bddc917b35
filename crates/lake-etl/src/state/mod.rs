//! Run bookkeeping in the target database.
//!
//! Two tables record what a run did:
//!
//! - `etl_log`: one appended row per execution ([`RunLogger`])
//! - `etl_load_state`: a single row telling readers whether the entity
//!   tables are complete ([`LoadStateMarker`])

mod load_state;
mod logger;

pub use load_state::LoadStateMarker;
pub use logger::RunLogger;

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};

/// Outcome recorded in `etl_log.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

/// Value of `etl_load_state.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// Tables are being cleared or reloaded.
    Loading,
    /// Every entity was committed.
    Ready,
    /// The last run stopped part way.
    Failed,
}

/// Convert RunStatus to its column value.
pub fn run_status_to_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "success",
        RunStatus::Failed => "failed",
    }
}

/// Parse RunStatus from its column value.
pub fn str_to_run_status(s: &str) -> Result<RunStatus> {
    match s {
        "success" => Ok(RunStatus::Success),
        "failed" => Ok(RunStatus::Failed),
        _ => Err(EtlError::Config(format!("Invalid run status: {}", s))),
    }
}

/// Convert LoadState to its column value.
pub fn load_state_to_str(state: LoadState) -> &'static str {
    match state {
        LoadState::Loading => "loading",
        LoadState::Ready => "ready",
        LoadState::Failed => "failed",
    }
}

/// Parse LoadState from its column value.
pub fn str_to_load_state(s: &str) -> Result<LoadState> {
    match s {
        "loading" => Ok(LoadState::Loading),
        "ready" => Ok(LoadState::Ready),
        "failed" => Ok(LoadState::Failed),
        _ => Err(EtlError::Config(format!("Invalid load state: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in [RunStatus::Success, RunStatus::Failed] {
            assert_eq!(str_to_run_status(run_status_to_str(status)).unwrap(), status);
        }
    }

    #[test]
    fn test_load_state_roundtrip() {
        for state in [LoadState::Loading, LoadState::Ready, LoadState::Failed] {
            assert_eq!(str_to_load_state(load_state_to_str(state)).unwrap(), state);
        }
    }

    #[test]
    fn test_invalid_values() {
        assert!(str_to_run_status("completed").is_err());
        assert!(str_to_load_state("done").is_err());
    }
}
