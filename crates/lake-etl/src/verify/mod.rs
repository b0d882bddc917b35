//! Post-load verification of the serving database.
//!
//! Six checks run one after another against the target (and, for counts,
//! the source):
//!
//! - **Counts**: per-entity row counts match the source
//! - **Checksums**: agency and correction checksums are 64-char lowercase hex
//! - **Referential**: metric and parent slugs resolve to agencies
//! - **Metric accuracy**: stored RVI matches a recomputation within 0.01
//! - **Aggregates**: time-series sums match per-year correction counts
//! - **Views**: the read views return rows after a non-empty load
//!
//! A check that errors fails on its own; the others still run.

pub mod checks;
pub mod types;

pub use types::{CheckKind, CheckResult, VerifyReport};

use std::time::Instant;

use tracing::{info, warn};

use crate::domain::traits::{RowSource, TargetStore};
use crate::error::Result;

/// Runs every check and collects a [`VerifyReport`].
pub struct Verifier<'a> {
    source: &'a dyn RowSource,
    target: &'a dyn TargetStore,
}

impl<'a> Verifier<'a> {
    pub fn new(source: &'a dyn RowSource, target: &'a dyn TargetStore) -> Self {
        Self { source, target }
    }

    /// Run all checks sequentially.
    pub async fn run(&self) -> VerifyReport {
        let start = Instant::now();
        info!("Verifying {}", self.target.describe());

        let mut results = Vec::with_capacity(CheckKind::ALL.len());
        for kind in CheckKind::ALL {
            let result = match self.run_check(kind).await {
                Ok(result) => result,
                Err(e) => CheckResult::fail(kind, format!("check could not run: {}", e), Vec::new()),
            };
            if result.passed {
                info!("{}: PASS ({})", kind.label(), result.message);
            } else {
                warn!("{}: FAIL ({})", kind.label(), result.message);
            }
            results.push(result);
        }

        let report = VerifyReport::new(results, start.elapsed().as_millis() as u64);
        info!(
            "Verification {}: {} of {} checks passed",
            if report.passed { "passed" } else { "failed" },
            report.checks.len() - report.failed_count(),
            report.checks.len()
        );
        report
    }

    async fn run_check(&self, kind: CheckKind) -> Result<CheckResult> {
        match kind {
            CheckKind::Counts => checks::counts(self.source, self.target).await,
            CheckKind::Checksums => checks::checksums(self.target).await,
            CheckKind::Referential => checks::referential(self.target).await,
            CheckKind::MetricAccuracy => checks::metric_accuracy(self.target).await,
            CheckKind::Aggregates => checks::aggregates(self.target).await,
            CheckKind::Views => checks::views(self.target).await,
        }
    }
}
