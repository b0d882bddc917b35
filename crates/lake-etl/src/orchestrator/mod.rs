//! Run orchestrator: sequences every stage and owns failure handling.

mod phase;
mod session;

pub use phase::{PhaseTracker, RunPhase};
pub use session::{Connector, Session, StoreConnector};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::entity::ENTITIES;
use crate::domain::schema::TARGET_SCHEMA;
use crate::error::{EtlError, Result};
use crate::prepare::{DataClearer, SchemaInitializer};
use crate::state::{LoadState, LoadStateMarker, RunLogger, RunStatus};
use crate::transfer::{TransferEngine, TransferStats};
use crate::verify::{Verifier, VerifyReport};

/// Runs the full reload and the standalone verifier.
pub struct Orchestrator {
    config: Config,
    connector: Box<dyn Connector>,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// SHA256 hash of the configuration.
    pub config_hash: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Rows committed across all entities.
    pub records_processed: u64,

    /// Per-entity transfer results, in load order.
    pub entities: Vec<TransferStats>,

    /// Post-load checks (absent when disabled).
    pub verification: Option<VerifyReport>,

    /// Phases the run went through.
    pub phases: Vec<RunPhase>,
}

impl RunReport {
    /// Loaded and, if verification ran, verified.
    pub fn succeeded(&self) -> bool {
        self.verification.as_ref().map_or(true, |v| v.passed)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Progress of the load stages, kept across a failure for the log row.
struct LoadProgress {
    records: u64,
    entities: Vec<TransferStats>,
}

impl Orchestrator {
    /// Orchestrator over the configured DuckDB and PostgreSQL stores.
    pub fn new(config: Config) -> Self {
        let connector = StoreConnector::new(config.clone());
        Self::with_connector(config, connector)
    }

    /// Orchestrator over any pair of stores.
    pub fn with_connector(config: Config, connector: impl Connector + 'static) -> Self {
        Self {
            config,
            connector: Box::new(connector),
        }
    }

    /// Clear and reload the target, verify it and log the run.
    ///
    /// Any connect, schema, clear or transfer error rolls back the open
    /// transaction, marks the load failed and logs a failed run before it
    /// is returned. Both connections are closed on every path.
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let logger = RunLogger::start(self.connector.source_label());
        let mut phases = PhaseTracker::new();

        info!("Starting ETL run: {}", run_id);

        phases.advance(RunPhase::Connecting);
        let session = match self.connector.connect().await {
            Ok(session) => session,
            Err(e) => {
                // no target connection to record the failure in
                error!("Run {} failed to connect: {}", run_id, e);
                phases.advance(RunPhase::Failed);
                phases.advance(RunPhase::Closed);
                return Err(e);
            }
        };

        let marker = LoadStateMarker::new(run_id.clone());
        let mut progress = LoadProgress {
            records: 0,
            entities: Vec::with_capacity(ENTITIES.len()),
        };

        if let Err(e) = self.load(&session, &marker, &mut phases, &mut progress).await {
            self.fail(&session, &marker, &logger, &mut phases, progress.records, &e)
                .await;
            return Err(e);
        }

        let verification = if self.config.etl.verify_after_load {
            phases.advance(RunPhase::Verifying);
            let report = Verifier::new(&*session.source, &*session.target).run().await;
            if !report.passed {
                warn!("{}", report.summary());
            }
            Some(report)
        } else {
            None
        };

        if let Err(e) = logger
            .log(&*session.target, progress.records, RunStatus::Success, None)
            .await
        {
            error!("Failed to write run log: {}", e);
            phases.advance(RunPhase::Failed);
            session.close().await;
            phases.advance(RunPhase::Closed);
            return Err(e);
        }
        phases.advance(RunPhase::Logged);

        session.close().await;
        phases.advance(RunPhase::Closed);

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        info!(
            "Run {} loaded {} records in {:.1}s",
            run_id, progress.records, duration_seconds
        );

        Ok(RunReport {
            run_id,
            config_hash: self.config.hash(),
            started_at,
            completed_at,
            duration_seconds,
            records_processed: progress.records,
            entities: progress.entities,
            verification,
            phases: phases.into_history(),
        })
    }

    async fn load(
        &self,
        session: &Session,
        marker: &LoadStateMarker,
        phases: &mut PhaseTracker,
        progress: &mut LoadProgress,
    ) -> Result<()> {
        let target = &*session.target;

        SchemaInitializer::new(&TARGET_SCHEMA)
            .initialize(target)
            .await?;
        phases.advance(RunPhase::SchemaReady);

        marker.mark(target, LoadState::Loading).await?;

        let clearer = DataClearer::new(&TARGET_SCHEMA)?;
        clearer.clear(target).await?;
        phases.advance(RunPhase::Cleared);

        let engine = TransferEngine::new(&*session.source, target, self.config.etl.batch_size);
        for (idx, entity) in ENTITIES.iter().enumerate() {
            phases.advance(RunPhase::Transferring(idx + 1));
            let stats = engine.transfer(entity).await?;
            progress.records += stats.rows_written;
            progress.entities.push(stats);
        }

        marker.mark(target, LoadState::Ready).await?;
        Ok(())
    }

    /// Best-effort cleanup after a failed stage.
    async fn fail(
        &self,
        session: &Session,
        marker: &LoadStateMarker,
        logger: &RunLogger,
        phases: &mut PhaseTracker,
        records: u64,
        err: &EtlError,
    ) {
        error!("Run failed: {}", err);
        phases.advance(RunPhase::Failed);
        let target = &*session.target;

        if let Err(e) = target.rollback().await {
            warn!("Rollback after failure did not complete: {}", e);
        }
        if let Err(e) = marker.mark(target, LoadState::Failed).await {
            warn!("Could not mark load as failed: {}", e);
        }
        let message = err.to_string();
        match logger
            .log(target, records, RunStatus::Failed, Some(message.as_str()))
            .await
        {
            Ok(()) => phases.advance(RunPhase::Logged),
            Err(e) => warn!("Could not log failed run: {}", e),
        }

        session.close().await;
        phases.advance(RunPhase::Closed);
        info!("Phases: {:?}", phases.history());
    }

    /// Run the checks against the current target contents.
    pub async fn verify(&self) -> Result<VerifyReport> {
        let session = self.connector.connect().await?;
        let report = Verifier::new(&*session.source, &*session.target).run().await;
        session.close().await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_success_follows_verification() {
        let mut report = RunReport {
            run_id: "r".into(),
            config_hash: "h".into(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 0.0,
            records_processed: 0,
            entities: Vec::new(),
            verification: None,
            phases: vec![RunPhase::Idle],
        };
        assert!(report.succeeded());

        report.verification = Some(VerifyReport::new(
            vec![crate::verify::CheckResult::fail(
                crate::verify::CheckKind::Views,
                "empty",
                Vec::new(),
            )],
            0,
        ));
        assert!(!report.succeeded());
        assert!(report.to_json().unwrap().contains("\"views\""));
    }
}
