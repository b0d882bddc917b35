//! End-to-end runs of the orchestrator against in-memory stores.

use std::sync::Arc;

use lake_etl::domain::{Batch, ColumnDef, ColumnType, RowQuery, RowSink, SqlNullType};
use lake_etl::{
    CheckKind, Config, EtlError, LoadState, LoadStateMarker, MemoryConnector, MemoryStore,
    Orchestrator, RowSource, RunPhase, SqlValue, ENTITIES,
};

const HASH_A: &str = "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";
const HASH_B: &str = "fcde2b2edba56bf408601fb721fe9b5c338d10ee429ea04fae5511b68fbf8fb9";

fn null() -> SqlValue {
    SqlValue::Null(SqlNullType::String)
}

/// A small but internally consistent analytics lake.
fn lake() -> Arc<MemoryStore> {
    let lake = MemoryStore::new("lake");

    lake.put_table(
        "agencies_parsed",
        &[
            "id",
            "slug",
            "name",
            "short_name",
            "parent_slug",
            "cfr_reference_count",
            "child_count",
            "checksum",
        ],
        vec![
            vec![
                SqlValue::I64(2),
                "epa-air".into(),
                "Office of Air and Radiation".into(),
                null(),
                "epa".into(),
                SqlValue::I64(100),
                SqlValue::I64(0),
                HASH_B.into(),
            ],
            vec![
                SqlValue::I64(1),
                "epa".into(),
                "Environmental Protection Agency".into(),
                "EPA".into(),
                null(),
                SqlValue::I64(550),
                SqlValue::I64(1),
                HASH_A.into(),
            ],
            vec![
                SqlValue::I64(3),
                "usda".into(),
                "Department of Agriculture".into(),
                "USDA".into(),
                null(),
                SqlValue::I64(200),
                SqlValue::I64(0),
                HASH_A.into(),
            ],
        ],
    )
    .unwrap();

    let correction = |id: i64, ecfr_id: &str, year: i64, occurred: &str, corrected: &str, lag: i64| {
        vec![
            SqlValue::I64(id),
            ecfr_id.into(),
            "40 CFR 52.1".into(),
            SqlValue::I64(40),
            "I".into(),
            "52".into(),
            "52.1".into(),
            "Corrected paragraph (b)".into(),
            occurred.into(),
            corrected.into(),
            SqlValue::I64(lag),
            "88 FR 1234".into(),
            SqlValue::I64(year),
            HASH_B.into(),
        ]
    };
    lake.put_table(
        "corrections_parsed",
        &[
            "id",
            "ecfr_id",
            "cfr_reference",
            "title",
            "chapter",
            "part",
            "section",
            "corrective_action",
            "error_occurred",
            "error_corrected",
            "lag_days",
            "fr_citation",
            "year",
            "checksum",
        ],
        vec![
            correction(1, "c-1", 2023, "2023-01-02", "2023-01-12", 10),
            correction(2, "c-2", 2023, "2023-02-01", "2023-02-12", 11),
            correction(3, "c-3", 2024, "2024-03-01", "2024-03-05", 4),
        ],
    )
    .unwrap();

    lake.put_table(
        "agency_metrics",
        &[
            "slug",
            "total_corrections",
            "years_with_corrections",
            "first_correction_year",
            "last_correction_year",
            "avg_correction_lag_days",
            "rvi",
            "cfr_reference_count",
        ],
        vec![
            vec![
                "epa".into(),
                SqlValue::I64(12),
                SqlValue::I64(2),
                SqlValue::I64(2023),
                SqlValue::I64(2024),
                SqlValue::F64(8.33),
                SqlValue::F64(2.18),
                SqlValue::I64(550),
            ],
            vec![
                "epa-air".into(),
                SqlValue::I64(3),
                SqlValue::I64(1),
                SqlValue::I64(2024),
                SqlValue::I64(2024),
                SqlValue::F64(4.0),
                SqlValue::F64(3.0),
                SqlValue::I64(100),
            ],
            vec![
                "usda".into(),
                SqlValue::I64(0),
                SqlValue::I64(0),
                SqlValue::Null(SqlNullType::I64),
                SqlValue::Null(SqlNullType::I64),
                SqlValue::Null(SqlNullType::F64),
                SqlValue::F64(0.0),
                SqlValue::I64(200),
            ],
        ],
    )
    .unwrap();

    lake.put_table(
        "correction_time_series",
        &["year", "month", "correction_count", "avg_lag_days"],
        vec![
            vec![SqlValue::I64(2024), SqlValue::I64(3), SqlValue::I64(1), SqlValue::F64(4.0)],
            vec![SqlValue::I64(2023), SqlValue::I64(1), SqlValue::I64(1), SqlValue::F64(10.0)],
            vec![SqlValue::I64(2023), SqlValue::I64(2), SqlValue::I64(1), SqlValue::F64(11.0)],
        ],
    )
    .unwrap();

    lake.put_table(
        "correction_trends_by_title",
        &[
            "title",
            "correction_count",
            "years_active",
            "first_year",
            "last_year",
            "avg_lag_days",
        ],
        vec![vec![
            SqlValue::I64(40),
            SqlValue::I64(3),
            SqlValue::I64(2),
            SqlValue::I64(2023),
            SqlValue::I64(2024),
            SqlValue::F64(8.33),
        ]],
    )
    .unwrap();

    Arc::new(lake)
}

fn config(batch_size: usize) -> Config {
    let mut config = Config::default();
    config.etl.batch_size = batch_size;
    config
}

fn orchestrator(lake: &Arc<MemoryStore>, serving: &Arc<MemoryStore>, batch_size: usize) -> Orchestrator {
    Orchestrator::with_connector(
        config(batch_size),
        MemoryConnector::new(lake.clone(), serving.clone()),
    )
}

async fn target_counts(serving: &MemoryStore) -> Vec<i64> {
    let mut counts = Vec::new();
    for entity in ENTITIES {
        counts.push(serving.count_rows(entity.target_table).await.unwrap());
    }
    counts
}

async fn log_rows(serving: &MemoryStore) -> Vec<Vec<SqlValue>> {
    serving
        .fetch_rows(&RowQuery::new(
            "etl_log",
            &["source_db", "records_processed", "status", "error_message"],
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_full_run_loads_and_verifies() {
    let lake = lake();
    let serving = Arc::new(MemoryStore::new("serving"));

    let report = orchestrator(&lake, &serving, 2).run().await.unwrap();

    assert!(report.succeeded(), "{}", report.verification.as_ref().unwrap().summary());
    assert_eq!(report.records_processed, 12);
    assert_eq!(report.entities.len(), 5);
    assert_eq!(report.entities[1].entity, "corrections");
    assert_eq!(report.entities[1].batches, 2);
    assert_eq!(target_counts(&serving).await, vec![3, 3, 3, 3, 1]);

    let phases = &report.phases;
    assert_eq!(phases.first(), Some(&RunPhase::Idle));
    assert!(phases.contains(&RunPhase::Transferring(5)));
    assert!(phases.contains(&RunPhase::Verifying));
    assert_eq!(&phases[phases.len() - 2..], &[RunPhase::Logged, RunPhase::Closed]);

    let logs = log_rows(&serving).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0][0], SqlValue::from("memory://lake"));
    assert_eq!(logs[0][1], SqlValue::I32(12));
    assert_eq!(logs[0][2], SqlValue::from("success"));
    assert!(logs[0][3].is_null());

    let (state, run_id) = LoadStateMarker::current(&*serving).await.unwrap().unwrap();
    assert_eq!(state, LoadState::Ready);
    assert_eq!(run_id, report.run_id);

    assert!(serving.is_closed());
    assert!(lake.is_closed());
}

#[tokio::test]
async fn test_agencies_are_loaded_in_id_order_with_renamed_columns() {
    let lake = lake();
    let serving = Arc::new(MemoryStore::new("serving"));
    orchestrator(&lake, &serving, 100).run().await.unwrap();

    let rows = serving
        .fetch_rows(&RowQuery::new("agencies", &["slug", "total_cfr_references"]))
        .await
        .unwrap();
    assert_eq!(rows[0], vec![SqlValue::from("epa"), SqlValue::I32(550)]);
    assert_eq!(rows[1][0], SqlValue::from("epa-air"));

    let metrics = serving
        .fetch_rows(
            &RowQuery::new("agency_metrics", &["agency_slug", "word_count_estimate"])
                .ordered_by(&["agency_slug"]),
        )
        .await
        .unwrap();
    assert_eq!(metrics[0], vec![SqlValue::from("epa"), SqlValue::I64(275_000)]);
    assert_eq!(metrics[2], vec![SqlValue::from("usda"), SqlValue::I64(100_000)]);
}

#[tokio::test]
async fn test_two_runs_give_identical_counts() {
    let lake = lake();
    let serving = Arc::new(MemoryStore::new("serving"));
    let orchestrator = orchestrator(&lake, &serving, 100);

    let first = orchestrator.run().await.unwrap();
    let after_first = target_counts(&serving).await;
    let second = orchestrator.run().await.unwrap();
    let after_second = target_counts(&serving).await;

    assert_eq!(after_first, after_second);
    assert_eq!(first.records_processed, second.records_processed);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(log_rows(&serving).await.len(), 2);
    assert_eq!(serving.count_rows("etl_load_state").await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_corrections_transfer_leaves_partial_load_flagged() {
    let lake = lake();
    let serving = Arc::new(MemoryStore::new("serving"));
    serving.fail_writes_to("corrections").unwrap();

    let err = orchestrator(&lake, &serving, 100).run().await.unwrap_err();
    assert!(matches!(err, EtlError::Transfer { ref entity, .. } if entity == "corrections"));
    assert_eq!(err.exit_code(), 4);

    // agencies committed before the failure, corrections rolled back
    assert_eq!(serving.count_rows("agencies").await.unwrap(), 3);
    assert_eq!(serving.count_rows("corrections").await.unwrap(), 0);
    assert_eq!(serving.count_rows("agency_metrics").await.unwrap(), 0);

    let logs = log_rows(&serving).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0][1], SqlValue::I32(3));
    assert_eq!(logs[0][2], SqlValue::from("failed"));
    let message = logs[0][3].as_str().unwrap();
    assert!(message.contains("corrections"), "{}", message);

    let (state, _) = LoadStateMarker::current(&*serving).await.unwrap().unwrap();
    assert_eq!(state, LoadState::Failed);

    assert!(!serving.in_transaction());
    assert!(serving.foreign_keys_enforced());
    assert!(serving.is_closed());
}

#[tokio::test]
async fn test_rerun_after_failure_recovers() {
    let lake = lake();
    let serving = Arc::new(MemoryStore::new("serving"));

    orchestrator(&lake, &serving, 100).run().await.unwrap();
    let good = target_counts(&serving).await;

    let broken = Arc::new(MemoryStore::new("lake-broken"));
    assert!(orchestrator(&broken, &serving, 100).run().await.is_err());
    assert_eq!(target_counts(&serving).await, vec![0, 0, 0, 0, 0]);

    orchestrator(&lake, &serving, 100).run().await.unwrap();
    assert_eq!(target_counts(&serving).await, good);
    let (state, _) = LoadStateMarker::current(&*serving).await.unwrap().unwrap();
    assert_eq!(state, LoadState::Ready);
}

#[tokio::test]
async fn test_run_without_verification() {
    let lake = lake();
    let serving = Arc::new(MemoryStore::new("serving"));
    let mut config = config(100);
    config.etl.verify_after_load = false;

    let report = Orchestrator::with_connector(config, MemoryConnector::new(lake, serving))
        .run()
        .await
        .unwrap();
    assert!(report.verification.is_none());
    assert!(!report.phases.contains(&RunPhase::Verifying));
    assert!(report.succeeded());
}

#[tokio::test]
async fn test_verify_entrypoint_reports_failing_check() {
    let lake = lake();
    let serving = Arc::new(MemoryStore::new("serving"));
    let orchestrator = orchestrator(&lake, &serving, 100);
    orchestrator.run().await.unwrap();

    assert!(orchestrator.verify().await.unwrap().passed);

    // an orphaned metric row breaks referential integrity and counts
    serving
        .write_batch(
            "agency_metrics",
            &[ColumnDef::new("agency_slug", ColumnType::Text)],
            Batch::new(vec![vec!["gone".into()]]),
        )
        .await
        .unwrap();

    let report = orchestrator.verify().await.unwrap();
    assert!(!report.passed);
    assert!(!report.check(CheckKind::Referential).unwrap().passed);
    assert!(!report.check(CheckKind::Counts).unwrap().passed);
    assert!(report.check(CheckKind::Aggregates).unwrap().passed);
    assert!(matches!(
        report.into_result(),
        Err(EtlError::Verification { failed: 2, total: 6 })
    ));
}
