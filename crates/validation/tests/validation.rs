use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use analysis_catalog::Catalog;
use analysis_core::config::ValidationConfig;
use analysis_core::{DryRunFailedError, Experiment, ExperimentStatus, StalenessCheckError, Variant};
use analysis_experimenter::ExperimentCollection;
use analysis_validation::{ValidationStatus, Validator};
use analysis_warehouse::{QueryBackend, RecordingBackend, TableLabels, TableMetadata, WarehouseError};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

const VALID_CONFIG: &str = r#"
[experiment]
enrollment_period = 7

[metrics]
weekly = ["active_hours"]
"#;

const BROKEN_CONFIG: &str = r#"
[metrics]
weekly = ["broken_metric"]

[metrics.broken_metric]
select_expression = "SUM(broken_column)"
data_source = "clients_daily"

[metrics.broken_metric.statistics.bootstrap_mean]
"#;

const OUTCOME: &str = r#"
friendly_name = "Performance"
description = "Page load times"

[metrics.page_load]
select_expression = "AVG(page_load_ms)"
data_source = "baseline"

[metrics.page_load.statistics.bootstrap_mean]
"#;

fn experiment(slug: &str) -> Experiment {
    Experiment {
        experimenter_slug: slug.to_string(),
        normandy_slug: None,
        experiment_type: "pref".to_string(),
        status: ExperimentStatus::Live,
        start_date: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).single(),
        end_date: None,
        proposed_enrollment: Some(7),
        variants: vec![
            Variant {
                slug: "control".to_string(),
                ratio: 0.5,
                is_control: true,
            },
            Variant {
                slug: "treatment".to_string(),
                ratio: 0.5,
                is_control: false,
            },
        ],
        reference_branch: None,
        is_high_population: false,
        app_id: "firefox-desktop".to_string(),
        app_name: "firefox_desktop".to_string(),
        outcomes: vec![],
    }
}

struct Fixture {
    dir: TempDir,
    backend: Arc<RecordingBackend>,
    validator: Arc<Validator>,
}

/// Panics while planning any statement that mentions `crash_column`.
struct CrashingBackend;

#[async_trait]
impl QueryBackend for CrashingBackend {
    async fn dry_run(&self, sql: &str) -> Result<(), DryRunFailedError> {
        assert!(!sql.contains("crash_column"), "backend crashed");
        Ok(())
    }

    async fn execute(&self, _: &str, _: &str, _: &TableLabels) -> Result<(), WarehouseError> {
        Ok(())
    }

    async fn table_exists(&self, _: &str) -> Result<bool, WarehouseError> {
        Ok(false)
    }

    async fn table_labels(&self) -> Result<Vec<TableMetadata>, StalenessCheckError> {
        Ok(Vec::new())
    }
}

fn experiments() -> Arc<ExperimentCollection> {
    Arc::new(ExperimentCollection::new(vec![
        experiment("my-exp"),
        experiment("broken-exp"),
    ]))
}

fn validation_config() -> ValidationConfig {
    ValidationConfig {
        max_concurrency: 2,
        timeout_secs: 30,
    }
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend::new());
        let validator = Validator::new(
            backend.clone(),
            experiments(),
            Arc::new(Catalog::builtin()),
            &validation_config(),
        );
        Self {
            dir,
            backend,
            validator: Arc::new(validator),
        }
    }

    fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }
}

#[tokio::test]
async fn test_valid_experiment_config() {
    let fixture = Fixture::new();
    let path = fixture.write("my-exp.toml", VALID_CONFIG);

    let report = fixture.validator.validate_file(&path).await;
    assert!(report.is_valid(), "{report}");
    let dry_runs = fixture.backend.dry_runs();
    assert!(dry_runs.len() >= 2);
    assert!(dry_runs[0].contains("'my-exp'"));
    assert!(fixture.backend.written_tables().is_empty());
}

#[tokio::test]
async fn test_missing_experiment() {
    let fixture = Fixture::new();
    let path = fixture.write("unknown-exp.toml", VALID_CONFIG);

    let report = fixture.validator.validate_file(&path).await;
    assert_eq!(report.status, ValidationStatus::Failed);
    assert_eq!(
        report.message.as_deref(),
        Some("No experiment with slug unknown-exp in Experimenter.")
    );
}

#[tokio::test]
async fn test_dry_run_failure_reports_sql() {
    let fixture = Fixture::new();
    fixture
        .backend
        .fail_when("broken_column", "Missing columns: 'broken_column'");
    let path = fixture.write("broken-exp.toml", BROKEN_CONFIG);

    let report = fixture.validator.validate_file(&path).await;
    assert!(!report.is_valid());
    let sql = report.sql.as_deref().unwrap();
    assert!(sql.starts_with("   1 WITH enrollments AS ("));
    assert!(sql.contains("SUM(broken_column) AS broken_metric"));
    assert!(report.message.unwrap().contains("Missing columns"));
}

#[tokio::test]
async fn test_outcome_validated_for_every_app_id() {
    let fixture = Fixture::new();
    let path = fixture.write("outcomes/fenix/performance.toml", OUTCOME);

    let report = fixture.validator.validate_file(&path).await;
    assert!(report.is_valid(), "{report}");

    let dry_runs = fixture.backend.dry_runs();
    for dataset in ["org_mozilla_firefox", "org_mozilla_firefox_beta", "org_mozilla_fenix"] {
        let table = format!("FROM {dataset}.events_unnested e");
        assert!(dry_runs.iter().any(|sql| sql.contains(&table)), "{dataset}");
    }
    assert!(dry_runs.iter().any(|sql| sql.contains("AVG(page_load_ms) AS page_load")));
}

#[tokio::test]
async fn test_unsupported_platform() {
    let fixture = Fixture::new();
    let path = fixture.write("outcomes/klar/performance.toml", OUTCOME);

    let report = fixture.validator.validate_file(&path).await;
    assert_eq!(report.message.as_deref(), Some("Platform 'klar' is unsupported."));
    assert!(fixture.backend.dry_runs().is_empty());
}

#[tokio::test]
async fn test_batch_keeps_order_and_continues_after_failures() {
    let fixture = Fixture::new();
    fixture.backend.fail_when("broken_column", "Missing columns");
    let files = vec![
        fixture.write("broken-exp.toml", BROKEN_CONFIG),
        fixture.write("my-exp.toml", VALID_CONFIG),
        fixture.write("bad-shape.toml", "[metrics]\nweekly = \"active_hours\"\n"),
        fixture.dir.path().join("missing.toml"),
        fixture.write("outcomes/fenix/performance.toml", OUTCOME),
    ];

    let reports = fixture.validator.clone().validate_all(files.clone()).await;
    let paths: Vec<_> = reports.iter().map(|r| r.path.clone()).collect();
    assert_eq!(paths, files);

    let statuses: Vec<_> = reports.iter().map(|r| r.is_valid()).collect();
    assert_eq!(statuses, [false, true, false, false, true]);
    assert!(reports[2].message.as_deref().unwrap().contains("Expected a list"));
    assert!(reports[3].message.as_deref().unwrap().starts_with("Could not read"));
}

#[tokio::test]
async fn test_batch_reports_file_whose_task_died() {
    let fixture = Fixture::new();
    let crash = fixture.write(
        "broken-exp.toml",
        &BROKEN_CONFIG.replace("broken_column", "crash_column"),
    );
    let valid = fixture.write("my-exp.toml", VALID_CONFIG);
    let validator = Arc::new(Validator::new(
        Arc::new(CrashingBackend),
        experiments(),
        Arc::new(Catalog::builtin()),
        &validation_config(),
    ));

    let reports = validator.validate_all(vec![crash.clone(), valid.clone()]).await;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].path, crash);
    assert_eq!(reports[0].status, ValidationStatus::Failed);
    assert!(reports[0].message.as_deref().unwrap().contains("aborted unexpectedly"));
    assert_eq!(reports[1].path, valid);
    assert!(reports[1].is_valid());
}

#[tokio::test]
async fn test_oversized_enrollment_period_fails_report() {
    let fixture = Fixture::new();
    let path = fixture.write(
        "my-exp.toml",
        "[experiment]\nenrollment_period = 4000000000\n",
    );

    let reports = fixture.validator.clone().validate_all(vec![path.clone()]).await;
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].is_valid());
    assert!(reports[0]
        .message
        .as_deref()
        .unwrap()
        .contains("exceeds the maximum"));
    assert!(fixture.backend.dry_runs().is_empty());
}
