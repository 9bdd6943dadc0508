use analysis_catalog::{platform, Catalog};
use analysis_core::{
    DryRunFailedError, Experiment, ExperimentStatus, ParseError, ResolutionError,
};
use analysis_experimenter::ExperimentCollection;
use analysis_spec::{AnalysisConfiguration, AnalysisSpec, OutcomeSpec};
use analysis_warehouse::{Analysis, QueryBackend};
use chrono::{TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, warn};

pub const DUMMY_EXPERIMENTER_SLUG: &str = "dummy-experiment";
pub const DUMMY_NORMANDY_SLUG: &str = "dummy_experiment";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    DryRun(#[from] DryRunFailedError),

    #[error("Platform '{0}' is unsupported.")]
    UnsupportedPlatform(String),

    #[error("No experiment with slug {0} in Experimenter.")]
    MissingExperiment(String),

    #[error("Could not read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Validation timed out after {0}s")]
    Timeout(u64),

    #[error("Validation of {0} aborted unexpectedly")]
    Aborted(String),
}

/// SQL with 1-based line numbers, four wide, trailing whitespace trimmed.
pub fn format_sql_with_line_numbers(sql: &str) -> String {
    sql.split('\n')
        .enumerate()
        .map(|(i, line)| format!("{:4} {}", i + 1, line.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Dry-run every statement of the configuration's analysis plan.
pub async fn dry_run(
    config: &AnalysisConfiguration,
    backend: &dyn QueryBackend,
) -> Result<(), DryRunFailedError> {
    match Analysis::new(config).validate(backend).await {
        Ok(()) => {
            debug!(slug = %config.experiment.experimenter_slug, "Dry run passed");
            Ok(())
        }
        Err(e) => {
            metrics::counter!("validation.dry_run.failed").increment(1);
            warn!(
                slug = %config.experiment.experimenter_slug,
                error = %e.message,
                "Dry run failed"
            );
            Err(e)
        }
    }
}

/// Stand-in experiment for configs that are not tied to a live experiment.
pub fn dummy_experiment(app_id: &str, platform: &str) -> Experiment {
    Experiment {
        experimenter_slug: DUMMY_EXPERIMENTER_SLUG.to_string(),
        normandy_slug: Some(DUMMY_NORMANDY_SLUG.to_string()),
        experiment_type: "v6".to_string(),
        status: ExperimentStatus::Live,
        start_date: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).single(),
        end_date: None,
        proposed_enrollment: Some(14),
        variants: Vec::new(),
        reference_branch: Some("control".to_string()),
        is_high_population: false,
        app_id: app_id.to_string(),
        app_name: platform.to_string(),
        outcomes: Vec::new(),
    }
}

/// Validate an outcome against every app id of `platform_name`.
pub async fn validate_outcome(
    outcome: &OutcomeSpec,
    platform_name: &str,
    catalog: &Catalog,
    backend: &dyn QueryBackend,
) -> Result<(), ValidationError> {
    let platform = platform(platform_name)
        .ok_or_else(|| ValidationError::UnsupportedPlatform(platform_name.to_string()))?;

    for app_id in platform.app_ids {
        let experiment = dummy_experiment(app_id, platform_name);
        let mut spec = AnalysisSpec::default_for_experiment(&experiment)?;
        spec.merge_outcome(outcome);
        let config = spec.resolve(&experiment, catalog)?;
        dry_run(&config, backend).await?;
    }
    Ok(())
}

/// Validate an experiment config layered over its platform defaults.
pub async fn validate_experiment_config(
    slug: &str,
    custom: &AnalysisSpec,
    experiments: &ExperimentCollection,
    catalog: &Catalog,
    backend: &dyn QueryBackend,
) -> Result<(), ValidationError> {
    let experiment = experiments
        .find(slug)
        .ok_or_else(|| ValidationError::MissingExperiment(slug.to_string()))?;

    let mut spec = AnalysisSpec::default_for_experiment(experiment)?;
    spec.merge(custom);
    let config = spec.resolve(experiment, catalog)?;
    dry_run(&config, backend).await?;
    Ok(())
}
