//! Batch validation on a bounded worker pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use analysis_catalog::Catalog;
use analysis_core::config::ValidationConfig;
use analysis_experimenter::ExperimentCollection;
use analysis_external::ConfigPath;
use analysis_spec::{AnalysisSpec, OutcomeSpec};
use analysis_warehouse::QueryBackend;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::harness::{validate_experiment_config, validate_outcome, ValidationError};
use crate::report::ValidationReport;

pub struct Validator {
    backend: Arc<dyn QueryBackend>,
    experiments: Arc<ExperimentCollection>,
    catalog: Arc<Catalog>,
    max_concurrency: usize,
    timeout: Duration,
}

impl Validator {
    pub fn new(
        backend: Arc<dyn QueryBackend>,
        experiments: Arc<ExperimentCollection>,
        catalog: Arc<Catalog>,
        config: &ValidationConfig,
    ) -> Self {
        Self {
            backend,
            experiments,
            catalog,
            max_concurrency: config.max_concurrency.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Validate one file's contents. The path decides whether it is an
    /// experiment config or an outcome snippet.
    pub async fn validate_contents(&self, path: &Path, contents: &str) -> Result<(), ValidationError> {
        match ConfigPath::classify(path) {
            Some(ConfigPath::Outcome { platform, .. }) => {
                let outcome = OutcomeSpec::from_toml_str(contents)?.with_platform(&platform);
                validate_outcome(&outcome, &platform, &self.catalog, self.backend.as_ref()).await
            }
            Some(ConfigPath::Experiment { slug }) => {
                let custom = AnalysisSpec::from_toml_str(contents)?;
                validate_experiment_config(
                    &slug,
                    &custom,
                    &self.experiments,
                    &self.catalog,
                    self.backend.as_ref(),
                )
                .await
            }
            None => Err(ValidationError::Io {
                path: path.display().to_string(),
                message: "not a .toml file".to_string(),
            }),
        }
    }

    pub async fn validate_file(&self, path: &Path) -> ValidationReport {
        let result = match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                match tokio::time::timeout(self.timeout, self.validate_contents(path, &contents)).await {
                    Ok(result) => result,
                    Err(_) => Err(ValidationError::Timeout(self.timeout.as_secs())),
                }
            }
            Err(e) => Err(ValidationError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        };
        match result {
            Ok(()) => ValidationReport::passed(path),
            Err(e) => ValidationReport::failed(path, &e),
        }
    }

    /// Validate every file concurrently. Reports come back in input order;
    /// one failure never stops the others.
    pub async fn validate_all(self: Arc<Self>, files: Vec<PathBuf>) -> Vec<ValidationReport> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let total = files.len();
        let paths = files.clone();

        for (index, path) in files.into_iter().enumerate() {
            let validator = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let report = match semaphore.acquire_owned().await {
                    Ok(_permit) => validator.validate_file(&path).await,
                    Err(_) => ValidationReport::failed(
                        &path,
                        &ValidationError::Io {
                            path: path.display().to_string(),
                            message: "worker pool closed".to_string(),
                        },
                    ),
                };
                (index, report)
            });
        }

        let mut reports: Vec<Option<ValidationReport>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => reports[index] = Some(report),
                Err(e) => error!(error = %e, "Validation task failed"),
            }
        }

        // A task that died without reporting still fails its file.
        let reports: Vec<ValidationReport> = reports
            .into_iter()
            .zip(paths)
            .map(|(report, path)| {
                report.unwrap_or_else(|| {
                    ValidationReport::failed(&path, &ValidationError::Aborted(path.display().to_string()))
                })
            })
            .collect();
        let failed = reports.iter().filter(|r| !r.is_valid()).count();
        info!(total, failed, "Validation finished");
        reports
    }
}
