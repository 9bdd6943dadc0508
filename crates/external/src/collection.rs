use std::path::PathBuf;

use analysis_catalog::platform_for_app;
use analysis_core::types::normalize_table_name;
use analysis_core::{Experiment, ParseError};
use analysis_spec::{AnalysisSpec, OutcomeSpec};
use analysis_warehouse::QueryBackend;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::path::ConfigPath;
use crate::repository::{ConfigFile, ConfigRepository, ExternalError};

/// An experiment-specific spec.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalConfig {
    pub slug: String,
    pub spec: AnalysisSpec,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalOutcome {
    pub slug: String,
    pub platform: String,
    pub spec: OutcomeSpec,
    pub last_modified: DateTime<Utc>,
}

/// A file that failed to parse. It is reported, not fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub error: ParseError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalConfigCollection {
    pub configs: Vec<ExternalConfig>,
    pub outcomes: Vec<ExternalOutcome>,
    pub skipped: Vec<SkippedFile>,
}

impl ExternalConfigCollection {
    pub async fn from_repository(repo: &dyn ConfigRepository) -> Result<Self, ExternalError> {
        let collection = Self::from_files(repo.files().await?);
        info!(
            configs = collection.configs.len(),
            outcomes = collection.outcomes.len(),
            skipped = collection.skipped.len(),
            "Loaded external configs"
        );
        Ok(collection)
    }

    pub fn from_files(files: impl IntoIterator<Item = ConfigFile>) -> Self {
        let mut collection = Self::default();
        for file in files {
            let Some(kind) = ConfigPath::classify(&file.path) else {
                continue;
            };
            let parsed = match kind {
                ConfigPath::Experiment { slug } => {
                    AnalysisSpec::from_toml_str(&file.contents).map(|spec| {
                        collection.configs.push(ExternalConfig {
                            slug,
                            spec,
                            last_modified: file.last_modified,
                        })
                    })
                }
                ConfigPath::Outcome { platform, slug } => {
                    OutcomeSpec::from_toml_str(&file.contents).map(|spec| {
                        collection.outcomes.push(ExternalOutcome {
                            slug,
                            spec: spec.with_platform(platform.clone()),
                            platform,
                            last_modified: file.last_modified,
                        })
                    })
                }
            };
            if let Err(error) = parsed {
                warn!(path = %file.path.display(), error = %error, "Skipping invalid config");
                collection.skipped.push(SkippedFile {
                    path: file.path,
                    error,
                });
            }
        }
        collection
    }

    pub fn spec_for_experiment(&self, slug: &str) -> Option<&AnalysisSpec> {
        self.configs.iter().find(|c| c.slug == slug).map(|c| &c.spec)
    }

    /// Outcome `slug` as written for `platform`. The same slug may exist
    /// under several platforms.
    pub fn outcome(&self, slug: &str, platform: &str) -> Option<&ExternalOutcome> {
        self.outcomes_for_platform(platform).find(|o| o.slug == slug)
    }

    pub fn outcomes_for_platform<'a: 'p, 'p>(
        &'a self,
        platform: &'p str,
    ) -> impl Iterator<Item = &'a ExternalOutcome> + 'p {
        self.outcomes.iter().filter(move |o| o.platform == platform)
    }

    /// Platform defaults, then the experiment's outcomes for its platform,
    /// then its own config.
    pub fn spec_for(&self, experiment: &Experiment) -> Result<AnalysisSpec, ParseError> {
        let platform = platform_for_app(&experiment.app_name, &experiment.app_id)
            .map_or(experiment.app_name.as_str(), |p| p.name);

        let mut spec = AnalysisSpec::default_for_experiment(experiment)?;
        for slug in &experiment.outcomes {
            match self.outcome(slug, platform) {
                Some(outcome) => {
                    spec.merge_outcome(&outcome.spec);
                }
                None => warn!(
                    slug = %experiment.experimenter_slug,
                    outcome = %slug,
                    platform = %platform,
                    "Outcome not found"
                ),
            }
        }
        if let Some(custom) = self.spec_for_experiment(&experiment.experimenter_slug) {
            spec.merge(custom);
        }
        Ok(spec)
    }

    /// Configs whose tables are missing or older than the config. When table
    /// metadata cannot be read every config counts as stale.
    pub async fn updated_configs(&self, backend: &dyn QueryBackend) -> Vec<&ExternalConfig> {
        let tables = match backend.table_labels().await {
            Ok(tables) => tables,
            Err(e) => {
                warn!(error = %e, "Treating every config as stale");
                metrics::counter!("external.config.stale").increment(self.configs.len() as u64);
                return self.configs.iter().collect();
            }
        };

        let stale: Vec<&ExternalConfig> = self
            .configs
            .iter()
            .filter(|config| {
                let prefix = normalize_table_name(&config.slug);
                let mut seen = false;
                for table in tables.iter().filter(|t| t.table_name.starts_with(&prefix)) {
                    seen = true;
                    match table.last_updated {
                        Some(updated) if updated < config.last_modified => return true,
                        _ => {}
                    }
                }
                !seen
            })
            .collect();

        for config in &stale {
            debug!(slug = %config.slug, "Config is stale");
        }
        metrics::counter!("external.config.stale").increment(stale.len() as u64);
        stale
    }
}
