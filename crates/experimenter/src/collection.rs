use std::time::Duration;

use analysis_core::config::ExperimenterConfig;
use analysis_core::{Experiment, ExperimentStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::record::ExperimentRecord;

#[derive(Error, Debug)]
pub enum ExperimenterError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Experimenter returned HTTP {0}")]
    Status(u16),

    #[error("Invalid experiment metadata: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A filterable set of experiments. Filters consume and return the
/// collection so they chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentCollection {
    pub experiments: Vec<Experiment>,
}

impl ExperimentCollection {
    pub fn new(experiments: Vec<Experiment>) -> Self {
        Self { experiments }
    }

    pub async fn from_experimenter(config: &ExperimenterConfig) -> Result<Self, ExperimenterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("analysis-runner/", env!("CARGO_PKG_VERSION")))
            .build()?;

        debug!(url = %config.api_url, "Fetching experiments");
        let response = client.get(&config.api_url).send().await?;
        if !response.status().is_success() {
            return Err(ExperimenterError::Status(response.status().as_u16()));
        }
        let body = response.text().await?;
        let collection = Self::from_json(&body)?;
        info!(count = collection.len(), "Fetched experiments");
        Ok(collection)
    }

    pub fn from_json(body: &str) -> Result<Self, ExperimenterError> {
        let records: Vec<ExperimentRecord> = serde_json::from_str(body)?;
        Ok(Self::new(
            records
                .into_iter()
                .map(ExperimentRecord::into_experiment)
                .collect(),
        ))
    }

    fn filtered(self, keep: impl Fn(&Experiment) -> bool) -> Self {
        Self::new(self.experiments.into_iter().filter(|e| keep(e)).collect())
    }

    pub fn started_since(self, since: DateTime<Utc>) -> Self {
        self.filtered(|e| e.start_date.is_some_and(|start| start >= since))
    }

    pub fn end_after(self, after: DateTime<Utc>) -> Self {
        self.filtered(|e| e.end_date.is_some_and(|end| end >= after))
    }

    /// Experiments whose experimenter or normandy slug is `slug`.
    pub fn with_slug(self, slug: &str) -> Self {
        self.filtered(|e| e.experimenter_slug == slug || e.normandy_slug.as_deref() == Some(slug))
    }

    pub fn of_type(self, types: &[&str]) -> Self {
        self.filtered(|e| types.contains(&e.experiment_type.as_str()))
    }

    pub fn ever_launched(self) -> Self {
        self.filtered(|e| matches!(e.status, ExperimentStatus::Live | ExperimentStatus::Complete))
    }

    pub fn find(&self, slug: &str) -> Option<&Experiment> {
        self.experiments
            .iter()
            .find(|e| e.experimenter_slug == slug || e.normandy_slug.as_deref() == Some(slug))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experiment> {
        self.experiments.iter()
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}
