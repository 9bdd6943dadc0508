//! Resolved, experiment-specific analysis configuration.

use std::collections::BTreeMap;

use analysis_catalog::{platform_for_app, Metric, PlatformConfig, PreTreatment, Segment, Statistic};
use analysis_core::types::normalize_table_name;
use analysis_core::{AnalysisPeriod, ExperimentStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One metric and statistic pair, with the pre-treatments applied first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub metric: Metric,
    pub statistic: Statistic,
    pub pre_treatments: Vec<PreTreatment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentConfiguration {
    pub experimenter_slug: String,
    pub normandy_slug: Option<String>,
    pub experiment_type: String,
    pub status: ExperimentStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub enrollment_period: Option<u32>,
    pub reference_branch: Option<String>,
    pub branches: Vec<String>,
    pub segments: Vec<Segment>,
    pub enrollment_query: Option<String>,
    pub app_id: String,
    pub app_name: String,
    pub is_high_population: bool,
    pub skip: bool,
}

impl ExperimentConfiguration {
    /// Slug enrollment events are tagged with.
    pub fn enrollment_slug(&self) -> &str {
        self.normandy_slug
            .as_deref()
            .unwrap_or(&self.experimenter_slug)
    }

    /// Warehouse-safe prefix for every table produced for this experiment.
    pub fn table_prefix(&self) -> String {
        normalize_table_name(&self.experimenter_slug)
    }

    pub fn platform(&self) -> Option<&'static PlatformConfig> {
        platform_for_app(&self.app_name, &self.app_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisConfiguration {
    pub experiment: ExperimentConfiguration,
    pub metrics: BTreeMap<AnalysisPeriod, Vec<Summary>>,
}

impl AnalysisConfiguration {
    pub fn summaries(&self, period: AnalysisPeriod) -> &[Summary] {
        self.metrics.get(&period).map_or(&[], Vec::as_slice)
    }

    /// Distinct metrics of a period, in first-seen order.
    pub fn metrics_for(&self, period: AnalysisPeriod) -> Vec<&Metric> {
        let mut seen = Vec::<&Metric>::new();
        for summary in self.summaries(period) {
            if !seen.iter().any(|m| m.name == summary.metric.name) {
                seen.push(&summary.metric);
            }
        }
        seen
    }

    pub fn periods(&self) -> impl Iterator<Item = AnalysisPeriod> + '_ {
        self.metrics
            .iter()
            .filter(|(_, summaries)| !summaries.is_empty())
            .map(|(period, _)| *period)
    }
}
