//! Layered merging of specs.
//!
//! `base.merge(&other)` applies `other` on top of `base`:
//!
//! * scalar overrides replace the base value when set
//! * named definitions are unioned by key, and on conflict the whole
//!   definition from `other` replaces the base one
//! * name lists keep base order with new names appended once
//!
//! Merging is not commutative. Apply layers lowest precedence first.

use std::collections::BTreeMap;

use analysis_core::AnalysisPeriod;
use tracing::debug;

use crate::spec::{
    AnalysisSpec, DataSourcesSpec, ExperimentSpec, MetricsSpec, OutcomeSpec, SegmentsSpec,
};

/// Periods an outcome's metrics are scheduled for.
const OUTCOME_PERIODS: [AnalysisPeriod; 2] = [AnalysisPeriod::Week, AnalysisPeriod::Overall];

/// Returns `base` with `other` applied on top.
pub fn merge(base: &AnalysisSpec, other: &AnalysisSpec) -> AnalysisSpec {
    let mut merged = base.clone();
    merged.merge(other);
    merged
}

impl AnalysisSpec {
    pub fn merge(&mut self, other: &AnalysisSpec) -> &mut Self {
        self.experiment.merge(&other.experiment);
        self.metrics.merge(&other.metrics);
        self.data_sources.merge(&other.data_sources);
        self.segments.merge(&other.segments);
        self
    }

    /// Add an outcome's definitions as if they were declared inline, and
    /// schedule its metrics weekly and overall.
    pub fn merge_outcome(&mut self, outcome: &OutcomeSpec) -> &mut Self {
        for definition in &outcome.metrics {
            self.metrics
                .definitions
                .insert(definition.name.clone(), definition.clone());
        }
        self.data_sources.merge(&outcome.data_sources);

        let names: Vec<String> = outcome.metric_names().map(str::to_string).collect();
        for period in OUTCOME_PERIODS {
            append_unique(self.metrics.periods.entry(period).or_default(), &names);
        }
        debug!(
            metrics = names.len(),
            platform = outcome.platform.as_deref().unwrap_or("any"),
            "Merged outcome"
        );
        self
    }
}

impl ExperimentSpec {
    pub fn merge(&mut self, other: &ExperimentSpec) {
        override_with(&mut self.enrollment_query, &other.enrollment_query);
        override_with(&mut self.reference_branch, &other.reference_branch);
        override_with(&mut self.start_date, &other.start_date);
        override_with(&mut self.end_date, &other.end_date);
        override_with(&mut self.enrollment_period, &other.enrollment_period);
        override_with(&mut self.skip, &other.skip);
        append_unique(&mut self.segments, &other.segments);
    }
}

impl MetricsSpec {
    pub fn merge(&mut self, other: &MetricsSpec) {
        for (period, names) in &other.periods {
            append_unique(self.periods.entry(*period).or_default(), names);
        }
        replace_entries(&mut self.definitions, &other.definitions);
    }
}

impl DataSourcesSpec {
    pub fn merge(&mut self, other: &DataSourcesSpec) {
        replace_entries(&mut self.definitions, &other.definitions);
    }
}

impl SegmentsSpec {
    pub fn merge(&mut self, other: &SegmentsSpec) {
        replace_entries(&mut self.definitions, &other.definitions);
        replace_entries(&mut self.data_sources, &other.data_sources);
    }
}

fn override_with<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

fn replace_entries<V: Clone>(target: &mut BTreeMap<String, V>, other: &BTreeMap<String, V>) {
    for (name, value) in other {
        target.insert(name.clone(), value.clone());
    }
}

/// Appends names not yet present, collapsing duplicates within `target` too.
fn append_unique(target: &mut Vec<String>, names: &[String]) {
    let mut seen = std::collections::HashSet::with_capacity(target.len() + names.len());
    target.retain(|name| seen.insert(name.clone()));
    for name in names {
        if seen.insert(name.clone()) {
            target.push(name.clone());
        }
    }
}
