//! Attribute snapshot that templates are rendered against.

use analysis_core::dates::format_date;
use analysis_core::Experiment;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Text(String),
    Date(DateTime<Utc>),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// A known attribute without a value; renders as an empty string.
    Missing,
    /// A value that is itself a template and is expanded on lookup.
    Template(String),
}

impl ContextValue {
    /// Canonical string form. Template values have no plain form.
    pub fn as_plain(&self) -> Option<String> {
        match self {
            ContextValue::Text(s) => Some(s.clone()),
            ContextValue::Date(d) => Some(format_date(d)),
            ContextValue::Integer(i) => Some(i.to_string()),
            ContextValue::Float(f) => Some(f.to_string()),
            ContextValue::Bool(b) => Some(b.to_string()),
            ContextValue::Missing => Some(String::new()),
            ContextValue::Template(_) => None,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        ContextValue::Text(value.into())
    }

    pub fn optional_text(value: Option<&str>) -> Self {
        value.map_or(ContextValue::Missing, ContextValue::text)
    }

    pub fn optional_date(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(ContextValue::Missing, ContextValue::Date)
    }
}

/// Flat map from dotted attribute paths to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentContext {
    values: BTreeMap<String, ContextValue>,
}

impl ExperimentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the attributes of an experiment under the `experiment` namespace.
    pub fn from_experiment(experiment: &Experiment) -> Self {
        let branches = experiment
            .variants
            .iter()
            .map(|v| v.slug.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let enrollment = experiment
            .proposed_enrollment
            .map_or(ContextValue::Missing, |d| ContextValue::Integer(d as i64));
        let reference_branch = experiment
            .control_variant()
            .map(|v| v.slug.as_str())
            .or(experiment.reference_branch.as_deref());

        Self::new()
            .with("experiment.experimenter_slug", ContextValue::text(&experiment.experimenter_slug))
            .with(
                "experiment.normandy_slug",
                ContextValue::optional_text(experiment.normandy_slug.as_deref()),
            )
            .with("experiment.type", ContextValue::text(&experiment.experiment_type))
            .with("experiment.status", ContextValue::text(experiment.status.to_string()))
            .with("experiment.start_date", ContextValue::optional_date(experiment.start_date))
            .with("experiment.end_date", ContextValue::optional_date(experiment.end_date))
            .with("experiment.proposed_enrollment", enrollment.clone())
            .with("experiment.enrollment_period", enrollment)
            .with("experiment.reference_branch", ContextValue::optional_text(reference_branch))
            .with("experiment.app_id", ContextValue::text(&experiment.app_id))
            .with("experiment.app_name", ContextValue::text(&experiment.app_name))
            .with(
                "experiment.is_high_population",
                ContextValue::Bool(experiment.is_high_population),
            )
            .with("experiment.branches", ContextValue::Text(branches))
            .with("experiment.enrollment_query", ContextValue::Missing)
    }

    pub fn set(&mut self, path: impl Into<String>, value: ContextValue) {
        self.values.insert(path.into(), value);
    }

    pub fn with(mut self, path: impl Into<String>, value: ContextValue) -> Self {
        self.set(path, value);
        self
    }

    pub fn lookup(&self, path: &str) -> Option<&ContextValue> {
        self.values.get(path)
    }
}
