//! Wire format of the experiment metadata API.

use analysis_core::dates::{from_unix_millis, parse_date};
use analysis_core::{Experiment, ExperimentStatus, Variant};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

/// Dates arrive as unix milliseconds from older endpoints and as
/// `YYYY-MM-DD` strings from newer ones.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DateValue {
    Millis(f64),
    Text(String),
}

impl DateValue {
    fn to_datetime(&self, key: &str) -> Option<DateTime<Utc>> {
        match self {
            DateValue::Millis(millis) => from_unix_millis(*millis as i64),
            DateValue::Text(text) => match parse_date(key, text) {
                Ok(date) => Some(date),
                Err(e) => {
                    warn!(error = %e, "Ignoring unparseable date");
                    None
                }
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantRecord {
    pub slug: String,
    #[serde(default)]
    pub ratio: f64,
    #[serde(default)]
    pub is_control: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentRecord {
    pub slug: String,
    #[serde(default)]
    pub normandy_slug: Option<String>,
    #[serde(rename = "type", default)]
    pub experiment_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateValue>,
    #[serde(default)]
    pub end_date: Option<DateValue>,
    #[serde(default)]
    pub proposed_enrollment: Option<f64>,
    #[serde(default)]
    pub variants: Vec<VariantRecord>,
    #[serde(default)]
    pub reference_branch: Option<String>,
    #[serde(default)]
    pub is_high_population: Option<bool>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default, alias = "application")]
    pub app_name: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<OutcomeRecord>,
}

/// Outcomes are listed either as bare slugs or as `{ "slug": ... }` objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OutcomeRecord {
    Slug(String),
    Object { slug: String },
}

impl ExperimentRecord {
    /// Convert to the shared model. Records with an unrecognised status are
    /// treated as drafts.
    pub fn into_experiment(self) -> Experiment {
        let status = match self.status.as_deref() {
            Some(raw) => ExperimentStatus::parse(raw).unwrap_or_else(|| {
                warn!(slug = %self.slug, status = %raw, "Unknown experiment status");
                ExperimentStatus::Draft
            }),
            None => ExperimentStatus::Draft,
        };

        Experiment {
            start_date: self
                .start_date
                .as_ref()
                .and_then(|d| d.to_datetime("start_date")),
            end_date: self.end_date.as_ref().and_then(|d| d.to_datetime("end_date")),
            proposed_enrollment: self
                .proposed_enrollment
                .filter(|days| *days >= 0.0)
                .map(|days| days.round() as u32),
            variants: self
                .variants
                .into_iter()
                .map(|v| Variant {
                    slug: v.slug,
                    ratio: v.ratio,
                    is_control: v.is_control,
                })
                .collect(),
            outcomes: self
                .outcomes
                .into_iter()
                .map(|o| match o {
                    OutcomeRecord::Slug(slug) | OutcomeRecord::Object { slug } => slug,
                })
                .collect(),
            normandy_slug: self.normandy_slug.filter(|s| !s.is_empty()),
            experiment_type: self.experiment_type,
            status,
            reference_branch: self.reference_branch,
            is_high_population: self.is_high_population.unwrap_or(false),
            app_id: self.app_id.unwrap_or_default(),
            app_name: self.app_name.unwrap_or_default(),
            experimenter_slug: self.slug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_millis_and_text_dates() {
        let millis = DateValue::Millis(1_580_515_200_000.0);
        assert_eq!(
            millis.to_datetime("start_date"),
            Some(Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap())
        );
        let text = DateValue::Text("2020-02-01".into());
        assert_eq!(text.to_datetime("start_date"), millis.to_datetime("start_date"));
        assert_eq!(DateValue::Text("soon".into()).to_datetime("start_date"), None);
    }

    #[test]
    fn test_record_conversion() {
        let record: ExperimentRecord = serde_json::from_value(serde_json::json!({
            "slug": "my-exp",
            "normandy_slug": "",
            "type": "pref",
            "status": "Live",
            "start_date": "2020-03-01",
            "end_date": null,
            "proposed_enrollment": 7,
            "variants": [{"slug": "control", "ratio": 50, "is_control": true}],
            "outcomes": ["tastiness", {"slug": "performance"}],
            "application": "fenix",
        }))
        .unwrap();

        let experiment = record.into_experiment();
        assert_eq!(experiment.experimenter_slug, "my-exp");
        assert_eq!(experiment.normandy_slug, None);
        assert_eq!(experiment.status, ExperimentStatus::Live);
        assert_eq!(experiment.proposed_enrollment, Some(7));
        assert!(experiment.end_date.is_none());
        assert_eq!(experiment.app_name, "fenix");
        assert_eq!(experiment.outcomes, ["tastiness", "performance"]);
        assert!(experiment.variants[0].is_control);
    }

    #[test]
    fn test_unknown_status_is_draft() {
        let record: ExperimentRecord =
            serde_json::from_value(serde_json::json!({"slug": "x", "status": "Archived"})).unwrap();
        assert_eq!(record.into_experiment().status, ExperimentStatus::Draft);
    }
}
