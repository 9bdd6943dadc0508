use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest enrollment period an analysis accepts, in days.
pub const MAX_ENROLLMENT_PERIOD_DAYS: u32 = 3650;

/// Lifecycle state of an experiment as reported by the metadata service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExperimentStatus {
    Draft,
    Preview,
    Live,
    Complete,
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentStatus::Draft => write!(f, "Draft"),
            ExperimentStatus::Preview => write!(f, "Preview"),
            ExperimentStatus::Live => write!(f, "Live"),
            ExperimentStatus::Complete => write!(f, "Complete"),
        }
    }
}

impl ExperimentStatus {
    /// Parse the status strings used by the metadata service, which vary in
    /// case between API versions.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "draft" | "review" | "ship" | "accepted" => Some(ExperimentStatus::Draft),
            "preview" => Some(ExperimentStatus::Preview),
            "live" => Some(ExperimentStatus::Live),
            "complete" => Some(ExperimentStatus::Complete),
            _ => None,
        }
    }
}

/// One branch of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    pub slug: String,
    pub ratio: f64,
    pub is_control: bool,
}

/// Experiment metadata. Immutable once fetched; resolution only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    pub experimenter_slug: String,
    pub normandy_slug: Option<String>,
    #[serde(rename = "type")]
    pub experiment_type: String,
    pub status: ExperimentStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub proposed_enrollment: Option<u32>,
    pub variants: Vec<Variant>,
    pub reference_branch: Option<String>,
    pub is_high_population: bool,
    pub app_id: String,
    pub app_name: String,
    #[serde(default)]
    pub outcomes: Vec<String>,
}

impl Experiment {
    pub fn control_variant(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.is_control)
    }

    pub fn has_variant(&self, slug: &str) -> bool {
        self.variants.iter().any(|v| v.slug == slug)
    }

    /// Slug used to tag enrollment events; falls back to the experimenter slug.
    pub fn enrollment_slug(&self) -> &str {
        self.normandy_slug
            .as_deref()
            .unwrap_or(&self.experimenter_slug)
    }
}

/// Cadence over which metrics are aggregated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPeriod {
    Day,
    Week,
    Days28,
    Overall,
}

impl AnalysisPeriod {
    pub const ALL: [AnalysisPeriod; 4] = [
        AnalysisPeriod::Day,
        AnalysisPeriod::Week,
        AnalysisPeriod::Days28,
        AnalysisPeriod::Overall,
    ];

    /// Key of the metric list in a spec's `[metrics]` table.
    pub fn config_key(&self) -> &'static str {
        match self {
            AnalysisPeriod::Day => "daily",
            AnalysisPeriod::Week => "weekly",
            AnalysisPeriod::Days28 => "days28",
            AnalysisPeriod::Overall => "overall",
        }
    }

    pub fn from_config_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.config_key() == key)
    }

    /// Suffix used in result table names.
    pub fn table_suffix(&self) -> &'static str {
        match self {
            AnalysisPeriod::Day => "day",
            AnalysisPeriod::Week => "week",
            AnalysisPeriod::Days28 => "days28",
            AnalysisPeriod::Overall => "overall",
        }
    }

    /// Window length in days; `None` for the whole observation period.
    pub fn window_days(&self) -> Option<u32> {
        match self {
            AnalysisPeriod::Day => Some(1),
            AnalysisPeriod::Week => Some(7),
            AnalysisPeriod::Days28 => Some(28),
            AnalysisPeriod::Overall => None,
        }
    }
}

impl fmt::Display for AnalysisPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Normalise a slug into a warehouse-safe table name prefix.
pub fn normalize_table_name(slug: &str) -> String {
    slug.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_experiment() -> Experiment {
        Experiment {
            experimenter_slug: "test_slug".to_string(),
            normandy_slug: None,
            experiment_type: "pref".to_string(),
            status: ExperimentStatus::Live,
            start_date: None,
            end_date: None,
            proposed_enrollment: Some(7),
            variants: vec![
                Variant {
                    slug: "a".to_string(),
                    ratio: 1.0,
                    is_control: false,
                },
                Variant {
                    slug: "b".to_string(),
                    ratio: 1.0,
                    is_control: true,
                },
            ],
            reference_branch: None,
            is_high_population: false,
            app_id: "firefox-desktop".to_string(),
            app_name: "firefox_desktop".to_string(),
            outcomes: Vec::new(),
        }
    }

    #[test]
    fn test_control_variant() {
        let experiment = sample_experiment();
        assert_eq!(experiment.control_variant().unwrap().slug, "b");
        assert!(experiment.has_variant("a"));
        assert!(!experiment.has_variant("c"));
        assert_eq!(experiment.enrollment_slug(), "test_slug");
    }

    #[test]
    fn test_period_keys_round_trip() {
        for period in AnalysisPeriod::ALL {
            assert_eq!(AnalysisPeriod::from_config_key(period.config_key()), Some(period));
        }
        assert_eq!(AnalysisPeriod::from_config_key("monthly"), None);
        assert_eq!(AnalysisPeriod::Week.window_days(), Some(7));
        assert_eq!(AnalysisPeriod::Overall.window_days(), None);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(ExperimentStatus::parse("Live"), Some(ExperimentStatus::Live));
        assert_eq!(ExperimentStatus::parse("complete"), Some(ExperimentStatus::Complete));
        assert_eq!(ExperimentStatus::parse("bogus"), None);
        assert_eq!(ExperimentStatus::Complete.to_string(), "Complete");
    }

    #[test]
    fn test_normalize_table_name() {
        assert_eq!(normalize_table_name("test-experiment"), "test_experiment");
        assert_eq!(normalize_table_name("Bug-123.Fix"), "bug_123_fix");
    }
}
