use thiserror::Error;

/// Malformed spec text or a value with the wrong shape. Fatal for one file.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Invalid TOML: {0}")]
    Toml(String),

    #[error("Expected a list of names for `{key}`, found {found}")]
    ExpectedList { key: String, found: String },

    #[error("Expected {expected} for `{key}`, found {found}")]
    InvalidType {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("Invalid date `{value}` for `{key}`, expected YYYY-MM-DD")]
    InvalidDate { key: String, value: String },

    #[error("Invalid value for `{key}`: {message}")]
    Invalid { key: String, message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Template syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Unknown template attribute `{0}`")]
    UnknownAttribute(String),

    #[error("Unknown template function `{0}`")]
    UnknownFunction(String),

    #[error("Template function `{name}` expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Template field `{field}` references itself (via {chain})")]
    Cycle { field: String, chain: String },
}

/// A name missing from the reference catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Metric {0} does not exist")]
    Metric(String),

    #[error("Data source {0} does not exist")]
    DataSource(String),

    #[error("Statistic {0} does not exist")]
    Statistic(String),

    #[error("Could not find pre-treatment {0}.")]
    PreTreatment(String),

    #[error("Segment {0} does not exist")]
    Segment(String),

    #[error("Segment data source {0} does not exist")]
    SegmentDataSource(String),
}

/// Failure to bind a spec to an experiment. Never accompanied by a partial
/// configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("Statistic {0} does not exist")]
    UnknownStatistic(String),

    #[error("Could not find pre-treatment {0}.")]
    UnknownPreTreatment(String),

    #[error("Metric {0} does not exist")]
    UnknownMetric(String),

    #[error("Data source {0} does not exist")]
    UnknownDataSource(String),

    #[error("Segment {0} does not exist")]
    UnknownSegment(String),

    #[error("Segment data source {0} does not exist")]
    UnknownSegmentDataSource(String),

    #[error("No statistics defined for metric {0}")]
    MissingStatistics(String),

    #[error("Metric {0} defines a select_expression but no data_source")]
    MissingDataSource(String),

    #[error("Enrollment period of {days} days exceeds the maximum of {max}")]
    EnrollmentPeriodTooLong { days: u32, max: u32 },

    #[error("Invalid parameters for {kind} {name}: {reason}")]
    InvalidParameter {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Could not render {field}: {source}")]
    Template {
        field: String,
        #[source]
        source: TemplateError,
    },
}

impl From<CatalogError> for ResolutionError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Metric(name) => ResolutionError::UnknownMetric(name),
            CatalogError::DataSource(name) => ResolutionError::UnknownDataSource(name),
            CatalogError::Statistic(name) => ResolutionError::UnknownStatistic(name),
            CatalogError::PreTreatment(name) => ResolutionError::UnknownPreTreatment(name),
            CatalogError::Segment(name) => ResolutionError::UnknownSegment(name),
            CatalogError::SegmentDataSource(name) => {
                ResolutionError::UnknownSegmentDataSource(name)
            }
        }
    }
}

/// The warehouse rejected a generated statement during a plan-only run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Dry run failed: {message}")]
pub struct DryRunFailedError {
    pub sql: String,
    pub message: String,
}

impl DryRunFailedError {
    pub fn new(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("Could not read table metadata for {dataset}: {message}")]
pub struct StalenessCheckError {
    pub dataset: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_errors_keep_offending_name() {
        let err: ResolutionError = CatalogError::Statistic("unknown_stat".to_string()).into();
        assert_eq!(err, ResolutionError::UnknownStatistic("unknown_stat".to_string()));
        assert_eq!(err.to_string(), "Statistic unknown_stat does not exist");

        let err: ResolutionError = CatalogError::PreTreatment("not_existing".to_string()).into();
        assert_eq!(err.to_string(), "Could not find pre-treatment not_existing.");
    }

    #[test]
    fn test_template_error_is_wrapped() {
        let err = ResolutionError::Template {
            field: "experiment.enrollment_query".to_string(),
            source: TemplateError::UnknownAttribute("experiment.nope".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("experiment.enrollment_query"));
        assert!(msg.contains("experiment.nope"));
    }
}
