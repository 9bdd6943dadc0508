use serde::{Deserialize, Serialize};
use std::fmt;

/// How a data source records experiment enrollment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentsColumnType {
    /// `experiments` is a map from slug to branch.
    #[default]
    Simple,
    /// Glean-style `ping_info.experiments` map of structs.
    Native,
    /// No enrollment column; rows are joined on client id only.
    None,
}

impl fmt::Display for ExperimentsColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentsColumnType::Simple => write!(f, "simple"),
            ExperimentsColumnType::Native => write!(f, "native"),
            ExperimentsColumnType::None => write!(f, "none"),
        }
    }
}

/// A SQL table or subquery metrics are computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSource {
    pub name: String,
    pub from_expr: String,
    pub client_id_column: String,
    pub submission_date_column: String,
    pub experiments_column_type: ExperimentsColumnType,
}

impl DataSource {
    pub fn new(name: impl Into<String>, from_expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from_expr: from_expr.into(),
            client_id_column: "client_id".to_string(),
            submission_date_column: "submission_date".to_string(),
            experiments_column_type: ExperimentsColumnType::Simple,
        }
    }

    pub fn with_client_id_column(mut self, column: impl Into<String>) -> Self {
        self.client_id_column = column.into();
        self
    }

    pub fn with_submission_date_column(mut self, column: impl Into<String>) -> Self {
        self.submission_date_column = column.into();
        self
    }

    pub fn with_experiments_column_type(mut self, kind: ExperimentsColumnType) -> Self {
        self.experiments_column_type = kind;
        self
    }
}

/// A per-client aggregate over one data source. Identity is by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    pub name: String,
    pub data_source: DataSource,
    pub select_expr: String,
    pub friendly_name: Option<String>,
    pub description: Option<String>,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        data_source: DataSource,
        select_expr: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_source,
            select_expr: select_expr.into(),
            friendly_name: None,
            description: None,
        }
    }

    pub fn with_friendly_name(mut self, friendly_name: impl Into<String>) -> Self {
        self.friendly_name = Some(friendly_name.into());
        self
    }
}

/// Data source for segment membership, evaluated in a window relative to
/// enrollment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentDataSource {
    pub name: String,
    pub from_expr: String,
    pub window_start: i32,
    pub window_end: i32,
    pub client_id_column: String,
    pub submission_date_column: String,
}

impl SegmentDataSource {
    pub fn new(name: impl Into<String>, from_expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from_expr: from_expr.into(),
            window_start: 0,
            window_end: 0,
            client_id_column: "client_id".to_string(),
            submission_date_column: "submission_date".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub name: String,
    pub data_source: SegmentDataSource,
    pub select_expr: String,
    pub friendly_name: Option<String>,
    pub description: Option<String>,
}

impl Segment {
    pub fn new(
        name: impl Into<String>,
        data_source: SegmentDataSource,
        select_expr: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_source,
            select_expr: select_expr.into(),
            friendly_name: None,
            description: None,
        }
    }
}
