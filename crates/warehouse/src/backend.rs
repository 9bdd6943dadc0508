//! The query interface analysis and validation depend on.

use std::collections::BTreeMap;

use analysis_core::{DryRunFailedError, StalenessCheckError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Label carrying the unix timestamp a table was last written at.
pub const LAST_UPDATED_LABEL: &str = "last_updated";

pub type TableLabels = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Query timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid table name `{0}`")]
    InvalidTableName(String),
}

/// A materialized table and its `last_updated` label, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub table_name: String,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Warehouse operations used by analysis runs, dry-run validation and
/// staleness checks. Implementations must tolerate concurrent calls.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Plan the statement without reading or writing data.
    async fn dry_run(&self, sql: &str) -> Result<(), DryRunFailedError>;

    /// Run `sql` and replace `destination` with its result, tagging the table
    /// with `labels`.
    async fn execute(
        &self,
        sql: &str,
        destination: &str,
        labels: &TableLabels,
    ) -> Result<(), WarehouseError>;

    async fn table_exists(&self, name: &str) -> Result<bool, WarehouseError>;

    /// Every table of the analysis dataset with its labels.
    async fn table_labels(&self) -> Result<Vec<TableMetadata>, StalenessCheckError>;
}

/// Encode labels as a table comment, `key=value` pairs joined by commas.
pub fn encode_labels(labels: &TableLabels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_labels(comment: &str) -> TableLabels {
    comment
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Table names are interpolated into DDL; only identifier characters pass.
pub fn check_table_name(name: &str) -> Result<(), WarehouseError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(WarehouseError::InvalidTableName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_encoding() {
        let mut labels = TableLabels::new();
        labels.insert(LAST_UPDATED_LABEL.to_string(), "1600000000".to_string());
        labels.insert("slug".to_string(), "my_exp".to_string());
        let comment = encode_labels(&labels);
        assert_eq!(comment, "last_updated=1600000000,slug=my_exp");
        assert_eq!(decode_labels(&comment), labels);
        assert!(decode_labels("").is_empty());
        assert!(decode_labels("free text").is_empty());
    }

    #[test]
    fn test_table_names() {
        assert!(check_table_name("my_exp_week_1").is_ok());
        assert!(check_table_name("db.my_exp").is_ok());
        assert!(check_table_name("x; DROP TABLE y").is_err());
        assert!(check_table_name("").is_err());
    }
}
