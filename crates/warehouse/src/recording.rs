//! In-memory [`QueryBackend`] that records every statement. Failures can be
//! scripted by SQL substring.

use analysis_core::dates::from_unix_seconds;
use analysis_core::{DryRunFailedError, StalenessCheckError};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{
    check_table_name, QueryBackend, TableLabels, TableMetadata, WarehouseError, LAST_UPDATED_LABEL,
};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedQuery {
    DryRun(String),
    Execute {
        sql: String,
        destination: String,
        labels: TableLabels,
    },
}

#[derive(Default)]
pub struct RecordingBackend {
    queries: Mutex<Vec<RecordedQuery>>,
    tables: Mutex<Vec<(String, TableLabels)>>,
    failures: Mutex<Vec<(String, String)>>,
    metadata_error: Mutex<Option<String>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements containing `needle` fail with `message`.
    pub fn fail_when(&self, needle: impl Into<String>, message: impl Into<String>) {
        self.failures.lock().push((needle.into(), message.into()));
    }

    /// Make [`QueryBackend::table_labels`] fail.
    pub fn fail_metadata(&self, message: impl Into<String>) {
        *self.metadata_error.lock() = Some(message.into());
    }

    /// Seed an existing table, optionally with a `last_updated` label.
    pub fn add_table(&self, name: impl Into<String>, last_updated: Option<i64>) {
        let mut labels = TableLabels::new();
        if let Some(ts) = last_updated {
            labels.insert(LAST_UPDATED_LABEL.to_string(), ts.to_string());
        }
        self.tables.lock().push((name.into(), labels));
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().clone()
    }

    pub fn dry_runs(&self) -> Vec<String> {
        self.queries
            .lock()
            .iter()
            .filter_map(|q| match q {
                RecordedQuery::DryRun(sql) => Some(sql.clone()),
                RecordedQuery::Execute { .. } => None,
            })
            .collect()
    }

    pub fn written_tables(&self) -> Vec<String> {
        self.queries
            .lock()
            .iter()
            .filter_map(|q| match q {
                RecordedQuery::Execute { destination, .. } => Some(destination.clone()),
                RecordedQuery::DryRun(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.queries.lock().clear();
    }

    fn scripted_failure(&self, sql: &str) -> Option<String> {
        self.failures
            .lock()
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, message)| message.clone())
    }
}

#[async_trait]
impl QueryBackend for RecordingBackend {
    async fn dry_run(&self, sql: &str) -> Result<(), DryRunFailedError> {
        self.queries.lock().push(RecordedQuery::DryRun(sql.to_string()));
        match self.scripted_failure(sql) {
            Some(message) => Err(DryRunFailedError::new(sql, message)),
            None => Ok(()),
        }
    }

    async fn execute(
        &self,
        sql: &str,
        destination: &str,
        labels: &TableLabels,
    ) -> Result<(), WarehouseError> {
        check_table_name(destination)?;
        self.queries.lock().push(RecordedQuery::Execute {
            sql: sql.to_string(),
            destination: destination.to_string(),
            labels: labels.clone(),
        });
        if let Some(message) = self.scripted_failure(sql) {
            return Err(WarehouseError::Query(message));
        }

        let mut tables = self.tables.lock();
        tables.retain(|(name, _)| name != destination);
        tables.push((destination.to_string(), labels.clone()));
        Ok(())
    }

    async fn table_exists(&self, name: &str) -> Result<bool, WarehouseError> {
        Ok(self.tables.lock().iter().any(|(table, _)| table == name))
    }

    async fn table_labels(&self) -> Result<Vec<TableMetadata>, StalenessCheckError> {
        if let Some(message) = self.metadata_error.lock().clone() {
            return Err(StalenessCheckError {
                dataset: "recording".to_string(),
                message,
            });
        }
        Ok(self
            .tables
            .lock()
            .iter()
            .map(|(name, labels)| TableMetadata {
                table_name: name.clone(),
                last_updated: labels
                    .get(LAST_UPDATED_LABEL)
                    .and_then(|v| v.parse::<i64>().ok())
                    .and_then(from_unix_seconds),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_fails_on_demand() {
        let backend = RecordingBackend::new();
        backend.fail_when("broken_column", "Unknown identifier broken_column");

        assert!(backend.dry_run("SELECT 1").await.is_ok());
        let err = backend.dry_run("SELECT broken_column").await.unwrap_err();
        assert_eq!(err.sql, "SELECT broken_column");
        assert!(err.message.contains("Unknown identifier"));
        assert_eq!(backend.dry_runs().len(), 2);
    }

    #[tokio::test]
    async fn test_execute_tracks_tables() {
        let backend = RecordingBackend::new();
        let mut labels = TableLabels::new();
        labels.insert(LAST_UPDATED_LABEL.to_string(), "1600000000".to_string());

        backend.execute("SELECT 1", "my_exp_week_1", &labels).await.unwrap();
        backend.execute("SELECT 2", "my_exp_week_1", &labels).await.unwrap();

        assert!(backend.table_exists("my_exp_week_1").await.unwrap());
        let tables = backend.table_labels().await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].last_updated, from_unix_seconds(1_600_000_000));
        assert_eq!(backend.written_tables(), ["my_exp_week_1", "my_exp_week_1"]);

        assert!(backend.execute("SELECT 1", "bad name", &labels).await.is_err());
    }

    #[tokio::test]
    async fn test_metadata_failure() {
        let backend = RecordingBackend::new();
        backend.add_table("my_exp_enrollments", None);
        assert_eq!(backend.table_labels().await.unwrap()[0].last_updated, None);

        backend.fail_metadata("permission denied");
        assert!(backend.table_labels().await.is_err());
    }
}
