//! ClickHouse implementation of [`QueryBackend`].
//!
//! Dry runs use `EXPLAIN PLAN`. Table labels live in the table comment as
//! `key=value` pairs.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use analysis_core::config::WarehouseConfig;
use analysis_core::dates::from_unix_seconds;
use analysis_core::{DryRunFailedError, StalenessCheckError};
use async_trait::async_trait;
use clickhouse::{Client, Row};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backend::{
    check_table_name, encode_labels, QueryBackend, TableLabels, TableMetadata, WarehouseError,
};

pub struct ClickHouseBackend {
    client: Client,
    database: String,
    dry_run_timeout: Duration,
    query_timeout: Duration,
}

#[derive(Debug, Row, Deserialize)]
struct TableCommentRow {
    name: String,
    comment: String,
}

#[derive(Debug, Row, Deserialize)]
struct CountRow {
    count: u64,
}

fn last_updated_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|,)\s*last_updated=(\d+)").expect("last_updated pattern is valid")
    })
}

/// `?` is the client's bind placeholder; generated SQL must not bind.
fn escape_placeholders(sql: &str) -> String {
    sql.replace('?', "??")
}

impl ClickHouseBackend {
    pub fn new(config: &WarehouseConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);
        if let Some(user) = &config.user {
            client = client.with_user(user);
        }
        if let Some(password) = &config.password {
            client = client.with_password(password);
        }

        info!(url = %config.url, database = %config.database, "ClickHouse backend initialized");
        Self {
            client,
            database: config.database.clone(),
            dry_run_timeout: Duration::from_secs(config.dry_run_timeout_secs),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        }
    }

    async fn with_timeout<T>(
        &self,
        limit: Duration,
        fut: impl Future<Output = Result<T, clickhouse::error::Error>>,
    ) -> Result<T, WarehouseError> {
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(|e| WarehouseError::Query(e.to_string())),
            Err(_) => Err(WarehouseError::Timeout(limit.as_secs())),
        }
    }
}

#[async_trait]
impl QueryBackend for ClickHouseBackend {
    async fn dry_run(&self, sql: &str) -> Result<(), DryRunFailedError> {
        let explain = format!("EXPLAIN PLAN {}", escape_placeholders(sql));
        let result = self
            .with_timeout(self.dry_run_timeout, self.client.query(&explain).execute())
            .await;
        match result {
            Ok(()) => {
                debug!(bytes = sql.len(), "Dry run succeeded");
                Ok(())
            }
            Err(e) => Err(DryRunFailedError::new(sql, e.to_string())),
        }
    }

    async fn execute(
        &self,
        sql: &str,
        destination: &str,
        labels: &TableLabels,
    ) -> Result<(), WarehouseError> {
        check_table_name(destination)?;
        let create = format!(
            "CREATE OR REPLACE TABLE {destination} ENGINE = MergeTree ORDER BY tuple() AS {}",
            escape_placeholders(sql)
        );
        self.with_timeout(self.query_timeout, self.client.query(&create).execute())
            .await?;

        let comment = encode_labels(labels).replace('\'', "");
        let alter = format!("ALTER TABLE {destination} MODIFY COMMENT '{comment}'");
        self.with_timeout(self.query_timeout, self.client.query(&alter).execute())
            .await?;

        metrics::counter!("warehouse.tables_written").increment(1);
        info!(table = %destination, "Table written");
        Ok(())
    }

    async fn table_exists(&self, name: &str) -> Result<bool, WarehouseError> {
        let rows = self
            .with_timeout(
                self.query_timeout,
                self.client
                    .query("SELECT count() AS count FROM system.tables WHERE database = ? AND name = ?")
                    .bind(&self.database)
                    .bind(name)
                    .fetch_all::<CountRow>(),
            )
            .await?;
        Ok(rows.first().is_some_and(|r| r.count > 0))
    }

    async fn table_labels(&self) -> Result<Vec<TableMetadata>, StalenessCheckError> {
        let rows = self
            .with_timeout(
                self.query_timeout,
                self.client
                    .query("SELECT name, comment FROM system.tables WHERE database = ?")
                    .bind(&self.database)
                    .fetch_all::<TableCommentRow>(),
            )
            .await
            .map_err(|e| StalenessCheckError {
                dataset: self.database.clone(),
                message: e.to_string(),
            })?;

        let pattern = last_updated_pattern();
        Ok(rows
            .into_iter()
            .map(|row| {
                let last_updated = pattern
                    .captures(&row.comment)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<i64>().ok())
                    .and_then(from_unix_seconds);
                if last_updated.is_none() && !row.comment.is_empty() {
                    warn!(table = %row.name, "Table comment has no last_updated label");
                }
                TableMetadata {
                    table_name: row.name,
                    last_updated,
                }
            })
            .collect())
    }
}
