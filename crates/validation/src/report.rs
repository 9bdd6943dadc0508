use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::harness::{format_sql_with_line_numbers, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

/// Outcome of validating one file.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub status: ValidationStatus,
    pub message: Option<String>,
    /// Line-numbered SQL of the statement the warehouse rejected.
    pub sql: Option<String>,
}

impl ValidationReport {
    pub fn passed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            status: ValidationStatus::Passed,
            message: None,
            sql: None,
        }
    }

    pub fn failed(path: impl Into<PathBuf>, error: &ValidationError) -> Self {
        let sql = match error {
            ValidationError::DryRun(e) => Some(format_sql_with_line_numbers(&e.sql)),
            _ => None,
        };
        Self {
            path: path.into(),
            status: ValidationStatus::Failed,
            message: Some(error.to_string()),
            sql,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Passed
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return write!(f, "{} is valid.", self.path.display());
        }
        writeln!(f, "{} is invalid.", self.path.display())?;
        if let Some(sql) = &self.sql {
            writeln!(f, "Error evaluating SQL:")?;
            writeln!(f, "{sql}")?;
            writeln!(f)?;
        }
        write!(f, "{}", self.message.as_deref().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::DryRunFailedError;

    #[test]
    fn test_failed_dry_run_report() {
        let error = ValidationError::DryRun(DryRunFailedError::new(
            "SELECT\n  broken",
            "Unknown identifier broken",
        ));
        let report = ValidationReport::failed("my-exp.toml", &error);
        assert!(!report.is_valid());
        assert_eq!(report.sql.as_deref(), Some("   1 SELECT\n   2   broken"));

        let rendered = report.to_string();
        assert!(rendered.starts_with("my-exp.toml is invalid.\nError evaluating SQL:\n   1 SELECT"));
        assert!(rendered.ends_with("Dry run failed: Unknown identifier broken"));
    }

    #[test]
    fn test_passed_report() {
        let report = ValidationReport::passed("my-exp.toml");
        assert_eq!(report.to_string(), "my-exp.toml is valid.");
    }
}
