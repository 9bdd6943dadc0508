//! Dry-run validation of config files and outcome snippets.
//!
//! Experiment configs are validated against their experiment's metadata.
//! Outcomes are validated once per app id of their platform, against a
//! synthetic experiment. Nothing is written to the warehouse.

pub mod harness;
pub mod report;
pub mod validator;

pub use harness::{
    dry_run, dummy_experiment, format_sql_with_line_numbers, validate_experiment_config,
    validate_outcome, ValidationError,
};
pub use report::{ValidationReport, ValidationStatus};
pub use validator::Validator;
