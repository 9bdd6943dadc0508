//! Experiment configs and outcome snippets fetched from a config repository,
//! and the check for which of them are newer than their warehouse tables.

pub mod collection;
pub mod path;
pub mod repository;

pub use collection::{ExternalConfig, ExternalConfigCollection, ExternalOutcome, SkippedFile};
pub use path::{ConfigPath, OUTCOMES_DIR};
pub use repository::{
    ConfigFile, ConfigRepository, ExternalError, GitConfigRepository, LocalConfigRepository,
};
