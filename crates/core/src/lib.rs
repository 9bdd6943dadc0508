pub mod config;
pub mod dates;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{
    CatalogError, DryRunFailedError, ParseError, ResolutionError, StalenessCheckError,
    TemplateError,
};
pub use types::{
    AnalysisPeriod, Experiment, ExperimentStatus, Variant, MAX_ENROLLMENT_PERIOD_DAYS,
};
