//! Reference catalog: built-in metrics, data sources, segments, statistics
//! and pre-treatments, plus the per-platform default spec layers.

pub mod builtins;
pub mod catalog;
pub mod params;
pub mod platform;
pub mod pre_treatments;
pub mod statistics;
pub mod types;

pub use catalog::Catalog;
pub use params::Parameters;
pub use platform::{platform, platform_for_app, EnrollmentsQueryType, PlatformConfig, PLATFORMS};
pub use pre_treatments::{PreTreatment, PreTreatmentFactory};
pub use statistics::{Statistic, StatisticContext, StatisticFactory};
pub use types::{DataSource, ExperimentsColumnType, Metric, Segment, SegmentDataSource};
