//! Analysis specs: parsing, layered merging and resolution against an
//! experiment into an [`AnalysisConfiguration`].
//!
//! Specs are plain data until [`AnalysisSpec::resolve`] binds them to an
//! experiment and a [`analysis_catalog::Catalog`]. Neither merging nor
//! resolution performs I/O.

pub mod configuration;
pub mod defaults;
pub mod merge;
pub mod resolve;
pub mod spec;

pub use configuration::{AnalysisConfiguration, ExperimentConfiguration, Summary};
pub use merge::merge;
pub use spec::{
    AnalysisSpec, DataSourceDefinition, DataSourcesSpec, ExperimentSpec, MetricDefinition,
    MetricsSpec, OutcomeSpec, PreTreatmentSpec, SegmentDataSourceDefinition, SegmentDefinition,
    SegmentsSpec, StatisticSpec,
};
