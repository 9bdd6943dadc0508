//! Name-keyed registry of everything a spec may reference without defining it.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use analysis_core::CatalogError;
use tracing::debug;

use crate::builtins;
use crate::pre_treatments::{builtin_pre_treatments, PreTreatmentFactory};
use crate::statistics::{builtin_statistics, StatisticFactory};
use crate::types::{DataSource, Metric, Segment, SegmentDataSource};

pub struct Catalog {
    metrics: HashMap<String, Metric>,
    data_sources: HashMap<String, DataSource>,
    segments: HashMap<String, Segment>,
    segment_data_sources: HashMap<String, SegmentDataSource>,
    statistics: HashMap<String, StatisticFactory>,
    pre_treatments: HashMap<String, PreTreatmentFactory>,
}

impl Catalog {
    /// A catalog with nothing registered.
    pub fn empty() -> Self {
        Self {
            metrics: HashMap::new(),
            data_sources: HashMap::new(),
            segments: HashMap::new(),
            segment_data_sources: HashMap::new(),
            statistics: HashMap::new(),
            pre_treatments: HashMap::new(),
        }
    }

    /// Built-in desktop and mobile definitions plus every statistic and
    /// pre-treatment kind.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();

        let data_sources = builtins::data_sources();
        for metric in builtins::metrics(&data_sources) {
            catalog.register_metric(metric);
        }
        for source in data_sources {
            catalog.register_data_source(source);
        }

        let segment_sources = builtins::segment_data_sources();
        for segment in builtins::segments(&segment_sources) {
            catalog.register_segment(segment);
        }
        for source in segment_sources {
            catalog.register_segment_data_source(source);
        }

        for (name, factory) in builtin_statistics() {
            catalog.register_statistic(name, factory);
        }
        for (name, factory) in builtin_pre_treatments() {
            catalog.register_pre_treatment(name, factory);
        }

        debug!(
            metrics = catalog.metrics.len(),
            data_sources = catalog.data_sources.len(),
            segments = catalog.segments.len(),
            "Built-in catalog loaded"
        );
        catalog
    }

    /// Process-wide built-in catalog, initialised on first use.
    pub fn shared() -> &'static Catalog {
        static SHARED: OnceLock<Catalog> = OnceLock::new();
        SHARED.get_or_init(Catalog::builtin)
    }

    pub fn register_metric(&mut self, metric: Metric) {
        self.metrics.insert(metric.name.clone(), metric);
    }

    pub fn register_data_source(&mut self, data_source: DataSource) {
        self.data_sources.insert(data_source.name.clone(), data_source);
    }

    pub fn register_segment(&mut self, segment: Segment) {
        self.segments.insert(segment.name.clone(), segment);
    }

    pub fn register_segment_data_source(&mut self, data_source: SegmentDataSource) {
        self.segment_data_sources
            .insert(data_source.name.clone(), data_source);
    }

    pub fn register_statistic(&mut self, name: impl Into<String>, factory: StatisticFactory) {
        self.statistics.insert(name.into(), factory);
    }

    pub fn register_pre_treatment(
        &mut self,
        name: impl Into<String>,
        factory: PreTreatmentFactory,
    ) {
        self.pre_treatments.insert(name.into(), factory);
    }

    pub fn lookup_metric(&self, name: &str) -> Result<&Metric, CatalogError> {
        self.metrics
            .get(name)
            .ok_or_else(|| CatalogError::Metric(name.to_string()))
    }

    pub fn lookup_data_source(&self, name: &str) -> Result<&DataSource, CatalogError> {
        self.data_sources
            .get(name)
            .ok_or_else(|| CatalogError::DataSource(name.to_string()))
    }

    pub fn lookup_segment(&self, name: &str) -> Result<&Segment, CatalogError> {
        self.segments
            .get(name)
            .ok_or_else(|| CatalogError::Segment(name.to_string()))
    }

    pub fn lookup_segment_data_source(
        &self,
        name: &str,
    ) -> Result<&SegmentDataSource, CatalogError> {
        self.segment_data_sources
            .get(name)
            .ok_or_else(|| CatalogError::SegmentDataSource(name.to_string()))
    }

    pub fn lookup_statistic(&self, name: &str) -> Result<&StatisticFactory, CatalogError> {
        self.statistics
            .get(name)
            .ok_or_else(|| CatalogError::Statistic(name.to_string()))
    }

    pub fn lookup_pre_treatment(&self, name: &str) -> Result<&PreTreatmentFactory, CatalogError> {
        self.pre_treatments
            .get(name)
            .ok_or_else(|| CatalogError::PreTreatment(name.to_string()))
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("metrics", &self.metrics.len())
            .field("data_sources", &self.data_sources.len())
            .field("segments", &self.segments.len())
            .field("segment_data_sources", &self.segment_data_sources.len())
            .field("statistics", &self.statistics.len())
            .field("pre_treatments", &self.pre_treatments.len())
            .finish()
    }
}
