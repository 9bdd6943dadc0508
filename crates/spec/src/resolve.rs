//! Binding a merged spec to one experiment and a catalog.

use std::collections::{BTreeMap, HashMap, HashSet};

use analysis_catalog::{Catalog, DataSource, Metric, Segment, StatisticContext};
use analysis_core::{
    AnalysisPeriod, Experiment, ExperimentStatus, ResolutionError, MAX_ENROLLMENT_PERIOD_DAYS,
};
use analysis_templating::{ContextValue, ExperimentContext, TemplateRenderer};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::configuration::{AnalysisConfiguration, ExperimentConfiguration, Summary};
use crate::spec::{AnalysisSpec, MetricDefinition, StatisticSpec};

const ENROLLMENT_QUERY_FIELD: &str = "experiment.enrollment_query";

impl AnalysisSpec {
    pub fn resolve(
        &self,
        experiment: &Experiment,
        catalog: &Catalog,
    ) -> Result<AnalysisConfiguration, ResolutionError> {
        self.resolve_at(experiment, catalog, Utc::now())
    }

    /// Resolve with an explicit clock, which decides whether a spec end date
    /// has already passed.
    pub fn resolve_at(
        &self,
        experiment: &Experiment,
        catalog: &Catalog,
        now: DateTime<Utc>,
    ) -> Result<AnalysisConfiguration, ResolutionError> {
        let resolver = Resolver::new(self, experiment, catalog);
        let experiment_config = resolver.resolve_experiment(now)?;
        let metrics = resolver.resolve_metrics(experiment_config.reference_branch.as_deref())?;

        debug!(
            slug = %experiment.experimenter_slug,
            periods = metrics.len(),
            summaries = metrics.values().map(Vec::len).sum::<usize>(),
            "Resolved analysis configuration"
        );
        Ok(AnalysisConfiguration {
            experiment: experiment_config,
            metrics,
        })
    }
}

struct Resolver<'a> {
    spec: &'a AnalysisSpec,
    experiment: &'a Experiment,
    catalog: &'a Catalog,
    context: ExperimentContext,
    renderer: TemplateRenderer,
}

impl<'a> Resolver<'a> {
    fn new(spec: &'a AnalysisSpec, experiment: &'a Experiment, catalog: &'a Catalog) -> Self {
        let overrides = &spec.experiment;
        let mut context = ExperimentContext::from_experiment(experiment);
        if let Some(branch) = &overrides.reference_branch {
            context.set("experiment.reference_branch", ContextValue::text(branch));
        }
        if let Some(date) = overrides.start_date {
            context.set("experiment.start_date", ContextValue::Date(date));
        }
        if let Some(date) = overrides.end_date {
            context.set("experiment.end_date", ContextValue::Date(date));
        }
        if let Some(days) = overrides.enrollment_period {
            context.set("experiment.enrollment_period", ContextValue::Integer(days.into()));
        }
        if let Some(query) = &overrides.enrollment_query {
            context.set(ENROLLMENT_QUERY_FIELD, ContextValue::Template(query.clone()));
        }

        Self {
            spec,
            experiment,
            catalog,
            context,
            renderer: TemplateRenderer::new(),
        }
    }

    fn render(&self, field: &str, template: &str) -> Result<String, ResolutionError> {
        self.renderer
            .render_field(field, template, &self.context)
            .map_err(|source| ResolutionError::Template {
                field: field.to_string(),
                source,
            })
    }

    fn resolve_experiment(&self, now: DateTime<Utc>) -> Result<ExperimentConfiguration, ResolutionError> {
        let overrides = &self.spec.experiment;
        let experiment = self.experiment;

        let enrollment_query = overrides
            .enrollment_query
            .as_deref()
            .map(|query| self.render(ENROLLMENT_QUERY_FIELD, query))
            .transpose()?;

        let reference_branch = match &overrides.reference_branch {
            Some(branch) => {
                if !experiment.variants.is_empty() && !experiment.has_variant(branch) {
                    warn!(
                        slug = %experiment.experimenter_slug,
                        reference_branch = %branch,
                        "Reference branch is not a variant of the experiment"
                    );
                }
                Some(branch.clone())
            }
            None => experiment
                .control_variant()
                .map(|v| v.slug.clone())
                .or_else(|| experiment.reference_branch.clone()),
        };

        let segments = overrides
            .segments
            .iter()
            .map(|name| self.resolve_segment(name))
            .collect::<Result<Vec<_>, _>>()?;

        let enrollment_period = overrides.enrollment_period.or(experiment.proposed_enrollment);
        if let Some(days) = enrollment_period.filter(|d| *d > MAX_ENROLLMENT_PERIOD_DAYS) {
            return Err(ResolutionError::EnrollmentPeriodTooLong {
                days,
                max: MAX_ENROLLMENT_PERIOD_DAYS,
            });
        }

        let mut status = experiment.status;
        if let Some(end_date) = overrides.end_date {
            if end_date < now {
                status = ExperimentStatus::Complete;
            }
        }

        Ok(ExperimentConfiguration {
            experimenter_slug: experiment.experimenter_slug.clone(),
            normandy_slug: experiment.normandy_slug.clone(),
            experiment_type: experiment.experiment_type.clone(),
            status,
            start_date: overrides.start_date.or(experiment.start_date),
            end_date: overrides.end_date.or(experiment.end_date),
            enrollment_period,
            reference_branch,
            branches: experiment.variants.iter().map(|v| v.slug.clone()).collect(),
            segments,
            enrollment_query,
            app_id: experiment.app_id.clone(),
            app_name: experiment.app_name.clone(),
            is_high_population: experiment.is_high_population,
            skip: overrides.skip.unwrap_or(false),
        })
    }

    fn resolve_segment(&self, name: &str) -> Result<Segment, ResolutionError> {
        let Some(definition) = self.spec.segments.definitions.get(name) else {
            return Ok(self.catalog.lookup_segment(name)?.clone());
        };

        let data_source = match self.spec.segments.data_sources.get(&definition.data_source) {
            Some(inline) => inline.to_segment_data_source(),
            None => self
                .catalog
                .lookup_segment_data_source(&definition.data_source)?
                .clone(),
        };
        let select_expr = self.render(
            &format!("segments.{name}.select_expression"),
            &definition.select_expression,
        )?;

        let mut segment = Segment::new(name, data_source, select_expr);
        segment.friendly_name = definition.friendly_name.clone();
        segment.description = definition.description.clone();
        Ok(segment)
    }

    fn resolve_data_source(&self, name: &str) -> Result<DataSource, ResolutionError> {
        match self.spec.data_sources.definitions.get(name) {
            Some(inline) => Ok(inline.to_data_source()),
            None => Ok(self.catalog.lookup_data_source(name)?.clone()),
        }
    }

    fn resolve_metric(&self, name: &str) -> Result<(Metric, &'a [StatisticSpec]), ResolutionError> {
        let Some(definition) = self.spec.metrics.definitions.get(name) else {
            // Referenced by name only: exists in the catalog but has no
            // statistics to compute.
            self.catalog.lookup_metric(name)?;
            return Err(ResolutionError::MissingStatistics(name.to_string()));
        };

        let metric = match &definition.select_expression {
            Some(select) => self.inline_metric(definition, select)?,
            None => {
                let mut metric = self.catalog.lookup_metric(name)?.clone();
                if let Some(source) = &definition.data_source {
                    metric.data_source = self.resolve_data_source(source)?;
                }
                if definition.friendly_name.is_some() {
                    metric.friendly_name.clone_from(&definition.friendly_name);
                }
                if definition.description.is_some() {
                    metric.description.clone_from(&definition.description);
                }
                metric
            }
        };

        if definition.statistics.is_empty() {
            return Err(ResolutionError::MissingStatistics(name.to_string()));
        }
        Ok((metric, &definition.statistics))
    }

    fn inline_metric(
        &self,
        definition: &MetricDefinition,
        select: &str,
    ) -> Result<Metric, ResolutionError> {
        let name = &definition.name;
        let source = definition
            .data_source
            .as_deref()
            .ok_or_else(|| ResolutionError::MissingDataSource(name.clone()))?;
        let data_source = self.resolve_data_source(source)?;
        let select_expr = self.render(&format!("metrics.{name}.select_expression"), select)?;

        let mut metric = Metric::new(name, data_source, select_expr);
        metric.friendly_name.clone_from(&definition.friendly_name);
        metric.description.clone_from(&definition.description);
        Ok(metric)
    }

    fn summaries(
        &self,
        metric: &Metric,
        statistics: &[StatisticSpec],
        reference_branch: Option<&str>,
    ) -> Result<Vec<Summary>, ResolutionError> {
        let stat_context = StatisticContext { reference_branch };
        statistics
            .iter()
            .map(|block| -> Result<Summary, ResolutionError> {
                let factory = self.catalog.lookup_statistic(&block.name)?;
                let statistic = factory(&block.name, &block.parameters, &stat_context)?;
                let pre_treatments = block
                    .pre_treatments
                    .iter()
                    .map(|pt| {
                        let factory = self.catalog.lookup_pre_treatment(&pt.name)?;
                        factory(&pt.name, &pt.parameters)
                    })
                    .collect::<Result<Vec<_>, ResolutionError>>()?;
                Ok(Summary {
                    metric: metric.clone(),
                    statistic,
                    pre_treatments,
                })
            })
            .collect()
    }

    fn resolve_metrics(
        &self,
        reference_branch: Option<&str>,
    ) -> Result<BTreeMap<AnalysisPeriod, Vec<Summary>>, ResolutionError> {
        let mut resolved: HashMap<&str, Vec<Summary>> = HashMap::new();
        let mut by_period = BTreeMap::new();

        for period in AnalysisPeriod::ALL {
            let names = self.spec.metrics.names_for(period);
            if names.is_empty() {
                continue;
            }

            let mut seen = HashSet::new();
            let mut summaries = Vec::new();
            for name in names {
                if !resolved.contains_key(name.as_str()) {
                    let (metric, statistics) = self.resolve_metric(name)?;
                    let built = self.summaries(&metric, statistics, reference_branch)?;
                    resolved.insert(name.as_str(), built);
                }
                for summary in resolved.get(name.as_str()).into_iter().flatten() {
                    let key = (summary.metric.name.clone(), summary.statistic.name());
                    if seen.insert(key) {
                        summaries.push(summary.clone());
                    }
                }
            }
            by_period.insert(period, summaries);
        }
        Ok(by_period)
    }
}
