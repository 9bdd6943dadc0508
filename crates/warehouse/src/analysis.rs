//! The SQL plan for one resolved configuration, and its dry-run and real
//! execution against a [`QueryBackend`].

use analysis_catalog::EnrollmentsQueryType;
use analysis_core::dates::start_of_day;
use analysis_core::{AnalysisPeriod, DryRunFailedError, MAX_ENROLLMENT_PERIOD_DAYS};
use analysis_spec::AnalysisConfiguration;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::backend::{QueryBackend, TableLabels, WarehouseError, LAST_UPDATED_LABEL};
use crate::sql::{self, QueryParams, WindowBounds};

/// Enrollment period assumed when neither spec nor experiment sets one.
pub const DEFAULT_ENROLLMENT_PERIOD_DAYS: u32 = 7;

/// One window of an analysis period, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub period: AnalysisPeriod,
    pub index: u32,
    pub bounds: WindowBounds,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuery {
    pub destination: String,
    pub sql: String,
}

pub struct Analysis<'a> {
    config: &'a AnalysisConfiguration,
}

impl<'a> Analysis<'a> {
    pub fn new(config: &'a AnalysisConfiguration) -> Self {
        Self { config }
    }

    fn enrollment_period(&self) -> u32 {
        self.config
            .experiment
            .enrollment_period
            .unwrap_or(DEFAULT_ENROLLMENT_PERIOD_DAYS)
            .clamp(1, MAX_ENROLLMENT_PERIOD_DAYS)
    }

    /// First and last enrollment dates. Experiments without a start date are
    /// planned as if starting at `fallback`.
    fn enrollment_dates(&self, fallback: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = start_of_day(&self.config.experiment.start_date.unwrap_or(fallback));
        let end = start
            .checked_add_signed(Duration::days(i64::from(self.enrollment_period()) - 1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (start, end)
    }

    fn enrollments_query_type(&self) -> EnrollmentsQueryType {
        self.config
            .experiment
            .platform()
            .map_or(EnrollmentsQueryType::Normandy, |p| p.enrollments_query_type)
    }

    /// The custom enrollment query if configured, else the platform's.
    pub fn enrollments_query(&self, fallback_start: DateTime<Utc>) -> String {
        let experiment = &self.config.experiment;
        let base = match &experiment.enrollment_query {
            Some(query) => query.clone(),
            None => {
                let (enrollment_start, enrollment_end) = self.enrollment_dates(fallback_start);
                let params = QueryParams {
                    enrollment_slug: experiment.enrollment_slug(),
                    app_id: &experiment.app_id,
                    enrollment_start,
                    enrollment_end,
                };
                sql::enrollments_query(self.enrollments_query_type(), &params)
            }
        };
        sql::enrollments_with_segments(&base, &experiment.segments)
    }

    pub fn metrics_query(&self, window: &AnalysisWindow, fallback_start: DateTime<Utc>) -> String {
        let metrics = self.config.metrics_for(window.period);
        sql::metrics_query(
            &self.enrollments_query(fallback_start),
            &metrics,
            window.bounds,
            self.config.experiment.enrollment_slug(),
        )
    }

    /// Bounds of window `index` of a fixed-length period.
    pub fn window(period: AnalysisPeriod, index: u32) -> Option<AnalysisWindow> {
        let days = i64::from(period.window_days()?);
        let index64 = i64::from(index.max(1));
        Some(AnalysisWindow {
            period,
            index: index.max(1),
            bounds: WindowBounds {
                start: (index64 - 1) * days,
                end: index64 * days - 1,
            },
        })
    }

    /// The overall window spans from enrollment to the end of the
    /// experiment as seen by the last enrolled client.
    fn overall_window(&self, end_date: DateTime<Utc>, fallback: DateTime<Utc>) -> Option<AnalysisWindow> {
        let (_, last_enrollment) = self.enrollment_dates(fallback);
        let days = (start_of_day(&end_date) - last_enrollment).num_days();
        (days > 0).then_some(AnalysisWindow {
            period: AnalysisPeriod::Overall,
            index: 1,
            bounds: WindowBounds {
                start: 0,
                end: days - 1,
            },
        })
    }

    /// Windows whose last day of data is complete as of `current_date`.
    pub fn windows_due(&self, period: AnalysisPeriod, current_date: DateTime<Utc>) -> Vec<AnalysisWindow> {
        let Some(start) = self.config.experiment.start_date else {
            return Vec::new();
        };
        let current = start_of_day(&current_date);
        let (_, last_enrollment) = self.enrollment_dates(start);

        match period.window_days() {
            Some(days) => {
                let observed = (current - last_enrollment).num_days();
                let days = i64::from(days);
                if observed < days || observed % days != 0 {
                    return Vec::new();
                }
                u32::try_from(observed / days)
                    .ok()
                    .and_then(|index| Self::window(period, index))
                    .into_iter()
                    .collect()
            }
            None => match self.config.experiment.end_date {
                Some(end) if start_of_day(&end) <= current => {
                    self.overall_window(end, start).into_iter().collect()
                }
                _ => Vec::new(),
            },
        }
    }

    pub fn table_name(&self, window: &AnalysisWindow) -> String {
        format!(
            "{}_{}_{}",
            self.config.experiment.table_prefix(),
            window.period.table_suffix(),
            window.index
        )
    }

    pub fn enrollments_table(&self) -> String {
        format!("{}_enrollments", self.config.experiment.table_prefix())
    }

    /// Statements a run on `current_date` would write.
    pub fn plan(&self, current_date: DateTime<Utc>) -> Vec<PlannedQuery> {
        let experiment = &self.config.experiment;
        let Some(start) = experiment.start_date else {
            return Vec::new();
        };
        let (_, last_enrollment) = self.enrollment_dates(start);
        if start_of_day(&current_date) <= last_enrollment {
            return Vec::new();
        }

        let mut plan = vec![PlannedQuery {
            destination: self.enrollments_table(),
            sql: self.enrollments_query(start),
        }];
        for period in self.config.periods() {
            for window in self.windows_due(period, current_date) {
                plan.push(PlannedQuery {
                    destination: self.table_name(&window),
                    sql: self.metrics_query(&window, start),
                });
            }
        }
        plan
    }

    /// Dry-run the enrollments query and the first window of every period.
    /// Stops at the first statement the warehouse rejects.
    pub async fn validate(&self, backend: &dyn QueryBackend) -> Result<(), DryRunFailedError> {
        let fallback = self.config.experiment.start_date.unwrap_or_else(Utc::now);
        backend.dry_run(&self.enrollments_query(fallback)).await?;

        for period in self.config.periods() {
            let window = match Self::window(period, 1) {
                Some(window) => window,
                None => AnalysisWindow {
                    period,
                    index: 1,
                    bounds: WindowBounds {
                        start: 0,
                        end: i64::from(self.enrollment_period()) - 1,
                    },
                },
            };
            debug!(period = %period, "Dry-running metrics query");
            backend.dry_run(&self.metrics_query(&window, fallback)).await?;
        }
        Ok(())
    }

    /// Materialize every table due on `current_date`. Returns the tables
    /// written.
    pub async fn run(
        &self,
        backend: &dyn QueryBackend,
        current_date: DateTime<Utc>,
    ) -> Result<Vec<String>, WarehouseError> {
        let experiment = &self.config.experiment;
        if experiment.skip {
            info!(slug = %experiment.experimenter_slug, "Experiment configured to be skipped");
            return Ok(Vec::new());
        }
        if experiment.start_date.is_none() {
            warn!(slug = %experiment.experimenter_slug, "Experiment has no start date");
            return Ok(Vec::new());
        }

        let mut labels = TableLabels::new();
        labels.insert(
            LAST_UPDATED_LABEL.to_string(),
            Utc::now().timestamp().to_string(),
        );

        let mut written = Vec::new();
        for query in self.plan(current_date) {
            backend.execute(&query.sql, &query.destination, &labels).await?;
            written.push(query.destination);
        }
        info!(
            slug = %experiment.experimenter_slug,
            tables = written.len(),
            "Analysis run finished"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingBackend;
    use analysis_catalog::Catalog;
    use analysis_core::{Experiment, ExperimentStatus, Variant};
    use analysis_spec::AnalysisSpec;
    use chrono::TimeZone;
    use regex::Regex;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn experiment() -> Experiment {
        Experiment {
            experimenter_slug: "test-experiment".into(),
            normandy_slug: Some("test-experiment".into()),
            experiment_type: "rollout".into(),
            status: ExperimentStatus::Live,
            start_date: Some(date(2020, 3, 30)),
            end_date: Some(date(2020, 6, 1)),
            proposed_enrollment: Some(7),
            variants: vec![
                Variant {
                    slug: "branch1".into(),
                    ratio: 0.5,
                    is_control: false,
                },
                Variant {
                    slug: "branch2".into(),
                    ratio: 0.5,
                    is_control: true,
                },
            ],
            reference_branch: None,
            is_high_population: false,
            app_id: "firefox-desktop".into(),
            app_name: "firefox_desktop".into(),
            outcomes: vec![],
        }
    }

    fn config(text: &str) -> AnalysisConfiguration {
        AnalysisSpec::from_toml_str(text)
            .unwrap()
            .resolve_at(&experiment(), &Catalog::builtin(), date(2020, 4, 12))
            .unwrap()
    }

    const WEEKLY_ACTIVE_HOURS: &str = r#"
        [metrics]
        weekly = ["active_hours"]
        overall = ["active_hours"]
        [metrics.active_hours.statistics.bootstrap_mean]
    "#;

    #[test]
    fn test_windows() {
        let week2 = Analysis::window(AnalysisPeriod::Week, 2).unwrap();
        assert_eq!(week2.bounds, WindowBounds { start: 7, end: 13 });
        assert!(Analysis::window(AnalysisPeriod::Overall, 1).is_none());
    }

    #[test]
    fn test_windows_due() {
        let config = config(WEEKLY_ACTIVE_HOURS);
        let analysis = Analysis::new(&config);
        // Last enrollment 2020-04-05, first full week observed on 2020-04-12.
        let due = analysis.windows_due(AnalysisPeriod::Week, date(2020, 4, 12));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].index, 1);
        assert_eq!(analysis.table_name(&due[0]), "test_experiment_week_1");
        assert!(analysis.windows_due(AnalysisPeriod::Week, date(2020, 4, 13)).is_empty());
        assert_eq!(analysis.windows_due(AnalysisPeriod::Week, date(2020, 4, 19))[0].index, 2);

        assert!(analysis.windows_due(AnalysisPeriod::Overall, date(2020, 4, 12)).is_empty());
        let overall = analysis.windows_due(AnalysisPeriod::Overall, date(2020, 6, 2));
        assert_eq!(overall[0].bounds, WindowBounds { start: 0, end: 56 });
    }

    #[test]
    fn test_custom_enrollment_query() {
        let config = config("[experiment]\nenrollment_query = \"SELECT * FROM my_enrollments\"");
        let analysis = Analysis::new(&config);
        assert_eq!(analysis.enrollments_query(Utc::now()), "SELECT * FROM my_enrollments");
    }

    #[tokio::test]
    async fn test_validate_dry_runs_every_period() {
        let config = config(WEEKLY_ACTIVE_HOURS);
        let backend = RecordingBackend::new();
        Analysis::new(&config).validate(&backend).await.unwrap();
        let dry_runs = backend.dry_runs();
        assert_eq!(dry_runs.len(), 3);
        assert!(dry_runs[0].contains("normandy"));
        assert!(dry_runs[1].contains("active_hours_sum"));
    }

    #[tokio::test]
    async fn test_validate_stops_at_first_failure() {
        let config = config(WEEKLY_ACTIVE_HOURS);
        let backend = RecordingBackend::new();
        backend.fail_when("active_hours_sum", "Unknown column active_hours_sum");
        let err = Analysis::new(&config).validate(&backend).await.unwrap_err();
        assert!(err.sql.contains("active_hours_sum"));
        assert_eq!(backend.dry_runs().len(), 2);
    }

    #[tokio::test]
    async fn test_run_writes_due_tables() {
        let config = config(WEEKLY_ACTIVE_HOURS);
        let backend = RecordingBackend::new();
        let written = Analysis::new(&config)
            .run(&backend, date(2020, 4, 12))
            .await
            .unwrap();
        assert_eq!(written, ["test_experiment_enrollments", "test_experiment_week_1"]);
        assert!(backend.table_exists("test_experiment_week_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_run_skipped() {
        let config = config("[experiment]\nskip = true");
        let backend = RecordingBackend::new();
        let written = Analysis::new(&config).run(&backend, date(2020, 4, 12)).await.unwrap();
        assert!(written.is_empty());
        assert!(backend.queries().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_enrollment_period_is_bounded() {
        let mut config = config(WEEKLY_ACTIVE_HOURS);
        config.experiment.enrollment_period = Some(u32::MAX);
        let backend = RecordingBackend::new();
        Analysis::new(&config).validate(&backend).await.unwrap();
        assert!(backend.dry_runs()[0].contains("BETWEEN '2020-03-30' AND '2030-03-27'"));
        assert!(Analysis::new(&config).plan(date(2020, 4, 12)).is_empty());
    }

    #[tokio::test]
    async fn test_generated_sql_is_clickhouse_dialect() {
        let catalog = Catalog::builtin();
        let mut fenix = experiment();
        fenix.app_id = "org.mozilla.firefox".into();
        fenix.app_name = "fenix".into();
        let segments =
            AnalysisSpec::from_toml_str("[experiment]\nsegments = [\"regular_users_v3\", \"new_unique_profiles\"]")
                .unwrap();

        let backend = RecordingBackend::new();
        for experiment in [experiment(), fenix] {
            let mut spec = AnalysisSpec::default_for_experiment(&experiment).unwrap();
            spec.merge(&segments);
            let config = spec.resolve_at(&experiment, &catalog, date(2020, 4, 12)).unwrap();
            Analysis::new(&config).validate(&backend).await.unwrap();
        }

        let table_ref = Regex::new(r"(?:FROM|JOIN)\s+([A-Za-z_][\w.]*)").unwrap();
        let dry_runs = backend.dry_runs();
        assert!(dry_runs.len() >= 6);
        for sql in &dry_runs {
            for construct in [
                "`", "mozfun", "DATE_ADD", "INTERVAL", "DATE(", "LOGICAL_OR", "COUNTIF", "SAFE_DIVIDE",
                "UNNEST", "COALESCE",
            ] {
                assert!(!sql.contains(construct), "{construct} in\n{sql}");
            }
            for table in table_ref.captures_iter(sql) {
                assert!(table[1].matches('.').count() <= 1, "three-part name {}", &table[1]);
            }
        }
        assert!(dry_runs.iter().any(|sql| sql.contains("FROM org_mozilla_firefox.events_unnested e")));
        assert!(dry_runs.iter().any(|sql| sql.contains("INNER JOIN telemetry.clients_last_seen ds")));
    }
}
