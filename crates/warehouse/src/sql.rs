//! SQL text for enrollments and per-window metrics.

use std::collections::BTreeMap;

use analysis_catalog::{DataSource, EnrollmentsQueryType, ExperimentsColumnType, Metric, Segment};
use analysis_core::dates::format_date;
use analysis_core::types::normalize_table_name;
use chrono::{DateTime, Utc};

/// Inputs shared by every query of one experiment.
#[derive(Debug, Clone)]
pub struct QueryParams<'a> {
    pub enrollment_slug: &'a str,
    pub app_id: &'a str,
    pub enrollment_start: DateTime<Utc>,
    pub enrollment_end: DateTime<Utc>,
}

/// Offsets in days from each client's enrollment date, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub start: i64,
    pub end: i64,
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Qualify a plain column path with `alias`. Expressions such as
/// `toDate(submission_timestamp)` are used as written.
fn column(alias: &str, expr: &str) -> String {
    let is_path = !expr.is_empty()
        && expr
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if is_path {
        format!("{alias}.{expr}")
    } else {
        expr.to_string()
    }
}

/// `date` falls within `[start, end]` days after the client's enrollment.
fn window_condition(date: &str, start: i64, end: i64) -> String {
    format!(
        "{date} BETWEEN addDays(e.enrollment_date, {start}) AND addDays(e.enrollment_date, {end})"
    )
}

pub fn enrollments_query(kind: EnrollmentsQueryType, params: &QueryParams<'_>) -> String {
    let start = quote(&format_date(&params.enrollment_start));
    let end = quote(&format_date(&params.enrollment_end));
    let slug = quote(params.enrollment_slug);

    match kind {
        EnrollmentsQueryType::Normandy => format!(
            "SELECT
    e.client_id AS client_id,
    e.event_map_values['branch'] AS branch,
    min(e.submission_date) AS enrollment_date,
    count(e.submission_date) AS num_enrollment_events
FROM telemetry.events e
WHERE
    e.event_category = 'normandy'
    AND e.event_method = 'enroll'
    AND e.submission_date BETWEEN {start} AND {end}
    AND e.event_string_value = {slug}
GROUP BY client_id, branch"
        ),
        EnrollmentsQueryType::GleanEvent => {
            let dataset = normalize_table_name(params.app_id);
            format!(
                "SELECT
    e.client_info.client_id AS client_id,
    e.event_extra['branch'] AS branch,
    toDate(min(e.submission_timestamp)) AS enrollment_date,
    count(e.submission_timestamp) AS num_enrollment_events
FROM {dataset}.events_unnested e
WHERE
    e.event_category = 'nimbus_events'
    AND e.event_name = 'enrollment'
    AND toDate(e.submission_timestamp) BETWEEN {start} AND {end}
    AND e.event_extra['experiment'] = {slug}
GROUP BY client_id, branch"
            )
        }
    }
}

fn experiments_filter(source: &DataSource, slug: &str) -> String {
    match source.experiments_column_type {
        ExperimentsColumnType::Simple => format!(
            "\n        AND mapContains(ds.experiments, {})",
            quote(slug)
        ),
        ExperimentsColumnType::Native => format!(
            "\n        AND mapContains(ds.ping_info.experiments, {})",
            quote(slug)
        ),
        ExperimentsColumnType::None => String::new(),
    }
}

fn segments_ctes(segments: &[Segment]) -> (Vec<String>, Vec<String>) {
    let mut by_source: BTreeMap<&str, Vec<&Segment>> = BTreeMap::new();
    for segment in segments {
        by_source
            .entry(segment.data_source.name.as_str())
            .or_default()
            .push(segment);
    }

    let mut ctes = Vec::new();
    let mut joins = Vec::new();
    for (name, group) in by_source {
        let source = &group[0].data_source;
        let alias = format!("segments_{}", normalize_table_name(name));
        let columns = group
            .iter()
            .map(|s| format!("        {} AS {}", s.select_expr, s.name))
            .collect::<Vec<_>>()
            .join(",\n");
        ctes.push(format!(
            "{alias} AS (
    SELECT
        e.client_id,
        e.branch,
{columns}
    FROM raw_enrollments e
    INNER JOIN {from} ds
        ON {client_id} = e.client_id
    WHERE
        {window}
    GROUP BY e.client_id, e.branch
)",
            from = source.from_expr,
            client_id = column("ds", &source.client_id_column),
            window = window_condition(
                &column("ds", &source.submission_date_column),
                source.window_start.into(),
                source.window_end.into()
            ),
        ));
        joins.push(alias);
    }
    (ctes, joins)
}

/// Enrollments joined with one boolean column per segment.
pub fn enrollments_with_segments(enrollments: &str, segments: &[Segment]) -> String {
    if segments.is_empty() {
        return enrollments.to_string();
    }
    let (ctes, joins) = segments_ctes(segments);
    let mut select = String::from("SELECT\n    raw_enrollments.*");
    for segment in segments {
        select.push_str(&format!(",\n    {}", segment.name));
    }
    let mut from = String::from("\nFROM raw_enrollments");
    for alias in joins {
        from.push_str(&format!("\nLEFT JOIN {alias} USING (client_id, branch)"));
    }
    format!(
        "WITH raw_enrollments AS (\n{enrollments}\n),\n{}\n{select}{from}",
        ctes.join(",\n")
    )
}

/// Per-client metric values for one analysis window. Metrics are grouped by
/// data source, one join per source.
pub fn metrics_query(
    enrollments: &str,
    metrics: &[&Metric],
    window: WindowBounds,
    enrollment_slug: &str,
) -> String {
    let mut by_source: BTreeMap<&str, Vec<&Metric>> = BTreeMap::new();
    for metric in metrics {
        by_source
            .entry(metric.data_source.name.as_str())
            .or_default()
            .push(metric);
    }

    let mut ctes = vec![format!("enrollments AS (\n{enrollments}\n)")];
    let mut columns = Vec::new();
    let mut joins = Vec::new();
    for (name, group) in &by_source {
        let source = &group[0].data_source;
        let alias = format!("ds_{}", normalize_table_name(name));
        let selects = group
            .iter()
            .map(|m| format!("        {} AS {}", m.select_expr, m.name))
            .collect::<Vec<_>>()
            .join(",\n");
        ctes.push(format!(
            "{alias} AS (
    SELECT
        e.client_id,
        e.branch,
{selects}
    FROM enrollments e
    INNER JOIN {from} ds
        ON {client_id} = e.client_id
    WHERE
        {window}{filter}
    GROUP BY e.client_id, e.branch
)",
            from = source.from_expr,
            client_id = column("ds", &source.client_id_column),
            window = window_condition(
                &column("ds", &source.submission_date_column),
                window.start,
                window.end
            ),
            filter = experiments_filter(source, enrollment_slug),
        ));
        for metric in group {
            columns.push(format!("    {alias}.{}", metric.name));
        }
        joins.push(format!("LEFT JOIN {alias} USING (client_id, branch)"));
    }

    let mut select = format!(
        "SELECT\n    enrollments.*,\n    {} AS analysis_window_start,\n    {} AS analysis_window_end",
        window.start, window.end
    );
    for column in columns {
        select.push_str(",\n");
        select.push_str(&column);
    }

    let mut query = format!("WITH {}\n{select}\nFROM enrollments", ctes.join(",\n"));
    for join in joins {
        query.push('\n');
        query.push_str(&join);
    }
    query
}
