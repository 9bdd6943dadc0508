//! Built-in metrics, data sources and segments for desktop and mobile.

use crate::types::{DataSource, ExperimentsColumnType, Metric, Segment, SegmentDataSource};

fn agg_sum(expr: &str) -> String {
    format!("ifNull(sum({expr}), 0)")
}

fn agg_any(expr: &str) -> String {
    format!("ifNull(max(toUInt8({expr})), 0)")
}

pub fn data_sources() -> Vec<DataSource> {
    vec![
        // Desktop
        DataSource::new("clients_daily", "telemetry.clients_daily"),
        DataSource::new(
            "search_clients_daily",
            "search.search_clients_engines_sources_daily",
        ),
        DataSource::new("main", "telemetry.main")
            .with_submission_date_column("toDate(submission_timestamp)"),
        DataSource::new("events", "telemetry.events"),
        DataSource::new(
            "normandy_events",
            "(SELECT * FROM telemetry.events WHERE event_category = 'normandy')",
        )
        .with_experiments_column_type(ExperimentsColumnType::None),
        // Mobile (Glean)
        DataSource::new("baseline", "org_mozilla_firefox.baseline")
            .with_client_id_column("client_info.client_id")
            .with_submission_date_column("toDate(submission_timestamp)")
            .with_experiments_column_type(ExperimentsColumnType::Native),
        DataSource::new("metrics", "org_mozilla_firefox.metrics")
            .with_client_id_column("client_info.client_id")
            .with_submission_date_column("toDate(submission_timestamp)")
            .with_experiments_column_type(ExperimentsColumnType::Native),
        DataSource::new("mobile_events", "org_mozilla_firefox.events_unnested")
            .with_client_id_column("client_info.client_id")
            .with_submission_date_column("toDate(submission_timestamp)")
            .with_experiments_column_type(ExperimentsColumnType::Native),
    ]
}

pub fn metrics(sources: &[DataSource]) -> Vec<Metric> {
    let ds = |name: &str| {
        sources
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .unwrap_or_else(|| DataSource::new(name, name))
    };

    vec![
        Metric::new("active_hours", ds("clients_daily"), agg_sum("active_hours_sum"))
            .with_friendly_name("Active hours"),
        Metric::new(
            "uri_count",
            ds("clients_daily"),
            agg_sum("scalar_parent_browser_engagement_total_uri_count_sum"),
        )
        .with_friendly_name("URIs visited"),
        Metric::new("days_of_use", ds("clients_daily"), "count(ds.submission_date)")
            .with_friendly_name("Days of use"),
        Metric::new(
            "qualified_cumulative_days_of_use",
            ds("clients_daily"),
            "countIf(ds.active_hours_sum > 0 AND ds.scalar_parent_browser_engagement_total_uri_count_sum > 0)",
        ),
        Metric::new("search_count", ds("search_clients_daily"), agg_sum("sap"))
            .with_friendly_name("SAP searches"),
        Metric::new("ad_clicks", ds("search_clients_daily"), agg_sum("ad_click"))
            .with_friendly_name("Ad clicks"),
        Metric::new("tagged_search_count", ds("search_clients_daily"), agg_sum("tagged_sap")),
        Metric::new(
            "tagged_follow_on_search_count",
            ds("search_clients_daily"),
            agg_sum("tagged_follow_on"),
        ),
        Metric::new(
            "searches_with_ads",
            ds("search_clients_daily"),
            agg_sum("search_with_ads"),
        ),
        Metric::new(
            "unenroll",
            ds("normandy_events"),
            agg_any("ds.event_method = 'unenroll'"),
        )
        .with_friendly_name("Unenrollments"),
        Metric::new(
            "view_about_logins",
            ds("events"),
            agg_any("ds.event_method = 'open_management' AND ds.event_category = 'pwmgr'"),
        ),
        Metric::new(
            "view_about_protections",
            ds("events"),
            agg_any("ds.event_method = 'show' AND ds.event_object = 'protection_report'"),
        ),
        Metric::new(
            "connect_fxa",
            ds("events"),
            agg_any("ds.event_method = 'connect' AND ds.event_object = 'account'"),
        ),
        // Mobile
        Metric::new("baseline_ping_count", ds("baseline"), "count(ds.document_id)"),
        Metric::new("metric_ping_count", ds("metrics"), "count(ds.document_id)"),
        Metric::new(
            "duration",
            ds("baseline"),
            agg_sum("ds.metrics.timespan.glean_baseline_duration.value"),
        )
        .with_friendly_name("Time in app"),
        Metric::new(
            "user_reports_site_issue_count",
            ds("mobile_events"),
            "countIf(ds.event_name = 'browser_menu_action' AND ds.event_extra_value = 'report_site_issue')",
        ),
    ]
}

pub fn segment_data_sources() -> Vec<SegmentDataSource> {
    vec![SegmentDataSource::new(
        "clients_last_seen",
        "telemetry.clients_last_seen",
    )]
}

pub fn segments(sources: &[SegmentDataSource]) -> Vec<Segment> {
    let Some(last_seen) = sources.iter().find(|s| s.name == "clients_last_seen").cloned() else {
        return Vec::new();
    };

    vec![
        Segment::new(
            "regular_users_v3",
            last_seen.clone(),
            agg_any("ds.is_regular_user_v3"),
        ),
        Segment::new(
            "new_unique_profiles",
            last_seen.clone(),
            agg_any("ds.first_seen_date = ds.submission_date"),
        ),
        Segment::new(
            "weekday_regular_v1",
            last_seen.clone(),
            agg_any("ds.is_weekday_regular_v1"),
        ),
        Segment::new(
            "allweek_regular_v1",
            last_seen.clone(),
            agg_any("ds.is_allweek_regular_v1"),
        ),
        Segment::new(
            "new_or_resurrected_v3",
            last_seen,
            agg_any("ds.is_new_or_resurrected_v3"),
        ),
    ]
}
