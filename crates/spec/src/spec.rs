//! Spec layers as parsed from TOML.
//!
//! Sections are derived with `deny_unknown_fields`. The `[metrics]` table
//! mixes period lists with inline definitions and is split by hand; each
//! section is decoded on its own so errors name the offending key
//! (`metrics.weekly`, `data_sources.eggs`, ...).

use std::collections::BTreeMap;
use std::str::FromStr;

use analysis_catalog::{DataSource, ExperimentsColumnType, Parameters, SegmentDataSource};
use analysis_core::dates::parse_date;
use analysis_core::{AnalysisPeriod, ParseError};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use toml::{Table, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisSpec {
    pub experiment: ExperimentSpec,
    pub metrics: MetricsSpec,
    pub data_sources: DataSourcesSpec,
    pub segments: SegmentsSpec,
}

/// The `[experiment]` table. Every field is an optional override of the
/// experiment metadata.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentSpec {
    pub enrollment_query: Option<String>,
    pub reference_branch: Option<String>,
    pub segments: Vec<String>,
    #[serde(deserialize_with = "deserialize_date")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "deserialize_date")]
    pub end_date: Option<DateTime<Utc>>,
    pub enrollment_period: Option<u32>,
    pub skip: Option<bool>,
}

/// Per-period metric name lists plus inline metric definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSpec {
    pub periods: BTreeMap<AnalysisPeriod, Vec<String>>,
    pub definitions: BTreeMap<String, MetricDefinition>,
}

impl MetricsSpec {
    pub fn names_for(&self, period: AnalysisPeriod) -> &[String] {
        self.periods.get(&period).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub name: String,
    pub data_source: Option<String>,
    pub select_expression: Option<String>,
    pub friendly_name: Option<String>,
    pub description: Option<String>,
    /// Statistic blocks in declaration order.
    pub statistics: Vec<StatisticSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticSpec {
    pub name: String,
    pub parameters: Parameters,
    pub pre_treatments: Vec<PreTreatmentSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreTreatmentSpec {
    pub name: String,
    pub parameters: Parameters,
}

impl PreTreatmentSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Parameters::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSourcesSpec {
    pub definitions: BTreeMap<String, DataSourceDefinition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceDefinition {
    #[serde(skip)]
    pub name: String,
    pub from_expression: String,
    pub client_id_column: Option<String>,
    pub submission_date_column: Option<String>,
    pub experiments_column_type: Option<ExperimentsColumnType>,
}

impl DataSourceDefinition {
    pub fn to_data_source(&self) -> DataSource {
        let mut source = DataSource::new(&self.name, &self.from_expression);
        if let Some(column) = &self.client_id_column {
            source = source.with_client_id_column(column);
        }
        if let Some(column) = &self.submission_date_column {
            source = source.with_submission_date_column(column);
        }
        if let Some(kind) = self.experiments_column_type {
            source = source.with_experiments_column_type(kind);
        }
        source
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentsSpec {
    pub definitions: BTreeMap<String, SegmentDefinition>,
    pub data_sources: BTreeMap<String, SegmentDataSourceDefinition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentDefinition {
    #[serde(skip)]
    pub name: String,
    pub data_source: String,
    pub select_expression: String,
    pub friendly_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentDataSourceDefinition {
    #[serde(skip)]
    pub name: String,
    pub from_expression: String,
    pub client_id_column: Option<String>,
    pub submission_date_column: Option<String>,
    #[serde(default)]
    pub window_start: i32,
    #[serde(default)]
    pub window_end: i32,
}

impl SegmentDataSourceDefinition {
    pub fn to_segment_data_source(&self) -> SegmentDataSource {
        let mut source = SegmentDataSource::new(&self.name, &self.from_expression);
        source.window_start = self.window_start;
        source.window_end = self.window_end;
        if let Some(column) = &self.client_id_column {
            source.client_id_column = column.clone();
        }
        if let Some(column) = &self.submission_date_column {
            source.submission_date_column = column.clone();
        }
        source
    }
}

/// A reusable bundle of metric definitions for one platform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeSpec {
    pub friendly_name: Option<String>,
    pub description: Option<String>,
    /// Metric definitions in file order.
    pub metrics: Vec<MetricDefinition>,
    pub data_sources: DataSourcesSpec,
    pub default_metrics: Vec<String>,
    /// Platform directory the outcome was loaded from.
    pub platform: Option<String>,
}

/// Top-level layout of an analysis spec file. Sections stay raw until
/// decoded under their own key.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecFile {
    experiment: Option<Value>,
    metrics: Option<Table>,
    data_sources: Option<Table>,
    segments: Option<Table>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OutcomeFile {
    friendly_name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    default_metrics: Vec<String>,
    #[serde(default)]
    metrics: Table,
    #[serde(default)]
    data_sources: Table,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MetricFields {
    data_source: Option<String>,
    select_expression: Option<String>,
    friendly_name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    statistics: Table,
}

/// One statistic block; everything but `pre_treatments` is a parameter of
/// the statistic itself.
#[derive(Deserialize)]
struct StatisticFields {
    #[serde(default)]
    pre_treatments: Vec<PreTreatmentEntry>,
    #[serde(flatten)]
    parameters: Parameters,
}

/// Either a bare name or a table with a `name` key and parameters.
#[derive(Deserialize)]
#[serde(untagged)]
enum PreTreatmentEntry {
    Name(String),
    Block {
        name: String,
        #[serde(flatten)]
        parameters: Parameters,
    },
}

impl From<PreTreatmentEntry> for PreTreatmentSpec {
    fn from(entry: PreTreatmentEntry) -> Self {
        match entry {
            PreTreatmentEntry::Name(name) => PreTreatmentSpec::named(name),
            PreTreatmentEntry::Block { name, parameters } => PreTreatmentSpec { name, parameters },
        }
    }
}

impl AnalysisSpec {
    pub fn from_toml_str(text: &str) -> Result<Self, ParseError> {
        let file: SpecFile = toml::from_str(text).map_err(|e| ParseError::Toml(e.to_string()))?;
        let experiment = match file.experiment {
            Some(value) => decode("experiment", value)?,
            None => ExperimentSpec::default(),
        };
        let metrics = match file.metrics {
            Some(table) => parse_metrics(table)?,
            None => MetricsSpec::default(),
        };
        let data_sources = match file.data_sources {
            Some(table) => parse_data_sources(table)?,
            None => DataSourcesSpec::default(),
        };
        let segments = match file.segments {
            Some(table) => parse_segments(table)?,
            None => SegmentsSpec::default(),
        };
        Ok(Self {
            experiment,
            metrics,
            data_sources,
            segments,
        })
    }
}

impl FromStr for AnalysisSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}

impl OutcomeSpec {
    pub fn from_toml_str(text: &str) -> Result<Self, ParseError> {
        let file: OutcomeFile =
            toml::from_str(text).map_err(|e| ParseError::Toml(e.to_string()))?;
        let metrics = file
            .metrics
            .into_iter()
            .map(|(name, value)| parse_metric_definition(name, value))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            friendly_name: file.friendly_name,
            description: file.description,
            metrics,
            data_sources: parse_data_sources(file.data_sources)?,
            default_metrics: file.default_metrics,
            platform: None,
        })
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|m| m.name.as_str())
    }
}

/// Deserialize one section, attributing failures to `key`.
fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, ParseError> {
    value.try_into().map_err(|e: toml::de::Error| ParseError::Invalid {
        key: key.to_string(),
        message: e.message().trim().to_string(),
    })
}

fn expect_table(key: String, value: Value) -> Result<Value, ParseError> {
    match value {
        Value::Table(_) => Ok(value),
        other => Err(ParseError::InvalidType {
            key,
            expected: "table",
            found: other.type_str().to_string(),
        }),
    }
}

fn parse_metrics(table: Table) -> Result<MetricsSpec, ParseError> {
    let mut spec = MetricsSpec::default();
    for (key, value) in table {
        if let Some(period) = AnalysisPeriod::from_config_key(&key) {
            let path = format!("metrics.{key}");
            if !value.is_array() {
                return Err(ParseError::ExpectedList {
                    key: path,
                    found: value.type_str().to_string(),
                });
            }
            spec.periods.insert(period, decode(&path, value)?);
            continue;
        }
        let definition = parse_metric_definition(key.clone(), value)?;
        spec.definitions.insert(key, definition);
    }
    Ok(spec)
}

fn parse_metric_definition(name: String, value: Value) -> Result<MetricDefinition, ParseError> {
    let path = format!("metrics.{name}");
    let fields: MetricFields = decode(&path, expect_table(path.clone(), value)?)?;

    let mut statistics = Vec::with_capacity(fields.statistics.len());
    for (stat_name, block) in fields.statistics {
        let block_path = format!("{path}.statistics.{stat_name}");
        let block: StatisticFields = decode(&block_path, expect_table(block_path.clone(), block)?)?;
        statistics.push(StatisticSpec {
            name: stat_name,
            parameters: block.parameters,
            pre_treatments: block.pre_treatments.into_iter().map(Into::into).collect(),
        });
    }

    Ok(MetricDefinition {
        name,
        data_source: fields.data_source,
        select_expression: fields.select_expression,
        friendly_name: fields.friendly_name,
        description: fields.description,
        statistics,
    })
}

fn parse_data_sources(table: Table) -> Result<DataSourcesSpec, ParseError> {
    let mut spec = DataSourcesSpec::default();
    for (name, value) in table {
        let mut source: DataSourceDefinition = decode(&format!("data_sources.{name}"), value)?;
        source.name = name.clone();
        spec.definitions.insert(name, source);
    }
    Ok(spec)
}

fn parse_segments(table: Table) -> Result<SegmentsSpec, ParseError> {
    let mut spec = SegmentsSpec::default();
    for (name, value) in table {
        if name == "data_sources" {
            let sources: BTreeMap<String, Value> = decode("segments.data_sources", value)?;
            for (source_name, value) in sources {
                let mut source: SegmentDataSourceDefinition =
                    decode(&format!("segments.data_sources.{source_name}"), value)?;
                source.name = source_name.clone();
                spec.data_sources.insert(source_name, source);
            }
            continue;
        }

        let mut segment: SegmentDefinition = decode(&format!("segments.{name}"), value)?;
        segment.name = name.clone();
        spec.definitions.insert(name, segment);
    }
    Ok(spec)
}

/// Accepts `"YYYY-MM-DD"` strings and bare TOML dates.
fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => parse_date("date", &text)
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid date `{text}`, expected YYYY-MM-DD"))),
        Value::Datetime(dt) => dt
            .date
            .and_then(|d| NaiveDate::from_ymd_opt(d.year.into(), d.month.into(), d.day.into()))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| Some(Utc.from_utc_datetime(&d)))
            .ok_or_else(|| D::Error::custom(format!("invalid date `{dt}`, expected YYYY-MM-DD"))),
        other => Err(D::Error::custom(format!(
            "invalid type: {}, expected a date",
            other.type_str()
        ))),
    }
}
