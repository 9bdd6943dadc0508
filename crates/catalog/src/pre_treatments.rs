//! Transforms applied to per-client metric values before a statistic runs.

use analysis_core::ResolutionError;
use serde::{Deserialize, Serialize};

use crate::params::{ensure, parse_params, NoParams, Parameters};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "pre_treatment", rename_all = "snake_case")]
pub enum PreTreatment {
    RemoveNulls,
    RemoveIndefinites,
    CensorHighestValues { fraction: f64 },
    Log { base: f64 },
    NormalizeOverAnalysisPeriod,
}

impl PreTreatment {
    pub fn name(&self) -> &'static str {
        match self {
            PreTreatment::RemoveNulls => "remove_nulls",
            PreTreatment::RemoveIndefinites => "remove_indefinites",
            PreTreatment::CensorHighestValues { .. } => "censor_highest_values",
            PreTreatment::Log { .. } => "log",
            PreTreatment::NormalizeOverAnalysisPeriod => "normalize_over_analysis_period",
        }
    }
}

pub type PreTreatmentFactory =
    Box<dyn Fn(&str, &Parameters) -> Result<PreTreatment, ResolutionError> + Send + Sync>;

const KIND: &str = "pre-treatment";

pub fn builtin_pre_treatments() -> Vec<(&'static str, PreTreatmentFactory)> {
    vec![
        ("remove_nulls", Box::new(remove_nulls) as PreTreatmentFactory),
        ("remove_indefinites", Box::new(remove_indefinites) as PreTreatmentFactory),
        (
            "normalize_over_analysis_period",
            Box::new(normalize_over_analysis_period) as PreTreatmentFactory,
        ),
        ("censor_highest_values", Box::new(censor_highest_values) as PreTreatmentFactory),
        ("log", Box::new(log) as PreTreatmentFactory),
    ]
}

fn default_fraction() -> f64 {
    1.0 - 1e-5
}

fn default_base() -> f64 {
    10.0
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CensorParams {
    #[serde(default = "default_fraction")]
    fraction: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LogParams {
    #[serde(default = "default_base")]
    base: f64,
}

fn remove_nulls(name: &str, params: &Parameters) -> Result<PreTreatment, ResolutionError> {
    parse_params::<NoParams>(KIND, name, params)?;
    Ok(PreTreatment::RemoveNulls)
}

fn remove_indefinites(name: &str, params: &Parameters) -> Result<PreTreatment, ResolutionError> {
    parse_params::<NoParams>(KIND, name, params)?;
    Ok(PreTreatment::RemoveIndefinites)
}

fn normalize_over_analysis_period(
    name: &str,
    params: &Parameters,
) -> Result<PreTreatment, ResolutionError> {
    parse_params::<NoParams>(KIND, name, params)?;
    Ok(PreTreatment::NormalizeOverAnalysisPeriod)
}

fn censor_highest_values(name: &str, params: &Parameters) -> Result<PreTreatment, ResolutionError> {
    let CensorParams { fraction } = parse_params(KIND, name, params)?;
    ensure(KIND, name, fraction > 0.0 && fraction <= 1.0, "`fraction` must be in (0, 1]")?;
    Ok(PreTreatment::CensorHighestValues { fraction })
}

fn log(name: &str, params: &Parameters) -> Result<PreTreatment, ResolutionError> {
    let LogParams { base } = parse_params(KIND, name, params)?;
    ensure(KIND, name, base > 0.0 && base != 1.0, "`base` must be positive and not 1")?;
    Ok(PreTreatment::Log { base })
}
