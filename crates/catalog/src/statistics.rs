//! Statistic kinds and their factories.
//!
//! The statistic algorithms run downstream; here a statistic is only its
//! name and validated parameters.

use analysis_core::ResolutionError;
use serde::{Deserialize, Serialize};

use crate::params::{ensure, parse_params, NoParams, Parameters};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "statistic", rename_all = "snake_case")]
pub enum Statistic {
    BootstrapMean {
        num_samples: u32,
        drop_highest: f64,
        ref_branch_label: String,
    },
    Binomial {
        ref_branch_label: String,
    },
    Deciles {
        num_samples: u32,
        ref_branch_label: String,
    },
    KernelDensityEstimate {
        bandwidth: String,
        log_space: bool,
    },
    EmpiricalCdf {
        log_space: bool,
    },
    Count,
}

impl Statistic {
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::BootstrapMean { .. } => "bootstrap_mean",
            Statistic::Binomial { .. } => "binomial",
            Statistic::Deciles { .. } => "deciles",
            Statistic::KernelDensityEstimate { .. } => "kernel_density_estimate",
            Statistic::EmpiricalCdf { .. } => "empirical_cdf",
            Statistic::Count => "count",
        }
    }
}

/// Resolution-time values statistics may default to.
#[derive(Debug, Clone, Copy)]
pub struct StatisticContext<'a> {
    pub reference_branch: Option<&'a str>,
}

impl StatisticContext<'_> {
    fn ref_branch(&self) -> &str {
        self.reference_branch.unwrap_or("control")
    }
}

pub type StatisticFactory = Box<
    dyn Fn(&str, &Parameters, &StatisticContext<'_>) -> Result<Statistic, ResolutionError>
        + Send
        + Sync,
>;

const KIND: &str = "statistic";

pub fn builtin_statistics() -> Vec<(&'static str, StatisticFactory)> {
    vec![
        ("bootstrap_mean", Box::new(bootstrap_mean) as StatisticFactory),
        ("binomial", Box::new(binomial) as StatisticFactory),
        ("deciles", Box::new(deciles) as StatisticFactory),
        ("kernel_density_estimate", Box::new(kernel_density_estimate) as StatisticFactory),
        ("empirical_cdf", Box::new(empirical_cdf) as StatisticFactory),
        ("count", Box::new(count) as StatisticFactory),
    ]
}

fn default_num_samples() -> u32 {
    10_000
}

fn default_drop_highest() -> f64 {
    0.0005
}

fn default_bandwidth() -> String {
    "normal_reference".to_string()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BootstrapMeanParams {
    #[serde(default = "default_num_samples")]
    num_samples: u32,
    #[serde(default = "default_drop_highest")]
    drop_highest: f64,
    ref_branch_label: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BinomialParams {
    ref_branch_label: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DecilesParams {
    #[serde(default = "default_num_samples")]
    num_samples: u32,
    ref_branch_label: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct KernelDensityParams {
    #[serde(default = "default_bandwidth")]
    bandwidth: String,
    #[serde(default)]
    log_space: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EmpiricalCdfParams {
    #[serde(default)]
    log_space: bool,
}

fn bootstrap_mean(
    name: &str,
    params: &Parameters,
    ctx: &StatisticContext<'_>,
) -> Result<Statistic, ResolutionError> {
    let p: BootstrapMeanParams = parse_params(KIND, name, params)?;
    ensure(KIND, name, p.num_samples > 0, "`num_samples` must be positive")?;
    ensure(
        KIND,
        name,
        (0.0..1.0).contains(&p.drop_highest),
        "`drop_highest` must be in [0, 1)",
    )?;
    Ok(Statistic::BootstrapMean {
        num_samples: p.num_samples,
        drop_highest: p.drop_highest,
        ref_branch_label: p.ref_branch_label.unwrap_or_else(|| ctx.ref_branch().to_string()),
    })
}

fn binomial(
    name: &str,
    params: &Parameters,
    ctx: &StatisticContext<'_>,
) -> Result<Statistic, ResolutionError> {
    let p: BinomialParams = parse_params(KIND, name, params)?;
    Ok(Statistic::Binomial {
        ref_branch_label: p.ref_branch_label.unwrap_or_else(|| ctx.ref_branch().to_string()),
    })
}

fn deciles(
    name: &str,
    params: &Parameters,
    ctx: &StatisticContext<'_>,
) -> Result<Statistic, ResolutionError> {
    let p: DecilesParams = parse_params(KIND, name, params)?;
    ensure(KIND, name, p.num_samples > 0, "`num_samples` must be positive")?;
    Ok(Statistic::Deciles {
        num_samples: p.num_samples,
        ref_branch_label: p.ref_branch_label.unwrap_or_else(|| ctx.ref_branch().to_string()),
    })
}

fn kernel_density_estimate(
    name: &str,
    params: &Parameters,
    _ctx: &StatisticContext<'_>,
) -> Result<Statistic, ResolutionError> {
    let p: KernelDensityParams = parse_params(KIND, name, params)?;
    Ok(Statistic::KernelDensityEstimate {
        bandwidth: p.bandwidth,
        log_space: p.log_space,
    })
}

fn empirical_cdf(
    name: &str,
    params: &Parameters,
    _ctx: &StatisticContext<'_>,
) -> Result<Statistic, ResolutionError> {
    let p: EmpiricalCdfParams = parse_params(KIND, name, params)?;
    Ok(Statistic::EmpiricalCdf {
        log_space: p.log_space,
    })
}

fn count(
    name: &str,
    params: &Parameters,
    _ctx: &StatisticContext<'_>,
) -> Result<Statistic, ResolutionError> {
    parse_params::<NoParams>(KIND, name, params)?;
    Ok(Statistic::Count)
}
