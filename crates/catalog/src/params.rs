//! Typed parameters of statistic and pre-treatment blocks.
//!
//! Each factory declares a `Deserialize` struct with `deny_unknown_fields`
//! and default fns; the free-form block table is deserialized into it.

use analysis_core::ResolutionError;
use serde::de::DeserializeOwned;

pub type Parameters = toml::Table;

/// Deserialize the parameter table of block `name` into `T`.
pub fn parse_params<T: DeserializeOwned>(
    kind: &'static str,
    name: &str,
    params: &Parameters,
) -> Result<T, ResolutionError> {
    toml::Value::Table(params.clone())
        .try_into()
        .map_err(|e: toml::de::Error| invalid(kind, name, e.message().trim()))
}

pub fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> ResolutionError {
    ResolutionError::InvalidParameter {
        kind,
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Fail with `reason` unless `check` holds for an already-parsed value.
pub fn ensure(
    kind: &'static str,
    name: &str,
    check: bool,
    reason: &str,
) -> Result<(), ResolutionError> {
    if check {
        Ok(())
    } else {
        Err(invalid(kind, name, reason))
    }
}

/// Parameters of blocks that take none.
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Sampling {
        #[serde(default = "default_num_samples")]
        num_samples: u32,
        #[serde(default)]
        log_space: bool,
        #[serde(default = "default_fraction")]
        fraction: f64,
    }

    fn default_num_samples() -> u32 {
        5
    }

    fn default_fraction() -> f64 {
        0.5
    }

    fn params(src: &str) -> Parameters {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn test_defaults_and_values() {
        let p: Sampling = parse_params("statistic", "x", &params("num_samples = 10\nlog_space = true\nfraction = 1")).unwrap();
        assert_eq!(p.num_samples, 10);
        assert!(p.log_space);
        assert_eq!(p.fraction, 1.0);

        let p: Sampling = parse_params("statistic", "x", &Parameters::new()).unwrap();
        assert_eq!(p.num_samples, 5);
        assert_eq!(p.fraction, 0.5);
    }

    #[test]
    fn test_unknown_and_mistyped() {
        let err = parse_params::<Sampling>("statistic", "bootstrap_mean", &params("num_sample = 10")).unwrap_err();
        assert!(err.to_string().contains("num_sample"));
        assert!(err.to_string().contains("bootstrap_mean"));

        assert!(parse_params::<Sampling>("statistic", "x", &params("num_samples = \"ten\"")).is_err());
        assert!(parse_params::<Sampling>("statistic", "x", &params("num_samples = -1")).is_err());
        assert!(parse_params::<NoParams>("pre-treatment", "remove_nulls", &params("fraction = 0.5")).is_err());
    }
}
