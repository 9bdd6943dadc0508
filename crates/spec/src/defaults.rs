//! Default spec layers bundled per platform.

use analysis_catalog::{platform, platform_for_app};
use analysis_core::{Experiment, ParseError};
use tracing::warn;

use crate::spec::AnalysisSpec;

impl AnalysisSpec {
    /// The bundled default layer for a platform, or `None` if the platform
    /// is unknown.
    pub fn default_for_platform(name: &str) -> Result<Option<AnalysisSpec>, ParseError> {
        platform(name)
            .map(|p| AnalysisSpec::from_toml_str(p.default_spec))
            .transpose()
    }

    /// The default layer for an experiment's platform. Experiments on
    /// unsupported platforms get an empty layer.
    pub fn default_for_experiment(experiment: &Experiment) -> Result<AnalysisSpec, ParseError> {
        match platform_for_app(&experiment.app_name, &experiment.app_id) {
            Some(p) => AnalysisSpec::from_toml_str(p.default_spec),
            None => {
                warn!(
                    slug = %experiment.experimenter_slug,
                    app_name = %experiment.app_name,
                    app_id = %experiment.app_id,
                    "No default spec for platform"
                );
                Ok(AnalysisSpec::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_catalog::{Catalog, PLATFORMS};
    use analysis_core::{AnalysisPeriod, ExperimentStatus, Variant};

    fn experiment(app_name: &str, app_id: &str) -> Experiment {
        Experiment {
            experimenter_slug: "test_slug".into(),
            normandy_slug: Some("normandy-test-slug".into()),
            experiment_type: "pref".into(),
            status: ExperimentStatus::Live,
            start_date: None,
            end_date: None,
            proposed_enrollment: Some(7),
            variants: vec![Variant {
                slug: "control".into(),
                ratio: 1.0,
                is_control: true,
            }],
            reference_branch: None,
            is_high_population: false,
            app_id: app_id.into(),
            app_name: app_name.into(),
            outcomes: vec![],
        }
    }

    #[test]
    fn test_every_platform_default_resolves() {
        let catalog = Catalog::builtin();
        for p in PLATFORMS {
            let spec = AnalysisSpec::default_for_platform(p.name).unwrap().unwrap();
            let config = spec
                .resolve(&experiment(p.name, p.app_ids[0]), &catalog)
                .unwrap_or_else(|e| panic!("{} defaults do not resolve: {e}", p.name));
            assert!(!config.summaries(AnalysisPeriod::Week).is_empty());
        }
    }

    #[test]
    fn test_unknown_platform() {
        assert!(AnalysisSpec::default_for_platform("klar").unwrap().is_none());
        let spec = AnalysisSpec::default_for_experiment(&experiment("klar", "org.mozilla.klar")).unwrap();
        assert_eq!(spec, AnalysisSpec::default());
    }

    #[test]
    fn test_desktop_defaults() {
        let spec = AnalysisSpec::default_for_experiment(&experiment("", "")).unwrap();
        let weekly = spec.metrics.names_for(AnalysisPeriod::Week);
        assert!(weekly.iter().any(|m| m == "active_hours"));
        assert!(weekly.iter().any(|m| m == "ad_clicks"));
    }
}
