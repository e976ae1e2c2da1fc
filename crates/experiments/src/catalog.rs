//! Experiment and flag definitions, validated once at startup and immutable
//! afterwards.

use splitsite_core::config::AppConfig;
use splitsite_core::error::{SplitSiteError, SplitSiteResult};
use splitsite_core::types::{ExperimentDefinition, FeatureFlagDefinition};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::hash::BUCKET_COUNT;

#[derive(Debug, Clone, Default)]
pub struct ExperimentCatalog {
    experiments: Vec<ExperimentDefinition>,
    experiment_index: HashMap<String, usize>,
    flags: Vec<FeatureFlagDefinition>,
    flag_index: HashMap<String, usize>,
}

impl ExperimentCatalog {
    /// Build a catalog, rejecting empty or duplicate keys and duplicate
    /// variant names. Allocation totals other than 100 and a missing control
    /// variant are only warned about.
    pub fn new(
        experiments: Vec<ExperimentDefinition>,
        flags: Vec<FeatureFlagDefinition>,
    ) -> SplitSiteResult<Self> {
        let mut experiment_index = HashMap::with_capacity(experiments.len());
        for (i, experiment) in experiments.iter().enumerate() {
            validate_experiment(experiment)?;
            if experiment_index.insert(experiment.key.clone(), i).is_some() {
                return Err(SplitSiteError::Config(format!(
                    "duplicate experiment key '{}'",
                    experiment.key
                )));
            }
        }

        let mut flag_index = HashMap::with_capacity(flags.len());
        for (i, flag) in flags.iter().enumerate() {
            if flag.key.trim().is_empty() {
                return Err(SplitSiteError::Config("flag with empty key".into()));
            }
            if flag_index.insert(flag.key.clone(), i).is_some() {
                return Err(SplitSiteError::Config(format!(
                    "duplicate flag key '{}'",
                    flag.key
                )));
            }
        }

        info!(
            experiments = experiments.len(),
            flags = flags.len(),
            "Experiment catalog loaded"
        );

        Ok(Self {
            experiments,
            experiment_index,
            flags,
            flag_index,
        })
    }

    pub fn from_config(config: &AppConfig) -> SplitSiteResult<Self> {
        Self::new(config.experiments.clone(), config.flags.clone())
    }

    pub fn experiment(&self, key: &str) -> Option<&ExperimentDefinition> {
        self.experiment_index.get(key).map(|i| &self.experiments[*i])
    }

    /// All experiments in catalog order.
    pub fn experiments(&self) -> &[ExperimentDefinition] {
        &self.experiments
    }

    pub fn flag(&self, key: &str) -> Option<&FeatureFlagDefinition> {
        self.flag_index.get(key).map(|i| &self.flags[*i])
    }

    pub fn flags(&self) -> &[FeatureFlagDefinition] {
        &self.flags
    }
}

fn validate_experiment(experiment: &ExperimentDefinition) -> SplitSiteResult<()> {
    if experiment.key.trim().is_empty() {
        return Err(SplitSiteError::Config("experiment with empty key".into()));
    }

    let mut seen = HashSet::new();
    for variant in &experiment.variants {
        if !seen.insert(variant.name.as_str()) {
            return Err(SplitSiteError::Config(format!(
                "experiment '{}' declares variant '{}' twice",
                experiment.key, variant.name
            )));
        }
    }

    let total = experiment.total_weight();
    if total != BUCKET_COUNT {
        warn!(
            experiment = %experiment.key,
            total_weight = total,
            "Allocation does not total 100; uncovered buckets fall back to control"
        );
    }
    if experiment.control_variant().is_none() {
        warn!(
            experiment = %experiment.key,
            control = %experiment.control,
            "Control variant not declared; degraded paths return no value"
        );
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use splitsite_core::types::VariantDefinition;

    fn experiment(key: &str, variants: &[&str]) -> ExperimentDefinition {
        ExperimentDefinition {
            key: key.into(),
            name: String::new(),
            description: None,
            active: true,
            control: "control".into(),
            variants: variants
                .iter()
                .map(|name| VariantDefinition {
                    name: name.to_string(),
                    value: json!(name),
                    weight: 50,
                })
                .collect(),
        }
    }

    fn flag(key: &str) -> FeatureFlagDefinition {
        FeatureFlagDefinition {
            key: key.into(),
            description: None,
            default: false,
        }
    }

    #[test]
    fn test_lookup_preserves_order() {
        let catalog = ExperimentCatalog::new(
            vec![
                experiment("b_exp", &["control", "x"]),
                experiment("a_exp", &["control", "y"]),
            ],
            vec![flag("beta")],
        )
        .unwrap();

        assert_eq!(catalog.experiments()[0].key, "b_exp");
        assert!(catalog.experiment("a_exp").is_some());
        assert!(catalog.experiment("missing").is_none());
        assert!(catalog.flag("beta").is_some());
    }

    #[test]
    fn test_rejects_duplicates() {
        let dup_exp = ExperimentCatalog::new(
            vec![experiment("hero", &["control"]), experiment("hero", &["control"])],
            vec![],
        );
        assert!(matches!(dup_exp, Err(SplitSiteError::Config(_))));

        let dup_variant = ExperimentCatalog::new(vec![experiment("hero", &["a", "a"])], vec![]);
        assert!(matches!(dup_variant, Err(SplitSiteError::Config(_))));

        let dup_flag = ExperimentCatalog::new(vec![], vec![flag("beta"), flag("beta")]);
        assert!(matches!(dup_flag, Err(SplitSiteError::Config(_))));
    }

    #[test]
    fn test_example_catalog_loads() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../config/catalog.example.toml");
        let config = AppConfig::load(Some(path.as_path())).unwrap();
        let catalog = ExperimentCatalog::from_config(&config).unwrap();

        assert_eq!(catalog.experiments().len(), 3);
        let pricing = catalog.experiment("pricing_cta").unwrap();
        assert_eq!(pricing.total_weight(), 100);
        assert_eq!(pricing.control_variant().unwrap().value, json!("Book a call"));
        assert!(!catalog.experiment("checkout_layout").unwrap().active);
        assert!(catalog.flag("show_testimonials").unwrap().default);
    }

    #[test]
    fn test_overflowing_weights_are_accepted() {
        let mut exp = experiment("hero", &["control", "a"]);
        exp.variants[0].weight = u32::MAX;
        exp.variants[1].weight = 1;
        assert_eq!(exp.total_weight(), u32::MAX);

        let catalog = ExperimentCatalog::new(vec![exp], vec![]).unwrap();
        assert!(catalog.experiment("hero").is_some());
    }

    #[test]
    fn test_misallocation_is_accepted() {
        // 3 x 50 = 150: tail unreachable, but not a load error.
        let catalog =
            ExperimentCatalog::new(vec![experiment("hero", &["control", "a", "b"])], vec![]);
        assert!(catalog.is_ok());
    }
}
