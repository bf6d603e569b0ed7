use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Per-disruption overrides of the safety nets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnsafemodeSpec {
    #[serde(default)]
    pub disable_all: bool,
    #[serde(default)]
    pub disable_count_too_large: bool,
    #[serde(default)]
    pub disable_neither_host_nor_port: bool,
    #[serde(default)]
    pub allow_root_disk_failure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<UnsafemodeConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnsafemodeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_too_large: Option<CountTooLargeConfig>,
}

/// Thresholds are integer percentages in `[1, 100]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountTooLargeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_threshold: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_threshold: Option<i32>,
}

// === impl UnsafemodeSpec ===

impl UnsafemodeSpec {
    pub fn count_too_large(&self) -> Option<&CountTooLargeConfig> {
        self.config.as_ref()?.count_too_large.as_ref()
    }

    /// Reports every threshold override outside of `[1, 100]`.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(config) = self.count_too_large() {
            for (name, value) in [
                ("namespaceThreshold", config.namespace_threshold),
                ("clusterThreshold", config.cluster_threshold),
            ] {
                if let Some(v) = value.filter(|v| !(1..=100).contains(v)) {
                    errors.push(format!(
                        "config.countTooLarge.{name} must be an integer percentage between 1 and 100, got {v}"
                    ));
                }
            }
        }
        errors
    }
}

// === impl CountTooLargeConfig ===

impl CountTooLargeConfig {
    /// Converts the overrides to fractions, falling back to the given
    /// defaults.
    pub fn fractions(&self, namespace: f64, cluster: f64) -> (f64, f64) {
        let frac = |v: Option<i32>, default| v.map_or(default, |v| f64::from(v) / 100.0);
        (
            frac(self.namespace_threshold, namespace),
            frac(self.cluster_threshold, cluster),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_thresholds(namespace: Option<i32>, cluster: Option<i32>) -> UnsafemodeSpec {
        UnsafemodeSpec {
            config: Some(UnsafemodeConfig {
                count_too_large: Some(CountTooLargeConfig {
                    namespace_threshold: namespace,
                    cluster_threshold: cluster,
                }),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn thresholds_must_be_percentages() {
        assert!(UnsafemodeSpec::default().validate().is_empty());
        assert!(with_thresholds(Some(1), Some(100)).validate().is_empty());
        assert_eq!(with_thresholds(Some(0), Some(101)).validate().len(), 2);
    }

    #[test]
    fn thresholds_convert_to_fractions() {
        let spec = with_thresholds(Some(50), None);
        let fractions = spec
            .count_too_large()
            .map(|c| c.fractions(0.8, 0.66));
        assert_eq!(fractions, Some((0.5, 0.66)));
    }
}
