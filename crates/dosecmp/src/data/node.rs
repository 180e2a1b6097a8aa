//! Persisted dose comparison parameters
//!
//! Field names follow the host scene attribute names so that node files
//! exported from the planning system can be read directly, e.g.
//!
//! ```yaml
//! ReferenceDoseVolumeNodeId: plan_dose
//! CompareDoseVolumeNodeId: delivered_dose
//! GammaDoseVolumeNodeId: gamma
//! DtaDistanceToleranceMm: 3.0
//! DoseDifferenceTolerancePercent: 3.0
//! ReferenceDoseGy: 0.0
//! AnalysisThresholdPercent: 10.0
//! MaximumGamma: 2.0
//! ```

use dosecmp_core::DoseComparisonConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DoseComparisonNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_dose_volume_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_dose_volume_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma_dose_volume_node_id: Option<String>,

    #[serde(default = "default_dta_tolerance")]
    pub dta_distance_tolerance_mm: f64,
    #[serde(default = "default_dose_difference_tolerance")]
    pub dose_difference_tolerance_percent: f64,
    #[serde(default)]
    pub reference_dose_gy: f64,
    #[serde(default)]
    pub analysis_threshold_percent: f64,
    #[serde(default = "default_maximum_gamma")]
    pub maximum_gamma: f64,
}

fn default_dta_tolerance() -> f64 {
    DoseComparisonConfig::default().dta_tolerance_mm
}

fn default_dose_difference_tolerance() -> f64 {
    DoseComparisonConfig::default().dose_difference_tolerance_percent
}

fn default_maximum_gamma() -> f64 {
    DoseComparisonConfig::default().maximum_gamma
}

impl Default for DoseComparisonNode {
    fn default() -> Self {
        Self::from_config(&DoseComparisonConfig::default())
    }
}

impl DoseComparisonNode {
    /// A node carrying `config` and no volume references
    #[must_use]
    pub fn from_config(config: &DoseComparisonConfig) -> Self {
        Self {
            reference_dose_volume_node_id: None,
            compare_dose_volume_node_id: None,
            gamma_dose_volume_node_id: None,
            dta_distance_tolerance_mm: config.dta_tolerance_mm,
            dose_difference_tolerance_percent: config.dose_difference_tolerance_percent,
            reference_dose_gy: config.reference_dose_gy,
            analysis_threshold_percent: config.analysis_threshold_percent,
            maximum_gamma: config.maximum_gamma,
        }
    }

    /// The numeric tolerances as an engine configuration
    #[must_use]
    pub fn to_config(&self) -> DoseComparisonConfig {
        DoseComparisonConfig {
            dta_tolerance_mm: self.dta_distance_tolerance_mm,
            dose_difference_tolerance_percent: self.dose_difference_tolerance_percent,
            reference_dose_gy: self.reference_dose_gy,
            analysis_threshold_percent: self.analysis_threshold_percent,
            maximum_gamma: self.maximum_gamma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_host_attribute_names() {
        let yaml = "\
ReferenceDoseVolumeNodeId: plan
CompareDoseVolumeNodeId: measured
GammaDoseVolumeNodeId: gamma
DtaDistanceToleranceMm: 2.0
DoseDifferenceTolerancePercent: 2.5
ReferenceDoseGy: 60.0
AnalysisThresholdPercent: 10.0
MaximumGamma: 3.0
";
        let node: DoseComparisonNode = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(node.reference_dose_volume_node_id.as_deref(), Some("plan"));
        assert_eq!(node.compare_dose_volume_node_id.as_deref(), Some("measured"));
        assert_eq!(node.gamma_dose_volume_node_id.as_deref(), Some("gamma"));

        let config = node.to_config();
        assert_eq!(config.dta_tolerance_mm, 2.0);
        assert_eq!(config.dose_difference_tolerance_percent, 2.5);
        assert_eq!(config.reference_dose_gy, 60.0);
        assert_eq!(config.analysis_threshold_percent, 10.0);
        assert_eq!(config.maximum_gamma, 3.0);
    }

    #[test]
    fn test_missing_attributes_take_defaults() {
        let node: DoseComparisonNode =
            serde_json::from_str(r#"{"ReferenceDoseVolumeNodeId": "plan"}"#).unwrap();
        assert_eq!(node.to_config(), DoseComparisonConfig::default());
        assert!(node.gamma_dose_volume_node_id.is_none());
    }

    #[test]
    fn test_serializes_with_host_attribute_names() {
        let node = DoseComparisonNode {
            gamma_dose_volume_node_id: Some("gamma".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"GammaDoseVolumeNodeId\":\"gamma\""));
        assert!(json.contains("\"DtaDistanceToleranceMm\":3.0"));
        assert!(!json.contains("ReferenceDoseVolumeNodeId"));
    }
}
