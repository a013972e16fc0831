//! Validation-gate configuration.
//!
//! Layout of the JSON file:
//!
//! ```json
//! {
//!   "default": {"min_quality": 0.5, "min_confidence": 0.6, "max_transition_rate": 0.2},
//!   "domains": {"realestate": {"min_quality": 0.4}, "energy": {"max_novelty": 0.9}}
//! }
//! ```
//!
//! Thresholds are safety-critical, so a missing file is an error at load time
//! rather than a silent default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gate::Domain;
use crate::numeric::lenient;

/// Errors from loading required configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required configuration file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration ({what}): {reason}")]
    Parse { what: String, reason: String },
}

/// Read a configuration file that must exist.
pub fn read_required(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// One block of raw thresholds as written in the file.
///
/// Each field is `None` when the key is absent and `Some(None)` when the key
/// is present but not a finite number, so a domain block can switch off a
/// default threshold by setting it to `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBlock {
    #[serde(
        default,
        deserialize_with = "lenient::present_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_quality: Option<Option<f64>>,
    #[serde(
        default,
        deserialize_with = "lenient::present_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_confidence: Option<Option<f64>>,
    #[serde(
        default,
        deserialize_with = "lenient::present_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_transition_rate: Option<Option<f64>>,
    #[serde(
        default,
        deserialize_with = "lenient::present_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_novelty: Option<Option<f64>>,
}

impl ThresholdBlock {
    /// Key-by-key merge where keys present in `over` win.
    fn overridden_by(&self, over: &ThresholdBlock) -> ThresholdBlock {
        ThresholdBlock {
            min_quality: over.min_quality.or(self.min_quality),
            min_confidence: over.min_confidence.or(self.min_confidence),
            max_transition_rate: over.max_transition_rate.or(self.max_transition_rate),
            max_novelty: over.max_novelty.or(self.max_novelty),
        }
    }

    fn resolve(&self) -> GateThresholds {
        GateThresholds {
            min_quality: self.min_quality.flatten(),
            min_confidence: self.min_confidence.flatten(),
            max_transition_rate: self.max_transition_rate.flatten(),
            max_novelty: self.max_novelty.flatten(),
        }
    }
}

/// Thresholds actually enforced for one evaluation.
///
/// Only finite values survive resolution; serialization omits unset keys so
/// the output doubles as the audit trail of what was enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_transition_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_novelty: Option<f64>,
}

/// Default thresholds plus per-domain overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub default: ThresholdBlock,
    #[serde(default)]
    pub domains: BTreeMap<String, ThresholdBlock>,
}

impl GateConfig {
    /// Load the gate configuration from a JSON file. The file must exist.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read_required(path)?;
        Self::from_json(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                what: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse the gate configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            what: "gate config".into(),
            reason: e.to_string(),
        })
    }

    /// Resolve the thresholds for a domain: defaults overridden by the
    /// domain's block.
    pub fn thresholds_for(&self, domain: Domain) -> GateThresholds {
        match self.domains.get(domain.as_str()) {
            Some(block) => self.default.overridden_by(block).resolve(),
            None => self.default.resolve(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "default": {"min_quality": 0.5, "min_confidence": 0.6, "max_transition_rate": 0.3},
        "domains": {
            "realestate": {"min_quality": 0.35, "max_transition_rate": null},
            "energy": {"max_novelty": "0.9"}
        }
    }"#;

    #[test]
    fn default_block_applies_to_finance() {
        let config = GateConfig::from_json(SAMPLE).unwrap();
        let t = config.thresholds_for(Domain::Finance);
        assert_eq!(t.min_quality, Some(0.5));
        assert_eq!(t.min_confidence, Some(0.6));
        assert_eq!(t.max_transition_rate, Some(0.3));
        assert_eq!(t.max_novelty, None);
    }

    #[test]
    fn domain_keys_win_including_explicit_null() {
        let config = GateConfig::from_json(SAMPLE).unwrap();
        let t = config.thresholds_for(Domain::RealEstate);
        assert_eq!(t.min_quality, Some(0.35));
        assert_eq!(t.min_confidence, Some(0.6));
        assert_eq!(t.max_transition_rate, None);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let config = GateConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.thresholds_for(Domain::Energy).max_novelty, Some(0.9));
    }

    #[test]
    fn resolved_thresholds_omit_unset_keys() {
        let config = GateConfig::from_json(SAMPLE).unwrap();
        let json = serde_json::to_value(config.thresholds_for(Domain::RealEstate)).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("min_quality"));
        assert!(!obj.contains_key("max_transition_rate"));
        assert!(!obj.contains_key("max_novelty"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = GateConfig::from_file(&tmp.path().join("validation_gates.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("validation_gates.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = GateConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
