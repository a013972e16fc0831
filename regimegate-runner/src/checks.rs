//! The eight upstream check artifacts consumed by the status aggregator.
//!
//! Each check is produced by an independent stage. Only the artifact contract
//! matters here: a JSON object with at least `status`, plus check-specific
//! metrics. A missing, corrupt or non-object artifact is an empty record.

use regimegate_core::numeric::parse_finite_real;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::artifact;
use crate::layout::PipelineConfig;

/// Named validation checks, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CheckKind {
    Sanity,
    Robustness,
    Placebo,
    Universe,
    SyntheticStress,
    Ablation,
    AdaptiveGates,
    RiskUtility,
}

impl CheckKind {
    pub const ALL: [CheckKind; 8] = [
        CheckKind::Sanity,
        CheckKind::Robustness,
        CheckKind::Placebo,
        CheckKind::Universe,
        CheckKind::SyntheticStress,
        CheckKind::Ablation,
        CheckKind::AdaptiveGates,
        CheckKind::RiskUtility,
    ];

    /// Key of this check in `STATUS.json`'s `gate_checks`.
    pub fn key(&self) -> &'static str {
        match self {
            CheckKind::Sanity => "sanity_ok",
            CheckKind::Robustness => "robustness_ok",
            CheckKind::Placebo => "placebo_ok",
            CheckKind::Universe => "universe_ok",
            CheckKind::SyntheticStress => "synthetic_stress_ok",
            CheckKind::Ablation => "ablation_ok",
            CheckKind::AdaptiveGates => "adaptive_gates_ok",
            CheckKind::RiskUtility => "risk_utility_ok",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckKind::Sanity => "sanity",
            CheckKind::Robustness => "robustness",
            CheckKind::Placebo => "placebo",
            CheckKind::Universe => "universe coverage",
            CheckKind::SyntheticStress => "synthetic stress",
            CheckKind::Ablation => "ablation",
            CheckKind::AdaptiveGates => "adaptive gates",
            CheckKind::RiskUtility => "risk utility",
        }
    }

    /// Note emitted when this check fails.
    pub fn failure_note(&self) -> &'static str {
        match self {
            CheckKind::Sanity => "sanity_ok=false: sanity checks missing or not ok",
            CheckKind::Robustness => {
                "robustness_ok=false: robustness not ok or stability_score below 0.55"
            }
            CheckKind::Placebo => "placebo_ok=false: placebo test missing or verdict not pass",
            CheckKind::Universe => {
                "universe_ok=false: universe coverage not ok or success rate below 0.80"
            }
            CheckKind::SyntheticStress => "synthetic_stress_ok=false: synthetic stress did not pass",
            CheckKind::Ablation => "ablation_ok=false: ablation study missing or not ok",
            CheckKind::AdaptiveGates => "adaptive_gates_ok=false: adaptive gates missing or not ok",
            CheckKind::RiskUtility => "risk_utility_ok=false: risk utility missing or not ok",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One check's artifact as a loosely typed record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckArtifact {
    fields: Map<String, Value>,
}

impl CheckArtifact {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build from any JSON value; non-objects become an empty record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `status` as written, `None` if absent or not a string.
    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    pub fn status_is(&self, expected: &str) -> bool {
        self.status() == Some(expected)
    }

    pub fn status_is_ignore_case(&self, expected: &str) -> bool {
        self.status()
            .map(|s| s.trim().eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }

    /// Top-level numeric field, coerced to a finite real.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(parse_finite_real)
    }

    /// Field inside a nested object, falling back to the top level.
    pub fn nested(&self, section: &str, key: &str) -> Option<&Value> {
        self.fields
            .get(section)
            .and_then(|s| s.get(key))
            .or_else(|| self.fields.get(key))
    }

    pub fn nested_number(&self, section: &str, key: &str) -> Option<f64> {
        self.nested(section, key).and_then(parse_finite_real)
    }

    pub fn nested_str(&self, section: &str, key: &str) -> Option<&str> {
        self.nested(section, key).and_then(Value::as_str)
    }
}

/// All eight artifacts for one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct CheckArtifacts {
    artifacts: BTreeMap<CheckKind, CheckArtifact>,
}

impl CheckArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every check artifact from its layout path.
    pub fn load(layout: &PipelineConfig) -> Self {
        let mut artifacts = BTreeMap::new();
        for kind in CheckKind::ALL {
            let path = layout.check_path(kind);
            let artifact = CheckArtifact::new(artifact::read_object(&path));
            if artifact.is_empty() {
                tracing::debug!(check = %kind, path = %path.display(), "check artifact empty");
            }
            artifacts.insert(kind, artifact);
        }
        Self { artifacts }
    }

    pub fn with(mut self, kind: CheckKind, value: Value) -> Self {
        self.artifacts.insert(kind, CheckArtifact::from_value(value));
        self
    }

    /// Artifact for `kind`; an absent one reads as empty.
    pub fn get(&self, kind: CheckKind) -> CheckArtifact {
        self.artifacts.get(&kind).cloned().unwrap_or_default()
    }
}
