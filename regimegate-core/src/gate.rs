//! Per-asset validation gate.
//!
//! Converts one asset's quality / confidence / transition-rate / novelty
//! metrics into a `validated` or `inconclusive` verdict with ordered reason
//! codes. Missing metrics are never an error: they surface as `*_missing`
//! reasons so a snapshot row always gets a verdict.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::config::{GateConfig, GateThresholds};
use crate::numeric::{finite, parse_finite_real};

const REAL_ESTATE_GROUPS: &[&str] = &["realestate", "imobiliario", "real_estate"];
const ENERGY_GROUPS: &[&str] = &["energy", "ons_grid", "logistics_energy"];
const REAL_ESTATE_PREFIX: &str = "RE_";

/// Asset domain, used to pick the domain-specific threshold block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Finance,
    RealEstate,
    Energy,
}

impl Domain {
    /// Infer the domain from the asset identifier and its group.
    ///
    /// Real estate wins over energy; anything unrecognised is finance.
    pub fn resolve(asset: &str, group: Option<&str>) -> Self {
        let group = group.map(|g| g.trim().to_lowercase()).unwrap_or_default();
        if REAL_ESTATE_GROUPS.contains(&group.as_str()) || asset.starts_with(REAL_ESTATE_PREFIX) {
            Domain::RealEstate
        } else if ENERGY_GROUPS.contains(&group.as_str()) {
            Domain::Energy
        } else {
            Domain::Finance
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Finance => "finance",
            Domain::RealEstate => "realestate",
            Domain::Energy => "energy",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of a single gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Validated,
    Inconclusive,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Validated => "validated",
            SignalStatus::Inconclusive => "inconclusive",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Violation codes, emitted in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    QualityMissing,
    QualityBelowGate,
    ConfidenceMissing,
    ConfidenceBelowGate,
    TransitionRateAboveGate,
    NoveltyAboveGate,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::QualityMissing => "quality_missing",
            GateReason::QualityBelowGate => "quality_below_gate",
            GateReason::ConfidenceMissing => "confidence_missing",
            GateReason::ConfidenceBelowGate => "confidence_below_gate",
            GateReason::TransitionRateAboveGate => "transition_rate_above_gate",
            GateReason::NoveltyAboveGate => "novelty_above_gate",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric inputs for one asset. Every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GateMetrics {
    pub quality: Option<f64>,
    pub confidence: Option<f64>,
    pub transition_rate: Option<f64>,
    pub novelty: Option<f64>,
}

impl GateMetrics {
    /// Read metrics from a loosely typed record (snapshot row, API payload).
    ///
    /// Keys that are absent, null, non-numeric or non-finite become `None`.
    pub fn from_json(record: &Value) -> Self {
        let get = |key: &str| record.get(key).and_then(parse_finite_real);
        Self {
            quality: get("quality"),
            confidence: get("confidence"),
            transition_rate: get("transition_rate"),
            novelty: get("novelty"),
        }
    }
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub status: SignalStatus,
    pub domain: Domain,
    pub quality: Option<f64>,
    pub confidence: Option<f64>,
    pub transition_rate: Option<f64>,
    pub novelty: Option<f64>,
    pub reasons: Vec<GateReason>,
    pub thresholds: GateThresholds,
}

impl GateResult {
    pub fn is_validated(&self) -> bool {
        self.status == SignalStatus::Validated
    }

    /// Reasons joined with `;`, the form stored in the snapshot `reason` column.
    pub fn reason_string(&self) -> String {
        self.reasons
            .iter()
            .map(GateReason::as_str)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Evaluate one asset against the domain-specific thresholds in `config`.
///
/// Never fails: non-finite metric values are treated as missing.
pub fn evaluate_gate(
    asset: &str,
    group: Option<&str>,
    metrics: &GateMetrics,
    config: &GateConfig,
) -> GateResult {
    let domain = Domain::resolve(asset, group);
    let thresholds = config.thresholds_for(domain);

    let quality = metrics.quality.and_then(finite);
    let confidence = metrics.confidence.and_then(finite);
    let transition_rate = metrics.transition_rate.and_then(finite);
    let novelty = metrics.novelty.and_then(finite);

    let mut reasons = Vec::new();

    match quality {
        None => reasons.push(GateReason::QualityMissing),
        Some(q) if q < thresholds.min_quality.unwrap_or(0.0) => {
            reasons.push(GateReason::QualityBelowGate)
        }
        Some(_) => {}
    }

    match confidence {
        None => reasons.push(GateReason::ConfidenceMissing),
        Some(c) if c < thresholds.min_confidence.unwrap_or(0.0) => {
            reasons.push(GateReason::ConfidenceBelowGate)
        }
        Some(_) => {}
    }

    if let (Some(limit), Some(rate)) = (thresholds.max_transition_rate, transition_rate) {
        if rate > limit {
            reasons.push(GateReason::TransitionRateAboveGate);
        }
    }

    if let (Some(limit), Some(n)) = (thresholds.max_novelty, novelty) {
        if n > limit {
            reasons.push(GateReason::NoveltyAboveGate);
        }
    }

    let status = if reasons.is_empty() {
        SignalStatus::Validated
    } else {
        SignalStatus::Inconclusive
    };

    tracing::debug!(asset, %domain, %status, reasons = reasons.len(), "gate evaluated");

    GateResult {
        status,
        domain,
        quality,
        confidence,
        transition_rate,
        novelty,
        reasons,
        thresholds,
    }
}
