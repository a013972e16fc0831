//! Status aggregation: eight check artifacts → one global pass/fail.
//!
//! The verdict is fully recomputed on every run. Each check has its own
//! success predicate; the run passes only when all eight hold.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact;
use crate::checks::{CheckArtifact, CheckArtifacts, CheckKind};
use crate::layout::PipelineConfig;
use crate::report::MarkdownStatusReport;

/// Minimum robustness stability score.
pub const MIN_STABILITY_SCORE: f64 = 0.55;

/// Minimum share of universe assets processed successfully.
pub const MIN_UNIVERSE_SUCCESS_RATE: f64 = 0.80;

/// Notes are capped at this many lines.
pub const MAX_NOTES: usize = 5;

pub const ALL_PASSED_NOTE: &str = "all gates passed in the current run";

/// Standing playbook, identical on every run.
pub const NEXT_ACTIONS: [&str; 5] = [
    "re-run sanity checks against the latest data pull",
    "review robustness stability and placebo gap before trusting new signals",
    "extend universe coverage for assets that failed processing",
    "re-run synthetic stress and ablation after any model change",
    "confirm drift guardrails and the deployment gate before publishing",
];

// ─── Payload ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Pass,
    Fail,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Pass => "pass",
            OverallStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The eight named check outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateChecks {
    pub sanity_ok: bool,
    pub robustness_ok: bool,
    pub placebo_ok: bool,
    pub universe_ok: bool,
    pub synthetic_stress_ok: bool,
    pub ablation_ok: bool,
    pub adaptive_gates_ok: bool,
    pub risk_utility_ok: bool,
}

impl GateChecks {
    pub fn get(&self, kind: CheckKind) -> bool {
        match kind {
            CheckKind::Sanity => self.sanity_ok,
            CheckKind::Robustness => self.robustness_ok,
            CheckKind::Placebo => self.placebo_ok,
            CheckKind::Universe => self.universe_ok,
            CheckKind::SyntheticStress => self.synthetic_stress_ok,
            CheckKind::Ablation => self.ablation_ok,
            CheckKind::AdaptiveGates => self.adaptive_gates_ok,
            CheckKind::RiskUtility => self.risk_utility_ok,
        }
    }

    fn set(&mut self, kind: CheckKind, value: bool) {
        let slot = match kind {
            CheckKind::Sanity => &mut self.sanity_ok,
            CheckKind::Robustness => &mut self.robustness_ok,
            CheckKind::Placebo => &mut self.placebo_ok,
            CheckKind::Universe => &mut self.universe_ok,
            CheckKind::SyntheticStress => &mut self.synthetic_stress_ok,
            CheckKind::Ablation => &mut self.ablation_ok,
            CheckKind::AdaptiveGates => &mut self.adaptive_gates_ok,
            CheckKind::RiskUtility => &mut self.risk_utility_ok,
        };
        *slot = value;
    }

    pub fn all_pass(&self) -> bool {
        CheckKind::ALL.iter().all(|kind| self.get(*kind))
    }

    /// Failing checks in reporting order.
    pub fn failing(&self) -> Vec<CheckKind> {
        CheckKind::ALL
            .into_iter()
            .filter(|kind| !self.get(*kind))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusScores {
    pub stability_score: f64,
    pub universe_success_rate: f64,
    /// Original minus shuffled mean quality; `None` if either side is missing.
    pub placebo_gap_quality: Option<f64>,
    pub risk_utility_drawdown_avoidance: Option<f64>,
}

/// Contents of `STATUS.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: OverallStatus,
    pub generated_at: String,
    pub gate_checks: GateChecks,
    pub scores: StatusScores,
    pub notes: Vec<String>,
    pub next_actions: Vec<String>,
}

impl StatusPayload {
    pub fn passed(&self) -> bool {
        self.status == OverallStatus::Pass
    }
}

// ─── Predicates ──────────────────────────────────────────────────────

fn universe_success_rate(artifact: &CheckArtifact) -> f64 {
    let ok = artifact.number("ok_count").unwrap_or(0.0);
    let total = artifact.number("total_count").unwrap_or(0.0);
    if total == 0.0 {
        0.0
    } else {
        ok / total
    }
}

fn placebo_gap(artifact: &CheckArtifact) -> Option<f64> {
    let original = artifact.nested_number("evaluation", "original_mean_quality")?;
    let shuffled = artifact.nested_number("evaluation", "shuffled_mean_quality")?;
    Some(original - shuffled)
}

fn check_passes(kind: CheckKind, artifact: &CheckArtifact, scores: &StatusScores) -> bool {
    match kind {
        CheckKind::Sanity | CheckKind::AdaptiveGates | CheckKind::RiskUtility => {
            artifact.status_is("ok")
        }
        CheckKind::Robustness => {
            artifact.status_is("ok") && scores.stability_score >= MIN_STABILITY_SCORE
        }
        CheckKind::Placebo => {
            artifact.status_is("ok")
                && artifact
                    .nested_str("evaluation", "verdict")
                    .map(|v| v.trim().eq_ignore_ascii_case("pass"))
                    .unwrap_or(false)
        }
        CheckKind::Universe => {
            artifact.status_is("ok") && scores.universe_success_rate >= MIN_UNIVERSE_SUCCESS_RATE
        }
        CheckKind::SyntheticStress => artifact.status_is("pass"),
        CheckKind::Ablation => artifact.status_is_ignore_case("ok"),
    }
}

// ─── Aggregation ─────────────────────────────────────────────────────

/// Compute the global verdict from the eight artifacts.
pub fn aggregate_status(artifacts: &CheckArtifacts) -> StatusPayload {
    let robustness = artifacts.get(CheckKind::Robustness);
    let universe = artifacts.get(CheckKind::Universe);
    let scores = StatusScores {
        stability_score: robustness.number("stability_score").unwrap_or(0.0),
        universe_success_rate: universe_success_rate(&universe),
        placebo_gap_quality: placebo_gap(&artifacts.get(CheckKind::Placebo)),
        risk_utility_drawdown_avoidance: artifacts
            .get(CheckKind::RiskUtility)
            .number("drawdown_avoidance"),
    };

    let mut gate_checks = GateChecks::default();
    for kind in CheckKind::ALL {
        gate_checks.set(kind, check_passes(kind, &artifacts.get(kind), &scores));
    }

    let failing = gate_checks.failing();
    let status = if failing.is_empty() {
        OverallStatus::Pass
    } else {
        OverallStatus::Fail
    };
    let notes = if failing.is_empty() {
        vec![ALL_PASSED_NOTE.to_string()]
    } else {
        failing
            .iter()
            .take(MAX_NOTES)
            .map(|kind| kind.failure_note().to_string())
            .collect()
    };

    StatusPayload {
        status,
        generated_at: Utc::now().to_rfc3339(),
        gate_checks,
        scores,
        notes,
        next_actions: NEXT_ACTIONS.iter().map(|s| s.to_string()).collect(),
    }
}

/// Pipeline stage writing `STATUS.json` and `STATUS.md`.
pub struct StatusAggregator<'a> {
    layout: &'a PipelineConfig,
}

impl<'a> StatusAggregator<'a> {
    pub fn new(layout: &'a PipelineConfig) -> Self {
        Self { layout }
    }

    pub fn run(&self) -> Result<StatusPayload> {
        let artifacts = CheckArtifacts::load(self.layout);
        let payload = aggregate_status(&artifacts);

        artifact::write_json(&self.layout.status_json(), &payload)?;
        artifact::write_text(
            &self.layout.status_markdown(),
            &MarkdownStatusReport.generate(&payload),
        )?;

        tracing::info!(
            status = %payload.status,
            failing = payload.gate_checks.failing().len(),
            path = %self.layout.status_json().display(),
            "status aggregated"
        );
        Ok(payload)
    }
}
