//! Drift guard: compare the two latest runs and block deployment on
//! regression.
//!
//! Three aggregate metrics are compared (stability score, universe success
//! rate, validated-signal ratio). A drop strictly greater than its guardrail
//! blocks deployment. The decision is written to `diff_summary.json` and
//! merged into the current snapshot's `summary.json` under `deployment_gate`.

use anyhow::{Context, Result};
use chrono::Utc;
use regimegate_core::config::{read_required, ConfigError};
use regimegate_core::numeric::{lenient, parse_finite_real};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::artifact;
use crate::layout::PipelineConfig;
use crate::snapshot::{latest_runs, RunSnapshot, SnapshotRow};

pub const DAILY_SUMMARY_FILE: &str = "daily_summary.json";
pub const INSUFFICIENT_HISTORY: &str = "need_at_least_two_runs_for_diff";

/// Key under which the drift decision is merged into `summary.json`.
pub const DEPLOYMENT_GATE_KEY: &str = "deployment_gate";

// ─── Guardrails ──────────────────────────────────────────────────────

/// Maximum tolerated drop per metric between consecutive runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftGuardrails {
    pub max_stability_drop: f64,
    pub max_success_rate_drop: f64,
    pub max_valid_signal_ratio_drop: f64,
}

impl Default for DriftGuardrails {
    fn default() -> Self {
        Self {
            max_stability_drop: 0.08,
            max_success_rate_drop: 0.10,
            max_valid_signal_ratio_drop: 0.15,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawGuardrails {
    #[serde(default, deserialize_with = "lenient::number")]
    max_stability_drop: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    max_success_rate_drop: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    max_valid_signal_ratio_drop: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ProtocolFile {
    #[serde(default)]
    drift_guardrails: RawGuardrails,
}

impl DriftGuardrails {
    /// Parse the `drift_guardrails` block of a protocol document.
    ///
    /// Absent or non-numeric keys take their defaults.
    pub fn from_protocol_json(content: &str) -> Result<Self, ConfigError> {
        let protocol: ProtocolFile = serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            what: "protocol config".into(),
            reason: e.to_string(),
        })?;
        let raw = protocol.drift_guardrails;
        let defaults = Self::default();
        Ok(Self {
            max_stability_drop: raw.max_stability_drop.unwrap_or(defaults.max_stability_drop),
            max_success_rate_drop: raw
                .max_success_rate_drop
                .unwrap_or(defaults.max_success_rate_drop),
            max_valid_signal_ratio_drop: raw
                .max_valid_signal_ratio_drop
                .unwrap_or(defaults.max_valid_signal_ratio_drop),
        })
    }

    /// Load guardrails from the protocol file.
    ///
    /// The protocol file is optional: when it does not exist the defaults
    /// apply. A file that exists but does not parse is an error.
    pub fn from_protocol_file(path: &Path) -> Result<Self, ConfigError> {
        match read_required(path) {
            Ok(content) => Self::from_protocol_json(&content).map_err(|e| match e {
                ConfigError::Parse { reason, .. } => ConfigError::Parse {
                    what: path.display().to_string(),
                    reason,
                },
                other => other,
            }),
            Err(ConfigError::Missing { .. }) => {
                tracing::warn!(path = %path.display(), "protocol config missing, default guardrails apply");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }
}

// ─── Per-asset diff ──────────────────────────────────────────────────

/// One asset's change between the previous and current run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetChange {
    pub asset: String,
    pub in_prev: bool,
    pub in_cur: bool,
    pub prev_signal_status: Option<String>,
    pub cur_signal_status: Option<String>,
    pub prev_regime: Option<String>,
    pub cur_regime: Option<String>,
    pub status_changed: bool,
    pub regime_changed: bool,
    pub confidence_delta: Option<f64>,
    pub quality_delta: Option<f64>,
}

fn delta(prev: Option<f64>, cur: Option<f64>) -> Option<f64> {
    match (prev, cur) {
        (Some(p), Some(c)) => Some(c - p),
        _ => None,
    }
}

/// Outer join of two per-asset tables on `asset`, sorted by asset.
///
/// An absent side compares as `None`, so an asset that appears or
/// disappears with a status counts as a status change.
pub fn diff_assets(prev: &[SnapshotRow], cur: &[SnapshotRow]) -> Vec<AssetChange> {
    let mut joined: BTreeMap<&str, (Option<&SnapshotRow>, Option<&SnapshotRow>)> = BTreeMap::new();
    for row in prev {
        joined.entry(row.asset.as_str()).or_default().0 = Some(row);
    }
    for row in cur {
        joined.entry(row.asset.as_str()).or_default().1 = Some(row);
    }

    joined
        .into_iter()
        .map(|(asset, (p, c))| {
            let prev_signal_status = p.and_then(|r| r.signal_status.clone());
            let cur_signal_status = c.and_then(|r| r.signal_status.clone());
            let prev_regime = p.and_then(|r| r.regime.clone());
            let cur_regime = c.and_then(|r| r.regime.clone());
            AssetChange {
                asset: asset.to_string(),
                in_prev: p.is_some(),
                in_cur: c.is_some(),
                status_changed: prev_signal_status != cur_signal_status,
                regime_changed: prev_regime != cur_regime,
                confidence_delta: delta(p.and_then(|r| r.confidence), c.and_then(|r| r.confidence)),
                quality_delta: delta(p.and_then(|r| r.quality), c.and_then(|r| r.quality)),
                prev_signal_status,
                cur_signal_status,
                prev_regime,
                cur_regime,
            }
        })
        .collect()
}

/// Counts summarising a per-asset diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub n_prev: usize,
    pub n_cur: usize,
    pub n_added: usize,
    pub n_removed: usize,
    pub n_status_changed: usize,
    pub n_regime_changed: usize,
    pub mean_confidence_delta: Option<f64>,
    pub mean_quality_delta: Option<f64>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

impl ChangeCounts {
    pub fn from_changes(changes: &[AssetChange]) -> Self {
        Self {
            n_prev: changes.iter().filter(|c| c.in_prev).count(),
            n_cur: changes.iter().filter(|c| c.in_cur).count(),
            n_added: changes.iter().filter(|c| c.in_cur && !c.in_prev).count(),
            n_removed: changes.iter().filter(|c| c.in_prev && !c.in_cur).count(),
            n_status_changed: changes.iter().filter(|c| c.status_changed).count(),
            n_regime_changed: changes.iter().filter(|c| c.regime_changed).count(),
            mean_confidence_delta: mean(changes.iter().filter_map(|c| c.confidence_delta)),
            mean_quality_delta: mean(changes.iter().filter_map(|c| c.quality_delta)),
        }
    }
}

pub fn write_diff_assets(path: &Path, changes: &[AssetChange]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for change in changes {
        writer.serialize(change)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush asset diff: {}", e.error()))?;
    let text = String::from_utf8(bytes).context("Asset diff is not UTF-8")?;
    artifact::write_text(path, &text)
}

// ─── Aggregate drift ─────────────────────────────────────────────────

/// The three aggregate metrics compared across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub stability_score: f64,
    pub universe_success_rate: f64,
    pub validated_ratio: f64,
}

impl RunMetrics {
    /// Stability and success rate from the run's daily summary (top-level
    /// key or under `scores`), validated ratio from the snapshot summary.
    /// Anything unparsable is 0.0.
    pub fn collect(daily_run: &Path, snapshot: &RunSnapshot) -> Self {
        let daily = Value::Object(artifact::read_object(&daily_run.join(DAILY_SUMMARY_FILE)));
        let metric = |key: &str| {
            daily
                .get(key)
                .or_else(|| daily.get("scores").and_then(|s| s.get(key)))
                .and_then(parse_finite_real)
                .unwrap_or(0.0)
        };
        Self {
            stability_score: metric("stability_score"),
            universe_success_rate: metric("universe_success_rate"),
            validated_ratio: snapshot.summary_metric("validated_ratio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftReason {
    StabilityDropExceedsGuardrail,
    SuccessRateDropExceedsGuardrail,
    ValidSignalRatioDropExceedsGuardrail,
}

impl DriftReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftReason::StabilityDropExceedsGuardrail => "stability_drop_exceeds_guardrail",
            DriftReason::SuccessRateDropExceedsGuardrail => "success_rate_drop_exceeds_guardrail",
            DriftReason::ValidSignalRatioDropExceedsGuardrail => {
                "valid_signal_ratio_drop_exceeds_guardrail"
            }
        }
    }
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `previous - current` per metric; positive means regression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftDrops {
    pub stability_drop: f64,
    pub success_rate_drop: f64,
    pub valid_signal_ratio_drop: f64,
}

/// Previous and current values of the compared metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftValues {
    pub prev_stability_score: f64,
    pub cur_stability_score: f64,
    pub prev_universe_success_rate: f64,
    pub cur_universe_success_rate: f64,
    pub prev_validated_ratio: f64,
    pub cur_validated_ratio: f64,
}

/// The `deployment_gate` block merged into the current snapshot summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftGate {
    pub blocked: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriftEvaluation {
    pub values: DriftValues,
    pub drops: DriftDrops,
    pub reasons: Vec<DriftReason>,
}

impl DriftEvaluation {
    pub fn blocked(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn gate(&self) -> DriftGate {
        DriftGate {
            blocked: self.blocked(),
            reasons: self.reasons.iter().map(|r| r.as_str().to_string()).collect(),
        }
    }
}

/// Compare two runs' metrics against the guardrails.
///
/// A drop exactly equal to its guardrail does not block.
pub fn evaluate_drift(prev: &RunMetrics, cur: &RunMetrics, guardrails: &DriftGuardrails) -> DriftEvaluation {
    let drops = DriftDrops {
        stability_drop: prev.stability_score - cur.stability_score,
        success_rate_drop: prev.universe_success_rate - cur.universe_success_rate,
        valid_signal_ratio_drop: prev.validated_ratio - cur.validated_ratio,
    };

    let mut reasons = Vec::new();
    if drops.stability_drop > guardrails.max_stability_drop {
        reasons.push(DriftReason::StabilityDropExceedsGuardrail);
    }
    if drops.success_rate_drop > guardrails.max_success_rate_drop {
        reasons.push(DriftReason::SuccessRateDropExceedsGuardrail);
    }
    if drops.valid_signal_ratio_drop > guardrails.max_valid_signal_ratio_drop {
        reasons.push(DriftReason::ValidSignalRatioDropExceedsGuardrail);
    }

    DriftEvaluation {
        values: DriftValues {
            prev_stability_score: prev.stability_score,
            cur_stability_score: cur.stability_score,
            prev_universe_success_rate: prev.universe_success_rate,
            cur_universe_success_rate: cur.universe_success_rate,
            prev_validated_ratio: prev.validated_ratio,
            cur_validated_ratio: cur.validated_ratio,
        },
        drops,
        reasons,
    }
}

// ─── Diff summary ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Ok,
    Fail,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffStatus::Ok => "ok",
            DiffStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDigests {
    pub prev: Option<String>,
    pub cur: Option<String>,
}

/// Contents of `diff_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub status: DiffStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub generated_at: String,
    pub prev_run: Option<String>,
    pub cur_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drops: Option<DriftDrops>,
    pub guardrails: DriftGuardrails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_gate: Option<DriftGate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_digests: Option<TableDigests>,
}

impl DiffSummary {
    fn insufficient_history(guardrails: DriftGuardrails) -> Self {
        Self {
            status: DiffStatus::Fail,
            reason: Some(INSUFFICIENT_HISTORY.to_string()),
            generated_at: Utc::now().to_rfc3339(),
            prev_run: None,
            cur_run: None,
            changes: None,
            drift: None,
            drops: None,
            guardrails,
            deployment_gate: None,
            table_digests: None,
        }
    }

    pub fn blocked(&self) -> bool {
        self.deployment_gate.as_ref().map(|g| g.blocked).unwrap_or(false)
    }
}

/// Pipeline stage comparing the two latest runs.
pub struct DriftGuard<'a> {
    layout: &'a PipelineConfig,
}

impl<'a> DriftGuard<'a> {
    pub fn new(layout: &'a PipelineConfig) -> Self {
        Self { layout }
    }

    pub fn run(&self) -> Result<DiffSummary> {
        let guardrails = DriftGuardrails::from_protocol_file(&self.layout.protocol_config())?;
        let snapshots = latest_runs(&self.layout.snapshots_root(), 2);
        let dailies = latest_runs(&self.layout.daily_root(), 2);

        let summary = match (snapshots.as_slice(), dailies.as_slice()) {
            ([prev_snap, cur_snap], [prev_daily, cur_daily]) => {
                self.compare(guardrails, prev_snap, cur_snap, prev_daily, cur_daily)?
            }
            _ => {
                tracing::warn!(
                    snapshots = snapshots.len(),
                    daily = dailies.len(),
                    "not enough runs to diff"
                );
                DiffSummary::insufficient_history(guardrails)
            }
        };

        artifact::write_json(&self.layout.diff_summary(), &summary)?;
        Ok(summary)
    }

    /// Daily summary directory for a snapshot run: the one with the same
    /// name when it exists, else the latest-by-name pick.
    fn daily_for(&self, snapshot: &Path, latest: &Path) -> PathBuf {
        let named = self.layout.daily_root().join(artifact::dir_name(snapshot));
        if named.is_dir() {
            return named;
        }
        tracing::warn!(
            run = %artifact::dir_name(snapshot),
            daily = %latest.display(),
            "no daily summary for run, comparing against latest daily summary"
        );
        latest.to_path_buf()
    }

    fn compare(
        &self,
        guardrails: DriftGuardrails,
        prev_snap: &Path,
        cur_snap: &Path,
        prev_daily: &Path,
        cur_daily: &Path,
    ) -> Result<DiffSummary> {
        let prev = RunSnapshot::load(prev_snap);
        let cur = RunSnapshot::load(cur_snap);
        let prev_daily = self.daily_for(prev_snap, prev_daily);
        let cur_daily = self.daily_for(cur_snap, cur_daily);

        let changes = diff_assets(&prev.rows, &cur.rows);
        write_diff_assets(&self.layout.diff_assets(), &changes)?;

        let evaluation = evaluate_drift(
            &RunMetrics::collect(&prev_daily, &prev),
            &RunMetrics::collect(&cur_daily, &cur),
            &guardrails,
        );
        let gate = evaluation.gate();

        artifact::merge_key(
            &cur.summary_path(),
            DEPLOYMENT_GATE_KEY,
            serde_json::to_value(&gate)?,
        )
        .with_context(|| format!("Failed to annotate run {}", cur.run_id))?;

        tracing::info!(
            prev = %prev.run_id,
            cur = %cur.run_id,
            blocked = gate.blocked,
            reasons = ?gate.reasons,
            "drift evaluated"
        );

        Ok(DiffSummary {
            status: DiffStatus::Ok,
            reason: None,
            generated_at: Utc::now().to_rfc3339(),
            table_digests: Some(TableDigests {
                prev: prev.table_digest(),
                cur: cur.table_digest(),
            }),
            prev_run: Some(prev.run_id),
            cur_run: Some(cur.run_id),
            changes: Some(ChangeCounts::from_changes(&changes)),
            drift: Some(evaluation.values),
            drops: Some(evaluation.drops),
            guardrails,
            deployment_gate: Some(gate),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(asset: &str, status: &str, regime: Option<&str>, confidence: f64) -> SnapshotRow {
        SnapshotRow {
            asset: asset.into(),
            regime: regime.map(str::to_string),
            confidence: Some(confidence),
            quality: Some(0.5),
            signal_status: Some(status.into()),
            ..SnapshotRow::default()
        }
    }

    fn metrics(stability: f64, success: f64, ratio: f64) -> RunMetrics {
        RunMetrics {
            stability_score: stability,
            universe_success_rate: success,
            validated_ratio: ratio,
        }
    }

    #[test]
    fn outer_join_flags_changes() {
        let prev = vec![
            row("SPY", "validated", Some("BULL"), 0.8),
            row("QQQ", "validated", None, 0.7),
            row("IWM", "inconclusive", Some("BEAR"), 0.4),
        ];
        let cur = vec![
            row("SPY", "inconclusive", Some("BULL"), 0.6),
            row("QQQ", "validated", None, 0.9),
            row("EEM", "validated", Some("BULL"), 0.7),
        ];
        let changes = diff_assets(&prev, &cur);
        let assets: Vec<&str> = changes.iter().map(|c| c.asset.as_str()).collect();
        assert_eq!(assets, vec!["EEM", "IWM", "QQQ", "SPY"]);

        let spy = &changes[3];
        assert!(spy.status_changed);
        assert!(!spy.regime_changed);
        assert!((spy.confidence_delta.unwrap() + 0.2).abs() < 1e-9);

        let qqq = &changes[2];
        assert!(!qqq.status_changed);
        assert!(!qqq.regime_changed);

        let eem = &changes[0];
        assert!(eem.in_cur && !eem.in_prev);
        assert_eq!(eem.confidence_delta, None);

        let counts = ChangeCounts::from_changes(&changes);
        assert_eq!(counts.n_prev, 3);
        assert_eq!(counts.n_cur, 3);
        assert_eq!(counts.n_added, 1);
        assert_eq!(counts.n_removed, 1);
        assert_eq!(counts.n_status_changed, 3);
        assert_eq!(counts.n_regime_changed, 2);
        assert_eq!(counts.mean_quality_delta, Some(0.0));
    }

    fn next_above(x: f64) -> f64 {
        f64::from_bits(x.to_bits() + 1)
    }

    #[test]
    fn drop_exactly_at_guardrail_does_not_block() {
        let g = DriftGuardrails::default();
        let floor = metrics(0.0, 0.0, 0.0);
        let at = evaluate_drift(
            &metrics(g.max_stability_drop, g.max_success_rate_drop, g.max_valid_signal_ratio_drop),
            &floor,
            &g,
        );
        assert_eq!(at.drops.stability_drop, g.max_stability_drop);
        assert_eq!(at.drops.success_rate_drop, g.max_success_rate_drop);
        assert_eq!(at.drops.valid_signal_ratio_drop, g.max_valid_signal_ratio_drop);
        assert!(!at.blocked());

        let above = evaluate_drift(
            &metrics(
                next_above(g.max_stability_drop),
                next_above(g.max_success_rate_drop),
                next_above(g.max_valid_signal_ratio_drop),
            ),
            &floor,
            &g,
        );
        assert_eq!(above.reasons.len(), 3);
    }

    #[test]
    fn exact_drop_between_nonzero_values_does_not_block() {
        let g = DriftGuardrails {
            max_stability_drop: 0.25,
            max_success_rate_drop: 0.125,
            max_valid_signal_ratio_drop: 0.375,
        };
        let prev = metrics(0.75, 0.75, 1.0);
        let at = evaluate_drift(&prev, &metrics(0.5, 0.625, 0.625), &g);
        assert_eq!(at.drops.stability_drop, 0.25);
        assert_eq!(at.drops.success_rate_drop, 0.125);
        assert_eq!(at.drops.valid_signal_ratio_drop, 0.375);
        assert!(!at.blocked());

        let below = |x: f64| f64::from_bits(x.to_bits() - 1);
        let over = evaluate_drift(&prev, &metrics(below(0.5), below(0.625), below(0.625)), &g);
        assert_eq!(
            over.reasons,
            vec![
                DriftReason::StabilityDropExceedsGuardrail,
                DriftReason::SuccessRateDropExceedsGuardrail,
                DriftReason::ValidSignalRatioDropExceedsGuardrail,
            ]
        );
    }

    #[test]
    fn drop_just_under_guardrail_does_not_block() {
        let eval = evaluate_drift(
            &metrics(1.0, 0.9, 0.6),
            &metrics(0.92, 0.8, 0.45),
            &DriftGuardrails::default(),
        );
        assert!(!eval.blocked());
    }

    #[test]
    fn each_exceeded_guardrail_is_reported() {
        let eval = evaluate_drift(
            &metrics(1.0, 0.9, 0.6),
            &metrics(0.919, 0.79, 0.44),
            &DriftGuardrails::default(),
        );
        assert_eq!(
            eval.reasons,
            vec![
                DriftReason::StabilityDropExceedsGuardrail,
                DriftReason::SuccessRateDropExceedsGuardrail,
                DriftReason::ValidSignalRatioDropExceedsGuardrail,
            ]
        );
        assert_eq!(
            eval.gate().reasons,
            vec![
                "stability_drop_exceeds_guardrail",
                "success_rate_drop_exceeds_guardrail",
                "valid_signal_ratio_drop_exceeds_guardrail",
            ]
        );
    }

    #[test]
    fn improvement_never_blocks() {
        let eval = evaluate_drift(
            &metrics(0.2, 0.1, 0.0),
            &metrics(0.9, 0.9, 0.9),
            &DriftGuardrails::default(),
        );
        assert!(!eval.blocked());
        assert!(eval.drops.stability_drop < 0.0);
    }

    #[test]
    fn protocol_overrides_named_keys_only() {
        let guardrails = DriftGuardrails::from_protocol_json(
            r#"{"name": "daily", "drift_guardrails": {"max_stability_drop": 0.05, "max_success_rate_drop": "bad"}}"#,
        )
        .unwrap();
        assert_eq!(guardrails.max_stability_drop, 0.05);
        assert_eq!(guardrails.max_success_rate_drop, 0.10);
        assert_eq!(guardrails.max_valid_signal_ratio_drop, 0.15);

        assert_eq!(
            DriftGuardrails::from_protocol_json("{}").unwrap(),
            DriftGuardrails::default()
        );
    }

    #[test]
    fn missing_protocol_file_uses_defaults() {
        let guardrails = DriftGuardrails::from_protocol_file(Path::new("/nonexistent/protocol.json")).unwrap();
        assert_eq!(guardrails, DriftGuardrails::default());
    }

    #[test]
    fn malformed_protocol_file_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("protocol.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            DriftGuardrails::from_protocol_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn daily_metrics_read_from_top_level_or_scores() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(DAILY_SUMMARY_FILE),
            r#"{"stability_score": "0.7", "scores": {"universe_success_rate": 0.85, "stability_score": 0.1}}"#,
        )
        .unwrap();
        let metrics = RunMetrics::collect(tmp.path(), &RunSnapshot::default());
        assert_eq!(metrics.stability_score, 0.7);
        assert_eq!(metrics.universe_success_rate, 0.85);
        assert_eq!(metrics.validated_ratio, 0.0);
    }
}
