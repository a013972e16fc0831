//! Host deployment gate: combine the status verdict and the drift decision
//! into `deployment_gate.json` inside the run directory.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::artifact;
use crate::drift::{DriftGate, DEPLOYMENT_GATE_KEY};
use crate::layout::PipelineConfig;
use crate::snapshot::{list_runs, LatestRunPointer, SUMMARY_FILE};
use crate::status::OverallStatus;

pub const DEPLOYMENT_GATE_FILE: &str = "deployment_gate.json";
pub const STATUS_FAIL_REASON: &str = "status_fail";
pub const DRIFT_BLOCKED_REASON: &str = "drift_blocked";

/// Contents of `deployment_gate.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentGate {
    pub publish_allowed: bool,
    pub blocked_reasons: Vec<String>,
    pub status_ok: bool,
    pub drift_blocked: bool,
}

/// Combine the status verdict and the drift block.
///
/// A missing status counts as a failure. A missing drift block (not enough
/// history to diff) does not block.
pub fn compose_deployment_gate(status: Option<OverallStatus>, drift: Option<&DriftGate>) -> DeploymentGate {
    let status_ok = status == Some(OverallStatus::Pass);
    let drift_blocked = drift.map(|d| d.blocked).unwrap_or(false);

    let mut blocked_reasons = Vec::new();
    if !status_ok {
        blocked_reasons.push(STATUS_FAIL_REASON.to_string());
    }
    if let Some(drift) = drift.filter(|d| d.blocked) {
        if drift.reasons.is_empty() {
            blocked_reasons.push(DRIFT_BLOCKED_REASON.to_string());
        } else {
            blocked_reasons.extend(drift.reasons.iter().cloned());
        }
    }

    DeploymentGate {
        publish_allowed: blocked_reasons.is_empty(),
        blocked_reasons,
        status_ok,
        drift_blocked,
    }
}

fn read_status(path: &Path) -> Option<OverallStatus> {
    let object = artifact::read_object(path);
    serde_json::from_value(object.get("status")?.clone()).ok()
}

fn read_drift_gate(run_dir: &Path) -> Option<DriftGate> {
    let summary = artifact::read_object(&run_dir.join(SUMMARY_FILE));
    let block = summary.get(DEPLOYMENT_GATE_KEY)?;
    let blocked = block.get("blocked").and_then(Value::as_bool).unwrap_or(true);
    let reasons = block
        .get("reasons")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(DriftGate { blocked, reasons })
}

/// Pipeline stage writing the run's deployment gate.
pub struct DeploymentStage<'a> {
    layout: &'a PipelineConfig,
}

impl<'a> DeploymentStage<'a> {
    pub fn new(layout: &'a PipelineConfig) -> Self {
        Self { layout }
    }

    /// Run directory to annotate: the latest-run pointer, else the newest
    /// snapshot directory.
    pub fn target_run(&self) -> Option<PathBuf> {
        if let Some(pointer) = LatestRunPointer::read(&self.layout.latest_run_pointer()) {
            let path = self.layout.resolve_run(&pointer.run_path);
            if path.is_dir() {
                return Some(path);
            }
            tracing::warn!(path = %path.display(), "latest-run pointer targets a missing directory");
        }
        list_runs(&self.layout.snapshots_root()).pop()
    }

    pub fn run(&self) -> Result<(PathBuf, DeploymentGate)> {
        let Some(run_dir) = self.target_run() else {
            bail!(
                "no run directory to gate under {}",
                self.layout.snapshots_root().display()
            );
        };

        let status = read_status(&self.layout.status_json());
        let drift = read_drift_gate(&run_dir);
        let gate = compose_deployment_gate(status, drift.as_ref());

        artifact::write_json(&run_dir.join(DEPLOYMENT_GATE_FILE), &gate)?;
        tracing::info!(
            run = %run_dir.display(),
            publish_allowed = gate.publish_allowed,
            reasons = ?gate.blocked_reasons,
            "deployment gate written"
        );
        Ok((run_dir, gate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn drift(blocked: bool, reasons: &[&str]) -> DriftGate {
        DriftGate {
            blocked,
            reasons: reasons.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn pass_without_drift_block_allows() {
        let gate = compose_deployment_gate(Some(OverallStatus::Pass), Some(&drift(false, &[])));
        assert!(gate.publish_allowed);
        assert!(gate.blocked_reasons.is_empty());
    }

    #[test]
    fn insufficient_history_does_not_block() {
        let gate = compose_deployment_gate(Some(OverallStatus::Pass), None);
        assert!(gate.publish_allowed);
        assert!(!gate.drift_blocked);
    }

    #[test]
    fn reasons_accumulate_status_then_drift() {
        let gate = compose_deployment_gate(
            Some(OverallStatus::Fail),
            Some(&drift(true, &["stability_drop_exceeds_guardrail"])),
        );
        assert!(!gate.publish_allowed);
        assert_eq!(
            gate.blocked_reasons,
            vec!["status_fail", "stability_drop_exceeds_guardrail"]
        );
    }

    #[test]
    fn missing_status_is_failure() {
        let gate = compose_deployment_gate(None, None);
        assert_eq!(gate.blocked_reasons, vec![STATUS_FAIL_REASON]);
    }

    #[test]
    fn blocked_drift_without_reasons_gets_generic_reason() {
        let gate = compose_deployment_gate(Some(OverallStatus::Pass), Some(&drift(true, &[])));
        assert_eq!(gate.blocked_reasons, vec![DRIFT_BLOCKED_REASON]);
    }

    #[test]
    fn stage_writes_gate_into_pointed_run() {
        let tmp = TempDir::new().unwrap();
        let layout = PipelineConfig::rooted_at(tmp.path());
        let run_dir = layout.snapshots_root().join("20240102");
        artifact::write_json(
            &run_dir.join(SUMMARY_FILE),
            &json!({"deployment_gate": {"blocked": false, "reasons": []}}),
        )
        .unwrap();
        LatestRunPointer::new(&run_dir, &layout.root)
            .write(&layout.latest_run_pointer())
            .unwrap();
        artifact::write_json(&layout.status_json(), &json!({"status": "pass"})).unwrap();

        let (target, gate) = DeploymentStage::new(&layout).run().unwrap();
        assert_eq!(target, run_dir);
        assert!(gate.publish_allowed);
        assert!(run_dir.join(DEPLOYMENT_GATE_FILE).exists());
    }

    #[test]
    fn stage_without_runs_is_error() {
        let tmp = TempDir::new().unwrap();
        let layout = PipelineConfig::rooted_at(tmp.path());
        assert!(DeploymentStage::new(&layout).run().is_err());
    }
}
