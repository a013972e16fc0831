//! Publish gate: the last stage before anything leaves the pipeline.
//!
//! Adds no policy of its own. It follows the latest-run pointer, reads the
//! deployment gate recorded for that run and propagates it. Anything missing
//! along the chain blocks.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::artifact;
use crate::deployment::DEPLOYMENT_GATE_FILE;
use crate::drift::DEPLOYMENT_GATE_KEY;
use crate::layout::PipelineConfig;
use crate::snapshot::{LatestRunPointer, SUMMARY_FILE};

pub const LATEST_RUN_MISSING: &str = "latest_run_missing";
pub const GATE_BLOCKED: &str = "gate_blocked";
pub const GATE_MISSING: &str = "deployment_gate_missing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Ok,
    Blocked,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Ok => "ok",
            PublishStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents of `publish_decision.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishDecision {
    pub status: PublishStatus,
    pub run_id: Option<String>,
    pub publish_allowed: bool,
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_path: Option<PathBuf>,
    pub generated_at: String,
}

impl PublishDecision {
    fn blocked(run_id: Option<String>, run_path: Option<PathBuf>, reasons: Vec<String>) -> Self {
        Self {
            status: PublishStatus::Blocked,
            run_id,
            publish_allowed: false,
            reasons,
            run_path,
            generated_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A recorded gate, in either of the two shapes the pipeline writes:
/// `{publish_allowed, blocked_reasons}` (deployment gate file) or
/// `{blocked, reasons}` (drift block inside `summary.json`).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedGate {
    pub publish_allowed: bool,
    pub reasons: Vec<String>,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl RecordedGate {
    /// Interpret a gate record. A record that says neither `publish_allowed`
    /// nor `blocked` as a boolean does not allow publishing.
    pub fn from_record(record: &Map<String, Value>) -> Self {
        let publish_allowed = match record.get("publish_allowed") {
            Some(value) => value.as_bool().unwrap_or(false),
            None => record
                .get("blocked")
                .and_then(Value::as_bool)
                .map(|blocked| !blocked)
                .unwrap_or(false),
        };
        let reasons = if record.contains_key("blocked_reasons") {
            string_list(record.get("blocked_reasons"))
        } else {
            string_list(record.get("reasons"))
        };
        Self {
            publish_allowed,
            reasons,
        }
    }

    /// The gate recorded for a run: `deployment_gate.json`, falling back to
    /// the `deployment_gate` block of `summary.json`.
    pub fn read(run_dir: &Path) -> Option<Self> {
        let file = run_dir.join(DEPLOYMENT_GATE_FILE);
        if file.exists() {
            return Some(Self::from_record(&artifact::read_object(&file)));
        }
        let summary = artifact::read_object(&run_dir.join(SUMMARY_FILE));
        match summary.get(DEPLOYMENT_GATE_KEY) {
            Some(Value::Object(block)) => Some(Self::from_record(block)),
            _ => None,
        }
    }
}

/// Decide from the latest-run pointer alone.
pub fn decide_publish(pointer: Option<&LatestRunPointer>, layout: &PipelineConfig) -> PublishDecision {
    let Some(pointer) = pointer else {
        return PublishDecision::blocked(None, None, vec![LATEST_RUN_MISSING.to_string()]);
    };

    let run_path = layout.resolve_run(&pointer.run_path);
    let run_id = Some(pointer.run_id.clone());
    if !run_path.exists() {
        return PublishDecision::blocked(run_id, None, vec![LATEST_RUN_MISSING.to_string()]);
    }

    let Some(gate) = RecordedGate::read(&run_path) else {
        return PublishDecision::blocked(run_id, Some(run_path), vec![GATE_MISSING.to_string()]);
    };

    if gate.publish_allowed {
        PublishDecision {
            status: PublishStatus::Ok,
            run_id,
            publish_allowed: true,
            reasons: gate.reasons,
            run_path: Some(run_path),
            generated_at: Utc::now().to_rfc3339(),
        }
    } else {
        let reasons = if gate.reasons.is_empty() {
            vec![GATE_BLOCKED.to_string()]
        } else {
            gate.reasons
        };
        PublishDecision::blocked(run_id, Some(run_path), reasons)
    }
}

/// Pipeline stage writing `publish_decision.json`.
pub struct PublishGate<'a> {
    layout: &'a PipelineConfig,
}

impl<'a> PublishGate<'a> {
    pub fn new(layout: &'a PipelineConfig) -> Self {
        Self { layout }
    }

    pub fn run(&self) -> Result<PublishDecision> {
        let pointer = LatestRunPointer::read(&self.layout.latest_run_pointer());
        let decision = decide_publish(pointer.as_ref(), self.layout);

        artifact::write_json(&self.layout.publish_decision(), &decision)?;
        tracing::info!(
            status = %decision.status,
            run = decision.run_id.as_deref().unwrap_or("-"),
            reasons = ?decision.reasons,
            "publish decision written"
        );
        Ok(decision)
    }
}
