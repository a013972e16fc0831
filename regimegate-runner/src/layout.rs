//! Pipeline layout: where every stage reads and writes its artifacts.
//!
//! Loaded from `regimegate.toml`. Every key has a default, so an empty file
//! (or no file at all) gives the standard layout below. All relative paths
//! resolve against `root`.
//!
//! ```toml
//! root = "."
//!
//! [checks]
//! dir = "results"
//! ablation = "ablation/ablation_summary.json"
//!
//! [runs]
//! snapshots = "results/snapshots"
//! daily = "results/daily"
//!
//! [config]
//! protocol = "config/protocol.json"
//! ```

use regimegate_core::config::{read_required, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::checks::CheckKind;

/// Default file name the CLI looks for when no layout is given.
pub const DEFAULT_LAYOUT_FILE: &str = "regimegate.toml";

/// Full pipeline layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base directory for every relative path below.
    pub root: PathBuf,
    pub checks: CheckPaths,
    pub runs: RunPaths,
    pub config: ConfigPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            checks: CheckPaths::default(),
            runs: RunPaths::default(),
            config: ConfigPaths::default(),
        }
    }
}

/// Per-check artifact locations, relative to `dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckPaths {
    pub dir: PathBuf,
    pub sanity: PathBuf,
    pub robustness: PathBuf,
    pub placebo: PathBuf,
    pub universe: PathBuf,
    pub synthetic_stress: PathBuf,
    pub ablation: PathBuf,
    pub adaptive_gates: PathBuf,
    pub risk_utility: PathBuf,
}

impl Default for CheckPaths {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            sanity: PathBuf::from("sanity/sanity_report.json"),
            robustness: PathBuf::from("robustness/robustness_summary.json"),
            placebo: PathBuf::from("placebo/placebo_report.json"),
            universe: PathBuf::from("universe/universe_coverage.json"),
            synthetic_stress: PathBuf::from("synthetic_stress/stress_report.json"),
            ablation: PathBuf::from("ablation/ablation_summary.json"),
            adaptive_gates: PathBuf::from("adaptive_gates/adaptive_gates.json"),
            risk_utility: PathBuf::from("risk_utility/risk_utility.json"),
        }
    }
}

impl CheckPaths {
    fn relative(&self, kind: CheckKind) -> &Path {
        match kind {
            CheckKind::Sanity => &self.sanity,
            CheckKind::Robustness => &self.robustness,
            CheckKind::Placebo => &self.placebo,
            CheckKind::Universe => &self.universe,
            CheckKind::SyntheticStress => &self.synthetic_stress,
            CheckKind::Ablation => &self.ablation,
            CheckKind::AdaptiveGates => &self.adaptive_gates,
            CheckKind::RiskUtility => &self.risk_utility,
        }
    }
}

/// Run-level locations: snapshot history, daily summaries, decision outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPaths {
    pub snapshots: PathBuf,
    pub daily: PathBuf,
    pub latest_run: PathBuf,
    /// Directory receiving `STATUS.json` and `STATUS.md`.
    pub status_dir: PathBuf,
    /// Directory receiving `diff_summary.json` and `diff_assets.csv`.
    pub diff_dir: PathBuf,
    pub publish_decision: PathBuf,
}

impl Default for RunPaths {
    fn default() -> Self {
        Self {
            snapshots: PathBuf::from("results/snapshots"),
            daily: PathBuf::from("results/daily"),
            latest_run: PathBuf::from("results/latest_run.json"),
            status_dir: PathBuf::from("results"),
            diff_dir: PathBuf::from("results/diff"),
            publish_decision: PathBuf::from("results/publish_decision.json"),
        }
    }
}

/// Configuration file locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPaths {
    pub gate: PathBuf,
    pub thresholds: PathBuf,
    pub protocol: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            gate: PathBuf::from("config/validation_gates.json"),
            thresholds: PathBuf::from("config/risk_thresholds.json"),
            protocol: PathBuf::from("config/protocol.json"),
        }
    }
}

impl PipelineConfig {
    /// Load the layout from a TOML file. The file must exist.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read_required(path)?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                what: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse the layout from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            what: "pipeline layout".into(),
            reason: e.to_string(),
        })
    }

    /// Default layout rooted at `root`.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Resolve a path against `root`; absolute paths pass through.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Resolve the run path recorded in the latest-run pointer. A relative
    /// path that already starts with `root` is taken as-is.
    pub fn resolve_run(&self, recorded: &Path) -> PathBuf {
        let rooted = self.root.is_relative()
            && !self.root.as_os_str().is_empty()
            && self.root != Path::new(".");
        if rooted && recorded.is_relative() && recorded.starts_with(&self.root) {
            recorded.to_path_buf()
        } else {
            self.resolve(recorded)
        }
    }

    pub fn check_path(&self, kind: CheckKind) -> PathBuf {
        self.resolve(&self.checks.dir).join(self.checks.relative(kind))
    }

    pub fn snapshots_root(&self) -> PathBuf {
        self.resolve(&self.runs.snapshots)
    }

    pub fn daily_root(&self) -> PathBuf {
        self.resolve(&self.runs.daily)
    }

    pub fn latest_run_pointer(&self) -> PathBuf {
        self.resolve(&self.runs.latest_run)
    }

    pub fn status_json(&self) -> PathBuf {
        self.resolve(&self.runs.status_dir).join("STATUS.json")
    }

    pub fn status_markdown(&self) -> PathBuf {
        self.resolve(&self.runs.status_dir).join("STATUS.md")
    }

    pub fn diff_summary(&self) -> PathBuf {
        self.resolve(&self.runs.diff_dir).join("diff_summary.json")
    }

    pub fn diff_assets(&self) -> PathBuf {
        self.resolve(&self.runs.diff_dir).join("diff_assets.csv")
    }

    pub fn publish_decision(&self) -> PathBuf {
        self.resolve(&self.runs.publish_decision)
    }

    pub fn gate_config(&self) -> PathBuf {
        self.resolve(&self.config.gate)
    }

    pub fn threshold_config(&self) -> PathBuf {
        self.resolve(&self.config.thresholds)
    }

    pub fn protocol_config(&self) -> PathBuf {
        self.resolve(&self.config.protocol)
    }
}
