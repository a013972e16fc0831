//! RegimeGate Runner — the pipeline stages around the policy core.
//!
//! Stages communicate only through artifacts on disk:
//! - [`status`]: eight check artifacts → `STATUS.json` / `STATUS.md`
//! - [`drift`]: two latest runs → `diff_summary.json`, `diff_assets.csv`,
//!   plus the `deployment_gate` block in the current snapshot summary
//! - [`deployment`]: status + drift → `deployment_gate.json` in the run
//! - [`publish`]: latest-run pointer + recorded gate → `publish_decision.json`
//!
//! Every stage writes its decision record even when its inputs are missing.

pub mod artifact;
pub mod checks;
pub mod deployment;
pub mod drift;
pub mod layout;
pub mod publish;
pub mod report;
pub mod snapshot;
pub mod status;

pub use checks::{CheckArtifact, CheckArtifacts, CheckKind};
pub use deployment::{compose_deployment_gate, DeploymentGate, DeploymentStage};
pub use drift::{
    diff_assets, evaluate_drift, AssetChange, ChangeCounts, DiffStatus, DiffSummary, DriftGate,
    DriftGuard, DriftGuardrails, DriftReason, RunMetrics,
};
pub use layout::PipelineConfig;
pub use publish::{decide_publish, PublishDecision, PublishGate, PublishStatus, RecordedGate};
pub use report::MarkdownStatusReport;
pub use snapshot::{
    evaluate_assets, list_runs, write_snapshot, LatestRunPointer, RunSnapshot, SnapshotRow,
    SnapshotSummary,
};
pub use status::{aggregate_status, GateChecks, OverallStatus, StatusAggregator, StatusPayload};
