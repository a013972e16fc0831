//! Run snapshots: one directory per run with a summary and a per-asset table.
//!
//! Layout of a run directory:
//! - `summary.json` — aggregate metrics (`n_assets`, `validated_ratio`, ...)
//!   plus the `deployment_gate` block back-annotated by the drift guard
//! - `snapshot.csv` — one row per asset (preferred when reading)
//! - `api_snapshot.jsonl` — the same rows as JSON lines

use anyhow::{Context, Result};
use chrono::Utc;
use regimegate_core::numeric::{lenient, parse_finite_real};
use regimegate_core::{evaluate_gate, GateConfig, GateMetrics};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::artifact;

pub const SUMMARY_FILE: &str = "summary.json";
pub const SNAPSHOT_CSV: &str = "snapshot.csv";
pub const SNAPSHOT_JSONL: &str = "api_snapshot.jsonl";

/// Column order of `snapshot.csv`.
pub const SNAPSHOT_COLUMNS: [&str; 8] = [
    "asset",
    "regime",
    "confidence",
    "quality",
    "signal_status",
    "domain",
    "timestamp",
    "reason",
];

/// One asset's row in a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub regime: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub quality: Option<f64>,
    #[serde(default)]
    pub signal_status: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

// ─── Reading ─────────────────────────────────────────────────────────

/// Run directories under `root`, oldest first (ordered by name).
pub fn list_runs(root: &Path) -> Vec<PathBuf> {
    artifact::sorted_subdirs(root)
}

/// The last `n` runs under `root`, oldest first. Fewer if history is short.
pub fn latest_runs(root: &Path, n: usize) -> Vec<PathBuf> {
    let runs = list_runs(root);
    let skip = runs.len().saturating_sub(n);
    runs.into_iter().skip(skip).collect()
}

/// Read rows from a snapshot CSV, skipping rows that fail to parse.
pub fn read_rows_csv(path: &Path) -> Result<Vec<SnapshotRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open snapshot table {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<SnapshotRow>().enumerate() {
        match record {
            Ok(row) if !row.asset.is_empty() => rows.push(row),
            Ok(_) => tracing::debug!(line = i + 2, "snapshot row without asset skipped"),
            Err(e) => tracing::warn!(path = %path.display(), line = i + 2, error = %e, "malformed snapshot row skipped"),
        }
    }
    Ok(rows)
}

/// Read rows from a JSONL snapshot, skipping malformed lines.
pub fn read_rows_jsonl(path: &Path) -> Result<Vec<SnapshotRow>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open snapshot lines {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<SnapshotRow>(trimmed) {
            Ok(row) if !row.asset.is_empty() => rows.push(row),
            Ok(_) => tracing::debug!(line = i + 1, "snapshot line without asset skipped"),
            Err(e) => tracing::warn!(path = %path.display(), line = i + 1, error = %e, "malformed snapshot line skipped"),
        }
    }
    Ok(rows)
}

/// Per-asset rows of a run: CSV when present, JSONL otherwise, else empty.
pub fn read_rows(run_dir: &Path) -> Vec<SnapshotRow> {
    let csv_path = run_dir.join(SNAPSHOT_CSV);
    let jsonl_path = run_dir.join(SNAPSHOT_JSONL);

    let result = if csv_path.exists() {
        read_rows_csv(&csv_path)
    } else if jsonl_path.exists() {
        read_rows_jsonl(&jsonl_path)
    } else {
        tracing::warn!(run = %run_dir.display(), "run has no per-asset table");
        return Vec::new();
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(run = %run_dir.display(), error = %e, "per-asset table unreadable");
        Vec::new()
    })
}

/// A loaded run directory.
#[derive(Debug, Clone, Default)]
pub struct RunSnapshot {
    pub run_id: String,
    pub path: PathBuf,
    pub summary: Map<String, Value>,
    pub rows: Vec<SnapshotRow>,
}

impl RunSnapshot {
    pub fn load(run_dir: &Path) -> Self {
        Self {
            run_id: artifact::dir_name(run_dir),
            path: run_dir.to_path_buf(),
            summary: artifact::read_object(&run_dir.join(SUMMARY_FILE)),
            rows: read_rows(run_dir),
        }
    }

    pub fn summary_path(&self) -> PathBuf {
        self.path.join(SUMMARY_FILE)
    }

    /// Summary metric as a finite real, 0.0 when absent or unparsable.
    pub fn summary_metric(&self, key: &str) -> f64 {
        self.summary
            .get(key)
            .and_then(parse_finite_real)
            .unwrap_or(0.0)
    }

    /// Digest of the per-asset table actually read.
    pub fn table_digest(&self) -> Option<String> {
        let csv_path = self.path.join(SNAPSHOT_CSV);
        if csv_path.exists() {
            artifact::file_digest(&csv_path)
        } else {
            artifact::file_digest(&self.path.join(SNAPSHOT_JSONL))
        }
    }
}

// ─── Producing ───────────────────────────────────────────────────────

/// Gate every asset record and build snapshot rows.
///
/// Records are loose JSON objects with `asset`, optional `group`, `regime`,
/// `timestamp` and the gate metrics. Records without an asset are skipped.
pub fn evaluate_assets(records: &[Value], config: &GateConfig) -> Vec<SnapshotRow> {
    records
        .iter()
        .filter_map(|record| {
            let asset = record.get("asset").and_then(Value::as_str)?.trim();
            if asset.is_empty() {
                return None;
            }
            let group = record.get("group").and_then(Value::as_str);
            let metrics = GateMetrics::from_json(record);
            let result = evaluate_gate(asset, group, &metrics, config);
            let text = |key: &str| record.get(key).and_then(Value::as_str).map(str::to_string);

            Some(SnapshotRow {
                asset: asset.to_string(),
                regime: text("regime"),
                confidence: result.confidence,
                quality: result.quality,
                signal_status: Some(result.status.to_string()),
                domain: Some(result.domain.to_string()),
                timestamp: text("timestamp"),
                reason: Some(result.reason_string()).filter(|r| !r.is_empty()),
            })
        })
        .collect()
}

/// Aggregate metrics written to `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub run_id: String,
    pub generated_at: String,
    pub n_assets: usize,
    pub n_validated: usize,
    pub validated_ratio: f64,
    pub domains: BTreeMap<String, usize>,
}

impl SnapshotSummary {
    pub fn from_rows(run_id: &str, rows: &[SnapshotRow]) -> Self {
        let n_validated = rows
            .iter()
            .filter(|r| r.signal_status.as_deref() == Some("validated"))
            .count();
        let mut domains = BTreeMap::new();
        for row in rows {
            let domain = row.domain.clone().unwrap_or_else(|| "unknown".into());
            *domains.entry(domain).or_insert(0) += 1;
        }
        Self {
            run_id: run_id.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            n_assets: rows.len(),
            n_validated,
            validated_ratio: if rows.is_empty() {
                0.0
            } else {
                n_validated as f64 / rows.len() as f64
            },
            domains,
        }
    }
}

/// Write `snapshot.csv` with an explicit header (present even with no rows).
pub fn write_rows_csv(path: &Path, rows: &[SnapshotRow]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(SNAPSHOT_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush snapshot table: {}", e.error()))?;
    let text = String::from_utf8(bytes).context("Snapshot table is not UTF-8")?;
    artifact::write_text(path, &text)
}

pub fn write_rows_jsonl(path: &Path, rows: &[SnapshotRow]) -> Result<()> {
    let mut buf = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut buf, row)?;
        buf.write_all(b"\n")?;
    }
    let text = String::from_utf8(buf).context("Snapshot lines are not UTF-8")?;
    artifact::write_text(path, &text)
}

/// Write a complete run directory and return its summary.
pub fn write_snapshot(run_dir: &Path, rows: &[SnapshotRow]) -> Result<SnapshotSummary> {
    let summary = SnapshotSummary::from_rows(&artifact::dir_name(run_dir), rows);
    write_rows_csv(&run_dir.join(SNAPSHOT_CSV), rows)?;
    write_rows_jsonl(&run_dir.join(SNAPSHOT_JSONL), rows)?;
    artifact::write_json(&run_dir.join(SUMMARY_FILE), &summary)?;

    tracing::info!(
        run = %summary.run_id,
        n_assets = summary.n_assets,
        validated_ratio = summary.validated_ratio,
        "snapshot written"
    );
    Ok(summary)
}

// ─── Latest-run pointer ──────────────────────────────────────────────

/// `latest_run.json`: which run downstream consumers should look at.
///
/// `run_path` is stored relative to the pipeline root when the run lives
/// under it, so the pointer stays valid whatever the root is spelled as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestRunPointer {
    pub run_id: String,
    pub run_path: PathBuf,
}

impl LatestRunPointer {
    pub fn new(run_dir: &Path, root: &Path) -> Self {
        let run_path = run_dir.strip_prefix(root).unwrap_or(run_dir);
        Self {
            run_id: artifact::dir_name(run_dir),
            run_path: run_path.to_path_buf(),
        }
    }

    /// `None` when the pointer is absent or malformed.
    pub fn read(path: &Path) -> Option<Self> {
        artifact::read_json(path)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        artifact::write_json(path, self)
    }
}
