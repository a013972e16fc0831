//! Regime-conditioned model selection.
//!
//! Given the historical performance registry, pick the model with the lowest
//! mean error for an (asset, timeframe, regime) triple. When the regime
//! itself is untrustworthy, or the registry has nothing to say, fall back to
//! the naive persistence baseline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::numeric::parse_finite_str;

/// Sentinel model returned by every fallback path.
pub const FALLBACK_MODEL: &str = "naive_persistence";

/// Below this regime confidence no model is trusted.
pub const MIN_REGIME_CONFIDENCE: f64 = 0.6;

/// Above this novelty score no model is trusted.
pub const MAX_NOVELTY_SCORE: f64 = 0.95;

const UNSTABLE_REGIME_CONFIDENCE: f64 = 0.2;
const EMPTY_REGISTRY_CONFIDENCE: f64 = 0.4;
const CONFIDENCE_INTERCEPT: f64 = 1.2;
const CONFIDENCE_FLOOR: f64 = 0.1;
const CONFIDENCE_CEILING: f64 = 0.9;

const IDENTITY_COLUMNS: [&str; 4] = ["asset", "timeframe", "regime_label", "model_name"];

/// Errors from loading the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("failed to read registry: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to open registry: {0}")]
    Io(#[from] std::io::Error),
}

/// One historical observation of a model's error in a regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRow {
    pub asset: String,
    pub timeframe: String,
    pub regime_label: String,
    pub model_name: String,
    /// Error metrics keyed by column name (e.g. `mase`, `smape`).
    pub metrics: BTreeMap<String, f64>,
}

impl RegistryRow {
    fn matches(&self, asset: &str, timeframe: &str, regime_label: &str) -> bool {
        self.asset == asset && self.timeframe == timeframe && self.regime_label == regime_label
    }
}

/// Read-only performance registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    rows: Vec<RegistryRow>,
}

impl Registry {
    pub fn new(rows: Vec<RegistryRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[RegistryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Load a registry CSV.
    ///
    /// The identity columns `asset, timeframe, regime_label, model_name` are
    /// required. Rows with a blank model name are skipped. Every other column
    /// is treated as an error metric; empty or non-numeric cells are left out
    /// of that row's metrics.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RegistryError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();

        let mut identity = [0usize; 4];
        for (slot, name) in identity.iter_mut().zip(IDENTITY_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or(RegistryError::MissingColumn(name))?;
        }

        let metric_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !identity.contains(i))
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();

        let mut rows = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or("").trim().to_string();
            let model_name = field(identity[3]);
            if model_name.is_empty() {
                tracing::warn!(line = i + 2, "registry row without model name skipped");
                continue;
            }
            let metrics = metric_columns
                .iter()
                .filter_map(|(i, name)| {
                    record
                        .get(*i)
                        .and_then(parse_finite_str)
                        .map(|v| (name.clone(), v))
                })
                .collect();
            rows.push(RegistryRow {
                asset: field(identity[0]),
                timeframe: field(identity[1]),
                regime_label: field(identity[2]),
                model_name,
                metrics,
            });
        }

        Ok(Self { rows })
    }

    /// Load a registry CSV from disk.
    pub fn from_csv_path(path: &Path) -> Result<Self, RegistryError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }
}

/// Warning codes attached to a fallback decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionWarning {
    /// Regime confidence too low or novelty too high.
    #[serde(rename = "REGIME_INSTAVEL")]
    RegimeUnstable,
    /// No usable registry rows for the triple.
    #[serde(rename = "REGISTRY_EMPTY")]
    RegistryEmpty,
}

impl SelectionWarning {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionWarning::RegimeUnstable => "REGIME_INSTAVEL",
            SelectionWarning::RegistryEmpty => "REGISTRY_EMPTY",
        }
    }
}

impl fmt::Display for SelectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model choice for one (asset, timeframe, regime) evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingDecision {
    pub selected_model: String,
    pub forecast_confidence: f64,
    pub use_forecast_bool: bool,
    pub warnings: Vec<SelectionWarning>,
    /// Mean error of the selected model; `None` on fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_error: Option<f64>,
}

impl GatingDecision {
    fn fallback(confidence: f64, use_forecast: bool, warning: SelectionWarning) -> Self {
        Self {
            selected_model: FALLBACK_MODEL.to_string(),
            forecast_confidence: confidence,
            use_forecast_bool: use_forecast,
            warnings: vec![warning],
            mean_error: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Select the best model for a regime, or fall back to naive persistence.
///
/// - Unstable regime (`regime_confidence < 0.6`, `novelty_score > 0.95`, or
///   either non-finite): fallback at confidence 0.2, forecast not used.
/// - No rows with a finite `mase_col` for the triple: fallback at confidence
///   0.4, forecast still used.
/// - Otherwise the lowest mean error wins (ties go to the lexicographically
///   smallest model name) with confidence `clip(1.2 - mean, 0.1, 0.9)`.
pub fn select_model_for_regime(
    registry: &Registry,
    asset: &str,
    timeframe: &str,
    regime_label: &str,
    regime_confidence: f64,
    novelty_score: f64,
    mase_col: &str,
) -> GatingDecision {
    let unstable = !regime_confidence.is_finite()
        || !novelty_score.is_finite()
        || regime_confidence < MIN_REGIME_CONFIDENCE
        || novelty_score > MAX_NOVELTY_SCORE;
    if unstable {
        tracing::debug!(asset, regime_label, regime_confidence, novelty_score, "regime unstable");
        return GatingDecision::fallback(
            UNSTABLE_REGIME_CONFIDENCE,
            false,
            SelectionWarning::RegimeUnstable,
        );
    }

    // model → (sum, count); BTreeMap iteration gives the lexicographic tie-break
    let mut errors: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for row in registry
        .rows
        .iter()
        .filter(|r| r.matches(asset, timeframe, regime_label))
    {
        let model = row.model_name.trim();
        if model.is_empty() {
            continue;
        }
        if let Some(err) = row.metrics.get(mase_col).filter(|v| v.is_finite()) {
            let slot = errors.entry(model).or_insert((0.0, 0));
            slot.0 += err;
            slot.1 += 1;
        }
    }

    let mut best: Option<(&str, f64)> = None;
    for (model, (sum, count)) in &errors {
        let mean = sum / *count as f64;
        if best.map_or(true, |(_, best_mean)| mean < best_mean) {
            best = Some((*model, mean));
        }
    }

    match best {
        None => {
            tracing::debug!(asset, timeframe, regime_label, "no registry rows for regime");
            GatingDecision::fallback(EMPTY_REGISTRY_CONFIDENCE, true, SelectionWarning::RegistryEmpty)
        }
        Some((model, mean)) => GatingDecision {
            selected_model: model.to_string(),
            forecast_confidence: (CONFIDENCE_INTERCEPT - mean).clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING),
            use_forecast_bool: true,
            warnings: Vec::new(),
            mean_error: Some(mean),
        },
    }
}
