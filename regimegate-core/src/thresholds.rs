//! Calibrated risk-proxy thresholds per ticker and timeframe.
//!
//! Resolution order for `(ticker, timeframe, group)`:
//! 1. A calibrated entry for the ticker in that timeframe's table, verbatim.
//! 2. The timeframe's base thresholds scaled by the group multiplier
//!    (1.0 for unknown groups).
//!
//! A `None` threshold means the proxy is unreliable for that ticker and must
//! never be gated on. Scaling never turns a `None` into a number.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::config::{read_required, ConfigError};

/// Risk proxy scored upstream for every ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proxy {
    Macro,
    Stress,
    Vol,
}

impl Proxy {
    pub const ALL: [Proxy; 3] = [Proxy::Macro, Proxy::Stress, Proxy::Vol];

    pub fn as_str(&self) -> &'static str {
        match self {
            Proxy::Macro => "macro",
            Proxy::Stress => "stress",
            Proxy::Vol => "vol",
        }
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timeframes that carry their own threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Daily,
    Weekly,
}

impl Timeframe {
    /// Case-insensitive parse; anything but daily/weekly is `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(Timeframe::Daily),
            "weekly" => Some(Timeframe::Weekly),
            _ => None,
        }
    }
}

/// Proxy → threshold for one ticker/timeframe.
pub type ProxyThresholds = BTreeMap<Proxy, Option<f64>>;

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("unknown timeframe '{0}' (expected daily or weekly)")]
    UnknownTimeframe(String),
}

/// Base thresholds plus calibrated per-ticker entries for one timeframe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeframeTable {
    #[serde(default)]
    pub base: ProxyThresholds,
    #[serde(default)]
    pub calibrated: HashMap<String, ProxyThresholds>,
}

/// In-memory threshold tables.
///
/// Built once at process start (usually from a calibration file) and mutated
/// only through [`ThresholdStore::set_thresholds`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStore {
    #[serde(default)]
    daily: TimeframeTable,
    #[serde(default)]
    weekly: TimeframeTable,
    #[serde(default)]
    group_multipliers: HashMap<String, f64>,
}

impl ThresholdStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a calibration file. The file must exist.
    ///
    /// ```json
    /// {
    ///   "daily":  {"base": {"macro": 0.6, "stress": 0.7, "vol": null},
    ///              "calibrated": {"PETR4": {"macro": 0.55, "stress": null, "vol": 0.8}}},
    ///   "weekly": {"base": {"macro": 0.65, "stress": 0.75, "vol": 0.7}},
    ///   "group_multipliers": {"energy": 1.1, "banks": 0.9}
    /// }
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read_required(path)?;
        Self::from_json(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                what: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse a calibration document and validate the group multipliers.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let store: ThresholdStore =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                what: "threshold calibration".into(),
                reason: e.to_string(),
            })?;

        if let Some((group, m)) = store
            .group_multipliers
            .iter()
            .find(|(_, m)| !m.is_finite() || **m < 0.0)
        {
            return Err(ConfigError::Parse {
                what: "threshold calibration".into(),
                reason: format!("group multiplier for '{group}' must be finite and >= 0, got {m}"),
            });
        }

        Ok(store)
    }

    /// Set the base thresholds for a timeframe.
    pub fn with_base(mut self, timeframe: Timeframe, base: ProxyThresholds) -> Self {
        self.table_mut(timeframe).base = base;
        self
    }

    /// Register a group multiplier. Negative or non-finite values are ignored.
    pub fn with_group_multiplier(mut self, group: impl Into<String>, multiplier: f64) -> Self {
        let group = group.into();
        if multiplier.is_finite() && multiplier >= 0.0 {
            self.group_multipliers.insert(group, multiplier);
        } else {
            tracing::warn!(group = %group, multiplier, "ignoring invalid group multiplier");
        }
        self
    }

    /// Resolve the thresholds for a ticker.
    ///
    /// Returns an empty map for an unknown timeframe.
    pub fn get_thresholds(
        &self,
        ticker: &str,
        timeframe: &str,
        group: Option<&str>,
    ) -> ProxyThresholds {
        let Some(timeframe) = Timeframe::parse(timeframe) else {
            return ProxyThresholds::new();
        };
        let table = self.table(timeframe);

        if let Some(entry) = table.calibrated.get(ticker) {
            return entry.clone();
        }

        let multiplier = self.multiplier(group);
        table
            .base
            .iter()
            .map(|(proxy, base)| (*proxy, base.map(|b| b * multiplier)))
            .collect()
    }

    /// Replace the calibrated entry for a ticker/timeframe. No merge with the
    /// previous entry.
    pub fn set_thresholds(
        &mut self,
        ticker: &str,
        timeframe: &str,
        thresholds: ProxyThresholds,
    ) -> Result<(), ThresholdError> {
        let tf = Timeframe::parse(timeframe)
            .ok_or_else(|| ThresholdError::UnknownTimeframe(timeframe.to_string()))?;
        tracing::info!(ticker, timeframe, "threshold entry replaced");
        self.table_mut(tf)
            .calibrated
            .insert(ticker.to_string(), thresholds);
        Ok(())
    }

    /// Proxies whose score strictly exceeds a non-null threshold.
    ///
    /// Proxies without a threshold, or without a finite score, are skipped.
    pub fn breaches(
        &self,
        ticker: &str,
        timeframe: &str,
        group: Option<&str>,
        scores: &BTreeMap<Proxy, f64>,
    ) -> Vec<Proxy> {
        self.get_thresholds(ticker, timeframe, group)
            .into_iter()
            .filter_map(|(proxy, threshold)| {
                let limit = threshold?;
                let score = scores.get(&proxy).copied().filter(|s| s.is_finite())?;
                (score > limit).then_some(proxy)
            })
            .collect()
    }

    /// Multiplier for a group, 1.0 when the group is absent or unknown.
    pub fn multiplier(&self, group: Option<&str>) -> f64 {
        group
            .and_then(|g| self.group_multipliers.get(g))
            .copied()
            .unwrap_or(1.0)
    }

    fn table(&self, timeframe: Timeframe) -> &TimeframeTable {
        match timeframe {
            Timeframe::Daily => &self.daily,
            Timeframe::Weekly => &self.weekly,
        }
    }

    fn table_mut(&mut self, timeframe: Timeframe) -> &mut TimeframeTable {
        match timeframe {
            Timeframe::Daily => &mut self.daily,
            Timeframe::Weekly => &mut self.weekly,
        }
    }
}

/// Thread-safe handle for callers that share one store.
///
/// Reads take a shared lock; recalibration takes the write lock, so a reader
/// never observes a half-replaced entry.
#[derive(Debug, Clone, Default)]
pub struct SharedThresholdStore {
    inner: Arc<RwLock<ThresholdStore>>,
}

impl SharedThresholdStore {
    pub fn new(store: ThresholdStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub fn get_thresholds(
        &self,
        ticker: &str,
        timeframe: &str,
        group: Option<&str>,
    ) -> ProxyThresholds {
        let store = self.inner.read().unwrap_or_else(|e| e.into_inner());
        store.get_thresholds(ticker, timeframe, group)
    }

    pub fn set_thresholds(
        &self,
        ticker: &str,
        timeframe: &str,
        thresholds: ProxyThresholds,
    ) -> Result<(), ThresholdError> {
        let mut store = self.inner.write().unwrap_or_else(|e| e.into_inner());
        store.set_thresholds(ticker, timeframe, thresholds)
    }

    /// Copy of the current tables.
    pub fn snapshot(&self) -> ThresholdStore {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
