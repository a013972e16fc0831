//! RegimeGate Core — per-asset policy logic for the validation gate.
//!
//! This crate holds the pure decision logic invoked by the snapshot producer
//! before a run is written:
//! - Risk-proxy thresholds with calibrated entries and group fallback
//! - Per-asset gate evaluation against domain-specific thresholds
//! - Regime-conditioned model selection with naive-persistence fallback
//! - Finite-real coercion used by every reader of loosely typed inputs
//!
//! None of these components fail on bad metric data; only missing required
//! configuration is an error.

pub mod config;
pub mod gate;
pub mod numeric;
pub mod selector;
pub mod thresholds;

pub use config::{ConfigError, GateConfig, GateThresholds, ThresholdBlock};
pub use gate::{evaluate_gate, Domain, GateMetrics, GateReason, GateResult, SignalStatus};
pub use numeric::{finite, parse_finite_real, parse_finite_str};
pub use selector::{
    select_model_for_regime, GatingDecision, Registry, RegistryError, RegistryRow,
    SelectionWarning, FALLBACK_MODEL,
};
pub use thresholds::{
    Proxy, ProxyThresholds, SharedThresholdStore, ThresholdError, ThresholdStore, Timeframe,
};
