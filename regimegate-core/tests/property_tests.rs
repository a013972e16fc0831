//! Property tests for the policy core.
//!
//! Uses proptest to verify:
//! 1. Threshold fallback — uncalibrated tickers get `base × multiplier`, `None` preserved
//! 2. Gate acceptance — metrics at or above every minimum validate with no reasons
//! 3. Gate totality — arbitrary floats and strings never panic
//! 4. Regime instability — low confidence always falls back, whatever the registry holds

use proptest::prelude::*;
use regimegate_core::{
    evaluate_gate, select_model_for_regime, GateConfig, GateMetrics, Proxy, ProxyThresholds,
    Registry, RegistryRow, SelectionWarning, SignalStatus, ThresholdStore, Timeframe,
    FALLBACK_MODEL,
};
use serde_json::json;
use std::collections::BTreeMap;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_threshold() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![Just(None), (0.0..5.0_f64).prop_map(Some)]
}

fn arb_base() -> impl Strategy<Value = ProxyThresholds> {
    (arb_threshold(), arb_threshold(), arb_threshold()).prop_map(|(m, s, v)| {
        BTreeMap::from([(Proxy::Macro, m), (Proxy::Stress, s), (Proxy::Vol, v)])
    })
}

fn arb_any_f64() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        -10.0..10.0_f64,
    ]
}

fn arb_loose_value() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(json!(null)),
        Just(json!("NaN")),
        Just(json!("inf")),
        Just(json!("not a number")),
        Just(json!(true)),
        "[a-z0-9.]{0,6}".prop_map(|s| json!(s)),
        (-10.0..10.0_f64).prop_map(|f| json!(f)),
    ]
}

fn strict_config() -> GateConfig {
    GateConfig::from_json(
        r#"{"default": {"min_quality": 0.5, "min_confidence": 0.6,
                        "max_transition_rate": 0.3, "max_novelty": 0.8},
            "domains": {"energy": {"min_quality": 0.4}}}"#,
    )
    .unwrap()
}

fn registry_row(model: &str, mase: f64) -> RegistryRow {
    RegistryRow {
        asset: "SPY".into(),
        timeframe: "daily".into(),
        regime_label: "STABLE".into(),
        model_name: model.into(),
        metrics: BTreeMap::from([("mase".to_string(), mase)]),
    }
}

// ── 1. Threshold fallback ────────────────────────────────────────────

proptest! {
    #[test]
    fn uncalibrated_tickers_scale_base(
        base in arb_base(),
        multiplier in 0.0..3.0_f64,
        ticker in "[A-Z]{3,5}",
    ) {
        let store = ThresholdStore::new()
            .with_base(Timeframe::Daily, base.clone())
            .with_group_multiplier("sector", multiplier);

        let resolved = store.get_thresholds(&ticker, "daily", Some("sector"));
        prop_assert_eq!(resolved.len(), base.len());
        for (proxy, b) in &base {
            match b {
                None => prop_assert_eq!(resolved[proxy], None),
                Some(b) => {
                    let got = resolved[proxy].unwrap();
                    prop_assert!((got - b * multiplier).abs() < 1e-12);
                }
            }
        }
    }
}

// ── 2. Gate acceptance ───────────────────────────────────────────────

proptest! {
    #[test]
    fn metrics_above_minimums_validate(
        quality in 0.5..1.0_f64,
        confidence in 0.6..1.0_f64,
        transition in 0.0..=0.3_f64,
        novelty in 0.0..=0.8_f64,
    ) {
        let metrics = GateMetrics {
            quality: Some(quality),
            confidence: Some(confidence),
            transition_rate: Some(transition),
            novelty: Some(novelty),
        };
        let result = evaluate_gate("SPY", None, &metrics, &strict_config());
        prop_assert_eq!(result.status, SignalStatus::Validated);
        prop_assert!(result.reasons.is_empty());
    }
}

// ── 3. Gate totality ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn gate_never_panics_on_floats(
        q in arb_any_f64(),
        c in arb_any_f64(),
        t in arb_any_f64(),
        n in arb_any_f64(),
    ) {
        let metrics = GateMetrics {
            quality: Some(q),
            confidence: Some(c),
            transition_rate: Some(t),
            novelty: Some(n),
        };
        let result = evaluate_gate("RE_X", Some("energy"), &metrics, &strict_config());
        prop_assert_eq!(result.reasons.is_empty(), result.status == SignalStatus::Validated);
        for value in [result.quality, result.confidence, result.transition_rate, result.novelty]
            .into_iter()
            .flatten()
        {
            prop_assert!(value.is_finite());
        }
    }

    #[test]
    fn gate_never_panics_on_loose_json(
        q in arb_loose_value(),
        c in arb_loose_value(),
        t in arb_loose_value(),
        n in arb_loose_value(),
    ) {
        let record = json!({"quality": q, "confidence": c, "transition_rate": t, "novelty": n});
        let result = evaluate_gate("SPY", Some("ons_grid"), &GateMetrics::from_json(&record), &strict_config());
        if result.quality.is_none() {
            prop_assert_eq!(result.reasons[0].as_str(), "quality_missing");
        }
    }
}

// ── 4. Regime instability ────────────────────────────────────────────

proptest! {
    #[test]
    fn unstable_regime_ignores_registry(
        errors in prop::collection::vec(0.0..2.0_f64, 0..8),
        novelty in 0.0..1.0_f64,
    ) {
        let rows = errors
            .iter()
            .enumerate()
            .map(|(i, e)| registry_row(&format!("model_{i}"), *e))
            .collect();
        let registry = Registry::new(rows);
        let decision = select_model_for_regime(&registry, "SPY", "daily", "STABLE", 0.59, novelty, "mase");
        prop_assert_eq!(decision.selected_model.as_str(), FALLBACK_MODEL);
        prop_assert_eq!(decision.warnings, vec![SelectionWarning::RegimeUnstable]);
    }
}

#[test]
fn best_model_confidence_matches_formula() {
    let registry = Registry::new(vec![
        registry_row("gbm", 1.0),
        registry_row("gbm", 1.2),
        registry_row("prophet", 0.8),
        registry_row("prophet", 1.0),
    ]);
    let decision = select_model_for_regime(&registry, "SPY", "daily", "STABLE", 0.8, 0.1, "mase");
    assert_eq!(decision.selected_model, "prophet");
    assert!((decision.forecast_confidence - (1.2_f64 - 0.9).clamp(0.1, 0.9)).abs() < 1e-12);
    assert!((decision.forecast_confidence - 0.3).abs() < 1e-9);
    assert!(decision.warnings.is_empty());
}
