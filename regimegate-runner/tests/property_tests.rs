//! Property tests for the runner's pure decisions.
//!
//! 1. Drift — blocking happens exactly when some drop exceeds its guardrail
//! 2. Deployment — publishing is allowed exactly when there are no reasons
//! 3. Asset diff — every asset from either side appears once, in order

use proptest::prelude::*;
use regimegate_runner::{
    compose_deployment_gate, diff_assets, evaluate_drift, DriftGate, DriftGuardrails,
    OverallStatus, RunMetrics, SnapshotRow,
};

fn arb_metrics() -> impl Strategy<Value = RunMetrics> {
    (0.0..1.0_f64, 0.0..1.0_f64, 0.0..1.0_f64).prop_map(|(s, u, v)| RunMetrics {
        stability_score: s,
        universe_success_rate: u,
        validated_ratio: v,
    })
}

fn arb_rows() -> impl Strategy<Value = Vec<SnapshotRow>> {
    prop::collection::vec(("[A-E]{1,2}", prop::option::of("validated|inconclusive")), 0..12)
        .prop_map(|items| {
            items
                .into_iter()
                .map(|(asset, status)| SnapshotRow {
                    asset,
                    signal_status: status,
                    ..SnapshotRow::default()
                })
                .collect()
        })
}

// ── 1. Drift ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn blocked_iff_some_drop_exceeds(prev in arb_metrics(), cur in arb_metrics()) {
        let guardrails = DriftGuardrails::default();
        let eval = evaluate_drift(&prev, &cur, &guardrails);
        let expected = prev.stability_score - cur.stability_score > guardrails.max_stability_drop
            || prev.universe_success_rate - cur.universe_success_rate > guardrails.max_success_rate_drop
            || prev.validated_ratio - cur.validated_ratio > guardrails.max_valid_signal_ratio_drop;
        prop_assert_eq!(eval.blocked(), expected);
        prop_assert!(eval.reasons.len() <= 3);
    }

    #[test]
    fn identical_runs_never_block(run in arb_metrics()) {
        prop_assert!(!evaluate_drift(&run, &run, &DriftGuardrails::default()).blocked());
    }
}

// ── 2. Deployment ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn allowed_iff_no_reasons(
        pass in any::<bool>(),
        drift in prop::option::of((any::<bool>(), prop::collection::vec("[a-z_]{3,12}", 0..3))),
    ) {
        let status = Some(if pass { OverallStatus::Pass } else { OverallStatus::Fail });
        let drift = drift.map(|(blocked, reasons)| DriftGate { blocked, reasons });
        let gate = compose_deployment_gate(status, drift.as_ref());
        prop_assert_eq!(gate.publish_allowed, gate.blocked_reasons.is_empty());
        prop_assert_eq!(gate.publish_allowed, pass && !gate.drift_blocked);
    }
}

// ── 3. Asset diff ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn outer_join_covers_both_sides(prev in arb_rows(), cur in arb_rows()) {
        let changes = diff_assets(&prev, &cur);
        let assets: Vec<&str> = changes.iter().map(|c| c.asset.as_str()).collect();

        let mut expected: Vec<&str> = prev.iter().chain(cur.iter()).map(|r| r.asset.as_str()).collect();
        expected.sort();
        expected.dedup();
        prop_assert_eq!(assets, expected);

        for change in &changes {
            prop_assert!(change.in_prev || change.in_cur);
            prop_assert_eq!(
                change.status_changed,
                change.prev_signal_status != change.cur_signal_status
            );
        }
    }
}
