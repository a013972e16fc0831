//! Markdown status report.

use crate::checks::CheckKind;
use crate::status::StatusPayload;

pub struct MarkdownStatusReport;

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_else(|| "n/a".into())
}

impl MarkdownStatusReport {
    pub fn generate(&self, payload: &StatusPayload) -> String {
        let mut report = format!(
            "# RegimeGate Status\n\n\
Status: **{}**\n\n\
Generated: {}\n\n\
## Scores\n\
- Stability score: {:.4}\n\
- Universe success rate: {:.1}%\n\
- Placebo quality gap: {}\n\
- Risk-utility drawdown avoidance: {}\n",
            payload.status.as_str().to_uppercase(),
            payload.generated_at,
            payload.scores.stability_score,
            payload.scores.universe_success_rate * 100.0,
            optional(payload.scores.placebo_gap_quality),
            optional(payload.scores.risk_utility_drawdown_avoidance),
        );

        report.push_str("\n## Gate Checks\n\n");
        report.push_str("| Check | Key | Result |\n");
        report.push_str("|-------|-----|--------|\n");
        for kind in CheckKind::ALL {
            let result = if payload.gate_checks.get(kind) { "pass" } else { "FAIL" };
            report.push_str(&format!("| {} | `{}` | {} |\n", kind.label(), kind.key(), result));
        }

        report.push_str("\n## Notes\n\n");
        for note in &payload.notes {
            report.push_str(&format!("- {note}\n"));
        }

        report.push_str("\n## Next Actions\n\n");
        for (i, action) in payload.next_actions.iter().enumerate() {
            report.push_str(&format!("{}. {action}\n", i + 1));
        }

        report
    }
}
