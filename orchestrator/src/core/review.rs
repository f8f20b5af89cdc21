//! Review aggregation: scoring and rendering of quality signals.

use crate::core::types::{QualitySignal, ReviewVerdict};

/// Category whose failure vetoes the verdict regardless of the average.
pub const SECURITY_CATEGORY: &str = "Security";

/// Default minimum overall score for a passing review.
pub const DEFAULT_PASS_THRESHOLD: u32 = 80;

/// Aggregate signals into a verdict.
///
/// `overall_score` is the mean of all scores rounded half-up. The verdict
/// passes when the score reaches `pass_threshold` and no `Security` signal
/// failed. An empty signal set scores 0 and never passes.
pub fn aggregate(signals: Vec<QualitySignal>, pass_threshold: u32) -> ReviewVerdict {
    let overall_score = mean_half_up(&signals);
    let security_ok = signals
        .iter()
        .all(|s| s.category != SECURITY_CATEGORY || s.passed);
    let passed = !signals.is_empty() && overall_score >= pass_threshold && security_ok;
    let rendered_summary = render_summary(&signals);
    ReviewVerdict {
        overall_score,
        passed,
        signals,
        rendered_summary,
    }
}

fn mean_half_up(signals: &[QualitySignal]) -> u32 {
    if signals.is_empty() {
        return 0;
    }
    let n = signals.len() as u64;
    let sum: u64 = signals.iter().map(|s| u64::from(s.score.min(100))).sum();
    // round(sum / n) with ties away from zero, exact in integers.
    ((2 * sum + n) / (2 * n)) as u32
}

fn glyph(passed: bool) -> &'static str {
    if passed { "✅" } else { "❌" }
}

/// One line per signal: `<glyph> <category>: <details> (<score>/100)`.
pub fn render_summary(signals: &[QualitySignal]) -> String {
    signals
        .iter()
        .map(|s| {
            format!(
                "{} {}: {} ({}/100)",
                glyph(s.passed),
                s.category,
                s.details,
                s.score
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(category: &str, passed: bool, score: u32) -> QualitySignal {
        QualitySignal {
            category: category.to_string(),
            passed,
            score,
            details: format!("{category} details"),
        }
    }

    fn four(scores: [u32; 4], security_passed: bool) -> Vec<QualitySignal> {
        vec![
            signal("TypeCheck", true, scores[0]),
            signal("Lint", true, scores[1]),
            signal("Tests", true, scores[2]),
            signal(SECURITY_CATEGORY, security_passed, scores[3]),
        ]
    }

    #[test]
    fn perfect_scores_pass() {
        let verdict = aggregate(four([100, 100, 100, 100], true), DEFAULT_PASS_THRESHOLD);
        assert_eq!(verdict.overall_score, 100);
        assert!(verdict.passed);
    }

    #[test]
    fn security_failure_is_a_hard_gate() {
        let verdict = aggregate(four([100, 100, 100, 100], false), DEFAULT_PASS_THRESHOLD);
        assert_eq!(verdict.overall_score, 100);
        assert!(!verdict.passed);
    }

    #[test]
    fn below_threshold_fails() {
        let verdict = aggregate(four([90, 70, 80, 60], true), DEFAULT_PASS_THRESHOLD);
        assert_eq!(verdict.overall_score, 75);
        assert!(!verdict.passed);
    }

    #[test]
    fn non_security_failures_only_affect_average() {
        let mut signals = four([100, 100, 100, 100], true);
        signals[1].passed = false;
        signals[1].score = 80;
        let verdict = aggregate(signals, DEFAULT_PASS_THRESHOLD);
        assert_eq!(verdict.overall_score, 95);
        assert!(verdict.passed);
    }

    #[test]
    fn rounding_is_half_up() {
        // 79.5 -> 80
        let verdict = aggregate(four([80, 79, 80, 79], true), DEFAULT_PASS_THRESHOLD);
        assert_eq!(verdict.overall_score, 80);
        assert!(verdict.passed);
        // 79.25 -> 79
        let verdict = aggregate(four([80, 79, 79, 79], true), DEFAULT_PASS_THRESHOLD);
        assert_eq!(verdict.overall_score, 79);
        // 78.75 -> 79
        let verdict = aggregate(four([79, 79, 79, 78], true), DEFAULT_PASS_THRESHOLD);
        assert_eq!(verdict.overall_score, 79);
    }

    #[test]
    fn empty_signals_never_pass() {
        let verdict = aggregate(Vec::new(), 0);
        assert_eq!(verdict.overall_score, 0);
        assert!(!verdict.passed);
        assert!(verdict.rendered_summary.is_empty());
    }

    #[test]
    fn summary_lists_signals_in_order() {
        let verdict = aggregate(four([100, 85, 60, 75], false), DEFAULT_PASS_THRESHOLD);
        let lines: Vec<&str> = verdict.rendered_summary.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "✅ TypeCheck: TypeCheck details (100/100)");
        assert_eq!(lines[3], "❌ Security: Security details (75/100)");
        assert_eq!(verdict.signals[2].category, "Tests");
    }
}
