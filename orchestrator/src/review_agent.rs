//! In-process review phase.
//!
//! Runs the quality checks, aggregates them into a [`ReviewVerdict`], posts the
//! rendered report on the issue and yields the phase's [`AgentResult`].

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::review::aggregate;
use crate::core::types::{AgentKind, AgentResult, ReviewVerdict};
use crate::io::agents::{Agent, elapsed_ms};
use crate::io::config::ReviewConfig;
use crate::io::quality::{QualityCheck, configured_checks, run_checks};
use crate::io::tracker::IssueTracker;

const REVIEW_COMMENT_TEMPLATE: &str = include_str!("templates/review_comment.md");

pub struct ReviewAgent<'a, T: IssueTracker + ?Sized> {
    tracker: &'a T,
    checks: Vec<Box<dyn QualityCheck>>,
    pass_threshold: u32,
    post_comment: bool,
}

impl<'a, T: IssueTracker + ?Sized> ReviewAgent<'a, T> {
    pub fn new(
        tracker: &'a T,
        checks: Vec<Box<dyn QualityCheck>>,
        pass_threshold: u32,
        post_comment: bool,
    ) -> Self {
        Self {
            tracker,
            checks,
            pass_threshold,
            post_comment,
        }
    }

    /// Review agent with the checks from `[review]`, run in `workdir`.
    pub fn from_config(tracker: &'a T, config: &ReviewConfig, workdir: &Path) -> Result<Self> {
        Ok(Self::new(
            tracker,
            configured_checks(config, workdir)?,
            config.pass_threshold,
            config.post_comment,
        ))
    }

    /// Run every check once and aggregate.
    #[instrument(skip(self), fields(checks = self.checks.len()))]
    pub fn review(&self) -> ReviewVerdict {
        let verdict = aggregate(run_checks(&self.checks), self.pass_threshold);
        info!(
            overall_score = verdict.overall_score,
            passed = verdict.passed,
            "review completed"
        );
        verdict
    }

    fn post(&self, issue_id: u64, verdict: &ReviewVerdict) {
        if !self.post_comment {
            return;
        }
        let body = match render_comment(issue_id, verdict) {
            Ok(body) => body,
            Err(err) => {
                warn!(err = %err, "failed to render review comment, posting summary");
                verdict.rendered_summary.clone()
            }
        };
        if let Err(err) = self.tracker.comment(issue_id, &body) {
            warn!(issue = issue_id, err = %err, "failed to post review comment");
        }
    }
}

impl<T: IssueTracker + ?Sized> Agent for ReviewAgent<'_, T> {
    fn invoke(&self, issue_id: u64) -> AgentResult {
        let start = Instant::now();
        let verdict = self.review();
        self.post(issue_id, &verdict);
        AgentResult {
            agent_name: AgentKind::Review,
            success: verdict.passed,
            duration_ms: elapsed_ms(start),
            stdout: Some(verdict.rendered_summary),
            stderr: None,
            error: None,
            changes: Vec::new(),
            score: Some(verdict.overall_score),
        }
    }
}

#[derive(Serialize)]
struct SignalRow {
    glyph: &'static str,
    category: String,
    details: String,
    score: u32,
}

/// Markdown report posted on the issue.
pub fn render_comment(issue_id: u64, verdict: &ReviewVerdict) -> Result<String> {
    let signals: Vec<SignalRow> = verdict
        .signals
        .iter()
        .map(|s| SignalRow {
            glyph: if s.passed { "✅" } else { "❌" },
            category: s.category.clone(),
            details: s.details.replace('|', "\\|"),
            score: s.score,
        })
        .collect();
    let env = Environment::new();
    let rendered = env.render_str(
        REVIEW_COMMENT_TEMPLATE,
        context! {
            issue => issue_id,
            passed => verdict.passed,
            status_emoji => if verdict.passed { "✅" } else { "❌" },
            status => if verdict.passed { "Passed" } else { "Failed" },
            score => verdict.overall_score,
            signals => signals,
        },
    )?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::review::SECURITY_CATEGORY;
    use crate::core::types::QualitySignal;
    use crate::test_support::MemoryTracker;

    struct FixedCheck(QualitySignal);

    impl QualityCheck for FixedCheck {
        fn category(&self) -> &str {
            &self.0.category
        }

        fn run(&self) -> QualitySignal {
            self.0.clone()
        }
    }

    fn fixed(category: &str, passed: bool, score: u32) -> Box<dyn QualityCheck> {
        Box::new(FixedCheck(QualitySignal {
            category: category.to_string(),
            passed,
            score,
            details: format!("{category} ok"),
        }))
    }

    #[test]
    fn passing_review_posts_comment_and_succeeds() {
        let tracker = MemoryTracker::new();
        let agent = ReviewAgent::new(
            &tracker,
            vec![fixed("Lint", true, 100), fixed(SECURITY_CATEGORY, true, 100)],
            80,
            true,
        );
        let result = agent.invoke(17);
        assert!(result.success);
        assert_eq!(result.agent_name, AgentKind::Review);
        assert_eq!(result.score, Some(100));

        let comments = tracker.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, 17);
        assert!(comments[0].1.contains("**Status**: Passed"));
        assert!(comments[0].1.contains("| ✅ | **Lint** | Lint ok | 100/100 |"));
        assert!(comments[0].1.contains("🎉 All quality checks passed!"));
    }

    #[test]
    fn security_failure_fails_the_phase() {
        let tracker = MemoryTracker::new();
        let agent = ReviewAgent::new(
            &tracker,
            vec![fixed("Lint", true, 100), fixed(SECURITY_CATEGORY, false, 100)],
            80,
            false,
        );
        let result = agent.invoke(1);
        assert!(!result.success);
        assert_eq!(result.score, Some(100));
        assert!(tracker.comments().is_empty());
        assert!(
            result
                .stdout
                .as_deref()
                .unwrap_or_default()
                .contains("❌ Security")
        );
    }

    #[test]
    fn comment_layout() {
        let verdict = aggregate(
            vec![QualitySignal {
                category: "Tests".to_string(),
                passed: false,
                score: 60,
                details: "2 test(s) failed | flaky".to_string(),
            }],
            80,
        );
        let body = render_comment(5, &verdict).expect("render");
        assert!(body.starts_with("## ❌ Code Review Report\n\n**Issue**: #5\n"));
        assert!(body.contains("**Overall Score**: 60/100"));
        assert!(body.contains(
            "| ❌ | **Tests** | 2 test(s) failed \\| flaky | 60/100 |\n\n### Summary"
        ));
        assert!(body.contains("⚠️ Some quality checks failed."));
    }
}
