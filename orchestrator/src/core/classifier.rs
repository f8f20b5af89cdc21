//! Deterministic classification of an issue into a [`TaskPlan`].

use crate::core::types::{AgentKind, Complexity, IssueSnapshot, Priority, TaskPlan};

/// Marker for an unchecked checklist item in the issue body.
pub const UNCHECKED_MARKER: &str = "- [ ]";

const BUILD_KEYWORDS: &[&str] = &[
    "implement",
    "create",
    "build",
    "feature",
    "実装",
    "作成",
    "構築",
];

const QUALITY_KEYWORDS: &[&str] = &[
    "review",
    "test",
    "quality",
    "レビュー",
    "テスト",
    "品質",
];

/// Classify an issue snapshot.
///
/// - Priority from labels: `high`/`P1` wins over `low`/`P3`; otherwise medium.
/// - Complexity from unchecked checklist lines: `0..=2` simple, `>=5` complex.
/// - Agent sequence always `issue`, `codegen`, `review` in that order; keywords
///   only decide which class triggered inclusion, never the order.
/// - Requirements are the unchecked checklist lines with the marker stripped.
pub fn classify(issue: &IssueSnapshot) -> TaskPlan {
    TaskPlan {
        priority: priority(issue),
        complexity: complexity(&issue.body),
        agent_sequence: agent_sequence(&issue.title, &issue.body),
        requirements: requirements(&issue.body),
    }
}

fn priority(issue: &IssueSnapshot) -> Priority {
    let any_label = |markers: &[&str]| {
        issue
            .labels
            .iter()
            .any(|label| markers.iter().any(|marker| label.contains(marker)))
    };
    if any_label(&["high", "P1"]) {
        Priority::High
    } else if any_label(&["low", "P3"]) {
        Priority::Low
    } else {
        Priority::Medium
    }
}

fn complexity(body: &str) -> Complexity {
    match unchecked_items(body).count() {
        0..=2 => Complexity::Simple,
        n if n >= 5 => Complexity::Complex,
        _ => Complexity::Moderate,
    }
}

fn agent_sequence(title: &str, body: &str) -> Vec<AgentKind> {
    let content = format!("{} {}", title, body).to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|kw| content.contains(kw));

    let mut sequence = vec![AgentKind::Intake];
    if mentions(BUILD_KEYWORDS) {
        push_unique(&mut sequence, AgentKind::Codegen);
    }
    if mentions(QUALITY_KEYWORDS) {
        push_unique(&mut sequence, AgentKind::Review);
    }

    // Default inclusion: the pipeline never stops after intake alone.
    push_unique(&mut sequence, AgentKind::Codegen);
    push_unique(&mut sequence, AgentKind::Review);

    // `AgentKind` orders by phase.
    sequence.sort();
    sequence
}

fn push_unique(sequence: &mut Vec<AgentKind>, kind: AgentKind) {
    if !sequence.contains(&kind) {
        sequence.push(kind);
    }
}

fn requirements(body: &str) -> Vec<String> {
    unchecked_items(body)
        .map(|rest| rest.trim().to_string())
        .collect()
}

/// Text after the marker on each line that starts with an unchecked item.
fn unchecked_items(body: &str) -> impl Iterator<Item = &str> {
    body.lines()
        .filter_map(|line| line.trim().strip_prefix(UNCHECKED_MARKER))
}
