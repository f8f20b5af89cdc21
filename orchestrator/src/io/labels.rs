//! Best-effort label bookkeeping on the work item.
//!
//! Labels are a status indicator for humans, not a lock. Add and remove are
//! two separate tracker calls, so observers may briefly see both or neither
//! label. Failures are logged and never abort a run.

use tracing::{debug, warn};

use crate::core::state::LabelDelta;
use crate::io::tracker::IssueTracker;

/// Applies [`LabelDelta`]s to one issue through an [`IssueTracker`].
pub struct LabelSync<'a, T: IssueTracker + ?Sized> {
    tracker: &'a T,
    issue_id: u64,
}

impl<'a, T: IssueTracker + ?Sized> LabelSync<'a, T> {
    pub fn new(tracker: &'a T, issue_id: u64) -> Self {
        Self { tracker, issue_id }
    }

    /// Add first, then remove. Returns whether both calls succeeded.
    pub fn apply(&self, delta: &LabelDelta) -> bool {
        if delta.is_empty() {
            return true;
        }
        debug!(issue = self.issue_id, add = ?delta.add, remove = ?delta.remove, "updating labels");
        let mut ok = true;
        if let Err(err) = self.tracker.add_labels(self.issue_id, &delta.add) {
            warn!(issue = self.issue_id, err = %err, labels = ?delta.add, "failed to add labels");
            ok = false;
        }
        if let Err(err) = self.tracker.remove_labels(self.issue_id, &delta.remove) {
            warn!(
                issue = self.issue_id,
                err = %err,
                labels = ?delta.remove,
                "failed to remove labels"
            );
            ok = false;
        }
        ok
    }

    pub fn update(&self, add: &[&str], remove: &[&str]) -> bool {
        self.apply(&LabelDelta::new(
            add.iter().map(|s| s.to_string()).collect(),
            remove.iter().map(|s| s.to_string()).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryTracker;

    #[test]
    fn applies_add_then_remove() {
        let tracker = MemoryTracker::new();
        let labels = LabelSync::new(&tracker, 3);
        assert!(labels.update(&["a", "b"], &["c"]));
        assert_eq!(
            tracker.label_ops(),
            vec!["+a".to_string(), "+b".to_string(), "-c".to_string()]
        );
    }

    #[test]
    fn failures_are_reported_not_raised() {
        let tracker = MemoryTracker::new().failing_labels();
        let labels = LabelSync::new(&tracker, 3);
        assert!(!labels.update(&["a"], &["b"]));
    }

    #[test]
    fn empty_delta_makes_no_calls() {
        let tracker = MemoryTracker::new();
        let labels = LabelSync::new(&tracker, 3);
        assert!(labels.apply(&LabelDelta::default()));
        assert!(tracker.label_ops().is_empty());
    }
}
