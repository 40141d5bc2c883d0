//! Workflow stage classification from pull-request metadata.
//!
//! Independent of backend health: only the session's PR fields are read.

use crate::types::{CheckStatus, ReviewDecision, Session};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Where a session is in the development workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    /// No pull request yet.
    Planning,
    /// Pull request is open and being worked on.
    Implementation,
    /// Waiting for a review.
    Review,
    /// Something prevents progress; see the blockers.
    Blocked,
    /// Checks pass, approved, no conflicts.
    ReadyToMerge,
    Merged,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Planning => "planning",
            Self::Implementation => "implementation",
            Self::Review => "review",
            Self::Blocked => "blocked",
            Self::ReadyToMerge => "ready_to_merge",
            Self::Merged => "merged",
        };
        f.write_str(label)
    }
}

/// A condition preventing workflow progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockerKind {
    CiFailing,
    MergeConflict,
    ChangesRequested,
}

impl BlockerKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CiFailing => "ci-failing",
            Self::MergeConflict => "merge-conflict",
            Self::ChangesRequested => "changes-requested",
        }
    }
}

impl fmt::Display for BlockerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stage plus every blocker that currently applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowClassification {
    pub stage: WorkflowStage,
    pub blockers: BTreeSet<BlockerKind>,
}

/// Blockers are detected independently of the stage.
pub fn detect_blockers(session: &Session) -> BTreeSet<BlockerKind> {
    let mut blockers = BTreeSet::new();
    if session.pr_check_status == Some(CheckStatus::Failing) {
        blockers.insert(BlockerKind::CiFailing);
    }
    if session.merge_conflict {
        blockers.insert(BlockerKind::MergeConflict);
    }
    if session.pr_review_decision == Some(ReviewDecision::ChangesRequested) {
        blockers.insert(BlockerKind::ChangesRequested);
    }
    blockers
}

/// Classify a session's workflow stage. The first matching rule wins.
pub fn classify_workflow(session: &Session) -> WorkflowClassification {
    let blockers = detect_blockers(session);
    let checks = session.pr_check_status;
    let review = session.pr_review_decision;

    let stage = if checks == Some(CheckStatus::Merged) {
        WorkflowStage::Merged
    } else if session.pr_url.is_none() {
        WorkflowStage::Planning
    } else if !blockers.is_empty() {
        WorkflowStage::Blocked
    } else if matches!(checks, Some(CheckStatus::Passing | CheckStatus::Mergeable))
        && review == Some(ReviewDecision::Approved)
        && !session.merge_conflict
    {
        WorkflowStage::ReadyToMerge
    } else if matches!(review, None | Some(ReviewDecision::ReviewRequired)) {
        WorkflowStage::Review
    } else {
        WorkflowStage::Implementation
    };

    WorkflowClassification { stage, blockers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BackendKind;
    use proptest::prelude::*;

    fn with_pr() -> Session {
        let mut session = Session::new("s-1", "feature", BackendKind::Container, "/tmp/wt");
        session.pr_url = Some("https://github.com/acme/app/pull/7".to_string());
        session
    }

    #[test]
    fn test_merged_wins_over_blockers() {
        let mut session = with_pr();
        session.pr_check_status = Some(CheckStatus::Merged);
        session.merge_conflict = true;
        let result = classify_workflow(&session);
        assert_eq!(result.stage, WorkflowStage::Merged);
        assert!(result.blockers.contains(&BlockerKind::MergeConflict));
    }

    #[test]
    fn test_no_pr_is_planning() {
        let mut session = with_pr();
        session.pr_url = None;
        session.pr_check_status = Some(CheckStatus::Failing);
        session.pr_review_decision = Some(ReviewDecision::Approved);
        assert_eq!(classify_workflow(&session).stage, WorkflowStage::Planning);
    }

    #[test]
    fn test_ready_to_merge() {
        let mut session = with_pr();
        session.pr_check_status = Some(CheckStatus::Passing);
        session.pr_review_decision = Some(ReviewDecision::Approved);
        let result = classify_workflow(&session);
        assert_eq!(result.stage, WorkflowStage::ReadyToMerge);
        assert!(result.blockers.is_empty());

        session.pr_check_status = Some(CheckStatus::Mergeable);
        assert_eq!(classify_workflow(&session).stage, WorkflowStage::ReadyToMerge);
    }

    #[test]
    fn test_failing_checks_block() {
        let mut session = with_pr();
        session.pr_check_status = Some(CheckStatus::Failing);
        session.pr_review_decision = Some(ReviewDecision::Approved);
        let result = classify_workflow(&session);
        assert_eq!(result.stage, WorkflowStage::Blocked);
        assert_eq!(
            result.blockers.into_iter().collect::<Vec<_>>(),
            vec![BlockerKind::CiFailing]
        );
    }

    #[test]
    fn test_review_and_implementation() {
        let mut session = with_pr();
        session.pr_check_status = Some(CheckStatus::Pending);
        assert_eq!(classify_workflow(&session).stage, WorkflowStage::Review);

        session.pr_review_decision = Some(ReviewDecision::ReviewRequired);
        assert_eq!(classify_workflow(&session).stage, WorkflowStage::Review);

        session.pr_review_decision = Some(ReviewDecision::Approved);
        assert_eq!(
            classify_workflow(&session).stage,
            WorkflowStage::Implementation
        );
    }

    #[test]
    fn test_blocker_wire_format() {
        let json = serde_json::to_string(&BlockerKind::ChangesRequested).unwrap();
        assert_eq!(json, "\"changes-requested\"");
        assert_eq!(BlockerKind::CiFailing.to_string(), "ci-failing");
    }

    fn check_strategy() -> impl Strategy<Value = Option<CheckStatus>> {
        prop::option::of(prop::sample::select(vec![
            CheckStatus::Pending,
            CheckStatus::Passing,
            CheckStatus::Failing,
            CheckStatus::Mergeable,
            CheckStatus::Merged,
        ]))
    }

    fn review_strategy() -> impl Strategy<Value = Option<ReviewDecision>> {
        prop::option::of(prop::sample::select(vec![
            ReviewDecision::Approved,
            ReviewDecision::ChangesRequested,
            ReviewDecision::ReviewRequired,
        ]))
    }

    proptest! {
        #[test]
        fn prop_planning_ignores_everything_else(
            checks in check_strategy(),
            review in review_strategy(),
            conflict in any::<bool>(),
        ) {
            prop_assume!(checks != Some(CheckStatus::Merged));
            let mut session = with_pr();
            session.pr_url = None;
            session.pr_check_status = checks;
            session.pr_review_decision = review;
            session.merge_conflict = conflict;
            prop_assert_eq!(classify_workflow(&session).stage, WorkflowStage::Planning);
        }

        #[test]
        fn prop_blockers_force_blocked_stage(
            checks in check_strategy(),
            review in review_strategy(),
            conflict in any::<bool>(),
        ) {
            let mut session = with_pr();
            session.pr_check_status = checks;
            session.pr_review_decision = review;
            session.merge_conflict = conflict;
            let result = classify_workflow(&session);
            prop_assert_eq!(&result.blockers, &detect_blockers(&session));
            if checks != Some(CheckStatus::Merged) {
                prop_assert_eq!(
                    result.stage == WorkflowStage::Blocked,
                    !result.blockers.is_empty()
                );
            }
        }
    }
}
