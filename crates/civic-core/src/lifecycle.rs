use thiserror::Error;

use crate::{Issue, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Changed {
        from: Status,
        to: Status,
        acknowledged_now: bool,
        resolved_now: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move issue from '{from}' back to '{to}'")]
    Regression { from: Status, to: Status },
}

/// Moves `issue` to `target`, stamping lifecycle timestamps.
///
/// Status only moves forward (Pending < In Progress < Resolved, Pending may
/// skip straight to Resolved). `acknowledged_at` is stamped once, on the
/// first move out of Pending; `resolved_at` is stamped once, on entering
/// Resolved. A same-status request leaves the issue untouched.
pub fn apply_transition(
    issue: &mut Issue,
    target: Status,
    now_ms: i64,
) -> Result<Transition, TransitionError> {
    let from = issue.status;
    if from == target {
        return Ok(Transition::Unchanged);
    }
    if target.rank() < from.rank() {
        return Err(TransitionError::Regression { from, to: target });
    }

    let acknowledged_now = from == Status::Pending && issue.acknowledged_at.is_none();
    if acknowledged_now {
        issue.acknowledged_at = Some(now_ms);
    }

    let resolved_now = target == Status::Resolved && issue.resolved_at.is_none();
    if resolved_now {
        issue.resolved_at = Some(now_ms);
    }

    issue.status = target;

    Ok(Transition::Changed {
        from,
        to: target,
        acknowledged_now,
        resolved_now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, Department, GeoPoint};

    fn pending_issue() -> Issue {
        Issue {
            id: "issue-1-aaaaaaaa".to_owned(),
            title: "Broken lamp".to_owned(),
            description: "Lamp on 5th street is out".to_owned(),
            category: Category::Streetlight,
            department: Department::Electrical,
            photo: "data:image/png;base64,AAAA".to_owned(),
            location: GeoPoint {
                lat: 40.7128,
                lng: -74.006,
            },
            created_at: 1_000,
            acknowledged_at: None,
            resolved_at: None,
            status: Status::Pending,
            user_id: "user-1".to_owned(),
            user_email: "alice@example.com".to_owned(),
            username: "alice".to_owned(),
            rating: None,
            feedback: None,
        }
    }

    #[test]
    fn pending_to_in_progress_acknowledges_once() {
        let mut issue = pending_issue();

        let transition = apply_transition(&mut issue, Status::InProgress, 2_000).expect("advance");
        assert_eq!(
            transition,
            Transition::Changed {
                from: Status::Pending,
                to: Status::InProgress,
                acknowledged_now: true,
                resolved_now: false,
            }
        );
        assert_eq!(issue.acknowledged_at, Some(2_000));
        assert_eq!(issue.resolved_at, None);

        let transition = apply_transition(&mut issue, Status::Resolved, 3_000).expect("resolve");
        assert_eq!(
            transition,
            Transition::Changed {
                from: Status::InProgress,
                to: Status::Resolved,
                acknowledged_now: false,
                resolved_now: true,
            }
        );
        assert_eq!(issue.acknowledged_at, Some(2_000));
        assert_eq!(issue.resolved_at, Some(3_000));
    }

    #[test]
    fn pending_can_resolve_directly_and_stamps_both() {
        let mut issue = pending_issue();

        apply_transition(&mut issue, Status::Resolved, 5_000).expect("resolve");
        assert_eq!(issue.status, Status::Resolved);
        assert_eq!(issue.acknowledged_at, Some(5_000));
        assert_eq!(issue.resolved_at, Some(5_000));
    }

    #[test]
    fn same_status_is_a_no_op() {
        let mut issue = pending_issue();
        let before = issue.clone();

        let transition = apply_transition(&mut issue, Status::Pending, 9_000).expect("no-op");
        assert_eq!(transition, Transition::Unchanged);
        assert_eq!(issue, before);
    }

    #[test]
    fn backwards_moves_are_rejected_without_mutation() {
        let mut issue = pending_issue();
        apply_transition(&mut issue, Status::Resolved, 5_000).expect("resolve");
        let resolved = issue.clone();

        let err = apply_transition(&mut issue, Status::InProgress, 6_000).expect_err("regress");
        assert_eq!(
            err,
            TransitionError::Regression {
                from: Status::Resolved,
                to: Status::InProgress,
            }
        );
        assert_eq!(issue, resolved);

        let mut in_progress = pending_issue();
        apply_transition(&mut in_progress, Status::InProgress, 2_000).expect("advance");
        assert!(apply_transition(&mut in_progress, Status::Pending, 3_000).is_err());
    }
}
