use civic_core::{Issue, User, UserId};
use serde::{Deserialize, Serialize};

const REPORT_POINTS: u64 = 10;
const RATING_POINTS: u64 = 5;
const FEEDBACK_POINTS: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub username: String,
    pub score: u64,
    pub reports_submitted: usize,
    pub ratings_given: usize,
    pub feedbacks_provided: usize,
}

/// Ranks citizens by participation. Admin accounts never appear.
///
/// Ordering is score descending, then reports descending, then username.
pub fn leaderboard(users: &[User], issues: &[Issue], limit: Option<usize>) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = users
        .iter()
        .filter(|user| !user.is_admin)
        .map(|user| {
            let reported = issues.iter().filter(|issue| issue.user_id == user.id);
            let (reports_submitted, ratings_given, feedbacks_provided) =
                reported.fold((0, 0, 0), |(reports, ratings, feedbacks), issue| {
                    (
                        reports + 1,
                        ratings + usize::from(issue.rating.is_some()),
                        feedbacks + usize::from(issue.has_feedback()),
                    )
                });

            LeaderboardEntry {
                user_id: user.id.clone(),
                username: user.username.clone(),
                score: reports_submitted as u64 * REPORT_POINTS
                    + ratings_given as u64 * RATING_POINTS
                    + feedbacks_provided as u64 * FEEDBACK_POINTS,
                reports_submitted,
                ratings_given,
                feedbacks_provided,
            }
        })
        .collect();

    entries.sort_by(|left, right| {
        right
            .score
            .cmp(&left.score)
            .then_with(|| right.reports_submitted.cmp(&left.reports_submitted))
            .then_with(|| left.username.cmp(&right.username))
    });

    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    entries
}
