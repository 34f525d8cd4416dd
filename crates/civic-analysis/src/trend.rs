use chrono::{DateTime, Datelike, Duration, NaiveTime};
use civic_core::Issue;
use serde::{Deserialize, Serialize};

use crate::{MS_PER_WEEK, ms_to_days};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTrend {
    pub period: String,
    pub avg_resolution_time_days: f64,
}

/// Start of the UTC calendar week (Sunday 00:00:00.000) containing `now_ms`.
pub fn week_start_ms(now_ms: i64) -> i64 {
    let Some(now) = DateTime::from_timestamp_millis(now_ms) else {
        return now_ms - now_ms.rem_euclid(MS_PER_WEEK);
    };
    let days_since_sunday = i64::from(now.weekday().num_days_from_sunday());
    let sunday = now.date_naive() - Duration::days(days_since_sunday);
    sunday.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Mean resolution time per calendar week, oldest bucket first.
///
/// Buckets are labelled `W<n>` down to `W0`, where `W0` is the week that
/// contains `now_ms`. Only resolved issues with a `resolved_at` stamp count;
/// an issue lands in the week its resolution happened. Empty weeks report 0.
pub fn weekly_trends<'a, I>(resolved: I, now_ms: i64, weeks: u32) -> Vec<WeeklyTrend>
where
    I: IntoIterator<Item = &'a Issue>,
{
    let resolved: Vec<(i64, i64)> = resolved
        .into_iter()
        .filter_map(|issue| {
            let resolved_at = issue.resolved_at?;
            issue
                .resolution_time_ms()
                .map(|duration| (resolved_at, duration))
        })
        .collect();

    let current_week_start = week_start_ms(now_ms);

    (0..weeks)
        .rev()
        .map(|weeks_back| {
            let start = current_week_start - i64::from(weeks_back) * MS_PER_WEEK;
            let end = start + MS_PER_WEEK - 1;

            let durations: Vec<i64> = resolved
                .iter()
                .filter(|(resolved_at, _)| (start..=end).contains(resolved_at))
                .map(|(_, duration)| *duration)
                .collect();

            let avg_resolution_time_days = if durations.is_empty() {
                0.0
            } else {
                let total: i64 = durations.iter().sum();
                ms_to_days(total as f64 / durations.len() as f64)
            };

            WeeklyTrend {
                period: format!("W{weeks_back}"),
                avg_resolution_time_days,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use civic_core::{Category, Department, GeoPoint, Status};

    use super::*;
    use crate::MS_PER_DAY;

    // Wednesday 2024-01-10T12:00:00Z
    const NOW: i64 = 1_704_888_000_000;
    // Sunday 2024-01-07T00:00:00Z
    const WEEK_START: i64 = 1_704_585_600_000;

    fn resolved(created_at: i64, resolved_at: i64) -> Issue {
        Issue {
            id: format!("issue-{created_at}"),
            title: "Leaking hydrant".to_owned(),
            description: "Water everywhere".to_owned(),
            category: Category::Other,
            department: Department::Water,
            photo: "photo".to_owned(),
            location: GeoPoint { lat: 0.0, lng: 0.0 },
            created_at,
            acknowledged_at: Some(created_at),
            resolved_at: Some(resolved_at),
            status: Status::Resolved,
            user_id: "user-1".to_owned(),
            user_email: "a@example.com".to_owned(),
            username: "alice".to_owned(),
            rating: None,
            feedback: None,
        }
    }

    #[test]
    fn week_starts_on_sunday_midnight_utc() {
        assert_eq!(week_start_ms(NOW), WEEK_START);
        assert_eq!(week_start_ms(WEEK_START), WEEK_START);
        assert_eq!(week_start_ms(WEEK_START - 1), WEEK_START - MS_PER_WEEK);
    }

    #[test]
    fn buckets_are_labelled_oldest_first() {
        let none: Vec<Issue> = Vec::new();
        let trends = weekly_trends(&none, NOW, 8);
        let labels: Vec<_> = trends.iter().map(|trend| trend.period.as_str()).collect();
        assert_eq!(labels, vec!["W7", "W6", "W5", "W4", "W3", "W2", "W1", "W0"]);
        assert!(trends.iter().all(|trend| trend.avg_resolution_time_days == 0.0));
    }

    #[test]
    fn resolutions_land_in_their_calendar_week() {
        let issues = vec![
            // two days to resolve, resolved this week
            resolved(WEEK_START - MS_PER_DAY, WEEK_START + MS_PER_DAY),
            // four days to resolve, also this week
            resolved(WEEK_START - 2 * MS_PER_DAY, WEEK_START + 2 * MS_PER_DAY),
            // one day, resolved on the last millisecond of the previous week
            resolved(WEEK_START - 1 - MS_PER_DAY, WEEK_START - 1),
            // outside the window
            resolved(0, WEEK_START - 20 * MS_PER_WEEK),
        ];

        let trends = weekly_trends(&issues, NOW, 3);
        assert_eq!(trends.len(), 3);
        assert_eq!(trends[0].period, "W2");
        assert_eq!(trends[0].avg_resolution_time_days, 0.0);
        assert_eq!(trends[1].period, "W1");
        assert_eq!(trends[1].avg_resolution_time_days, 1.0);
        assert_eq!(trends[2].period, "W0");
        assert_eq!(trends[2].avg_resolution_time_days, 3.0);
    }

    #[test]
    fn unresolved_issues_are_ignored() {
        let mut open = resolved(WEEK_START, WEEK_START + MS_PER_DAY);
        open.status = Status::InProgress;

        let trends = weekly_trends(&[open], NOW, 1);
        assert_eq!(trends[0].avg_resolution_time_days, 0.0);
    }
}
