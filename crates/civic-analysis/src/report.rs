use std::collections::BTreeMap;

use civic_core::{Category, Department, Issue, Status};
use serde::{Deserialize, Serialize};

use crate::ReportPolicy;
use crate::trend::{WeeklyTrend, weekly_trends};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentReport {
    pub total_requests: usize,
    pub resolved_requests: usize,
    pub pending_requests: usize,
    pub in_progress_requests: usize,
    pub overdue_requests: usize,
    pub avg_resolution_time_ms: f64,
    /// Percentage of resolved issues closed within the SLA target.
    pub sla_compliance_rate: f64,
    /// Mean of the 1-5 ratings given so far.
    pub avg_satisfaction: f64,
    pub category_distribution: BTreeMap<Category, usize>,
    pub weekly_trends: Vec<WeeklyTrend>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentReportRow {
    pub department: Department,
    #[serde(flatten)]
    pub report: DepartmentReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub resolved: usize,
}

pub fn department_report(
    issues: &[Issue],
    department: Department,
    now_ms: i64,
    policy: &ReportPolicy,
) -> DepartmentReport {
    let scoped: Vec<&Issue> = issues
        .iter()
        .filter(|issue| issue.department == department)
        .collect();

    let resolution_times: Vec<i64> = scoped
        .iter()
        .filter_map(|issue| issue.resolution_time_ms())
        .collect();
    let resolved_requests = resolution_times.len();

    let count_status = |status: Status| {
        scoped
            .iter()
            .filter(|issue| issue.status == status)
            .count()
    };

    let overdue_requests = scoped
        .iter()
        .filter(|issue| {
            issue.status.is_open() && now_ms - issue.created_at > policy.overdue_threshold_ms
        })
        .count();

    let avg_resolution_time_ms = if resolved_requests > 0 {
        resolution_times.iter().sum::<i64>() as f64 / resolved_requests as f64
    } else {
        0.0
    };

    let sla_compliance_rate = if resolved_requests > 0 {
        let compliant = resolution_times
            .iter()
            .filter(|elapsed| **elapsed <= policy.sla_target_ms)
            .count();
        compliant as f64 / resolved_requests as f64 * 100.0
    } else {
        100.0
    };

    let ratings: Vec<u8> = scoped
        .iter()
        .filter_map(|issue| issue.rating)
        .filter(|rating| *rating > 0)
        .collect();
    let avg_satisfaction = if ratings.is_empty() {
        0.0
    } else {
        ratings.iter().map(|rating| f64::from(*rating)).sum::<f64>() / ratings.len() as f64
    };

    let mut category_distribution = BTreeMap::new();
    for issue in &scoped {
        *category_distribution.entry(issue.category).or_insert(0) += 1;
    }

    let weekly_trends = weekly_trends(scoped.iter().copied(), now_ms, policy.trend_weeks);

    DepartmentReport {
        total_requests: scoped.len(),
        resolved_requests,
        pending_requests: count_status(Status::Pending),
        in_progress_requests: count_status(Status::InProgress),
        overdue_requests,
        avg_resolution_time_ms,
        sla_compliance_rate,
        avg_satisfaction,
        category_distribution,
        weekly_trends,
    }
}

/// One report per department, in `Department::ALL` order.
pub fn admin_report(
    issues: &[Issue],
    now_ms: i64,
    policy: &ReportPolicy,
) -> Vec<DepartmentReportRow> {
    Department::ALL
        .into_iter()
        .map(|department| DepartmentReportRow {
            department,
            report: department_report(issues, department, now_ms, policy),
        })
        .collect()
}

pub fn status_summary(issues: &[Issue]) -> StatusSummary {
    issues
        .iter()
        .fold(StatusSummary::default(), |mut summary, issue| {
            summary.total += 1;
            match issue.status {
                Status::Pending => summary.pending += 1,
                Status::InProgress => summary.in_progress += 1,
                Status::Resolved => summary.resolved += 1,
            }
            summary
        })
}

#[cfg(test)]
mod tests {
    use civic_core::GeoPoint;

    use super::*;

    const HOUR: i64 = 60 * 60 * 1000;
    // Wednesday 2024-01-10T12:00:00Z
    const NOW: i64 = 1_704_888_000_000;

    fn issue(department: Department, category: Category, created_at: i64) -> Issue {
        Issue {
            id: format!("issue-{created_at}-{}", category.as_str()),
            title: "Report".to_owned(),
            description: "Something is broken".to_owned(),
            category,
            department,
            photo: "photo".to_owned(),
            location: GeoPoint { lat: 1.0, lng: 1.0 },
            created_at,
            acknowledged_at: None,
            resolved_at: None,
            status: Status::Pending,
            user_id: "user-1".to_owned(),
            user_email: "a@example.com".to_owned(),
            username: "alice".to_owned(),
            rating: None,
            feedback: None,
        }
    }

    fn resolve(mut issue: Issue, after_ms: i64, rating: Option<u8>) -> Issue {
        issue.status = Status::Resolved;
        issue.acknowledged_at = Some(issue.created_at);
        issue.resolved_at = Some(issue.created_at + after_ms);
        issue.rating = rating;
        issue
    }

    #[test]
    fn empty_department_uses_defined_defaults() {
        let report = department_report(&[], Department::Medical, NOW, &ReportPolicy::default());

        assert_eq!(report.total_requests, 0);
        assert_eq!(report.avg_resolution_time_ms, 0.0);
        assert_eq!(report.sla_compliance_rate, 100.0);
        assert_eq!(report.avg_satisfaction, 0.0);
        assert!(report.category_distribution.is_empty());
        assert_eq!(report.weekly_trends.len(), 8);
    }

    #[test]
    fn department_report_counts_and_rates() {
        let policy = ReportPolicy::default();
        let mut in_progress = issue(Department::Roads, Category::Pothole, NOW - HOUR);
        in_progress.status = Status::InProgress;

        let issues = vec![
            // open and older than the overdue threshold
            issue(Department::Roads, Category::Pothole, NOW - 4 * HOUR),
            // open but recent
            in_progress,
            // resolved within the SLA target, exactly on the boundary
            resolve(
                issue(Department::Roads, Category::Pothole, NOW - 10 * HOUR),
                3 * HOUR,
                Some(5),
            ),
            // resolved late
            resolve(
                issue(Department::Roads, Category::Other, NOW - 20 * HOUR),
                5 * HOUR,
                Some(2),
            ),
            // other department, ignored
            resolve(
                issue(Department::Water, Category::Other, NOW - 20 * HOUR),
                HOUR,
                Some(1),
            ),
        ];

        let report = department_report(&issues, Department::Roads, NOW, &policy);

        assert_eq!(report.total_requests, 4);
        assert_eq!(report.pending_requests, 1);
        assert_eq!(report.in_progress_requests, 1);
        assert_eq!(report.resolved_requests, 2);
        assert_eq!(report.overdue_requests, 1);
        assert_eq!(report.avg_resolution_time_ms, (4 * HOUR) as f64);
        assert_eq!(report.sla_compliance_rate, 50.0);
        assert_eq!(report.avg_satisfaction, 3.5);
        assert_eq!(
            report.category_distribution.get(&Category::Pothole),
            Some(&3)
        );
        assert_eq!(report.category_distribution.get(&Category::Other), Some(&1));
        assert_eq!(report.category_distribution.get(&Category::Garbage), None);
    }

    #[test]
    fn resolved_without_timestamp_is_not_counted_as_resolved() {
        let mut odd = issue(Department::Water, Category::Other, NOW - HOUR);
        odd.status = Status::Resolved;

        let report = department_report(&[odd], Department::Water, NOW, &ReportPolicy::default());
        assert_eq!(report.total_requests, 1);
        assert_eq!(report.resolved_requests, 0);
        assert_eq!(report.overdue_requests, 0);
        assert_eq!(report.sla_compliance_rate, 100.0);
    }

    #[test]
    fn admin_report_covers_every_department_in_order() {
        let issues = vec![issue(Department::Sanitation, Category::Garbage, NOW)];
        let rows = admin_report(&issues, NOW, &ReportPolicy::default());

        let departments: Vec<_> = rows.iter().map(|row| row.department).collect();
        assert_eq!(departments, Department::ALL.to_vec());
        assert_eq!(rows[3].report.total_requests, 1);

        let json = serde_json::to_value(&rows[3]).expect("serialize row");
        assert_eq!(json["department"], "Sanitation");
        assert_eq!(json["total_requests"], 1);
        assert_eq!(json["category_distribution"]["Garbage"], 1);
    }

    #[test]
    fn status_summary_counts_each_state() {
        let mut in_progress = issue(Department::Roads, Category::Pothole, NOW);
        in_progress.status = Status::InProgress;
        let issues = vec![
            issue(Department::Roads, Category::Pothole, NOW),
            in_progress,
            resolve(issue(Department::Water, Category::Other, NOW), HOUR, None),
        ];

        assert_eq!(
            status_summary(&issues),
            StatusSummary {
                total: 3,
                pending: 1,
                in_progress: 1,
                resolved: 1,
            }
        );
    }
}
