use civic_analysis::{
    DepartmentReport, DepartmentReportRow, LeaderboardEntry, StatusSummary, admin_report,
    department_report, leaderboard, status_summary,
};
use civic_core::{Department, Issue, current_unix_timestamp_millis};
use civic_infer::report_insights;
use civic_store::{IssueQuery, Store};
use serde::Serialize;

use crate::service::{CivicService, ServiceError};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentReportView {
    pub department: Department,
    pub report: DepartmentReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<Vec<String>>,
}

impl CivicService {
    pub async fn department_report(
        &self,
        department: Department,
        with_insights: bool,
    ) -> Result<DepartmentReportView, ServiceError> {
        let issues = self.all_issues()?;
        let report = department_report(
            &issues,
            department,
            current_unix_timestamp_millis(),
            &self.report_policy(),
        );

        let insights = if with_insights {
            Some(report_insights(self.assistant(), &report, department).await)
        } else {
            None
        };

        Ok(DepartmentReportView {
            department,
            report,
            insights,
        })
    }

    pub fn admin_report(&self) -> Result<Vec<DepartmentReportRow>, ServiceError> {
        let issues = self.all_issues()?;
        Ok(admin_report(
            &issues,
            current_unix_timestamp_millis(),
            &self.report_policy(),
        ))
    }

    pub fn leaderboard(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        let store = self.open_store()?;
        let users = store.list_users()?;
        let issues = store.list_issues(&IssueQuery::all())?;
        Ok(leaderboard(
            &users,
            &issues,
            Some(limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT)),
        ))
    }

    pub fn stats(&self) -> Result<StatusSummary, ServiceError> {
        Ok(status_summary(&self.all_issues()?))
    }

    fn all_issues(&self) -> Result<Vec<Issue>, ServiceError> {
        let store = self.open_store()?;
        Ok(store.list_issues(&IssueQuery::all())?)
    }
}
