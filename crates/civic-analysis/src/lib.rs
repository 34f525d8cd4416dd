mod leaderboard;
mod report;
mod trend;

use civic_config::{MAX_TREND_WEEKS, ReportingConfig};
use serde::{Deserialize, Serialize};

pub use leaderboard::{LeaderboardEntry, leaderboard};
pub use report::{
    DepartmentReport, DepartmentReportRow, StatusSummary, admin_report, department_report,
    status_summary,
};
pub use trend::{WeeklyTrend, week_start_ms, weekly_trends};

pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
pub const MS_PER_WEEK: i64 = 7 * MS_PER_DAY;

/// Thresholds applied when aggregating issues into reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPolicy {
    pub sla_target_ms: i64,
    pub overdue_threshold_ms: i64,
    pub trend_weeks: u32,
}

impl ReportPolicy {
    pub fn from_config(config: &ReportingConfig) -> Self {
        Self {
            sla_target_ms: config.sla_target_ms(),
            overdue_threshold_ms: config.overdue_threshold_ms(),
            trend_weeks: config.trend_weeks.clamp(1, MAX_TREND_WEEKS),
        }
    }
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self::from_config(&ReportingConfig::default())
    }
}

pub(crate) fn ms_to_days(ms: f64) -> f64 {
    if ms > 0.0 { ms / MS_PER_DAY as f64 } else { 0.0 }
}
