pub mod accounts;
pub mod cli;
pub mod http;
pub mod lifecycle;
pub mod logging;
mod notify;
pub mod reports;
pub mod service;

pub use lifecycle::{FeedbackOutcome, StatusChange, SubmittedIssue, TrackReply};
pub use reports::DepartmentReportView;
pub use service::{CivicService, ServiceError};
