use civic_core::{
    CallToAction, EmailContent, Issue, NewIssue, NotificationKind, NotificationMessage, Status,
    Transition, apply_transition, current_unix_timestamp_millis, generate_id, short_issue_ref,
    validate_feedback, validate_new_issue, validate_rating,
};
use civic_infer::{RoutingDecision, route_department, status_reply};
use civic_store::{IssueQuery, Store};
use serde::Serialize;
use tracing::{debug, info};

use crate::notify::deliver;
use crate::service::{CivicService, ServiceError, ensure_can_manage};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub issue: Issue,
    pub from: Status,
    pub to: Status,
}

impl StatusChange {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmittedIssue {
    pub issue: Issue,
    /// Present when the department was chosen automatically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackOutcome {
    pub issue: Issue,
    pub unread_notifications: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackReply {
    pub issue_id: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    pub reply: String,
}

impl CivicService {
    /// Moves an issue to `target` on behalf of an administrator.
    ///
    /// An unknown issue yields `Ok(None)` with no side effects. A same-status
    /// request returns the issue untouched. Otherwise the issue is persisted
    /// and exactly two notifications go out: one to the reporter (in-app for
    /// In Progress, simulated email for Resolved) and one to the actor.
    pub fn update_status(
        &self,
        issue_id: &str,
        target: Status,
        actor_id: &str,
    ) -> Result<Option<StatusChange>, ServiceError> {
        let store = self.open_store()?;
        let actor = store.get_user(actor_id)?;
        let now = current_unix_timestamp_millis();

        let updated = store.modify_issue(issue_id, |issue| -> Result<_, ServiceError> {
            let actor = actor
                .as_ref()
                .ok_or_else(|| ServiceError::Unauthenticated(actor_id.to_owned()))?;
            ensure_can_manage(actor, issue.department)?;
            let from = issue.status;
            let transition = apply_transition(issue, target, now)?;
            Ok((from, transition))
        })?;
        let Some((issue, (from, transition))) = updated else {
            debug!(issue_id, "status update for unknown issue");
            return Ok(None);
        };

        if matches!(transition, Transition::Unchanged) {
            debug!(issue_id = %issue.id, status = %target, "status unchanged");
            return Ok(Some(StatusChange {
                issue,
                from,
                to: target,
            }));
        }

        deliver(&store, &issue.user_id, &reporter_status_notice(&issue, now))?;
        deliver(
            &store,
            actor_id,
            &NotificationMessage::in_app(
                NotificationKind::General,
                format!(
                    "Status for issue #{} updated to {target}.",
                    short_issue_ref(&issue.id)
                ),
                now,
            ),
        )?;

        info!(
            issue_id = %issue.id,
            from = %from,
            to = %target,
            actor_id,
            "issue status updated"
        );
        Ok(Some(StatusChange {
            issue,
            from,
            to: target,
        }))
    }

    /// Files a new report. Reports without a department are routed by the
    /// assistant, falling back to category rules.
    pub async fn submit_issue(
        &self,
        reporter_id: &str,
        new_issue: NewIssue,
    ) -> Result<SubmittedIssue, ServiceError> {
        validate_new_issue(&new_issue)?;
        let reporter = self.require_user(reporter_id)?;

        let (department, routing) = match new_issue.department {
            Some(department) => (department, None),
            None => {
                let decision = route_department(
                    self.assistant(),
                    &new_issue.title,
                    &new_issue.description,
                    new_issue.category,
                )
                .await;
                (decision.department, Some(decision))
            }
        };

        let now = current_unix_timestamp_millis();
        let issue = Issue {
            id: generate_id("issue", now),
            title: new_issue.title.trim().to_owned(),
            description: new_issue.description.trim().to_owned(),
            category: new_issue.category,
            department,
            photo: new_issue.photo,
            location: new_issue.location,
            created_at: now,
            acknowledged_at: None,
            resolved_at: None,
            status: Status::Pending,
            user_id: reporter.id,
            user_email: reporter.email,
            username: reporter.username,
            rating: None,
            feedback: None,
        };

        let store = self.open_store()?;
        store.insert_issue(&issue)?;

        if let Some(admin) = store.find_admin_by_department(department)? {
            deliver(
                &store,
                &admin.id,
                &NotificationMessage::in_app(
                    NotificationKind::General,
                    format!(
                        "New {} report \"{}\" was submitted to your department.",
                        issue.category, issue.title
                    ),
                    now,
                ),
            )?;
        }

        info!(
            issue_id = %issue.id,
            department = %department,
            routed = routing.is_some(),
            "issue submitted"
        );
        Ok(SubmittedIssue { issue, routing })
    }

    /// Records the reporter's 1-5 rating on a resolved issue. Re-rating
    /// replaces the earlier value.
    pub fn rate_issue(
        &self,
        reporter_id: &str,
        issue_id: &str,
        rating: u8,
    ) -> Result<Issue, ServiceError> {
        validate_rating(rating)?;
        let store = self.open_store()?;
        let issue = modify_reported_issue(&store, reporter_id, issue_id, |issue| {
            if issue.status != Status::Resolved {
                return Err(ServiceError::Conflict(format!(
                    "issue '{}' can only be rated once resolved",
                    issue.id
                )));
            }
            issue.rating = Some(rating);
            Ok(())
        })?;

        let now = current_unix_timestamp_millis();
        if let Some(admin) = store.find_admin_by_department(issue.department)? {
            deliver(
                &store,
                &admin.id,
                &NotificationMessage::in_app(
                    NotificationKind::RatingReceived,
                    format!(
                        "Issue #{} \"{}\" received a {rating}-star rating.",
                        short_issue_ref(&issue.id),
                        issue.title
                    ),
                    now,
                ),
            )?;
        }

        info!(issue_id = %issue.id, rating, "issue rated");
        Ok(issue)
    }

    pub fn add_feedback(
        &self,
        reporter_id: &str,
        issue_id: &str,
        feedback: &str,
    ) -> Result<FeedbackOutcome, ServiceError> {
        validate_feedback(feedback)?;
        let store = self.open_store()?;
        let issue = modify_reported_issue(&store, reporter_id, issue_id, |issue| {
            issue.feedback = Some(feedback.trim().to_owned());
            Ok(())
        })?;

        let now = current_unix_timestamp_millis();
        if let Some(admin) = store.find_admin_by_department(issue.department)? {
            deliver(
                &store,
                &admin.id,
                &NotificationMessage::in_app(
                    NotificationKind::FeedbackReceived,
                    format!(
                        "New feedback on issue #{} \"{}\".",
                        short_issue_ref(&issue.id),
                        issue.title
                    ),
                    now,
                ),
            )?;
        }
        deliver(
            &store,
            &issue.user_id,
            &NotificationMessage::in_app(
                NotificationKind::General,
                format!("Thank you for your feedback on \"{}\".", issue.title),
                now,
            ),
        )?;

        let unread_notifications = store.unread_notification_count(&issue.user_id)?;
        info!(issue_id = %issue.id, "feedback recorded");
        Ok(FeedbackOutcome {
            issue,
            unread_notifications,
        })
    }

    pub fn get_issue(&self, issue_id: &str) -> Result<Option<Issue>, ServiceError> {
        let store = self.open_store()?;
        Ok(store.get_issue(issue_id)?)
    }

    /// Admin triage listing. Department admins only ever see their own
    /// department.
    pub fn list_issues(
        &self,
        actor_id: &str,
        mut query: IssueQuery,
    ) -> Result<Vec<Issue>, ServiceError> {
        let actor = self.require_admin(actor_id)?;
        if let Some(own) = actor.department {
            if let Some(requested) = query.department {
                ensure_can_manage(&actor, requested)?;
            }
            query.department = Some(own);
        }

        let store = self.open_store()?;
        Ok(store.list_issues(&query)?)
    }

    /// The user's own reports, newest first.
    pub fn issues_for_reporter(&self, user_id: &str) -> Result<Vec<Issue>, ServiceError> {
        let user = self.require_user(user_id)?;
        let store = self.open_store()?;
        Ok(store.list_issues(&IssueQuery::for_reporter(user.id))?)
    }

    pub fn public_resolved_feed(&self, limit: Option<u32>) -> Result<Vec<Issue>, ServiceError> {
        let store = self.open_store()?;
        Ok(store.list_issues(&IssueQuery {
            status: Some(Status::Resolved),
            limit,
            ..IssueQuery::default()
        })?)
    }

    /// Assistant-written status answer for a tracking request.
    pub async fn track_issue(&self, issue_id: &str) -> Result<TrackReply, ServiceError> {
        let issue_id = issue_id.trim();
        let issue = self.get_issue(issue_id)?;
        let reply = status_reply(self.assistant(), issue.as_ref(), issue_id).await;

        Ok(TrackReply {
            issue_id: issue_id.to_owned(),
            found: issue.is_some(),
            status: issue.map(|issue| issue.status),
            reply,
        })
    }
}

/// Applies a reporter-only change to an issue in one store transaction.
fn modify_reported_issue<F>(
    store: &impl Store,
    reporter_id: &str,
    issue_id: &str,
    apply: F,
) -> Result<Issue, ServiceError>
where
    F: FnOnce(&mut Issue) -> Result<(), ServiceError>,
{
    store
        .modify_issue(issue_id, |issue| {
            if issue.user_id != reporter_id {
                return Err(ServiceError::Forbidden(
                    "only the reporter may rate or comment on this issue".to_owned(),
                ));
            }
            apply(issue)
        })?
        .map(|(issue, ())| issue)
        .ok_or_else(|| ServiceError::NotFound(format!("issue '{issue_id}' not found")))
}

fn reporter_status_notice(issue: &Issue, now: i64) -> NotificationMessage {
    match issue.status {
        Status::Resolved => NotificationMessage::email(
            NotificationKind::Email,
            format!("Your report \"{}\" has been resolved.", issue.title),
            EmailContent {
                subject: format!("Resolved: {}", issue.title),
                body: format!(
                    "Hi {}, good news: the {} department has resolved your report \"{}\". \
                     Tell us how we did.",
                    issue.username, issue.department, issue.title
                ),
                cta: Some(CallToAction {
                    text: "Leave feedback".to_owned(),
                    link: format!("/issues/{}/feedback", issue.id),
                }),
            },
            now,
        ),
        status => NotificationMessage::in_app(
            NotificationKind::StatusUpdate,
            format!(
                "The status of your report \"{}\" has been updated to \"{status}\".",
                issue.title
            ),
            now,
        ),
    }
}
