use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use civic_analysis::{DepartmentReportRow, LeaderboardEntry, StatusSummary};
use civic_core::{Category, Department, Issue, NewIssue, NotificationMessage, Status, User};
use civic_store::IssueQuery;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::lifecycle::{FeedbackOutcome, StatusChange, SubmittedIssue, TrackReply};
use crate::reports::DepartmentReportView;
use crate::service::{CivicService, ServiceError};

/// Header carrying the id of the signed-in user making the request.
pub const ACTOR_HEADER: &str = "x-civic-user";

#[derive(Debug, Clone)]
pub struct ApiFailure {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    fn invalid_json(rejection: &JsonRejection) -> Self {
        Self::new(rejection.status(), "invalid_json", rejection.body_text())
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    fn issue_not_found(issue_id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("issue '{issue_id}' not found"),
        )
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiFailure {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Validation(_) => Self::bad_request(message),
            ServiceError::InvalidResetToken => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_reset_token", message)
            }
            ServiceError::InvalidCredentials => {
                Self::new(StatusCode::UNAUTHORIZED, "invalid_credentials", message)
            }
            ServiceError::InvalidPasskey => {
                Self::new(StatusCode::UNAUTHORIZED, "invalid_passkey", message)
            }
            ServiceError::Unauthenticated(_) => {
                Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
            }
            ServiceError::Forbidden(_) => Self::new(StatusCode::FORBIDDEN, "forbidden", message),
            ServiceError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            ServiceError::Conflict(_) => Self::new(StatusCode::CONFLICT, "conflict", message),
            ServiceError::InvalidTransition(_) => {
                Self::new(StatusCode::CONFLICT, "invalid_transition", message)
            }
            ServiceError::Store(_) => {
                error!(error = %message, "request failed on store access");
                Self::internal(message)
            }
        }
    }
}

/// Acting user id taken from the [`ACTOR_HEADER`] header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_owned()))
            .ok_or_else(|| {
                ApiFailure::new(
                    StatusCode::UNAUTHORIZED,
                    "unauthenticated",
                    format!("missing {ACTOR_HEADER} header"),
                )
            })
    }
}

#[derive(Debug, Clone, Serialize)]
struct SessionResponse {
    user: User,
    unread_notifications: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct SignUpRequest {
    username: String,
    email: String,
    password: String,
    #[serde(default)]
    department: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PasskeyRequest {
    passkey: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DepartmentPasskeyRequest {
    department: String,
    passkey: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PasswordResetRequest {
    email: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PasswordResetConfirmRequest {
    token: String,
    new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StatusRequest {
    status: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RatingRequest {
    rating: u8,
}

#[derive(Debug, Clone, Deserialize)]
struct FeedbackRequest {
    feedback: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TrackRequest {
    issue_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct IssueListParams {
    department: Option<String>,
    status: Option<String>,
    category: Option<String>,
    user_id: Option<String>,
    q: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LimitParams {
    limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ReportParams {
    #[serde(default)]
    insights: bool,
}

#[derive(Debug, Clone, Serialize)]
struct NotificationsResponse {
    notifications: Vec<NotificationMessage>,
    unread: usize,
}

pub fn router(service: CivicService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/auth/admin/super", post(login_super_admin))
        .route("/auth/admin/department", post(login_department_admin))
        .route("/auth/password-reset", post(request_password_reset))
        .route("/auth/password-reset/confirm", post(confirm_password_reset))
        .route("/issues", post(submit_issue).get(list_issues))
        .route("/issues/mine", get(my_issues))
        .route("/issues/public", get(public_issues))
        .route("/issues/{id}", get(get_issue))
        .route("/issues/{id}/status", post(update_status))
        .route("/issues/{id}/rating", post(rate_issue))
        .route("/issues/{id}/feedback", post(add_feedback))
        .route("/track", post(track_issue))
        .route("/notifications", get(notifications))
        .route("/notifications/read", post(mark_notifications_read))
        .route("/reports/departments/{department}", get(department_report))
        .route("/reports/admin", get(admin_report))
        .route("/leaderboard", get(leaderboard))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

pub async fn serve(service: CivicService, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "civic API listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("civic API stopped");
    Ok(())
}

async fn health(State(service): State<CivicService>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "assistant": service.assistant_name(),
    }))
}

async fn sign_up(
    State(service): State<CivicService>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiFailure> {
    let Json(request) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    let department = request
        .department
        .as_deref()
        .map(parse_param::<Department>)
        .transpose()?;

    let user = service.sign_up(
        &request.username,
        &request.email,
        &request.password,
        department,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            user,
            unread_notifications: 0,
        }),
    ))
}

async fn sign_in(
    State(service): State<CivicService>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiFailure> {
    let Json(request) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    let user = service.sign_in(&request.email, &request.password)?;
    session(&service, user)
}

async fn login_super_admin(
    State(service): State<CivicService>,
    payload: Result<Json<PasskeyRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiFailure> {
    let Json(request) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    let user = service.login_super_admin(&request.passkey)?;
    session(&service, user)
}

async fn login_department_admin(
    State(service): State<CivicService>,
    payload: Result<Json<DepartmentPasskeyRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiFailure> {
    let Json(request) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    let department = parse_param::<Department>(&request.department)?;
    let user = service.login_department_admin(department, &request.passkey)?;
    session(&service, user)
}

async fn request_password_reset(
    State(service): State<CivicService>,
    payload: Result<Json<PasswordResetRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiFailure> {
    let Json(request) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    service.request_password_reset(&request.email)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}

async fn confirm_password_reset(
    State(service): State<CivicService>,
    payload: Result<Json<PasswordResetConfirmRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiFailure> {
    let Json(request) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    let user = service.reset_password(&request.token, &request.new_password)?;
    session(&service, user)
}

async fn submit_issue(
    State(service): State<CivicService>,
    Actor(actor): Actor,
    payload: Result<Json<NewIssue>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmittedIssue>), ApiFailure> {
    let Json(new_issue) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    let submitted = service.submit_issue(&actor, new_issue).await?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

async fn list_issues(
    State(service): State<CivicService>,
    Actor(actor): Actor,
    Query(params): Query<IssueListParams>,
) -> Result<Json<Vec<Issue>>, ApiFailure> {
    let query = IssueQuery {
        department: parse_optional_param(params.department.as_deref())?,
        status: parse_optional_param(params.status.as_deref())?,
        category: parse_optional_param::<Category>(params.category.as_deref())?,
        user_id: params.user_id,
        text: params.q,
        limit: params.limit,
    };
    run_blocking(service, move |service| service.list_issues(&actor, query))
        .await
        .map(Json)
}

async fn my_issues(
    State(service): State<CivicService>,
    Actor(actor): Actor,
) -> Result<Json<Vec<Issue>>, ApiFailure> {
    run_blocking(service, move |service| service.issues_for_reporter(&actor))
        .await
        .map(Json)
}

async fn public_issues(
    State(service): State<CivicService>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<Issue>>, ApiFailure> {
    run_blocking(service, move |service| {
        service.public_resolved_feed(params.limit)
    })
    .await
    .map(Json)
}

async fn get_issue(
    State(service): State<CivicService>,
    Path(issue_id): Path<String>,
) -> Result<Json<Issue>, ApiFailure> {
    service
        .get_issue(&issue_id)?
        .map(Json)
        .ok_or_else(|| ApiFailure::issue_not_found(&issue_id))
}

async fn update_status(
    State(service): State<CivicService>,
    Actor(actor): Actor,
    Path(issue_id): Path<String>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<StatusChange>, ApiFailure> {
    let Json(request) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    let target = parse_param::<Status>(&request.status)?;

    let lookup_id = issue_id.clone();
    run_blocking(service, move |service| {
        service.update_status(&lookup_id, target, &actor)
    })
    .await?
    .map(Json)
    .ok_or_else(|| ApiFailure::issue_not_found(&issue_id))
}

async fn rate_issue(
    State(service): State<CivicService>,
    Actor(actor): Actor,
    Path(issue_id): Path<String>,
    payload: Result<Json<RatingRequest>, JsonRejection>,
) -> Result<Json<Issue>, ApiFailure> {
    let Json(request) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    run_blocking(service, move |service| {
        service.rate_issue(&actor, &issue_id, request.rating)
    })
    .await
    .map(Json)
}

async fn add_feedback(
    State(service): State<CivicService>,
    Actor(actor): Actor,
    Path(issue_id): Path<String>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackOutcome>, ApiFailure> {
    let Json(request) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    run_blocking(service, move |service| {
        service.add_feedback(&actor, &issue_id, &request.feedback)
    })
    .await
    .map(Json)
}

async fn track_issue(
    State(service): State<CivicService>,
    payload: Result<Json<TrackRequest>, JsonRejection>,
) -> Result<Json<TrackReply>, ApiFailure> {
    let Json(request) = payload.map_err(|rejection| ApiFailure::invalid_json(&rejection))?;
    Ok(Json(service.track_issue(&request.issue_id).await?))
}

async fn notifications(
    State(service): State<CivicService>,
    Actor(actor): Actor,
) -> Result<Json<NotificationsResponse>, ApiFailure> {
    let notifications = service.notifications(&actor)?;
    let unread = notifications.iter().filter(|item| !item.read).count();
    Ok(Json(NotificationsResponse {
        notifications,
        unread,
    }))
}

async fn mark_notifications_read(
    State(service): State<CivicService>,
    Actor(actor): Actor,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let marked = service.mark_notifications_read(&actor)?;
    Ok(Json(json!({ "marked": marked })))
}

async fn department_report(
    State(service): State<CivicService>,
    Actor(actor): Actor,
    Path(department): Path<String>,
    Query(params): Query<ReportParams>,
) -> Result<Json<DepartmentReportView>, ApiFailure> {
    let department = parse_param::<Department>(&department)?;
    service.require_department_admin(&actor, department)?;
    Ok(Json(
        service
            .department_report(department, params.insights)
            .await?,
    ))
}

async fn admin_report(
    State(service): State<CivicService>,
    Actor(actor): Actor,
) -> Result<Json<Vec<DepartmentReportRow>>, ApiFailure> {
    run_blocking(service, move |service| {
        service.require_super_admin(&actor)?;
        service.admin_report()
    })
    .await
    .map(Json)
}

async fn leaderboard(
    State(service): State<CivicService>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiFailure> {
    let limit = params.limit.map(|limit| limit as usize);
    run_blocking(service, move |service| service.leaderboard(limit))
        .await
        .map(Json)
}

async fn stats(
    State(service): State<CivicService>,
) -> Result<Json<StatusSummary>, ApiFailure> {
    run_blocking(service, |service| service.stats()).await.map(Json)
}

/// Runs store-bound service work on the blocking pool.
async fn run_blocking<T, F>(service: CivicService, work: F) -> Result<T, ApiFailure>
where
    T: Send + 'static,
    F: FnOnce(&CivicService) -> Result<T, ServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&service))
        .await
        .map_err(|err| {
            error!(error = %err, "blocking request task failed");
            ApiFailure::internal(format!("request task failed: {err}"))
        })?
        .map_err(ApiFailure::from)
}

fn session(service: &CivicService, user: User) -> Result<Json<SessionResponse>, ApiFailure> {
    let unread_notifications = service.unread_notification_count(&user.id)?;
    Ok(Json(SessionResponse {
        user,
        unread_notifications,
    }))
}

fn parse_param<T>(value: &str) -> Result<T, ApiFailure>
where
    T: FromStr<Err = String>,
{
    value.parse::<T>().map_err(ApiFailure::bad_request)
}

fn parse_optional_param<T>(value: Option<&str>) -> Result<Option<T>, ApiFailure>
where
    T: FromStr<Err = String>,
{
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(parse_param)
        .transpose()
}
