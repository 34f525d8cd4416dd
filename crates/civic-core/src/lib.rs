use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

mod credentials;
mod lifecycle;
mod validate;

pub use credentials::{generate_reset_token, hash_password, verify_password};
pub use lifecycle::{Transition, TransitionError, apply_transition};
pub use validate::{
    ValidationError, validate_email, validate_feedback, validate_new_issue, validate_password,
    validate_rating, validate_username,
};

pub type IssueId = String;
pub type UserId = String;

pub const CITY_ADMIN_EMAIL_DOMAIN: &str = "@city.gov";
pub const PASSWORD_RESET_TTL_MS: i64 = 60 * 60 * 1000;

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub enum Department {
    Electrical,
    Water,
    Medical,
    Sanitation,
    Roads,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Self::Electrical,
        Self::Water,
        Self::Medical,
        Self::Sanitation,
        Self::Roads,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Electrical => "Electrical",
            Self::Water => "Water",
            Self::Medical => "Medical",
            Self::Sanitation => "Sanitation",
            Self::Roads => "Roads",
        }
    }

    /// Mailbox used for the provisioned admin account of this department.
    pub fn admin_email(self) -> String {
        format!(
            "{}{CITY_ADMIN_EMAIL_DOMAIN}",
            self.as_str().to_ascii_lowercase()
        )
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Department {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|department| department.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!(
                    "invalid department '{wanted}', expected one of: electrical, water, medical, sanitation, roads"
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub enum Category {
    Pothole,
    Garbage,
    Streetlight,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Self::Pothole,
        Self::Garbage,
        Self::Streetlight,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pothole => "Pothole",
            Self::Garbage => "Garbage",
            Self::Streetlight => "Streetlight",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!(
                    "invalid category '{wanted}', expected one of: pothole, garbage, streetlight, other"
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub enum Status {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
}

impl Status {
    pub const ALL: [Status; 3] = [Self::Pending, Self::InProgress, Self::Resolved];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
        }
    }

    /// Position in the lifecycle order Pending < InProgress < Resolved.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Resolved => 2,
        }
    }

    pub fn is_open(self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "inprogress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            _ => Err(format!(
                "invalid status '{}', expected one of: pending, in_progress, resolved",
                value.trim()
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub department: Department,
    pub photo: String,
    pub location: GeoPoint,
    pub created_at: i64,
    pub acknowledged_at: Option<i64>,
    pub resolved_at: Option<i64>,
    pub status: Status,
    pub user_id: UserId,
    pub user_email: String,
    pub username: String,
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl Issue {
    pub fn has_feedback(&self) -> bool {
        self.feedback
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }

    /// Time from creation to resolution, when the issue has been resolved.
    pub fn resolution_time_ms(&self) -> Option<i64> {
        if self.status != Status::Resolved {
            return None;
        }
        self.resolved_at.map(|resolved| resolved - self.created_at)
    }
}

/// Reporter-supplied fields of a new issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub department: Option<Department>,
    pub photo: String,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    #[serde(skip_serializing, default)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_reset_expires: Option<i64>,
}

impl User {
    /// Admin without a department assignment; may act on every department.
    pub fn is_super_admin(&self) -> bool {
        self.is_admin && self.department.is_none()
    }

    pub fn can_manage(&self, department: Department) -> bool {
        self.is_admin && self.department.is_none_or(|own| own == department)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    StatusUpdate,
    RatingReceived,
    FeedbackReceived,
    PasswordReset,
    General,
    Email,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatusUpdate => "StatusUpdate",
            Self::RatingReceived => "RatingReceived",
            Self::FeedbackReceived => "FeedbackReceived",
            Self::PasswordReset => "PasswordReset",
            Self::General => "General",
            Self::Email => "Email",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "StatusUpdate" => Ok(Self::StatusUpdate),
            "RatingReceived" => Ok(Self::RatingReceived),
            "FeedbackReceived" => Ok(Self::FeedbackReceived),
            "PasswordReset" => Ok(Self::PasswordReset),
            "General" => Ok(Self::General),
            "Email" => Ok(Self::Email),
            other => Err(format!("invalid notification kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMethod {
    #[serde(rename = "in-app")]
    InApp,
    #[serde(rename = "email")]
    Email,
}

impl DeliveryMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InApp => "in-app",
            Self::Email => "email",
        }
    }
}

impl std::str::FromStr for DeliveryMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in-app" => Ok(Self::InApp),
            "email" => Ok(Self::Email),
            other => Err(format!("invalid delivery method '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToAction {
    pub text: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta: Option<CallToAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub id: String,
    pub message: String,
    pub read: bool,
    pub created_at: i64,
    pub kind: NotificationKind,
    pub delivery: DeliveryMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailContent>,
}

impl NotificationMessage {
    pub fn in_app(kind: NotificationKind, message: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: generate_id("notif", now_ms),
            message: message.into(),
            read: false,
            created_at: now_ms,
            kind,
            delivery: DeliveryMethod::InApp,
            email: None,
        }
    }

    pub fn email(
        kind: NotificationKind,
        message: impl Into<String>,
        email: EmailContent,
        now_ms: i64,
    ) -> Self {
        Self {
            id: generate_id("notif", now_ms),
            message: message.into(),
            read: false,
            created_at: now_ms,
            kind,
            delivery: DeliveryMethod::Email,
            email: Some(email),
        }
    }
}

pub fn is_city_admin_email(email: &str) -> bool {
    email
        .trim()
        .to_ascii_lowercase()
        .ends_with(CITY_ADMIN_EMAIL_DOMAIN)
}

/// Trailing six characters of an issue id, as shown in admin messages.
pub fn short_issue_ref(id: &str) -> &str {
    let start = id
        .char_indices()
        .rev()
        .nth(5)
        .map(|(index, _)| index)
        .unwrap_or(0);
    &id[start..]
}

/// Builds `<prefix>-<now_ms>-<8 hex>` ids.
pub fn generate_id(prefix: &str, now_ms: i64) -> String {
    let digest = unique_digest(prefix);
    format!("{prefix}-{now_ms}-{}", &digest[..8])
}

pub fn current_unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

fn unique_digest(domain: &str) -> String {
    let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    let material = format!("{domain}\n{}\n{sequence}\n{nanos}", std::process::id());
    blake3::hash(material.as_bytes()).to_hex().to_string()
}
