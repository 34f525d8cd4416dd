use thiserror::Error;

use crate::NewIssue;

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 20;
const PASSWORD_MIN_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(
        "username must be 3-20 characters long and can only contain letters, numbers, and underscores"
    )]
    InvalidUsername,
    #[error("email address '{0}' is not valid")]
    InvalidEmail(String),
    #[error("password must be at least 6 characters long")]
    PasswordTooShort,
    #[error("rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(u8),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("location must have latitude in [-90, 90] and longitude in [-180, 180]")]
    InvalidLocation,
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    let allowed = username
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');

    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) || !allowed {
        return Err(ValidationError::InvalidUsername);
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let trimmed = email.trim();
    let invalid = || ValidationError::InvalidEmail(trimmed.to_owned());

    let (local, domain) = trimmed.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || trimmed.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

pub fn validate_rating(rating: u8) -> Result<(), ValidationError> {
    if !(1..=5).contains(&rating) {
        return Err(ValidationError::RatingOutOfRange(rating));
    }
    Ok(())
}

pub fn validate_feedback(feedback: &str) -> Result<(), ValidationError> {
    if feedback.trim().is_empty() {
        return Err(ValidationError::EmptyField("feedback"));
    }
    Ok(())
}

pub fn validate_new_issue(issue: &NewIssue) -> Result<(), ValidationError> {
    for (field, value) in [
        ("title", issue.title.as_str()),
        ("description", issue.description.as_str()),
        ("photo", issue.photo.as_str()),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyField(field));
        }
    }

    if !issue.location.is_valid() {
        return Err(ValidationError::InvalidLocation);
    }
    Ok(())
}
