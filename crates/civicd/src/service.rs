use std::path::{Path, PathBuf};
use std::sync::Arc;

use civic_analysis::ReportPolicy;
use civic_config::CivicConfig;
use civic_core::{Department, TransitionError, User, ValidationError};
use civic_infer::{AssistantProvider, LoadedProvider};
use civic_store::{SqliteStore, Store, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid passkey")]
    InvalidPasskey,
    #[error("password reset token is invalid or has expired")]
    InvalidResetToken,
    #[error("unknown acting user '{0}'")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => Self::Conflict(message),
            other => Self::Store(other),
        }
    }
}

/// Shared handle over the data root, configuration and assistant.
///
/// Each operation opens its own store connection, so the handle is cheap to
/// clone into request handlers.
#[derive(Clone)]
pub struct CivicService {
    root: PathBuf,
    config: Arc<CivicConfig>,
    assistant: LoadedProvider,
}

impl CivicService {
    pub fn new(
        root: impl AsRef<Path>,
        config: CivicConfig,
        assistant: LoadedProvider,
    ) -> Result<Self, ServiceError> {
        let root = root.as_ref().to_path_buf();
        SqliteStore::open(&root)?;

        Ok(Self {
            root,
            config: Arc::new(config),
            assistant,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &CivicConfig {
        &self.config
    }

    pub fn assistant(&self) -> &dyn AssistantProvider {
        self.assistant.provider.as_ref()
    }

    pub fn assistant_name(&self) -> &str {
        &self.assistant.provider_name
    }

    pub fn report_policy(&self) -> ReportPolicy {
        ReportPolicy::from_config(&self.config.reporting)
    }

    pub(crate) fn open_store(&self) -> Result<SqliteStore, ServiceError> {
        Ok(SqliteStore::open(&self.root)?)
    }

    /// Loads the acting user, rejecting ids that match no account.
    pub fn require_user(&self, user_id: &str) -> Result<User, ServiceError> {
        let store = self.open_store()?;
        store
            .get_user(user_id)?
            .ok_or_else(|| ServiceError::Unauthenticated(user_id.to_owned()))
    }

    pub fn require_admin(&self, user_id: &str) -> Result<User, ServiceError> {
        let user = self.require_user(user_id)?;
        if !user.is_admin {
            return Err(ServiceError::Forbidden(
                "administrator access required".to_owned(),
            ));
        }
        Ok(user)
    }

    pub fn require_super_admin(&self, user_id: &str) -> Result<User, ServiceError> {
        let user = self.require_admin(user_id)?;
        if !user.is_super_admin() {
            return Err(ServiceError::Forbidden(
                "super administrator access required".to_owned(),
            ));
        }
        Ok(user)
    }

    pub fn require_department_admin(
        &self,
        user_id: &str,
        department: Department,
    ) -> Result<User, ServiceError> {
        let user = self.require_admin(user_id)?;
        ensure_can_manage(&user, department)?;
        Ok(user)
    }
}

pub(crate) fn ensure_can_manage(user: &User, department: Department) -> Result<(), ServiceError> {
    if user.can_manage(department) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "user '{}' may not manage the {department} department",
            user.username
        )))
    }
}
