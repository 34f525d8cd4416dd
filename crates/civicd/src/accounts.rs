use civic_core::{
    CallToAction, Department, EmailContent, NotificationKind, NotificationMessage,
    PASSWORD_RESET_TTL_MS, User, current_unix_timestamp_millis, generate_id, generate_reset_token,
    hash_password, is_city_admin_email, validate_email, validate_password, validate_username,
    verify_password,
};
use civic_store::{Store, StoreError};
use tracing::{debug, info};

use crate::notify::deliver;
use crate::service::{CivicService, ServiceError};

const SUPER_ADMIN_EMAIL: &str = "admin@city.gov";
const SUPER_ADMIN_USERNAME: &str = "admin";

impl CivicService {
    /// Creates a local account. Addresses on the city domain become admins.
    pub fn sign_up(
        &self,
        username: &str,
        email: &str,
        password: &str,
        department: Option<Department>,
    ) -> Result<User, ServiceError> {
        let username = username.trim();
        let email = email.trim().to_lowercase();
        validate_username(username)?;
        validate_email(&email)?;
        validate_password(password)?;

        let is_admin = is_city_admin_email(&email);
        let user = User {
            id: generate_id("user", current_unix_timestamp_millis()),
            username: username.to_owned(),
            email,
            password_hash: hash_password(password),
            is_admin,
            department: department.filter(|_| is_admin),
            password_reset_token: None,
            password_reset_expires: None,
        };

        let store = self.open_store()?;
        store.insert_user(&user)?;

        info!(user_id = %user.id, username = %user.username, is_admin, "account created");
        Ok(user)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let store = self.open_store()?;
        let user = store
            .find_user_by_email(email)?
            .filter(|user| verify_password(password, &user.password_hash))
            .ok_or(ServiceError::InvalidCredentials)?;

        debug!(user_id = %user.id, "signed in");
        Ok(user)
    }

    /// Passkey login for the city-wide administrator, provisioning the
    /// account on first use.
    pub fn login_super_admin(&self, passkey: &str) -> Result<User, ServiceError> {
        if passkey.trim() != self.config().access.super_admin_passkey {
            return Err(ServiceError::InvalidPasskey);
        }
        self.provision_admin(SUPER_ADMIN_USERNAME, SUPER_ADMIN_EMAIL, None)
    }

    pub fn login_department_admin(
        &self,
        department: Department,
        passkey: &str,
    ) -> Result<User, ServiceError> {
        let expected = self
            .config()
            .access
            .department_passkeys
            .for_department(department.as_str());
        if expected != Some(passkey.trim()) {
            return Err(ServiceError::InvalidPasskey);
        }
        self.provision_admin(
            department.as_str(),
            &department.admin_email(),
            Some(department),
        )
    }

    /// Starts a password reset. Unknown addresses are accepted silently.
    pub fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let store = self.open_store()?;
        let Some(mut user) = store.find_user_by_email(email)? else {
            debug!("password reset requested for unknown email");
            return Ok(());
        };

        let now = current_unix_timestamp_millis();
        let token = generate_reset_token();
        user.password_reset_token = Some(token.clone());
        user.password_reset_expires = Some(now + PASSWORD_RESET_TTL_MS);
        store.save_user(&user)?;

        let email = EmailContent {
            subject: "Reset your password".to_owned(),
            body: format!(
                "Hi {}, we received a request to reset your password. \
                 The link below is valid for one hour. If you did not ask for this, \
                 you can ignore this message.",
                user.username
            ),
            cta: Some(CallToAction {
                text: "Reset password".to_owned(),
                link: format!("/reset-password?token={token}"),
            }),
        };
        let notification = NotificationMessage::email(
            NotificationKind::PasswordReset,
            "A password reset link was sent to your email.",
            email,
            now,
        );
        deliver(&store, &user.id, &notification)?;

        info!(user_id = %user.id, "password reset requested");
        Ok(())
    }

    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<User, ServiceError> {
        self.reset_password_at(token, new_password, current_unix_timestamp_millis())
    }

    /// Tokens are valid strictly before their expiry instant.
    fn reset_password_at(
        &self,
        token: &str,
        new_password: &str,
        now: i64,
    ) -> Result<User, ServiceError> {
        validate_password(new_password)?;

        let store = self.open_store()?;
        let mut user = store
            .find_user_by_reset_token(token)?
            .filter(|user| {
                user.password_reset_expires
                    .is_some_and(|expires| expires > now)
            })
            .ok_or(ServiceError::InvalidResetToken)?;

        user.password_hash = hash_password(new_password);
        user.password_reset_token = None;
        user.password_reset_expires = None;
        store.save_user(&user)?;

        deliver(
            &store,
            &user.id,
            &NotificationMessage::in_app(
                NotificationKind::General,
                "Your password has been changed.",
                now,
            ),
        )?;

        info!(user_id = %user.id, "password reset completed");
        Ok(user)
    }

    /// The user's inbox, newest first.
    pub fn notifications(&self, user_id: &str) -> Result<Vec<NotificationMessage>, ServiceError> {
        let user = self.require_user(user_id)?;
        let store = self.open_store()?;
        Ok(store.list_notifications(&user.id)?)
    }

    pub fn mark_notifications_read(&self, user_id: &str) -> Result<usize, ServiceError> {
        let user = self.require_user(user_id)?;
        let store = self.open_store()?;
        Ok(store.mark_notifications_read(&user.id)?)
    }

    pub fn unread_notification_count(&self, user_id: &str) -> Result<usize, ServiceError> {
        let store = self.open_store()?;
        Ok(store.unread_notification_count(user_id)?)
    }

    fn provision_admin(
        &self,
        username: &str,
        email: &str,
        department: Option<Department>,
    ) -> Result<User, ServiceError> {
        let store = self.open_store()?;
        if let Some(existing) = store.find_user_by_email(email)? {
            return Ok(existing);
        }

        let user = User {
            id: generate_id("user", current_unix_timestamp_millis()),
            username: username.to_owned(),
            email: email.to_owned(),
            // Passkey accounts have no usable password until one is reset.
            password_hash: hash_password(&generate_reset_token()),
            is_admin: true,
            department,
            password_reset_token: None,
            password_reset_expires: None,
        };

        match store.insert_user(&user) {
            Ok(()) => {
                info!(
                    user_id = %user.id,
                    email,
                    department = department.map(Department::as_str),
                    "admin account provisioned"
                );
                Ok(user)
            }
            Err(StoreError::Conflict(message)) => store
                .find_user_by_email(email)?
                .ok_or(ServiceError::Conflict(message)),
            Err(err) => Err(err.into()),
        }
    }
}
