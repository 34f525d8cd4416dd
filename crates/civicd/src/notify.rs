use civic_core::{DeliveryMethod, NotificationMessage};
use civic_store::Store;
use tracing::{debug, info};

use crate::service::ServiceError;

/// Prepends `notification` to the user's inbox.
///
/// Returns `false` without storing anything when the user does not exist.
/// Email deliveries are simulated: the message is stored like any other and
/// the send is logged.
pub(crate) fn deliver(
    store: &impl Store,
    user_id: &str,
    notification: &NotificationMessage,
) -> Result<bool, ServiceError> {
    let Some(user) = store.get_user(user_id)? else {
        debug!(
            user_id,
            kind = notification.kind.as_str(),
            "skipping notification for unknown user"
        );
        return Ok(false);
    };

    store.push_notification(&user.id, notification)?;

    if notification.delivery == DeliveryMethod::Email {
        let subject = notification
            .email
            .as_ref()
            .map(|email| email.subject.as_str())
            .unwrap_or_default();
        info!(
            to = %user.email,
            subject,
            kind = notification.kind.as_str(),
            "simulated email sent"
        );
    } else {
        debug!(
            user_id = %user.id,
            kind = notification.kind.as_str(),
            "in-app notification stored"
        );
    }

    Ok(true)
}
