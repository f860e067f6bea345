//! Contract of the external notification-delivery service.
//!
//! Implementations fan a notification out to the user's devices (push) and
//! open real-time sessions. Their own retry behavior is their business; a
//! returned error means this attempt did not reach the user.

use std::sync::Arc;

use async_trait::async_trait;

use yapplr_core::{ConversationId, PostId, UserId};

use crate::SystemMessageKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    /// Delivery is temporarily impossible (provider down, user offline with
    /// no push token). Displays the bare reason.
    #[error("{0}")]
    Unavailable(String),

    /// The provider refused the notification (invalid token, payload too large).
    #[error("notification rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait NotificationDelivery: Send + Sync {
    async fn send_message_notification(
        &self,
        target_user_id: UserId,
        sender_username: &str,
        message_content: &str,
        conversation_id: ConversationId,
    ) -> Result<(), NotificationError>;

    async fn send_system_notification(
        &self,
        target_user_id: UserId,
        kind: SystemMessageKind,
        content: &str,
        related_post_id: Option<PostId>,
    ) -> Result<(), NotificationError>;
}

#[async_trait]
impl<D> NotificationDelivery for Arc<D>
where
    D: NotificationDelivery + ?Sized,
{
    async fn send_message_notification(
        &self,
        target_user_id: UserId,
        sender_username: &str,
        message_content: &str,
        conversation_id: ConversationId,
    ) -> Result<(), NotificationError> {
        (**self)
            .send_message_notification(
                target_user_id,
                sender_username,
                message_content,
                conversation_id,
            )
            .await
    }

    async fn send_system_notification(
        &self,
        target_user_id: UserId,
        kind: SystemMessageKind,
        content: &str,
        related_post_id: Option<PostId>,
    ) -> Result<(), NotificationError> {
        (**self)
            .send_system_notification(target_user_id, kind, content, related_post_id)
            .await
    }
}
