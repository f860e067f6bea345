//! Handlers that turn notification commands into delivery calls.
//!
//! Both handlers call the delivery service exactly once per `handle` and
//! return its error as-is, so the consumer logs it and the broker can
//! redeliver. A redelivered command produces a second notification; that
//! duplicate is accepted rather than guarded against here.

use async_trait::async_trait;

use yapplr_commands::{CommandEnvelope, CommandHandler, DeliveryContext};

use crate::{
    NotificationDelivery, NotificationError, SendMessageNotificationCommand,
    SendSystemMessageCommand,
};

/// Delivers "new message" notifications.
#[derive(Debug, Clone)]
pub struct MessageNotificationHandler<D> {
    delivery: D,
}

impl<D> MessageNotificationHandler<D> {
    pub fn new(delivery: D) -> Self {
        Self { delivery }
    }
}

#[async_trait]
impl<D> CommandHandler<SendMessageNotificationCommand> for MessageNotificationHandler<D>
where
    D: NotificationDelivery,
{
    type Error = NotificationError;

    async fn handle(
        &self,
        command: &CommandEnvelope<SendMessageNotificationCommand>,
        _context: &DeliveryContext,
    ) -> Result<(), Self::Error> {
        let cmd = command.payload();
        self.delivery
            .send_message_notification(
                cmd.target_user_id(),
                cmd.sender_username(),
                cmd.message_content(),
                cmd.conversation_id(),
            )
            .await
    }
}

/// Delivers system messages (moderation outcomes, announcements).
#[derive(Debug, Clone)]
pub struct SystemMessageHandler<D> {
    delivery: D,
}

impl<D> SystemMessageHandler<D> {
    pub fn new(delivery: D) -> Self {
        Self { delivery }
    }
}

#[async_trait]
impl<D> CommandHandler<SendSystemMessageCommand> for SystemMessageHandler<D>
where
    D: NotificationDelivery,
{
    type Error = NotificationError;

    async fn handle(
        &self,
        command: &CommandEnvelope<SendSystemMessageCommand>,
        _context: &DeliveryContext,
    ) -> Result<(), Self::Error> {
        let cmd = command.payload();
        self.delivery
            .send_system_notification(
                cmd.target_user_id(),
                cmd.kind(),
                cmd.content(),
                cmd.related_post_id(),
            )
            .await
    }
}
