//! Notification commands and their handlers.
//!
//! This crate contains the concrete side of the command pipeline: the payloads
//! the API layer publishes when a user should be notified, the contract of the
//! external delivery service (push / real-time socket), and the handlers that
//! connect the two.

pub mod command;
pub mod delivery;
pub mod handler;

pub use command::{
    SendMessageNotificationCommand, SendMessageNotificationCommandBuilder, SendSystemMessageCommand,
    SystemMessageKind,
};
pub use delivery::{NotificationDelivery, NotificationError};
pub use handler::{MessageNotificationHandler, SystemMessageHandler};
