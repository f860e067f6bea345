//! Broker contract (mechanics only).
//!
//! The broker is the durable transport between publishers and consumers:
//!
//! - **At-least-once delivery**: a command may be delivered more than once;
//!   handlers must tolerate duplicates
//! - **No ordering guarantees** beyond what the transport itself provides
//! - **Scheduled delivery**: a message carrying a non-zero [`Delay`] must not be
//!   delivered before the delay has elapsed
//! - **Redelivery and dead-lettering** are the broker's policy, triggered by
//!   the runtime through [`Acknowledger`]
//!
//! Publishers only see [`Broker::hand_off`]; the delay is expressed as a plain
//! value and each transport maps it onto its own scheduling feature.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use yapplr_core::CommandId;

use crate::{Command, CommandEnvelope, Delay};

/// A serialized command as handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Transport-level id (distinct from the command id; unique per hand-off).
    pub message_id: Uuid,
    /// Routing key: the command's type name.
    pub command_type: String,
    pub command_id: CommandId,
    /// JSON-encoded `CommandEnvelope`.
    pub payload: String,
    pub deliver_after: Delay,
}

impl BrokerMessage {
    pub fn encode<C: Command>(
        command: &CommandEnvelope<C>,
        deliver_after: Delay,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_id: Uuid::now_v7(),
            command_type: C::command_type().to_string(),
            command_id: command.command_id(),
            payload: serde_json::to_string(command)?,
            deliver_after,
        })
    }

    pub fn decode<C: Command>(&self) -> Result<CommandEnvelope<C>, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The broker could not be reached (connection loss, timeout).
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The broker refused the message (quota, size, unknown route).
    #[error("broker rejected message: {0}")]
    Rejected(String),

    /// The broker has been shut down.
    #[error("broker is closed")]
    Closed,
}

/// Publish side of a broker.
///
/// `hand_off` returning `Ok` means the broker accepted responsibility for
/// at-least-once delivery; it says nothing about delivery having happened.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn hand_off(&self, message: BrokerMessage) -> Result<(), BrokerError>;
}

#[async_trait]
impl<B> Broker for Arc<B>
where
    B: Broker + ?Sized,
{
    async fn hand_off(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        (**self).hand_off(message).await
    }
}

/// One delivery attempt of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: BrokerMessage,
    /// 1 for the first delivery, incremented on every redelivery.
    pub attempt: u32,
}

impl Delivery {
    pub fn first(message: BrokerMessage) -> Self {
        Self {
            message,
            attempt: 1,
        }
    }

    pub fn context(&self) -> DeliveryContext {
        DeliveryContext {
            message_id: self.message.message_id,
            attempt: self.attempt,
            received_at: Utc::now(),
        }
    }
}

/// Broker-level metadata passed through to handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryContext {
    message_id: Uuid,
    attempt: u32,
    received_at: DateTime<Utc>,
}

impl DeliveryContext {
    /// Context for a command handled in-process without a broker round trip.
    pub fn first_attempt() -> Self {
        Self {
            message_id: Uuid::now_v7(),
            attempt: 1,
            received_at: Utc::now(),
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// True when an earlier attempt of the same message already ran.
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Consume side of a broker: settles deliveries after the handler ran.
pub trait Acknowledger: Send + Sync {
    /// The delivery was handled; the broker may forget it.
    fn ack(&self, delivery: &Delivery);

    /// The delivery failed; the broker decides between redelivery and
    /// dead-lettering.
    fn nack(&self, delivery: Delivery, reason: &str);

    /// The delivery can never succeed (unknown route, undecodable payload).
    /// Defaults to `nack`; brokers with a dead-letter queue should skip the
    /// remaining attempts.
    fn reject(&self, delivery: Delivery, reason: &str) {
        self.nack(delivery, reason)
    }

    /// The delivery was taken off a subscription but never handled (consumer
    /// shutting down). The broker must deliver it again without counting the
    /// attempt. Defaults to `nack`.
    fn release(&self, delivery: Delivery) {
        self.nack(delivery, "released unhandled")
    }
}

impl<A> Acknowledger for Arc<A>
where
    A: Acknowledger + ?Sized,
{
    fn ack(&self, delivery: &Delivery) {
        (**self).ack(delivery)
    }

    fn nack(&self, delivery: Delivery, reason: &str) {
        (**self).nack(delivery, reason)
    }

    fn reject(&self, delivery: Delivery, reason: &str) {
        (**self).reject(delivery, reason)
    }

    fn release(&self, delivery: Delivery) {
        (**self).release(delivery)
    }
}

/// A stream of deliveries from a broker.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { receiver }
    }

    /// Wait for the next delivery; `None` once the broker is closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    /// Take a delivery if one is ready, without waiting.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.receiver.try_recv().ok()
    }

    /// Stop the broker from queueing more deliveries here. Deliveries already
    /// queued can still be taken with `recv`/`try_recv`.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}
