//! Command publication (hand-off to the broker).
//!
//! ```text
//! CommandEnvelope<C>
//!   ↓ log "publishing command"
//! serialize (JSON) ──────────────┐
//!   ↓                            │
//! Broker::hand_off (+ delay)     ├─ failure: log once at error, return it
//!   ↓                            │
//! log "command published" ───────┘
//! ```
//!
//! The publisher never retries. Retry policy belongs to the broker client;
//! the caller gets every failure back and decides.

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, BrokerError, BrokerMessage};
use crate::{Command, CommandEnvelope, CommandLogger, Delay, NegativeDelay};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// The requested delay was negative; nothing was sent.
    #[error(transparent)]
    NegativeDelay(#[from] NegativeDelay),

    /// The envelope could not be encoded; nothing was sent.
    #[error("failed to serialize command: {0}")]
    Serialization(String),

    /// The broker failed or refused the hand-off.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The caller cancelled before the broker accepted the message.
    #[error("publish cancelled before hand-off completed")]
    Cancelled,
}

impl PublishError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PublishError::Cancelled)
    }
}

/// Hands commands to a broker, immediately or with a delay.
///
/// Holds only the broker handle and a logger; cloning is cheap when `B` is
/// (e.g. `Arc<dyn Broker>`), and one instance can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct CommandPublisher<B> {
    broker: B,
    logger: CommandLogger,
}

impl<B> CommandPublisher<B> {
    pub fn new(broker: B, logger: CommandLogger) -> Self {
        Self { broker, logger }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }
}

impl<B: Broker> CommandPublisher<B> {
    /// Hand a command to the broker for immediate delivery.
    ///
    /// `Ok` means the broker accepted it for at-least-once delivery.
    pub async fn publish<C: Command>(
        &self,
        command: &CommandEnvelope<C>,
    ) -> Result<(), PublishError> {
        self.hand_off(command, Delay::ZERO, None).await
    }

    /// Hand a command to the broker, to be delivered no earlier than `delay`
    /// from now. Negative delays are rejected before the broker is touched.
    pub async fn publish_delayed<C: Command>(
        &self,
        command: &CommandEnvelope<C>,
        delay: TimeDelta,
    ) -> Result<(), PublishError> {
        let delay = match Delay::try_from(delay) {
            Ok(delay) => delay,
            Err(err) => {
                let err = PublishError::from(err);
                self.logger.publish_failed(command, &err);
                return Err(err);
            }
        };
        self.hand_off(command, delay, None).await
    }

    /// Hand a command to the broker, to be delivered no earlier than `at`.
    pub async fn publish_at<C: Command>(
        &self,
        command: &CommandEnvelope<C>,
        at: DateTime<Utc>,
    ) -> Result<(), PublishError> {
        self.hand_off(command, Delay::until(at), None).await
    }

    /// Like `publish`/`publish_delayed`, but abandons the hand-off when `cancel`
    /// fires first. A cancelled hand-off is dropped before the broker accepts
    /// it and reported as [`PublishError::Cancelled`].
    pub async fn publish_cancellable<C: Command>(
        &self,
        command: &CommandEnvelope<C>,
        delay: Delay,
        cancel: &CancellationToken,
    ) -> Result<(), PublishError> {
        self.hand_off(command, delay, Some(cancel)).await
    }

    async fn hand_off<C: Command>(
        &self,
        command: &CommandEnvelope<C>,
        delay: Delay,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), PublishError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            self.logger.publish_cancelled(command);
            return Err(PublishError::Cancelled);
        }

        self.logger.publishing(command, delay);

        let outcome = match BrokerMessage::encode(command, delay) {
            Err(err) => Err(PublishError::Serialization(err.to_string())),
            Ok(message) => match cancel {
                None => self.broker.hand_off(message).await.map_err(PublishError::from),
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(PublishError::Cancelled),
                    res = self.broker.hand_off(message) => res.map_err(PublishError::from),
                },
            },
        };

        match outcome {
            Ok(()) => {
                self.logger.published(command);
                Ok(())
            }
            Err(PublishError::Cancelled) => {
                self.logger.publish_cancelled(command);
                Err(PublishError::Cancelled)
            }
            Err(err) => {
                self.logger.publish_failed(command, &err);
                Err(err)
            }
        }
    }
}
