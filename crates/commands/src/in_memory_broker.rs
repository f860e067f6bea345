//! In-memory broker for tests/dev.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broker::{Acknowledger, Broker, BrokerError, BrokerMessage, Delivery, Subscription};

/// Redelivery policy of the in-memory broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryBrokerConfig {
    /// Total delivery attempts before a message is dead-lettered (min 1).
    pub max_delivery_attempts: u32,
    /// Delay before the first redelivery; doubles per attempt.
    pub redelivery_delay: Duration,
    /// Cap on the redelivery delay.
    pub max_redelivery_delay: Duration,
}

impl Default for InMemoryBrokerConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 5,
            redelivery_delay: Duration::from_millis(500),
            max_redelivery_delay: Duration::from_secs(60),
        }
    }
}

impl InMemoryBrokerConfig {
    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = attempts;
        self
    }

    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Backoff before redelivering a message whose `failed_attempt` just failed
    /// (1-indexed): `base * 2^(failed_attempt - 1)`, capped.
    pub fn redelivery_delay_for(&self, failed_attempt: u32) -> Duration {
        if failed_attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(failed_attempt - 1);
        self.redelivery_delay
            .saturating_mul(factor)
            .min(self.max_redelivery_delay)
    }
}

const CLOSED_REASON: &str = "broker closed";

/// A message that exhausted its delivery attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub message: BrokerMessage,
    pub attempts: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// In-memory broker.
///
/// - Fan-out to every subscription (run one consumer runtime per broker)
/// - Delayed messages are released by a tokio timer task, so `hand_off` of a
///   delayed message must run inside a tokio runtime
/// - Failed deliveries are redelivered with backoff, then dead-lettered
/// - Deliveries that find no live subscription wait for the next `subscribe`
/// - Once closed, anything still undelivered is dead-lettered
/// - Every accepted message is recorded for inspection
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    config: InMemoryBrokerConfig,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Delivery>>>,
    handed_off: Mutex<Vec<BrokerMessage>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    waiting: Mutex<Vec<Delivery>>,
    closed: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: InMemoryBrokerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                ..Inner::default()
            }),
        }
    }

    pub fn config(&self) -> &InMemoryBrokerConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();

        // A poisoned lock yields a subscription that never receives anything;
        // publishers will see `Unavailable` on the same lock.
        if let Ok(mut subs) = self.inner.subscribers.lock() {
            if let Ok(mut waiting) = self.inner.waiting.lock() {
                for delivery in waiting.drain(..) {
                    // The receiver is still in hand, so this cannot fail.
                    let _ = tx.send(delivery);
                }
            }
            subs.push(tx);
        }

        Subscription::new(rx)
    }

    /// Every message accepted by `hand_off`, in acceptance order.
    pub fn handed_off(&self) -> Vec<BrokerMessage> {
        self.inner
            .handed_off
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner
            .dead_letters
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Deliveries that found no live subscription, in arrival order.
    pub fn waiting(&self) -> Vec<Delivery> {
        self.inner
            .waiting
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    /// Stop accepting messages and end all subscriptions.
    ///
    /// Deliveries already queued on a subscription can still be received and
    /// settled; waiting ones and any later redelivery are dead-lettered.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        if let Ok(mut subs) = self.inner.subscribers.lock() {
            subs.clear();
        }

        let waiting = self
            .inner
            .waiting
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default();
        for delivery in waiting {
            self.inner.dead_letter(delivery, CLOSED_REASON);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn schedule(&self, delivery: Delivery, after: Duration) {
        if self.is_closed() {
            self.inner.dead_letter(delivery, CLOSED_REASON);
            return;
        }
        if after.is_zero() {
            self.inner.fan_out(delivery);
            return;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            inner.fan_out(delivery);
        });
    }
}

impl Inner {
    fn dead_letter(&self, delivery: Delivery, reason: &str) {
        warn!(
            message_id = %delivery.message.message_id,
            command_type = %delivery.message.command_type,
            command_id = %delivery.message.command_id,
            attempts = delivery.attempt,
            reason,
            "delivery dead-lettered"
        );
        if let Ok(mut dlq) = self.dead_letters.lock() {
            dlq.push(DeadLetter {
                message: delivery.message,
                attempts: delivery.attempt,
                reason: reason.to_string(),
                dead_lettered_at: Utc::now(),
            });
        }
    }

    fn fan_out(&self, delivery: Delivery) {
        if self.closed.load(Ordering::SeqCst) {
            self.dead_letter(delivery, CLOSED_REASON);
            return;
        }
        if let Ok(mut subs) = self.subscribers.lock() {
            // Drop any dead subscribers while delivering.
            subs.retain(|tx| tx.send(delivery.clone()).is_ok());
            if subs.is_empty() {
                if let Ok(mut waiting) = self.waiting.lock() {
                    waiting.push(delivery);
                }
            }
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn hand_off(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        self.inner
            .handed_off
            .lock()
            .map_err(|_| BrokerError::Unavailable("in-memory broker lock poisoned".to_string()))?
            .push(message.clone());

        let after = message.deliver_after.as_std();
        self.schedule(Delivery::first(message), after);
        Ok(())
    }
}

impl Acknowledger for InMemoryBroker {
    fn ack(&self, delivery: &Delivery) {
        debug!(
            message_id = %delivery.message.message_id,
            command_type = %delivery.message.command_type,
            attempt = delivery.attempt,
            "delivery acknowledged"
        );
    }

    fn nack(&self, delivery: Delivery, reason: &str) {
        let max_attempts = self.inner.config.max_delivery_attempts.max(1);

        if delivery.attempt < max_attempts {
            let backoff = self.inner.config.redelivery_delay_for(delivery.attempt);
            debug!(
                message_id = %delivery.message.message_id,
                command_type = %delivery.message.command_type,
                attempt = delivery.attempt,
                backoff_ms = backoff.as_millis() as u64,
                "scheduling redelivery"
            );
            let next = Delivery {
                message: delivery.message,
                attempt: delivery.attempt + 1,
            };
            self.schedule(next, backoff);
            return;
        }

        self.inner.dead_letter(delivery, reason);
    }

    fn reject(&self, delivery: Delivery, reason: &str) {
        self.inner.dead_letter(delivery, reason);
    }

    fn release(&self, delivery: Delivery) {
        debug!(
            message_id = %delivery.message.message_id,
            command_type = %delivery.message.command_type,
            attempt = delivery.attempt,
            "delivery released"
        );
        self.schedule(delivery, Duration::ZERO);
    }
}
