//! Typed command publish/consume pipeline.
//!
//! ```text
//! caller ── CommandEnvelope<C> ──> CommandPublisher ── BrokerMessage ──> Broker
//!                                                                         │ (at-least-once,
//!                                                                         │  optional delay)
//! CommandHandler<C> <── CommandConsumer (log, handle, log) <── Delivery ──┘
//! ```
//!
//! The crate owns the envelope contract, the publisher and the consumer
//! decorator. Durable transport, redelivery policy and dead-lettering belong
//! to the broker; `InMemoryBroker` is provided for tests and single-process use.

pub mod broker;
pub mod command;
pub mod consumer;
pub mod delay;
pub mod envelope;
pub mod in_memory_broker;
pub mod logger;
pub mod publisher;

pub use broker::{
    Acknowledger, Broker, BrokerError, BrokerMessage, Delivery, DeliveryContext, Subscription,
};
pub use command::Command;
pub use consumer::{CommandConsumer, CommandHandler, FnHandler, consume, handler_fn};
pub use delay::{Delay, NegativeDelay};
pub use envelope::CommandEnvelope;
pub use in_memory_broker::{DeadLetter, InMemoryBroker, InMemoryBrokerConfig};
pub use logger::CommandLogger;
pub use publisher::{CommandPublisher, PublishError};
