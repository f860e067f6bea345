//! Runtime side of the command pipeline: configuration, routing of broker
//! deliveries to typed consumers, and the consumer worker.

pub mod config;
pub mod router;
pub mod workers;

mod integration_tests;

pub use config::{ConfigError, WorkerConfig};
pub use router::{CommandRouter, DeliveryError};
pub use workers::command_worker::{CommandWorker, WorkerHandle, WorkerStats};
