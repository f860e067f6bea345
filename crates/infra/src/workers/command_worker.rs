use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use yapplr_commands::{Acknowledger, Delivery, Subscription};

use crate::{CommandRouter, DeliveryError, WorkerConfig};

/// Counters of a running worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: u64,
    pub succeeded: u64,
    /// Handler failures, settled with `nack`
    pub failed: u64,
    /// Unroutable or undecodable deliveries, settled with `reject`
    pub rejected: u64,
    /// Queued but never started when the worker stopped, settled with `release`
    pub released: u64,
}

/// Handle to control and join a command worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Stop taking deliveries, wait for in-flight ones to settle, hand queued
    /// ones back to the broker, then return.
    pub async fn shutdown(self) -> WorkerStats {
        let WorkerHandle {
            shutdown,
            join,
            stats,
        } = self;

        shutdown.cancel();
        if let Err(err) = join.await {
            warn!(error = %err, "command worker task ended abnormally");
        }
        stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True once the worker loop has exited (shutdown or closed subscription).
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Consumer runtime for one broker subscription.
///
/// - Each delivery runs on its own task, at most `max_concurrent` at a time
/// - Success is acknowledged, handler failures are nacked (the broker decides
///   on redelivery), unroutable messages are rejected
/// - Shutdown stops intake, waits for in-flight deliveries and releases the
///   ones still queued on the subscription so the broker can deliver them again
#[derive(Debug)]
pub struct CommandWorker;

impl CommandWorker {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<A>(
        config: WorkerConfig,
        subscription: Subscription,
        router: CommandRouter,
        acknowledger: A,
    ) -> WorkerHandle
    where
        A: Acknowledger + 'static,
    {
        let shutdown = CancellationToken::new();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));

        let worker = Worker {
            name: config.name,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            router: Arc::new(router),
            acknowledger: Arc::new(acknowledger),
            stats: stats.clone(),
        };
        let join = tokio::spawn(worker.run(subscription, shutdown.clone()));

        WorkerHandle {
            shutdown,
            join,
            stats,
        }
    }
}

struct Worker<A> {
    name: String,
    permits: Arc<Semaphore>,
    router: Arc<CommandRouter>,
    acknowledger: Arc<A>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl<A: Acknowledger + 'static> Worker<A> {
    async fn run(self, mut subscription: Subscription, shutdown: CancellationToken) {
        info!(worker = %self.name, "command worker started");
        let mut in_flight = JoinSet::new();

        loop {
            // Take a permit before a delivery so nothing is dequeued that
            // cannot start right away.
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = subscription.recv() => {
                    let Some(delivery) = next else { break };
                    delivery
                }
            };

            self.record(|s| s.received += 1);
            while in_flight.try_join_next().is_some() {}

            let router = self.router.clone();
            let acknowledger = self.acknowledger.clone();
            let stats = self.stats.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                settle(&router, &*acknowledger, &stats, delivery).await;
            });
        }

        while in_flight.join_next().await.is_some() {}

        // Redeliveries scheduled by the settled tasks must not land here.
        subscription.close();
        while let Some(delivery) = subscription.try_recv() {
            self.record(|s| s.released += 1);
            self.acknowledger.release(delivery);
        }

        info!(worker = %self.name, "command worker stopped");
    }

    fn record(&self, f: impl FnOnce(&mut WorkerStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

async fn settle<A: Acknowledger + ?Sized>(
    router: &CommandRouter,
    acknowledger: &A,
    stats: &Mutex<WorkerStats>,
    delivery: Delivery,
) {
    let outcome = router.route(&delivery).await;
    let mut stats = stats.lock().unwrap_or_else(PoisonError::into_inner);

    match outcome {
        Ok(()) => {
            stats.succeeded += 1;
            acknowledger.ack(&delivery);
        }
        Err(DeliveryError::Handler(err)) => {
            // Already logged by the consumer.
            debug!(
                message_id = %delivery.message.message_id,
                attempt = delivery.attempt,
                "handler failed, returning delivery to broker"
            );
            stats.failed += 1;
            acknowledger.nack(delivery, &err.to_string());
        }
        Err(err) => {
            warn!(
                message_id = %delivery.message.message_id,
                command_type = %delivery.message.command_type,
                command_id = %delivery.message.command_id,
                error = %err,
                "rejecting undeliverable command"
            );
            stats.rejected += 1;
            acknowledger.reject(delivery, &err.to_string());
        }
    }
}
