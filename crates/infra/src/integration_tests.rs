//! Integration tests for the full command pipeline.
//!
//! Tests: CommandPublisher → InMemoryBroker → CommandWorker → CommandRouter → handler
//!
//! Verifies:
//! - A published notification command reaches the delivery service once, intact
//! - Handler failures are redelivered with backoff and finally dead-lettered
//! - Delayed commands are not handled before their delay
//! - Commands nobody handles are dead-lettered on the first attempt
//! - Deliveries still queued at shutdown go back to the broker, not missing

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeDelta;
    use tracing::Level;

    use yapplr_commands::{CommandEnvelope, CommandLogger, CommandPublisher, InMemoryBroker};
    use yapplr_core::{ConversationId, PostId, UserId};
    use yapplr_notifications::{
        MessageNotificationHandler, NotificationDelivery, NotificationError,
        SendMessageNotificationCommand, SendSystemMessageCommand, SystemMessageHandler,
        SystemMessageKind,
    };
    use yapplr_observability::CapturedLogs;

    use crate::{CommandRouter, CommandWorker, WorkerConfig, WorkerHandle};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Notified {
        target: UserId,
        sender: String,
        content: String,
        conversation: ConversationId,
    }

    /// Delivery service double: records calls, takes `latency` to answer and
    /// fails the first `failures` of them.
    #[derive(Default)]
    struct FakeDelivery {
        notified: Mutex<Vec<Notified>>,
        system: Mutex<Vec<(UserId, SystemMessageKind)>>,
        failures: Mutex<usize>,
        latency: Duration,
    }

    impl FakeDelivery {
        fn failing(times: usize) -> Self {
            Self {
                failures: Mutex::new(times),
                ..Self::default()
            }
        }

        fn slow(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::default()
            }
        }

        fn notified(&self) -> Vec<Notified> {
            self.notified.lock().unwrap().clone()
        }

        fn next_outcome(&self) -> Result<(), NotificationError> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(NotificationError::Unavailable("offline".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl NotificationDelivery for FakeDelivery {
        async fn send_message_notification(
            &self,
            target_user_id: UserId,
            sender_username: &str,
            message_content: &str,
            conversation_id: ConversationId,
        ) -> Result<(), NotificationError> {
            self.notified.lock().unwrap().push(Notified {
                target: target_user_id,
                sender: sender_username.to_string(),
                content: message_content.to_string(),
                conversation: conversation_id,
            });
            tokio::time::sleep(self.latency).await;
            self.next_outcome()
        }

        async fn send_system_notification(
            &self,
            target_user_id: UserId,
            kind: SystemMessageKind,
            _content: &str,
            _related_post_id: Option<PostId>,
        ) -> Result<(), NotificationError> {
            self.system.lock().unwrap().push((target_user_id, kind));
            self.next_outcome()
        }
    }

    struct Pipeline {
        broker: InMemoryBroker,
        publisher: CommandPublisher<InMemoryBroker>,
        worker: WorkerHandle,
        delivery: Arc<FakeDelivery>,
        logs: CapturedLogs,
    }

    fn pipeline(config: WorkerConfig, delivery: FakeDelivery) -> Pipeline {
        let logs = CapturedLogs::new();
        let logger = CommandLogger::new(logs.dispatch());
        let delivery = Arc::new(delivery);

        let broker = InMemoryBroker::with_config(config.broker_config());
        let mut router = CommandRouter::new(logger.clone());
        router.register(MessageNotificationHandler::new(delivery.clone()));

        let worker = CommandWorker::spawn(config, broker.subscribe(), router, broker.clone());

        Pipeline {
            publisher: CommandPublisher::new(broker.clone(), logger),
            broker,
            worker,
            delivery,
            logs,
        }
    }

    fn alice_says_hi() -> CommandEnvelope<SendMessageNotificationCommand> {
        CommandEnvelope::issued_by(
            UserId::new(1),
            SendMessageNotificationCommand::new(
                UserId::new(42),
                "alice",
                "hi",
                ConversationId::new(7),
            )
            .unwrap(),
        )
    }

    /// Poll until `done` holds; the paused clock makes each sleep instant.
    async fn eventually(what: &str, done: impl Fn() -> bool) {
        for _ in 0..1_000 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test(start_paused = true)]
    async fn published_notification_is_delivered_once() {
        let p = pipeline(WorkerConfig::default(), FakeDelivery::default());
        let command = alice_says_hi();

        p.publisher.publish(&command).await.unwrap();
        eventually("notification", || p.worker.stats().succeeded == 1).await;

        assert_eq!(
            p.delivery.notified(),
            vec![Notified {
                target: UserId::new(42),
                sender: "alice".to_string(),
                content: "hi".to_string(),
                conversation: ConversationId::new(7),
            }]
        );

        let messages: Vec<_> = p.logs.events().into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages,
            vec!["publishing command", "command published", "command received", "command handled"]
        );
        let id = command.command_id().to_string();
        assert!(p.logs.events().iter().all(|e| e.mentions(&id)));

        let stats = p.worker.shutdown().await;
        assert_eq!(stats.received, 1);
        assert_eq!(stats.failed, 0);
        assert!(p.broker.dead_letters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_delivery_is_retried_then_dead_lettered() {
        let config = WorkerConfig::default()
            .with_max_delivery_attempts(3)
            .with_redelivery_delay(Duration::from_millis(100));
        let p = pipeline(config, FakeDelivery::failing(usize::MAX));
        let command = alice_says_hi();

        p.publisher.publish(&command).await.unwrap();
        eventually("dead letter", || p.broker.dead_letters().len() == 1).await;

        assert_eq!(p.delivery.notified().len(), 3);

        let dead = p.broker.dead_letters();
        assert_eq!(dead[0].attempts, 3);
        assert_eq!(dead[0].reason, "offline");
        assert_eq!(dead[0].message.command_id, command.command_id());

        let errors = p.logs.at_level(Level::ERROR);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.mentions("SendMessageNotificationCommand")));

        let stats = p.worker.shutdown().await;
        assert_eq!(stats.received, 3);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.succeeded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers_on_redelivery() {
        let config = WorkerConfig::default().with_redelivery_delay(Duration::from_millis(100));
        let p = pipeline(config, FakeDelivery::failing(1));

        p.publisher.publish(&alice_says_hi()).await.unwrap();
        eventually("recovery", || p.worker.stats().succeeded == 1).await;

        assert_eq!(p.delivery.notified().len(), 2);
        assert!(p.broker.dead_letters().is_empty());

        let attempts: Vec<_> = p
            .logs
            .events()
            .into_iter()
            .filter(|e| e.message == "command received")
            .filter_map(|e| e.field("attempt").map(str::to_string))
            .collect();
        assert_eq!(attempts, vec!["1", "2"]);

        p.worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_notification_waits_for_its_delay() {
        let p = pipeline(WorkerConfig::default(), FakeDelivery::default());

        p.publisher
            .publish_delayed(&alice_says_hi(), TimeDelta::minutes(5))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        assert!(p.delivery.notified().is_empty());

        tokio::time::sleep(Duration::from_secs(61)).await;
        eventually("delayed notification", || p.delivery.notified().len() == 1).await;

        p.worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unhandled_command_type_is_dead_lettered_immediately() {
        let p = pipeline(WorkerConfig::default(), FakeDelivery::default());

        let command = CommandEnvelope::new(
            SendSystemMessageCommand::new(
                UserId::new(8),
                SystemMessageKind::Announcement,
                "v2 is live",
            )
            .unwrap(),
        );
        p.publisher.publish(&command).await.unwrap();
        eventually("rejection", || p.worker.stats().rejected == 1).await;

        let dead = p.broker.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 1);
        assert!(dead[0].reason.contains("SendSystemMessageCommand"));

        p.worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn one_worker_serves_several_command_types() {
        let logs = CapturedLogs::new();
        let logger = CommandLogger::new(logs.dispatch());
        let delivery = Arc::new(FakeDelivery::default());
        let broker = InMemoryBroker::new();

        let mut router = CommandRouter::new(logger.clone());
        router
            .register(MessageNotificationHandler::new(delivery.clone()))
            .register(SystemMessageHandler::new(delivery.clone()));
        let worker = CommandWorker::spawn(
            WorkerConfig::default().with_max_concurrent(1),
            broker.subscribe(),
            router,
            broker.clone(),
        );
        let publisher = CommandPublisher::new(broker.clone(), logger);

        publisher.publish(&alice_says_hi()).await.unwrap();
        publisher
            .publish(&CommandEnvelope::new(
                SendSystemMessageCommand::new(
                    UserId::new(42),
                    SystemMessageKind::ContentRestored,
                    "Restored.",
                )
                .unwrap()
                .with_related_post(PostId::new(5)),
            ))
            .await
            .unwrap();

        eventually("both commands", || worker.stats().succeeded == 2).await;
        assert_eq!(delivery.notified().len(), 1);
        assert_eq!(
            *delivery.system.lock().unwrap(),
            vec![(UserId::new(42), SystemMessageKind::ContentRestored)]
        );

        worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_queued_deliveries_to_the_next_worker() {
        let config = WorkerConfig::default().with_max_concurrent(1);
        let p = pipeline(config.clone(), FakeDelivery::slow(Duration::from_millis(100)));

        for _ in 0..3 {
            p.publisher.publish(&alice_says_hi()).await.unwrap();
        }
        eventually("first delivery", || p.delivery.notified().len() == 1).await;

        let stats = p.worker.shutdown().await;
        assert_eq!(stats.received, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.released, 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(p.delivery.notified().len(), 1);
        assert!(p.broker.dead_letters().is_empty());
        assert_eq!(p.broker.waiting().len(), 2);

        let mut router = CommandRouter::new(CommandLogger::new(p.logs.dispatch()));
        router.register(MessageNotificationHandler::new(p.delivery.clone()));
        let next = CommandWorker::spawn(config, p.broker.subscribe(), router, p.broker.clone());

        eventually("released deliveries", || next.stats().succeeded == 2).await;
        assert_eq!(p.delivery.notified().len(), 3);
        assert!(p.broker.dead_letters().is_empty());

        // Releasing does not use up a delivery attempt.
        let attempts: Vec<_> = p
            .logs
            .events()
            .into_iter()
            .filter(|e| e.message == "command received")
            .filter_map(|e| e.field("attempt").map(str::to_string))
            .collect();
        assert_eq!(attempts, vec!["1", "1", "1"]);

        next.shutdown().await;
    }

    #[tokio::test]
    async fn worker_stops_when_the_broker_closes() {
        let p = pipeline(WorkerConfig::default(), FakeDelivery::default());

        p.broker.close();
        eventually("worker exit", || p.worker.is_finished()).await;

        let err = p.publisher.publish(&alice_says_hi()).await.unwrap_err();
        assert_eq!(err.to_string(), "broker is closed");
        assert_eq!(p.worker.shutdown().await, Default::default());
    }
}
