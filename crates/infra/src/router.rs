//! Routes broker deliveries to the consumer registered for their command type.
//!
//! Each registration pairs a command type name with a typed
//! [`CommandConsumer`]. The router decodes the JSON payload into that type and
//! runs the consumer, which does the lifecycle logging. Handler errors cross
//! this boundary type-erased as `anyhow::Error` so one router can serve
//! handlers with different error types.

use std::collections::HashMap;

use async_trait::async_trait;

use yapplr_commands::{
    Command, CommandConsumer, CommandHandler, CommandLogger, Delivery, DeliveryContext,
};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no consumer registered for command type {0}")]
    UnknownCommandType(String),

    #[error("failed to decode {command_type}: {source}")]
    Decode {
        command_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The handler ran and failed. Displays the handler's own message.
    #[error(transparent)]
    Handler(anyhow::Error),
}

impl DeliveryError {
    /// Whether another attempt of the same message could succeed.
    ///
    /// Only handler failures are worth redelivering; a message that cannot be
    /// routed or decoded fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Handler(_))
    }
}

#[async_trait]
trait Route: Send + Sync {
    async fn deliver(
        &self,
        delivery: &Delivery,
        context: &DeliveryContext,
    ) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<C, H> Route for CommandConsumer<C, H>
where
    C: Command,
    H: CommandHandler<C>,
{
    async fn deliver(
        &self,
        delivery: &Delivery,
        context: &DeliveryContext,
    ) -> Result<(), DeliveryError> {
        let command = delivery
            .message
            .decode::<C>()
            .map_err(|source| DeliveryError::Decode {
                command_type: C::command_type().to_string(),
                source,
            })?;

        self.consume(&command, context)
            .await
            .map_err(|e| DeliveryError::Handler(anyhow::Error::new(e)))
    }
}

/// Registry of consumers keyed by command type name.
pub struct CommandRouter {
    logger: CommandLogger,
    routes: HashMap<&'static str, Box<dyn Route>>,
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("command_types", &self.command_types())
            .finish()
    }
}

impl CommandRouter {
    /// Consumers registered through [`CommandRouter::register`] log to `logger`.
    pub fn new(logger: CommandLogger) -> Self {
        Self {
            logger,
            routes: HashMap::new(),
        }
    }

    /// Register `handler` for `C`. A later registration for the same type
    /// replaces the earlier one.
    pub fn register<C, H>(&mut self, handler: H) -> &mut Self
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let consumer = CommandConsumer::<C, H>::new(handler, self.logger.clone());
        self.add(consumer)
    }

    /// Register a consumer that already carries its own logger.
    pub fn add<C, H>(&mut self, consumer: CommandConsumer<C, H>) -> &mut Self
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        self.routes.insert(C::command_type(), Box::new(consumer));
        self
    }

    pub fn handles(&self, command_type: &str) -> bool {
        self.routes.contains_key(command_type)
    }

    /// Registered command types, sorted.
    pub fn command_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.routes.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Decode `delivery` and run the matching consumer.
    pub async fn route(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        let command_type = delivery.message.command_type.as_str();
        let route = self
            .routes
            .get(command_type)
            .ok_or_else(|| DeliveryError::UnknownCommandType(command_type.to_string()))?;

        route.deliver(delivery, &delivery.context()).await
    }
}
