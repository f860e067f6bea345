//! Command consumption: a uniform logging/propagation envelope around handlers.
//!
//! Per delivered message:
//!
//! ```text
//! Received → log "command received" → handler.handle(...)
//!              ├─ Ok  → log "command handled", return Ok
//!              └─ Err → log "command handler failed", return the same Err
//! ```
//!
//! No retry, backoff or deduplication happens here. The broker runtime sees
//! the handler's error and applies its own redelivery/dead-letter policy.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Command, CommandEnvelope, CommandLogger, DeliveryContext};

/// Business logic for one command type.
///
/// Handlers implement `handle` only; logging and error reporting are applied
/// by [`consume`] / [`CommandConsumer`].
///
/// ## Redelivery
///
/// A broker may deliver the same command more than once (e.g. after a crash
/// between a successful `handle` and the broker's acknowledgment). Handlers
/// must tolerate running twice for one `command_id`; `context.is_redelivery()`
/// tells them when an earlier attempt already ran.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn handle(
        &self,
        command: &CommandEnvelope<C>,
        context: &DeliveryContext,
    ) -> Result<(), Self::Error>;
}

#[async_trait]
impl<C, H> CommandHandler<C> for Arc<H>
where
    C: Command,
    H: CommandHandler<C> + ?Sized,
{
    type Error = H::Error;

    async fn handle(
        &self,
        command: &CommandEnvelope<C>,
        context: &DeliveryContext,
    ) -> Result<(), Self::Error> {
        (**self).handle(command, context).await
    }
}

/// Handler built from an async closure.
#[derive(Debug, Clone)]
pub struct FnHandler<F> {
    f: F,
}

/// Use an async closure as a [`CommandHandler`].
///
/// The closure receives owned copies of the envelope and context.
pub fn handler_fn<F>(f: F) -> FnHandler<F> {
    FnHandler { f }
}

#[async_trait]
impl<C, F, Fut, E> CommandHandler<C> for FnHandler<F>
where
    C: Command,
    F: Fn(CommandEnvelope<C>, DeliveryContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    async fn handle(
        &self,
        command: &CommandEnvelope<C>,
        context: &DeliveryContext,
    ) -> Result<(), Self::Error> {
        (self.f)(command.clone(), context.clone()).await
    }
}

/// Run `handler` on one delivered command with lifecycle logging.
///
/// Emits exactly two entries: "command received" and either "command handled"
/// or "command handler failed". The handler's error is returned unmodified.
pub async fn consume<C, H>(
    logger: &CommandLogger,
    handler: &H,
    command: &CommandEnvelope<C>,
    context: &DeliveryContext,
) -> Result<(), H::Error>
where
    C: Command,
    H: CommandHandler<C> + ?Sized,
{
    logger.received(command, context);

    match handler.handle(command, context).await {
        Ok(()) => {
            logger.handled(command);
            Ok(())
        }
        Err(err) => {
            logger.handler_failed(command, &err);
            Err(err)
        }
    }
}

/// A handler bound to its logger: what the broker runtime registers per
/// command type.
#[derive(Debug)]
pub struct CommandConsumer<C, H> {
    handler: H,
    logger: CommandLogger,
    _command: PhantomData<fn() -> C>,
}

impl<C, H> CommandConsumer<C, H>
where
    C: Command,
    H: CommandHandler<C>,
{
    pub fn new(handler: H, logger: CommandLogger) -> Self {
        Self {
            handler,
            logger,
            _command: PhantomData,
        }
    }

    pub fn command_type(&self) -> &'static str {
        C::command_type()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub async fn consume(
        &self,
        command: &CommandEnvelope<C>,
        context: &DeliveryContext,
    ) -> Result<(), H::Error> {
        consume(&self.logger, &self.handler, command, context).await
    }
}
