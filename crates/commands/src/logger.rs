//! Structured lifecycle logging for published and consumed commands.
//!
//! Every entry carries the command type and id; consumption entries also carry
//! the creation time and delivery attempt. Payload contents are never logged,
//! so user text (message bodies, usernames) stays out of the log pipeline.

use core::fmt::Display;

use tracing::{Dispatch, error, info, warn};

use crate::{Command, CommandEnvelope, Delay, DeliveryContext};

/// Explicit logger handle given to publishers and consumers.
///
/// Wraps a `tracing::Dispatch` and scopes each entry to it, so a component logs
/// to whatever subscriber it was built with rather than to ambient global state.
#[derive(Debug, Clone)]
pub struct CommandLogger {
    dispatch: Dispatch,
}

impl CommandLogger {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Logger bound to the subscriber that is the default at call time.
    pub fn current() -> Self {
        Self::new(tracing::dispatcher::get_default(Dispatch::clone))
    }

    pub(crate) fn publishing<C: Command>(&self, command: &CommandEnvelope<C>, delay: Delay) {
        self.emit(|| {
            info!(
                command_type = C::command_type(),
                command_id = %command.command_id(),
                delay_ms = delay.as_millis() as u64,
                "publishing command"
            )
        });
    }

    pub(crate) fn published<C: Command>(&self, command: &CommandEnvelope<C>) {
        self.emit(|| {
            info!(
                command_type = C::command_type(),
                command_id = %command.command_id(),
                "command published"
            )
        });
    }

    pub(crate) fn publish_failed<C: Command>(
        &self,
        command: &CommandEnvelope<C>,
        err: &dyn Display,
    ) {
        self.emit(|| {
            error!(
                command_type = C::command_type(),
                command_id = %command.command_id(),
                error = %err,
                "failed to publish command"
            )
        });
    }

    pub(crate) fn publish_cancelled<C: Command>(&self, command: &CommandEnvelope<C>) {
        self.emit(|| {
            warn!(
                command_type = C::command_type(),
                command_id = %command.command_id(),
                "publish cancelled"
            )
        });
    }

    pub(crate) fn received<C: Command>(
        &self,
        command: &CommandEnvelope<C>,
        context: &DeliveryContext,
    ) {
        self.emit(|| {
            info!(
                command_type = C::command_type(),
                command_id = %command.command_id(),
                created_at = %command.created_at().to_rfc3339(),
                attempt = context.attempt(),
                "command received"
            )
        });
    }

    pub(crate) fn handled<C: Command>(&self, command: &CommandEnvelope<C>) {
        self.emit(|| {
            info!(
                command_type = C::command_type(),
                command_id = %command.command_id(),
                "command handled"
            )
        });
    }

    pub(crate) fn handler_failed<C: Command>(
        &self,
        command: &CommandEnvelope<C>,
        err: &dyn Display,
    ) {
        self.emit(|| {
            error!(
                command_type = C::command_type(),
                command_id = %command.command_id(),
                error = %err,
                "command handler failed"
            )
        });
    }

    fn emit(&self, entry: impl FnOnce()) {
        tracing::dispatcher::with_default(&self.dispatch, entry);
    }
}

impl Default for CommandLogger {
    fn default() -> Self {
        Self::current()
    }
}
