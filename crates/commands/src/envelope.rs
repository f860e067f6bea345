use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use yapplr_core::{CommandId, UserId};

use crate::Command;

/// Envelope for a command: identity, creation time and originating user.
///
/// This is the unit handed to the broker and delivered to handlers.
///
/// Notes:
/// - `command_id` and `created_at` are generated here and nowhere else; no
///   constructor accepts them, so callers cannot forge identity or timing.
/// - `user_id` is `None` for system-initiated commands (moderation, schedulers).
/// - There is no mutable access; a published envelope is never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope<C> {
    command_id: CommandId,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<UserId>,
    payload: C,
}

impl<C> CommandEnvelope<C> {
    /// Wrap a system-initiated command.
    pub fn new(payload: C) -> Self {
        Self::with_user(None, payload)
    }

    /// Wrap a command triggered by `user_id`.
    pub fn issued_by(user_id: UserId, payload: C) -> Self {
        Self::with_user(Some(user_id), payload)
    }

    pub fn with_user(user_id: Option<UserId>, payload: C) -> Self {
        Self {
            command_id: CommandId::generate(),
            created_at: Utc::now(),
            user_id,
            payload,
        }
    }

    pub fn command_id(&self) -> CommandId {
        self.command_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn payload(&self) -> &C {
        &self.payload
    }

    pub fn into_payload(self) -> C {
        self.payload
    }
}

impl<C: Command> CommandEnvelope<C> {
    pub fn command_type(&self) -> &'static str {
        C::command_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Ping {
        note: String,
    }

    impl Command for Ping {
        fn command_type() -> &'static str {
            "Ping"
        }
    }

    fn ping() -> Ping {
        Ping {
            note: "hello".to_string(),
        }
    }

    #[test]
    fn created_at_is_bounded_by_construction() {
        let before = Utc::now();
        let envelope = CommandEnvelope::new(ping());
        let after = Utc::now();

        assert!(envelope.created_at() >= before);
        assert!(envelope.created_at() <= after);
    }

    #[test]
    fn each_envelope_gets_a_fresh_id() {
        let ids: HashSet<CommandId> = (0..1_000)
            .map(|_| CommandEnvelope::new(ping()).command_id())
            .collect();

        assert_eq!(ids.len(), 1_000);
        assert!(ids.iter().all(|id| !id.is_nil()));
    }

    #[test]
    fn user_id_is_optional() {
        assert_eq!(CommandEnvelope::new(ping()).user_id(), None);

        let issued = CommandEnvelope::issued_by(UserId::new(9), ping());
        assert_eq!(issued.user_id(), Some(UserId::new(9)));
        assert_eq!(issued.command_type(), "Ping");
    }

    #[test]
    fn json_round_trip_preserves_identity() {
        let envelope = CommandEnvelope::issued_by(UserId::new(3), ping());
        let json = serde_json::to_string(&envelope).unwrap();
        let back: CommandEnvelope<Ping> = serde_json::from_str(&json).unwrap();

        assert_eq!(back, envelope);
    }

    #[test]
    fn system_commands_omit_user_id_on_the_wire() {
        let json = serde_json::to_value(CommandEnvelope::new(ping())).unwrap();
        assert!(json.get("user_id").is_none());
    }
}
