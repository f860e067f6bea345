use serde::{Deserialize, Serialize};

use yapplr_commands::Command;
use yapplr_core::{ConversationId, DomainError, DomainResult, PostId, UserId};

/// Notify `target_user_id` that `sender_username` sent them a direct message.
///
/// All four fields are required. The only ways to obtain a value are
/// [`SendMessageNotificationCommand::new`], the builder (which reports the first
/// missing field) and deserialization, which runs the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MessageNotificationFields")]
pub struct SendMessageNotificationCommand {
    target_user_id: UserId,
    sender_username: String,
    message_content: String,
    conversation_id: ConversationId,
}

#[derive(Deserialize)]
struct MessageNotificationFields {
    target_user_id: UserId,
    sender_username: String,
    message_content: String,
    conversation_id: ConversationId,
}

impl TryFrom<MessageNotificationFields> for SendMessageNotificationCommand {
    type Error = DomainError;

    fn try_from(f: MessageNotificationFields) -> Result<Self, Self::Error> {
        Self::new(
            f.target_user_id,
            f.sender_username,
            f.message_content,
            f.conversation_id,
        )
    }
}

impl SendMessageNotificationCommand {
    /// Build the command. Fails if `sender_username` is blank.
    ///
    /// `message_content` may be empty (attachment-only messages).
    pub fn new(
        target_user_id: UserId,
        sender_username: impl Into<String>,
        message_content: impl Into<String>,
        conversation_id: ConversationId,
    ) -> DomainResult<Self> {
        let sender_username = sender_username.into();
        if sender_username.trim().is_empty() {
            return Err(DomainError::validation("sender_username must not be blank"));
        }

        Ok(Self {
            target_user_id,
            sender_username,
            message_content: message_content.into(),
            conversation_id,
        })
    }

    pub fn builder() -> SendMessageNotificationCommandBuilder {
        SendMessageNotificationCommandBuilder::default()
    }

    pub fn target_user_id(&self) -> UserId {
        self.target_user_id
    }

    pub fn sender_username(&self) -> &str {
        &self.sender_username
    }

    pub fn message_content(&self) -> &str {
        &self.message_content
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }
}

impl Command for SendMessageNotificationCommand {
    fn command_type() -> &'static str {
        "SendMessageNotificationCommand"
    }
}

/// Field-by-field construction for call sites that assemble the command from
/// several sources. `build` fails on the first field that was never set.
#[derive(Debug, Clone, Default)]
pub struct SendMessageNotificationCommandBuilder {
    target_user_id: Option<UserId>,
    sender_username: Option<String>,
    message_content: Option<String>,
    conversation_id: Option<ConversationId>,
}

impl SendMessageNotificationCommandBuilder {
    pub fn target_user_id(mut self, id: UserId) -> Self {
        self.target_user_id = Some(id);
        self
    }

    pub fn sender_username(mut self, username: impl Into<String>) -> Self {
        self.sender_username = Some(username.into());
        self
    }

    pub fn message_content(mut self, content: impl Into<String>) -> Self {
        self.message_content = Some(content.into());
        self
    }

    pub fn conversation_id(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn build(self) -> DomainResult<SendMessageNotificationCommand> {
        SendMessageNotificationCommand::new(
            self.target_user_id
                .ok_or(DomainError::missing("target_user_id"))?,
            self.sender_username
                .ok_or(DomainError::missing("sender_username"))?,
            self.message_content
                .ok_or(DomainError::missing("message_content"))?,
            self.conversation_id
                .ok_or(DomainError::missing("conversation_id"))?,
        )
    }
}

/// Why the system is messaging a user.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMessageKind {
    /// A moderator hid one of the user's posts or comments.
    ContentHidden,
    /// Previously hidden content was restored (e.g. after an appeal).
    ContentRestored,
    AccountWarning,
    Announcement,
}

/// Deliver a system message (moderation outcome, announcement) to a user.
///
/// Published by the system itself, so its envelope carries no `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SystemMessageFields")]
pub struct SendSystemMessageCommand {
    target_user_id: UserId,
    kind: SystemMessageKind,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    related_post_id: Option<PostId>,
}

#[derive(Deserialize)]
struct SystemMessageFields {
    target_user_id: UserId,
    kind: SystemMessageKind,
    content: String,
    #[serde(default)]
    related_post_id: Option<PostId>,
}

impl TryFrom<SystemMessageFields> for SendSystemMessageCommand {
    type Error = DomainError;

    fn try_from(f: SystemMessageFields) -> Result<Self, Self::Error> {
        let command = Self::new(f.target_user_id, f.kind, f.content)?;
        Ok(match f.related_post_id {
            Some(post_id) => command.with_related_post(post_id),
            None => command,
        })
    }
}

impl SendSystemMessageCommand {
    pub fn new(
        target_user_id: UserId,
        kind: SystemMessageKind,
        content: impl Into<String>,
    ) -> DomainResult<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(DomainError::validation("system message content must not be blank"));
        }

        Ok(Self {
            target_user_id,
            kind,
            content,
            related_post_id: None,
        })
    }

    pub fn with_related_post(mut self, post_id: PostId) -> Self {
        self.related_post_id = Some(post_id);
        self
    }

    pub fn target_user_id(&self) -> UserId {
        self.target_user_id
    }

    pub fn kind(&self) -> SystemMessageKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn related_post_id(&self) -> Option<PostId> {
        self.related_post_id
    }
}

impl Command for SendSystemMessageCommand {
    fn command_type() -> &'static str {
        "SendSystemMessageCommand"
    }
}
