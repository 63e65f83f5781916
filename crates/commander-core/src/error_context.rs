//! What the error pipeline knows about the place an error came from.
//!
//! Contexts are owned snapshots taken when the error surfaces, so they can be
//! handed to handlers without tying them to the framework's borrowed context
//! types. Outgoing messages go through a [`Responder`].

use async_trait::async_trait;
use commander_common::{AllowedMentions, BoxError};
use serenity::model::id::{ChannelId, GuildId, InteractionId, MessageId, UserId};
use std::fmt;
use std::sync::Arc;

/// Outgoing Discord calls the error pipeline and its handlers may make.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Replies to a message.
    async fn reply(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
        mentions: AllowedMentions,
    ) -> Result<(), BoxError>;

    /// Sends the initial response to an interaction that was not yet
    /// acknowledged.
    async fn respond(
        &self,
        interaction_id: InteractionId,
        token: &str,
        content: &str,
        mentions: AllowedMentions,
        ephemeral: bool,
    ) -> Result<(), BoxError>;

    /// Sends a followup message to an acknowledged interaction.
    async fn followup(
        &self,
        token: &str,
        content: &str,
        mentions: AllowedMentions,
        ephemeral: bool,
    ) -> Result<MessageId, BoxError>;

    /// Deletes a followup message.
    async fn delete_followup(&self, token: &str, message_id: MessageId) -> Result<(), BoxError>;

    /// Posts a plain message to a channel.
    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
        mentions: AllowedMentions,
    ) -> Result<MessageId, BoxError>;
}

/// Common view over the three context kinds.
pub trait ErrorContext: Send + Sync {
    /// One-line description used in logs and error reports.
    fn describe(&self) -> String;

    /// Guild the error happened in, if any.
    fn guild_id(&self) -> Option<GuildId>;

    /// Outgoing channel for this context.
    fn responder(&self) -> &Arc<dyn Responder>;
}

/// A failing gateway event handler.
#[derive(Clone)]
pub struct EventData {
    /// Event name, e.g. `message_delete`.
    pub name: String,
    /// Debug rendering of the event payload.
    pub detail: String,
    /// Guild the event belongs to, if any.
    pub guild_id: Option<GuildId>,
    /// Outgoing channel.
    pub responder: Arc<dyn Responder>,
}

impl EventData {
    /// Creates an event context.
    pub fn new(
        name: impl Into<String>,
        detail: impl Into<String>,
        guild_id: Option<GuildId>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            name: name.into(),
            detail: detail.into(),
            guild_id,
            responder,
        }
    }
}

impl ErrorContext for EventData {
    fn describe(&self) -> String {
        format!("event `{}`", self.name)
    }

    fn guild_id(&self) -> Option<GuildId> {
        self.guild_id
    }

    fn responder(&self) -> &Arc<dyn Responder> {
        &self.responder
    }
}

impl fmt::Debug for EventData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventData")
            .field("name", &self.name)
            .field("guild_id", &self.guild_id)
            .finish_non_exhaustive()
    }
}

/// Who ran which command, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Qualified command name.
    pub command: String,
    /// Invoking user.
    pub author_id: UserId,
    /// Channel the command ran in.
    pub channel_id: ChannelId,
    /// Guild the command ran in, `None` in DMs.
    pub guild_id: Option<GuildId>,
}

impl CommandInvocation {
    fn describe(&self) -> String {
        let place = self.guild_id.map_or_else(
            || format!("DM channel {}", self.channel_id),
            |guild| format!("channel {} of guild {guild}", self.channel_id),
        );
        format!("`{}` by user {} in {place}", self.command, self.author_id)
    }
}

/// A failing prefix command.
#[derive(Clone)]
pub struct CommandErrorContext {
    /// The invocation.
    pub invocation: CommandInvocation,
    /// Message that triggered the command.
    pub message_id: MessageId,
    /// Outgoing channel.
    pub responder: Arc<dyn Responder>,
}

impl ErrorContext for CommandErrorContext {
    fn describe(&self) -> String {
        format!("command {}", self.invocation.describe())
    }

    fn guild_id(&self) -> Option<GuildId> {
        self.invocation.guild_id
    }

    fn responder(&self) -> &Arc<dyn Responder> {
        &self.responder
    }
}

impl fmt::Debug for CommandErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandErrorContext")
            .field("invocation", &self.invocation)
            .field("message_id", &self.message_id)
            .finish_non_exhaustive()
    }
}

/// How far an interaction got before it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acknowledgement {
    /// Nothing was sent yet.
    #[default]
    None,
    /// A response message was sent.
    Responded,
    /// The response was deferred ("thinking...").
    Deferred {
        /// Whether the deferred response is ephemeral.
        ephemeral: bool,
    },
}

impl Acknowledgement {
    /// Whether an initial response exists.
    pub const fn is_acknowledged(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// A failing application (slash) command.
#[derive(Clone)]
pub struct AppCommandErrorContext {
    /// The invocation.
    pub invocation: CommandInvocation,
    /// Interaction id.
    pub interaction_id: InteractionId,
    /// Interaction token used for responses and followups.
    pub token: String,
    /// Acknowledgement state at the time of the error.
    pub acknowledgement: Acknowledgement,
    /// Outgoing channel.
    pub responder: Arc<dyn Responder>,
}

impl ErrorContext for AppCommandErrorContext {
    fn describe(&self) -> String {
        format!("app command {}", self.invocation.describe())
    }

    fn guild_id(&self) -> Option<GuildId> {
        self.invocation.guild_id
    }

    fn responder(&self) -> &Arc<dyn Responder> {
        &self.responder
    }
}

impl fmt::Debug for AppCommandErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCommandErrorContext")
            .field("invocation", &self.invocation)
            .field("interaction_id", &self.interaction_id)
            .field("acknowledgement", &self.acknowledgement)
            .finish_non_exhaustive()
    }
}
