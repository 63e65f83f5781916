//! Test doubles for the Discord-facing seams.

use crate::command_cache::{CommandRegistrar, RegisteredCommand};
use crate::error_context::Responder;
use async_trait::async_trait;
use commander_common::{AllowedMentions, BoxError};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, InteractionId, MessageId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// One call recorded by [`RecordingResponder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// `reply`
    Reply {
        /// Channel replied in.
        channel_id: ChannelId,
        /// Message replied to.
        message_id: MessageId,
        /// Reply text.
        content: String,
    },
    /// `respond`
    Response {
        /// Interaction responded to.
        interaction_id: InteractionId,
        /// Response text.
        content: String,
        /// Ephemeral flag.
        ephemeral: bool,
    },
    /// `followup`
    Followup {
        /// Id handed out for the followup.
        message_id: MessageId,
        /// Followup text.
        content: String,
        /// Ephemeral flag.
        ephemeral: bool,
    },
    /// `delete_followup`
    DeletedFollowup(MessageId),
    /// `send_message`
    Message {
        /// Target channel.
        channel_id: ChannelId,
        /// Message text.
        content: String,
    },
}

/// A [`Responder`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingResponder {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicU64,
}

impl RecordingResponder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    fn next_message_id(&self) -> MessageId {
        MessageId::new(1000 + self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn reply(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
        _mentions: AllowedMentions,
    ) -> Result<(), BoxError> {
        self.sent.lock().push(Sent::Reply {
            channel_id,
            message_id,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn respond(
        &self,
        interaction_id: InteractionId,
        _token: &str,
        content: &str,
        _mentions: AllowedMentions,
        ephemeral: bool,
    ) -> Result<(), BoxError> {
        self.sent.lock().push(Sent::Response {
            interaction_id,
            content: content.to_string(),
            ephemeral,
        });
        Ok(())
    }

    async fn followup(
        &self,
        _token: &str,
        content: &str,
        _mentions: AllowedMentions,
        ephemeral: bool,
    ) -> Result<MessageId, BoxError> {
        let message_id = self.next_message_id();
        self.sent.lock().push(Sent::Followup {
            message_id,
            content: content.to_string(),
            ephemeral,
        });
        Ok(message_id)
    }

    async fn delete_followup(&self, _token: &str, message_id: MessageId) -> Result<(), BoxError> {
        self.sent.lock().push(Sent::DeletedFollowup(message_id));
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
        _mentions: AllowedMentions,
    ) -> Result<MessageId, BoxError> {
        self.sent.lock().push(Sent::Message {
            channel_id,
            content: content.to_string(),
        });
        Ok(self.next_message_id())
    }
}

/// An in-process stand-in for Discord's command registration endpoints.
///
/// Definitions are plain command names; syncing assigns fresh ids.
#[derive(Debug, Default)]
pub struct FakeRegistrar {
    global: Mutex<Vec<RegisteredCommand>>,
    guilds: Mutex<HashMap<GuildId, Vec<RegisteredCommand>>>,
    failing: Mutex<bool>,
    next_id: AtomicU64,
}

impl FakeRegistrar {
    /// Creates a registrar with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the global registrations out of band.
    pub fn set_global(&self, commands: Vec<RegisteredCommand>) {
        *self.global.lock() = commands;
    }

    /// Replaces one guild's registrations out of band.
    pub fn set_guild(&self, guild_id: GuildId, commands: Vec<RegisteredCommand>) {
        self.guilds.lock().insert(guild_id, commands);
    }

    /// Makes every following remote call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    fn check(&self) -> Result<(), BoxError> {
        if *self.failing.lock() {
            return Err("remote unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRegistrar for FakeRegistrar {
    type Definition = String;

    async fn sync_global(&self, commands: Vec<String>) -> Result<Vec<RegisteredCommand>, BoxError> {
        self.check()?;
        let registered: Vec<RegisteredCommand> = commands
            .into_iter()
            .map(|name| {
                let id = 1 + self.next_id.fetch_add(1, Ordering::SeqCst);
                RegisteredCommand::global(name, id)
            })
            .collect();
        self.global.lock().clone_from(&registered);
        Ok(registered)
    }

    async fn fetch_global(&self) -> Result<Vec<RegisteredCommand>, BoxError> {
        self.check()?;
        Ok(self.global.lock().clone())
    }

    async fn fetch_guild(&self, guild_id: GuildId) -> Result<Vec<RegisteredCommand>, BoxError> {
        self.check()?;
        Ok(self.guilds.lock().get(&guild_id).cloned().unwrap_or_default())
    }
}
