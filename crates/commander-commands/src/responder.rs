//! Sends error-pipeline messages through Discord's HTTP API.

use async_trait::async_trait;
use commander_common::{AllowedMentions, BoxError};
use commander_core::Responder;
use poise::serenity_prelude::{
    self as serenity, ChannelId, CreateAllowedMentions, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage, CreateMessage,
    InteractionId, MessageId,
};
use std::sync::Arc;

/// Converts the configuration-level mention policy to serenity's builder.
pub fn to_serenity_mentions(mentions: AllowedMentions) -> CreateAllowedMentions {
    CreateAllowedMentions::new()
        .everyone(mentions.everyone)
        .all_users(mentions.users)
        .all_roles(mentions.roles)
        .replied_user(mentions.replied_user)
}

/// [`Responder`] backed by a serenity HTTP client.
#[derive(Clone)]
pub struct HttpResponder {
    http: Arc<serenity::Http>,
}

impl HttpResponder {
    /// Wraps an HTTP client.
    pub const fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

impl std::fmt::Debug for HttpResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponder").finish_non_exhaustive()
    }
}

#[async_trait]
impl Responder for HttpResponder {
    async fn reply(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
        mentions: AllowedMentions,
    ) -> Result<(), BoxError> {
        let message = CreateMessage::new()
            .content(content)
            .reference_message((channel_id, message_id))
            .allowed_mentions(to_serenity_mentions(mentions));
        channel_id.send_message(&self.http, message).await?;
        Ok(())
    }

    async fn respond(
        &self,
        interaction_id: InteractionId,
        token: &str,
        content: &str,
        mentions: AllowedMentions,
        ephemeral: bool,
    ) -> Result<(), BoxError> {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(ephemeral)
                .allowed_mentions(to_serenity_mentions(mentions)),
        );
        self.http
            .create_interaction_response(interaction_id, token, &response, Vec::new())
            .await?;
        Ok(())
    }

    async fn followup(
        &self,
        token: &str,
        content: &str,
        mentions: AllowedMentions,
        ephemeral: bool,
    ) -> Result<MessageId, BoxError> {
        let followup = CreateInteractionResponseFollowup::new()
            .content(content)
            .ephemeral(ephemeral)
            .allowed_mentions(to_serenity_mentions(mentions));
        let message = self
            .http
            .create_followup_message(token, &followup, Vec::new())
            .await?;
        Ok(message.id)
    }

    async fn delete_followup(&self, token: &str, message_id: MessageId) -> Result<(), BoxError> {
        self.http.delete_followup_message(token, message_id).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
        mentions: AllowedMentions,
    ) -> Result<MessageId, BoxError> {
        let message = CreateMessage::new()
            .content(content)
            .allowed_mentions(to_serenity_mentions(mentions));
        let sent = channel_id.send_message(&self.http, message).await?;
        Ok(sent.id)
    }
}
