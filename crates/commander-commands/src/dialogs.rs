//! Interactive confirmation prompts.

use crate::framework::{Context, Error};
use poise::serenity_prelude::{
    self as serenity, ButtonStyle, CreateActionRow, CreateButton, CreateInteractionResponse,
};
use poise::CreateReply;
use std::time::Duration;
use tracing::debug;

/// Default time a user has to answer a confirmation prompt.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// How a confirmation prompt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    /// The user clicked "Yes".
    Yes,
    /// The user clicked "No".
    No,
    /// Nobody answered in time.
    NoResponse,
}

impl ConfirmationResult {
    /// Only an explicit "Yes" confirms.
    pub const fn is_confirmed(self) -> bool {
        matches!(self, Self::Yes)
    }

    /// Maps the clicked button to an outcome.
    pub fn from_button(custom_id: Option<&str>, yes_id: &str) -> Self {
        match custom_id {
            Some(id) if id == yes_id => Self::Yes,
            Some(_) => Self::No,
            None => Self::NoResponse,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Yes => "Confirmed.",
            Self::No => "Cancelled.",
            Self::NoResponse => "No response, cancelled.",
        }
    }
}

/// Asks the invoking user to confirm, with "Yes" and "No" buttons.
///
/// Resolves to [`ConfirmationResult::NoResponse`] after `timeout`.
pub async fn confirm(
    ctx: Context<'_>,
    content: &str,
    timeout: Duration,
) -> Result<ConfirmationResult, Error> {
    let yes_id = format!("{}-yes", ctx.id());
    let no_id = format!("{}-no", ctx.id());
    let buttons = vec![CreateActionRow::Buttons(vec![
        CreateButton::new(yes_id.clone())
            .label("Yes")
            .style(ButtonStyle::Success),
        CreateButton::new(no_id.clone())
            .label("No")
            .style(ButtonStyle::Danger),
    ])];

    let reply = ctx
        .send(
            CreateReply::default()
                .content(content)
                .components(buttons),
        )
        .await?;

    let (filter_yes, filter_no) = (yes_id.clone(), no_id);
    let interaction = serenity::ComponentInteractionCollector::new(ctx)
        .author_id(ctx.author().id)
        .channel_id(ctx.channel_id())
        .timeout(timeout)
        .filter(move |i| i.data.custom_id == filter_yes || i.data.custom_id == filter_no)
        .await;

    let result = ConfirmationResult::from_button(
        interaction.as_ref().map(|i| i.data.custom_id.as_str()),
        &yes_id,
    );
    debug!(?result, "Confirmation answered");

    if let Some(interaction) = interaction {
        interaction
            .create_response(ctx, CreateInteractionResponse::Acknowledge)
            .await?;
    }

    reply
        .edit(
            ctx,
            CreateReply::default()
                .content(format!("{content}\n*{}*", result.describe()))
                .components(Vec::new()),
        )
        .await?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_button() {
        assert_eq!(
            ConfirmationResult::from_button(Some("1-yes"), "1-yes"),
            ConfirmationResult::Yes
        );
        assert_eq!(
            ConfirmationResult::from_button(Some("1-no"), "1-yes"),
            ConfirmationResult::No
        );
        assert_eq!(
            ConfirmationResult::from_button(None, "1-yes"),
            ConfirmationResult::NoResponse
        );
    }

    #[test]
    fn test_only_yes_confirms() {
        assert!(ConfirmationResult::Yes.is_confirmed());
        assert!(!ConfirmationResult::No.is_confirmed());
        assert!(!ConfirmationResult::NoResponse.is_confirmed());
    }
}
