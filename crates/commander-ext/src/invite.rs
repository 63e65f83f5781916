//! The `invite` extension: named invite links per guild.

use crate::invite_data::{parse_tags, InviteData, InviteEntry, InviteError};
use crate::store::{parse_options, DataStore, StoreOptions};
use async_trait::async_trait;
use chrono::Utc;
use commander_commands::{
    confirm, current_guild, Context, Error, Extension, ExtensionHost, DEFAULT_CONFIRM_TIMEOUT,
};
use commander_common::ResponsiveError;
use commander_core::{make_database, GuildInfo, GuildPartitionedState, GuildStateManager};
use poise::serenity_prelude::CreateEmbed;
use poise::CreateReply;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Configuration name of the extension.
pub const INVITE_EXTENSION: &str = "commander.ext.invite";

const EMBED_COLOR: u32 = 0x00_AC_ED;

/// Persistent invite data shared by every guild.
pub type InviteStore = DataStore<InviteData>;

/// Per-guild invite states plus the shared store.
pub type InviteState = GuildPartitionedState<InviteGuildState, Arc<InviteStore>>;

/// Rendered `invite list` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteListing {
    /// Embed body.
    pub description: String,
    /// Number of invites.
    pub invites: usize,
    /// Number of tags.
    pub tags: usize,
}

/// One guild's view of the invite store.
#[derive(Debug)]
pub struct InviteGuildState {
    guild: GuildInfo,
    store: Arc<InviteStore>,
}

impl InviteGuildState {
    /// Binds the store to a guild.
    pub const fn new(guild: GuildInfo, store: Arc<InviteStore>) -> Self {
        Self { guild, store }
    }

    /// The guild this state belongs to.
    pub const fn guild(&self) -> &GuildInfo {
        &self.guild
    }

    /// Lines for every invite matching `query`, counting a hit on each.
    pub async fn get_invite(&self, query: &str) -> Result<String, InviteError> {
        let entries = self
            .store
            .write(|data| data.guild_mut(self.guild.id).hit(query))
            .await?;
        Ok(entries
            .iter()
            .map(InviteEntry::format_line)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// The guild's own invite line, counting a hit.
    pub async fn get_guild_invite(&self) -> Result<String, InviteError> {
        let entry = self
            .store
            .write(|data| data.guild_mut(self.guild.id).hit_guild_invite())
            .await?;
        Ok(entry.format_line())
    }

    /// All invites and tags of the guild.
    pub async fn list_invites(&self) -> Result<InviteListing, InviteError> {
        let guild_id = self.guild.id;
        let listing = self
            .store
            .read(|data| {
                data.guild(guild_id).map_or_else(
                    || render_listing(&[], &[]),
                    |guild| {
                        let entries: Vec<&InviteEntry> = guild.entries().collect();
                        let tags: Vec<&str> = guild.tags().collect();
                        render_listing(&entries, &tags)
                    },
                )
            })
            .await?;
        Ok(listing)
    }

    /// The entry with this key.
    pub async fn require_invite(&self, key: &str) -> Result<InviteEntry, InviteError> {
        let guild_id = self.guild.id;
        self.store
            .read(|data| {
                data.guild(guild_id)
                    .ok_or_else(|| InviteError::DoesNotExist(key.to_string()))
                    .and_then(|guild| guild.require(key).cloned())
            })
            .await?
    }

    /// Adds an invite.
    pub async fn add_invite(
        &self,
        key: &str,
        tags: &str,
        link: &str,
        description: Option<String>,
    ) -> Result<InviteEntry, InviteError> {
        let entry = self
            .store
            .write(|data| {
                data.guild_mut(self.guild.id)
                    .add(key, parse_tags(tags), link, description, Utc::now())
            })
            .await?;
        info!(guild_id = %self.guild.id, key = %entry.key, "Added invite");
        Ok(entry)
    }

    /// Replaces an invite's tags, link and description.
    pub async fn modify_invite(
        &self,
        key: &str,
        tags: &str,
        link: &str,
        description: Option<String>,
    ) -> Result<InviteEntry, InviteError> {
        self.store
            .write(|data| {
                data.guild_mut(self.guild.id)
                    .modify(key, parse_tags(tags), link, description, Utc::now())
            })
            .await
    }

    /// Removes an invite.
    pub async fn remove_invite(&self, key: &str) -> Result<InviteEntry, InviteError> {
        let entry = self
            .store
            .write(|data| data.guild_mut(self.guild.id).remove(key))
            .await?;
        info!(guild_id = %self.guild.id, key = %entry.key, "Removed invite");
        Ok(entry)
    }

    /// Makes an invite the guild's own.
    pub async fn set_guild_invite(&self, key: &str) -> Result<InviteEntry, InviteError> {
        self.store
            .write(|data| data.guild_mut(self.guild.id).set_guild_invite(key))
            .await
    }

    /// Forgets the guild's own invite.
    pub async fn clear_guild_invite(&self) -> Result<InviteEntry, InviteError> {
        self.store
            .write(|data| data.guild_mut(self.guild.id).clear_guild_invite())
            .await
    }

    /// The guild's own invite, without counting a hit.
    pub async fn show_guild_invite(&self) -> Result<InviteEntry, InviteError> {
        let guild_id = self.guild.id;
        self.store
            .read(|data| {
                data.guild(guild_id)
                    .ok_or(InviteError::GuildInviteNotSet)
                    .and_then(|guild| guild.require_guild_invite().cloned())
            })
            .await?
    }
}

fn format_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> String {
    tags.into_iter()
        .map(|tag| format!("`{tag}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_key(entry: &InviteEntry) -> String {
    match &entry.description {
        Some(description) => format!("`{}` - {}", entry.key, description),
        None => format!("`{}`", entry.key),
    }
}

/// Builds the listing: described invites one per line, the rest on one line,
/// then the tags.
pub fn render_listing(entries: &[&InviteEntry], tags: &[&str]) -> InviteListing {
    let (described, plain): (Vec<&InviteEntry>, Vec<&InviteEntry>) = entries
        .iter()
        .copied()
        .partition(|entry| entry.description.is_some());

    let mut lines = Vec::new();
    if !entries.is_empty() {
        lines.push("**Invites**".to_string());
        if !described.is_empty() {
            lines.extend(described.iter().map(|entry| format!("• {}", format_key(entry))));
            lines.push(String::new());
        }
        if !plain.is_empty() {
            lines.push(
                plain
                    .iter()
                    .map(|entry| format_key(entry))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            lines.push(String::new());
        }
        if !tags.is_empty() {
            lines.push(format!("**Tags**\n{}", format_tags(tags.iter().copied())));
        }
    }

    let description = if lines.is_empty() {
        "**None!**".to_string()
    } else {
        lines.join("\n").trim_end().to_string()
    };

    InviteListing {
        description,
        invites: entries.len(),
        tags: tags.len(),
    }
}

/// Registers the invite commands and state.
#[derive(Debug, Default, Clone, Copy)]
pub struct InviteExtension;

#[async_trait]
impl Extension for InviteExtension {
    fn name(&self) -> &'static str {
        INVITE_EXTENSION
    }

    async fn setup(&self, host: &mut ExtensionHost, options: Option<&Value>) -> Result<(), Error> {
        let options: StoreOptions = parse_options(options)?;
        let store = Arc::new(InviteStore::new(make_database(&options.database)));
        store.load().await?;

        let factory_store = Arc::clone(&store);
        let guilds = GuildStateManager::new("invite", host.guild_resolver(), move |guild| {
            let store = Arc::clone(&factory_store);
            async move { InviteGuildState::new(guild, store) }
        });

        host.insert_state(Arc::new(InviteState::new(guilds, store)));
        host.add_command(invite());
        host.add_command(invites());
        Ok(())
    }
}

/// Turns user mistakes into replies; everything else is only logged.
fn respond(error: InviteError) -> Error {
    if error.is_user_facing() {
        Box::new(ResponsiveError::from_error(error))
    } else {
        Box::new(error)
    }
}

async fn guild_state(ctx: Context<'_>) -> Result<Arc<InviteGuildState>, Error> {
    let guild = current_guild(ctx)?;
    let state = ctx.data().extension::<InviteState>()?;
    Ok(state.guild(guild).await?)
}

/// Show invites.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    subcommands("invite_get", "invite_list", "invite_here"),
    subcommand_required
)]
pub async fn invite(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Get invites by key or tag.
#[poise::command(slash_command, prefix_command, guild_only, rename = "get")]
pub async fn invite_get(
    ctx: Context<'_>,
    #[description = "The invite or tag to get"] query: String,
) -> Result<(), Error> {
    let lines = guild_state(ctx)
        .await?
        .get_invite(&query)
        .await
        .map_err(respond)?;
    ctx.say(lines).await?;
    Ok(())
}

/// List available invites.
#[poise::command(slash_command, prefix_command, guild_only, rename = "list")]
pub async fn invite_list(ctx: Context<'_>) -> Result<(), Error> {
    let listing = guild_state(ctx)
        .await?
        .list_invites()
        .await
        .map_err(respond)?;
    let embed = CreateEmbed::new()
        .title("Available invites and tags")
        .description(listing.description)
        .color(EMBED_COLOR)
        .footer(poise::serenity_prelude::CreateEmbedFooter::new(format!(
            "Invites: {} | Tags: {}",
            listing.invites, listing.tags
        )));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Get the invite for this server.
#[poise::command(slash_command, prefix_command, guild_only, rename = "here")]
pub async fn invite_here(ctx: Context<'_>) -> Result<(), Error> {
    let line = guild_state(ctx)
        .await?
        .get_guild_invite()
        .await
        .map_err(respond)?;
    ctx.say(line).await?;
    Ok(())
}

/// Manage invites.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    default_member_permissions = "ADMINISTRATOR",
    required_permissions = "ADMINISTRATOR",
    subcommands(
        "invites_add",
        "invites_modify",
        "invites_remove",
        "invites_details",
        "invites_here"
    ),
    subcommand_required
)]
pub async fn invites(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a new invite.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "add"
)]
pub async fn invites_add(
    ctx: Context<'_>,
    #[description = "Unique key of the invite"] key: String,
    #[description = "Invite link, e.g. https://discord.gg/..."] link: String,
    #[description = "Comma separated tags"] tags: Option<String>,
    #[description = "Short description"]
    #[max_length = 64]
    description: Option<String>,
) -> Result<(), Error> {
    let entry = guild_state(ctx)
        .await?
        .add_invite(
            key.trim(),
            tags.as_deref().unwrap_or_default(),
            link.trim(),
            description.filter(|text| !text.trim().is_empty()),
        )
        .await
        .map_err(respond)?;
    ctx.say(format!("Added the invite `{}`", entry.key)).await?;
    Ok(())
}

/// Modify an invite.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "modify"
)]
pub async fn invites_modify(
    ctx: Context<'_>,
    #[description = "The invite to modify"] key: String,
    #[description = "Invite link"] link: String,
    #[description = "Comma separated tags"] tags: Option<String>,
    #[description = "Short description"]
    #[max_length = 64]
    description: Option<String>,
) -> Result<(), Error> {
    let entry = guild_state(ctx)
        .await?
        .modify_invite(
            key.trim(),
            tags.as_deref().unwrap_or_default(),
            link.trim(),
            description.filter(|text| !text.trim().is_empty()),
        )
        .await
        .map_err(respond)?;
    ctx.say(format!("Modified the invite `{}`", entry.key)).await?;
    Ok(())
}

/// Remove an invite.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "remove"
)]
pub async fn invites_remove(
    ctx: Context<'_>,
    #[description = "The invite to remove"] key: String,
) -> Result<(), Error> {
    let state = guild_state(ctx).await?;
    let entry = state.require_invite(&key).await.map_err(respond)?;

    let answer = confirm(
        ctx,
        &format!("Are you sure you want to remove the invite `{}`?", entry.key),
        DEFAULT_CONFIRM_TIMEOUT,
    )
    .await?;

    if answer.is_confirmed() {
        state.remove_invite(&entry.key).await.map_err(respond)?;
        ctx.say(format!("Removed the invite `{}`", entry.key)).await?;
    } else {
        ctx.say(format!("Did not remove the invite `{}`", entry.key))
            .await?;
    }
    Ok(())
}

/// Show the details about an invite.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "details"
)]
pub async fn invites_details(
    ctx: Context<'_>,
    #[description = "The invite to show details about"] key: String,
) -> Result<(), Error> {
    let entry = guild_state(ctx)
        .await?
        .require_invite(&key)
        .await
        .map_err(respond)?;

    let tags = format_tags(entry.tags.iter().map(String::as_str));
    let embed = CreateEmbed::new()
        .title(format!("Details for invite `{}`", entry.key))
        .description(format!("**Preview**\n> {}", entry.format_line()))
        .color(EMBED_COLOR)
        .field("Key", format!("`{}`", entry.key), false)
        .field(
            "Tags",
            if tags.is_empty() { "**None!**".to_string() } else { tags },
            false,
        )
        .field("Hits", format!("`{}`", entry.hits), true)
        .field("Added", format!("<t:{}:R>", entry.added_on.timestamp()), true)
        .field(
            "Modified",
            format!("<t:{}:R>", entry.modified_on.timestamp()),
            true,
        );
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Manage the invite for this server.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "here",
    subcommands("invites_here_set", "invites_here_clear", "invites_here_show"),
    subcommand_required
)]
pub async fn invites_here(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set the invite for this server.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "set"
)]
pub async fn invites_here_set(
    ctx: Context<'_>,
    #[description = "The invite to use for this server"] key: String,
) -> Result<(), Error> {
    let entry = guild_state(ctx)
        .await?
        .set_guild_invite(&key)
        .await
        .map_err(respond)?;
    ctx.say(format!(
        "Set invite `{}` as the invite for this server",
        entry.key
    ))
    .await?;
    Ok(())
}

/// Clear the invite for this server.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "clear"
)]
pub async fn invites_here_clear(ctx: Context<'_>) -> Result<(), Error> {
    guild_state(ctx)
        .await?
        .clear_guild_invite()
        .await
        .map_err(respond)?;
    ctx.say("Cleared the invite for this server").await?;
    Ok(())
}

/// Show the invite for this server.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "show"
)]
pub async fn invites_here_show(ctx: Context<'_>) -> Result<(), Error> {
    let entry = guild_state(ctx)
        .await?
        .show_guild_invite()
        .await
        .map_err(respond)?;
    ctx.say(format!(
        "Using invite `{}` as the invite for this server",
        entry.key
    ))
    .await?;
    Ok(())
}
