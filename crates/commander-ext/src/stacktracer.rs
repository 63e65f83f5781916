//! The `stacktracer` extension: posts error reports to a log channel.
//!
//! One [`Stacktracer`] is appended to all three error chains. It reports to
//! the guild's configured channel, or to the global channel bot owners set
//! for errors outside guilds and guilds without a channel, and always
//! abstains so the pipeline's own reply still happens.
//!
//! `stacktracer test` raises a different error on each chain: the prefix
//! command fails on the command chain, the slash command on the application
//! command chain, and an owner's `<prefix>stacktracer test` message also
//! fails on the event chain.

use crate::store::{parse_options, DataStore, StoreOptions};
use async_trait::async_trait;
use commander_commands::{
    current_guild, Context, Data, Error, EventListener, Extension, ExtensionHost,
};
use commander_common::{
    format_error_report, sanitize_stacktrace, truncate_string, AllowedMentions, BoxError,
    ResponsiveError,
};
use commander_core::{
    make_database, DatabaseError, DynError, ErrorContext, ErrorHandler, GuildInfo,
    GuildPartitionedState, GuildStateError, GuildStateManager,
};
use once_cell::sync::Lazy;
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration name of the extension.
pub const STACKTRACER_EXTENSION: &str = "commander.ext.stacktracer";

/// Longest message Discord accepts.
const MESSAGE_LIMIT: usize = 2000;

/// Kept free in every report for an emoji prefix.
const EMOJI_ROOM: usize = 64;

static CUSTOM_EMOJI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<a?:\w+:\d+>$").expect("custom emoji pattern is valid"));

/// Stacktracer failures.
#[derive(Error, Debug)]
pub enum StacktracerError {
    /// The guild has no log channel.
    #[error("Error logging is not configured for this server")]
    LogNotSet,

    /// No global log channel is set.
    #[error("Global error logging is not configured")]
    GlobalLogNotSet,

    /// The channel is in another guild.
    #[error("<#{0}> is not a channel of this server")]
    ForeignChannel(ChannelId),

    /// Neither a unicode emoji nor a custom emoji.
    #[error("`{0}` is not an emoji")]
    InvalidEmoji(String),

    /// Raised on purpose by the `stacktracer test` prefix command.
    #[error("Test error raised by `stacktracer test` on the command error chain")]
    TestCommand,

    /// Raised on purpose by the `/stacktracer test` slash command.
    #[error("Test error raised by `stacktracer test` on the application command error chain")]
    TestAppCommand,

    /// Raised on purpose when an owner sends `<prefix>stacktracer test`.
    #[error("Test error raised by `stacktracer test` on the event error chain")]
    TestEvent,

    /// Storage failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Guild state could not be created.
    #[error(transparent)]
    GuildState(#[from] GuildStateError),
}

/// Where and how to report errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogOptions {
    /// Channel to post to.
    pub channel: ChannelId,
    /// Include the cause chain, not just the top-level message.
    #[serde(default = "default_stacktrace")]
    pub stacktrace: bool,
    /// Shown in front of every report header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

const fn default_stacktrace() -> bool {
    true
}

impl ErrorLogOptions {
    /// Reports to `channel` with causes and no emoji.
    pub const fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            stacktrace: true,
            emoji: None,
        }
    }

    /// Builds options from command arguments, checking the emoji.
    pub fn parse(
        channel: ChannelId,
        stacktrace: Option<bool>,
        emoji: Option<String>,
    ) -> Result<Self, StacktracerError> {
        let emoji = emoji.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        if let Some(emoji) = &emoji {
            if !is_emoji(emoji) {
                return Err(StacktracerError::InvalidEmoji(emoji.clone()));
            }
        }
        Ok(Self {
            channel,
            stacktrace: stacktrace.unwrap_or(true),
            emoji,
        })
    }

    /// Renders a report for `error` using these options.
    pub fn report(
        &self,
        context: &str,
        error: &(dyn StdError + 'static),
        handled: bool,
    ) -> String {
        let report = render_report(context, error, self.stacktrace, handled);
        match &self.emoji {
            Some(emoji) => format!("{emoji} {report}"),
            None => report,
        }
    }
}

/// Whether `value` is a custom emoji (`<:name:id>`) or a short run of
/// non-ASCII symbols.
pub fn is_emoji(value: &str) -> bool {
    if CUSTOM_EMOJI.is_match(value) {
        return true;
    }
    let count = value.chars().count();
    (1..=10).contains(&count)
        && value
            .chars()
            .all(|c| !c.is_ascii() && !c.is_whitespace() && !c.is_alphanumeric())
}

/// Log channel settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StacktracerData {
    /// Fallback for errors outside guilds and guilds without a channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<ErrorLogOptions>,
    /// Per-guild settings, keyed by guild id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub guilds: BTreeMap<u64, ErrorLogOptions>,
}

/// Persistent stacktracer data.
pub type StacktracerStore = DataStore<StacktracerData>;

/// Per-guild settings plus the shared reporter.
pub type StacktracerState = GuildPartitionedState<StacktracerGuildState, Arc<Stacktracer>>;

/// Renders an error report that fits in one message.
pub fn render_report(
    context: &str,
    error: &(dyn StdError + 'static),
    stacktrace: bool,
    handled: bool,
) -> String {
    let header = if handled {
        format!("**Handled error** in {context}")
    } else {
        format!("**Unhandled error** in {context}")
    };
    let body = if stacktrace {
        format_error_report(error)
    } else {
        sanitize_stacktrace(&error.to_string())
    };
    let framing = header.chars().count() + "\n```\n\n```".len() + EMOJI_ROOM;
    let budget = MESSAGE_LIMIT.saturating_sub(framing);
    format!("{header}\n```\n{}\n```", truncate_string(&body, budget))
}

/// Error handler posting reports to log channels.
#[derive(Debug)]
pub struct Stacktracer {
    store: Arc<StacktracerStore>,
}

impl Stacktracer {
    /// Creates a reporter over `store`.
    pub const fn new(store: Arc<StacktracerStore>) -> Self {
        Self { store }
    }

    /// Backing store.
    pub const fn store(&self) -> &Arc<StacktracerStore> {
        &self.store
    }

    /// Where an error from `guild_id` gets reported, if anywhere.
    pub async fn target(
        &self,
        guild_id: Option<GuildId>,
    ) -> Result<Option<ErrorLogOptions>, DatabaseError> {
        self.store
            .read(|data| {
                guild_id
                    .and_then(|id| data.guilds.get(&id.get()).cloned())
                    .or_else(|| data.global.clone())
            })
            .await
    }

    /// Sets the global log channel.
    pub async fn set_global(
        &self,
        options: ErrorLogOptions,
    ) -> Result<ErrorLogOptions, StacktracerError> {
        self.store
            .write(|data| {
                data.global = Some(options.clone());
                Ok::<_, StacktracerError>(())
            })
            .await?;
        info!(channel = %options.channel, "Global error log channel set");
        Ok(options)
    }

    /// Clears the global log channel.
    pub async fn clear_global(&self) -> Result<ErrorLogOptions, StacktracerError> {
        self.store
            .write(|data| data.global.take().ok_or(StacktracerError::GlobalLogNotSet))
            .await
    }

    /// The global log channel settings.
    pub async fn show_global(&self) -> Result<ErrorLogOptions, StacktracerError> {
        self.store
            .read(|data| data.global.clone())
            .await?
            .ok_or(StacktracerError::GlobalLogNotSet)
    }
}

#[async_trait]
impl<C: ErrorContext> ErrorHandler<C> for Stacktracer {
    async fn handle(
        &self,
        error: &DynError,
        context: &C,
        handled: bool,
    ) -> Result<Option<bool>, BoxError> {
        let Some(target) = self.target(context.guild_id()).await? else {
            return Ok(None);
        };

        let report = target.report(&context.describe(), error, handled);
        context
            .responder()
            .send_message(target.channel, &report, AllowedMentions::none())
            .await?;
        debug!(channel = %target.channel, "Posted error report");
        Ok(None)
    }
}

/// One guild's log channel settings.
#[derive(Debug)]
pub struct StacktracerGuildState {
    guild: GuildInfo,
    store: Arc<StacktracerStore>,
}

impl StacktracerGuildState {
    /// Binds the store to a guild.
    pub const fn new(guild: GuildInfo, store: Arc<StacktracerStore>) -> Self {
        Self { guild, store }
    }

    /// Sets the guild's log channel.
    pub async fn set_log(
        &self,
        options: ErrorLogOptions,
    ) -> Result<ErrorLogOptions, StacktracerError> {
        self.store
            .write(|data| {
                data.guilds.insert(self.guild.id.get(), options.clone());
                Ok::<_, StacktracerError>(())
            })
            .await?;
        info!(guild_id = %self.guild.id, channel = %options.channel, "Error log channel set");
        Ok(options)
    }

    /// Clears the guild's log channel.
    pub async fn clear_log(&self) -> Result<ErrorLogOptions, StacktracerError> {
        self.store
            .write(|data| {
                data.guilds
                    .remove(&self.guild.id.get())
                    .ok_or(StacktracerError::LogNotSet)
            })
            .await
    }

    /// The guild's log channel settings.
    pub async fn show_log(&self) -> Result<ErrorLogOptions, StacktracerError> {
        let guild_id = self.guild.id.get();
        self.store
            .read(|data| data.guilds.get(&guild_id).cloned())
            .await?
            .ok_or(StacktracerError::LogNotSet)
    }
}

/// Whether `content` is `<prefix>stacktracer test`.
pub fn is_test_trigger(content: &str, prefix: &str) -> bool {
    content
        .trim()
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.split_whitespace().eq(["stacktracer", "test"]))
}

/// Fails on the event chain when a bot owner sends `<prefix>stacktracer test`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventChainTest;

#[async_trait]
impl EventListener for EventChainTest {
    async fn on_event(
        &self,
        _ctx: &serenity::Context,
        event: &serenity::FullEvent,
        framework: poise::FrameworkContext<'_, Data, Error>,
    ) -> Result<(), Error> {
        let serenity::FullEvent::Message { new_message } = event else {
            return Ok(());
        };
        let options = framework.options();
        let Some(prefix) = options.prefix_options.prefix.as_deref() else {
            return Ok(());
        };
        if options.owners.contains(&new_message.author.id)
            && is_test_trigger(&new_message.content, prefix)
        {
            debug!(message_id = %new_message.id, "Raising event chain test error");
            return Err(Box::new(StacktracerError::TestEvent));
        }
        Ok(())
    }
}

/// Registers the reporter with every error chain, plus its commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct StacktracerExtension;

#[async_trait]
impl Extension for StacktracerExtension {
    fn name(&self) -> &'static str {
        STACKTRACER_EXTENSION
    }

    async fn setup(&self, host: &mut ExtensionHost, options: Option<&Value>) -> Result<(), Error> {
        let options: StoreOptions = parse_options(options)?;
        let store = Arc::new(StacktracerStore::new(make_database(&options.database)));
        store.load().await?;

        let tracer = Arc::new(Stacktracer::new(Arc::clone(&store)));
        host.add_event_error_handler(tracer.clone());
        host.add_command_error_handler(tracer.clone());
        host.add_app_command_error_handler(tracer.clone());

        let guilds = GuildStateManager::new("stacktracer", host.guild_resolver(), move |guild| {
            let store = Arc::clone(&store);
            async move { StacktracerGuildState::new(guild, store) }
        });
        host.insert_state(Arc::new(StacktracerState::new(guilds, tracer)));
        host.add_event_listener(Arc::new(EventChainTest));
        host.add_command(stacktracer());
        Ok(())
    }
}

fn respond(error: StacktracerError) -> Error {
    match error {
        StacktracerError::Database(_) | StacktracerError::GuildState(_) => Box::new(error),
        _ => Box::new(ResponsiveError::from_error(error)),
    }
}

async fn guild_state(ctx: Context<'_>) -> Result<(GuildInfo, Arc<StacktracerGuildState>), Error> {
    let guild = current_guild(ctx)?;
    let state = ctx.data().extension::<StacktracerState>()?;
    let guild_state = state.guild(guild.clone()).await?;
    Ok((guild, guild_state))
}

fn shared_tracer(ctx: Context<'_>) -> Result<Arc<Stacktracer>, Error> {
    let state = ctx.data().extension::<StacktracerState>()?;
    Ok(Arc::clone(state.shared()))
}

fn describe_log(scope: &str, options: &ErrorLogOptions) -> String {
    let mut text = format!("{scope} are logged to <#{}>", options.channel);
    if options.stacktrace {
        text.push_str(" with their causes");
    }
    if let Some(emoji) = &options.emoji {
        text.push_str(" marked with ");
        text.push_str(emoji);
    }
    text
}

/// Manage error logging for this server.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    default_member_permissions = "ADMINISTRATOR",
    required_permissions = "ADMINISTRATOR",
    subcommands(
        "stacktracer_set",
        "stacktracer_clear",
        "stacktracer_show",
        "stacktracer_test",
        "stacktracer_global"
    ),
    subcommand_required
)]
pub async fn stacktracer(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set the error log channel for this server.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "set"
)]
pub async fn stacktracer_set(
    ctx: Context<'_>,
    #[description = "The channel to log errors to"] channel: serenity::GuildChannel,
    #[description = "Whether reports include the error's causes"] stacktrace: Option<bool>,
    #[description = "The emoji shown on this server's reports"] emoji: Option<String>,
) -> Result<(), Error> {
    let (guild, state) = guild_state(ctx).await?;
    if channel.guild_id != guild.id {
        return Err(respond(StacktracerError::ForeignChannel(channel.id)));
    }

    let options = ErrorLogOptions::parse(channel.id, stacktrace, emoji).map_err(respond)?;
    let options = state.set_log(options).await.map_err(respond)?;
    ctx.say(describe_log("Errors in this server", &options)).await?;
    Ok(())
}

/// Clear the error log channel for this server.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "clear"
)]
pub async fn stacktracer_clear(ctx: Context<'_>) -> Result<(), Error> {
    let (_, state) = guild_state(ctx).await?;
    let options = state.clear_log().await.map_err(respond)?;
    ctx.say(format!("Errors are no longer logged to <#{}>", options.channel))
        .await?;
    Ok(())
}

/// Show the error log channel for this server.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "show"
)]
pub async fn stacktracer_show(ctx: Context<'_>) -> Result<(), Error> {
    let (_, state) = guild_state(ctx).await?;
    let options = state.show_log().await.map_err(respond)?;
    ctx.say(describe_log("Errors in this server", &options)).await?;
    Ok(())
}

/// Raise a test error to check the error log setup.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "test"
)]
pub async fn stacktracer_test(ctx: Context<'_>) -> Result<(), Error> {
    let error = match ctx {
        poise::Context::Application(_) => {
            ctx.say("Raising an exception...").await?;
            StacktracerError::TestAppCommand
        }
        poise::Context::Prefix(_) => StacktracerError::TestCommand,
    };
    Err(respond(error))
}

/// Manage the error log for everything without a server log channel.
#[poise::command(
    slash_command,
    prefix_command,
    owners_only,
    rename = "global",
    subcommands(
        "stacktracer_global_set",
        "stacktracer_global_clear",
        "stacktracer_global_show"
    ),
    subcommand_required
)]
pub async fn stacktracer_global(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set the global error log channel.
#[poise::command(slash_command, prefix_command, owners_only, rename = "set")]
pub async fn stacktracer_global_set(
    ctx: Context<'_>,
    #[description = "The channel to log errors to"] channel: serenity::GuildChannel,
    #[description = "Whether reports include the error's causes"] stacktrace: Option<bool>,
    #[description = "The emoji shown on global reports"] emoji: Option<String>,
) -> Result<(), Error> {
    let options = ErrorLogOptions::parse(channel.id, stacktrace, emoji).map_err(respond)?;
    let options = shared_tracer(ctx)?.set_global(options).await.map_err(respond)?;
    ctx.say(describe_log("Errors without a server log channel", &options))
        .await?;
    Ok(())
}

/// Clear the global error log channel.
#[poise::command(slash_command, prefix_command, owners_only, rename = "clear")]
pub async fn stacktracer_global_clear(ctx: Context<'_>) -> Result<(), Error> {
    let options = shared_tracer(ctx)?.clear_global().await.map_err(respond)?;
    ctx.say(format!(
        "Errors without a server log channel are no longer logged to <#{}>",
        options.channel
    ))
    .await?;
    Ok(())
}

/// Show the global error log channel.
#[poise::command(slash_command, prefix_command, owners_only, rename = "show")]
pub async fn stacktracer_global_show(ctx: Context<'_>) -> Result<(), Error> {
    let options = shared_tracer(ctx)?.show_global().await.map_err(respond)?;
    ctx.say(describe_log("Errors without a server log channel", &options))
        .await?;
    Ok(())
}
