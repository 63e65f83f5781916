//! Poise framework setup, shared data and error routing.

use crate::checks::{CheckFailure, InvocationError};
use crate::extension::{Command, EventListener, ExtensionStates};
use crate::registrar::SerenityRegistrar;
use crate::responder::{to_serenity_mentions, HttpResponder};
use chrono::{DateTime, Utc};
use commander_common::{truncate_string, ResponsiveError};
use commander_config::{ConfigCache, ExtensionRegistry};
use commander_core::{
    Acknowledgement, AppCommandErrorContext, CommandCache, CommandErrorContext, CommandInvocation,
    ErrorHandling, EventData, GuildDirectory, GuildInfo, Responder,
};
use parking_lot::RwLock;
use poise::serenity_prelude::{self as serenity, MessageFlags};
use std::any::{type_name, Any};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Application error type for commands.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Command context type.
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Longest event payload rendering kept in an event error context.
const EVENT_DETAIL_LIMIT: usize = 1000;

/// Application data accessible in all commands.
pub struct Data {
    /// Live configuration, saved back to its file on change.
    pub config: ConfigCache,
    /// Configured extensions; edits are saved to the configuration and take
    /// effect on the next start.
    pub extensions: RwLock<ExtensionRegistry>,
    /// Extensions that loaded successfully, in load order.
    pub loaded_extensions: Vec<String>,
    /// Error-handler chains.
    pub errors: Arc<ErrorHandling>,
    /// Remote application command snapshot.
    pub commands: CommandCache<SerenityRegistrar>,
    /// Guilds the bot is in.
    pub guilds: Arc<GuildDirectory>,
    /// State registered by extensions.
    pub states: ExtensionStates,
    /// Gateway event listeners registered by extensions.
    pub listeners: Vec<Arc<dyn EventListener>>,
    /// When the process started.
    pub started_at: DateTime<Utc>,
    /// When the gateway connection last became ready.
    pub connected_since: RwLock<Option<DateTime<Utc>>>,
}

impl Data {
    /// The state object an extension registered, by type.
    pub fn extension<T: Any + Send + Sync>(&self) -> Result<Arc<T>, Error> {
        self.states
            .get::<T>()
            .ok_or_else(|| format!("Extension state `{}` is not loaded", type_name::<T>()).into())
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &"<Config>")
            .field("loaded_extensions", &self.loaded_extensions)
            .field("commands", &self.commands)
            .field("guilds", &self.guilds.len())
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

/// The guild a command was invoked in.
///
/// Fails with a user-facing error in direct messages.
pub fn current_guild(ctx: Context<'_>) -> Result<GuildInfo, Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| ResponsiveError::new("This command can only be used in a server."))?;
    let name = ctx.guild().map(|guild| guild.name.clone()).unwrap_or_default();
    Ok(GuildInfo::new(guild_id, name))
}

/// Built-in commands every bot has, regardless of configured extensions.
pub fn builtin_commands() -> Vec<Command> {
    vec![
        crate::status::status(),
        crate::admin::extensions(),
        crate::admin::synctree(),
    ]
}

/// Creates a new Poise framework with the built-in commands plus `extra`.
///
/// The caller attaches the setup closure.
pub fn create_framework(
    prefix: impl Into<String>,
    allowed_mentions: commander_common::AllowedMentions,
    extra: Vec<Command>,
) -> poise::FrameworkBuilder<Data, Error> {
    let mut commands = builtin_commands();
    commands.extend(extra);

    poise::Framework::builder().options(poise::FrameworkOptions {
        commands,
        on_error: |error| Box::pin(on_error(error)),
        event_handler: |ctx, event, framework, data| {
            Box::pin(event_handler(ctx, event, framework, data))
        },
        allowed_mentions: Some(to_serenity_mentions(allowed_mentions)),
        prefix_options: poise::PrefixFrameworkOptions {
            prefix: Some(prefix.into()),
            mention_as_prefix: true,
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Routes framework errors into the matching error chain.
///
/// Every failure that carries an invocation context goes through the command
/// or app-command chain; check failures arrive there as responsive errors.
pub async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            dispatch_command_error(ctx, error).await;
        }
        poise::FrameworkError::ArgumentParse {
            error, input, ctx, ..
        } => {
            let message = input.map_or_else(
                || format!("Invalid arguments: {error}"),
                |input| format!("Could not understand `{input}`: {error}"),
            );
            dispatch_command_error(ctx, Box::new(ResponsiveError::new(message))).await;
        }
        poise::FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error = error.unwrap_or_else(|| {
                Box::new(ResponsiveError::new("You are not allowed to use this command."))
            });
            dispatch_command_error(ctx, error).await;
        }
        poise::FrameworkError::CommandPanic { payload, ctx, .. } => {
            dispatch_command_error(ctx, Box::new(InvocationError::Panicked(payload))).await;
        }
        poise::FrameworkError::CommandStructureMismatch {
            description, ctx, ..
        } => {
            let error = InvocationError::StructureMismatch(description);
            dispatch_command_error(poise::Context::Application(ctx), Box::new(error)).await;
        }
        poise::FrameworkError::NotAnOwner { ctx, .. } => {
            dispatch_check_failure(ctx, CheckFailure::NotAnOwner).await;
        }
        poise::FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            let failure = CheckFailure::MissingUserPermissions(missing_permissions);
            dispatch_check_failure(ctx, failure).await;
        }
        poise::FrameworkError::MissingBotPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            let failure = CheckFailure::MissingBotPermissions(missing_permissions);
            dispatch_check_failure(ctx, failure).await;
        }
        poise::FrameworkError::GuildOnly { ctx, .. } => {
            dispatch_check_failure(ctx, CheckFailure::GuildOnly).await;
        }
        poise::FrameworkError::DmOnly { ctx, .. } => {
            dispatch_check_failure(ctx, CheckFailure::DmOnly).await;
        }
        poise::FrameworkError::NsfwOnly { ctx, .. } => {
            dispatch_check_failure(ctx, CheckFailure::NsfwOnly).await;
        }
        poise::FrameworkError::CooldownHit {
            remaining_cooldown,
            ctx,
            ..
        } => {
            dispatch_check_failure(ctx, CheckFailure::Cooldown(remaining_cooldown)).await;
        }
        poise::FrameworkError::SubcommandRequired { ctx, .. } => {
            let command = ctx.command();
            let failure = CheckFailure::SubcommandRequired {
                command: command.qualified_name.clone(),
                subcommands: command
                    .subcommands
                    .iter()
                    .map(|sub| sub.name.clone())
                    .collect(),
            };
            dispatch_check_failure(ctx, failure).await;
        }
        poise::FrameworkError::EventHandler {
            error,
            ctx,
            event,
            framework,
            ..
        } => {
            dispatch_event_error(ctx, event, framework.user_data, error).await;
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

async fn dispatch_check_failure(ctx: Context<'_>, failure: CheckFailure) {
    debug!(command = %ctx.command().qualified_name, ?failure, "Command check failed");
    dispatch_command_error(ctx, Box::new(ResponsiveError::new(failure.message()))).await;
}

async fn dispatch_event_error(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
    error: Error,
) {
    let responder: Arc<dyn Responder> = Arc::new(HttpResponder::new(Arc::clone(&ctx.http)));
    let context = EventData::new(
        event.snake_case_name(),
        truncate_string(&format!("{event:?}"), EVENT_DETAIL_LIMIT),
        None,
        responder,
    );
    data.errors
        .dispatch_event_error(error.as_ref(), &context)
        .await;
}

fn invocation(ctx: Context<'_>) -> CommandInvocation {
    CommandInvocation {
        command: ctx.command().qualified_name.clone(),
        author_id: ctx.author().id,
        channel_id: ctx.channel_id(),
        guild_id: ctx.guild_id(),
    }
}

async fn dispatch_command_error(ctx: Context<'_>, error: Error) {
    let data = ctx.data();
    let responder: Arc<dyn Responder> =
        Arc::new(HttpResponder::new(Arc::clone(&ctx.serenity_context().http)));

    match ctx {
        poise::Context::Prefix(prefix) => {
            let context = CommandErrorContext {
                invocation: invocation(ctx),
                message_id: prefix.msg.id,
                responder,
            };
            data.errors
                .dispatch_command_error(error.as_ref(), &context)
                .await;
        }
        poise::Context::Application(app) => {
            let context = AppCommandErrorContext {
                invocation: invocation(ctx),
                interaction_id: app.interaction.id,
                token: app.interaction.token.clone(),
                acknowledgement: acknowledgement(app).await,
                responder,
            };
            data.errors
                .dispatch_app_command_error(error.as_ref(), &context)
                .await;
        }
    }
}

/// Works out how the interaction was answered so far.
///
/// A deferred response shows up as a "loading" original message.
async fn acknowledgement(ctx: poise::ApplicationContext<'_, Data, Error>) -> Acknowledgement {
    if !ctx.has_sent_initial_response.load(Ordering::SeqCst) {
        return Acknowledgement::None;
    }

    match ctx.interaction.get_response(&ctx.serenity_context.http).await {
        Ok(message) => {
            let flags = message.flags.unwrap_or(MessageFlags::empty());
            if flags.contains(MessageFlags::LOADING) {
                Acknowledgement::Deferred {
                    ephemeral: flags.contains(MessageFlags::EPHEMERAL),
                }
            } else {
                Acknowledgement::Responded
            }
        }
        Err(e) => {
            debug!("Could not fetch original interaction response: {}", e);
            Acknowledgement::Responded
        }
    }
}

/// Keeps the guild directory and connection status in sync with the gateway,
/// then hands the event to every extension listener.
///
/// A failing listener goes through the event chain without stopping the
/// others.
pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!(
                "Connected as {} to {} guilds",
                data_about_bot.user.name,
                data_about_bot.guilds.len()
            );
            for guild in &data_about_bot.guilds {
                data.guilds.insert_unnamed(guild.id);
            }
            *data.connected_since.write() = Some(Utc::now());
        }
        serenity::FullEvent::Resume { .. } => {
            info!("Gateway session resumed");
        }
        serenity::FullEvent::GuildCreate { guild, .. } => {
            data.guilds.insert(GuildInfo::from(guild));
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            if incomplete.unavailable {
                warn!(guild_id = %incomplete.id, "Guild became unavailable");
            } else {
                info!(guild_id = %incomplete.id, "Left guild");
                data.guilds.remove(incomplete.id);
            }
        }
        _ => {}
    }

    for listener in &data.listeners {
        if let Err(error) = listener.on_event(ctx, event, framework).await {
            dispatch_event_error(ctx, event, data, error).await;
        }
    }
    Ok(())
}
