//! Core bot logic using the Poise framework.

use crate::error::{BotError, BotResult};
use chrono::Utc;
use commander_commands::{
    create_framework, Command, Data, EventListener, ExtensionLoader, ExtensionStates,
    SerenityRegistrar,
};
use commander_config::{
    Config, ConfigCache, ConfigLoader, ExtensionRegistry, PrivilegedIntentsConfig,
};
use commander_core::{CommandCache, ErrorHandling, GuildDirectory};
use parking_lot::RwLock;
use poise::serenity_prelude::{self as serenity, GatewayIntents};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Gateway intents for the configured privileged set.
pub fn gateway_intents(privileged: &PrivilegedIntentsConfig) -> GatewayIntents {
    let mut intents = GatewayIntents::non_privileged();
    if privileged.members {
        intents |= GatewayIntents::GUILD_MEMBERS;
    }
    if privileged.presences {
        intents |= GatewayIntents::GUILD_PRESENCES;
    }
    if privileged.message_content {
        intents |= GatewayIntents::MESSAGE_CONTENT;
    }
    intents
}

/// Everything the extensions contributed, ready to be handed to the framework.
pub struct Startup {
    /// The extension registry the bot started with.
    pub registry: ExtensionRegistry,
    /// Commands contributed by extensions.
    pub commands: Vec<Command>,
    /// Extension state objects.
    pub states: ExtensionStates,
    /// Names of the extensions that loaded.
    pub loaded: Vec<String>,
    /// Gateway event listeners contributed by extensions.
    pub listeners: Vec<Arc<dyn EventListener>>,
    /// The error pipeline with every extension handler installed.
    pub errors: Arc<ErrorHandling>,
}

/// Main bot structure.
pub struct CommanderBot {
    config: Config,
    config_loader: Option<ConfigLoader>,
    loader: ExtensionLoader,
    synctree: bool,
}

impl CommanderBot {
    /// Creates a bot that loads the bundled extensions.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            config_loader: None,
            loader: commander_ext::loader(),
            synctree: false,
        }
    }

    /// Replaces the extension loader.
    #[must_use]
    pub fn with_loader(mut self, loader: ExtensionLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Saves configuration changes made at runtime through `loader`.
    #[must_use]
    pub fn with_config_loader(mut self, loader: ConfigLoader) -> Self {
        self.config_loader = Some(loader);
        self
    }

    /// Pushes the local command tree to Discord during startup.
    #[must_use]
    pub const fn with_synctree(mut self, synctree: bool) -> Self {
        self.synctree = synctree;
        self
    }

    /// The configuration this bot runs with.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Loads every enabled extension and installs its error handlers.
    ///
    /// Fails when a required extension could not be loaded.
    pub async fn prepare(&self, guilds: &Arc<GuildDirectory>) -> BotResult<Startup> {
        let registry = self.config.extension_registry()?;
        info!(
            enabled = registry.enabled().count(),
            disabled = registry.disabled().count(),
            "Loading extensions"
        );

        let (loaded, report) = self.loader.load_enabled(&registry, guilds).await;
        for failure in &report.failed {
            error!(
                extension = %failure.name,
                required = failure.required,
                "{}",
                failure.error
            );
        }
        if report.is_fatal() {
            return Err(BotError::RequiredExtensions(
                report
                    .required_failures()
                    .map(|failure| failure.name.clone())
                    .collect(),
            ));
        }

        let errors = ErrorHandling::new();
        let installed = loaded.install(&errors);
        info!(
            loaded = installed.names.len(),
            commands = installed.commands.len(),
            listeners = installed.listeners.len(),
            "Extensions loaded"
        );

        Ok(Startup {
            registry,
            commands: installed.commands,
            states: installed.states,
            loaded: installed.names,
            listeners: installed.listeners,
            errors: Arc::new(errors),
        })
    }

    /// Starts the bot and runs until the gateway shuts down.
    pub async fn start(self, token: &str) -> BotResult<()> {
        let guilds = Arc::new(GuildDirectory::new());
        let startup = self.prepare(&guilds).await?;
        let intents = gateway_intents(&self.config.privileged_intents);
        let synctree = self.synctree;
        let config = self.config;
        let config_cache = match self.config_loader {
            Some(loader) => ConfigCache::persisted(config.clone(), loader),
            None => {
                warn!("No configuration file; runtime changes will not be saved");
                ConfigCache::new(config.clone())
            }
        };

        let framework = create_framework(
            config.command_prefix.clone(),
            config.allowed_mentions,
            startup.commands,
        )
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {}", ready.user.name);
                for guild in &ready.guilds {
                    guilds.insert_unnamed(guild.id);
                }

                let commands = CommandCache::new(SerenityRegistrar::new(Arc::clone(&ctx.http)));
                commands.set_commands(poise::builtins::create_application_commands(
                    &framework.options().commands,
                ));

                let global = if synctree {
                    commands.sync().await?
                } else {
                    commands.build_global_cache().await?
                };
                info!(commands = global.len(), synced = synctree, "Global command cache ready");

                if let Err(e) = commands.build_guild_cache(guilds.ids()).await {
                    warn!("Guild command caches unavailable: {}", e);
                }

                Ok(Data {
                    config: config_cache,
                    extensions: RwLock::new(startup.registry),
                    loaded_extensions: startup.loaded,
                    errors: startup.errors,
                    commands,
                    guilds,
                    states: startup.states,
                    listeners: startup.listeners,
                    started_at: Utc::now(),
                    connected_since: RwLock::new(Some(Utc::now())),
                })
            })
        })
        .build();

        let mut client = serenity::ClientBuilder::new(token, intents)
            .framework(framework)
            .await?;

        let shard_manager = client.shard_manager.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {:?}", e);
                return;
            }
            info!("Received shutdown signal, starting graceful shutdown");
            shard_manager.shutdown_all().await;
        });

        info!("Starting gateway connection");
        client.start().await?;
        Ok(())
    }
}
