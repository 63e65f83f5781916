//! Loading configured extensions.
//!
//! Every extension is set up against its own [`ExtensionHost`]. Only when
//! setup succeeds are its commands, error handlers and state merged into the
//! [`LoadedExtensions`], so a failing extension leaves nothing behind.

use crate::framework::{Data, Error};
use async_trait::async_trait;
use commander_config::ExtensionRegistry;
use commander_core::{
    AppCommandErrorContext, CommandErrorContext, ErrorHandler, ErrorHandling, EventData,
    GuildDirectory, GuildResolver,
};
use futures::FutureExt;
use poise::serenity_prelude as serenity;
use serde_json::Value;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

/// Poise command type used across the bot.
pub type Command = poise::Command<Data, Error>;

/// A loadable feature.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Name used in the configuration, e.g. `commander.ext.invite`.
    fn name(&self) -> &'static str;

    /// Registers the extension's commands, error handlers and state.
    ///
    /// `options` is the entry's free-form options document; parsing it is up
    /// to the extension.
    async fn setup(&self, host: &mut ExtensionHost, options: Option<&Value>) -> Result<(), Error>;
}

/// Reacts to gateway events on behalf of an extension.
///
/// An error returned here goes through the event error chain.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Called for every gateway event after the bot's own bookkeeping.
    async fn on_event(
        &self,
        ctx: &serenity::Context,
        event: &serenity::FullEvent,
        framework: poise::FrameworkContext<'_, Data, Error>,
    ) -> Result<(), Error>;
}

/// Why an extension did not load.
#[derive(Error, Debug)]
pub enum ExtensionError {
    /// The configuration names an extension this build does not ship.
    #[error("Unknown extension `{0}`")]
    Unknown(String),

    /// Setup returned an error.
    #[error("Extension `{name}` failed to set up: {source}")]
    Setup {
        /// Extension name.
        name: String,
        /// Error returned by setup.
        #[source]
        source: Error,
    },

    /// Setup panicked.
    #[error("Extension `{name}` panicked during setup: {message}")]
    Panicked {
        /// Extension name.
        name: String,
        /// Panic message.
        message: String,
    },
}

/// Shared state objects, keyed by type.
#[derive(Default, Clone)]
pub struct ExtensionStates {
    states: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ExtensionStates {
    /// Looks up the state of type `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.states
            .get(&TypeId::of::<T>())
            .and_then(|state| Arc::clone(state).downcast::<T>().ok())
    }

    /// Number of stored states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn insert(&mut self, id: TypeId, state: Arc<dyn Any + Send + Sync>) -> bool {
        self.states.insert(id, state).is_some()
    }
}

impl fmt::Debug for ExtensionStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionStates")
            .field("len", &self.states.len())
            .finish()
    }
}

/// What one extension may register during setup.
pub struct ExtensionHost {
    name: String,
    guilds: Arc<GuildDirectory>,
    commands: Vec<Command>,
    states: Vec<(TypeId, &'static str, Arc<dyn Any + Send + Sync>)>,
    event_handlers: Vec<Arc<dyn ErrorHandler<EventData>>>,
    command_handlers: Vec<Arc<dyn ErrorHandler<CommandErrorContext>>>,
    app_command_handlers: Vec<Arc<dyn ErrorHandler<AppCommandErrorContext>>>,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl ExtensionHost {
    /// Creates an empty host for the named extension.
    pub fn new(name: impl Into<String>, guilds: Arc<GuildDirectory>) -> Self {
        Self {
            name: name.into(),
            guilds,
            commands: Vec::new(),
            states: Vec::new(),
            event_handlers: Vec::new(),
            command_handlers: Vec::new(),
            app_command_handlers: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Name of the extension being set up.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolver to build guild-state managers with.
    pub fn guild_resolver(&self) -> Arc<dyn GuildResolver> {
        Arc::clone(&self.guilds) as Arc<dyn GuildResolver>
    }

    /// Adds a command (prefix, slash or both).
    pub fn add_command(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Makes `state` reachable from commands through [`Data::extension`].
    pub fn insert_state<T: Any + Send + Sync>(&mut self, state: Arc<T>) {
        self.states
            .push((TypeId::of::<T>(), type_name::<T>(), state as Arc<dyn Any + Send + Sync>));
    }

    /// Appends a gateway event error handler.
    pub fn add_event_error_handler(&mut self, handler: Arc<dyn ErrorHandler<EventData>>) {
        self.event_handlers.push(handler);
    }

    /// Appends a prefix command error handler.
    pub fn add_command_error_handler(&mut self, handler: Arc<dyn ErrorHandler<CommandErrorContext>>) {
        self.command_handlers.push(handler);
    }

    /// Appends an application command error handler.
    pub fn add_app_command_error_handler(
        &mut self,
        handler: Arc<dyn ErrorHandler<AppCommandErrorContext>>,
    ) {
        self.app_command_handlers.push(handler);
    }

    /// Subscribes a listener to gateway events.
    pub fn add_event_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Number of commands registered so far.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

impl fmt::Debug for ExtensionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionHost")
            .field("name", &self.name)
            .field("commands", &self.commands.len())
            .field("states", &self.states.len())
            .finish_non_exhaustive()
    }
}

/// Everything the successfully loaded extensions registered.
#[derive(Default)]
pub struct LoadedExtensions {
    names: Vec<String>,
    commands: Vec<Command>,
    states: ExtensionStates,
    event_handlers: Vec<Arc<dyn ErrorHandler<EventData>>>,
    command_handlers: Vec<Arc<dyn ErrorHandler<CommandErrorContext>>>,
    app_command_handlers: Vec<Arc<dyn ErrorHandler<AppCommandErrorContext>>>,
    listeners: Vec<Arc<dyn EventListener>>,
}

/// What the framework needs from the loaded extensions once their error
/// handlers are installed.
pub struct InstalledExtensions {
    /// Commands to register with the framework.
    pub commands: Vec<Command>,
    /// State objects, reachable through [`Data::extension`].
    pub states: ExtensionStates,
    /// Names of the loaded extensions, in load order.
    pub names: Vec<String>,
    /// Gateway event listeners.
    pub listeners: Vec<Arc<dyn EventListener>>,
}

impl fmt::Debug for InstalledExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstalledExtensions")
            .field("names", &self.names)
            .field("commands", &self.commands.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl LoadedExtensions {
    /// Names of the loaded extensions, in load order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of commands contributed.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// State registered by the loaded extensions.
    pub const fn states(&self) -> &ExtensionStates {
        &self.states
    }

    /// Number of event listeners contributed.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Appends the collected error handlers to `errors` and hands back
    /// everything else.
    pub fn install(self, errors: &ErrorHandling) -> InstalledExtensions {
        for handler in self.event_handlers {
            errors.add_event_error_handler(handler);
        }
        for handler in self.command_handlers {
            errors.add_command_error_handler(handler);
        }
        for handler in self.app_command_handlers {
            errors.add_app_command_error_handler(handler);
        }
        InstalledExtensions {
            commands: self.commands,
            states: self.states,
            names: self.names,
            listeners: self.listeners,
        }
    }

    fn absorb(&mut self, host: ExtensionHost) {
        for (id, type_name, state) in host.states {
            if self.states.insert(id, state) {
                warn!(extension = %host.name, state = type_name, "Extension state replaced");
            }
        }
        self.commands.extend(host.commands);
        self.event_handlers.extend(host.event_handlers);
        self.command_handlers.extend(host.command_handlers);
        self.app_command_handlers.extend(host.app_command_handlers);
        self.listeners.extend(host.listeners);
        self.names.push(host.name);
    }
}

impl fmt::Debug for LoadedExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedExtensions")
            .field("names", &self.names)
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

/// One extension that did not load.
#[derive(Debug)]
pub struct LoadFailure {
    /// Extension name.
    pub name: String,
    /// Whether the extension was marked as required.
    pub required: bool,
    /// What went wrong.
    pub error: ExtensionError,
}

/// Outcome of [`ExtensionLoader::load_enabled`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Extensions that loaded, in order.
    pub loaded: Vec<String>,
    /// Extensions that failed.
    pub failed: Vec<LoadFailure>,
    /// Disabled extensions that were skipped.
    pub skipped: Vec<String>,
}

impl LoadReport {
    /// Failures of required extensions.
    pub fn required_failures(&self) -> impl Iterator<Item = &LoadFailure> {
        self.failed.iter().filter(|failure| failure.required)
    }

    /// Whether startup can go on.
    pub fn is_fatal(&self) -> bool {
        self.required_failures().next().is_some()
    }
}

/// The extensions this build ships, by name.
#[derive(Default)]
pub struct ExtensionLoader {
    catalog: HashMap<&'static str, Arc<dyn Extension>>,
}

impl ExtensionLoader {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an extension to the catalog.
    #[must_use]
    pub fn with(mut self, extension: impl Extension + 'static) -> Self {
        self.register(extension);
        self
    }

    /// Adds an extension to the catalog.
    pub fn register(&mut self, extension: impl Extension + 'static) {
        self.catalog.insert(extension.name(), Arc::new(extension));
    }

    /// Names of all known extensions, sorted.
    pub fn available(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.catalog.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Sets up every enabled entry of `registry`, in configuration order.
    ///
    /// A failing extension is logged and recorded in the report; the others
    /// still load.
    pub async fn load_enabled(
        &self,
        registry: &ExtensionRegistry,
        guilds: &Arc<GuildDirectory>,
    ) -> (LoadedExtensions, LoadReport) {
        let mut loaded = LoadedExtensions::default();
        let mut report = LoadReport {
            skipped: registry.disabled().map(|ext| ext.name.clone()).collect(),
            ..LoadReport::default()
        };

        for entry in registry.enabled() {
            let span = info_span!("extension", name = %entry.name);
            let mut host = ExtensionHost::new(entry.name.clone(), Arc::clone(guilds));

            match self
                .load_one(&entry.name, &mut host, entry.options.as_ref())
                .instrument(span)
                .await
            {
                Ok(()) => {
                    info!(
                        extension = %entry.name,
                        commands = host.command_count(),
                        "Loaded extension"
                    );
                    report.loaded.push(entry.name.clone());
                    loaded.absorb(host);
                }
                Err(e) => {
                    error!(
                        extension = %entry.name,
                        required = entry.required,
                        "Failed to load extension: {}",
                        e
                    );
                    report.failed.push(LoadFailure {
                        name: entry.name.clone(),
                        required: entry.required,
                        error: e,
                    });
                }
            }
        }

        (loaded, report)
    }

    async fn load_one(
        &self,
        name: &str,
        host: &mut ExtensionHost,
        options: Option<&Value>,
    ) -> Result<(), ExtensionError> {
        let extension = self
            .catalog
            .get(name)
            .ok_or_else(|| ExtensionError::Unknown(name.to_string()))?;

        match AssertUnwindSafe(extension.setup(host, options))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ExtensionError::Setup {
                name: name.to_string(),
                source,
            }),
            Err(payload) => Err(ExtensionError::Panicked {
                name: name.to_string(),
                message: payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_default(),
            }),
        }
    }
}

impl fmt::Debug for ExtensionLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionLoader")
            .field("catalog", &self.available())
            .finish()
    }
}
