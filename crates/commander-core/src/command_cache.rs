//! Snapshot of the application commands Discord has registered.
//!
//! The cache never merges: every build call replaces the scope it covers
//! with exactly what the remote service reported. Lookups in a guild scope
//! fall back to the global scope.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use commander_common::BoxError;
use dashmap::DashMap;
use futures::future::try_join_all;
use parking_lot::RwLock;
use serenity::model::id::{CommandId, GuildId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One command as registered on the remote side.
///
/// Subcommands get their own entry under their qualified name
/// (`"invite add"`) and share the id of their top-level command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegisteredCommand {
    /// Space-separated qualified name.
    pub name: String,
    /// Remote id of the top-level command.
    pub id: CommandId,
    /// Guild the command is registered to, `None` when global.
    pub guild_id: Option<GuildId>,
}

impl RegisteredCommand {
    /// A globally registered command.
    pub fn global(name: impl Into<String>, id: impl Into<CommandId>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            guild_id: None,
        }
    }

    /// A command registered to one guild.
    pub fn guild(name: impl Into<String>, id: impl Into<CommandId>, guild_id: GuildId) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            guild_id: Some(guild_id),
        }
    }

    /// Whether this is a top-level command rather than a subcommand.
    pub fn is_top_level(&self) -> bool {
        !self.name.contains(' ')
    }

    /// Clickable mention, `</name:id>`.
    pub fn mention(&self) -> String {
        format!("</{}:{}>", self.name, self.id)
    }
}

impl fmt::Display for RegisteredCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mention())
    }
}

/// How a caller identifies a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLookup {
    /// Qualified name.
    Name(String),
    /// Remote id.
    Id(CommandId),
}

impl From<&str> for CommandLookup {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for CommandLookup {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<CommandId> for CommandLookup {
    fn from(id: CommandId) -> Self {
        Self::Id(id)
    }
}

/// Which part of the cache a set of commands belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandScope {
    /// Registered for every guild.
    Global,
    /// Registered to one guild.
    Guild(GuildId),
}

impl fmt::Display for CommandScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Guild(id) => write!(f, "guild {id}"),
        }
    }
}

/// Command cache failures.
#[derive(Error, Debug)]
pub enum CommandCacheError {
    /// Pushing the local tree failed; the previous snapshot is kept.
    #[error("Failed to sync global commands: {0}")]
    Sync(#[source] BoxError),

    /// Fetching global registrations failed.
    #[error("Failed to fetch global commands: {0}")]
    FetchGlobal(#[source] BoxError),

    /// Fetching one guild's registrations failed.
    #[error("Failed to fetch commands for guild {guild_id}: {source}")]
    FetchGuild {
        /// Guild whose fetch failed.
        guild_id: GuildId,
        /// Remote error.
        #[source]
        source: BoxError,
    },

    /// The remote reported two commands with the same qualified name.
    #[error("Duplicate command name `{name}` in {scope} scope")]
    DuplicateName {
        /// Offending qualified name.
        name: String,
        /// Scope the duplicate appeared in.
        scope: CommandScope,
    },
}

/// The remote command registration service.
#[async_trait]
pub trait CommandRegistrar: Send + Sync {
    /// Local command definition pushed by [`CommandCache::sync`].
    type Definition: Clone + Send + Sync;

    /// Replaces every global command with `commands` and returns what the
    /// remote side registered.
    async fn sync_global(
        &self,
        commands: Vec<Self::Definition>,
    ) -> Result<Vec<RegisteredCommand>, BoxError>;

    /// Current global registrations.
    async fn fetch_global(&self) -> Result<Vec<RegisteredCommand>, BoxError>;

    /// Current registrations of one guild.
    async fn fetch_guild(&self, guild_id: GuildId) -> Result<Vec<RegisteredCommand>, BoxError>;
}

/// The commands of one scope, reachable by qualified name and by id.
#[derive(Debug, Clone, Default)]
pub struct CommandSet {
    by_name: HashMap<String, RegisteredCommand>,
    by_id: HashMap<CommandId, String>,
}

impl CommandSet {
    /// Builds a set, rejecting duplicate qualified names.
    pub fn from_commands(
        scope: CommandScope,
        commands: impl IntoIterator<Item = RegisteredCommand>,
    ) -> Result<Self, CommandCacheError> {
        let mut set = Self::default();
        for command in commands {
            if set.by_name.contains_key(&command.name) {
                return Err(CommandCacheError::DuplicateName {
                    name: command.name,
                    scope,
                });
            }

            // An id maps to its top-level command; subcommands only claim it
            // when nothing else has.
            let top_level = command.is_top_level();
            set.by_id
                .entry(command.id)
                .and_modify(|name| {
                    if top_level {
                        name.clone_from(&command.name);
                    }
                })
                .or_insert_with(|| command.name.clone());
            set.by_name.insert(command.name.clone(), command);
        }
        Ok(set)
    }

    /// Finds a command by qualified name or id.
    pub fn get(&self, lookup: &CommandLookup) -> Option<&RegisteredCommand> {
        match lookup {
            CommandLookup::Name(name) => self.by_name.get(name),
            CommandLookup::Id(id) => self.by_id.get(id).and_then(|name| self.by_name.get(name)),
        }
    }

    /// Number of entries, subcommands included.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Iterates over every entry.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredCommand> {
        self.by_name.values()
    }

    /// Qualified names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Local command tree plus the last known remote registrations.
pub struct CommandCache<R: CommandRegistrar> {
    registrar: R,
    tree: RwLock<Vec<R::Definition>>,
    global: ArcSwap<CommandSet>,
    guilds: DashMap<GuildId, Arc<CommandSet>>,
    rebuild: Mutex<()>,
}

impl<R: CommandRegistrar> CommandCache<R> {
    /// Creates an empty cache with no local definitions.
    pub fn new(registrar: R) -> Self {
        Self {
            registrar,
            tree: RwLock::new(Vec::new()),
            global: ArcSwap::from_pointee(CommandSet::default()),
            guilds: DashMap::new(),
            rebuild: Mutex::new(()),
        }
    }

    /// Replaces the local command tree.
    pub fn set_commands(&self, commands: Vec<R::Definition>) {
        *self.tree.write() = commands;
    }

    /// The local command tree.
    pub fn commands(&self) -> Vec<R::Definition> {
        self.tree.read().clone()
    }

    /// The remote registration service.
    pub const fn registrar(&self) -> &R {
        &self.registrar
    }

    /// Pushes the local tree and caches what the remote echoed back.
    ///
    /// On failure the previous global snapshot stays in place.
    pub async fn sync(&self) -> Result<Arc<CommandSet>, CommandCacheError> {
        let _guard = self.rebuild.lock().await;
        let commands = self.commands();
        info!(count = commands.len(), "Syncing global application commands");

        let registered = self
            .registrar
            .sync_global(commands)
            .await
            .map_err(CommandCacheError::Sync)?;
        let set = Arc::new(CommandSet::from_commands(CommandScope::Global, registered)?);
        self.global.store(Arc::clone(&set));

        info!(count = set.len(), "Global application commands synced");
        Ok(set)
    }

    /// Replaces the global snapshot with the current remote registrations.
    pub async fn build_global_cache(&self) -> Result<Arc<CommandSet>, CommandCacheError> {
        let _guard = self.rebuild.lock().await;
        let registered = self
            .registrar
            .fetch_global()
            .await
            .map_err(CommandCacheError::FetchGlobal)?;
        let set = Arc::new(CommandSet::from_commands(CommandScope::Global, registered)?);
        self.global.store(Arc::clone(&set));

        debug!(count = set.len(), "Global command cache rebuilt");
        Ok(set)
    }

    /// Replaces the snapshot of every listed guild.
    ///
    /// Nothing is replaced unless every fetch succeeds.
    pub async fn build_guild_cache(
        &self,
        guilds: impl IntoIterator<Item = GuildId>,
    ) -> Result<HashMap<GuildId, Arc<CommandSet>>, CommandCacheError> {
        let _guard = self.rebuild.lock().await;
        let fetches = guilds.into_iter().map(|guild_id| async move {
            let registered = self
                .registrar
                .fetch_guild(guild_id)
                .await
                .map_err(|source| CommandCacheError::FetchGuild { guild_id, source })?;
            let set = CommandSet::from_commands(CommandScope::Guild(guild_id), registered)?;
            Ok::<_, CommandCacheError>((guild_id, Arc::new(set)))
        });
        let sets: HashMap<GuildId, Arc<CommandSet>> =
            try_join_all(fetches).await?.into_iter().collect();

        for (guild_id, set) in &sets {
            self.guilds.insert(*guild_id, Arc::clone(set));
        }

        debug!(guilds = sets.len(), "Guild command caches rebuilt");
        Ok(sets)
    }

    /// Looks a command up, in the guild's scope first when one is given,
    /// then globally.
    pub fn get_command(
        &self,
        lookup: impl Into<CommandLookup>,
        guild_id: Option<GuildId>,
    ) -> Option<RegisteredCommand> {
        let lookup = lookup.into();
        if let Some(guild_id) = guild_id {
            let local = self
                .guilds
                .get(&guild_id)
                .and_then(|set| set.value().get(&lookup).cloned());
            if local.is_some() {
                return local;
            }
        }
        self.global.load().get(&lookup).cloned()
    }

    /// The current global snapshot.
    pub fn global_commands(&self) -> Arc<CommandSet> {
        self.global.load_full()
    }

    /// The current snapshot of one guild, if it was ever built.
    pub fn guild_commands(&self, guild_id: GuildId) -> Option<Arc<CommandSet>> {
        self.guilds.get(&guild_id).map(|set| Arc::clone(set.value()))
    }
}

impl<R: CommandRegistrar> fmt::Debug for CommandCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandCache")
            .field("global", &self.global.load().len())
            .field("guilds", &self.guilds.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mention() {
        let command = RegisteredCommand::global("invite add", 42_u64);
        assert_eq!(command.mention(), "</invite add:42>");
        assert!(!command.is_top_level());
    }

    #[test]
    fn test_set_lookup_by_name_and_id_agree() {
        let set = CommandSet::from_commands(
            CommandScope::Global,
            vec![
                RegisteredCommand::global("invite add", 1_u64),
                RegisteredCommand::global("invite", 1_u64),
                RegisteredCommand::global("ping", 2_u64),
            ],
        )
        .unwrap();

        let by_name = set.get(&"ping".into()).unwrap();
        let by_id = set.get(&CommandId::new(2).into()).unwrap();
        assert_eq!(by_name, by_id);

        assert_eq!(set.get(&CommandId::new(1).into()).unwrap().name, "invite");
        assert_eq!(set.names(), vec!["invite", "invite add", "ping"]);
    }

    #[test]
    fn test_set_rejects_duplicate_names() {
        let result = CommandSet::from_commands(
            CommandScope::Global,
            vec![
                RegisteredCommand::global("ping", 1_u64),
                RegisteredCommand::global("ping", 2_u64),
            ],
        );
        assert!(matches!(
            result,
            Err(CommandCacheError::DuplicateName { ref name, scope: CommandScope::Global }) if name == "ping"
        ));
    }
}
