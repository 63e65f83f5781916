//! Guild identity and lookup.

use dashmap::DashMap;
use serenity::model::guild::Guild;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, trace};

/// The part of a guild the state layer cares about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuildInfo {
    /// Guild snowflake.
    pub id: GuildId,
    /// Display name at the time the guild was last seen.
    pub name: String,
}

impl GuildInfo {
    /// Creates a new guild description.
    pub fn new(id: impl Into<GuildId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl From<&Guild> for GuildInfo {
    fn from(guild: &Guild) -> Self {
        Self::new(guild.id, guild.name.clone())
    }
}

/// Either a guild the caller already has in hand, or a bare id that must be
/// resolved first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuildKey {
    /// A fully described guild.
    Guild(GuildInfo),
    /// A guild id to resolve through a [`GuildResolver`].
    Id(GuildId),
}

impl GuildKey {
    /// The id this key refers to.
    pub const fn id(&self) -> GuildId {
        match self {
            Self::Guild(info) => info.id,
            Self::Id(id) => *id,
        }
    }
}

impl From<GuildInfo> for GuildKey {
    fn from(info: GuildInfo) -> Self {
        Self::Guild(info)
    }
}

impl From<&GuildInfo> for GuildKey {
    fn from(info: &GuildInfo) -> Self {
        Self::Guild(info.clone())
    }
}

impl From<GuildId> for GuildKey {
    fn from(id: GuildId) -> Self {
        Self::Id(id)
    }
}

/// Resolves a guild id to the guild the bot currently knows about.
pub trait GuildResolver: Send + Sync {
    /// Returns the guild, or `None` if the bot is not a member of it.
    fn resolve(&self, guild_id: GuildId) -> Option<GuildInfo>;
}

impl<R: GuildResolver + ?Sized> GuildResolver for Arc<R> {
    fn resolve(&self, guild_id: GuildId) -> Option<GuildInfo> {
        (**self).resolve(guild_id)
    }
}

/// Live set of guilds the bot is a member of.
///
/// Kept up to date from gateway events and used as the resolver for every
/// guild-state manager.
#[derive(Debug, Default)]
pub struct GuildDirectory {
    guilds: DashMap<GuildId, GuildInfo>,
}

impl GuildDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or refreshes) a guild.
    pub fn insert(&self, guild: GuildInfo) {
        trace!(guild_id = %guild.id, name = %guild.name, "Guild available");
        self.guilds.insert(guild.id, guild);
    }

    /// Records a guild id whose name is not yet known.
    ///
    /// An entry that already carries a name is left alone.
    pub fn insert_unnamed(&self, guild_id: GuildId) {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| GuildInfo::new(guild_id, String::new()));
    }

    /// Forgets a guild, returning what was known about it.
    pub fn remove(&self, guild_id: GuildId) -> Option<GuildInfo> {
        let removed = self.guilds.remove(&guild_id).map(|(_, info)| info);
        if removed.is_some() {
            debug!(guild_id = %guild_id, "Guild removed from directory");
        }
        removed
    }

    /// Whether the guild is known.
    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    /// Ids of every known guild.
    pub fn ids(&self) -> Vec<GuildId> {
        self.guilds.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of known guilds.
    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    /// Whether no guild is known.
    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }
}

impl GuildResolver for GuildDirectory {
    fn resolve(&self, guild_id: GuildId) -> Option<GuildInfo> {
        self.guilds.get(&guild_id).map(|entry| entry.value().clone())
    }
}
