//! Invite entries and the per-guild invite collections.
//!
//! Entries are keyed by a unique key and may carry any number of tags. The
//! tag index is derived data: it is never persisted and is rebuilt from the
//! entries after loading and after every structural mutation.

use chrono::{DateTime, Utc};
use commander_core::{DatabaseError, GuildStateError};
use once_cell::sync::Lazy;
use poise::serenity_prelude::GuildId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

static INVITE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?discord(?:app)?\.(?:com/invite|gg)/[a-zA-Z0-9-]+/?$")
        .expect("invite link pattern is valid")
});

/// Whether `link` looks like a Discord invite.
pub fn is_invite_link(link: &str) -> bool {
    INVITE_LINK.is_match(link)
}

/// Splits a comma separated tag list, dropping blanks.
pub fn parse_tags(tags: &str) -> BTreeSet<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Invite failures. All but the storage variants are shown to the user.
#[derive(Error, Debug)]
pub enum InviteError {
    /// The key is taken.
    #[error("Invite `{0}` already exists")]
    AlreadyExists(String),

    /// No entry has this key.
    #[error("Invite `{0}` does not exist")]
    DoesNotExist(String),

    /// The guild has no invite of its own.
    #[error("An invite for this server has not been set")]
    GuildInviteNotSet,

    /// A query matched neither a key nor a tag.
    #[error("Could not find any invites or tags matching `{0}`")]
    NoResults(String),

    /// Not a Discord invite link.
    #[error("`{0}` is not a valid Discord invite link")]
    InvalidLink(String),

    /// Storage failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Guild state could not be created.
    #[error(transparent)]
    GuildState(#[from] GuildStateError),
}

impl InviteError {
    /// Whether the error is the user's doing and should be replied to.
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Database(_) | Self::GuildState(_))
    }
}

/// One invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteEntry {
    /// Unique key within the guild.
    pub key: String,
    /// Tags the entry can also be found by.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// The invite link.
    pub link: String,
    /// Optional short description.
    #[serde(default)]
    pub description: Option<String>,
    /// How often the invite was handed out.
    #[serde(default)]
    pub hits: u64,
    /// Creation time.
    pub added_on: DateTime<Utc>,
    /// Last modification time.
    pub modified_on: DateTime<Utc>,
}

impl InviteEntry {
    /// The line handed out to users: the link, then the description.
    pub fn format_line(&self) -> String {
        match &self.description {
            Some(description) => format!("{} - {}", self.link, description),
            None => self.link.clone(),
        }
    }
}

/// Persisted shape of a guild's invites.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredGuildInvites {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    invite_entries: BTreeMap<String, InviteEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    guild_key: Option<String>,
}

/// A guild's invites, with the derived tag index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredGuildInvites", into = "StoredGuildInvites")]
pub struct InviteGuildData {
    entries: BTreeMap<String, InviteEntry>,
    by_tag: BTreeMap<String, Vec<String>>,
    guild_key: Option<String>,
}

impl From<StoredGuildInvites> for InviteGuildData {
    fn from(stored: StoredGuildInvites) -> Self {
        let mut data = Self {
            entries: stored.invite_entries,
            by_tag: BTreeMap::new(),
            guild_key: stored.guild_key,
        };
        data.rebuild_tag_index();
        data
    }
}

impl From<InviteGuildData> for StoredGuildInvites {
    fn from(data: InviteGuildData) -> Self {
        Self {
            invite_entries: data.entries,
            guild_key: data.guild_key,
        }
    }
}

impl InviteGuildData {
    fn rebuild_tag_index(&mut self) {
        self.by_tag.clear();
        for entry in self.entries.values() {
            for tag in &entry.tags {
                self.by_tag
                    .entry(tag.clone())
                    .or_default()
                    .push(entry.key.clone());
            }
        }
    }

    /// Whether nothing is stored for the guild.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.guild_key.is_none()
    }

    /// All entries, ordered by key.
    pub fn entries(&self) -> impl Iterator<Item = &InviteEntry> {
        self.entries.values()
    }

    /// All tags in use, sorted.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.by_tag.keys().map(String::as_str)
    }

    /// Key of the guild's own invite.
    pub fn guild_key(&self) -> Option<&str> {
        self.guild_key.as_deref()
    }

    /// The entry with this key.
    pub fn require(&self, key: &str) -> Result<&InviteEntry, InviteError> {
        self.entries
            .get(key)
            .ok_or_else(|| InviteError::DoesNotExist(key.to_string()))
    }

    /// The guild's own invite.
    pub fn require_guild_invite(&self) -> Result<&InviteEntry, InviteError> {
        self.guild_key
            .as_deref()
            .and_then(|key| self.entries.get(key))
            .ok_or(InviteError::GuildInviteNotSet)
    }

    /// Keys matching `query`: the entry with that key, or else every entry
    /// with that tag.
    pub fn query(&self, query: &str) -> Vec<&InviteEntry> {
        if let Some(entry) = self.entries.get(query) {
            return vec![entry];
        }
        self.by_tag
            .get(query)
            .map(|keys| keys.iter().filter_map(|key| self.entries.get(key)).collect())
            .unwrap_or_default()
    }

    /// Answers a query and counts a hit on every matching entry.
    pub fn hit(&mut self, query: &str) -> Result<Vec<InviteEntry>, InviteError> {
        let keys: Vec<String> = self
            .query(query)
            .into_iter()
            .map(|entry| entry.key.clone())
            .collect();
        if keys.is_empty() {
            return Err(InviteError::NoResults(query.to_string()));
        }

        Ok(keys
            .iter()
            .filter_map(|key| {
                self.entries.get_mut(key).map(|entry| {
                    entry.hits += 1;
                    entry.clone()
                })
            })
            .collect())
    }

    /// Hands out the guild's own invite, counting a hit.
    pub fn hit_guild_invite(&mut self) -> Result<InviteEntry, InviteError> {
        let key = self.require_guild_invite()?.key.clone();
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or(InviteError::GuildInviteNotSet)?;
        entry.hits += 1;
        Ok(entry.clone())
    }

    /// Adds a new entry.
    pub fn add(
        &mut self,
        key: &str,
        tags: BTreeSet<String>,
        link: &str,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<InviteEntry, InviteError> {
        if self.entries.contains_key(key) {
            return Err(InviteError::AlreadyExists(key.to_string()));
        }
        if !is_invite_link(link) {
            return Err(InviteError::InvalidLink(link.to_string()));
        }

        let entry = InviteEntry {
            key: key.to_string(),
            tags,
            link: link.to_string(),
            description,
            hits: 0,
            added_on: now,
            modified_on: now,
        };
        self.entries.insert(entry.key.clone(), entry.clone());
        self.rebuild_tag_index();
        Ok(entry)
    }

    /// Replaces an entry's tags, link and description.
    pub fn modify(
        &mut self,
        key: &str,
        tags: BTreeSet<String>,
        link: &str,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<InviteEntry, InviteError> {
        self.require(key)?;
        if !is_invite_link(link) {
            return Err(InviteError::InvalidLink(link.to_string()));
        }

        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| InviteError::DoesNotExist(key.to_string()))?;
        entry.tags = tags;
        entry.link = link.to_string();
        entry.description = description;
        entry.modified_on = now;
        let entry = entry.clone();

        self.rebuild_tag_index();
        Ok(entry)
    }

    /// Removes an entry, clearing the guild invite if it pointed at it.
    pub fn remove(&mut self, key: &str) -> Result<InviteEntry, InviteError> {
        let entry = self
            .entries
            .remove(key)
            .ok_or_else(|| InviteError::DoesNotExist(key.to_string()))?;
        if self.guild_key.as_deref() == Some(key) {
            self.guild_key = None;
        }
        self.rebuild_tag_index();
        Ok(entry)
    }

    /// Makes the entry the guild's own invite.
    pub fn set_guild_invite(&mut self, key: &str) -> Result<InviteEntry, InviteError> {
        let entry = self.require(key)?.clone();
        self.guild_key = Some(entry.key.clone());
        Ok(entry)
    }

    /// Forgets the guild's own invite, returning the entry it pointed at.
    pub fn clear_guild_invite(&mut self) -> Result<InviteEntry, InviteError> {
        let entry = self.require_guild_invite()?.clone();
        self.guild_key = None;
        Ok(entry)
    }
}

/// Invites of every guild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteData {
    /// Per-guild data, keyed by guild id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub guilds: BTreeMap<u64, InviteGuildData>,
}

impl InviteData {
    /// A guild's data, if it has any.
    pub fn guild(&self, guild_id: GuildId) -> Option<&InviteGuildData> {
        self.guilds.get(&guild_id.get())
    }

    /// A guild's data, created empty when missing.
    pub fn guild_mut(&mut self, guild_id: GuildId) -> &mut InviteGuildData {
        self.guilds.entry(guild_id.get()).or_default()
    }
}
