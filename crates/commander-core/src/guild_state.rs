//! Lazily created, per-guild feature state.
//!
//! A [`GuildStateManager`] owns at most one state object per guild. States
//! are only built when a guild is first looked up, and concurrent first
//! lookups for one guild share a single in-flight initialisation, even when
//! the factory awaits.

use crate::guild::{GuildInfo, GuildKey, GuildResolver};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serenity::model::id::GuildId;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

/// Failures of the guild-state layer.
///
/// These indicate a bug in the calling feature rather than bad user input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuildStateError {
    /// The id does not belong to any guild the bot can currently see.
    #[error("Unknown guild: {0}")]
    UnknownGuild(GuildId),

    /// A state was already materialised for this guild.
    #[error("Guild {0} already has state")]
    DuplicateGuildState(GuildId),
}

type Factory<S> = Arc<dyn Fn(GuildInfo) -> BoxFuture<'static, S> + Send + Sync>;

/// Lazy map from guild id to feature state.
pub struct GuildStateManager<S> {
    feature: String,
    resolver: Arc<dyn GuildResolver>,
    factory: Factory<S>,
    states: DashMap<GuildId, Arc<OnceCell<Arc<S>>>>,
}

impl<S> GuildStateManager<S>
where
    S: Send + Sync + 'static,
{
    /// Creates an empty manager.
    ///
    /// `feature` only labels log output. `factory` is invoked at most once
    /// per guild.
    pub fn new<F, Fut>(feature: impl Into<String>, resolver: Arc<dyn GuildResolver>, factory: F) -> Self
    where
        F: Fn(GuildInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = S> + Send + 'static,
    {
        Self {
            feature: feature.into(),
            resolver,
            factory: Arc::new(move |guild| Box::pin(factory(guild))),
            states: DashMap::new(),
        }
    }

    /// Returns the guild's state, creating it on first access.
    pub async fn get_or_create(&self, key: impl Into<GuildKey>) -> Result<Arc<S>, GuildStateError> {
        let guild = self.resolve(key.into())?;
        let cell = self.cell(guild.id);

        let state = cell
            .get_or_init(|| async {
                debug!(
                    feature = %self.feature,
                    guild_id = %guild.id,
                    guild = %guild.name,
                    "Creating guild state"
                );
                Arc::new((self.factory)(guild.clone()).await)
            })
            .await;

        Ok(Arc::clone(state))
    }

    /// Returns the guild's state only if it was already created.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<S>> {
        self.states
            .get(&guild_id)
            .and_then(|cell| cell.get().cloned())
    }

    /// Stores a ready-made state for a guild.
    ///
    /// Fails with [`GuildStateError::DuplicateGuildState`] if the guild
    /// already has one, or if one is being created right now.
    pub fn insert(&self, guild: &GuildInfo, state: S) -> Result<Arc<S>, GuildStateError> {
        let state = Arc::new(state);
        self.cell(guild.id)
            .set(Arc::clone(&state))
            .map_err(|_| GuildStateError::DuplicateGuildState(guild.id))?;
        debug!(feature = %self.feature, guild_id = %guild.id, "Inserted guild state");
        Ok(state)
    }

    /// Every state created so far, in no particular order.
    pub fn available(&self) -> Vec<Arc<S>> {
        self.states
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect()
    }

    /// Whether the guild already has state.
    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.get(guild_id).is_some()
    }

    /// Number of materialised states.
    pub fn len(&self) -> usize {
        self.states
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    /// Whether no state was materialised yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the feature that owns this manager.
    pub fn feature(&self) -> &str {
        &self.feature
    }

    fn resolve(&self, key: GuildKey) -> Result<GuildInfo, GuildStateError> {
        match key {
            GuildKey::Guild(info) => Ok(info),
            GuildKey::Id(id) => self
                .resolver
                .resolve(id)
                .ok_or(GuildStateError::UnknownGuild(id)),
        }
    }

    // The shard guard must not outlive this call; callers await on the cell.
    fn cell(&self, guild_id: GuildId) -> Arc<OnceCell<Arc<S>>> {
        Arc::clone(&*self.states.entry(guild_id).or_default())
    }
}

impl<S> fmt::Debug for GuildStateManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuildStateManager")
            .field("feature", &self.feature)
            .field("guilds", &self.states.len())
            .finish_non_exhaustive()
    }
}
