//! Feature state split by guild.

use crate::guild::GuildKey;
use crate::guild_state::{GuildStateError, GuildStateManager};
use std::sync::Arc;

/// One feature's per-guild states plus the objects every guild shares,
/// typically the backing store and the parsed options.
#[derive(Debug)]
pub struct GuildPartitionedState<S, G> {
    guilds: GuildStateManager<S>,
    shared: G,
}

impl<S, G> GuildPartitionedState<S, G>
where
    S: Send + Sync + 'static,
{
    /// Combines a manager with the feature-global objects.
    pub const fn new(guilds: GuildStateManager<S>, shared: G) -> Self {
        Self { guilds, shared }
    }

    /// The state for one guild, created on first access.
    pub async fn guild(&self, key: impl Into<GuildKey>) -> Result<Arc<S>, GuildStateError> {
        self.guilds.get_or_create(key).await
    }

    /// The underlying manager.
    pub const fn guilds(&self) -> &GuildStateManager<S> {
        &self.guilds
    }

    /// Objects shared by every guild of the feature.
    pub const fn shared(&self) -> &G {
        &self.shared
    }

    /// Every guild state created so far.
    pub fn available(&self) -> Vec<Arc<S>> {
        self.guilds.available()
    }
}
