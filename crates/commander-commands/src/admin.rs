//! Owner-only commands for managing extensions and the command tree.

use crate::framework::{Context, Error};
use commander_common::ResponsiveError;
use commander_config::{ConfigCache, ExtensionRegistry};
use parking_lot::RwLock;
use std::fmt::Write;
use tracing::{info, warn};

/// Renders one line per configured extension.
pub fn render_extension_list(registry: &ExtensionRegistry, loaded: &[String]) -> String {
    if registry.is_empty() {
        return "No extensions are configured.".to_string();
    }

    registry
        .entries()
        .map(|ext| {
            let mut flags = vec![if ext.disabled { "disabled" } else { "enabled" }];
            if ext.required {
                flags.push("required");
            }
            if loaded.iter().any(|name| *name == ext.name) {
                flags.push("loaded");
            }
            format!("`{}`: {}", ext.name, flags.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Manage configured extensions. Changes are saved and apply on the next start.
#[poise::command(
    slash_command,
    prefix_command,
    owners_only,
    subcommands("extensions_list", "extensions_enable", "extensions_disable"),
    subcommand_required
)]
pub async fn extensions(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Lists configured extensions and whether they are loaded.
#[poise::command(slash_command, prefix_command, owners_only, rename = "list")]
pub async fn extensions_list(ctx: Context<'_>) -> Result<(), Error> {
    let text = {
        let registry = ctx.data().extensions.read();
        render_extension_list(&registry, &ctx.data().loaded_extensions)
    };
    ctx.say(text).await?;
    Ok(())
}

/// Result of [`set_extension_enabled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionToggle {
    /// The flag changed and was written to the configuration file.
    Saved,
    /// The flag changed but there is no configuration file to keep it in.
    InMemory,
    /// The extension already had the requested state.
    Unchanged,
}

impl ExtensionToggle {
    fn describe(self, name: &str, enabled: bool) -> String {
        let state = if enabled { "enabled" } else { "disabled" };
        match self {
            Self::Saved if enabled => format!("`{name}` will be loaded on the next start."),
            Self::Saved => format!("`{name}` will not be loaded on the next start."),
            Self::InMemory => {
                format!("`{name}` is now {state}, but there is no configuration file to save it to.")
            }
            Self::Unchanged => format!("`{name}` is already {state}."),
        }
    }
}

/// Flips an extension's flag and writes the extension list back to the
/// configuration.
///
/// Disabling refuses required extensions. When saving fails the flag is
/// restored.
pub async fn set_extension_enabled(
    registry: &RwLock<ExtensionRegistry>,
    config: &ConfigCache,
    name: &str,
    enabled: bool,
) -> Result<ExtensionToggle, Error> {
    {
        let mut registry = registry.write();
        let changed = (if enabled {
            registry.enable(name)
        } else {
            registry.disable_optional(name)
        })
        .map_err(ResponsiveError::from_error)?;
        if !changed {
            return Ok(ExtensionToggle::Unchanged);
        }
    }

    if let Err(e) = config.update_extensions(|| registry.read().clone()).await {
        let mut registry = registry.write();
        let restored = if enabled {
            registry.disable(name)
        } else {
            registry.enable(name)
        };
        if let Err(restore) = restored {
            warn!(extension = %name, "Could not restore extension flag: {}", restore);
        }
        return Err(Box::new(ResponsiveError::from_error(e)));
    }

    Ok(if config.is_persisted() {
        ExtensionToggle::Saved
    } else {
        ExtensionToggle::InMemory
    })
}

/// Enables a configured extension.
#[poise::command(slash_command, prefix_command, owners_only, rename = "enable")]
pub async fn extensions_enable(
    ctx: Context<'_>,
    #[description = "Extension name"] name: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let outcome = set_extension_enabled(&data.extensions, &data.config, &name, true).await?;
    if outcome != ExtensionToggle::Unchanged {
        info!(extension = %name, user = %ctx.author().id, "Extension enabled");
    }
    ctx.say(outcome.describe(&name, true)).await?;
    Ok(())
}

/// Disables a configured extension. Required extensions stay enabled.
#[poise::command(slash_command, prefix_command, owners_only, rename = "disable")]
pub async fn extensions_disable(
    ctx: Context<'_>,
    #[description = "Extension name"] name: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let outcome = set_extension_enabled(&data.extensions, &data.config, &name, false).await?;
    if outcome != ExtensionToggle::Unchanged {
        info!(extension = %name, user = %ctx.author().id, "Extension disabled");
    }
    ctx.say(outcome.describe(&name, false)).await?;
    Ok(())
}

/// Re-registers the application command tree and refreshes the cache.
#[poise::command(slash_command, prefix_command, owners_only)]
pub async fn synctree(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    let data = ctx.data();

    let global = data.commands.sync().await?;
    let mut text = format!("Synced {} global commands.", global.len());

    if let Some(guild_id) = ctx.guild_id() {
        let guilds = data.commands.build_guild_cache([guild_id]).await?;
        let count = guilds.get(&guild_id).map_or(0, |set| set.len());
        write!(text, " {count} commands are registered for this guild.")?;
    }

    info!(user = %ctx.author().id, "Command tree synced");
    ctx.say(text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use commander_config::ConfiguredExtension;

    #[test]
    fn test_render_empty_registry() {
        let registry = ExtensionRegistry::default();
        assert_eq!(
            render_extension_list(&registry, &[]),
            "No extensions are configured."
        );
    }

    #[test]
    fn test_render_flags() {
        let registry = ExtensionRegistry::from_entries([
            ConfiguredExtension::new("a").required(true),
            ConfiguredExtension::new("b").disabled(true),
            ConfiguredExtension::new("c"),
        ])
        .unwrap();

        let text = render_extension_list(&registry, &["a".to_string()]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "`a`: enabled, required, loaded");
        assert_eq!(lines[1], "`b`: disabled");
        assert_eq!(lines[2], "`c`: enabled");
    }

    fn toggle_fixture() -> (RwLock<ExtensionRegistry>, ConfigCache) {
        let entries = vec![
            ConfiguredExtension::new("a").required(true),
            ConfiguredExtension::new("b"),
        ];
        let config = commander_config::Config {
            extensions: entries.clone(),
            ..commander_config::Config::default()
        };
        let registry = ExtensionRegistry::from_entries(entries).unwrap();
        (RwLock::new(registry), ConfigCache::new(config))
    }

    #[tokio::test]
    async fn test_toggle_updates_registry_and_config() {
        let (registry, config) = toggle_fixture();

        let outcome = set_extension_enabled(&registry, &config, "b", false).await.unwrap();
        assert_eq!(outcome, ExtensionToggle::InMemory);
        assert!(registry.read().get("b").unwrap().disabled);
        assert!(config.get().extensions[1].disabled);

        let outcome = set_extension_enabled(&registry, &config, "b", false).await.unwrap();
        assert_eq!(outcome, ExtensionToggle::Unchanged);
        assert_eq!(outcome.describe("b", false), "`b` is already disabled.");
    }

    #[tokio::test]
    async fn test_toggle_refuses_required() {
        let (registry, config) = toggle_fixture();

        let error = set_extension_enabled(&registry, &config, "a", false)
            .await
            .unwrap_err();

        assert!(error.downcast_ref::<ResponsiveError>().is_some());
        assert!(!registry.read().get("a").unwrap().disabled);
        assert!(!config.get().extensions[0].disabled);
    }

    #[test]
    fn test_toggle_messages() {
        assert_eq!(
            ExtensionToggle::Saved.describe("x", false),
            "`x` will not be loaded on the next start."
        );
        assert_eq!(
            ExtensionToggle::Saved.describe("x", true),
            "`x` will be loaded on the next start."
        );
    }
}
