//! Test utilities and shared test helpers for CommanderBot.
//!
//! This module provides common testing utilities and fixtures that can be
//! used across all crates in the workspace for unit and integration testing.

use std::sync::Once;

#[cfg(feature = "tracing-subscriber")]
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize test logging once per test run.
static INIT: Once = Once::new();

/// Initialize logging for tests with a sensible default configuration.
/// This function is safe to call multiple times and will only initialize once.
#[cfg(feature = "tracing-subscriber")]
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let _ = fmt().with_test_writer().with_env_filter(filter).try_init();
    });
}

/// No-op version when tracing-subscriber is not available
#[cfg(not(feature = "tracing-subscriber"))]
pub fn init_test_logging() {
    INIT.call_once(|| {});
}

/// Create a temporary directory for tests that automatically cleans up.
#[cfg(feature = "tempfile")]
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary directory")
}

/// Discord-related test utilities.
pub mod discord_fixtures {
    /// A raw guild snowflake for tests.
    pub const fn test_guild_id() -> u64 {
        123_456_789_012_345_678
    }

    /// Several distinct raw guild snowflakes.
    pub fn test_guild_ids(count: usize) -> Vec<u64> {
        (0..count as u64).map(|i| 100_000_000_000_000_000 + i).collect()
    }

    /// A raw channel snowflake for tests.
    pub const fn test_channel_id() -> u64 {
        223_456_789_012_345_678
    }

    /// A raw user snowflake for tests.
    pub const fn test_user_id() -> u64 {
        987_654_321_098_765_432
    }
}

/// Configuration-related test utilities.
pub mod config_fixtures {
    /// A minimal valid bot configuration as JSON.
    pub const fn minimal_config_json() -> &'static str {
        r#"{ "command_prefix": ">" }"#
    }

    /// A bot configuration exercising every extension entry form, as JSON.
    pub const fn full_config_json() -> &'static str {
        r#"{
    "command_prefix": ">",
    "privileged_intents": { "members": true, "message_content": true },
    "allowed_mentions": { "everyone": false, "users": true, "roles": false, "replied_user": true },
    "extensions": [
        "$commander.ext.stacktracer",
        "commander.ext.invite",
        "!commander.ext.faq",
        {
            "name": "commander.ext.feeds",
            "disabled": true,
            "options": { "database": { "type": "in_memory" } }
        }
    ]
}"#
    }

    /// The same shape as [`full_config_json`] expressed as YAML.
    pub const fn full_config_yaml() -> &'static str {
        concat!(
            "command_prefix: \">\"\n",
            "privileged_intents:\n",
            "  members: true\n",
            "  message_content: true\n",
            "extensions:\n",
            "  - \"$commander.ext.stacktracer\"\n",
            "  - commander.ext.invite\n",
            "  - \"!commander.ext.faq\"\n",
            "  - name: commander.ext.feeds\n",
            "    disabled: true\n",
            "    options:\n",
            "      database:\n",
            "        type: in_memory\n",
        )
    }
}
