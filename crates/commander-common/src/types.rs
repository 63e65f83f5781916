//! Common type definitions shared across the workspace.

use serde::{Deserialize, Serialize};

/// Boxed error type used at the framework boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Common result type for the application.
pub type Result<T> = std::result::Result<T, BoxError>;

/// Which mentions a message is allowed to ping.
///
/// Mirrors Discord's allowed-mentions object in a backend-agnostic form so
/// it can live in configuration files and on error values alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowedMentions {
    /// Whether `@everyone` and `@here` ping.
    pub everyone: bool,
    /// Whether user mentions ping.
    pub users: bool,
    /// Whether role mentions ping.
    pub roles: bool,
    /// Whether the author of a replied-to message is pinged.
    pub replied_user: bool,
}

impl AllowedMentions {
    /// Nothing pings.
    pub const fn none() -> Self {
        Self {
            everyone: false,
            users: false,
            roles: false,
            replied_user: false,
        }
    }

    /// Everything pings.
    pub const fn all() -> Self {
        Self {
            everyone: true,
            users: true,
            roles: true,
            replied_user: true,
        }
    }

    /// Everything except `@everyone` and `@here` pings.
    pub const fn not_everyone() -> Self {
        Self {
            everyone: false,
            ..Self::all()
        }
    }

    /// Only the author of a replied-to message is pinged.
    pub const fn only_replies() -> Self {
        Self {
            replied_user: true,
            ..Self::none()
        }
    }
}

impl Default for AllowedMentions {
    fn default() -> Self {
        Self::not_everyone()
    }
}
