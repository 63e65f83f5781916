//! # Commander Core
//!
//! The runtime pieces shared by every CommanderBot extension:
//!
//! - lazily created per-guild state ([`GuildStateManager`],
//!   [`GuildPartitionedState`]),
//! - the application command cache ([`CommandCache`]),
//! - the error-handler pipeline ([`ErrorHandling`]),
//! - the storage backends extensions persist their data with.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod command_cache;
pub mod database;
pub mod error_context;
pub mod error_handling;
pub mod guild;
pub mod guild_state;
pub mod partitioned;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use command_cache::*;
pub use database::*;
pub use error_context::*;
pub use error_handling::*;
pub use guild::*;
pub use guild_state::*;
pub use partitioned::*;
