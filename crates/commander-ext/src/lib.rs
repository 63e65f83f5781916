//! # Commander Extensions
//!
//! Feature extensions built on the Commander runtime.
//!
//! - `commander.ext.invite`: named invite links per guild
//! - `commander.ext.stacktracer`: error reports posted to log channels

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod invite;
pub mod invite_data;
pub mod stacktracer;
pub mod store;

pub use invite::*;
pub use invite_data::*;
pub use stacktracer::*;
pub use store::*;

use commander_commands::ExtensionLoader;

/// A loader that knows every extension shipped with this crate.
pub fn loader() -> ExtensionLoader {
    ExtensionLoader::new()
        .with(InviteExtension)
        .with(StacktracerExtension)
}
