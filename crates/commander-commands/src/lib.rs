//! # Commander Commands
//!
//! Poise integration for the Commander bot runtime.
//!
//! This crate wires the runtime pieces from `commander-core` into a Poise
//! framework: the extension loader, built-in status and admin commands,
//! serenity-backed command registration and error responses, and the
//! gateway event handler that keeps the guild directory current.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod admin;
pub mod checks;
pub mod dialogs;
pub mod extension;
pub mod framework;
pub mod registrar;
pub mod responder;
pub mod status;

pub use admin::{render_extension_list, set_extension_enabled, ExtensionToggle};
pub use checks::*;
pub use dialogs::*;
pub use extension::*;
pub use framework::*;
pub use registrar::*;
pub use responder::*;
pub use status::*;
