//! # Commander Config
//!
//! Type-safe configuration management for CommanderBot.
//!
//! This crate provides configuration loading and validation, the configured
//! extension entries with their shorthand syntax, and the extension registry
//! that tracks which extensions are enabled.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod defaults;
pub mod error;
pub mod extension;
pub mod loader;
pub mod registry;
pub mod schema;
pub mod validator;

pub use cache::*;
pub use defaults::*;
pub use error::*;
pub use extension::*;
pub use loader::*;
pub use registry::*;
pub use schema::*;
pub use validator::*;
