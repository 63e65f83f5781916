//! # Commander Common
//!
//! Shared types, utilities, and common functionality for CommanderBot.
//!
//! This crate provides the error taxonomy and the small helpers used across
//! all other crates in the CommanderBot workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod responsive;
pub mod types;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use responsive::*;
pub use types::*;
pub use utils::*;
