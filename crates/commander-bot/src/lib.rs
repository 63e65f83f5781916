//! # Commander Bot
//!
//! Discord bot runtime built from configured extensions.
//!
//! This is the main binary crate: it acquires the token, loads extensions,
//! wires them into the Poise framework and runs the gateway connection.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod bot;
pub mod cli;
pub mod error;
pub mod token;

pub use bot::*;
pub use cli::*;
pub use error::*;
pub use token::*;
