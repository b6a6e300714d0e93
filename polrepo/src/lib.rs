//! polrepo: command line front end for composing policy trees.
//!
//! # Modules
//!
//! - [`cli`]: Argument definitions.
//! - [`cmd`]: `policy` subcommand handlers.
//! - [`settings`]: Loading `~/.polrepo/settings.json`.
//! - [`errors`]: User-facing error display with help hints.

pub mod cli;
pub mod cmd;
pub mod errors;
pub mod settings;
pub mod style;
pub mod tracing_init;
pub mod version;
