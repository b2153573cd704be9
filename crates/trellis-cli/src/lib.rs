//! # Trellis CLI
//!
//! Command-line access to Trellis Merkle skip-lists.
//!
//! This crate provides:
//! - **build**: load a JSON object of entries into an in-memory tree and
//!   print its root, optionally with every level
//! - **diff**: build two trees and print the changes between them
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       trellis (clap subcommands)        │
//! ├─────────────────────────────────────────┤
//! │  CliConfig (TOML file + TRELLIS_* env)  │
//! ├─────────────────────────────────────────┤
//! │   trellis-core Tree over MemoryStore    │
//! └─────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod error;

pub use commands::{build, diff_entries, parse_entries, read_entries, BuildReport, ChangeReport};
pub use self::config::{CliConfig, Encoding};
pub use error::{CliError, Result};
