//! Storage infrastructure: configuration file loading.
//!
//! The server has no persistent state of its own.  The only file it reads at
//! startup is an optional TOML configuration; the `config` sub-module
//! supplies defaults when that file is absent.

pub mod config;
