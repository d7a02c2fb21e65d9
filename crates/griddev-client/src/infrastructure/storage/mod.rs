//! Storage infrastructure: client configuration file loading.

pub mod config;
