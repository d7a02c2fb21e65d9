//! griddev-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`, the
//! client crate's loopback tests and the binary entry point in `main.rs`
//! share the same module tree.

pub mod application;
pub mod infrastructure;

pub use application::command_router::{CommandRouter, Disposition, RouterError, RouterResponse};
pub use application::stats::StatsSnapshot;
pub use infrastructure::devices::HeadlessDeviceFactory;
pub use infrastructure::http::{serve, ServerExit};
