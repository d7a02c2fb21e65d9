//! Infrastructure layer for the client library.
//!
//! Contains the OS-facing adapters behind the application-layer seams:
//! the HTTP [`Transport`](crate::application::dispatch_worker::Transport),
//! the process-launching
//! [`ServerSupervisor`](crate::application::dispatch_worker::ServerSupervisor)
//! and configuration loading.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `griddev_core`, but MUST NOT be imported by the `application` layer.

pub mod storage;
pub mod supervisor;
pub mod transport;
