//! Application layer of the client: queueing, dispatch and context caching.
//!
//! # Sub-modules
//!
//! - **`request_queue`** – The FIFO every caller enqueues into, plus the
//!   reply handle result-bearing calls wait on.
//!
//! - **`dispatch_worker`** – The single task that posts requests in order
//!   and recovers from a lost server.  Defines the [`Transport`] and
//!   [`ServerSupervisor`] seams the infrastructure layer implements.
//!
//! - **`context_cache`** – Drawing-context handles, their per-device
//!   registrations and the queue of ids awaiting release.
//!
//! - **`remote_device`** – The proxy callers draw on.
//!
//! [`Transport`]: dispatch_worker::Transport
//! [`ServerSupervisor`]: dispatch_worker::ServerSupervisor

pub mod context_cache;
pub mod dispatch_worker;
pub mod remote_device;
pub mod request_queue;
