//! Application layer of the server: request handling without any I/O.
//!
//! # Sub-modules
//!
//! - **`command_router`** – Decodes one command body, applies it to a device
//!   and encodes the reply.  Every POST to `/command` goes through here.
//!
//! - **`context_registry`** – Interns drawing-context values, hands out ids
//!   and counts how many client handles refer to each one.
//!
//! - **`device_registry`** – Owns the open devices and assigns their ids.
//!
//! - **`stats`** – Traffic counters rendered by the status page.
//!
//! Nothing here opens sockets or files; devices arrive through the
//! [`griddev_core::DeviceFactory`] trait.

pub mod command_router;
pub mod context_registry;
pub mod device_registry;
pub mod stats;
