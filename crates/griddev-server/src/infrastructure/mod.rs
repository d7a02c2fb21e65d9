//! Infrastructure layer of the server.
//!
//! Contains the HTTP front end, concrete rendering devices and configuration
//! file loading.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `griddev_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.

pub mod devices;
pub mod http;
pub mod storage;
