//! # griddev-core
//!
//! Shared library for the griddev remote graphics-device proxy containing the
//! binary wire codec, the opcode table and the drawing-context value model.
//!
//! This crate is used by both the client library and the server process.
//! It has no dependencies on sockets, processes or rendering back-ends.
//!
//! # Architecture overview (for beginners)
//!
//! griddev lets a program draw on a rendering surface (an SVG file, an image,
//! a window) that lives in a *different* OS process.  The caller talks to a
//! local proxy object; the proxy serialises every call into a small binary
//! request and posts it to the companion server on `127.0.0.1:8011`.
//!
//! This crate (`griddev-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel between the two processes.  Integers
//!   and doubles are big-endian, strings and arrays are length-prefixed, and
//!   every request starts with a one-byte opcode.
//!
//! - **`domain`** – The immutable [`DrawingContextValue`] style bundle and the
//!   [`Device`] capability implemented by concrete renderers.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `griddev_core::WireEncoder` instead of `griddev_core::protocol::codec::WireEncoder`.
pub use domain::context::{
    Color, DrawingContextBuilder, DrawingContextValue, FontStyle, LineEnd, LineJoin, LineType,
};
pub use domain::device::{
    Device, DeviceError, DeviceFactory, DeviceRequest, DeviceType, ImageInterpolation,
};
pub use protocol::codec::{ProtocolError, WireDecoder, WireEncoder};
pub use protocol::opcode::{Opcode, Status, RESULT_MASK, SERVER_PORT};
