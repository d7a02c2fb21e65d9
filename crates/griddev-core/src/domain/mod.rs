//! Domain types shared by both processes.
//!
//! - **`context`** – the immutable [`context::DrawingContextValue`] style bundle.
//! - **`device`** – the [`device::Device`] capability and its factory.

pub mod context;
pub mod device;
