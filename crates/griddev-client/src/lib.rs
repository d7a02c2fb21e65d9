//! # griddev-client
//!
//! Drives rendering devices that live in a separate `griddev-server`
//! process.  Callers open a [`Session`], open devices on it and draw;
//! every call is encoded with the `griddev-core` wire codec and sent, in
//! order, by one background worker.  If the server process dies, the worker
//! starts a new one and resends the request that failed.
//!
//! ```no_run
//! # async fn demo() -> Result<(), griddev_client::ClientError> {
//! use griddev_client::{ClientConfig, DrawingContext, Session};
//! use griddev_core::DrawingContextValue;
//!
//! let session = Session::start(&ClientConfig::default())?;
//! let mut device = session.open_image("plot.svg", "svg", 400, 300).await?;
//! let ctx = DrawingContext::new(DrawingContextValue::builder().line_width(2.0).build());
//! device.draw_rect(&ctx, 0.5, 0.5, 2.0, 1.0, 0.0).await?;
//! device.close().await?;
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod error;
pub mod infrastructure;
pub mod session;

pub use application::context_cache::DrawingContext;
pub use application::dispatch_worker::{ServerSupervisor, Transport, TransportError};
pub use application::remote_device::RemoteDevice;
pub use error::ClientError;
pub use infrastructure::storage::config::ClientConfig;
pub use infrastructure::supervisor::RetryPolicy;
pub use session::Session;
