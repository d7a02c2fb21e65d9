//! Use case: decode one command request, apply it to a device, encode the reply.
//!
//! # How a request is handled (for beginners)
//!
//! Every POST to `/command` carries one request body:
//!
//! ```text
//! [opcode:1][device id:4][context id:4]?[fields...]
//! ```
//!
//! The router:
//!
//! 1. Writes an optimistic `OK` status byte into a fresh reply buffer.
//! 2. Reads the opcode and, except for the three global opcodes
//!    (CREATE_IMAGE, CREATE_DRAWING_CONTEXT, RELEASE_DRAWING_CONTEXT), looks up
//!    the device whose id follows it.
//! 3. Decodes the remaining fields, calls the [`Device`], and appends any
//!    result to the reply.
//! 4. If anything failed, throws the partial reply away and answers with the
//!    single byte `SERVER_ERROR`.  The HTTP exchange itself always succeeds;
//!    errors travel inside the body.
//!
//! # Failure classes
//!
//! - A body that cannot be decoded (truncated, unknown opcode, bad enum
//!   ordinal) means the two processes disagree about the protocol.  The
//!   router answers `SERVER_ERROR` and asks the server to stop with
//!   [`Disposition::Abort`].
//! - Anything else (unknown device or context id, invalid index range, a
//!   device error) is answered with `SERVER_ERROR` and the server keeps
//!   serving.
//!
//! # Locking
//!
//! One coarse mutex guards both registries and every id assignment,
//! refcount change and removal.  Device calls run *outside* it, under the
//! device's own mutex, so drawing on one device never blocks lookups.

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use griddev_core::{
    Device, DeviceError, DeviceFactory, DeviceRequest, DrawingContextValue, ImageInterpolation,
    Opcode, ProtocolError, Status, WireDecoder, WireEncoder,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::context_registry::{ContextRegistry, ContextRegistryError};
use super::device_registry::{DeviceHandle, DeviceRegistry};
use super::stats::{ServerStats, StatsSnapshot};

/// Device id answered when the requested image format has no renderer.
pub const UNSUPPORTED_DEVICE_ID: i32 = -1;

/// Errors raised while handling a single request.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The request body does not follow the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("grid device {0} does not exist on the server")]
    UnknownDevice(i32),

    #[error(transparent)]
    Context(#[from] ContextRegistryError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

impl RouterError {
    /// Protocol errors leave the server unable to trust any further request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RouterError::Protocol(_))
    }
}

/// What the server should do once the reply has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep serving.
    Continue,
    /// The last device was closed; stop normally.
    Shutdown,
    /// A fatal protocol error occurred; stop with a failure status.
    Abort,
}

/// Reply body plus the follow-up action for the server loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterResponse {
    pub body: Vec<u8>,
    pub disposition: Disposition,
}

#[derive(Debug, Default)]
struct RouterState {
    devices: DeviceRegistry,
    contexts: ContextRegistry,
}

/// Decodes command requests and applies them to devices.
pub struct CommandRouter {
    factory: Arc<dyn DeviceFactory>,
    state: Mutex<RouterState>,
    stats: ServerStats,
}

impl CommandRouter {
    pub fn new(factory: Arc<dyn DeviceFactory>) -> Self {
        Self {
            factory,
            state: Mutex::default(),
            stats: ServerStats::default(),
        }
    }

    /// Handles one request body and returns the reply body.
    ///
    /// Never fails: every error is turned into a `SERVER_ERROR` reply.
    pub fn handle(&self, body: Vec<u8>) -> RouterResponse {
        self.stats.record_request(body.len());

        let mut reply = WireEncoder::new();
        reply.write_byte(Status::Ok as u8);
        let mut decoder = WireDecoder::new(body);

        let (body, disposition) = match self.dispatch(&mut decoder, &mut reply) {
            Ok(disposition) => (reply.reset_write(), disposition),
            Err(e) if e.is_fatal() => {
                error!(error = %e, offset = decoder.position(), "fatal protocol error, server will stop");
                (vec![Status::ServerError as u8], Disposition::Abort)
            }
            Err(e) => {
                warn!(error = %e, "request failed");
                (vec![Status::ServerError as u8], Disposition::Continue)
            }
        };

        self.stats.record_response(body.len());
        RouterResponse { body, disposition }
    }

    /// Current counters for the status page.
    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.lock_state();
        StatsSnapshot {
            devices_created: state.devices.created(),
            devices_active: state.devices.len(),
            contexts_created: state.contexts.created(),
            contexts_active: state.contexts.len(),
            requests: self.stats.requests(),
            bytes_read: self.stats.bytes_read(),
            bytes_written: self.stats.bytes_written(),
        }
    }

    /// Reference count of a drawing context, or `None` once it is gone.
    pub fn context_ref_count(&self, ctx_id: i32) -> Option<u32> {
        self.lock_state().contexts.ref_count(ctx_id)
    }

    /// Id registered for a context value, if it is live.
    pub fn context_id_of(&self, value: &DrawingContextValue) -> Option<i32> {
        self.lock_state().contexts.id_of(value)
    }

    /// Number of open devices.
    pub fn device_count(&self) -> usize {
        self.lock_state().devices.len()
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    fn dispatch(
        &self,
        decoder: &mut WireDecoder,
        reply: &mut WireEncoder,
    ) -> Result<Disposition, RouterError> {
        let raw = decoder.read_byte()?;
        let opcode = Opcode::try_from(raw).map_err(|_| ProtocolError::UnknownOpcode(raw))?;
        debug!(?opcode, "dispatching request");

        match opcode {
            Opcode::CreateImage => self.create_image(decoder, reply)?,
            Opcode::CreateDrawingContext => self.create_drawing_context(decoder, reply)?,
            Opcode::ReleaseDrawingContext => {
                let ctx_id = decoder.read_int()?;
                self.lock_state().contexts.release(ctx_id)?;
                debug!(ctx_id, "drawing context released");
            }
            Opcode::Close => return self.close_device(decoder, reply),
            _ => self.device_op(opcode, decoder, reply)?,
        }
        Ok(Disposition::Continue)
    }

    fn create_image(&self, decoder: &mut WireDecoder, reply: &mut WireEncoder) -> Result<(), RouterError> {
        let request = DeviceRequest::decode(decoder)?;
        match self.factory.create(&request) {
            Ok(device) => {
                let device_id = self.lock_state().devices.insert(device);
                info!(device_id, device_type = ?request.device_type, file_type = ?request.file_type, "device created");
                reply.write_int(device_id);
                Ok(())
            }
            Err(DeviceError::UnsupportedFormat(format)) => {
                warn!(%format, "unsupported image format requested");
                reply.write_int(UNSUPPORTED_DEVICE_ID);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create_drawing_context(
        &self,
        decoder: &mut WireDecoder,
        reply: &mut WireEncoder,
    ) -> Result<(), RouterError> {
        let value = DrawingContextValue::decode(decoder)?;
        let ctx_id = self.lock_state().contexts.acquire(value);
        debug!(ctx_id, "drawing context acquired");
        reply.write_int(ctx_id);
        Ok(())
    }

    fn close_device(
        &self,
        decoder: &mut WireDecoder,
        reply: &mut WireEncoder,
    ) -> Result<Disposition, RouterError> {
        let device_id = decoder.read_int()?;
        let ctx_ids = decoder.read_int_array()?.unwrap_or_default();

        let (device, last_device) = {
            let mut state = self.lock_state();
            let device = state
                .devices
                .remove(device_id)
                .ok_or(RouterError::UnknownDevice(device_id))?;
            // Ids are assigned from 1; anything else marks an empty slot.
            for ctx_id in ctx_ids.into_iter().filter(|id| *id > 0) {
                if let Err(e) = state.contexts.release(ctx_id) {
                    warn!(device_id, error = %e, "context in close batch was already gone");
                }
            }
            (device, state.devices.is_empty())
        };

        let message = match lock_device(&device).close() {
            Ok(()) => None,
            Err(e) => {
                warn!(device_id, error = %e, "device failed to close");
                Some(e.to_string())
            }
        };
        reply.write_string(message.as_deref());
        info!(device_id, "device closed");

        if last_device {
            info!("last device closed, server will stop");
            Ok(Disposition::Shutdown)
        } else {
            Ok(Disposition::Continue)
        }
    }

    fn device_op(
        &self,
        opcode: Opcode,
        decoder: &mut WireDecoder,
        reply: &mut WireEncoder,
    ) -> Result<(), RouterError> {
        let device_id = decoder.read_int()?;
        let device = self.device(device_id)?;

        match opcode {
            Opcode::OpenNewPage => lock_device(&device).open_new_page()?,
            Opcode::Hold => lock_device(&device).hold(),
            Opcode::Flush => lock_device(&device).flush(),
            Opcode::DrawRect => {
                let ctx = self.context(decoder.read_int()?)?;
                let left_x = decoder.read_double()?;
                let bottom_y = decoder.read_double()?;
                let width = decoder.read_double()?;
                let height = decoder.read_double()?;
                let rotation = decoder.read_double()?;
                lock_device(&device).draw_rect(&ctx, left_x, bottom_y, width, height, rotation)?;
            }
            Opcode::DrawPolyLines | Opcode::DrawPolygon => {
                let ctx = self.context(decoder.read_int()?)?;
                let x = required(decoder.read_double_array()?, "x")?;
                let y = required(decoder.read_double_array()?, "y")?;
                let start_index = decoder.read_int()?;
                let length = decoder.read_int()?;
                let range = point_range(start_index, length, x.len().min(y.len()))?;
                let mut device = lock_device(&device);
                if opcode == Opcode::DrawPolyLines {
                    device.draw_poly_lines(&ctx, &x, &y, range.start, range.len())?;
                } else {
                    device.draw_polygon(&ctx, &x, &y, range.start, range.len())?;
                }
            }
            Opcode::DrawCircle => {
                let ctx = self.context(decoder.read_int()?)?;
                let center_x = decoder.read_double()?;
                let center_y = decoder.read_double()?;
                let radius = decoder.read_double()?;
                lock_device(&device).draw_circle(&ctx, center_x, center_y, radius)?;
            }
            Opcode::DrawRaster => {
                let left_x = decoder.read_double()?;
                let bottom_y = decoder.read_double()?;
                let width = decoder.read_double()?;
                let height = decoder.read_double()?;
                let pixels = required(decoder.read_int_array()?, "pixels")?;
                let columns = decoder.read_int()?;
                let raw = decoder.read_int()?;
                let interpolation = ImageInterpolation::try_from(raw).map_err(|_| {
                    ProtocolError::MalformedPayload(format!("unknown interpolation: {raw}"))
                })?;
                let columns = usize::try_from(columns)
                    .ok()
                    .filter(|c| *c > 0)
                    .ok_or_else(|| RouterError::InvalidArgument(format!("raster columns {columns}")))?;
                lock_device(&device).draw_raster(
                    left_x,
                    bottom_y,
                    width,
                    height,
                    &pixels,
                    columns,
                    interpolation,
                )?;
            }
            Opcode::DrawString => {
                let ctx = self.context(decoder.read_int()?)?;
                let left_x = decoder.read_double()?;
                let bottom_y = decoder.read_double()?;
                let rotation = decoder.read_double()?;
                let text = decoder.read_string()?.unwrap_or_default();
                lock_device(&device).draw_string(&ctx, left_x, bottom_y, rotation, &text)?;
            }
            Opcode::GetWidth => reply.write_double(lock_device(&device).width()),
            Opcode::GetHeight => reply.write_double(lock_device(&device).height()),
            Opcode::GetNativeWidth => reply.write_int(lock_device(&device).native_width()),
            Opcode::GetNativeHeight => reply.write_int(lock_device(&device).native_height()),
            Opcode::GetStringWidth | Opcode::GetStringHeight => {
                let ctx = self.context(decoder.read_int()?)?;
                let text = decoder.read_string()?.unwrap_or_default();
                let device = lock_device(&device);
                let extent = if opcode == Opcode::GetStringWidth {
                    device.string_width(&ctx, &text)
                } else {
                    device.string_height(&ctx, &text)
                };
                reply.write_double(extent);
            }
            Opcode::CreateImage
            | Opcode::Close
            | Opcode::CreateDrawingContext
            | Opcode::ReleaseDrawingContext => {
                unreachable!("{opcode:?} is dispatched before the device lookup")
            }
        }
        Ok(())
    }

    // ── Lookups ───────────────────────────────────────────────────────────────

    fn lock_state(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device(&self, device_id: i32) -> Result<DeviceHandle, RouterError> {
        self.lock_state()
            .devices
            .get(device_id)
            .ok_or(RouterError::UnknownDevice(device_id))
    }

    fn context(&self, ctx_id: i32) -> Result<Arc<DrawingContextValue>, RouterError> {
        self.lock_state()
            .contexts
            .get(ctx_id)
            .ok_or(RouterError::Context(ContextRegistryError::UnknownContext(ctx_id)))
    }
}

fn lock_device(device: &DeviceHandle) -> MutexGuard<'_, Box<dyn Device>> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, RouterError> {
    value.ok_or_else(|| RouterError::InvalidArgument(format!("{field} must not be null")))
}

/// Validates a `(start_index, length)` pair against `available` points.
fn point_range(start_index: i32, length: i32, available: usize) -> Result<Range<usize>, RouterError> {
    let invalid = || {
        RouterError::InvalidArgument(format!(
            "points {start_index}..+{length} outside {available} coordinates"
        ))
    };
    let start = usize::try_from(start_index).map_err(|_| invalid())?;
    let len = usize::try_from(length).map_err(|_| invalid())?;
    let end = start.checked_add(len).ok_or_else(invalid)?;
    if end > available {
        return Err(invalid());
    }
    Ok(start..end)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
