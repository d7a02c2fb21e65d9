//! Client-side proxy for one device living in the server process.
//!
//! Every method encodes one request and puts it on the session's queue.
//! Drawing calls are fire-and-forget; size queries wait for the reply.
//! Drawing calls that take a [`DrawingContext`] first make sure the server
//! knows the context on this device, registering it on first use.

use std::sync::Arc;

use griddev_core::{ImageInterpolation, Opcode, WireDecoder, WireEncoder};
use tracing::{debug, info};

use super::context_cache::{ContextRegistrations, DrawingContext, ReleaseQueue};
use super::request_queue::RequestQueue;
use crate::error::ClientError;

/// A device opened on the grid server.
///
/// Close it with [`RemoteDevice::close`].  Dropping it without closing
/// leaves the device open on the server.
#[derive(Debug)]
pub struct RemoteDevice {
    id: i32,
    queue: RequestQueue,
    releases: Arc<ReleaseQueue>,
    contexts: ContextRegistrations,
    encoder: WireEncoder,
}

impl RemoteDevice {
    pub(crate) fn new(id: i32, queue: RequestQueue, releases: Arc<ReleaseQueue>) -> Self {
        Self {
            id,
            queue,
            releases,
            contexts: ContextRegistrations::new(),
            encoder: WireEncoder::new(),
        }
    }

    /// Server-assigned device id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Contexts currently registered on the server for this device.
    pub fn registered_contexts(&self) -> usize {
        self.contexts.live()
    }

    // ── Page control ─────────────────────────────────────────────────────────

    pub fn open_new_page(&mut self) -> Result<(), ClientError> {
        self.begin(Opcode::OpenNewPage);
        self.send()
    }

    pub fn hold(&mut self) -> Result<(), ClientError> {
        self.begin(Opcode::Hold);
        self.send()
    }

    pub fn flush(&mut self) -> Result<(), ClientError> {
        self.begin(Opcode::Flush);
        self.send()
    }

    /// Closes the device, releasing every context it registered.
    ///
    /// # Errors
    ///
    /// [`ClientError::DeviceClose`] carries the server's message when the
    /// device was removed but failed to finish (for example writing its file).
    pub async fn close(mut self) -> Result<(), ClientError> {
        let ctx_ids = self.contexts.take_all_for_close();
        self.begin(Opcode::Close);
        self.encoder.write_int_array(Some(&ctx_ids));
        let mut reply = self.call().await?;
        info!(device_id = self.id, released = ctx_ids.len(), "device closed");
        match reply.read_string()? {
            Some(message) => Err(ClientError::DeviceClose(message)),
            None => Ok(()),
        }
    }

    // ── Drawing ──────────────────────────────────────────────────────────────

    pub async fn draw_rect(
        &mut self,
        ctx: &DrawingContext,
        left_x: f64,
        bottom_y: f64,
        width: f64,
        height: f64,
        rotation: f64,
    ) -> Result<(), ClientError> {
        let ctx_id = self.context_id(ctx).await?;
        self.begin(Opcode::DrawRect);
        self.encoder.write_int(ctx_id);
        for value in [left_x, bottom_y, width, height, rotation] {
            self.encoder.write_double(value);
        }
        self.send()
    }

    pub async fn draw_poly_lines(
        &mut self,
        ctx: &DrawingContext,
        x: &[f64],
        y: &[f64],
        start_index: i32,
        length: i32,
    ) -> Result<(), ClientError> {
        self.draw_points(Opcode::DrawPolyLines, ctx, x, y, start_index, length)
            .await
    }

    pub async fn draw_polygon(
        &mut self,
        ctx: &DrawingContext,
        x: &[f64],
        y: &[f64],
        start_index: i32,
        length: i32,
    ) -> Result<(), ClientError> {
        self.draw_points(Opcode::DrawPolygon, ctx, x, y, start_index, length)
            .await
    }

    pub async fn draw_circle(
        &mut self,
        ctx: &DrawingContext,
        center_x: f64,
        center_y: f64,
        radius: f64,
    ) -> Result<(), ClientError> {
        let ctx_id = self.context_id(ctx).await?;
        self.begin(Opcode::DrawCircle);
        self.encoder.write_int(ctx_id);
        self.encoder.write_double(center_x);
        self.encoder.write_double(center_y);
        self.encoder.write_double(radius);
        self.send()
    }

    /// Draws ARGB `pixels`, row-major with `columns` pixels per row.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_raster(
        &mut self,
        left_x: f64,
        bottom_y: f64,
        width: f64,
        height: f64,
        pixels: &[i32],
        columns: i32,
        interpolation: ImageInterpolation,
    ) -> Result<(), ClientError> {
        self.begin(Opcode::DrawRaster);
        for value in [left_x, bottom_y, width, height] {
            self.encoder.write_double(value);
        }
        self.encoder.write_int_array(Some(pixels));
        self.encoder.write_int(columns);
        self.encoder.write_int(interpolation as i32);
        self.send()
    }

    pub async fn draw_string(
        &mut self,
        ctx: &DrawingContext,
        left_x: f64,
        bottom_y: f64,
        rotation: f64,
        text: &str,
    ) -> Result<(), ClientError> {
        let ctx_id = self.context_id(ctx).await?;
        self.begin(Opcode::DrawString);
        self.encoder.write_int(ctx_id);
        self.encoder.write_double(left_x);
        self.encoder.write_double(bottom_y);
        self.encoder.write_double(rotation);
        self.encoder.write_string(Some(text));
        self.send()
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Width in inches.
    pub async fn width(&mut self) -> Result<f64, ClientError> {
        self.begin(Opcode::GetWidth);
        Ok(self.call().await?.read_double()?)
    }

    /// Height in inches.
    pub async fn height(&mut self) -> Result<f64, ClientError> {
        self.begin(Opcode::GetHeight);
        Ok(self.call().await?.read_double()?)
    }

    /// Width in device pixels.
    pub async fn native_width(&mut self) -> Result<i32, ClientError> {
        self.begin(Opcode::GetNativeWidth);
        Ok(self.call().await?.read_int()?)
    }

    /// Height in device pixels.
    pub async fn native_height(&mut self) -> Result<i32, ClientError> {
        self.begin(Opcode::GetNativeHeight);
        Ok(self.call().await?.read_int()?)
    }

    pub async fn string_width(&mut self, ctx: &DrawingContext, text: &str) -> Result<f64, ClientError> {
        self.string_extent(Opcode::GetStringWidth, ctx, text).await
    }

    pub async fn string_height(&mut self, ctx: &DrawingContext, text: &str) -> Result<f64, ClientError> {
        self.string_extent(Opcode::GetStringHeight, ctx, text).await
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    async fn draw_points(
        &mut self,
        opcode: Opcode,
        ctx: &DrawingContext,
        x: &[f64],
        y: &[f64],
        start_index: i32,
        length: i32,
    ) -> Result<(), ClientError> {
        let ctx_id = self.context_id(ctx).await?;
        self.begin(opcode);
        self.encoder.write_int(ctx_id);
        self.encoder.write_double_array(Some(x));
        self.encoder.write_double_array(Some(y));
        self.encoder.write_int(start_index);
        self.encoder.write_int(length);
        self.send()
    }

    async fn string_extent(
        &mut self,
        opcode: Opcode,
        ctx: &DrawingContext,
        text: &str,
    ) -> Result<f64, ClientError> {
        let ctx_id = self.context_id(ctx).await?;
        self.begin(opcode);
        self.encoder.write_int(ctx_id);
        self.encoder.write_string(Some(text));
        Ok(self.call().await?.read_double()?)
    }

    /// Server id of `ctx` on this device, registering it on first use.
    async fn context_id(&mut self, ctx: &DrawingContext) -> Result<i32, ClientError> {
        if let Some(ctx_id) = self.contexts.lookup(ctx) {
            return Ok(ctx_id);
        }
        self.encoder.write_byte(Opcode::CreateDrawingContext as u8);
        ctx.value().encode(&mut self.encoder);
        let ctx_id = self.call().await?.read_int()?;
        self.contexts
            .register(ctx, ctx_id, Arc::clone(&self.releases));
        debug!(device_id = self.id, ctx_id, "drawing context registered");
        Ok(ctx_id)
    }

    /// Starts a device request: opcode then device id.
    fn begin(&mut self, opcode: Opcode) {
        self.encoder.write_byte(opcode as u8);
        self.encoder.write_int(self.id);
    }

    fn send(&mut self) -> Result<(), ClientError> {
        self.queue.submit(self.encoder.reset_write())
    }

    async fn call(&mut self) -> Result<WireDecoder, ClientError> {
        self.queue
            .submit_for_reply(self.encoder.reset_write())?
            .wait()
            .await
    }
}
