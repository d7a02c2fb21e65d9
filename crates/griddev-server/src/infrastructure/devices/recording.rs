//! In-memory device that records every call it receives.
//!
//! Used by unit and integration tests to assert what the command router did
//! without rendering anything, and selectable at runtime with the
//! `recording` file type for protocol debugging.

use std::sync::{Arc, Mutex, PoisonError};

use griddev_core::domain::context::INCH_TO_POINTS_FACTOR;
use griddev_core::{
    Device, DeviceError, DeviceFactory, DeviceRequest, DrawingContextValue, ImageInterpolation,
};

/// One recorded device call.  Point arrays hold only the selected range.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    OpenNewPage,
    Hold,
    Flush,
    Close,
    DrawRect {
        ctx: DrawingContextValue,
        left_x: f64,
        bottom_y: f64,
        width: f64,
        height: f64,
        rotation: f64,
    },
    DrawPolyLines {
        ctx: DrawingContextValue,
        x: Vec<f64>,
        y: Vec<f64>,
    },
    DrawPolygon {
        ctx: DrawingContextValue,
        x: Vec<f64>,
        y: Vec<f64>,
    },
    DrawCircle {
        ctx: DrawingContextValue,
        center_x: f64,
        center_y: f64,
        radius: f64,
    },
    DrawRaster {
        left_x: f64,
        bottom_y: f64,
        width: f64,
        height: f64,
        pixels: Vec<i32>,
        columns: usize,
        interpolation: ImageInterpolation,
    },
    DrawString {
        ctx: DrawingContextValue,
        left_x: f64,
        bottom_y: f64,
        rotation: f64,
        text: String,
    },
}

/// Call log shared between a device and whoever inspects it.
pub type DeviceLog = Arc<Mutex<Vec<DeviceCall>>>;

/// A [`Device`] that appends every call to a [`DeviceLog`].
pub struct RecordingDevice {
    width_px: i32,
    height_px: i32,
    log: DeviceLog,
    close_error: Option<String>,
}

impl RecordingDevice {
    /// Creates a device of the given pixel size with a fresh log.
    pub fn new(width_px: i32, height_px: i32) -> Self {
        Self::with_log(width_px, height_px, DeviceLog::default())
    }

    pub fn with_log(width_px: i32, height_px: i32, log: DeviceLog) -> Self {
        Self {
            width_px,
            height_px,
            log,
            close_error: None,
        }
    }

    /// Makes [`Device::close`] fail with `message`.
    pub fn failing_close(mut self, message: impl Into<String>) -> Self {
        self.close_error = Some(message.into());
        self
    }

    pub fn log(&self) -> DeviceLog {
        Arc::clone(&self.log)
    }

    fn record(&self, call: DeviceCall) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

fn selected(values: &[f64], start_index: usize, length: usize) -> Vec<f64> {
    values[start_index..start_index + length].to_vec()
}

impl Device for RecordingDevice {
    fn open_new_page(&mut self) -> Result<(), DeviceError> {
        self.record(DeviceCall::OpenNewPage);
        Ok(())
    }

    fn hold(&mut self) {
        self.record(DeviceCall::Hold);
    }

    fn flush(&mut self) {
        self.record(DeviceCall::Flush);
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.record(DeviceCall::Close);
        match &self.close_error {
            Some(message) => Err(DeviceError::Io {
                path: "<recording>".to_string(),
                source: std::io::Error::other(message.clone()),
            }),
            None => Ok(()),
        }
    }

    fn draw_rect(
        &mut self,
        ctx: &DrawingContextValue,
        left_x: f64,
        bottom_y: f64,
        width: f64,
        height: f64,
        rotation: f64,
    ) -> Result<(), DeviceError> {
        self.record(DeviceCall::DrawRect {
            ctx: ctx.clone(),
            left_x,
            bottom_y,
            width,
            height,
            rotation,
        });
        Ok(())
    }

    fn draw_poly_lines(
        &mut self,
        ctx: &DrawingContextValue,
        x: &[f64],
        y: &[f64],
        start_index: usize,
        length: usize,
    ) -> Result<(), DeviceError> {
        self.record(DeviceCall::DrawPolyLines {
            ctx: ctx.clone(),
            x: selected(x, start_index, length),
            y: selected(y, start_index, length),
        });
        Ok(())
    }

    fn draw_polygon(
        &mut self,
        ctx: &DrawingContextValue,
        x: &[f64],
        y: &[f64],
        start_index: usize,
        length: usize,
    ) -> Result<(), DeviceError> {
        self.record(DeviceCall::DrawPolygon {
            ctx: ctx.clone(),
            x: selected(x, start_index, length),
            y: selected(y, start_index, length),
        });
        Ok(())
    }

    fn draw_circle(
        &mut self,
        ctx: &DrawingContextValue,
        center_x: f64,
        center_y: f64,
        radius: f64,
    ) -> Result<(), DeviceError> {
        self.record(DeviceCall::DrawCircle {
            ctx: ctx.clone(),
            center_x,
            center_y,
            radius,
        });
        Ok(())
    }

    fn draw_raster(
        &mut self,
        left_x: f64,
        bottom_y: f64,
        width: f64,
        height: f64,
        pixels: &[i32],
        columns: usize,
        interpolation: ImageInterpolation,
    ) -> Result<(), DeviceError> {
        self.record(DeviceCall::DrawRaster {
            left_x,
            bottom_y,
            width,
            height,
            pixels: pixels.to_vec(),
            columns,
            interpolation,
        });
        Ok(())
    }

    fn draw_string(
        &mut self,
        ctx: &DrawingContextValue,
        left_x: f64,
        bottom_y: f64,
        rotation: f64,
        text: &str,
    ) -> Result<(), DeviceError> {
        self.record(DeviceCall::DrawString {
            ctx: ctx.clone(),
            left_x,
            bottom_y,
            rotation,
            text: text.to_string(),
        });
        Ok(())
    }

    fn width(&self) -> f64 {
        f64::from(self.width_px) / INCH_TO_POINTS_FACTOR
    }

    fn height(&self) -> f64 {
        f64::from(self.height_px) / INCH_TO_POINTS_FACTOR
    }

    fn native_width(&self) -> i32 {
        self.width_px
    }

    fn native_height(&self) -> i32 {
        self.height_px
    }

    fn string_width(&self, ctx: &DrawingContextValue, text: &str) -> f64 {
        text.chars().count() as f64 * 0.6 * ctx.font_size() / INCH_TO_POINTS_FACTOR
    }

    fn string_height(&self, ctx: &DrawingContextValue, _text: &str) -> f64 {
        ctx.font_size() / INCH_TO_POINTS_FACTOR
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Factory producing [`RecordingDevice`]s and keeping every device's log.
///
/// Logs are kept in creation order, so `log(0)` belongs to the first device
/// opened (server id 1 on a fresh router).  Both windows and images are
/// accepted; the file type `"unsupported"` is refused.
#[derive(Default)]
pub struct RecordingDeviceFactory {
    logs: Mutex<Vec<DeviceLog>>,
    close_error: Option<String>,
}

impl RecordingDeviceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every device created by this factory fails to close with `message`.
    pub fn failing_close(message: impl Into<String>) -> Self {
        Self {
            logs: Mutex::default(),
            close_error: Some(message.into()),
        }
    }

    /// Number of devices created so far.
    pub fn created(&self) -> usize {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Snapshot of the calls received by the `index`-th device.
    pub fn calls(&self, index: usize) -> Vec<DeviceCall> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.get(index)
            .map(|log| log.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default()
    }
}

impl DeviceFactory for RecordingDeviceFactory {
    fn create(&self, request: &DeviceRequest) -> Result<Box<dyn Device>, DeviceError> {
        if request.file_type.as_deref() == Some("unsupported") {
            return Err(DeviceError::UnsupportedFormat("unsupported".to_string()));
        }
        let log = DeviceLog::default();
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&log));
        let mut device = RecordingDevice::with_log(request.width, request.height, log);
        device.close_error = self.close_error.clone();
        Ok(Box::new(device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_selected_points_only() {
        // Arrange
        let mut device = RecordingDevice::new(72, 72);
        let ctx = DrawingContextValue::builder().build();

        // Act
        device
            .draw_poly_lines(&ctx, &[0.0, 1.0, 2.0, 3.0], &[5.0, 6.0, 7.0, 8.0], 1, 2)
            .unwrap();

        // Assert
        let log = device.log();
        let calls = log.lock().unwrap();
        assert_eq!(
            calls[0],
            DeviceCall::DrawPolyLines {
                ctx,
                x: vec![1.0, 2.0],
                y: vec![6.0, 7.0]
            }
        );
    }

    #[test]
    fn test_sizes_convert_pixels_to_inches() {
        let device = RecordingDevice::new(144, 72);
        assert_eq!(device.width(), 2.0);
        assert_eq!(device.height(), 1.0);
        assert_eq!(device.native_width(), 144);
    }

    #[test]
    fn test_failing_close_reports_message() {
        let mut device = RecordingDevice::new(1, 1).failing_close("disk full");
        let err = device.close().unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_factory_keeps_logs_in_creation_order() {
        let factory = RecordingDeviceFactory::new();
        let mut first = factory.create(&DeviceRequest::window(10, 10)).unwrap();
        let _second = factory.create(&DeviceRequest::image("a", "png", 1, 1)).unwrap();
        first.hold();
        assert_eq!(factory.created(), 2);
        assert_eq!(factory.calls(0), vec![DeviceCall::Hold]);
        assert!(factory.calls(1).is_empty());
    }
}
