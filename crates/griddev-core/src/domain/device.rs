//! The `Device` capability and the request that opens one.
//!
//! A [`Device`] is a rendering target: an SVG document, an image buffer, a
//! window.  The server owns devices and drives them from decoded requests;
//! concrete renderers live behind this trait so the router never knows what
//! it is drawing on.
//!
//! Coordinates and sizes are in inches with the origin at the bottom-left
//! corner; rotations are anticlockwise radians.

use thiserror::Error;

use super::context::DrawingContextValue;
use crate::protocol::codec::{ProtocolError, WireDecoder, WireEncoder};

/// Errors reported by devices and device factories.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The factory has no renderer for the requested file type.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The factory cannot open this kind of device (e.g. a window on a headless host).
    #[error("unsupported device type: {0:?}")]
    UnsupportedDeviceType(DeviceType),

    /// Arguments of a draw call are inconsistent (index range, raster shape).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Writing the rendered output failed.
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ── Device kinds ──────────────────────────────────────────────────────────────

/// Kind of device requested by CREATE_IMAGE; the wire value is the ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DeviceType {
    Window = 0,
    BufferedImage = 1,
}

impl TryFrom<i32> for DeviceType {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, ()> {
        match value {
            0 => Ok(DeviceType::Window),
            1 => Ok(DeviceType::BufferedImage),
            _ => Err(()),
        }
    }
}

/// Scaling used when a raster is drawn at a size other than its pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ImageInterpolation {
    NearestNeighbor = 0,
    Linear = 1,
}

impl TryFrom<i32> for ImageInterpolation {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, ()> {
        match value {
            0 => Ok(ImageInterpolation::NearestNeighbor),
            1 => Ok(ImageInterpolation::Linear),
            _ => Err(()),
        }
    }
}

// ── Open request ──────────────────────────────────────────────────────────────

/// Parameters of a CREATE_IMAGE request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    pub device_type: DeviceType,
    /// Output file; `None` for windows.
    pub filename: Option<String>,
    /// Output format such as `"svg"`; `None` for windows.
    pub file_type: Option<String>,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl DeviceRequest {
    pub fn image(filename: impl Into<String>, file_type: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            device_type: DeviceType::BufferedImage,
            filename: Some(filename.into()),
            file_type: Some(file_type.into()),
            width,
            height,
        }
    }

    pub fn window(width: i32, height: i32) -> Self {
        Self {
            device_type: DeviceType::Window,
            filename: None,
            file_type: None,
            width,
            height,
        }
    }

    /// Writes the CREATE_IMAGE payload (everything after the opcode).
    pub fn encode(&self, encoder: &mut WireEncoder) {
        encoder.write_int(self.device_type as i32);
        encoder.write_string(self.filename.as_deref());
        encoder.write_string(self.file_type.as_deref());
        encoder.write_int(self.width);
        encoder.write_int(self.height);
    }

    pub fn decode(decoder: &mut WireDecoder) -> Result<Self, ProtocolError> {
        let raw_type = decoder.read_int()?;
        let device_type = DeviceType::try_from(raw_type)
            .map_err(|_| ProtocolError::MalformedPayload(format!("unknown device type: {raw_type}")))?;
        Ok(Self {
            device_type,
            filename: decoder.read_string()?,
            file_type: decoder.read_string()?,
            width: decoder.read_int()?,
            height: decoder.read_int()?,
        })
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

/// A rendering target driven by the server.
///
/// `start_index` and `length` select the points of `x`/`y` used by the
/// polyline and polygon calls; callers guarantee the range is within both
/// slices.  `pixels` holds ARGB values row by row, `columns` per row.
pub trait Device: Send {
    fn open_new_page(&mut self) -> Result<(), DeviceError>;

    /// Starts buffering output until the matching [`Device::flush`].
    fn hold(&mut self) {}

    fn flush(&mut self) {}

    /// Finishes the device, writing any output.  The device is not used afterwards.
    fn close(&mut self) -> Result<(), DeviceError>;

    fn draw_rect(
        &mut self,
        ctx: &DrawingContextValue,
        left_x: f64,
        bottom_y: f64,
        width: f64,
        height: f64,
        rotation: f64,
    ) -> Result<(), DeviceError>;

    fn draw_poly_lines(
        &mut self,
        ctx: &DrawingContextValue,
        x: &[f64],
        y: &[f64],
        start_index: usize,
        length: usize,
    ) -> Result<(), DeviceError>;

    fn draw_polygon(
        &mut self,
        ctx: &DrawingContextValue,
        x: &[f64],
        y: &[f64],
        start_index: usize,
        length: usize,
    ) -> Result<(), DeviceError>;

    fn draw_circle(
        &mut self,
        ctx: &DrawingContextValue,
        center_x: f64,
        center_y: f64,
        radius: f64,
    ) -> Result<(), DeviceError>;

    #[allow(clippy::too_many_arguments)]
    fn draw_raster(
        &mut self,
        left_x: f64,
        bottom_y: f64,
        width: f64,
        height: f64,
        pixels: &[i32],
        columns: usize,
        interpolation: ImageInterpolation,
    ) -> Result<(), DeviceError>;

    fn draw_string(
        &mut self,
        ctx: &DrawingContextValue,
        left_x: f64,
        bottom_y: f64,
        rotation: f64,
        text: &str,
    ) -> Result<(), DeviceError>;

    /// Width in inches.
    fn width(&self) -> f64;

    /// Height in inches.
    fn height(&self) -> f64;

    /// Width in device pixels.
    fn native_width(&self) -> i32;

    /// Height in device pixels.
    fn native_height(&self) -> i32;

    fn string_width(&self, ctx: &DrawingContextValue, text: &str) -> f64;

    fn string_height(&self, ctx: &DrawingContextValue, text: &str) -> f64;
}

/// Opens devices for CREATE_IMAGE requests.
pub trait DeviceFactory: Send + Sync {
    /// Returns [`DeviceError::UnsupportedFormat`] when `request.file_type` has no renderer.
    fn create(&self, request: &DeviceRequest) -> Result<Box<dyn Device>, DeviceError>;
}
