//! Concrete devices and the factory the server binary uses by default.
//!
//! # Platform support
//!
//! | File type   | Device              |
//! |-------------|---------------------|
//! | `svg`       | [`svg::SvgDevice`]  |
//! | `recording` | [`recording::RecordingDevice`] (calls are kept in memory only) |
//! | other       | refused; the client sees device id `-1` |
//!
//! Windows are not available on a headless host; requesting one is an
//! application error.

pub mod recording;
pub mod svg;

use std::path::{Path, PathBuf};

use griddev_core::domain::context::INCH_TO_POINTS_FACTOR;
use griddev_core::{Device, DeviceError, DeviceFactory, DeviceRequest, DeviceType};
use tracing::info;

use recording::RecordingDevice;
use svg::SvgDevice;

/// Device factory for a server without a display.
///
/// Relative file names are resolved against `output_dir` when one is set,
/// otherwise against the server's working directory.
#[derive(Debug, Clone, Default)]
pub struct HeadlessDeviceFactory {
    output_dir: Option<PathBuf>,
}

impl HeadlessDeviceFactory {
    pub fn new(output_dir: Option<PathBuf>) -> Self {
        Self { output_dir }
    }

    fn resolve(&self, filename: &str) -> PathBuf {
        let path = Path::new(filename);
        match &self.output_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl DeviceFactory for HeadlessDeviceFactory {
    fn create(&self, request: &DeviceRequest) -> Result<Box<dyn Device>, DeviceError> {
        if request.device_type == DeviceType::Window {
            return Err(DeviceError::UnsupportedDeviceType(DeviceType::Window));
        }
        let file_type = request.file_type.as_deref().unwrap_or_default().to_ascii_lowercase();
        match file_type.as_str() {
            "svg" => {
                let filename = request.filename.as_deref().ok_or_else(|| {
                    DeviceError::InvalidArgument("an SVG device needs a file name".to_string())
                })?;
                let path = self.resolve(filename);
                info!(path = %path.display(), width = request.width, height = request.height, "opening SVG device");
                Ok(Box::new(SvgDevice::new(
                    path,
                    f64::from(request.width) / INCH_TO_POINTS_FACTOR,
                    f64::from(request.height) / INCH_TO_POINTS_FACTOR,
                )))
            }
            "recording" => Ok(Box::new(RecordingDevice::new(request.width, request.height))),
            _ => Err(DeviceError::UnsupportedFormat(file_type)),
        }
    }
}
