//! V4L2 webcam acquisition via the `v4l` crate.
//!
//! A [`Webcam`] is a scoped acquisition: the device is released by
//! [`Webcam::release`], by the free [`release`] helper, or on drop.

use crate::frame::{self, EncodedImage, Frame, FrameError};
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// errno for "Device or resource busy" on Linux.
const EBUSY: i32 = 16;
/// errno for "No such device".
const ENODEV: i32 = 19;
/// errno for "Inappropriate ioctl for device" (not a V4L2 node).
const ENOTTY: i32 = 25;

#[derive(Error, Debug)]
pub enum WebcamError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera not found: {0}")]
    NotFound(String),
    #[error("camera busy: {0}")]
    Busy(String),
    #[error("camera capture unsupported: {0}")]
    Unsupported(String),
    #[error("camera released")]
    Released,
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("camera error: {0}")]
    Other(String),
}

impl WebcamError {
    /// Message suitable for showing to the operator.
    pub fn user_message(&self) -> String {
        match self {
            WebcamError::PermissionDenied(_) => {
                "Camera access denied. Please allow camera permissions and try again.".into()
            }
            WebcamError::NotFound(_) => {
                "No camera found. Please connect a camera and try again.".into()
            }
            WebcamError::Busy(_) => "Camera is already in use by another application.".into(),
            WebcamError::Unsupported(_) => "Camera access is not supported on this system.".into(),
            WebcamError::Frame(FrameError::NotReady { .. }) => {
                "Failed to capture image from video".into()
            }
            _ => "Failed to access camera. Please check your camera settings.".into(),
        }
    }

    /// Classify an I/O error from opening or streaming a device.
    fn classify(device_path: &str, e: io::Error) -> Self {
        let detail = format!("{device_path}: {e}");
        match (e.kind(), e.raw_os_error()) {
            (io::ErrorKind::PermissionDenied, _) => WebcamError::PermissionDenied(detail),
            (io::ErrorKind::NotFound, _) | (_, Some(ENODEV)) => WebcamError::NotFound(detail),
            (_, Some(EBUSY)) => WebcamError::Busy(detail),
            (_, Some(ENOTTY)) => WebcamError::Unsupported(detail),
            _ => WebcamError::Other(detail),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn fits_within(self, max: Resolution) -> bool {
        self.width <= max.width && self.height <= max.height
    }
}

/// Which camera to prefer when several are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    /// Front-facing camera (the configured device).
    #[default]
    User,
    /// Any capture-capable device, in `/dev/videoN` order.
    Any,
}

/// Parameters for acquiring a video-only stream.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub device_path: String,
    pub ideal: Resolution,
    pub max: Resolution,
    pub facing: Facing,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            device_path: "/dev/video0".to_string(),
            ideal: Resolution::new(1280, 720),
            max: Resolution::new(1920, 1080),
            facing: Facing::User,
        }
    }
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one compressed still per buffer.
    Mjpg,
    /// 24-bit packed RGB.
    Rgb3,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpg),
            b"RGB3" => Some(PixelFormat::Rgb3),
            _ => None,
        }
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// An acquired webcam stream.
pub struct Webcam {
    device: Option<Device>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
}

impl Webcam {
    /// Open a capture device and negotiate a resolution no larger than `request.max`.
    pub fn acquire(request: &CaptureRequest) -> Result<Self, WebcamError> {
        let device_path = match request.facing {
            Facing::User => request.device_path.clone(),
            Facing::Any => list_devices()
                .into_iter()
                .next()
                .map(|d| d.path)
                .ok_or_else(|| WebcamError::NotFound("no capture devices".into()))?,
        };

        if !Path::new(&device_path).exists() {
            return Err(WebcamError::NotFound(device_path));
        }

        let device =
            Device::with_path(&device_path).map_err(|e| WebcamError::classify(&device_path, e))?;

        let caps = device
            .query_caps()
            .map_err(|e| WebcamError::classify(&device_path, e))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(WebcamError::Unsupported(format!(
                "{device_path} has no video capture capability"
            )));
        }

        tracing::info!(
            device = %device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        let (negotiated, pixel_format) = negotiate(&device, &device_path, request)?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            format = ?pixel_format,
            "negotiated format"
        );

        Ok(Self {
            device: Some(device),
            width: negotiated.width,
            height: negotiated.height,
            device_path,
            pixel_format,
        })
    }

    /// Grab the current frame and encode it as JPEG at the native resolution.
    pub fn capture(&self) -> Result<EncodedImage, WebcamError> {
        let frame = self.capture_frame()?;
        Ok(frame.encode_jpeg()?)
    }

    /// Grab the current frame as RGB.
    pub fn capture_frame(&self) -> Result<Frame, WebcamError> {
        let device = self.device.as_ref().ok_or(WebcamError::Released)?;
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::NotReady {
                width: self.width,
                height: self.height,
            }
            .into());
        }

        let mut stream = MmapStream::with_buffers(device, BufType::VideoCapture, 4)
            .map_err(|e| WebcamError::classify(&self.device_path, e))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| WebcamError::Other(format!("failed to dequeue buffer: {e}")))?;

        let frame = buf_to_frame(self.pixel_format, buf, self.width, self.height, meta.sequence)?;
        tracing::trace!(seq = meta.sequence, bytes = buf.len(), "captured frame");
        Ok(frame)
    }

    pub fn is_active(&self) -> bool {
        self.device.is_some()
    }

    /// Stop streaming and close the device. Safe to call more than once.
    pub fn release(&mut self) {
        if self.device.take().is_some() {
            tracing::info!(device = %self.device_path, "released camera");
        }
    }
}

impl Drop for Webcam {
    fn drop(&mut self) {
        self.release();
    }
}

/// Release a stream if one is held. No-op on `None`.
pub fn release(stream: Option<Webcam>) {
    if let Some(mut webcam) = stream {
        webcam.release();
    }
}

/// Request the ideal size, stepping down to the maximum if the driver
/// hands back something larger.
fn negotiate(
    device: &Device,
    device_path: &str,
    request: &CaptureRequest,
) -> Result<(Resolution, PixelFormat), WebcamError> {
    let mut fmt = device
        .format()
        .map_err(|e| WebcamError::classify(device_path, e))?;

    let mut negotiated = None;
    for fourcc in [b"YUYV", b"MJPG", b"RGB3"] {
        fmt.fourcc = FourCC::new(fourcc);
        fmt.width = request.ideal.width;
        fmt.height = request.ideal.height;
        let got = device
            .set_format(&fmt)
            .map_err(|e| WebcamError::classify(device_path, e))?;
        if let Some(pf) = PixelFormat::from_fourcc(got.fourcc) {
            negotiated = Some((got, pf));
            break;
        }
    }
    let (mut got, pixel_format) = negotiated.ok_or_else(|| {
        WebcamError::Unsupported(format!("{device_path}: no YUYV, MJPG or RGB3 format"))
    })?;

    if !Resolution::new(got.width, got.height).fits_within(request.max) {
        fmt = got.clone();
        fmt.width = request.max.width;
        fmt.height = request.max.height;
        got = device
            .set_format(&fmt)
            .map_err(|e| WebcamError::classify(device_path, e))?;
        if !Resolution::new(got.width, got.height).fits_within(request.max) {
            tracing::warn!(
                width = got.width,
                height = got.height,
                "driver exceeded maximum resolution"
            );
        }
    }

    let pixel_format = PixelFormat::from_fourcc(got.fourcc).unwrap_or(pixel_format);
    Ok((Resolution::new(got.width, got.height), pixel_format))
}

/// Convert one dequeued buffer to RGB. MJPG frames carry their own size,
/// which wins over the negotiated one.
fn buf_to_frame(
    format: PixelFormat,
    buf: &[u8],
    width: u32,
    height: u32,
    sequence: u32,
) -> Result<Frame, FrameError> {
    let (data, width, height) = match format {
        PixelFormat::Yuyv => (frame::yuyv_to_rgb(buf, width, height)?, width, height),
        PixelFormat::Rgb3 => {
            let expected = width as usize * height as usize * 3;
            if buf.len() < expected {
                return Err(FrameError::InvalidLength {
                    expected,
                    actual: buf.len(),
                });
            }
            (buf[..expected].to_vec(), width, height)
        }
        PixelFormat::Mjpg => {
            let decoded = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)?;
            if decoded.width() != width || decoded.height() != height {
                tracing::debug!(
                    negotiated = %format_args!("{width}x{height}"),
                    decoded = %format_args!("{}x{}", decoded.width(), decoded.height()),
                    "mjpg frame size differs from negotiated"
                );
            }
            let rgb = decoded.to_rgb8();
            let (w, h) = rgb.dimensions();
            (rgb.into_raw(), w, h)
        }
    };
    Ok(Frame {
        data,
        width,
        height,
        sequence,
    })
}

/// List available V4L2 video capture devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for i in 0..16 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            continue;
        }
        devices.push(DeviceInfo {
            path,
            name: caps.card.clone(),
            driver: caps.driver.clone(),
            bus: caps.bus.clone(),
        });
    }

    devices
}
