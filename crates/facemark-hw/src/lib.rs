//! facemark-hw: Webcam access for attendance capture.
//!
//! Provides V4L2-based camera acquisition with classified errors and
//! still-frame capture encoded as JPEG for the recognition backend.

pub mod frame;
pub mod webcam;

pub use frame::{EncodedImage, Frame, FrameError, JPEG_QUALITY};
pub use webcam::{
    list_devices, release, CaptureRequest, DeviceInfo, Facing, Resolution, Webcam, WebcamError,
};
