//! Frame type and encoding: YUYV conversion, JPEG output, data URLs.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use std::path::Path;

/// JPEG quality for captured stills (0.8 on a 0–1 scale).
pub const JPEG_QUALITY: u8 = 80;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("video stream not ready: frame is {width}x{height}")]
    NotReady { width: u32, height: u32 },
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to read image file: {0}")]
    Io(#[from] std::io::Error),
}

/// A captured RGB8 camera frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl Frame {
    /// Encode as JPEG at [`JPEG_QUALITY`].
    ///
    /// Fails when the stream has not reported dimensions yet; a 0×0 image
    /// is never produced.
    pub fn encode_jpeg(&self) -> Result<EncodedImage, FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::NotReady {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() < expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            });
        }
        let raster = RgbImage::from_raw(self.width, self.height, self.data[..expected].to_vec())
            .ok_or(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            })?;
        encode_rgb(&raster)
    }
}

/// Convert packed YUYV (4:2:2) to RGB8 using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let r = 1.164 * c + 1.596 * e;
    let g = 1.164 * c - 0.392 * d - 0.813 * e;
    let b = 1.164 * c + 2.017 * d;
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn encode_rgb(raster: &RgbImage) -> Result<EncodedImage, FrameError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(raster)?;
    Ok(EncodedImage {
        bytes,
        width: raster.width(),
        height: raster.height(),
    })
}

/// A JPEG-encoded still, ready to send to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub const MIME: &'static str = "image/jpeg";

    /// Load an image file. JPEG input is passed through unchanged; other
    /// formats are decoded and re-encoded as JPEG.
    pub fn from_file(path: &Path) -> Result<Self, FrameError> {
        let raw = std::fs::read(path)?;
        Self::from_bytes(raw)
    }

    pub fn from_bytes(raw: Vec<u8>) -> Result<Self, FrameError> {
        let format = image::guess_format(&raw)?;
        let decoded = image::load_from_memory_with_format(&raw, format)?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(FrameError::NotReady {
                width: decoded.width(),
                height: decoded.height(),
            });
        }
        if format == ImageFormat::Jpeg {
            return Ok(Self {
                width: decoded.width(),
                height: decoded.height(),
                bytes: raw,
            });
        }
        encode_rgb(&decoded.to_rgb8())
    }

    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }

    /// `data:image/jpeg;base64,...`, the form the inline endpoints accept.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", Self::MIME, self.to_base64())
    }
}
