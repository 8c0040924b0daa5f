//! Where recognition stills come from.

use crate::error::ClientError;
use facemark_hw::{CaptureRequest, EncodedImage, Webcam, WebcamError};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Produces one encoded still per call.
pub trait FrameSource: Send + 'static {
    fn capture(&mut self) -> impl Future<Output = Result<EncodedImage, ClientError>> + Send;
}

/// Live webcam. V4L2 capture blocks, so it runs on the blocking pool.
///
/// The camera is released when the last clone of the source is dropped,
/// including when a poller task is aborted mid-capture.
#[derive(Clone)]
pub struct WebcamSource {
    webcam: Arc<Mutex<Webcam>>,
}

impl WebcamSource {
    pub fn acquire(request: &CaptureRequest) -> Result<Self, ClientError> {
        let webcam = Webcam::acquire(request)?;
        Ok(Self {
            webcam: Arc::new(Mutex::new(webcam)),
        })
    }

    /// Release the camera now, even if other clones are alive.
    pub fn release(&self) {
        if let Ok(mut webcam) = self.webcam.lock() {
            webcam.release();
        }
    }
}

impl FrameSource for WebcamSource {
    fn capture(&mut self) -> impl Future<Output = Result<EncodedImage, ClientError>> + Send {
        let webcam = Arc::clone(&self.webcam);
        async move {
            tokio::task::spawn_blocking(move || {
                let webcam = webcam
                    .lock()
                    .map_err(|_| WebcamError::Other("camera lock poisoned".into()))?;
                webcam.capture()
            })
            .await
            .map_err(|e| ClientError::Webcam(WebcamError::Other(format!("capture task: {e}"))))?
            .map_err(ClientError::from)
        }
    }
}

/// A fixed image, for single-shot recognition of an uploaded photo.
#[derive(Debug, Clone)]
pub struct StillImage {
    image: EncodedImage,
}

impl StillImage {
    pub fn new(image: EncodedImage) -> Self {
        Self { image }
    }

    pub fn open(path: &Path) -> Result<Self, ClientError> {
        Ok(Self::new(EncodedImage::from_file(path)?))
    }
}

impl FrameSource for StillImage {
    fn capture(&mut self) -> impl Future<Output = Result<EncodedImage, ClientError>> + Send {
        let image = self.image.clone();
        async move { Ok(image) }
    }
}
