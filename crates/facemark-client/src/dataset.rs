//! Dataset administration: rebuild trigger and local file selection.

use crate::api::{Ack, ApiClient};
use crate::error::ClientError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const REBUILD_STARTED: &str = "Dataset rebuild process started successfully";
pub const REBUILD_FAILED: &str = "Failed to rebuild dataset";
pub const NO_FILES: &str = "Please select files to upload";

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Clone)]
pub struct DatasetPanel {
    api: ApiClient,
    busy: Arc<AtomicBool>,
}

/// Clears the busy flag however the rebuild call ends.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DatasetPanel {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn begin(&self) -> Result<BusyGuard, ClientError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClientError::Busy("dataset rebuild"))?;
        Ok(BusyGuard(Arc::clone(&self.busy)))
    }

    /// Fire `POST /dataset/rebuild`. A second call while one is in flight
    /// is rejected without touching the network.
    pub async fn rebuild(&self) -> Result<Ack, ClientError> {
        let _guard = self.begin()?;
        tracing::info!("dataset rebuild requested");
        match self.api.rebuild_dataset().await {
            Ok(ack) => {
                tracing::info!(message = %ack.message, "dataset rebuild started");
                Ok(ack)
            }
            Err(e) => {
                tracing::warn!(error = %e, "dataset rebuild failed");
                Err(e)
            }
        }
    }
}

/// Validate a file selection before a rebuild. Nothing is transmitted.
///
/// Keeps the readable image files from `paths`. Fails when the selection is
/// empty or none of it is an image.
pub fn stage_selection<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>, ClientError> {
    if paths.is_empty() {
        return Err(ClientError::Validation(NO_FILES.into()));
    }
    let mut staged = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        if !is_image(path) {
            tracing::warn!(path = %path.display(), "skipping non-image file");
            continue;
        }
        if !path.is_file() {
            return Err(ClientError::Validation(format!(
                "File not found: {}",
                path.display()
            )));
        }
        staged.push(path.to_path_buf());
    }
    if staged.is_empty() {
        return Err(ClientError::Validation(NO_FILES.into()));
    }
    tracing::debug!(count = staged.len(), "files staged");
    Ok(staged)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_selection_rejected() {
        let none: [PathBuf; 0] = [];
        let err = stage_selection(&none).unwrap_err();
        assert_eq!(err.user_message(REBUILD_FAILED), NO_FILES);
    }

    #[test]
    fn test_stage_filters_to_images() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("asha.JPG");
        let notes = dir.path().join("notes.txt");
        std::fs::write(&photo, b"\xFF\xD8\xFF\xD9").unwrap();
        std::fs::write(&notes, b"hello").unwrap();

        let staged = stage_selection(&[&photo, &notes]).unwrap();
        assert_eq!(staged, vec![photo.clone()]);

        assert!(stage_selection(&[&notes]).is_err());
        assert!(stage_selection(&[dir.path().join("missing.png")]).is_err());
    }

    #[tokio::test]
    async fn test_rebuild_rejected_while_busy() {
        let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        let panel = DatasetPanel::new(api);
        let guard = panel.begin().unwrap();
        assert!(panel.is_busy());
        assert!(matches!(panel.rebuild().await, Err(ClientError::Busy(_))));
        drop(guard);
        assert!(!panel.is_busy());
    }

    #[tokio::test]
    async fn test_busy_cleared_after_failed_rebuild() {
        let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let panel = DatasetPanel::new(api);
        let err = panel.rebuild().await.unwrap_err();
        assert!(!matches!(err, ClientError::Busy(_)));
        assert_eq!(err.user_message(REBUILD_FAILED), REBUILD_FAILED);
        assert!(!panel.is_busy());
    }
}
