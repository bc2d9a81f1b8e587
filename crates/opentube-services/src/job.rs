//! Transcode job guard
//!
//! Tracks everything an upload writes before it is committed to the catalog:
//! the temp source copy, the DASH output directory and the thumbnail. Temp
//! files are always purged; outputs survive only a commit. When the upload
//! future is dropped mid-flight the same cleanup runs synchronously in `Drop`.

use opentube_storage::Storage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::id_allocator::IdReservation;

pub struct TranscodeJob {
    reservation: IdReservation,
    storage: Arc<dyn Storage>,
    temp_files: Vec<PathBuf>,
    output_dir: Option<String>,
    thumbnail: Option<String>,
    finished: bool,
}

impl TranscodeJob {
    pub fn new(reservation: IdReservation, storage: Arc<dyn Storage>) -> Self {
        Self {
            reservation,
            storage,
            temp_files: Vec::new(),
            output_dir: None,
            thumbnail: None,
            finished: false,
        }
    }

    pub fn video_id(&self) -> &str {
        self.reservation.id()
    }

    pub fn track_temp_file(&mut self, path: impl Into<PathBuf>) {
        self.temp_files.push(path.into());
    }

    /// Record the storage key of the output directory once it is created.
    pub fn track_output_dir(&mut self, key: impl Into<String>) {
        self.output_dir = Some(key.into());
    }

    /// Record the storage key of the stored thumbnail.
    pub fn track_thumbnail(&mut self, key: impl Into<String>) {
        self.thumbnail = Some(key.into());
    }

    async fn purge_temp_files(&self) {
        for path in &self.temp_files {
            remove_temp_file(path).await;
        }
    }

    /// Keep the outputs and remove the temp files.
    pub async fn commit(mut self) {
        self.purge_temp_files().await;
        self.finished = true;
        tracing::debug!(video_id = %self.video_id(), "Transcode job committed");
    }

    /// Remove the temp files and every output written so far.
    pub async fn abort(mut self) {
        self.purge_temp_files().await;

        if let Some(key) = &self.output_dir {
            if let Err(e) = self.storage.remove_dir(key).await {
                tracing::warn!(error = %e, key = %key, "Failed to remove partial output");
            }
        }
        if let Some(key) = &self.thumbnail {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!(error = %e, key = %key, "Failed to remove thumbnail");
            }
        }

        self.finished = true;
        tracing::info!(video_id = %self.video_id(), "Transcode job rolled back");
    }
}

async fn remove_temp_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "Failed to remove temp file");
        }
    }
}

impl Drop for TranscodeJob {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        for path in &self.temp_files {
            let _ = std::fs::remove_file(path);
        }
        if let Some(path) = self
            .output_dir
            .as_deref()
            .and_then(|key| self.storage.local_path(key).ok())
        {
            let _ = std::fs::remove_dir_all(path);
        }
        if let Some(path) = self
            .thumbnail
            .as_deref()
            .and_then(|key| self.storage.local_path(key).ok())
        {
            let _ = std::fs::remove_file(path);
        }

        tracing::warn!(
            video_id = %self.reservation.id(),
            "Transcode job dropped before completion, outputs removed"
        );
    }
}
