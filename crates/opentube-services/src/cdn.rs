//! Access-controlled retrieval of stored media
//!
//! The catalog decides existence and visibility; the store only supplies bytes.
//! Reads never mutate anything.

use bytes::Bytes;
use opentube_core::models::{MediaFile, MediaKind, Page, PageRequest, VideoResponse};
use opentube_core::AppError;
use opentube_db::MediaCatalog;
use opentube_processing::sniff;
use opentube_storage::{layout, Storage, StorageError};
use std::sync::Arc;
use uuid::Uuid;

/// Stored bytes plus the content type to serve them with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaContent {
    pub data: Bytes,
    pub content_type: String,
}

/// Content type of a file inside a DASH package.
pub fn dash_content_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mpd" => "application/dash+xml",
        "m4s" => "video/iso.segment",
        "mp4" | "m4v" => "video/mp4",
        "m4a" => "audio/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[derive(Clone)]
pub struct CdnService {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn MediaCatalog>,
}

impl CdnService {
    pub fn new(storage: Arc<dyn Storage>, catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { storage, catalog }
    }

    /// Look up `filename` as `kind` and check `caller` may read it.
    async fn authorize(
        &self,
        filename: &str,
        kind: MediaKind,
        caller: Option<Uuid>,
    ) -> Result<MediaFile, AppError> {
        let media = self
            .catalog
            .find_media(filename)
            .await?
            .filter(|m| m.kind == kind)
            .ok_or_else(|| AppError::NotFound(format!("{} {} not found", kind, filename)))?;

        if !media.is_accessible_by(caller) {
            return Err(AppError::Forbidden(format!("{} {} is private", kind, filename)));
        }
        Ok(media)
    }

    async fn read(&self, key: &str) -> Result<Bytes, AppError> {
        match self.storage.get(key).await {
            Ok(data) => Ok(data),
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(key = %key, "Catalog entry has no stored file");
                Err(AppError::NotFound(format!("File {} not found", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self), fields(caller = ?caller))]
    pub async fn get_image(
        &self,
        filename: &str,
        caller: Option<Uuid>,
    ) -> Result<MediaContent, AppError> {
        let key = layout::image_key(filename)?;
        self.authorize(filename, MediaKind::Image, caller).await?;

        let data = self.read(&key).await?;
        let content_type = sniff(&data).mime.to_string();
        Ok(MediaContent { data, content_type })
    }

    /// One file of a video's DASH package: the manifest or a segment.
    #[tracing::instrument(skip(self), fields(caller = ?caller))]
    pub async fn get_video_segment(
        &self,
        video_id: &str,
        filename: &str,
        caller: Option<Uuid>,
    ) -> Result<MediaContent, AppError> {
        let key = layout::video_file_key(video_id, filename)?;
        self.authorize(video_id, MediaKind::Video, caller).await?;

        let data = self.read(&key).await?;
        Ok(MediaContent {
            data,
            content_type: dash_content_type(filename).to_string(),
        })
    }

    pub async fn get_video(
        &self,
        video_id: &str,
        caller: Option<Uuid>,
    ) -> Result<VideoResponse, AppError> {
        layout::validate_component(video_id)?;
        let record = self
            .catalog
            .find_video(video_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", video_id)))?;

        if !record.is_accessible_by(caller) {
            return Err(AppError::Forbidden(format!("Video {} is private", video_id)));
        }
        Ok(record.into())
    }

    /// Public videos plus the caller's own private ones, newest first.
    pub async fn list_videos(
        &self,
        owner: Option<Uuid>,
        caller: Option<Uuid>,
        page: i64,
        page_size: i64,
    ) -> Result<Page<VideoResponse>, AppError> {
        let request = PageRequest::new(page, page_size);
        let items = self
            .catalog
            .list_videos(owner, caller, request)
            .await?
            .into_iter()
            .map(VideoResponse::from)
            .collect();

        Ok(Page {
            items,
            page: request.page,
            page_size: request.page_size,
        })
    }
}
