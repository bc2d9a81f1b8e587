//! Owner edits and deletion of published videos

use opentube_core::models::{MediaFile, MediaKind, VideoEdit, VideoRecord, VideoResponse};
use opentube_core::AppError;
use opentube_db::{MediaCatalog, VideoUpdate};
use opentube_processing::MediaFamily;
use opentube_storage::{layout, Storage};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::intake::{require_family, stored_extension, ThumbnailUpload};

#[derive(Clone)]
pub struct VideoService {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn MediaCatalog>,
}

impl VideoService {
    pub fn new(storage: Arc<dyn Storage>, catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { storage, catalog }
    }

    async fn owned_video(&self, video_id: &str, caller: Uuid) -> Result<VideoRecord, AppError> {
        layout::validate_component(video_id)?;
        let record = self
            .catalog
            .find_video(video_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", video_id)))?;

        if !record.media.is_owned_by(caller) {
            return Err(AppError::Forbidden(format!(
                "Only the owner may modify video {}",
                video_id
            )));
        }
        Ok(record)
    }

    /// Apply an owner edit. A new thumbnail with the same derived name as the
    /// current one is overwritten in place; a differently named one replaces
    /// the old file and row after the video points at it.
    #[tracing::instrument(skip(self, edit, thumbnail), fields(video_id = %video_id))]
    pub async fn edit(
        &self,
        video_id: &str,
        caller: Uuid,
        edit: VideoEdit,
        thumbnail: Option<ThumbnailUpload>,
    ) -> Result<VideoResponse, AppError> {
        edit.validate()?;
        let thumbnail = thumbnail
            .map(|t| -> Result<(String, ThumbnailUpload), AppError> {
                let image = require_family(&t.data, MediaFamily::Image)?;
                Ok((stored_extension(&t.filename, &image), t))
            })
            .transpose()?;

        let current = self.owned_video(video_id, caller).await?;
        let old_thumbnail = current.video.thumbnail_filename.clone();
        let visibility = edit.visibility.unwrap_or(current.media.visibility);

        let mut update = VideoUpdate {
            id: video_id.to_string(),
            title: edit.title,
            description: edit.description,
            visibility: edit.visibility,
            thumbnail_filename: None,
        };

        let Some((extension, upload)) = thumbnail else {
            return Ok(self.catalog.update_video(update).await?.into());
        };

        let new_name = layout::thumbnail_filename(video_id, &extension);
        let new_key = layout::image_key(&new_name)?;

        if old_thumbnail.as_deref() == Some(new_name.as_str()) {
            self.storage.put(&new_key, upload.data).await?;
            tracing::info!(thumbnail = %new_name, "Thumbnail overwritten in place");
            return Ok(self.catalog.update_video(update).await?.into());
        }

        self.storage.put(&new_key, upload.data).await?;
        let row = MediaFile::new(new_name.clone(), MediaKind::Image, caller, visibility);
        if let Err(e) = self.catalog.create_media(&row).await {
            self.discard_file(&new_key).await;
            return Err(e);
        }

        update.thumbnail_filename = Some(new_name.clone());
        let record = match self.catalog.update_video(update).await {
            Ok(record) => record,
            Err(e) => {
                self.discard_thumbnail(&new_name).await;
                return Err(e);
            }
        };

        if let Some(old) = old_thumbnail {
            self.discard_thumbnail(&old).await;
        }
        tracing::info!(thumbnail = %new_name, "Thumbnail replaced");

        Ok(record.into())
    }

    /// Remove the DASH package, the video row and its thumbnail.
    #[tracing::instrument(skip(self), fields(video_id = %video_id))]
    pub async fn delete(&self, video_id: &str, caller: Uuid) -> Result<(), AppError> {
        let record = self.owned_video(video_id, caller).await?;

        let dir_key = layout::video_dir_key(video_id)?;
        if let Err(e) = self.storage.remove_dir(&dir_key).await {
            tracing::warn!(error = %e, key = %dir_key, "Failed to remove video directory");
        }

        self.catalog.delete_media(video_id).await?;

        if let Some(thumbnail) = record.video.thumbnail_filename {
            self.discard_thumbnail(&thumbnail).await;
        }

        tracing::info!("Video deleted");
        Ok(())
    }

    /// Best-effort removal of a thumbnail row and file.
    async fn discard_thumbnail(&self, filename: &str) {
        if let Err(e) = self.catalog.delete_media(filename).await {
            tracing::warn!(error = %e, thumbnail = %filename, "Failed to delete thumbnail row");
        }
        match layout::image_key(filename) {
            Ok(key) => self.discard_file(&key).await,
            Err(e) => tracing::warn!(error = %e, thumbnail = %filename, "Invalid thumbnail name"),
        }
    }

    async fn discard_file(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            tracing::warn!(error = %e, key = %key, "Failed to delete file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, JPEG_HEAD, PNG_HEAD};
    use opentube_core::models::{NewVideo, Visibility};

    async fn seed(fx: &Fixture, owner: Uuid) {
        fx.catalog
            .create_video(NewVideo {
                id: "vid".to_string(),
                owner_id: owner,
                title: "Clip".to_string(),
                description: "first cut".to_string(),
                visibility: Visibility::Public,
                thumbnail_filename: Some("thumbnail_vid.jpg".to_string()),
            })
            .await
            .unwrap();
        fx.put("Videos/vid/manifest.mpd", b"<MPD/>").await;
        fx.put("Images/thumbnail_vid.jpg", JPEG_HEAD).await;
    }

    fn service(fx: &Fixture) -> VideoService {
        VideoService::new(fx.storage.clone(), fx.catalog.clone())
    }

    fn jpeg_with(marker: u8) -> Vec<u8> {
        let mut data = JPEG_HEAD.to_vec();
        data.push(marker);
        data
    }

    #[tokio::test]
    async fn test_edit_fields_and_visibility() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        seed(&fx, owner).await;

        let response = service(&fx)
            .edit(
                "vid",
                owner,
                VideoEdit {
                    title: Some("Final cut".to_string()),
                    description: None,
                    visibility: Some(Visibility::Private),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.title, "Final cut");
        assert_eq!(response.description, "first cut");
        assert_eq!(response.visibility, Visibility::Private);
        let thumb = fx.catalog.find_media("thumbnail_vid.jpg").await.unwrap().unwrap();
        assert_eq!(thumb.visibility, Visibility::Private);
    }

    #[tokio::test]
    async fn test_edit_same_thumbnail_name_overwrites() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        seed(&fx, owner).await;

        let response = service(&fx)
            .edit(
                "vid",
                owner,
                VideoEdit::default(),
                Some(ThumbnailUpload::new(jpeg_with(7), "new.jpg")),
            )
            .await
            .unwrap();

        assert_eq!(
            response.thumbnail_url.as_deref(),
            Some("/cdn/images/thumbnail_vid.jpg")
        );
        let stored = fx.storage.get("Images/thumbnail_vid.jpg").await.unwrap();
        assert_eq!(stored.as_ref(), jpeg_with(7).as_slice());
        assert!(fx.catalog.media_exists("thumbnail_vid.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_edit_new_thumbnail_name_replaces_old() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        seed(&fx, owner).await;

        let response = service(&fx)
            .edit(
                "vid",
                owner,
                VideoEdit::default(),
                Some(ThumbnailUpload::new(PNG_HEAD.to_vec(), "cover.png")),
            )
            .await
            .unwrap();

        assert_eq!(
            response.thumbnail_url.as_deref(),
            Some("/cdn/images/thumbnail_vid.png")
        );
        assert!(fx.storage.exists("Images/thumbnail_vid.png").await.unwrap());
        assert!(!fx.storage.exists("Images/thumbnail_vid.jpg").await.unwrap());
        assert!(!fx.catalog.media_exists("thumbnail_vid.jpg").await.unwrap());
        assert!(fx.catalog.media_exists("thumbnail_vid.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_edit_requires_owner() {
        let fx = Fixture::new().await;
        seed(&fx, Uuid::new_v4()).await;

        let err = service(&fx)
            .edit("vid", Uuid::new_v4(), VideoEdit::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = service(&fx)
            .edit("missing", Uuid::new_v4(), VideoEdit::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_edit_rejects_non_image_thumbnail() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        seed(&fx, owner).await;

        let err = service(&fx)
            .edit(
                "vid",
                owner,
                VideoEdit::default(),
                Some(ThumbnailUpload::new(b"plain text".to_vec(), "cover.png")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(fx.storage.exists("Images/thumbnail_vid.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let fx = Fixture::new().await;
        let owner = Uuid::new_v4();
        seed(&fx, owner).await;

        service(&fx).delete("vid", owner).await.unwrap();

        assert!(fx.catalog.find_video("vid").await.unwrap().is_none());
        assert_eq!(fx.catalog.media_count().await, 0);
        assert!(!fx.storage.exists("Videos/vid").await.unwrap());
        assert!(!fx.storage.exists("Images/thumbnail_vid.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_requires_owner() {
        let fx = Fixture::new().await;
        seed(&fx, Uuid::new_v4()).await;

        let err = service(&fx).delete("vid", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(fx.storage.exists("Videos/vid/manifest.mpd").await.unwrap());
    }
}
