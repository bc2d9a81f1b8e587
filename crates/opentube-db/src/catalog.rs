use async_trait::async_trait;
use opentube_core::models::{MediaFile, NewVideo, PageRequest, VideoRecord, Visibility};
use opentube_core::AppError;
use uuid::Uuid;

/// Changes applied to a video in one step. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct VideoUpdate {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Applied to the video media row and to its current thumbnail row.
    pub visibility: Option<Visibility>,
    pub thumbnail_filename: Option<String>,
}

/// Catalog of stored media
///
/// The catalog is authoritative: a file without a row is not servable.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    async fn find_media(&self, filename: &str) -> Result<Option<MediaFile>, AppError>;

    async fn media_exists(&self, filename: &str) -> Result<bool, AppError> {
        Ok(self.find_media(filename).await?.is_some())
    }

    async fn find_video(&self, id: &str) -> Result<Option<VideoRecord>, AppError>;

    /// Videos visible to `caller`, newest first, optionally restricted to one owner.
    async fn list_videos(
        &self,
        owner: Option<Uuid>,
        caller: Option<Uuid>,
        page: PageRequest,
    ) -> Result<Vec<VideoRecord>, AppError>;

    /// Insert the video media row, the thumbnail media row (when named) and
    /// the video row atomically.
    async fn create_video(&self, video: NewVideo) -> Result<VideoRecord, AppError>;

    async fn create_media(&self, file: &MediaFile) -> Result<(), AppError>;

    async fn update_video(&self, update: VideoUpdate) -> Result<VideoRecord, AppError>;

    /// Delete a media row; a video row keyed on it goes with it. Returns
    /// whether a row existed.
    async fn delete_media(&self, filename: &str) -> Result<bool, AppError>;
}
