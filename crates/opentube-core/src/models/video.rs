use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

use super::media::{MediaFile, Visibility};
use crate::constants::{
    CDN_IMAGE_PREFIX, CDN_VIDEO_PREFIX, MANIFEST_FILENAME, MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS,
};

/// Catalog row for a published video. `id` is also the filename of the backing
/// video `MediaFile` and the name of its artifact directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Weak reference to an image `MediaFile`; `None` when no thumbnail exists.
    pub thumbnail_filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A video together with its backing media row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    pub video: Video,
    pub media: MediaFile,
}

impl VideoRecord {
    pub fn is_accessible_by(&self, caller: Option<Uuid>) -> bool {
        self.media.is_accessible_by(caller)
    }
}

/// Insert payload for a freshly transcoded video.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub id: String,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub visibility: Visibility,
    pub thumbnail_filename: Option<String>,
}

/// Caller-supplied metadata accompanying an upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct VideoUpload {
    #[validate(length(max = MAX_TITLE_CHARS, message = "Title must be at most 100 characters"))]
    pub title: String,
    #[validate(length(max = MAX_DESCRIPTION_CHARS, message = "Description must be at most 2500 characters"))]
    pub description: String,
    #[serde(default)]
    pub visibility: Visibility,
}

/// Owner edit of an existing video. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct VideoEdit {
    #[validate(length(max = MAX_TITLE_CHARS, message = "Title must be at most 100 characters"))]
    pub title: Option<String>,
    #[validate(length(max = MAX_DESCRIPTION_CHARS, message = "Description must be at most 2500 characters"))]
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub owner_id: Uuid,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub manifest_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<VideoRecord> for VideoResponse {
    fn from(record: VideoRecord) -> Self {
        let VideoRecord { video, media } = record;
        let thumbnail_url = video
            .thumbnail_filename
            .as_ref()
            .map(|name| format!("{}/{}", CDN_IMAGE_PREFIX, name));
        let manifest_url = format!("{}/{}/{}", CDN_VIDEO_PREFIX, video.id, MANIFEST_FILENAME);

        VideoResponse {
            id: video.id,
            title: video.title,
            description: video.description,
            owner_id: media.owner_id,
            visibility: media.visibility,
            thumbnail_url,
            manifest_url,
            created_at: video.created_at,
            updated_at: video.updated_at,
        }
    }
}
