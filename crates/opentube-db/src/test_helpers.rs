//! In-memory catalog for tests
//!
//! Mirrors the Postgres semantics the services rely on: filenames are unique
//! across kinds, deleting a video's media row removes the video row, and video
//! creation is all-or-nothing.

use async_trait::async_trait;
use chrono::Utc;
use opentube_core::models::{
    MediaFile, MediaKind, NewVideo, PageRequest, Video, VideoRecord, Visibility,
};
use opentube_core::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::catalog::{MediaCatalog, VideoUpdate};

#[derive(Default)]
struct State {
    media: HashMap<String, MediaFile>,
    videos: HashMap<String, Video>,
}

#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<Mutex<State>>,
    fail_writes: Arc<AtomicBool>,
}

fn write_failure() -> AppError {
    AppError::Persistence(sqlx::Error::PoolClosed)
}

fn duplicate(filename: &str) -> AppError {
    AppError::Persistence(sqlx::Error::Protocol(format!(
        "duplicate key value violates unique constraint: {}",
        filename
    )))
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a persistence error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn media_count(&self) -> usize {
        self.state.lock().await.media.len()
    }

    pub async fn video_count(&self) -> usize {
        self.state.lock().await.videos.len()
    }

    fn check_writes(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(write_failure());
        }
        Ok(())
    }

    fn record(state: &State, id: &str) -> Option<VideoRecord> {
        let video = state.videos.get(id)?.clone();
        let media = state.media.get(id)?.clone();
        Some(VideoRecord { video, media })
    }
}

#[async_trait]
impl MediaCatalog for InMemoryCatalog {
    async fn find_media(&self, filename: &str) -> Result<Option<MediaFile>, AppError> {
        Ok(self.state.lock().await.media.get(filename).cloned())
    }

    async fn find_video(&self, id: &str) -> Result<Option<VideoRecord>, AppError> {
        let state = self.state.lock().await;
        Ok(Self::record(&state, id))
    }

    async fn list_videos(
        &self,
        owner: Option<Uuid>,
        caller: Option<Uuid>,
        page: PageRequest,
    ) -> Result<Vec<VideoRecord>, AppError> {
        let state = self.state.lock().await;
        let mut records: Vec<VideoRecord> = state
            .videos
            .keys()
            .filter_map(|id| Self::record(&state, id))
            .filter(|r| r.is_accessible_by(caller))
            .filter(|r| owner.map_or(true, |o| r.media.owner_id == o))
            .collect();

        records.sort_by(|a, b| {
            b.video
                .created_at
                .cmp(&a.video.created_at)
                .then_with(|| a.video.id.cmp(&b.video.id))
        });

        Ok(records
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn create_video(&self, video: NewVideo) -> Result<VideoRecord, AppError> {
        self.check_writes()?;
        let mut state = self.state.lock().await;

        if state.media.contains_key(&video.id) {
            return Err(duplicate(&video.id));
        }
        if let Some(thumbnail) = &video.thumbnail_filename {
            if state.media.contains_key(thumbnail) || thumbnail == &video.id {
                return Err(duplicate(thumbnail));
            }
        }

        let now = Utc::now();
        let media = MediaFile {
            filename: video.id.clone(),
            kind: MediaKind::Video,
            owner_id: video.owner_id,
            visibility: video.visibility,
            created_at: now,
        };
        if let Some(thumbnail) = &video.thumbnail_filename {
            state.media.insert(
                thumbnail.clone(),
                MediaFile {
                    filename: thumbnail.clone(),
                    kind: MediaKind::Image,
                    owner_id: video.owner_id,
                    visibility: video.visibility,
                    created_at: now,
                },
            );
        }
        state.media.insert(video.id.clone(), media.clone());

        let row = Video {
            id: video.id,
            title: video.title,
            description: video.description,
            thumbnail_filename: video.thumbnail_filename,
            created_at: now,
            updated_at: now,
        };
        state.videos.insert(row.id.clone(), row.clone());

        Ok(VideoRecord { video: row, media })
    }

    async fn create_media(&self, file: &MediaFile) -> Result<(), AppError> {
        self.check_writes()?;
        let mut state = self.state.lock().await;
        if state.media.contains_key(&file.filename) {
            return Err(duplicate(&file.filename));
        }
        state.media.insert(file.filename.clone(), file.clone());
        Ok(())
    }

    async fn update_video(&self, update: VideoUpdate) -> Result<VideoRecord, AppError> {
        self.check_writes()?;
        let mut state = self.state.lock().await;

        let video = state
            .videos
            .get_mut(&update.id)
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", update.id)))?;

        if let Some(title) = update.title {
            video.title = title;
        }
        if let Some(description) = update.description {
            video.description = description;
        }
        if let Some(thumbnail) = update.thumbnail_filename {
            video.thumbnail_filename = Some(thumbnail);
        }
        video.updated_at = Utc::now();
        let thumbnail = video.thumbnail_filename.clone();

        if let Some(visibility) = update.visibility {
            let targets = std::iter::once(update.id.clone()).chain(thumbnail);
            for filename in targets {
                if let Some(file) = state.media.get_mut(&filename) {
                    file.visibility = visibility;
                }
            }
        }

        Self::record(&state, &update.id)
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", update.id)))
    }

    async fn delete_media(&self, filename: &str) -> Result<bool, AppError> {
        self.check_writes()?;
        let mut state = self.state.lock().await;
        let existed = state.media.remove(filename).is_some();
        state.videos.remove(filename);
        Ok(existed)
    }
}

/// Convenience for seeding image rows in tests.
pub fn image_file(filename: &str, owner_id: Uuid, visibility: Visibility) -> MediaFile {
    MediaFile::new(filename, MediaKind::Image, owner_id, visibility)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_video(id: &str, owner: Uuid, visibility: Visibility) -> NewVideo {
        NewVideo {
            id: id.to_string(),
            owner_id: owner,
            title: format!("title {}", id),
            description: String::new(),
            visibility,
            thumbnail_filename: Some(format!("thumbnail_{}.jpg", id)),
        }
    }

    #[tokio::test]
    async fn test_create_video_inserts_thumbnail_row() {
        let catalog = InMemoryCatalog::new();
        let owner = Uuid::new_v4();

        catalog
            .create_video(new_video("abc", owner, Visibility::Private))
            .await
            .unwrap();

        let thumb = catalog.find_media("thumbnail_abc.jpg").await.unwrap().unwrap();
        assert_eq!(thumb.kind, MediaKind::Image);
        assert_eq!(thumb.visibility, Visibility::Private);
        assert!(catalog.media_exists("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_filenames_unique_across_kinds() {
        let catalog = InMemoryCatalog::new();
        let owner = Uuid::new_v4();
        catalog
            .create_media(&image_file("abc", owner, Visibility::Public))
            .await
            .unwrap();

        let err = catalog
            .create_video(new_video("abc", owner, Visibility::Public))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(catalog.video_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_video() {
        let catalog = InMemoryCatalog::new();
        catalog
            .create_video(new_video("abc", Uuid::new_v4(), Visibility::Public))
            .await
            .unwrap();

        assert!(catalog.delete_media("abc").await.unwrap());
        assert!(catalog.find_video("abc").await.unwrap().is_none());
        assert!(!catalog.delete_media("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_hides_foreign_private_videos() {
        let catalog = InMemoryCatalog::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        catalog
            .create_video(new_video("a1", alice, Visibility::Public))
            .await
            .unwrap();
        catalog
            .create_video(new_video("a2", alice, Visibility::Private))
            .await
            .unwrap();

        let anonymous = catalog
            .list_videos(None, None, PageRequest::new(1, 10))
            .await
            .unwrap();
        assert_eq!(anonymous.len(), 1);

        let own = catalog
            .list_videos(Some(alice), Some(alice), PageRequest::new(1, 10))
            .await
            .unwrap();
        assert_eq!(own.len(), 2);

        let others = catalog
            .list_videos(Some(bob), None, PageRequest::new(1, 10))
            .await
            .unwrap();
        assert!(others.is_empty());
    }
}
