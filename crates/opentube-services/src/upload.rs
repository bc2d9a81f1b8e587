//! Video upload pipeline
//!
//! sniff → allocate ID → copy to temp → analyze → plan ladder → encode →
//! thumbnail → persist. Every step after allocation runs under a
//! [`TranscodeJob`] so a failure or cancellation leaves no artifacts behind.

use bytes::Bytes;
use opentube_core::models::{NewVideo, VideoRecord, VideoResponse, VideoUpload};
use opentube_core::AppError;
use opentube_db::MediaCatalog;
use opentube_processing::sniff::read_prefix;
use opentube_processing::{
    plan_ladder, MediaFamily, MediaToolkit, ProcessingError, Sniffed, TranscodeOutcome,
    VideoMetadata,
};
use opentube_storage::{layout, Storage};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use validator::Validate;

use crate::id_allocator::IdAllocator;
use crate::intake::{require_family, stored_extension, ThumbnailUpload};
use crate::job::TranscodeJob;
use crate::telemetry::log_error;

const SNAPSHOT_EXTENSION: &str = "jpg";

/// The uploaded video stream and the name the client gave it.
pub struct VideoSource<R> {
    pub reader: R,
    pub filename: String,
}

impl<R> VideoSource<R> {
    pub fn new(reader: R, filename: impl Into<String>) -> Self {
        Self {
            reader,
            filename: filename.into(),
        }
    }
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Canceled),
        result = fut => result,
    }
}

pub struct VideoUploadService {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn MediaCatalog>,
    toolkit: Arc<dyn MediaToolkit>,
    ids: IdAllocator,
    temp_dir: PathBuf,
    transcode_permits: Option<Arc<Semaphore>>,
}

impl VideoUploadService {
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog: Arc<dyn MediaCatalog>,
        toolkit: Arc<dyn MediaToolkit>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            catalog,
            toolkit,
            ids: IdAllocator::from_os_rng(),
            temp_dir: temp_dir.into(),
            transcode_permits: None,
        }
    }

    pub fn with_id_allocator(mut self, ids: IdAllocator) -> Self {
        self.ids = ids;
        self
    }

    /// Bound simultaneous encodes. `0` leaves them unbounded.
    pub fn with_max_concurrent_transcodes(mut self, limit: usize) -> Self {
        self.transcode_permits = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    /// Ingest a video and publish it as a DASH package.
    ///
    /// Returns [`AppError::Canceled`] when `cancel` fires before the encode
    /// finishes. Once encoding is done the catalog write runs to completion.
    #[tracing::instrument(
        skip_all,
        fields(owner_id = %owner_id, source = %source.filename, video_id = tracing::field::Empty)
    )]
    pub async fn upload<R>(
        &self,
        owner_id: Uuid,
        metadata: VideoUpload,
        mut source: VideoSource<R>,
        thumbnail: Option<ThumbnailUpload>,
        cancel: &CancellationToken,
    ) -> Result<VideoResponse, AppError>
    where
        R: AsyncRead + Unpin + Send,
    {
        metadata.validate()?;

        let prefix = cancellable(cancel, async {
            read_prefix(&mut source.reader).await.map_err(AppError::from)
        })
        .await?;
        let sniffed = require_family(&prefix, MediaFamily::Video)?;

        let thumbnail = thumbnail
            .map(|t| -> Result<(String, Bytes), AppError> {
                let image = require_family(&t.data, MediaFamily::Image)?;
                Ok((stored_extension(&t.filename, &image), t.data))
            })
            .transpose()?;

        let reservation = self
            .ids
            .allocate(self.storage.as_ref(), self.catalog.as_ref())
            .await?;
        let mut job = TranscodeJob::new(reservation, self.storage.clone());
        tracing::Span::current().record("video_id", job.video_id());

        let result = self
            .process(
                &mut job,
                owner_id,
                metadata,
                prefix,
                &mut source.reader,
                sniffed,
                thumbnail,
                cancel,
            )
            .await;

        match result {
            Ok(record) => {
                job.commit().await;
                tracing::info!(video_id = %record.video.id, "Video upload completed");
                Ok(VideoResponse::from(record))
            }
            Err(e) => {
                log_error(&e, "Video upload did not complete");
                job.abort().await;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn process<R>(
        &self,
        job: &mut TranscodeJob,
        owner_id: Uuid,
        metadata: VideoUpload,
        prefix: Vec<u8>,
        reader: &mut R,
        sniffed: Sniffed,
        thumbnail: Option<(String, Bytes)>,
        cancel: &CancellationToken,
    ) -> Result<VideoRecord, AppError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let video_id = job.video_id().to_string();

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let temp_source = self
            .temp_dir
            .join(format!("{}.{}", video_id, sniffed.extension));
        job.track_temp_file(&temp_source);
        cancellable(cancel, copy_to_temp(&temp_source, &prefix, reader)).await?;

        let source = self.toolkit.probe(&temp_source, cancel).await?;
        let ladder = plan_ladder(source.width, source.height)?;
        tracing::info!(
            video_id = %video_id,
            width = source.width,
            height = source.height,
            duration_ms = source.duration.as_millis() as u64,
            renditions = ladder.len(),
            "Source analyzed"
        );

        let permit = self.acquire_transcode_permit(cancel).await?;

        let output_key = layout::video_dir_key(&video_id)?;
        let output_dir = self.storage.create_dir(&output_key).await?;
        job.track_output_dir(output_key);

        let outcome = self
            .toolkit
            .transcode(&temp_source, &output_dir, &ladder, source.has_audio, cancel)
            .await?;
        drop(permit);
        if outcome == TranscodeOutcome::Canceled {
            return Err(AppError::Canceled);
        }

        let thumbnail_filename = self
            .store_thumbnail(job, &temp_source, &source, thumbnail, cancel)
            .await?;

        self.catalog
            .create_video(NewVideo {
                id: video_id,
                owner_id,
                title: metadata.title,
                description: metadata.description,
                visibility: metadata.visibility,
                thumbnail_filename,
            })
            .await
    }

    async fn acquire_transcode_permit(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<OwnedSemaphorePermit>, AppError> {
        let Some(permits) = &self.transcode_permits else {
            return Ok(None);
        };
        cancellable(cancel, async {
            permits
                .clone()
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|e| AppError::Internal(format!("Transcode limiter closed: {}", e)))
        })
        .await
    }

    /// Store the supplied thumbnail, or extract one at the midpoint. A failed
    /// extraction leaves the video without a thumbnail.
    async fn store_thumbnail(
        &self,
        job: &mut TranscodeJob,
        temp_source: &Path,
        source: &VideoMetadata,
        supplied: Option<(String, Bytes)>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, AppError> {
        let video_id = job.video_id().to_string();

        let (extension, data) = match supplied {
            Some(supplied) => supplied,
            None => {
                let snapshot_path = self
                    .temp_dir
                    .join(format!("{}.thumbnail.{}", video_id, SNAPSHOT_EXTENSION));
                job.track_temp_file(&snapshot_path);

                match self
                    .toolkit
                    .snapshot(temp_source, source.midpoint(), &snapshot_path, cancel)
                    .await
                {
                    Ok(TranscodeOutcome::Completed) => {}
                    Ok(TranscodeOutcome::Canceled) | Err(ProcessingError::Canceled) => {
                        return Err(AppError::Canceled)
                    }
                    Err(e) => {
                        tracing::warn!(video_id = %video_id, error = %e, "Thumbnail extraction failed");
                        return Ok(None);
                    }
                }

                match tokio::fs::read(&snapshot_path).await {
                    Ok(data) => (SNAPSHOT_EXTENSION.to_string(), Bytes::from(data)),
                    Err(e) => {
                        tracing::warn!(video_id = %video_id, error = %e, "Extracted thumbnail unreadable");
                        return Ok(None);
                    }
                }
            }
        };

        if cancel.is_cancelled() {
            return Err(AppError::Canceled);
        }

        let filename = layout::thumbnail_filename(&video_id, &extension);
        let key = layout::image_key(&filename)?;
        self.storage.put(&key, data).await?;
        job.track_thumbnail(key);

        Ok(Some(filename))
    }
}

async fn copy_to_temp<R>(path: &Path, prefix: &[u8], reader: &mut R) -> Result<u64, AppError>
where
    R: AsyncRead + Unpin + Send,
{
    let start = std::time::Instant::now();
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(prefix).await?;
    let copied = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;

    let size_bytes = prefix.len() as u64 + copied;
    tracing::debug!(
        path = %path.display(),
        size_bytes,
        duration_ms = start.elapsed().as_millis() as u64,
        "Upload copied to temp"
    );
    Ok(size_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        mp4_source, Fixture, ScriptedToolkit, SnapshotScript, Stage, TranscodeScript, JPEG_HEAD,
        PNG_HEAD,
    };
    use opentube_core::models::{MediaKind, Visibility};
    use std::time::Duration;

    fn service(fx: &Fixture, toolkit: Arc<ScriptedToolkit>) -> VideoUploadService {
        VideoUploadService::new(
            fx.storage.clone(),
            fx.catalog.clone(),
            toolkit,
            fx.temp_dir(),
        )
        .with_id_allocator(IdAllocator::seeded(11))
    }

    fn metadata() -> VideoUpload {
        VideoUpload {
            title: "Holiday".to_string(),
            description: "At the beach".to_string(),
            visibility: Visibility::Public,
        }
    }

    fn source(data: Vec<u8>) -> VideoSource<std::io::Cursor<Vec<u8>>> {
        VideoSource::new(std::io::Cursor::new(data), "holiday.mp4")
    }

    /// Cancel `token` as soon as the toolkit enters `stage`.
    fn cancel_at(toolkit: &Arc<ScriptedToolkit>, stage: Stage, token: &CancellationToken) {
        let toolkit = toolkit.clone();
        let token = token.clone();
        tokio::spawn(async move {
            toolkit.started(stage).notified().await;
            token.cancel();
        });
    }

    async fn assert_nothing_left(fx: &Fixture, err: &AppError) {
        let id = IdAllocator::seeded(11).generate();
        assert!(err.is_canceled(), "expected cancellation, got {err:?}");
        assert!(!fx.storage.exists(&format!("Videos/{}", id)).await.unwrap());
        assert!(!fx
            .storage
            .exists(&format!("Images/thumbnail_{}.jpg", id))
            .await
            .unwrap());
        assert_eq!(fx.temp_entries(), 0);
        assert_eq!(fx.catalog.media_count().await, 0);
    }

    #[tokio::test]
    async fn test_upload_persists_video_and_thumbnail() {
        let fx = Fixture::new().await;
        let toolkit = Arc::new(ScriptedToolkit::new(1920, 1080));
        let svc = service(&fx, toolkit.clone());
        let owner = Uuid::new_v4();

        let response = svc
            .upload(owner, metadata(), source(mp4_source()), None, &CancellationToken::new())
            .await
            .unwrap();

        let expected_id = IdAllocator::seeded(11).generate();
        assert_eq!(response.id, expected_id);
        assert_eq!(response.owner_id, owner);
        assert_eq!(
            response.manifest_url,
            format!("/cdn/videos/{}/manifest.mpd", expected_id)
        );

        let thumbnail = format!("thumbnail_{}.jpg", expected_id);
        assert_eq!(
            response.thumbnail_url.as_deref(),
            Some(format!("/cdn/images/{}", thumbnail).as_str())
        );

        let video_row = fx.catalog.find_media(&expected_id).await.unwrap().unwrap();
        assert_eq!(video_row.kind, MediaKind::Video);
        let thumb_row = fx.catalog.find_media(&thumbnail).await.unwrap().unwrap();
        assert_eq!(thumb_row.kind, MediaKind::Image);
        let video = fx.catalog.find_video(&expected_id).await.unwrap().unwrap();
        assert_eq!(video.video.thumbnail_filename.as_deref(), Some(thumbnail.as_str()));

        assert!(fx
            .storage
            .exists(&format!("Videos/{}/manifest.mpd", expected_id))
            .await
            .unwrap());
        assert_eq!(
            fx.storage.get(&format!("Images/{}", thumbnail)).await.unwrap().as_ref(),
            JPEG_HEAD
        );
        assert_eq!(fx.temp_entries(), 0);

        let calls = toolkit.calls.lock().unwrap();
        let heights: Vec<u32> = calls.ladder.iter().map(|r| r.height).collect();
        assert_eq!(heights, vec![1080, 720, 480, 360]);
        assert_eq!(calls.snapshot_at, Some(Duration::from_secs(5)));
        assert_eq!(calls.has_audio, Some(true));
    }

    #[tokio::test]
    async fn test_supplied_thumbnail_keeps_extension() {
        let fx = Fixture::new().await;
        let toolkit = Arc::new(ScriptedToolkit::new(1280, 720));
        let svc = service(&fx, toolkit.clone());

        let response = svc
            .upload(
                Uuid::new_v4(),
                metadata(),
                source(mp4_source()),
                Some(ThumbnailUpload::new(PNG_HEAD.to_vec(), "Cover.PNG")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let thumbnail = format!("thumbnail_{}.png", response.id);
        assert!(response.thumbnail_url.unwrap().ends_with(&thumbnail));
        assert!(fx.catalog.media_exists(&thumbnail).await.unwrap());
        assert!(toolkit.calls.lock().unwrap().snapshot_at.is_none());
    }

    #[tokio::test]
    async fn test_rejects_non_video_before_any_work() {
        let fx = Fixture::new().await;
        let svc = service(&fx, Arc::new(ScriptedToolkit::new(1920, 1080)));

        let err = svc
            .upload(
                Uuid::new_v4(),
                metadata(),
                source(PNG_HEAD.to_vec()),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(fx.temp_entries(), 0);
        assert_eq!(fx.catalog.media_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejects_non_image_thumbnail() {
        let fx = Fixture::new().await;
        let svc = service(&fx, Arc::new(ScriptedToolkit::new(1920, 1080)));

        let err = svc
            .upload(
                Uuid::new_v4(),
                metadata(),
                source(mp4_source()),
                Some(ThumbnailUpload::new(b"not an image".to_vec(), "cover.jpg")),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(fx.video_dirs(), 0);
    }

    #[tokio::test]
    async fn test_rejects_long_title() {
        let fx = Fixture::new().await;
        let svc = service(&fx, Arc::new(ScriptedToolkit::new(1920, 1080)));
        let mut meta = metadata();
        meta.title = "x".repeat(101);

        let err = svc
            .upload(Uuid::new_v4(), meta, source(mp4_source()), None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_analysis_failure_creates_no_output() {
        let fx = Fixture::new().await;
        let svc = service(&fx, Arc::new(ScriptedToolkit::new(1920, 1080).failing_probe()));

        let err = svc
            .upload(Uuid::new_v4(), metadata(), source(mp4_source()), None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Processing(_)));
        assert_eq!(fx.video_dirs(), 0);
        assert_eq!(fx.temp_entries(), 0);
    }

    #[tokio::test]
    async fn test_encoder_failure_removes_output() {
        let fx = Fixture::new().await;
        let svc = service(
            &fx,
            Arc::new(ScriptedToolkit::new(1920, 1080).with_transcode(TranscodeScript::Fail)),
        );

        let err = svc
            .upload(Uuid::new_v4(), metadata(), source(mp4_source()), None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Processing(_)));
        assert_eq!(fx.video_dirs(), 0);
        assert_eq!(fx.temp_entries(), 0);
        assert_eq!(fx.catalog.media_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_encode_leaves_nothing() {
        let fx = Fixture::new().await;
        let toolkit = Arc::new(
            ScriptedToolkit::new(1920, 1080).with_transcode(TranscodeScript::WaitForCancel),
        );
        let svc = service(&fx, toolkit.clone());
        let cancel = CancellationToken::new();
        cancel_at(&toolkit, Stage::Encode, &cancel);

        let err = svc
            .upload(Uuid::new_v4(), metadata(), source(mp4_source()), None, &cancel)
            .await
            .unwrap_err();

        assert_nothing_left(&fx, &err).await;
        assert!(fx
            .catalog
            .find_video(&IdAllocator::seeded(11).generate())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_upload_copy_leaves_nothing() {
        let fx = Fixture::new().await;
        let toolkit = Arc::new(ScriptedToolkit::new(1920, 1080));
        let svc = service(&fx, toolkit.clone());
        let cancel = CancellationToken::new();

        // The client sends the first part of the file and then stalls.
        let (mut client, reader) = tokio::io::duplex(64 * 1024);
        client.write_all(&mp4_source()).await.unwrap();

        let temp_dir = fx.temp_dir();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            loop {
                let copying = std::fs::read_dir(&temp_dir)
                    .map(|entries| entries.count() > 0)
                    .unwrap_or(false);
                if copying {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            trigger.cancel();
        });

        let err = svc
            .upload(
                Uuid::new_v4(),
                metadata(),
                VideoSource::new(reader, "holiday.mp4"),
                None,
                &cancel,
            )
            .await
            .unwrap_err();

        assert_nothing_left(&fx, &err).await;
        assert!(toolkit.calls.lock().unwrap().probed.is_none());
        drop(client);
    }

    #[tokio::test]
    async fn test_cancel_during_analysis_leaves_nothing() {
        let fx = Fixture::new().await;
        let toolkit = Arc::new(ScriptedToolkit::new(1920, 1080).with_probe_waiting_for_cancel());
        let svc = service(&fx, toolkit.clone());
        let cancel = CancellationToken::new();
        cancel_at(&toolkit, Stage::Probe, &cancel);

        let err = svc
            .upload(Uuid::new_v4(), metadata(), source(mp4_source()), None, &cancel)
            .await
            .unwrap_err();

        assert_nothing_left(&fx, &err).await;
        assert_eq!(fx.video_dirs(), 0);
        assert!(toolkit.calls.lock().unwrap().ladder.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_thumbnail_extraction_leaves_nothing() {
        let fx = Fixture::new().await;
        let toolkit = Arc::new(
            ScriptedToolkit::new(1920, 1080).with_snapshot(SnapshotScript::WaitForCancel),
        );
        let svc = service(&fx, toolkit.clone());
        let cancel = CancellationToken::new();
        cancel_at(&toolkit, Stage::Snapshot, &cancel);

        let err = svc
            .upload(Uuid::new_v4(), metadata(), source(mp4_source()), None, &cancel)
            .await
            .unwrap_err();

        assert_nothing_left(&fx, &err).await;
        assert_eq!(fx.video_dirs(), 0);
        assert_eq!(fx.catalog.video_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let fx = Fixture::new().await;
        let svc = service(&fx, Arc::new(ScriptedToolkit::new(1920, 1080)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = svc
            .upload(Uuid::new_v4(), metadata(), source(mp4_source()), None, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_canceled());
        assert_eq!(fx.video_dirs(), 0);
        assert_eq!(fx.temp_entries(), 0);
    }

    #[tokio::test]
    async fn test_thumbnail_failure_records_no_thumbnail() {
        let fx = Fixture::new().await;
        let svc = service(
            &fx,
            Arc::new(ScriptedToolkit::new(640, 360).with_snapshot(SnapshotScript::Fail)),
        );

        let response = svc
            .upload(Uuid::new_v4(), metadata(), source(mp4_source()), None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(response.thumbnail_url.is_none());
        let record = fx.catalog.find_video(&response.id).await.unwrap().unwrap();
        assert!(record.video.thumbnail_filename.is_none());
        assert_eq!(fx.catalog.media_count().await, 1);
        assert_eq!(fx.temp_entries(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_removes_artifacts() {
        let fx = Fixture::new().await;
        fx.catalog.fail_writes(true);
        let svc = service(&fx, Arc::new(ScriptedToolkit::new(1920, 1080)));

        let err = svc
            .upload(Uuid::new_v4(), metadata(), source(mp4_source()), None, &CancellationToken::new())
            .await
            .unwrap_err();

        let id = IdAllocator::seeded(11).generate();
        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(fx.video_dirs(), 0);
        assert!(!fx
            .storage
            .exists(&format!("Images/thumbnail_{}.jpg", id))
            .await
            .unwrap());
        assert_eq!(fx.temp_entries(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_limit_still_completes() {
        let fx = Fixture::new().await;
        let svc = service(&fx, Arc::new(ScriptedToolkit::new(1920, 1080)))
            .with_max_concurrent_transcodes(1);

        for _ in 0..2 {
            svc.upload(Uuid::new_v4(), metadata(), source(mp4_source()), None, &CancellationToken::new())
                .await
                .unwrap();
        }
        assert_eq!(fx.catalog.video_count().await, 2);
    }
}
