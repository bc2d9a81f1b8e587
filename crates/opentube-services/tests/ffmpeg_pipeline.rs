//! End-to-end uploads through real ffmpeg/ffprobe binaries. Run with
//! `cargo test -p opentube-services -- --ignored` on a host with ffmpeg.

use opentube_core::models::{VideoUpload, Visibility};
use opentube_db::test_helpers::InMemoryCatalog;
use opentube_db::MediaCatalog;
use opentube_processing::{FFmpegToolkit, ToolkitSettings};
use opentube_services::{CdnService, VideoSource, VideoUploadService};
use opentube_storage::{LocalStorage, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn make_source(dir: &Path, seconds: u32) -> PathBuf {
    let path = dir.join("source.mp4");
    let video = format!("testsrc=duration={}:size=640x360:rate=25", seconds);
    let audio = format!("sine=frequency=440:duration={}", seconds);
    let status = tokio::process::Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            video.as_str(),
            "-f",
            "lavfi",
            "-i",
            audio.as_str(),
            "-shortest",
            "-c:v",
            "libx264",
            "-c:a",
            "aac",
        ])
        .arg(&path)
        .status()
        .await
        .expect("ffmpeg must be installed");
    assert!(status.success(), "failed to generate test source");
    path
}

struct Harness {
    dir: TempDir,
    storage: Arc<dyn Storage>,
    catalog: Arc<InMemoryCatalog>,
    uploads: VideoUploadService,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn Storage> =
        Arc::new(LocalStorage::new(dir.path().join("Files")).await.unwrap());
    let catalog = Arc::new(InMemoryCatalog::new());
    let toolkit = Arc::new(FFmpegToolkit::new(ToolkitSettings::default()).unwrap());
    let uploads = VideoUploadService::new(
        storage.clone(),
        catalog.clone(),
        toolkit,
        dir.path().join("tmp"),
    );
    Harness {
        dir,
        storage,
        catalog,
        uploads,
    }
}

fn metadata() -> VideoUpload {
    VideoUpload {
        title: "Test pattern".to_string(),
        description: String::new(),
        visibility: Visibility::Public,
    }
}

#[tokio::test]
#[ignore]
async fn test_upload_produces_dash_package() {
    let h = harness().await;
    let source = make_source(h.dir.path(), 4).await;
    let file = tokio::fs::File::open(&source).await.unwrap();

    let response = h
        .uploads
        .upload(
            Uuid::new_v4(),
            metadata(),
            VideoSource::new(file, "source.mp4"),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(h
        .storage
        .exists(&format!("Videos/{}/manifest.mpd", response.id))
        .await
        .unwrap());
    assert!(h.catalog.find_video(&response.id).await.unwrap().is_some());
    assert!(response.thumbnail_url.is_some());

    let cdn = CdnService::new(h.storage.clone(), h.catalog.clone());
    let manifest = cdn
        .get_video_segment(&response.id, "manifest.mpd", None)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&manifest.data);
    assert!(text.contains("<MPD"));
    assert!(text.contains("height=\"360\""));
}

#[tokio::test]
#[ignore]
async fn test_cancel_kills_encoder_and_cleans_up() {
    let h = harness().await;
    let source = make_source(h.dir.path(), 60).await;
    let file = tokio::fs::File::open(&source).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let err = h
        .uploads
        .upload(
            Uuid::new_v4(),
            metadata(),
            VideoSource::new(file, "source.mp4"),
            None,
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(err.is_canceled());
    assert_eq!(h.catalog.video_count().await, 0);
    let videos = std::fs::read_dir(h.dir.path().join("Files").join("Videos"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(videos, 0);
    let temp = std::fs::read_dir(h.dir.path().join("tmp"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(temp, 0);
}
