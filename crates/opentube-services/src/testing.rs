//! Scripted media toolkit and fixtures for pipeline tests

use async_trait::async_trait;
use bytes::Bytes;
use opentube_db::test_helpers::InMemoryCatalog;
use opentube_processing::{MediaToolkit, ProcessingError, Rendition, TranscodeOutcome, VideoMetadata};
use opentube_storage::{LocalStorage, Storage};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Leading bytes of an ISO BMFF (mp4) file.
pub const MP4_HEAD: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00isomiso2";
pub const PNG_HEAD: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
pub const JPEG_HEAD: &[u8] = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00";

pub fn mp4_source() -> Vec<u8> {
    let mut data = MP4_HEAD.to_vec();
    data.extend(std::iter::repeat(0u8).take(10_000));
    data
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeScript {
    Complete,
    Fail,
    /// Block until the job's token fires.
    WaitForCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotScript {
    Write,
    Fail,
    WaitForCancel,
}

/// Toolkit call a test can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probe,
    Encode,
    Snapshot,
}

#[derive(Debug, Default)]
pub struct ToolkitCalls {
    pub ladder: Vec<Rendition>,
    pub has_audio: Option<bool>,
    pub snapshot_at: Option<Duration>,
    pub probed: Option<PathBuf>,
}

pub struct ScriptedToolkit {
    pub metadata: Result<VideoMetadata, String>,
    pub probe_waits_for_cancel: bool,
    pub transcode: TranscodeScript,
    pub snapshot: SnapshotScript,
    pub calls: Mutex<ToolkitCalls>,
    probe_started: Notify,
    encoding_started: Notify,
    snapshot_started: Notify,
}

impl ScriptedToolkit {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            metadata: Ok(VideoMetadata {
                duration: Duration::from_secs(10),
                width,
                height,
                codec: "h264".to_string(),
                has_audio: true,
            }),
            probe_waits_for_cancel: false,
            transcode: TranscodeScript::Complete,
            snapshot: SnapshotScript::Write,
            calls: Mutex::new(ToolkitCalls::default()),
            probe_started: Notify::new(),
            encoding_started: Notify::new(),
            snapshot_started: Notify::new(),
        }
    }

    /// Fires once `stage` is running.
    pub fn started(&self, stage: Stage) -> &Notify {
        match stage {
            Stage::Probe => &self.probe_started,
            Stage::Encode => &self.encoding_started,
            Stage::Snapshot => &self.snapshot_started,
        }
    }

    pub fn with_probe_waiting_for_cancel(mut self) -> Self {
        self.probe_waits_for_cancel = true;
        self
    }

    pub fn with_transcode(mut self, script: TranscodeScript) -> Self {
        self.transcode = script;
        self
    }

    pub fn with_snapshot(mut self, script: SnapshotScript) -> Self {
        self.snapshot = script;
        self
    }

    pub fn failing_probe(mut self) -> Self {
        self.metadata = Err("moov atom not found".to_string());
        self
    }
}

#[async_trait]
impl MediaToolkit for ScriptedToolkit {
    async fn probe(
        &self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<VideoMetadata, ProcessingError> {
        assert!(input.exists(), "probe input must exist");
        self.calls.lock().unwrap().probed = Some(input.to_path_buf());
        self.probe_started.notify_one();
        if self.probe_waits_for_cancel {
            cancel.cancelled().await;
            return Err(ProcessingError::Canceled);
        }
        self.metadata.clone().map_err(ProcessingError::Probe)
    }

    async fn transcode(
        &self,
        input: &Path,
        output_dir: &Path,
        ladder: &[Rendition],
        has_audio: bool,
        cancel: &CancellationToken,
    ) -> Result<TranscodeOutcome, ProcessingError> {
        assert!(input.exists(), "transcode input must exist");
        assert!(output_dir.is_dir(), "output directory must exist");
        {
            let mut calls = self.calls.lock().unwrap();
            calls.ladder = ladder.to_vec();
            calls.has_audio = Some(has_audio);
        }
        std::fs::write(output_dir.join("init-stream0.m4s"), b"partial").unwrap();
        self.encoding_started.notify_one();

        match self.transcode {
            TranscodeScript::Complete => {
                std::fs::write(output_dir.join("manifest.mpd"), b"<MPD/>").unwrap();
                std::fs::write(output_dir.join("chunk-stream0-00001.m4s"), b"segment").unwrap();
                Ok(TranscodeOutcome::Completed)
            }
            TranscodeScript::Fail => Err(ProcessingError::Io(std::io::Error::other("encoder exited"))),
            TranscodeScript::WaitForCancel => {
                cancel.cancelled().await;
                Ok(TranscodeOutcome::Canceled)
            }
        }
    }

    async fn snapshot(
        &self,
        _input: &Path,
        at: Duration,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodeOutcome, ProcessingError> {
        self.calls.lock().unwrap().snapshot_at = Some(at);
        self.snapshot_started.notify_one();
        match self.snapshot {
            SnapshotScript::Write => {
                std::fs::write(output, JPEG_HEAD).unwrap();
                Ok(TranscodeOutcome::Completed)
            }
            SnapshotScript::Fail => Err(ProcessingError::EmptySnapshot),
            SnapshotScript::WaitForCancel => {
                std::fs::write(output, &JPEG_HEAD[..4]).unwrap();
                cancel.cancelled().await;
                Ok(TranscodeOutcome::Canceled)
            }
        }
    }
}

/// Scratch storage root, temp directory and catalog.
pub struct Fixture {
    pub dir: TempDir,
    pub storage: Arc<dyn Storage>,
    pub catalog: Arc<InMemoryCatalog>,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> =
            Arc::new(LocalStorage::new(dir.path().join("Files")).await.unwrap());
        Self {
            dir,
            storage,
            catalog: Arc::new(InMemoryCatalog::new()),
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    pub fn temp_entries(&self) -> usize {
        std::fs::read_dir(self.temp_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn video_dirs(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("Files").join("Videos"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub async fn put(&self, key: &str, data: &'static [u8]) {
        self.storage.put(key, Bytes::from_static(data)).await.unwrap();
    }
}
