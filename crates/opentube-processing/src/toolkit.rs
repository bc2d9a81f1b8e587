//! External media tooling seam
//!
//! The upload pipeline only talks to ffmpeg/ffprobe through this trait so it
//! can run against a scripted implementation in tests.

use crate::error::ProcessingError;
use crate::video::{Rendition, VideoMetadata};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How an encoder run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeOutcome {
    Completed,
    /// The process was killed; the caller owns cleanup of partial output.
    Canceled,
}

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Analyze the source. Fails before anything is written.
    async fn probe(
        &self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<VideoMetadata, ProcessingError>;

    /// Package `input` as DASH into `output_dir` (which must exist), one
    /// representation per rendition.
    async fn transcode(
        &self,
        input: &Path,
        output_dir: &Path,
        ladder: &[Rendition],
        has_audio: bool,
        cancel: &CancellationToken,
    ) -> Result<TranscodeOutcome, ProcessingError>;

    /// Extract the frame at `at` as an image written to `output`.
    async fn snapshot(
        &self,
        input: &Path,
        at: Duration,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodeOutcome, ProcessingError>;
}
