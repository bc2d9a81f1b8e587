//! FFmpegToolkit - DASH packaging and frame extraction.

use crate::error::ProcessingError;
use crate::toolkit::{MediaToolkit, TranscodeOutcome};
use crate::video::encode_task::EncodeTask;
use crate::video::encoder::EncoderBackend;
use crate::video::ladder::Rendition;
use crate::video::probe::{probe_file, VideoMetadata};
use async_trait::async_trait;
use opentube_core::constants::MANIFEST_FILENAME;
use opentube_core::Config;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Keyframe interval shared by every rendition so segments align.
const GOP_FRAMES: u32 = 50;

#[derive(Debug, Clone)]
pub struct ToolkitSettings {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub backend: EncoderBackend,
    pub vaapi_device: String,
    pub segment_seconds: u32,
    pub audio_bitrate_kbps: u32,
}

impl Default for ToolkitSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            backend: EncoderBackend::Software,
            vaapi_device: "/dev/dri/renderD128".to_string(),
            segment_seconds: 5,
            audio_bitrate_kbps: 256,
        }
    }
}

/// Reject tool paths with shell metacharacters.
fn validate_tool_path(path: &str) -> Result<(), ProcessingError> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.is_empty() || path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(ProcessingError::InvalidToolPath(path.to_string()));
    }
    Ok(())
}

/// Build the single ffmpeg invocation producing every rendition and the
/// manifest.
pub fn build_dash_args(
    settings: &ToolkitSettings,
    input: &Path,
    output_dir: &Path,
    ladder: &[Rendition],
    has_audio: bool,
) -> Vec<String> {
    let backend = settings.backend;
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-loglevel", "warning"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(["-progress".to_string(), "pipe:1".to_string(), "-nostats".to_string()]);

    if backend == EncoderBackend::Vaapi {
        args.extend(["-vaapi_device".to_string(), settings.vaapi_device.clone()]);
    }

    args.extend(["-i".to_string(), input.to_string_lossy().to_string()]);

    // [0:v]split=N[v0][v1]...;[v0]scale=...[v0out];...
    let split_outputs: String = (0..ladder.len()).map(|i| format!("[v{}]", i)).collect();
    let upload = if backend == EncoderBackend::Vaapi {
        "format=nv12,hwupload,"
    } else {
        ""
    };
    let mut filter = format!("[0:v]{}split={}{}", upload, ladder.len(), split_outputs);
    for (i, rendition) in ladder.iter().enumerate() {
        filter.push_str(&format!(
            ";[v{}]{}[v{}out]",
            i,
            backend.scale_filter(rendition.width, rendition.height),
            i
        ));
    }
    args.extend(["-filter_complex".to_string(), filter]);

    for (i, rendition) in ladder.iter().enumerate() {
        let kbps = rendition.bitrate_kbps;
        args.extend([
            "-map".to_string(),
            format!("[v{}out]", i),
            format!("-c:v:{}", i),
            backend.codec().to_string(),
            format!("-b:v:{}", i),
            format!("{}k", kbps),
            format!("-maxrate:v:{}", i),
            format!("{}k", kbps),
            format!("-bufsize:v:{}", i),
            format!("{}k", kbps * 2),
        ]);
    }

    args.extend(backend.codec_args().iter().map(|s| s.to_string()));
    args.extend([
        "-g".to_string(),
        GOP_FRAMES.to_string(),
        "-keyint_min".to_string(),
        GOP_FRAMES.to_string(),
        "-sc_threshold".to_string(),
        "0".to_string(),
    ]);

    let adaptation_sets = if has_audio {
        args.extend([
            "-map".to_string(),
            "0:a:0".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", settings.audio_bitrate_kbps),
        ]);
        "id=0,streams=v id=1,streams=a"
    } else {
        "id=0,streams=v"
    };

    args.extend([
        "-f".to_string(),
        "dash".to_string(),
        "-seg_duration".to_string(),
        settings.segment_seconds.to_string(),
        "-use_timeline".to_string(),
        "1".to_string(),
        "-use_template".to_string(),
        "1".to_string(),
        "-adaptation_sets".to_string(),
        adaptation_sets.to_string(),
        output_dir.join(MANIFEST_FILENAME).to_string_lossy().to_string(),
    ]);

    args
}

/// Arguments extracting one frame at `at` into `output`.
pub fn build_snapshot_args(input: &Path, at: Duration, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format!("{:.3}", at.as_secs_f64()),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "2".to_string(),
        "-update".to_string(),
        "1".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

pub struct FFmpegToolkit {
    settings: ToolkitSettings,
}

impl FFmpegToolkit {
    pub fn new(settings: ToolkitSettings) -> Result<Self, ProcessingError> {
        validate_tool_path(&settings.ffmpeg_path)?;
        validate_tool_path(&settings.ffprobe_path)?;
        Ok(Self { settings })
    }

    /// Build from configuration, detecting the encoder backend when set to `auto`.
    pub async fn from_config(config: &Config) -> Result<Self, ProcessingError> {
        validate_tool_path(&config.ffmpeg_path)?;
        let backend =
            EncoderBackend::resolve(config.encoder, &config.ffmpeg_path, &config.vaapi_device)
                .await;

        Self::new(ToolkitSettings {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            backend,
            vaapi_device: config.vaapi_device.clone(),
            segment_seconds: config.dash_segment_seconds,
            audio_bitrate_kbps: config.audio_bitrate_kbps,
        })
    }

    pub fn settings(&self) -> &ToolkitSettings {
        &self.settings
    }
}

#[async_trait]
impl MediaToolkit for FFmpegToolkit {
    async fn probe(
        &self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<VideoMetadata, ProcessingError> {
        probe_file(&self.settings.ffprobe_path, input, cancel).await
    }

    #[tracing::instrument(skip(self, ladder, cancel), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "dash",
        backend = %self.settings.backend,
        renditions = ladder.len()
    ))]
    async fn transcode(
        &self,
        input: &Path,
        output_dir: &Path,
        ladder: &[Rendition],
        has_audio: bool,
        cancel: &CancellationToken,
    ) -> Result<TranscodeOutcome, ProcessingError> {
        let args = build_dash_args(&self.settings, input, output_dir, ladder, has_audio);
        let label = output_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dash".to_string());

        let task = EncodeTask::spawn(&self.settings.ffmpeg_path, &args, label)?;
        task.wait(cancel).await
    }

    #[tracing::instrument(skip(self, cancel), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "snapshot"
    ))]
    async fn snapshot(
        &self,
        input: &Path,
        at: Duration,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodeOutcome, ProcessingError> {
        let args = build_snapshot_args(input, at, output);
        let task = EncodeTask::spawn(&self.settings.ffmpeg_path, &args, "snapshot")?;
        let outcome = task.wait(cancel).await?;

        // A seek past the last frame exits successfully without output.
        if outcome == TranscodeOutcome::Completed && !tokio::fs::try_exists(output).await? {
            return Err(ProcessingError::EmptySnapshot);
        }
        Ok(outcome)
    }
}
