//! Source analysis with ffprobe

use crate::error::ProcessingError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub has_audio: bool,
}

impl VideoMetadata {
    /// Timestamp the default thumbnail is taken at.
    pub fn midpoint(&self) -> Duration {
        self.duration / 2
    }
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoMetadata, ProcessingError> {
    let probe_data: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| ProcessingError::Probe(format!("Failed to parse ffprobe output: {}", e)))?;

    let streams = probe_data["streams"].as_array().cloned().unwrap_or_default();

    let stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or(ProcessingError::NoVideoStream)?;

    let has_audio = streams
        .iter()
        .any(|s| s["codec_type"].as_str() == Some("audio"));

    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;

    if width == 0 || height == 0 {
        return Err(ProcessingError::InvalidDimensions { width, height });
    }

    let raw_duration = probe_data["format"]["duration"]
        .as_str()
        .or_else(|| stream["duration"].as_str())
        .ok_or_else(|| ProcessingError::InvalidDuration("missing".to_string()))?;

    let seconds = raw_duration
        .parse::<f64>()
        .map_err(|_| ProcessingError::InvalidDuration(raw_duration.to_string()))?;

    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|_| ProcessingError::InvalidDuration(raw_duration.to_string()))?;

    let codec = stream["codec_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();

    Ok(VideoMetadata {
        duration,
        width,
        height,
        codec,
        has_audio,
    })
}

/// Run ffprobe on a local file.
#[tracing::instrument(skip(ffprobe_path, cancel), fields(
    process.executable.name = "ffprobe",
    ffmpeg.operation = "probe"
))]
pub async fn probe_file(
    ffprobe_path: &str,
    video_path: &Path,
    cancel: &CancellationToken,
) -> Result<VideoMetadata, ProcessingError> {
    let start = std::time::Instant::now();

    let output = Command::new(ffprobe_path)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(video_path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    // Dropping the pending future kills the child.
    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProcessingError::Canceled),
        output = output => output.map_err(|source| ProcessingError::Spawn {
            program: ffprobe_path.to_string(),
            source,
        })?,
    };

    if !output.status.success() {
        return Err(ProcessingError::Probe(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let metadata = parse_probe_output(&output.stdout)?;

    tracing::info!(
        duration_ms = start.elapsed().as_millis(),
        video_duration = metadata.duration.as_secs_f64(),
        width = metadata.width,
        height = metadata.height,
        codec = %metadata.codec,
        has_audio = metadata.has_audio,
        "Video probe completed"
    );

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_probe() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}
            ],
            "format": {"duration": "12.500000"}
        }"#;
        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.width, 1920);
        assert_eq!(meta.height, 1080);
        assert_eq!(meta.codec, "h264");
        assert!(meta.has_audio);
        assert_eq!(meta.duration, Duration::from_millis(12_500));
        assert_eq!(meta.midpoint(), Duration::from_millis(6_250));
    }

    #[test]
    fn test_parse_without_audio() {
        let json = br#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 360, "duration": "3.0"}],
            "format": {}
        }"#;
        let meta = parse_probe_output(json).unwrap();
        assert!(!meta.has_audio);
        assert_eq!(meta.duration, Duration::from_secs(3));
    }

    #[test]
    fn test_missing_video_stream() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "1.0"}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(ProcessingError::NoVideoStream)
        ));
    }

    #[test]
    fn test_zero_dimensions() {
        let json = br#"{"streams": [{"codec_type": "video", "width": 0, "height": 0}], "format": {"duration": "1.0"}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(ProcessingError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_unparsable_duration() {
        let json = br#"{"streams": [{"codec_type": "video", "width": 2, "height": 2}], "format": {"duration": "N/A"}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(ProcessingError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_garbage_output() {
        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(ProcessingError::Probe(_))
        ));
    }
}
