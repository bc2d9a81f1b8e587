//! Encoder backend selection

use opentube_core::EncoderSetting;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Encoder family used for the video renditions. Ladder and manifest logic do
/// not depend on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderBackend {
    Vaapi,
    Nvenc,
    Software,
}

impl EncoderBackend {
    pub fn codec(&self) -> &'static str {
        match self {
            EncoderBackend::Vaapi => "h264_vaapi",
            EncoderBackend::Nvenc => "h264_nvenc",
            EncoderBackend::Software => "libx264",
        }
    }

    /// Scale filter for one rendition branch.
    pub fn scale_filter(&self, width: u32, height: u32) -> String {
        match self {
            EncoderBackend::Vaapi => format!("scale_vaapi=w={}:h={}", width, height),
            EncoderBackend::Nvenc | EncoderBackend::Software => {
                format!("scale={}:{}", width, height)
            }
        }
    }

    /// Codec options shared by every rendition.
    pub fn codec_args(&self) -> &'static [&'static str] {
        match self {
            EncoderBackend::Software => &["-preset", "fast", "-profile:v", "main"],
            EncoderBackend::Nvenc => &["-preset", "fast"],
            EncoderBackend::Vaapi => &[],
        }
    }

    /// Pick a backend from `ffmpeg -encoders` output. VAAPI also needs its
    /// render device to be present.
    pub fn from_encoder_list(encoders: &str, vaapi_device_present: bool) -> Self {
        if vaapi_device_present && encoders.contains("h264_vaapi") {
            EncoderBackend::Vaapi
        } else if encoders.contains("h264_nvenc") {
            EncoderBackend::Nvenc
        } else {
            EncoderBackend::Software
        }
    }

    /// Resolve the configured setting, probing ffmpeg when it is `auto`.
    pub async fn resolve(setting: EncoderSetting, ffmpeg_path: &str, vaapi_device: &str) -> Self {
        match setting {
            EncoderSetting::Vaapi => EncoderBackend::Vaapi,
            EncoderSetting::Nvenc => EncoderBackend::Nvenc,
            EncoderSetting::Software => EncoderBackend::Software,
            EncoderSetting::Auto => Self::detect(ffmpeg_path, vaapi_device).await,
        }
    }

    /// Detect available hardware acceleration
    pub async fn detect(ffmpeg_path: &str, vaapi_device: &str) -> Self {
        let output = Command::new(ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;

        let backend = match output {
            Ok(output) if output.status.success() => {
                let encoders = String::from_utf8_lossy(&output.stdout);
                let device_present = Path::new(vaapi_device).exists();
                Self::from_encoder_list(&encoders, device_present)
            }
            Ok(output) => {
                tracing::warn!(status = %output.status, "ffmpeg -encoders failed, using software encoding");
                EncoderBackend::Software
            }
            Err(e) => {
                tracing::warn!(error = %e, ffmpeg = %ffmpeg_path, "Could not run ffmpeg, using software encoding");
                EncoderBackend::Software
            }
        };

        tracing::info!(backend = %backend, "Encoder backend selected");
        backend
    }
}

impl Display for EncoderBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            EncoderBackend::Vaapi => write!(f, "vaapi"),
            EncoderBackend::Nvenc => write!(f, "nvenc"),
            EncoderBackend::Software => write!(f, "software"),
        }
    }
}
