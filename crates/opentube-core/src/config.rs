//! Configuration module
//!
//! Settings for the catalog database, the artifact store and the external
//! encoder. Values come from the process environment (after loading `.env`)
//! with defaults for everything except `DATABASE_URL`.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

// Common constants
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const DASH_SEGMENT_SECONDS: u32 = 5;
const AUDIO_BITRATE_KBPS: u32 = 256;
const MAX_CONCURRENT_TRANSCODES: usize = 0;

/// Which encoder family drives the transcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderSetting {
    /// Probe `ffmpeg -encoders` at startup and pick the best available backend
    Auto,
    Vaapi,
    Nvenc,
    Software,
}

impl FromStr for EncoderSetting {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(EncoderSetting::Auto),
            "vaapi" => Ok(EncoderSetting::Vaapi),
            "nvenc" => Ok(EncoderSetting::Nvenc),
            "software" | "cpu" | "libx264" => Ok(EncoderSetting::Software),
            _ => Err(anyhow::anyhow!("Invalid encoder backend: {}", s)),
        }
    }
}

impl Display for EncoderSetting {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            EncoderSetting::Auto => write!(f, "auto"),
            EncoderSetting::Vaapi => write!(f, "vaapi"),
            EncoderSetting::Nvenc => write!(f, "nvenc"),
            EncoderSetting::Software => write!(f, "software"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub log_format: LogFormat,
    // Catalog database
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Artifact store
    pub files_root: PathBuf,
    pub temp_dir: PathBuf,
    // Encoder
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub encoder: EncoderSetting,
    pub vaapi_device: String,
    pub dash_segment_seconds: u32,
    pub audio_bitrate_kbps: u32,
    /// 0 = no limit on simultaneous encodes
    pub max_concurrent_transcodes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let temp_dir = var("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("opentube"));

        let config = Config {
            environment,
            log_format: var("LOG_FORMAT")
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or(LogFormat::Pretty),
            database_url,
            db_max_connections: var("DB_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: var("DB_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            files_root: var("FILES_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./Files")),
            temp_dir,
            ffmpeg_path: var("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: var("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
            encoder: var("ENCODER_BACKEND")
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or(EncoderSetting::Auto),
            vaapi_device: var("VAAPI_DEVICE")
                .unwrap_or_else(|| "/dev/dri/renderD128".to_string()),
            dash_segment_seconds: var("DASH_SEGMENT_SECONDS")
                .map(|s| {
                    s.parse()
                        .map_err(|_| anyhow::anyhow!("DASH_SEGMENT_SECONDS must be a number"))
                })
                .transpose()?
                .unwrap_or(DASH_SEGMENT_SECONDS),
            audio_bitrate_kbps: var("AUDIO_BITRATE_KBPS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(AUDIO_BITRATE_KBPS),
            max_concurrent_transcodes: var("MAX_CONCURRENT_TRANSCODES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_CONCURRENT_TRANSCODES),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.dash_segment_seconds == 0 {
            return Err(anyhow::anyhow!("DASH_SEGMENT_SECONDS must be at least 1"));
        }

        if self.audio_bitrate_kbps == 0 {
            return Err(anyhow::anyhow!("AUDIO_BITRATE_KBPS must be at least 1"));
        }

        if self.files_root.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("FILES_ROOT must not be empty"));
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}
