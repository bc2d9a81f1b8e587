//! OpenTube Processing Library
//!
//! Content sniffing, bitrate ladder planning and the ffmpeg/ffprobe driven
//! DASH packaging used by the upload pipeline.

pub mod error;
pub mod sniff;
pub mod toolkit;
pub mod video;

pub use error::ProcessingError;
pub use sniff::{sniff, MediaFamily, Sniffed, SNIFF_LEN};
pub use toolkit::{MediaToolkit, TranscodeOutcome};
pub use video::{
    plan_ladder, EncodeTask, EncoderBackend, FFmpegToolkit, Rendition, ToolkitSettings,
    VideoMetadata,
};
