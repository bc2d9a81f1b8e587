//! Video processing module

pub mod encode_task;
pub mod encoder;
pub mod ffmpeg;
pub mod ladder;
pub mod probe;

pub use encode_task::EncodeTask;
pub use encoder::EncoderBackend;
pub use ffmpeg::{FFmpegToolkit, ToolkitSettings};
pub use ladder::{plan_ladder, Rendition};
pub use probe::VideoMetadata;
