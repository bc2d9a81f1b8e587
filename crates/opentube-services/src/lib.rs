//! OpenTube Services
//!
//! The upload pipeline and the read, edit and delete operations on stored
//! media. Transport (HTTP, auth) lives outside this crate and calls in with
//! an optional caller identity and a cancellation token.

pub mod cdn;
pub mod id_allocator;
pub mod image;
pub mod intake;
pub mod job;
pub mod setup;
pub mod telemetry;
pub mod upload;
pub mod video;

#[cfg(test)]
mod testing;

pub use cdn::{CdnService, MediaContent};
pub use id_allocator::{IdAllocator, IdReservation};
pub use image::ImageService;
pub use intake::ThumbnailUpload;
pub use setup::{setup_services, Services};
pub use telemetry::{init_telemetry, log_error};
pub use upload::{VideoSource, VideoUploadService};
pub use video::VideoService;
