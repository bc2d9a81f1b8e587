//! Data models for the media pipeline
//!
//! Catalog rows (`MediaFile`, `Video`), request payloads and the read models
//! handed back to callers.

mod media;
mod pagination;
mod video;

pub use media::*;
pub use pagination::*;
pub use video::*;
