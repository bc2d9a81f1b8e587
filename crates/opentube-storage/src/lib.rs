//! OpenTube Storage Library
//!
//! Artifact store for images and DASH packages.
//!
//! # Key format
//!
//! - **Images**: `Images/{filename}`
//! - **Video packages**: `Videos/{video_id}/` holding `manifest.mpd` and its segments
//!
//! Keys must not contain `..`, backslashes or a leading `/`. Key generation is
//! centralized in the `layout` module.

pub mod layout;
pub mod local;
pub mod traits;

// Re-export commonly used types
pub use local::LocalStorage;
pub use traits::{Storage, StorageError, StorageResult};
