//! OpenTube Core Library
//!
//! Domain models, error types, configuration and constants shared by every
//! OpenTube crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{Config, EncoderSetting, LogFormat};
pub use error::{AppError, ErrorMetadata, ErrorResponse, LogLevel};
pub use models::*;
