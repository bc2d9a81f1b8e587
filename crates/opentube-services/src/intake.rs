//! Shared checks for caller-supplied files

use bytes::Bytes;
use opentube_core::AppError;
use opentube_processing::{sniff, MediaFamily, Sniffed};

const MAX_EXTENSION_CHARS: usize = 8;
const FALLBACK_IMAGE_EXTENSION: &str = "jpg";

/// An image supplied alongside an upload or edit.
#[derive(Debug, Clone)]
pub struct ThumbnailUpload {
    pub data: Bytes,
    /// Client-side file name; only its extension is used.
    pub filename: String,
}

impl ThumbnailUpload {
    pub fn new(data: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            filename: filename.into(),
        }
    }
}

/// Sniff `data` and require it to belong to `family`.
pub fn require_family(data: &[u8], family: MediaFamily) -> Result<Sniffed, AppError> {
    let sniffed = sniff(data);
    if !sniffed.is(family) {
        let expected = match family {
            MediaFamily::Image => "an image",
            MediaFamily::Video => "a video",
        };
        return Err(AppError::Validation(format!(
            "Unsupported content type {}: expected {}",
            sniffed.mime, expected
        )));
    }
    Ok(sniffed)
}

/// Stored extension for a client file: its own extension when it is short and
/// alphanumeric, else the sniffed type's, else `jpg`.
pub fn stored_extension(client_filename: &str, sniffed: &Sniffed) -> String {
    let declared = client_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_CHARS
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });

    match declared {
        Some(ext) => ext,
        None if sniffed.family().is_some() => sniffed.extension.to_string(),
        None => FALLBACK_IMAGE_EXTENSION.to_string(),
    }
}
