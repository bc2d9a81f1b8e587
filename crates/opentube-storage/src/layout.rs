//! On-disk layout of the artifact store.

use opentube_core::constants::{IMAGES_DIR, MANIFEST_FILENAME, MAX_FILENAME_CHARS, VIDEOS_DIR};

use crate::traits::{StorageError, StorageResult};

/// Reject names that could address anything but a single entry.
pub fn validate_component(name: &str) -> StorageResult<()> {
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StorageError::InvalidKey(format!(
            "Invalid file name: {:?}",
            name
        )));
    }
    if name.chars().count() > MAX_FILENAME_CHARS {
        return Err(StorageError::InvalidKey(format!(
            "File name longer than {} characters",
            MAX_FILENAME_CHARS
        )));
    }
    Ok(())
}

pub fn image_key(filename: &str) -> StorageResult<String> {
    validate_component(filename)?;
    Ok(format!("{}/{}", IMAGES_DIR, filename))
}

pub fn video_dir_key(video_id: &str) -> StorageResult<String> {
    validate_component(video_id)?;
    Ok(format!("{}/{}", VIDEOS_DIR, video_id))
}

pub fn video_file_key(video_id: &str, filename: &str) -> StorageResult<String> {
    validate_component(filename)?;
    Ok(format!("{}/{}", video_dir_key(video_id)?, filename))
}

pub fn manifest_key(video_id: &str) -> StorageResult<String> {
    video_file_key(video_id, MANIFEST_FILENAME)
}

/// Thumbnail name for a video: `thumbnail_{id}.{ext}`.
pub fn thumbnail_filename(video_id: &str, extension: &str) -> String {
    format!("thumbnail_{}.{}", video_id, extension)
}
