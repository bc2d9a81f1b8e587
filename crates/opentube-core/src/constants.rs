/// Length of a generated video identifier.
pub const VIDEO_ID_LENGTH: usize = 11;

/// URL-safe alphabet used for video identifiers (64 symbols).
pub const VIDEO_ID_ALPHABET: &[u8; 64] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-_";

pub const MAX_TITLE_CHARS: u64 = 100;
pub const MAX_DESCRIPTION_CHARS: u64 = 2500;

/// Catalog column width for filenames.
pub const MAX_FILENAME_CHARS: usize = 256;

/// Upload ceiling the transport layer must accept (10 GiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024 * 1024;

pub const IMAGES_DIR: &str = "Images";
pub const VIDEOS_DIR: &str = "Videos";
pub const MANIFEST_FILENAME: &str = "manifest.mpd";

pub const CDN_IMAGE_PREFIX: &str = "/cdn/images";
pub const CDN_VIDEO_PREFIX: &str = "/cdn/videos";

/// Upper bound for a single listing page.
pub const MAX_PAGE_SIZE: i64 = 100;
