//! Content sniffing
//!
//! Identifies uploads from their leading bytes instead of trusting the
//! client-declared type. Each signature carries a confidence; the highest
//! confidence match wins and ties go to the earlier table entry.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Number of leading bytes inspected.
pub const SNIFF_LEN: usize = 4096;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Coarse family used to gate uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFamily {
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    pub mime: &'static str,
    /// Canonical file extension for the detected type, without the dot.
    pub extension: &'static str,
    pub confidence: u8,
}

impl Sniffed {
    const UNKNOWN: Sniffed = Sniffed {
        mime: OCTET_STREAM,
        extension: "bin",
        confidence: 0,
    };

    pub fn family(&self) -> Option<MediaFamily> {
        if self.mime.starts_with("image/") {
            Some(MediaFamily::Image)
        } else if self.mime.starts_with("video/") {
            Some(MediaFamily::Video)
        } else {
            None
        }
    }

    pub fn is(&self, family: MediaFamily) -> bool {
        self.family() == Some(family)
    }
}

struct Signature {
    mime: &'static str,
    extension: &'static str,
    confidence: u8,
    matches: fn(&[u8]) -> bool,
}

/// Major and compatible brands of an ISO BMFF `ftyp` box.
fn ftyp_brands(data: &[u8]) -> Option<impl Iterator<Item = &[u8]>> {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return None;
    }
    let box_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let end = box_len.clamp(12, data.len());
    let major = std::iter::once(&data[8..12]);
    // Skip the 4-byte minor version after the major brand.
    let compatible = data.get(16..end).unwrap_or(&[]).chunks_exact(4);
    Some(major.chain(compatible))
}

fn has_brand(data: &[u8], brands: &[&[u8; 4]]) -> bool {
    ftyp_brands(data)
        .map(|mut it| it.any(|b| brands.iter().any(|want| b == &want[..])))
        .unwrap_or(false)
}

fn major_brand_starts_with(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= 12 && &data[4..8] == b"ftyp" && data[8..12].starts_with(prefix)
}

fn ebml_doctype(data: &[u8], doctype: &[u8]) -> bool {
    data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3])
        && data[..data.len().min(64)]
            .windows(doctype.len())
            .any(|w| w == doctype)
}

fn riff_form(data: &[u8], form: &[u8; 4]) -> bool {
    data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == form
}

fn mpeg_ts(data: &[u8]) -> bool {
    // Two consecutive 188-byte packets starting with the sync byte.
    data.len() > 188 && data[0] == 0x47 && data[188] == 0x47
}

const SIGNATURES: &[Signature] = &[
    // Images
    Signature {
        mime: "image/png",
        extension: "png",
        confidence: 100,
        matches: |d| d.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
    },
    Signature {
        mime: "image/jpeg",
        extension: "jpg",
        confidence: 95,
        matches: |d| d.starts_with(&[0xFF, 0xD8, 0xFF]),
    },
    Signature {
        mime: "image/gif",
        extension: "gif",
        confidence: 95,
        matches: |d| d.starts_with(b"GIF87a") || d.starts_with(b"GIF89a"),
    },
    Signature {
        mime: "image/webp",
        extension: "webp",
        confidence: 95,
        matches: |d| riff_form(d, b"WEBP"),
    },
    Signature {
        mime: "image/avif",
        extension: "avif",
        confidence: 90,
        matches: |d| has_brand(d, &[b"avif", b"avis"]),
    },
    Signature {
        mime: "image/heic",
        extension: "heic",
        confidence: 90,
        matches: |d| has_brand(d, &[b"heic", b"heix", b"heim", b"heis"]),
    },
    Signature {
        mime: "image/tiff",
        extension: "tiff",
        confidence: 90,
        matches: |d| d.starts_with(b"II*\0") || d.starts_with(b"MM\0*"),
    },
    Signature {
        mime: "image/x-icon",
        extension: "ico",
        confidence: 60,
        matches: |d| d.len() >= 6 && d.starts_with(&[0, 0, 1, 0]) && d[4] != 0,
    },
    Signature {
        mime: "image/bmp",
        extension: "bmp",
        confidence: 50,
        matches: |d| d.len() >= 14 && d.starts_with(b"BM"),
    },
    // Video
    Signature {
        mime: "video/webm",
        extension: "webm",
        confidence: 90,
        matches: |d| ebml_doctype(d, b"webm"),
    },
    Signature {
        mime: "video/x-msvideo",
        extension: "avi",
        confidence: 90,
        matches: |d| riff_form(d, b"AVI "),
    },
    Signature {
        mime: "video/x-flv",
        extension: "flv",
        confidence: 90,
        matches: |d| d.starts_with(&[b'F', b'L', b'V', 0x01]),
    },
    Signature {
        mime: "video/x-ms-asf",
        extension: "wmv",
        confidence: 90,
        matches: |d| d.starts_with(&[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11]),
    },
    Signature {
        mime: "video/quicktime",
        extension: "mov",
        confidence: 85,
        matches: |d| major_brand_starts_with(d, b"qt"),
    },
    Signature {
        mime: "video/3gpp",
        extension: "3gp",
        confidence: 85,
        matches: |d| major_brand_starts_with(d, b"3g"),
    },
    Signature {
        mime: "video/x-m4v",
        extension: "m4v",
        confidence: 85,
        matches: |d| major_brand_starts_with(d, b"M4V"),
    },
    Signature {
        mime: "video/mpeg",
        extension: "mpg",
        confidence: 85,
        matches: |d| d.starts_with(&[0x00, 0x00, 0x01, 0xBA]),
    },
    Signature {
        mime: "video/mp4",
        extension: "mp4",
        confidence: 80,
        matches: |d| d.len() >= 12 && &d[4..8] == b"ftyp",
    },
    Signature {
        mime: "video/x-matroska",
        extension: "mkv",
        confidence: 80,
        matches: |d| d.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]),
    },
    Signature {
        mime: "video/mp2t",
        extension: "ts",
        confidence: 70,
        matches: mpeg_ts,
    },
    Signature {
        mime: "video/ogg",
        extension: "ogv",
        confidence: 60,
        matches: |d| d.starts_with(b"OggS"),
    },
];

/// Identify a buffer by its leading bytes.
pub fn sniff(data: &[u8]) -> Sniffed {
    let head = &data[..data.len().min(SNIFF_LEN)];
    let mut best = Sniffed::UNKNOWN;

    for sig in SIGNATURES {
        if sig.confidence > best.confidence && (sig.matches)(head) {
            best = Sniffed {
                mime: sig.mime,
                extension: sig.extension,
                confidence: sig.confidence,
            };
        }
    }

    best
}

/// Read up to [`SNIFF_LEN`] bytes from the start of a stream. The returned
/// prefix must be written ahead of the remaining stream by the caller.
pub async fn read_prefix<R>(reader: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
