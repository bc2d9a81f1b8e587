//! Bitrate ladder planning
//!
//! Picks the renditions to encode from the source resolution. The source is
//! never upscaled.

use crate::error::ProcessingError;
use serde::{Deserialize, Serialize};

/// (height, video bitrate in kbps), highest first.
pub const LADDER: [(u32, u32); 6] = [
    (2160, 10000),
    (1440, 8000),
    (1080, 6000),
    (720, 4000),
    (480, 2000),
    (360, 1000),
];

const MIN_FALLBACK_KBPS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendition {
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
}

impl Rendition {
    pub fn name(&self) -> String {
        format!("{}p", self.height)
    }
}

/// Round to the nearest even integer, never below 2.
fn round_even(value: f64) -> u32 {
    (((value / 2.0).round() as u32) * 2).max(2)
}

fn scaled_width(source_width: u32, source_height: u32, height: u32) -> u32 {
    round_even(source_width as f64 * height as f64 / source_height as f64).min(source_width & !1)
}

/// Plan the renditions for a source of the given display size.
///
/// Rungs at or below the source height are kept, highest first. A source
/// shorter than the lowest rung gets a single rendition at its own height.
/// Encoders need even dimensions, so a side under 2 pixels is rejected.
pub fn plan_ladder(source_width: u32, source_height: u32) -> Result<Vec<Rendition>, ProcessingError> {
    if source_width < 2 || source_height < 2 {
        return Err(ProcessingError::InvalidDimensions {
            width: source_width,
            height: source_height,
        });
    }

    let ladder: Vec<Rendition> = LADDER
        .iter()
        .filter(|(height, _)| *height <= source_height)
        .map(|&(height, bitrate_kbps)| Rendition {
            width: scaled_width(source_width, source_height, height),
            height,
            bitrate_kbps,
        })
        .collect();

    if !ladder.is_empty() {
        return Ok(ladder);
    }

    let (lowest_height, lowest_kbps) = LADDER[LADDER.len() - 1];
    let height = source_height & !1;
    let bitrate_kbps = (lowest_kbps as u64 * height as u64 / lowest_height as u64) as u32;

    Ok(vec![Rendition {
        width: scaled_width(source_width, source_height, height),
        height,
        bitrate_kbps: bitrate_kbps.max(MIN_FALLBACK_KBPS),
    }])
}
