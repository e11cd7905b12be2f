//! Adaptive compression search.
//!
//! Image encoders are not monotonic: re-encoding an already well-optimized
//! JPEG at the same quality can come out slightly larger. For same-format
//! compression the loop here lowers quality, then scale, keeping the
//! smallest attempt seen, and finally falls back to the original bytes so
//! the "compressor" can never enlarge a file.

use crate::error::ConvertError;

/// Maximum refinement attempts past the initial encode.
pub const MAX_REFINEMENTS: u32 = 6;
/// Quality is never lowered past this.
pub const QUALITY_FLOOR: f32 = 0.3;
/// Quality decrement per refinement while above 0.5.
pub const QUALITY_STEP: f32 = 0.15;
/// Scale multiplier per refinement once quality bottoms out.
pub const SCALE_STEP: f32 = 0.85;

/// Outcome of one adaptive search.
pub struct SearchOutcome {
    pub bytes: Vec<u8>,
    /// Total encode invocations, including the initial attempt.
    pub attempts: u32,
    /// True when no attempt beat the original and the input bytes were
    /// returned unchanged.
    pub used_original: bool,
}

/// Run the adaptive quality/scale search.
///
/// `encode` is invoked as `encode(quality, scale)` and produces the encoded
/// bytes for one attempt. A format swap (`same_format == false`) accepts the
/// first attempt unconditionally; same-format compression refines until the
/// result is smaller than `original` or the attempt budget runs out.
pub fn compress_adaptive<F>(
    original: &[u8],
    same_format: bool,
    initial_quality: f32,
    initial_scale: f32,
    mut encode: F,
) -> Result<SearchOutcome, ConvertError>
where
    F: FnMut(f32, f32) -> Result<Vec<u8>, ConvertError>,
{
    let mut quality = initial_quality;
    let mut scale = initial_scale;
    let mut attempts = 1;

    let mut best = encode(quality, scale)?;

    // A single pass suffices for a format swap or an already-shrinking
    // same-format encode.
    if best.len() < original.len() || !same_format {
        return Ok(SearchOutcome {
            bytes: best,
            attempts,
            used_original: false,
        });
    }

    for _ in 0..MAX_REFINEMENTS {
        if quality > 0.5 {
            quality = (quality - QUALITY_STEP).max(QUALITY_FLOOR);
        } else {
            scale *= SCALE_STEP;
        }

        let attempt = encode(quality, scale)?;
        attempts += 1;

        if attempt.len() < best.len() {
            best = attempt;
        } else {
            // Declining further is not guaranteed to help.
            break;
        }
    }

    if best.len() < original.len() {
        Ok(SearchOutcome {
            bytes: best,
            attempts,
            used_original: false,
        })
    } else {
        Ok(SearchOutcome {
            bytes: original.to_vec(),
            attempts,
            used_original: true,
        })
    }
}
