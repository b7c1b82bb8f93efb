//! Validated option structs for the encoder and decoder: every field is
//! checked at construction time rather than trusted after the fact.

use crate::constants::{
    DEFAULT_CHANGE_THRESHOLD, DEFAULT_MEDIAN_CUT_DEPTH, MAX_MEDIAN_CUT_DEPTH, MIN_MEDIAN_CUT_DEPTH,
};
use crate::error::{Error, Result};

/// Playback rate and quantizer tuning for [`crate::encoder::FrameEncoder`].
#[derive(Clone, Copy, Debug)]
pub struct EncoderOptions {
    pub(crate) fps: f32,
    pub(crate) median_cut_depth: u8,
    pub(crate) change_threshold: u16,
}

impl EncoderOptions {
    /// Builds options with the default change threshold (`T=8`).
    ///
    /// `median_cut_depth` is clamped into `6..=8`. Returns
    /// `Error::InvalidInput` if `fps <= 0`.
    pub fn new(fps: f32, median_cut_depth: u8) -> Result<Self> {
        Self::with_change_threshold(fps, median_cut_depth, DEFAULT_CHANGE_THRESHOLD)
    }

    /// As [`EncoderOptions::new`], but also overrides the change-detector
    /// threshold `T` (default 8).
    pub fn with_change_threshold(
        fps: f32,
        median_cut_depth: u8,
        change_threshold: u16,
    ) -> Result<Self> {
        if !(fps > 0.0) {
            return Err(Error::InvalidInput(format!(
                "fps must be positive, got {}",
                fps
            )));
        }
        let median_cut_depth = median_cut_depth.clamp(MIN_MEDIAN_CUT_DEPTH, MAX_MEDIAN_CUT_DEPTH);
        Ok(Self {
            fps,
            median_cut_depth,
            change_threshold,
        })
    }
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            fps: 25.0,
            median_cut_depth: DEFAULT_MEDIAN_CUT_DEPTH,
            change_threshold: DEFAULT_CHANGE_THRESHOLD,
        }
    }
}

/// Decoder tuning. Empty today; kept as a struct (rather than threading no
/// arguments at all) so a future option has somewhere to land without
/// breaking `Decoder::open`'s signature.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecoderOptions {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_fps() {
        assert!(EncoderOptions::new(0.0, 7).is_err());
        assert!(EncoderOptions::new(-1.0, 7).is_err());
    }

    #[test]
    fn clamps_median_cut_depth() {
        let opts = EncoderOptions::new(25.0, 20).unwrap();
        assert_eq!(opts.median_cut_depth, MAX_MEDIAN_CUT_DEPTH);
        let opts = EncoderOptions::new(25.0, 1).unwrap();
        assert_eq!(opts.median_cut_depth, MIN_MEDIAN_CUT_DEPTH);
    }
}
