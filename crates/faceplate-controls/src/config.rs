//! Detector thresholds and the single-knob sensitivity mapping.

use serde::{Deserialize, Serialize};

/// Smallest working resolution the preprocessor will downscale to.
pub const MIN_WORKING_SIDE: u32 = 16;

/// Thresholds for one detection run.
///
/// Lengths are in source-image pixels unless noted otherwise. Build one with
/// [`DetectorConfig::from_sensitivity`]; `Default` is sensitivity `0.5`.
/// The detector never mutates a config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Longer image side at working resolution. Larger images are box-downscaled.
    pub downscale_max: u32,
    /// Edge-energy quantile used as the interest-mask cutoff.
    ///
    /// The mask keeps the top `1 - keep_top_fraction` of edge energy.
    pub keep_top_fraction: f32,
    /// Smallest diameter accepted as a knob.
    pub knob_min_diameter: f32,
    /// Largest diameter accepted as a knob or circle candidate.
    pub knob_max_diameter: f32,
    /// Smallest diameter accepted as a light.
    pub led_min_diameter: f32,
    /// Largest diameter a round blob may have and still become a light.
    pub led_max_diameter: f32,
    /// Blobs with roundness above `1 - roundness_tolerance` count as round.
    pub roundness_tolerance: f32,
    /// Minimum core/surround luma contrast (0..1) for knobs and lights.
    pub round_contrast_floor: f32,
    /// Minimum contrast for buttons and switches, which may sit flush with the panel.
    pub flush_contrast_floor: f32,
    /// Strip padding around each band, as a fraction of the band height.
    pub band_pad_frac: f32,
    /// Center-vote peaks below this fraction of the strip maximum are ignored.
    pub vote_threshold_fraction: f32,
    /// Minimum inner/outer luma contrast (0..1) of a circle candidate.
    pub contrast_floor: f32,
    /// Base rim coverage required by the radial edge check.
    pub cov_base: f32,
    /// Base gradient alignment required by the radial edge check.
    pub ali_base: f32,
    /// How far below the radial thresholds a near-miss may fall and still be
    /// held as a rescue candidate.
    pub rescue_margin: f32,
    /// Expected knobs per band: `base + per_1000px * width / 1000`.
    pub want_per_band_base: f32,
    pub want_per_band_per_1000px: f32,
    /// Largest x nudge when snapping knobs onto the shared column grid.
    pub max_grid_snap_shift_px: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from_sensitivity(0.5)
    }
}

#[inline]
fn lerp(strict: f32, loose: f32, s: f32) -> f32 {
    strict + (loose - strict) * s
}

/// Interpolation that moves slowly near one end (`gamma > 1`) or quickly
/// (`gamma < 1`).
#[inline]
fn lerp_pow(strict: f32, loose: f32, s: f32, gamma: f32) -> f32 {
    strict + (loose - strict) * s.powf(gamma)
}

impl DetectorConfig {
    /// Map a sensitivity in `[0, 1]` to a full configuration.
    ///
    /// `0.0` is conservative (fewer, stronger detections), `1.0` permissive.
    /// Out-of-range values are clamped; NaN maps to `0.5`.
    pub fn from_sensitivity(sensitivity: f32) -> Self {
        let s = if sensitivity.is_nan() {
            0.5
        } else {
            sensitivity.clamp(0.0, 1.0)
        };
        Self {
            downscale_max: 1280,
            keep_top_fraction: lerp(0.93, 0.82, s),
            knob_min_diameter: lerp(28.0, 16.0, s),
            knob_max_diameter: lerp(160.0, 280.0, s),
            led_min_diameter: lerp(7.0, 4.0, s),
            led_max_diameter: lerp(20.0, 26.0, s),
            roundness_tolerance: lerp(0.10, 0.17, s),
            round_contrast_floor: lerp(0.14, 0.05, s),
            flush_contrast_floor: lerp(0.07, 0.025, s),
            band_pad_frac: lerp(0.20, 0.45, s),
            vote_threshold_fraction: lerp_pow(0.50, 0.18, s, 0.7),
            contrast_floor: lerp(0.12, 0.04, s),
            cov_base: lerp(0.62, 0.44, s),
            ali_base: lerp(0.84, 0.70, s),
            rescue_margin: lerp(0.08, 0.22, s),
            want_per_band_base: lerp_pow(1.0, 4.0, s, 1.5),
            want_per_band_per_1000px: lerp(2.0, 8.0, s),
            max_grid_snap_shift_px: lerp(4.0, 10.0, s),
        }
    }

    /// Working-resolution cap actually used by the preprocessor.
    pub fn working_side(&self) -> u32 {
        self.downscale_max.max(MIN_WORKING_SIDE)
    }

    /// Expected number of knobs in one band of a `width`-pixel image.
    pub fn expected_per_band(&self, width: u32) -> usize {
        let want = self.want_per_band_base + self.want_per_band_per_1000px * width as f32 / 1000.0;
        if want.is_finite() && want > 0.0 {
            want.round() as usize
        } else {
            0
        }
    }
}
