//! Rim verification by gradient agreement, plus light and printed-glyph
//! signatures.

use faceplate_core::LumaImage;
use nalgebra::Point2;
use serde::Serialize;

use crate::config::DetectorConfig;
use crate::preprocess::{EdgeMap, WorkingImage};
use crate::sampling::{RingSampler, UnitCircle};

/// Rim samples per candidate.
pub const RIM_SAMPLES: usize = 72;
/// A rim sample agrees when `|cos|` between gradient and radial direction
/// exceeds this.
const AGREEMENT_COS: f32 = 0.55;
/// Radial search half-width around the nominal rim, working pixels.
const RIM_SEARCH: i32 = 2;
const MIN_EDGE_FLOOR: f32 = 0.015;
const EDGE_FLOOR_OF_REFERENCE: f32 = 0.12;
const MAX_THRESHOLD: f32 = 0.95;

/// Diameter tiers (source pixels) and the coverage/alignment penalty each
/// adds. Penalties accumulate: a 30 px circle pays the 60, 48 and 36 tiers.
const SIZE_TIERS: [(f32, f32, f32); 4] = [
    (60.0, 0.04, 0.02),
    (48.0, 0.04, 0.02),
    (36.0, 0.05, 0.03),
    (24.0, 0.06, 0.03),
];

/// Glyph check only applies up to this diameter (source pixels).
const GLYPH_MAX_DIAMETER: f32 = 68.0;
const GLYPH_RIM_MARGIN: f32 = 0.02;
const GLYPH_BALANCE: f32 = 0.03;

const LED_MIN_CHANNEL: f32 = 0.38;
const LED_MIN_SPREAD: f32 = 0.10;
const LED_MIN_CORE_GAIN: f32 = 0.06;
/// Surround slices checked for a lit core. Every slice has to stay darker than
/// the core, so a patch on the inside edge of a larger bright disk fails.
const LED_RING_SECTORS: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RadialScore {
    /// Fraction of rim samples with a strong, radially agreeing gradient.
    pub coverage: f32,
    /// Mean `|cos|` over the covering samples.
    pub alignment: f32,
}

impl RadialScore {
    /// Single figure used for ranking and confidence.
    pub fn combined(&self) -> f32 {
        0.5 * (self.coverage + self.alignment)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadialThresholds {
    pub coverage: f32,
    pub alignment: f32,
}

impl RadialThresholds {
    /// Size-tiered thresholds for a circle of `diameter` source pixels.
    pub fn for_diameter(diameter: f32, cfg: &DetectorConfig) -> Self {
        let mut coverage = cfg.cov_base;
        let mut alignment = cfg.ali_base;
        for &(limit, cov, ali) in &SIZE_TIERS {
            if diameter < limit {
                coverage += cov;
                alignment += ali;
            }
        }
        Self {
            coverage: coverage.min(MAX_THRESHOLD),
            alignment: alignment.min(MAX_THRESHOLD),
        }
    }

    pub fn passes(&self, score: &RadialScore) -> bool {
        score.coverage >= self.coverage && score.alignment >= self.alignment
    }

    /// Below the thresholds, but by no more than `margin` on either axis.
    pub fn near_miss(&self, score: &RadialScore, margin: f32) -> bool {
        !self.passes(score)
            && score.coverage >= self.coverage - margin
            && score.alignment >= self.alignment - margin
    }
}

/// Score how well the edge field supports a rim of radius `r` around `c`
/// (working coordinates).
pub fn radial_edge_score(edges: &EdgeMap, rim: &UnitCircle, c: Point2<f32>, r: f32) -> RadialScore {
    if !(r > 0.0) || rim.is_empty() {
        return RadialScore::default();
    }
    let floor = MIN_EDGE_FLOOR.max(EDGE_FLOOR_OF_REFERENCE * edges.reference);
    let mut covering = 0usize;
    let mut agreement = 0.0f32;
    for &(ux, uy) in rim.dirs() {
        // Strongest response across the rim band.
        let mut best = (0.0f32, 0.0f32, 0.0f32);
        for dr in -RIM_SEARCH..=RIM_SEARCH {
            let rr = r + dr as f32;
            if rr <= 0.0 {
                continue;
            }
            let (x, y) = (c.x + rr * ux, c.y + rr * uy);
            let m = edges.magnitude.sample_bilinear(x, y);
            if m > best.0 {
                best = (m, x, y);
            }
        }
        let (m, x, y) = best;
        if m < floor {
            continue;
        }
        let (gx, gy) = edges.gradient_at(x, y);
        let norm = (gx * gx + gy * gy).sqrt();
        if norm <= f32::EPSILON {
            continue;
        }
        let cos = ((gx * ux + gy * uy) / norm).abs();
        if cos > AGREEMENT_COS {
            covering += 1;
            agreement += cos;
        }
    }
    RadialScore {
        coverage: covering as f32 / rim.len() as f32,
        alignment: if covering > 0 {
            agreement / covering as f32
        } else {
            0.0
        },
    }
}

/// Why a circle reads as a light.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedSignature {
    /// Bright and chromatic; any size.
    Colored,
    /// Small, with a core brighter than every side of its surround.
    LitCore,
}

/// Light signature of a circle with working radius `r` and source diameter
/// `diameter`.
pub fn led_signature(
    image: &WorkingImage,
    sampler: &RingSampler,
    c: Point2<f32>,
    r: f32,
    diameter: f32,
    cfg: &DetectorConfig,
) -> Option<LedSignature> {
    if !(r > 0.0) {
        return None;
    }
    let [red, green, blue] = sampler.annulus_rgb(image, c, 0.2 * r, 0.6 * r);
    let hi = red.max(green).max(blue);
    let lo = red.min(green).min(blue);
    if hi >= LED_MIN_CHANNEL && hi - lo >= LED_MIN_SPREAD {
        return Some(LedSignature::Colored);
    }
    if diameter <= cfg.led_max_diameter {
        let core = sampler.disk_mean(&image.luma, c, 0.45 * r);
        let sectors =
            sampler.annulus_sector_means(&image.luma, c, 1.3 * r, 1.7 * r, LED_RING_SECTORS);
        let brightest = sectors.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let ring = sectors.iter().sum::<f32>() / sectors.len().max(1) as f32;
        if core - ring >= LED_MIN_CORE_GAIN && core - brightest >= 0.5 * LED_MIN_CORE_GAIN {
            return Some(LedSignature::LitCore);
        }
    }
    None
}

/// Printed ring or tick mark: a bright rim over a panel that reads the same
/// inside and outside.
pub fn is_printed_glyph(
    luma: &LumaImage,
    sampler: &RingSampler,
    c: Point2<f32>,
    r: f32,
    diameter: f32,
) -> bool {
    if diameter > GLYPH_MAX_DIAMETER || !(r > 0.0) {
        return false;
    }
    let inner = sampler.disk_mean(luma, c, 0.5 * r);
    let rim = sampler.annulus_mean(luma, c, 0.85 * r, 1.15 * r);
    let outer = sampler.annulus_mean(luma, c, 1.35 * r, 1.7 * r);
    rim > inner + GLYPH_RIM_MARGIN
        && rim > outer + GLYPH_RIM_MARGIN
        && (inner - outer).abs() <= GLYPH_BALANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::{dist, preprocessed, Rgb};

    #[test]
    fn tiers_make_small_circles_stricter() {
        let cfg = DetectorConfig::default();
        let big = RadialThresholds::for_diameter(80.0, &cfg);
        let mid = RadialThresholds::for_diameter(40.0, &cfg);
        let tiny = RadialThresholds::for_diameter(12.0, &cfg);
        assert_eq!(big.coverage, cfg.cov_base);
        assert!((mid.coverage - (cfg.cov_base + 0.08)).abs() < 1e-6);
        assert!(tiny.coverage > mid.coverage && tiny.alignment > mid.alignment);
        assert!(tiny.coverage <= MAX_THRESHOLD);
    }

    #[test]
    fn near_miss_requires_both_axes_within_margin() {
        let t = RadialThresholds {
            coverage: 0.6,
            alignment: 0.8,
        };
        let s = RadialScore {
            coverage: 0.5,
            alignment: 0.9,
        };
        assert!(!t.passes(&s));
        assert!(t.near_miss(&s, 0.15));
        assert!(!t.near_miss(&s, 0.05));
    }

    #[test]
    fn solid_disk_rim_is_fully_covered() {
        let pre = preprocessed(100, 100, |x, y| {
            let d = ((x as f32 - 50.0).powi(2) + (y as f32 - 50.0).powi(2)).sqrt();
            if d <= 20.0 {
                Rgb::WHITE
            } else {
                Rgb::BLACK
            }
        });
        let rim = UnitCircle::new(RIM_SAMPLES);
        let s = radial_edge_score(&pre.edges, &rim, Point2::new(50.0, 50.0), 20.0);
        assert!(s.coverage > 0.95, "{s:?}");
        assert!(s.alignment > 0.9, "{s:?}");
        let off = radial_edge_score(&pre.edges, &rim, Point2::new(50.0, 50.0), 32.0);
        assert!(off.coverage < 0.1, "{off:?}");
    }

    #[test]
    fn green_disk_is_a_colored_light() {
        let pre = preprocessed(60, 60, |x, y| {
            let d = ((x as f32 - 30.0).powi(2) + (y as f32 - 30.0).powi(2)).sqrt();
            if d <= 10.0 {
                Rgb(0.1, 0.95, 0.2)
            } else {
                Rgb::gray(0.15)
            }
        });
        let cfg = DetectorConfig::default();
        let sampler = RingSampler::default();
        let sig = led_signature(&pre.image, &sampler, Point2::new(30.0, 30.0), 10.0, 20.0, &cfg);
        assert_eq!(sig, Some(LedSignature::Colored));
    }

    #[test]
    fn small_bright_gray_dot_has_a_lit_core() {
        let pre = preprocessed(40, 40, |x, y| {
            let d = ((x as f32 - 20.0).powi(2) + (y as f32 - 20.0).powi(2)).sqrt();
            Rgb::gray(if d <= 5.0 { 0.9 } else { 0.3 })
        });
        let cfg = DetectorConfig::default();
        let sampler = RingSampler::default();
        let c = Point2::new(20.0, 20.0);
        assert_eq!(
            led_signature(&pre.image, &sampler, c, 5.0, 10.0, &cfg),
            Some(LedSignature::LitCore)
        );
        // Same dot, but measured as a large circle: no size-free signature.
        assert_eq!(led_signature(&pre.image, &sampler, c, 5.0, 60.0, &cfg), None);
    }

    #[test]
    fn inner_edge_of_a_large_disk_is_not_a_lit_core() {
        let pre = preprocessed(80, 80, |x, y| {
            Rgb::gray(if dist(x, y, 40.0, 40.0) <= 20.0 { 1.0 } else { 0.0 })
        });
        let cfg = DetectorConfig::default();
        let sampler = RingSampler::default();
        for c in [Point2::new(45.0, 55.0), Point2::new(35.0, 25.0), Point2::new(55.0, 45.0)] {
            let core = sampler.disk_mean(&pre.image.luma, c, 2.25);
            let ring = sampler.annulus_mean(&pre.image.luma, c, 6.5, 8.5);
            assert!(core - ring >= LED_MIN_CORE_GAIN, "mean test alone would accept {c:?}");
            assert_eq!(led_signature(&pre.image, &sampler, c, 5.0, 10.0, &cfg), None, "{c:?}");
        }
    }

    #[test]
    fn printed_ring_is_a_glyph_but_a_disk_is_not() {
        let ring = preprocessed(40, 40, |x, y| {
            let d = ((x as f32 - 20.0).powi(2) + (y as f32 - 20.0).powi(2)).sqrt();
            Rgb::gray(if (5.5..=8.0).contains(&d) { 0.95 } else { 0.5 })
        });
        let sampler = RingSampler::default();
        let c = Point2::new(20.0, 20.0);
        assert!(is_printed_glyph(&ring.image.luma, &sampler, c, 6.75, 13.5));

        let disk = preprocessed(40, 40, |x, y| {
            let d = ((x as f32 - 20.0).powi(2) + (y as f32 - 20.0).powi(2)).sqrt();
            Rgb::gray(if d <= 8.0 { 0.95 } else { 0.5 })
        });
        assert!(!is_printed_glyph(&disk.image.luma, &sampler, c, 8.0, 16.0));
        // Too large to be a printed mark.
        assert!(!is_printed_glyph(&ring.image.luma, &sampler, c, 6.75, 90.0));
    }
}
