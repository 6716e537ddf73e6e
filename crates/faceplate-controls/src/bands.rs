//! Horizontal bands hypothesised to hold one row of controls each.

use faceplate_core::stats::median;
use log::debug;
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::components::Blob;
use crate::preprocess::InterestMask;

/// At most this many bands are ever reported.
pub const MAX_BANDS: usize = 2;

/// Two candidate bands whose gap rows hold less mask than this fraction are
/// one row of controls. Tuned on a handful of panels, not derived; recalibrate
/// against a labelled corpus before relying on it.
const GAP_MERGE_DENSITY: f32 = 0.05;
/// Secondary peaks weaker than this fraction of the strongest are noise.
const MIN_PEAK_FRACTION: f32 = 0.3;
/// Peak separation as a fraction of the interior height.
const MIN_PEAK_SEPARATION: f32 = 0.3;
/// Band half-height as a fraction of the interior height.
const HALF_HEIGHT_FRACTION: f32 = 0.18;
/// A lone peak this close to the interior center (fraction of its height) on a
/// tall interior means the histogram merged two rows.
const CENTER_COLLAPSE_FRACTION: f32 = 0.1;
const COLLAPSE_MIN_INTERIOR_RATIO: f32 = 3.5;

/// A horizontal strip in working-resolution rows, `top..bottom`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Band {
    pub top: f32,
    pub bottom: f32,
}

impl Band {
    #[inline]
    pub fn center(&self) -> f32 {
        0.5 * (self.top + self.bottom)
    }

    #[inline]
    pub fn half_height(&self) -> f32 {
        0.5 * (self.bottom - self.top)
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Whether a feature at row `y` with vertical half-extent `extra` reaches
    /// the band.
    pub fn near(&self, y: f32, extra: f32) -> bool {
        (y - self.center()).abs() <= self.half_height() + extra
    }
}

/// Index of the band whose center is closest to `y`.
pub fn nearest_band(bands: &[Band], y: f32) -> Option<usize> {
    bands
        .iter()
        .enumerate()
        .min_by(|a, b| {
            (a.1.center() - y)
                .abs()
                .total_cmp(&(b.1.center() - y).abs())
        })
        .map(|(i, _)| i)
}

/// Vertical extent of the panel content.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Interior {
    top: f32,
    bottom: f32,
}

impl Interior {
    fn height(&self) -> f32 {
        (self.bottom - self.top).max(1.0)
    }

    fn center(&self) -> f32 {
        0.5 * (self.top + self.bottom)
    }
}

/// Find up to two disjoint bands of controls.
///
/// `min_control_side` is the smallest blob side (working pixels) that counts
/// as a control when measuring typical control height.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(mask, blobs), fields(blobs = blobs.len()))
)]
pub fn detect_bands(mask: &InterestMask, blobs: &[Blob], min_control_side: f32) -> Vec<Band> {
    let Some(interior) = estimate_interior(mask) else {
        debug!("bands: empty mask");
        return Vec::new();
    };
    let rows = mask.height as f32;
    let typical = typical_control_height(mask, blobs, min_control_side, interior);
    let hist = smooth(
        &row_histogram(mask, blobs, min_control_side, interior),
        (typical / 4.0).round().max(2.0) as usize,
    );
    let peaks = pick_peaks(&hist, interior, typical);

    let collapsed = peaks.len() == 1
        && (peaks[0] - interior.center()).abs() <= CENTER_COLLAPSE_FRACTION * interior.height()
        && interior.height() >= COLLAPSE_MIN_INTERIOR_RATIO * typical;

    let mut bands = if peaks.is_empty() || collapsed {
        debug!(
            "bands: quartile fallback ({} peaks, interior {:.0}..{:.0})",
            peaks.len(),
            interior.top,
            interior.bottom
        );
        quartile_bands(interior)
    } else {
        let half = (HALF_HEIGHT_FRACTION * interior.height()).max(0.6 * typical);
        let mut bands: Vec<Band> = peaks
            .iter()
            .map(|&p| Band {
                top: (p - half).max(0.0),
                bottom: (p + half).min(rows),
            })
            .collect();
        if bands.len() == 2 {
            let mid = 0.5 * (peaks[0] + peaks[1]);
            if bands[0].bottom > bands[1].top {
                bands[0].bottom = mid;
                bands[1].top = mid;
            }
            if gap_density(mask, peaks[0], peaks[1]) < GAP_MERGE_DENSITY {
                debug!("bands: sparse gap, merging into one row");
                bands = vec![Band {
                    top: bands[0].top,
                    bottom: bands[1].bottom,
                }];
            }
        }
        bands
    };

    debug!(
        "bands: {} (typical height {:.1}, interior {:.0}..{:.0})",
        bands.len(),
        typical,
        interior.top,
        interior.bottom
    );
    bands.truncate(MAX_BANDS);
    bands
}

/// Median of the per-column first and last mask rows.
fn estimate_interior(mask: &InterestMask) -> Option<Interior> {
    let mut tops = Vec::new();
    let mut bottoms = Vec::new();
    for x in 0..mask.width {
        let mut first = None;
        let mut last = None;
        for y in 0..mask.height {
            if mask.get(x, y) {
                first.get_or_insert(y);
                last = Some(y);
            }
        }
        if let (Some(a), Some(b)) = (first, last) {
            tops.push(a as f32);
            bottoms.push(b as f32 + 1.0);
        }
    }
    let top = median(&tops)?;
    let bottom = median(&bottoms)?;
    Some(Interior {
        top,
        bottom: bottom.max(top + 1.0),
    })
}

fn qualifies(blob: &Blob, mask: &InterestMask, min_side: f32) -> bool {
    let side = blob.width().max(blob.height()) as f32;
    side >= min_side.max(4.0)
        && (blob.width() as f32) <= 0.6 * mask.width as f32
        && (blob.height() as f32) <= 0.6 * mask.height as f32
}

fn typical_control_height(
    mask: &InterestMask,
    blobs: &[Blob],
    min_side: f32,
    interior: Interior,
) -> f32 {
    let heights: Vec<f32> = blobs
        .iter()
        .filter(|b| qualifies(b, mask, min_side))
        .map(|b| b.height() as f32)
        .collect();
    median(&heights).unwrap_or(0.2 * interior.height())
}

/// Row-filled widths of control-sized blobs, restricted to the interior.
fn row_histogram(
    mask: &InterestMask,
    blobs: &[Blob],
    min_side: f32,
    interior: Interior,
) -> Vec<f32> {
    let mut hist = vec![0.0f32; mask.height];
    let lo = interior.top.floor().max(0.0) as usize;
    let hi = (interior.bottom.ceil().max(0.0) as usize).min(mask.height);
    for blob in blobs.iter().filter(|b| qualifies(b, mask, min_side)) {
        for (i, span) in blob.row_spans.iter().enumerate() {
            let y = blob.min_y + i;
            if let Some((a, b)) = span {
                if (lo..hi).contains(&y) {
                    hist[y] += (b - a + 1) as f32;
                }
            }
        }
    }
    hist
}

fn smooth(hist: &[f32], radius: usize) -> Vec<f32> {
    let n = hist.len();
    let mut prefix = vec![0.0f32; n + 1];
    for (i, &v) in hist.iter().enumerate() {
        prefix[i + 1] = prefix[i] + v;
    }
    (0..n)
        .map(|i| {
            let a = i.saturating_sub(radius);
            let b = (i + radius + 1).min(n);
            (prefix[b] - prefix[a]) / (b - a) as f32
        })
        .collect()
}

/// Local maxima, strongest first, thinned greedily by separation.
fn pick_peaks(hist: &[f32], interior: Interior, typical: f32) -> Vec<f32> {
    let mut maxima: Vec<(f32, f32)> = Vec::new();
    let n = hist.len();
    let mut y = 0;
    while y < n {
        let v = hist[y];
        let rising = y == 0 || v > hist[y - 1];
        if v > 0.0 && rising {
            let mut end = y;
            while end + 1 < n && hist[end + 1] == v {
                end += 1;
            }
            if end + 1 == n || hist[end + 1] < v {
                maxima.push((0.5 * (y + end) as f32 + 0.5, v));
            }
            y = end + 1;
        } else {
            y += 1;
        }
    }
    maxima.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.total_cmp(&b.0)));

    let Some(&(_, best)) = maxima.first() else {
        return Vec::new();
    };
    let min_sep = (MIN_PEAK_SEPARATION * interior.height()).max(1.2 * typical);
    let mut picked: Vec<f32> = Vec::new();
    for (pos, value) in maxima {
        if picked.len() == MAX_BANDS || value < MIN_PEAK_FRACTION * best {
            break;
        }
        if picked.iter().all(|&p| (p - pos).abs() >= min_sep) {
            picked.push(pos);
        }
    }
    picked.sort_by(f32::total_cmp);
    picked
}

/// Mask density over the middle third between two peak rows.
fn gap_density(mask: &InterestMask, upper: f32, lower: f32) -> f32 {
    let third = (lower - upper) / 3.0;
    let a = (upper + third).round().max(0.0) as usize;
    let b = ((lower - third).round().max(0.0) as usize).min(mask.height);
    if b <= a || mask.width == 0 {
        return 1.0;
    }
    mask.count_rows(a..b) as f32 / ((b - a) * mask.width) as f32
}

fn quartile_bands(interior: Interior) -> Vec<Band> {
    let h = interior.height();
    let mid = interior.top + 0.5 * h;
    vec![
        Band {
            top: interior.top,
            bottom: mid,
        },
        Band {
            top: mid,
            bottom: interior.top + h,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::label_components;

    fn ring_mask(width: usize, height: usize, centers: &[(f32, f32)], r: f32) -> InterestMask {
        let bits = (0..width * height)
            .map(|i| {
                let (x, y) = ((i % width) as f32, (i / width) as f32);
                centers.iter().any(|&(cx, cy)| {
                    let d = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
                    (d - r).abs() <= 1.5
                })
            })
            .collect();
        InterestMask {
            width,
            height,
            bits,
        }
    }

    #[test]
    fn empty_mask_has_no_bands() {
        let mask = InterestMask {
            width: 40,
            height: 30,
            bits: vec![false; 1200],
        };
        assert!(detect_bands(&mask, &[], 8.0).is_empty());
    }

    #[test]
    fn single_row_gives_one_band_around_it() {
        let centers: Vec<(f32, f32)> = (0..5).map(|i| (40.0 + 60.0 * i as f32, 70.0)).collect();
        let mask = ring_mask(320, 160, &centers, 18.0);
        let blobs = label_components(&mask);
        let bands = detect_bands(&mask, &blobs, 10.0);
        assert_eq!(bands.len(), 1);
        assert!(bands[0].near(70.0, 0.0));
        assert!(bands[0].top <= 52.0 && bands[0].bottom >= 88.0);
    }

    #[test]
    fn two_rows_with_busy_gap_stay_apart() {
        let mut centers: Vec<(f32, f32)> = (0..5).map(|i| (40.0 + 60.0 * i as f32, 40.0)).collect();
        centers.extend((0..5).map(|i| (40.0 + 60.0 * i as f32, 150.0)));
        let mut mask = ring_mask(320, 190, &centers, 16.0);
        // Printed legends between the rows: 2x2 dots on a 4 px pitch.
        for y in (80..110).step_by(4) {
            for x in (0..320).step_by(4) {
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    mask.bits[(y + dy) * 320 + x + dx] = true;
                }
            }
        }
        let blobs = label_components(&mask);
        let bands = detect_bands(&mask, &blobs, 10.0);
        assert_eq!(bands.len(), 2);
        assert!(bands[0].near(40.0, 0.0));
        assert!(bands[1].near(150.0, 0.0));
        assert!(bands[0].bottom <= bands[1].top);
    }

    #[test]
    fn two_rows_with_clean_gap_merge() {
        let mut centers: Vec<(f32, f32)> = (0..5).map(|i| (40.0 + 60.0 * i as f32, 40.0)).collect();
        centers.extend((0..5).map(|i| (40.0 + 60.0 * i as f32, 150.0)));
        let mask = ring_mask(320, 190, &centers, 16.0);
        let blobs = label_components(&mask);
        let bands = detect_bands(&mask, &blobs, 10.0);
        assert_eq!(bands.len(), 1);
        assert!(bands[0].near(40.0, 0.0) && bands[0].near(150.0, 0.0));
    }

    #[test]
    fn mask_without_controls_falls_back_to_quartiles() {
        // Small specks only: nothing control-sized.
        let mut bits = vec![false; 100 * 100];
        for y in (10..90).step_by(10) {
            for x in (10..90).step_by(10) {
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1), (2, 0), (2, 1)] {
                    bits[(y + dy) * 100 + x + dx] = true;
                }
            }
        }
        let mask = InterestMask {
            width: 100,
            height: 100,
            bits,
        };
        let blobs = label_components(&mask);
        let bands = detect_bands(&mask, &blobs, 10.0);
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0].bottom, bands[1].top);
    }

    #[test]
    fn nearest_band_picks_closest_center() {
        let bands = [
            Band {
                top: 0.0,
                bottom: 20.0,
            },
            Band {
                top: 50.0,
                bottom: 70.0,
            },
        ];
        assert_eq!(nearest_band(&bands, 14.0), Some(0));
        assert_eq!(nearest_band(&bands, 41.0), Some(1));
        assert_eq!(nearest_band(&[], 41.0), None);
    }
}
