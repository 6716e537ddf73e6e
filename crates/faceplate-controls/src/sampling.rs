//! Disk, annulus and rectangle intensity sampling on working-resolution planes.

use faceplate_core::LumaImage;
use nalgebra::Point2;

use crate::preprocess::WorkingImage;

/// Angular samples per radius.
const ANGULAR_SAMPLES: usize = 32;
/// Radial steps across an annulus.
const RADIAL_STEPS: usize = 4;

/// Precomputed unit directions so sampling needs no per-sample trig.
#[derive(Clone, Debug)]
pub struct UnitCircle {
    dirs: Vec<(f32, f32)>,
}

impl UnitCircle {
    pub fn new(samples: usize) -> Self {
        let samples = samples.max(1);
        let step = std::f32::consts::TAU / samples as f32;
        let dirs = (0..samples)
            .map(|k| {
                let (s, c) = (k as f32 * step).sin_cos();
                (c, s)
            })
            .collect();
        Self { dirs }
    }

    #[inline]
    pub fn dirs(&self) -> &[(f32, f32)] {
        &self.dirs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

/// Shared sampler for annulus means.
#[derive(Clone, Debug)]
pub struct RingSampler {
    circle: UnitCircle,
}

impl Default for RingSampler {
    fn default() -> Self {
        Self {
            circle: UnitCircle::new(ANGULAR_SAMPLES),
        }
    }
}

impl RingSampler {
    /// Area-weighted mean over the annulus `r0..=r1` around `c`.
    ///
    /// `r0 == 0` gives a disk mean. Samples outside the plane read the
    /// nearest edge pixel.
    pub fn annulus_mean(&self, img: &LumaImage, c: Point2<f32>, r0: f32, r1: f32) -> f32 {
        let mut acc = 0.0f32;
        let mut weight = 0.0f32;
        self.for_each_sample(c, r0, r1, |x, y, w| {
            acc += w * img.sample_bilinear(x, y);
            weight += w;
        });
        if weight > 0.0 {
            acc / weight
        } else {
            img.sample_bilinear(c.x, c.y)
        }
    }

    pub fn disk_mean(&self, img: &LumaImage, c: Point2<f32>, r: f32) -> f32 {
        self.annulus_mean(img, c, 0.0, r)
    }

    /// Means over `sectors` equal angular slices of the annulus `r0..=r1`,
    /// counter-clockwise from +x.
    pub fn annulus_sector_means(
        &self,
        img: &LumaImage,
        c: Point2<f32>,
        r0: f32,
        r1: f32,
        sectors: usize,
    ) -> Vec<f32> {
        let n = self.circle.len();
        let sectors = sectors.clamp(1, n);
        let (lo, hi) = if r0 <= r1 { (r0, r1) } else { (r1, r0) };
        let lo = lo.max(0.0);
        let mut sums = vec![0.0f32; sectors];
        let mut weights = vec![0.0f32; sectors];
        for i in 0..RADIAL_STEPS {
            let r = lo + (hi - lo) * (i as f32 + 0.5) / RADIAL_STEPS as f32;
            if r <= 0.0 {
                continue;
            }
            for (k, &(dx, dy)) in self.circle.dirs().iter().enumerate() {
                let s = k * sectors / n;
                sums[s] += r * img.sample_bilinear(c.x + r * dx, c.y + r * dy);
                weights[s] += r;
            }
        }
        let fallback = img.sample_bilinear(c.x, c.y);
        sums.iter()
            .zip(&weights)
            .map(|(&s, &w)| if w > 0.0 { s / w } else { fallback })
            .collect()
    }

    /// Mean colour over an annulus, `[r, g, b]`.
    pub fn annulus_rgb(&self, image: &WorkingImage, c: Point2<f32>, r0: f32, r1: f32) -> [f32; 3] {
        [
            self.annulus_mean(&image.red, c, r0, r1),
            self.annulus_mean(&image.green, c, r0, r1),
            self.annulus_mean(&image.blue, c, r0, r1),
        ]
    }

    fn for_each_sample(&self, c: Point2<f32>, r0: f32, r1: f32, mut f: impl FnMut(f32, f32, f32)) {
        let (lo, hi) = if r0 <= r1 { (r0, r1) } else { (r1, r0) };
        let lo = lo.max(0.0);
        if hi <= 0.0 {
            f(c.x, c.y, 1.0);
            return;
        }
        for i in 0..RADIAL_STEPS {
            // Midpoints of equal-width sub-rings.
            let r = lo + (hi - lo) * (i as f32 + 0.5) / RADIAL_STEPS as f32;
            for &(dx, dy) in self.circle.dirs() {
                f(c.x + r * dx, c.y + r * dy, r);
            }
        }
    }
}

/// Absolute core/surround contrast of an axis-aligned box `[x0, x1) x [y0, y1)`.
///
/// The core is the box inset by 20% per side, the surround is the frame between
/// the box grown by 15% and by 40% per side.
pub fn rect_contrast(img: &LumaImage, x0: f32, y0: f32, x1: f32, y1: f32) -> f32 {
    let (w, h) = (x1 - x0, y1 - y0);
    if !(w > 0.0 && h > 0.0) {
        return 0.0;
    }
    let core = box_mean(img, x0 + 0.2 * w, y0 + 0.2 * h, x1 - 0.2 * w, y1 - 0.2 * h, None);
    let inner = (x0 - 0.15 * w, y0 - 0.15 * h, x1 + 0.15 * w, y1 + 0.15 * h);
    let frame = box_mean(
        img,
        x0 - 0.4 * w,
        y0 - 0.4 * h,
        x1 + 0.4 * w,
        y1 + 0.4 * h,
        Some(inner),
    );
    match (core, frame) {
        (Some(a), Some(b)) => (a - b).abs(),
        _ => 0.0,
    }
}

/// Mean over the in-bounds pixels of a box, optionally excluding an inner box.
fn box_mean(
    img: &LumaImage,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    hole: Option<(f32, f32, f32, f32)>,
) -> Option<f32> {
    let xa = x0.floor().max(0.0) as usize;
    let ya = y0.floor().max(0.0) as usize;
    let xb = (x1.ceil().max(0.0) as usize).min(img.width);
    let yb = (y1.ceil().max(0.0) as usize).min(img.height);
    let mut sum = 0.0f32;
    let mut n = 0usize;
    for y in ya..yb {
        for x in xa..xb {
            if let Some((hx0, hy0, hx1, hy1)) = hole {
                let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
                if fx >= hx0 && fx < hx1 && fy >= hy0 && fy < hy1 {
                    continue;
                }
            }
            sum += img.get(x, y);
            n += 1;
        }
    }
    (n > 0).then(|| sum / n as f32)
}

/// A circle fitted to image intensities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefinedCircle {
    pub center: Point2<f32>,
    pub radius: f32,
    /// `|outer - inner|` luma step across the rim.
    pub step: f32,
}

/// Local search for the circle whose rim separates inner and outer luma best.
///
/// Tries centers within +-2 px and radii within 80..120% of `r0`.
pub fn refine_circle(
    sampler: &RingSampler,
    img: &LumaImage,
    c0: Point2<f32>,
    r0: f32,
) -> RefinedCircle {
    const CENTER_SEARCH: i32 = 2;
    const RADIUS_STEPS: usize = 9;
    const RIM_BAND: f32 = 1.5;

    let mut best = RefinedCircle {
        center: c0,
        radius: r0,
        step: f32::NEG_INFINITY,
    };
    if !(r0 > 0.0) {
        best.step = 0.0;
        return best;
    }
    for dy in -CENTER_SEARCH..=CENTER_SEARCH {
        for dx in -CENTER_SEARCH..=CENTER_SEARCH {
            let c = Point2::new(c0.x + dx as f32, c0.y + dy as f32);
            for k in 0..RADIUS_STEPS {
                let r = r0 * (0.8 + 0.4 * k as f32 / (RADIUS_STEPS - 1) as f32);
                let inner = sampler.annulus_mean(img, c, (r - RIM_BAND - 0.5).max(0.0), r - 0.5);
                let outer = sampler.annulus_mean(img, c, r + 0.5, r + RIM_BAND + 0.5);
                let step = (outer - inner).abs();
                if step > best.step {
                    best = RefinedCircle {
                        center: c,
                        radius: r,
                        step,
                    };
                }
            }
        }
    }
    best
}


#[cfg(test)]
mod tests {
    use super::test_support::disk_image;
    use super::*;

    #[test]
    fn disk_and_ring_means_separate_foreground() {
        let img = disk_image(64, 64, 32.0, 32.0, 12.0, 1.0, 0.2);
        let s = RingSampler::default();
        let c = Point2::new(32.0, 32.0);
        assert!((s.disk_mean(&img, c, 6.0) - 1.0).abs() < 1e-3);
        assert!((s.annulus_mean(&img, c, 16.0, 20.0) - 0.2).abs() < 1e-3);
    }

    #[test]
    fn refinement_recovers_radius_and_center() {
        let img = disk_image(80, 80, 41.0, 39.0, 15.0, 0.9, 0.1);
        let s = RingSampler::default();
        let fit = refine_circle(&s, &img, Point2::new(40.0, 40.0), 14.0);
        assert!((fit.center.x - 41.0).abs() <= 1.0);
        assert!((fit.center.y - 39.0).abs() <= 1.0);
        assert!((fit.radius - 15.0).abs() <= 1.5, "radius {}", fit.radius);
        assert!(fit.step > 0.6);
    }

    #[test]
    fn dark_box_on_light_panel_has_contrast() {
        let img = LumaImage::from_fn(60, 60, |x, y| {
            if (20..40).contains(&x) && (20..40).contains(&y) {
                0.1
            } else {
                0.6
            }
        });
        let c = rect_contrast(&img, 20.0, 20.0, 40.0, 40.0);
        assert!((c - 0.5).abs() < 1e-3, "contrast {c}");
        assert_eq!(rect_contrast(&img, 5.0, 5.0, 5.0, 9.0), 0.0);
    }
}
