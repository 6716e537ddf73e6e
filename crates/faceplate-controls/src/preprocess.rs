//! Downscaling, edge emphasis and the binary interest mask.

use faceplate_core::stats::histogram_quantile_bin;
use faceplate_core::{luma_from_rgb, LumaImage, PixelBuffer};
use log::{debug, warn};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::DetectorConfig;

/// Edge magnitudes below this fraction of the maximum never enter the mask.
const MASK_MIN_REL_EDGE: f32 = 0.08;
/// An image whose strongest edge is weaker than this has nothing to detect.
const MIN_EDGE_ENERGY: f32 = 1e-3;
/// Luma quantiles mapped to black and white by the contrast stretch.
const STRETCH_LOW_Q: f32 = 0.01;
const STRETCH_HIGH_Q: f32 = 0.99;
/// Quantile of non-zero edge magnitude used as the "typical strong edge".
const EDGE_REFERENCE_Q: f32 = 0.99;
const HIST_BINS: usize = 256;

/// Source image at working resolution, channels normalized to `[0, 1]`.
#[derive(Clone, Debug)]
pub struct WorkingImage {
    pub luma: LumaImage,
    pub red: LumaImage,
    pub green: LumaImage,
    pub blue: LumaImage,
}

impl WorkingImage {
    #[inline]
    pub fn width(&self) -> usize {
        self.luma.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.luma.height
    }
}

/// Sobel gradients of the contrast-boosted, blurred luma.
#[derive(Clone, Debug)]
pub struct EdgeMap {
    pub gx: LumaImage,
    pub gy: LumaImage,
    pub magnitude: LumaImage,
    pub max_magnitude: f32,
    /// High quantile of non-zero magnitudes, robust against single hot pixels.
    pub reference: f32,
}

impl EdgeMap {
    /// Bilinear gradient vector at a sub-pixel position.
    #[inline]
    pub fn gradient_at(&self, x: f32, y: f32) -> (f32, f32) {
        (self.gx.sample_bilinear(x, y), self.gy.sample_bilinear(x, y))
    }
}

/// Binary mask of pixels with top-percentile edge energy.
#[derive(Clone, Debug, Default)]
pub struct InterestMask {
    pub width: usize,
    pub height: usize,
    pub bits: Vec<bool>,
}

impl InterestMask {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.bits[y * self.width + x]
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn count_rows(&self, rows: std::ops::Range<usize>) -> usize {
        let end = rows.end.min(self.height);
        let start = rows.start.min(end);
        self.bits[start * self.width..end * self.width]
            .iter()
            .filter(|&&b| b)
            .count()
    }
}

/// Output of the preprocessing stage.
#[derive(Clone, Debug)]
pub struct Preprocessed {
    pub image: WorkingImage,
    pub edges: EdgeMap,
    pub mask: InterestMask,
    /// Working width / source width.
    pub scale_x: f32,
    /// Working height / source height.
    pub scale_y: f32,
}

/// Run the preprocessing stage.
///
/// Returns `None` for buffers that do not describe a non-empty RGBA8 image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, cfg), fields(width = src.width, height = src.height))
)]
pub fn preprocess(src: &PixelBuffer<'_>, cfg: &DetectorConfig) -> Option<Preprocessed> {
    if !src.is_valid() {
        warn!(
            "invalid pixel buffer: {}x{} with {} bytes",
            src.width,
            src.height,
            src.data.len()
        );
        return None;
    }

    let (image, scale_x, scale_y) = downscale(src, cfg.working_side() as usize);
    let boosted = stretch_contrast(&image.luma).box_blur3();
    let edges = sobel(&boosted);
    let mask = interest_mask(&edges, cfg.keep_top_fraction);
    debug!(
        "working {}x{} (scale {:.3}), edge max {:.4}, mask {} px",
        image.width(),
        image.height(),
        scale_x,
        edges.max_magnitude,
        mask.count()
    );

    Some(Preprocessed {
        image,
        edges,
        mask,
        scale_x,
        scale_y,
    })
}

/// Area-average downscale so the longer side is at most `max_side`.
///
/// Alpha is premultiplied, so transparent regions read as black.
fn downscale(src: &PixelBuffer<'_>, max_side: usize) -> (WorkingImage, f32, f32) {
    let (w, h) = (src.width, src.height);
    let long = w.max(h);
    let (dw, dh) = if long <= max_side {
        (w, h)
    } else {
        let s = max_side as f64 / long as f64;
        (
            ((w as f64 * s).round() as usize).max(1),
            ((h as f64 * s).round() as usize).max(1),
        )
    };

    let mut red = LumaImage::new(dw, dh);
    let mut green = LumaImage::new(dw, dh);
    let mut blue = LumaImage::new(dw, dh);

    for y in 0..dh {
        let y0 = y * h / dh;
        let y1 = ((y + 1) * h / dh).max(y0 + 1);
        for x in 0..dw {
            let x0 = x * w / dw;
            let x1 = ((x + 1) * w / dw).max(x0 + 1);
            let mut acc = [0.0f32; 3];
            for sy in y0..y1 {
                for sx in x0..x1 {
                    let [r, g, b, a] = src.rgba(sx, sy);
                    let alpha = a as f32 / 255.0;
                    acc[0] += r as f32 * alpha;
                    acc[1] += g as f32 * alpha;
                    acc[2] += b as f32 * alpha;
                }
            }
            let n = ((y1 - y0) * (x1 - x0)) as f32 * 255.0;
            let i = y * dw + x;
            red.data[i] = acc[0] / n;
            green.data[i] = acc[1] / n;
            blue.data[i] = acc[2] / n;
        }
    }

    let luma = LumaImage::from_fn(dw, dh, |x, y| {
        let i = y * dw + x;
        luma_from_rgb(red.data[i], green.data[i], blue.data[i])
    });

    (
        WorkingImage {
            luma,
            red,
            green,
            blue,
        },
        dw as f32 / w as f32,
        dh as f32 / h as f32,
    )
}

/// Map the 1st..99th luma percentiles onto `[0, 1]`.
fn stretch_contrast(luma: &LumaImage) -> LumaImage {
    let mut hist = [0u32; HIST_BINS];
    for &v in &luma.data {
        hist[quantize(v)] += 1;
    }
    let (Some(lo), Some(hi)) = (
        histogram_quantile_bin(&hist, STRETCH_LOW_Q),
        histogram_quantile_bin(&hist, STRETCH_HIGH_Q),
    ) else {
        return luma.clone();
    };
    if hi <= lo + 2 {
        return luma.clone();
    }
    let lo = lo as f32 / 255.0;
    let span = hi as f32 / 255.0 - lo;
    LumaImage::from_fn(luma.width, luma.height, |x, y| {
        ((luma.get(x, y) - lo) / span).clamp(0.0, 1.0)
    })
}

#[inline]
fn quantize(v: f32) -> usize {
    (v.clamp(0.0, 1.0) * 255.0).round() as usize
}

/// 3x3 Sobel, normalized so a unit step yields a peak response near 0.5.
fn sobel(src: &LumaImage) -> EdgeMap {
    let (w, h) = (src.width, src.height);
    let mut gx = LumaImage::new(w, h);
    let mut gy = LumaImage::new(w, h);
    let mut magnitude = LumaImage::new(w, h);
    let mut max_magnitude = 0.0f32;

    for y in 0..h {
        for x in 0..w {
            let (xi, yi) = (x as i32, y as i32);
            let p = |dx: i32, dy: i32| src.get_clamped(xi + dx, yi + dy);
            let sx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
            let sy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
            let i = y * w + x;
            gx.data[i] = sx / 8.0;
            gy.data[i] = sy / 8.0;
            let m = gx.data[i].hypot(gy.data[i]);
            magnitude.data[i] = m;
            max_magnitude = max_magnitude.max(m);
        }
    }

    let reference = edge_reference(&magnitude, max_magnitude);
    EdgeMap {
        gx,
        gy,
        magnitude,
        max_magnitude,
        reference,
    }
}

fn edge_reference(magnitude: &LumaImage, max_magnitude: f32) -> f32 {
    if max_magnitude < MIN_EDGE_ENERGY {
        return 0.0;
    }
    let mut hist = [0u32; HIST_BINS];
    for &m in &magnitude.data {
        let bin = quantize(m / max_magnitude);
        if bin > 0 {
            hist[bin] += 1;
        }
    }
    histogram_quantile_bin(&hist, EDGE_REFERENCE_Q)
        .map(|b| b as f32 / 255.0 * max_magnitude)
        .unwrap_or(max_magnitude)
}

/// Keep pixels whose quantized edge energy lies above the
/// `keep_top_fraction` quantile of the 256-bin edge histogram.
fn interest_mask(edges: &EdgeMap, keep_top_fraction: f32) -> InterestMask {
    let (w, h) = (edges.magnitude.width, edges.magnitude.height);
    let mut mask = InterestMask {
        width: w,
        height: h,
        bits: vec![false; w * h],
    };
    let max = edges.max_magnitude;
    if max < MIN_EDGE_ENERGY {
        return mask;
    }

    let mut hist = [0u32; HIST_BINS];
    for &m in &edges.magnitude.data {
        hist[quantize(m / max)] += 1;
    }
    let Some(cutoff) = histogram_quantile_bin(&hist, keep_top_fraction) else {
        return mask;
    };
    let floor = MASK_MIN_REL_EDGE * max;
    for (bit, &m) in mask.bits.iter_mut().zip(&edges.magnitude.data) {
        *bit = quantize(m / max) > cutoff && m >= floor;
    }
    mask
}
