//! Per-band circle search.
//!
//! Edge pixels of the interest mask vote along both directions of their
//! gradient at every candidate radius; dial rims converge on their centers.
//! Each accumulator peak gets a radius from the mean edge strength along
//! concentric circles, then has to pass contrast, glyph, light and radial rim
//! checks. Circles that narrowly miss the rim check are held back and used to
//! fill bands that look sparser than expected.

use faceplate_core::stats::median;
use faceplate_core::{LumaImage, PixelRect};
use log::{debug, trace};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::bands::Band;
use crate::config::DetectorConfig;
use crate::context::DetectionContext;
use crate::error::{CancelToken, DetectError, Stage};
use crate::radial::{
    is_printed_glyph, led_signature, radial_edge_score, LedSignature, RadialThresholds,
};
use crate::types::ControlKind;

/// Accumulator peaks examined per strip.
const MAX_PEAKS_PER_STRIP: usize = 64;
/// A second rim radius must reach this fraction of the strongest one.
const SECONDARY_RIM_FRACTION: f32 = 0.6;
/// It must also differ from it by this fraction of the larger radius.
const SECONDARY_RIM_SEPARATION: f32 = 0.25;
/// The size clamp only runs when the largest knob diameter in a band is less
/// than this multiple of the smallest. Empirical; recalibrate on a labelled
/// corpus before relying on it.
const SIZE_SPREAD_TRIGGER: f32 = 6.0;
/// Diameters kept by the size clamp, as multiples of the band median.
const SIZE_KEEP_RANGE: (f32, f32) = (0.55, 1.8);
const SIZE_CLAMP_MIN_KNOBS: usize = 3;
/// Rescues must be at least this multiple of the knob minimum.
const RESCUE_MIN_KNOB_FACTOR: f32 = 1.2;
/// Rescues overlapping an existing draft at this IoU or more are duplicates.
const RESCUE_MAX_IOU: f32 = 0.3;
const RESCUE_MAX_CONFIDENCE: f32 = 0.5;

/// A verified or rescuable circle at working resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Circle {
    pub center: Point2<f32>,
    pub radius: f32,
    /// Diameter in source pixels.
    pub diameter: f32,
    pub kind: ControlKind,
    pub confidence: f32,
    /// Ranking score in `[0, 1]`.
    pub score: f32,
    /// Set for lights.
    pub signature: Option<LedSignature>,
}

enum Verdict {
    Accept(Circle),
    Rescue(Circle),
    Reject,
}

/// Search every band for circular controls. Returns the number of drafts
/// added.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(ctx, cfg, cancel), fields(bands = ctx.bands.len()))
)]
pub fn find_circles(
    ctx: &mut DetectionContext,
    cfg: &DetectorConfig,
    cancel: &CancelToken,
) -> Result<usize, DetectError> {
    let before = ctx.drafts.len();
    let bands = ctx.bands.clone();
    for (index, band) in bands.iter().enumerate() {
        cancel.check(Stage::Circles)?;
        let (mut accepted, rescues) = search_band(ctx, cfg, band);
        size_clamp(&mut accepted);
        drop_lights_on_knobs(&mut accepted);

        let want = cfg.expected_per_band(ctx.source_width);
        let have = admit(ctx, band, &accepted);
        let rescued = add_rescues(ctx, rescues, want.saturating_sub(have));
        debug!(
            "circles: band {} kept {}, rescued {} (want {}, had {})",
            index,
            accepted.len(),
            rescued,
            want,
            have
        );
    }
    Ok(ctx.drafts.len() - before)
}

/// Push accepted circles as drafts. Returns how many distinct controls the
/// band now holds, counting earlier drafts lying in it.
fn admit(ctx: &mut DetectionContext, band: &Band, accepted: &[Circle]) -> usize {
    let mut have = ctx
        .drafts
        .iter()
        .filter(|d| band.near(ctx.to_working(d.center).y, 0.0))
        .count();
    for circle in accepted {
        let Some(rect) = ctx.circle_rect(circle.center, circle.radius) else {
            continue;
        };
        if !overlaps_any(ctx, &rect) {
            have += 1;
        }
        if let Some(draft) =
            ctx.circle_draft(circle.kind, circle.center, circle.radius, circle.confidence)
        {
            ctx.drafts.push(draft);
        }
    }
    have
}

/// Promote up to `shortfall` rescue candidates, strongest first, to
/// low-confidence knobs. Candidates overlapping any draft are skipped.
fn add_rescues(ctx: &mut DetectionContext, rescues: Vec<Circle>, shortfall: usize) -> usize {
    let mut rescued = 0;
    for circle in rescues {
        if rescued == shortfall {
            break;
        }
        let Some(rect) = ctx.circle_rect(circle.center, circle.radius) else {
            continue;
        };
        if overlaps_any(ctx, &rect) {
            continue;
        }
        if let Some(draft) = ctx.circle_draft(
            ControlKind::Knob,
            circle.center,
            circle.radius,
            rescue_confidence(circle.score),
        ) {
            ctx.drafts.push(draft);
            rescued += 1;
        }
    }
    rescued
}

#[inline]
fn rescue_confidence(score: f32) -> f32 {
    (0.3 + 0.2 * score).min(RESCUE_MAX_CONFIDENCE)
}

fn overlaps_any(ctx: &DetectionContext, rect: &PixelRect) -> bool {
    ctx.drafts.iter().any(|d| d.rect.iou(rect) >= RESCUE_MAX_IOU)
}

/// Accepted circles and rescue candidates (strongest first) of one band.
fn search_band(
    ctx: &DetectionContext,
    cfg: &DetectorConfig,
    band: &Band,
) -> (Vec<Circle>, Vec<Circle>) {
    let height = ctx.mask.height;
    let pad = cfg.band_pad_frac * band.height();
    let y0 = (band.top - pad).floor().max(0.0) as usize;
    let y1 = ((band.bottom + pad).ceil().max(0.0) as usize).min(height);
    if y1 <= y0 + 2 || ctx.mask.width < 3 {
        return (Vec::new(), Vec::new());
    }

    let r_lo = ctx.to_working_len(0.5 * cfg.led_min_diameter).max(2.0);
    let r_hi = ctx
        .to_working_len(0.5 * cfg.knob_max_diameter)
        .min(0.5 * (y1 - y0) as f32);
    if r_hi < r_lo {
        return (Vec::new(), Vec::new());
    }
    let radii = voting_radii(r_lo, r_hi);
    let acc = vote(ctx, y0, y1, &radii);
    let peaks = accumulator_peaks(&acc, cfg.vote_threshold_fraction, r_lo.max(3.0));
    trace!("circles: strip {}..{} has {} peaks", y0, y1, peaks.len());

    let mut accepted = Vec::new();
    let mut rescues = Vec::new();
    for (px, py) in peaks {
        let center = Point2::new(px, py + y0 as f32);
        for radius in rim_radii(ctx, center, r_lo, r_hi) {
            match evaluate(ctx, cfg, center, radius) {
                Verdict::Accept(c) => accepted.push(c),
                Verdict::Rescue(c) => rescues.push(c),
                Verdict::Reject => {}
            }
        }
    }
    let accepted = dedupe(accepted, &[]);
    let rescues = dedupe(rescues, &accepted);
    (accepted, rescues)
}

/// Radii from `r_lo` to `r_hi` in roughly 8% steps.
fn voting_radii(r_lo: f32, r_hi: f32) -> Vec<f32> {
    let mut radii = Vec::new();
    let mut r = r_lo;
    while r <= r_hi {
        radii.push(r);
        r += (0.08 * r).max(1.0);
    }
    radii
}

#[inline]
fn bilinear_add(acc: &mut LumaImage, x: f32, y: f32, weight: f32) {
    let x0 = x as usize;
    let y0 = y as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let stride = acc.width;
    let base = y0 * stride + x0;
    acc.data[base] += weight * (1.0 - fx) * (1.0 - fy);
    acc.data[base + 1] += weight * fx * (1.0 - fy);
    acc.data[base + stride] += weight * (1.0 - fx) * fy;
    acc.data[base + stride + 1] += weight * fx * fy;
}

/// Gradient-directed votes of the mask pixels in rows `y0..y1`, smoothed.
///
/// Votes are weighted by `magnitude / r` so a rim of any size collects about
/// the same total.
fn vote(ctx: &DetectionContext, y0: usize, y1: usize, radii: &[f32]) -> LumaImage {
    let width = ctx.mask.width;
    let mut acc = LumaImage::new(width, y1 - y0);
    let x_limit = (width - 1) as f32;
    let y_limit = (y1 - y0 - 1) as f32;
    for y in y0..y1 {
        for x in 0..width {
            if !ctx.mask.get(x, y) {
                continue;
            }
            let mag = ctx.edges.magnitude.get(x, y);
            if mag <= f32::EPSILON {
                continue;
            }
            let dx = ctx.edges.gx.get(x, y) / mag;
            let dy = ctx.edges.gy.get(x, y) / mag;
            let (xf, yf) = (x as f32, (y - y0) as f32);
            for &r in radii {
                let w = mag / r;
                for s in [1.0f32, -1.0] {
                    let vx = xf + s * dx * r;
                    let vy = yf + s * dy * r;
                    if vx >= 0.0 && vx < x_limit && vy >= 0.0 && vy < y_limit {
                        bilinear_add(&mut acc, vx, vy, w);
                    }
                }
            }
        }
    }
    acc.box_blur3().box_blur3()
}

/// Local maxima above `fraction` of the global maximum, strongest first.
fn accumulator_peaks(acc: &LumaImage, fraction: f32, nms_radius: f32) -> Vec<(f32, f32)> {
    let max = acc.max_value();
    if !(max > 1e-6) {
        return Vec::new();
    }
    let threshold = fraction * max;
    let r = nms_radius.ceil() as i32;
    let r2 = nms_radius * nms_radius;
    let (w, h) = (acc.width as i32, acc.height as i32);

    let mut peaks: Vec<(usize, f32)> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            let v = acc.data[idx];
            if v < threshold {
                continue;
            }
            let mut is_max = true;
            'scan: for dy in -r..=r {
                for dx in -r..=r {
                    if (dx == 0 && dy == 0) || (dx * dx + dy * dy) as f32 > r2 {
                        continue;
                    }
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let nidx = (ny * w + nx) as usize;
                    let nv = acc.data[nidx];
                    if nv > v || (nv == v && nidx < idx) {
                        is_max = false;
                        break 'scan;
                    }
                }
            }
            if is_max {
                peaks.push((idx, v));
            }
        }
    }
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    peaks.truncate(MAX_PEAKS_PER_STRIP);
    peaks
        .into_iter()
        .map(|(idx, _)| ((idx % acc.width) as f32, (idx / acc.width) as f32))
        .collect()
}

/// The strongest rim radius around `center`, plus a clearly separated second
/// rim when one is nearly as strong.
fn rim_radii(ctx: &DetectionContext, center: Point2<f32>, r_lo: f32, r_hi: f32) -> Vec<f32> {
    let mut profile: Vec<(f32, f32)> = Vec::new();
    let mut r = r_lo.ceil();
    while r <= r_hi {
        let dirs = ctx.rim.dirs();
        let sum: f32 = dirs
            .iter()
            .map(|&(ux, uy)| {
                ctx.edges
                    .magnitude
                    .sample_bilinear(center.x + r * ux, center.y + r * uy)
            })
            .sum();
        profile.push((r, sum / dirs.len() as f32));
        r += 1.0;
    }
    let n = profile.len();
    if n == 0 {
        return Vec::new();
    }
    let smoothed: Vec<f32> = (0..n)
        .map(|i| {
            let a = profile[i.saturating_sub(1)].1;
            let b = profile[i].1;
            let c = profile[(i + 1).min(n - 1)].1;
            0.25 * (a + 2.0 * b + c)
        })
        .collect();

    let mut best = 0;
    for i in 1..n {
        if smoothed[i] > smoothed[best] {
            best = i;
        }
    }
    if !(smoothed[best] > 0.0) {
        return Vec::new();
    }
    let r_best = profile[best].0;
    let mut radii = vec![r_best];

    let secondary = (1..n.saturating_sub(1))
        .filter(|&i| smoothed[i] >= smoothed[i - 1] && smoothed[i] > smoothed[i + 1])
        .filter(|&i| {
            let ri = profile[i].0;
            smoothed[i] >= SECONDARY_RIM_FRACTION * smoothed[best]
                && (ri - r_best).abs() >= SECONDARY_RIM_SEPARATION * ri.max(r_best)
        })
        .max_by(|&a, &b| smoothed[a].total_cmp(&smoothed[b]).then(b.cmp(&a)));
    if let Some(i) = secondary {
        radii.push(profile[i].0);
    }
    radii
}

fn evaluate(ctx: &DetectionContext, cfg: &DetectorConfig, center: Point2<f32>, r: f32) -> Verdict {
    let diameter = ctx.to_source_len(2.0 * r);
    if diameter < cfg.led_min_diameter || diameter > cfg.knob_max_diameter {
        return Verdict::Reject;
    }
    let luma = &ctx.image.luma;
    let core = ctx.sampler.disk_mean(luma, center, 0.6 * r);
    let ring = ctx.sampler.annulus_mean(luma, center, 1.25 * r, 1.6 * r);
    let contrast = (core - ring).abs();
    if contrast < cfg.contrast_floor {
        trace!("circle {:?} r {:.1}: contrast {:.3}", center, r, contrast);
        return Verdict::Reject;
    }
    if is_printed_glyph(luma, &ctx.sampler, center, r, diameter) {
        trace!("circle {:?} r {:.1}: printed glyph", center, r);
        return Verdict::Reject;
    }
    let circle = |kind: ControlKind, confidence: f32, score: f32| Circle {
        center,
        radius: r,
        diameter,
        kind,
        confidence,
        score,
        signature: None,
    };
    if let Some(signature) = led_signature(&ctx.image, &ctx.sampler, center, r, diameter, cfg) {
        let score = contrast.min(1.0);
        return Verdict::Accept(Circle {
            signature: Some(signature),
            ..circle(ControlKind::Light, 0.55 + 0.3 * score, score)
        });
    }
    if diameter < cfg.knob_min_diameter {
        return Verdict::Reject;
    }
    let radial = radial_edge_score(&ctx.edges, &ctx.rim, center, r);
    let thresholds = RadialThresholds::for_diameter(diameter, cfg);
    let score = radial.combined();
    if thresholds.passes(&radial) {
        Verdict::Accept(circle(ControlKind::Knob, 0.45 + 0.45 * score, score))
    } else if thresholds.near_miss(&radial, cfg.rescue_margin)
        && diameter >= RESCUE_MIN_KNOB_FACTOR * cfg.knob_min_diameter
    {
        Verdict::Rescue(circle(ControlKind::Knob, 0.0, score))
    } else {
        trace!("circle {:?} r {:.1}: radial {:?}", center, r, radial);
        Verdict::Reject
    }
}

/// Keep the strongest of same-kind circles sharing a center, dropping any that
/// also duplicate a circle in `taken`.
fn dedupe(mut circles: Vec<Circle>, taken: &[Circle]) -> Vec<Circle> {
    circles.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(b.score.total_cmp(&a.score))
            .then(b.radius.total_cmp(&a.radius))
    });
    let same = |a: &Circle, b: &Circle| {
        a.kind == b.kind
            && (a.center - b.center).norm() < 0.5 * a.radius.min(b.radius)
            && (a.radius - b.radius).abs() < 0.25 * a.radius.max(b.radius)
    };
    let mut kept: Vec<Circle> = Vec::new();
    for c in circles {
        if taken.iter().chain(kept.iter()).any(|k| same(k, &c)) {
            continue;
        }
        kept.push(c);
    }
    kept
}

/// Drop lit-core lights centered on an accepted knob; coloured ones are kept.
fn drop_lights_on_knobs(circles: &mut Vec<Circle>) {
    let knobs: Vec<(Point2<f32>, f32)> = circles
        .iter()
        .filter(|c| c.kind == ControlKind::Knob)
        .map(|c| (c.center, c.radius))
        .collect();
    circles.retain(|c| {
        c.signature != Some(LedSignature::LitCore)
            || !knobs.iter().any(|&(k, r)| (c.center - k).norm() < r)
    });
}

/// Drop knobs far from the band's median size when the sizes are otherwise
/// consistent.
fn size_clamp(circles: &mut Vec<Circle>) {
    let diameters: Vec<f32> = circles
        .iter()
        .filter(|c| c.kind == ControlKind::Knob)
        .map(|c| c.diameter)
        .collect();
    if diameters.len() < SIZE_CLAMP_MIN_KNOBS {
        return;
    }
    let lo = diameters.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = diameters.iter().copied().fold(0.0f32, f32::max);
    if !(lo > 0.0) || hi / lo >= SIZE_SPREAD_TRIGGER {
        return;
    }
    let Some(med) = median(&diameters) else {
        return;
    };
    let (a, b) = (SIZE_KEEP_RANGE.0 * med, SIZE_KEEP_RANGE.1 * med);
    circles.retain(|c| c.kind != ControlKind::Knob || (a..=b).contains(&c.diameter));
}
