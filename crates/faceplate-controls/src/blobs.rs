//! Classify mask components into controls by shape, size and contrast.

use log::{debug, trace};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::bands::nearest_band;
use crate::components::Blob;
use crate::config::DetectorConfig;
use crate::context::DetectionContext;
use crate::radial::{is_printed_glyph, led_signature};
use crate::sampling::{rect_contrast, refine_circle};
use crate::types::ControlKind;

/// Round blobs (knobs and lights) have a near-square bounding box.
const KNOB_MAX_ASPECT: f32 = 1.25;
const SWITCH_MIN_ASPECT: f32 = 1.8;
/// Elongated blobs touching the top or bottom border are panel edges.
const BORDER_ARTIFACT_ASPECT: f32 = 3.0;
/// Blobs wider than this fraction of the image are panel outlines.
const MAX_WIDTH_FRACTION: f32 = 0.6;
/// Flush controls smaller than this fraction of the knob minimum are text.
const FLUSH_MIN_SIDE_OF_KNOB: f32 = 0.6;

const KNOB_CONFIDENCE: f32 = 0.60;
const KNOB_CONTRAST_BONUS: f32 = 0.04;
const LIGHT_CONFIDENCE: f32 = 0.55;
const BUTTON_CONFIDENCE: f32 = 0.50;
const SWITCH_CONFIDENCE: f32 = 0.45;

/// Turn band-gated blobs into drafts. Returns the number of drafts added.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(ctx, cfg), fields(blobs = ctx.blobs.len()))
)]
pub fn classify_blobs(ctx: &mut DetectionContext, cfg: &DetectorConfig) -> usize {
    let before = ctx.drafts.len();
    let blobs = std::mem::take(&mut ctx.blobs);
    for blob in &blobs {
        if !in_band(ctx, blob) {
            continue;
        }
        if let Some((kind, confidence, round)) = classify(ctx, cfg, blob) {
            let draft = match round {
                Some((center, radius)) => ctx.circle_draft(kind, center, radius, confidence),
                None => ctx.box_draft(kind, blob, confidence),
            };
            if let Some(draft) = draft {
                ctx.drafts.push(draft);
            }
        }
    }
    ctx.blobs = blobs;
    let added = ctx.drafts.len() - before;
    debug!("blobs: {} drafts from {} blobs", added, ctx.blobs.len());
    added
}

fn in_band(ctx: &DetectionContext, blob: &Blob) -> bool {
    let cy = blob.center().y;
    nearest_band(&ctx.bands, cy)
        .map(|i| ctx.bands[i].near(cy, 0.5 * blob.height() as f32))
        .unwrap_or(false)
}

type RoundFit = Option<(nalgebra::Point2<f32>, f32)>;

fn classify(
    ctx: &DetectionContext,
    cfg: &DetectorConfig,
    blob: &Blob,
) -> Option<(ControlKind, f32, RoundFit)> {
    let aspect = blob.aspect();
    if aspect >= BORDER_ARTIFACT_ASPECT && blob.touches_vertical_border(ctx.mask.height) {
        trace!("blob at {:?}: border artifact", blob.center());
        return None;
    }
    if blob.width() as f32 >= MAX_WIDTH_FRACTION * ctx.mask.width as f32 {
        trace!("blob at {:?}: panel-wide", blob.center());
        return None;
    }

    let luma = &ctx.image.luma;
    if blob.roundness() >= 1.0 - cfg.roundness_tolerance && aspect < KNOB_MAX_ASPECT {
        let fit = refine_circle(&ctx.sampler, luma, blob.center(), blob.mean_radius());
        let diameter = ctx.to_source_len(2.0 * fit.radius);
        if is_printed_glyph(luma, &ctx.sampler, fit.center, fit.radius, diameter) {
            trace!("blob at {:?}: printed glyph", fit.center);
            return None;
        }
        let core = ctx.sampler.disk_mean(luma, fit.center, 0.5 * fit.radius);
        let ring = ctx
            .sampler
            .annulus_mean(luma, fit.center, 1.3 * fit.radius, 1.6 * fit.radius);
        let contrast = (core - ring).abs();
        if contrast < cfg.round_contrast_floor {
            trace!("blob at {:?}: round contrast {:.3}", fit.center, contrast);
            return None;
        }
        if diameter <= cfg.led_max_diameter {
            let is_light = diameter >= cfg.led_min_diameter
                && led_signature(&ctx.image, &ctx.sampler, fit.center, fit.radius, diameter, cfg)
                    .is_some();
            if !is_light {
                trace!("blob at {:?}: small round without light signature", fit.center);
                return None;
            }
            return Some((ControlKind::Light, LIGHT_CONFIDENCE, Some((fit.center, fit.radius))));
        }
        if (cfg.knob_min_diameter..=cfg.knob_max_diameter).contains(&diameter) {
            let confidence = KNOB_CONFIDENCE + KNOB_CONTRAST_BONUS * (2.0 * contrast).min(1.0);
            return Some((ControlKind::Knob, confidence, Some((fit.center, fit.radius))));
        }
    }

    let long = ctx.to_source_len(blob.width().max(blob.height()) as f32);
    if long < FLUSH_MIN_SIDE_OF_KNOB * cfg.knob_min_diameter || long > cfg.knob_max_diameter {
        trace!("blob at {:?}: flush size {:.1} out of range", blob.center(), long);
        return None;
    }
    let contrast = rect_contrast(
        luma,
        blob.min_x as f32,
        blob.min_y as f32,
        (blob.max_x + 1) as f32,
        (blob.max_y + 1) as f32,
    );
    if contrast < cfg.flush_contrast_floor {
        trace!("blob at {:?}: flush contrast {:.3}", blob.center(), contrast);
        return None;
    }
    if aspect >= SWITCH_MIN_ASPECT {
        Some((ControlKind::MultiSwitch, SWITCH_CONFIDENCE, None))
    } else {
        Some((ControlKind::Button, BUTTON_CONFIDENCE, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::Band;
    use crate::components::label_components;
    use crate::test_images::{dist, preprocessed, Rgb};

    fn context(w: usize, h: usize, f: impl Fn(usize, usize) -> Rgb) -> DetectionContext {
        let pre = preprocessed(w, h, f);
        let mut ctx = DetectionContext::new(pre, w as u32, h as u32);
        ctx.blobs = label_components(&ctx.mask);
        ctx.bands = vec![Band {
            top: 0.0,
            bottom: h as f32,
        }];
        ctx
    }

    #[test]
    fn white_disk_becomes_a_knob() {
        let mut ctx = context(120, 100, |x, y| {
            if dist(x, y, 60.0, 50.0) <= 20.0 {
                Rgb::WHITE
            } else {
                Rgb::BLACK
            }
        });
        let cfg = DetectorConfig::default();
        assert_eq!(classify_blobs(&mut ctx, &cfg), 1);
        let knob = &ctx.drafts[0];
        assert_eq!(knob.kind, ControlKind::Knob);
        assert!((knob.center.x - 60.5).abs() <= 1.5);
        assert!((knob.center.y - 50.5).abs() <= 1.5);
        assert!((knob.diameter() - 41.0).abs() <= 4.0, "d {}", knob.diameter());
        assert!(knob.confidence >= 0.6);
    }

    #[test]
    fn dark_square_becomes_a_button_and_bar_a_switch() {
        let mut ctx = context(200, 100, |x, y| {
            let square = (30..70).contains(&x) && (30..70).contains(&y);
            let bar = (110..180).contains(&x) && (40..60).contains(&y);
            Rgb::gray(if square || bar { 0.1 } else { 0.6 })
        });
        let cfg = DetectorConfig::default();
        classify_blobs(&mut ctx, &cfg);
        let mut kinds: Vec<ControlKind> = ctx.drafts.iter().map(|d| d.kind).collect();
        kinds.sort();
        assert_eq!(kinds, vec![ControlKind::MultiSwitch, ControlKind::Button]);
        for d in &ctx.drafts {
            assert!(d.radius.is_none());
            assert!(d.rect.is_within(200, 100));
        }
    }

    #[test]
    fn blobs_outside_every_band_are_ignored() {
        let mut ctx = context(120, 100, |x, y| {
            if dist(x, y, 60.0, 50.0) <= 20.0 {
                Rgb::WHITE
            } else {
                Rgb::BLACK
            }
        });
        ctx.bands = vec![Band {
            top: 0.0,
            bottom: 8.0,
        }];
        assert_eq!(classify_blobs(&mut ctx, &DetectorConfig::default()), 0);
    }

    #[test]
    fn printed_ring_is_not_classified() {
        let mut ctx = context(80, 80, |x, y| {
            let d = dist(x, y, 40.0, 40.0);
            Rgb::gray(if (5.5..=8.0).contains(&d) { 0.95 } else { 0.5 })
        });
        let cfg = DetectorConfig::default();
        classify_blobs(&mut ctx, &cfg);
        assert!(ctx
            .drafts
            .iter()
            .all(|d| d.kind != ControlKind::Knob && d.kind != ControlKind::Light));
    }
}
