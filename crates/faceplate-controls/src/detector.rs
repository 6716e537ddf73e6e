use faceplate_core::PixelBuffer;
use log::debug;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::bands::{detect_bands, Band};
use crate::blobs::classify_blobs;
use crate::circles::find_circles;
use crate::columns::merge_columns;
use crate::components::label_components;
use crate::config::DetectorConfig;
use crate::context::DetectionContext;
use crate::error::{CancelToken, DetectError, Stage};
use crate::labels::assign_labels;
use crate::nms::{non_max_suppression, suppress_overlaps, NMS_IOU};
use crate::post_filter::post_filter;
use crate::preprocess::preprocess;
use crate::promote::promote;
use crate::types::ControlDraft;

/// Smallest blob side, in working pixels, that counts towards the typical
/// control height used by band detection.
const MIN_BAND_CONTROL_SIDE: f32 = 4.0;

/// Faceplate control detector.
///
/// Holds an immutable configuration; every call builds its own
/// [`DetectionContext`], so one detector may serve concurrent calls.
#[derive(Clone, Debug, Default)]
pub struct ControlDetector {
    config: DetectorConfig,
}

impl ControlDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn with_sensitivity(sensitivity: f32) -> Self {
        Self::new(DetectorConfig::from_sensitivity(sensitivity))
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect controls. Degenerate images yield an empty list.
    pub fn detect(&self, image: &PixelBuffer<'_>) -> Vec<ControlDraft> {
        detect(image, &self.config)
    }

    /// Detect controls, giving up between stages once `cancel` is set.
    pub fn detect_cancellable(
        &self,
        image: &PixelBuffer<'_>,
        cancel: &CancelToken,
    ) -> Result<Vec<ControlDraft>, DetectError> {
        run(image, &self.config, cancel)
    }
}

/// Detect controls in `image` with `config`.
pub fn detect(image: &PixelBuffer<'_>, config: &DetectorConfig) -> Vec<ControlDraft> {
    // A token nobody else holds is never cancelled.
    run(image, config, &CancelToken::new()).unwrap_or_default()
}

#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(image, cfg, cancel),
        fields(width = image.width, height = image.height)
    )
)]
fn run(
    image: &PixelBuffer<'_>,
    cfg: &DetectorConfig,
    cancel: &CancelToken,
) -> Result<Vec<ControlDraft>, DetectError> {
    cancel.check(Stage::Preprocess)?;
    let (Ok(width), Ok(height)) = (u32::try_from(image.width), u32::try_from(image.height)) else {
        return Ok(Vec::new());
    };
    let Some(pre) = preprocess(image, cfg) else {
        return Ok(Vec::new());
    };
    let mut ctx = DetectionContext::new(pre, width, height);

    cancel.check(Stage::Components)?;
    ctx.blobs = label_components(&ctx.mask);

    cancel.check(Stage::Bands)?;
    let min_side = MIN_BAND_CONTROL_SIDE.max(0.5 * ctx.to_working_len(cfg.knob_min_diameter));
    ctx.bands = detect_bands(&ctx.mask, &ctx.blobs, min_side);
    if ctx.bands.is_empty() {
        debug!("detect: no bands, nothing to do");
        return Ok(Vec::new());
    }

    cancel.check(Stage::Blobs)?;
    classify_blobs(&mut ctx, cfg);
    find_circles(&mut ctx, cfg, cancel)?;

    let drafts = finish(
        std::mem::take(&mut ctx.drafts),
        &ctx.source_bands(),
        cfg,
        (width, height),
        cancel,
    )?;
    debug!("detect: {} drafts", drafts.len());
    Ok(drafts)
}

/// Fuse, promote, filter, deduplicate, align and label the raw drafts of
/// both finders. `bands` are in source rows.
fn finish(
    drafts: Vec<ControlDraft>,
    bands: &[Band],
    cfg: &DetectorConfig,
    (width, height): (u32, u32),
    cancel: &CancelToken,
) -> Result<Vec<ControlDraft>, DetectError> {
    cancel.check(Stage::Promote)?;
    // Blob and circle stages see the same controls; fuse them before pairing.
    let drafts = suppress_overlaps(drafts, NMS_IOU);
    let drafts = promote(drafts);

    cancel.check(Stage::PostFilter)?;
    let drafts = post_filter(drafts);

    cancel.check(Stage::Suppress)?;
    let drafts = non_max_suppression(drafts);

    cancel.check(Stage::Columns)?;
    let drafts = merge_columns(drafts, bands, cfg.max_grid_snap_shift_px, width, height);

    cancel.check(Stage::Labels)?;
    Ok(assign_labels(clamp_to_image(drafts, width, height)))
}

fn clamp_to_image(drafts: Vec<ControlDraft>, width: u32, height: u32) -> Vec<ControlDraft> {
    drafts
        .into_iter()
        .filter_map(|mut d| {
            d.rect = d.rect.clamped(width, height)?;
            d.center.x = d.center.x.clamp(0.0, width as f32);
            d.center.y = d.center.y.clamp(0.0, height as f32);
            let confidence = d.confidence;
            d.set_confidence(confidence);
            Some(d)
        })
        .collect()
}
