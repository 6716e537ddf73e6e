use faceplate_core::PixelRect;
use nalgebra::Point2;

use crate::bands::Band;
use crate::components::Blob;
use crate::preprocess::{EdgeMap, InterestMask, Preprocessed, WorkingImage};
use crate::radial::RIM_SAMPLES;
use crate::sampling::{RingSampler, UnitCircle};
use crate::types::{ControlDraft, ControlKind};

/// Working state of one detection run.
///
/// Owned exclusively by a single run and handed to each stage by `&mut`.
/// Planes, mask, blobs and bands are in working-resolution pixels; drafts are
/// in source pixels.
#[derive(Debug)]
pub struct DetectionContext {
    pub image: WorkingImage,
    pub edges: EdgeMap,
    pub mask: InterestMask,
    pub blobs: Vec<Blob>,
    pub bands: Vec<Band>,
    /// Working width / source width.
    pub scale_x: f32,
    /// Working height / source height.
    pub scale_y: f32,
    pub source_width: u32,
    pub source_height: u32,
    pub drafts: Vec<ControlDraft>,
    pub(crate) sampler: RingSampler,
    pub(crate) rim: UnitCircle,
    next_id: u32,
}

impl DetectionContext {
    pub fn new(pre: Preprocessed, source_width: u32, source_height: u32) -> Self {
        Self {
            image: pre.image,
            edges: pre.edges,
            mask: pre.mask,
            blobs: Vec::new(),
            bands: Vec::new(),
            scale_x: pre.scale_x,
            scale_y: pre.scale_y,
            source_width,
            source_height,
            drafts: Vec::new(),
            sampler: RingSampler::default(),
            rim: UnitCircle::new(RIM_SAMPLES),
            next_id: 0,
        }
    }

    /// Mean working/source scale, used for lengths.
    #[inline]
    pub fn scale(&self) -> f32 {
        0.5 * (self.scale_x + self.scale_y)
    }

    #[inline]
    pub fn to_source_len(&self, working: f32) -> f32 {
        working / self.scale()
    }

    #[inline]
    pub fn to_working_len(&self, source: f32) -> f32 {
        source * self.scale()
    }

    /// Map a working pixel-center coordinate to continuous source
    /// coordinates, where pixel `i` spans `[i, i + 1)`.
    pub fn to_source(&self, p: Point2<f32>) -> Point2<f32> {
        Point2::new((p.x + 0.5) / self.scale_x, (p.y + 0.5) / self.scale_y)
    }

    /// Inverse of [`Self::to_source`].
    pub fn to_working(&self, p: Point2<f32>) -> Point2<f32> {
        Point2::new(p.x * self.scale_x - 0.5, p.y * self.scale_y - 0.5)
    }

    /// Bands in source rows.
    pub fn source_bands(&self) -> Vec<Band> {
        self.bands
            .iter()
            .map(|b| Band {
                top: b.top / self.scale_y,
                bottom: b.bottom / self.scale_y,
            })
            .collect()
    }

    pub(crate) fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Source-pixel rect of a working-resolution circle, clamped to the image.
    pub(crate) fn circle_rect(&self, center: Point2<f32>, radius: f32) -> Option<PixelRect> {
        PixelRect::around_circle(
            self.to_source(center),
            self.to_source_len(radius),
            self.source_width,
            self.source_height,
        )
    }

    /// Build a circular draft from a working-resolution circle.
    ///
    /// Returns `None` when the circle falls entirely outside the image.
    pub(crate) fn circle_draft(
        &mut self,
        kind: ControlKind,
        center: Point2<f32>,
        radius: f32,
        confidence: f32,
    ) -> Option<ControlDraft> {
        let rect = self.circle_rect(center, radius)?;
        let center = self.to_source(center);
        let radius = self.to_source_len(radius);
        let mut draft = ControlDraft {
            id: self.next_id(),
            kind,
            rect,
            center,
            radius: Some(radius),
            label: kind.base_name().to_string(),
            confidence: 0.0,
        };
        draft.set_confidence(confidence);
        Some(draft)
    }

    /// Build a box draft covering a blob's bounding box.
    pub(crate) fn box_draft(
        &mut self,
        kind: ControlKind,
        blob: &Blob,
        confidence: f32,
    ) -> Option<ControlDraft> {
        let rect = PixelRect::from_bounds_clamped(
            blob.min_x as f32 / self.scale_x,
            blob.min_y as f32 / self.scale_y,
            (blob.max_x + 1) as f32 / self.scale_x,
            (blob.max_y + 1) as f32 / self.scale_y,
            self.source_width,
            self.source_height,
        )?;
        let mut draft = ControlDraft {
            id: self.next_id(),
            kind,
            rect,
            center: rect.center(),
            radius: None,
            label: kind.base_name().to_string(),
            confidence: 0.0,
        };
        draft.set_confidence(confidence);
        Some(draft)
    }
}
