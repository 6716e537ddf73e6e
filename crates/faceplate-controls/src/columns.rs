//! Per-band column merging and cross-band column snapping for knobs.
//!
//! All coordinates here are source pixels; `bands` must already be mapped to
//! source rows.

use faceplate_core::stats::{consecutive_gaps, lower_quartile, median};
use log::{debug, trace};

use crate::bands::{nearest_band, Band};
use crate::types::{by_strength, ControlDraft};

/// Within-band merge tolerance caps.
const MERGE_OF_DIAMETER: f32 = 0.45;
const MERGE_OF_GAP: f32 = 0.6;
/// Merged knobs must also agree vertically within this fraction of the
/// band's median diameter.
const MERGE_VERTICAL_OF_DIAMETER: f32 = 0.5;
const MIN_GAP: f32 = 1.0;
/// Grid seeds closer than this fraction of the median knob diameter merge.
const SEED_MERGE_OF_DIAMETER: f32 = 0.3;
/// Knobs further than this fraction of the diameter from a seed stay put.
const SNAP_OF_DIAMETER: f32 = 0.5;

/// Collapse duplicate knobs inside each band, then align knob columns across
/// two bands.
pub fn merge_columns(
    drafts: Vec<ControlDraft>,
    bands: &[Band],
    max_shift: f32,
    width: u32,
    height: u32,
) -> Vec<ControlDraft> {
    let before = drafts.len();
    let mut drafts = merge_within_bands(drafts, bands);
    if bands.len() == 2 {
        snap_across_bands(&mut drafts, max_shift, width, height);
    }
    debug!("columns: {} -> {} drafts", before, drafts.len());
    drafts
}

fn band_of(draft: &ControlDraft, bands: &[Band]) -> Option<usize> {
    nearest_band(bands, draft.center.y)
}

fn merge_within_bands(mut drafts: Vec<ControlDraft>, bands: &[Band]) -> Vec<ControlDraft> {
    drafts.sort_by(by_strength);
    let mut keep = vec![true; drafts.len()];
    for band in 0..bands.len() {
        let members: Vec<usize> = (0..drafts.len())
            .filter(|&i| drafts[i].kind.is_knob_like() && band_of(&drafts[i], bands) == Some(band))
            .collect();
        if members.len() < 2 {
            continue;
        }
        let diameters: Vec<f32> = members.iter().map(|&i| drafts[i].diameter()).collect();
        let xs: Vec<f32> = members.iter().map(|&i| drafts[i].center.x).collect();
        let Some(d) = median(&diameters) else {
            continue;
        };
        let mut tol = MERGE_OF_DIAMETER * d;
        if let Some(gap) = lower_quartile(&consecutive_gaps(&xs, MIN_GAP)) {
            tol = tol.min(MERGE_OF_GAP * gap);
        }
        let dy_tol = MERGE_VERTICAL_OF_DIAMETER * d;

        // Members are in strength order, so the first of a cluster wins.
        let mut kept: Vec<usize> = Vec::new();
        for &i in &members {
            let duplicate = kept.iter().any(|&k| {
                (drafts[k].center.x - drafts[i].center.x).abs() <= tol
                    && (drafts[k].center.y - drafts[i].center.y).abs() <= dy_tol
            });
            if duplicate {
                trace!("columns: merged draft {} in band {}", drafts[i].id, band);
                keep[i] = false;
            } else {
                kept.push(i);
            }
        }
    }
    drafts
        .into_iter()
        .zip(keep)
        .filter_map(|(d, k)| k.then_some(d))
        .collect()
}

/// Column seeds: sorted knob x positions, chained within `tol` and averaged.
fn column_seeds(xs: &mut [f32], tol: f32) -> Vec<f32> {
    xs.sort_by(|a, b| a.total_cmp(b));
    let mut seeds = Vec::new();
    let mut group: Vec<f32> = Vec::new();
    for &x in xs.iter() {
        if let Some(&last) = group.last() {
            if x - last > tol {
                seeds.push(group.iter().sum::<f32>() / group.len() as f32);
                group.clear();
            }
        }
        group.push(x);
    }
    if !group.is_empty() {
        seeds.push(group.iter().sum::<f32>() / group.len() as f32);
    }
    seeds
}

fn snap_across_bands(drafts: &mut [ControlDraft], max_shift: f32, width: u32, height: u32) {
    let knobs: Vec<usize> = (0..drafts.len())
        .filter(|&i| drafts[i].kind.is_knob_like())
        .collect();
    let diameters: Vec<f32> = knobs.iter().map(|&i| drafts[i].diameter()).collect();
    let Some(d) = median(&diameters) else {
        return;
    };
    let mut xs: Vec<f32> = knobs.iter().map(|&i| drafts[i].center.x).collect();
    let seeds = column_seeds(&mut xs, SEED_MERGE_OF_DIAMETER * d);
    let snap_tol = SNAP_OF_DIAMETER * d;
    let max_shift = max_shift.max(0.0);

    for &i in &knobs {
        let x = drafts[i].center.x;
        let Some(seed) = seeds
            .iter()
            .copied()
            .min_by(|a, b| (a - x).abs().total_cmp(&(b - x).abs()))
        else {
            continue;
        };
        let dx = seed - x;
        if dx.abs() > snap_tol {
            continue;
        }
        let shift = dx.clamp(-max_shift, max_shift).round() as i32;
        let draft = &mut drafts[i];
        let moved = draft.rect.translated_clamped(shift, 0, width, height);
        // Follow the rect so center and box never drift apart.
        draft.center.x = (x + moved.x as f32 - draft.rect.x as f32).clamp(0.0, width as f32);
        draft.rect = moved;
    }
}
