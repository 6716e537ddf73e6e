//! Learned knob floor and column validity.

use faceplate_core::stats::{consecutive_gaps, median};
use log::debug;

use crate::types::{ControlDraft, ControlKind};

/// Knob diameters needed before a floor is learned.
pub const KNOB_FLOOR_MIN_SAMPLES: usize = 8;
/// Learned floor as a fraction of the median top-half knob diameter.
const KNOB_FLOOR_FRACTION: f32 = 0.45;
const MIN_COLUMN_TOLERANCE: f32 = 4.0;
const COLUMN_TOLERANCE_OF_GAP: f32 = 0.5;
/// Gaps at or below this many pixels are stacked items, not column spacing.
const MIN_COLUMN_GAP: f32 = 1.0;

/// Minimum knob diameter learned from the upper half of knob sizes.
///
/// `None` with fewer than [`KNOB_FLOOR_MIN_SAMPLES`] single knobs.
pub fn learned_knob_floor(drafts: &[ControlDraft]) -> Option<f32> {
    let mut diameters: Vec<f32> = drafts
        .iter()
        .filter(|d| d.kind.is_single_knob())
        .map(ControlDraft::diameter)
        .filter(|d| d.is_finite())
        .collect();
    if diameters.len() < KNOB_FLOOR_MIN_SAMPLES {
        return None;
    }
    diameters.sort_by(|a, b| a.total_cmp(b));
    let top_half = &diameters[diameters.len() / 2..];
    median(top_half).map(|m| KNOB_FLOOR_FRACTION * m)
}

/// Drop undersized knobs, then the non-light members of implausible columns.
pub fn post_filter(drafts: Vec<ControlDraft>) -> Vec<ControlDraft> {
    let before = drafts.len();
    let floor = learned_knob_floor(&drafts);
    let drafts: Vec<ControlDraft> = match floor {
        Some(floor) => drafts
            .into_iter()
            .filter(|d| !d.kind.is_single_knob() || d.diameter() >= floor)
            .collect(),
        None => drafts,
    };
    let after_floor = drafts.len();
    let drafts = filter_columns(drafts);
    debug!(
        "post filter: {} -> {} (floor {:?}) -> {}",
        before,
        after_floor,
        floor,
        drafts.len()
    );
    drafts
}

/// Group indices into columns by chaining x-sorted centers.
pub(crate) fn x_columns(drafts: &[ControlDraft]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..drafts.len()).collect();
    order.sort_by(|&a, &b| {
        drafts[a]
            .center
            .x
            .total_cmp(&drafts[b].center.x)
            .then(drafts[a].id.cmp(&drafts[b].id))
    });
    let xs: Vec<f32> = order.iter().map(|&i| drafts[i].center.x).collect();
    let gap = median(&consecutive_gaps(&xs, MIN_COLUMN_GAP)).unwrap_or(0.0);
    let tol = MIN_COLUMN_TOLERANCE.max(COLUMN_TOLERANCE_OF_GAP * gap);

    let mut columns: Vec<Vec<usize>> = Vec::new();
    let mut last_x = f32::NEG_INFINITY;
    for &i in &order {
        let x = drafts[i].center.x;
        match columns.last_mut() {
            Some(column) if x - last_x <= tol => column.push(i),
            _ => columns.push(vec![i]),
        }
        last_x = x;
    }
    columns
}

/// A column stands with two lights, or with any knob-like or flush control.
fn column_is_valid(drafts: &[ControlDraft], column: &[usize]) -> bool {
    let members = || column.iter().map(|&i| &drafts[i]);
    members().filter(|d| d.kind == ControlKind::Light).count() >= 2
        || members().any(|d| d.kind.is_knob_like() || d.kind.is_flush())
}

fn filter_columns(drafts: Vec<ControlDraft>) -> Vec<ControlDraft> {
    let mut keep = vec![true; drafts.len()];
    for column in x_columns(&drafts) {
        if column_is_valid(&drafts, &column) {
            continue;
        }
        for &i in &column {
            if drafts[i].kind != ControlKind::Light {
                keep[i] = false;
            }
        }
    }
    drafts
        .into_iter()
        .zip(keep)
        .filter_map(|(d, k)| k.then_some(d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::round_draft;

    fn knob_row(n: u32, r: f32) -> Vec<ControlDraft> {
        (0..n)
            .map(|i| round_draft(i, ControlKind::Knob, 40.0 + 60.0 * i as f32, 50.0, r, 0.7))
            .collect()
    }

    #[test]
    fn no_floor_with_few_knobs() {
        assert_eq!(learned_knob_floor(&knob_row(7, 20.0)), None);
    }

    #[test]
    fn floor_drops_tiny_knobs() {
        let mut drafts = knob_row(8, 20.0);
        drafts.push(round_draft(100, ControlKind::Knob, 520.0, 50.0, 8.0, 0.9));
        let floor = learned_knob_floor(&drafts).expect("floor");
        assert!((floor - 18.0).abs() < 1e-4);
        let kept = post_filter(drafts);
        assert_eq!(kept.len(), 8);
        assert!(kept.iter().all(|d| d.id != 100));
    }

    #[test]
    fn low_confidence_knob_keeps_its_column() {
        let drafts = vec![
            round_draft(0, ControlKind::Knob, 50.0, 50.0, 20.0, 0.8),
            round_draft(1, ControlKind::Knob, 150.0, 50.0, 20.0, 0.45),
            round_draft(2, ControlKind::Knob, 250.0, 50.0, 20.0, 0.8),
        ];
        let kept: Vec<u32> = post_filter(drafts).iter().map(|d| d.id).collect();
        assert_eq!(kept, vec![0, 1, 2]);
    }

    #[test]
    fn lone_lights_are_always_kept() {
        let drafts = vec![
            round_draft(0, ControlKind::Knob, 50.0, 50.0, 20.0, 0.8),
            round_draft(1, ControlKind::Light, 150.0, 50.0, 5.0, 0.6),
            round_draft(2, ControlKind::MultiSwitch, 250.0, 50.0, 10.0, 0.6),
        ];
        let columns = x_columns(&drafts);
        assert_eq!(columns.len(), 3);
        assert!(!column_is_valid(&drafts, &columns[1]));
        assert!(column_is_valid(&drafts, &columns[2]));
        let kept: Vec<u32> = post_filter(drafts).iter().map(|d| d.id).collect();
        assert_eq!(kept, vec![0, 1, 2]);
    }

    #[test]
    fn stacked_items_share_a_column() {
        let drafts = vec![
            round_draft(0, ControlKind::Knob, 50.0, 50.0, 20.0, 0.8),
            round_draft(1, ControlKind::Knob, 52.0, 150.0, 20.0, 0.8),
            round_draft(2, ControlKind::Knob, 150.0, 50.0, 20.0, 0.8),
        ];
        let columns = x_columns(&drafts);
        assert_eq!(columns, vec![vec![0, 1], vec![2]]);
    }
}
