//! Same-kind overlap suppression and center deduplication.

use crate::types::{by_strength, ControlDraft};

/// Same-kind drafts overlapping above this IoU are duplicates.
pub const NMS_IOU: f32 = 0.60;
/// Smallest center distance at which two same-kind drafts are distinct.
const MIN_CENTER_TOLERANCE: f32 = 6.0;
const CENTER_TOLERANCE_OF_RADIUS: f32 = 0.35;

/// Greedy same-kind IoU suppression, strongest first.
///
/// The result is in strength order.
pub fn suppress_overlaps(mut drafts: Vec<ControlDraft>, iou: f32) -> Vec<ControlDraft> {
    drafts.sort_by(by_strength);
    let mut kept: Vec<ControlDraft> = Vec::with_capacity(drafts.len());
    for d in drafts {
        let duplicate = kept
            .iter()
            .any(|k| k.kind == d.kind && k.rect.iou(&d.rect) > iou);
        if !duplicate {
            kept.push(d);
        }
    }
    kept
}

/// Drop same-kind drafts whose centers nearly coincide with a stronger one.
pub fn dedupe_centers(mut drafts: Vec<ControlDraft>) -> Vec<ControlDraft> {
    drafts.sort_by(by_strength);
    let mut kept: Vec<ControlDraft> = Vec::with_capacity(drafts.len());
    for d in drafts {
        let duplicate = kept.iter().any(|k| {
            let tol = MIN_CENTER_TOLERANCE
                .max(CENTER_TOLERANCE_OF_RADIUS * k.effective_radius().min(d.effective_radius()));
            k.kind == d.kind && (k.center - d.center).norm() < tol
        });
        if !duplicate {
            kept.push(d);
        }
    }
    kept
}

/// IoU suppression followed by center deduplication.
pub fn non_max_suppression(drafts: Vec<ControlDraft>) -> Vec<ControlDraft> {
    dedupe_centers(suppress_overlaps(drafts, NMS_IOU))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::round_draft;
    use crate::types::ControlKind;

    #[test]
    fn overlapping_same_kind_keeps_strongest() {
        let drafts = vec![
            round_draft(0, ControlKind::Knob, 50.0, 50.0, 20.0, 0.6),
            round_draft(1, ControlKind::Knob, 52.0, 50.0, 20.0, 0.8),
            round_draft(2, ControlKind::Knob, 150.0, 50.0, 20.0, 0.5),
        ];
        let kept = suppress_overlaps(drafts, NMS_IOU);
        let ids: Vec<u32> = kept.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn different_kinds_may_overlap() {
        let drafts = vec![
            round_draft(0, ControlKind::Knob, 50.0, 50.0, 20.0, 0.6),
            round_draft(1, ControlKind::Light, 50.0, 50.0, 20.0, 0.8),
        ];
        assert_eq!(non_max_suppression(drafts).len(), 2);
    }

    #[test]
    fn close_centers_collapse_even_with_low_iou() {
        // Same center, very different radii: IoU 0.25 but one control.
        let drafts = vec![
            round_draft(0, ControlKind::Knob, 50.0, 50.0, 10.0, 0.9),
            round_draft(1, ControlKind::Knob, 53.0, 50.0, 20.0, 0.7),
        ];
        assert_eq!(suppress_overlaps(drafts.clone(), NMS_IOU).len(), 2);
        let kept = non_max_suppression(drafts);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 0);
    }

    #[test]
    fn survivors_respect_the_iou_bound() {
        let drafts: Vec<ControlDraft> = (0..20)
            .map(|i| {
                let x = 40.0 + 7.0 * i as f32;
                round_draft(i, ControlKind::Knob, x, 40.0, 15.0, 0.5 + 0.01 * i as f32)
            })
            .collect();
        let kept = non_max_suppression(drafts);
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                assert!(a.rect.iou(&b.rect) <= NMS_IOU);
            }
        }
    }
}
