//! Ordinal labels in reading order.

use faceplate_core::stats::median;

use crate::types::{ControlDraft, ControlKind};

const MIN_ROW_TOLERANCE: f32 = 4.0;
const ROW_TOLERANCE_OF_HEIGHT: f32 = 0.5;
/// Labels that carry no information beyond the kind.
const GENERIC_WORDS: [&str; 3] = ["Control", "LED", "Dial"];

/// Whether `label` is empty, a bare kind or generic word, or such a word
/// followed by a number.
pub fn is_generic_label(label: &str) -> bool {
    let label = label.trim();
    if label.is_empty() {
        return true;
    }
    let stem = match label.rsplit_once(' ') {
        Some((head, tail)) if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) => {
            head.trim_end()
        }
        _ => label,
    };
    ControlKind::ALL
        .iter()
        .map(|k| k.base_name())
        .chain(GENERIC_WORDS)
        .any(|word| word.eq_ignore_ascii_case(stem))
}

/// Order drafts row by row, then left to right.
fn reading_order(drafts: &mut [ControlDraft]) {
    let heights: Vec<f32> = drafts.iter().map(|d| d.rect.height as f32).collect();
    let tol = MIN_ROW_TOLERANCE.max(ROW_TOLERANCE_OF_HEIGHT * median(&heights).unwrap_or(0.0));
    drafts.sort_by(|a, b| a.center.y.total_cmp(&b.center.y).then(a.id.cmp(&b.id)));

    let mut row = 0usize;
    let mut anchor = f32::NEG_INFINITY;
    let mut rows = Vec::with_capacity(drafts.len());
    for d in drafts.iter() {
        if d.center.y - anchor > tol {
            if anchor.is_finite() {
                row += 1;
            }
            anchor = d.center.y;
        }
        rows.push(row);
    }
    let mut keyed: Vec<(usize, ControlDraft)> = rows.into_iter().zip(drafts.iter().cloned()).collect();
    keyed.sort_by(|(ra, a), (rb, b)| {
        ra.cmp(rb)
            .then(a.center.x.total_cmp(&b.center.x))
            .then(a.id.cmp(&b.id))
    });
    for (slot, (_, d)) in drafts.iter_mut().zip(keyed) {
        *slot = d;
    }
}

/// Number drafts per kind and return them grouped by kind in reading order.
///
/// Only generic labels are replaced.
pub fn assign_labels(drafts: Vec<ControlDraft>) -> Vec<ControlDraft> {
    let mut out = Vec::with_capacity(drafts.len());
    for kind in ControlKind::ALL {
        let mut group: Vec<ControlDraft> = drafts.iter().filter(|d| d.kind == kind).cloned().collect();
        reading_order(&mut group);
        for (n, d) in group.iter_mut().enumerate() {
            if is_generic_label(&d.label) {
                d.label = format!("{} {}", kind.base_name(), n + 1);
            }
        }
        out.extend(group);
    }
    out
}
