//! Compound controls: lit buttons and concentric knobs.

use log::debug;

use crate::types::{by_strength, ControlDraft, ControlKind};

/// Inset of a button's rect that a light must fall inside to be its lamp.
const LIT_BUTTON_INSET: f32 = 0.18;
const LIT_BUTTON_BOOST: f32 = 0.12;
/// Inner/outer radius ratio of a concentric pair.
const CONCENTRIC_RATIO: (f32, f32) = (0.35, 0.70);
/// Center tolerance of a concentric pair: `fraction * outer radius + px`.
const CONCENTRIC_CENTER_FRACTION: f32 = 0.2;
const CONCENTRIC_CENTER_PX: f32 = 2.0;
const CONCENTRIC_BOOST: f32 = 0.08;

/// Merge lights into the buttons that hold them and nested knobs into
/// concentric knobs.
pub fn promote(drafts: Vec<ControlDraft>) -> Vec<ControlDraft> {
    let before = drafts.len();
    let drafts = promote_concentric(promote_lit_buttons(drafts));
    debug!("promote: {} -> {} drafts", before, drafts.len());
    drafts
}

fn promote_lit_buttons(mut drafts: Vec<ControlDraft>) -> Vec<ControlDraft> {
    drafts.sort_by(by_strength);
    let mut absorbed = vec![false; drafts.len()];
    for b in 0..drafts.len() {
        if drafts[b].kind != ControlKind::Button {
            continue;
        }
        let rect = drafts[b].rect;
        let mut lit = false;
        for l in 0..drafts.len() {
            if absorbed[l] || drafts[l].kind != ControlKind::Light {
                continue;
            }
            if rect.inset_contains(LIT_BUTTON_INSET, drafts[l].center) {
                absorbed[l] = true;
                lit = true;
            }
        }
        if lit {
            let button = &mut drafts[b];
            button.kind = ControlKind::LitButton;
            button.label = ControlKind::LitButton.base_name().to_string();
            let boosted = button.confidence + LIT_BUTTON_BOOST;
            button.set_confidence(boosted);
        }
    }
    drafts
        .into_iter()
        .zip(absorbed)
        .filter_map(|(d, gone)| (!gone).then_some(d))
        .collect()
}

fn promote_concentric(mut drafts: Vec<ControlDraft>) -> Vec<ControlDraft> {
    let mut order: Vec<usize> = (0..drafts.len())
        .filter(|&i| drafts[i].kind.is_single_knob() && drafts[i].radius.is_some())
        .collect();
    order.sort_by(|&a, &b| {
        drafts[b]
            .effective_radius()
            .total_cmp(&drafts[a].effective_radius())
            .then(drafts[a].id.cmp(&drafts[b].id))
    });

    let mut matched = vec![false; drafts.len()];
    let mut dropped = vec![false; drafts.len()];
    for (pos, &outer) in order.iter().enumerate() {
        if matched[outer] {
            continue;
        }
        let big = drafts[outer].effective_radius();
        let tol = CONCENTRIC_CENTER_FRACTION * big + CONCENTRIC_CENTER_PX;
        let partner = order[pos + 1..]
            .iter()
            .copied()
            .filter(|&inner| !matched[inner])
            .filter(|&inner| {
                let ratio = drafts[inner].effective_radius() / big;
                (CONCENTRIC_RATIO.0..=CONCENTRIC_RATIO.1).contains(&ratio)
                    && (drafts[inner].center - drafts[outer].center).norm() <= tol
            })
            .min_by(|&a, &b| {
                let da = (drafts[a].center - drafts[outer].center).norm();
                let db = (drafts[b].center - drafts[outer].center).norm();
                da.total_cmp(&db).then(drafts[a].id.cmp(&drafts[b].id))
            });
        let Some(inner) = partner else {
            continue;
        };
        matched[outer] = true;
        matched[inner] = true;
        dropped[inner] = true;
        let confidence = drafts[outer].confidence.max(drafts[inner].confidence) + CONCENTRIC_BOOST;
        let knob = &mut drafts[outer];
        knob.kind = ControlKind::ConcentricKnob;
        knob.label = ControlKind::ConcentricKnob.base_name().to_string();
        knob.set_confidence(confidence);
    }
    drafts
        .into_iter()
        .zip(dropped)
        .filter_map(|(d, gone)| (!gone).then_some(d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::{rect_draft, round_draft};
    use faceplate_core::PixelRect;

    fn count(drafts: &[ControlDraft], kind: ControlKind) -> usize {
        drafts.iter().filter(|d| d.kind == kind).count()
    }

    #[test]
    fn light_inside_button_makes_a_lit_button() {
        let drafts = vec![
            rect_draft(0, ControlKind::Button, PixelRect::new(50, 30, 50, 50), 0.5),
            round_draft(1, ControlKind::Light, 75.0, 55.0, 10.0, 0.7),
            round_draft(2, ControlKind::Light, 74.0, 57.0, 9.0, 0.6),
            round_draft(3, ControlKind::Light, 200.0, 55.0, 6.0, 0.6),
        ];
        let out = promote(drafts);
        assert_eq!(count(&out, ControlKind::LitButton), 1);
        assert_eq!(count(&out, ControlKind::Button), 0);
        assert_eq!(count(&out, ControlKind::Light), 1);
        let lit = out
            .iter()
            .find(|d| d.kind == ControlKind::LitButton)
            .expect("lit button");
        assert_eq!(lit.label, "Lit Button");
        assert!((lit.confidence - 0.62).abs() < 1e-6);
    }

    #[test]
    fn light_near_button_edge_stays_separate() {
        let drafts = vec![
            rect_draft(0, ControlKind::Button, PixelRect::new(50, 30, 50, 50), 0.5),
            round_draft(1, ControlKind::Light, 53.0, 33.0, 4.0, 0.7),
        ];
        let out = promote(drafts);
        assert_eq!(count(&out, ControlKind::Button), 1);
        assert_eq!(count(&out, ControlKind::Light), 1);
    }

    #[test]
    fn nested_knobs_become_one_concentric_knob() {
        let drafts = vec![
            round_draft(0, ControlKind::Knob, 80.0, 60.0, 15.0, 0.8),
            round_draft(1, ControlKind::Knob, 81.0, 60.0, 30.0, 0.7),
            round_draft(2, ControlKind::Knob, 200.0, 60.0, 30.0, 0.7),
        ];
        let out = promote(drafts);
        assert_eq!(out.len(), 2);
        let c = out
            .iter()
            .find(|d| d.kind == ControlKind::ConcentricKnob)
            .expect("concentric");
        assert_eq!(c.id, 1);
        assert_eq!(c.radius, Some(30.0));
        assert!((c.confidence - 0.88).abs() < 1e-6);
        assert_eq!(c.label, "Concentric");
    }

    #[test]
    fn each_knob_pairs_at_most_once() {
        // Three nested rims: outer pairs with middle, the innermost stays.
        let drafts = vec![
            round_draft(0, ControlKind::Knob, 80.0, 60.0, 40.0, 0.7),
            round_draft(1, ControlKind::Knob, 80.0, 60.0, 20.0, 0.7),
            round_draft(2, ControlKind::Knob, 80.0, 60.0, 9.0, 0.7),
        ];
        let out = promote(drafts);
        assert_eq!(count(&out, ControlKind::ConcentricKnob), 1);
        assert_eq!(count(&out, ControlKind::Knob), 1);
        assert!(out.iter().any(|d| d.id == 2));
    }

    #[test]
    fn similar_sizes_are_not_concentric() {
        let drafts = vec![
            round_draft(0, ControlKind::Knob, 80.0, 60.0, 20.0, 0.7),
            round_draft(1, ControlKind::Knob, 80.0, 60.0, 18.0, 0.7),
        ];
        assert_eq!(count(&promote(drafts), ControlKind::ConcentricKnob), 0);
    }
}
