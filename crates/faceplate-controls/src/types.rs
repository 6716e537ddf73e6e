use faceplate_core::PixelRect;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Closed set of control kinds a draft can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlKind {
    Knob,
    SteppedKnob,
    MultiSwitch,
    Button,
    LitButton,
    Light,
    ConcentricKnob,
}

impl ControlKind {
    pub const ALL: [ControlKind; 7] = [
        ControlKind::Knob,
        ControlKind::SteppedKnob,
        ControlKind::MultiSwitch,
        ControlKind::Button,
        ControlKind::LitButton,
        ControlKind::Light,
        ControlKind::ConcentricKnob,
    ];

    /// Human-readable base of generated labels ("Knob 3").
    pub fn base_name(self) -> &'static str {
        match self {
            ControlKind::Knob => "Knob",
            ControlKind::SteppedKnob => "Stepped Knob",
            ControlKind::MultiSwitch => "Switch",
            ControlKind::Button => "Button",
            ControlKind::LitButton => "Lit Button",
            ControlKind::Light => "Light",
            ControlKind::ConcentricKnob => "Concentric",
        }
    }

    /// Rotary kinds taking part in the knob floor, column merging and grid snapping.
    pub fn is_knob_like(self) -> bool {
        matches!(
            self,
            ControlKind::Knob | ControlKind::SteppedKnob | ControlKind::ConcentricKnob
        )
    }

    /// Kinds that may pair up into a concentric knob.
    pub fn is_single_knob(self) -> bool {
        matches!(self, ControlKind::Knob | ControlKind::SteppedKnob)
    }

    /// Push-style or lever controls that may sit flush with the panel.
    pub fn is_flush(self) -> bool {
        matches!(
            self,
            ControlKind::Button | ControlKind::LitButton | ControlKind::MultiSwitch
        )
    }
}

/// A proposed control in source-image pixel space.
///
/// `rect` always lies inside the source image bounds; `confidence` is in
/// `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlDraft {
    pub id: u32,
    pub kind: ControlKind,
    pub rect: PixelRect,
    pub center: Point2<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
    pub label: String,
    pub confidence: f32,
}

impl ControlDraft {
    /// Radius if known, else half the shorter rect side.
    pub fn effective_radius(&self) -> f32 {
        self.radius
            .unwrap_or_else(|| 0.5 * self.rect.width.min(self.rect.height) as f32)
    }

    /// Diameter used by size statistics.
    pub fn diameter(&self) -> f32 {
        match self.radius {
            Some(r) => 2.0 * r,
            None => 0.5 * (self.rect.width + self.rect.height) as f32,
        }
    }

    pub(crate) fn set_confidence(&mut self, confidence: f32) {
        self.confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}

/// Order drafts by descending confidence, then larger radius, then id.
pub(crate) fn by_strength(a: &ControlDraft, b: &ControlDraft) -> std::cmp::Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.effective_radius().total_cmp(&a.effective_radius()))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn round_draft(id: u32, kind: ControlKind, x: f32, y: f32, r: f32, conf: f32) -> ControlDraft {
        let rect = PixelRect::around_circle(Point2::new(x, y), r, 4096, 4096).expect("rect");
        ControlDraft {
            id,
            kind,
            rect,
            center: Point2::new(x, y),
            radius: Some(r),
            label: kind.base_name().to_string(),
            confidence: conf,
        }
    }

    pub fn rect_draft(id: u32, kind: ControlKind, rect: PixelRect, conf: f32) -> ControlDraft {
        ControlDraft {
            id,
            kind,
            rect,
            center: rect.center(),
            radius: None,
            label: kind.base_name().to_string(),
            confidence: conf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::round_draft;
    use super::*;

    #[test]
    fn kinds_serialize_camel_case() {
        let json = serde_json::to_string(&ControlKind::ConcentricKnob).expect("json");
        assert_eq!(json, "\"concentricKnob\"");
        let kind: ControlKind = serde_json::from_str("\"litButton\"").expect("parse");
        assert_eq!(kind, ControlKind::LitButton);
    }

    #[test]
    fn strength_order_prefers_confidence_then_radius() {
        let mut v = vec![
            round_draft(0, ControlKind::Knob, 10.0, 10.0, 5.0, 0.5),
            round_draft(1, ControlKind::Knob, 10.0, 10.0, 8.0, 0.5),
            round_draft(2, ControlKind::Knob, 10.0, 10.0, 3.0, 0.9),
        ];
        v.sort_by(by_strength);
        let ids: Vec<u32> = v.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 1, 0]);
    }

    #[test]
    fn confidence_is_clamped() {
        let mut d = round_draft(0, ControlKind::Light, 5.0, 5.0, 2.0, 0.5);
        d.set_confidence(1.7);
        assert_eq!(d.confidence, 1.0);
        d.set_confidence(f32::NAN);
        assert_eq!(d.confidence, 0.0);
    }
}
