//! Heuristic detector for controls on front-on photos of hardware faceplates.
//!
//! Given an RGBA image, the detector proposes knobs, buttons, switches, lights
//! and their compound forms (lit buttons, concentric knobs) as
//! [`ControlDraft`]s with source-pixel rectangles, centers, labels and
//! confidences. There is no learned model: every stage is a deterministic
//! heuristic, and a single sensitivity value in `[0, 1]` drives all of its
//! thresholds through [`DetectorConfig::from_sensitivity`].
//!
//! Pipeline:
//! 1. [`preprocess`]: downscale, stretch contrast, Sobel edges and a
//!    percentile interest mask.
//! 2. [`components`]: 4-connected blobs of the mask.
//! 3. [`bands`]: up to two horizontal rows of controls.
//! 4. [`blobs`]: shape/contrast classification of band blobs.
//! 5. [`circles`]: per-band gradient voting with [`radial`] rim checks.
//! 6. [`promote`]: lit buttons and concentric knobs.
//! 7. [`post_filter`], [`nms`], [`columns`]: outlier and duplicate removal.
//! 8. [`labels`]: "Knob 1", "Knob 2", ... in reading order.
//!
//! ```no_run
//! use faceplate_controls::{ControlDetector, PixelBuffer};
//!
//! # fn rgba() -> (usize, usize, Vec<u8>) { (0, 0, Vec::new()) }
//! let (width, height, data) = rgba();
//! let detector = ControlDetector::with_sensitivity(0.6);
//! for draft in detector.detect(&PixelBuffer::new(width, height, &data)) {
//!     println!("{} at {:?} ({:.2})", draft.label, draft.rect, draft.confidence);
//! }
//! ```

pub mod bands;
pub mod blobs;
pub mod circles;
pub mod columns;
pub mod components;
mod config;
pub mod context;
mod detector;
mod error;
pub mod io;
pub mod labels;
pub mod nms;
pub mod post_filter;
pub mod preprocess;
pub mod promote;
pub mod radial;
pub mod sampling;
mod types;

#[cfg(test)]
pub(crate) mod test_images;

pub use config::{DetectorConfig, MIN_WORKING_SIDE};
pub use context::DetectionContext;
pub use detector::{detect, ControlDetector};
pub use error::{CancelToken, DetectError, Stage};
pub use io::{DetectIoError, DetectReport, DetectRunConfig};
pub use types::{ControlDraft, ControlKind};

pub use faceplate_core::{PixelBuffer, PixelRect, Point2};
