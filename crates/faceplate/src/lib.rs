//! High-level facade crate for the `faceplate-*` workspace.
//!
//! This crate provides:
//! - re-exports of the detector and core crates
//! - (feature `image`) helpers that decode images with the `image` crate and
//!   run the control detector on them
//! - (feature `cli`) the `faceplate` command-line tool
//!
//! ## Quickstart
//!
//! ```no_run
//! use faceplate::detect;
//! use faceplate::DetectorConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = detect::load_rgba("synth.png")?;
//! let drafts = detect::detect_image(&img, &DetectorConfig::from_sensitivity(0.6));
//! for d in &drafts {
//!     println!("{:<14} {:?} conf {:.2}", d.label, d.rect, d.confidence);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `faceplate::core`: pixel views, rectangles, statistics, logger.
//! - `faceplate::controls`: the detection pipeline and its stages.
//! - `faceplate::detect` (feature `image`): end-to-end helpers from files or
//!   `image::RgbaImage`.

pub use faceplate_controls as controls;
pub use faceplate_core as core;

pub use faceplate_controls::{
    CancelToken, ControlDetector, ControlDraft, ControlKind, DetectError, DetectReport,
    DetectRunConfig, DetectorConfig,
};
pub use faceplate_core::{PixelBuffer, PixelRect};

#[cfg(feature = "image")]
pub mod detect;
