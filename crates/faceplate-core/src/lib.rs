//! Core types and utilities for faceplate control detection.
//!
//! This crate is intentionally small. It knows nothing about controls; it
//! provides the image views, pixel-space rectangles and order statistics the
//! detector crates build on, plus a stderr logger for binaries.

mod image;
mod logger;
mod rect;
pub mod stats;

pub use image::{luma_from_rgb, LumaImage, PixelBuffer};
pub use rect::PixelRect;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_env, LOG_ENV_VAR};

/// Re-exported so downstream crates name points with the same type.
pub use nalgebra::Point2;
