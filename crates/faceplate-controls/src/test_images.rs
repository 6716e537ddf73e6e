//! Synthetic images for unit tests.

use faceplate_core::PixelBuffer;

use crate::config::DetectorConfig;
use crate::preprocess::{preprocess, Preprocessed};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);
    pub const WHITE: Rgb = Rgb(1.0, 1.0, 1.0);

    pub fn gray(v: f32) -> Rgb {
        Rgb(v, v, v)
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Opaque RGBA8 bytes from a per-pixel colour function.
pub fn rgba(w: usize, h: usize, f: impl Fn(usize, usize) -> Rgb) -> Vec<u8> {
    let mut data = Vec::with_capacity(w * h * 4);
    for y in 0..h {
        for x in 0..w {
            let Rgb(r, g, b) = f(x, y);
            data.extend_from_slice(&[to_u8(r), to_u8(g), to_u8(b), 255]);
        }
    }
    data
}

/// Preprocess a synthetic image with the default configuration.
pub fn preprocessed(w: usize, h: usize, f: impl Fn(usize, usize) -> Rgb) -> Preprocessed {
    let data = rgba(w, h, f);
    preprocess(&PixelBuffer::new(w, h, &data), &DetectorConfig::default()).expect("valid image")
}

/// Distance from pixel `(x, y)` to `(cx, cy)`.
pub fn dist(x: usize, y: usize, cx: f32, cy: f32) -> f32 {
    ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt()
}
