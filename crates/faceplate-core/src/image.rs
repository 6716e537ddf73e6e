/// Borrowed RGBA8 view over a decoded image.
///
/// Row-major, 4 bytes per pixel, `data.len() == width * height * 4`. The
/// buffer is owned by the caller; detection only reads it.
#[derive(Clone, Copy, Debug)]
pub struct PixelBuffer<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

impl<'a> PixelBuffer<'a> {
    pub const CHANNELS: usize = 4;

    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Byte length an RGBA8 buffer of this size must have.
    pub fn expected_len(width: usize, height: usize) -> Option<usize> {
        width.checked_mul(height)?.checked_mul(Self::CHANNELS)
    }

    /// True when the view has a non-zero area and a matching byte length.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && Self::expected_len(self.width, self.height) == Some(self.data.len())
    }

    #[inline]
    pub fn rgba(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.width + x) * Self::CHANNELS;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// Rec. 601 luma of normalized RGB.
#[inline]
pub fn luma_from_rgb(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Owned single-channel `f32` plane (row-major).
#[derive(Clone, Debug, Default)]
pub struct LumaImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl LumaImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Read with clamp-to-edge addressing.
    #[inline]
    pub fn get_clamped(&self, x: i32, y: i32) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.data[y * self.width + x]
    }

    /// Bilinear sample with clamp-to-edge addressing.
    #[inline]
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let p00 = self.get_clamped(x0, y0);
        let p10 = self.get_clamped(x0 + 1, y0);
        let p01 = self.get_clamped(x0, y0 + 1);
        let p11 = self.get_clamped(x0 + 1, y0 + 1);

        let a = p00 + fx * (p10 - p00);
        let b = p01 + fx * (p11 - p01);
        a + fy * (b - a)
    }

    /// Separable 3x3 box blur, clamp-to-edge.
    pub fn box_blur3(&self) -> LumaImage {
        let (w, h) = (self.width, self.height);
        let mut tmp = vec![0.0f32; w * h];
        for y in 0..h {
            for x in 0..w {
                let xi = x as i32;
                let yi = y as i32;
                tmp[y * w + x] = (self.get_clamped(xi - 1, yi)
                    + self.get_clamped(xi, yi)
                    + self.get_clamped(xi + 1, yi))
                    / 3.0;
            }
        }
        let horiz = LumaImage {
            width: w,
            height: h,
            data: tmp,
        };
        LumaImage::from_fn(w, h, |x, y| {
            let xi = x as i32;
            let yi = y as i32;
            (horiz.get_clamped(xi, yi - 1) + horiz.get_clamped(xi, yi) + horiz.get_clamped(xi, yi + 1))
                / 3.0
        })
    }

    /// Largest sample, `0.0` for an empty plane.
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(0.0f32, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pixel_buffer_validates_length() {
        let data = vec![0u8; 3 * 2 * 4];
        assert!(PixelBuffer::new(3, 2, &data).is_valid());
        assert!(!PixelBuffer::new(3, 3, &data).is_valid());
        assert!(!PixelBuffer::new(0, 2, &[]).is_valid());
    }

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let img = LumaImage::from_fn(2, 1, |x, _| x as f32);
        assert_relative_eq!(img.sample_bilinear(0.25, 0.0), 0.25, epsilon = 1e-6);
        // Clamped outside the plane.
        assert_relative_eq!(img.sample_bilinear(-3.0, 5.0), 0.0, epsilon = 1e-6);
        assert_relative_eq!(img.sample_bilinear(7.0, 0.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn box_blur_preserves_constant_plane() {
        let img = LumaImage::from_fn(5, 4, |_, _| 0.4);
        let blurred = img.box_blur3();
        assert!(blurred.data.iter().all(|&v| (v - 0.4).abs() < 1e-6));
    }
}
