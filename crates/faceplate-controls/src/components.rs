//! Connected-component labeling of the interest mask.

use nalgebra::Point2;

use crate::preprocess::InterestMask;

/// Components smaller than this are noise.
const MIN_BLOB_PIXELS: usize = 6;

/// One 4-connected region of the interest mask (working resolution).
#[derive(Clone, Debug, PartialEq)]
pub struct Blob {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
    /// Number of mask pixels in the region.
    pub area: usize,
    /// Per-row `(first_x, last_x)` from `min_y` to `max_y`; `None` for rows the
    /// region skips.
    pub row_spans: Vec<Option<(usize, usize)>>,
}

impl Blob {
    #[inline]
    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(
            0.5 * (self.min_x + self.max_x) as f32,
            0.5 * (self.min_y + self.max_y) as f32,
        )
    }

    /// Longer over shorter bounding-box side, always `>= 1`.
    pub fn aspect(&self) -> f32 {
        let (w, h) = (self.width() as f32, self.height() as f32);
        w.max(h) / w.min(h)
    }

    /// Mean of the half-width and half-height.
    pub fn mean_radius(&self) -> f32 {
        0.25 * (self.width() + self.height()) as f32
    }

    /// Area with every row filled between its first and last pixel.
    ///
    /// Edge masks trace outlines; filling rows recovers the footprint of the
    /// outlined shape.
    pub fn filled_area(&self) -> usize {
        self.row_spans
            .iter()
            .flatten()
            .map(|&(a, b)| b - a + 1)
            .sum()
    }

    /// Filled area against the disk of the mean radius, folded into `(0, 1]`
    /// so both thin and bulky shapes score below a true disk.
    pub fn roundness(&self) -> f32 {
        let r = self.mean_radius();
        let disk = std::f32::consts::PI * r * r;
        let filled = self.filled_area() as f32;
        if disk <= 0.0 || filled <= 0.0 {
            return 0.0;
        }
        let ratio = filled / disk;
        ratio.min(1.0 / ratio)
    }

    pub fn touches_vertical_border(&self, height: usize) -> bool {
        self.min_y == 0 || self.max_y + 1 >= height
    }
}

/// Label the mask with 4-connectivity.
///
/// Scans top-to-bottom, left-to-right, so blob order is stable for a given
/// mask. Regions below the noise floor are dropped.
pub fn label_components(mask: &InterestMask) -> Vec<Blob> {
    let (w, h) = (mask.width, mask.height);
    let mut visited = vec![false; w * h];
    let mut stack: Vec<usize> = Vec::new();
    let mut pixels: Vec<(usize, usize)> = Vec::new();
    let mut blobs = Vec::new();

    for start in 0..w * h {
        if visited[start] || !mask.bits[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        pixels.clear();

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            pixels.push((x, y));
            let mut visit = |n: usize| {
                if !visited[n] && mask.bits[n] {
                    visited[n] = true;
                    stack.push(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < w {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - w);
            }
            if y + 1 < h {
                visit(idx + w);
            }
        }

        if pixels.len() < MIN_BLOB_PIXELS {
            continue;
        }
        blobs.push(blob_from_pixels(&pixels));
    }
    blobs
}

fn blob_from_pixels(pixels: &[(usize, usize)]) -> Blob {
    let mut min_x = usize::MAX;
    let mut min_y = usize::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    for &(x, y) in pixels {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let mut row_spans: Vec<Option<(usize, usize)>> = vec![None; max_y - min_y + 1];
    for &(x, y) in pixels {
        let span = &mut row_spans[y - min_y];
        *span = Some(match *span {
            Some((a, b)) => (a.min(x), b.max(x)),
            None => (x, x),
        });
    }
    Blob {
        min_x,
        min_y,
        max_x,
        max_y,
        area: pixels.len(),
        row_spans,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> InterestMask {
        let width = rows[0].len();
        let bits = rows
            .iter()
            .flat_map(|r| r.chars().map(|c| c == '#'))
            .collect();
        InterestMask {
            width,
            height: rows.len(),
            bits,
        }
    }

    #[test]
    fn separates_four_connected_regions() {
        let mask = mask_from(&[
            "###.....",
            "###..###",
            "......##",
            "##.#..##",
            "##.#....",
        ]);
        let blobs = label_components(&mask);
        // The 4-pixel and 2-pixel fragments are below the noise floor.
        assert_eq!(blobs.len(), 2);
        assert_eq!((blobs[0].min_x, blobs[0].min_y), (0, 0));
        assert_eq!(blobs[0].area, 6);
        assert_eq!((blobs[1].min_x, blobs[1].max_x), (5, 7));
        assert_eq!(blobs[1].area, 7);
    }

    #[test]
    fn diagonal_pixels_are_not_connected() {
        let mask = mask_from(&["###.", "###.", "...#"]);
        let blobs = label_components(&mask);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 6);
    }

    #[test]
    fn ring_outline_fills_to_a_round_footprint() {
        let size = 41usize;
        let c = 20.0f32;
        let bits = (0..size * size)
            .map(|i| {
                let (x, y) = ((i % size) as f32, (i / size) as f32);
                let d = ((x - c).powi(2) + (y - c).powi(2)).sqrt();
                (17.0..=20.0).contains(&d)
            })
            .collect();
        let mask = InterestMask {
            width: size,
            height: size,
            bits,
        };
        let blobs = label_components(&mask);
        assert_eq!(blobs.len(), 1);
        let ring = &blobs[0];
        assert!(ring.area < ring.filled_area());
        assert!(ring.roundness() > 0.9, "roundness {}", ring.roundness());
        assert!(ring.aspect() < 1.05);
    }

    #[test]
    fn square_outline_is_not_round() {
        let size = 30usize;
        let bits = (0..size * size)
            .map(|i| {
                let (x, y) = (i % size, i / size);
                let on_x = x == 2 || x == 3 || x == 26 || x == 27;
                let on_y = y == 2 || y == 3 || y == 26 || y == 27;
                let inside = (2..=27).contains(&x) && (2..=27).contains(&y);
                inside && (on_x || on_y)
            })
            .collect();
        let mask = InterestMask {
            width: size,
            height: size,
            bits,
        };
        let blobs = label_components(&mask);
        assert_eq!(blobs.len(), 1);
        assert!(blobs[0].roundness() < 0.82);
    }
}
