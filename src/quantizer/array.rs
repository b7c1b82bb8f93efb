//! Dense-histogram median-cut, used for the per-frame 256-colour palette.
//!
//! The histogram is a `2^d x 2^d x 2^d` counter table with `d` in `6..=8`;
//! samples are right-shifted by `8-d` before counting, and palette entries
//! are left-shifted back by `8-d` when emitted. This bounds memory (~256KB
//! at d=6, up to ~16MB at d=8) at the cost of colour precision.

use std::rc::Rc;

use crate::bitmap::Bitmap;
use crate::quantizer::{median_cut, Axis, Cuboid};

/// Builds the dense histogram and runs median-cut over it.
pub struct ArrayQuantizer {
    depth: u8,
}

impl ArrayQuantizer {
    /// Creates a quantizer at histogram depth `depth` (clamped to `6..=8`
    /// by the caller; see `EncoderOptions`).
    pub fn new(depth: u8) -> Self {
        Self { depth }
    }

    /// Builds `max_colors` palette entries for every RGB pixel in `bitmap`.
    pub fn quantize(&self, bitmap: &Bitmap, max_colors: usize) -> Vec<[u8; 3]> {
        let shift = 8 - self.depth;
        let size = 1usize << self.depth;
        let mut histogram = vec![0u32; size * size * size];

        for y in 0..bitmap.height() {
            for x in 0..bitmap.width() {
                let rgb = bitmap.pixel_rgb(x, y);
                let r = (rgb[0] >> shift) as usize;
                let g = (rgb[1] >> shift) as usize;
                let b = (rgb[2] >> shift) as usize;
                histogram[(r * size + g) * size + b] += 1;
            }
        }

        let histogram = Rc::new(histogram);
        let mut seed = ArrayCuboid {
            size,
            depth: self.depth,
            min: [0, 0, 0],
            max: [(size - 1) as u8, (size - 1) as u8, (size - 1) as u8],
            histogram,
        };
        seed.minimize();

        median_cut(seed, max_colors)
    }
}

struct ArrayCuboid {
    size: usize,
    depth: u8,
    min: [u8; 3],
    max: [u8; 3],
    histogram: Rc<Vec<u32>>,
}

impl ArrayCuboid {
    #[inline]
    fn count_at(&self, r: usize, g: usize, b: usize) -> u32 {
        self.histogram[(r * self.size + g) * self.size + b]
    }

    fn extent(&self, axis: Axis) -> u32 {
        let a = axis_index(axis);
        u32::from(self.max[a]) - u32::from(self.min[a])
    }

    /// Visits every populated voxel in the current bounding box.
    fn for_each_populated<F: FnMut(u8, u8, u8, u32)>(&self, mut f: F) {
        for r in self.min[0]..=self.max[0] {
            for g in self.min[1]..=self.max[1] {
                for b in self.min[2]..=self.max[2] {
                    let c = self.count_at(r as usize, g as usize, b as usize);
                    if c > 0 {
                        f(r, g, b, c);
                    }
                }
            }
        }
    }
}

fn axis_index(axis: Axis) -> usize {
    match axis {
        Axis::R => 0,
        Axis::G => 1,
        Axis::B => 2,
    }
}

impl Cuboid for ArrayCuboid {
    fn minimize(&mut self) {
        let mut min = self.max;
        let mut max = self.min;
        let mut found = false;
        self.for_each_populated(|r, g, b, _| {
            found = true;
            min[0] = min[0].min(r);
            min[1] = min[1].min(g);
            min[2] = min[2].min(b);
            max[0] = max[0].max(r);
            max[1] = max[1].max(g);
            max[2] = max[2].max(b);
        });
        if found {
            self.min = min;
            self.max = max;
        }
    }

    fn volume(&self) -> u64 {
        let dr = u64::from(self.max[0]) - u64::from(self.min[0]) + 1;
        let dg = u64::from(self.max[1]) - u64::from(self.min[1]) + 1;
        let db = u64::from(self.max[2]) - u64::from(self.min[2]) + 1;
        dr * dg * db
    }

    fn longest_side(&self) -> Axis {
        let er = self.extent(Axis::R);
        let eg = self.extent(Axis::G);
        let eb = self.extent(Axis::B);
        let mut axis = Axis::R;
        let mut best = er;
        if eg > best {
            axis = Axis::G;
            best = eg;
        }
        if eb > best {
            axis = Axis::B;
        }
        axis
    }

    fn median(&self, axis: Axis) -> u8 {
        let a = axis_index(axis);
        let mut distinct = Vec::new();
        for c in self.min[a]..=self.max[a] {
            let mut populated = false;
            match axis {
                Axis::R => {
                    'outer_r: for g in self.min[1]..=self.max[1] {
                        for b in self.min[2]..=self.max[2] {
                            if self.count_at(c as usize, g as usize, b as usize) > 0 {
                                populated = true;
                                break 'outer_r;
                            }
                        }
                    }
                }
                Axis::G => {
                    'outer_g: for r in self.min[0]..=self.max[0] {
                        for b in self.min[2]..=self.max[2] {
                            if self.count_at(r as usize, c as usize, b as usize) > 0 {
                                populated = true;
                                break 'outer_g;
                            }
                        }
                    }
                }
                Axis::B => {
                    'outer_b: for r in self.min[0]..=self.max[0] {
                        for g in self.min[1]..=self.max[1] {
                            if self.count_at(r as usize, g as usize, c as usize) > 0 {
                                populated = true;
                                break 'outer_b;
                            }
                        }
                    }
                }
            }
            if populated {
                distinct.push(c);
            }
        }

        if distinct.is_empty() {
            return u8::midpoint_of(self.min[a], self.max[a]);
        }

        let target = distinct.len() / 2;
        distinct[target.min(distinct.len() - 1)]
    }

    fn split(&mut self, axis: Axis, point: u8) -> Self {
        let a = axis_index(axis);
        let mut upper = ArrayCuboid {
            size: self.size,
            depth: self.depth,
            min: self.min,
            max: self.max,
            histogram: Rc::clone(&self.histogram),
        };
        upper.min[a] = point + 1;
        self.max[a] = point;
        upper
    }

    fn average_color(&self) -> [u8; 3] {
        let mut sum = [0u64; 3];
        let mut total: u64 = 0;
        self.for_each_populated(|r, g, b, c| {
            let c = u64::from(c);
            sum[0] += c * u64::from(r);
            sum[1] += c * u64::from(g);
            sum[2] += c * u64::from(b);
            total += c;
        });
        if total == 0 {
            return [0, 0, 0];
        }
        let shift = 8 - self.depth;
        [
            ((sum[0] / total) as u32).wrapping_shl(shift.into()) as u8,
            ((sum[1] / total) as u32).wrapping_shl(shift.into()) as u8,
            ((sum[2] / total) as u32).wrapping_shl(shift.into()) as u8,
        ]
    }
}

trait MidpointExt {
    fn midpoint_of(min: Self, max: Self) -> Self;
}

impl MidpointExt for u8 {
    fn midpoint_of(min: u8, max: u8) -> u8 {
        min + (max - min) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantizer::nearest_index;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> Bitmap {
        let mut b = Bitmap::new(w, h, 3).unwrap();
        for y in 0..h {
            for x in 0..w {
                b.set_pixel_rgb(x, y, rgb);
            }
        }
        b
    }

    #[test]
    fn always_emits_max_colors_entries() {
        let bmp = solid(8, 8, [12, 34, 56]);
        let palette = ArrayQuantizer::new(7).quantize(&bmp, 256);
        assert_eq!(palette.len(), 256);
    }

    #[test]
    fn single_colour_image_quantizes_close_to_that_colour() {
        let bmp = solid(8, 8, [200, 10, 5]);
        let palette = ArrayQuantizer::new(7).quantize(&bmp, 256);
        let idx = nearest_index(&palette, [200, 10, 5]);
        let got = palette[idx];
        assert!((i32::from(got[0]) - 200).abs() <= 4);
        assert!((i32::from(got[1]) - 10).abs() <= 4);
        assert!((i32::from(got[2]) - 5).abs() <= 4);
    }

    #[test]
    fn two_colour_image_produces_two_clusters() {
        let mut bmp = Bitmap::new(4, 4, 3).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                let rgb = if x < 2 { [0, 0, 0] } else { [255, 255, 255] };
                bmp.set_pixel_rgb(x, y, rgb);
            }
        }
        let palette = ArrayQuantizer::new(7).quantize(&bmp, 2);
        let idx_black = nearest_index(&palette, [0, 0, 0]);
        let idx_white = nearest_index(&palette, [255, 255, 255]);
        assert_ne!(idx_black, idx_white);
    }
}
