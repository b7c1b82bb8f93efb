//! Sparse occurrence-list median-cut, used for per-macroblock sub-palettes
//! where the population is small (at most a few hundred distinct colours).

use crate::quantizer::{median_cut, Axis, Cuboid};

/// One distinct colour and how many times it occurred in the sampled
/// pixels.
#[derive(Clone, Copy, Debug)]
pub struct Occurrence {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub count: u32,
}

/// Accumulates colour occurrences (optionally across several calls, e.g.
/// one per changed block in a macroblock) and runs median-cut over them.
#[derive(Default)]
pub struct ListQuantizer {
    occurrences: Vec<Occurrence>,
}

impl ListQuantizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more occurrence of `rgb`, merging into an existing
    /// entry when present.
    pub fn add(&mut self, rgb: [u8; 3]) {
        if let Some(existing) = self
            .occurrences
            .iter_mut()
            .find(|o| [o.r, o.g, o.b] == rgb)
        {
            existing.count += 1;
        } else {
            self.occurrences.push(Occurrence {
                r: rgb[0],
                g: rgb[1],
                b: rgb[2],
                count: 1,
            });
        }
    }

    /// Number of distinct colours accumulated so far.
    pub fn distinct_count(&self) -> usize {
        self.occurrences.len()
    }

    /// Builds `max_colors` palette entries from the accumulated
    /// occurrences. Panics if nothing has been added yet.
    pub fn quantize(self, max_colors: usize) -> Vec<[u8; 3]> {
        assert!(
            !self.occurrences.is_empty(),
            "ListQuantizer::quantize called with no occurrences"
        );
        let mut seed = ListCuboid {
            records: self.occurrences,
            min: [0, 0, 0],
            max: [255, 255, 255],
        };
        seed.minimize();
        median_cut(seed, max_colors)
    }
}

struct ListCuboid {
    records: Vec<Occurrence>,
    min: [u8; 3],
    max: [u8; 3],
}

impl ListCuboid {
    fn coord(rec: &Occurrence, axis: Axis) -> u8 {
        match axis {
            Axis::R => rec.r,
            Axis::G => rec.g,
            Axis::B => rec.b,
        }
    }

    fn extent(&self, axis: Axis) -> u32 {
        let (mn, mx) = self.range(axis);
        u32::from(mx) - u32::from(mn)
    }

    fn range(&self, axis: Axis) -> (u8, u8) {
        match axis {
            Axis::R => (self.min[0], self.max[0]),
            Axis::G => (self.min[1], self.max[1]),
            Axis::B => (self.min[2], self.max[2]),
        }
    }
}

impl Cuboid for ListCuboid {
    fn minimize(&mut self) {
        if self.records.is_empty() {
            return;
        }
        let mut min = [255u8, 255, 255];
        let mut max = [0u8, 0, 0];
        for rec in &self.records {
            min[0] = min[0].min(rec.r);
            min[1] = min[1].min(rec.g);
            min[2] = min[2].min(rec.b);
            max[0] = max[0].max(rec.r);
            max[1] = max[1].max(rec.g);
            max[2] = max[2].max(rec.b);
        }
        self.min = min;
        self.max = max;
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
        let mut distinct: Vec<u8> =
            self.records.iter().map(|r| Self::coord(r, axis)).collect();
        distinct.sort_unstable();
        distinct.dedup();

        if distinct.is_empty() {
            let (mn, mx) = self.range(axis);
            return mn + (mx - mn) / 2;
        }

        let target = distinct.len() / 2;
        distinct[target.min(distinct.len() - 1)]
    }

    fn split(&mut self, axis: Axis, point: u8) -> Self {
        let (lower, upper): (Vec<Occurrence>, Vec<Occurrence>) = self
            .records
            .drain(..)
            .partition(|r| Self::coord(r, axis) <= point);
        self.records = lower;
        ListCuboid {
            records: upper,
            min: self.min,
            max: self.max,
        }
    }

    fn average_color(&self) -> [u8; 3] {
        let mut sum = [0u64; 3];
        let mut total: u64 = 0;
        for rec in &self.records {
            let c = u64::from(rec.count);
            sum[0] += c * u64::from(rec.r);
            sum[1] += c * u64::from(rec.g);
            sum[2] += c * u64::from(rec.b);
            total += c;
        }
        if total == 0 {
            return [0, 0, 0];
        }
        [
            (sum[0] / total) as u8,
            (sum[1] / total) as u8,
            (sum[2] / total) as u8,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantizer::nearest_index;

    #[test]
    fn seventeen_distinct_colours_produce_sixteen_entries() {
        let mut q = ListQuantizer::new();
        for i in 0..17u8 {
            q.add([i * 10, i * 5, i]);
        }
        assert_eq!(q.distinct_count(), 17);
        let palette = q.quantize(16);
        assert_eq!(palette.len(), 16);
    }

    #[test]
    fn fewer_colours_than_max_pads_with_last_centroid() {
        let mut q = ListQuantizer::new();
        q.add([1, 2, 3]);
        q.add([4, 5, 6]);
        let palette = q.quantize(16);
        assert_eq!(palette.len(), 16);
        assert_eq!(palette[15], *palette.last().unwrap());
    }

    #[test]
    fn clusters_separate_colours_to_distinct_entries() {
        let mut q = ListQuantizer::new();
        for _ in 0..50 {
            q.add([0, 0, 0]);
        }
        for _ in 0..50 {
            q.add([255, 255, 255]);
        }
        let palette = q.quantize(2);
        let idx_black = nearest_index(&palette, [0, 0, 0]);
        let idx_white = nearest_index(&palette, [255, 255, 255]);
        assert_ne!(idx_black, idx_white);
    }
}
