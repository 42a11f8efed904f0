//! Modified median cut quantization (MMCQ).
//!
//! Pixels are bucketed on a 5-bit-per-channel grid. Every bucket also keeps
//! the exact channel sums of its pixels, so a box's color is the true mean of
//! the pixels it holds rather than the center of its grid cells.

use std::cmp::Reverse;

const SIGBITS: u32 = 5;
const RSHIFT: u32 = 8 - SIGBITS;
const SIDE: usize = 1 << SIGBITS;
const FRACT_BY_POPULATION: f32 = 0.75;
const MAX_ITERATIONS: usize = 1000;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    count: u32,
    sum: [u64; 3],
}

struct Histogram {
    buckets: Vec<Bucket>,
}

impl Histogram {
    fn from_pixels<I>(pixels: I) -> Self
    where
        I: IntoIterator<Item = [u8; 3]>,
    {
        let mut buckets = vec![Bucket::default(); SIDE * SIDE * SIDE];
        for px in pixels {
            let bucket = &mut buckets[Self::index(px.map(|c| (c >> RSHIFT) as usize))];
            bucket.count += 1;
            for c in 0..3 {
                bucket.sum[c] += px[c] as u64;
            }
        }
        Self { buckets }
    }

    fn index(pos: [usize; 3]) -> usize {
        (pos[0] << (2 * SIGBITS)) | (pos[1] << SIGBITS) | pos[2]
    }

    fn get(&self, pos: [usize; 3]) -> &Bucket {
        &self.buckets[Self::index(pos)]
    }
}

/// Axis-aligned box on the bucket grid, always shrunk to its occupied buckets.
#[derive(Debug, Clone)]
struct VBox {
    min: [usize; 3],
    max: [usize; 3],
    count: u32,
    leaf: bool,
}

impl VBox {
    /// Bounding box of the non-empty buckets inside `[min, max]`.
    fn shrink(hist: &Histogram, min: [usize; 3], max: [usize; 3]) -> Option<Self> {
        let mut lo = [usize::MAX; 3];
        let mut hi = [0usize; 3];
        let mut count = 0u32;

        for_each_cell(min, max, |pos| {
            let bucket = hist.get(pos);
            if bucket.count > 0 {
                count += bucket.count;
                for a in 0..3 {
                    lo[a] = lo[a].min(pos[a]);
                    hi[a] = hi[a].max(pos[a]);
                }
            }
        });

        (count > 0).then_some(Self {
            min: lo,
            max: hi,
            count,
            leaf: false,
        })
    }

    fn extent(&self, axis: usize) -> usize {
        self.max[axis] - self.min[axis] + 1
    }

    fn volume(&self) -> u64 {
        (0..3).map(|a| self.extent(a) as u64).product()
    }

    fn average(&self, hist: &Histogram) -> [u8; 3] {
        let mut sum = [0u64; 3];
        let mut count = 0u64;
        for_each_cell(self.min, self.max, |pos| {
            let bucket = hist.get(pos);
            count += bucket.count as u64;
            for c in 0..3 {
                sum[c] += bucket.sum[c];
            }
        });
        let count = count.max(1);
        sum.map(|s| ((s + count / 2) / count) as u8)
    }

    /// Cut along the longest axis at the population median.
    fn split(&self, hist: &Histogram) -> Option<(VBox, VBox)> {
        let axis = (0..3).max_by_key(|&a| (self.extent(a), Reverse(a)))?;
        if self.extent(axis) <= 1 {
            return None;
        }

        let mut slices = vec![0u64; self.extent(axis)];
        for_each_cell(self.min, self.max, |pos| {
            slices[pos[axis] - self.min[axis]] += hist.get(pos).count as u64;
        });

        let total = self.count as u64;
        let mut cumulative = 0u64;
        let mut cut = None;
        for (i, slice) in slices.iter().enumerate() {
            cumulative += slice;
            if cumulative * 2 >= total {
                // Keep at least one occupied slice on each side.
                cut = if cumulative < total { Some(i) } else { i.checked_sub(1) };
                break;
            }
        }
        let cut = self.min[axis] + cut?;

        let mut left_max = self.max;
        left_max[axis] = cut;
        let mut right_min = self.min;
        right_min[axis] = cut + 1;

        Some((
            VBox::shrink(hist, self.min, left_max)?,
            VBox::shrink(hist, right_min, self.max)?,
        ))
    }
}

fn for_each_cell(min: [usize; 3], max: [usize; 3], mut f: impl FnMut([usize; 3])) {
    for r in min[0]..=max[0] {
        for g in min[1]..=max[1] {
            for b in min[2]..=max[2] {
                f([r, g, b]);
            }
        }
    }
}

/// Split the highest-priority box until `target` boxes exist or nothing can be split.
fn split_until<P>(hist: &Histogram, boxes: &mut Vec<VBox>, target: usize, priority: P)
where
    P: Fn(&VBox) -> u64,
{
    for _ in 0..MAX_ITERATIONS {
        if boxes.len() >= target {
            return;
        }

        let Some(idx) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.leaf)
            .max_by_key(|(i, b)| (priority(*b), Reverse(*i)))
            .map(|(i, _)| i)
        else {
            return;
        };

        match boxes[idx].split(hist) {
            Some((left, right)) => {
                boxes[idx] = left;
                boxes.push(right);
            }
            None => boxes[idx].leaf = true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swatch {
    pub color: [u8; 3],
    pub population: u32,
}

/// Quantized colors, most populated first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    swatches: Vec<Swatch>,
}

impl Palette {
    pub fn swatches(&self) -> &[Swatch] {
        &self.swatches
    }

    /// The color of the box holding the most pixels.
    pub fn dominant(&self) -> Option<[u8; 3]> {
        self.swatches.first().map(|s| s.color)
    }
}

/// Quantize `pixels` into at most `max_colors` representative colors.
///
/// Returns `None` when there are no pixels.
pub fn quantize<I>(pixels: I, max_colors: usize) -> Option<Palette>
where
    I: IntoIterator<Item = [u8; 3]>,
{
    let hist = Histogram::from_pixels(pixels);
    let initial = VBox::shrink(&hist, [0; 3], [SIDE - 1; 3])?;

    let target = max_colors.max(1);
    let by_population = ((target as f32 * FRACT_BY_POPULATION).ceil() as usize).max(1);

    let mut boxes = vec![initial];
    split_until(&hist, &mut boxes, by_population, |b| b.count as u64);
    for b in boxes.iter_mut() {
        b.leaf = false;
    }
    split_until(&hist, &mut boxes, target, |b| b.count as u64 * b.volume());

    boxes.sort_by_key(|b| (Reverse(b.count), Reverse(b.volume())));

    Some(Palette {
        swatches: boxes
            .iter()
            .map(|b| Swatch {
                color: b.average(&hist),
                population: b.count,
            })
            .collect(),
    })
}
