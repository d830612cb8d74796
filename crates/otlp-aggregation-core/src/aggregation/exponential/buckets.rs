//! Bucket storage for one side of an exponential histogram.

use crate::{
    config::{MAX_SCALE, MIN_SCALE},
    data::ExponentialBuckets,
};

/// A growable, circularly-indexed array of bucket counts.
///
/// Holds counts for the bucket indices `[index_start, index_end]`. The count
/// for `index_base` lives in slot 0 and indices below the base wrap around to
/// the end of `counts`, so extending the range downwards never moves counts.
#[derive(Debug, Clone, Default)]
pub(crate) struct Buckets {
    index_base: i32,
    index_start: i32,
    index_end: i32,
    counts: Vec<u64>,
}

impl Buckets {
    pub(crate) fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The inclusive index range held, or `None` when empty.
    pub(crate) fn range(&self) -> Option<(i32, i32)> {
        (!self.is_empty()).then_some((self.index_start, self.index_end))
    }

    /// The backing array length.
    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.counts.len()
    }

    fn slot(&self, index: i32) -> usize {
        let mut slot = index - self.index_base;
        if slot < 0 {
            slot += self.counts.len() as i32;
        }
        slot as usize
    }

    /// The count for `index`, zero outside the held range.
    pub(crate) fn count(&self, index: i32) -> u64 {
        if self.is_empty() || index < self.index_start || index > self.index_end {
            return 0;
        }
        self.counts[self.slot(index)]
    }

    /// Adds `increment` to bucket `index`, extending the held range as needed.
    ///
    /// Any rescaling must happen before calling this: the extended range must
    /// still span fewer than `max_size` indices.
    pub(crate) fn increment(&mut self, index: i32, increment: u64, max_size: usize) {
        if self.is_empty() {
            self.counts = vec![0; 1];
            self.index_base = index;
            self.index_start = index;
            self.index_end = index;
        } else if index < self.index_start {
            let span = (self.index_end - index) as usize;
            assert!(
                span < max_size,
                "bucket span {span} exceeds max_size {max_size}, rescale was skipped"
            );
            if span >= self.counts.len() {
                self.grow(span + 1, max_size);
            }
            self.index_start = index;
        } else if index > self.index_end {
            let span = (index - self.index_start) as usize;
            assert!(
                span < max_size,
                "bucket span {span} exceeds max_size {max_size}, rescale was skipped"
            );
            if span >= self.counts.len() {
                self.grow(span + 1, max_size);
            }
            self.index_end = index;
        }
        let slot = self.slot(index);
        self.counts[slot] += increment;
    }

    /// Grows the backing array to hold at least `needed` buckets.
    fn grow(&mut self, needed: usize, max_size: usize) {
        let size = self.counts.len();
        let bias = (self.index_base - self.index_start) as usize;
        let old_positive_limit = size - bias;
        let new_size = needed.next_power_of_two().min(max_size);
        let new_positive_limit = new_size - bias;

        let mut counts = vec![0; new_size];
        counts[..old_positive_limit].copy_from_slice(&self.counts[..old_positive_limit]);
        counts[new_positive_limit..].copy_from_slice(&self.counts[old_positive_limit..]);
        self.counts = counts;
    }

    /// Merges each run of `2^amount` adjacent buckets into one.
    pub(crate) fn downscale(&mut self, amount: u32) {
        if amount == 0 || self.is_empty() {
            return;
        }
        // Example
        // amount = 2
        // starts at -6
        // counts: [ 3,  1,  2,  3,  4,  5, 6, 7, 8, 9, 10]
        // bins:    -6  -5, -4, -3, -2, -1, 0, 1, 2, 3, 4
        // new bins:-2, -2, -1, -1, -1, -1, 0, 0, 0, 0, 1
        // new start: -2
        // new counts: [4, 14, 30, 10]

        // Rotate so the base is the start and the counts are in index order.
        let bias = (self.index_base - self.index_start) as usize;
        if bias != 0 {
            self.counts.rotate_right(bias);
            self.index_base = self.index_start;
        }

        let size = (self.index_end - self.index_start) as usize + 1;
        let each = 1i64 << amount;
        let mut in_pos = 0;
        let mut out_pos = 0;
        let mut pos = self.index_start as i64;
        while pos <= self.index_end as i64 {
            let mut offset = pos.rem_euclid(each);
            while offset < each && in_pos < size {
                if out_pos != in_pos {
                    self.counts[out_pos] += self.counts[in_pos];
                    self.counts[in_pos] = 0;
                }
                in_pos += 1;
                pos += 1;
                offset += 1;
            }
            out_pos += 1;
        }

        self.index_start >>= amount;
        self.index_end >>= amount;
        self.index_base = self.index_start;
    }

    /// Non-zero buckets as `(index, count)`, in index order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (i32, u64)> + '_ {
        let range = if self.is_empty() {
            1..=0
        } else {
            self.index_start..=self.index_end
        };
        range
            .map(|index| (index, self.count(index)))
            .filter(|(_, count)| *count > 0)
    }

    /// Adds every bucket of `other`, whose indices are `shift` scales finer.
    pub(crate) fn merge_from(&mut self, other: &Buckets, shift: u32, max_size: usize) {
        for (index, count) in other.iter() {
            self.increment(index >> shift, count, max_size);
        }
    }

    /// Linearized view of the held range.
    pub(crate) fn to_point(&self) -> ExponentialBuckets {
        if self.is_empty() {
            return ExponentialBuckets::default();
        }
        ExponentialBuckets {
            offset: self.index_start,
            bucket_counts: (self.index_start..=self.index_end)
                .map(|index| self.count(index))
                .collect(),
        }
    }
}

/// The magnitude of the scale change needed to fit `[low, high]` in `max_size` buckets.
///
/// If no scale change is needed 0 is returned.
pub(crate) fn scale_change(max_size: usize, mut low: i32, mut high: i32) -> u32 {
    let mut count = 0u32;
    while (high as i64 - low as i64) >= max_size as i64 {
        low >>= 1;
        high >>= 1;
        count += 1;

        if count > (MAX_SCALE - MIN_SCALE) as u32 {
            return count;
        }
    }
    count
}
