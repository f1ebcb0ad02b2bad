//! Segment sizing: chooses array and hash segment sizes from live occupancy.
//!
//! The array segment gets the largest power-of-two prefix that would be more
//! than half populated by integer keys. Everything else goes to a hash segment
//! strictly larger than what remains.

const MAX_BITS: usize = 64;
/// The array segment never grows past `2^MAX_ARRAY_LOG2` slots.
pub(crate) const MAX_ARRAY_LOG2: u32 = 31;

#[inline]
pub(crate) fn floor_log2(x: u64) -> u32 {
    debug_assert!(x != 0);
    63 - x.leading_zeros()
}

/// Occupancy histogram gathered over every live entry of a table.
#[derive(Debug)]
pub(crate) struct Census {
    // counter[b] = number of integer keys k >= 1 with floor_log2(k) == b
    counter: [usize; MAX_BITS],
    // Starts at 2: array slot 0 and the entry whose insertion forced the resize.
    hash_part: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct SizePlan {
    pub array_size_log2: u32,
    pub hash_size_log2: u32,
    /// Entries credited to the new array segment, slot 0 included.
    pub array_part: usize,
}

impl Census {
    pub fn new() -> Self {
        Self {
            counter: [0; MAX_BITS],
            hash_part: 2,
        }
    }

    /// Records one live entry. `integer` is the key's payload when it is an
    /// `Integer` key. Array slot 0 must not be recorded.
    pub fn record(&mut self, integer: Option<i64>) {
        self.hash_part += 1;
        if let Some(i) = integer.filter(|&i| i >= 1) {
            self.counter[floor_log2(i as u64) as usize] += 1;
        }
    }

    pub fn plan(&self) -> SizePlan {
        let mut array_size_log2 = 0;
        let mut array_part = 0;
        let mut total = 1;
        for i in 0..MAX_ARRAY_LOG2 {
            total += self.counter[i as usize];
            if total > 1usize << i {
                array_size_log2 = i + 1;
                array_part = total;
            }
        }
        let rest = self.hash_part.saturating_sub(array_part).max(1);
        SizePlan {
            array_size_log2,
            hash_size_log2: (floor_log2(rest as u64) + 1).max(1),
            array_part,
        }
    }
}
