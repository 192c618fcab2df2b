use alloc::{vec, vec::Vec};

const WORD_BITS: usize = u64::BITS as usize;

/// Fixed-size array of bits, used to track which swap slots are taken.
#[derive(Clone, Debug)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, idx: usize) -> bool {
        assert!(idx < self.len, "bit {idx} out of range for bitmap of {}", self.len);
        self.words[idx / WORD_BITS] >> (idx % WORD_BITS) & 1 != 0
    }

    pub fn set(&mut self, idx: usize, value: bool) {
        assert!(idx < self.len, "bit {idx} out of range for bitmap of {}", self.len);
        let mask = 1 << (idx % WORD_BITS);
        if value {
            self.words[idx / WORD_BITS] |= mask;
        } else {
            self.words[idx / WORD_BITS] &= !mask;
        }
    }

    pub fn set_multiple(&mut self, start: usize, count: usize, value: bool) {
        for idx in start..start + count {
            self.set(idx, value);
        }
    }

    /// Number of bits equal to `value`.
    pub fn count(&self, value: bool) -> usize {
        let ones = self.words.iter().map(|w| w.count_ones() as usize).sum();
        if value {
            ones
        } else {
            self.len - ones
        }
    }

    /// Returns the index of the first run of `count` consecutive bits equal to
    /// `value`, starting at or after `start`.
    pub fn scan(&self, start: usize, count: usize, value: bool) -> Option<usize> {
        if count == 0 {
            return Some(start);
        }
        let mut run = 0;
        for idx in start..self.len {
            if self.get(idx) == value {
                run += 1;
                if run == count {
                    return Some(idx + 1 - count);
                }
            } else {
                run = 0;
            }
        }
        None
    }

    /// Like [`Bitmap::scan`], but also flips the bits of the run it finds.
    pub fn scan_and_flip(&mut self, start: usize, count: usize, value: bool) -> Option<usize> {
        let idx = self.scan(start, count, value)?;
        self.set_multiple(idx, count, !value);
        Some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        let bitmap = Bitmap::new(100);
        assert_eq!(bitmap.count(false), 100);
        assert_eq!(bitmap.count(true), 0);
        assert!(!bitmap.get(99));
    }

    #[test]
    fn scan_and_flip_takes_lowest_run() {
        let mut bitmap = Bitmap::new(130);
        assert_eq!(bitmap.scan_and_flip(0, 1, false), Some(0));
        assert_eq!(bitmap.scan_and_flip(0, 1, false), Some(1));
        bitmap.set_multiple(2, 63, true);
        assert_eq!(bitmap.scan_and_flip(0, 3, false), Some(65));
        assert!(bitmap.get(67));
        assert_eq!(bitmap.count(true), 68);

        bitmap.set(1, false);
        assert_eq!(bitmap.scan_and_flip(0, 1, false), Some(1));
    }

    #[test]
    fn full_bitmap_has_no_room() {
        let mut bitmap = Bitmap::new(8);
        bitmap.set_multiple(0, 8, true);
        assert_eq!(bitmap.scan_and_flip(0, 1, false), None);
        assert_eq!(bitmap.scan(0, 8, true), Some(0));
    }

    #[test]
    #[should_panic]
    fn out_of_range() {
        Bitmap::new(3).get(3);
    }
}
