use std::ops::Range;

use crate::bits::{Mask128, MASK_BITS};

/// Finds the next run of consecutive set bits in `mask` at or after `end`.
///
/// `begin` and `end` hold the previously returned run (both `0` before the first call). On
/// success they are overwritten with the new run `[begin, end)` and `true` is returned. When no
/// set bits remain, `begin` is set to `end` and `false` is returned.
#[inline]
pub fn get_next_range(mask: Mask128, begin: &mut usize, end: &mut usize) -> bool {
    let from = *end as u32;
    let start = mask.shift_right(from).trailing_zeros() + from;
    if start as usize >= MASK_BITS {
        *begin = *end;
        return false;
    }

    // A run reaching bit 127 reports a length past the end of the mask. Clamped below.
    let len = (!mask).shift_right(start).trailing_zeros();

    *begin = start as usize;
    *end = (start + len).min(MASK_BITS as u32) as usize;
    true
}

/// Iterator over the runs of set bits within a mask, in ascending order.
#[derive(Debug, Clone)]
pub struct EnabledRanges {
    mask: Mask128,
    begin: usize,
    end: usize,
}

impl EnabledRanges {
    #[inline]
    pub fn new(mask: Mask128) -> Self {
        Self {
            mask,
            begin: 0,
            end: 0,
        }
    }
}

impl Iterator for EnabledRanges {
    type Item = Range<usize>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if get_next_range(self.mask, &mut self.begin, &mut self.end) {
            Some(self.begin..self.end)
        } else {
            None
        }
    }
}
