use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use bytemuck::{Pod, Zeroable};

/// Number of bits held by a `Mask128`. Also the upper bound on chunk capacity.
pub const MASK_BITS: usize = 128;

/// A 128-bit mask stored as two 64-bit words.
///
/// Bit `i` lives in `lo` when `i < 64` and in `hi` otherwise. The layout is `#[repr(C)]` with
/// `lo` first so a mask can be viewed as a pair of little-end-first words when serialized.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Mask128 {
    pub lo: u64,
    pub hi: u64,
}

impl Mask128 {
    pub const ZERO: Mask128 = Mask128 { lo: 0, hi: 0 };

    pub const ONES: Mask128 = Mask128 {
        lo: u64::MAX,
        hi: u64::MAX,
    };

    #[inline]
    pub const fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    /// Mask with bits `[0, count)` set. `count` is clamped to 128.
    #[inline]
    pub fn occupancy(count: usize) -> Self {
        if count >= MASK_BITS {
            Self::ONES
        } else if count >= 64 {
            Self {
                lo: u64::MAX,
                hi: low_bits(count - 64),
            }
        } else {
            Self {
                lo: low_bits(count),
                hi: 0,
            }
        }
    }

    /// Index of the lowest set bit, or 128 if no bit is set.
    #[inline]
    pub fn trailing_zeros(self) -> u32 {
        if self.lo != 0 {
            self.lo.trailing_zeros()
        } else if self.hi != 0 {
            64 + self.hi.trailing_zeros()
        } else {
            MASK_BITS as u32
        }
    }

    /// Logical right shift by `n` bits. Shifting by 128 or more yields zero.
    #[inline]
    pub fn shift_right(self, n: u32) -> Self {
        match n {
            0 => self,
            1..=63 => Self {
                lo: (self.lo >> n) | (self.hi << (64 - n)),
                hi: self.hi >> n,
            },
            64..=127 => Self {
                lo: self.hi >> (n - 64),
                hi: 0,
            },
            _ => Self::ZERO,
        }
    }

    #[inline]
    pub fn get_bit(&self, i: usize) -> bool {
        debug_assert!(i < MASK_BITS, "bit index {i} out of range");
        if i < 64 {
            (self.lo >> i) & 1 == 1
        } else {
            (self.hi >> (i - 64)) & 1 == 1
        }
    }

    #[inline]
    pub fn set_bit(&mut self, i: usize, value: bool) {
        debug_assert!(i < MASK_BITS, "bit index {i} out of range");
        let (word, bit) = if i < 64 {
            (&mut self.lo, i)
        } else {
            (&mut self.hi, i - 64)
        };

        if value {
            *word |= 1 << bit;
        } else {
            *word &= !(1 << bit);
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.lo == 0 && self.hi == 0
    }

    #[inline]
    pub fn count_ones(&self) -> u32 {
        self.lo.count_ones() + self.hi.count_ones()
    }

    /// Number of zero bits in `[0, count)`.
    #[inline]
    pub fn count_zeros_below(&self, count: usize) -> u32 {
        let count = count.min(MASK_BITS);
        count as u32 - (*self & Self::occupancy(count)).count_ones()
    }

    #[inline]
    pub fn to_words(self) -> [u64; 2] {
        bytemuck::cast(self)
    }

    #[inline]
    pub fn from_words(words: [u64; 2]) -> Self {
        bytemuck::cast(words)
    }
}

#[inline]
fn low_bits(n: usize) -> u64 {
    debug_assert!(n < 64);
    (1u64 << n) - 1
}

impl From<u128> for Mask128 {
    #[inline]
    fn from(value: u128) -> Self {
        Self {
            lo: value as u64,
            hi: (value >> 64) as u64,
        }
    }
}

impl From<Mask128> for u128 {
    #[inline]
    fn from(mask: Mask128) -> Self {
        (mask.lo as u128) | ((mask.hi as u128) << 64)
    }
}

impl BitAnd for Mask128 {
    type Output = Mask128;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        Self {
            lo: self.lo & rhs.lo,
            hi: self.hi & rhs.hi,
        }
    }
}

impl BitAndAssign for Mask128 {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.lo &= rhs.lo;
        self.hi &= rhs.hi;
    }
}

impl BitOr for Mask128 {
    type Output = Mask128;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self {
            lo: self.lo | rhs.lo,
            hi: self.hi | rhs.hi,
        }
    }
}

impl BitOrAssign for Mask128 {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.lo |= rhs.lo;
        self.hi |= rhs.hi;
    }
}

impl Not for Mask128 {
    type Output = Mask128;

    #[inline]
    fn not(self) -> Self::Output {
        Self {
            lo: !self.lo,
            hi: !self.hi,
        }
    }
}
