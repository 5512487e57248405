use smallvec::SmallVec;

use crate::{
    bits::{Mask128, MASK_BITS},
    error::{EcsError, EcsResult},
};

/// Enable state of every enableable component type within one chunk.
///
/// For each enableable type (indexed by its position among the archetype's enableable types)
/// this holds one 128-bit mask where bit `i` is set when the component of the entity in slot `i`
/// is enabled, plus a cached count of disabled entities among the occupied slots.
///
/// The store tracks the number of occupied slots itself so it can uphold two invariants on its
/// own:
/// - bits at or beyond `count` are always zero
/// - `disabled[t]` always equals the number of zero bits in `[0, count)` of `masks[t]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnableBits {
    masks: SmallVec<[Mask128; 4]>,
    disabled: SmallVec<[u32; 4]>,
    count: usize,
}

/// Sink for raw enable words. Implemented by serialization layers.
pub trait EnableWordWriter {
    /// Receives `ceil(bit_count / 64)` words holding bits `[0, bit_count)`, lowest bits first.
    fn write_words(&mut self, words: &[u64], bit_count: usize);
}

/// Source of raw enable words. Implemented by serialization layers.
pub trait EnableWordReader {
    /// Reads the words holding `bit_count` bits and returns them as a mask. Bits at or beyond
    /// `bit_count` are cleared.
    fn read_words(&mut self, bit_count: usize) -> EcsResult<Mask128>;
}

/// Number of 64-bit words needed to hold `bit_count` bits.
#[inline]
pub fn words_for(bit_count: usize) -> usize {
    (bit_count + 63) / 64
}

impl EnableWordWriter for Vec<u64> {
    fn write_words(&mut self, words: &[u64], _: usize) {
        self.extend_from_slice(words);
    }
}

/// Reads enable words sequentially out of a slice.
#[derive(Debug, Clone)]
pub struct WordCursor<'a> {
    words: &'a [u64],
}

impl<'a> WordCursor<'a> {
    pub fn new(words: &'a [u64]) -> Self {
        Self { words }
    }

    pub fn remaining(&self) -> usize {
        self.words.len()
    }
}

impl<'a> EnableWordReader for WordCursor<'a> {
    fn read_words(&mut self, bit_count: usize) -> EcsResult<Mask128> {
        if bit_count > MASK_BITS {
            return Err(EcsError::SlotOutOfBounds {
                slot: bit_count,
                count: MASK_BITS,
            });
        }

        let needed = words_for(bit_count);
        if self.words.len() < needed {
            return Err(EcsError::ShortWordStream {
                needed,
                available: self.words.len(),
            });
        }

        let (head, tail) = self.words.split_at(needed);
        self.words = tail;

        let mut words = [0u64; 2];
        words[..needed].copy_from_slice(head);
        Ok(Mask128::from_words(words) & Mask128::occupancy(bit_count))
    }
}

impl EnableBits {
    /// Creates the enable state of an empty chunk.
    pub fn new(type_count: usize) -> Self {
        Self {
            masks: SmallVec::from_elem(Mask128::ZERO, type_count),
            disabled: SmallVec::from_elem(0, type_count),
            count: 0,
        }
    }

    /// Number of enableable types tracked.
    #[inline]
    pub fn type_count(&self) -> usize {
        self.masks.len()
    }

    /// Number of occupied slots.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn occupancy(&self) -> Mask128 {
        Mask128::occupancy(self.count)
    }

    /// All masks, indexed by enableable type index.
    #[inline]
    pub fn masks(&self) -> &[Mask128] {
        &self.masks
    }

    /// All cached disabled counts, indexed by enableable type index.
    #[inline]
    pub fn disabled_counts(&self) -> &[u32] {
        &self.disabled
    }

    #[inline]
    pub fn mask(&self, type_idx: usize) -> EcsResult<Mask128> {
        self.check_type(type_idx)?;
        Ok(self.masks[type_idx])
    }

    #[inline]
    pub fn disabled_count(&self, type_idx: usize) -> EcsResult<u32> {
        self.check_type(type_idx)?;
        Ok(self.disabled[type_idx])
    }

    #[inline]
    pub fn is_enabled(&self, type_idx: usize, slot: usize) -> EcsResult<bool> {
        self.check_type(type_idx)?;
        self.check_slot(slot)?;
        Ok(self.masks[type_idx].get_bit(slot))
    }

    /// Sets the enable bit of a slot. Returns `true` if the bit changed.
    pub fn set_enabled(&mut self, type_idx: usize, slot: usize, value: bool) -> EcsResult<bool> {
        self.check_type(type_idx)?;
        self.check_slot(slot)?;

        let mask = &mut self.masks[type_idx];
        if mask.get_bit(slot) == value {
            return Ok(false);
        }

        mask.set_bit(slot, value);
        if value {
            self.disabled[type_idx] -= 1;
        } else {
            self.disabled[type_idx] += 1;
        }
        Ok(true)
    }

    /// Copies the bit of one slot in `src` to an occupied slot in `dst`.
    pub fn copy_bit(
        src: &EnableBits,
        src_slot: usize,
        dst: &mut EnableBits,
        dst_slot: usize,
        type_idx: usize,
    ) -> EcsResult<()> {
        let value = src.is_enabled(type_idx, src_slot)?;
        dst.set_enabled(type_idx, dst_slot, value)?;
        Ok(())
    }

    /// Same as [`EnableBits::copy_bit`] with source and destination in this store.
    pub fn copy_bit_within(
        &mut self,
        src_slot: usize,
        dst_slot: usize,
        type_idx: usize,
    ) -> EcsResult<()> {
        let value = self.is_enabled(type_idx, src_slot)?;
        if src_slot != dst_slot {
            self.set_enabled(type_idx, dst_slot, value)?;
        }
        Ok(())
    }

    /// Clears the bit of an unoccupied slot. Occupied slots are rejected since vacating one
    /// also changes the slot count, which only [`EnableBits::swap_remove`] does.
    pub fn reset_slot_on_removal(&mut self, slot: usize, type_idx: usize) -> EcsResult<()> {
        self.check_type(type_idx)?;
        if slot < self.count || slot >= MASK_BITS {
            return Err(EcsError::SlotOutOfBounds {
                slot,
                count: self.count,
            });
        }

        self.masks[type_idx].set_bit(slot, false);
        Ok(())
    }

    /// Clears the last occupied slot of one type ahead of the count shrinking.
    fn vacate_last(&mut self, type_idx: usize) {
        let last = self.count - 1;
        let mask = &mut self.masks[type_idx];
        if !mask.get_bit(last) {
            self.disabled[type_idx] -= 1;
        }
        mask.set_bit(last, false);
    }

    /// Starts tracking a type for `count` entities that previously lacked it. All of them begin
    /// enabled.
    pub fn initialize_for_new_component(&mut self, type_idx: usize, count: usize) -> EcsResult<()> {
        self.check_type(type_idx)?;
        if count != self.count {
            return Err(EcsError::SlotOutOfBounds {
                slot: count,
                count: self.count,
            });
        }

        self.masks[type_idx] = Mask128::occupancy(count);
        self.disabled[type_idx] = 0;
        Ok(())
    }

    /// Occupies the next slot. `value_of` gives the initial bit for each type index.
    ///
    /// # Panics
    /// Panics if every slot is occupied already.
    pub fn push(&mut self, mut value_of: impl FnMut(usize) -> bool) -> usize {
        assert!(self.count < MASK_BITS, "enable bits are full");

        let slot = self.count;
        self.count += 1;
        for type_idx in 0..self.masks.len() {
            if value_of(type_idx) {
                self.masks[type_idx].set_bit(slot, true);
            } else {
                self.disabled[type_idx] += 1;
            }
        }
        slot
    }

    /// Occupies the next `n` slots with every type enabled.
    pub fn push_enabled(&mut self, n: usize) {
        assert!(self.count + n <= MASK_BITS, "enable bits are full");

        let fill = Mask128::occupancy(self.count + n) & !self.occupancy();
        for mask in &mut self.masks {
            *mask |= fill;
        }
        self.count += n;
    }

    /// Removes a slot by moving the last occupied slot's bits into it and vacating the last slot.
    pub fn swap_remove(&mut self, slot: usize) -> EcsResult<()> {
        self.check_slot(slot)?;

        let last = self.count - 1;
        for type_idx in 0..self.masks.len() {
            self.copy_bit_within(last, slot, type_idx)?;
            self.vacate_last(type_idx);
        }
        self.count -= 1;
        Ok(())
    }

    /// Replaces the bits of one type with a mask read from a serialized run.
    pub fn load_mask(&mut self, type_idx: usize, mask: Mask128) -> EcsResult<()> {
        self.check_type(type_idx)?;
        let mask = mask & self.occupancy();
        self.masks[type_idx] = mask;
        self.disabled[type_idx] = mask.count_zeros_below(self.count);
        Ok(())
    }

    /// Writes the bits of one type for slots `[0, count)`.
    pub fn write_words(&self, type_idx: usize, writer: &mut dyn EnableWordWriter) -> EcsResult<()> {
        self.check_type(type_idx)?;
        let words = self.masks[type_idx].to_words();
        writer.write_words(&words[..words_for(self.count)], self.count);
        Ok(())
    }

    /// Verifies the occupancy and disabled count invariants.
    pub fn check(&self) -> Result<(), String> {
        let vacant = !self.occupancy();
        for (type_idx, (mask, disabled)) in self.masks.iter().zip(&self.disabled).enumerate() {
            if !(*mask & vacant).is_zero() {
                return Err(format!(
                    "enable type {type_idx} has bits set at or beyond slot {}",
                    self.count
                ));
            }

            let zeros = mask.count_zeros_below(self.count);
            if zeros != *disabled {
                return Err(format!(
                    "enable type {type_idx} caches {disabled} disabled entities but has {zeros}"
                ));
            }
        }
        Ok(())
    }

    #[inline]
    fn check_type(&self, type_idx: usize) -> EcsResult<()> {
        if type_idx < self.masks.len() {
            Ok(())
        } else {
            Err(EcsError::TypeIndexOutOfBounds {
                index: type_idx,
                len: self.masks.len(),
            })
        }
    }

    #[inline]
    fn check_slot(&self, slot: usize) -> EcsResult<()> {
        if slot < self.count {
            Ok(())
        } else {
            Err(EcsError::SlotOutOfBounds {
                slot,
                count: self.count,
            })
        }
    }
}
