//! Bit-packed per-sample tensor-index columns.
//!
//! Each training subset stores, per term, the tensor-bin index of every
//! sample packed into integer words. The item width is the minimum number of
//! bits that can hold any index of that term's tensor, and the word width
//! follows the subset's capability record, so a small term over a `u32`
//! subset packs many indexes per word.
//!
//! Item `i` occupies bits `[(i % items_per_word) * bits, ...)` of word
//! `i / items_per_word`, low bits first.

use crate::data::subset::UintWidth;
use crate::error::BoostError;

/// Packed index words in the subset's integer width.
#[derive(Debug, Clone)]
enum PackedWords {
    U32(Vec<u32>),
    U64(Vec<u64>),
}

/// A packed column of tensor-bin indexes for one term.
#[derive(Debug, Clone)]
pub struct PackedIndexes {
    words: PackedWords,
    bits_per_item: u32,
    items_per_word: usize,
    len: usize,
}

impl PackedIndexes {
    /// Pack `indexes` at `bits_per_item` bits each into words of `width`.
    ///
    /// Fails if an index does not fit in `bits_per_item` bits or the item
    /// width exceeds the word width.
    pub fn pack(
        indexes: &[usize],
        bits_per_item: u32,
        width: UintWidth,
    ) -> Result<Self, BoostError> {
        let word_bits = match width {
            UintWidth::U32 => 32,
            UintWidth::U64 => 64,
        };
        if bits_per_item == 0 || bits_per_item > word_bits {
            return Err(BoostError::IllegalParamVal("packed item width"));
        }
        let limit = if bits_per_item == word_bits {
            usize::MAX
        } else {
            (1usize << bits_per_item) - 1
        };
        if indexes.iter().any(|&index| index > limit) {
            return Err(BoostError::IllegalParamVal("tensor index exceeds packed item width"));
        }

        let items_per_word = (word_bits / bits_per_item) as usize;
        let words_needed = indexes.len().div_ceil(items_per_word);
        let words = match width {
            UintWidth::U32 => {
                let mut words = vec![0u32; words_needed];
                for (i, &index) in indexes.iter().enumerate() {
                    let shift = (i % items_per_word) as u32 * bits_per_item;
                    words[i / items_per_word] |= (index as u32) << shift;
                }
                PackedWords::U32(words)
            }
            UintWidth::U64 => {
                let mut words = vec![0u64; words_needed];
                for (i, &index) in indexes.iter().enumerate() {
                    let shift = (i % items_per_word) as u32 * bits_per_item;
                    words[i / items_per_word] |= (index as u64) << shift;
                }
                PackedWords::U64(words)
            }
        };

        Ok(Self { words, bits_per_item, items_per_word, len: indexes.len() })
    }

    /// Number of packed items.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the column holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bits per packed item.
    #[inline]
    pub fn bits_per_item(&self) -> u32 {
        self.bits_per_item
    }

    /// Items stored per word.
    #[inline]
    pub fn items_per_word(&self) -> usize {
        self.items_per_word
    }

    /// Decode item `i`.
    #[inline]
    pub fn get(&self, i: usize) -> usize {
        debug_assert!(i < self.len);
        let shift = (i % self.items_per_word) as u32 * self.bits_per_item;
        match &self.words {
            PackedWords::U32(words) => {
                let mask = mask_u64(self.bits_per_item) as u32;
                ((words[i / self.items_per_word] >> shift) & mask) as usize
            }
            PackedWords::U64(words) => {
                let mask = mask_u64(self.bits_per_item);
                ((words[i / self.items_per_word] >> shift) & mask) as usize
            }
        }
    }

    /// Decode all items in order, amortizing the word fetch.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let bits = self.bits_per_item;
        let ipw = self.items_per_word;
        (0..self.len).map(move |i| {
            let shift = (i % ipw) as u32 * bits;
            match &self.words {
                PackedWords::U32(words) => {
                    (((words[i / ipw] as u64) >> shift) & mask_u64(bits)) as usize
                }
                PackedWords::U64(words) => ((words[i / ipw] >> shift) & mask_u64(bits)) as usize,
            }
        })
    }
}

#[inline]
fn mask_u64(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(UintWidth::U32, 1)]
    #[case(UintWidth::U32, 7)]
    #[case(UintWidth::U32, 32)]
    #[case(UintWidth::U64, 1)]
    #[case(UintWidth::U64, 9)]
    #[case(UintWidth::U64, 64)]
    fn test_pack_roundtrip(#[case] width: UintWidth, #[case] bits: u32) {
        let limit = if bits >= 63 { 1 << 20 } else { (1usize << bits) - 1 };
        let indexes: Vec<usize> =
            (0..137).map(|i| (i * 2654435761usize) % (limit + 1)).collect();
        let packed = PackedIndexes::pack(&indexes, bits, width).unwrap();
        assert_eq!(packed.len(), indexes.len());
        for (i, &expected) in indexes.iter().enumerate() {
            assert_eq!(packed.get(i), expected, "item {}", i);
        }
        let decoded: Vec<usize> = packed.iter().collect();
        assert_eq!(decoded, indexes);
    }

    #[test]
    fn test_pack_rejects_oversized_index() {
        let err = PackedIndexes::pack(&[4], 2, UintWidth::U32).unwrap_err();
        assert!(matches!(err, BoostError::IllegalParamVal(_)));
    }

    #[test]
    fn test_pack_rejects_item_wider_than_word() {
        let err = PackedIndexes::pack(&[0], 33, UintWidth::U32).unwrap_err();
        assert!(matches!(err, BoostError::IllegalParamVal(_)));
    }

    #[test]
    fn test_items_per_word() {
        let packed = PackedIndexes::pack(&[1, 2, 3], 9, UintWidth::U32).unwrap();
        assert_eq!(packed.items_per_word(), 3);
        let packed = PackedIndexes::pack(&[1, 2, 3], 9, UintWidth::U64).unwrap();
        assert_eq!(packed.items_per_word(), 7);
    }
}
