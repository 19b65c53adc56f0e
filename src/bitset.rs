//! Compact bitset over taxon indices.
//!
//! # Overview
//! One side of a bipartition is a set of taxa. With taxa numbered by their
//! [`TaxonId`](crate::tree::TaxonId), a set is a row of bits: bit `i` is set
//! when taxon `i` is on that side.
//!
//! # Example
//! For a tree with taxa [A, B, C, D] mapped to indices [0, 1, 2, 3]:
//! - Side {B, C} → bitset `0b0110`
//! - Its complement {A, D} → bitset `0b1001`

/// A compact bitset for representing the taxa on one side of an edge.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large trees.
/// Each u64 word holds 64 taxon indices.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a bitset large enough for `len` taxa with all bits cleared.
    ///
    /// # Example
    /// ```
    /// # use tree_sorter::bitset::Bitset;
    /// // 100 taxa need 2 words (128 bits)
    /// let bs = Bitset::with_capacity(100);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn with_capacity(len: usize) -> Self {
        Bitset(vec![0u64; len.div_ceil(64)])
    }

    /// Marks taxon `idx` as present.
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0[word] |= 1u64 << bit;
    }

    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0.get(word).is_some_and(|w| w & (1u64 << bit) != 0)
    }

    /// Number of taxa in the set.
    ///
    /// ```
    /// # use tree_sorter::bitset::Bitset;
    /// let mut bs = Bitset::with_capacity(8);
    /// bs.set(0);
    /// bs.set(2);
    /// bs.set(5);
    /// assert_eq!(bs.count_ones(), 3);
    /// ```
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// The other side: every index below `len` that is not in `self`.
    ///
    /// Bits at or above `len` stay cleared.
    pub fn complement(&self, len: usize) -> Bitset {
        let mut out = Bitset(self.0.iter().map(|w| !w).collect());
        let tail = len & 63;
        if tail != 0 {
            if let Some(last) = out.0.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
        out
    }

    /// Indices of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(w, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| (w << 6) | bit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::with_capacity(4);
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.0[0], 0b0101);
        assert!(bs.contains(2));
        assert!(!bs.contains(1));
        assert!(!bs.contains(500));
    }

    /// Visual example: both sides of the one informative edge
    ///
    /// ```text
    ///   A           C
    ///    \         /
    ///     n0 --- n1
    ///    /         \
    ///   D           B
    /// ```
    ///
    /// Taxon mapping: A=0, B=1, C=2, D=3
    #[test]
    fn test_complement_is_other_side() {
        let mut distal = Bitset::with_capacity(4);
        distal.set(1);
        distal.set(2);

        let anchor = distal.complement(4);
        assert_eq!(anchor.0[0], 0b1001);
        assert!(anchor.iter_ones().all(|i| !distal.contains(i)));
        assert_eq!(anchor.count_ones() + distal.count_ones(), 4);
    }

    #[test]
    fn test_large_tree() {
        // More than 64 taxa (multiple words)
        let mut bs = Bitset::with_capacity(128);
        bs.set(0);
        bs.set(63);
        bs.set(64);
        bs.set(127);

        assert_eq!(bs.count_ones(), 4);
        assert_eq!(bs.0[0], 1u64 | (1u64 << 63));
        assert_eq!(bs.0[1], 1u64 | (1u64 << 63));
        assert_eq!(bs.iter_ones().collect::<Vec<_>>(), vec![0, 63, 64, 127]);
    }

    #[test]
    fn test_complement_masks_tail() {
        let bs = Bitset::with_capacity(70);
        let all = bs.complement(70);
        assert_eq!(all.count_ones(), 70);
        assert!(all.contains(69));
        assert!(!all.contains(70));
    }
}
