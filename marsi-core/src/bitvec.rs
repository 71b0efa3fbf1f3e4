//! Dense fixed-length bit array.
//!
//! [`BitArray`] is the dense form of a sparse fingerprint: every position
//! starts cleared and is set individually. Bits live in u64 blocks.

use crate::{MarsiError, Result};

/// A fixed-length array of bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitArray {
    blocks: Vec<u64>,
    len: usize,
}

impl BitArray {
    /// An array of `len` cleared bits.
    pub fn zeros(len: usize) -> Self {
        Self {
            blocks: vec![0u64; (len + 63) / 64],
            len,
        }
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has zero positions.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the bit at position `i`, or `None` past the end.
    pub fn get(&self, i: usize) -> Option<bool> {
        (i < self.len).then(|| (self.blocks[i / 64] >> (i % 64)) & 1 == 1)
    }

    /// Set the bit at position `i`.
    pub fn set(&mut self, i: usize) -> Result<()> {
        if i >= self.len {
            return Err(MarsiError::InvalidInput(format!(
                "bit {i} out of range for array of length {}",
                self.len
            )));
        }
        self.blocks[i / 64] |= 1u64 << (i % 64);
        Ok(())
    }

    /// Total number of 1-bits.
    pub fn count_ones(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Indices of all set positions in ascending order.
    pub fn ones(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.count_ones());
        for (bi, &block) in self.blocks.iter().enumerate() {
            let mut word = block;
            while word != 0 {
                out.push(bi * 64 + word.trailing_zeros() as usize);
                word &= word - 1;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_are_clear() {
        let arr = BitArray::zeros(100);
        assert_eq!(arr.len(), 100);
        assert_eq!(arr.count_ones(), 0);
        assert_eq!(arr.get(99), Some(false));
        assert_eq!(arr.get(100), None);
    }

    #[test]
    fn set_and_get() {
        let mut arr = BitArray::zeros(130);
        arr.set(0).unwrap();
        arr.set(64).unwrap();
        arr.set(129).unwrap();
        arr.set(64).unwrap();
        assert_eq!(arr.get(0), Some(true));
        assert_eq!(arr.get(1), Some(false));
        assert_eq!(arr.get(129), Some(true));
        assert_eq!(arr.ones(), vec![0, 64, 129]);
        assert_eq!(arr.count_ones(), 3);
        assert!(matches!(arr.set(130), Err(MarsiError::InvalidInput(_))));
    }

    #[test]
    fn empty_array() {
        let mut arr = BitArray::zeros(0);
        assert!(arr.is_empty());
        assert!(arr.ones().is_empty());
        assert!(arr.set(0).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ones_are_the_set_positions(bits in proptest::collection::vec(any::<bool>(), 0..2000)) {
            let mut arr = BitArray::zeros(bits.len());
            for (i, _) in bits.iter().enumerate().filter(|&(_, &b)| b) {
                arr.set(i).unwrap();
            }
            let expected: Vec<usize> = bits.iter().enumerate().filter(|&(_, &b)| b).map(|(i, _)| i).collect();
            prop_assert_eq!(arr.count_ones(), expected.len());
            prop_assert_eq!(arr.ones(), expected);
        }
    }
}
