//! Register byte-order policy
//!
//! Devices disagree on how multi-register values are laid out. The policy has
//! two independent switches applied to the raw register bytes of a read:
//!
//! ```text
//! given 00 11 22 33
//!   word_swap=false byte_swap=false -> 00 11 22 33
//!   word_swap=false byte_swap=true  -> 11 00 33 22
//!   word_swap=true  byte_swap=false -> 22 33 00 11
//!   word_swap=true  byte_swap=true  -> 33 22 11 00
//! ```

/// Word/byte swap switches for 16-bit register reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapPolicy {
    /// Reverse the order of the 16-bit words in the buffer
    pub word_swap: bool,

    /// Reverse the two bytes inside each word
    pub byte_swap: bool,
}

impl SwapPolicy {
    /// Leave register bytes as they arrived (Modbus big-endian order)
    pub const NONE: Self = Self::new(false, false);

    /// Fully reversed, the default
    pub const FULL: Self = Self::new(true, true);

    pub const fn new(word_swap: bool, byte_swap: bool) -> Self {
        Self {
            word_swap,
            byte_swap,
        }
    }

    /// Apply the policy in place: word swap first, then byte swap
    ///
    /// Word swapping needs an even byte count; an odd buffer keeps its word
    /// order and only complete pairs are byte swapped.
    pub fn apply(&self, data: &mut [u8]) {
        if self.word_swap && data.len() % 2 == 0 {
            let words = data.len() / 2;
            for i in 0..words / 2 {
                let j = words - 1 - i;
                data.swap(2 * i, 2 * j);
                data.swap(2 * i + 1, 2 * j + 1);
            }
        }

        if self.byte_swap {
            for pair in data.chunks_exact_mut(2) {
                pair.swap(0, 1);
            }
        }
    }
}

impl Default for SwapPolicy {
    fn default() -> Self {
        Self::FULL
    }
}
