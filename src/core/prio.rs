//! Priority bitmap of claimed base priorities
//!
//! Base priorities are unique per task. The bitmap answers "is this level
//! taken" in O(1) at task creation. Bit 0 of word 0 is priority 0.

use crate::config::CFG_PRIO_MAX;
use crate::types::OsPrio;

const PRIO_TBL_SIZE: usize = CFG_PRIO_MAX.div_ceil(32);

pub struct PrioSet {
    bitmap: [u32; PRIO_TBL_SIZE],
}

impl PrioSet {
    pub const fn new() -> Self {
        PrioSet {
            bitmap: [0; PRIO_TBL_SIZE],
        }
    }

    #[inline]
    fn slot(prio: OsPrio) -> (usize, u32) {
        debug_assert!((prio as usize) < CFG_PRIO_MAX);
        ((prio / 32) as usize, 1 << (31 - (prio % 32)))
    }

    /// Claim a level. Returns false if it was already claimed.
    #[inline]
    pub fn claim(&mut self, prio: OsPrio) -> bool {
        let (word, bit) = Self::slot(prio);
        let fresh = self.bitmap[word] & bit == 0;
        self.bitmap[word] |= bit;
        fresh
    }

    #[inline]
    pub fn is_claimed(&self, prio: OsPrio) -> bool {
        let (word, bit) = Self::slot(prio);
        self.bitmap[word] & bit != 0
    }

    /// Highest (numerically lowest) claimed level
    pub fn highest(&self) -> Option<OsPrio> {
        self.bitmap
            .iter()
            .enumerate()
            .find(|(_, &w)| w != 0)
            .map(|(i, &w)| (i * 32) as OsPrio + w.leading_zeros() as OsPrio)
    }

    pub fn clear(&mut self) {
        self.bitmap = [0; PRIO_TBL_SIZE];
    }
}

impl Default for PrioSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_exclusive() {
        let mut set = PrioSet::new();
        assert!(set.claim(5));
        assert!(!set.claim(5));
        assert!(set.is_claimed(5));
        assert!(!set.is_claimed(4));
    }

    #[test]
    fn highest_crosses_words() {
        let mut set = PrioSet::new();
        assert_eq!(set.highest(), None);
        set.claim(40);
        assert_eq!(set.highest(), Some(40));
        set.claim(31);
        assert_eq!(set.highest(), Some(31));
        set.claim(0);
        assert_eq!(set.highest(), Some(0));
        set.clear();
        assert_eq!(set.highest(), None);
    }
}
