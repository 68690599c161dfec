// A fixed-length bit sequence, one bit per piece, MSB-first within each byte
// (bit 0 of the bitfield is the most significant bit of byte 0). This is the
// wire-compatible representation BitTorrent peers exchange in the BITFIELD
// message, so it is kept as a thin wrapper over the raw bytes rather than a
// richer set type.
pub type Bitfield = bitvec::vec::BitVec<u8, bitvec::order::Msb0>;

pub trait BitfieldExt {
    fn has(&self, idx: usize) -> bool;
    fn set(&mut self, idx: usize);
    fn popcount(&self) -> usize;
    fn new_of_bits(n: usize) -> Self;
}

impl BitfieldExt for Bitfield {
    fn has(&self, idx: usize) -> bool {
        self.get(idx).map(|b| *b).unwrap_or(false)
    }

    fn set(&mut self, idx: usize) {
        if let Some(mut bit) = self.get_mut(idx) {
            *bit = true;
        }
    }

    fn popcount(&self) -> usize {
        self.count_ones()
    }

    fn new_of_bits(n: usize) -> Self {
        let num_bytes = (n + 7) / 8;
        Bitfield::repeat(false, num_bytes * 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_of_bits_rounds_up_to_whole_byte() {
        let bf = Bitfield::new_of_bits(3);
        assert_eq!(bf.len(), 8);
        assert_eq!(bf.popcount(), 0);
    }

    #[test]
    fn has_and_set_round_trip() {
        let mut bf = Bitfield::new_of_bits(10);
        assert!(!bf.has(4));
        bf.set(4);
        assert!(bf.has(4));
        assert_eq!(bf.popcount(), 1);
    }

    #[test]
    fn out_of_range_has_is_false_and_set_is_noop() {
        let mut bf = Bitfield::new_of_bits(4);
        assert!(!bf.has(100));
        bf.set(100);
        assert_eq!(bf.popcount(), 0);
    }

    #[test]
    fn bit_ordering_is_msb_first() {
        let mut bf = Bitfield::new_of_bits(8);
        bf.set(0);
        assert_eq!(bf.as_raw_slice(), &[0b1000_0000]);
    }

    #[test]
    fn popcount_matches_distinct_set_calls() {
        let mut bf = Bitfield::new_of_bits(16);
        for i in [0, 3, 3, 7, 15] {
            bf.set(i);
        }
        assert_eq!(bf.popcount(), 4);
    }
}
