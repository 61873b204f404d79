// A packed boolean vector, used for nullability tracking, filter results, and row
// selection (spec.md §4.1). Unlike the teacher's fixed-256-bit `Bitmap256`, this one
// grows: `cap` is the addressable bit count and the word array is always sized to
// `ceil(cap / 64)`.

use crate::ioutil::{Reader, ReaderExt, Writer, WriterExt};
use crate::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitmap {
    cap: usize,
    words: Vec<u64>,
}

fn word_count(cap: usize) -> usize {
    (cap + 63) / 64
}

impl Bitmap {
    pub fn new(n: usize) -> Self {
        Bitmap { cap: n, words: vec![0u64; word_count(n)] }
    }

    pub fn from_bools(bits: &[bool]) -> Self {
        let mut bm = Bitmap::new(bits.len());
        for (i, &b) in bits.iter().enumerate() {
            bm.set(i, b);
        }
        bm
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Extends capacity if `i >= cap`; sets bit `i` exactly.
    pub fn set(&mut self, i: usize, v: bool) {
        if i >= self.cap {
            self.cap = i + 1;
            self.words.resize(word_count(self.cap), 0);
        }
        let (w, b) = (i / 64, i % 64);
        if v {
            self.words[w] |= 1 << b;
        } else {
            self.words[w] &= !(1 << b);
        }
    }

    /// Returns false for `i >= cap` and never faults.
    pub fn get(&self, i: usize) -> bool {
        if i >= self.cap {
            return false;
        }
        let (w, b) = (i / 64, i % 64);
        (self.words[w] & (1 << b)) != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn mask_tail(&mut self) {
        let used_bits = self.cap % 64;
        if used_bits != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << used_bits) - 1;
            }
        }
    }

    /// Bitwise complement; bits `>= cap` in the tail word stay zero.
    pub fn invert(&mut self) {
        for w in self.words.iter_mut() {
            *w = !*w;
        }
        self.mask_tail();
    }

    /// Extends `self` by `other.cap` bits, preserving values. Result's cap is
    /// `self.cap + other.cap`.
    pub fn append(&mut self, other: &Bitmap) {
        let base = self.cap;
        self.cap += other.cap;
        self.words.resize(word_count(self.cap), 0);
        for i in 0..other.cap {
            if other.get(i) {
                self.set(base + i, true);
            }
        }
    }

    /// Clears every set bit beyond the k-th *set* bit (not the k-th index). `cap` is
    /// unchanged. A no-op if `k >= count()`. Panics for negative `k`.
    pub fn keep_first_n(&mut self, k: i64) {
        assert!(k >= 0, "keep_first_n: k must be non-negative, got {k}");
        let mut remaining = k as usize;
        if remaining >= self.count() {
            return;
        }
        for wi in 0..self.words.len() {
            let mut w = self.words[wi];
            let mut kept = 0u64;
            while w != 0 {
                let bit = w & w.wrapping_neg(); // lowest set bit
                if remaining > 0 {
                    kept |= bit;
                    remaining -= 1;
                }
                w &= !bit;
            }
            self.words[wi] = kept;
        }
    }

    /// Little-endian: `u32 cap`, `u32 word_count`, then `word_count` x `u64`.
    pub fn marshal_binary(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_u32_le(self.cap as u32)?;
        wr.write_u32_le(self.words.len() as u32)?;
        for w in &self.words {
            wr.write_u64_le(*w)?;
        }
        Ok(())
    }

    pub fn deserialize(rd: &mut impl Reader) -> Result<Self> {
        let cap = rd.read_u32_le()? as usize;
        let wc = rd.read_u32_le()? as usize;
        let mut words = Vec::with_capacity(wc);
        for _ in 0..wc {
            words.push(rd.read_u64_le()?);
        }
        Ok(Bitmap { cap, words })
    }

    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.cap).filter(move |&i| self.get(i))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ioutil::{MemReader, MemWriter};
    use test_log::test;

    #[test]
    fn test_set_get() {
        let mut bm = Bitmap::new(10);
        for i in 0..10 {
            bm.set(i, i % 2 == 0);
        }
        for i in 0..10 {
            assert_eq!(bm.get(i), i % 2 == 0);
        }
        assert_eq!(bm.get(100), false);
    }

    #[test]
    fn test_set_extends_capacity() {
        let mut bm = Bitmap::new(1);
        bm.set(70, true);
        assert_eq!(bm.cap(), 71);
        assert!(bm.get(70));
        assert_eq!(bm.count(), 1);
    }

    #[test]
    fn test_count_and_invert() {
        let bm = Bitmap::from_bools(&[true, false, true, true, false]);
        assert_eq!(bm.count(), 3);
        let mut inv = bm.clone();
        inv.invert();
        assert_eq!(inv.count() + bm.count(), 5);
        for i in 0..5 {
            assert_eq!(inv.get(i), !bm.get(i));
        }
    }

    #[test]
    fn test_invert_masks_tail_word() {
        let mut bm = Bitmap::new(70);
        bm.invert();
        assert_eq!(bm.count(), 70);
        for i in 70..128 {
            assert_eq!(bm.get(i), false);
        }
    }

    #[test]
    fn test_append() {
        let mut a = Bitmap::from_bools(&[true, false, true]);
        let b = Bitmap::from_bools(&[false, true]);
        a.append(&b);
        assert_eq!(a.cap(), 5);
        assert_eq!(
            (0..5).map(|i| a.get(i)).collect::<Vec<_>>(),
            vec![true, false, true, false, true]
        );
    }

    #[test]
    fn test_keep_first_n() {
        let mut bm = Bitmap::from_bools(&[true, false, true, true, false, true]);
        bm.keep_first_n(2);
        assert_eq!(bm.count(), 2);
        assert!(bm.get(0));
        assert!(bm.get(2));
        assert!(!bm.get(3));
        assert!(!bm.get(5));
    }

    #[test]
    fn test_keep_first_n_noop_when_k_geq_count() {
        let mut bm = Bitmap::from_bools(&[true, false, true]);
        bm.keep_first_n(2);
        assert_eq!(bm.count(), 2);
        bm.keep_first_n(10);
        assert_eq!(bm.count(), 2);
    }

    #[test]
    #[should_panic]
    fn test_keep_first_n_negative_panics() {
        let mut bm = Bitmap::new(4);
        bm.keep_first_n(-1);
    }

    #[test]
    fn test_roundtrip() {
        let bm = Bitmap::from_bools(&[true, false, true, true, false, false, true]);
        let mut w = MemWriter::new();
        bm.marshal_binary(&mut w).unwrap();
        let bytes = w.into_inner();
        let mut r = MemReader::from(bytes);
        let bm2 = Bitmap::deserialize(&mut r).unwrap();
        assert_eq!(bm, bm2);
    }
}
