//! 2-bit packed DNA k-mers with a compile-time word budget.
//!
//! `W` is the number of 64-bit words backing the k-mer, chosen by the caller
//! from the largest span the run will encode (W=1 covers spans up to 32,
//! W=2 up to 64, and so on). Base codes: A=0, C=1, G=2, T=3; U is accepted
//! on input and always decoded as T.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use ahash::AHasher;
use thiserror::Error;

pub const BASES_PER_WORD: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Recoverable: the window is skipped and counted by the caller.
    #[error("invalid base {0:?} (expected A, C, G, T or U)")]
    InvalidBase(char),
    /// A programming error: the span was not checked against the word budget.
    #[error("k-mer of length {len} exceeds the {capacity}-base capacity")]
    Overflow { len: usize, capacity: usize },
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedKmer<const W: usize> {
    words: [u64; W],
    len: u32,
}

impl<const W: usize> PackedKmer<W> {
    pub const CAPACITY: usize = W * BASES_PER_WORD;

    /// Encode a DNA string. Fails on the first byte outside ACGTU (either case).
    pub fn encode(bases: &[u8]) -> Result<Self, EncodeError> {
        if bases.len() > Self::CAPACITY {
            return Err(EncodeError::Overflow {
                len: bases.len(),
                capacity: Self::CAPACITY,
            });
        }
        let mut words = [0u64; W];
        for (i, &b) in bases.iter().enumerate() {
            let code: u64 = match b {
                b'A' | b'a' => 0,
                b'C' | b'c' => 1,
                b'G' | b'g' => 2,
                b'T' | b't' | b'U' | b'u' => 3,
                other => return Err(EncodeError::InvalidBase(other as char)),
            };
            words[i / BASES_PER_WORD] |= code << (2 * (i % BASES_PER_WORD));
        }
        Ok(Self {
            words,
            len: bases.len() as u32,
        })
    }

    pub(crate) fn from_raw(words: [u64; W], len: u32) -> Self {
        debug_assert!(len as usize <= Self::CAPACITY);
        Self { words, len }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 2-bit code of the base at position `i` (0-based, must be < len).
    #[inline]
    pub fn code_at(&self, i: usize) -> u8 {
        debug_assert!(i < self.len as usize);
        ((self.words[i / BASES_PER_WORD] >> (2 * (i % BASES_PER_WORD))) & 3) as u8
    }

    pub fn decode(&self) -> String {
        let mut out = String::with_capacity(self.len as usize);
        for i in 0..self.len as usize {
            out.push(match self.code_at(i) {
                0 => 'A',
                1 => 'C',
                2 => 'G',
                _ => 'T',
            });
        }
        out
    }

    pub fn reverse_complement(&self) -> Self {
        let n = self.len as usize;
        let mut words = [0u64; W];
        for i in 0..n {
            let code = (3 - self.code_at(n - 1 - i)) as u64;
            words[i / BASES_PER_WORD] |= code << (2 * (i % BASES_PER_WORD));
        }
        Self {
            words,
            len: self.len,
        }
    }

    /// True when the literal k-mer is lexicographically larger than its
    /// reverse complement (palindromes are not canonical).
    pub fn is_canonical(&self) -> bool {
        *self > self.reverse_complement()
    }

    /// The lexicographically larger of the k-mer and its reverse complement.
    pub fn canonical(&self) -> Self {
        let rc = self.reverse_complement();
        if *self >= rc {
            *self
        } else {
            rc
        }
    }

    /// Hash that is identical for a k-mer and its reverse complement.
    pub fn canonical_hash(&self) -> u64 {
        let mut h = AHasher::default();
        self.canonical().hash(&mut h);
        h.finish()
    }
}

// Lexicographic on the base sequence; the packed words store base 0 in the
// low bits, so raw word comparison would order by the trailing base.
impl<const W: usize> Ord for PackedKmer<W> {
    fn cmp(&self, other: &Self) -> Ordering {
        let n = self.len.min(other.len) as usize;
        for i in 0..n {
            match self.code_at(i).cmp(&other.code_at(i)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        self.len.cmp(&other.len)
    }
}

impl<const W: usize> PartialOrd for PackedKmer<W> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const W: usize> std::fmt::Debug for PackedKmer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PackedKmer({})", self.decode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for s in ["A", "ACGT", "TTTTACGTACGTACGTACGTACGTACGTGGGG"] {
            let k = PackedKmer::<1>::encode(s.as_bytes()).unwrap();
            assert_eq!(k.decode(), s);
            assert_eq!(k.len(), s.len());
        }
    }

    #[test]
    fn u_decodes_as_t() {
        let k = PackedKmer::<1>::encode(b"ACGU").unwrap();
        assert_eq!(k.decode(), "ACGT");
        assert_eq!(k, PackedKmer::<1>::encode(b"ACGT").unwrap());
    }

    #[test]
    fn lower_case_accepted() {
        let k = PackedKmer::<1>::encode(b"acgtu").unwrap();
        assert_eq!(k.decode(), "ACGTT");
    }

    #[test]
    fn invalid_base_rejected() {
        assert_eq!(
            PackedKmer::<1>::encode(b"ACGN"),
            Err(EncodeError::InvalidBase('N'))
        );
    }

    #[test]
    fn capacity_boundary() {
        let s32 = "A".repeat(32);
        let s33 = "A".repeat(33);
        assert!(PackedKmer::<1>::encode(s32.as_bytes()).is_ok());
        assert_eq!(
            PackedKmer::<1>::encode(s33.as_bytes()),
            Err(EncodeError::Overflow {
                len: 33,
                capacity: 32
            })
        );
        assert!(PackedKmer::<2>::encode(s33.as_bytes()).is_ok());
        let s64 = "ACGT".repeat(16);
        let k = PackedKmer::<2>::encode(s64.as_bytes()).unwrap();
        assert_eq!(k.decode(), s64);
    }

    #[test]
    fn reverse_complement_involution() {
        for s in ["ACGT", "AAAAACCCCC", "GATTACA", "TTGGCCAATTGGCCAA"] {
            let k = PackedKmer::<1>::encode(s.as_bytes()).unwrap();
            assert_eq!(k.reverse_complement().reverse_complement(), k);
        }
        let k = PackedKmer::<1>::encode(b"AACCGGTT").unwrap();
        assert_eq!(k.reverse_complement().decode(), "AACCGGTT");
        let k = PackedKmer::<1>::encode(b"AAACC").unwrap();
        assert_eq!(k.reverse_complement().decode(), "GGTTT");
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = PackedKmer::<1>::encode(b"AAACC").unwrap();
        let b = PackedKmer::<1>::encode(b"AAACG").unwrap();
        let c = PackedKmer::<1>::encode(b"CAAAA").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(PackedKmer::<1>::encode(b"AAA").unwrap() < a);
    }

    #[test]
    fn canonical_flag_and_hash() {
        let k = PackedKmer::<1>::encode(b"TTTTT").unwrap();
        assert!(k.is_canonical());
        assert!(!k.reverse_complement().is_canonical());
        // palindrome: neither orientation is strictly larger
        let p = PackedKmer::<1>::encode(b"ACGT").unwrap();
        assert!(!p.is_canonical());

        for s in ["ACGTACGTA", "GGGTT", "AAACC", "TTTTT"] {
            let k = PackedKmer::<1>::encode(s.as_bytes()).unwrap();
            assert_eq!(k.canonical_hash(), k.reverse_complement().canonical_hash());
        }
    }
}
