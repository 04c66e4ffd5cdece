//! Genomic seed occurrences packed into a single 64-bit word.
//!
//! Layout: bits[0..3] genome, bit[4] strand (1 = reverse), bit[5] canonical
//! flag, bits[6..23] sequence, bits[24..63] position. The canonical flag
//! records whether the literal k-mer at the spot was lexicographically larger
//! than its reverse complement, so containers that must treat a k-mer and its
//! reverse complement as one location can ignore it while the original
//! orientation stays reconstructible.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use ahash::AHasher;
use thiserror::Error;

use crate::kmer::PackedKmer;

const GENOME_BITS: u32 = 4;
const SEQUENCE_BITS: u32 = 18;
const POSITION_BITS: u32 = 40;

const STRAND_SHIFT: u32 = GENOME_BITS;
const CANONICAL_SHIFT: u32 = GENOME_BITS + 1;
const SEQUENCE_SHIFT: u32 = GENOME_BITS + 2;
const POSITION_SHIFT: u32 = SEQUENCE_SHIFT + SEQUENCE_BITS;

const GENOME_MASK: u64 = (1 << GENOME_BITS) - 1;
const STRAND_BIT: u64 = 1 << STRAND_SHIFT;
const CANONICAL_BIT: u64 = 1 << CANONICAL_SHIFT;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const POSITION_MASK: u64 = (1 << POSITION_BITS) - 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field} id {value} exceeds the packed budget of {max}")]
pub struct CapacityExceeded {
    pub field: &'static str,
    pub value: u64,
    pub max: u64,
}

/// An immutable genomic location of one observed seed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OccurrenceRecord(u64);

impl OccurrenceRecord {
    pub const MAX_GENOME: u64 = GENOME_MASK;
    pub const MAX_SEQUENCE: u64 = SEQUENCE_MASK;
    pub const MAX_POSITION: u64 = POSITION_MASK;

    /// Build a record for the literal k-mer observed at this spot; the
    /// canonical flag is derived from the k-mer itself.
    pub fn new<const W: usize>(
        genome: u8,
        sequence: u32,
        position: u64,
        reverse: bool,
        literal: &PackedKmer<W>,
    ) -> Result<Self, CapacityExceeded> {
        Self::from_parts(genome, sequence, position, reverse, literal.is_canonical())
    }

    pub fn from_parts(
        genome: u8,
        sequence: u32,
        position: u64,
        reverse: bool,
        canonical: bool,
    ) -> Result<Self, CapacityExceeded> {
        if u64::from(genome) > Self::MAX_GENOME {
            return Err(CapacityExceeded {
                field: "genome",
                value: genome.into(),
                max: Self::MAX_GENOME,
            });
        }
        if u64::from(sequence) > Self::MAX_SEQUENCE {
            return Err(CapacityExceeded {
                field: "sequence",
                value: sequence.into(),
                max: Self::MAX_SEQUENCE,
            });
        }
        if position > Self::MAX_POSITION {
            return Err(CapacityExceeded {
                field: "position",
                value: position,
                max: Self::MAX_POSITION,
            });
        }
        let mut word = u64::from(genome)
            | (u64::from(sequence) << SEQUENCE_SHIFT)
            | (position << POSITION_SHIFT);
        if reverse {
            word |= STRAND_BIT;
        }
        if canonical {
            word |= CANONICAL_BIT;
        }
        Ok(Self(word))
    }

    #[inline]
    pub fn genome(&self) -> u8 {
        (self.0 & GENOME_MASK) as u8
    }

    #[inline]
    pub fn sequence(&self) -> u32 {
        ((self.0 >> SEQUENCE_SHIFT) & SEQUENCE_MASK) as u32
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.0 >> POSITION_SHIFT
    }

    #[inline]
    pub fn is_reverse(&self) -> bool {
        self.0 & STRAND_BIT != 0
    }

    #[inline]
    pub fn is_canonical(&self) -> bool {
        self.0 & CANONICAL_BIT != 0
    }

    /// Same location and strand, canonical flag ignored.
    #[inline]
    pub fn same_spot(&self, other: &Self) -> bool {
        (self.0 | CANONICAL_BIT) == (other.0 | CANONICAL_BIT)
    }

    /// Hash agreeing with `same_spot`: identical for records that differ
    /// only in the canonical flag.
    pub fn spot_hash(&self) -> u64 {
        let mut h = AHasher::default();
        (self.0 & !CANONICAL_BIT).hash(&mut h);
        h.finish()
    }

    /// Center of the `span`-length window starting at this record's position.
    pub fn center(&self, span: usize) -> u64 {
        center_position(self.position(), span)
    }

    // Rearranged so that u64 order is (genome, sequence, position, strand).
    fn sort_key(&self) -> u64 {
        (u64::from(self.genome()) << 59)
            | (u64::from(self.sequence()) << 41)
            | (self.position() << 1)
            | u64::from(self.is_reverse())
    }
}

impl Ord for OccurrenceRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for OccurrenceRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Debug for OccurrenceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Occurrence(g{} s{} p{} {}{})",
            self.genome(),
            self.sequence(),
            self.position(),
            if self.is_reverse() { '-' } else { '+' },
            if self.is_canonical() { " canonical" } else { "" }
        )
    }
}

/// `first + ceil(span/2) - 1`, the window center used by the density check
/// and by link serialization.
#[inline]
pub fn center_position(first: u64, span: usize) -> u64 {
    first + (span as u64 + 1) / 2 - 1
}
