//! Candidate matches ("links"): pairs of occurrences sharing a seed.

use crate::occurrence::OccurrenceRecord;

/// An unordered pair of occurrences on two different genomes, induced by the
/// same seed under the same mask. Stored with the smaller record first, so
/// equal pairs compare equal regardless of discovery order. `span` is the
/// window length of the inducing mask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Link {
    first: OccurrenceRecord,
    second: OccurrenceRecord,
    span: u32,
}

impl Link {
    pub fn new(a: OccurrenceRecord, b: OccurrenceRecord, span: u32) -> Self {
        debug_assert_ne!(a.genome(), b.genome(), "a link must span two genomes");
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            first,
            second,
            span,
        }
    }

    pub fn first(&self) -> OccurrenceRecord {
        self.first
    }

    pub fn second(&self) -> OccurrenceRecord {
        self.second
    }

    pub fn span(&self) -> u32 {
        self.span
    }

    /// Two links lie on the same diagonal iff their signatures are equal.
    /// The offset is the position difference when the strands agree and the
    /// position sum when they differ (anti-diagonal).
    pub fn diagonal(&self) -> DiagonalSignature {
        let p1 = self.first.position() as i64;
        let p2 = self.second.position() as i64;
        let same_strand = self.first.is_reverse() == self.second.is_reverse();
        DiagonalSignature {
            genomes: (self.first.genome(), self.second.genome()),
            sequences: (self.first.sequence(), self.second.sequence()),
            same_strand,
            offset: if same_strand { p1 - p2 } else { p1 + p2 },
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DiagonalSignature {
    pub genomes: (u8, u8),
    pub sequences: (u32, u32),
    pub same_strand: bool,
    pub offset: i64,
}
