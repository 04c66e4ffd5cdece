//! Spaced-seed masks: which positions of a seed window are "care" positions.

use hashbrown::HashSet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::kmer::{PackedKmer, BASES_PER_WORD};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("mask pattern {pattern:?} contains characters other than '0' and '1'")]
    BadPattern { pattern: String },
    #[error("mask pattern must contain at least one care position")]
    NoCarePositions,
    #[error("spaced-seed weight {weight} exceeds span {span}")]
    WeightExceedsSpan { weight: usize, span: usize },
    #[error("masks in one collection must share a single weight (found {first} and {other})")]
    UnequalWeight { first: usize, other: usize },
    #[error("duplicate mask pattern {pattern:?} in collection")]
    DuplicateMask { pattern: String },
    #[error("a mask collection needs at least one mask")]
    Empty,
    #[error(
        "requested {requested} masks but only {available} distinct patterns \
         exist for span {span}, weight {weight}"
    )]
    TooManyMasks {
        requested: usize,
        available: u128,
        span: usize,
        weight: usize,
    },
    #[error("no precomputed optimal masks for weight {weight}")]
    NoOptimalMasks { weight: usize },
}

/// A span-length pattern with exactly `weight` care positions.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SpacedSeedMask {
    span: u32,
    care: Vec<u32>,
}

impl SpacedSeedMask {
    /// Parse a literal pattern such as `"110101"` ('1' = care).
    pub fn from_pattern(pattern: &str) -> Result<Self, ConfigurationError> {
        let mut care = Vec::new();
        for (i, ch) in pattern.chars().enumerate() {
            match ch {
                '1' => care.push(i as u32),
                '0' => {}
                _ => {
                    return Err(ConfigurationError::BadPattern {
                        pattern: pattern.to_string(),
                    })
                }
            }
        }
        if care.is_empty() {
            return Err(ConfigurationError::NoCarePositions);
        }
        Ok(Self {
            span: pattern.len() as u32,
            care,
        })
    }

    /// The all-ones mask: plain contiguous k-mers of length `weight`.
    pub fn contiguous(weight: usize) -> Self {
        Self {
            span: weight as u32,
            care: (0..weight as u32).collect(),
        }
    }

    /// Draw a uniform random mask with `weight` care positions out of `span`.
    pub fn random(span: usize, weight: usize, rng: &mut StdRng) -> Self {
        let mut care: Vec<u32> = rand::seq::index::sample(rng, span, weight)
            .into_iter()
            .map(|i| i as u32)
            .collect();
        care.sort_unstable();
        Self {
            span: span as u32,
            care,
        }
    }

    pub fn span(&self) -> usize {
        self.span as usize
    }

    pub fn weight(&self) -> usize {
        self.care.len()
    }

    pub fn care_positions(&self) -> &[u32] {
        &self.care
    }

    pub fn pattern_string(&self) -> String {
        let mut s = vec![b'0'; self.span as usize];
        for &c in &self.care {
            s[c as usize] = b'1';
        }
        String::from_utf8(s).expect("pattern bytes are ASCII")
    }

    /// Keep only the care-position bases of a full window k-mer.
    /// The k-mer must be at least `span` bases long.
    pub fn induce<const W: usize>(&self, kmer: &PackedKmer<W>) -> PackedKmer<W> {
        debug_assert!(kmer.len() >= self.span());
        let mut words = [0u64; W];
        for (i, &c) in self.care.iter().enumerate() {
            words[i / BASES_PER_WORD] |=
                u64::from(kmer.code_at(c as usize)) << (2 * (i % BASES_PER_WORD));
        }
        PackedKmer::from_raw(words, self.care.len() as u32)
    }
}

impl std::fmt::Debug for SpacedSeedMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SpacedSeedMask({})", self.pattern_string())
    }
}

/// Ordered set of distinct masks sharing one weight. Occurrence lists in the
/// seed index carry one slot per mask, in this order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SpacedSeedMaskCollection {
    masks: Vec<SpacedSeedMask>,
    weight: usize,
    max_span: usize,
}

/// Precomputed mask sets, four per weight, spans at 1.5x the weight.
const OPTIMAL_MASKS: &[(usize, [&str; 4])] = &[
    (8, ["111010010111", "110110100111", "111001011011", "101101101011"]),
    (
        10,
        [
            "111010110100111",
            "110110101101011",
            "111001101010111",
            "101101100110111",
        ],
    ),
    (
        12,
        [
            "111011010110100111",
            "110110110101011011",
            "111001101101110011",
            "101101011011010111",
        ],
    ),
    (
        14,
        [
            "111010110110101100111",
            "110110101101101010111",
            "111001101101011011011",
            "101101110101101101011",
        ],
    ),
    (
        16,
        [
            "111010110110101101100111",
            "110110101101101011010111",
            "111001101101011010110111",
            "101101101101010111011011",
        ],
    ),
];

impl SpacedSeedMaskCollection {
    /// Validates non-emptiness, a shared weight and pairwise distinctness.
    pub fn from_masks(masks: Vec<SpacedSeedMask>) -> Result<Self, ConfigurationError> {
        let first = masks.first().ok_or(ConfigurationError::Empty)?;
        let weight = first.weight();
        let mut max_span = 0;
        {
            // scoped so the borrows end before `masks` moves into the struct
            let mut seen: HashSet<&SpacedSeedMask> = HashSet::with_capacity(masks.len());
            for mask in &masks {
                if mask.weight() != weight {
                    return Err(ConfigurationError::UnequalWeight {
                        first: weight,
                        other: mask.weight(),
                    });
                }
                if !seen.insert(mask) {
                    return Err(ConfigurationError::DuplicateMask {
                        pattern: mask.pattern_string(),
                    });
                }
                max_span = max_span.max(mask.span());
            }
        }
        Ok(Self {
            masks,
            weight,
            max_span,
        })
    }

    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigurationError> {
        let masks = patterns
            .iter()
            .map(|p| SpacedSeedMask::from_pattern(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_masks(masks)
    }

    /// One all-ones mask: contiguous seeds of length `weight`.
    pub fn contiguous(weight: usize) -> Result<Self, ConfigurationError> {
        if weight == 0 {
            return Err(ConfigurationError::NoCarePositions);
        }
        Self::from_masks(vec![SpacedSeedMask::contiguous(weight)])
    }

    /// Rejection-sample `count` pairwise-distinct random masks.
    pub fn random(
        span: usize,
        weight: usize,
        count: usize,
        rng_seed: Option<u64>,
    ) -> Result<Self, ConfigurationError> {
        if weight == 0 {
            return Err(ConfigurationError::NoCarePositions);
        }
        if weight > span {
            return Err(ConfigurationError::WeightExceedsSpan { weight, span });
        }
        if count == 0 {
            return Err(ConfigurationError::Empty);
        }
        let available = binomial(span, weight);
        if count as u128 > available {
            return Err(ConfigurationError::TooManyMasks {
                requested: count,
                available,
                span,
                weight,
            });
        }
        let mut rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut seen: HashSet<SpacedSeedMask> = HashSet::with_capacity(count);
        let mut masks = Vec::with_capacity(count);
        while masks.len() < count {
            let mask = SpacedSeedMask::random(span, weight, &mut rng);
            if seen.insert(mask.clone()) {
                masks.push(mask);
            }
        }
        Self::from_masks(masks)
    }

    /// The first `count` masks of the precomputed set for `weight`.
    pub fn optimal(weight: usize, count: usize) -> Result<Self, ConfigurationError> {
        let patterns = OPTIMAL_MASKS
            .iter()
            .find(|(w, _)| *w == weight)
            .map(|(_, p)| p)
            .ok_or(ConfigurationError::NoOptimalMasks { weight })?;
        if count == 0 {
            return Err(ConfigurationError::Empty);
        }
        if count > patterns.len() {
            return Err(ConfigurationError::TooManyMasks {
                requested: count,
                available: patterns.len() as u128,
                span: patterns[0].len(),
                weight,
            });
        }
        Self::from_patterns(&patterns[..count])
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn weight(&self) -> usize {
        self.weight
    }

    /// Longest span among the masks; the window length slid over sequences.
    pub fn max_span(&self) -> usize {
        self.max_span
    }

    pub fn masks(&self) -> &[SpacedSeedMask] {
        &self.masks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SpacedSeedMask> {
        self.masks.iter()
    }
}

/// C(n, k), saturating at u128::MAX.
pub fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        // stays integral: a product of i+1 consecutive integers is
        // divisible by (i+1)!
        acc = acc.saturating_mul((n - i) as u128) / (i as u128 + 1);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_round_trip() {
        let m = SpacedSeedMask::from_pattern("1101001").unwrap();
        assert_eq!(m.span(), 7);
        assert_eq!(m.weight(), 4);
        assert_eq!(m.care_positions(), &[0, 1, 3, 6]);
        assert_eq!(m.pattern_string(), "1101001");
    }

    #[test]
    fn bad_patterns_rejected() {
        assert!(matches!(
            SpacedSeedMask::from_pattern("10x1"),
            Err(ConfigurationError::BadPattern { .. })
        ));
        assert_eq!(
            SpacedSeedMask::from_pattern("000"),
            Err(ConfigurationError::NoCarePositions)
        );
    }

    #[test]
    fn induce_keeps_care_positions() {
        let kmer = PackedKmer::<1>::encode(b"ACGTACG").unwrap();
        let m = SpacedSeedMask::from_pattern("1101001").unwrap();
        assert_eq!(m.induce(&kmer).decode(), "ACTG");
        let full = SpacedSeedMask::contiguous(7);
        assert_eq!(full.induce(&kmer), kmer);
    }

    #[test]
    fn duplicate_masks_rejected() {
        let err = SpacedSeedMaskCollection::from_patterns(&["1101", "1011", "1101"]).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DuplicateMask {
                pattern: "1101".to_string(),
            }
        );
        // distinct masks pass the same check
        let c = SpacedSeedMaskCollection::from_patterns(&["1101", "1011"]).unwrap();
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn unequal_weights_rejected() {
        let err = SpacedSeedMaskCollection::from_patterns(&["1101", "1111"]).unwrap_err();
        assert_eq!(err, ConfigurationError::UnequalWeight { first: 3, other: 4 });
    }

    #[test]
    fn random_masks_are_distinct() {
        let c = SpacedSeedMaskCollection::random(10, 6, 8, Some(7)).unwrap();
        assert_eq!(c.len(), 8);
        assert_eq!(c.weight(), 6);
        assert_eq!(c.max_span(), 10);
        for (i, a) in c.iter().enumerate() {
            assert_eq!(a.weight(), 6);
            for b in c.masks().iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn too_many_masks_rejected() {
        // C(4, 2) = 6
        assert!(SpacedSeedMaskCollection::random(4, 2, 6, Some(1)).is_ok());
        assert_eq!(
            SpacedSeedMaskCollection::random(4, 2, 7, Some(1)),
            Err(ConfigurationError::TooManyMasks {
                requested: 7,
                available: 6,
                span: 4,
                weight: 2,
            })
        );
    }

    #[test]
    fn binomial_values() {
        assert_eq!(binomial(4, 2), 6);
        assert_eq!(binomial(10, 0), 1);
        assert_eq!(binomial(10, 10), 1);
        assert_eq!(binomial(5, 7), 0);
        assert_eq!(binomial(40, 20), 137_846_528_820);
    }

    #[test]
    fn optimal_sets_are_well_formed() {
        for &(weight, ref patterns) in OPTIMAL_MASKS {
            let c = SpacedSeedMaskCollection::optimal(weight, patterns.len()).unwrap();
            assert_eq!(c.weight(), weight);
            assert_eq!(c.len(), patterns.len());
        }
        assert_eq!(
            SpacedSeedMaskCollection::optimal(9, 1),
            Err(ConfigurationError::NoOptimalMasks { weight: 9 })
        );
        let c = SpacedSeedMaskCollection::optimal(12, 2).unwrap();
        assert_eq!(c.len(), 2);
    }
}
