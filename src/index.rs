//! The parallel seed index: every observed seed mapped to its occurrences,
//! one occurrence list per mask, and the conversion of co-occurring
//! occurrences into candidate links.
//!
//! Workers own private index shards over disjoint sequence slices and merge
//! into the shared index under a single lock, so the shared structure is
//! only touched during the brief per-worker merge.

use anyhow::{Context, Result};
use std::sync::Mutex;

use ahash::RandomState;
use hashbrown::{HashMap, HashSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use smallvec::SmallVec;
use thiserror::Error;

use crate::chunking;
use crate::io::SequenceRecord;
use crate::kmer::{EncodeError, PackedKmer};
use crate::links::Link;
use crate::mask::SpacedSeedMaskCollection;
use crate::occurrence::OccurrenceRecord;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot merge seed indexes built from different mask collections")]
pub struct MergeMismatch;

/// Read-only configuration for index construction and link creation.
#[derive(Clone)]
pub struct IndexConfig {
    pub masks: SpacedSeedMaskCollection,
    pub genome_count: usize,
    /// Most links a single (seed, mask) pair may contribute.
    pub match_limit: usize,
    /// Drop a seed outright once its possible links exceed the limit,
    /// instead of sampling down to the limit.
    pub discard_on_limit: bool,
    /// Pair occurrences across all genomes, not only genomes 0/1.
    pub create_all_matches: bool,
    /// Keep a per-reference-sequence seed catalog (one-vs-all mode);
    /// genome 0 is the reference.
    pub reference_mode: bool,
    pub threads: usize,
    /// Fixed seed for link sampling; random when absent.
    pub rng_seed: Option<u64>,
}

/// Per-genome counters accumulated during extraction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub invalid_windows: Vec<u64>,
    pub short_sequences: Vec<u64>,
    pub window_count: u64,
}

impl ExtractionStats {
    fn sized(genome_count: usize) -> Self {
        Self {
            invalid_windows: vec![0; genome_count],
            short_sequences: vec![0; genome_count],
            window_count: 0,
        }
    }

    fn absorb(&mut self, other: &ExtractionStats) {
        for (a, b) in self.invalid_windows.iter_mut().zip(&other.invalid_windows) {
            *a += b;
        }
        for (a, b) in self.short_sequences.iter_mut().zip(&other.short_sequences) {
            *a += b;
        }
        self.window_count += other.window_count;
    }
}

/// Counters from link materialization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub emitted: u64,
    pub exhaustive_seeds: u64,
    pub sampled_seeds: u64,
    pub discarded_seeds: u64,
    /// u128: a single degenerate seed can exceed 2^64 possible pairs.
    pub discarded_links: u128,
}

type SlotLists = SmallVec<[Vec<OccurrenceRecord>; 2]>;

pub struct SeedIndex<const W: usize> {
    masks: SpacedSeedMaskCollection,
    entries: HashMap<PackedKmer<W>, SlotLists, RandomState>,
    stats: ExtractionStats,
}

impl<const W: usize> SeedIndex<W> {
    pub fn new(masks: SpacedSeedMaskCollection, genome_count: usize) -> Self {
        Self {
            masks,
            entries: HashMap::with_hasher(RandomState::new()),
            stats: ExtractionStats::sized(genome_count),
        }
    }

    /// Number of distinct seeds observed.
    pub fn seed_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &ExtractionStats {
        &self.stats
    }

    pub fn occurrences(&self, seed: &PackedKmer<W>, mask_index: usize) -> Option<&[OccurrenceRecord]> {
        self.entries
            .get(seed)
            .map(|slots| slots[mask_index].as_slice())
    }

    fn insert(&mut self, seed: PackedKmer<W>, mask_index: usize, occ: OccurrenceRecord) {
        let n = self.masks.len();
        let slots = self
            .entries
            .entry(seed)
            .or_insert_with(|| (0..n).map(|_| Vec::new()).collect());
        slots[mask_index].push(occ);
    }

    /// Append another shard into this one. Occurrence lists are disjoint by
    /// construction (workers cover disjoint sequence slices), so merging is
    /// pure per-slot append.
    pub fn merge(&mut self, other: SeedIndex<W>) -> Result<(), MergeMismatch> {
        if self.masks != other.masks {
            return Err(MergeMismatch);
        }
        for (seed, slots) in other.entries {
            match self.entries.entry(seed) {
                hashbrown::hash_map::Entry::Occupied(mut e) => {
                    for (dst, src) in e.get_mut().iter_mut().zip(slots) {
                        dst.extend(src);
                    }
                }
                hashbrown::hash_map::Entry::Vacant(e) => {
                    e.insert(slots);
                }
            }
        }
        self.stats.absorb(&other.stats);
        Ok(())
    }

    /// Build the index over `records` with `cfg.threads` workers, each
    /// covering one contiguous slice of the collection.
    pub fn build(
        records: &[SequenceRecord],
        cfg: &IndexConfig,
    ) -> Result<(Self, Option<ReferenceCatalog<W>>)> {
        let span = cfg.masks.max_span();
        let workers = cfg.threads.max(1);
        let shared_index = Mutex::new(SeedIndex::new(cfg.masks.clone(), cfg.genome_count));
        let shared_catalog: Mutex<Option<ReferenceCatalog<W>>> =
            Mutex::new(cfg.reference_mode.then(ReferenceCatalog::new));

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("failed to build extraction thread pool")?;

        pool.install(|| {
            (0..workers).into_par_iter().try_for_each(|widx| -> Result<()> {
                let slice = &records[chunking::slice_bounds(records.len(), workers, widx)];
                let mut local = SeedIndex::new(cfg.masks.clone(), cfg.genome_count);
                let mut local_catalog: Option<ReferenceCatalog<W>> =
                    cfg.reference_mode.then(ReferenceCatalog::new);

                for rec in slice {
                    let g = rec.genome as usize;
                    if rec.data.len() < span {
                        local.stats.short_sequences[g] += 1;
                        continue;
                    }
                    // The window advances by half its span (floor), so
                    // consecutive windows overlap by half and window k
                    // starts at k*span/2.
                    for start in (0..)
                        .map(|k| k * span / 2)
                        .take_while(|s| s + span <= rec.data.len())
                    {
                        let window = &rec.data[start..start + span];
                        let kmer = match PackedKmer::<W>::encode(window) {
                            Ok(k) => k,
                            Err(EncodeError::InvalidBase(_)) => {
                                local.stats.invalid_windows[g] += 1;
                                continue;
                            }
                            Err(e @ EncodeError::Overflow { .. }) => return Err(e.into()),
                        };
                        local.stats.window_count += 1;
                        let occ = OccurrenceRecord::new(
                            rec.genome,
                            rec.sequence,
                            start as u64,
                            false,
                            &kmer,
                        )?;
                        for (mi, mask) in cfg.masks.iter().enumerate() {
                            let seed = mask.induce(&kmer);
                            if rec.genome == 0 {
                                if let Some(cat) = local_catalog.as_mut() {
                                    cat.append(rec.sequence, seed);
                                }
                            }
                            local.insert(seed, mi, occ);
                        }
                    }
                }

                shared_index
                    .lock()
                    .expect("seed index lock poisoned")
                    .merge(local)?;
                if let Some(cat) = local_catalog {
                    if let Some(shared) = shared_catalog
                        .lock()
                        .expect("reference catalog lock poisoned")
                        .as_mut()
                    {
                        shared.merge(cat);
                    }
                }
                Ok(())
            })
        })?;

        let index = shared_index
            .into_inner()
            .expect("seed index lock poisoned");
        let mut catalog = shared_catalog
            .into_inner()
            .expect("reference catalog lock poisoned");
        if let Some(cat) = catalog.as_mut() {
            cat.dedup(workers)?;
        }
        Ok((index, catalog))
    }

    /// Turn every (seed, mask) occurrence list into cross-genome links.
    /// Runs single-threaded by design: the work per seed is small and a
    /// parallel version spends its time contending on the shared sink.
    /// Consumes the index, so peak memory drops as lists are drained.
    pub fn into_links(self, cfg: &IndexConfig) -> (Vec<Link>, LinkStats) {
        let mut rng = match cfg.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let restrict = cfg.genome_count > 2 && !cfg.create_all_matches;
        let mask_spans: Vec<u32> = self.masks.iter().map(|m| m.span() as u32).collect();

        let mut links: Vec<Link> = Vec::new();
        let mut stats = LinkStats::default();

        for (_seed, slots) in self.entries {
            for (mi, occs) in slots.into_iter().enumerate() {
                let occs = if restrict {
                    occs.into_iter()
                        .filter(|o| o.genome() < 2)
                        .collect::<Vec<_>>()
                } else {
                    occs
                };
                if occs.len() < 2 {
                    continue;
                }

                let mut per_genome = [0u64; 16];
                for o in &occs {
                    per_genome[o.genome() as usize] += 1;
                }
                let mut possible: u128 = 0;
                for i in 0..per_genome.len() {
                    for j in i + 1..per_genome.len() {
                        possible += u128::from(per_genome[i]) * u128::from(per_genome[j]);
                    }
                }
                if possible == 0 {
                    continue;
                }
                let span = mask_spans[mi];

                if cfg.match_limit as u128 >= possible {
                    stats.exhaustive_seeds += 1;
                    for i in 0..occs.len() {
                        for j in i + 1..occs.len() {
                            if occs[i].genome() != occs[j].genome() {
                                links.push(Link::new(occs[i], occs[j], span));
                            }
                        }
                    }
                } else if cfg.discard_on_limit {
                    stats.discarded_seeds += 1;
                    stats.discarded_links += possible;
                } else {
                    stats.sampled_seeds += 1;
                    let mut chosen: HashSet<Link, RandomState> =
                        HashSet::with_capacity_and_hasher(cfg.match_limit, RandomState::new());
                    while chosen.len() < cfg.match_limit {
                        let pick = rand::seq::index::sample(&mut rng, occs.len(), 2);
                        let (a, b) = (occs[pick.index(0)], occs[pick.index(1)]);
                        if a.genome() == b.genome() {
                            continue;
                        }
                        let link = Link::new(a, b, span);
                        if chosen.insert(link) {
                            links.push(link);
                        }
                    }
                }
            }
        }

        // The same pair can arise under several masks.
        links.sort_unstable();
        links.dedup();
        stats.emitted = links.len() as u64;
        (links, stats)
    }
}

/// Deduplicated seed list per reference sequence, for one-vs-all runs.
pub struct ReferenceCatalog<const W: usize> {
    per_sequence: HashMap<u32, Vec<PackedKmer<W>>, RandomState>,
}

impl<const W: usize> ReferenceCatalog<W> {
    pub fn new() -> Self {
        Self {
            per_sequence: HashMap::with_hasher(RandomState::new()),
        }
    }

    fn append(&mut self, sequence: u32, seed: PackedKmer<W>) {
        self.per_sequence.entry(sequence).or_default().push(seed);
    }

    fn merge(&mut self, other: ReferenceCatalog<W>) {
        for (sequence, seeds) in other.per_sequence {
            self.per_sequence
                .entry(sequence)
                .or_default()
                .extend(seeds);
        }
    }

    /// Sort and deduplicate every per-sequence list, in parallel over
    /// sequence ids.
    pub fn dedup(&mut self, threads: usize) -> Result<()> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .context("failed to build catalog thread pool")?;
        let mut lists: Vec<&mut Vec<PackedKmer<W>>> = self.per_sequence.values_mut().collect();
        pool.install(|| {
            lists.par_iter_mut().for_each(|seeds| {
                seeds.sort_unstable();
                seeds.dedup();
            });
        });
        Ok(())
    }

    pub fn sequence_count(&self) -> usize {
        self.per_sequence.len()
    }

    pub fn seed_count(&self) -> usize {
        self.per_sequence.values().map(Vec::len).sum()
    }

    pub fn seeds(&self, sequence: u32) -> Option<&[PackedKmer<W>]> {
        self.per_sequence.get(&sequence).map(Vec::as_slice)
    }
}

impl<const W: usize> Default for ReferenceCatalog<W> {
    fn default() -> Self {
        Self::new()
    }
}
