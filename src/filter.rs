//! Diagonal-consistency filter over the sorted link set.
//!
//! A link survives only when its diagonal carries enough co-linear links and
//! enough of its local neighbourhood on that diagonal is covered by other
//! links. Chunks handed to workers always end on a diagonal transition, so
//! no diagonal is ever split across workers.

use anyhow::{Context, Result};
use std::sync::Mutex;

use bitvec::prelude::{BitVec, Lsb0};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::links::Link;

#[derive(Clone, Copy, Debug)]
pub struct FilterConfig {
    /// Minimum co-linear links a diagonal run must carry.
    pub diagonal_threshold: usize,
    /// Width of the neighbourhood inspected around each link's center.
    pub local_area_length: usize,
    /// Extra gap required after a kept link before the next may start.
    pub min_match_distance: u64,
    pub allow_overlap: bool,
    pub threads: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub kept: u64,
    pub skipped_not_in_primary_genomes: u64,
    pub skipped_overlapped_or_too_close: u64,
    pub skipped_too_few_diagonal_elements: u64,
    pub skipped_too_few_neighbours: u64,
}

impl FilterStats {
    fn absorb(&mut self, other: &FilterStats) {
        self.kept += other.kept;
        self.skipped_not_in_primary_genomes += other.skipped_not_in_primary_genomes;
        self.skipped_overlapped_or_too_close += other.skipped_overlapped_or_too_close;
        self.skipped_too_few_diagonal_elements += other.skipped_too_few_diagonal_elements;
        self.skipped_too_few_neighbours += other.skipped_too_few_neighbours;
    }
}

fn diagonal_sort_key(link: &Link) -> ((u8, u8), (u32, u32), bool, i64, u64) {
    let d = link.diagonal();
    (
        d.genomes,
        d.sequences,
        d.same_strand,
        d.offset,
        link.first().position(),
    )
}

/// Chunk boundaries for `workers` over `links`: start from near-equal chunk
/// sizes, then push each boundary forward to the next diagonal transition.
fn chunk_boundaries(links: &[Link], workers: usize) -> Vec<usize> {
    let total = links.len();
    let target = total.div_ceil(workers.max(1));
    let mut bounds = vec![0];
    let mut pos = 0;
    while pos < total {
        let mut end = (pos + target).min(total);
        while end < total && links[end].diagonal() == links[end - 1].diagonal() {
            end += 1;
        }
        bounds.push(end);
        pos = end;
    }
    bounds
}

/// Filter `links`, sorting them by diagonal first. The survivors come back
/// in fully sorted order.
pub fn filter_links(mut links: Vec<Link>, cfg: &FilterConfig) -> Result<(Vec<Link>, FilterStats)> {
    links.sort_unstable_by_key(diagonal_sort_key);

    let shared: Mutex<(Vec<Link>, FilterStats)> =
        Mutex::new((Vec::with_capacity(links.len()), FilterStats::default()));
    let bounds = chunk_boundaries(&links, cfg.threads.max(1));

    let pool = ThreadPoolBuilder::new()
        .num_threads(cfg.threads.max(1))
        .build()
        .context("failed to build filter thread pool")?;
    pool.install(|| {
        bounds.par_windows(2).for_each(|w| {
            let (kept, stats) = process_chunk(&links[w[0]..w[1]], cfg);
            let mut guard = shared.lock().expect("filter lock poisoned");
            guard.0.extend(kept);
            guard.1.absorb(&stats);
        });
    });

    let (mut kept, stats) = shared.into_inner().expect("filter lock poisoned");
    kept.sort_unstable();
    Ok((kept, stats))
}

fn process_chunk(chunk: &[Link], cfg: &FilterConfig) -> (Vec<Link>, FilterStats) {
    let mut kept = Vec::new();
    let mut stats = FilterStats::default();

    let mut i = 0;
    while i < chunk.len() {
        let diagonal = chunk[i].diagonal();
        let mut j = i + 1;
        while j < chunk.len() && chunk[j].diagonal() == diagonal {
            j += 1;
        }
        let run = &chunk[i..j];
        i = j;

        if diagonal.genomes != (0, 1) {
            stats.skipped_not_in_primary_genomes += run.len() as u64;
            continue;
        }

        // Overlap policy: within a run, each kept link pushes the next
        // allowed start past its own window plus the configured gap.
        let mut retained: Vec<Link> = Vec::with_capacity(run.len());
        let mut next_allowed = 0u64;
        for link in run {
            let pos = link.first().position();
            if cfg.allow_overlap || pos >= next_allowed {
                next_allowed = pos + u64::from(link.span()) + cfg.min_match_distance;
                retained.push(*link);
            } else {
                stats.skipped_overlapped_or_too_close += 1;
            }
        }

        if retained.len() < cfg.diagonal_threshold {
            stats.skipped_too_few_diagonal_elements += retained.len() as u64;
            continue;
        }

        survivors_by_density(&retained, cfg, &mut kept, &mut stats);
    }

    (kept, stats)
}

/// Density test over one diagonal run: mark every link's window in a bit
/// vector spanning the run, then require each link's local area to carry at
/// least `diagonal_threshold` windows' worth of set bits.
fn survivors_by_density(
    run: &[Link],
    cfg: &FilterConfig,
    kept: &mut Vec<Link>,
    stats: &mut FilterStats,
) {
    let base = run[0].first().position();
    let end = run
        .iter()
        .map(|l| l.first().position() + u64::from(l.span()))
        .max()
        .expect("run is non-empty");
    let len = (end - base) as usize;

    let mut coverage: BitVec<u64, Lsb0> = BitVec::repeat(false, len);
    for link in run {
        let a = (link.first().position() - base) as usize;
        coverage[a..a + link.span() as usize].fill(true);
    }

    let half_width = cfg.local_area_length.div_ceil(2);
    for link in run {
        let span = link.span() as u64;
        let center = link.first().center(link.span() as usize) - base;
        let lo = center.saturating_sub(half_width as u64) as usize;
        let hi = ((center + half_width as u64 + 1).min(len as u64)) as usize;
        let neighbours = coverage[lo..hi].count_ones() as u64 / span;
        if neighbours as usize >= cfg.diagonal_threshold {
            stats.kept += 1;
            kept.push(*link);
        } else {
            stats.skipped_too_few_neighbours += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::OccurrenceRecord;

    fn link(g: (u8, u8), s: (u32, u32), p: (u64, u64), span: u32) -> Link {
        let a = OccurrenceRecord::from_parts(g.0, s.0, p.0, false, false).unwrap();
        let b = OccurrenceRecord::from_parts(g.1, s.1, p.1, false, false).unwrap();
        Link::new(a, b, span)
    }

    fn config() -> FilterConfig {
        FilterConfig {
            diagonal_threshold: 2,
            local_area_length: 1000,
            min_match_distance: 0,
            allow_overlap: false,
            threads: 2,
        }
    }

    #[test]
    fn sparse_diagonal_survives_a_low_threshold_only() {
        // Two co-linear links 100bp apart.
        let links = vec![
            link((0, 1), (0, 1), (0, 50), 5),
            link((0, 1), (0, 1), (100, 150), 5),
        ];

        let (kept, stats) = filter_links(links.clone(), &config()).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(stats.kept, 2);

        let mut strict = config();
        strict.diagonal_threshold = 3;
        let (kept, stats) = filter_links(links, &strict).unwrap();
        assert!(kept.is_empty());
        assert_eq!(stats.skipped_too_few_diagonal_elements, 2);
    }

    #[test]
    fn isolated_link_fails_the_neighbourhood_test() {
        // Two close links plus one 500bp away on the same diagonal; with a
        // 50bp local area the far link sees only itself.
        let mut cfg = config();
        cfg.local_area_length = 50;
        let links = vec![
            link((0, 1), (0, 1), (0, 1000), 5),
            link((0, 1), (0, 1), (10, 1010), 5),
            link((0, 1), (0, 1), (500, 1500), 5),
        ];
        let (kept, stats) = filter_links(links, &cfg).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(stats.skipped_too_few_neighbours, 1);
        assert!(kept.iter().all(|l| l.first().position() < 500));
    }

    #[test]
    fn overlap_policy_thins_crowded_runs() {
        let links = vec![
            link((0, 1), (0, 1), (0, 0), 5),
            link((0, 1), (0, 1), (2, 2), 5),
            link((0, 1), (0, 1), (4, 4), 5),
        ];

        let mut cfg = config();
        cfg.diagonal_threshold = 1;
        let (kept, stats) = filter_links(links.clone(), &cfg).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.skipped_overlapped_or_too_close, 2);
        assert_eq!(kept[0].first().position(), 0);

        cfg.allow_overlap = true;
        let (kept, stats) = filter_links(links, &cfg).unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(stats.skipped_overlapped_or_too_close, 0);
    }

    #[test]
    fn min_match_distance_extends_the_exclusion_zone() {
        // 10 apart: fine with distance 0 (span 5), too close with 10.
        let links = vec![
            link((0, 1), (0, 1), (0, 0), 5),
            link((0, 1), (0, 1), (10, 10), 5),
        ];
        let (kept, _) = filter_links(links.clone(), &config()).unwrap();
        assert_eq!(kept.len(), 2);

        let mut cfg = config();
        cfg.min_match_distance = 10;
        cfg.diagonal_threshold = 1;
        let (kept, stats) = filter_links(links, &cfg).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.skipped_overlapped_or_too_close, 1);
    }

    #[test]
    fn non_primary_genome_pairs_are_dropped() {
        let links = vec![
            link((0, 1), (0, 1), (0, 50), 5),
            link((0, 1), (0, 1), (100, 150), 5),
            link((0, 2), (0, 2), (0, 50), 5),
            link((1, 2), (1, 2), (0, 50), 5),
        ];
        let (kept, stats) = filter_links(links, &config()).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(stats.skipped_not_in_primary_genomes, 2);
        assert!(kept
            .iter()
            .all(|l| (l.first().genome(), l.second().genome()) == (0, 1)));
    }

    #[test]
    fn chunk_boundaries_never_split_a_diagonal() {
        let mut links = Vec::new();
        for d in 0..5u64 {
            for k in 0..4u64 {
                links.push(link((0, 1), (0, 1), (k * 10, k * 10 + d * 1000), 5));
            }
        }
        links.sort_unstable_by_key(diagonal_sort_key);
        for workers in [1, 2, 3, 7] {
            let bounds = chunk_boundaries(&links, workers);
            assert_eq!(*bounds.first().unwrap(), 0);
            assert_eq!(*bounds.last().unwrap(), links.len());
            for b in &bounds[1..bounds.len() - 1] {
                assert_ne!(links[*b].diagonal(), links[*b - 1].diagonal());
            }
        }
    }

    #[test]
    fn worker_count_does_not_change_the_result() {
        let mut links = Vec::new();
        for d in 0..6u64 {
            for k in 0..3u64 {
                links.push(link((0, 1), (0, 1), (k * 40, k * 40 + d * 500), 5));
            }
        }
        let mut expected: Option<(Vec<Link>, FilterStats)> = None;
        for threads in [1, 2, 4] {
            let mut cfg = config();
            cfg.threads = threads;
            let got = filter_links(links.clone(), &cfg).unwrap();
            match &expected {
                None => expected = Some(got),
                Some(e) => assert_eq!(&got, e),
            }
        }
    }
}
