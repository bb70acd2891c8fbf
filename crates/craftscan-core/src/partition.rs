//! Weight-aware parallel partitioning of catalog scans.
//!
//! Items are sorted heaviest first and handed out in fixed-size chunks from a
//! shared atomic cursor. Each worker fills a private set; the sets are merged
//! once every worker has finished.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Tunables for worker count and chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionConfig {
    /// Items claimed per cursor step
    pub chunk_size: usize,
    /// Cores left for the host
    pub reserve_cores: usize,
    /// Lower bound of the load-derived worker count
    pub min_workers: usize,
    /// Upper bound of the load-derived worker count
    pub max_workers: usize,
    /// Share of usable cores to occupy
    pub load_fraction: f64,
    /// Work time after which a worker yields
    pub time_slice: Duration,
    /// Items slower than this are logged
    pub slow_item: Duration,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            reserve_cores: 2,
            min_workers: 8,
            max_workers: 24,
            load_fraction: 0.65,
            time_slice: Duration::from_millis(3),
            slow_item: Duration::from_millis(175),
        }
    }
}

/// Recommended worker count for `work_items` on a machine with `cores`.
#[must_use]
pub fn recommend_parallelism(work_items: usize, cores: usize, config: &PartitionConfig) -> usize {
    let usable = cores.saturating_sub(config.reserve_cores);
    let by_load = ((usable as f64) * config.load_fraction).round() as usize;
    let by_load = by_load.clamp(config.min_workers, config.max_workers.max(config.min_workers));
    let by_work = work_items.div_ceil(config.chunk_size.max(1));
    by_load.min(usable).min(by_work).max(1)
}

/// Splits work across scoped worker threads.
#[derive(Debug, Clone, Default)]
pub struct ParallelPartitioner {
    config: PartitionConfig,
    fixed_workers: Option<usize>,
}

impl ParallelPartitioner {
    /// Creates a partitioner with automatic worker count.
    #[must_use]
    pub fn new(config: PartitionConfig) -> Self {
        Self {
            config,
            fixed_workers: None,
        }
    }

    /// Applies a configured partition override: `-1` or `0` keep the
    /// automatic count, `1` runs inline, `n` uses `n` workers.
    #[must_use]
    pub fn with_override(mut self, partitions: i32) -> Self {
        self.fixed_workers = usize::try_from(partitions).ok().filter(|&n| n > 0);
        self
    }

    /// Tunables in effect.
    #[must_use]
    pub const fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Worker count used for `work_items`.
    #[must_use]
    pub fn workers_for(&self, work_items: usize) -> usize {
        match self.fixed_workers {
            Some(n) => n.min(work_items.max(1)),
            None => {
                let cores = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
                recommend_parallelism(work_items, cores, &self.config)
            }
        }
    }

    /// Runs `work` over every item and unions the per-item outputs.
    ///
    /// `weight` orders items heaviest first. The call returns only after
    /// every worker has finished.
    pub fn run<T, R, W, F>(&self, items: &[T], weight: W, work: F) -> BTreeSet<R>
    where
        T: Sync,
        R: Ord + Send,
        W: Fn(&T) -> usize,
        F: Fn(&T, &mut BTreeSet<R>) + Sync,
    {
        if items.is_empty() {
            return BTreeSet::new();
        }
        let started = Instant::now();
        let mut order: Vec<(usize, usize)> = items.iter().enumerate().map(|(i, t)| (weight(t), i)).collect();
        order.sort_by_key(|&(w, i)| (Reverse(w), i));
        let order: Vec<usize> = order.into_iter().map(|(_, i)| i).collect();

        let workers = self.workers_for(items.len());
        let merged = if workers <= 1 {
            let mut out = BTreeSet::new();
            for &i in &order {
                self.timed(&items[i], &work, &mut out, i);
            }
            out
        } else {
            self.run_parallel(items, &order, workers, &work)
        };

        debug!(
            "Partitioned {} items over {workers} workers in {:?}, {} results",
            items.len(),
            started.elapsed(),
            merged.len()
        );
        merged
    }

    fn run_parallel<T, R, F>(&self, items: &[T], order: &[usize], workers: usize, work: &F) -> BTreeSet<R>
    where
        T: Sync,
        R: Ord + Send,
        F: Fn(&T, &mut BTreeSet<R>) + Sync,
    {
        let cursor = AtomicUsize::new(0);
        let chunk = self.config.chunk_size.max(1);

        let partials: Vec<BTreeSet<R>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let cursor = &cursor;
                    scope.spawn(move || {
                        let mut local = BTreeSet::new();
                        let mut slice_start = Instant::now();
                        loop {
                            let start = cursor.fetch_add(chunk, Ordering::Relaxed);
                            if start >= order.len() {
                                break;
                            }
                            let end = (start + chunk).min(order.len());
                            for &i in &order[start..end] {
                                self.timed(&items[i], work, &mut local, i);
                                if slice_start.elapsed() >= self.config.time_slice {
                                    thread::yield_now();
                                    slice_start = Instant::now();
                                }
                            }
                        }
                        local
                    })
                })
                .collect();

            handles
                .into_iter()
                .filter_map(|handle| match handle.join() {
                    Ok(set) => Some(set),
                    Err(_) => {
                        warn!("Catalog scan worker panicked, its partial results are lost");
                        None
                    }
                })
                .collect()
        });

        let mut merged = BTreeSet::new();
        for mut part in partials {
            merged.append(&mut part);
        }
        merged
    }

    fn timed<T, R, F>(&self, item: &T, work: &F, out: &mut BTreeSet<R>, position: usize)
    where
        F: Fn(&T, &mut BTreeSet<R>),
    {
        let started = Instant::now();
        work(item, out);
        let elapsed = started.elapsed();
        if elapsed > self.config.slow_item {
            warn!("Slow catalog entry #{position}: {elapsed:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_bounds() {
        let config = PartitionConfig::default();
        assert_eq!(recommend_parallelism(10_000, 1, &config), 1);
        assert_eq!(recommend_parallelism(10_000, 4, &config), 2);
        assert_eq!(recommend_parallelism(10_000, 16, &config), 9);
        assert_eq!(recommend_parallelism(10_000, 64, &config), 24);
        assert_eq!(recommend_parallelism(40, 64, &config), 2);
        assert_eq!(recommend_parallelism(0, 64, &config), 1);
    }

    #[test]
    fn test_override() {
        let p = ParallelPartitioner::default().with_override(4);
        assert_eq!(p.workers_for(1000), 4);
        assert_eq!(p.workers_for(2), 2);
        let auto = ParallelPartitioner::default().with_override(-1);
        assert!(auto.workers_for(1000) >= 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let items: Vec<u32> = (0..500).collect();
        let work = |n: &u32, out: &mut BTreeSet<u32>| {
            if n % 7 == 0 {
                out.insert(*n);
            }
        };
        let sequential = ParallelPartitioner::default().with_override(1).run(&items, |_| 1, work);
        let parallel = ParallelPartitioner::new(PartitionConfig {
            chunk_size: 8,
            ..PartitionConfig::default()
        })
        .with_override(6)
        .run(&items, |n| (*n % 5) as usize, work);
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.len(), 72);
    }

    #[test]
    fn test_empty_input() {
        let items: Vec<u32> = Vec::new();
        let out: BTreeSet<u32> = ParallelPartitioner::default().run(&items, |_| 0, |_, _| {});
        assert!(out.is_empty());
    }
}
