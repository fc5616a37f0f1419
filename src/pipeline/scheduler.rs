//! pipeline::scheduler — bounded, deterministic region-parallel execution.
//!
//! Purpose
//! -------
//! Drive independent per-voxel work over a statically partitioned volume
//! with a fixed-size worker pool, and reduce the per-region bookkeeping
//! into a deterministic summary.
//!
//! Key behaviors
//! -------------
//! - [`build_pool`] creates a dedicated rayon pool of exactly `threads`
//!   workers; failure to build it is a configuration error.
//! - [`split_rows`] cuts each `(n_voxels, depth)` buffer into the disjoint
//!   row blocks of the work regions, so every region owns its slice of
//!   every buffer and no locks are needed while writing.
//! - [`run_regions`] lets the pool's workers claim regions, runs the
//!   per-region closure (which visits voxels in raster order) and returns
//!   once every region is done. Tallies come back in region order and are
//!   merged in that order.
//! - [`voxel_selected`] decides whether a voxel is fitted: inside the
//!   subregion and with a finite, non-zero mask value.
//!
//! Invariants & assumptions
//! ------------------------
//! - Regions are disjoint, ordered and cover every row of the buffers
//!   exactly (as produced by `volume::partition`).
//! - The result of a run never depends on the thread count: work units,
//!   per-voxel computations and the merge order are all fixed by the
//!   partition.
//! - There is no cancellation; `run_regions` blocks until completion.
use crate::{
    fitting::{
        core::fit_function::{FailureReason, VoxelFit},
        errors::{FitError, FitResult},
    },
    volume::{image::Volume, region::Region, WorkRegion},
};
use ndarray::{Array2, ArrayViewMut2, Axis};
use rayon::prelude::*;
use rayon::ThreadPool;

/// Per-region bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionTally {
    pub processed: usize,
    pub converged: usize,
    pub failed: usize,
    pub skipped: usize,
    /// First failure in raster order, with its linear index.
    pub first_failure: Option<(usize, FailureReason)>,
}

impl RegionTally {
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_fit(&mut self, linear: usize, fit: &VoxelFit) {
        self.processed += 1;
        match fit.failure() {
            None => self.converged += 1,
            Some(reason) => {
                self.failed += 1;
                if self.first_failure.is_none() {
                    self.first_failure = Some((linear, reason.clone()));
                }
            }
        }
    }

    /// Combine with the tally of a later region.
    pub fn merge(mut self, later: RegionTally) -> RegionTally {
        self.processed += later.processed;
        self.converged += later.converged;
        self.failed += later.failed;
        self.skipped += later.skipped;
        if self.first_failure.is_none() {
            self.first_failure = later.first_failure;
        }
        self
    }
}

/// Dedicated pool with exactly `threads` workers.
///
/// # Errors
/// - `FitError::InvalidThreads` for zero threads.
/// - `FitError::ThreadPool` when rayon cannot spawn the workers.
pub fn build_pool(threads: usize) -> FitResult<ThreadPool> {
    if threads == 0 {
        return Err(FitError::InvalidThreads { threads });
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("qmri-worker-{i}"))
        .build()
        .map_err(|e| FitError::ThreadPool { reason: e.to_string() })
}

/// Split every buffer into one row block per region.
///
/// Returns one `Vec` per region, holding that region's block of each
/// buffer in buffer order.
pub fn split_rows<'a>(buffers: impl IntoIterator<Item = &'a mut Array2<f64>>, regions: &[WorkRegion]) -> Vec<Vec<ArrayViewMut2<'a, f64>>> {
    let mut blocks: Vec<Vec<ArrayViewMut2<'a, f64>>> = regions.iter().map(|_| Vec::new()).collect();
    for buffer in buffers {
        let mut rest = buffer.view_mut();
        for (slot, region) in blocks.iter_mut().zip(regions) {
            let (head, tail) = rest.split_at(Axis(0), region.len);
            slot.push(head);
            rest = tail;
        }
    }
    blocks
}

/// Run `work` on `pool`, one call of `per_region` per work item.
///
/// Blocks until every region has been processed and returns the tallies
/// merged in region order.
pub fn run_regions<W, F>(pool: &ThreadPool, work: Vec<(WorkRegion, W)>, per_region: F) -> RegionTally
where
    W: Send,
    F: Fn(WorkRegion, W) -> RegionTally + Sync,
{
    let tallies: Vec<RegionTally> =
        pool.install(|| work.into_par_iter().map(|(region, item)| per_region(region, item)).collect());
    tallies.into_iter().fold(RegionTally::default(), RegionTally::merge)
}

/// Whether the voxel at `index` takes part in the run.
pub fn voxel_selected(index: [usize; 3], mask: Option<&Volume>, subregion: Option<&Region>) -> bool {
    if let Some(region) = subregion {
        if !region.contains(index) {
            return false;
        }
    }
    match mask {
        Some(mask) => {
            let m = mask.scalar(index);
            m.is_finite() && m != 0.0
        }
        None => true,
    }
}
