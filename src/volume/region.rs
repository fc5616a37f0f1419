//! Spatial restriction and work partitioning.
//!
//! Purpose
//! -------
//! Describe which voxels a run may touch ([`Region`]) and how the volume is
//! cut into independent units of work ([`WorkRegion`]).
//!
//! Key behaviors
//! -------------
//! - [`Region::validate_within`] rejects empty subregions and subregions
//!   that extend outside the volume.
//! - [`partition`] splits the raster order into contiguous runs of whole
//!   x-lines. The result depends only on the volume shape and the requested
//!   lines per region, never on the thread count, which keeps scheduling
//!   deterministic.
//!
//! Invariants & assumptions
//! ------------------------
//! - Work regions are disjoint, ordered and cover `0..n_voxels` exactly.
//! - Each work region maps onto a contiguous row block of every output
//!   buffer, so workers can own disjoint mutable slices.
use crate::fitting::errors::{FitError, FitResult};

/// Axis-aligned box of voxels: `start` inclusive, `size` voxels per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: [usize; 3],
    pub size: [usize; 3],
}

impl Region {
    pub fn new(start: [usize; 3], size: [usize; 3]) -> Self {
        Self { start, size }
    }

    /// # Errors
    /// `FitError::InvalidSubregion` when a size is zero or the box leaves
    /// the volume.
    pub fn validate_within(&self, dims: [usize; 3]) -> FitResult<()> {
        for axis in 0..3 {
            if self.size[axis] == 0 {
                return Err(FitError::InvalidSubregion {
                    reason: format!("size along axis {axis} is zero"),
                });
            }
            let end = self.start[axis].checked_add(self.size[axis]);
            if end.map_or(true, |end| end > dims[axis]) {
                return Err(FitError::InvalidSubregion {
                    reason: format!(
                        "axis {axis}: start {} + size {} exceeds volume size {}",
                        self.start[axis], self.size[axis], dims[axis]
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn contains(&self, index: [usize; 3]) -> bool {
        (0..3).all(|a| index[a] >= self.start[a] && index[a] - self.start[a] < self.size[a])
    }

    pub fn n_voxels(&self) -> usize {
        self.size.iter().product()
    }
}

/// A contiguous raster range `first .. first + len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkRegion {
    pub first: usize,
    pub len: usize,
}

impl WorkRegion {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.first..self.first + self.len
    }
}

/// Cut a volume of `dims` into runs of `lines_per_region` whole x-lines.
///
/// The last region may be shorter. A volume with no voxels yields no
/// regions; `lines_per_region` of zero is treated as one.
pub fn partition(dims: [usize; 3], lines_per_region: usize) -> Vec<WorkRegion> {
    let nx = dims[0];
    let n_lines = dims[1] * dims[2];
    if nx == 0 || n_lines == 0 {
        return Vec::new();
    }
    let step = lines_per_region.max(1);
    (0..n_lines)
        .step_by(step)
        .map(|line| {
            let lines = step.min(n_lines - line);
            WorkRegion { first: line * nx, len: lines * nx }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Subregion validation and membership.
    // - Partition coverage, ordering and independence from anything but
    //   the shape and the lines-per-region setting.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Check subregion validation at the volume edges.
    //
    // Given
    // -----
    // - A 4×4×2 volume; boxes that fit exactly, overflow, and are empty.
    //
    // Expect
    // ------
    // - Only the fitting box validates.
    fn subregion_validation_checks_edges() {
        // Arrange
        let dims = [4, 4, 2];

        // Act / Assert
        assert!(Region::new([2, 0, 1], [2, 4, 1]).validate_within(dims).is_ok());
        assert!(matches!(
            Region::new([3, 0, 0], [2, 1, 1]).validate_within(dims),
            Err(FitError::InvalidSubregion { .. })
        ));
        assert!(matches!(
            Region::new([0, 0, 0], [1, 0, 1]).validate_within(dims),
            Err(FitError::InvalidSubregion { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Verify membership tests respect the half-open box.
    //
    // Given
    // -----
    // - Region start [1, 1, 0], size [2, 1, 1].
    //
    // Expect
    // ------
    // - [1,1,0] and [2,1,0] inside; [3,1,0] and [1,0,0] outside.
    fn region_contains_is_half_open() {
        // Arrange
        let region = Region::new([1, 1, 0], [2, 1, 1]);

        // Act / Assert
        assert!(region.contains([1, 1, 0]));
        assert!(region.contains([2, 1, 0]));
        assert!(!region.contains([3, 1, 0]));
        assert!(!region.contains([1, 0, 0]));
        assert_eq!(region.n_voxels(), 2);
    }

    #[test]
    // Purpose
    // -------
    // Ensure the partition covers every voxel once, in order, in whole lines.
    //
    // Given
    // -----
    // - dims [3, 4, 5] (20 lines of 3 voxels) and 6 lines per region.
    //
    // Expect
    // ------
    // - 4 regions of 18, 18, 18, 6 voxels, contiguous from 0 to 60.
    fn partition_covers_volume_in_whole_lines() {
        // Act
        let regions = partition([3, 4, 5], 6);

        // Assert
        let lens: Vec<usize> = regions.iter().map(|r| r.len).collect();
        assert_eq!(lens, vec![18, 18, 18, 6]);
        let mut next = 0;
        for region in &regions {
            assert_eq!(region.first, next);
            assert_eq!(region.first % 3, 0);
            next = region.range().end;
        }
        assert_eq!(next, 60);
        assert!(partition([0, 4, 5], 2).is_empty());
    }
}
