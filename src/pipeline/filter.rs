//! pipeline::filter — the volume-level model fitting orchestrator.
//!
//! Purpose
//! -------
//! Bind a [`FitFunction`] to input volumes, optional fixed-parameter maps
//! and a mask, run the fit over every selected voxel on a worker pool and
//! expose the resulting parameter maps.
//!
//! Key behaviors
//! -------------
//! - [`ModelFitFilter::set_inputs`] (or [`ModelFitFilter::read_inputs`] for
//!   NIfTI files) validates counts, channel depths and geometry up front;
//!   any mismatch is fatal.
//! - [`ModelFitFilter::update`] validates the subregion, partitions the
//!   volume into whole x-lines, allocates the output channels, fits every
//!   selected voxel and blocks until all regions are done.
//! - Individual voxel failures never abort a run; they are counted in the
//!   [`FitSummary`] and show up as `converged = 0`.
//! - [`ModelFitFilter::write_outputs`] writes `<prefix><channel><ext>` for
//!   every channel.
//!
//! Invariants & assumptions
//! ------------------------
//! - The first input defines the reference geometry; every other input,
//!   fixed map, mask and output shares it.
//! - Outputs are identical for any thread count.
//! - Voxels outside the subregion or mask keep 0 in every channel.
//!
//! Logging
//! -------
//! `info` at run start and end, `debug` for the partition and written
//! files, `warn` when failed voxels are present.
use crate::{
    fitting::{
        core::{
            fit_function::{FailureReason, FitFunction, ScaledFit},
            model::Model,
            options::{FitOptions, OutputOptions},
            voxel::VoxelInput,
        },
        errors::{FitError, FitResult},
    },
    pipeline::{
        outputs::OutputVolumeSet,
        scheduler::{build_pool, run_regions, voxel_selected, RegionTally},
    },
    volume::{geometry::Geometry, image::Volume, nifti_io, partition, Region},
};
use ndarray::Array1;
use std::path::{Path, PathBuf};

/// Outcome counts of one [`ModelFitFilter::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    pub n_voxels: usize,
    /// Voxels handed to the fit function.
    pub processed: usize,
    pub converged: usize,
    pub failed: usize,
    /// Voxels excluded by the mask or subregion.
    pub skipped: usize,
    pub regions: usize,
    pub threads: usize,
    /// Earliest failure in raster order: voxel index and reason.
    pub first_failure: Option<([usize; 3], FailureReason)>,
}

impl FitSummary {
    fn from_tally(tally: RegionTally, geometry: &Geometry, regions: usize, threads: usize) -> Self {
        Self {
            n_voxels: geometry.n_voxels(),
            processed: tally.processed,
            converged: tally.converged,
            failed: tally.failed,
            skipped: tally.skipped,
            regions,
            threads,
            first_failure: tally.first_failure.map(|(linear, reason)| (geometry.voxel_index(linear), reason)),
        }
    }
}

#[derive(Debug, Clone)]
struct FitRun {
    outputs: OutputVolumeSet,
    summary: FitSummary,
}

/// Volume-level driver around a per-voxel [`FitFunction`].
#[derive(Debug)]
pub struct ModelFitFilter<F: FitFunction> {
    fit_fn: F,
    options: FitOptions,
    inputs: Vec<Volume>,
    fixed: Vec<Option<Volume>>,
    mask: Option<Volume>,
    run: Option<FitRun>,
}

impl<M: Model> ModelFitFilter<ScaledFit<M>> {
    /// Filter using the default scaled least-squares fit of `model`.
    ///
    /// # Errors
    /// Propagates model validation and scaling errors.
    pub fn for_model(model: M, options: FitOptions) -> FitResult<Self> {
        let fit_fn = ScaledFit::new(model, &options)?;
        Ok(Self::new(fit_fn, options))
    }
}

impl<F: FitFunction> ModelFitFilter<F> {
    pub fn new(fit_fn: F, options: FitOptions) -> Self {
        Self { fit_fn, options, inputs: Vec::new(), fixed: Vec::new(), mask: None, run: None }
    }

    pub fn model(&self) -> &dyn Model {
        self.fit_fn.model()
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Attach input volumes, fixed-parameter maps and a mask.
    ///
    /// `fixed` holds one entry per fixed parameter (`None` uses the model
    /// default everywhere); an empty vector uses defaults for all of them.
    /// Any previous run result is discarded.
    ///
    /// # Errors
    /// - `FitError::MissingInputs` when `inputs` is empty.
    /// - `FitError::InputCountMismatch`, `ChannelCountMismatch` or
    ///   `FixedCountMismatch` when counts disagree with the model.
    /// - `FitError::NotScalarVolume` for multi-channel fixed maps or masks.
    /// - `FitError::GeometryMismatch` when any volume differs from the
    ///   first input's grid.
    pub fn set_inputs(&mut self, inputs: Vec<Volume>, fixed: Vec<Option<Volume>>, mask: Option<Volume>) -> FitResult<()> {
        let model = self.fit_fn.model();
        let reference = inputs.first().ok_or(FitError::MissingInputs)?.geometry().clone();
        if inputs.len() != model.n_inputs() {
            return Err(FitError::InputCountMismatch { expected: model.n_inputs(), found: inputs.len() });
        }
        for (i, input) in inputs.iter().enumerate() {
            let expected = model.input_size(i);
            if input.depth() != expected {
                return Err(FitError::ChannelCountMismatch { input: i, expected, found: input.depth() });
            }
            reference.check_matches(input.geometry(), &format!("input {i}"))?;
        }

        let fixed = if fixed.is_empty() { vec![None; model.n_fixed()] } else { fixed };
        if fixed.len() != model.n_fixed() {
            return Err(FitError::FixedCountMismatch { expected: model.n_fixed(), found: fixed.len() });
        }
        for (map, name) in fixed.iter().zip(model.fixed_names()) {
            if let Some(map) = map {
                let what = format!("fixed map '{name}'");
                map.require_scalar(&what)?;
                reference.check_matches(map.geometry(), &what)?;
            }
        }
        if let Some(mask) = &mask {
            mask.require_scalar("mask")?;
            reference.check_matches(mask.geometry(), "mask")?;
        }

        self.inputs = inputs;
        self.fixed = fixed;
        self.mask = mask;
        self.run = None;
        Ok(())
    }

    /// Read inputs, fixed maps and mask from NIfTI files, then
    /// [`set_inputs`](Self::set_inputs).
    ///
    /// # Errors
    /// I/O and NIfTI errors from reading, then everything `set_inputs`
    /// reports.
    pub fn read_inputs<P: AsRef<Path>>(&mut self, inputs: &[P], fixed: &[Option<P>], mask: Option<P>) -> FitResult<()> {
        let inputs = inputs.iter().map(nifti_io::read_volume).collect::<FitResult<Vec<_>>>()?;
        let fixed = fixed
            .iter()
            .map(|path| path.as_ref().map(nifti_io::read_volume).transpose())
            .collect::<FitResult<Vec<_>>>()?;
        let mask = mask.map(nifti_io::read_volume).transpose()?;
        self.set_inputs(inputs, fixed, mask)
    }

    /// Fit every selected voxel.
    ///
    /// # Errors
    /// - `FitError::MissingInputs` before inputs are set.
    /// - `FitError::InvalidSubregion` for a subregion outside the volume.
    /// - `FitError::InvalidThreads` / `FitError::ThreadPool` when the pool
    ///   cannot be built.
    pub fn update(&mut self) -> FitResult<()> {
        let geometry = self.inputs.first().ok_or(FitError::MissingInputs)?.geometry().clone();
        if let Some(subregion) = &self.options.subregion {
            subregion.validate_within(geometry.dims)?;
        }
        let model = self.fit_fn.model();
        let regions = partition(geometry.dims, self.options.lines_per_region);
        let threads = self.options.resolved_threads();
        let pool = build_pool(threads)?;
        let mut outputs = OutputVolumeSet::new(model, geometry.n_voxels(), &self.options);
        log::info!(
            "fitting model '{}' over {} voxels ({:?}) with {} threads; channels: {}",
            model.name(),
            geometry.n_voxels(),
            geometry.dims,
            threads,
            outputs.channel_names().join(", ")
        );
        log::debug!("partitioned into {} regions of {} line(s)", regions.len(), self.options.lines_per_region);

        let defaults = model.fixed_defaults();
        let subregion = self.options.subregion.as_ref();
        let mask = self.mask.as_ref();
        let work: Vec<_> = regions.iter().copied().zip(outputs.region_writers(&regions)).collect();
        let tally = run_regions(&pool, work, |region, mut writer| {
            let mut tally = RegionTally::default();
            for linear in region.range() {
                let voxel = self.voxel_at(geometry.voxel_index(linear), &defaults, mask, subregion);
                if !voxel.valid {
                    tally.record_skip();
                    continue;
                }
                let fit = self.fit_fn.fit(&voxel);
                writer.write(linear, &fit);
                tally.record_fit(linear, &fit);
            }
            tally
        });

        let summary = FitSummary::from_tally(tally, &geometry, regions.len(), threads);
        log::info!(
            "fit finished: {} processed, {} converged, {} failed, {} skipped",
            summary.processed,
            summary.converged,
            summary.failed,
            summary.skipped
        );
        if let Some((index, reason)) = &summary.first_failure {
            log::warn!("{} voxel(s) failed; first at {:?}: {}", summary.failed, index, reason);
        }
        self.run = Some(FitRun { outputs, summary });
        Ok(())
    }

    /// Gather one voxel's bundle; excluded voxels get an empty, invalid one.
    fn voxel_at(
        &self, index: [usize; 3], defaults: &Array1<f64>, mask: Option<&Volume>, subregion: Option<&Region>,
    ) -> VoxelInput {
        if !voxel_selected(index, mask, subregion) {
            return VoxelInput::excluded(index);
        }
        VoxelInput::new(
            index,
            self.inputs.iter().map(|input| input.voxel(index).to_owned()).collect(),
            self.fixed_at(index, defaults),
        )
    }

    fn fixed_at(&self, index: [usize; 3], defaults: &Array1<f64>) -> Array1<f64> {
        let mut fixed = defaults.clone();
        for (value, map) in fixed.iter_mut().zip(&self.fixed) {
            if let Some(map) = map {
                *value = map.scalar(index);
            }
        }
        fixed
    }

    fn run(&self) -> FitResult<&FitRun> {
        self.run.as_ref().ok_or(FitError::NotUpdated)
    }

    fn reference_geometry(&self) -> FitResult<&Geometry> {
        Ok(self.inputs.first().ok_or(FitError::MissingInputs)?.geometry())
    }

    /// # Errors
    /// `FitError::NotUpdated` before a successful [`update`](Self::update).
    pub fn summary(&self) -> FitResult<&FitSummary> {
        Ok(&self.run()?.summary)
    }

    /// Raw output buffers of the last run.
    ///
    /// # Errors
    /// `FitError::NotUpdated` before a successful [`update`](Self::update).
    pub fn outputs(&self) -> FitResult<&OutputVolumeSet> {
        Ok(&self.run()?.outputs)
    }

    /// Output channel `name` as a volume with the input geometry.
    ///
    /// # Errors
    /// `FitError::NotUpdated`, or `FitError::UnknownChannel`.
    pub fn output(&self, name: &str) -> FitResult<Volume> {
        self.run()?.outputs.volume(name, self.reference_geometry()?)
    }

    /// Every output channel as `(name, volume)`, in channel order.
    ///
    /// # Errors
    /// `FitError::NotUpdated` before a successful [`update`](Self::update).
    pub fn output_volumes(&self) -> FitResult<Vec<(String, Volume)>> {
        self.run()?.outputs.clone().into_volumes(self.reference_geometry()?)
    }

    /// Write every channel to `<prefix><channel><extension>`.
    ///
    /// # Errors
    /// `FitError::NotUpdated`, or I/O errors from writing.
    pub fn write_outputs(&self, prefix: &str, options: &OutputOptions) -> FitResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (name, volume) in self.output_volumes()? {
            let path = PathBuf::from(format!("{prefix}{name}{}", options.extension));
            nifti_io::write_volume(&path, &volume)?;
            log::debug!("wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::models::ConstantModel;
    use ndarray::Array4;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Input validation (counts, depths, geometry, mask shape).
    // - NotUpdated before update().
    // - Skipped voxels and the summary of a small run.
    // - Voxel bundles flagged invalid outside the mask or subregion.
    // The end-to-end behaviour is covered in tests/integration_fit_pipeline.rs.
    // -------------------------------------------------------------------------

    fn filter() -> ModelFitFilter<ScaledFit<ConstantModel>> {
        ModelFitFilter::for_model(ConstantModel::new(2), FitOptions { threads: Some(1), ..FitOptions::default() })
            .expect("constant model is valid")
    }

    fn input(dims: [usize; 3], depth: usize, value: f64) -> Volume {
        let [nx, ny, nz] = dims;
        Volume::new(Array4::from_elem((nx, ny, nz, depth), value), Geometry::new(dims)).expect("shape")
    }

    #[test]
    // Purpose
    // -------
    // Reject inconsistent inputs before any work is done.
    //
    // Given
    // -----
    // - The constant model of size 2.
    //
    // Expect
    // ------
    // - No inputs → MissingInputs; depth 3 → ChannelCountMismatch; a fixed
    //   map for a model without fixed parameters → FixedCountMismatch; a
    //   mask of a different shape → GeometryMismatch.
    fn set_inputs_validates_counts_and_geometry() {
        // Arrange
        let mut f = filter();

        // Act / Assert
        assert!(matches!(f.set_inputs(vec![], vec![], None), Err(FitError::MissingInputs)));
        assert!(matches!(
            f.set_inputs(vec![input([2, 2, 1], 3, 1.0)], vec![], None),
            Err(FitError::ChannelCountMismatch { input: 0, expected: 2, found: 3 })
        ));
        assert!(matches!(
            f.set_inputs(vec![input([2, 2, 1], 2, 1.0)], vec![Some(input([2, 2, 1], 1, 1.0))], None),
            Err(FitError::FixedCountMismatch { expected: 0, found: 1 })
        ));
        assert!(matches!(
            f.set_inputs(vec![input([2, 2, 1], 2, 1.0)], vec![], Some(input([2, 1, 1], 1, 1.0))),
            Err(FitError::GeometryMismatch { .. })
        ));
        assert!(matches!(f.summary(), Err(FitError::NotUpdated)));
        assert!(matches!(f.update(), Err(FitError::MissingInputs)));
    }

    #[test]
    // Purpose
    // -------
    // Check the summary of a run where the mask excludes part of the volume.
    //
    // Given
    // -----
    // - A 3×1×1 volume with constant value 4, mask [1, 0, 1].
    //
    // Expect
    // ------
    // - processed 2, converged 2, skipped 1; S ≈ 4 where masked in, 0
    //   elsewhere.
    fn update_counts_masked_voxels_as_skipped() {
        // Arrange
        let mut f = filter();
        let mut mask = Array4::from_elem((3, 1, 1, 1), 1.0);
        mask[[1, 0, 0, 0]] = 0.0;
        let mask = Volume::new(mask, Geometry::new([3, 1, 1])).expect("shape");
        f.set_inputs(vec![input([3, 1, 1], 2, 4.0)], vec![], Some(mask)).expect("valid inputs");

        // Act
        f.update().expect("run succeeds");

        // Assert
        let summary = f.summary().expect("updated");
        assert_eq!((summary.processed, summary.converged, summary.skipped), (2, 2, 1));
        assert_eq!(summary.regions, 1);
        let s = f.output("S").expect("S channel");
        approx::assert_relative_eq!(s.scalar([0, 0, 0]), 4.0, max_relative = 1e-6);
        assert_eq!(s.scalar([1, 0, 0]), 0.0);
        approx::assert_relative_eq!(s.scalar([2, 0, 0]), 4.0, max_relative = 1e-6);
    }

    #[test]
    // Purpose
    // -------
    // Verify bundles carry the validity decided by the mask and subregion.
    //
    // Given
    // -----
    // - A 3×1×1 input with value 4 and depth 2; subregion covering x ∈ [1, 2].
    //
    // Expect
    // ------
    // - x = 0 → invalid with no data; x = 1 → valid with measurements [4, 4].
    fn voxel_bundles_are_flagged_by_subregion() {
        // Arrange
        let mut f = filter();
        f.set_inputs(vec![input([3, 1, 1], 2, 4.0)], vec![], None).expect("valid inputs");
        let subregion = Region::new([1, 0, 0], [2, 1, 1]);
        let defaults = f.model().fixed_defaults();

        // Act
        let outside = f.voxel_at([0, 0, 0], &defaults, None, Some(&subregion));
        let inside = f.voxel_at([1, 0, 0], &defaults, None, Some(&subregion));

        // Assert
        assert!(!outside.valid);
        assert_eq!(outside.n_measurements(), 0);
        assert!(inside.valid);
        assert_eq!(inside.measurements(), ndarray::array![4.0, 4.0]);
    }
}
