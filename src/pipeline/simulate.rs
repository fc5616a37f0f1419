//! pipeline::simulate — forward evaluation of a model over parameter maps.
//!
//! Purpose
//! -------
//! Produce synthetic input volumes from maps of the varying (and optionally
//! fixed) parameters, so that `fit(simulate(p)) ≈ p` can be checked and
//! models can be explored without acquired data.
//!
//! Key behaviors
//! -------------
//! - Runs `Model::signal` per selected voxel, no solver involved.
//! - Returns one volume per model input, with `input_size(i)` channels.
//! - Additive Gaussian noise (statrs `Normal`) when `noise_sd > 0`; voxel
//!   `i` draws from `StdRng::seed_from_u64(seed + i)`, so the result does
//!   not depend on the thread count.
//! - Voxels outside the mask or subregion are left at 0.
//!
//! Invariants & assumptions
//! ------------------------
//! - The first varying map defines the geometry of every output.
use crate::{
    fitting::{
        core::{
            model::Model,
            options::{SimulateOptions, DEFAULT_LINES_PER_REGION},
        },
        errors::{FitError, FitResult},
    },
    pipeline::scheduler::{build_pool, run_regions, split_rows, voxel_selected, RegionTally},
    volume::{image::Volume, partition},
};
use ndarray::{Array1, Array2};
use rand::{distributions::Distribution, rngs::StdRng, SeedableRng};
use statrs::distribution::Normal;

/// Simulate every model input from parameter maps.
///
/// `varying` holds one scalar map per varying parameter, `fixed` one
/// optional scalar map per fixed parameter (empty for all defaults).
///
/// # Errors
/// - `FitError::MissingInputs` when `varying` is empty.
/// - `FitError::InputCountMismatch` / `FixedCountMismatch` for wrong map
///   counts.
/// - `FitError::NotScalarVolume` / `GeometryMismatch` for malformed maps.
/// - `FitError::SignalLengthMismatch` when `Model::signal` does not return
///   `n_measurements()` values.
/// - `FitError::InvalidSubregion`, pool errors and `InvalidNoise`.
pub fn simulate_volume(
    model: &dyn Model, varying: &[Volume], fixed: &[Option<Volume>], mask: Option<&Volume>,
    options: &SimulateOptions,
) -> FitResult<Vec<Volume>> {
    let geometry = varying.first().ok_or(FitError::MissingInputs)?.geometry().clone();
    if varying.len() != model.n_varying() {
        return Err(FitError::InputCountMismatch { expected: model.n_varying(), found: varying.len() });
    }
    for (map, name) in varying.iter().zip(model.varying_names()) {
        let what = format!("parameter map '{name}'");
        map.require_scalar(&what)?;
        geometry.check_matches(map.geometry(), &what)?;
    }
    if !fixed.is_empty() && fixed.len() != model.n_fixed() {
        return Err(FitError::FixedCountMismatch { expected: model.n_fixed(), found: fixed.len() });
    }
    for (map, name) in fixed.iter().zip(model.fixed_names()) {
        if let Some(map) = map {
            let what = format!("fixed map '{name}'");
            map.require_scalar(&what)?;
            geometry.check_matches(map.geometry(), &what)?;
        }
    }
    if let Some(mask) = mask {
        mask.require_scalar("mask")?;
        geometry.check_matches(mask.geometry(), "mask")?;
    }
    if let Some(subregion) = &options.subregion {
        subregion.validate_within(geometry.dims)?;
    }
    let defaults = model.fixed_defaults();
    check_signal_length(model, &defaults)?;
    let noise = if options.noise_sd > 0.0 {
        Some(Normal::new(0.0, options.noise_sd).map_err(|_| FitError::InvalidNoise { value: options.noise_sd })?)
    } else {
        None
    };

    let threads = options.resolved_threads();
    let pool = build_pool(threads)?;
    let regions = partition(geometry.dims, DEFAULT_LINES_PER_REGION);
    let sizes: Vec<usize> = (0..model.n_inputs()).map(|i| model.input_size(i)).collect();
    let mut buffers: Vec<Array2<f64>> = sizes.iter().map(|&n| Array2::zeros((geometry.n_voxels(), n))).collect();
    log::info!(
        "simulating model '{}' over {} voxels with {} threads (noise sd {})",
        model.name(),
        geometry.n_voxels(),
        threads,
        options.noise_sd
    );

    let subregion = options.subregion.as_ref();
    let work: Vec<_> = regions.iter().copied().zip(split_rows(buffers.iter_mut(), &regions)).collect();
    let tally = run_regions(&pool, work, |region, mut blocks| {
        let mut tally = RegionTally::default();
        for linear in region.range() {
            let index = geometry.voxel_index(linear);
            if !voxel_selected(index, mask, subregion) {
                tally.record_skip();
                continue;
            }
            let v: Array1<f64> = varying.iter().map(|map| map.scalar(index)).collect();
            let mut f = defaults.clone();
            for (value, map) in f.iter_mut().zip(fixed) {
                if let Some(map) = map {
                    *value = map.scalar(index);
                }
            }
            let mut signal = model.signal(v.view(), f.view());
            if let Some(normal) = &noise {
                let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(linear as u64));
                signal.mapv_inplace(|s| s + normal.sample(&mut rng));
            }
            let row = linear - region.first;
            let mut offset = 0;
            for (block, &n) in blocks.iter_mut().zip(&sizes) {
                let mut out = block.row_mut(row);
                for (dst, src) in out.iter_mut().zip(signal.iter().skip(offset).take(n)) {
                    *dst = *src;
                }
                offset += n;
            }
            tally.processed += 1;
        }
        tally
    });
    log::info!("simulation finished: {} voxels simulated, {} skipped", tally.processed, tally.skipped);

    buffers.iter().map(|rows| Volume::from_rows(rows, geometry.clone())).collect()
}

/// The signal at the start values must fill every input block exactly.
fn check_signal_length(model: &dyn Model, defaults: &Array1<f64>) -> FitResult<()> {
    let expected = model.n_measurements();
    let found = model.signal(model.start().view(), defaults.view()).len();
    if found != expected {
        return Err(FitError::SignalLengthMismatch { model: model.name().to_string(), expected, found });
    }
    Ok(())
}
