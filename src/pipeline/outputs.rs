//! pipeline::outputs — multi-channel output buffers.
//!
//! Purpose
//! -------
//! Own one `(n_voxels, depth)` buffer per output channel for the duration of
//! a run, hand out disjoint per-region writers, and convert the finished
//! buffers into [`Volume`]s.
//!
//! Key behaviors
//! -------------
//! - Channel order: varying parameters, derived parameters, `resid`
//!   (RMS residual), optional `all_resids`, optional `COV` (row-major upper
//!   triangle), `iterations`, `converged`.
//! - [`OutputVolumeSet::region_writers`] splits every buffer by work region;
//!   a [`RegionWriter`] writes whole voxels into its own rows only.
//! - Voxels that are never written keep the background value 0.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every voxel row is written at most once, by the single region that
//!   owns it.
//! - Row index equals the raster index `x + nx·(y + ny·z)`.
use crate::{
    fitting::{
        core::{fit_function::VoxelFit, model::Model, options::FitOptions},
        errors::{FitError, FitResult},
    },
    inference::covariance::upper_triangle,
    pipeline::scheduler::split_rows,
    volume::{geometry::Geometry, image::Volume, WorkRegion},
};
use ndarray::{Array2, ArrayViewMut2};

/// RMS residual channel name.
pub const RESID_CHANNEL: &str = "resid";
/// Full residual vector channel name.
pub const ALL_RESIDS_CHANNEL: &str = "all_resids";
/// Covariance channel name.
pub const COV_CHANNEL: &str = "COV";
/// Iteration count channel name.
pub const ITERATIONS_CHANNEL: &str = "iterations";
/// Convergence flag channel name.
pub const CONVERGED_CHANNEL: &str = "converged";

/// What a channel holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Varying(usize),
    Derived(usize),
    Resid,
    AllResids,
    Covariance,
    Iterations,
    Converged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub buffer: Array2<f64>,
}

impl OutputChannel {
    fn new(name: impl Into<String>, kind: ChannelKind, n_voxels: usize, depth: usize) -> Self {
        Self { name: name.into(), kind, buffer: Array2::zeros((n_voxels, depth)) }
    }

    pub fn depth(&self) -> usize {
        self.buffer.ncols()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputVolumeSet {
    channels: Vec<OutputChannel>,
    n_voxels: usize,
}

impl OutputVolumeSet {
    /// Allocate zeroed buffers for `model` under `options`.
    pub fn new(model: &dyn Model, n_voxels: usize, options: &FitOptions) -> Self {
        let mut channels = Vec::new();
        for (i, name) in model.varying_names().iter().enumerate() {
            channels.push(OutputChannel::new(*name, ChannelKind::Varying(i), n_voxels, 1));
        }
        for (i, name) in model.derived_names().iter().enumerate() {
            channels.push(OutputChannel::new(*name, ChannelKind::Derived(i), n_voxels, 1));
        }
        channels.push(OutputChannel::new(RESID_CHANNEL, ChannelKind::Resid, n_voxels, 1));
        if options.all_resids {
            channels.push(OutputChannel::new(
                ALL_RESIDS_CHANNEL,
                ChannelKind::AllResids,
                n_voxels,
                model.n_measurements(),
            ));
        }
        if options.covariance {
            let nv = model.n_varying();
            channels.push(OutputChannel::new(COV_CHANNEL, ChannelKind::Covariance, n_voxels, nv * (nv + 1) / 2));
        }
        channels.push(OutputChannel::new(ITERATIONS_CHANNEL, ChannelKind::Iterations, n_voxels, 1));
        channels.push(OutputChannel::new(CONVERGED_CHANNEL, ChannelKind::Converged, n_voxels, 1));
        Self { channels, n_voxels }
    }

    pub fn n_voxels(&self) -> usize {
        self.n_voxels
    }

    pub fn channels(&self) -> &[OutputChannel] {
        &self.channels
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// # Errors
    /// `FitError::UnknownChannel` when no channel is called `name`.
    pub fn channel(&self, name: &str) -> FitResult<&OutputChannel> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| FitError::UnknownChannel { name: name.to_string() })
    }

    /// One writer per region, owning that region's rows of every channel.
    pub fn region_writers(&mut self, regions: &[WorkRegion]) -> Vec<RegionWriter<'_>> {
        let kinds: Vec<ChannelKind> = self.channels.iter().map(|c| c.kind).collect();
        let blocks = split_rows(self.channels.iter_mut().map(|c| &mut c.buffer), regions);
        regions
            .iter()
            .zip(blocks)
            .map(|(region, rows)| RegionWriter {
                first: region.first,
                channels: kinds.iter().copied().zip(rows).collect(),
            })
            .collect()
    }

    /// Single-channel-set volume for `name`.
    ///
    /// # Errors
    /// `FitError::UnknownChannel`, or a shape error if `geometry` does not
    /// match the buffers.
    pub fn volume(&self, name: &str, geometry: &Geometry) -> FitResult<Volume> {
        Volume::from_rows(&self.channel(name)?.buffer, geometry.clone())
    }

    /// Convert every channel into a volume sharing `geometry`, in channel order.
    pub fn into_volumes(self, geometry: &Geometry) -> FitResult<Vec<(String, Volume)>> {
        self.channels
            .into_iter()
            .map(|c| Ok((c.name, Volume::from_rows(&c.buffer, geometry.clone())?)))
            .collect()
    }
}

/// Exclusive write access to one region's rows of every channel.
#[derive(Debug)]
pub struct RegionWriter<'a> {
    first: usize,
    channels: Vec<(ChannelKind, ArrayViewMut2<'a, f64>)>,
}

impl RegionWriter<'_> {
    /// Write `fit` into the row of raster index `linear`.
    ///
    /// `linear` must lie inside this writer's region.
    pub fn write(&mut self, linear: usize, fit: &VoxelFit) {
        let row = linear - self.first;
        for (kind, block) in self.channels.iter_mut() {
            let mut out = block.row_mut(row);
            match *kind {
                ChannelKind::Varying(i) => out[0] = fit.varying[i],
                ChannelKind::Derived(i) => out[0] = fit.derived[i],
                ChannelKind::Resid => out[0] = fit.rms_residual(),
                ChannelKind::AllResids => {
                    for (dst, src) in out.iter_mut().zip(fit.residuals.iter()) {
                        *dst = *src;
                    }
                }
                ChannelKind::Covariance => {
                    if let Some(cov) = &fit.covariance {
                        for (dst, src) in out.iter_mut().zip(upper_triangle(cov).iter()) {
                            *dst = *src;
                        }
                    }
                }
                ChannelKind::Iterations => out[0] = fit.iterations as f64,
                ChannelKind::Converged => out[0] = if fit.success() { 1.0 } else { 0.0 },
            }
        }
    }
}
