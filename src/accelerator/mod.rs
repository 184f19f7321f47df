//! Compute devices for batched kernel evaluation.
//!
//! A device receives a set of sources, each flattened into weighted
//! quadrature points, and a set of targets, and returns one raw kernel sum
//! per (target, source) pair. Enqueue and readback are synchronous: the
//! call blocks until results are on the host.

#[cfg(feature = "gpu")]
pub mod wgpu_device;
#[cfg(feature = "gpu")]
pub use wgpu_device::WgpuDevice;

use crate::config::AcceleratorBackend;
use crate::error::BemError;
use crate::surface::Point3;
use log::info;
use rayon::prelude::*;
use std::sync::Arc;

/// What a target row measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelMode {
    /// Σ w / |t − q|
    Potential,
    /// Σ w (t − q)·n / |t − q|³
    NormalField,
}

/// Sources flattened into weighted points; source `s` owns
/// `points[offsets[s]..offsets[s + 1]]`.
#[derive(Clone, Debug, Default)]
pub struct SourceCloud {
    pub points: Vec<(Point3, f64)>,
    pub offsets: Vec<usize>,
}

impl SourceCloud {
    pub fn new() -> Self {
        SourceCloud { points: Vec::new(), offsets: vec![0] }
    }

    pub fn push(&mut self, points: &[(Point3, f64)]) {
        if self.offsets.is_empty() {
            self.offsets.push(0);
        }
        self.points.extend_from_slice(points);
        self.offsets.push(self.points.len());
    }

    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source(&self, s: usize) -> &[(Point3, f64)] {
        &self.points[self.offsets[s]..self.offsets[s + 1]]
    }
}

#[derive(Clone, Debug, Default)]
pub struct TargetSet {
    pub positions: Vec<Point3>,
    pub normals: Vec<Point3>,
    pub modes: Vec<KernelMode>,
}

impl TargetSet {
    pub fn push(&mut self, position: Point3, normal: Point3, mode: KernelMode) {
        self.positions.push(position);
        self.normals.push(normal);
        self.modes.push(mode);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

pub trait ComputeDevice: Send + Sync {
    fn name(&self) -> String;

    /// Raw kernel sums, laid out `out[t * sources.len() + s]`.
    fn evaluate(&self, sources: &SourceCloud, targets: &TargetSet) -> Result<Vec<f64>, BemError>;
}

/// Evaluates batches on the rayon thread pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostDevice;

pub(crate) fn kernel_sum(points: &[(Point3, f64)], t: &Point3, n: &Point3, mode: KernelMode) -> f64 {
    match mode {
        KernelMode::Potential => points.iter().map(|(q, w)| w / (t - q).norm()).sum(),
        KernelMode::NormalField => points
            .iter()
            .map(|(q, w)| {
                let d = t - q;
                let r = d.norm();
                w * d.dot(n) / (r * r * r)
            })
            .sum(),
    }
}

impl ComputeDevice for HostDevice {
    fn name(&self) -> String {
        format!("host ({} threads)", rayon::current_num_threads())
    }

    fn evaluate(&self, sources: &SourceCloud, targets: &TargetSet) -> Result<Vec<f64>, BemError> {
        let ns = sources.len();
        let mut out = vec![0.0; targets.len() * ns];
        if ns == 0 {
            return Ok(out);
        }
        out.par_chunks_mut(ns).enumerate().for_each(|(t, row)| {
            let (p, n, mode) = (&targets.positions[t], &targets.normals[t], targets.modes[t]);
            for (s, v) in row.iter_mut().enumerate() {
                *v = kernel_sum(sources.source(s), p, n, mode);
            }
        });
        Ok(out)
    }
}

/// Picks the device for the configured backend. Asking for a GPU in a build
/// without the `gpu` feature is a configuration error.
pub fn select_device(backend: AcceleratorBackend) -> Result<Arc<dyn ComputeDevice>, BemError> {
    if !backend.contains(AcceleratorBackend::GPU) {
        return Ok(Arc::new(HostDevice));
    }
    #[cfg(feature = "gpu")]
    {
        match WgpuDevice::new()? {
            Some(device) => {
                info!("kernel batches run on {}", device.name());
                Ok(Arc::new(device))
            }
            None => Err(BemError::Accelerator("no GPU adapter available".into())),
        }
    }
    #[cfg(not(feature = "gpu"))]
    {
        info!("GPU backend requested in a build without GPU support");
        Err(BemError::InvalidConfig("GPU backend requested but the `gpu` feature is disabled".into()))
    }
}
