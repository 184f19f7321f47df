//! wgpu compute backend for kernel batches.
//!
//! Kernel sums are evaluated in single precision on the device, one
//! invocation per (target, source) pair, and widened to f64 on readback.

use super::{ComputeDevice, KernelMode, SourceCloud, TargetSet};
use crate::error::BemError;
use bytemuck::{Pod, Zeroable};
use log::{debug, info};
use wgpu::util::DeviceExt;
use wgpu::{
    Adapter, Device, DeviceDescriptor, Features, Instance, InstanceDescriptor, Limits, PowerPreference, Queue,
    RequestAdapterOptions,
};

const WORKGROUP_SIZE: u32 = 64;
const MAX_GROUPS_PER_DIM: u32 = 65_535;

const KERNEL_SHADER: &str = r#"
struct Params {
    n_targets: u32,
    n_sources: u32,
    row_stride: u32,
    _pad: u32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> points: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> offsets: array<u32>;
@group(0) @binding(3) var<storage, read> targets: array<vec4<f32>>;
@group(0) @binding(4) var<storage, read> normals: array<vec4<f32>>;
@group(0) @binding(5) var<storage, read_write> result: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let idx = gid.x + gid.y * params.row_stride;
    if (idx >= params.n_targets * params.n_sources) {
        return;
    }
    let t = idx / params.n_sources;
    let s = idx % params.n_sources;
    let tgt = targets[t];
    let n = normals[t].xyz;
    var acc: f32 = 0.0;
    for (var q: u32 = offsets[s]; q < offsets[s + 1u]; q = q + 1u) {
        let p = points[q];
        let d = tgt.xyz - p.xyz;
        let r = length(d);
        if (tgt.w < 0.5) {
            acc = acc + p.w / r;
        } else {
            acc = acc + p.w * dot(d, n) / (r * r * r);
        }
    }
    result[idx] = acc;
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Params {
    n_targets: u32,
    n_sources: u32,
    row_stride: u32,
    _pad: u32,
}

pub struct WgpuDevice {
    adapter: Adapter,
    device: Device,
    queue: Queue,
    pipeline: wgpu::ComputePipeline,
}

impl WgpuDevice {
    /// Returns `Ok(None)` when no adapter is available.
    pub async fn new_async() -> Result<Option<Self>, BemError> {
        let instance = Instance::new(InstanceDescriptor { backends: wgpu::Backends::all(), ..Default::default() });
        let adapter = match instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Some(adapter) => adapter,
            None => return Ok(None),
        };
        let info = adapter.get_info();
        info!("Found GPU adapter: {} ({:?})", info.name, info.backend);

        let supported = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("electrobem kernel device"),
                    required_features: Features::empty(),
                    required_limits: Limits {
                        max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
                        max_buffer_size: supported.max_buffer_size,
                        ..Limits::downlevel_defaults()
                    },
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| BemError::Accelerator(e.to_string()))?;

        // Shader and pipeline errors surface through the scope, not the
        // uncaptured-error handler, which panics by default.
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("boundary_kernel"),
            source: wgpu::ShaderSource::Wgsl(KERNEL_SHADER.into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("boundary_kernel"),
            layout: None,
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(err) = device.pop_error_scope().await {
            return Err(BemError::Accelerator(format!("kernel pipeline: {err}")));
        }

        Ok(Some(WgpuDevice { adapter, device, queue, pipeline }))
    }

    pub fn new() -> Result<Option<Self>, BemError> {
        pollster::block_on(Self::new_async())
    }

    fn storage(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::STORAGE,
        })
    }

    fn map_and_read(&self, buffer: &wgpu::Buffer) -> Result<Vec<f32>, BemError> {
        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BemError::Accelerator(e.to_string()))?
            .map_err(|e| BemError::Accelerator(e.to_string()))?;
        let data = slice.get_mapped_range();
        let out: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        buffer.unmap();
        Ok(out)
    }
}

impl ComputeDevice for WgpuDevice {
    fn name(&self) -> String {
        let info = self.adapter.get_info();
        format!("{} ({:?})", info.name, info.backend)
    }

    fn evaluate(&self, sources: &SourceCloud, targets: &TargetSet) -> Result<Vec<f64>, BemError> {
        let (nt, ns) = (targets.len(), sources.len());
        let total = nt * ns;
        if total == 0 || sources.points.is_empty() {
            return Ok(vec![0.0; total]);
        }
        let total_u32 = u32::try_from(total).map_err(|_| BemError::Accelerator(format!("batch of {total} pairs is too large")))?;

        let points: Vec<[f32; 4]> = sources
            .points
            .iter()
            .map(|(q, w)| [q.x as f32, q.y as f32, q.z as f32, *w as f32])
            .collect();
        let offsets: Vec<u32> = sources.offsets.iter().map(|&o| o as u32).collect();
        let positions: Vec<[f32; 4]> = targets
            .positions
            .iter()
            .zip(&targets.modes)
            .map(|(p, m)| {
                let mode = match m {
                    KernelMode::Potential => 0.0,
                    KernelMode::NormalField => 1.0,
                };
                [p.x as f32, p.y as f32, p.z as f32, mode]
            })
            .collect();
        let normals: Vec<[f32; 4]> = targets.normals.iter().map(|n| [n.x as f32, n.y as f32, n.z as f32, 0.0]).collect();

        let groups = total_u32.div_ceil(WORKGROUP_SIZE);
        let (gx, gy) = if groups > MAX_GROUPS_PER_DIM {
            (MAX_GROUPS_PER_DIM, groups.div_ceil(MAX_GROUPS_PER_DIM))
        } else {
            (groups, 1)
        };
        let params = Params { n_targets: nt as u32, n_sources: ns as u32, row_stride: gx * WORKGROUP_SIZE, _pad: 0 };

        let params_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("kernel_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let points_buf = self.storage("kernel_points", bytemuck::cast_slice(&points));
        let offsets_buf = self.storage("kernel_offsets", bytemuck::cast_slice(&offsets));
        let targets_buf = self.storage("kernel_targets", bytemuck::cast_slice(&positions));
        let normals_buf = self.storage("kernel_normals", bytemuck::cast_slice(&normals));
        let size = (total * std::mem::size_of::<f32>()) as u64;
        let result_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kernel_result"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kernel_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = self.pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel_bind_group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: points_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: offsets_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: targets_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: normals_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: result_buf.as_entire_binding() },
            ],
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("kernel_encoder") });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor { label: Some("kernel_pass"), timestamp_writes: None });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(gx, gy, 1);
        }
        encoder.copy_buffer_to_buffer(&result_buf, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));
        debug!("dispatched {nt}x{ns} kernel batch as {gx}x{gy} workgroups");

        Ok(self.map_and_read(&staging)?.into_iter().map(f64::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::HostDevice;
    use crate::surface::Point3;
    use approx::assert_relative_eq;

    #[test]
    fn kernel_shader_parses_and_validates() {
        let module = naga::front::wgsl::parse_str(KERNEL_SHADER).unwrap_or_else(|e| panic!("{}", e.emit_to_string(KERNEL_SHADER)));
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .unwrap();
        assert!(module.entry_points.iter().any(|ep| ep.name == "main"));
    }

    #[test]
    fn device_batches_agree_with_host() {
        let device = match WgpuDevice::new() {
            Ok(Some(device)) => device,
            Ok(None) => {
                eprintln!("no GPU adapter, skipping");
                return;
            }
            Err(e) => panic!("device setup failed: {e}"),
        };
        let mut sources = SourceCloud::new();
        sources.push(&[(Point3::zeros(), 2.0)]);
        sources.push(&[(Point3::new(0.0, 0.0, 1.0), 1.0), (Point3::new(0.0, 0.0, -1.0), 1.0)]);
        let mut targets = TargetSet::default();
        targets.push(Point3::new(0.0, 0.0, 2.0), Point3::z(), KernelMode::Potential);
        targets.push(Point3::new(0.5, 0.0, 3.0), Point3::z(), KernelMode::NormalField);

        let gpu = device.evaluate(&sources, &targets).unwrap();
        let host = HostDevice.evaluate(&sources, &targets).unwrap();
        assert_eq!(gpu.len(), host.len());
        for (g, h) in gpu.iter().zip(&host) {
            assert_relative_eq!(*g, *h, max_relative = 1e-5);
        }
    }
}
