// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # WGPU Backend
//!
//! GPU-accelerated backend using WGPU compute shaders.
//! Metal on macOS and DirectX 12 on Windows; Vulkan/GL only when the
//! configuration allows every API.
//!
//! The frame is uploaded as an `Rgba32Float` texture, regions as a storage
//! buffer. Results come back through a mapped staging buffer after a blocking
//! `device.poll(Maintain::Wait)`. Buffers are kept between passes and only
//! reallocated when a pass needs more room.

use super::{BackendType, ComputeBackend, DispatchConfig};
use crate::{Color, ComputeError, Frame, Result, SensorRegion};
use luxsense_config::GpuBackendSet;
use tracing::{debug, info};

const WORKGROUP_SIZE: u32 = 64;
const VEC4_BYTES: u64 = 16;

/// Uniform block of `batch_average.wgsl`
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BatchParams {
    region_count: u32,
    sensors_per_thread: u32,
    width: u32,
    height: u32,
}

/// Uniform block of `average.wgsl`
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ReduceParams {
    count: u32,
    _pad: [u32; 3],
}

/// Native APIs allowed by the configuration
pub(crate) fn allowed_backends(set: GpuBackendSet) -> wgpu::Backends {
    match set {
        GpuBackendSet::All => wgpu::Backends::all(),
        GpuBackendSet::Platform => {
            if cfg!(target_os = "macos") {
                wgpu::Backends::METAL
            } else if cfg!(target_os = "windows") {
                wgpu::Backends::DX12
            } else {
                wgpu::Backends::empty()
            }
        }
    }
}

/// Request a high-performance adapter from the given APIs
pub(crate) fn probe_adapter(backends: wgpu::Backends) -> Option<wgpu::Adapter> {
    if backends.is_empty() {
        return None;
    }
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends,
        ..Default::default()
    });

    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
}

/// GPU buffer cache (grown on demand, reused across passes)
#[derive(Default)]
struct WgpuBuffers {
    frame_texture: Option<wgpu::Texture>,
    regions: Option<wgpu::Buffer>,
    results: Option<wgpu::Buffer>,
    results_staging: Option<wgpu::Buffer>,
    samples: Option<wgpu::Buffer>,
}

/// WGPU backend for GPU acceleration
pub struct WgpuBackend {
    /// Backend name for logging
    name: String,

    device: wgpu::Device,
    queue: wgpu::Queue,

    batch_layout: wgpu::BindGroupLayout,
    /// One region per invocation
    batch_pipeline: wgpu::ComputePipeline,
    /// Several regions per invocation
    packed_pipeline: wgpu::ComputePipeline,

    reduce_layout: wgpu::BindGroupLayout,
    reduce_pipeline: wgpu::ComputePipeline,

    batch_params: wgpu::Buffer,
    reduce_params: wgpu::Buffer,
    reduce_output: wgpu::Buffer,
    reduce_staging: wgpu::Buffer,

    buffers: WgpuBuffers,
}

impl WgpuBackend {
    /// Create a backend restricted to the APIs the configuration allows
    pub fn for_platform(set: GpuBackendSet) -> Result<Self> {
        let backends = allowed_backends(set);
        if backends.is_empty() {
            return Err(ComputeError::BackendUnavailable(format!(
                "no GPU compute API enabled on {}",
                super::platform_info()
            )));
        }
        Self::new(backends)
    }

    /// Create a new WGPU backend on the first suitable adapter
    pub fn new(backends: wgpu::Backends) -> Result<Self> {
        let adapter = probe_adapter(backends).ok_or_else(|| {
            ComputeError::BackendUnavailable("Failed to find WGPU adapter".to_string())
        })?;

        let adapter_info = adapter.get_info();
        let name = format!("WGPU ({} - {:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("luxsense compute device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| ComputeError::DeviceError(format!("Failed to create device: {}", e)))?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let batch_layout = create_batch_layout(&device);
        let batch_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Batch Average Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/batch_average.wgsl").into()),
        });
        let batch_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Batch Average Pipeline Layout"),
            bind_group_layouts: &[&batch_layout],
            push_constant_ranges: &[],
        });
        let batch_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Batch Average Pipeline"),
            layout: Some(&batch_pipeline_layout),
            module: &batch_shader,
            entry_point: "batch_average_main",
        });
        let packed_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Packed Batch Average Pipeline"),
            layout: Some(&batch_pipeline_layout),
            module: &batch_shader,
            entry_point: "batch_average_packed_main",
        });

        let reduce_layout = create_reduce_layout(&device);
        let reduce_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sample Average Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/average.wgsl").into()),
        });
        let reduce_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sample Average Pipeline Layout"),
            bind_group_layouts: &[&reduce_layout],
            push_constant_ranges: &[],
        });
        let reduce_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Sample Average Pipeline"),
            layout: Some(&reduce_pipeline_layout),
            module: &reduce_shader,
            entry_point: "average_main",
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(ComputeError::DeviceError(format!(
                "Shader validation failed: {}",
                error
            )));
        }

        let uniform = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let batch_params = uniform("Batch Params", std::mem::size_of::<BatchParams>() as u64);
        let reduce_params = uniform("Reduce Params", std::mem::size_of::<ReduceParams>() as u64);

        let reduce_output = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Reduce Output"),
            size: VEC4_BYTES,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let reduce_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Reduce Staging"),
            size: VEC4_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        info!("GPU compute backend ready: {}", name);

        Ok(Self {
            name,
            device,
            queue,
            batch_layout,
            batch_pipeline,
            packed_pipeline,
            reduce_layout,
            reduce_pipeline,
            batch_params,
            reduce_params,
            reduce_output,
            reduce_staging,
            buffers: WgpuBuffers::default(),
        })
    }

    /// Upload the frame, reusing the texture while the size is unchanged
    fn upload_frame(&mut self, frame: &Frame) -> wgpu::TextureView {
        let (width, height) = frame.dimensions();
        let stale = self
            .buffers
            .frame_texture
            .as_ref()
            .map_or(true, |t| t.width() != width || t.height() != height);
        if stale {
            self.buffers.frame_texture = None;
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let device = &self.device;
        let texture: &wgpu::Texture = self.buffers.frame_texture.get_or_insert_with(|| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Frame Texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        });

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(frame.as_raw()),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * VEC4_BYTES as u32),
                rows_per_image: Some(height),
            },
            size,
        );

        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn check_storage_size(&self, bytes: u64, what: &str) -> Result<()> {
        let max = self.device.limits().max_storage_buffer_binding_size as u64;
        if bytes > max {
            return Err(ComputeError::InvalidInput(format!(
                "{} needs {} bytes, device allows {}",
                what, bytes, max
            )));
        }
        Ok(())
    }
}

impl ComputeBackend for WgpuBackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Wgpu
    }

    fn average_samples(&mut self, samples: &[[f32; 4]]) -> Result<Option<Color>> {
        if samples.is_empty() {
            return Ok(None);
        }
        let bytes = samples.len() as u64 * VEC4_BYTES;
        self.check_storage_size(bytes, "Sample buffer")?;

        let sample_buffer = ensure_buffer(
            &self.device,
            &mut self.buffers.samples,
            bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            "Staged Samples",
        );
        self.queue
            .write_buffer(sample_buffer, 0, bytemuck::cast_slice(samples));
        self.queue.write_buffer(
            &self.reduce_params,
            0,
            bytemuck::bytes_of(&ReduceParams {
                count: samples.len() as u32,
                _pad: [0; 3],
            }),
        );

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sample Average Bind Group"),
            layout: &self.reduce_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: sample_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.reduce_output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.reduce_params.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sample Average Encoder"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Sample Average Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.reduce_pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(1, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&self.reduce_output, 0, &self.reduce_staging, 0, VEC4_BYTES);
        self.queue.submit(Some(encoder.finish()));

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ComputeError::DispatchError(error.to_string()));
        }

        let values = read_back(&self.device, &self.reduce_staging, VEC4_BYTES)?;
        Ok(values.first().and_then(|v| to_color(*v)))
    }

    fn average_regions(
        &mut self,
        frame: &Frame,
        regions: &[SensorRegion],
        dispatch: &DispatchConfig,
    ) -> Result<Vec<Option<Color>>> {
        if regions.is_empty() {
            return Ok(Vec::new());
        }
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(vec![None; regions.len()]);
        }
        let max_dim = self.device.limits().max_texture_dimension_2d;
        if width > max_dim || height > max_dim {
            return Err(ComputeError::InvalidInput(format!(
                "Frame {}x{} exceeds the device texture limit of {}",
                width, height, max_dim
            )));
        }

        let region_bytes = std::mem::size_of_val(regions) as u64;
        let result_bytes = regions.len() as u64 * VEC4_BYTES;
        self.check_storage_size(region_bytes, "Region buffer")?;
        self.check_storage_size(result_bytes, "Result buffer")?;

        let frame_view = self.upload_frame(frame);

        let sensors_per_thread = if dispatch.use_optimized_kernel {
            dispatch.clamped_sensors_per_thread()
        } else {
            1
        };
        let region_count = regions.len() as u32;
        self.queue.write_buffer(
            &self.batch_params,
            0,
            bytemuck::bytes_of(&BatchParams {
                region_count,
                sensors_per_thread,
                width,
                height,
            }),
        );

        let region_buffer = ensure_buffer(
            &self.device,
            &mut self.buffers.regions,
            region_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            "Sensor Regions",
        );
        self.queue
            .write_buffer(region_buffer, 0, bytemuck::cast_slice(regions));
        let results_buffer = ensure_buffer(
            &self.device,
            &mut self.buffers.results,
            result_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            "Region Results",
        );
        let staging_buffer = ensure_buffer(
            &self.device,
            &mut self.buffers.results_staging,
            result_bytes,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            "Region Results Staging",
        );

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Batch Average Bind Group"),
            layout: &self.batch_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&frame_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: region_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: results_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.batch_params.as_entire_binding(),
                },
            ],
        });

        let invocations = (region_count + sensors_per_thread - 1) / sensors_per_thread;
        let workgroup_count = (invocations + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
        let pipeline = if dispatch.use_optimized_kernel {
            &self.packed_pipeline
        } else {
            &self.batch_pipeline
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Batch Average Encoder"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Batch Average Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroup_count, 1, 1);
        }
        encoder.copy_buffer_to_buffer(results_buffer, 0, staging_buffer, 0, result_bytes);
        self.queue.submit(Some(encoder.finish()));

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ComputeError::DispatchError(error.to_string()));
        }

        let values = read_back(&self.device, staging_buffer, result_bytes)?;
        debug!(
            "Batch pass: {} regions, {} workgroups, {} per invocation",
            region_count, workgroup_count, sensors_per_thread
        );

        Ok(values
            .into_iter()
            .take(regions.len())
            .map(to_color)
            .collect())
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        debug!("Releasing GPU compute backend: {}", self.name);
    }
}

/// `vec4(avg_rgb, count)`; a zero count means the window missed the frame
fn to_color(v: [f32; 4]) -> Option<Color> {
    if v[3] > 0.5 {
        Some(Color::rgb(v[0], v[1], v[2]))
    } else {
        None
    }
}

/// Return a buffer of at least `size` bytes, replacing a smaller one
fn ensure_buffer<'a>(
    device: &wgpu::Device,
    slot: &'a mut Option<wgpu::Buffer>,
    size: u64,
    usage: wgpu::BufferUsages,
    label: &str,
) -> &'a wgpu::Buffer {
    if slot.as_ref().map_or(true, |b| b.size() < size) {
        *slot = None;
    }
    slot.get_or_insert_with(|| {
        let capacity = size.next_power_of_two().max(256);
        debug!("Allocating GPU buffer '{}' ({} bytes)", label, capacity);
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity,
            usage,
            mapped_at_creation: false,
        })
    })
}

/// Map `staging` and copy out its first `bytes` as vec4s (blocking)
fn read_back(device: &wgpu::Device, staging: &wgpu::Buffer, bytes: u64) -> Result<Vec<[f32; 4]>> {
    let buffer_slice = staging.slice(..bytes);
    let (sender, receiver) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|_| ComputeError::ReadbackError("Map callback never ran".to_string()))?
        .map_err(|e| ComputeError::ReadbackError(format!("Failed to map buffer: {:?}", e)))?;

    let data = buffer_slice.get_mapped_range();
    let values = bytemuck::try_cast_slice::<u8, [f32; 4]>(&data)
        .map(|v| v.to_vec())
        .map_err(|e| ComputeError::ReadbackError(format!("Unaligned readback: {:?}", e)));
    drop(data);
    staging.unmap();
    values
}

fn create_batch_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Batch Average Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            storage_entry(1, true),
            storage_entry(2, false),
            uniform_entry(3),
        ],
    })
}

fn create_reduce_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Sample Average Layout"),
        entries: &[storage_entry(0, true), storage_entry(1, false), uniform_entry(2)],
    })
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
