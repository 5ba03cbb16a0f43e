//! Buffer creation and bounded readback.

use std::borrow::Cow;
use std::sync::mpsc::{self, TryRecvError};
use std::time::{Duration, Instant};

use wgpu::util::DeviceExt;

use crate::context::{GpuContext, GpuError};

/// Bindings may not be zero-sized; empty inputs are padded to this.
const MIN_BINDING_BYTES: usize = 16;

/// Create a read-only storage buffer from bytes, after a capacity check.
pub(crate) fn storage(ctx: &GpuContext, label: &'static str, bytes: &[u8]) -> Result<wgpu::Buffer, GpuError> {
    ctx.check_capacity(label, bytes.len() as u64)?;
    let contents: Cow<'_, [u8]> = if bytes.len() < MIN_BINDING_BYTES {
        let mut padded = bytes.to_vec();
        padded.resize(MIN_BINDING_BYTES, 0);
        Cow::Owned(padded)
    } else {
        Cow::Borrowed(bytes)
    };
    Ok(ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: &contents,
        usage: wgpu::BufferUsages::STORAGE,
    }))
}

/// Create a writable storage buffer that can be copied out.
pub(crate) fn output(ctx: &GpuContext, label: &'static str, bytes: u64) -> Result<wgpu::Buffer, GpuError> {
    ctx.check_capacity(label, bytes)?;
    Ok(ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: bytes.max(MIN_BINDING_BYTES as u64),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    }))
}

/// Create a uniform buffer from a Pod struct.
pub(crate) fn uniform<T: bytemuck::Pod>(ctx: &GpuContext, label: &'static str, value: &T) -> wgpu::Buffer {
    ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

/// Layout entry for a storage buffer visible to compute.
pub(crate) fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
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

/// Layout entry for a uniform buffer visible to compute.
pub(crate) fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
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

/// Results of a submitted dispatch, not yet mapped.
#[must_use = "a dispatch produces nothing until it is read back"]
pub struct Readback {
    staging: wgpu::Buffer,
    len: usize,
}

impl Readback {
    /// Queue a copy of the first `len` floats of `source` into a mappable buffer.
    pub(crate) fn copy_from(
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Buffer,
        len: usize,
    ) -> Self {
        let bytes = (len * std::mem::size_of::<f32>()) as u64;
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: bytes.max(MIN_BINDING_BYTES as u64),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if bytes > 0 {
            encoder.copy_buffer_to_buffer(source, 0, &staging, 0, bytes);
        }
        Self { staging, len }
    }

    /// Number of floats this readback will produce.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if there is nothing to read.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Block until the results are mapped or `timeout` elapses.
    pub fn wait(self, ctx: &GpuContext, timeout: Duration) -> Result<Vec<f32>, GpuError> {
        if self.len == 0 {
            return Ok(Vec::new());
        }

        let slice = self.staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let deadline = Instant::now() + timeout;
        loop {
            ctx.device.poll(wgpu::Maintain::Poll);
            match rx.try_recv() {
                Ok(result) => {
                    result.map_err(|_| GpuError::BufferMapping)?;
                    break;
                }
                Err(TryRecvError::Disconnected) => return Err(GpuError::BufferMapping),
                Err(TryRecvError::Empty) if Instant::now() >= deadline => {
                    return Err(GpuError::Timeout {
                        millis: timeout.as_millis() as u64,
                    });
                }
                Err(TryRecvError::Empty) => std::thread::sleep(Duration::from_micros(200)),
            }
        }

        let data = slice.get_mapped_range();
        let values: Vec<f32> = bytemuck::cast_slice(&data)[..self.len].to_vec();
        drop(data);
        self.staging.unmap();
        Ok(values)
    }
}
