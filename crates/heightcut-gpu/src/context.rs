//! GPU context management for wgpu device and queue.

use std::sync::OnceLock;
use thiserror::Error;
use wgpu::{Device, Instance, Limits, Queue};

static GPU_CONTEXT: OnceLock<GpuContext> = OnceLock::new();

/// Errors that can occur during GPU operations.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    #[error("No compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Buffer mapping failed.
    #[error("Buffer mapping failed")]
    BufferMapping,

    /// The shared context was not stored.
    #[error("GPU context unavailable after init")]
    NotInitialized,

    /// A buffer would exceed the device's binding or allocation limit.
    #[error("{buffer} buffer needs {requested} bytes, device limit is {limit}")]
    Capacity {
        /// Buffer label.
        buffer: &'static str,
        /// Requested size in bytes.
        requested: u64,
        /// Device limit in bytes.
        limit: u64,
    },

    /// A dispatch needs more workgroups along one dimension than the device allows.
    #[error("{pass} needs {requested} workgroups along one dimension, device limit is {limit}")]
    Workgroups {
        /// Pass label.
        pass: &'static str,
        /// Requested workgroup count.
        requested: u32,
        /// Device limit per dimension.
        limit: u32,
    },

    /// Readback did not complete in time.
    #[error("GPU readback timed out after {millis} ms")]
    Timeout {
        /// Configured timeout.
        millis: u64,
    },
}

/// Global GPU context holding device and queue.
pub struct GpuContext {
    /// The wgpu device for creating resources and pipelines.
    pub device: Device,
    /// The command queue for submitting work.
    pub queue: Queue,
    /// Limits the device was created with.
    pub limits: Limits,
    /// Adapter name, for logs.
    pub adapter_name: String,
}

impl GpuContext {
    /// Open the highest-performance adapter with its full limits.
    ///
    /// The context is process-wide; later calls return the first one.
    pub async fn init() -> Result<&'static Self, GpuError> {
        if let Some(ctx) = GPU_CONTEXT.get() {
            return Ok(ctx);
        }

        #[cfg(target_arch = "wasm32")]
        let backends = wgpu::Backends::BROWSER_WEBGPU | wgpu::Backends::GL;
        #[cfg(not(target_arch = "wasm32"))]
        let backends = wgpu::Backends::all();

        let instance = Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        // Full adapter limits, not the conservative defaults.
        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("heightcut device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let adapter_name = adapter.get_info().name;
        log::info!(
            "GPU adapter {adapter_name}: max storage binding {} bytes",
            limits.max_storage_buffer_binding_size
        );

        // A concurrent init may already have stored a context.
        let _ = GPU_CONTEXT.set(GpuContext {
            device,
            queue,
            limits,
            adapter_name,
        });

        GPU_CONTEXT.get().ok_or(GpuError::NotInitialized)
    }

    /// Initialize the GPU context synchronously (native only).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn init_blocking() -> Result<&'static Self, GpuError> {
        pollster::block_on(Self::init())
    }

    /// Largest single storage buffer this device can bind.
    pub fn max_binding_size(&self) -> u64 {
        binding_limit(&self.limits)
    }

    /// Fail fast if a storage buffer of `bytes` cannot be bound.
    pub fn check_capacity(&self, buffer: &'static str, bytes: u64) -> Result<(), GpuError> {
        let limit = self.max_binding_size();
        if bytes > limit {
            return Err(GpuError::Capacity {
                buffer,
                requested: bytes,
                limit,
            });
        }
        Ok(())
    }

    /// Fail fast if a dispatch of `counts` workgroups exceeds the per-dimension limit.
    pub fn check_workgroups(&self, pass: &'static str, counts: [u32; 3]) -> Result<(), GpuError> {
        check_workgroup_counts(&self.limits, pass, counts)
    }
}

/// Check workgroup counts against `limits.max_compute_workgroups_per_dimension`.
pub fn check_workgroup_counts(
    limits: &Limits,
    pass: &'static str,
    counts: [u32; 3],
) -> Result<(), GpuError> {
    let limit = limits.max_compute_workgroups_per_dimension;
    match counts.into_iter().find(|&n| n > limit) {
        Some(requested) => Err(GpuError::Workgroups {
            pass,
            requested,
            limit,
        }),
        None => Ok(()),
    }
}

/// Binding limit implied by a set of device limits.
pub fn binding_limit(limits: &Limits) -> u64 {
    (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size)
}
