// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Device memory registry for scene RPC buffers.
//!
//! Array payloads are plain byte buffers that may live on the host or on an
//! accelerator. This crate is the narrow allocate/free/copy contract the
//! protocol layer uses to move those bytes, with one [`DeviceMemoryManager`]
//! per device kind held in an explicit [`MemoryManager`] registry. The
//! registry is built once at startup and passed to whoever needs it; there is
//! no global instance.
//!
//! # Copy Contract
//!
//! - A zero-byte copy succeeds without touching either buffer, even when one
//!   is missing.
//! - A non-zero copy with a missing buffer fails with
//!   [`MemoryError::NullBuffer`].
//! - A device kind without an installed manager fails with
//!   [`MemoryError::UnsupportedDevice`].
//! - Host to host copies run on the host manager. Copies out of an
//!   accelerator run on the source's manager, copies into one on the
//!   destination's manager. Accelerator to accelerator copies therefore
//!   prefer the source, assuming managers of one family can copy between
//!   each other.
//!
//! These failures indicate a defect in trusted code, not bad remote input;
//! they are returned as errors so callers decide how loudly to fail.
#![forbid(unsafe_code)]

mod device;
mod host;

pub use device::{Device, DeviceType};
pub use host::HostMemoryManager;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

/// Errors from the memory registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// A non-zero copy was given a missing buffer.
    #[error("{which} buffer is null for a copy of {num_bytes} bytes")]
    NullBuffer {
        /// `"source"` or `"destination"`.
        which: &'static str,
        /// Requested copy size.
        num_bytes: usize,
    },
    /// No manager is installed for the device kind.
    #[error("unsupported device {0}")]
    UnsupportedDevice(Device),
    /// A buffer is shorter than the requested copy.
    #[error("{which} buffer holds {available} bytes, copy needs {needed}")]
    OutOfBounds {
        /// `"source"` or `"destination"`.
        which: &'static str,
        /// Requested copy size.
        needed: usize,
        /// Buffer length.
        available: usize,
    },
    /// The manager could not provide the memory.
    #[error("failed to allocate {size} bytes on {device}")]
    AllocationFailed {
        /// Requested size.
        size: usize,
        /// Target device.
        device: Device,
    },
    /// A device string did not parse.
    #[error("invalid device {0:?}, expected KIND:ID such as CPU:0")]
    InvalidDevice(String),
}

/// Memory owned by a manager on a specific device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceBuffer {
    device: Device,
    bytes: Box<[u8]>,
}

impl DeviceBuffer {
    /// Wrap bytes a manager allocated for `device`.
    pub fn new(device: Device, bytes: Box<[u8]>) -> Self {
        Self { device, bytes }
    }

    /// Device the buffer belongs to.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// `true` for a zero-byte buffer.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Contents, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Allocator and copier for one family of devices.
///
/// Implementations must be safe to call from several threads; the registry
/// adds no locking of its own.
pub trait DeviceMemoryManager: Send + Sync + fmt::Debug {
    /// Allocate `size` zeroed bytes on `device`.
    fn allocate(&self, size: usize, device: Device) -> Result<DeviceBuffer, MemoryError>;

    /// Release a buffer this manager allocated.
    fn free(&self, buffer: DeviceBuffer);

    /// Copy `src` into `dst`. The registry guarantees equal, non-zero lengths.
    fn copy(&self, dst: &mut [u8], dst_device: Device, src: &[u8], src_device: Device);
}

/// Snapshot of registry counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Successful allocations.
    pub allocations: u64,
    /// Buffers freed.
    pub frees: u64,
    /// Bytes allocated and not yet freed.
    pub live_bytes: u64,
    /// Bytes moved by non-empty copies.
    pub copied_bytes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    allocations: AtomicU64,
    frees: AtomicU64,
    live_bytes: AtomicU64,
    copied_bytes: AtomicU64,
}

/// Registry mapping device kinds to their managers.
#[derive(Debug, Clone)]
pub struct MemoryManager {
    host: Arc<dyn DeviceMemoryManager>,
    cuda: Option<Arc<dyn DeviceMemoryManager>>,
    counters: Arc<Counters>,
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Device whose manager performs a copy from `src` to `dst`.
pub fn copy_route(dst: Device, src: Device) -> Device {
    if src.kind == DeviceType::Cuda || (dst.is_host() && src.is_host()) {
        src
    } else {
        dst
    }
}

impl MemoryManager {
    /// Registry with the host manager only.
    pub fn new() -> Self {
        Self::with_host(Arc::new(HostMemoryManager))
    }

    /// Registry with a custom host manager.
    pub fn with_host(host: Arc<dyn DeviceMemoryManager>) -> Self {
        Self {
            host,
            cuda: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Install the manager for CUDA devices.
    pub fn with_cuda(mut self, manager: Arc<dyn DeviceMemoryManager>) -> Self {
        self.cuda = Some(manager);
        self
    }

    /// Manager responsible for `device`.
    pub fn manager_for(&self, device: Device) -> Result<&dyn DeviceMemoryManager, MemoryError> {
        match device.kind {
            DeviceType::Cpu => Ok(self.host.as_ref()),
            DeviceType::Cuda => self
                .cuda
                .as_deref()
                .ok_or(MemoryError::UnsupportedDevice(device)),
            DeviceType::Sycl => Err(MemoryError::UnsupportedDevice(device)),
        }
    }

    /// Allocate `size` bytes on `device`.
    pub fn allocate(&self, size: usize, device: Device) -> Result<DeviceBuffer, MemoryError> {
        let buffer = self.manager_for(device)?.allocate(size, device)?;
        self.counters.allocations.fetch_add(1, Ordering::Relaxed);
        self.counters
            .live_bytes
            .fetch_add(buffer.len() as u64, Ordering::Relaxed);
        trace!(%device, size, "allocated");
        Ok(buffer)
    }

    /// Return a buffer to the manager of its device.
    pub fn free(&self, buffer: DeviceBuffer) -> Result<(), MemoryError> {
        let device = buffer.device();
        let size = buffer.len();
        self.manager_for(device)?.free(buffer);
        self.counters.frees.fetch_add(1, Ordering::Relaxed);
        // Buffers wrapped outside `allocate` were never counted; clamp at zero.
        let live = &self.counters.live_bytes;
        let _ = live.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
            Some(n.saturating_sub(size as u64))
        });
        trace!(%device, size, "freed");
        Ok(())
    }

    /// Copy `num_bytes` from the front of `src` on `src_device` to the front
    /// of `dst` on `dst_device`.
    pub fn copy(
        &self,
        dst: Option<&mut [u8]>,
        dst_device: Device,
        src: Option<&[u8]>,
        src_device: Device,
        num_bytes: usize,
    ) -> Result<(), MemoryError> {
        if num_bytes == 0 {
            return Ok(());
        }
        let dst = dst.ok_or(MemoryError::NullBuffer {
            which: "destination",
            num_bytes,
        })?;
        let src = src.ok_or(MemoryError::NullBuffer {
            which: "source",
            num_bytes,
        })?;
        self.manager_for(dst_device)?;
        self.manager_for(src_device)?;
        let dst = prefix_mut(dst, num_bytes)?;
        let src = prefix(src, num_bytes)?;
        let manager = self.manager_for(copy_route(dst_device, src_device))?;
        manager.copy(dst, dst_device, src, src_device);
        self.counters
            .copied_bytes
            .fetch_add(num_bytes as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Copy from host memory (`CPU:0`) to `dst_device`.
    pub fn copy_from_host(
        &self,
        dst: Option<&mut [u8]>,
        dst_device: Device,
        host: Option<&[u8]>,
        num_bytes: usize,
    ) -> Result<(), MemoryError> {
        self.copy(dst, dst_device, host, Device::HOST, num_bytes)
    }

    /// Copy from `src_device` to host memory (`CPU:0`).
    pub fn copy_to_host(
        &self,
        host: Option<&mut [u8]>,
        src: Option<&[u8]>,
        src_device: Device,
        num_bytes: usize,
    ) -> Result<(), MemoryError> {
        self.copy(host, Device::HOST, src, src_device, num_bytes)
    }

    /// Current counters.
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            allocations: self.counters.allocations.load(Ordering::Relaxed),
            frees: self.counters.frees.load(Ordering::Relaxed),
            live_bytes: self.counters.live_bytes.load(Ordering::Relaxed),
            copied_bytes: self.counters.copied_bytes.load(Ordering::Relaxed),
        }
    }
}

fn prefix(buf: &[u8], needed: usize) -> Result<&[u8], MemoryError> {
    buf.get(..needed).ok_or(MemoryError::OutOfBounds {
        which: "source",
        needed,
        available: buf.len(),
    })
}

fn prefix_mut(buf: &mut [u8], needed: usize) -> Result<&mut [u8], MemoryError> {
    let available = buf.len();
    buf.get_mut(..needed).ok_or(MemoryError::OutOfBounds {
        which: "destination",
        needed,
        available,
    })
}
