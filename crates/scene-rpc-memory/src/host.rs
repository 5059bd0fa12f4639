// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Host memory manager.

use tracing::trace;

use crate::{Device, DeviceBuffer, DeviceMemoryManager, MemoryError};

/// Manager for `CPU` devices backed by the global allocator.
///
/// Allocation failure is reported as [`MemoryError::AllocationFailed`]
/// instead of aborting the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostMemoryManager;

impl DeviceMemoryManager for HostMemoryManager {
    fn allocate(&self, size: usize, device: Device) -> Result<DeviceBuffer, MemoryError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| MemoryError::AllocationFailed { size, device })?;
        bytes.resize(size, 0);
        trace!(%device, size, "host allocation");
        Ok(DeviceBuffer::new(device, bytes.into_boxed_slice()))
    }

    fn free(&self, buffer: DeviceBuffer) {
        trace!(device = %buffer.device(), size = buffer.len(), "host free");
        drop(buffer);
    }

    fn copy(&self, dst: &mut [u8], dst_device: Device, src: &[u8], src_device: Device) {
        trace!(%dst_device, %src_device, bytes = src.len(), "host copy");
        dst.copy_from_slice(src);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_zeroed() {
        let buffer = HostMemoryManager.allocate(16, Device::HOST).unwrap();
        assert_eq!(buffer.len(), 16);
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
        assert_eq!(buffer.device(), Device::HOST);
    }

    #[test]
    fn impossible_allocation_is_an_error() {
        let err = HostMemoryManager
            .allocate(usize::MAX, Device::HOST)
            .unwrap_err();
        assert!(matches!(err, MemoryError::AllocationFailed { .. }));
    }
}
